use std::fmt;

bitflags! {
    /// Status bits reported by `canusb_Status`.
    pub struct StatusFlags: u32 {
        const RECEIVE_FIFO_FULL = 0x01;
        const TRANSMIT_FIFO_FULL = 0x02;
        const ERROR_WARNING = 0x04;
        const DATA_OVERRUN = 0x08;
        const ERROR_PASSIVE = 0x20;
        const ARBITRATION_LOST = 0x40;
        const BUS_ERROR = 0x80;
    }
}

/// Adapter status as read from a channel.
///
/// Keeps the raw value so bits set by newer adapter revisions are not lost.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Status(u32);

impl Status {
    pub fn from_bits(bits: u32) -> Status {
        Status(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    /// The recognised bits.
    pub fn flags(&self) -> StatusFlags {
        StatusFlags::from_bits_truncate(self.0)
    }

    pub fn is_ok(&self) -> bool {
        self.0 == 0
    }

    pub fn is_receive_fifo_full(&self) -> bool {
        self.flags().contains(StatusFlags::RECEIVE_FIFO_FULL)
    }

    pub fn is_transmit_fifo_full(&self) -> bool {
        self.flags().contains(StatusFlags::TRANSMIT_FIFO_FULL)
    }

    pub fn is_error_warning(&self) -> bool {
        self.flags().contains(StatusFlags::ERROR_WARNING)
    }

    pub fn is_data_overrun(&self) -> bool {
        self.flags().contains(StatusFlags::DATA_OVERRUN)
    }

    pub fn is_error_passive(&self) -> bool {
        self.flags().contains(StatusFlags::ERROR_PASSIVE)
    }

    pub fn is_arbitration_lost(&self) -> bool {
        self.flags().contains(StatusFlags::ARBITRATION_LOST)
    }

    pub fn is_bus_error(&self) -> bool {
        self.flags().contains(StatusFlags::BUS_ERROR)
    }

    /// True if bits outside the known status flags are set.
    pub fn has_unknown_bits(&self) -> bool {
        self.0 & !StatusFlags::all().bits() != 0
    }
}

const NAMES: [(StatusFlags, &str); 7] = [
    (StatusFlags::RECEIVE_FIFO_FULL, "CANSTATUS_RECEIVE_FIFO_FULL"),
    (StatusFlags::TRANSMIT_FIFO_FULL, "CANSTATUS_TRANSMIT_FIFO_FULL"),
    (StatusFlags::ERROR_WARNING, "CANSTATUS_ERROR_WARNING"),
    (StatusFlags::DATA_OVERRUN, "CANSTATUS_DATA_OVERRUN"),
    (StatusFlags::ERROR_PASSIVE, "CANSTATUS_ERROR_PASSIVE"),
    (StatusFlags::ARBITRATION_LOST, "CANSTATUS_ARBITRATION_LOST"),
    (StatusFlags::BUS_ERROR, "CANSTATUS_BUS_ERROR"),
];

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            f.write_str("OK, ")?;
        }
        let flags = self.flags();
        for (flag, name) in NAMES.iter() {
            if flags.contains(*flag) {
                write!(f, "{}, ", name)?;
            }
        }
        if self.has_unknown_bits() {
            f.write_str("unknown error(s), ")?;
        }
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Status")
            .field(&format_args!("{:#04x}", self.0))
            .finish()
    }
}
