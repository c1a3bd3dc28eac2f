//! Channel open parameters.
//!
//! Bit rate, acceptance filter and flags only take effect on the first open
//! of a physical adapter. Opening further virtual channels on the same adapter
//! reuses the settings of the first one and the driver ignores new values.

use std::ffi::CStr;
use std::fmt;
use std::str::FromStr;

/// Bit rates supported by the adapter.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum Bitrate {
    Kbps10,
    Kbps20,
    Kbps50,
    Kbps100,
    #[default]
    Kbps250,
    Kbps500,
    Kbps800,
    Mbps1,
}

impl Bitrate {
    pub const ALL: [Bitrate; 8] = [
        Bitrate::Kbps10,
        Bitrate::Kbps20,
        Bitrate::Kbps50,
        Bitrate::Kbps100,
        Bitrate::Kbps250,
        Bitrate::Kbps500,
        Bitrate::Kbps800,
        Bitrate::Mbps1,
    ];

    /// The token the driver expects, in kbps.
    pub fn as_str(self) -> &'static str {
        match self {
            Bitrate::Kbps10 => "10",
            Bitrate::Kbps20 => "20",
            Bitrate::Kbps50 => "50",
            Bitrate::Kbps100 => "100",
            Bitrate::Kbps250 => "250",
            Bitrate::Kbps500 => "500",
            Bitrate::Kbps800 => "800",
            Bitrate::Mbps1 => "1000",
        }
    }

    pub(crate) fn as_cstr(self) -> &'static CStr {
        match self {
            Bitrate::Kbps10 => c"10",
            Bitrate::Kbps20 => c"20",
            Bitrate::Kbps50 => c"50",
            Bitrate::Kbps100 => c"100",
            Bitrate::Kbps250 => c"250",
            Bitrate::Kbps500 => c"500",
            Bitrate::Kbps800 => c"800",
            Bitrate::Mbps1 => c"1000",
        }
    }

    pub fn kbps(self) -> u32 {
        match self {
            Bitrate::Kbps10 => 10,
            Bitrate::Kbps20 => 20,
            Bitrate::Kbps50 => 50,
            Bitrate::Kbps100 => 100,
            Bitrate::Kbps250 => 250,
            Bitrate::Kbps500 => 500,
            Bitrate::Kbps800 => 800,
            Bitrate::Mbps1 => 1000,
        }
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unsupported bit rate {0:?}, expected one of 10, 20, 50, 100, 250, 500, 800, 1000")]
pub struct ParseBitrateError(String);

impl FromStr for Bitrate {
    type Err = ParseBitrateError;

    /// Accepts the driver token (`"250"`), `"250kbps"` and `"1Mbps"`.
    fn from_str(s: &str) -> Result<Bitrate, ParseBitrateError> {
        let token = s.trim();
        if token.eq_ignore_ascii_case("1mbps") {
            return Ok(Bitrate::Mbps1);
        }
        let digits = token
            .strip_suffix("kbps")
            .or_else(|| token.strip_suffix("KBPS"))
            .unwrap_or(token);
        Bitrate::ALL
            .iter()
            .copied()
            .find(|bitrate| bitrate.as_str() == digits)
            .ok_or_else(|| ParseBitrateError(s.to_string()))
    }
}

/// Acceptance code and mask, restricting which identifiers reach a channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct AcceptanceFilter {
    pub code: u32,
    pub mask: u32,
}

impl AcceptanceFilter {
    pub const CODE_ALL: u32 = 0x0000_0000;
    pub const MASK_ALL: u32 = 0xFFFF_FFFF;

    /// Lets every frame through.
    pub const ACCEPT_ALL: AcceptanceFilter = AcceptanceFilter {
        code: AcceptanceFilter::CODE_ALL,
        mask: AcceptanceFilter::MASK_ALL,
    };

    pub fn new(code: u32, mask: u32) -> AcceptanceFilter {
        AcceptanceFilter { code, mask }
    }

    pub fn is_accept_all(&self) -> bool {
        *self == AcceptanceFilter::ACCEPT_ALL
    }
}

impl Default for AcceptanceFilter {
    fn default() -> AcceptanceFilter {
        AcceptanceFilter::ACCEPT_ALL
    }
}

bitflags! {
    pub struct ChannelFlags: u32 {
        const NONE = 0;
        /// Frames are timestamped by the adapter instead of the driver.
        const TIMESTAMP = 0x0001;
        /// When the input queue is full the oldest frame is dropped instead of the new one.
        const QUEUE_REPLACE = 0x0002;
        /// Reads and writes block.
        const BLOCK = 0x0004;
        /// Keep retrying a frame while the adapter reports its buffer full.
        const SLOW = 0x0008;
        /// Frames sent on this channel are not echoed to other local channels of the adapter.
        const NO_LOCAL_SEND = 0x0010;
    }
}

/// Everything `canusb_Open` needs besides the adapter.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    pub bitrate: Bitrate,
    pub filter: AcceptanceFilter,
    pub flags: ChannelFlags,
}

impl ChannelConfig {
    pub fn new(bitrate: Bitrate) -> ChannelConfig {
        ChannelConfig {
            bitrate,
            ..ChannelConfig::default()
        }
    }

    pub fn filter(mut self, filter: AcceptanceFilter) -> ChannelConfig {
        self.filter = filter;
        self
    }

    pub fn flags(mut self, flags: ChannelFlags) -> ChannelConfig {
        self.flags = flags;
        self
    }

    /// True when filter and flags are the ones used for probing adapters.
    pub fn has_default_filter_and_flags(&self) -> bool {
        self.filter.is_accept_all() && self.flags == ChannelFlags::TIMESTAMP
    }
}

impl Default for ChannelConfig {
    fn default() -> ChannelConfig {
        ChannelConfig {
            bitrate: Bitrate::default(),
            filter: AcceptanceFilter::ACCEPT_ALL,
            flags: ChannelFlags::TIMESTAMP,
        }
    }
}
