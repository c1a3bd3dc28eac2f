use std::fmt;

use crate::{Error, Result};

/// Flag bit for an extended (29 bit) identifier.
pub const CANMSG_EXTENDED: u8 = 0x80;
/// Flag bit for a remote frame.
pub const CANMSG_RTR: u8 = 0x40;
/// The low six flag bits are reserved.
pub const CANMSG_RESERVED_MASK: u8 = 0x3F;

pub const MAX_DATA_LEN: usize = 8;

/// CAN frame as the driver exchanges it.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
#[repr(C)]
pub struct CanMsg {
    pub id: u32,
    /// Milliseconds
    pub timestamp: u32,
    /// `[extended:1][rtr:1][reserved:6]`
    pub flags: u8,
    pub len: u8,
    pub data: [u8; 8],
}

impl CanMsg {
    /// Length of the packed form produced by [`CanMsg::to_bytes`].
    pub const WIRE_LEN: usize = 18;

    /// Packs the message into 4 bytes id, 4 bytes timestamp, flags, length
    /// and 8 data bytes, little endian.
    pub fn to_bytes(&self) -> [u8; CanMsg::WIRE_LEN] {
        let mut out = [0u8; CanMsg::WIRE_LEN];
        out[0..4].copy_from_slice(&self.id.to_le_bytes());
        out[4..8].copy_from_slice(&self.timestamp.to_le_bytes());
        out[8] = self.flags;
        out[9] = self.len;
        out[10..].copy_from_slice(&self.data);
        out
    }

    pub fn from_bytes(bytes: &[u8; CanMsg::WIRE_LEN]) -> CanMsg {
        let mut data = [0u8; 8];
        data.copy_from_slice(&bytes[10..]);
        CanMsg {
            id: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            timestamp: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            flags: bytes[8],
            len: bytes[9],
            data,
        }
    }
}

impl fmt::Debug for CanMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanMsg")
            .field("id", &format_args!("{:#x}", self.id))
            .field("timestamp", &self.timestamp)
            .field("flags", &format_args!("{:#04x}", self.flags))
            .field("len", &self.len)
            .field("data", &self.data)
            .finish()
    }
}

/// A CAN frame.
///
/// Frames built by the caller are validated on construction, so every `Frame`
/// can be encoded. Frames received from the adapter are taken as they are.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    id: u32,
    timestamp: u32,
    extended: bool,
    remote: bool,
    reserved: u8,
    len: u8,
    data: [u8; 8],
}

impl Frame {
    /// Creates a data frame with a standard identifier. The frame length is `data.len()`.
    pub fn new(id: u32, data: &[u8]) -> Result<Frame> {
        Frame::from_parts(id, 0, false, false, 0, data.len() as u8, data)
    }

    /// Creates a data frame with an extended (29 bit) identifier.
    pub fn new_extended(id: u32, data: &[u8]) -> Result<Frame> {
        Frame::new(id, data).map(|frame| frame.with_extended(true))
    }

    /// Creates a remote frame requesting `len` bytes.
    pub fn new_remote(id: u32, len: u8) -> Result<Frame> {
        Frame::from_parts(id, 0, false, true, 0, len, &[])
    }

    /// Creates a frame from all of its fields.
    ///
    /// `len` may be shorter than `data`; the remaining bytes are padding and
    /// are dropped.
    ///
    /// # Errors
    ///
    /// `ReservedOutOfRange` when `reserved` uses bits above the low six,
    /// `DataTooLong` for more than 8 data bytes and `LengthOutOfRange` for a
    /// length above 8.
    pub fn from_parts(
        id: u32,
        timestamp: u32,
        extended: bool,
        remote: bool,
        reserved: u8,
        len: u8,
        data: &[u8],
    ) -> Result<Frame> {
        if reserved & !CANMSG_RESERVED_MASK != 0 {
            return Err(Error::ReservedOutOfRange(reserved));
        }
        if data.len() > MAX_DATA_LEN {
            return Err(Error::DataTooLong(data.len()));
        }
        if len as usize > MAX_DATA_LEN {
            return Err(Error::LengthOutOfRange(len));
        }
        let mut buf = [0u8; 8];
        let payload = data.len().min(len as usize);
        buf[..payload].copy_from_slice(&data[..payload]);
        Ok(Frame {
            id,
            timestamp,
            extended,
            remote,
            reserved,
            len,
            data: buf,
        })
    }

    pub fn with_extended(mut self, extended: bool) -> Frame {
        self.extended = extended;
        self
    }

    pub fn with_remote(mut self, remote: bool) -> Frame {
        self.remote = remote;
        self
    }

    pub fn with_timestamp(mut self, timestamp: u32) -> Frame {
        self.timestamp = timestamp;
        self
    }

    pub fn with_reserved(mut self, reserved: u8) -> Result<Frame> {
        if reserved & !CANMSG_RESERVED_MASK != 0 {
            return Err(Error::ReservedOutOfRange(reserved));
        }
        self.reserved = reserved;
        Ok(self)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Timestamp in milliseconds, set by the adapter or the driver.
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    pub fn is_remote(&self) -> bool {
        self.remote
    }

    /// The reserved flag bits, in the low six bits.
    pub fn reserved(&self) -> u8 {
        self.reserved
    }

    /// Frame length as announced, which may exceed 8 for frames received from a misbehaving adapter.
    pub fn len(&self) -> u8 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The payload, without padding.
    pub fn data(&self) -> &[u8] {
        &self.data[..(self.len as usize).min(MAX_DATA_LEN)]
    }
}

impl From<&Frame> for CanMsg {
    fn from(frame: &Frame) -> CanMsg {
        let mut flags = frame.reserved;
        if frame.extended {
            flags |= CANMSG_EXTENDED;
        }
        if frame.remote {
            flags |= CANMSG_RTR;
        }
        // The data buffer is always the full 8 bytes, so zero length frames
        // never hand the driver an empty buffer.
        CanMsg {
            id: frame.id,
            timestamp: frame.timestamp,
            flags,
            len: frame.len,
            data: frame.data,
        }
    }
}

impl From<CanMsg> for Frame {
    fn from(msg: CanMsg) -> Frame {
        Frame {
            id: msg.id,
            timestamp: msg.timestamp,
            extended: msg.flags & CANMSG_EXTENDED == CANMSG_EXTENDED,
            remote: msg.flags & CANMSG_RTR == CANMSG_RTR,
            reserved: msg.flags & CANMSG_RESERVED_MASK,
            len: msg.len,
            data: msg.data,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extended {
            write!(f, "{:08X}", self.id)?;
        } else {
            write!(f, "{:03X}", self.id)?;
        }
        if self.remote {
            write!(f, " R")?;
        }
        write!(f, " [{}]", self.len)?;
        for byte in self.data() {
            write!(f, " {:02X}", byte)?;
        }
        if self.reserved != 0 {
            write!(f, " reserved={:#04x}", self.reserved)?;
        }
        write!(f, " @{}ms", self.timestamp)
    }
}
