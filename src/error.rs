use std::fmt;
use std::io;
use std::str::Utf8Error;

use crate::driver::{
    ERROR_CANUSB_COMMAND_SUBSYSTEM, ERROR_CANUSB_GENERAL, ERROR_CANUSB_INVALID_HARDWARE,
    ERROR_CANUSB_INVALID_PARAM, ERROR_CANUSB_MEMORY_ERROR, ERROR_CANUSB_NOT_OPEN,
    ERROR_CANUSB_NO_DEVICE, ERROR_CANUSB_NO_MESSAGE, ERROR_CANUSB_OK,
    ERROR_CANUSB_OPEN_SUBSYSTEM, ERROR_CANUSB_TIMEOUT, ERROR_CANUSB_TX_FIFO_FULL,
};

pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a CANUSB driver return code.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Ok,
    General,
    OpenSubsystem,
    CommandSubsystem,
    NotOpen,
    TransmitFifoFull,
    InvalidParam,
    // The receive queue is empty; `Channel::read` reports this as `Ok(None)`
    NoMessage,
    MemoryError,
    NoDevice,
    Timeout,
    InvalidHardware,
    /// A code this crate does not know. Treated as a general error.
    Unknown,
}

impl ErrorKind {
    pub fn from_code(code: i32) -> ErrorKind {
        match code {
            ERROR_CANUSB_OK => ErrorKind::Ok,
            ERROR_CANUSB_GENERAL => ErrorKind::General,
            ERROR_CANUSB_OPEN_SUBSYSTEM => ErrorKind::OpenSubsystem,
            ERROR_CANUSB_COMMAND_SUBSYSTEM => ErrorKind::CommandSubsystem,
            ERROR_CANUSB_NOT_OPEN => ErrorKind::NotOpen,
            ERROR_CANUSB_TX_FIFO_FULL => ErrorKind::TransmitFifoFull,
            ERROR_CANUSB_INVALID_PARAM => ErrorKind::InvalidParam,
            ERROR_CANUSB_NO_MESSAGE => ErrorKind::NoMessage,
            ERROR_CANUSB_MEMORY_ERROR => ErrorKind::MemoryError,
            ERROR_CANUSB_NO_DEVICE => ErrorKind::NoDevice,
            ERROR_CANUSB_TIMEOUT => ErrorKind::Timeout,
            ERROR_CANUSB_INVALID_HARDWARE => ErrorKind::InvalidHardware,
            _ => ErrorKind::Unknown,
        }
    }

    /// Returns the driver code for this kind, `None` for `Unknown`.
    pub fn code(self) -> Option<i32> {
        let code = match self {
            ErrorKind::Ok => ERROR_CANUSB_OK,
            ErrorKind::General => ERROR_CANUSB_GENERAL,
            ErrorKind::OpenSubsystem => ERROR_CANUSB_OPEN_SUBSYSTEM,
            ErrorKind::CommandSubsystem => ERROR_CANUSB_COMMAND_SUBSYSTEM,
            ErrorKind::NotOpen => ERROR_CANUSB_NOT_OPEN,
            ErrorKind::TransmitFifoFull => ERROR_CANUSB_TX_FIFO_FULL,
            ErrorKind::InvalidParam => ERROR_CANUSB_INVALID_PARAM,
            ErrorKind::NoMessage => ERROR_CANUSB_NO_MESSAGE,
            ErrorKind::MemoryError => ERROR_CANUSB_MEMORY_ERROR,
            ErrorKind::NoDevice => ERROR_CANUSB_NO_DEVICE,
            ErrorKind::Timeout => ERROR_CANUSB_TIMEOUT,
            ErrorKind::InvalidHardware => ERROR_CANUSB_INVALID_HARDWARE,
            ErrorKind::Unknown => return None,
        };
        Some(code)
    }

    /// True for `General` and for codes that are not recognised.
    pub fn is_general(self) -> bool {
        matches!(self, ErrorKind::General | ErrorKind::Unknown)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorKind::Ok => "success",
            ErrorKind::General => "general error",
            ErrorKind::OpenSubsystem => "open subsystem error",
            ErrorKind::CommandSubsystem => "command subsystem error",
            ErrorKind::NotOpen => "channel not open",
            ErrorKind::TransmitFifoFull => "transmit fifo full",
            ErrorKind::InvalidParam => "invalid parameter",
            ErrorKind::NoMessage => "no message available",
            ErrorKind::MemoryError => "memory error",
            ErrorKind::NoDevice => "no device",
            ErrorKind::Timeout => "timed out",
            ErrorKind::InvalidHardware => "invalid hardware",
            ErrorKind::Unknown => "general error (unknown code)",
        };
        f.write_str(text)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Library(#[from] libloading::Error),
    #[error(transparent)]
    Utf8Error(#[from] Utf8Error),
    #[error(transparent)]
    Nul(#[from] std::ffi::NulError),
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A driver call returned something other than `ERROR_CANUSB_OK`.
    #[error("{context} ({kind}, rc = {code})")]
    Device {
        kind: ErrorKind,
        code: i32,
        context: String,
    },

    #[error("reserved bits {0:#04x} do not fit in 6 bits")]
    ReservedOutOfRange(u8),
    #[error("data is {0} bytes long, a frame holds at most 8")]
    DataTooLong(usize),
    #[error("frame length {0} is above 8")]
    LengthOutOfRange(u8),
    #[error("channel to {0} is not open")]
    NotOpen(String),
    #[error("no adapter with serial number {0} found")]
    AdapterNotFound(String),
    #[error("no CANUSB adapter found")]
    NoAdapters,
    #[error("all {0} receive callback slots are in use")]
    CallbackSlotsExhausted(usize),
    #[error("malformed version info {0:?}")]
    MalformedVersionInfo(String),
}

impl Error {
    /// Builds the error for a driver return code. Callers make sure `code` is not `Ok`.
    pub fn from_code<S: Into<String>>(code: i32, context: S) -> Error {
        Error::Device {
            kind: ErrorKind::from_code(code),
            code,
            context: context.into(),
        }
    }

    /// Taxonomy kind of this error, if it has one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Device { kind, .. } => Some(*kind),
            Error::NotOpen(_) => Some(ErrorKind::NotOpen),
            _ => None,
        }
    }

    /// Raw driver return code, if the error came from the driver.
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Device { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Passes `ERROR_CANUSB_OK` and turns every other code into an error.
///
/// The context is only rendered on failure.
pub(crate) fn check<F>(code: i32, context: F) -> Result<()>
where
    F: FnOnce() -> String,
{
    match ErrorKind::from_code(code) {
        ErrorKind::Ok => Ok(()),
        _ => Err(Error::from_code(code, context())),
    }
}
