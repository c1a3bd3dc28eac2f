//! Device boundary: the CANUSB driver library and the trait the rest of the crate talks to.
//!
//! Every method mirrors one export of the vendor library and returns the raw
//! return code. Interpreting those codes is left to [`crate::ErrorKind`].

use std::ffi::{CStr, OsStr};
use std::ptr;

use libc::{c_char, c_int, c_long};
use libloading::Library;

use crate::frame::CanMsg;

// Error return codes
pub const ERROR_CANUSB_OK: i32 = 1;
pub const ERROR_CANUSB_GENERAL: i32 = -1;
pub const ERROR_CANUSB_OPEN_SUBSYSTEM: i32 = -2;
pub const ERROR_CANUSB_COMMAND_SUBSYSTEM: i32 = -3;
pub const ERROR_CANUSB_NOT_OPEN: i32 = -4;
pub const ERROR_CANUSB_TX_FIFO_FULL: i32 = -5;
pub const ERROR_CANUSB_INVALID_PARAM: i32 = -6;
pub const ERROR_CANUSB_NO_MESSAGE: i32 = -7;
pub const ERROR_CANUSB_MEMORY_ERROR: i32 = -8;
pub const ERROR_CANUSB_NO_DEVICE: i32 = -9;
pub const ERROR_CANUSB_TIMEOUT: i32 = -10;
pub const ERROR_CANUSB_INVALID_HARDWARE: i32 = -11;

/// Size of the buffers handed to the adapter enumeration calls.
pub const ADAPTER_ID_LEN: usize = 32;
/// Size of the buffer handed to `version_info`. The driver writes a
/// `VHhFf - Nxxxx - n.n.n - CCCCCCCCCC` string plus terminator into it.
pub const VERSION_INFO_LEN: usize = 64;

/// Channel handle returned by `canusb_Open`. Positive when valid.
pub type Handle = c_long;

/// Receive callback as the driver calls it, once per frame, on its own thread.
pub type RawCallback = unsafe extern "system" fn(msg: *const CanMsg);

type GetFirstAdapterFn = unsafe extern "system" fn(adapter: *mut c_char, size: c_int) -> c_int;
type GetNextAdapterFn = unsafe extern "system" fn(adapter: *mut c_char, size: c_int) -> c_int;
type OpenFn = unsafe extern "system" fn(
    id: *const c_char,
    bitrate: *const c_char,
    acceptance_code: u32,
    acceptance_mask: u32,
    flags: u32,
) -> c_long;
type CloseFn = unsafe extern "system" fn(handle: c_long) -> c_int;
type StatusFn = unsafe extern "system" fn(handle: c_long) -> c_int;
type VersionInfoFn = unsafe extern "system" fn(handle: c_long, info: *mut c_char) -> c_int;
type ReadFn = unsafe extern "system" fn(handle: c_long, msg: *mut CanMsg) -> c_int;
type WriteFn = unsafe extern "system" fn(handle: c_long, msg: *const CanMsg) -> c_int;
type SetReceiveCallbackFn =
    unsafe extern "system" fn(handle: c_long, callback: Option<RawCallback>) -> c_int;

/// Raw CANUSB driver operations.
///
/// Implementations must be callable from several threads; the driver itself
/// serialises access to the hardware.
pub trait Driver: Send + Sync {
    /// Writes the id of the first attached adapter into `buf` and returns the
    /// number of attached adapters, `<= 0` when there are none.
    fn get_first_adapter(&self, buf: &mut [u8]) -> i32;

    /// Writes the id of the next adapter into `buf`. Only valid after
    /// `get_first_adapter`; wraps around forever.
    fn get_next_adapter(&self, buf: &mut [u8]) -> i32;

    /// Opens a (virtual) channel. `id` of `None` opens the first adapter found.
    /// Returns a positive handle, or zero / a negative error code.
    fn open(
        &self,
        id: Option<&CStr>,
        bitrate: &CStr,
        acceptance_code: u32,
        acceptance_mask: u32,
        flags: u32,
    ) -> Handle;

    fn close(&self, handle: Handle) -> i32;

    /// Status bits, or a negative error code.
    fn status(&self, handle: Handle) -> i32;

    /// Fills `buf` (at least [`VERSION_INFO_LEN`] bytes) with a nul terminated version string.
    fn version_info(&self, handle: Handle, buf: &mut [u8]) -> i32;

    /// Positive when `msg` was filled, `ERROR_CANUSB_NO_MESSAGE` when the queue is empty.
    fn read(&self, handle: Handle, msg: &mut CanMsg) -> i32;

    fn write(&self, handle: Handle, msg: &CanMsg) -> i32;

    /// Registers `callback`, or resets the registration with `None`.
    fn set_receive_callback(&self, handle: Handle, callback: Option<RawCallback>) -> i32;
}

/// The vendor driver library loaded at runtime.
pub struct LibraryDriver {
    _library: Library,

    c_get_first_adapter: GetFirstAdapterFn,
    c_get_next_adapter: GetNextAdapterFn,
    c_open: OpenFn,
    c_close: CloseFn,
    c_status: StatusFn,
    c_version_info: VersionInfoFn,
    c_read: ReadFn,
    c_write: WriteFn,
    c_set_receive_callback: SetReceiveCallbackFn,
}

impl LibraryDriver {
    /// Loads the driver library at `path`
    ///
    /// # Example
    /// ```no_run
    /// use canusb::driver::LibraryDriver;
    /// let driver = LibraryDriver::load("C:\\Windows\\System32\\canusbdrv.dll").unwrap();
    /// ```
    pub fn load<S: AsRef<OsStr>>(path: S) -> Result<LibraryDriver, libloading::Error> {
        // Loading runs the library's initialisers; the vendor driver has none that matter here.
        let library = unsafe { Library::new(path) }?;

        let driver = unsafe {
            LibraryDriver {
                c_get_first_adapter: *library.get::<GetFirstAdapterFn>(b"canusb_getFirstAdapter\0")?,
                c_get_next_adapter: *library.get::<GetNextAdapterFn>(b"canusb_getNextAdapter\0")?,
                c_open: *library.get::<OpenFn>(b"canusb_Open\0")?,
                c_close: *library.get::<CloseFn>(b"canusb_Close\0")?,
                c_status: *library.get::<StatusFn>(b"canusb_Status\0")?,
                c_version_info: *library.get::<VersionInfoFn>(b"canusb_VersionInfo\0")?,
                c_read: *library.get::<ReadFn>(b"canusb_Read\0")?,
                c_write: *library.get::<WriteFn>(b"canusb_Write\0")?,
                c_set_receive_callback: *library
                    .get::<SetReceiveCallbackFn>(b"canusb_setReceiveCallBack\0")?,
                _library: library,
            }
        };

        Ok(driver)
    }

    /// Platform file name of the vendor library, e.g. `canusbdrv.dll`.
    pub fn default_path() -> std::ffi::OsString {
        libloading::library_filename("canusbdrv")
    }
}

impl Driver for LibraryDriver {
    fn get_first_adapter(&self, buf: &mut [u8]) -> i32 {
        unsafe { (self.c_get_first_adapter)(buf.as_mut_ptr() as *mut c_char, buf.len() as c_int) }
    }

    fn get_next_adapter(&self, buf: &mut [u8]) -> i32 {
        unsafe { (self.c_get_next_adapter)(buf.as_mut_ptr() as *mut c_char, buf.len() as c_int) }
    }

    fn open(
        &self,
        id: Option<&CStr>,
        bitrate: &CStr,
        acceptance_code: u32,
        acceptance_mask: u32,
        flags: u32,
    ) -> Handle {
        let id = id.map_or(ptr::null(), CStr::as_ptr);
        unsafe { (self.c_open)(id, bitrate.as_ptr(), acceptance_code, acceptance_mask, flags) }
    }

    fn close(&self, handle: Handle) -> i32 {
        unsafe { (self.c_close)(handle) }
    }

    fn status(&self, handle: Handle) -> i32 {
        unsafe { (self.c_status)(handle) }
    }

    fn version_info(&self, handle: Handle, buf: &mut [u8]) -> i32 {
        if buf.len() < VERSION_INFO_LEN {
            return ERROR_CANUSB_INVALID_PARAM;
        }
        unsafe { (self.c_version_info)(handle, buf.as_mut_ptr() as *mut c_char) }
    }

    fn read(&self, handle: Handle, msg: &mut CanMsg) -> i32 {
        unsafe { (self.c_read)(handle, msg as *mut CanMsg) }
    }

    fn write(&self, handle: Handle, msg: &CanMsg) -> i32 {
        unsafe { (self.c_write)(handle, msg as *const CanMsg) }
    }

    fn set_receive_callback(&self, handle: Handle, callback: Option<RawCallback>) -> i32 {
        unsafe { (self.c_set_receive_callback)(handle, callback) }
    }
}

/// Reads a nul terminated string out of a driver buffer.
pub(crate) fn buffer_str(buf: &[u8]) -> Result<&str, std::str::Utf8Error> {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    std::str::from_utf8(&buf[..end])
}
