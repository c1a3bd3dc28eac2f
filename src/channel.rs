use std::ffi::CString;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, warn};

use crate::callback::Trampoline;
use crate::config::ChannelConfig;
use crate::driver::{buffer_str, Driver, Handle, VERSION_INFO_LEN};
use crate::error::check;
use crate::frame::{CanMsg, Frame};
use crate::status::Status;
use crate::{Error, ErrorKind, Interface, Result};

/// Hardware, firmware and driver version of an adapter, in the driver's
/// `VHhFf - Nxxxx - n.n.n - CCCCCCCCCC` layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionInfo(String);

impl VersionInfo {
    pub fn new<S: Into<String>>(info: S) -> VersionInfo {
        VersionInfo(info.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The four character serial number following the `N`.
    pub fn serial_number(&self) -> Option<&str> {
        self.0.get(9..13)
    }

    pub fn hardware_version(&self) -> Option<&str> {
        self.0.get(1..3)
    }

    pub fn firmware_version(&self) -> Option<&str> {
        self.0.get(3..5)
    }

    pub fn driver_version(&self) -> Option<&str> {
        self.0.split(" - ").nth(2)
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct State {
    handle: Option<Handle>,
    callback: Option<Trampoline>,
}

/// Removes `callback` from the driver. When the driver refuses, it may keep
/// calling the trampoline, so the slot is leaked instead of released.
fn deregister(
    driver: &dyn Driver,
    handle: Handle,
    callback: Option<Trampoline>,
    name: &str,
) -> Result<()> {
    let Some(trampoline) = callback else {
        return Ok(());
    };
    let result = check(driver.set_receive_callback(handle, None), || {
        format!("Can't reset receive callback on adapter {}", name)
    });
    if result.is_err() {
        trampoline.leak();
    }
    result
}

/// A channel to a CANUSB adapter, created with [`Interface::open`] or [`Interface::open_any`].
///
/// All operations go through one lock, so a channel can be shared by
/// reference between threads, e.g. a status poller and a reader. Once
/// [`Channel::close`] returned, every operation fails with [`Error::NotOpen`].
/// A channel that is dropped while open is closed.
pub struct Channel<'a> {
    interface: &'a Interface,
    adapter_id: Option<String>,
    state: Mutex<State>,
}

impl<'a> Channel<'a> {
    pub(crate) fn open(
        interface: &'a Interface,
        adapter_id: Option<&str>,
        config: &ChannelConfig,
    ) -> Result<Channel<'a>> {
        let id = adapter_id.map(CString::new).transpose()?;
        let handle = interface.driver().open(
            id.as_deref(),
            config.bitrate.as_cstr(),
            config.filter.code,
            config.filter.mask,
            config.flags.bits(),
        );
        let name = adapter_id.unwrap_or("<first found>");
        if handle <= 0 {
            return Err(Error::from_code(
                handle as i32,
                format!("Can't open channel to adapter {}", name),
            ));
        }
        debug!(
            "opened channel {} to adapter {} at {} kbps (code {:#010x}, mask {:#010x}, flags {:?})",
            handle, name, config.bitrate, config.filter.code, config.filter.mask, config.flags
        );
        interface.register(adapter_id, config);

        Ok(Channel {
            interface,
            adapter_id: adapter_id.map(str::to_string),
            state: Mutex::new(State {
                handle: Some(handle),
                callback: None,
            }),
        })
    }

    /// Driver id of the adapter, `None` if the channel was opened with [`Interface::open_any`].
    pub fn adapter_id(&self) -> Option<&str> {
        self.adapter_id.as_deref()
    }

    fn name(&self) -> &str {
        self.adapter_id.as_deref().unwrap_or("<first found>")
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, state: &State) -> Result<Handle> {
        state
            .handle
            .ok_or_else(|| Error::NotOpen(format!("adapter {}", self.name())))
    }

    pub fn is_open(&self) -> bool {
        self.lock().handle.is_some()
    }

    /// Closes this channel. Closing the last channel of an adapter ends the
    /// physical connection. A registered receive callback is removed first.
    ///
    /// The channel is closed even if removing the callback fails; that error
    /// is returned.
    pub fn close(&self) -> Result<()> {
        let mut state = self.lock();
        let handle = self.handle(&state)?;
        state.handle = None;
        let driver = self.interface.driver();
        let deregistered = deregister(driver, handle, state.callback.take(), self.name());
        let rc = driver.close(handle);
        self.interface.release(self.adapter_id.as_deref());
        debug!("closed channel {} to adapter {}", handle, self.name());
        deregistered?;
        check(rc, || {
            format!("Error while closing channel to adapter {}", self.name())
        })
    }

    /// Reads the adapter status.
    ///
    /// Querying the status often degrades the adapter's performance; poll it
    /// at most about once every ten seconds. A `Timeout` error means the
    /// adapter did not answer in time and the call may be repeated.
    pub fn status(&self) -> Result<Status> {
        let state = self.lock();
        let handle = self.handle(&state)?;
        let rc = self.interface.driver().status(handle);
        if rc < 0 {
            return Err(Error::from_code(
                rc,
                format!("Can't get status from adapter {}", self.name()),
            ));
        }
        Ok(Status::from_bits(rc as u32))
    }

    /// Reads hardware, firmware and driver version.
    pub fn version_info(&self) -> Result<VersionInfo> {
        let state = self.lock();
        let handle = self.handle(&state)?;
        let mut buf = [0u8; VERSION_INFO_LEN];
        check(self.interface.driver().version_info(handle, &mut buf), || {
            format!("Can't get version info from adapter {}", self.name())
        })?;
        Ok(VersionInfo::new(buffer_str(&buf)?))
    }

    /// Reads the next queued frame, `None` if the queue is empty.
    ///
    /// The driver refuses reads while a receive callback is registered and
    /// reports a general error.
    pub fn read(&self) -> Result<Option<Frame>> {
        let state = self.lock();
        let handle = self.handle(&state)?;
        let mut msg = CanMsg::default();
        let rc = self.interface.driver().read(handle, &mut msg);
        if rc > 0 {
            return Ok(Some(Frame::from(msg)));
        }
        match ErrorKind::from_code(rc) {
            ErrorKind::NoMessage => Ok(None),
            _ if rc == 0 => Ok(None),
            _ => Err(Error::from_code(
                rc,
                format!("Can't read from adapter {}", self.name()),
            )),
        }
    }

    pub fn write(&self, frame: &Frame) -> Result<()> {
        let state = self.lock();
        let handle = self.handle(&state)?;
        let msg = CanMsg::from(frame);
        check(self.interface.driver().write(handle, &msg), || {
            format!("Can't write to adapter {}", self.name())
        })
    }

    /// Registers `callback` to be called for every received frame, replacing
    /// any previous one.
    ///
    /// The callback runs on the driver's thread. It must return quickly and
    /// must not call back into this channel; hand frames off instead.
    pub fn set_receive_callback<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(Frame) + Send + Sync + 'static,
    {
        let mut state = self.lock();
        let handle = self.handle(&state)?;
        let trampoline = Trampoline::new(Arc::new(callback))?;
        check(
            self.interface
                .driver()
                .set_receive_callback(handle, Some(trampoline.raw())),
            || format!("Can't set receive callback on adapter {}", self.name()),
        )?;
        // The previous trampoline, if any, is released only now that the driver switched over.
        state.callback = Some(trampoline);
        Ok(())
    }

    /// Removes the receive callback so frames can be read with [`Channel::read`] again.
    pub fn clear_receive_callback(&self) -> Result<()> {
        let mut state = self.lock();
        let handle = self.handle(&state)?;
        check(
            self.interface.driver().set_receive_callback(handle, None),
            || format!("Can't reset receive callback on adapter {}", self.name()),
        )?;
        state.callback = None;
        Ok(())
    }

    pub fn is_receive_callback_set(&self) -> bool {
        self.lock().callback.is_some()
    }
}

impl Drop for Channel<'_> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        let Some(handle) = state.handle.take() else {
            return;
        };
        let driver = self.interface.driver();
        let name = self.adapter_id.as_deref().unwrap_or("<first found>");
        if let Err(err) = deregister(driver, handle, state.callback.take(), name) {
            warn!("{}", err);
        }
        if let Err(err) = check(driver.close(handle), || {
            format!("Error while closing channel to adapter {}", name)
        }) {
            warn!("{}", err);
        }
        self.interface.release(self.adapter_id.as_deref());
    }
}

impl fmt::Debug for Channel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("adapter_id", &self.adapter_id)
            .field("open", &self.is_open())
            .field("receive_callback", &self.is_receive_callback_set())
            .finish()
    }
}
