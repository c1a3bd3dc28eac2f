//! Client for LAWICEL CANUSB adapters.
//!
//! The CANUSB driver library exposes adapters as channels opened by id. This
//! crate loads that library, enumerates attached adapters by serial number,
//! opens channels, and exchanges CAN frames either by polling [`Channel::read`]
//! or through a receive callback.
//!
//! # Example
//! ```no_run
//! use canusb::{Bitrate, ChannelConfig, Frame, Interface};
//!
//! fn main() -> canusb::Result<()> {
//!     let interface = Interface::new(canusb::driver::LibraryDriver::default_path())?;
//!     let adapter = match interface.adapters(Bitrate::Kbps500).next() {
//!         Some(adapter) => adapter?,
//!         None => return Ok(()),
//!     };
//!     let channel = interface.open(&adapter, &ChannelConfig::new(Bitrate::Kbps500))?;
//!     channel.write(&Frame::new(0x7DF, &[0x02, 0x01, 0x00])?)?;
//!     while let Some(frame) = channel.read()? {
//!         println!("{}", frame);
//!     }
//!     channel.close()
//! }
//! ```

#[macro_use]
extern crate bitflags;

use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::warn;

pub mod adapter;
mod callback;
pub mod channel;
pub mod config;
pub mod driver;
pub mod error;
pub mod frame;
pub mod monitor;
pub mod status;

pub use adapter::{Adapter, Adapters};
pub use callback::SLOT_COUNT;
pub use channel::{Channel, VersionInfo};
pub use config::{AcceptanceFilter, Bitrate, ChannelConfig, ChannelFlags, ParseBitrateError};
pub use driver::{Driver, LibraryDriver};
pub use error::{Error, ErrorKind, Result};
pub use frame::{CanMsg, Frame};
pub use monitor::{Event, MonitorConfig, ReceiveMode};
pub use status::{Status, StatusFlags};

/// Settings of the first channel this interface opened on an adapter.
struct Opened {
    count: usize,
    config: ChannelConfig,
}

/// Entry point: a CANUSB driver plus the channels opened through it.
pub struct Interface {
    driver: Box<dyn Driver>,
    opened: Mutex<HashMap<String, Opened>>,
}

impl Interface {
    /// Loads the CANUSB driver library from `path`
    ///
    /// # Example
    /// ```no_run
    /// use canusb::Interface;
    /// let interface = Interface::new("C:\\Windows\\System32\\canusbdrv.dll").unwrap();
    /// ```
    pub fn new<S: AsRef<OsStr>>(path: S) -> Result<Interface> {
        Ok(Interface::with_driver(LibraryDriver::load(path)?))
    }

    /// Uses `driver` instead of the vendor library.
    pub fn with_driver<D: Driver + 'static>(driver: D) -> Interface {
        Interface {
            driver: Box::new(driver),
            opened: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    /// Iterates over the attached adapters. `bitrate` is used for the short
    /// lived channel opened to read each adapter's serial number.
    pub fn adapters(&self, bitrate: Bitrate) -> Adapters<'_> {
        Adapters::new(self, bitrate)
    }

    /// Opens a channel to `adapter`.
    ///
    /// Several channels may be opened to the same adapter; each one is a
    /// virtual channel on the same physical connection, and the last close
    /// ends that connection. Bit rate, filter and flags only take effect on
    /// the first open of the adapter and are ignored by the driver afterwards.
    pub fn open(&self, adapter: &Adapter, config: &ChannelConfig) -> Result<Channel<'_>> {
        Channel::open(self, Some(adapter.id()), config)
    }

    /// Opens a channel to the first adapter the driver finds.
    pub fn open_any(&self, config: &ChannelConfig) -> Result<Channel<'_>> {
        Channel::open(self, None, config)
    }

    /// Number of channels to `adapter` currently open through this interface.
    pub fn open_channels(&self, adapter: &Adapter) -> usize {
        self.opened()
            .get(adapter.id())
            .map_or(0, |opened| opened.count)
    }

    fn opened(&self) -> MutexGuard<'_, HashMap<String, Opened>> {
        self.opened.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn register(&self, adapter_id: Option<&str>, config: &ChannelConfig) {
        let Some(id) = adapter_id else {
            return;
        };
        let mut opened = self.opened();
        match opened.get_mut(id) {
            Some(first) => {
                let differs =
                    first.config.filter != config.filter || first.config.flags != config.flags;
                if differs && !config.has_default_filter_and_flags() {
                    warn!(
                        "adapter {} already has {} open channel(s): filter {:#010x}/{:#010x} and flags {:?} are ignored, {:#010x}/{:#010x} and {:?} stay in effect",
                        id,
                        first.count,
                        config.filter.code,
                        config.filter.mask,
                        config.flags,
                        first.config.filter.code,
                        first.config.filter.mask,
                        first.config.flags
                    );
                }
                first.count += 1;
            }
            None => {
                opened.insert(
                    id.to_string(),
                    Opened {
                        count: 1,
                        config: *config,
                    },
                );
            }
        }
    }

    pub(crate) fn release(&self, adapter_id: Option<&str>) {
        let Some(id) = adapter_id else {
            return;
        };
        let mut opened = self.opened();
        if let Some(entry) = opened.get_mut(id) {
            entry.count -= 1;
            if entry.count == 0 {
                opened.remove(id);
            }
        }
    }
}
