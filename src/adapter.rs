use std::fmt;
use std::iter::FusedIterator;

use log::debug;

use crate::channel::Channel;
use crate::config::{Bitrate, ChannelConfig};
use crate::driver::{buffer_str, ADAPTER_ID_LEN};
use crate::error::check;
use crate::{Error, Interface, Result};

/// An attached CANUSB adapter, found with [`Interface::adapters`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Adapter {
    serial_number: String,
    id: String,
}

impl Adapter {
    /// Serial number printed on the adapter. Stable across runs, unlike the driver id.
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    /// Id the driver uses to address this adapter.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CANUSB #{}", self.serial_number)
    }
}

enum Position {
    NotStarted,
    Positioned { id: String, remaining: usize },
    Exhausted,
}

/// Iterator over the attached adapters.
///
/// Each adapter is resolved when it is reached: a channel is opened to it,
/// its version info read for the serial number, and the channel closed
/// again. Enumeration goes through the driver's global adapter cursor, so it
/// is forward only and two enumerations must not run at the same time.
pub struct Adapters<'a> {
    interface: &'a Interface,
    config: ChannelConfig,
    position: Position,
}

impl<'a> Adapters<'a> {
    pub(crate) fn new(interface: &'a Interface, bitrate: Bitrate) -> Adapters<'a> {
        Adapters {
            interface,
            config: ChannelConfig::new(bitrate),
            position: Position::NotStarted,
        }
    }

    /// True once every adapter was visited, or after an error.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.position, Position::Exhausted)
    }

    /// Finds the adapter with `serial_number`.
    ///
    /// The whole remaining sequence is consumed even after a match so the
    /// driver's cursor ends in the same place whatever is searched for. If
    /// several adapters report the same serial number the first one wins.
    pub fn find(&mut self, serial_number: &str) -> Result<Adapter> {
        let mut found = None;
        for adapter in self.by_ref() {
            let adapter = adapter?;
            if found.is_none() && adapter.serial_number == serial_number {
                found = Some(adapter);
            }
        }
        found.ok_or_else(|| Error::AdapterNotFound(serial_number.to_string()))
    }

    fn first(&self) -> Result<Option<(String, usize)>> {
        let mut buf = [0u8; ADAPTER_ID_LEN];
        let count = self.interface.driver().get_first_adapter(&mut buf);
        if count <= 0 {
            debug!("no CANUSB adapters attached ({})", count);
            return Ok(None);
        }
        Ok(Some((buffer_str(&buf)?.to_string(), count as usize)))
    }

    fn next_id(&self) -> Result<String> {
        let mut buf = [0u8; ADAPTER_ID_LEN];
        check(self.interface.driver().get_next_adapter(&mut buf), || {
            "Error while listing CANUSB adapters".to_string()
        })?;
        Ok(buffer_str(&buf)?.to_string())
    }

    fn resolve(&self, id: &str) -> Result<Adapter> {
        let channel = Channel::open(self.interface, Some(id), &self.config)?;
        let version = channel.version_info();
        let closed = channel.close();
        let version = version?;
        closed?;
        let serial_number = version
            .serial_number()
            .ok_or_else(|| Error::MalformedVersionInfo(version.as_str().to_string()))?
            .to_string();
        debug!("adapter {} has serial number {}", id, serial_number);
        Ok(Adapter {
            serial_number,
            id: id.to_string(),
        })
    }

    fn step(&mut self) -> Result<Option<Adapter>> {
        if let Position::NotStarted = self.position {
            self.position = match self.first()? {
                Some((id, remaining)) => Position::Positioned { id, remaining },
                None => Position::Exhausted,
            };
        }
        let (id, remaining) = match &self.position {
            Position::Positioned { id, remaining } => (id.clone(), *remaining),
            _ => return Ok(None),
        };
        let adapter = self.resolve(&id)?;
        self.position = if remaining > 1 {
            Position::Positioned {
                id: self.next_id()?,
                remaining: remaining - 1,
            }
        } else {
            Position::Exhausted
        };
        Ok(Some(adapter))
    }
}

impl Iterator for Adapters<'_> {
    type Item = Result<Adapter>;

    fn next(&mut self) -> Option<Result<Adapter>> {
        match self.step() {
            Ok(adapter) => adapter.map(Ok),
            Err(err) => {
                self.position = Position::Exhausted;
                Some(Err(err))
            }
        }
    }
}

impl FusedIterator for Adapters<'_> {}
