//! Receives frames from a channel while watching the adapter status.
//!
//! [`run`] owns the channel for the whole session. A `status-poller` thread
//! queries the adapter status at a slow interval and, in [`ReceiveMode::Loop`],
//! drains the receive queue. In [`ReceiveMode::Callback`] the driver delivers
//! frames itself and the registered closure only forwards them. Everything is
//! handed to the caller on the calling thread as [`Event`]s.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, warn};

use crate::channel::Channel;
use crate::frame::Frame;
use crate::status::Status;
use crate::{Error, Result};

const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// How frames get from the adapter to the caller.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ReceiveMode {
    /// Poll [`Channel::read`] until the queue is empty.
    Loop,
    /// Let the driver call back on its own thread for every frame.
    #[default]
    Callback,
}

impl ReceiveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiveMode::Loop => "loop",
            ReceiveMode::Callback => "callback",
        }
    }
}

impl fmt::Display for ReceiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown receive mode {0:?}, expected `loop` or `callback`")]
pub struct ParseModeError(String);

impl FromStr for ReceiveMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> std::result::Result<ReceiveMode, ParseModeError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "loop" => Ok(ReceiveMode::Loop),
            "callback" => Ok(ReceiveMode::Callback),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MonitorConfig {
    pub mode: ReceiveMode,
    /// Time between status queries. Querying often slows the adapter down.
    pub status_interval: Duration,
    /// Time between two drains of the receive queue in loop mode.
    pub poll_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> MonitorConfig {
        MonitorConfig {
            mode: ReceiveMode::default(),
            status_interval: Duration::from_secs(10),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl MonitorConfig {
    pub fn mode(mut self, mode: ReceiveMode) -> MonitorConfig {
        self.mode = mode;
        self
    }

    pub fn status_interval(mut self, interval: Duration) -> MonitorConfig {
        self.status_interval = interval;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> MonitorConfig {
        self.poll_interval = interval;
        self
    }
}

#[derive(Debug)]
pub enum Event {
    Frame(Frame),
    Status(Status),
    /// A status query failed. Polling goes on.
    StatusFailed(Error),
}

fn poll(
    channel: &Channel<'_>,
    config: &MonitorConfig,
    halt: &AtomicBool,
    events: Sender<Event>,
) {
    let mut next_status = Instant::now();
    loop {
        if Instant::now() >= next_status {
            let event = match channel.status() {
                Ok(status) => Event::Status(status),
                Err(err) => {
                    warn!("status check failed: {}", err);
                    Event::StatusFailed(err)
                }
            };
            let _ = events.send(event);
            next_status = Instant::now() + config.status_interval;
        }

        if config.mode == ReceiveMode::Loop {
            loop {
                match channel.read() {
                    Ok(Some(frame)) => {
                        let _ = events.send(Event::Frame(frame));
                    }
                    Ok(None) => break,
                    Err(err) => {
                        error!("{}", err);
                        break;
                    }
                }
            }
        }

        if halt.load(Ordering::Acquire) {
            break;
        }
        let until_status = next_status.saturating_duration_since(Instant::now());
        thread::sleep(config.poll_interval.min(until_status));
    }
}

/// Runs a receive session on `channel` until `stop` is raised.
///
/// Events are passed to `on_event` on the calling thread. On the way out the
/// poller is stopped and joined first, then the receive callback is removed
/// and finally the channel is closed.
pub fn run<F>(
    channel: Channel<'_>,
    config: &MonitorConfig,
    stop: &AtomicBool,
    mut on_event: F,
) -> Result<()>
where
    F: FnMut(Event),
{
    let (tx, rx) = mpsc::channel();

    if config.mode == ReceiveMode::Callback {
        let frames = tx.clone();
        channel.set_receive_callback(move |frame| {
            let _ = frames.send(Event::Frame(frame));
        })?;
    }

    let halt = AtomicBool::new(false);
    thread::scope(|scope| -> Result<()> {
        let poller = thread::Builder::new()
            .name("status-poller".to_string())
            .spawn_scoped(scope, || poll(&channel, config, &halt, tx))?;
        debug!("monitoring in {} mode", config.mode);

        while !stop.load(Ordering::Acquire) {
            match rx.recv_timeout(STOP_CHECK_INTERVAL) {
                Ok(event) => on_event(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        halt.store(true, Ordering::Release);
        if poller.join().is_err() {
            error!("status poller panicked");
        }
        Ok(())
    })?;

    if channel.is_receive_callback_set() {
        channel.clear_receive_callback()?;
    }
    channel.close()?;

    // Whatever arrived while shutting down.
    for event in rx.try_iter() {
        on_event(event);
    }
    Ok(())
}
