//! Receive callback trampolines.
//!
//! `canusb_setReceiveCallBack` takes a bare function pointer with no user
//! data, so each registered closure is parked in one of a fixed number of
//! static slots and the driver is handed the trampoline bound to that slot.
//! The slot stays claimed for as long as the owning [`Trampoline`] lives.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use crate::driver::RawCallback;
use crate::frame::{CanMsg, Frame};
use crate::{Error, Result};

pub(crate) type Callback = Arc<dyn Fn(Frame) + Send + Sync>;

/// Maximum number of receive callbacks registered at the same time.
pub const SLOT_COUNT: usize = 16;

static SLOTS: [Mutex<Option<Callback>>; SLOT_COUNT] = [const { Mutex::new(None) }; SLOT_COUNT];

fn dispatch(slot: usize, msg: *const CanMsg) {
    if msg.is_null() {
        return;
    }
    // The driver owns `msg` only for the duration of the call, so copy it out.
    let frame = Frame::from(unsafe { *msg });
    let callback = SLOTS[slot]
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    if let Some(callback) = callback {
        if catch_unwind(AssertUnwindSafe(|| callback(frame))).is_err() {
            log::error!("receive callback in slot {} panicked", slot);
        }
    }
}

macro_rules! trampolines {
    ($($slot:literal),* $(,)?) => {
        const TRAMPOLINES: [RawCallback; SLOT_COUNT] = [$({
            unsafe extern "system" fn trampoline(msg: *const CanMsg) {
                dispatch($slot, msg)
            }
            trampoline
        }),*];
    };
}

trampolines!(0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15);

/// A claimed callback slot. Dropping it releases the slot; frames the driver
/// still delivers through the old trampoline afterwards are discarded.
pub(crate) struct Trampoline {
    slot: usize,
}

impl Trampoline {
    pub(crate) fn new(callback: Callback) -> Result<Trampoline> {
        let mut callback = Some(callback);
        for (slot, cell) in SLOTS.iter().enumerate() {
            let mut cell = cell.lock().unwrap_or_else(PoisonError::into_inner);
            if cell.is_none() {
                *cell = callback.take();
                return Ok(Trampoline { slot });
            }
        }
        Err(Error::CallbackSlotsExhausted(SLOT_COUNT))
    }

    pub(crate) fn raw(&self) -> RawCallback {
        TRAMPOLINES[self.slot]
    }

    /// Keeps the slot claimed for the rest of the process. Used when the
    /// driver may still call the trampoline, so the slot must never be
    /// handed to another callback.
    pub(crate) fn leak(self) {
        log::warn!(
            "receive callback slot {} stays claimed, the driver may still use it",
            self.slot
        );
        std::mem::forget(self);
    }
}

impl Drop for Trampoline {
    fn drop(&mut self) {
        SLOTS[self.slot]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
