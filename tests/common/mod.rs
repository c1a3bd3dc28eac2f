#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::ffi::CStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use canusb::driver::{
    Driver, Handle, RawCallback, ERROR_CANUSB_GENERAL, ERROR_CANUSB_INVALID_PARAM,
    ERROR_CANUSB_NOT_OPEN, ERROR_CANUSB_NO_DEVICE, ERROR_CANUSB_NO_MESSAGE, ERROR_CANUSB_OK,
};
use canusb::{CanMsg, Frame};

/// Driver calls as the mock saw them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    GetFirstAdapter,
    GetNextAdapter,
    Open(Option<String>),
    Close(Handle),
    Status(Handle),
    VersionInfo(Handle),
    Read(Handle),
    Write(Handle),
    SetReceiveCallback(Handle, bool),
}

#[derive(Default)]
struct MockState {
    /// (driver id, serial number)
    adapters: Vec<(String, String)>,
    cursor: usize,
    open_result: Option<Handle>,
    next_handle: Handle,
    open: HashMap<Handle, Option<String>>,
    calls: Vec<Call>,
    rx: VecDeque<CanMsg>,
    written: Vec<CanMsg>,
    callbacks: HashMap<Handle, RawCallback>,
    registered: Vec<RawCallback>,
    refuse_deregister: bool,
    status: i32,
}

/// Scripted stand-in for the vendor library. Clones share their state, so a
/// test keeps one clone while the `Interface` owns another.
#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

fn write_str(buf: &mut [u8], text: &str) {
    let len = text.len().min(buf.len() - 1);
    buf[..len].copy_from_slice(&text.as_bytes()[..len]);
    buf[len] = 0;
}

impl MockDriver {
    pub fn new() -> MockDriver {
        MockDriver::default()
    }

    /// A driver with adapters `ids[i]` reporting serial numbers `serials[i]`.
    pub fn with_adapters(adapters: &[(&str, &str)]) -> MockDriver {
        let driver = MockDriver::new();
        driver.lock().adapters = adapters
            .iter()
            .map(|(id, serial)| (id.to_string(), serial.to_string()))
            .collect();
        driver
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Makes every following open return `handle` instead of a fresh one.
    pub fn fail_open(&self, handle: Handle) {
        self.lock().open_result = Some(handle);
    }

    /// Makes resetting a receive callback fail; the driver keeps calling it.
    pub fn refuse_deregister(&self) {
        self.lock().refuse_deregister = true;
    }

    /// Every callback pointer the driver was handed, in order.
    pub fn registered_callbacks(&self) -> Vec<RawCallback> {
        self.lock().registered.clone()
    }

    pub fn set_status(&self, status: i32) {
        self.lock().status = status;
    }

    pub fn push_rx(&self, frame: &Frame) {
        self.lock().rx.push_back(CanMsg::from(frame));
    }

    pub fn written(&self) -> Vec<Frame> {
        self.lock().written.iter().copied().map(Frame::from).collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn open_handles(&self) -> usize {
        self.lock().open.len()
    }

    pub fn has_callback(&self) -> bool {
        !self.lock().callbacks.is_empty()
    }

    /// Delivers `frame` to every registered callback from a driver thread.
    pub fn deliver(&self, frame: &Frame) {
        let callbacks: Vec<RawCallback> = self.lock().callbacks.values().copied().collect();
        let msg = CanMsg::from(frame);
        thread::spawn(move || {
            for callback in callbacks {
                unsafe { callback(&msg) };
            }
        })
        .join()
        .unwrap();
    }

    fn serial_of(state: &MockState, handle: Handle) -> Option<String> {
        let id = state.open.get(&handle)?.clone();
        match id {
            Some(id) => state
                .adapters
                .iter()
                .find(|(adapter, _)| *adapter == id)
                .map(|(_, serial)| serial.clone()),
            None => state.adapters.first().map(|(_, serial)| serial.clone()),
        }
    }
}

impl Driver for MockDriver {
    fn get_first_adapter(&self, buf: &mut [u8]) -> i32 {
        let mut state = self.lock();
        state.calls.push(Call::GetFirstAdapter);
        let Some((id, _)) = state.adapters.first().cloned() else {
            return 0;
        };
        write_str(buf, &id);
        state.cursor = 1 % state.adapters.len();
        state.adapters.len() as i32
    }

    fn get_next_adapter(&self, buf: &mut [u8]) -> i32 {
        let mut state = self.lock();
        state.calls.push(Call::GetNextAdapter);
        if state.adapters.is_empty() {
            return ERROR_CANUSB_NO_DEVICE;
        }
        let id = state.adapters[state.cursor].0.clone();
        write_str(buf, &id);
        state.cursor = (state.cursor + 1) % state.adapters.len();
        ERROR_CANUSB_OK
    }

    fn open(
        &self,
        id: Option<&CStr>,
        _bitrate: &CStr,
        _acceptance_code: u32,
        _acceptance_mask: u32,
        _flags: u32,
    ) -> Handle {
        let mut state = self.lock();
        let id = id.map(|id| id.to_string_lossy().into_owned());
        state.calls.push(Call::Open(id.clone()));
        if let Some(handle) = state.open_result {
            return handle;
        }
        let known = match &id {
            Some(id) => state.adapters.iter().any(|(adapter, _)| adapter == id),
            None => !state.adapters.is_empty(),
        };
        if !known {
            return ERROR_CANUSB_NO_DEVICE as Handle;
        }
        state.next_handle += 1;
        let handle = state.next_handle;
        state.open.insert(handle, id);
        handle
    }

    fn close(&self, handle: Handle) -> i32 {
        let mut state = self.lock();
        state.calls.push(Call::Close(handle));
        state.callbacks.remove(&handle);
        match state.open.remove(&handle) {
            Some(_) => ERROR_CANUSB_OK,
            None => ERROR_CANUSB_NOT_OPEN,
        }
    }

    fn status(&self, handle: Handle) -> i32 {
        let mut state = self.lock();
        state.calls.push(Call::Status(handle));
        if !state.open.contains_key(&handle) {
            return ERROR_CANUSB_NOT_OPEN;
        }
        state.status
    }

    fn version_info(&self, handle: Handle, buf: &mut [u8]) -> i32 {
        let mut state = self.lock();
        state.calls.push(Call::VersionInfo(handle));
        match MockDriver::serial_of(&state, handle) {
            Some(serial) => {
                write_str(buf, &format!("V0101 - N{} - 1.0.4 - LAWICEL AB", serial));
                ERROR_CANUSB_OK
            }
            None => ERROR_CANUSB_INVALID_PARAM,
        }
    }

    fn read(&self, handle: Handle, msg: &mut CanMsg) -> i32 {
        let mut state = self.lock();
        state.calls.push(Call::Read(handle));
        if !state.open.contains_key(&handle) {
            return ERROR_CANUSB_NOT_OPEN;
        }
        if state.callbacks.contains_key(&handle) {
            return ERROR_CANUSB_GENERAL;
        }
        match state.rx.pop_front() {
            Some(received) => {
                *msg = received;
                ERROR_CANUSB_OK
            }
            None => ERROR_CANUSB_NO_MESSAGE,
        }
    }

    fn write(&self, handle: Handle, msg: &CanMsg) -> i32 {
        let mut state = self.lock();
        state.calls.push(Call::Write(handle));
        if !state.open.contains_key(&handle) {
            return ERROR_CANUSB_NOT_OPEN;
        }
        state.written.push(*msg);
        ERROR_CANUSB_OK
    }

    fn set_receive_callback(&self, handle: Handle, callback: Option<RawCallback>) -> i32 {
        let mut state = self.lock();
        state
            .calls
            .push(Call::SetReceiveCallback(handle, callback.is_some()));
        if !state.open.contains_key(&handle) {
            return ERROR_CANUSB_NOT_OPEN;
        }
        match callback {
            Some(callback) => {
                state.registered.push(callback);
                state.callbacks.insert(handle, callback);
            }
            None if state.refuse_deregister => return ERROR_CANUSB_GENERAL,
            None => {
                state.callbacks.remove(&handle);
            }
        }
        ERROR_CANUSB_OK
    }
}
