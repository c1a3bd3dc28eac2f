mod common;

use std::sync::mpsc;
use std::time::Duration;

use canusb::{Bitrate, CanMsg, ChannelConfig, ChannelFlags, Error, ErrorKind, Frame, Interface};
use common::{Call, MockDriver};

fn interface(driver: &MockDriver) -> Interface {
    Interface::with_driver(driver.clone())
}

#[test]
fn failed_open_raises_mapped_error() {
    let driver = MockDriver::with_adapters(&[("A", "0001")]);
    driver.fail_open(-9);
    let interface = interface(&driver);

    let err = interface
        .open_any(&ChannelConfig::default())
        .expect_err("open should fail");
    assert_eq!(err.kind(), Some(ErrorKind::NoDevice));
    assert_eq!(err.code(), Some(-9));
    assert_eq!(driver.open_handles(), 0);
    assert_eq!(driver.calls(), vec![Call::Open(None)]);
}

#[test]
fn zero_handle_is_a_general_error() {
    let driver = MockDriver::with_adapters(&[("A", "0001")]);
    driver.fail_open(0);
    let interface = interface(&driver);

    let err = interface.open_any(&ChannelConfig::default()).unwrap_err();
    assert!(err.kind().unwrap().is_general());
    assert_eq!(err.code(), Some(0));
}

#[test]
fn operations_after_close_fail_with_not_open() {
    let driver = MockDriver::with_adapters(&[("A", "0001")]);
    let interface = interface(&driver);
    let channel = interface.open_any(&ChannelConfig::default()).unwrap();
    assert!(channel.is_open());
    channel.close().unwrap();
    assert!(!channel.is_open());

    let frame = Frame::new(0x100, &[1]).unwrap();
    let not_open = |result: Result<(), Error>| {
        let err = result.expect_err("channel is closed");
        assert_eq!(err.kind(), Some(ErrorKind::NotOpen));
    };
    not_open(channel.status().map(drop));
    not_open(channel.version_info().map(drop));
    not_open(channel.read().map(drop));
    not_open(channel.write(&frame));
    not_open(channel.set_receive_callback(|_| {}));
    not_open(channel.clear_receive_callback());
    not_open(channel.close());

    // Exactly one close reached the driver.
    let closes = driver
        .calls()
        .iter()
        .filter(|call| matches!(call, Call::Close(_)))
        .count();
    assert_eq!(closes, 1);
}

#[test]
fn read_write_and_status() {
    let driver = MockDriver::with_adapters(&[("A", "0001")]);
    driver.set_status(0x81);
    let interface = interface(&driver);
    let channel = interface.open_any(&ChannelConfig::default()).unwrap();

    let incoming = Frame::new_extended(0x18FEF100, &[1, 2, 3])
        .unwrap()
        .with_timestamp(1234);
    driver.push_rx(&incoming);
    assert_eq!(channel.read().unwrap(), Some(incoming));
    assert_eq!(channel.read().unwrap(), None);

    let outgoing = Frame::new(0x7DF, &[0x02, 0x01, 0x00]).unwrap();
    channel.write(&outgoing).unwrap();
    assert_eq!(driver.written(), vec![outgoing]);

    let status = channel.status().unwrap();
    assert!(status.is_receive_fifo_full());
    assert!(status.is_bus_error());

    let version = channel.version_info().unwrap();
    assert_eq!(version.serial_number(), Some("0001"));
    assert_eq!(version.driver_version(), Some("1.0.4"));
}

#[test]
fn negative_status_is_an_error() {
    let driver = MockDriver::with_adapters(&[("A", "0001")]);
    driver.set_status(-10);
    let interface = interface(&driver);
    let channel = interface.open_any(&ChannelConfig::default()).unwrap();

    let err = channel.status().unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Timeout));
}

#[test]
fn receive_callback_toggles() {
    let driver = MockDriver::with_adapters(&[("A", "0001")]);
    let interface = interface(&driver);
    let channel = interface.open_any(&ChannelConfig::default()).unwrap();

    assert!(!channel.is_receive_callback_set());
    channel.set_receive_callback(|_| {}).unwrap();
    assert!(channel.is_receive_callback_set());
    assert!(driver.has_callback());

    // The driver refuses polling while a callback is registered.
    let err = channel.read().unwrap_err();
    assert!(err.kind().unwrap().is_general());

    channel.clear_receive_callback().unwrap();
    assert!(!channel.is_receive_callback_set());
    assert!(!driver.has_callback());
    assert_eq!(channel.read().unwrap(), None);
}

#[test]
fn callback_receives_frames_from_driver_thread() {
    let driver = MockDriver::with_adapters(&[("A", "0001")]);
    let interface = interface(&driver);
    let channel = interface.open_any(&ChannelConfig::default()).unwrap();

    let (tx, rx) = mpsc::channel();
    channel
        .set_receive_callback(move |frame| {
            tx.send(frame).unwrap();
        })
        .unwrap();

    let first = Frame::new(0x123, &[0xAA]).unwrap();
    let second = Frame::new_remote(0x124, 4).unwrap();
    driver.deliver(&first);
    driver.deliver(&second);

    let timeout = Duration::from_secs(1);
    assert_eq!(rx.recv_timeout(timeout).unwrap(), first);
    assert_eq!(rx.recv_timeout(timeout).unwrap(), second);
}

#[test]
fn replacing_callback_redirects_frames() {
    let driver = MockDriver::with_adapters(&[("A", "0001")]);
    let interface = interface(&driver);
    let channel = interface.open_any(&ChannelConfig::default()).unwrap();

    let (old_tx, old_rx) = mpsc::channel();
    let (new_tx, new_rx) = mpsc::channel();
    channel
        .set_receive_callback(move |frame| old_tx.send(frame).unwrap())
        .unwrap();
    channel
        .set_receive_callback(move |frame| new_tx.send(frame).unwrap())
        .unwrap();

    let frame = Frame::new(0x10, &[]).unwrap();
    driver.deliver(&frame);
    assert_eq!(new_rx.recv_timeout(Duration::from_secs(1)).unwrap(), frame);
    assert!(old_rx.try_recv().is_err());
}

#[test]
fn drop_clears_callback_and_closes() {
    let driver = MockDriver::with_adapters(&[("A", "0001")]);
    let interface = interface(&driver);
    {
        let channel = interface.open_any(&ChannelConfig::default()).unwrap();
        channel.set_receive_callback(|_| {}).unwrap();
    }
    assert_eq!(driver.open_handles(), 0);
    let calls = driver.calls();
    assert_eq!(
        &calls[calls.len() - 2..],
        &[Call::SetReceiveCallback(1, false), Call::Close(1)]
    );
}

#[test]
fn close_removes_callback_before_closing() {
    let driver = MockDriver::with_adapters(&[("A", "0001")]);
    let interface = interface(&driver);
    let channel = interface.open_any(&ChannelConfig::default()).unwrap();
    channel.set_receive_callback(|_| {}).unwrap();

    channel.close().unwrap();
    assert!(!channel.is_receive_callback_set());
    assert_eq!(driver.open_handles(), 0);
    let calls = driver.calls();
    assert_eq!(
        &calls[calls.len() - 2..],
        &[Call::SetReceiveCallback(1, false), Call::Close(1)]
    );
}

#[test]
fn close_still_closes_when_callback_reset_is_refused() {
    let driver = MockDriver::with_adapters(&[("A", "0001")]);
    let interface = interface(&driver);
    let channel = interface.open_any(&ChannelConfig::default()).unwrap();
    channel.set_receive_callback(|_| {}).unwrap();
    driver.refuse_deregister();

    let err = channel.close().unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::General));
    assert!(!channel.is_open());
    assert_eq!(driver.open_handles(), 0);
    assert_eq!(
        channel.close().unwrap_err().kind(),
        Some(ErrorKind::NotOpen)
    );
}

#[test]
fn refused_callback_reset_keeps_frames_away_from_other_channels() {
    let driver = MockDriver::with_adapters(&[("A", "0001")]);
    let interface = interface(&driver);

    let (a_tx, a_rx) = mpsc::channel();
    let first = interface.open_any(&ChannelConfig::default()).unwrap();
    first
        .set_receive_callback(move |frame| a_tx.send(frame).unwrap())
        .unwrap();
    driver.refuse_deregister();
    drop(first);

    let (b_tx, b_rx) = mpsc::channel();
    let second = interface.open_any(&ChannelConfig::default()).unwrap();
    second
        .set_receive_callback(move |frame| b_tx.send(frame).unwrap())
        .unwrap();

    let registered = driver.registered_callbacks();
    assert_eq!(registered.len(), 2);
    assert_ne!(registered[0] as usize, registered[1] as usize);

    // The driver still holds the first channel's trampoline.
    let frame = Frame::new(0xAA, &[1]).unwrap();
    unsafe { (registered[0])(&CanMsg::from(&frame)) };
    assert_eq!(a_rx.recv_timeout(Duration::from_secs(1)).unwrap(), frame);
    assert!(b_rx.try_recv().is_err());
}

#[test]
fn virtual_channels_are_counted_per_adapter() {
    let driver = MockDriver::with_adapters(&[("A", "0001")]);
    let interface = interface(&driver);
    let adapter = interface
        .adapters(Bitrate::Kbps500)
        .next()
        .unwrap()
        .unwrap();

    let config = ChannelConfig::new(Bitrate::Kbps500);
    let first = interface.open(&adapter, &config).unwrap();
    let second = interface
        .open(&adapter, &config.flags(ChannelFlags::TIMESTAMP | ChannelFlags::BLOCK))
        .unwrap();
    assert_eq!(interface.open_channels(&adapter), 2);

    first.close().unwrap();
    assert_eq!(interface.open_channels(&adapter), 1);
    drop(second);
    assert_eq!(interface.open_channels(&adapter), 0);
    assert_eq!(driver.open_handles(), 0);
}
