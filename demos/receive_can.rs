use std::sync::mpsc;
use std::time::Duration;

use canusb::{Bitrate, ChannelConfig, Interface, LibraryDriver};

fn main() -> canusb::Result<()> {
    let interface = Interface::new(LibraryDriver::default_path())?;

    // Open any connected adapter at 500 kbit/s
    let channel = interface.open_any(&ChannelConfig::new(Bitrate::Kbps500))?;
    println!("{}", channel.version_info()?);
    println!("Status: {}", channel.status()?);

    // Let the driver hand frames over as they arrive
    let (tx, rx) = mpsc::channel();
    channel.set_receive_callback(move |frame| {
        let _ = tx.send(frame);
    })?;

    // Print whatever arrives within a second
    while let Ok(frame) = rx.recv_timeout(Duration::from_secs(1)) {
        println!("{:X}: {:X?}", frame.id(), frame.data());
    }

    channel.clear_receive_callback()?;
    channel.close()
}
