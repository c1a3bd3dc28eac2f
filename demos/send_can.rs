use canusb::{Bitrate, ChannelConfig, ErrorKind, Frame, Interface, LibraryDriver};

fn main() -> canusb::Result<()> {
    let interface = Interface::new(LibraryDriver::default_path())?;

    // Use the first adapter found
    let adapter = match interface.adapters(Bitrate::Kbps500).next() {
        Some(adapter) => adapter?,
        None => {
            println!("No CANUSB adapters found");
            return Ok(());
        }
    };
    println!("Opening {}", adapter);

    let channel = interface.open(&adapter, &ChannelConfig::new(Bitrate::Kbps500))?;
    println!("{}", channel.version_info()?);

    let frame = Frame::new(0x008, &[0, 1, 2, 3])?;
    // Retry while the transmit FIFO is full
    loop {
        match channel.write(&frame) {
            Err(err) if err.kind() == Some(ErrorKind::TransmitFifoFull) => continue,
            result => break result?,
        }
    }

    channel.close()
}
