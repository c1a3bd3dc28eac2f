//! `canusb-logger`: prints the frames seen by a CANUSB adapter, or lists the
//! attached adapters with `--list`.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use canusb::monitor::{self, Event, MonitorConfig, ReceiveMode};
use canusb::{Adapter, Bitrate, ChannelConfig, Interface, LibraryDriver};
use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::Parser;
use log::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "canusb-logger", version, about = "CAN sniffer and logger for LAWICEL CANUSB adapters")]
struct Cli {
    /// Bus bit rate, e.g. `250`, `500kbps` or `1Mbps`.
    #[arg(long, value_name = "BITRATE", default_value_t = Bitrate::default())]
    bitrate: Bitrate,

    /// Receive frames by polling (`loop`) or through the driver callback.
    #[arg(long, value_name = "MODE", default_value_t = ReceiveMode::default())]
    mode: ReceiveMode,

    /// Serial number of the adapter to use. Defaults to the first one found.
    #[arg(long, value_name = "SERIAL")]
    sn: Option<String>,

    /// List the attached adapters and exit.
    #[arg(long)]
    list: bool,

    /// Path of the CANUSB driver library.
    #[arg(long, value_name = "PATH", env = "CANUSB_LIBRARY")]
    library: Option<PathBuf>,

    /// Seconds between two adapter status checks, at least 1.
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    status_interval: u64,
}

const LEGACY_OPTIONS: [&str; 3] = ["-bitrate", "-mode", "-sn"];

/// Options of [`Cli`] and whether they take a value.
const KNOWN_OPTIONS: [(&str, bool); 10] = [
    ("--bitrate", true),
    ("--mode", true),
    ("--sn", true),
    ("--list", false),
    ("--library", true),
    ("--status-interval", true),
    ("--help", false),
    ("-h", false),
    ("--version", false),
    ("-V", false),
];

/// Rewrites the single dash options of earlier versions to their long form.
fn normalize(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    args.into_iter()
        .map(|arg| {
            let Some(text) = arg.to_str() else {
                return arg;
            };
            for legacy in LEGACY_OPTIONS {
                if text == legacy || text.starts_with(&format!("{}=", legacy)) {
                    return OsString::from(format!("-{}", text));
                }
            }
            arg
        })
        .collect()
}

fn context_str(err: &clap::Error, kind: ContextKind) -> Option<&str> {
    match err.get(kind) {
        Some(ContextValue::String(value)) => Some(value.as_str()),
        _ => None,
    }
}

/// Removes the tokens `err` complains about. Returns false if none were found.
fn drop_offending(args: &mut Vec<OsString>, err: &clap::Error) -> bool {
    let Some(arg) = context_str(err, ContextKind::InvalidArg) else {
        return false;
    };
    // `--bitrate <BITRATE>` for value errors, the bare token otherwise.
    let flag = arg.split_whitespace().next().unwrap_or(arg);
    let value = context_str(err, ContextKind::InvalidValue);
    let with_value = format!("{}=", flag);

    let Some(pos) = args.iter().skip(1).position(|token| {
        token
            .to_str()
            .is_some_and(|token| token == flag || token.starts_with(&with_value))
    }) else {
        return false;
    };
    let pos = pos + 1;
    let removed = args.remove(pos);
    if removed.to_str() == Some(flag) {
        if let (Some(value), Some(next)) = (value, args.get(pos)) {
            if !value.is_empty() && next.to_str() == Some(value) {
                args.remove(pos);
            }
        }
    }
    true
}

/// Removes the first token that is neither a known option nor the value of
/// one. Clap reports `-verbose` as `-v`, which is not a token of its own.
fn drop_unknown(args: &mut Vec<OsString>) -> bool {
    let mut value_expected = false;
    let mut unknown = None;
    for (pos, token) in args.iter().enumerate().skip(1) {
        if value_expected {
            value_expected = false;
            continue;
        }
        let Some(token) = token.to_str().filter(|token| token.starts_with('-')) else {
            unknown = Some(pos);
            break;
        };
        let (name, inline_value) = match token.split_once('=') {
            Some((name, _)) => (name, true),
            None => (token, false),
        };
        match KNOWN_OPTIONS.iter().find(|(known, _)| *known == name) {
            Some((_, takes_value)) => value_expected = *takes_value && !inline_value,
            None => {
                unknown = Some(pos);
                break;
            }
        }
    }
    match unknown {
        Some(pos) => {
            args.remove(pos);
            true
        }
        None => false,
    }
}

/// Parses the command line, skipping over anything that does not parse.
fn parse_args(args: impl IntoIterator<Item = OsString>) -> Cli {
    let mut args = normalize(args);
    loop {
        match Cli::try_parse_from(&args) {
            Ok(cli) => return cli,
            Err(err) => match err.kind() {
                ErrorKind::DisplayHelp
                | ErrorKind::DisplayVersion
                | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => err.exit(),
                _ => {
                    let message = err.to_string();
                    let message = message.lines().next().unwrap_or_default();
                    if drop_offending(&mut args, &err) || drop_unknown(&mut args) {
                        warn!("{}; ignoring it", message.trim_start_matches("error: "));
                    } else {
                        warn!("{}; using defaults", message.trim_start_matches("error: "));
                        args.truncate(1);
                    }
                }
            },
        }
    }
}

fn open_interface(cli: &Cli) -> canusb::Result<Interface> {
    match &cli.library {
        Some(path) => Interface::new(path),
        None => Interface::new(LibraryDriver::default_path()),
    }
}

fn list(interface: &Interface, bitrate: Bitrate) -> canusb::Result<()> {
    let mut found = 0;
    for adapter in interface.adapters(bitrate) {
        let adapter = adapter?;
        let channel = interface.open(&adapter, &ChannelConfig::new(bitrate))?;
        println!("{} (id {})", adapter, adapter.id());
        println!("    version: {}", channel.version_info()?);
        println!("    status:  {}", channel.status()?);
        channel.close()?;
        found += 1;
    }
    if found == 0 {
        println!("no CANUSB adapters found");
    }
    Ok(())
}

/// The adapter with the serial number given by `--sn`, or the first one found.
fn select_adapter(interface: &Interface, cli: &Cli) -> canusb::Result<Adapter> {
    let mut adapters = interface.adapters(cli.bitrate);
    match &cli.sn {
        Some(serial) => adapters.find(serial),
        None => adapters.next().unwrap_or(Err(canusb::Error::NoAdapters)),
    }
}

fn log_event(event: Event) {
    match event {
        Event::Frame(frame) => println!("{}", frame),
        Event::Status(status) => info!("status: {}", status),
        // Already reported by the poller.
        Event::StatusFailed(_) => {}
    }
}

fn run(cli: Cli) -> canusb::Result<()> {
    let interface = open_interface(&cli)?;
    if cli.list {
        return list(&interface, cli.bitrate);
    }

    let adapter = select_adapter(&interface, &cli)?;
    info!("using {}", adapter);
    let channel = interface.open(&adapter, &ChannelConfig::new(cli.bitrate))?;
    info!("version info: {}", channel.version_info()?);

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    if let Err(err) = ctrlc::set_handler(move || handler_stop.store(true, Ordering::Release)) {
        warn!("can't install Ctrl-C handler: {}", err);
    }

    let monitor_config = MonitorConfig::default()
        .mode(cli.mode)
        .status_interval(Duration::from_secs(cli.status_interval));
    info!(
        "logging at {} kbps in {} mode, press Ctrl-C to stop",
        cli.bitrate, cli.mode
    );
    monitor::run(channel, &monitor_config, &stop, log_event)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = parse_args(std::env::args_os());
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
