use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serial_bridge_lib::serial::{Config, Port, SystemBackend};
use serial_bridge_lib::{PortList, Settings};

/// Poke at host serial ports through the native layer
#[derive(Parser, Debug)]
#[command(name = "serial-probe", version, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the serial ports present on this host
    List,

    /// Print whatever arrives on a port for a while
    Read {
        port: String,

        #[arg(long, default_value_t = 9600)]
        baud: u32,

        /// How long to listen, in milliseconds
        #[arg(long, default_value_t = 5000)]
        duration_ms: u64,
    },

    /// Send a line of text and wait for it to leave the device
    Send {
        port: String,

        text: String,

        #[arg(long, default_value_t = 9600)]
        baud: u32,
    },
}

fn open(backend: &SystemBackend, name: &str, baud: u32) -> Result<Port> {
    let settings = Settings {
        default_read_timeout_ms: 100,
        default_config: Some(Config { baud, ..Config::default() }),
        ..Settings::default()
    };
    Port::open_with(backend, name, &settings).with_context(|| format!("failed to open {}", name))
}

fn list(backend: &SystemBackend) -> Result<()> {
    let mut ports = PortList::new();
    ports.refresh(backend).context("failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("no serial ports found");
    }
    for name in ports.iter() {
        println!("{}", name);
    }
    Ok(())
}

fn read(backend: &SystemBackend, name: &str, baud: u32, duration: Duration) -> Result<()> {
    let port = open(backend, name, baud)?;
    log::info!("Reading from {} for {:?}", port, duration);

    let mut buf = [0u8; 1024];
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        let n = port.read_bytes(&mut buf)?;
        if n > 0 {
            print!("{}", String::from_utf8_lossy(&buf[..n]));
        }
    }
    println!();
    port.close()?;
    Ok(())
}

fn send(backend: &SystemBackend, name: &str, text: &str, baud: u32) -> Result<()> {
    let port = open(backend, name, baud)?;
    port.write_bytes(text.as_bytes())?;
    port.flush_output()?;
    log::info!("Sent {} bytes to {}", text.len(), port);
    port.close()?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let backend = SystemBackend::new();
    match args.command {
        Command::List => list(&backend),
        Command::Read { port, baud, duration_ms } => read(&backend, &port, baud, Duration::from_millis(duration_ms)),
        Command::Send { port, text, baud } => send(&backend, &port, &text, baud),
    }
}
