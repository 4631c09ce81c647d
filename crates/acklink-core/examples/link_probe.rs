//! Link Probe
//!
//! A standalone tool to check that a field device answers framed commands.
//! Sends one command a number of times and reports each outcome.
//!
//! Usage:
//!   cargo run --example link_probe -- [OPTIONS] [PORT]
//!
//! Options:
//!   --port PORT       Serial port (default: first port found)
//!   --baud RATE       Baud rate (default: 9600)
//!   --parity NAME     none, odd or even (default: none)
//!   --timeout MS      Acknowledgment timeout in ms (default: 1000)
//!   --config FILE     Load timing settings from a JSON file
//!   --count N         Number of commands to send (default: 1)
//!   --control BYTE    Control byte in hex (default: 11)
//!   --data HEX        Command data as hex, e.g. 33343435
//!   --list            List ports and exit

use std::sync::Arc;
use std::time::Instant;

use acklink_core::protocol::{
    list_ports, CommandOutcome, FrameAssembler, FrameBuilder, LinkConfig, Parity, PortSettings,
    SerialTransport, TransportController,
};
use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let text = text.trim_start_matches("0x");
    if !text.is_ascii() || text.len() % 2 != 0 {
        bail!("hex data must be an even number of hex digits: {}", text);
    }
    text.as_bytes()
        .chunks(2)
        .enumerate()
        .map(|(i, pair)| {
            let digits = std::str::from_utf8(pair)?;
            u8::from_str_radix(digits, 16)
                .with_context(|| format!("invalid hex byte {:?} at {}", digits, i * 2))
        })
        .collect()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("acklink_core=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut port_name: Option<String> = None;
    let mut baud_rate = acklink_core::protocol::DEFAULT_BAUD_RATE;
    let mut parity = Parity::None;
    let mut timeout_ms: Option<u64> = None;
    let mut config_path: Option<String> = None;
    let mut count = 1u32;
    let mut control = 0x11u8;
    let mut data = vec![0x33, 0x34, 0x34, 0x35];

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match args[i].as_str() {
            "--port" | "-p" => {
                port_name = value;
                i += 1;
            }
            "--baud" | "-b" => {
                baud_rate = value.context("--baud needs a value")?.parse()?;
                i += 1;
            }
            "--parity" => {
                parity = value.context("--parity needs a value")?.parse()?;
                i += 1;
            }
            "--timeout" | "-t" => {
                timeout_ms = Some(value.context("--timeout needs a value")?.parse()?);
                i += 1;
            }
            "--config" | "-c" => {
                config_path = value;
                i += 1;
            }
            "--count" | "-n" => {
                count = value.context("--count needs a value")?.parse()?;
                i += 1;
            }
            "--control" => {
                control = u8::from_str_radix(&value.context("--control needs a value")?, 16)?;
                i += 1;
            }
            "--data" => {
                data = parse_hex(&value.context("--data needs a value")?)?;
                i += 1;
            }
            "--list" | "-l" => {
                for port in list_ports() {
                    println!(
                        "{:<20} {}",
                        port.name,
                        port.product.as_deref().unwrap_or("")
                    );
                }
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            arg if !arg.starts_with('-') => {
                port_name = Some(arg.to_string());
            }
            other => {
                eprintln!("Unknown option: {}", other);
            }
        }
        i += 1;
    }

    let mut config = match &config_path {
        Some(path) => LinkConfig::load(path)?,
        None => LinkConfig::default(),
    };
    if let Some(ms) = timeout_ms {
        config.timeout_ms = ms;
    }
    config.validate()?;

    let port_name = match port_name {
        Some(name) => name,
        None => list_ports()
            .into_iter()
            .next()
            .map(|p| p.name)
            .context("no serial ports found")?,
    };

    println!("Configuration:");
    println!("  Port:      {}", port_name);
    println!("  Baud rate: {}", baud_rate);
    println!("  Parity:    {:?}", parity);
    println!("  Timeout:   {}ms", config.timeout_ms);
    println!("  Attempts:  {}", config.max_attempts);
    println!();

    let controller =
        TransportController::with_config(SerialTransport::from_config(&config), config.clone());
    controller.on_error(|message| eprintln!("! {}", message));
    controller.outcomes().subscribe(|outcome| {
        if *outcome == CommandOutcome::Retry {
            println!("  ... no reply, retrying");
        }
    });

    let settings = PortSettings::new(&port_name, baud_rate).parity(parity);
    let assembler = Arc::new(FrameAssembler::from_config(&config));
    let opened = controller.open_with_assembler(&settings, assembler, |frame| {
        println!(
            "  <= control {:02X}, {} data bytes: {:02X?}",
            frame.control(),
            frame.data_len(),
            frame.data()
        );
    })?;
    if !opened {
        bail!("could not open {}", port_name);
    }

    let command = FrameBuilder::new().control(control).bytes(&data).build()?;
    let mut answered = 0;
    for n in 1..=count {
        println!("[{}/{}] => {:02X?}", n, count, command.as_bytes());
        let started = Instant::now();
        let outcome = controller.send(command.as_bytes());
        println!("  {:?} after {:?}", outcome, started.elapsed());
        if outcome == CommandOutcome::Success {
            answered += 1;
        }
    }

    println!();
    println!("{} of {} commands acknowledged", answered, count);
    controller.release();
    Ok(())
}

fn print_help() {
    println!("Link Probe");
    println!();
    println!("Usage: link_probe [OPTIONS] [PORT]");
    println!();
    println!("Options:");
    println!("  -p, --port PORT       Serial port (default: first port found)");
    println!("  -b, --baud RATE       Baud rate (default: 9600)");
    println!("      --parity NAME     none, odd or even (default: none)");
    println!("  -t, --timeout MS      Acknowledgment timeout in ms (default: 1000)");
    println!("  -c, --config FILE     Load timing settings from a JSON file");
    println!("  -n, --count N         Number of commands to send (default: 1)");
    println!("      --control BYTE    Control byte in hex (default: 11)");
    println!("      --data HEX        Command data as hex");
    println!("  -l, --list            List ports and exit");
    println!("  -h, --help            Show this help");
}
