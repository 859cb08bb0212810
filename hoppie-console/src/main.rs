// hoppie-console/src/main.rs
// Runs the HoppieBridge engine over an in-memory dataref table and drives it
// from the terminal, playing the part of a cockpit add-on.

mod client;
mod commands;

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use acars_schema::{paths, Message};
use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use hoppie_bridge::config::HOPPIE_URL;
use hoppie_bridge::xplm_shim::DataRefValue;
use hoppie_bridge::{BridgeConfig, BridgePlugin, HttpTransport, InboxEntry, MemoryXplm, SETTINGS_FILE};
use tracing_subscriber::EnvFilter;

use client::{ConsoleClient, Outgoing};
use commands::{Command, Power};

// ---------------------------------------------------------------------------
// CLI args
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "hoppie-console", about = "Talk to Hoppie's ACARS through the HoppieBridge engine")]
struct Args {
    /// Hoppie logon code (otherwise taken from the settings file)
    #[arg(long)] logon:    Option<String>,
    #[arg(long)] callsign: Option<String>,
    #[arg(long, default_value = HOPPIE_URL)] url: String,
    /// Settings file holding the saved logon
    #[arg(long, default_value = SETTINGS_FILE)] settings: PathBuf,
    /// Bridge tick interval in seconds
    #[arg(long, default_value_t = 5)] tick: u64,
    /// Start with avionics off
    #[arg(long)] cold: bool,
    /// -v debug, -vv trace
    #[arg(short, long, action = ArgAction::Count)] verbose: u8,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let config = BridgeConfig {
        url: args.url.clone(),
        tick_interval: Duration::from_secs(args.tick.max(1)),
        ..BridgeConfig::default()
    };

    let xplm = MemoryXplm::new();
    xplm.set_dataref(paths::AVIONICS_ON, DataRefValue::Int(i32::from(!args.cold)));

    let transport = Arc::new(HttpTransport::new(&config));
    let mut plugin = BridgePlugin::new(Box::new(xplm.clone()), transport, config)
        .with_settings_file(args.settings.clone());
    plugin.bind_datarefs();

    let mut client = ConsoleClient::new(xplm);
    if let Some(logon) = &args.logon {
        client.set_logon(logon);
    }
    if let Some(callsign) = &args.callsign {
        client.set_callsign(callsign);
    }

    eprintln!("hoppie-console: {}  (type `help`)", args.url);
    run(&mut plugin, &mut client, stdin_lines()?)?;
    plugin.shutdown();
    Ok(())
}

fn init_logging(verbose: u8) -> Result<()> {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to install log subscriber")
}

/// Lines from stdin, read on their own thread so the tick never waits on input.
fn stdin_lines() -> Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("Failed to spawn stdin reader")?;
    Ok(rx)
}

// ---------------------------------------------------------------------------
// Main loop
// ---------------------------------------------------------------------------

fn run(plugin: &mut BridgePlugin, client: &mut ConsoleClient, input: mpsc::Receiver<String>) -> Result<()> {
    let mut next_tick = Instant::now();
    let mut last_status = String::new();

    loop {
        match input.recv_timeout(Duration::from_millis(200)) {
            Ok(line) => {
                if !execute(&line, client) {
                    return Ok(());
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        }

        if Instant::now() >= next_tick {
            let interval = plugin.flight_loop_tick();
            next_tick = Instant::now() + Duration::from_secs_f32(interval);
        }

        if let Some(entry) = client.tick() {
            print_entry(&entry);
        }

        let status = client.link().status;
        if status != last_status {
            eprintln!("[{status}]");
            last_status = status;
        }
    }
}

/// Apply one command line. False when the user asked to quit.
fn execute(line: &str, client: &mut ConsoleClient) -> bool {
    let command = match Command::parse_line(line) {
        Ok(Some(c)) => c,
        Ok(None) => return true,
        Err(e) => {
            let _ = e.print();
            return true;
        }
    };

    match command {
        Command::Send { to, kind, packet } => {
            let message = Message::outbound(&to.to_uppercase(), &kind.to_lowercase(), &packet.join(" "));
            match client.send(message) {
                Outgoing::Posted => eprintln!("message posted"),
                Outgoing::Queued(n) => eprintln!("outbox busy, {n} queued"),
            }
        }
        Command::Callsign { callsign } => client.set_callsign(&callsign),
        Command::Logon { token } => client.set_logon(&token),
        Command::Power { state } => client.set_power(state == Power::On),
        Command::Status => {
            let link = client.link();
            println!(
                "status: {}\ncallsign: {}\ncomm_ready: {}\ninbox backlog: {}\nlocal queue: {}",
                link.status,
                if link.callsign.is_empty() { "-" } else { &link.callsign },
                link.comm_ready,
                link.pending,
                client.queued_len(),
            );
        }
        Command::Quit => return false,
    }
    true
}

fn print_entry(entry: &InboxEntry) {
    let from = if entry.from.is_empty() { "?" } else { &entry.from };
    let kind = if entry.msg_type.is_empty() { "-" } else { &entry.msg_type };
    println!("<< {} from {from} ({kind}): {}", entry.origin, entry.packet);
}
