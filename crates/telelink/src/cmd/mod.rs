use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use telelink_message::Packet;

use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to a device and print received packets.
    Listen(ListenArgs),
    /// Send a single packet.
    Send(SendArgs),
    /// Decode a captured byte stream.
    Decode(DecodeArgs),
    /// Encode a packet into a wire frame.
    Encode(EncodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format),
        Command::Send(args) => send::run(args),
        Command::Decode(args) => decode::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Device endpoint (ws://host:port, tcp://host:port, host:port or unix:///path).
    #[arg(env = "TELELINK_URL")]
    pub url: String,
    /// Topics to subscribe to (repeatable). Default: all.
    #[arg(long = "topic", short = 't', value_name = "TOPIC")]
    pub topics: Vec<String>,
    /// Exit after receiving N packets.
    #[arg(long)]
    pub count: Option<usize>,
    /// Delay before reconnecting (e.g. 10s, 500ms).
    #[arg(long, default_value = "10s")]
    pub reconnect_delay: String,
    /// Subscription refresh period (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s")]
    pub refresh: String,
    /// Deliver only the newest packet of each socket read.
    #[arg(long)]
    pub latest_only: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Device endpoint (ws://host:port, tcp://host:port, host:port or unix:///path).
    #[arg(env = "TELELINK_URL")]
    pub url: String,
    #[command(flatten)]
    pub packet: PacketInput,
    /// Maximum time to wait for the connection to open (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_open: String,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Capture file. Reads stdin when omitted.
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    #[command(flatten)]
    pub packet: PacketInput,
    /// Print the frame as base64 instead of hex.
    #[arg(long)]
    pub base64: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// A packet given inline or from a file, in the JSON packet layout.
#[derive(Args, Debug)]
pub struct PacketInput {
    /// Packet as JSON.
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub json: Option<String>,
    /// Read the packet JSON from a file.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

impl PacketInput {
    pub fn resolve(&self) -> CliResult<Packet> {
        let text = match (&self.json, &self.file) {
            (Some(json), _) => json.clone(),
            (None, Some(path)) => fs::read_to_string(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?,
            (None, None) => return Err(CliError::new(USAGE, "one of --json or --file is required")),
        };
        parse_packet(&text)
    }
}

fn parse_packet(text: &str) -> CliResult<Packet> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|err| CliError::new(USAGE, format!("packet is not valid JSON: {err}")))?;
    serde_json::from_value(value)
        .map_err(|err| CliError::new(DATA_INVALID, format!("not a valid packet: {err}")))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))
}
