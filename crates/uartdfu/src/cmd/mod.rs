use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod push;
pub mod serve;
pub mod simulate;
pub mod version;

const DEFAULT_BAUD: u32 = 115_200;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send an image to a device over a serial port.
    Push(PushArgs),
    /// Receive images on a serial port and store them in a file.
    Serve(ServeArgs),
    /// Run both endpoints in-process and verify the transferred image.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Push(args) => push::run(args, format),
        Command::Serve(args) => serve::run(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct PushArgs {
    /// Serial device to open.
    pub device: PathBuf,
    /// Image file to send.
    #[arg(long)]
    pub image: PathBuf,
    /// Image slot announced in INIT.
    #[arg(long, default_value_t = 0)]
    pub image_id: u8,
    /// Bytes per WRITE request.
    #[arg(long, default_value_t = 1024)]
    pub chunk_size: usize,
    /// Baud rate.
    #[arg(long, default_value_t = DEFAULT_BAUD)]
    pub baud: u32,
    /// Time to wait for each response (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Serial device to open.
    pub device: PathBuf,
    /// File the received image is written to.
    #[arg(long)]
    pub out: PathBuf,
    /// Baud rate.
    #[arg(long, default_value_t = DEFAULT_BAUD)]
    pub baud: u32,
    /// Largest image accepted, in bytes.
    #[arg(long)]
    pub max_size: Option<u64>,
    /// Nice value for the responder worker thread.
    #[arg(long, allow_hyphen_values = true)]
    pub priority: Option<i32>,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Image file to send.
    #[arg(long, conflicts_with = "size")]
    pub image: Option<PathBuf>,
    /// Size of a generated image, in bytes.
    #[arg(long)]
    pub size: Option<usize>,
    /// Image slot announced in INIT.
    #[arg(long, default_value_t = 0)]
    pub image_id: u8,
    /// Bytes per WRITE request.
    #[arg(long, default_value_t = 1024)]
    pub chunk_size: usize,
    /// Bytes already stored on the responder before the transfer starts.
    #[arg(long, default_value_t = 0)]
    pub preload: usize,
    /// Time to wait for each response (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
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

/// Reject chunk sizes that cannot carry the image header or do not fit a frame.
pub(crate) fn check_chunk_size(chunk_size: usize, max: usize) -> CliResult<()> {
    let min = uartdfu_frame::IMAGE_HEADER_SIZE + 1;
    if chunk_size < min || chunk_size > max {
        return Err(CliError::new(
            USAGE,
            format!("--chunk-size must be between {min} and {max}"),
        ));
    }
    Ok(())
}
