mod cmd;
mod exit;
mod logging;
mod output;
mod transfer;

use std::process::ExitCode;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "uartdfu", version, about = "Firmware updates over a UART link")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let code = match cmd::run(cli.command, format) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("uartdfu: {err}");
            err.code
        }
    };
    ExitCode::from(exit_status(code))
}

/// Statuses outside the portable 0..=255 range collapse to a generic failure.
fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(exit::FAILURE as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_push_subcommand() {
        let cli = Cli::try_parse_from([
            "uartdfu",
            "push",
            "/dev/ttyUSB0",
            "--image",
            "app.bin",
            "--chunk-size",
            "512",
            "--timeout",
            "2s",
        ])
        .expect("push args should parse");

        match cli.command {
            Command::Push(args) => {
                assert_eq!(args.chunk_size, 512);
                assert_eq!(args.image_id, 0);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn push_requires_image() {
        let err = Cli::try_parse_from(["uartdfu", "push", "/dev/ttyUSB0"])
            .expect_err("missing --image should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn simulate_rejects_image_and_size_together() {
        let err = Cli::try_parse_from([
            "uartdfu",
            "simulate",
            "--image",
            "app.bin",
            "--size",
            "100",
        ])
        .expect_err("conflicting args should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn out_of_range_status_is_failure() {
        assert_eq!(exit_status(exit::TIMEOUT), 124);
        assert_eq!(exit_status(-5), 1);
        assert_eq!(exit_status(300), 1);
    }

    #[test]
    fn parses_serve_subcommand() {
        let cli = Cli::try_parse_from([
            "uartdfu",
            "serve",
            "/dev/ttyS1",
            "--out",
            "/tmp/image.bin",
            "--baud",
            "57600",
        ])
        .expect("serve args should parse");
        assert!(matches!(cli.command, Command::Serve(_)));
    }
}
