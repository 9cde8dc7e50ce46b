use std::fmt;
use std::io;

use uartdfu_frame::FrameError;
use uartdfu_peer::DfuError;
use uartdfu_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const REMOTE_ERROR: i32 = 4;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Open { source, .. } | TransportError::Io(source) => {
            io_error(context, source)
        }
        TransportError::UnsupportedBaud(_) => CliError::new(USAGE, format!("{context}: {err}")),
        TransportError::Closed => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Overflow { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn dfu_error(context: &str, err: DfuError) -> CliError {
    match err {
        DfuError::Transport(err) => transport_error(context, err),
        DfuError::Frame(err) => frame_error(context, err),
        DfuError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        DfuError::CommandMismatch { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        DfuError::Backend(_) => CliError::new(REMOTE_ERROR, format!("{context}: {err}")),
        DfuError::InvalidArgument(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn timeouts_map_to_124() {
        let err = dfu_error("offset failed", DfuError::Timeout(Duration::from_secs(5)));
        assert_eq!(err.code, TIMEOUT);
        assert!(err.message.starts_with("offset failed: "));
    }

    #[test]
    fn backend_codes_are_remote_errors() {
        assert_eq!(dfu_error("write failed", DfuError::Backend(-27)).code, REMOTE_ERROR);
    }

    #[test]
    fn missing_device_is_a_plain_failure() {
        let err = transport_error(
            "open failed",
            TransportError::Open {
                path: "/dev/nope".into(),
                source: io::Error::from(io::ErrorKind::NotFound),
            },
        );
        assert_eq!(err.code, FAILURE);
    }

    #[test]
    fn unsupported_baud_is_usage() {
        let err = dfu_error(
            "open failed",
            DfuError::Transport(TransportError::UnsupportedBaud(12345)),
        );
        assert_eq!(err.code, USAGE);
    }
}
