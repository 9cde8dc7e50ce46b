use std::time::Duration;

use uartdfu_frame::{min_request_len, Command};

/// Default input buffer capacity in bytes.
pub const DEFAULT_INPUT_CAPACITY: usize = 2048;

/// Default output buffer capacity in bytes.
pub const DEFAULT_OUTPUT_CAPACITY: usize = 2048;

/// Default time a requester waits for each response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default name of the responder worker thread.
pub const DEFAULT_WORKER_NAME: &str = "dfu_uart";

/// Link configuration, fixed when an endpoint is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Capacity of the receive buffer.
    pub input_capacity: usize,
    /// Capacity of the transmit buffer.
    pub output_capacity: usize,
    /// How long a requester waits for each response.
    pub response_timeout: Duration,
    /// Name of the responder worker thread.
    pub worker_name: String,
    /// Nice value applied to the responder worker, if any.
    pub worker_priority: Option<i32>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            input_capacity: DEFAULT_INPUT_CAPACITY,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            worker_name: DEFAULT_WORKER_NAME.to_string(),
            worker_priority: None,
        }
    }
}

impl LinkConfig {
    /// Set the response timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set both buffer capacities.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.input_capacity = capacity;
        self.output_capacity = capacity;
        self
    }

    /// Largest WRITE chunk that fits a frame on a link with this configuration.
    ///
    /// Both ends are assumed to share the configuration, so the smaller of the
    /// two buffers bounds the frame.
    pub fn max_chunk_size(&self) -> usize {
        self.input_capacity
            .min(self.output_capacity)
            .saturating_sub(min_request_len(Command::Write))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = LinkConfig::default();
        assert_eq!(config.input_capacity, 2048);
        assert_eq!(config.output_capacity, 2048);
        assert_eq!(config.response_timeout, Duration::from_secs(5));
        assert_eq!(config.worker_name, "dfu_uart");
        assert_eq!(config.worker_priority, None);
    }

    #[test]
    fn max_chunk_leaves_room_for_framing() {
        let config = LinkConfig::default();
        assert_eq!(config.max_chunk_size(), 2048 - 16);

        let tiny = LinkConfig::default().with_capacity(8);
        assert_eq!(tiny.max_chunk_size(), 0);
    }
}
