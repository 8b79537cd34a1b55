use std::time::Duration;

use upblink_transport::PortSettings;

/// Session behavior configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long the dispatcher waits for ACK/NAK after each write attempt.
    pub ack_timeout: Duration,
    /// Total write attempts per command (first try plus retries).
    pub max_attempts: u32,
    /// Capacity of the outbound work queue; submission beyond this fails
    /// fast with `Status::WriteFailed` instead of blocking the submitter.
    pub queue_capacity: usize,
    /// Serial port parameters; the receive timeout bounds each blocking
    /// read so the reader loop can observe shutdown.
    pub port: PortSettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(500),
            max_attempts: 3,
            queue_capacity: 128,
            port: PortSettings::default(),
        }
    }
}
