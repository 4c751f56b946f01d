//! Link configuration.

use std::time::Duration;

/// Tunables for link establishment and framing.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Maximum accepted frame payload, in bytes. Oversized frames are a
    /// protocol fault on both the sending and receiving side.
    pub max_payload_size: usize,

    /// How long a connection attempt may take before failing with
    /// [`crate::LinkError::ConnectTimeout`].
    pub connect_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_payload_size: 1024 * 1024,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl LinkConfig {
    /// Set the maximum frame payload size.
    pub fn with_max_payload_size(mut self, bytes: usize) -> Self {
        self.max_payload_size = bytes;
        self
    }

    /// Set the connection establishment timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LinkConfig::default();
        assert_eq!(config.max_payload_size, 1024 * 1024);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_builders() {
        let config = LinkConfig::default()
            .with_max_payload_size(64)
            .with_connect_timeout(Duration::from_millis(250));
        assert_eq!(config.max_payload_size, 64);
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
    }
}
