use std::time::Duration;

use serde::Deserialize;

/// The well-known TFTP service address used when none is configured.
pub const DEFAULT_ADDR: &str = "0.0.0.0:69";

/// TFTP server configuration
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tftpd::server::Config;
///
/// let config = Config::new()
///     .with_addr("127.0.0.1:6969")
///     .with_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address to listen on
    pub addr: String,
    /// Bound on each wait for a peer ACK or DATA packet. `None` waits
    /// indefinitely.
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            timeout: None,
        }
    }

    /// Set the listen address
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Set the per-ACK timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
