//! Server configuration.

use crate::logger::Logger;

/// Where to listen and where to log.
///
/// ```rust
/// use tern::ServerConfig;
///
/// let config = ServerConfig::new("127.0.0.1", "8080");
/// assert_eq!(config.addr(), "127.0.0.1:8080");
/// ```
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: String,
    /// `None` logs to the ambient `tracing` subscriber.
    pub logger: Option<Logger>,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Self {
        Self { host: host.into(), port: port.into(), logger: None }
    }

    pub fn with_logger(mut self, logger: impl Into<Logger>) -> Self {
        self.logger = Some(logger.into());
        self
    }

    /// `host:port`, bracketing bare IPv6 hosts.
    pub fn addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("0.0.0.0", "3000")
    }
}
