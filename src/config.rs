use crate::security::ResourceLimits;
use crate::{EchoError, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Port used when neither `PORT` nor a command-line port is given
pub const DEFAULT_PORT: u16 = 8090;

/// Configuration for the diagnostic echo server
///
/// Built once at startup and shared read-only with every connection.
///
/// # Examples
///
/// ```
/// use echo_server::ServerConfig;
///
/// let config = ServerConfig::from_lookup(|key| match key {
///     "PORT" => Some("9000".to_string()),
///     "SEND_SERVER_HOSTNAME" => Some("false".to_string()),
///     _ => None,
/// })
/// .unwrap();
///
/// assert_eq!(config.bind_addr.port(), 9000);
/// assert!(!config.send_server_hostname);
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listener to
    pub bind_addr: SocketAddr,
    /// Whether the server discloses its host name unless a request overrides it
    pub send_server_hostname: bool,
    /// Log every request header
    pub log_http_headers: bool,
    /// Hex-dump every non-empty request body
    pub log_http_body: bool,
    /// Interval between push-stream heartbeat events
    pub heartbeat_interval: Duration,
    /// Request, connection and message limits
    pub limits: ResourceLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            send_server_hostname: true,
            log_http_headers: false,
            log_http_body: false,
            heartbeat_interval: Duration::from_secs(1),
            limits: ResourceLimits::default(),
        }
    }
}

impl ServerConfig {
    /// Builds a configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = lookup("PORT").filter(|p| !p.is_empty()) {
            config = config.with_port_str(&port)?;
        }

        config.send_server_hostname = lookup("SEND_SERVER_HOSTNAME")
            .map(|v| disclosure_enabled(&v))
            .unwrap_or(true);
        config.log_http_headers = lookup("LOG_HTTP_HEADERS").is_some_and(|v| !v.is_empty());
        config.log_http_body = lookup("LOG_HTTP_BODY").is_some_and(|v| !v.is_empty());

        Ok(config)
    }

    /// Replaces the bind port with one parsed from text
    pub fn with_port_str(mut self, port: &str) -> Result<Self> {
        let port = port
            .parse::<u16>()
            .map_err(|e| EchoError::Config(format!("invalid port {port:?}: {e}")))?;
        self.bind_addr.set_port(port);
        Ok(self)
    }

    /// Set the bind address
    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    /// Set the heartbeat interval
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the resource limits
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// Only the literal `false` (any case) turns disclosure off
pub fn disclosure_enabled(value: &str) -> bool {
    !value.eq_ignore_ascii_case("false")
}
