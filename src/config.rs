use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::level_filters::LevelFilter;

use crate::dns_query::QueryIdSource;
use crate::error::ConfigError;

const DEFAULT_CONFIG_FILES: [&str; 2] = ["dns-rtt-probe.toml", "/etc/dns-rtt-probe/config.toml"];

/// What to do when a non-terminal step of the probe fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log a warning and carry on with the probe.
    Continue,
    /// Fail the probe immediately.
    Abort,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Parse `level` as a tracing level name (trace, debug, info, warn, error)
    /// or `off`. Anything else is a configuration error.
    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        self.level
            .trim()
            .parse()
            .map_err(|_| ConfigError::Validation(format!("unknown log level `{}`", self.level)))
    }
}

/// Configuration as read from the TOML file and the command line.
///
/// The three probe targets are optional here so that a file can leave them
/// to the command line; `validate` checks they ended up set.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Network device the probe socket is bound to
    #[serde(default, alias = "Interface")]
    pub interface: Option<String>,

    /// IPv4 literal of the resolver under test
    #[serde(default, alias = "Server")]
    pub server: Option<String>,

    /// Name looked up by every probe
    #[serde(default, alias = "Hostname")]
    pub hostname: Option<String>,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default)]
    pub query_id: QueryIdSource,

    #[serde(default = "default_on_bind_error")]
    pub on_bind_error: FailurePolicy,

    #[serde(default = "default_on_send_error")]
    pub on_send_error: FailurePolicy,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface: None,
            server: None,
            hostname: None,
            port: default_port(),
            timeout_ms: default_timeout_ms(),
            interval_secs: default_interval_secs(),
            query_id: QueryIdSource::default(),
            on_bind_error: default_on_bind_error(),
            on_send_error: default_on_send_error(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub interface: Option<String>,
    pub server: Option<String>,
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub timeout_ms: Option<u64>,
    pub interval_secs: Option<u64>,
    pub on_bind_error: Option<FailurePolicy>,
    pub on_send_error: Option<FailurePolicy>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

/// Validated, immutable settings for one prober.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub interface: String,
    pub server: Ipv4Addr,
    pub port: u16,
    pub hostname: String,
    pub timeout: Duration,
    pub query_id: QueryIdSource,
    pub on_bind_error: FailurePolicy,
    pub on_send_error: FailurePolicy,
}

impl ProbeConfig {
    pub fn resolver_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.server, self.port))
    }
}

impl Config {
    /// Load configuration from file or use defaults
    ///
    /// Priority order:
    /// 1. Explicitly provided path
    /// 2. dns-rtt-probe.toml in current directory
    /// 3. /etc/dns-rtt-probe/config.toml
    /// 4. Default configuration
    pub fn load(path: Option<&Path>, cli_overrides: CliOverrides) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match DEFAULT_CONFIG_FILES.iter().map(Path::new).find(|p| p.exists()) {
                Some(found) => Self::from_file(found)?,
                None => Self::default(),
            },
        };

        config.apply_cli_overrides(cli_overrides);
        config.logging.level_filter()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.display().to_string(), e.to_string()))?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn apply_cli_overrides(&mut self, overrides: CliOverrides) {
        if let Some(interface) = overrides.interface {
            self.interface = Some(interface);
        }
        if let Some(server) = overrides.server {
            self.server = Some(server);
        }
        if let Some(hostname) = overrides.hostname {
            self.hostname = Some(hostname);
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(timeout_ms) = overrides.timeout_ms {
            self.timeout_ms = timeout_ms;
        }
        if let Some(interval_secs) = overrides.interval_secs {
            self.interval_secs = interval_secs;
        }
        if let Some(policy) = overrides.on_bind_error {
            self.on_bind_error = policy;
        }
        if let Some(policy) = overrides.on_send_error {
            self.on_send_error = policy;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Check that every required option is present and usable, and freeze
    /// the result into a `ProbeConfig`.
    pub fn validate(&self) -> Result<ProbeConfig, ConfigError> {
        let interface = required(&self.interface, "Interface")?;
        let server = required(&self.server, "Server")?;
        let hostname = required(&self.hostname, "Hostname")?;

        let server: Ipv4Addr = server
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidServer(server.to_string()))?;

        if self.port == 0 {
            return Err(ConfigError::Validation("port cannot be 0".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Validation("timeout_ms cannot be 0".to_string()));
        }
        if self.interval_secs == 0 {
            return Err(ConfigError::Validation("interval_secs cannot be 0".to_string()));
        }

        Ok(ProbeConfig {
            interface: interface.to_string(),
            server,
            port: self.port,
            hostname: hostname.to_string(),
            timeout: Duration::from_millis(self.timeout_ms),
            query_id: self.query_id,
            on_bind_error: self.on_bind_error,
            on_send_error: self.on_send_error,
        })
    }
}

fn required<'a>(value: &'a Option<String>, key: &'static str) -> Result<&'a str, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    53
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_interval_secs() -> u64 {
    10
}

fn default_on_bind_error() -> FailurePolicy {
    FailurePolicy::Continue
}

fn default_on_send_error() -> FailurePolicy {
    FailurePolicy::Abort
}
