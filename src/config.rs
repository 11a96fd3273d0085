use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Top-level configuration for the exporter.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Wazuh manager API connection configuration.
    #[serde(default)]
    pub manager: ManagerConfig,

    /// Exposition HTTP server configuration.
    #[serde(default)]
    pub exporter: ExporterConfig,

    /// Metric family toggles.
    #[serde(default)]
    pub families: FamiliesConfig,
}

/// Wazuh manager API connection configuration.
#[derive(Clone, Deserialize)]
pub struct ManagerConfig {
    /// URL scheme, "http" or "https". Default: "https".
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Manager API host name or address.
    #[serde(default)]
    pub host: String,

    /// Manager API port.
    #[serde(default)]
    pub port: Option<u16>,

    /// API user.
    #[serde(default)]
    pub username: String,

    /// API password. Never logged.
    #[serde(default)]
    pub password: String,

    /// Login path relative to the API root. Default: "security/user/authenticate".
    #[serde(default = "default_login_path")]
    pub login_path: String,

    /// Per-request timeout. Default: 10s.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Accept invalid TLS certificates. Default: true.
    #[serde(default = "default_true")]
    pub tls_skip_verify: bool,

    /// Number of recent log entries requested per scrape. Default: 2000.
    #[serde(default = "default_log_limit")]
    pub log_limit: usize,
}

/// Exposition HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    /// Listen address. Default: "0.0.0.0".
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Listen port. Default: 5000.
    #[serde(default = "default_exporter_port")]
    pub port: u16,
}

/// Metric family toggles.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FamiliesConfig {
    /// Omit the last_registered_agent family.
    #[serde(default)]
    pub skip_last_registered_agent: bool,

    /// Omit the wazuh_api family.
    #[serde(default)]
    pub skip_api_info: bool,

    /// Omit the last_logs family and skip fetching logs.
    #[serde(default)]
    pub skip_last_logs: bool,
}

// --- Serde default functions ---

fn default_protocol() -> String {
    "https".to_string()
}

fn default_login_path() -> String {
    "security/user/authenticate".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_true() -> bool {
    true
}

fn default_log_limit() -> usize {
    2000
}

fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_exporter_port() -> u16 {
    5000
}

// --- Default trait impls ---

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            host: String::new(),
            port: None,
            username: String::new(),
            password: String::new(),
            login_path: default_login_path(),
            timeout: default_timeout(),
            tls_skip_verify: true,
            log_limit: default_log_limit(),
        }
    }
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_exporter_port(),
        }
    }
}

impl fmt::Debug for ManagerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerConfig")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("login_path", &self.login_path)
            .field("timeout", &self.timeout)
            .field("tls_skip_verify", &self.tls_skip_verify)
            .field("log_limit", &self.log_limit)
            .finish()
    }
}

impl ManagerConfig {
    /// API root URL without a trailing slash, e.g. "https://wazuh:55000".
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        match self.port {
            Some(port) => format!("{}://{}:{}", self.protocol, host, port),
            None => format!("{}://{}", self.protocol, host),
        }
    }
}

impl ExporterConfig {
    /// Socket address the exposition server binds to.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .listen_addr
            .parse()
            .with_context(|| format!("invalid exporter.listen_addr: {}", self.listen_addr))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

// --- Loading, environment overlay and validation ---

impl Config {
    /// Load configuration from an optional YAML file, overlay the process
    /// environment and validate the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Like [`Config::load`], reading environment variables through `lookup`.
    pub fn load_with(path: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        cfg.apply_env(lookup)?;
        cfg.validate()?;

        Ok(cfg)
    }

    /// Parse a YAML configuration file without validating it.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        Ok(cfg)
    }

    /// Overlay environment variables on top of file values.
    ///
    /// Skip toggles are enabled by any non-empty value.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let set = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(protocol) = set("WAZUH_PROTOCOL") {
            self.manager.protocol = protocol;
        }
        if let Some(host) = set("WAZUH_API_HOST") {
            self.manager.host = host;
        }
        if let Some(port) = set("WAZUH_API_PORT") {
            self.manager.port = Some(parse_port("WAZUH_API_PORT", &port)?);
        }
        if let Some(username) = set("WAZUH_API_USERNAME") {
            self.manager.username = username;
        }
        if let Some(password) = set("WAZUH_API_PASSWORD") {
            self.manager.password = password;
        }
        if let Some(port) = set("EXPORTER_PORT") {
            self.exporter.port = parse_port("EXPORTER_PORT", &port)?;
        }

        if set("SKIP_LAST_REGISTERED_AGENT").is_some() {
            self.families.skip_last_registered_agent = true;
        }
        if set("SKIP_WAZUH_API_INFO").is_some() {
            self.families.skip_api_info = true;
        }
        if set("SKIP_LAST_LOGS").is_some() {
            self.families.skip_last_logs = true;
        }

        Ok(())
    }

    /// Validate the configuration for correctness.
    pub fn validate(&self) -> Result<()> {
        let manager = &self.manager;

        if manager.host.trim().is_empty() {
            bail!("manager.host is required (WAZUH_API_HOST)");
        }

        match manager.port {
            None => bail!("manager.port is required (WAZUH_API_PORT)"),
            Some(0) => bail!("manager.port must be a positive integer"),
            Some(_) => {}
        }

        if manager.username.is_empty() {
            bail!("manager.username is required (WAZUH_API_USERNAME)");
        }

        if manager.password.is_empty() {
            bail!("manager.password is required (WAZUH_API_PASSWORD)");
        }

        match manager.protocol.as_str() {
            "http" | "https" => {}
            other => bail!("invalid manager.protocol: {other} (expected http or https)"),
        }

        if manager.timeout.is_zero() {
            bail!("manager.timeout must be positive");
        }

        if manager.log_limit == 0 {
            bail!("manager.log_limit must be positive");
        }

        if self.exporter.port == 0 {
            bail!("exporter.port must be a positive integer");
        }

        self.exporter.socket_addr()?;

        Ok(())
    }
}

fn parse_port(var: &str, value: &str) -> Result<u16> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{var} must be a positive integer, got {value:?}"))
}
