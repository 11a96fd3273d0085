pub mod error;
pub mod payload;
pub mod reconcile;
pub mod version;

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

use crate::config::ManagerConfig;

pub use error::ScrapeError;
pub use version::ApiVersion;

use payload::{Envelope, LoginResponse};

/// Callback type for recording manager request metrics.
/// Receives (endpoint_name, status, duration).
pub type MetricsCallback = Box<dyn Fn(&str, &str, Duration) + Send + Sync>;

/// Bearer credential for one scrape. Never cached between scrapes.
#[derive(Clone)]
pub struct Credential {
    token: String,
    /// Login URL that issued the token.
    issued_by: String,
}

impl Credential {
    pub fn new(token: impl Into<String>, issued_by: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            issued_by: issued_by.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn issued_by(&self) -> &str {
        &self.issued_by
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("issued_by", &self.issued_by)
            .finish()
    }
}

/// Manager API resources read on every scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ApiInfo,
    AgentsOverview,
    HourlyStats,
    DailyStats,
    RemotedStats,
    Logs,
    AnalysisdStats,
    ConfigValidation,
    NodeHealth,
}

impl Endpoint {
    pub const ALL: [Endpoint; 9] = [
        Endpoint::ApiInfo,
        Endpoint::AgentsOverview,
        Endpoint::HourlyStats,
        Endpoint::DailyStats,
        Endpoint::RemotedStats,
        Endpoint::Logs,
        Endpoint::AnalysisdStats,
        Endpoint::ConfigValidation,
        Endpoint::NodeHealth,
    ];

    /// Short name used in logs, errors and metric labels.
    pub fn name(self) -> &'static str {
        match self {
            Self::ApiInfo => "api_info",
            Self::AgentsOverview => "agents_overview",
            Self::HourlyStats => "hourly_stats",
            Self::DailyStats => "daily_stats",
            Self::RemotedStats => "remoted_stats",
            Self::Logs => "logs",
            Self::AnalysisdStats => "analysisd_stats",
            Self::ConfigValidation => "config_validation",
            Self::NodeHealth => "node_health",
        }
    }

    /// Path relative to the API root, without a leading slash.
    pub fn path(self, log_limit: usize) -> String {
        match self {
            Self::ApiInfo => String::new(),
            Self::AgentsOverview => "overview/agents".to_string(),
            Self::HourlyStats => "manager/stats/hourly".to_string(),
            Self::DailyStats => "manager/stats".to_string(),
            Self::RemotedStats => "manager/stats/remoted".to_string(),
            Self::Logs => format!("manager/logs?limit={log_limit}"),
            Self::AnalysisdStats => "manager/stats/analysisd".to_string(),
            Self::ConfigValidation => "manager/configuration/validation".to_string(),
            Self::NodeHealth => "cluster/healthcheck".to_string(),
        }
    }
}

/// Manager API client trait.
pub trait ManagerApi: Send + Sync {
    /// Log in and obtain a bearer credential for one scrape.
    fn authenticate(&self) -> impl Future<Output = Result<Credential, ScrapeError>> + Send;

    /// Fetch a resource and return the `data` member of its response.
    fn fetch(
        &self,
        endpoint: Endpoint,
        credential: &Credential,
    ) -> impl Future<Output = Result<Value, ScrapeError>> + Send;
}

/// HTTP-based manager API client.
///
/// Holds no session state: every scrape logs in again.
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    login_path: String,
    username: String,
    password: String,
    log_limit: usize,
    metrics: Option<MetricsCallback>,
}

impl Client {
    /// Create a new manager API client.
    pub fn new(cfg: &ManagerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .danger_accept_invalid_certs(cfg.tls_skip_verify)
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            http,
            base_url: cfg.base_url(),
            login_path: cfg.login_path.trim_start_matches('/').to_string(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            log_limit: cfg.log_limit,
            metrics: None,
        })
    }

    /// Set a metrics callback for recording request stats.
    pub fn with_metrics(mut self, cb: MetricsCallback) -> Self {
        self.metrics = Some(cb);
        self
    }

    fn record_request(&self, endpoint: &str, status: &str, duration: Duration) {
        if let Some(ref cb) = self.metrics {
            cb(endpoint, status, duration);
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

impl ManagerApi for Client {
    async fn authenticate(&self) -> Result<Credential, ScrapeError> {
        let start = Instant::now();
        let url = self.url(&self.login_path);
        debug!(url = %url, "authenticating against manager");

        let response = match self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.record_request("login", "error", start.elapsed());
                return Err(ScrapeError::Auth {
                    status: None,
                    message: e.to_string(),
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            self.record_request("login", "error", start.elapsed());
            return Err(ScrapeError::Auth {
                status: Some(status.as_u16()),
                message: body,
            });
        }

        let login: LoginResponse = match response.json().await {
            Ok(login) => login,
            Err(e) => {
                self.record_request("login", "error", start.elapsed());
                return Err(ScrapeError::Auth {
                    status: Some(status.as_u16()),
                    message: format!("decoding login response: {e}"),
                });
            }
        };

        self.record_request("login", "success", start.elapsed());

        Ok(Credential::new(login.data.token, url))
    }

    async fn fetch(&self, endpoint: Endpoint, credential: &Credential) -> Result<Value, ScrapeError> {
        let start = Instant::now();
        let name = endpoint.name();
        let url = self.url(&endpoint.path(self.log_limit));
        debug!(endpoint = name, url = %url, "fetching manager resource");

        let fail = |status: Option<u16>, message: String| ScrapeError::Fetch {
            endpoint: name,
            status,
            message,
        };

        let response = match self
            .http
            .get(&url)
            .bearer_auth(credential.token())
            .header("Accept", "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.record_request(name, "error", start.elapsed());
                return Err(fail(None, e.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            self.record_request(name, "error", start.elapsed());
            return Err(fail(Some(status.as_u16()), body));
        }

        let envelope: Envelope = match response.json().await {
            Ok(envelope) => envelope,
            Err(e) => {
                self.record_request(name, "error", start.elapsed());
                return Err(ScrapeError::ShapeMismatch {
                    resource: name,
                    detail: format!("decoding response: {e}"),
                });
            }
        };

        self.record_request(name, "success", start.elapsed());

        Ok(envelope.data)
    }
}
