//! Per-scrape collection: log in, fan out to every manager resource and
//! reconcile the responses into one [`Snapshot`].

use serde_json::Value;
use tracing::debug;

use crate::config::FamiliesConfig;
use crate::wazuh::payload::{ConfigValidation, DailyStats, HourlyStats, LogEntry, NodeHealth};
use crate::wazuh::reconcile::{
    self, AgentsSnapshot, ApiInfo, DaemonStats, ANALYSISD_FIELDS, REMOTED_FIELDS,
};
use crate::wazuh::{Endpoint, ManagerApi, ScrapeError};

/// Outcome of one resource. A failed resource disables only the families it
/// feeds.
pub type Resource<T> = Result<T, ScrapeError>;

/// Everything read from the manager during one scrape.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub api_info: ApiInfo,
    pub agents: Resource<AgentsSnapshot>,
    pub hourly: Resource<HourlyStats>,
    pub daily: Resource<Vec<DailyStats>>,
    pub remoted: Resource<Vec<DaemonStats>>,
    /// `None` when the last-logs family is disabled and logs were not fetched.
    pub logs: Option<Resource<Vec<LogEntry>>>,
    pub analysisd: Resource<Vec<DaemonStats>>,
    pub validation: Resource<Vec<ConfigValidation>>,
    /// `None` when clustering is disabled.
    pub nodes: Option<Resource<Vec<NodeHealth>>>,
}

/// Runs scrapes against a manager API.
pub struct Collector<A> {
    api: A,
    families: FamiliesConfig,
}

impl<A: ManagerApi> Collector<A> {
    pub fn new(api: A, families: FamiliesConfig) -> Self {
        Self { api, families }
    }

    pub fn families(&self) -> FamiliesConfig {
        self.families
    }

    /// Collect one snapshot.
    ///
    /// Fails when authentication fails or the API info resource, which drives
    /// every version decision, is unavailable. Other resource failures are
    /// carried inside the snapshot.
    pub async fn scrape(&self) -> Result<Snapshot, ScrapeError> {
        let credential = self.api.authenticate().await?;
        debug!(issued_by = credential.issued_by(), "obtained manager credential");

        let api = &self.api;
        let cred = &credential;
        let skip_logs = self.families.skip_last_logs;

        let (info, agents, hourly, daily, remoted, logs, analysisd, validation, nodes) = tokio::join!(
            api.fetch(Endpoint::ApiInfo, cred),
            api.fetch(Endpoint::AgentsOverview, cred),
            api.fetch(Endpoint::HourlyStats, cred),
            api.fetch(Endpoint::DailyStats, cred),
            api.fetch(Endpoint::RemotedStats, cred),
            async move {
                if skip_logs {
                    None
                } else {
                    Some(api.fetch(Endpoint::Logs, cred).await)
                }
            },
            api.fetch(Endpoint::AnalysisdStats, cred),
            api.fetch(Endpoint::ConfigValidation, cred),
            api.fetch(Endpoint::NodeHealth, cred),
        );

        let api_info = reconcile::api_info(info?)?;
        let version = api_info.version;
        debug!(api_version = %version, "reconciling manager resources");

        let include_last_registered = !self.families.skip_last_registered_agent;

        Ok(Snapshot {
            agents: agents.and_then(|raw| reconcile::agents(raw, include_last_registered)),
            hourly: hourly.and_then(|raw| reconcile::decode("hourly_stats", raw)),
            daily: daily.and_then(|raw| reconcile::affected_items("daily_stats", raw)),
            remoted: remoted.and_then(|raw| {
                reconcile::daemon_stats("manager_stats_remote", REMOTED_FIELDS, raw, version)
            }),
            logs: logs.map(|logs| logs.and_then(|raw| reconcile::affected_items("logs", raw))),
            analysisd: analysisd.and_then(|raw| {
                reconcile::daemon_stats("analysisd_stats", ANALYSISD_FIELDS, raw, version)
            }),
            validation: validation
                .and_then(|raw| reconcile::affected_items("config_validation", raw)),
            nodes: node_list(nodes),
            api_info,
        })
    }
}

/// Status the health check answers with when clustering is disabled.
const CLUSTER_NOT_RUNNING: u16 = 400;

/// The health check endpoint rejects the request when clustering is disabled;
/// that only means there is no node list. Any other failure is kept so the
/// nodes_healthcheck family reports it.
fn node_list(raw: Result<Value, ScrapeError>) -> Option<Resource<Vec<NodeHealth>>> {
    match raw {
        Err(ScrapeError::Fetch {
            status: Some(CLUSTER_NOT_RUNNING),
            message,
            ..
        }) => {
            debug!(detail = %message, "clustering disabled, omitting nodes_healthcheck");
            None
        }
        raw => Some(raw.and_then(|raw| reconcile::affected_items("node_health", raw))),
    }
}
