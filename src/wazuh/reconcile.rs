//! Normalizes raw manager payloads into the per-scrape snapshot types.
//!
//! This is where response shapes that changed across manager versions are
//! reconciled: the agents status nesting introduced in 4.4, and the daemon
//! statistics fields removed in 4.7.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::error::ScrapeError;
use super::payload::{
    label_value, AffectedItems, AgentsOverview, GroupCount, LastRegisteredAgent, NodeCount,
    VersionCount,
};
use super::version::{ApiVersion, VersionParseError, LEGACY_STATS_CUTOFF};

/// Status value that excludes a last-registered agent from the info family.
const NEVER_CONNECTED: &str = "never_connected";

/// Reconciled API root resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiInfo {
    pub version: ApiVersion,
    /// Every key of the resource, in response order, rendered as text.
    pub fields: Vec<(String, String)>,
}

/// Agent counts per connection status.
///
/// Upstream controls these numbers; the buckets are not required to add up
/// to `total`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusCounts {
    pub active: Option<f64>,
    pub disconnected: Option<f64>,
    pub never_connected: Option<f64>,
    pub pending: Option<f64>,
    pub total: Option<f64>,
}

/// Which `agent_status` layout the manager returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusShape {
    /// Counts nested under `connection` (4.4 and later).
    Connection,
    /// Counts directly under `agent_status` (before 4.4).
    Legacy,
}

/// A last-registered agent eligible for the info family.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredAgent {
    pub node_name: Option<String>,
    pub os: Option<Vec<(String, String)>>,
    /// Raw record, kept for diagnostics.
    pub record: String,
}

/// Reconciled `overview/agents` resource.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentsSnapshot {
    pub nodes: Option<Vec<NodeCount>>,
    pub groups: Option<Vec<GroupCount>>,
    pub status: Option<StatusCounts>,
    pub versions: Option<Vec<VersionCount>>,
    /// `None` when the payload has no last-registered list or the family is
    /// disabled. An undecodable eligible record fails only this list.
    pub last_registered: Option<Result<Vec<RegisteredAgent>, ScrapeError>>,
    /// Number of last-registered agents excluded as never connected.
    pub skipped_agents: usize,
}

/// A numeric statistics field and the versions that report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatField {
    pub name: &'static str,
    /// Reported only by managers older than this version.
    pub removed_in: Option<ApiVersion>,
}

impl StatField {
    const fn always(name: &'static str) -> Self {
        Self {
            name,
            removed_in: None,
        }
    }

    const fn legacy(name: &'static str) -> Self {
        Self {
            name,
            removed_in: Some(LEGACY_STATS_CUTOFF),
        }
    }

    /// Whether a manager running `version` is expected to report this field.
    pub fn expected(&self, version: ApiVersion) -> bool {
        match self.removed_in {
            Some(cutoff) => version < cutoff,
            None => true,
        }
    }
}

/// `manager/stats/remoted` fields, in emission order.
pub const REMOTED_FIELDS: &[StatField] = &[
    StatField::always("queue_size"),
    StatField::always("total_queue_size"),
    StatField::always("tcp_sessions"),
    StatField::always("evt_count"),
    StatField::always("ctrl_msg_count"),
    StatField::always("discarded_count"),
    StatField::legacy("queued_msgs"),
    StatField::always("recv_bytes"),
    StatField::always("dequeued_after_close"),
];

/// `manager/stats/analysisd` fields, in emission order.
pub const ANALYSISD_FIELDS: &[StatField] = &[
    StatField::always("total_events_decoded"),
    StatField::always("syscheck_events_decoded"),
    StatField::legacy("syscheck_edps"),
    StatField::legacy("syscollector_edps"),
    StatField::legacy("rootcheck_edps"),
    StatField::legacy("sca_edps"),
    StatField::legacy("hostinfo_events_decoded"),
    StatField::legacy("hostinfo_edps"),
    StatField::legacy("winevt_edps"),
    StatField::legacy("dbsync_mdps"),
    StatField::legacy("other_events_edps"),
    StatField::legacy("events_edps"),
    StatField::always("syscollector_events_decoded"),
    StatField::always("rootcheck_events_decoded"),
    StatField::always("sca_events_decoded"),
    StatField::always("winevt_events_decoded"),
    StatField::always("dbsync_messages_dispatched"),
    StatField::always("other_events_decoded"),
    StatField::always("events_processed"),
    StatField::always("events_received"),
    StatField::always("events_dropped"),
    StatField::always("alerts_written"),
    StatField::always("firewall_written"),
    StatField::always("fts_written"),
    StatField::always("syscheck_queue_usage"),
    StatField::always("syscheck_queue_size"),
    StatField::always("syscollector_queue_usage"),
    StatField::always("syscollector_queue_size"),
    StatField::always("rootcheck_queue_usage"),
    StatField::always("rootcheck_queue_size"),
    StatField::always("sca_queue_usage"),
    StatField::always("sca_queue_size"),
    StatField::always("hostinfo_queue_usage"),
    StatField::always("hostinfo_queue_size"),
    StatField::always("winevt_queue_usage"),
    StatField::always("dbsync_queue_usage"),
    StatField::always("dbsync_queue_size"),
    StatField::always("upgrade_queue_usage"),
    StatField::always("upgrade_queue_size"),
    StatField::always("event_queue_usage"),
    StatField::always("event_queue_size"),
    StatField::always("rule_matching_queue_usage"),
    StatField::always("rule_matching_queue_size"),
    StatField::always("alerts_queue_usage"),
    StatField::always("alerts_queue_size"),
    StatField::always("firewall_queue_usage"),
    StatField::always("statistical_queue_usage"),
    StatField::always("statistical_queue_size"),
    StatField::always("archives_queue_usage"),
    StatField::always("archives_queue_size"),
];

/// One daemon statistics record, restricted to the fields expected for the
/// manager version.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonStats {
    pub values: Vec<(&'static str, f64)>,
}

/// Reconcile the API root resource.
pub fn api_info(raw: Value) -> Result<ApiInfo, ScrapeError> {
    let Value::Object(map) = raw else {
        return Err(ScrapeError::ShapeMismatch {
            resource: "api_info",
            detail: "expected an object".to_string(),
        });
    };

    let raw_version = map
        .get("api_version")
        .and_then(Value::as_str)
        .ok_or_else(|| ScrapeError::ShapeMismatch {
            resource: "api_info",
            detail: "missing api_version".to_string(),
        })?;

    let version = raw_version
        .parse()
        .map_err(|e: VersionParseError| ScrapeError::ShapeMismatch {
            resource: "api_info",
            detail: e.to_string(),
        })?;

    let fields = map
        .iter()
        .map(|(key, value)| (key.clone(), label_value(value)))
        .collect();

    Ok(ApiInfo { version, fields })
}

/// Pick the status-count bucket out of `agent_status`.
pub fn status_counts(
    agent_status: &Map<String, Value>,
) -> Result<(StatusCounts, StatusShape), ScrapeError> {
    const KEYS: [&str; 5] = ["active", "disconnected", "never_connected", "pending", "total"];

    let (bucket, shape) = match agent_status.get("connection") {
        Some(Value::Object(connection)) => (connection, StatusShape::Connection),
        Some(_) => {
            return Err(ScrapeError::ShapeMismatch {
                resource: "agents_overview",
                detail: "agent_status.connection is not an object".to_string(),
            })
        }
        None if KEYS.iter().any(|k| agent_status.contains_key(*k)) => {
            (agent_status, StatusShape::Legacy)
        }
        None => {
            return Err(ScrapeError::ShapeMismatch {
                resource: "agents_overview",
                detail: "agent_status has neither connection counts nor legacy counts"
                    .to_string(),
            })
        }
    };

    let count = |key: &str| bucket.get(key).and_then(Value::as_f64);

    Ok((
        StatusCounts {
            active: count("active"),
            disconnected: count("disconnected"),
            never_connected: count("never_connected"),
            pending: count("pending"),
            total: count("total"),
        },
        shape,
    ))
}

/// Split last-registered agents into eligible records, logging and counting
/// the never-connected ones.
///
/// Only `status` decides exclusion. An eligible record that does not decode
/// fails the list; the skip count still covers every record.
pub fn last_registered(raw: &[Value]) -> (Result<Vec<RegisteredAgent>, ScrapeError>, usize) {
    let mut eligible = Vec::with_capacity(raw.len());
    let mut failure = None;
    let mut skipped = 0;

    for record in raw {
        if record.get("status").and_then(Value::as_str) == Some(NEVER_CONNECTED) {
            warn!(
                agent = record.get("name").and_then(serde_json::Value::as_str).unwrap_or("<unnamed>"),
                status = NEVER_CONNECTED,
                record = %record,
                "last registered agent never connected, skipping its last_registered_agent sample",
            );
            skipped += 1;
            continue;
        }

        if failure.is_some() {
            continue;
        }

        match serde_json::from_value::<LastRegisteredAgent>(record.clone()) {
            Ok(agent) => eligible.push(RegisteredAgent {
                node_name: agent.node_name,
                os: agent.os.map(|os| {
                    os.iter()
                        .map(|(key, value)| (key.clone(), label_value(value)))
                        .collect()
                }),
                record: record.to_string(),
            }),
            Err(e) => {
                failure = Some(ScrapeError::ShapeMismatch {
                    resource: "last_registered_agent",
                    detail: format!("{e} in record {record}"),
                });
            }
        }
    }

    match failure {
        Some(error) => (Err(error), skipped),
        None => (Ok(eligible), skipped),
    }
}

/// Reconcile the `overview/agents` resource.
pub fn agents(raw: Value, include_last_registered: bool) -> Result<AgentsSnapshot, ScrapeError> {
    let overview: AgentsOverview = decode("agents_overview", raw)?;

    let status = match overview.agent_status {
        Some(ref agent_status) => {
            let (counts, shape) = status_counts(agent_status)?;
            debug!(shape = ?shape, "reconciled agent status counts");
            Some(counts)
        }
        None => None,
    };

    let (last_registered, skipped_agents) = match overview.last_registered_agent {
        Some(ref records) if include_last_registered => {
            let (eligible, skipped) = last_registered(records);
            (Some(eligible), skipped)
        }
        _ => (None, 0),
    };

    Ok(AgentsSnapshot {
        nodes: overview.nodes,
        groups: overview.groups,
        status,
        versions: overview.agent_version,
        last_registered,
        skipped_agents,
    })
}

/// Reconcile a daemon statistics resource against the version-gated field
/// catalog.
///
/// A field expected for `version` but absent fails the whole resource; the
/// metric family fed by it is then omitted from the scrape.
pub fn daemon_stats(
    family: &'static str,
    fields: &[StatField],
    raw: Value,
    version: ApiVersion,
) -> Result<Vec<DaemonStats>, ScrapeError> {
    let records: Vec<Map<String, Value>> = affected_items(family, raw)?;

    records
        .iter()
        .map(|record| {
            let mut values = Vec::with_capacity(fields.len());
            for field in fields.iter().filter(|f| f.expected(version)) {
                let value = match record.get(field.name) {
                    None | Some(Value::Null) => {
                        return Err(ScrapeError::field_missing(family, field.name, record))
                    }
                    Some(value) => value.as_f64().ok_or_else(|| ScrapeError::ShapeMismatch {
                        resource: family,
                        detail: format!("field {:?} is not numeric: {value}", field.name),
                    })?,
                };
                values.push((field.name, value));
            }
            Ok(DaemonStats { values })
        })
        .collect()
}

/// Decode the `affected_items` list of a list endpoint.
pub fn affected_items<T: DeserializeOwned>(
    resource: &'static str,
    raw: Value,
) -> Result<Vec<T>, ScrapeError> {
    let items: AffectedItems<T> = decode(resource, raw)?;
    Ok(items.affected_items)
}

/// Decode a payload into its typed record.
pub fn decode<T: DeserializeOwned>(resource: &'static str, raw: Value) -> Result<T, ScrapeError> {
    serde_json::from_value(raw).map_err(|e| ScrapeError::ShapeMismatch {
        resource,
        detail: e.to_string(),
    })
}
