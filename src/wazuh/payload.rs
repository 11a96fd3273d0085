//! Typed views of the manager API responses.
//!
//! Every field the exporter reads is named here. Fields are optional so that
//! absence is reported per family by the metric builder rather than failing
//! deserialization of the whole resource.

use serde::Deserialize;
use serde_json::{Map, Value};

/// Response envelope shared by all endpoints.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub data: Value,
}

/// `data` of list endpoints.
#[derive(Debug, Deserialize)]
pub struct AffectedItems<T> {
    pub affected_items: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub data: LoginData,
}

#[derive(Debug, Deserialize)]
pub struct LoginData {
    pub token: String,
}

// --- overview/agents ---

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentsOverview {
    pub nodes: Option<Vec<NodeCount>>,
    pub groups: Option<Vec<GroupCount>>,
    pub agent_status: Option<Map<String, Value>>,
    pub agent_version: Option<Vec<VersionCount>>,
    pub last_registered_agent: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NodeCount {
    pub node_name: Option<String>,
    pub count: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GroupCount {
    pub name: Option<String>,
    pub count: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VersionCount {
    pub version: Option<String>,
    pub count: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LastRegisteredAgent {
    pub name: Option<String>,
    pub status: Option<String>,
    pub node_name: Option<String>,
    pub os: Option<Map<String, Value>>,
}

// --- manager/stats/* ---

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HourlyStats {
    pub total_affected_items: Option<f64>,
    pub total_failed_items: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DailyStats {
    pub hour: Option<u32>,
    #[serde(rename = "totalAlerts")]
    pub total_alerts: Option<f64>,
    pub syscheck: Option<f64>,
    pub firewall: Option<f64>,
    pub events: Option<f64>,
}

// --- manager/logs ---

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogEntry {
    pub tag: Option<String>,
    pub level: Option<String>,
    pub description: Option<String>,
}

// --- manager/configuration/validation ---

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConfigValidation {
    pub name: Option<String>,
    pub status: Option<String>,
}

// --- cluster/healthcheck ---

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NodeHealth {
    pub info: Option<Map<String, Value>>,
}

/// Renders a JSON scalar the way it should appear in a label value.
pub fn label_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_daily_stats_reads_camel_case_total() {
        let stats: DailyStats = serde_json::from_value(json!({
            "hour": 13,
            "totalAlerts": 42,
            "syscheck": 1,
            "firewall": 0,
            "events": 900,
            "alerts": []
        }))
        .expect("valid daily stats");

        assert_eq!(stats.hour, Some(13));
        assert_eq!(stats.total_alerts, Some(42.0));
        assert_eq!(stats.events, Some(900.0));
    }

    #[test]
    fn test_agents_overview_tolerates_missing_sections() {
        let overview: AgentsOverview =
            serde_json::from_value(json!({ "nodes": [] })).expect("valid overview");
        assert!(overview.nodes.is_some());
        assert!(overview.groups.is_none());
        assert!(overview.agent_status.is_none());
    }

    #[test]
    fn test_label_value_unquotes_strings() {
        assert_eq!(label_value(&json!("x86_64")), "x86_64");
        assert_eq!(label_value(&json!(22)), "22");
        assert_eq!(label_value(&json!(true)), "true");
        assert_eq!(label_value(&Value::Null), "null");
    }
}
