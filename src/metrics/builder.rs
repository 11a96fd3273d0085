use tracing::warn;

use super::exposition::sanitize_label_name;
use super::{label, MetricFamily, MetricType};
use crate::collector::{Resource, Snapshot};
use crate::config::FamiliesConfig;
use crate::wazuh::payload::label_value;
use crate::wazuh::reconcile::AgentsSnapshot;
use crate::wazuh::ScrapeError;

/// Node info keys that never become labels.
const NODE_INFO_EXCLUDED: [&str; 2] = ["name", "n_active_agents"];

/// The fixed family catalog, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FamilyKind {
    TotalAgent,
    TotalGroup,
    AgentStatus,
    AgentVersion,
    LastRegisteredAgent,
    ManagerStatsHourly,
    NodesHealthcheck,
    WazuhApi,
    ManagerStatsTotal,
    ManagerStatsRemote,
    LastLogs,
    AnalysisdStats,
    ValidateConfiguration,
}

impl FamilyKind {
    pub const ALL: [FamilyKind; 13] = [
        FamilyKind::TotalAgent,
        FamilyKind::TotalGroup,
        FamilyKind::AgentStatus,
        FamilyKind::AgentVersion,
        FamilyKind::LastRegisteredAgent,
        FamilyKind::ManagerStatsHourly,
        FamilyKind::NodesHealthcheck,
        FamilyKind::WazuhApi,
        FamilyKind::ManagerStatsTotal,
        FamilyKind::ManagerStatsRemote,
        FamilyKind::LastLogs,
        FamilyKind::AnalysisdStats,
        FamilyKind::ValidateConfiguration,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::TotalAgent => "wazuh_total_agent",
            Self::TotalGroup => "wazuh_total_group",
            Self::AgentStatus => "wazuh_agent_status",
            Self::AgentVersion => "wazuh_agent_version",
            Self::LastRegisteredAgent => "last_registered_agent",
            Self::ManagerStatsHourly => "manager_stats_hourly",
            Self::NodesHealthcheck => "nodes_healthcheck",
            Self::WazuhApi => "wazuh_api",
            Self::ManagerStatsTotal => "manager_stats_total",
            Self::ManagerStatsRemote => "manager_stats_remote",
            Self::LastLogs => "last_logs",
            Self::AnalysisdStats => "analysisd_stats",
            Self::ValidateConfiguration => "wazuh_validate_configuration",
        }
    }

    fn help(self) -> &'static str {
        match self {
            Self::TotalAgent => "Total Wazuh agents count",
            Self::TotalGroup => "Total Wazuh groups count",
            Self::AgentStatus => "Total Wazuh agents by status",
            Self::AgentVersion => "Wazuh agent versions",
            Self::LastRegisteredAgent => "Wazuh last registered agent",
            Self::ManagerStatsHourly => {
                "Wazuh statistical information per hour. \
                 Each number in the averages field represents the average of alerts per hour"
            }
            Self::NodesHealthcheck => "Wazuh nodes healthcheck",
            Self::WazuhApi => "Wazuh API information",
            Self::ManagerStatsTotal => "Wazuh statistical information for the current date",
            Self::ManagerStatsRemote => "Wazuh remoted statistical information",
            Self::LastLogs => "The last 2000 wazuh log entries",
            Self::AnalysisdStats => "Wazuh analysisd statistical information",
            Self::ValidateConfiguration => "Return whether the Wazuh configuration is correct",
        }
    }

    fn metric_type(self) -> MetricType {
        match self {
            Self::TotalAgent
            | Self::TotalGroup
            | Self::AgentStatus
            | Self::ManagerStatsTotal
            | Self::ManagerStatsRemote
            | Self::AnalysisdStats => MetricType::Summary,
            Self::AgentVersion => MetricType::Gauge,
            Self::LastRegisteredAgent
            | Self::ManagerStatsHourly
            | Self::NodesHealthcheck
            | Self::WazuhApi
            | Self::LastLogs
            | Self::ValidateConfiguration => MetricType::Info,
        }
    }

    fn family(self) -> MetricFamily {
        MetricFamily::new(self.name(), self.help(), self.metric_type())
    }
}

/// A family that could not be built this scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct FamilyFailure {
    pub family: FamilyKind,
    pub error: ScrapeError,
}

/// Lazily built families of one snapshot.
///
/// Each family is built when the iterator reaches it. Families that fail are
/// logged, recorded in [`Families::failures`] and skipped; iteration goes on
/// with the next family. Families disabled by configuration, or with no
/// source data by design, are skipped silently.
pub struct Families<'a> {
    snapshot: &'a Snapshot,
    toggles: FamiliesConfig,
    next: usize,
    failures: Vec<FamilyFailure>,
}

/// Build the metric families of a snapshot.
pub fn build(snapshot: &Snapshot, toggles: FamiliesConfig) -> Families<'_> {
    Families {
        snapshot,
        toggles,
        next: 0,
        failures: Vec::new(),
    }
}

impl<'a> Families<'a> {
    /// Families that failed so far.
    pub fn failures(&self) -> &[FamilyFailure] {
        &self.failures
    }

    /// Number of last-registered agents left out as never connected.
    pub fn skipped_agents(&self) -> usize {
        match &self.snapshot.agents {
            Ok(agents) => agents.skipped_agents,
            Err(_) => 0,
        }
    }

    fn build_family(&self, kind: FamilyKind) -> Result<Option<MetricFamily>, ScrapeError> {
        let snapshot = self.snapshot;
        let name = kind.name();
        let mut family = kind.family();

        match kind {
            FamilyKind::TotalAgent => {
                let nodes = agents(snapshot)?
                    .nodes
                    .as_ref()
                    .ok_or_else(|| missing(name, "nodes", "overview/agents"))?;
                for node in nodes {
                    let node_name = required(name, "node_name", node.node_name.as_ref(), node)?;
                    let count = required(name, "count", node.count, node)?;
                    family.add_sample(
                        "wazuh_agents_count",
                        vec![label("node_name", node_name.as_str())],
                        count,
                    );
                }
            }

            FamilyKind::TotalGroup => {
                let groups = agents(snapshot)?
                    .groups
                    .as_ref()
                    .ok_or_else(|| missing(name, "groups", "overview/agents"))?;
                for group in groups {
                    let group_name = required(name, "name", group.name.as_ref(), group)?;
                    let count = required(name, "count", group.count, group)?;
                    family.add_sample(
                        "wazuh_agents_group",
                        vec![label("group_name", group_name.as_str())],
                        count,
                    );
                }
            }

            FamilyKind::AgentStatus => {
                let status = agents(snapshot)?
                    .status
                    .as_ref()
                    .ok_or_else(|| missing(name, "agent_status", "overview/agents"))?;
                let buckets = [
                    ("wazuh_active_agents", "active", status.active),
                    ("wazuh_disconnected_agents", "disconnected", status.disconnected),
                    ("wazuh_never_connected_agents", "never_connected", status.never_connected),
                    ("wazuh_pending_agents", "pending", status.pending),
                    ("wazuh_total_agents", "total", status.total),
                ];
                for (sample, field, value) in buckets {
                    let value = required(name, field, value, status)?;
                    family.add_sample(sample, Vec::new(), value);
                }
            }

            FamilyKind::AgentVersion => {
                let versions = agents(snapshot)?
                    .versions
                    .as_ref()
                    .ok_or_else(|| missing(name, "agent_version", "overview/agents"))?;
                for entry in versions {
                    let version = required(name, "version", entry.version.as_ref(), entry)?;
                    let count = required(name, "count", entry.count, entry)?;
                    family.add_sample(name, vec![label("version", version.as_str())], count);
                }
            }

            FamilyKind::LastRegisteredAgent => {
                if self.toggles.skip_last_registered_agent {
                    return Ok(None);
                }
                let registered = agents(snapshot)?
                    .last_registered
                    .as_ref()
                    .ok_or_else(|| missing(name, "last_registered_agent", "overview/agents"))
                    .and_then(resource)?;
                for agent in registered {
                    let node_name =
                        required(name, "node_name", agent.node_name.as_ref(), &agent.record)?;
                    let os = required(name, "os", agent.os.as_ref(), &agent.record)?;
                    for (attribute, value) in os {
                        let key = sanitize_label_name(&format!("{node_name}_{attribute}"));
                        family.add_info(vec![label(key, value.as_str())]);
                    }
                }
            }

            FamilyKind::ManagerStatsHourly => {
                let hourly = resource(&snapshot.hourly)?;
                let affected =
                    required(name, "total_affected_items", hourly.total_affected_items, hourly)?;
                let failed = required(name, "total_failed_items", hourly.total_failed_items, hourly)?;
                family.add_sample("total_affected_items", Vec::new(), affected);
                family.add_sample("total_failed_items", Vec::new(), failed);
            }

            FamilyKind::NodesHealthcheck => {
                let nodes = match &snapshot.nodes {
                    Some(nodes) => resource(nodes)?,
                    None => return Ok(None),
                };
                if nodes.is_empty() {
                    return Ok(None);
                }
                for node in nodes {
                    let info = required(name, "info", node.info.as_ref(), node)?;
                    let node_name = info
                        .get("name")
                        .map(label_value)
                        .ok_or_else(|| ScrapeError::field_missing(name, "info.name", node))?;

                    let mut labels = vec![label("node_name", node_name)];
                    labels.extend(
                        info.iter()
                            .filter(|(key, _)| !NODE_INFO_EXCLUDED.contains(&key.as_str()))
                            .map(|(key, value)| label(sanitize_label_name(key), label_value(value))),
                    );
                    family.add_info(labels);
                }
            }

            FamilyKind::WazuhApi => {
                if self.toggles.skip_api_info {
                    return Ok(None);
                }
                for (key, value) in &snapshot.api_info.fields {
                    family.add_info(vec![label(sanitize_label_name(key), value.as_str())]);
                }
            }

            FamilyKind::ManagerStatsTotal => {
                for stats in resource(&snapshot.daily)? {
                    let hour = required(name, "hour", stats.hour, stats)?;
                    let series = [
                        ("total_alerts_hour", "totalAlerts", stats.total_alerts),
                        ("total_syscheck_hour", "syscheck", stats.syscheck),
                        ("total_firewall_hour", "firewall", stats.firewall),
                        ("total_events_hour", "events", stats.events),
                    ];
                    for (prefix, field, value) in series {
                        let value = required(name, field, value, stats)?;
                        family.add_sample(format!("{prefix}_{hour}"), Vec::new(), value);
                    }
                }
            }

            FamilyKind::ManagerStatsRemote => {
                for record in resource(&snapshot.remoted)? {
                    for &(field, value) in &record.values {
                        family.add_sample(field, vec![label(name, field)], value);
                    }
                }
            }

            FamilyKind::LastLogs => {
                let logs = match &snapshot.logs {
                    Some(logs) if !self.toggles.skip_last_logs => resource(logs)?,
                    _ => return Ok(None),
                };
                for entry in logs {
                    let tag = required(name, "tag", entry.tag.as_ref(), entry)?;
                    let level = required(name, "level", entry.level.as_ref(), entry)?;
                    let description =
                        required(name, "description", entry.description.as_ref(), entry)?;
                    let key = sanitize_label_name(&format!("{tag}_{level}"));
                    family.add_info(vec![label(key, description.trim())]);
                }
            }

            FamilyKind::AnalysisdStats => {
                for record in resource(&snapshot.analysisd)? {
                    for &(field, value) in &record.values {
                        family.add_sample(name, vec![label(name, field)], value);
                    }
                }
            }

            FamilyKind::ValidateConfiguration => {
                for node in resource(&snapshot.validation)? {
                    let node_name = required(name, "name", node.name.as_ref(), node)?;
                    let status = required(name, "status", node.status.as_ref(), node)?;
                    family.add_info(vec![
                        label("status", status.trim()),
                        label("node_name", node_name.as_str()),
                    ]);
                }
            }
        }

        Ok(Some(family))
    }
}

impl Iterator for Families<'_> {
    type Item = MetricFamily;

    fn next(&mut self) -> Option<MetricFamily> {
        while let Some(&kind) = FamilyKind::ALL.get(self.next) {
            self.next += 1;

            match self.build_family(kind) {
                Ok(Some(family)) => return Some(family),
                Ok(None) => continue,
                Err(error) => {
                    warn!(family = kind.name(), error = %error, "skipping metric family");
                    self.failures.push(FamilyFailure {
                        family: kind,
                        error,
                    });
                }
            }
        }

        None
    }
}

fn resource<T>(resource: &Resource<T>) -> Result<&T, ScrapeError> {
    resource.as_ref().map_err(Clone::clone)
}

fn agents(snapshot: &Snapshot) -> Result<&AgentsSnapshot, ScrapeError> {
    resource(&snapshot.agents)
}

fn required<T>(
    family: &'static str,
    field: &str,
    value: Option<T>,
    record: &impl std::fmt::Debug,
) -> Result<T, ScrapeError> {
    value.ok_or_else(|| ScrapeError::field_missing(family, field, record))
}

fn missing(family: &'static str, field: &str, resource: &str) -> ScrapeError {
    ScrapeError::FieldMissing {
        family,
        field: field.to_string(),
        record: resource.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::metrics::render;
    use crate::wazuh::payload::{
        ConfigValidation, DailyStats, GroupCount, HourlyStats, LogEntry, NodeCount, NodeHealth,
        VersionCount,
    };
    use crate::wazuh::reconcile::{
        self, ApiInfo, DaemonStats, RegisteredAgent, StatusCounts, ANALYSISD_FIELDS,
    };
    use crate::wazuh::ApiVersion;

    fn agents_snapshot() -> AgentsSnapshot {
        AgentsSnapshot {
            nodes: Some(vec![NodeCount {
                node_name: Some("node01".to_string()),
                count: Some(3.0),
            }]),
            groups: Some(vec![GroupCount {
                name: Some("default".to_string()),
                count: Some(3.0),
            }]),
            status: Some(StatusCounts {
                active: Some(2.0),
                disconnected: Some(1.0),
                never_connected: Some(0.0),
                pending: Some(0.0),
                total: Some(3.0),
            }),
            versions: Some(vec![VersionCount {
                version: Some("Wazuh v4.6.0".to_string()),
                count: Some(3.0),
            }]),
            last_registered: Some(Ok(vec![RegisteredAgent {
                node_name: Some("node01".to_string()),
                os: Some(vec![("arch".to_string(), "x86_64".to_string())]),
                record: "{}".to_string(),
            }])),
            skipped_agents: 1,
        }
    }

    fn snapshot() -> Snapshot {
        Snapshot {
            api_info: ApiInfo {
                version: ApiVersion::new(4, 8, 0),
                fields: vec![
                    ("title".to_string(), "Wazuh API REST".to_string()),
                    ("api_version".to_string(), "4.8.0".to_string()),
                ],
            },
            agents: Ok(agents_snapshot()),
            hourly: Ok(HourlyStats {
                total_affected_items: Some(24.0),
                total_failed_items: Some(0.0),
            }),
            daily: Ok(vec![DailyStats {
                hour: Some(5),
                total_alerts: Some(10.0),
                syscheck: Some(1.0),
                firewall: Some(0.0),
                events: Some(120.0),
            }]),
            remoted: Ok(vec![DaemonStats {
                values: vec![("queue_size", 0.0), ("tcp_sessions", 4.0)],
            }]),
            logs: Some(Ok(vec![LogEntry {
                tag: Some("wazuh-modulesd:syscollector".to_string()),
                level: Some("info".to_string()),
                description: Some(" Evaluation finished. \n".to_string()),
            }])),
            analysisd: Ok(vec![DaemonStats {
                values: vec![("events_received", 900.0), ("sca_queue_size", 16384.0)],
            }]),
            validation: Ok(vec![ConfigValidation {
                name: Some("master-node".to_string()),
                status: Some("OK ".to_string()),
            }]),
            nodes: Some(Ok(vec![NodeHealth {
                info: json!({
                    "name": "master-node",
                    "type": "master",
                    "version": "4.8.0",
                    "n_active_agents": 3
                })
                .as_object()
                .cloned(),
            }])),
        }
    }

    fn names(snapshot: &Snapshot, toggles: FamiliesConfig) -> Vec<&'static str> {
        build(snapshot, toggles).map(|f| f.name).collect()
    }

    #[test]
    fn test_full_snapshot_yields_catalog_in_order() {
        let snapshot = snapshot();
        let all: Vec<&str> = FamilyKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(names(&snapshot, FamiliesConfig::default()), all);
    }

    #[test]
    fn test_skip_toggles_remove_only_their_family() {
        let snapshot = snapshot();
        let cases = [
            (
                FamiliesConfig {
                    skip_last_logs: true,
                    ..Default::default()
                },
                "last_logs",
            ),
            (
                FamiliesConfig {
                    skip_api_info: true,
                    ..Default::default()
                },
                "wazuh_api",
            ),
            (
                FamiliesConfig {
                    skip_last_registered_agent: true,
                    ..Default::default()
                },
                "last_registered_agent",
            ),
        ];

        for (toggles, removed) in cases {
            let got = names(&snapshot, toggles);
            let want: Vec<&str> = FamilyKind::ALL
                .iter()
                .map(|k| k.name())
                .filter(|n| *n != removed)
                .collect();
            assert_eq!(got, want, "toggle for {removed}");
        }
    }

    #[test]
    fn test_failed_resource_disables_dependent_families() {
        let mut snapshot = snapshot();
        snapshot.agents = Err(ScrapeError::Fetch {
            endpoint: "agents_overview",
            status: Some(500),
            message: "boom".to_string(),
        });

        let mut families = build(&snapshot, FamiliesConfig::default());
        let got: Vec<&str> = families.by_ref().map(|f| f.name).collect();

        assert_eq!(got.first(), Some(&"manager_stats_hourly"));
        assert_eq!(got.len(), FamilyKind::ALL.len() - 5);
        let failed: Vec<FamilyKind> = families.failures().iter().map(|f| f.family).collect();
        assert_eq!(
            failed,
            vec![
                FamilyKind::TotalAgent,
                FamilyKind::TotalGroup,
                FamilyKind::AgentStatus,
                FamilyKind::AgentVersion,
                FamilyKind::LastRegisteredAgent,
            ]
        );
    }

    #[test]
    fn test_missing_record_field_fails_only_that_family() {
        let mut snapshot = snapshot();
        if let Ok(stats) = snapshot.daily.as_mut() {
            stats[0].firewall = None;
        }

        let mut families = build(&snapshot, FamiliesConfig::default());
        let got: Vec<&str> = families.by_ref().map(|f| f.name).collect();

        assert!(!got.contains(&"manager_stats_total"));
        assert_eq!(got.len(), FamilyKind::ALL.len() - 1);
        match &families.failures()[0].error {
            ScrapeError::FieldMissing { family, field, .. } => {
                assert_eq!(*family, "manager_stats_total");
                assert_eq!(field, "firewall");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_analysisd_payload_missing_gated_field() {
        let mut record = serde_json::Map::new();
        for field in ANALYSISD_FIELDS {
            record.insert(field.name.to_string(), json!(1));
        }
        record.remove("events_edps");
        let raw = json!({ "affected_items": [record] });

        let mut snapshot = snapshot();
        snapshot.analysisd =
            reconcile::daemon_stats("analysisd_stats", ANALYSISD_FIELDS, raw, ApiVersion::new(4, 6, 0));

        let mut families = build(&snapshot, FamiliesConfig::default());
        let got: Vec<&str> = families.by_ref().map(|f| f.name).collect();

        assert_eq!(got.len(), FamilyKind::ALL.len() - 1);
        assert!(!got.contains(&"analysisd_stats"));
        assert_eq!(families.failures().len(), 1);
        assert_eq!(families.failures()[0].family, FamilyKind::AnalysisdStats);
    }

    #[test]
    fn test_analysisd_emits_sca_queue_size_once() {
        let mut record = serde_json::Map::new();
        for field in ANALYSISD_FIELDS {
            record.insert(field.name.to_string(), json!(2));
        }
        let raw = json!({ "affected_items": [record] });

        let mut snapshot = snapshot();
        snapshot.analysisd =
            reconcile::daemon_stats("analysisd_stats", ANALYSISD_FIELDS, raw, ApiVersion::new(4, 7, 0));

        let text = render(build(&snapshot, FamiliesConfig::default()));
        assert_eq!(
            text.matches("analysisd_stats{analysisd_stats=\"sca_queue_size\"} 2.0").count(),
            1
        );
        assert_eq!(text.matches("analysisd_stats{analysisd_stats=").count(), 40);
    }

    #[test]
    fn test_empty_node_list_omits_nodes_healthcheck() {
        let mut snapshot = snapshot();
        snapshot.nodes = Some(Ok(Vec::new()));

        let mut families = build(&snapshot, FamiliesConfig::default());
        let got: Vec<&str> = families.by_ref().map(|f| f.name).collect();

        assert!(!got.contains(&"nodes_healthcheck"));
        assert!(families.failures().is_empty());
    }

    #[test]
    fn test_node_health_error_fails_nodes_healthcheck() {
        let mut snapshot = snapshot();
        snapshot.nodes = Some(Err(ScrapeError::Fetch {
            endpoint: "node_health",
            status: Some(500),
            message: "Internal error".to_string(),
        }));

        let mut families = build(&snapshot, FamiliesConfig::default());
        let got: Vec<&str> = families.by_ref().map(|f| f.name).collect();

        assert_eq!(got.len(), FamilyKind::ALL.len() - 1);
        assert!(!got.contains(&"nodes_healthcheck"));
        assert_eq!(families.failures().len(), 1);
        assert_eq!(families.failures()[0].family, FamilyKind::NodesHealthcheck);
    }

    #[test]
    fn test_malformed_last_registered_fails_only_that_family() {
        let mut snapshot = snapshot();
        if let Ok(agents) = snapshot.agents.as_mut() {
            agents.last_registered = Some(Err(ScrapeError::ShapeMismatch {
                resource: "last_registered_agent",
                detail: "invalid type: string \"linux\", expected a map".to_string(),
            }));
        }

        let mut families = build(&snapshot, FamiliesConfig::default());
        let got: Vec<&str> = families.by_ref().map(|f| f.name).collect();

        assert_eq!(got.len(), FamilyKind::ALL.len() - 1);
        assert!(got.contains(&"wazuh_agent_version"));
        assert_eq!(families.failures()[0].family, FamilyKind::LastRegisteredAgent);
    }

    #[test]
    fn test_rendered_samples() {
        let snapshot = snapshot();
        let text = render(build(&snapshot, FamiliesConfig::default()));

        for line in [
            "# HELP wazuh_total_agent Total Wazuh agents count",
            "# TYPE wazuh_total_agent summary",
            "wazuh_agents_count{node_name=\"node01\"} 3.0",
            "wazuh_agents_group{group_name=\"default\"} 3.0",
            "wazuh_active_agents 2.0",
            "wazuh_total_agents 3.0",
            "# TYPE wazuh_agent_version gauge",
            "wazuh_agent_version{version=\"Wazuh v4.6.0\"} 3.0",
            "# TYPE last_registered_agent_info gauge",
            "last_registered_agent_info{node01_arch=\"x86_64\"} 1.0",
            "total_affected_items 24.0",
            "nodes_healthcheck_info{node_name=\"master-node\",type=\"master\",version=\"4.8.0\"} 1.0",
            "wazuh_api_info{title=\"Wazuh API REST\"} 1.0",
            "wazuh_api_info{api_version=\"4.8.0\"} 1.0",
            "total_alerts_hour_5 10.0",
            "total_events_hour_5 120.0",
            "tcp_sessions{manager_stats_remote=\"tcp_sessions\"} 4.0",
            "last_logs_info{wazuh_modulesd_syscollector_info=\"Evaluation finished.\"} 1.0",
            "analysisd_stats{analysisd_stats=\"events_received\"} 900.0",
            "wazuh_validate_configuration_info{node_name=\"master-node\",status=\"OK\"} 1.0",
        ] {
            assert!(text.contains(&format!("{line}\n")), "missing {line:?} in\n{text}");
        }

        assert!(!text.contains("n_active_agents"));
    }

    #[test]
    fn test_skipped_agents_reported() {
        let snapshot = snapshot();
        assert_eq!(build(&snapshot, FamiliesConfig::default()).skipped_agents(), 1);
    }
}
