//! Metric families as exposed to Prometheus.
//!
//! The catalog mirrors the exporter's historical output, where samples inside
//! a family may carry names other than the family name. The `prometheus`
//! crate cannot express that, so families are built and rendered here.

pub mod builder;
pub mod exposition;

pub use builder::{build, Families, FamilyFailure, FamilyKind};
pub use exposition::render;

/// Exposition type of a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Gauge,
    Summary,
    /// Rendered as a gauge named `<family>_info`.
    Info,
}

/// A single sample line.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

/// A named group of samples sharing help text and type.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricType,
    pub samples: Vec<Sample>,
}

impl MetricFamily {
    pub fn new(name: &'static str, help: &'static str, kind: MetricType) -> Self {
        Self {
            name,
            help,
            kind,
            samples: Vec::new(),
        }
    }

    /// Append a sample with an explicit name.
    pub fn add_sample(
        &mut self,
        name: impl Into<String>,
        labels: Vec<(String, String)>,
        value: f64,
    ) {
        self.samples.push(Sample {
            name: name.into(),
            labels,
            value,
        });
    }

    /// Append an info sample: named `<family>_info`, value 1.
    pub fn add_info(&mut self, labels: Vec<(String, String)>) {
        let name = format!("{}_info", self.name);
        self.add_sample(name, labels, 1.0);
    }
}

/// Shorthand for a single label pair.
pub(crate) fn label(key: impl Into<String>, value: impl Into<String>) -> (String, String) {
    (key.into(), value.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_info_names_sample_after_family() {
        let mut family = MetricFamily::new("wazuh_api", "Wazuh API information", MetricType::Info);
        family.add_info(vec![label("title", "Wazuh API REST")]);

        assert_eq!(family.samples.len(), 1);
        assert_eq!(family.samples[0].name, "wazuh_api_info");
        assert_eq!(family.samples[0].value, 1.0);
    }
}
