use thiserror::Error;

/// Errors raised while collecting a single scrape.
///
/// `Auth` always aborts the scrape. `Fetch` and `ShapeMismatch` abort it only
/// for prerequisite resources (API info); otherwise they disable the families
/// fed by that resource. `FieldMissing` disables a single family.
///
/// Messages are kept as strings so that one resource failure can be reported
/// by every family that depends on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScrapeError {
    #[error("authentication failed{}: {message}", status_suffix(.status))]
    Auth {
        status: Option<u16>,
        message: String,
    },

    #[error("fetching {endpoint} failed{}: {message}", status_suffix(.status))]
    Fetch {
        endpoint: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("unexpected {resource} payload: {detail}")]
    ShapeMismatch {
        resource: &'static str,
        detail: String,
    },

    #[error("{family}: field {field:?} missing from record {record}")]
    FieldMissing {
        family: &'static str,
        field: String,
        record: String,
    },
}

impl ScrapeError {
    /// Short label used for the scrape error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Fetch { .. } => "fetch",
            Self::ShapeMismatch { .. } => "shape_mismatch",
            Self::FieldMissing { .. } => "field_missing",
        }
    }

    pub(crate) fn field_missing(
        family: &'static str,
        field: impl Into<String>,
        record: &impl std::fmt::Debug,
    ) -> Self {
        Self::FieldMissing {
            family,
            field: field.into(),
            record: format!("{record:?}"),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" with status {code}"),
        None => String::new(),
    }
}
