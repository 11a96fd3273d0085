use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Manager API version, compared component by component as integers.
///
/// Accepts an optional leading `v` and ignores a pre-release/build suffix
/// (`4.8.0-rc1` parses as `4.8.0`). Missing minor/patch components are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// First version whose daemon statistics dropped the legacy rate fields.
pub const LEGACY_STATS_CUTOFF: ApiVersion = ApiVersion::new(4, 7, 0);

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid API version {raw:?}: {reason}")]
pub struct VersionParseError {
    raw: String,
    reason: &'static str,
}

impl ApiVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for ApiVersion {
    type Err = VersionParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let fail = |reason| VersionParseError {
            raw: raw.to_string(),
            reason,
        };

        let trimmed = raw.trim();
        let trimmed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        let core = trimmed
            .split(|c| c == '-' || c == '+')
            .next()
            .unwrap_or_default();

        if core.is_empty() {
            return Err(fail("empty version"));
        }

        let mut parts = [0u32; 3];
        for (i, component) in core.split('.').enumerate() {
            let slot = parts.get_mut(i).ok_or_else(|| fail("too many components"))?;
            *slot = component
                .parse()
                .map_err(|_| fail("non-numeric component"))?;
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> ApiVersion {
        s.parse().expect("valid version")
    }

    #[test]
    fn test_parse_plain_and_prefixed() {
        assert_eq!(v("4.7.2"), ApiVersion::new(4, 7, 2));
        assert_eq!(v("v4.3.10"), ApiVersion::new(4, 3, 10));
        assert_eq!(v("4.8.0-rc1"), ApiVersion::new(4, 8, 0));
        assert_eq!(v("5"), ApiVersion::new(5, 0, 0));
        assert_eq!(v(" 4.6 "), ApiVersion::new(4, 6, 0));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<ApiVersion>().is_err());
        assert!("four.seven".parse::<ApiVersion>().is_err());
        assert!("4.7.0.1".parse::<ApiVersion>().is_err());
        assert!("4..0".parse::<ApiVersion>().is_err());
    }

    #[test]
    fn test_multi_digit_components_order_numerically() {
        // "4.10.0" < "4.7.0" as strings; numerically it is newer.
        assert!(v("4.10.0") > LEGACY_STATS_CUTOFF);
        assert!(v("4.7.10") > v("4.7.9"));
        assert!(v("10.0.0") > v("9.9.9"));
    }

    #[test]
    fn test_cutoff_boundary() {
        assert!(v("4.6.9") < LEGACY_STATS_CUTOFF);
        assert!(v("4.6.0") < LEGACY_STATS_CUTOFF);
        assert!(v("4.7.0") >= LEGACY_STATS_CUTOFF);
        assert!(v("4.7.0-beta") >= LEGACY_STATS_CUTOFF);
    }

    #[test]
    fn test_display_round_trips_components() {
        assert_eq!(v("v4.7").to_string(), "4.7.0");
    }
}
