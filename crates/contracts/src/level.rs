//! Level hierarchy, producer token mapping and internal levels

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Direction in which `hierarchy` ranks encode severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// `error = 0, info = 2`: a smaller rank is more severe
    #[default]
    LowerIsMoreSevere,
    /// `info = 0, error = 2`: a larger rank is more severe
    HigherIsMoreSevere,
}

/// Levels used for the dispatcher's own reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalLevels {
    /// Level of the record emitted when an inbound record is rejected
    pub on_unknown_level: String,
    /// Level of the aggregated report emitted when targets fail
    pub on_target_failed_to_handle: String,
}

/// Process-wide level configuration, read-only after startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelConfig {
    /// Canonical level name -> rank
    pub hierarchy: BTreeMap<String, i64>,
    /// Producer token -> canonical level name
    pub mapping: BTreeMap<String, String>,
    pub internal: InternalLevels,
    #[serde(default)]
    pub severity: Severity,
}

impl LevelConfig {
    /// Resolve a producer token to its canonical level name
    pub fn resolve(&self, token: &str) -> Option<&str> {
        self.mapping.get(token).map(String::as_str)
    }

    /// Rank of a canonical level name
    pub fn rank(&self, level: &str) -> Option<i64> {
        self.hierarchy.get(level).copied()
    }

    /// Whether a record of `record_rank` passes a target threshold of `threshold`.
    ///
    /// True iff the record is at least as severe as the threshold.
    pub fn admits(&self, record_rank: i64, threshold: i64) -> bool {
        match self.severity {
            Severity::LowerIsMoreSevere => record_rank <= threshold,
            Severity::HigherIsMoreSevere => record_rank >= threshold,
        }
    }

    /// Names referenced by `mapping` or `internal` that are missing from `hierarchy`
    pub fn dangling_levels(&self) -> Vec<&str> {
        self.mapping
            .values()
            .map(String::as_str)
            .chain([
                self.internal.on_unknown_level.as_str(),
                self.internal.on_target_failed_to_handle.as_str(),
            ])
            .filter(|name| !self.hierarchy.contains_key(*name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(severity: Severity) -> LevelConfig {
        let hierarchy = match severity {
            Severity::LowerIsMoreSevere => [("error", 0), ("warning", 1), ("info", 2)],
            Severity::HigherIsMoreSevere => [("info", 0), ("warning", 1), ("error", 2)],
        };
        LevelConfig {
            hierarchy: hierarchy.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            mapping: [("warn", "warning"), ("error", "error"), ("info", "info")]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            internal: InternalLevels {
                on_unknown_level: "warning".to_string(),
                on_target_failed_to_handle: "error".to_string(),
            },
            severity,
        }
    }

    #[test]
    fn test_admits_lower_is_more_severe() {
        let cfg = levels(Severity::LowerIsMoreSevere);
        let warning = cfg.rank("warning").unwrap();
        assert!(cfg.admits(cfg.rank("error").unwrap(), warning));
        assert!(cfg.admits(warning, warning));
        assert!(!cfg.admits(cfg.rank("info").unwrap(), warning));
    }

    #[test]
    fn test_admits_higher_is_more_severe() {
        let cfg = levels(Severity::HigherIsMoreSevere);
        let warning = cfg.rank("warning").unwrap();
        assert!(cfg.admits(cfg.rank("error").unwrap(), warning));
        assert!(!cfg.admits(cfg.rank("info").unwrap(), warning));
    }

    #[test]
    fn test_resolve_uses_mapping() {
        let cfg = levels(Severity::LowerIsMoreSevere);
        assert_eq!(cfg.resolve("warn"), Some("warning"));
        assert_eq!(cfg.resolve("warning"), None);
    }

    #[test]
    fn test_dangling_levels() {
        let mut cfg = levels(Severity::LowerIsMoreSevere);
        assert!(cfg.dangling_levels().is_empty());

        cfg.internal.on_unknown_level = "fatal".to_string();
        assert_eq!(cfg.dangling_levels(), vec!["fatal"]);
    }
}
