//! ServiceConfig - Config Loader output
//!
//! Describes the complete service configuration: inbound queue, levels,
//! targets and the event bridge.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::LevelConfig;

/// Complete service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Name of the inbound log queue
    pub queue: String,

    /// How long a failing target stays suspended
    #[serde(default = "default_target_error_timeout_ms")]
    pub target_error_timeout_ms: u64,

    /// Identity used for the dispatcher's own records
    #[serde(default)]
    pub identity: ServiceIdentity,

    /// Level hierarchy and mapping
    pub levels: LevelConfig,

    /// Target definitions, in delivery order
    #[serde(default)]
    pub targets: Vec<TargetConfig>,

    /// Event bridge
    #[serde(default)]
    pub events: EventBridgeConfig,
}

fn default_target_error_timeout_ms() -> u64 {
    60_000
}

/// Queue names are non-empty identifiers made of `[A-Za-z0-9_.:-]`
pub fn is_valid_queue_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-'))
}

impl ServiceConfig {
    pub fn target_error_timeout(&self) -> Duration {
        Duration::from_millis(self.target_error_timeout_ms)
    }
}

/// Component / instance pair the service logs as
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub component: String,
    pub instance: String,
}

impl Default for ServiceIdentity {
    fn default() -> Self {
        Self {
            component: "log-hub".to_string(),
            instance: "main".to_string(),
        }
    }
}

/// One configured target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Disabled targets are skipped at startup
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Threshold level (a key of `levels.hierarchy`)
    pub level: String,

    /// Display name used in metrics and traces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Type specific settings
    #[serde(flatten)]
    pub kind: TargetKind,
}

fn default_enabled() -> bool {
    true
}

impl TargetConfig {
    /// `label`, else the cache name for cache targets, else the target type
    pub fn display_name(&self) -> &str {
        match (&self.label, &self.kind) {
            (Some(label), _) => label,
            (None, TargetKind::Cache(cache)) => &cache.name,
            (None, kind) => kind.type_name(),
        }
    }
}

/// Target type with its settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetKind {
    /// Terminal output
    Console(ConsoleConfig),
    /// In-memory ring cache
    Cache(CacheConfig),
    /// Embedded document store
    DocumentStore(DocumentStoreConfig),
    /// Chat notifications
    Chat(ChatConfig),
}

impl TargetKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Console(_) => "console",
            Self::Cache(_) => "cache",
            Self::DocumentStore(_) => "document_store",
            Self::Chat(_) => "chat",
        }
    }
}

/// Console target settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConsoleConfig {
    /// Prefix of every data line
    #[serde(default = "default_indentation")]
    pub indentation: String,

    /// chrono strftime format of the timestamp
    #[serde(default = "default_console_timestamp")]
    #[validate(length(min = 1))]
    pub timestamp: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            indentation: default_indentation(),
            timestamp: default_console_timestamp(),
        }
    }
}

fn default_indentation() -> String {
    "  ] ".to_string()
}

fn default_console_timestamp() -> String {
    "%d.%m.%Y %H:%M:%S%.3f".to_string()
}

/// Cache target settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CacheConfig {
    /// Registry name, shared between targets using the same name
    #[serde(default = "default_cache_name")]
    #[validate(length(min = 1))]
    pub name: String,

    /// Maximum number of records kept
    #[serde(default = "default_cache_size")]
    #[validate(range(min = 1))]
    pub size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: default_cache_name(),
            size: default_cache_size(),
        }
    }
}

fn default_cache_name() -> String {
    "default".to_string()
}

fn default_cache_size() -> usize {
    100
}

/// Document store target settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DocumentStoreConfig {
    /// Storage root directory
    #[validate(length(min = 1))]
    pub connection: String,

    /// Database directory below `connection`
    #[validate(length(min = 1))]
    pub database: String,

    /// Collection (tree) the records are inserted into
    #[validate(length(min = 1))]
    pub collection: String,
}

/// Chat notification target settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChatConfig {
    /// Bot token
    #[validate(length(min = 1))]
    pub token: String,

    /// Chat ids every record is sent to
    #[validate(length(min = 1))]
    pub chats: Vec<i64>,

    /// chrono strftime format of the timestamp
    #[serde(default = "default_chat_timestamp")]
    #[validate(length(min = 1))]
    pub timestamp: String,

    /// Bot API base url
    #[serde(default = "default_api_base")]
    #[validate(length(min = 1))]
    pub api_base: String,
}

fn default_chat_timestamp() -> String {
    "%d.%m.%Y %H:%M:%S".to_string()
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

/// Event bridge settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBridgeConfig {
    #[serde(default, alias = "log_events")]
    pub enabled: bool,

    /// Channel prefix, channels are named `{prefix}:{event}`
    #[serde(default = "default_event_prefix")]
    pub prefix: String,

    #[serde(default)]
    pub channels: Vec<String>,

    /// Canonical level of the forwarded records
    #[serde(default = "default_event_level")]
    pub level: String,
}

impl Default for EventBridgeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            prefix: default_event_prefix(),
            channels: Vec::new(),
            level: default_event_level(),
        }
    }
}

fn default_event_prefix() -> String {
    "events".to_string()
}

fn default_event_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_kind_tagged_by_type() {
        let cfg: TargetConfig = serde_json::from_str(
            r#"{ "type": "cache", "level": "info", "name": "recent", "size": 5 }"#,
        )
        .unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.display_name(), "recent");
        match cfg.kind {
            TargetKind::Cache(cache) => {
                assert_eq!(cache.size, 5);
                assert_eq!(cache.name, "recent");
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn test_cache_name_and_label_are_separate() {
        let cfg: TargetConfig = serde_json::from_str(
            r#"{ "type": "cache", "level": "info", "label": "errors-view", "name": "errors" }"#,
        )
        .unwrap();
        assert_eq!(cfg.display_name(), "errors-view");
        let TargetKind::Cache(ref cache) = cfg.kind else {
            panic!("expected cache");
        };
        assert_eq!(cache.name, "errors");

        // `name` is written once and survives a round trip
        let json = serde_json::to_string(&cfg).unwrap();
        assert_eq!(json.matches("\"name\"").count(), 1);
        let back: TargetConfig = serde_json::from_str(&json).unwrap();
        assert!(matches!(back.kind, TargetKind::Cache(ref c) if c.name == "errors"));
        assert_eq!(back.label.as_deref(), Some("errors-view"));
    }

    #[test]
    fn test_default_cache_name() {
        let cfg: TargetConfig =
            serde_json::from_str(r#"{ "type": "cache", "level": "info" }"#).unwrap();
        assert_eq!(cfg.display_name(), "default");
    }

    #[test]
    fn test_console_defaults() {
        let cfg: TargetConfig =
            serde_json::from_str(r#"{ "type": "console", "level": "debug" }"#).unwrap();
        assert_eq!(cfg.display_name(), "console");
        let TargetKind::Console(console) = cfg.kind else {
            panic!("expected console");
        };
        assert_eq!(console.indentation, "  ] ");
        assert!(console.validate().is_ok());
    }

    #[test]
    fn test_chat_validation_rejects_empty_chats() {
        let chat = ChatConfig {
            token: "123:abc".to_string(),
            chats: vec![],
            timestamp: default_chat_timestamp(),
            api_base: default_api_base(),
        };
        let err = crate::ContractError::from(chat.validate().unwrap_err());
        assert!(err.to_string().contains("chats"));
    }

    #[test]
    fn test_cache_validation_rejects_zero_size() {
        let cache = CacheConfig {
            name: "c".to_string(),
            size: 0,
        };
        assert!(cache.validate().is_err());
    }

    #[test]
    fn test_queue_names() {
        assert!(is_valid_queue_name("logs"));
        assert!(is_valid_queue_name("rrb:queues:log-1"));
        assert!(!is_valid_queue_name(""));
        assert!(!is_valid_queue_name("two words"));
    }

    #[test]
    fn test_event_bridge_accepts_log_events_alias() {
        let cfg: EventBridgeConfig =
            serde_json::from_str(r#"{ "log_events": true, "channels": ["deploy"] }"#).unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.prefix, "events");
    }
}
