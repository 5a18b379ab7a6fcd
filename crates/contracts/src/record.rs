//! LogRecord - the unit of work distributed to targets

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single structured log record.
///
/// Records are validated before dispatch; a `LogRecord` that exists is always
/// complete. `level` holds the canonical level name, never the producer token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Producer-supplied time or the time of receipt
    pub time: DateTime<Utc>,
    /// Canonical level name (a key of `LevelConfig::hierarchy`)
    pub level: String,
    /// Logical subsystem that emitted the record
    pub component: String,
    /// Process / replica that emitted the record
    pub instance: String,
    /// Short headline
    pub title: String,
    /// Optional structured payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl LogRecord {
    /// Create a record stamped with the current time
    pub fn new(
        level: impl Into<String>,
        component: impl Into<String>,
        instance: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            time: Utc::now(),
            level: level.into(),
            component: component.into(),
            instance: instance.into(),
            title: title.into(),
            data: None,
        }
    }

    /// Attach a structured payload
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach an error as payload, in its plain serialized form
    pub fn with_error<E: std::error::Error + ?Sized>(self, name: &str, err: &E) -> Self {
        self.with_data(SerializedError::new(name, err).into_value())
    }

    /// Override the record time
    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }
}

/// Plain structured form of an error.
///
/// Errors are never stored or transmitted as opaque objects; `trace` holds the
/// `source()` chain, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedError {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<String>,
}

impl SerializedError {
    pub fn new<E: std::error::Error + ?Sized>(name: impl Into<String>, err: &E) -> Self {
        let mut trace = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            trace.push(cause.to_string());
            source = cause.source();
        }
        Self {
            name: name.into(),
            message: err.to_string(),
            trace,
        }
    }

    pub fn into_value(self) -> Value {
        // Plain strings only, serialization cannot fail
        serde_json::to_value(&self).unwrap_or(Value::Null)
    }
}

impl From<&crate::ContractError> for SerializedError {
    fn from(err: &crate::ContractError) -> Self {
        Self::new(err.kind(), err)
    }
}
