//! Event types carried on the bus.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Scope used for the synthetic event that terminates a subscribed stream.
pub const STREAM_END_SCOPE: &str = "__duraloom_stream_end__";

/// Severity attached to run events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured event emitted during workflow execution.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Event {
    Run(RunEvent),
    Diagnostic(DiagnosticEvent),
}

/// Event scoped to one run (and optionally one effect).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunEvent {
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    pub level: LogLevel,
    pub scope: String,
    pub message: String,
}

/// Runtime-level event not tied to a particular run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticEvent {
    pub scope: String,
    pub message: String,
}

impl Event {
    pub fn run(
        run_id: impl Into<String>,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::run_with_level(run_id, LogLevel::Info, scope, message)
    }

    pub fn run_with_level(
        run_id: impl Into<String>,
        level: LogLevel,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Event::Run(RunEvent {
            run_id: run_id.into(),
            effect: None,
            level,
            scope: scope.into(),
            message: message.into(),
        })
    }

    pub fn effect(
        run_id: impl Into<String>,
        effect: impl Into<String>,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Event::Run(RunEvent {
            run_id: run_id.into(),
            effect: Some(effect.into()),
            level: LogLevel::Info,
            scope: scope.into(),
            message: message.into(),
        })
    }

    pub fn diagnostic(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Diagnostic(DiagnosticEvent {
            scope: scope.into(),
            message: message.into(),
        })
    }

    pub fn scope_label(&self) -> &str {
        match self {
            Event::Run(run) => &run.scope,
            Event::Diagnostic(diag) => &diag.scope,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Event::Run(run) => &run.message,
            Event::Diagnostic(diag) => &diag.message,
        }
    }

    /// Normalized JSON shape for sinks that journal events:
    /// `{type, scope, message, timestamp, metadata}`.
    pub fn to_json_value(&self) -> Value {
        let (event_type, metadata) = match self {
            Event::Run(run) => {
                let mut meta = serde_json::Map::new();
                meta.insert("run_id".to_string(), json!(run.run_id));
                if let Some(effect) = &run.effect {
                    meta.insert("effect".to_string(), json!(effect));
                }
                meta.insert("level".to_string(), json!(run.level.as_str()));
                ("run", Value::Object(meta))
            }
            Event::Diagnostic(_) => ("diagnostic", Value::Object(serde_json::Map::new())),
        };

        json!({
            "type": event_type,
            "scope": self.scope_label(),
            "message": self.message(),
            "timestamp": Utc::now().to_rfc3339(),
            "metadata": metadata,
        })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Run(run) => match &run.effect {
                Some(effect) => write!(
                    f,
                    "[{}@{}] {} {}: {}",
                    run.run_id, effect, run.level, run.scope, run.message
                ),
                None => write!(
                    f,
                    "[{}] {} {}: {}",
                    run.run_id, run.level, run.scope, run.message
                ),
            },
            Event::Diagnostic(diag) => write!(f, "[{}] {}", diag.scope, diag.message),
        }
    }
}
