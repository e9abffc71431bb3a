//! Breakpoint data model: specs, decisions, resolutions.
//!
//! A breakpoint is a named pause point where a run suspends for a human
//! decision. The gate logic (suspend, replay past resolved gates) lives on
//! [`crate::runtime::ProcessContext`]; this module is the pure data the gate
//! and the ledger share. A breakpoint's resolution is persisted as a
//! pseudo-effect so replay never re-prompts it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::artifact::Artifact;
use crate::types::RunId;

/// Task name recorded on breakpoint pseudo-effects in the ledger.
pub const BREAKPOINT_TASK: &str = "__breakpoint__";

/// What a raised breakpoint asks, and the context shown alongside it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakpointSpec {
    pub title: String,
    pub question: String,
    /// Arbitrary domain payload surfaced to the approver.
    #[serde(default)]
    pub context: Value,
    /// Artifacts attached for review.
    #[serde(default)]
    pub files: Vec<Artifact>,
}

impl BreakpointSpec {
    pub fn new(title: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            question: question.into(),
            context: Value::Null,
            files: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn with_file(mut self, file: Artifact) -> Self {
        self.files.push(file);
        self
    }

    #[must_use]
    pub fn with_files(mut self, files: impl IntoIterator<Item = Artifact>) -> Self {
        self.files.extend(files);
        self
    }

    /// Payload sent to the external approval surface:
    /// `{question, title, context: {runId, ...domain data, files: [...]}}`.
    ///
    /// Domain context entries are flattened into the context object when the
    /// payload is itself an object, otherwise carried under `data`.
    pub fn wire_payload(&self, run_id: &RunId) -> Value {
        let mut context = Map::new();
        context.insert("runId".to_string(), json!(run_id.as_str()));
        match &self.context {
            Value::Object(entries) => {
                for (key, value) in entries {
                    context.insert(key.clone(), value.clone());
                }
            }
            Value::Null => {}
            other => {
                context.insert("data".to_string(), other.clone());
            }
        }
        context.insert(
            "files".to_string(),
            serde_json::to_value(&self.files).unwrap_or_else(|_| json!([])),
        );

        json!({
            "question": self.question,
            "title": self.title,
            "context": Value::Object(context),
        })
    }
}

/// The decision handed back by the external approval surface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected { reason: String },
}

impl Decision {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Decision::Rejected {
            reason: reason.into(),
        }
    }
}

/// Resolution state of a breakpoint.
///
/// `Pending` is never persisted; a breakpoint without a ledgered resolution
/// is pending by definition.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Resolution {
    #[default]
    Pending,
    Approved,
    Rejected {
        reason: String,
    },
}

impl From<Decision> for Resolution {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => Resolution::Approved,
            Decision::Rejected { reason } => Resolution::Rejected { reason },
        }
    }
}
