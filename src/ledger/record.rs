//! Persisted record shapes for effects and runs.
//!
//! These are serde-friendly models decoupled from in-flight execution state;
//! backends serialize them as JSON documents. This module performs no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::artifact::Artifact;
use crate::breakpoint::BreakpointSpec;
use crate::process::ProcessResult;
use crate::types::{EffectId, RunId, RunStatus};

/// Status of one effect attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectStatus {
    /// Created but neither succeeded nor failed (e.g. dispatch in flight).
    Pending,
    /// Completed with validated output. Write-once.
    Succeeded,
    /// The attempt failed; a later attempt may overwrite this record.
    Failed,
}

impl EffectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EffectStatus::Pending => "pending",
            EffectStatus::Succeeded => "succeeded",
            EffectStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(EffectStatus::Pending),
            "succeeded" => Some(EffectStatus::Succeeded),
            "failed" => Some(EffectStatus::Failed),
            _ => None,
        }
    }
}

/// Durable record of one task effect: the input that was dispatched and the
/// output that came back (or the error that ended the attempt).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectRecord {
    pub run_id: RunId,
    pub effect_id: EffectId,
    /// Name of the task definition (or [`BREAKPOINT_TASK`] for gate
    /// pseudo-effects).
    ///
    /// [`BREAKPOINT_TASK`]: crate::breakpoint::BREAKPOINT_TASK
    pub task: String,
    pub status: EffectStatus,
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl EffectRecord {
    /// A succeeded record carrying validated output.
    pub fn succeeded(
        run_id: RunId,
        effect_id: EffectId,
        task: impl Into<String>,
        input: Value,
        output: Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            effect_id,
            task: task.into(),
            status: EffectStatus::Succeeded,
            input,
            output: Some(output),
            error: None,
            created_at: now,
            completed_at: Some(now),
        }
    }

    /// A failed attempt with its error detail.
    pub fn failed(
        run_id: RunId,
        effect_id: EffectId,
        task: impl Into<String>,
        input: Value,
        error: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            effect_id,
            task: task.into(),
            status: EffectStatus::Failed,
            input,
            output: None,
            error: Some(error.into()),
            created_at: now,
            completed_at: Some(now),
        }
    }
}

/// Outcome of [`Ledger::put_effect`](crate::ledger::Ledger::put_effect).
#[derive(Clone, Debug, PartialEq)]
pub enum PutOutcome {
    /// The record was written.
    Recorded,
    /// A succeeded record already holds the key; the write was rejected.
    /// Callers adopt the winning record.
    Conflict { existing: EffectRecord },
}

/// A raised-but-unresolved breakpoint, carried on the run record while the
/// run is paused.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingBreakpoint {
    pub effect_id: EffectId,
    pub spec: BreakpointSpec,
}

/// Why a run ended up Failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    /// The step (call-site token or breakpoint title) that failed.
    pub phase: String,
    pub message: String,
}

/// Durable record of one process run.
///
/// The record is the run's durable snapshot between invocations: status,
/// cursor, artifacts, pending breakpoint, and — once terminal — the result
/// or failure. Replay does not read execution state back from it; cursor,
/// occurrence counters, and artifacts are rebuilt deterministically from the
/// effect ledger on every invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    /// Registered process name, used to re-invoke the run on recovery.
    pub process: String,
    pub status: RunStatus,
    /// Position right after the last succeeded effect.
    pub cursor: u32,
    pub inputs: Value,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_breakpoint: Option<PendingBreakpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ProcessResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    /// A fresh Running record with an empty manifest and zero cursor.
    pub fn new(run_id: RunId, process: impl Into<String>, inputs: Value) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            process: process.into(),
            status: RunStatus::Running,
            cursor: 0,
            inputs,
            artifacts: Vec::new(),
            pending_breakpoint: None,
            failure: None,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
