//! The process composition layer.
//!
//! A process is the declarative sequence of steps — tasks, breakpoints,
//! loops, quality-gate branches — forming one domain workflow. Processes are
//! pure composition: every effect goes through the
//! [`ProcessContext`](crate::runtime::ProcessContext), and the runtime owns
//! durability, replay, and suspension.
//!
//! # The replay contract
//!
//! Step-to-step data mapping must be **referentially transparent**: a
//! function only of the process inputs and previously recorded effect
//! outputs — never of wall-clock time, randomness, or other ambient
//! nondeterministic state. Every invocation of a run re-executes the process
//! function from the top, and the whole replay guarantee rests on it taking
//! the same path and resolving the same effect ids each time. A quality-gate
//! branch (e.g. "if the findings array is empty, short-circuit to a failed
//! result") must likewise be a pure function of already-ledgered values.
//!
//! # Examples
//!
//! ```rust
//! use async_trait::async_trait;
//! use duraloom::process::{Process, ProcessResult};
//! use duraloom::runtime::{ProcessContext, RunError};
//! use duraloom::task::{FieldKind, OutputSchema, TaskDefinition};
//! use serde_json::{Value, json};
//!
//! struct DesignReview;
//!
//! #[async_trait]
//! impl Process for DesignReview {
//!     fn name(&self) -> &str {
//!         "design-review"
//!     }
//!
//!     async fn run(&self, inputs: Value, ctx: ProcessContext) -> Result<ProcessResult, RunError> {
//!         let assess = TaskDefinition::agent("assess", "Assess the design", "reviewer")
//!             .with_output_schema(OutputSchema::new().require("findings", FieldKind::Array));
//!
//!         let assessment = ctx.task(&assess, inputs).await?;
//!
//!         // Quality gate: a pure function of the ledgered output.
//!         if assessment["findings"].as_array().is_none_or(Vec::is_empty) {
//!             return Ok(ProcessResult::failed("assess", json!({"reason": "no findings"})));
//!         }
//!
//!         Ok(ProcessResult::ok(assessment))
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::runtime::context::{ProcessContext, RunError};

/// A registered, declarative multi-step workflow.
#[async_trait]
pub trait Process: Send + Sync {
    /// Stable registry name; stored on run records for re-invocation.
    fn name(&self) -> &str;

    /// Execute the declared step sequence. Called once per invocation of a
    /// run, including replays — see the module docs for the determinism
    /// contract.
    async fn run(&self, inputs: Value, ctx: ProcessContext) -> Result<ProcessResult, RunError>;
}

/// What a process invocation produced.
///
/// `success: false` expresses a *domain* quality-gate failure: the run still
/// completes and records the result. Runtime-level failures travel as
/// [`RunError`] instead.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub success: bool,
    /// The phase a failed quality gate identifies, for diagnosis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    pub output: Value,
}

impl ProcessResult {
    /// A successful result carrying the process output.
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            phase: None,
            output,
        }
    }

    /// A domain-level failure at the named phase.
    pub fn failed(phase: impl Into<String>, output: Value) -> Self {
        Self {
            success: false,
            phase: Some(phase.into()),
            output,
        }
    }
}
