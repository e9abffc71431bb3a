//! # Duraloom: Durable Process-Run Orchestration
//!
//! Duraloom executes declared multi-step processes — task dispatches to an
//! AI-agent collaborator, human approval breakpoints, bounded quality-gate
//! loops — **exactly once each**, persisting every step's input and output
//! in a write-once effect ledger so a run can crash, pause for days, and
//! resume without re-executing completed work or re-prompting resolved
//! breakpoints.
//!
//! ## Core Concepts
//!
//! - **Effect Ledger**: durable, write-once store of task inputs/outputs
//!   keyed by deterministic effect identity
//! - **Task Executor**: execute-or-replay with input/output contract
//!   validation around the collaborator dispatch
//! - **Breakpoint Gate**: suspend a run for a human decision; resolutions
//!   persist as pseudo-effects so replay skips resolved gates
//! - **Quality-Gate Loop**: bounded optimize/measure iteration with an
//!   attention threshold
//! - **Process Composition**: declarative, referentially transparent step
//!   sequences over an explicit context
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use duraloom::collaborator::{CollaboratorError, TaskCollaborator};
//! use duraloom::process::{Process, ProcessResult};
//! use duraloom::runtime::{ProcessContext, ProcessRunner, RunError, RuntimeConfig};
//! use duraloom::task::{TaskDefinition, TaskRequest};
//! use serde_json::{Value, json};
//!
//! struct EchoCollaborator;
//!
//! #[async_trait]
//! impl TaskCollaborator for EchoCollaborator {
//!     async fn dispatch(&self, request: &TaskRequest) -> Result<Value, CollaboratorError> {
//!         Ok(json!({"echo": request.task}))
//!     }
//! }
//!
//! struct OneTask;
//!
//! #[async_trait]
//! impl Process for OneTask {
//!     fn name(&self) -> &str {
//!         "one-task"
//!     }
//!
//!     async fn run(&self, inputs: Value, ctx: ProcessContext) -> Result<ProcessResult, RunError> {
//!         let def = TaskDefinition::agent("echo", "Echo the task", "assistant");
//!         let output = ctx.task(&def, inputs).await?;
//!         Ok(ProcessResult::ok(output))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut runner =
//!         ProcessRunner::new(RuntimeConfig::default(), Arc::new(EchoCollaborator)).await?;
//!     runner.register(Arc::new(OneTask));
//!     let report = runner.start("one-task", json!({"doc": "…"})).await?;
//!     println!("{:?}", report.outcome);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Guide
//!
//! - [`types`] — run/effect identity and run status
//! - [`task`] — task definitions, input contracts, output schemas
//! - [`collaborator`] — the execution collaborator boundary and retry policy
//! - [`ledger`] — the write-once effect ledger (in-memory and SQLite)
//! - [`runtime`] — runner, context, executor, iteration loop, configuration
//! - [`process`] — the composition layer and its determinism contract
//! - [`breakpoint`] — breakpoint specs, decisions, resolutions
//! - [`artifact`] — per-run append-only artifact manifests
//! - [`event_bus`] — run-scoped progress events with pluggable sinks

pub mod artifact;
pub mod breakpoint;
pub mod collaborator;
pub mod event_bus;
pub mod ledger;
pub mod process;
pub mod runtime;
pub mod task;
pub mod telemetry;
pub mod types;
pub mod utils;
