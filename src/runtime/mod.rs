//! Process runtime: durable execution, suspension, and resumption.
//!
//! The runtime layer drives declared processes over the effect ledger while
//! keeping a consistent surface regardless of the persistence backend:
//!
//! - **[`ProcessRunner`]** — orchestrates runs: start, resume, recover, abort
//! - **[`ProcessContext`]** — the explicit ambient surface each step sees
//! - **[`TaskExecutor`]** — execute-or-replay with contract validation
//! - **[`run_loop`]** — bounded quality-gate iteration
//!
//! # Suspension model
//!
//! A run has exactly two suspension kinds: awaiting a collaborator dispatch
//! and awaiting a human breakpoint resolution. Neither parks a thread or any
//! in-memory state — the durable run record plus the effect ledger are the
//! entire resumable state, so a paused run can be continued minutes or days
//! later by an unrelated process instance holding the same ledger.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use duraloom::breakpoint::Decision;
//! use duraloom::runtime::{ProcessRunner, RunOutcome, RuntimeConfig};
//! # use duraloom::collaborator::TaskCollaborator;
//! # use duraloom::process::Process;
//! # async fn example(
//! #     collaborator: Arc<dyn TaskCollaborator>,
//! #     process: Arc<dyn Process>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let mut runner = ProcessRunner::new(RuntimeConfig::default(), collaborator).await?;
//! runner.register(process);
//!
//! let report = runner.start("design-review", serde_json::json!({"doc": "…"})).await?;
//! if let RunOutcome::Suspended { breakpoint } = &report.outcome {
//!     println!("awaiting approval: {}", breakpoint.question);
//!     runner.resume(&report.run_id, Decision::Approved).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod executor;
pub mod iteration;
pub mod runner;

pub use config::{EventBusConfig, LedgerType, RuntimeConfig, SinkConfig};
pub use context::{ProcessContext, RunError};
pub use executor::{TaskError, TaskExecutor};
pub use iteration::{IterationOutcome, IterationRecord, LoopConfig, LoopOutcome, run_loop};
pub use runner::{ProcessRunner, RunOutcome, RunReport, RunnerError};
