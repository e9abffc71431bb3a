//! The explicit execution context threaded through every process step.
//!
//! `ProcessContext` is the whole ambient surface a process sees: `task`,
//! `breakpoint`, `now`, `run_id`, `log`, and artifact collection. Nothing is
//! read from process-wide globals; the runner constructs a fresh context per
//! invocation and replay rebuilds all of its mutable state (occurrence
//! counters, cursor, artifacts) deterministically from the ledger.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;

use super::executor::{TaskError, TaskExecutor};
use crate::artifact::{Artifact, ArtifactManifest};
use crate::breakpoint::{BREAKPOINT_TASK, BreakpointSpec, Resolution};
use crate::event_bus::{Event, EventEmitter, LogLevel};
use crate::ledger::{EffectRecord, EffectStatus, Ledger, LedgerError, PendingBreakpoint, RunRecord};
use crate::task::TaskDefinition;
use crate::types::{EffectId, RunId, RunStatus};

/// Errors ending (or suspending) a process invocation.
#[derive(Debug, Error, Diagnostic)]
pub enum RunError {
    #[error(transparent)]
    #[diagnostic(code(duraloom::run::task))]
    Task(#[from] TaskError),

    #[error(transparent)]
    #[diagnostic(code(duraloom::run::ledger))]
    Ledger(#[from] LedgerError),

    /// Not a failure: the run parked awaiting a human decision. The runner
    /// converts this into a Suspended outcome.
    #[error("run suspended awaiting breakpoint '{}'", .breakpoint.title)]
    #[diagnostic(
        code(duraloom::run::suspended),
        help("Resolve the breakpoint with ProcessRunner::resume.")
    )]
    Suspended { breakpoint: Box<BreakpointSpec> },

    /// A breakpoint was resolved with a rejection; the run terminates.
    #[error("breakpoint '{title}' rejected: {reason}")]
    #[diagnostic(code(duraloom::run::breakpoint_rejected))]
    BreakpointRejected { title: String, reason: String },

    /// A quality-gate loop exhausted its budget and the composition layer
    /// chose to treat that as fatal.
    #[error("iteration budget exhausted for loop '{label}' after {iterations} iterations")]
    #[diagnostic(
        code(duraloom::run::iteration_budget),
        help("Raise max_iterations or handle the non-converged outcome explicitly.")
    )]
    IterationBudgetExhausted { label: String, iterations: u32 },

    #[error("{0}")]
    #[diagnostic(code(duraloom::run::other))]
    Other(String),
}

/// Mutable per-invocation state, shared by all clones of a context.
#[derive(Debug)]
pub(crate) struct RunScratch {
    record: RunRecord,
    /// Occurrence counters keyed by scoped call-site token.
    occurrences: FxHashMap<String, u32>,
    /// Last step attempted, for failure reports.
    phase: Option<String>,
    artifacts: ArtifactManifest,
}

/// State shared between the runner and every context clone of one
/// invocation.
#[derive(Debug)]
pub(crate) struct RunShared {
    ledger: Arc<dyn Ledger>,
    autosave: bool,
    scratch: Mutex<RunScratch>,
}

impl RunShared {
    /// Begin a fresh invocation from a stored record: replayable state
    /// (cursor, artifacts, pending breakpoint) resets and is rebuilt through
    /// the ledger.
    pub(crate) fn begin(ledger: Arc<dyn Ledger>, autosave: bool, mut record: RunRecord) -> Self {
        record.status = RunStatus::Running;
        record.cursor = 0;
        record.artifacts.clear();
        record.pending_breakpoint = None;
        record.failure = None;
        record.result = None;
        record.touch();
        Self {
            ledger,
            autosave,
            scratch: Mutex::new(RunScratch {
                record,
                occurrences: FxHashMap::default(),
                phase: None,
                artifacts: ArtifactManifest::new(),
            }),
        }
    }

    pub(crate) fn snapshot_record(&self) -> RunRecord {
        match self.scratch.lock() {
            Ok(scratch) => {
                let mut record = scratch.record.clone();
                record.artifacts = scratch.artifacts.snapshot();
                record
            }
            Err(poisoned) => {
                let scratch = poisoned.into_inner();
                let mut record = scratch.record.clone();
                record.artifacts = scratch.artifacts.snapshot();
                record
            }
        }
    }

    pub(crate) fn phase(&self) -> Option<String> {
        self.scratch.lock().ok().and_then(|s| s.phase.clone())
    }

    fn with_scratch<T>(&self, f: impl FnOnce(&mut RunScratch) -> T) -> T {
        match self.scratch.lock() {
            Ok(mut scratch) => f(&mut scratch),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    async fn persist(&self) -> Result<(), LedgerError> {
        if !self.autosave {
            return Ok(());
        }
        let record = self.snapshot_record();
        self.ledger.save_run(&record).await
    }
}

/// Execution context handed to a process invocation.
///
/// Cloning is cheap; clones share the invocation's scratch state. A clone
/// produced by [`for_iteration`](Self::for_iteration) scopes subsequent
/// effect ids with the iteration index.
#[derive(Clone)]
pub struct ProcessContext {
    run_id: RunId,
    executor: Arc<TaskExecutor>,
    emitter: EventEmitter,
    shared: Arc<RunShared>,
    iteration: Option<u32>,
}

impl ProcessContext {
    pub(crate) fn new(
        run_id: RunId,
        executor: Arc<TaskExecutor>,
        emitter: EventEmitter,
        shared: Arc<RunShared>,
    ) -> Self {
        Self {
            run_id,
            executor,
            emitter,
            shared,
            iteration: None,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Advisory wall-clock time for logs and reports.
    ///
    /// Never feed this into effect identity, step routing, or any
    /// quality-gate predicate: step-to-step data mapping must stay a pure
    /// function of ledgered values or replay breaks.
    pub fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// Emit a run-scoped log event onto the event bus.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(run = %self.run_id, severity = %level, "{message}");
        let _ = self.emitter.emit(Event::run_with_level(
            self.run_id.as_str(),
            level,
            "process",
            message,
        ));
    }

    /// Append one artifact to the run's manifest.
    pub fn add_artifact(&self, artifact: Artifact) {
        self.shared
            .with_scratch(|scratch| scratch.artifacts.push(artifact));
    }

    /// Append a batch of artifacts, preserving order.
    pub fn add_artifacts(&self, artifacts: impl IntoIterator<Item = Artifact>) {
        self.shared
            .with_scratch(|scratch| scratch.artifacts.append(artifacts));
    }

    /// Snapshot of the manifest so far, in append order.
    pub fn artifacts(&self) -> Vec<Artifact> {
        self.shared
            .with_scratch(|scratch| scratch.artifacts.snapshot())
    }

    /// A clone of this context scoped to one loop iteration; effect ids it
    /// resolves carry the iteration index.
    pub(crate) fn for_iteration(&self, iteration: u32) -> Self {
        let mut scoped = self.clone();
        scoped.iteration = Some(iteration);
        scoped
    }

    /// Resolve the next effect id for a call-site token: occurrences count
    /// per token within the current iteration scope, in declaration order.
    fn next_effect_id(&self, token: &str) -> EffectId {
        let scope_key = match self.iteration {
            Some(i) => format!("{token}@{i}"),
            None => token.to_string(),
        };
        let occurrence = self.shared.with_scratch(|scratch| {
            let counter = scratch.occurrences.entry(scope_key).or_insert(0);
            *counter += 1;
            *counter
        });
        EffectId::resolve(token, occurrence, self.iteration)
    }

    fn set_phase(&self, phase: &str) {
        self.shared
            .with_scratch(|scratch| scratch.phase = Some(phase.to_string()));
    }

    fn advance_cursor(&self) {
        self.shared.with_scratch(|scratch| {
            scratch.record.cursor += 1;
            scratch.record.touch();
        });
    }

    /// Execute (or replay) a task at this call site.
    ///
    /// The definition's `name` is the call-site token; invoking the same
    /// definition repeatedly yields distinct occurrence ordinals in
    /// declaration order.
    pub async fn task(&self, def: &TaskDefinition, input: Value) -> Result<Value, RunError> {
        let effect_id = self.next_effect_id(&def.name);
        self.set_phase(&def.name);
        let output = self
            .executor
            .execute(&self.run_id, &effect_id, def, input)
            .await?;
        self.advance_cursor();
        self.shared.persist().await?;
        Ok(output)
    }

    /// Pass a human breakpoint, suspending the run if it is unresolved.
    ///
    /// A ledgered approval passes straight through (replay never
    /// re-prompts). A ledgered rejection terminates the run via
    /// [`RunError::BreakpointRejected`]. An unresolved gate records the
    /// pending breakpoint, parks the run as Paused, and returns
    /// [`RunError::Suspended`], which the runner reports as a Suspended
    /// outcome rather than a failure.
    pub async fn breakpoint(&self, spec: BreakpointSpec) -> Result<(), RunError> {
        let effect_id = self.next_effect_id(&format!("breakpoint:{}", spec.title));
        self.set_phase(&spec.title);

        if let Some(existing) = self
            .shared
            .ledger
            .get_effect(&self.run_id, &effect_id)
            .await?
        {
            if existing.status == EffectStatus::Succeeded {
                let resolution: Resolution = existing
                    .output
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(LedgerError::from)?
                    .unwrap_or_default();
                return match resolution {
                    Resolution::Approved => {
                        self.advance_cursor();
                        self.shared.persist().await?;
                        Ok(())
                    }
                    Resolution::Rejected { reason } => Err(RunError::BreakpointRejected {
                        title: spec.title,
                        reason,
                    }),
                    Resolution::Pending => Err(RunError::Other(format!(
                        "breakpoint '{}' resolution recorded as pending",
                        spec.title
                    ))),
                };
            }
        }

        self.shared.with_scratch(|scratch| {
            scratch.record.status = RunStatus::Paused;
            scratch.record.pending_breakpoint = Some(PendingBreakpoint {
                effect_id: effect_id.clone(),
                spec: spec.clone(),
            });
            scratch.record.touch();
        });
        // Suspension persists regardless of autosave: a paused run must
        // survive the process that raised it.
        let record = self.shared.snapshot_record();
        self.shared.ledger.save_run(&record).await?;

        let _ = self.emitter.emit(Event::effect(
            self.run_id.as_str(),
            effect_id.encode(),
            "gate:raised",
            format!("breakpoint '{}' awaiting resolution", spec.title),
        ));

        Err(RunError::Suspended {
            breakpoint: Box::new(spec),
        })
    }
}

/// Build the succeeded pseudo-effect that records a breakpoint resolution.
pub(crate) fn resolution_record(
    run_id: &RunId,
    pending: &PendingBreakpoint,
    resolution: &Resolution,
) -> Result<EffectRecord, LedgerError> {
    let output = serde_json::to_value(resolution)?;
    Ok(EffectRecord::succeeded(
        run_id.clone(),
        pending.effect_id.clone(),
        BREAKPOINT_TASK,
        pending.spec.wire_payload(run_id),
        output,
    ))
}
