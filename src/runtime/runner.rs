//! Runtime execution engine for process runs.
//!
//! `ProcessRunner` owns the registry of declared processes, the effect
//! ledger, the collaborator handle, and the event bus. It drives each run as
//! a single-threaded cooperative sequence: every invocation re-executes the
//! process function from the top, and the ledger short-circuits completed
//! effects, so crash recovery and breakpoint resumption are the same code
//! path as a fresh start.

use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use super::config::{LedgerType, RuntimeConfig};
use super::context::{ProcessContext, RunError, RunShared, resolution_record};
use super::executor::TaskExecutor;
use crate::breakpoint::{BreakpointSpec, Decision, Resolution};
use crate::collaborator::TaskCollaborator;
use crate::event_bus::{Event, EventBus, EventStream, LogLevel, STREAM_END_SCOPE};
use crate::ledger::{InMemoryLedger, Ledger, LedgerError, RunFailure, RunRecord};
use crate::process::{Process, ProcessResult};
use crate::types::{RunId, RunStatus};
use crate::utils::id_generator::IdGenerator;

/// Errors from the runner's own machinery (not from a run's domain logic).
#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    #[error("process not registered: {process}")]
    #[diagnostic(
        code(duraloom::runner::process_not_found),
        help("Register the process with ProcessRunner::register before starting or resuming runs.")
    )]
    ProcessNotFound { process: String },

    #[error("run not found: {run_id}")]
    #[diagnostic(code(duraloom::runner::run_not_found))]
    RunNotFound { run_id: String },

    #[error("run {run_id} is {status}, not paused")]
    #[diagnostic(
        code(duraloom::runner::not_paused),
        help("Only a paused run with a pending breakpoint accepts a resolution.")
    )]
    NotPaused { run_id: String, status: RunStatus },

    #[error(transparent)]
    #[diagnostic(code(duraloom::runner::ledger))]
    Ledger(#[from] LedgerError),
}

/// How an invocation of a run ended.
#[derive(Clone, Debug)]
pub enum RunOutcome {
    /// The process returned; its result (which may carry `success: false`
    /// from a domain quality gate) is recorded on the run.
    Completed(ProcessResult),
    /// The run parked at an unresolved breakpoint.
    Suspended { breakpoint: BreakpointSpec },
    /// The run terminated with a runtime-level failure.
    Failed(RunFailure),
}

/// Outcome of one runner call, tagged with the run it concerns.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub run_id: RunId,
    pub outcome: RunOutcome,
}

/// Orchestrates process runs over a ledger, a collaborator, and an event
/// bus.
///
/// # Concurrency
///
/// A runner borrows immutably for all run operations; concurrent runs are
/// independent and may execute in parallel. The ledger is the only shared
/// mutable state, and its write-once contract resolves duplicate dispatch of
/// the same run (e.g. two instances recovering the same timed-out run).
pub struct ProcessRunner {
    processes: FxHashMap<String, Arc<dyn Process>>,
    ledger: Arc<dyn Ledger>,
    collaborator: Arc<dyn TaskCollaborator>,
    event_bus: EventBus,
    autosave: bool,
    ids: IdGenerator,
}

impl ProcessRunner {
    /// Build a runner from configuration, constructing the configured ledger
    /// backend and event bus.
    pub async fn new(
        config: RuntimeConfig,
        collaborator: Arc<dyn TaskCollaborator>,
    ) -> Result<Self, RunnerError> {
        let ledger = Self::create_ledger(&config).await?;
        let event_bus = config.event_bus.build_event_bus();
        Ok(Self::with_ledger(ledger, collaborator, event_bus))
    }

    /// Build a runner over an existing ledger and bus.
    ///
    /// This is also the recovery entry point across process instances: a new
    /// runner over the same ledger can resume any run the old one left
    /// behind.
    pub fn with_ledger(
        ledger: Arc<dyn Ledger>,
        collaborator: Arc<dyn TaskCollaborator>,
        event_bus: EventBus,
    ) -> Self {
        event_bus.listen_for_events();
        Self {
            processes: FxHashMap::default(),
            ledger,
            collaborator,
            event_bus,
            autosave: true,
            ids: IdGenerator::new(),
        }
    }

    async fn create_ledger(config: &RuntimeConfig) -> Result<Arc<dyn Ledger>, RunnerError> {
        match config.ledger.unwrap_or(LedgerType::InMemory) {
            LedgerType::InMemory => Ok(Arc::new(InMemoryLedger::new())),
            #[cfg(feature = "sqlite")]
            LedgerType::Sqlite => {
                let db_url = std::env::var("DURALOOM_SQLITE_URL")
                    .ok()
                    .or_else(|| {
                        config
                            .sqlite_db_name
                            .as_ref()
                            .map(|name| format!("sqlite://{name}"))
                    })
                    .unwrap_or_else(|| "sqlite://duraloom.db".to_string());
                // Ensure the underlying sqlite file exists before connecting:
                // strip the scheme, create parent directories, create the file.
                if let Some(path) = db_url.strip_prefix("sqlite://") {
                    let path = path.split('?').next().unwrap_or(path).trim();
                    if !path.is_empty() && path != ":memory:" {
                        let p = std::path::Path::new(path);
                        if let Some(parent) = p.parent() {
                            let _ = std::fs::create_dir_all(parent);
                        }
                        if !p.exists() {
                            let _ = std::fs::File::create_new(p);
                        }
                    }
                }
                let ledger = crate::ledger::SqliteLedger::connect(&db_url).await?;
                Ok(Arc::new(ledger))
            }
        }
    }

    /// Register a process so runs of it can be started and re-invoked.
    pub fn register(&mut self, process: Arc<dyn Process>) {
        self.processes.insert(process.name().to_string(), process);
    }

    /// Handle to the ledger, for sharing with another runner instance.
    pub fn ledger(&self) -> Arc<dyn Ledger> {
        self.ledger.clone()
    }

    /// Subscribe to this runner's event stream.
    pub fn subscribe(&self) -> EventStream {
        self.event_bus.subscribe()
    }

    fn process(&self, name: &str) -> Result<Arc<dyn Process>, RunnerError> {
        self.processes
            .get(name)
            .cloned()
            .ok_or_else(|| RunnerError::ProcessNotFound {
                process: name.to_string(),
            })
    }

    async fn load_record(&self, run_id: &RunId) -> Result<RunRecord, RunnerError> {
        self.ledger
            .load_run(run_id)
            .await?
            .ok_or_else(|| RunnerError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }

    /// Start a fresh run of a registered process.
    #[instrument(skip(self, inputs), err)]
    pub async fn start(&self, process: &str, inputs: Value) -> Result<RunReport, RunnerError> {
        let run_id = RunId::from(self.ids.generate_run_id());
        self.start_with_id(process, run_id, inputs).await
    }

    /// Start a run with a caller-chosen id. If a record already exists for
    /// the id, the call behaves like [`recover`](Self::recover).
    #[instrument(skip(self, inputs), fields(run = %run_id), err)]
    pub async fn start_with_id(
        &self,
        process: &str,
        run_id: RunId,
        inputs: Value,
    ) -> Result<RunReport, RunnerError> {
        if self.ledger.load_run(&run_id).await?.is_some() {
            return self.recover(&run_id).await;
        }

        let definition = self.process(process)?;
        let record = RunRecord::new(run_id.clone(), process, inputs);
        self.ledger.save_run(&record).await?;
        self.emit_run(&run_id, LogLevel::Info, format!("run started for process '{process}'"));
        self.invoke(definition, record).await
    }

    /// Re-invoke an interrupted run, or report the recorded outcome of a
    /// settled one.
    ///
    /// - Running → replay from the ledger and continue (crash recovery);
    /// - Paused → report the pending breakpoint without re-prompting;
    /// - Completed/Failed → report the recorded result/failure.
    #[instrument(skip(self), fields(run = %run_id), err)]
    pub async fn recover(&self, run_id: &RunId) -> Result<RunReport, RunnerError> {
        let record = self.load_record(run_id).await?;
        match record.status {
            RunStatus::Completed => Ok(RunReport {
                run_id: run_id.clone(),
                outcome: RunOutcome::Completed(record.result.unwrap_or_else(|| ProcessResult {
                    success: true,
                    phase: None,
                    output: Value::Null,
                })),
            }),
            RunStatus::Failed => Ok(RunReport {
                run_id: run_id.clone(),
                outcome: RunOutcome::Failed(record.failure.unwrap_or_else(|| RunFailure {
                    phase: "unknown".to_string(),
                    message: "run recorded as failed without detail".to_string(),
                })),
            }),
            RunStatus::Paused => match record.pending_breakpoint {
                Some(pending) => Ok(RunReport {
                    run_id: run_id.clone(),
                    outcome: RunOutcome::Suspended {
                        breakpoint: pending.spec,
                    },
                }),
                // Paused without a recorded gate: treat as interrupted and
                // replay; the gate re-raises deterministically.
                None => {
                    let definition = self.process(&record.process)?;
                    self.invoke(definition, record).await
                }
            },
            RunStatus::Running => {
                let definition = self.process(&record.process)?;
                self.emit_run(run_id, LogLevel::Info, "recovering interrupted run".to_string());
                self.invoke(definition, record).await
            }
        }
    }

    /// Resolve a paused run's pending breakpoint and continue it.
    ///
    /// The resolution lands as a write-once pseudo-effect: duplicate resumes
    /// adopt the first recorded decision.
    #[instrument(skip(self), fields(run = %run_id), err)]
    pub async fn resume(&self, run_id: &RunId, decision: Decision) -> Result<RunReport, RunnerError> {
        let mut record = self.load_record(run_id).await?;
        if record.status != RunStatus::Paused {
            return Err(RunnerError::NotPaused {
                run_id: run_id.to_string(),
                status: record.status,
            });
        }
        let Some(pending) = record.pending_breakpoint.take() else {
            return Err(RunnerError::NotPaused {
                run_id: run_id.to_string(),
                status: record.status,
            });
        };

        let resolution = Resolution::from(decision);
        let pseudo = resolution_record(run_id, &pending, &resolution)?;
        // Recorded or Conflict, the gate is resolved either way; replay
        // reads back whichever decision landed first.
        let _ = self.ledger.put_effect(pseudo).await?;

        record.status = RunStatus::Running;
        record.touch();
        self.ledger.save_run(&record).await?;
        self.emit_run(
            run_id,
            LogLevel::Info,
            format!("breakpoint '{}' resolved", pending.spec.title),
        );

        let definition = self.process(&record.process)?;
        self.invoke(definition, record).await
    }

    /// Abort a run at a suspension point, recording a terminal failure.
    /// Idempotent on already-terminal runs.
    #[instrument(skip(self, reason), fields(run = %run_id), err)]
    pub async fn abort(&self, run_id: &RunId, reason: impl Into<String>) -> Result<(), RunnerError> {
        let mut record = self.load_record(run_id).await?;
        if record.status.is_terminal() {
            return Ok(());
        }
        let phase = record
            .pending_breakpoint
            .as_ref()
            .map(|p| p.spec.title.clone())
            .unwrap_or_else(|| "aborted".to_string());
        record.status = RunStatus::Failed;
        record.failure = Some(RunFailure {
            phase,
            message: reason.into(),
        });
        record.pending_breakpoint = None;
        record.touch();
        self.ledger.save_run(&record).await?;
        self.emit_run(run_id, LogLevel::Warn, "run aborted".to_string());
        Ok(())
    }

    /// The run's durable record, for inspection and reporting.
    pub async fn run_record(&self, run_id: &RunId) -> Result<RunRecord, RunnerError> {
        self.load_record(run_id).await
    }

    /// One invocation: execute the process function from the top with a
    /// fresh context; the ledger supplies every already-completed effect.
    async fn invoke(
        &self,
        process: Arc<dyn Process>,
        record: RunRecord,
    ) -> Result<RunReport, RunnerError> {
        let run_id = record.run_id.clone();
        let inputs = record.inputs.clone();

        let shared = Arc::new(RunShared::begin(self.ledger.clone(), self.autosave, record));
        let executor = Arc::new(TaskExecutor::new(
            self.ledger.clone(),
            self.collaborator.clone(),
            self.event_bus.get_emitter(),
        ));
        let ctx = ProcessContext::new(
            run_id.clone(),
            executor,
            self.event_bus.get_emitter(),
            shared.clone(),
        );

        let outcome = match process.run(inputs, ctx).await {
            Ok(result) => {
                let mut record = shared.snapshot_record();
                record.status = RunStatus::Completed;
                record.result = Some(result.clone());
                record.touch();
                self.ledger.save_run(&record).await?;
                self.finalize(&run_id, LogLevel::Info, "run completed");
                RunOutcome::Completed(result)
            }
            Err(RunError::Suspended { breakpoint }) => {
                // The context already persisted the Paused record.
                self.finalize(&run_id, LogLevel::Info, "run suspended at breakpoint");
                RunOutcome::Suspended {
                    breakpoint: *breakpoint,
                }
            }
            Err(err) => {
                let failure = RunFailure {
                    phase: shared.phase().unwrap_or_else(|| "start".to_string()),
                    message: err.to_string(),
                };
                let mut record = shared.snapshot_record();
                record.status = RunStatus::Failed;
                record.failure = Some(failure.clone());
                record.pending_breakpoint = None;
                record.touch();
                self.ledger.save_run(&record).await?;
                self.finalize(&run_id, LogLevel::Error, "run failed");
                RunOutcome::Failed(failure)
            }
        };

        Ok(RunReport { run_id, outcome })
    }

    fn emit_run(&self, run_id: &RunId, level: LogLevel, message: String) {
        let _ = self
            .event_bus
            .get_emitter()
            .emit(Event::run_with_level(run_id.as_str(), level, "runner", message));
    }

    fn finalize(&self, run_id: &RunId, level: LogLevel, message: &str) {
        self.emit_run(run_id, level, message.to_string());
        let _ = self.event_bus.get_emitter().emit(Event::diagnostic(
            STREAM_END_SCOPE,
            format!("run={run_id} finalized"),
        ));
    }
}
