//! Durable execute-or-replay of tasks.
//!
//! The executor is the only component that talks to the execution
//! collaborator. For each effect it consults the ledger first (replay
//! short-circuit), validates the declared input/output contracts around the
//! dispatch, and records the result write-once. It never marks a record
//! Succeeded on a failed or invalid-output call; retry policy belongs to the
//! collaborator boundary.

use std::sync::Arc;

use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use crate::collaborator::{CollaboratorError, TaskCollaborator};
use crate::event_bus::{Event, EventEmitter};
use crate::ledger::{EffectRecord, EffectStatus, Ledger, LedgerError, PutOutcome};
use crate::task::TaskDefinition;
use crate::types::{EffectId, RunId};
use crate::utils::json_ext::extract_first_json;

/// Errors fatal to one effect attempt.
#[derive(Debug, Error, Diagnostic)]
pub enum TaskError {
    /// The input is missing fields the task definition requires.
    #[error("input contract violation for task '{task}': missing {missing:?}")]
    #[diagnostic(
        code(duraloom::executor::input_contract),
        help("Populate the required input fields before invoking the task.")
    )]
    InputContractViolation { task: String, missing: Vec<String> },

    /// The collaborator's output fails the declared output schema.
    #[error("output contract violation for task '{task}': {}", .violations.join("; "))]
    #[diagnostic(
        code(duraloom::executor::output_contract),
        help("The collaborator response does not satisfy the declared schema; retry or surface per policy.")
    )]
    OutputContractViolation {
        task: String,
        violations: Vec<String>,
    },

    /// The collaborator raised.
    #[error("task '{task}' execution failed: {source}")]
    #[diagnostic(code(duraloom::executor::execution))]
    Execution {
        task: String,
        #[source]
        source: CollaboratorError,
    },

    #[error(transparent)]
    #[diagnostic(code(duraloom::executor::ledger))]
    Ledger(#[from] LedgerError),
}

/// Executes-or-replays tasks against a ledger and a collaborator.
pub struct TaskExecutor {
    ledger: Arc<dyn Ledger>,
    collaborator: Arc<dyn TaskCollaborator>,
    emitter: EventEmitter,
}

impl TaskExecutor {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        collaborator: Arc<dyn TaskCollaborator>,
        emitter: EventEmitter,
    ) -> Self {
        Self {
            ledger,
            collaborator,
            emitter,
        }
    }

    /// Deterministic effect identity for a call site. Pure; delegates to
    /// [`EffectId::resolve`].
    pub fn resolve_effect_id(
        call_site: impl Into<String>,
        occurrence: u32,
        iteration: Option<u32>,
    ) -> EffectId {
        EffectId::resolve(call_site, occurrence, iteration)
    }

    /// Execute the task, or replay its recorded output.
    #[instrument(
        skip(self, def, input),
        fields(run = %run_id, effect = %effect_id, task = %def.name),
        err
    )]
    pub async fn execute(
        &self,
        run_id: &RunId,
        effect_id: &EffectId,
        def: &TaskDefinition,
        input: Value,
    ) -> Result<Value, TaskError> {
        if let Some(existing) = self.ledger.get_effect(run_id, effect_id).await? {
            if existing.status == EffectStatus::Succeeded {
                self.emit(run_id, effect_id, "replay", format!("task '{}' replayed", def.name));
                return Ok(existing.output.unwrap_or(Value::Null));
            }
        }

        let missing = def.missing_inputs(&input);
        if !missing.is_empty() {
            return Err(TaskError::InputContractViolation {
                task: def.name.clone(),
                missing,
            });
        }

        let request = def.request(&input);
        self.emit(
            run_id,
            effect_id,
            "dispatch",
            format!("task '{}' dispatched to collaborator", def.name),
        );

        let raw = match self.collaborator.dispatch(&request).await {
            Ok(raw) => raw,
            Err(source) => {
                if let Some(adopted) = self
                    .record_failure(run_id, effect_id, def, &input, source.to_string())
                    .await?
                {
                    return Ok(adopted);
                }
                return Err(TaskError::Execution {
                    task: def.name.clone(),
                    source,
                });
            }
        };

        let output = normalize_output(raw);
        if let Err(violations) = def.output_schema.validate(&output) {
            let detail = format!("output contract violation: {}", violations.join("; "));
            if let Some(adopted) = self
                .record_failure(run_id, effect_id, def, &input, detail)
                .await?
            {
                return Ok(adopted);
            }
            return Err(TaskError::OutputContractViolation {
                task: def.name.clone(),
                violations,
            });
        }

        let record = EffectRecord::succeeded(
            run_id.clone(),
            effect_id.clone(),
            def.name.clone(),
            input,
            output.clone(),
        );
        match self.ledger.put_effect(record).await? {
            PutOutcome::Recorded => {
                self.emit(
                    run_id,
                    effect_id,
                    "recorded",
                    format!("task '{}' succeeded", def.name),
                );
                Ok(output)
            }
            PutOutcome::Conflict { existing } => {
                // A concurrent dispatch won the race; adopt its output.
                self.emit(
                    run_id,
                    effect_id,
                    "conflict",
                    format!("task '{}' adopted winning record", def.name),
                );
                Ok(existing.output.unwrap_or(Value::Null))
            }
        }
    }

    /// Record a failed attempt. Returns the winning output if a concurrent
    /// dispatch already succeeded on this key.
    async fn record_failure(
        &self,
        run_id: &RunId,
        effect_id: &EffectId,
        def: &TaskDefinition,
        input: &Value,
        error: String,
    ) -> Result<Option<Value>, TaskError> {
        let record = EffectRecord::failed(
            run_id.clone(),
            effect_id.clone(),
            def.name.clone(),
            input.clone(),
            error,
        );
        match self.ledger.put_effect(record).await? {
            PutOutcome::Recorded => Ok(None),
            PutOutcome::Conflict { existing } => {
                self.emit(
                    run_id,
                    effect_id,
                    "conflict",
                    format!("task '{}' adopted winning record", def.name),
                );
                Ok(Some(existing.output.unwrap_or(Value::Null)))
            }
        }
    }

    fn emit(&self, run_id: &RunId, effect_id: &EffectId, scope: &str, message: String) {
        let _ = self.emitter.emit(Event::effect(
            run_id.as_str(),
            effect_id.encode(),
            format!("executor:{scope}"),
            message,
        ));
    }
}

/// Collaborators sometimes answer with prose-wrapped JSON. A string response
/// is scanned for its first embedded JSON value; anything else passes
/// through untouched.
fn normalize_output(raw: Value) -> Value {
    match raw {
        Value::String(text) => extract_first_json(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}
