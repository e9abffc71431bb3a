//! Bounded quality-gate iteration loops.
//!
//! [`run_loop`] drives a `(propose → execute → measure)` cycle until the
//! exit predicate accepts a measurement or the iteration budget runs out.
//! Effects inside the loop carry the iteration index in their ids, so replay
//! walks completed iterations without re-dispatching anything.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::context::{ProcessContext, RunError};
use crate::breakpoint::BreakpointSpec;
use crate::event_bus::LogLevel;

/// Configuration of one loop invocation.
#[derive(Clone, Debug)]
pub struct LoopConfig {
    /// Label identifying the loop in events and error reports.
    pub label: String,
    pub max_iterations: u32,
    /// After this many non-converged iterations, surface a continue?
    /// breakpoint before proceeding.
    pub attention_after: Option<u32>,
}

impl LoopConfig {
    pub fn new(label: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            label: label.into(),
            max_iterations,
            attention_after: None,
        }
    }

    #[must_use]
    pub fn with_attention_after(mut self, iterations: u32) -> Self {
        self.attention_after = Some(iterations);
        self
    }
}

/// What one iteration's step function produces: the next candidate
/// parameters and the measurement the exit predicate judges.
#[derive(Clone, Debug)]
pub struct IterationOutcome {
    pub params: Value,
    pub measurement: Value,
}

/// One entry of a loop's recorded history.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IterationRecord {
    pub iteration: u32,
    pub params: Value,
    pub measurement: Value,
}

/// Result of a completed loop.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LoopOutcome {
    pub label: String,
    pub final_params: Value,
    pub history: Vec<IterationRecord>,
    pub converged: bool,
    pub iterations: u32,
}

impl LoopOutcome {
    /// Treat a non-converged loop as fatal. Budget exhaustion is non-fatal
    /// by default; composition layers that want a hard failure opt in here.
    pub fn require_converged(self) -> Result<LoopOutcome, RunError> {
        if self.converged {
            Ok(self)
        } else {
            Err(RunError::IterationBudgetExhausted {
                label: self.label,
                iterations: self.iterations,
            })
        }
    }
}

/// Drive a bounded optimize/measure loop.
///
/// Each iteration invokes `step(iteration_ctx, params, previous_measurement)`
/// with a context scoped to that iteration. The loop stops with
/// `converged = true` as soon as `exit(&measurement)` holds, and with
/// `converged = false` once `max_iterations` have run. The exit predicate
/// must be a pure function of the measurement.
///
/// When `attention_after` iterations complete without convergence, a
/// continue? breakpoint is raised before the next iteration: approval
/// continues the loop, rejection terminates the run like any other rejected
/// breakpoint, and an unresolved gate suspends the run (replay re-enters the
/// loop and walks completed iterations from the ledger).
pub async fn run_loop<F, Fut, P>(
    ctx: &ProcessContext,
    config: LoopConfig,
    initial_params: Value,
    mut step: F,
    exit: P,
) -> Result<LoopOutcome, RunError>
where
    F: FnMut(ProcessContext, Value, Option<Value>) -> Fut,
    Fut: Future<Output = Result<IterationOutcome, RunError>>,
    P: Fn(&Value) -> bool,
{
    let mut params = initial_params;
    let mut previous: Option<Value> = None;
    let mut history: Vec<IterationRecord> = Vec::new();
    let mut converged = false;
    let mut iterations = 0;

    for iteration in 1..=config.max_iterations {
        if let Some(threshold) = config.attention_after {
            if iteration == threshold + 1 {
                ctx.breakpoint(attention_gate(&config, &history)).await?;
            }
        }

        let scoped = ctx.for_iteration(iteration);
        let outcome = step(scoped, params.clone(), previous.clone()).await?;
        iterations = iteration;

        history.push(IterationRecord {
            iteration,
            params: outcome.params.clone(),
            measurement: outcome.measurement.clone(),
        });
        params = outcome.params;
        previous = Some(outcome.measurement.clone());

        ctx.log(
            LogLevel::Debug,
            format!(
                "loop '{}' iteration {iteration}/{} measured {}",
                config.label, config.max_iterations, outcome.measurement
            ),
        );

        if exit(&outcome.measurement) {
            converged = true;
            break;
        }
    }

    ctx.log(
        if converged { LogLevel::Info } else { LogLevel::Warn },
        format!(
            "loop '{}' finished after {iterations} iteration(s), converged={converged}",
            config.label
        ),
    );

    Ok(LoopOutcome {
        label: config.label,
        final_params: params,
        history,
        converged,
        iterations,
    })
}

fn attention_gate(config: &LoopConfig, history: &[IterationRecord]) -> BreakpointSpec {
    BreakpointSpec::new(
        format!("{}: continue?", config.label),
        format!(
            "Loop '{}' has run {} iteration(s) without converging. Continue iterating?",
            config.label,
            history.len()
        ),
    )
    .with_context(json!({
        "loop": config.label,
        "maxIterations": config.max_iterations,
        "history": history,
    }))
}
