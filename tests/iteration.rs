//! Quality-gate loop: convergence, bounded termination, the attention
//! threshold, and opt-in budget failure.

mod common;

use async_trait::async_trait;
use common::{FnCollaborator, ScriptedCollaborator, runner_with};
use duraloom::breakpoint::Decision;
use duraloom::process::{Process, ProcessResult};
use duraloom::runtime::{
    IterationOutcome, LoopConfig, ProcessContext, RunError, RunOutcome, run_loop,
};
use duraloom::task::{FieldKind, OutputSchema, TaskDefinition};
use duraloom::types::RunStatus;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

fn measure_task() -> TaskDefinition {
    TaskDefinition::agent("measure", "Measure deviation from target", "calibrator")
        .with_output_schema(OutputSchema::new().require("deviation", FieldKind::Number))
}

/// Loop process tuning parameters until the measured deviation is ≤ 0.1.
struct TuningProcess {
    max_iterations: u32,
    attention_after: Option<u32>,
    require_converged: bool,
}

impl TuningProcess {
    fn bounded(max_iterations: u32) -> Self {
        Self {
            max_iterations,
            attention_after: None,
            require_converged: false,
        }
    }
}

#[async_trait]
impl Process for TuningProcess {
    fn name(&self) -> &str {
        "tuning"
    }

    async fn run(&self, _inputs: Value, ctx: ProcessContext) -> Result<ProcessResult, RunError> {
        let mut config = LoopConfig::new("tune", self.max_iterations);
        if let Some(after) = self.attention_after {
            config = config.with_attention_after(after);
        }

        let outcome = run_loop(
            &ctx,
            config,
            json!({"gain": 1.0}),
            |iter_ctx, params, _previous| async move {
                let measured = iter_ctx
                    .task(&measure_task(), json!({"params": params}))
                    .await?;
                Ok(IterationOutcome {
                    params: json!({"gain": 1.0}),
                    measurement: measured["deviation"].clone(),
                })
            },
            |measurement| measurement.as_f64().is_some_and(|d| d <= 0.1),
        )
        .await?;

        let outcome = if self.require_converged {
            outcome.require_converged()?
        } else {
            outcome
        };

        let summary = serde_json::to_value(&outcome)
            .map_err(|e| RunError::Other(e.to_string()))?;
        Ok(ProcessResult::ok(summary))
    }
}

#[tokio::test]
async fn loop_stops_once_the_predicate_holds() {
    // Iteration 1 measures 0.35, iteration 2 measures 0.08.
    let collaborator = ScriptedCollaborator::new(vec![
        Ok(json!({"deviation": 0.35})),
        Ok(json!({"deviation": 0.08})),
    ]);
    let (mut runner, _sink) = runner_with(collaborator.clone());
    runner.register(Arc::new(TuningProcess::bounded(10)));

    let report = runner.start("tuning", json!({})).await.unwrap();
    let RunOutcome::Completed(result) = report.outcome else {
        panic!("expected completion");
    };
    assert_eq!(result.output["converged"], json!(true));
    assert_eq!(result.output["iterations"], json!(2));
    assert_eq!(result.output["history"].as_array().unwrap().len(), 2);
    assert_eq!(collaborator.dispatch_count(), 2);
}

#[tokio::test]
async fn exhausted_budget_runs_exactly_max_iterations() {
    let dispatches = Arc::new(AtomicU32::new(0));
    let collaborator = {
        let dispatches = dispatches.clone();
        FnCollaborator(move |_req: &duraloom::task::TaskRequest| {
            dispatches.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"deviation": 0.5}))
        })
    };
    let (mut runner, _sink) = runner_with(Arc::new(collaborator));
    runner.register(Arc::new(TuningProcess::bounded(5)));

    let report = runner.start("tuning", json!({})).await.unwrap();
    let RunOutcome::Completed(result) = report.outcome else {
        panic!("expected completion");
    };
    // Non-fatal by default: the run completes with converged=false.
    assert!(result.success);
    assert_eq!(result.output["converged"], json!(false));
    assert_eq!(result.output["iterations"], json!(5));
    assert_eq!(result.output["history"].as_array().unwrap().len(), 5);
    assert_eq!(dispatches.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn attention_threshold_gates_continuation() {
    let dispatches = Arc::new(AtomicU32::new(0));
    let collaborator = {
        let dispatches = dispatches.clone();
        FnCollaborator(move |_req: &duraloom::task::TaskRequest| {
            dispatches.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"deviation": 0.5}))
        })
    };
    let (mut runner, _sink) = runner_with(Arc::new(collaborator));
    runner.register(Arc::new(TuningProcess {
        max_iterations: 5,
        attention_after: Some(2),
        require_converged: false,
    }));

    // Two iterations run, then the loop parks at the continue? gate.
    let report = runner.start("tuning", json!({})).await.unwrap();
    let RunOutcome::Suspended { breakpoint } = &report.outcome else {
        panic!("expected suspension at the attention gate");
    };
    assert_eq!(breakpoint.title, "tune: continue?");
    assert_eq!(dispatches.load(Ordering::SeqCst), 2);

    // Approval resumes: completed iterations replay, three more run.
    let resumed = runner.resume(&report.run_id, Decision::Approved).await.unwrap();
    let RunOutcome::Completed(result) = resumed.outcome else {
        panic!("expected completion after approval");
    };
    assert_eq!(result.output["iterations"], json!(5));
    assert_eq!(result.output["converged"], json!(false));
    assert_eq!(dispatches.load(Ordering::SeqCst), 5, "replayed iterations never re-dispatch");
}

#[tokio::test]
async fn attention_gate_rejection_fails_the_run() {
    let collaborator = FnCollaborator(|_req: &duraloom::task::TaskRequest| {
        Ok(json!({"deviation": 0.5}))
    });
    let (mut runner, _sink) = runner_with(Arc::new(collaborator));
    runner.register(Arc::new(TuningProcess {
        max_iterations: 5,
        attention_after: Some(2),
        require_converged: false,
    }));

    let report = runner.start("tuning", json!({})).await.unwrap();
    let rejected = runner
        .resume(&report.run_id, Decision::rejected("diverging, stop here"))
        .await
        .unwrap();

    let RunOutcome::Failed(failure) = rejected.outcome else {
        panic!("expected failure after rejection");
    };
    assert_eq!(failure.phase, "tune: continue?");
    assert!(failure.message.contains("diverging"));

    let record = runner.run_record(&report.run_id).await.unwrap();
    assert_eq!(record.status, RunStatus::Failed);
}

#[tokio::test]
async fn require_converged_turns_exhaustion_into_failure() {
    let collaborator = FnCollaborator(|_req: &duraloom::task::TaskRequest| {
        Ok(json!({"deviation": 0.5}))
    });
    let (mut runner, _sink) = runner_with(Arc::new(collaborator));
    runner.register(Arc::new(TuningProcess {
        max_iterations: 3,
        attention_after: None,
        require_converged: true,
    }));

    let report = runner.start("tuning", json!({})).await.unwrap();
    let RunOutcome::Failed(failure) = report.outcome else {
        panic!("expected failure");
    };
    assert!(failure.message.contains("iteration budget exhausted"));
    assert!(failure.message.contains("tune"));
}

#[tokio::test]
async fn iteration_scoped_effects_have_distinct_ids() {
    let collaborator = ScriptedCollaborator::new(vec![
        Ok(json!({"deviation": 0.4})),
        Ok(json!({"deviation": 0.05})),
    ]);
    let (mut runner, _sink) = runner_with(collaborator);
    runner.register(Arc::new(TuningProcess::bounded(4)));

    let report = runner.start("tuning", json!({})).await.unwrap();
    let ledger = runner.ledger();
    for encoded in ["measure#1@i1", "measure#1@i2"] {
        let effect_id = duraloom::types::EffectId::decode(encoded).unwrap();
        assert!(
            ledger
                .get_effect(&report.run_id, &effect_id)
                .await
                .unwrap()
                .is_some(),
            "missing {encoded}"
        );
    }
}
