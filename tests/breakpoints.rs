//! Breakpoint gate: suspension, approval, rejection, abort, and replay
//! past resolved gates.

mod common;

use async_trait::async_trait;
use common::{ScriptedCollaborator, runner_with};
use duraloom::artifact::Artifact;
use duraloom::breakpoint::{BreakpointSpec, Decision};
use duraloom::ledger::EffectStatus;
use duraloom::process::{Process, ProcessResult};
use duraloom::runtime::{ProcessContext, RunError, RunOutcome, RunnerError};
use duraloom::task::TaskDefinition;
use duraloom::types::{EffectId, RunStatus};
use serde_json::{Value, json};
use std::sync::Arc;

fn draft_task() -> TaskDefinition {
    TaskDefinition::agent("draft", "Draft the review", "author")
}

fn publish_task() -> TaskDefinition {
    TaskDefinition::agent("publish", "Publish the review", "editor")
}

struct GatedProcess;

#[async_trait]
impl Process for GatedProcess {
    fn name(&self) -> &str {
        "gated"
    }

    async fn run(&self, inputs: Value, ctx: ProcessContext) -> Result<ProcessResult, RunError> {
        let draft = ctx.task(&draft_task(), inputs).await?;

        ctx.breakpoint(
            BreakpointSpec::new("Publish review", "Publish the drafted review?")
                .with_context(json!({"draft": draft}))
                .with_file(Artifact::inline("draft.md", "markdown", "the draft")),
        )
        .await?;

        let published = ctx.task(&publish_task(), json!({"approved": true})).await?;
        Ok(ProcessResult::ok(published))
    }
}

fn gated_runner(
    responses: Vec<Result<Value, duraloom::collaborator::CollaboratorError>>,
) -> (duraloom::runtime::ProcessRunner, Arc<ScriptedCollaborator>) {
    let collaborator = ScriptedCollaborator::new(responses);
    let (mut runner, _sink) = runner_with(collaborator.clone());
    runner.register(Arc::new(GatedProcess));
    (runner, collaborator)
}

#[tokio::test]
async fn unresolved_gate_suspends_the_run() {
    let (runner, collaborator) = gated_runner(vec![Ok(json!({"body": "draft"}))]);

    let report = runner.start("gated", json!({"topic": "caching"})).await.unwrap();
    let RunOutcome::Suspended { breakpoint } = &report.outcome else {
        panic!("expected suspension, got {:?}", report.outcome);
    };
    assert_eq!(breakpoint.title, "Publish review");
    assert_eq!(collaborator.dispatch_count(), 1);

    let record = runner.run_record(&report.run_id).await.unwrap();
    assert_eq!(record.status, RunStatus::Paused);
    let pending = record.pending_breakpoint.unwrap();
    assert_eq!(pending.spec.question, "Publish the drafted review?");
    assert_eq!(pending.effect_id.encode(), "breakpoint:Publish review#1");
}

#[tokio::test]
async fn approval_resumes_past_the_gate() {
    let (runner, collaborator) = gated_runner(vec![
        Ok(json!({"body": "draft"})),
        Ok(json!({"published": true})),
    ]);

    let report = runner.start("gated", json!({"topic": "caching"})).await.unwrap();
    assert!(matches!(report.outcome, RunOutcome::Suspended { .. }));

    let resumed = runner.resume(&report.run_id, Decision::Approved).await.unwrap();
    match resumed.outcome {
        RunOutcome::Completed(result) => {
            assert!(result.success);
            assert_eq!(result.output, json!({"published": true}));
        }
        other => panic!("expected completion, got {other:?}"),
    }

    // The draft replayed from the ledger: two dispatches total, not three.
    assert_eq!(collaborator.dispatch_count(), 2);

    // Deterministic resumption: the post-gate effect sequence is stable.
    let ledger = runner.ledger();
    for encoded in ["draft#1", "breakpoint:Publish review#1", "publish#1"] {
        let effect_id = EffectId::decode(encoded).unwrap();
        let record = ledger
            .get_effect(&report.run_id, &effect_id)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("missing effect {encoded}"));
        assert_eq!(record.status, EffectStatus::Succeeded);
    }

    let record = runner.run_record(&report.run_id).await.unwrap();
    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(record.cursor, 3);
}

#[tokio::test]
async fn rejection_fails_the_run_and_skips_later_steps() {
    let (runner, collaborator) = gated_runner(vec![Ok(json!({"body": "draft"}))]);

    let report = runner.start("gated", json!({})).await.unwrap();
    let rejected = runner
        .resume(&report.run_id, Decision::rejected("needs legal review"))
        .await
        .unwrap();

    match rejected.outcome {
        RunOutcome::Failed(failure) => {
            assert_eq!(failure.phase, "Publish review");
            assert!(failure.message.contains("needs legal review"));
        }
        other => panic!("expected failure, got {other:?}"),
    }

    // The publish task never ran.
    assert_eq!(collaborator.dispatch_count(), 1);
    let record = runner.run_record(&report.run_id).await.unwrap();
    assert_eq!(record.status, RunStatus::Failed);
    assert!(record.failure.unwrap().message.contains("needs legal review"));
}

#[tokio::test]
async fn recover_reports_pending_gate_without_reprompting() {
    let (runner, collaborator) = gated_runner(vec![Ok(json!({"body": "draft"}))]);

    let report = runner.start("gated", json!({})).await.unwrap();
    let recovered = runner.recover(&report.run_id).await.unwrap();
    match recovered.outcome {
        RunOutcome::Suspended { breakpoint } => {
            assert_eq!(breakpoint.title, "Publish review");
        }
        other => panic!("expected suspension, got {other:?}"),
    }
    assert_eq!(collaborator.dispatch_count(), 1, "recovery must not re-run anything");
}

#[tokio::test]
async fn resume_is_rejected_unless_paused() {
    let (runner, _collaborator) = gated_runner(vec![
        Ok(json!({"body": "draft"})),
        Ok(json!({"published": true})),
    ]);

    let report = runner.start("gated", json!({})).await.unwrap();
    runner.resume(&report.run_id, Decision::Approved).await.unwrap();

    // The run is now terminal; a second resolution has nothing to resolve.
    let err = runner
        .resume(&report.run_id, Decision::Approved)
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::NotPaused { .. }));
}

#[tokio::test]
async fn abort_at_suspension_is_terminal() {
    let (runner, _collaborator) = gated_runner(vec![Ok(json!({"body": "draft"}))]);

    let report = runner.start("gated", json!({})).await.unwrap();
    runner.abort(&report.run_id, "operator cancelled").await.unwrap();

    let record = runner.run_record(&report.run_id).await.unwrap();
    assert_eq!(record.status, RunStatus::Failed);
    let failure = record.failure.unwrap();
    assert_eq!(failure.phase, "Publish review");
    assert_eq!(failure.message, "operator cancelled");

    // Recovery of a terminal run reports the recorded failure.
    let recovered = runner.recover(&report.run_id).await.unwrap();
    assert!(matches!(recovered.outcome, RunOutcome::Failed(_)));

    // Abort is idempotent on terminal runs.
    runner.abort(&report.run_id, "again").await.unwrap();
    let record = runner.run_record(&report.run_id).await.unwrap();
    assert_eq!(record.failure.unwrap().message, "operator cancelled");
}
