//! Artifact aggregation: append order across phases, duplicates, and
//! persistence with the run record.

mod common;

use async_trait::async_trait;
use common::{ScriptedCollaborator, runner_with};
use duraloom::artifact::{Artifact, ArtifactManifest};
use duraloom::process::{Process, ProcessResult};
use duraloom::runtime::{ProcessContext, RunError, RunOutcome};
use duraloom::task::TaskDefinition;
use serde_json::{Value, json};
use std::sync::Arc;

struct ReportingProcess;

#[async_trait]
impl Process for ReportingProcess {
    fn name(&self) -> &str {
        "reporting"
    }

    async fn run(&self, inputs: Value, ctx: ProcessContext) -> Result<ProcessResult, RunError> {
        ctx.add_artifact(Artifact::inline("phase1/notes.md", "markdown", "phase 1"));

        let analysis = ctx
            .task(
                &TaskDefinition::agent("analyze", "Analyze the inputs", "analyst"),
                inputs,
            )
            .await?;

        ctx.add_artifacts(vec![
            Artifact::inline("phase2/findings.json", "json", analysis.to_string()),
            // Same path again on purpose: revisions are distinct entries.
            Artifact::inline("phase1/notes.md", "markdown", "phase 2 revision"),
        ]);

        ctx.add_artifact(Artifact::reference(
            "phase3/evidence.tar",
            "binary",
            "s3://evidence/run",
        ));

        Ok(ProcessResult::ok(json!({"artifacts": ctx.artifacts().len()})))
    }
}

#[tokio::test]
async fn manifest_preserves_chronological_append_order() {
    let collaborator = ScriptedCollaborator::new(vec![Ok(json!({"insights": 3}))]);
    let (mut runner, _sink) = runner_with(collaborator);
    runner.register(Arc::new(ReportingProcess));

    let report = runner.start("reporting", json!({"data": [1]})).await.unwrap();
    let RunOutcome::Completed(result) = report.outcome else {
        panic!("expected completion");
    };
    assert_eq!(result.output, json!({"artifacts": 4}));

    let record = runner.run_record(&report.run_id).await.unwrap();
    let paths: Vec<&str> = record.artifacts.iter().map(|a| a.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "phase1/notes.md",
            "phase2/findings.json",
            "phase1/notes.md",
            "phase3/evidence.tar",
        ]
    );

    // Duplicate paths stay distinct entries, in append order.
    assert_eq!(record.artifacts[0].content.as_deref(), Some("phase 1"));
    assert_eq!(
        record.artifacts[2].content.as_deref(),
        Some("phase 2 revision")
    );
    // Reference artifacts carry no inline content.
    assert_eq!(record.artifacts[3].content, None);
    assert_eq!(
        record.artifacts[3].reference.as_deref(),
        Some("s3://evidence/run")
    );
}

#[test]
fn manifest_is_append_only() {
    let mut manifest = ArtifactManifest::new();
    manifest.push(Artifact::inline("a.md", "markdown", "1"));
    let before = manifest.snapshot();

    manifest.append(vec![
        Artifact::inline("b.md", "markdown", "2"),
        Artifact::inline("c.md", "markdown", "3"),
    ]);
    let after = manifest.snapshot();

    // Existing entries are untouched and keep their positions.
    assert_eq!(&after[..before.len()], &before[..]);
    assert_eq!(after.len(), 3);
    assert_eq!(manifest.len(), 3);
    assert!(!manifest.is_empty());
}
