//! Artifacts surfaced by process steps and the per-run manifest.
//!
//! Any step may contribute artifacts (reports, tables, rendered documents)
//! for downstream review surfaces. The manifest is strictly append-only:
//! entries are never removed or reordered, and duplicate paths are preserved
//! as distinct entries in append order. Consumers wanting "latest per path"
//! fold the snapshot themselves.

use serde::{Deserialize, Serialize};

/// One named output document surfaced for reporting or review.
///
/// Carries either inline content or a reference to externally stored
/// content, never both.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Logical path of the artifact (e.g. `reports/summary.md`).
    pub path: String,
    /// Format tag understood by review surfaces (e.g. `markdown`, `json`).
    pub format: String,
    /// Inline content, when the artifact is carried in the record itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Reference to externally stored content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl Artifact {
    /// An artifact carrying its content inline.
    pub fn inline(
        path: impl Into<String>,
        format: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            format: format.into(),
            content: Some(content.into()),
            reference: None,
        }
    }

    /// An artifact pointing at externally stored content.
    pub fn reference(
        path: impl Into<String>,
        format: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            format: format.into(),
            content: None,
            reference: Some(reference.into()),
        }
    }
}

/// Append-only, ordered collection of a run's artifacts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactManifest {
    entries: Vec<Artifact>,
}

impl ArtifactManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a single artifact. Monotonic.
    pub fn push(&mut self, artifact: Artifact) {
        self.entries.push(artifact);
    }

    /// Append a batch of artifacts, preserving their order.
    pub fn append(&mut self, artifacts: impl IntoIterator<Item = Artifact>) {
        self.entries.extend(artifacts);
    }

    /// Snapshot of the manifest in append order.
    pub fn snapshot(&self) -> Vec<Artifact> {
        self.entries.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<Artifact>> for ArtifactManifest {
    fn from(entries: Vec<Artifact>) -> Self {
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_preserves_order_and_duplicates() {
        let mut manifest = ArtifactManifest::new();
        manifest.push(Artifact::inline("a.md", "markdown", "one"));
        manifest.append(vec![
            Artifact::inline("b.json", "json", "{}"),
            Artifact::inline("a.md", "markdown", "two"),
        ]);

        let snapshot = manifest.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].content.as_deref(), Some("one"));
        assert_eq!(snapshot[2].path, "a.md");
        assert_eq!(snapshot[2].content.as_deref(), Some("two"));
    }
}
