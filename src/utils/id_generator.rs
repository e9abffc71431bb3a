//! Run id generation.

use uuid::Uuid;

/// Generates unique run identifiers.
///
/// Ids are only minted when a run is *created*; replay and resumption reuse
/// the stored id, so generation here never affects effect identity.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdGenerator;

impl IdGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Generate a fresh run id of the form `run-<uuid>`.
    pub fn generate_run_id(&self) -> String {
        format!("run-{}", Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_unique_and_prefixed() {
        let ids = IdGenerator::new();
        let a = ids.generate_run_id();
        let b = ids.generate_run_id();
        assert!(a.starts_with("run-"));
        assert_ne!(a, b);
    }
}
