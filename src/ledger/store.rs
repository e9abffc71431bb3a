//! The `Ledger` trait and the in-memory backend.

use std::sync::Mutex;

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use super::record::{EffectRecord, EffectStatus, PutOutcome, RunRecord};
use crate::types::{EffectId, RunId};

/// Errors surfaced by ledger backends.
#[derive(Debug, Error, Diagnostic)]
pub enum LedgerError {
    #[error("ledger backend error: {message}")]
    #[diagnostic(
        code(duraloom::ledger::backend),
        help("Check that the ledger's storage is reachable and writable.")
    )]
    Backend { message: String },

    #[error("ledger serialization failed: {source}")]
    #[diagnostic(code(duraloom::ledger::serde))]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    #[error("ledger error: {0}")]
    #[diagnostic(code(duraloom::ledger::other))]
    Other(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Durable, write-once store of effect records plus the run-record side of
/// durability.
///
/// `put_effect` must be atomic and must tolerate concurrent writers racing
/// on the same key: at most one record per `(run_id, effect_id)` ever
/// transitions to Succeeded, and the losing writer observes
/// [`PutOutcome::Conflict`] carrying the winner.
#[async_trait]
pub trait Ledger: Send + Sync + std::fmt::Debug {
    /// Write an effect record, enforcing write-once-per-key success.
    async fn put_effect(&self, record: EffectRecord) -> Result<PutOutcome>;

    /// Pure lookup of an effect record.
    async fn get_effect(&self, run_id: &RunId, effect_id: &EffectId)
    -> Result<Option<EffectRecord>>;

    /// Persist the run record (upsert).
    async fn save_run(&self, run: &RunRecord) -> Result<()>;

    /// Load a run record by id.
    async fn load_run(&self, run_id: &RunId) -> Result<Option<RunRecord>>;

    /// Ids of all known runs.
    async fn list_runs(&self) -> Result<Vec<RunId>>;
}

/// Volatile ledger for testing and development.
///
/// Shares the trait's concurrency contract: the whole put is performed under
/// one mutex acquisition, so racing writers serialize and the first success
/// wins.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    effects: Mutex<FxHashMap<String, EffectRecord>>,
    runs: Mutex<FxHashMap<String, RunRecord>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn effect_key(run_id: &RunId, effect_id: &EffectId) -> String {
        format!("{}/{}", run_id, effect_id.encode())
    }

    fn poisoned() -> LedgerError {
        LedgerError::Other("in-memory ledger poisoned".to_string())
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn put_effect(&self, record: EffectRecord) -> Result<PutOutcome> {
        let key = Self::effect_key(&record.run_id, &record.effect_id);
        let mut effects = self.effects.lock().map_err(|_| Self::poisoned())?;
        if let Some(existing) = effects.get(&key) {
            if existing.status == EffectStatus::Succeeded {
                return Ok(PutOutcome::Conflict {
                    existing: existing.clone(),
                });
            }
        }
        effects.insert(key, record);
        Ok(PutOutcome::Recorded)
    }

    async fn get_effect(
        &self,
        run_id: &RunId,
        effect_id: &EffectId,
    ) -> Result<Option<EffectRecord>> {
        let effects = self.effects.lock().map_err(|_| Self::poisoned())?;
        Ok(effects.get(&Self::effect_key(run_id, effect_id)).cloned())
    }

    async fn save_run(&self, run: &RunRecord) -> Result<()> {
        let mut runs = self.runs.lock().map_err(|_| Self::poisoned())?;
        runs.insert(run.run_id.as_str().to_string(), run.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: &RunId) -> Result<Option<RunRecord>> {
        let runs = self.runs.lock().map_err(|_| Self::poisoned())?;
        Ok(runs.get(run_id.as_str()).cloned())
    }

    async fn list_runs(&self) -> Result<Vec<RunId>> {
        let runs = self.runs.lock().map_err(|_| Self::poisoned())?;
        let mut ids: Vec<RunId> = runs.keys().map(|k| RunId::from(k.as_str())).collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }
}
