//! The effect ledger: durable, write-once storage of task effects and run
//! records.
//!
//! The ledger is the single shared mutable resource of the runtime. Its
//! contract carries the whole replay guarantee:
//!
//! - at most one [`EffectRecord`] per `(run_id, effect_id)` ever holds
//!   `Succeeded` status (write-once); concurrent duplicate success writes
//!   resolve to whichever landed first, and the losing writer receives
//!   [`PutOutcome::Conflict`] with the winning record,
//! - a failed attempt may be overwritten by a later retry, but a failure
//!   never clobbers a recorded success,
//! - writes are all-or-nothing; a record is either fully present or absent.
//!
//! Two backends ship: [`InMemoryLedger`] for tests and development, and
//! [`SqliteLedger`] (behind the `sqlite` feature) for durable runs.

pub mod record;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;

pub use record::{EffectRecord, EffectStatus, PendingBreakpoint, PutOutcome, RunFailure, RunRecord};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLedger;
pub use store::{InMemoryLedger, Ledger, LedgerError, Result};
