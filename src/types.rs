//! Core identity types for the duraloom runtime.
//!
//! This module defines the identifiers every other component keys on:
//! [`RunId`] for one execution of a process, [`EffectId`] for one durable
//! effect within a run, and [`RunStatus`] for the run lifecycle.
//!
//! # Persistence
//!
//! Both id types support serde and a stable string form via
//! [`encode`](EffectId::encode)/[`decode`](EffectId::decode), which is what
//! ledger backends use as storage keys.
//!
//! # Examples
//!
//! ```rust
//! use duraloom::types::EffectId;
//!
//! let effect = EffectId::resolve("draft-review", 1, None);
//! assert_eq!(effect.encode(), "draft-review#1");
//!
//! let looped = EffectId::resolve("optimize", 2, Some(3));
//! assert_eq!(looped.encode(), "optimize#2@i3");
//!
//! let decoded = EffectId::decode("optimize#2@i3").unwrap();
//! assert_eq!(decoded, looped);
//! ```

use std::fmt;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of one process run.
///
/// Immutable for the lifetime of the run; every ledger record carries it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle status of a process run.
///
/// `Completed` and `Failed` are terminal; the runtime never transitions a
/// run out of a terminal status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run is executing (or eligible to execute) its next step.
    Running,
    /// The run is suspended awaiting a human breakpoint resolution.
    Paused,
    /// The run finished; its result is recorded on the run record.
    Completed,
    /// The run hit a fatal error, a rejected breakpoint, or an abort.
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic identity of one effect within a run.
///
/// An `EffectId` is a pure function of the call-site token, the per-token
/// occurrence ordinal (1-based, counting invocations of the same token in
/// declaration order), and the iteration index when the call site sits
/// inside a quality-gate loop. Identical runs replay to an identical
/// effect-id sequence.
///
/// # Stability contract
///
/// Identity does **not** depend on the global step position. Inserting a
/// step with a fresh token into a process between a run's suspension and its
/// resumption leaves existing ids untouched. Reordering or renaming call
/// sites that have already succeeded invalidates replay for in-flight runs
/// and is unsupported.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectId {
    call_site: String,
    occurrence: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    iteration: Option<u32>,
}

impl EffectId {
    /// Resolve an effect id from its identity components. Pure.
    pub fn resolve(call_site: impl Into<String>, occurrence: u32, iteration: Option<u32>) -> Self {
        Self {
            call_site: call_site.into(),
            occurrence,
            iteration,
        }
    }

    pub fn call_site(&self) -> &str {
        &self.call_site
    }

    pub fn occurrence(&self) -> u32 {
        self.occurrence
    }

    pub fn iteration(&self) -> Option<u32> {
        self.iteration
    }

    /// Encode to the stable string form used as a ledger key:
    /// `"<call-site>#<occurrence>"`, with an `"@i<iteration>"` suffix for
    /// call sites inside a loop.
    pub fn encode(&self) -> String {
        match self.iteration {
            Some(i) => format!("{}#{}@i{}", self.call_site, self.occurrence, i),
            None => format!("{}#{}", self.call_site, self.occurrence),
        }
    }

    /// Decode the string form produced by [`encode`](Self::encode).
    ///
    /// The call-site token may itself contain `#` or `@`; the numeric
    /// occurrence/iteration tail keeps the encoding unambiguous, so decoding
    /// splits on the *last* `#`.
    pub fn decode(raw: &str) -> Result<Self, IdentityError> {
        let invalid = || IdentityError::InvalidEffectId {
            raw: raw.to_string(),
        };

        let hash = raw.rfind('#').ok_or_else(invalid)?;
        let call_site = &raw[..hash];
        if call_site.is_empty() {
            return Err(invalid());
        }
        let tail = &raw[hash + 1..];

        let (occurrence_part, iteration) = match tail.split_once("@i") {
            Some((occ, iter)) => {
                let iteration = iter.parse::<u32>().map_err(|_| invalid())?;
                (occ, Some(iteration))
            }
            None => (tail, None),
        };
        let occurrence = occurrence_part.parse::<u32>().map_err(|_| invalid())?;

        Ok(Self {
            call_site: call_site.to_string(),
            occurrence,
            iteration,
        })
    }
}

// Display matches the persisted encoding so tracing fields and ledger keys
// always agree.
impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Errors arising from identity parsing.
#[derive(Debug, Error, Diagnostic)]
pub enum IdentityError {
    #[error("invalid effect id: {raw}")]
    #[diagnostic(
        code(duraloom::types::invalid_effect_id),
        help("Effect ids use the form '<call-site>#<occurrence>' with an optional '@i<iteration>' suffix.")
    )]
    InvalidEffectId { raw: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let id = EffectId::resolve("collect-evidence", 4, None);
        assert_eq!(EffectId::decode(&id.encode()).unwrap(), id);

        let looped = EffectId::resolve("optimize", 1, Some(12));
        assert_eq!(EffectId::decode(&looped.encode()).unwrap(), looped);
    }

    #[test]
    fn decode_tolerates_hash_in_call_site() {
        let id = EffectId::resolve("review#final", 2, Some(1));
        let decoded = EffectId::decode(&id.encode()).unwrap();
        assert_eq!(decoded.call_site(), "review#final");
        assert_eq!(decoded.occurrence(), 2);
        assert_eq!(decoded.iteration(), Some(1));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(EffectId::decode("no-separator").is_err());
        assert!(EffectId::decode("#1").is_err());
        assert!(EffectId::decode("task#notanumber").is_err());
        assert!(EffectId::decode("task#1@ix").is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Paused.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }
}
