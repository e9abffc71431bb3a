#![allow(dead_code)]

//! Shared test doubles and fixtures.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use duraloom::collaborator::{CollaboratorError, TaskCollaborator};
use duraloom::event_bus::{EventBus, MemorySink};
use duraloom::ledger::{InMemoryLedger, Ledger};
use duraloom::runtime::ProcessRunner;
use duraloom::task::TaskRequest;
use serde_json::Value;

/// Collaborator double that serves queued responses in dispatch order and
/// records every request it sees.
pub struct ScriptedCollaborator {
    responses: Mutex<VecDeque<Result<Value, CollaboratorError>>>,
    requests: Mutex<Vec<TaskRequest>>,
}

impl ScriptedCollaborator {
    pub fn new(responses: Vec<Result<Value, CollaboratorError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// How many dispatches actually reached the collaborator.
    pub fn dispatch_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<TaskRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskCollaborator for ScriptedCollaborator {
    async fn dispatch(&self, request: &TaskRequest) -> Result<Value, CollaboratorError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CollaboratorError::terminal("collaborator script exhausted")))
    }
}

/// Collaborator double computing each response from the request.
pub struct FnCollaborator<F>(pub F);

#[async_trait]
impl<F> TaskCollaborator for FnCollaborator<F>
where
    F: Fn(&TaskRequest) -> Result<Value, CollaboratorError> + Send + Sync,
{
    async fn dispatch(&self, request: &TaskRequest) -> Result<Value, CollaboratorError> {
        (self.0)(request)
    }
}

/// Runner over a fresh in-memory ledger, with a memory sink capturing the
/// event journal.
pub fn runner_with(collaborator: Arc<dyn TaskCollaborator>) -> (ProcessRunner, MemorySink) {
    let ledger: Arc<dyn Ledger> = Arc::new(InMemoryLedger::new());
    runner_over(ledger, collaborator)
}

/// Runner over a caller-provided ledger (e.g. shared across "instances").
pub fn runner_over(
    ledger: Arc<dyn Ledger>,
    collaborator: Arc<dyn TaskCollaborator>,
) -> (ProcessRunner, MemorySink) {
    let sink = MemorySink::new();
    let bus = EventBus::with_sink(sink.clone());
    let runner = ProcessRunner::with_ledger(ledger, collaborator, bus);
    (runner, sink)
}
