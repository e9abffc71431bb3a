//! Producer handle for the event bus.

use miette::Diagnostic;
use thiserror::Error;

use super::event::Event;

/// Errors that can occur when emitting events.
#[derive(Debug, Error, Diagnostic)]
pub enum EmitError {
    /// The bus channel is disconnected (listener dropped or bus shut down).
    #[error("failed to emit event: event bus unavailable")]
    #[diagnostic(
        code(duraloom::event_bus::unavailable),
        help("The event bus may be shut down. Check the runner's lifecycle.")
    )]
    Closed,
}

/// Cheap, cloneable handle for emitting events onto a bus.
#[derive(Clone, Debug)]
pub struct EventEmitter {
    sender: flume::Sender<Event>,
}

impl EventEmitter {
    pub(crate) fn new(sender: flume::Sender<Event>) -> Self {
        Self { sender }
    }

    pub fn emit(&self, event: Event) -> Result<(), EmitError> {
        self.sender.send(event).map_err(|_| EmitError::Closed)
    }
}
