//! Run-scoped progress events with pluggable sinks.
//!
//! Every run emits a journal of events (dispatches, replays, breakpoints,
//! loop progress) through an [`EventBus`]: a flume channel drained by a
//! background listener that broadcasts each event to its sinks. Producers
//! hold a cheap [`EventEmitter`] handle; consumers either install an
//! [`EventSink`] or pull from a subscribed [`EventStream`].

mod bus;
mod emitter;
mod event;
mod sink;

pub use bus::{EventBus, EventStream};
pub use emitter::{EmitError, EventEmitter};
pub use event::{DiagnosticEvent, Event, LogLevel, RunEvent, STREAM_END_SCOPE};
pub use sink::{ChannelSink, EventSink, MemorySink, StdOutSink};
