//! The bus itself: channel, background listener, subscriptions.

use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use tokio::{sync::oneshot, task};

use super::emitter::EventEmitter;
use super::event::{Event, STREAM_END_SCOPE};
use super::sink::{EventSink, ForwardSink, StdOutSink};

/// Receives events and broadcasts them to multiple sinks.
///
/// The bus owns an unbounded flume channel; [`listen_for_events`]
/// (idempotent) spawns a background task that drains the channel into every
/// installed sink. Producers emit through [`EventEmitter`] handles obtained
/// from [`get_emitter`].
///
/// [`listen_for_events`]: Self::listen_for_events
/// [`get_emitter`]: Self::get_emitter
pub struct EventBus {
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
    event_channel: (flume::Sender<Event>, flume::Receiver<Event>),
    listener: Arc<Mutex<Option<ListenerState>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sink(StdOutSink::default())
    }
}

impl EventBus {
    /// Create an EventBus with a single sink.
    pub fn with_sink<T>(sink: T) -> Self
    where
        T: EventSink + 'static,
    {
        Self::with_sinks(vec![Box::new(sink)])
    }

    /// Create an EventBus with multiple sinks.
    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self {
            sinks: Arc::new(Mutex::new(sinks)),
            event_channel: flume::unbounded(),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Dynamically add a sink (useful for per-run streaming).
    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        if let Ok(mut sinks) = self.sinks.lock() {
            sinks.push(Box::new(sink));
        }
    }

    /// Producer handle for emitting events onto this bus.
    pub fn get_emitter(&self) -> EventEmitter {
        EventEmitter::new(self.event_channel.0.clone())
    }

    /// Subscribe to events flowing through this bus.
    ///
    /// The stream ends when an event with [`STREAM_END_SCOPE`] is observed
    /// or the bus shuts down.
    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = flume::unbounded();
        self.add_sink(ForwardSink { tx });
        EventStream::new(rx)
    }

    /// Spawn a background task that listens for events and broadcasts to all
    /// sinks. Idempotent: calling multiple times has no effect.
    pub fn listen_for_events(&self) {
        let mut guard = match self.listener.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        if guard.is_some() {
            return; // Already listening
        }

        let receiver = self.event_channel.1.clone();
        let sinks = self.sinks.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    recv = receiver.recv_async() => match recv {
                        Err(_) => break,
                        Ok(event) => {
                            if let Ok(mut sinks_guard) = sinks.lock() {
                                for sink in sinks_guard.iter_mut() {
                                    if let Err(e) = sink.handle(&event) {
                                        tracing::debug!(error = %e, "event sink error");
                                    }
                                }
                            }
                        }
                    }
                }
            }
        });

        *guard = Some(ListenerState {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the background listener task, draining nothing further.
    pub async fn stop_listener(&self) {
        let state = {
            match self.listener.lock() {
                Ok(mut guard) => guard.take(),
                Err(_) => None,
            }
        };
        if let Some(state) = state {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.listener.lock() {
            if let Some(state) = guard.take() {
                let _ = state.shutdown_tx.send(());
                state.handle.abort();
            }
        }
    }
}

struct ListenerState {
    shutdown_tx: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}

/// Pull-based view of a bus subscription.
pub struct EventStream {
    inner: flume::r#async::RecvStream<'static, Event>,
}

impl EventStream {
    fn new(rx: flume::Receiver<Event>) -> Self {
        Self {
            inner: rx.into_stream(),
        }
    }

    /// Next event, or `None` once the stream terminates.
    pub async fn next(&mut self) -> Option<Event> {
        match self.inner.next().await {
            Some(event) if event.scope_label() == STREAM_END_SCOPE => None,
            other => other,
        }
    }
}
