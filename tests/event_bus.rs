//! Event bus: broadcast to sinks and ordered stream subscription.

use duraloom::event_bus::{Event, EventBus, LogLevel, MemorySink, STREAM_END_SCOPE};

#[tokio::test]
async fn subscribed_stream_receives_events_in_order() {
    let sink = MemorySink::new();
    let bus = EventBus::with_sink(sink.clone());
    let mut stream = bus.subscribe();
    bus.listen_for_events();

    let emitter = bus.get_emitter();
    emitter
        .emit(Event::run("run-1", "runner", "run started"))
        .unwrap();
    emitter
        .emit(Event::effect(
            "run-1",
            "draft#1",
            "executor:dispatch",
            "task dispatched",
        ))
        .unwrap();
    emitter
        .emit(Event::diagnostic(STREAM_END_SCOPE, "finalized"))
        .unwrap();

    let first = stream.next().await.unwrap();
    assert_eq!(first.scope_label(), "runner");
    assert_eq!(first.message(), "run started");

    let second = stream.next().await.unwrap();
    assert_eq!(second.scope_label(), "executor:dispatch");

    // The stream terminates at the end marker.
    assert!(stream.next().await.is_none());

    // Sinks saw the same events, in the same order, before the stream did.
    let journal = sink.snapshot();
    assert_eq!(journal.len(), 3);
    assert_eq!(journal[0].message(), "run started");
    assert_eq!(journal[1].scope_label(), "executor:dispatch");
}

#[tokio::test]
async fn run_events_carry_structured_metadata() {
    let event = Event::run_with_level("run-7", LogLevel::Warn, "loop", "not converged");
    let json = event.to_json_value();
    assert_eq!(json["type"], "run");
    assert_eq!(json["metadata"]["run_id"], "run-7");
    assert_eq!(json["metadata"]["level"], "warn");
    assert!(json["timestamp"].is_string());
}
