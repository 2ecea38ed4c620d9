//! Tests for the pipeline event sink

use venue_moderation::core::{build_event, EventSink, InMemoryEventSink, PipelineAction};

#[tokio::test]
async fn test_in_memory_event_sink() {
    let sink = InMemoryEventSink::new(10);

    let event = build_event(
        1,
        42,
        PipelineAction::JobStarted,
        Some(serde_json::json!({ "priority": 5 })),
    );
    sink.append(event.clone()).await.unwrap();

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].venue_id, 1);
    assert_eq!(events[0].user_id, 42);
    assert_eq!(events[0].action, PipelineAction::JobStarted);
}

#[tokio::test]
async fn test_event_sink_overflow() {
    let sink = InMemoryEventSink::new(2);

    sink.append(build_event(1, 1, PipelineAction::JobStarted, None)).await.unwrap();
    sink.append(build_event(2, 1, PipelineAction::JobStarted, None)).await.unwrap();
    sink.append(build_event(3, 1, PipelineAction::JobStarted, None)).await.unwrap();

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].venue_id, 2); // oldest dropped
    assert_eq!(events[1].venue_id, 3);
}

#[tokio::test]
async fn test_events_for_venue() {
    let sink = InMemoryEventSink::new(10);
    sink.append(build_event(1, 1, PipelineAction::JobStarted, None)).await.unwrap();
    sink.append(build_event(2, 1, PipelineAction::JobStarted, None)).await.unwrap();
    sink.append(build_event(1, 1, PipelineAction::Completed, None)).await.unwrap();

    let actions: Vec<_> = sink.events_for(1).into_iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![PipelineAction::JobStarted, PipelineAction::Completed]);
}

#[test]
fn test_build_event() {
    let a = build_event(7, 9, PipelineAction::EarlyExit, None);
    let b = build_event(7, 9, PipelineAction::EarlyExit, None);
    assert_ne!(a.event_id, b.event_id);
    assert!(a.created_at_ms > 0);
    assert!(a.payload.is_none());

    let json = serde_json::to_value(&a).unwrap();
    assert_eq!(json["action"], "early_exit");
}
