// crates/vigil-server/tests/poller_dedup.rs
// ============================================================================
// Module: Poller Dedup Tests
// Description: Dedup window, publish retries, and enrichment.
// Purpose: Pin the at-least-once pipeline at the publishing seam.
// Dependencies: vigil-server, vigil-core
// ============================================================================

//! Event dedup and publish tests against the in-memory sink.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test setup uses unwraps for clarity."
)]

use std::collections::HashMap;
use std::time::Duration;
use std::time::Instant;

use time::OffsetDateTime;
use vigil_core::CameraId;
use vigil_core::InMemoryEventSink;
use vigil_core::NvrEvent;
use vigil_core::NvrId;
use vigil_core::RawNvrEvent;
use vigil_server::metrics::Counter;
use vigil_server::metrics::CountingMetrics;
use vigil_server::poller::ChannelDirectory;
use vigil_server::poller::DedupCache;
use vigil_server::poller::backoff_delay;
use vigil_server::poller::enrich_events;
use vigil_server::poller::publish_events;

fn raw_event(stable_key: &str, channel: Option<&str>) -> RawNvrEvent {
    RawNvrEvent {
        stable_key: stable_key.to_string(),
        event_type: "motion".to_string(),
        channel_ref: channel.map(str::to_string),
        occurred_at: OffsetDateTime::from_unix_timestamp(1_750_000_000).unwrap(),
        payload: serde_json::json!({}),
    }
}

fn enriched(nvr_id: NvrId, keys: &[&str]) -> (Vec<NvrEvent>, Vec<String>) {
    let raw: Vec<RawNvrEvent> = keys.iter().map(|key| raw_event(key, None)).collect();
    let stable_keys: Vec<String> = raw.iter().map(|event| event.stable_key.clone()).collect();
    (enrich_events(nvr_id, raw, &ChannelDirectory::default()), stable_keys)
}

#[tokio::test]
async fn same_event_within_ttl_publishes_once() {
    let dedup = DedupCache::new(128, Duration::from_secs(600));
    let sink = InMemoryEventSink::new();
    let metrics = CountingMetrics::new();
    let nvr = NvrId::generate();
    let now = Instant::now();

    let (events, keys) = enriched(nvr, &["ch1:motion:t1"]);
    let published = publish_events(events, &keys, &dedup, &sink, &metrics, now).await;
    assert_eq!(published, 1);

    // Second poll cycle returns the same vendor event.
    let (events, keys) = enriched(nvr, &["ch1:motion:t1"]);
    let published = publish_events(events, &keys, &dedup, &sink, &metrics, now).await;
    assert_eq!(published, 0);
    assert_eq!(sink.published().len(), 1);
    assert_eq!(metrics.get(Counter::EventsDeduped), 1);
}

#[tokio::test]
async fn same_event_past_ttl_publishes_again() {
    let dedup = DedupCache::new(128, Duration::from_secs(600));
    let sink = InMemoryEventSink::new();
    let metrics = CountingMetrics::new();
    let nvr = NvrId::generate();
    let first_poll = Instant::now();

    let (events, keys) = enriched(nvr, &["ch1:motion:t1"]);
    publish_events(events, &keys, &dedup, &sink, &metrics, first_poll).await;

    let past_ttl = first_poll + Duration::from_secs(601);
    let (events, keys) = enriched(nvr, &["ch1:motion:t1"]);
    let published = publish_events(events, &keys, &dedup, &sink, &metrics, past_ttl).await;
    assert_eq!(published, 1);
    assert_eq!(sink.published().len(), 2);
}

#[tokio::test]
async fn publish_retries_through_transient_sink_failures() {
    let dedup = DedupCache::new(128, Duration::from_secs(600));
    let sink = InMemoryEventSink::new();
    let metrics = CountingMetrics::new();
    sink.fail_next(2);

    let (events, keys) = enriched(NvrId::generate(), &["ch1:motion:t1"]);
    let published =
        publish_events(events, &keys, &dedup, &sink, &metrics, Instant::now()).await;
    assert_eq!(published, 1, "third attempt succeeds");
    assert_eq!(sink.published().len(), 1);
}

#[tokio::test]
async fn exhausted_retries_drop_the_event_this_cycle() {
    let dedup = DedupCache::new(128, Duration::from_secs(600));
    let sink = InMemoryEventSink::new();
    let metrics = CountingMetrics::new();
    sink.fail_next(10);

    let (events, keys) = enriched(NvrId::generate(), &["ch1:motion:t1"]);
    let published =
        publish_events(events, &keys, &dedup, &sink, &metrics, Instant::now()).await;
    assert_eq!(published, 0);
    assert_eq!(metrics.get(Counter::EventsPublished), 0);
}

#[tokio::test]
async fn events_publish_to_type_subjects_with_stable_ids() {
    let dedup = DedupCache::new(128, Duration::from_secs(600));
    let sink = InMemoryEventSink::new();
    let metrics = CountingMetrics::new();
    let nvr = NvrId::generate();

    let (events, keys) = enriched(nvr, &["ch1:motion:t1"]);
    let expected_id = events[0].event_id.clone();
    publish_events(events, &keys, &dedup, &sink, &metrics, Instant::now()).await;

    let published = sink.published();
    assert_eq!(published[0].0, "events.nvr.motion");
    let wire: serde_json::Value = serde_json::from_slice(&published[0].1).unwrap();
    assert_eq!(wire["event_id"], expected_id.as_str());
    assert_eq!(wire["type"], "motion");
    assert_eq!(expected_id, NvrEvent::derive_event_id(nvr, "ch1:motion:t1"));
}

#[test]
fn enrichment_attaches_camera_and_site_names() {
    let nvr = NvrId::generate();
    let camera = CameraId::generate();
    let mut directory = ChannelDirectory::default();
    directory.by_channel = HashMap::from([(
        "101".to_string(),
        (camera, "Lobby East".to_string(), "HQ".to_string()),
    )]);
    let events = enrich_events(nvr, vec![raw_event("101:motion:t1", Some("101"))], &directory);
    assert_eq!(events[0].camera_id, Some(camera));
    assert_eq!(events[0].camera_name.as_deref(), Some("Lobby East"));
    assert_eq!(events[0].site_name.as_deref(), Some("HQ"));

    let unlinked =
        enrich_events(nvr, vec![raw_event("999:motion:t1", Some("999"))], &directory);
    assert_eq!(unlinked[0].camera_id, None);
}

#[test]
fn dedup_cache_stays_bounded() {
    let dedup = DedupCache::new(4, Duration::from_secs(600));
    let now = Instant::now();
    for index in 0..10 {
        assert!(dedup.check_and_insert(&format!("key-{index}"), now));
    }
    // The oldest keys were evicted by capacity, so they read as fresh.
    assert!(dedup.check_and_insert("key-0", now));
    // A recent key is still suppressed.
    assert!(!dedup.check_and_insert("key-9", now));
}

#[test]
fn backoff_grows_and_caps() {
    let short = backoff_delay(0);
    let longer = backoff_delay(4);
    let capped = backoff_delay(20);
    assert!(short < longer);
    assert!(capped <= Duration::from_secs(375), "ceiling plus jitter");
}
