// crates/vigil-server/src/poller.rs
// ============================================================================
// Module: NVR Event Poller
// Description: Bounded-concurrency event polling, dedup, and publishing.
// Purpose: Move vendor events onto the bus at-least-once with a stable
//          idempotency key and a crash-safe resume cursor.
// Dependencies: lru, sha2, vigil-core, vigil-devices, vigil-store
// ============================================================================

//! ## Overview
//! Each tick selects enabled NVRs across all tenants under an in-flight
//! cap, with at most one worker per NVR so cursor updates stay monotonic.
//! Polled events are enriched with camera and site names, deduplicated
//! through a TTL'd LRU keyed by the hash of the vendor stable key, and
//! published with capped retries. Success persists the cursor; failure
//! bumps the backoff counter and records a coarse error code. Publishing
//! is at-least-once; consumers dedup by `event_id` beyond our window.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use lru::LruCache;
use rand::Rng;
use sha2::Digest;
use sha2::Sha256;
use time::OffsetDateTime;

use vigil_core::EventSink;
use vigil_core::NvrEvent;
use vigil_core::NvrId;
use vigil_core::RawNvrEvent;
use vigil_core::TenantId;
use vigil_devices::AdapterRegistry;
use vigil_devices::NvrEndpoint;
use vigil_store::PostgresStore;
use vigil_store::nvrs;
use vigil_store::users;

use crate::metrics::ControlMetrics;
use crate::metrics::Counter;
use crate::vault::CredentialVault;
use crate::workers::Shutdown;
use crate::workers::spawn_worker;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Poll tick interval.
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Dedup window TTL.
pub const DEDUP_TTL: Duration = Duration::from_secs(600);

/// Dedup entry cap.
pub const DEDUP_CAPACITY: usize = 8192;

/// Maximum publish attempts per event.
pub const PUBLISH_ATTEMPTS: u32 = 3;

/// Backoff ceiling between failed polls.
pub const BACKOFF_CEILING: Duration = Duration::from_secs(300);

// ============================================================================
// SECTION: Dedup Cache
// ============================================================================

/// TTL'd LRU over hashed stable keys. Confined to one poller instance.
pub struct DedupCache {
    /// Hash to insertion instant.
    entries: Mutex<LruCache<String, Instant>>,
    /// Entry time-to-live.
    ttl: Duration,
}

impl DedupCache {
    /// Builds a cache with the given bounds.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Returns true when the key is fresh, recording it. A key seen within
    /// the TTL returns false.
    pub fn check_and_insert(&self, stable_key: &str, now: Instant) -> bool {
        let hash = hash_key(stable_key);
        let Ok(mut entries) = self.entries.lock() else {
            // A poisoned cache must not suppress events.
            return true;
        };
        if let Some(seen_at) = entries.get(&hash) {
            if now.duration_since(*seen_at) < self.ttl {
                return false;
            }
        }
        entries.put(hash, now);
        true
    }
}

/// Hashes a stable key for dedup storage.
fn hash_key(stable_key: &str) -> String {
    let digest = Sha256::digest(stable_key.as_bytes());
    let mut hex = String::with_capacity(64);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

// ============================================================================
// SECTION: Enrichment
// ============================================================================

/// Camera and site names resolvable from a channel reference.
#[derive(Debug, Clone, Default)]
pub struct ChannelDirectory {
    /// Channel reference to `(camera_id, camera_name, site_name)`.
    pub by_channel: HashMap<String, (vigil_core::CameraId, String, String)>,
}

/// Turns raw adapter events into enriched bus events.
#[must_use]
pub fn enrich_events(
    nvr_id: NvrId,
    raw_events: Vec<RawNvrEvent>,
    directory: &ChannelDirectory,
) -> Vec<NvrEvent> {
    raw_events
        .into_iter()
        .map(|raw| {
            let linked = raw
                .channel_ref
                .as_ref()
                .and_then(|channel_ref| directory.by_channel.get(channel_ref));
            NvrEvent {
                event_id: NvrEvent::derive_event_id(nvr_id, &raw.stable_key),
                nvr_id,
                camera_id: linked.map(|(camera_id, _, _)| *camera_id),
                camera_name: linked.map(|(_, name, _)| name.clone()),
                site_name: linked.map(|(_, _, site)| site.clone()),
                event_type: raw.event_type,
                occurred_at: raw.occurred_at,
                payload: raw.payload,
            }
        })
        .collect()
}

// ============================================================================
// SECTION: Publishing
// ============================================================================

/// Publishes enriched events through dedup and capped retries.
///
/// Returns how many events were published. Events that exhaust their
/// retries are dropped from this cycle; the cursor does not advance past a
/// cycle that published nothing, so they reappear on the next poll.
pub async fn publish_events(
    events: Vec<NvrEvent>,
    stable_keys: &[String],
    dedup: &DedupCache,
    sink: &dyn EventSink,
    metrics: &dyn ControlMetrics,
    now: Instant,
) -> usize {
    let mut published = 0;
    for (event, stable_key) in events.into_iter().zip(stable_keys) {
        if !dedup.check_and_insert(stable_key, now) {
            metrics.incr(Counter::EventsDeduped);
            continue;
        }
        let Ok(payload) = serde_json::to_vec(&event) else {
            continue;
        };
        let subject = event.subject();
        let mut delivered = false;
        for attempt in 0..PUBLISH_ATTEMPTS {
            match sink.publish(&subject, payload.clone()).await {
                Ok(()) => {
                    delivered = true;
                    break;
                }
                Err(err) => {
                    tracing::warn!(
                        subject = %subject,
                        attempt,
                        error = %err,
                        "event publish failed"
                    );
                    tokio::time::sleep(Duration::from_millis(50_u64 << attempt)).await;
                }
            }
        }
        if delivered {
            metrics.incr(Counter::EventsPublished);
            published += 1;
        }
    }
    published
}

/// Exponential backoff with jitter for consecutive poll failures.
#[must_use]
pub fn backoff_delay(consecutive_failures: u32) -> Duration {
    let exponent = consecutive_failures.min(8);
    let base_ms = 1_000_u64.saturating_mul(1_u64 << exponent);
    let capped = base_ms.min(BACKOFF_CEILING.as_millis() as u64);
    let jitter = rand::thread_rng().gen_range(0..=capped / 4);
    Duration::from_millis(capped + jitter)
}

// ============================================================================
// SECTION: Poller Worker
// ============================================================================

/// The tenant-wide event poller.
pub struct EventPoller {
    /// Relational store.
    store: Arc<PostgresStore>,
    /// Vendor adapter registry.
    registry: Arc<AdapterRegistry>,
    /// Credential vault.
    vault: Arc<CredentialVault>,
    /// Bus sink.
    sink: Arc<dyn EventSink>,
    /// Dedup cache.
    dedup: Arc<DedupCache>,
    /// Counter sink.
    metrics: Arc<dyn ControlMetrics>,
    /// In-flight cap.
    max_inflight: usize,
    /// NVRs currently being polled (no overlap across ticks).
    inflight: Arc<Mutex<HashSet<NvrId>>>,
    /// Earliest next-poll instant per NVR, driven by backoff.
    not_before: Arc<Mutex<HashMap<NvrId, Instant>>>,
}

impl EventPoller {
    /// Builds the poller.
    #[must_use]
    pub fn new(
        store: Arc<PostgresStore>,
        registry: Arc<AdapterRegistry>,
        vault: Arc<CredentialVault>,
        sink: Arc<dyn EventSink>,
        metrics: Arc<dyn ControlMetrics>,
        max_inflight: usize,
    ) -> Self {
        Self {
            store,
            registry,
            vault,
            sink,
            dedup: Arc::new(DedupCache::new(DEDUP_CAPACITY, DEDUP_TTL)),
            metrics,
            max_inflight,
            inflight: Arc::new(Mutex::new(HashSet::new())),
            not_before: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Runs one tick: selects due NVRs and polls them under the cap.
    async fn tick(self: Arc<Self>) {
        let store = Arc::clone(&self.store);
        let selection = tokio::task::spawn_blocking(move || {
            let tenants = store.with_global(users::list_tenants)?;
            let mut selected = Vec::new();
            for tenant in tenants {
                let nvrs = store.with_tenant(tenant.id, |tx| nvrs::list_nvrs(tx, true))?;
                for nvr in nvrs {
                    selected.push((tenant.id, nvr));
                }
            }
            Ok::<_, vigil_store::PgStoreError>(selected)
        })
        .await;
        let selected = match selection {
            Ok(Ok(selected)) => selected,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "poller could not list nvrs");
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "poller selection task failed");
                return;
            }
        };

        let mut handles = Vec::new();
        let now = Instant::now();
        for (tenant_id, nvr) in selected {
            if handles.len() >= self.max_inflight {
                break;
            }
            if !self.claim(nvr.id, now) {
                continue;
            }
            let poller = Arc::clone(&self);
            handles.push(tokio::spawn(async move {
                poller.poll_one(tenant_id, nvr).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Claims an NVR for this tick unless in flight or backing off.
    fn claim(&self, nvr_id: NvrId, now: Instant) -> bool {
        if let Ok(not_before) = self.not_before.lock() {
            if let Some(earliest) = not_before.get(&nvr_id) {
                if now < *earliest {
                    return false;
                }
            }
        }
        self.inflight.lock().map(|mut inflight| inflight.insert(nvr_id)).unwrap_or(false)
    }

    /// Releases an NVR claim, optionally scheduling backoff.
    fn release(&self, nvr_id: NvrId, backoff: Option<Duration>) {
        if let Ok(mut inflight) = self.inflight.lock() {
            inflight.remove(&nvr_id);
        }
        if let Ok(mut not_before) = self.not_before.lock() {
            match backoff {
                Some(delay) => {
                    not_before.insert(nvr_id, Instant::now() + delay);
                }
                None => {
                    not_before.remove(&nvr_id);
                }
            }
        }
    }

    /// Polls one NVR end to end.
    async fn poll_one(&self, tenant_id: TenantId, nvr: vigil_core::Nvr) {
        let nvr_id = nvr.id;
        let outcome = self.poll_inner(tenant_id, nvr).await;
        match outcome {
            Ok(()) => self.release(nvr_id, None),
            Err(error_code) => {
                self.metrics.incr(Counter::PollFailures);
                let store = Arc::clone(&self.store);
                let failures = tokio::task::spawn_blocking(move || {
                    store.with_tenant(tenant_id, |tx| {
                        nvrs::record_poll_failure(tx, tenant_id, nvr_id, &error_code)
                    })
                })
                .await
                .ok()
                .and_then(Result::ok)
                .unwrap_or(1);
                self.release(nvr_id, Some(backoff_delay(failures)));
            }
        }
    }

    /// The fallible poll body; returns a coarse error code on failure.
    async fn poll_inner(
        &self,
        tenant_id: TenantId,
        nvr: vigil_core::Nvr,
    ) -> Result<(), String> {
        let adapter = self
            .registry
            .resolve(nvr.vendor)
            .ok_or_else(|| "adapter_missing".to_string())?;
        let credential = self
            .vault
            .fetch_credential(tenant_id, vigil_core::CredentialOwner::Nvr(nvr.id))
            .map_err(|err| err.reason_code.to_string())?;
        let endpoint = NvrEndpoint {
            host: nvr.ip.to_string(),
            port: nvr.port,
            https: false,
        };

        let store = Arc::clone(&self.store);
        let nvr_id = nvr.id;
        let state = tokio::task::spawn_blocking(move || {
            store.with_tenant(tenant_id, |tx| nvrs::get_poll_state(tx, nvr_id))
        })
        .await
        .map_err(|_| "poll_state_task".to_string())?
        .map_err(|_| "poll_state_unavailable".to_string())?;

        // Blocking vendor I/O runs off the async workers.
        let cursor = state.cursor.clone();
        let polled = tokio::task::spawn_blocking(move || {
            adapter.poll_events(&endpoint, &credential, cursor.as_deref())
        })
        .await
        .map_err(|_| "poll_task".to_string())?
        .map_err(|err| err.coarse_code().to_string())?;

        let directory = self.channel_directory(tenant_id, nvr_id).await;
        let stable_keys: Vec<String> =
            polled.events.iter().map(|event| event.stable_key.clone()).collect();
        let events = enrich_events(nvr_id, polled.events, &directory);
        publish_events(
            events,
            &stable_keys,
            &self.dedup,
            self.sink.as_ref(),
            self.metrics.as_ref(),
            Instant::now(),
        )
        .await;

        let store = Arc::clone(&self.store);
        let next_cursor = polled.next_cursor.or(state.cursor);
        tokio::task::spawn_blocking(move || {
            store.with_tenant(tenant_id, |tx| {
                nvrs::record_poll_success(
                    tx,
                    tenant_id,
                    nvr_id,
                    next_cursor.as_deref(),
                    OffsetDateTime::now_utc(),
                )
            })
        })
        .await
        .map_err(|_| "poll_state_task".to_string())?
        .map_err(|_| "poll_state_unavailable".to_string())?;
        Ok(())
    }

    /// Builds the channel-to-camera directory for enrichment.
    async fn channel_directory(&self, tenant_id: TenantId, nvr_id: NvrId) -> ChannelDirectory {
        let store = Arc::clone(&self.store);
        let loaded = tokio::task::spawn_blocking(move || {
            store.with_tenant(tenant_id, |tx| {
                let links = nvrs::links_for_nvr(tx, nvr_id)?;
                let sites: HashMap<_, _> = users::list_sites(tx)?
                    .into_iter()
                    .map(|site| (site.id, site.name))
                    .collect();
                let mut by_channel = HashMap::new();
                for link in links {
                    if let Some(camera) = vigil_store::cameras::get_camera(tx, link.camera_id)? {
                        let site_name =
                            sites.get(&camera.site_id).cloned().unwrap_or_default();
                        by_channel.insert(
                            link.channel_ref.clone(),
                            (camera.id, camera.display_name.clone(), site_name),
                        );
                    }
                }
                Ok(ChannelDirectory {
                    by_channel,
                })
            })
        })
        .await;
        match loaded {
            Ok(Ok(directory)) => directory,
            _ => ChannelDirectory::default(),
        }
    }
}

/// Spawns the poller worker.
pub fn spawn_event_poller(
    poller: Arc<EventPoller>,
    shutdown: Shutdown,
) -> tokio::task::JoinHandle<()> {
    spawn_worker("nvr-event-poller", POLL_INTERVAL, shutdown, move || {
        let poller = Arc::clone(&poller);
        async move {
            poller.tick().await;
        }
    })
}
