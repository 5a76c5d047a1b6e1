//! Time-bounded cache for the flow listing.
//!
//! At most one refresh is in flight at a time. Callers that find the entry
//! stale while a refresh is running await that refresh instead of starting
//! their own. The cache only keeps a weak handle on the refresh, so when
//! every caller gives up the upstream call is dropped with them.
//!
//! Invalidation starts a new generation. A refresh from an older generation
//! still answers its own callers but never writes to the cache.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use parking_lot::Mutex;
use tracing::debug;

use flowgate_monitoring::GatewayMetrics;

use crate::clock::Clock;
use crate::error::GatewayResult;
use crate::types::Flow;

type RefreshFuture = BoxFuture<'static, GatewayResult<Arc<Vec<Flow>>>>;

/// Cached listing with its fetch time
#[derive(Debug, Clone)]
struct CacheEntry {
    flows: Arc<Vec<Flow>>,
    fetched_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entry: Option<CacheEntry>,
    in_flight: Option<WeakShared<RefreshFuture>>,
    generation: u64,
}

/// Flow listing cache owned by one gateway
pub struct FlowCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<CacheState>>,
}

impl std::fmt::Debug for FlowCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FlowCache")
            .field("ttl", &self.ttl)
            .field("cached_flows", &state.entry.as_ref().map(|e| e.flows.len()))
            .field("refreshing", &state.in_flight.is_some())
            .finish()
    }
}

impl FlowCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached flows, refreshing through `fetch` when stale.
    ///
    /// `fetch` is only invoked when this caller starts a new refresh. A
    /// failed refresh is not cached; the next caller tries again.
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> GatewayResult<Vec<Flow>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<Vec<Flow>>> + Send + 'static,
    {
        let refresh = {
            let mut state = self.state.lock();

            if let Some(entry) = &state.entry {
                if self.is_fresh(entry) {
                    GatewayMetrics::record_cache_lookup(true);
                    return Ok(entry.flows.as_ref().clone());
                }
            }
            GatewayMetrics::record_cache_lookup(false);

            match state.in_flight.as_ref().and_then(WeakShared::upgrade) {
                Some(running) => {
                    debug!("Joining in-flight flow listing refresh");
                    running
                }
                None => {
                    debug!("Starting flow listing refresh");
                    let refresh = self.start_refresh(fetch(), state.generation);
                    state.in_flight = refresh.downgrade();
                    refresh
                }
            }
        };

        refresh.await.map(|flows| flows.as_ref().clone())
    }

    /// Cached flows if the entry is still fresh
    pub fn peek(&self) -> Option<Vec<Flow>> {
        let state = self.state.lock();
        state
            .entry
            .as_ref()
            .filter(|entry| self.is_fresh(entry))
            .map(|entry| entry.flows.as_ref().clone())
    }

    /// Forget the cached listing.
    ///
    /// A refresh already running still answers its callers, but its result
    /// is discarded and later callers start a new one.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.entry = None;
        state.in_flight = None;
        state.generation = state.generation.wrapping_add(1);
        debug!(generation = state.generation, "Flow listing cache invalidated");
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        self.clock.now().saturating_duration_since(entry.fetched_at) < self.ttl
    }

    fn start_refresh<Fut>(&self, fetch: Fut, generation: u64) -> Shared<RefreshFuture>
    where
        Fut: Future<Output = GatewayResult<Vec<Flow>>> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let clock = Arc::clone(&self.clock);

        let refresh: RefreshFuture = async move {
            let outcome = fetch.await.map(Arc::new);

            let mut state = state.lock();
            if state.generation != generation {
                debug!("Discarding flow listing fetched before invalidation");
                return outcome;
            }
            state.in_flight = None;
            if let Ok(flows) = &outcome {
                state.entry = Some(CacheEntry {
                    flows: Arc::clone(flows),
                    fetched_at: clock.now(),
                });
            }
            outcome
        }
        .boxed();

        refresh.shared()
    }
}
