//! Query cache: keyed remote data with request de-duplication, stale
//! invalidation and previous-data retention while a new key loads.
//!
//! Fetches run as spawned tasks. A completed fetch is written back only when it
//! is still the latest request for its key and that key is still the one being
//! observed; anything else is dropped on arrival. Superseded requests are not
//! cancelled.
//!
//! Entries that are neither observed nor fetching are dropped once they have
//! gone unused for the cache's gc time.

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use futures::future::{BoxFuture, FutureExt, Shared};
use shared::{
    domain::{DocumentId, Documento},
    protocol::DocumentPage,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    error::ClientError,
    fingerprint::{ListFingerprint, QueryFamily, QueryKey},
};

pub type FetchResult<V> = Result<Arc<V>, ClientError>;

pub const DEFAULT_GC_TIME: Duration = Duration::from_secs(5 * 60);

type SharedFetch<V> = Shared<BoxFuture<'static, FetchResult<V>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation<K> {
    Family(QueryFamily),
    Exact(K),
}

#[derive(Debug)]
pub struct QuerySnapshot<V> {
    /// Data to display: the key's own data, or the previously displayed key's
    /// data while this key loads (`is_placeholder`).
    pub data: Option<Arc<V>>,
    /// Nothing to display yet and a request is running.
    pub is_loading: bool,
    /// A request for this key is in flight, including background refreshes.
    pub is_fetching: bool,
    pub is_error: bool,
    pub is_placeholder: bool,
    /// The key's own data was invalidated and has not been refetched yet.
    pub is_stale: bool,
    pub error: Option<ClientError>,
}

impl<V> Clone for QuerySnapshot<V> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            is_loading: self.is_loading,
            is_fetching: self.is_fetching,
            is_error: self.is_error,
            is_placeholder: self.is_placeholder,
            is_stale: self.is_stale,
            error: self.error.clone(),
        }
    }
}

struct InFlight<V> {
    ticket: u64,
    future: SharedFetch<V>,
}

struct Entry<V> {
    data: Option<Arc<V>>,
    error: Option<ClientError>,
    stale: bool,
    inflight: Option<InFlight<V>>,
    last_used: Instant,
}

impl<V> Default for Entry<V> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            stale: false,
            inflight: None,
            last_used: Instant::now(),
        }
    }
}

impl<V> Entry<V> {
    fn needs_fetch(&self) -> bool {
        if self.inflight.is_some() {
            return false;
        }
        // Errors stay put until a manual refetch.
        self.stale || (self.data.is_none() && self.error.is_none())
    }
}

struct CacheState<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// Most recently requested key.
    active: Option<K>,
    /// Last key whose own data was handed out; source of placeholder data.
    displayed: Option<K>,
    next_ticket: u64,
    gc_time: Duration,
}

impl<K: QueryKey, V> CacheState<K, V> {
    fn snapshot(&self, key: &K) -> QuerySnapshot<V> {
        let entry = self.entries.get(key);
        let own = entry.and_then(|entry| entry.data.clone());
        let error = entry.and_then(|entry| entry.error.clone());
        let is_fetching = entry.is_some_and(|entry| entry.inflight.is_some());
        let is_stale = entry.is_some_and(|entry| entry.stale && entry.data.is_some());

        let (data, is_placeholder) = match own {
            Some(data) => (Some(data), false),
            None if error.is_none() => {
                let previous = self
                    .displayed
                    .as_ref()
                    .filter(|displayed| *displayed != key)
                    .and_then(|displayed| self.entries.get(displayed))
                    .and_then(|entry| entry.data.clone());
                let is_placeholder = previous.is_some();
                (previous, is_placeholder)
            }
            None => (None, false),
        };

        QuerySnapshot {
            is_loading: data.is_none() && is_fetching,
            is_fetching,
            is_error: error.is_some(),
            is_placeholder,
            is_stale,
            error,
            data,
        }
    }

    fn complete(&mut self, key: &K, ticket: u64, result: FetchResult<V>) -> FetchResult<V> {
        let abandoned = self.active.as_ref() != Some(key);
        let Some(entry) = self.entries.get_mut(key) else {
            return result;
        };
        if entry.inflight.as_ref().map(|inflight| inflight.ticket) != Some(ticket) {
            debug!(?key, ticket, "dropping response superseded by a newer request");
            return result;
        }
        entry.inflight = None;
        if abandoned {
            debug!(?key, ticket, "dropping response for abandoned query");
            return result;
        }

        match &result {
            Ok(data) => {
                entry.data = Some(Arc::clone(data));
                entry.error = None;
                entry.stale = false;
                entry.last_used = Instant::now();
                self.displayed = Some(key.clone());
            }
            Err(err) => {
                warn!(?key, error = %err, "query fetch failed");
                entry.error = Some(err.clone());
                // The failed attempt answers the invalidation; only `refetch`
                // or a later invalidation issues another request.
                entry.stale = false;
            }
        }
        result
    }

    /// Marks `key` as the observed query and drops entries nobody has used for
    /// `gc_time`.
    fn observe(&mut self, key: &K) {
        self.active = Some(key.clone());
        let now = Instant::now();
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_used = now;
        }

        let gc_time = self.gc_time;
        let displayed = self.displayed.clone();
        let before = self.entries.len();
        self.entries.retain(|candidate, entry| {
            candidate == key
                || displayed.as_ref() == Some(candidate)
                || entry.inflight.is_some()
                || now.duration_since(entry.last_used) < gc_time
        });
        let collected = before - self.entries.len();
        if collected > 0 {
            debug!(collected, "collected unused queries");
        }
    }
}

/// Cache for one key type. Cloning shares the underlying store.
pub struct QueryCache<K, V> {
    state: Arc<Mutex<CacheState<K, V>>>,
}

impl<K, V> Clone for QueryCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<K, V> Default for QueryCache<K, V> {
    fn default() -> Self {
        Self::with_gc_time(DEFAULT_GC_TIME)
    }
}

impl<K, V> QueryCache<K, V> {
    /// Cache whose unobserved entries are dropped after `gc_time` without use.
    pub fn with_gc_time(gc_time: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState {
                entries: HashMap::new(),
                active: None,
                displayed: None,
                next_ticket: 0,
                gc_time,
            })),
        }
    }
}

impl<K, V> fmt::Debug for QueryCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache").finish_non_exhaustive()
    }
}

impl<K, V> QueryCache<K, V>
where
    K: QueryKey,
    V: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns what should be shown for `key`, starting `fetch` when the key has
    /// never been loaded or was invalidated. Concurrent calls share one request.
    pub async fn resolve<F, Fut>(&self, key: K, fetch: F) -> QuerySnapshot<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ClientError>> + Send + 'static,
    {
        let mut state = self.state.lock().await;
        state.observe(&key);
        let needs_fetch = state
            .entries
            .get(&key)
            .map_or(true, |entry| entry.needs_fetch());
        if needs_fetch {
            self.start_fetch(&mut state, key.clone(), fetch());
        }

        let snapshot = state.snapshot(&key);
        if snapshot.data.is_some() && !snapshot.is_placeholder {
            state.displayed = Some(key);
        }
        snapshot
    }

    /// User-triggered refresh. Joins the running request if there is one.
    pub async fn refetch<F, Fut>(&self, key: K, fetch: F) -> QuerySnapshot<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ClientError>> + Send + 'static,
    {
        let mut state = self.state.lock().await;
        state.observe(&key);
        let running = state
            .entries
            .get(&key)
            .is_some_and(|entry| entry.inflight.is_some());
        if !running {
            self.start_fetch(&mut state, key.clone(), fetch());
        }
        state.snapshot(&key)
    }

    /// Reads the current state of `key` without fetching.
    pub async fn snapshot(&self, key: &K) -> QuerySnapshot<V> {
        self.state.lock().await.snapshot(key)
    }

    /// Waits for the request currently in flight for `key`. Returns `None` when
    /// nothing is running. The outcome is the raw fetch result, whether or not
    /// it was written back.
    pub async fn settle(&self, key: &K) -> Option<FetchResult<V>> {
        let future = {
            let state = self.state.lock().await;
            state
                .entries
                .get(key)
                .and_then(|entry| entry.inflight.as_ref())
                .map(|inflight| inflight.future.clone())
        }?;
        Some(future.await)
    }

    /// Marks matching entries stale and detaches their running requests so the
    /// next `resolve` starts over. Returns the number of entries touched.
    pub async fn invalidate(&self, target: Invalidation<K>) -> usize {
        let mut state = self.state.lock().await;
        let mut touched = 0;
        for (key, entry) in state.entries.iter_mut() {
            let matches = match &target {
                Invalidation::Family(family) => key.family() == *family,
                Invalidation::Exact(exact) => key == exact,
            };
            if matches {
                entry.stale = true;
                entry.inflight = None;
                touched += 1;
            }
        }
        debug!(?target, touched, "invalidated queries");
        touched
    }

    fn start_fetch<Fut>(&self, state: &mut CacheState<K, V>, key: K, fetch: Fut)
    where
        Fut: Future<Output = Result<V, ClientError>> + Send + 'static,
    {
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        let store = Arc::clone(&self.state);
        let task_key = key.clone();
        let future = async move {
            let result = fetch.await.map(Arc::new);
            let mut state = store.lock().await;
            state.complete(&task_key, ticket, result)
        }
        .boxed()
        .shared();

        debug!(?key, ticket, "issuing query fetch");
        state.entries.entry(key).or_default().inflight = Some(InFlight {
            ticket,
            future: future.clone(),
        });
        tokio::spawn(future);
    }
}

/// Process-wide store for every registry query.
#[derive(Clone, Default, Debug)]
pub struct QueryClient {
    documentos: QueryCache<ListFingerprint, DocumentPage>,
    documento: QueryCache<DocumentId, Documento>,
}

impl QueryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn documentos(&self) -> &QueryCache<ListFingerprint, DocumentPage> {
        &self.documentos
    }

    pub fn documento(&self) -> &QueryCache<DocumentId, Documento> {
        &self.documento
    }

    pub async fn invalidate_family(&self, family: QueryFamily) -> usize {
        self.documentos
            .invalidate(Invalidation::Family(family))
            .await
            + self.documento.invalidate(Invalidation::Family(family)).await
    }

    pub async fn invalidate_document(&self, id: DocumentId) -> usize {
        self.documento.invalidate(Invalidation::Exact(id)).await
    }
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;
