use super::*;
use crate::fingerprint::{fingerprint, PageSize};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::oneshot;

type Reply = oneshot::Sender<Result<String, ClientError>>;

fn key(page: u32) -> ListFingerprint {
    fingerprint(page, PageSize::Ten, None, None)
}

/// A fetch whose completion the test controls.
fn deferred() -> (
    Reply,
    impl FnOnce() -> BoxFuture<'static, Result<String, ClientError>>,
) {
    let (tx, rx) = oneshot::channel();
    let fetch = move || {
        async move {
            rx.await
                .unwrap_or_else(|_| Err(ClientError::Network("reply dropped".into())))
        }
        .boxed()
    };
    (tx, fetch)
}

fn counting(
    calls: &Arc<AtomicUsize>,
    value: &'static str,
) -> impl FnOnce() -> BoxFuture<'static, Result<String, ClientError>> {
    let calls = Arc::clone(calls);
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        async move { Ok::<_, ClientError>(value.to_string()) }.boxed()
    }
}

async fn load(cache: &QueryCache<ListFingerprint, String>, key: ListFingerprint, value: &'static str) {
    let calls = Arc::new(AtomicUsize::new(0));
    cache.resolve(key.clone(), counting(&calls, value)).await;
    cache.settle(&key).await.expect("in flight").expect("fetch ok");
}

#[tokio::test]
async fn first_resolve_is_loading_until_fetch_lands() {
    let cache = QueryCache::<ListFingerprint, String>::new();
    let (reply, fetch) = deferred();

    let first = cache.resolve(key(1), fetch).await;
    assert!(first.is_loading);
    assert!(first.is_fetching);
    assert!(first.data.is_none());

    reply.send(Ok("page-1".into())).expect("reply");
    cache.settle(&key(1)).await.expect("in flight").expect("ok");

    let calls = Arc::new(AtomicUsize::new(0));
    let second = cache.resolve(key(1), counting(&calls, "unused")).await;
    assert_eq!(second.data.as_deref().map(String::as_str), Some("page-1"));
    assert!(!second.is_loading && !second.is_fetching && !second.is_stale);
    assert_eq!(calls.load(Ordering::SeqCst), 0, "fresh data must not refetch");
}

#[tokio::test]
async fn concurrent_resolves_share_one_request() {
    let cache = QueryCache::<ListFingerprint, String>::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let (reply, fetch) = deferred();

    cache.resolve(key(1), fetch).await;
    let joined = cache.resolve(key(1), counting(&calls, "duplicate")).await;
    assert!(joined.is_fetching);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    reply.send(Ok("shared".into())).expect("reply");
    let settled = cache.settle(&key(1)).await.expect("in flight").expect("ok");
    assert_eq!(settled.as_str(), "shared");
}

#[tokio::test]
async fn keeps_previous_page_visible_while_next_page_loads() {
    let cache = QueryCache::<ListFingerprint, String>::new();
    load(&cache, key(1), "page-1").await;

    let (reply, fetch) = deferred();
    let pending = cache.resolve(key(2), fetch).await;
    assert_eq!(pending.data.as_deref().map(String::as_str), Some("page-1"));
    assert!(pending.is_placeholder);
    assert!(pending.is_fetching);
    assert!(!pending.is_loading);

    reply.send(Ok("page-2".into())).expect("reply");
    cache.settle(&key(2)).await.expect("in flight").expect("ok");
    let landed = cache.snapshot(&key(2)).await;
    assert_eq!(landed.data.as_deref().map(String::as_str), Some("page-2"));
    assert!(!landed.is_placeholder);
}

#[tokio::test]
async fn late_response_for_abandoned_key_is_discarded() {
    let cache = QueryCache::<ListFingerprint, String>::new();
    let (reply_a, fetch_a) = deferred();
    let (reply_b, fetch_b) = deferred();

    cache.resolve(key(1), fetch_a).await;
    cache.resolve(key(2), fetch_b).await;

    reply_b.send(Ok("page-2".into())).expect("reply b");
    cache.settle(&key(2)).await.expect("b in flight").expect("ok");
    reply_a.send(Ok("page-1".into())).expect("reply a");
    let raw_a = cache.settle(&key(1)).await.expect("a in flight");
    assert!(raw_a.is_ok());

    let visible = cache.snapshot(&key(2)).await;
    assert_eq!(visible.data.as_deref().map(String::as_str), Some("page-2"));
    let abandoned = cache.snapshot(&key(1)).await;
    assert!(!abandoned.is_fetching);
    assert_ne!(
        abandoned.data.as_deref().map(String::as_str),
        Some("page-1"),
        "abandoned response must never be written"
    );
}

#[tokio::test]
async fn early_response_for_abandoned_key_does_not_replace_visible_data() {
    let cache = QueryCache::<ListFingerprint, String>::new();
    load(&cache, key(1), "page-1").await;
    let (reply_a, fetch_a) = deferred();
    let (reply_b, fetch_b) = deferred();

    cache.resolve(key(2), fetch_a).await;
    cache.resolve(key(3), fetch_b).await;
    reply_a.send(Ok("page-2".into())).expect("reply a");
    cache.settle(&key(2)).await.expect("in flight").expect("ok");

    let waiting = cache.snapshot(&key(3)).await;
    assert_eq!(waiting.data.as_deref().map(String::as_str), Some("page-1"));
    assert!(waiting.is_placeholder);

    reply_b.send(Ok("page-3".into())).expect("reply b");
    cache.settle(&key(3)).await.expect("in flight").expect("ok");
    let landed = cache.snapshot(&key(3)).await;
    assert_eq!(landed.data.as_deref().map(String::as_str), Some("page-3"));
}

#[tokio::test]
async fn invalidated_entry_serves_stale_data_while_refetching() {
    let cache = QueryCache::<ListFingerprint, String>::new();
    load(&cache, key(1), "before").await;

    assert_eq!(cache.invalidate(Invalidation::Family(QueryFamily::Documentos)).await, 1);

    let calls = Arc::new(AtomicUsize::new(0));
    let stale = cache.resolve(key(1), counting(&calls, "after")).await;
    assert_eq!(stale.data.as_deref().map(String::as_str), Some("before"));
    assert!(stale.is_stale);
    assert!(stale.is_fetching);
    assert!(!stale.is_loading);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    cache.settle(&key(1)).await.expect("in flight").expect("ok");
    let fresh = cache.snapshot(&key(1)).await;
    assert_eq!(fresh.data.as_deref().map(String::as_str), Some("after"));
    assert!(!fresh.is_stale);
}

#[tokio::test]
async fn exact_invalidation_leaves_other_keys_fresh() {
    let cache = QueryCache::<ListFingerprint, String>::new();
    load(&cache, key(1), "page-1").await;
    load(&cache, key(2), "page-2").await;

    assert_eq!(cache.invalidate(Invalidation::Exact(key(2))).await, 1);
    assert!(!cache.snapshot(&key(1)).await.is_stale);
    assert!(cache.snapshot(&key(2)).await.is_stale);
}

#[tokio::test]
async fn response_started_before_invalidation_is_dropped() {
    let cache = QueryCache::<ListFingerprint, String>::new();
    let (reply, fetch) = deferred();
    cache.resolve(key(1), fetch).await;

    cache.invalidate(Invalidation::Exact(key(1))).await;
    reply.send(Ok("pre-mutation".into())).expect("reply");
    tokio::task::yield_now().await;

    let calls = Arc::new(AtomicUsize::new(0));
    cache.resolve(key(1), counting(&calls, "post-mutation")).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1, "detached request must be reissued");
    cache.settle(&key(1)).await.expect("in flight").expect("ok");
    assert_eq!(
        cache.snapshot(&key(1)).await.data.as_deref().map(String::as_str),
        Some("post-mutation")
    );
}

#[tokio::test]
async fn failure_is_scoped_to_its_key_and_retry_is_manual() {
    let cache = QueryCache::<ListFingerprint, String>::new();
    load(&cache, key(1), "page-1").await;

    let (reply, fetch) = deferred();
    cache.resolve(key(2), fetch).await;
    reply
        .send(Err(ClientError::Timeout(std::time::Duration::from_secs(15))))
        .expect("reply");
    assert!(cache.settle(&key(2)).await.expect("in flight").is_err());

    let failed = cache.snapshot(&key(2)).await;
    assert!(failed.is_error);
    assert!(failed.data.is_none());
    assert!(!failed.is_loading);

    let calls = Arc::new(AtomicUsize::new(0));
    cache.resolve(key(2), counting(&calls, "never")).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0, "no automatic retry");

    let untouched = cache.snapshot(&key(1)).await;
    assert_eq!(untouched.data.as_deref().map(String::as_str), Some("page-1"));

    cache.refetch(key(2), counting(&calls, "page-2")).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    cache.settle(&key(2)).await.expect("in flight").expect("ok");
    let recovered = cache.snapshot(&key(2)).await;
    assert!(!recovered.is_error);
    assert_eq!(recovered.data.as_deref().map(String::as_str), Some("page-2"));
}

#[tokio::test]
async fn failed_background_refresh_is_not_retried_on_resolve() {
    let cache = QueryCache::<ListFingerprint, String>::new();
    load(&cache, key(1), "page-1").await;
    cache.invalidate(Invalidation::Family(QueryFamily::Documentos)).await;

    let (reply, fetch) = deferred();
    cache.resolve(key(1), fetch).await;
    reply
        .send(Err(ClientError::Network("connection reset".into())))
        .expect("reply");
    assert!(cache.settle(&key(1)).await.expect("in flight").is_err());

    let calls = Arc::new(AtomicUsize::new(0));
    let failed = cache.resolve(key(1), counting(&calls, "never")).await;
    assert!(failed.is_error);
    assert!(!failed.is_fetching);
    assert_eq!(failed.data.as_deref().map(String::as_str), Some("page-1"));
    assert_eq!(calls.load(Ordering::SeqCst), 0, "no automatic retry");

    cache.invalidate(Invalidation::Exact(key(1))).await;
    cache.resolve(key(1), counting(&calls, "page-1b")).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1, "a new invalidation refetches");
}

#[tokio::test]
async fn unobserved_entries_are_collected_after_gc_time() {
    let cache = QueryCache::<ListFingerprint, String>::with_gc_time(std::time::Duration::ZERO);
    load(&cache, key(1), "page-1").await;
    load(&cache, key(2), "page-2").await;
    load(&cache, key(3), "page-3").await;

    let calls = Arc::new(AtomicUsize::new(0));
    let reloaded = cache.resolve(key(1), counting(&calls, "page-1")).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1, "collected entry is fetched again");
    assert!(reloaded.is_placeholder);
    assert_eq!(reloaded.data.as_deref().map(String::as_str), Some("page-3"));

    let displayed = cache.snapshot(&key(3)).await;
    assert_eq!(displayed.data.as_deref().map(String::as_str), Some("page-3"));
}

#[tokio::test]
async fn recently_used_entries_survive_collection() {
    let cache = QueryCache::<ListFingerprint, String>::new();
    load(&cache, key(1), "page-1").await;
    load(&cache, key(2), "page-2").await;
    load(&cache, key(3), "page-3").await;

    let calls = Arc::new(AtomicUsize::new(0));
    let cached = cache.resolve(key(1), counting(&calls, "unused")).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(cached.data.as_deref().map(String::as_str), Some("page-1"));
}

#[tokio::test]
async fn query_client_routes_family_and_document_invalidation() {
    let client = QueryClient::new();
    let list_key = key(1);
    client
        .documentos()
        .resolve(list_key.clone(), || async { Ok::<_, ClientError>(DocumentPage::empty()) })
        .await;
    client.documentos().settle(&list_key).await.expect("in flight").expect("ok");

    assert_eq!(client.invalidate_family(QueryFamily::Documentos).await, 1);
    assert_eq!(client.invalidate_document(DocumentId(7)).await, 0);
    assert!(client.documentos().snapshot(&list_key).await.is_stale);
}
