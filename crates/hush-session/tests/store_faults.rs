//! Session behavior when the store misbehaves.
//!
//! `FlakyStore` wraps a `MemoryStore` and fails selected operations on
//! demand, or slips another client's write in right after a read. Time is
//! paused so the replace reaper's backoff resolves instantly.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use hush_identity::FormFields;
use hush_session::{SessionConfig, SessionError, SessionService};
use hush_store::{Fields, KeyedStore, MemoryStore, StoreError};

// =========================================================================
// Helpers
// =========================================================================

#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    failing_deletes: AtomicU32,
    delete_calls: AtomicU32,
    fetch_times_out: AtomicBool,
    put_unavailable: AtomicBool,
    write_after_read: Mutex<Option<Fields>>,
}

impl FlakyStore {
    fn fail_next_deletes(&self, n: u32) {
        self.failing_deletes.store(n, Ordering::SeqCst);
    }

    /// The next read of any session is followed by a patch of `fields`,
    /// as if another instance wrote in between.
    fn interleave_write(&self, fields: Fields) {
        *self.write_after_read.lock().unwrap() = Some(fields);
    }

    async fn after_read(&self, key: &str) {
        let pending = self.write_after_read.lock().unwrap().take();
        if let Some(fields) = pending {
            self.inner.patch_fields(key, &fields).await.unwrap();
        }
    }
}

impl KeyedStore for FlakyStore {
    async fn fetch_fields(&self, key: &str) -> Result<Option<Fields>, StoreError> {
        if self.fetch_times_out.load(Ordering::SeqCst) {
            return Err(StoreError::Timeout(Duration::from_secs(2)));
        }
        let fetched = self.inner.fetch_fields(key).await;
        self.after_read(key).await;
        fetched
    }

    async fn put_fields(&self, key: &str, fields: &Fields, ttl: Duration) -> Result<(), StoreError> {
        if self.put_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        self.inner.put_fields(key, fields, ttl).await
    }

    async fn patch_fields(&self, key: &str, fields: &Fields) -> Result<bool, StoreError> {
        self.inner.patch_fields(key, fields).await
    }

    async fn take_field(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let taken = self.inner.take_field(key, field).await;
        self.after_read(key).await;
        taken
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_deletes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_deletes.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.inner.expire(key, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn incr(&self, key: &str, window: Duration) -> Result<u64, StoreError> {
        self.inner.incr(key, window).await
    }
}

fn flaky_service(config: SessionConfig) -> (Arc<FlakyStore>, SessionService<FlakyStore>) {
    let store = Arc::new(FlakyStore::default());
    let service: SessionService<FlakyStore> = SessionService::new(Arc::clone(&store), config);
    (store, service)
}

const IP: &str = "10.0.0.254";
const UA: &str = "Mozilla/5.0";

// =========================================================================
// Lookup under failure
// =========================================================================

#[tokio::test]
async fn test_load_timeout_is_store_error_not_miss() {
    let (store, svc) = flaky_service(SessionConfig::default());
    let sess = svc.create(IP, "tryouts", UA).await.unwrap();

    store.fetch_times_out.store(true, Ordering::SeqCst);
    let err = svc.load(sess.sessid()).await.unwrap_err();

    assert!(matches!(err, SessionError::Store(StoreError::Timeout(_))));
    assert!(err.is_retryable());
    assert!(!err.is_not_found());
}

#[tokio::test]
async fn test_create_store_down_returns_store_error() {
    let (store, svc) = flaky_service(SessionConfig::default());
    store.put_unavailable.store(true, Ordering::SeqCst);

    let err = svc.create(IP, "tryouts", UA).await.unwrap_err();

    assert!(err.is_retryable());
    assert!(store.inner.is_empty().await);
}

// =========================================================================
// replace() under failure
// =========================================================================

#[tokio::test]
async fn test_replace_new_key_write_fails_keeps_old_id() {
    let (store, svc) = flaky_service(SessionConfig::default());
    let mut sess = svc.create(IP, "tryouts", UA).await.unwrap();
    let old = sess.sessid().clone();

    store.put_unavailable.store(true, Ordering::SeqCst);
    let result = svc.replace(&mut sess).await;

    assert!(matches!(result, Err(SessionError::Store(StoreError::Unavailable(_)))));
    assert_eq!(sess.sessid(), &old);
    assert!(svc.exists(&old).await.unwrap());
    assert_eq!(store.inner.len().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_replace_transient_delete_failure_retried_inline() {
    let (store, svc) = flaky_service(SessionConfig::default());
    let mut sess = svc.create(IP, "tryouts", UA).await.unwrap();
    let old = sess.sessid().clone();
    store.fail_next_deletes(2);

    svc.replace(&mut sess).await.unwrap();

    assert_eq!(store.delete_calls.load(Ordering::SeqCst), 3);
    assert!(!svc.exists(&old).await.unwrap());
    assert!(svc.exists(sess.sessid()).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_replace_persistent_delete_failure_reaped_in_background() {
    let (store, svc) = flaky_service(SessionConfig::default());
    let mut sess = svc.create(IP, "tryouts", UA).await.unwrap();
    let old = sess.sessid().clone();
    store.fail_next_deletes(5);

    svc.replace(&mut sess).await.unwrap();

    // Rotation completed even though the old key is still there.
    assert_ne!(sess.sessid(), &old);
    assert!(svc.exists(&old).await.unwrap());
    assert!(svc.exists(sess.sessid()).await.unwrap());

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(!svc.exists(&old).await.unwrap());
    assert!(svc.exists(sess.sessid()).await.unwrap());
    assert_eq!(store.delete_calls.load(Ordering::SeqCst), 6);
}

#[tokio::test(start_paused = true)]
async fn test_replace_reaper_gives_up_after_ttl() {
    let config = SessionConfig {
        ttl: Duration::from_secs(1),
        ..SessionConfig::default()
    };
    let (store, svc) = flaky_service(config);
    let mut sess = svc.create(IP, "tryouts", UA).await.unwrap();
    let old = sess.sessid().clone();
    store.fail_next_deletes(u32::MAX);

    svc.replace(&mut sess).await.unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;

    // The store expired the old key on its own; the reaper stopped trying.
    assert!(!svc.exists(&old).await.unwrap());
    let calls = store.delete_calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(store.delete_calls.load(Ordering::SeqCst), calls);
}

#[tokio::test(start_paused = true)]
async fn test_replace_reaper_outlasts_touches_on_old_id() {
    let config = SessionConfig {
        ttl: Duration::from_secs(30),
        ..SessionConfig::default()
    };
    let (store, svc) = flaky_service(config);
    let mut sess = svc.create(IP, "tryouts", UA).await.unwrap();
    let mut stale = svc.load(sess.sessid()).await.unwrap();
    let old = sess.sessid().clone();
    store.fail_next_deletes(u32::MAX);

    svc.replace(&mut sess).await.unwrap();

    // A request still holding the old id keeps it alive well past one TTL.
    for _ in 0..6 {
        tokio::time::sleep(Duration::from_secs(10)).await;
        svc.touch(&mut stale).await.unwrap();
    }
    store.fail_next_deletes(0);
    svc.touch(&mut stale).await.unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;

    assert!(!svc.exists(&old).await.unwrap());
    assert!(svc.exists(sess.sessid()).await.unwrap());
}

// =========================================================================
// Form scratchpad under concurrent writes
// =========================================================================

fn scratchpad(value: &str) -> FormFields {
    [("email", value)].into_iter().collect()
}

#[tokio::test]
async fn test_get_form_fields_keeps_scratchpad_written_after_take() {
    let (store, svc) = flaky_service(SessionConfig::default());
    let mut sess = svc.create(IP, "tryouts", UA).await.unwrap();
    svc.set_form_fields(&mut sess, scratchpad("first@example.com"))
        .await
        .unwrap();

    let mut later = Fields::new();
    later.insert(
        "form_fields".to_string(),
        scratchpad("second@example.com").to_json().unwrap(),
    );
    store.interleave_write(later);
    let taken = svc.get_form_fields(&mut sess).await.unwrap();

    assert_eq!(taken.get("email"), Some("first@example.com"));
    let next = svc.get_form_fields(&mut sess).await.unwrap();
    assert_eq!(next.get("email"), Some("second@example.com"));
}

#[tokio::test]
async fn test_get_form_fields_concurrent_takes_hand_out_once() {
    let (_store, svc) = flaky_service(SessionConfig::default());
    let mut sess = svc.create(IP, "tryouts", UA).await.unwrap();
    svc.set_form_fields(&mut sess, scratchpad("first@example.com"))
        .await
        .unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let svc = svc.clone();
            let mut record = sess.clone();
            tokio::spawn(async move { svc.get_form_fields(&mut record).await })
        })
        .collect();
    let mut handed_out = 0;
    for task in tasks {
        if !task.await.unwrap().unwrap().is_empty() {
            handed_out += 1;
        }
    }

    assert_eq!(handed_out, 1);
}
