//! End-to-end session flows through the `hush` meta crate.
//!
//! Everything runs against `MemoryStore`; no Redis needed.

use std::collections::HashSet;

use hush::prelude::*;

// =========================================================================
// Helpers
// =========================================================================

const IP: &str = "10.0.0.254";
const UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_2_5)";

fn core() -> SessionCore<MemoryStore> {
    SessionCoreBuilder::new().build(MemoryStore::new())
}

// =========================================================================
// Identity
// =========================================================================

#[tokio::test]
async fn test_create_many_sessions_never_collide() {
    let core = core();
    let mut seen = HashSet::new();

    for _ in 0..64 {
        let sess = core.sessions.create(IP, "tryouts", UA).await.unwrap();
        assert!(sess.sessid().len() > 50);
        assert!(sess.identifier().len() > 50);
        assert_eq!(sess.short_identifier().len(), 12);
        assert!(seen.insert(sess.sessid().clone()));
    }
}

#[test]
fn test_new_records_share_placeholder() {
    let s1 = SessionRecord::new();
    let s2 = SessionRecord::new();

    assert_eq!(s1.sessid(), s2.sessid());
    assert!(!s1.disable_auth());
}

// =========================================================================
// The two authentication gates
// =========================================================================

#[tokio::test]
async fn test_load_sees_persisted_flag_but_not_local_override() {
    let core = core();
    let mut sess = core.sessions.create(IP, "tryouts", UA).await.unwrap();

    core.sessions.set_authenticated(&mut sess, true).await.unwrap();
    sess.set_disable_auth(true);
    let loaded = core.sessions.load(sess.sessid()).await.unwrap();

    assert!(!sess.authenticated());
    assert_eq!(
        (loaded.authenticated_flag(), loaded.disable_auth()),
        (true, false)
    );
    assert!(loaded.authenticated());
}

#[tokio::test]
async fn test_reload_keeps_override_and_refreshes_flag() {
    let core = core();
    let mut sess = core.sessions.create(IP, "tryouts", UA).await.unwrap();
    core.sessions.set_authenticated(&mut sess, true).await.unwrap();
    sess.set_disable_auth(true);

    core.sessions.reload(&mut sess).await.unwrap();

    assert_eq!((sess.authenticated(), sess.disable_auth()), (false, true));
}

// =========================================================================
// Full walkthrough
// =========================================================================

#[tokio::test]
async fn test_login_flow_rotates_id_and_retires_old_one() {
    let core = core();

    let mut sess = core.sessions.create(IP, "anon", UA).await.unwrap();
    assert!(sess.sessid().len() > 50);
    assert_eq!(sess.ipaddress(), IP);

    core.sessions.set_authenticated(&mut sess, true).await.unwrap();
    assert!(sess.authenticated());

    sess.set_disable_auth(true);
    assert!(!sess.authenticated());

    let old = sess.sessid().clone();
    core.sessions.replace(&mut sess).await.unwrap();

    assert_ne!(sess.sessid(), &old);
    assert!(!core.sessions.exists(&old).await.unwrap());
    assert!(core.sessions.exists(sess.sessid()).await.unwrap());
    assert!(core.sessions.load(&old).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_update_fields_then_plan_ceiling_applies() {
    let core = core();
    let mut sess = core.sessions.create(IP, "anon", UA).await.unwrap();

    core.sessions
        .update_fields(&mut sess, [(":custid", "tryouts"), (":planid", "basic")])
        .await
        .unwrap();
    let loaded = core.sessions.load(sess.sessid()).await.unwrap();
    assert_eq!(loaded.custid(), "tryouts");
    assert_eq!(loaded.planid(), Some("basic"));

    for _ in 0..50 {
        core.limits.limit_action(&loaded, "create_secret").await.unwrap();
    }
    let err: HushError = core
        .limits
        .limit_action(&loaded, "create_secret")
        .await
        .unwrap_err()
        .into();

    assert!(err.is_throttled());
    core.limits.event_clear(&loaded, "create_secret").await.unwrap();
    assert_eq!(core.limits.event_get(&loaded, "create_secret").await.unwrap(), 0);
}

#[tokio::test]
async fn test_form_fields_survive_to_next_request_once() {
    let core = core();
    let mut sess = core.sessions.create(IP, "tryouts", UA).await.unwrap();
    let submitted: FormFields = [(":custid", "tryouts"), (":planid", "testing")]
        .into_iter()
        .collect();

    core.sessions.set_form_fields(&mut sess, submitted).await.unwrap();

    let mut next_request = core.sessions.load(sess.sessid()).await.unwrap();
    let fields = core.sessions.get_form_fields(&mut next_request).await.unwrap();
    assert_eq!(fields.get("custid"), fields.get(":custid"));
    assert_eq!(fields.get("planid"), Some("testing"));

    let again = core.sessions.get_form_fields(&mut next_request).await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_errors_convert_into_hush_error() {
    async fn lookup(core: &SessionCore<MemoryStore>, id: &SessionId) -> Result<SessionRecord, HushError> {
        Ok(core.sessions.load(id).await?)
    }
    let core = core();
    let unknown = SessionId::from_token("f".repeat(64));

    let err = lookup(&core, &unknown).await.unwrap_err();

    assert!(err.is_not_found());
    assert!(!err.is_retryable());
    assert!(!err.to_string().contains(unknown.expose()));
}
