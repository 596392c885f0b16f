//! Walks one session through its life: create, log in, rotate, hit a limit.
//!
//! Runs against an in-memory store. Set `HUSH_REDIS_URL` to use Redis.

use hush::prelude::*;

// ---------------------------------------------------------------------------
// The tour
// ---------------------------------------------------------------------------

async fn tour<S: KeyedStore>(core: SessionCore<S>) -> Result<(), HushError> {
    let mut sess = core
        .sessions
        .create("10.0.0.254", "anon", "Mozilla/5.0 (session-tour)")
        .await?;
    tracing::info!(session = %sess.sessid(), anonymous = sess.anonymous(), "visitor arrived");

    // A form that failed validation keeps its values for the next page.
    let form: FormFields = [(":custid", "tryouts"), ("planid", "basic")]
        .into_iter()
        .collect();
    core.sessions.set_form_fields(&mut sess, form).await?;
    let redisplay = core.sessions.get_form_fields(&mut sess).await?;
    tracing::info!(fields = redisplay.len(), "form fields redisplayed");

    // Login: record who they are, then rotate the id.
    core.sessions
        .update_fields(&mut sess, [("custid", "tryouts"), ("planid", "basic")])
        .await?;
    core.sessions.set_authenticated(&mut sess, true).await?;
    let old = sess.sessid().clone();
    core.sessions.replace(&mut sess).await?;
    tracing::info!(
        old = %old,
        new = %sess.sessid(),
        old_exists = core.sessions.exists(&old).await?,
        authenticated = sess.authenticated(),
        "logged in"
    );

    // A per-request override beats the stored flag on this instance only.
    sess.set_disable_auth(true);
    let other = core.sessions.load(sess.sessid()).await?;
    tracing::info!(
        here = sess.authenticated(),
        elsewhere = other.authenticated(),
        "auth disabled locally"
    );

    // Spend the plan's allowance until the limiter says no.
    let action = "create_secret";
    loop {
        match core.limits.limit_action(&sess, action).await {
            Ok(_) => continue,
            Err(LimitError::Throttled { count, limit, .. }) => {
                tracing::info!(action, count, limit, "throttled");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }
    core.limits.event_clear(&sess, action).await?;
    tracing::info!(action, count = core.limits.event_get(&sess, action).await?, "counter cleared");

    core.sessions.destroy(&sess).await?;
    tracing::info!("session destroyed");
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), HushError> {
    hush::telemetry::init();

    match std::env::var("HUSH_REDIS_URL") {
        Ok(url) => {
            let config = RedisConfig {
                url,
                ..RedisConfig::default()
            };
            let core = SessionCoreBuilder::new().connect_redis(&config).await?;
            tour(core).await
        }
        Err(_) => {
            let core: SessionCore<MemoryStore> =
                SessionCoreBuilder::new().build(MemoryStore::new());
            tour(core).await
        }
    }
}
