//! The session service: every operation that moves a session in or out
//! of the store.
//!
//! The service holds no per-session state and no locks. Each call is a
//! handful of store round trips; concurrency control is the store's job.
//!
//! # Lifecycle
//!
//! ```text
//! create() ──→ [live in store] ──→ replace() ──→ [live under new id]
//!                 │    ↑                               │
//!          load() │    │ set_authenticated()           │
//!       reload()  ▼    │ update_fields() / touch()     ▼
//!             SessionRecord                      TTL / destroy()
//! ```

use std::sync::Arc;
use std::time::Duration;

use hush_identity::{FormFields, SessionId};
use hush_store::{Fields, KeyedStore, StoreError};

use crate::session::{decode_form_fields, encode_form_fields, now, parse_flag};
use crate::{SessionConfig, SessionError, SessionField, SessionRecord};

/// Ceiling for the background reaper's backoff.
const MAX_REAP_BACKOFF: Duration = Duration::from_secs(5);

/// Creates, loads, rotates, and writes sessions in a [`KeyedStore`].
///
/// Cloning is cheap; clones share the store.
pub struct SessionService<S: KeyedStore> {
    store: Arc<S>,
    config: SessionConfig,
}

impl<S: KeyedStore> Clone for SessionService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S: KeyedStore> SessionService<S> {
    /// Creates a service over `store` (owned or already shared).
    pub fn new(store: impl Into<Arc<S>>, config: SessionConfig) -> Self {
        Self {
            store: store.into(),
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Generates a session id without creating anything.
    ///
    /// # Errors
    /// [`SessionError::Identity`] if the secure random source fails.
    pub fn generate_id() -> Result<SessionId, SessionError> {
        Ok(hush_identity::generate_id()?)
    }

    fn key(&self, sessid: &SessionId) -> String {
        format!("{}:{}", self.config.key_prefix, sessid.expose())
    }

    /// Creates and persists a brand-new, unauthenticated session.
    ///
    /// # Errors
    /// - [`SessionError::Identity`] — no secure randomness; nothing stored
    /// - [`SessionError::Store`] — the write failed
    pub async fn create(
        &self,
        ipaddress: &str,
        custid: &str,
        useragent: &str,
    ) -> Result<SessionRecord, SessionError> {
        let stamp = now();
        let record = SessionRecord {
            sessid: Self::generate_id()?,
            custid: custid.to_string(),
            ipaddress: ipaddress.to_string(),
            useragent: useragent.to_string(),
            created_at: stamp,
            updated_at: stamp,
            ..SessionRecord::default()
        };

        self.store
            .put_fields(&self.key(&record.sessid), &record.to_fields()?, self.config.ttl)
            .await?;

        tracing::info!(session = %record.sessid, anonymous = record.anonymous(), "session created");
        Ok(record)
    }

    /// Loads a session by id.
    ///
    /// `disable_auth` on the result is always `false`.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`] — absent or expired
    /// - [`SessionError::Store`] — the store failed (NOT a miss)
    pub async fn load(&self, sessid: &SessionId) -> Result<SessionRecord, SessionError> {
        if sessid.is_placeholder() {
            return Err(SessionError::NotFound(sessid.to_string()));
        }
        let fields = self
            .store
            .fetch_fields(&self.key(sessid))
            .await?
            .ok_or_else(|| SessionError::NotFound(sessid.short_identifier()))?;

        tracing::debug!(session = %sessid, "session loaded");
        Ok(SessionRecord::from_fields(sessid.clone(), &fields)?)
    }

    /// Re-reads the persisted fields of `record` from the store.
    ///
    /// `disable_auth` is left exactly as it was: it is this instance's
    /// decision and the store has no opinion on it. So an instance with
    /// `disable_auth = true` stays effectively unauthenticated even if the
    /// store now says `authenticated = true`.
    pub async fn reload(&self, record: &mut SessionRecord) -> Result<(), SessionError> {
        let fresh = self.load(&record.sessid).await?;
        let disable_auth = record.disable_auth;
        *record = fresh;
        record.disable_auth = disable_auth;
        Ok(())
    }

    /// Presence check. Does not extend the TTL.
    pub async fn exists(&self, sessid: &SessionId) -> Result<bool, SessionError> {
        if sessid.is_placeholder() {
            return Ok(false);
        }
        Ok(self.store.exists(&self.key(sessid)).await?)
    }

    /// Rotates the session id (session-fixation defense).
    ///
    /// Copies the persisted fields as currently stored under a fresh id,
    /// deletes the old key, and moves `record` to the new id. The
    /// `authenticated` flag is carried over: rotation changes the name of
    /// the session, not its security state. `disable_auth` is untouched.
    ///
    /// The two store steps are not atomic. For a moment both keys exist.
    /// If the old key cannot be deleted after
    /// [`replace_delete_attempts`](SessionConfig::replace_delete_attempts),
    /// the rotation still completes and a background task keeps deleting
    /// until it succeeds or the old key is gone on its own. A `touch` on
    /// the old id re-arms its TTL, and the reaper keeps at it while the
    /// key is still there.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`] — the session no longer exists
    /// - [`SessionError::Store`] — the new key could not be written; the
    ///   record keeps its old id
    pub async fn replace(&self, record: &mut SessionRecord) -> Result<(), SessionError> {
        let current = self.load(&record.sessid).await?;

        let new_id = Self::generate_id()?;
        let old_key = self.key(&record.sessid);
        let new_key = self.key(&new_id);

        let rotated = SessionRecord {
            sessid: new_id,
            updated_at: now(),
            ..current
        };
        self.store
            .put_fields(&new_key, &rotated.to_fields()?, self.config.ttl)
            .await?;

        if let Err(e) = self.delete_with_retry(&old_key).await {
            tracing::error!(
                session = %record.sessid,
                error = %e,
                "old session key survived replace; handing it to the reaper"
            );
            self.spawn_reaper(old_key, record.sessid.short_identifier());
        }

        tracing::info!(
            old = %record.sessid,
            new = %rotated.sessid,
            "session id replaced"
        );

        let disable_auth = record.disable_auth;
        *record = rotated;
        record.disable_auth = disable_auth;
        Ok(())
    }

    async fn delete_with_retry(&self, key: &str) -> Result<(), StoreError> {
        let attempts = self.config.replace_delete_attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.store.delete(key).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    tracing::warn!(attempt, attempts, error = %e, "old session key delete failed");
                    last_err = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.config.replace_retry_backoff).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| StoreError::Unavailable("no delete attempted".into())))
    }

    /// Keeps deleting `key` in the background. Once a full TTL has passed
    /// it checks whether the key is still there: if the store has expired
    /// it, the reaper stops; if something re-armed it, a new TTL round
    /// starts.
    fn spawn_reaper(&self, key: String, short: String) {
        let store = Arc::clone(&self.store);
        let horizon = self.config.ttl;
        let mut backoff = self.config.replace_retry_backoff.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut started = tokio::time::Instant::now();
            loop {
                tokio::time::sleep(backoff).await;
                match store.delete(&key).await {
                    Ok(_) => {
                        tracing::info!(session = %short, "stale session key reaped");
                        return;
                    }
                    Err(e) if started.elapsed() >= horizon => match store.exists(&key).await {
                        Ok(true) => {
                            tracing::warn!(session = %short, error = %e, "stale session key still alive past its TTL; reaper continuing");
                            started = tokio::time::Instant::now();
                        }
                        Ok(false) => {
                            tracing::info!(session = %short, "stale session key expired before the reaper got to it");
                            return;
                        }
                        Err(check) => {
                            tracing::warn!(session = %short, error = %e, check_error = %check, "reaper giving up; store unreachable");
                            return;
                        }
                    },
                    Err(e) => {
                        tracing::debug!(session = %short, error = %e, "reaper retrying");
                        backoff = (backoff * 2).min(MAX_REAP_BACKOFF);
                    }
                }
            }
        });
    }

    /// Writes `fields` to an existing session, bumping `updated_at`.
    /// The store acknowledges before this returns, so any concurrent
    /// `load` sees the write.
    async fn write_through(
        &self,
        sessid: &SessionId,
        mut fields: Fields,
    ) -> Result<(), SessionError> {
        if sessid.is_placeholder() {
            return Err(SessionError::NotFound(sessid.to_string()));
        }
        fields.insert(
            SessionField::UpdatedAt.to_string(),
            now().timestamp().to_string(),
        );
        if self.store.patch_fields(&self.key(sessid), &fields).await? {
            Ok(())
        } else {
            Err(SessionError::NotFound(sessid.short_identifier()))
        }
    }

    /// Sets the durable `authenticated` flag, written through immediately.
    pub async fn set_authenticated(
        &self,
        record: &mut SessionRecord,
        authenticated: bool,
    ) -> Result<(), SessionError> {
        let mut fields = Fields::new();
        fields.insert(
            SessionField::Authenticated.to_string(),
            authenticated.to_string(),
        );
        self.write_through(&record.sessid, fields).await?;

        record.authenticated = authenticated;
        record.updated_at = now();
        tracing::debug!(session = %record.sessid, authenticated, "authenticated flag written");
        Ok(())
    }

    /// Applies a field → value patch to the persisted fields in one write.
    ///
    /// Keys are matched after [`normalize_key`](hush_identity::normalize_key),
    /// so `":custid"` and `"custid"` are the same field. The whole patch is
    /// validated before anything is written.
    ///
    /// # Errors
    /// [`SessionError::InvalidField`] for an unknown or non-patchable field
    /// (including `disable_auth`) or an unparseable `authenticated` value.
    pub async fn update_fields<I, K, V>(
        &self,
        record: &mut SessionRecord,
        patch: I,
    ) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut staged = record.clone();
        let mut fields = Fields::new();

        for (key, value) in patch {
            let name = hush_identity::normalize_key(key.as_ref());
            let field = SessionField::parse(&name)
                .filter(|f| f.is_patchable())
                .ok_or_else(|| SessionError::InvalidField(key.as_ref().to_string()))?;
            let value: String = value.into();

            match field {
                SessionField::Custid => staged.custid = value.clone(),
                SessionField::Ipaddress => staged.ipaddress = value.clone(),
                SessionField::Useragent => staged.useragent = value.clone(),
                SessionField::Planid => {
                    staged.planid = Some(value.clone()).filter(|p| !p.is_empty());
                }
                SessionField::Authenticated => {
                    staged.authenticated = parse_flag(field, &value)
                        .map_err(|_| SessionError::InvalidField(format!("{field}={value}")))?;
                }
                _ => return Err(SessionError::InvalidField(name)),
            }
            let stored = match field {
                SessionField::Authenticated => staged.authenticated.to_string(),
                _ => value,
            };
            fields.insert(field.to_string(), stored);
        }

        if fields.is_empty() {
            return Ok(());
        }

        let written: Vec<&str> = fields.keys().map(String::as_str).collect();
        tracing::debug!(session = %record.sessid, fields = ?written, "updating session fields");

        self.write_through(&record.sessid, fields).await?;
        staged.updated_at = now();
        *record = staged;
        Ok(())
    }

    /// Stores the form scratchpad for later redisplay.
    pub async fn set_form_fields(
        &self,
        record: &mut SessionRecord,
        form_fields: FormFields,
    ) -> Result<(), SessionError> {
        let mut fields = Fields::new();
        fields.insert(
            SessionField::FormFields.to_string(),
            encode_form_fields(&form_fields)?,
        );
        self.write_through(&record.sessid, fields).await?;
        record.form_fields = form_fields;
        Ok(())
    }

    /// Takes the form scratchpad: returns it and clears it from the store.
    ///
    /// A session with no scratchpad (or an unreadable one) yields an empty
    /// map, not an error.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if the session itself is gone.
    pub async fn get_form_fields(
        &self,
        record: &mut SessionRecord,
    ) -> Result<FormFields, SessionError> {
        if record.is_placeholder() {
            return Err(SessionError::NotFound(record.sessid.to_string()));
        }
        let key = self.key(&record.sessid);
        let taken = self
            .store
            .take_field(&key, SessionField::FormFields.as_str())
            .await?;

        let form_fields = match taken {
            Some(blob) => decode_form_fields(&blob, &record.sessid),
            None if self.store.exists(&key).await? => FormFields::new(),
            None => return Err(SessionError::NotFound(record.short_identifier())),
        };

        record.form_fields = FormFields::new();
        Ok(form_fields)
    }

    /// Marks the session as active: bumps `updated_at` and re-arms the TTL.
    pub async fn touch(&self, record: &mut SessionRecord) -> Result<(), SessionError> {
        self.write_through(&record.sessid, Fields::new()).await?;
        self.store
            .expire(&self.key(&record.sessid), self.config.ttl)
            .await?;
        record.updated_at = now();
        Ok(())
    }

    /// Deletes the session. Returns `true` if it existed.
    pub async fn destroy(&self, record: &SessionRecord) -> Result<bool, SessionError> {
        if record.is_placeholder() {
            return Ok(false);
        }
        let existed = self.store.delete(&self.key(&record.sessid)).await?;
        tracing::info!(session = %record.sessid, existed, "session destroyed");
        Ok(existed)
    }
}

// =========================================================================
// Tests
// =========================================================================
