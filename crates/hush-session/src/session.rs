//! Session types: the record a request handler holds, and the settings
//! that govern how records live in the store.
//!
//! A record has two kinds of state:
//! - **Persisted** fields (`custid`, `authenticated`, ...) that round-trip
//!   through the store and are shared by every instance of the session.
//! - **Local** state (`disable_auth`) that lives only on this instance and
//!   is never written anywhere.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use hush_identity::{FormFields, SessionId};
use hush_store::{Fields, StoreError};

/// `custid` carried by sessions that belong to nobody in particular.
pub const ANONYMOUS_CUSTID: &str = "anon";

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session storage.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Store-enforced lifetime of a session, re-armed by `create`,
    /// `replace` and `touch`.
    ///
    /// Default: 20 minutes.
    pub ttl: Duration,

    /// Store keys look like `{key_prefix}:{sessid}`.
    pub key_prefix: String,

    /// How many times `replace` tries to delete the old key inline before
    /// handing it to a background reaper.
    pub replace_delete_attempts: u32,

    /// Pause between inline delete attempts. The reaper starts from this
    /// and doubles it.
    pub replace_retry_backoff: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(20 * 60),
            key_prefix: "session".to_string(),
            replace_delete_attempts: 3,
            replace_retry_backoff: Duration::from_millis(50),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionField
// ---------------------------------------------------------------------------

/// The persisted fields of a session, by store field name.
///
/// `disable_auth` is not here: it is never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionField {
    Custid,
    Ipaddress,
    Useragent,
    Planid,
    Authenticated,
    FormFields,
    CreatedAt,
    UpdatedAt,
}

impl SessionField {
    pub const ALL: [SessionField; 8] = [
        Self::Custid,
        Self::Ipaddress,
        Self::Useragent,
        Self::Planid,
        Self::Authenticated,
        Self::FormFields,
        Self::CreatedAt,
        Self::UpdatedAt,
    ];

    /// Field name in the store.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Custid => "custid",
            Self::Ipaddress => "ipaddress",
            Self::Useragent => "useragent",
            Self::Planid => "planid",
            Self::Authenticated => "authenticated",
            Self::FormFields => "form_fields",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }

    /// Looks a field up by its store name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }

    /// Whether `update_fields` may write this field. The scratchpad has
    /// its own API and the timestamps are bookkeeping.
    pub fn is_patchable(self) -> bool {
        matches!(
            self,
            Self::Custid
                | Self::Ipaddress
                | Self::Useragent
                | Self::Planid
                | Self::Authenticated
        )
    }
}

impl fmt::Display for SessionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SessionRecord
// ---------------------------------------------------------------------------

/// One in-memory instance of a session.
///
/// Obtained from [`SessionService`](crate::SessionService) (`create`,
/// `load`) or built unpersisted with [`SessionRecord::new`]. Persisted
/// fields change through the service so the store sees every write;
/// only `disable_auth` is set directly on the record.
///
/// # The two authentication gates
///
/// `authenticated` is the durable "has logged in" flag shared by every
/// instance. `disable_auth` is a per-instance override. The effective
/// answer, [`authenticated()`](Self::authenticated), needs both:
///
/// ```text
/// authenticated() = authenticated_flag AND NOT disable_auth
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub(crate) sessid: SessionId,
    pub(crate) custid: String,
    pub(crate) ipaddress: String,
    pub(crate) useragent: String,
    pub(crate) planid: Option<String>,
    pub(crate) authenticated: bool,
    pub(crate) disable_auth: bool,
    pub(crate) form_fields: FormFields,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self {
            sessid: SessionId::placeholder(),
            custid: ANONYMOUS_CUSTID.to_string(),
            ipaddress: String::new(),
            useragent: String::new(),
            planid: None,
            authenticated: false,
            disable_auth: false,
            form_fields: FormFields::new(),
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
        }
    }
}

impl SessionRecord {
    /// An unpersisted record with the placeholder id and default fields.
    ///
    /// No id is generated and the store is not touched, so throwaway
    /// records cost nothing. Any two of these have equal ids.
    pub fn new() -> Self {
        Self::default()
    }

    /// Like [`new`](Self::new), but carrying the client's address and
    /// customer id.
    pub fn with_client(ipaddress: impl Into<String>, custid: impl Into<String>) -> Self {
        Self {
            ipaddress: ipaddress.into(),
            custid: custid.into(),
            ..Self::default()
        }
    }

    pub fn sessid(&self) -> &SessionId {
        &self.sessid
    }

    /// One-way display identifier (64 hex chars). Safe to log.
    pub fn identifier(&self) -> String {
        self.sessid.identifier()
    }

    /// 12-char prefix of [`identifier`](Self::identifier). Safe to log.
    pub fn short_identifier(&self) -> String {
        self.sessid.short_identifier()
    }

    /// `true` until the record has been created in the store.
    pub fn is_placeholder(&self) -> bool {
        self.sessid.is_placeholder()
    }

    pub fn custid(&self) -> &str {
        &self.custid
    }

    pub fn ipaddress(&self) -> &str {
        &self.ipaddress
    }

    pub fn useragent(&self) -> &str {
        &self.useragent
    }

    pub fn planid(&self) -> Option<&str> {
        self.planid.as_deref()
    }

    /// `true` when the session belongs to no customer.
    pub fn anonymous(&self) -> bool {
        self.custid.is_empty() || self.custid == ANONYMOUS_CUSTID
    }

    /// Effective authentication: the durable flag, unless this instance
    /// has auth disabled.
    pub fn authenticated(&self) -> bool {
        self.authenticated && !self.disable_auth
    }

    /// The durable flag alone, as last read from or written to the store.
    pub fn authenticated_flag(&self) -> bool {
        self.authenticated
    }

    pub fn disable_auth(&self) -> bool {
        self.disable_auth
    }

    /// Sets the instance-local override. Never reaches the store, and
    /// survives `reload`.
    pub fn set_disable_auth(&mut self, disable: bool) {
        self.disable_auth = disable;
    }

    /// The scratchpad as last loaded or written on this instance.
    pub fn form_fields(&self) -> &FormFields {
        &self.form_fields
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Persisted fields in store form.
    pub(crate) fn to_fields(&self) -> Result<Fields, StoreError> {
        let mut fields = Fields::new();
        fields.insert(SessionField::Custid.to_string(), self.custid.clone());
        fields.insert(SessionField::Ipaddress.to_string(), self.ipaddress.clone());
        fields.insert(SessionField::Useragent.to_string(), self.useragent.clone());
        if let Some(planid) = &self.planid {
            fields.insert(SessionField::Planid.to_string(), planid.clone());
        }
        fields.insert(
            SessionField::Authenticated.to_string(),
            self.authenticated.to_string(),
        );
        if !self.form_fields.is_empty() {
            fields.insert(
                SessionField::FormFields.to_string(),
                encode_form_fields(&self.form_fields)?,
            );
        }
        fields.insert(
            SessionField::CreatedAt.to_string(),
            self.created_at.timestamp().to_string(),
        );
        fields.insert(
            SessionField::UpdatedAt.to_string(),
            self.updated_at.timestamp().to_string(),
        );
        Ok(fields)
    }

    /// Builds a record from stored fields. `disable_auth` always starts
    /// out `false`; it has no stored form.
    pub(crate) fn from_fields(sessid: SessionId, fields: &Fields) -> Result<Self, StoreError> {
        let text = |field: SessionField| fields.get(field.as_str()).cloned().unwrap_or_default();

        let form_fields = match fields.get(SessionField::FormFields.as_str()) {
            Some(blob) => decode_form_fields(blob, &sessid),
            None => FormFields::new(),
        };

        Ok(Self {
            custid: text(SessionField::Custid),
            ipaddress: text(SessionField::Ipaddress),
            useragent: text(SessionField::Useragent),
            planid: fields
                .get(SessionField::Planid.as_str())
                .filter(|p| !p.is_empty())
                .cloned(),
            authenticated: match fields.get(SessionField::Authenticated.as_str()) {
                Some(raw) => parse_flag(SessionField::Authenticated, raw)?,
                None => false,
            },
            disable_auth: false,
            form_fields,
            created_at: parse_timestamp(fields, SessionField::CreatedAt)?,
            updated_at: parse_timestamp(fields, SessionField::UpdatedAt)?,
            sessid,
        })
    }
}

/// Current time at the precision the store keeps.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

pub(crate) fn parse_flag(field: SessionField, raw: &str) -> Result<bool, StoreError> {
    match raw {
        "true" | "1" => Ok(true),
        "false" | "0" | "" => Ok(false),
        other => Err(StoreError::Corrupt {
            field: field.to_string(),
            reason: format!("expected a boolean, got {other:?}"),
        }),
    }
}

fn parse_timestamp(fields: &Fields, field: SessionField) -> Result<DateTime<Utc>, StoreError> {
    let Some(raw) = fields.get(field.as_str()) else {
        return Ok(DateTime::<Utc>::default());
    };
    let corrupt = |reason: String| StoreError::Corrupt {
        field: field.to_string(),
        reason,
    };
    let secs: i64 = raw
        .parse()
        .map_err(|_| corrupt(format!("expected unix seconds, got {raw:?}")))?;
    DateTime::from_timestamp(secs, 0).ok_or_else(|| corrupt(format!("out of range: {secs}")))
}

pub(crate) fn encode_form_fields(fields: &FormFields) -> Result<String, StoreError> {
    fields.to_json().map_err(|e| StoreError::Corrupt {
        field: SessionField::FormFields.to_string(),
        reason: e.to_string(),
    })
}

/// The scratchpad is best-effort: an unreadable blob reads as empty.
pub(crate) fn decode_form_fields(blob: &str, sessid: &SessionId) -> FormFields {
    FormFields::from_json(blob).unwrap_or_else(|e| {
        tracing::warn!(session = %sessid, error = %e, "discarding unreadable form fields");
        FormFields::new()
    })
}
