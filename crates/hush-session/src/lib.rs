//! Session identity and lifecycle for Hush.
//!
//! This crate owns everything that happens to a session between the moment
//! a client first shows up and the moment the store forgets it:
//!
//! 1. **Creation**: a fresh id, the client's address and agent, persisted
//!    with a TTL ([`SessionService::create`])
//! 2. **Lookup**: by id, with a clean split between "no such session" and
//!    "the store is unwell" ([`SessionError`])
//! 3. **Writes**: every persisted field change reaches the store before the
//!    call returns ([`SessionService::update_fields`])
//! 4. **Rotation**: a new id for the same session after privilege changes
//!    ([`SessionService::replace`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Limits Layer (above)   ← counts actions per session identifier
//!     ↕
//! Session Layer (this crate)  ← records, ids, the two auth gates
//!     ↕
//! Store Layer (below)    ← KeyedStore: Redis or in-memory
//! ```

mod error;
mod service;
mod session;

pub use error::SessionError;
pub use service::SessionService;
pub use session::{ANONYMOUS_CUSTID, SessionConfig, SessionField, SessionRecord};
