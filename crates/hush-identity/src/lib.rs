//! Session identity primitives for Hush.
//!
//! This crate knows nothing about stores or session lifecycles. It only
//! answers three questions:
//!
//! - **What is a session id?** ([`SessionId`], [`generate_id`]) — a
//!   256-bit secret drawn from the operating system's random source.
//! - **How do we talk about a session without leaking it?**
//!   ([`identifier`], [`short_identifier`]) — one-way digests that are
//!   safe for logs, URLs, and support tickets.
//! - **How is form scratchpad data encoded?** ([`FormFields`]) — a
//!   key-normalized string map with a JSON representation.
//!
//! # Architecture
//!
//! ```text
//! Store (bytes by key) ← Identity (ids, digests, scratchpad codec) ← Session (lifecycle)
//! ```

mod error;
mod form;
mod id;

pub use error::IdentityError;
pub use form::{FormFields, normalize_key};
pub use id::{
    SESSION_ID_BYTES, SHORT_IDENTIFIER_LEN, SessionId, generate_id, identifier,
    short_identifier,
};
