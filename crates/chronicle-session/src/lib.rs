//! Durable session storage for Chronicle.
//!
//! A [`SessionStore`] owns the in-memory collection of [`Session`]s, enforces
//! their invariants, answers queries, and hands the whole collection to a
//! [`SessionPersistence`] adapter after every mutation.
//!
//! # Main types
//!
//! - [`Session`]: A titled, append-only sequence of captured messages.
//! - [`SessionStore`]: Validated mutation and search over sessions.
//! - [`SessionPersistence`]: Whole-collection load/save seam.
//! - [`JsonFilePersistence`]: JSON document with atomic rename writes.

/// Whole-collection persistence adapters.
pub mod persistence;
/// The session entity.
pub mod session;
/// The session store and its query types.
pub mod store;

pub use persistence::{JsonFilePersistence, SessionPersistence};
pub use session::Session;
pub use store::{NewMessage, NewSession, SearchQuery, SessionStore, StoreStats};
