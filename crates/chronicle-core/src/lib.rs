//! Core types and error definitions for Chronicle.
//!
//! This crate provides the foundational types shared by the session store,
//! the autosave scheduler and the command-line front end.
//!
//! # Main types
//!
//! - [`ChronicleError`]: Unified error enum covering every failure the core reports.
//! - [`ChronicleResult`]: Convenience alias for `Result<T, ChronicleError>`.
//! - [`Role`]: Message role (user, assistant, system).
//! - [`Message`]: A single captured unit of content within a session.
//! - [`Metadata`]: Opaque key/value bag carried through unmodified.

/// Error taxonomy.
pub mod error;
/// Message and role types.
pub mod message;

pub use error::{ChronicleError, ChronicleResult};
pub use message::{Message, Metadata, Role};
