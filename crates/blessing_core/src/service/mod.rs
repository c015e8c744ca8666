//! Blessing use-case services.
//!
//! # Responsibility
//! - Resolve identifiers across sources and persist edits.
//! - Keep presentation layers decoupled from store details.
//!
//! # Invariants
//! - Callers never run the remote document's read-modify-write themselves.
//! - Session state is only ever built from a resolver or writer result.

pub mod blessing_service;
pub mod error;
pub mod password;
pub mod resolver;
pub mod session;
pub mod writer;
