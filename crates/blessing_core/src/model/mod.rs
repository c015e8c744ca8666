//! Blessing domain model.
//!
//! # Responsibility
//! - Define the canonical record shared by every store and the resolver.
//! - Normalize cross-source encodings at the deserialization boundary.
//!
//! # Invariants
//! - Every record is keyed by the identifier read from the physical tag.
//! - A record without usable text means "no blessing", whatever else it holds.

pub mod blessing;
pub mod identifier;
