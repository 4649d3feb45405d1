// SPDX-License-Identifier: MIT OR Apache-2.0
//! Hash-linked, HMAC-signed audit chain.
//!
//! Every entry's `hash` covers its own content plus the previous entry's
//! hash, and every entry's `signature` is an HMAC over `hash || ":" ||
//! previous_hash` computed with whichever signing key was active when the
//! entry was recorded. Rotating the signing key retires — but never
//! discards — the old key, so entries signed before a rotation still verify.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod chain;
mod entry;
mod keys;
mod storage;

pub use chain::{AuditChain, VerifyReport};
pub use entry::{AuditEntry, AuditLevel, NewAuditEntry};
pub use keys::SigningKey;
pub use storage::{AuditChainStorage, InMemoryAuditStorage};

/// 64 zero characters — the `previous_hash` of the genesis entry.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";
