// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cryptographic primitives shared by the audit chain, RBAC conditions, and
//! the auth service: hashing, HMAC signing, constant-time comparison, secure
//! random generation, and time-sortable identifiers.
#![deny(unsafe_code)]

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Length in bytes of a SHA-256 digest.
pub const DIGEST_LEN: usize = 32;

/// Compute the SHA-256 digest of `data`.
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the SHA-256 digest of `data`, hex-encoded.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Compute an HMAC-SHA256 tag over `data` using `key`.
///
/// Unlike [`sha256`], HMAC keys may be any length — the underlying
/// implementation pads or hashes keys outside the block size internally.
#[must_use]
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Compute an HMAC-SHA256 tag over `data` using `key`, hex-encoded.
#[must_use]
pub fn hmac_sha256_hex(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Verify an HMAC-SHA256 tag in constant time.
#[must_use]
pub fn verify_hmac_sha256(key: &[u8], data: &[u8], tag: &[u8]) -> bool {
    let mut mac = match <HmacSha256 as Mac>::new_from_slice(key) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(data);
    mac.verify_slice(tag).is_ok()
}

/// Compare two byte slices in time independent of where they first differ.
///
/// Unequal lengths are rejected immediately — that comparison is not
/// secret-dependent, only the byte-by-byte comparison within equal-length
/// inputs needs to run in constant time.
#[must_use]
pub fn secure_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Generate `n` bytes of cryptographically secure randomness, hex-encoded
/// (so the returned string is `2 * n` characters long).
#[must_use]
pub fn random_hex(n: usize) -> String {
    let mut buf = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Generate a time-sortable UUID version 7 string.
#[must_use]
pub fn uuid_v7() -> String {
    uuid::Uuid::now_v7().to_string()
}
