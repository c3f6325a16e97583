//! Credential hashing and generation.
//!
//! Codes and session tokens are only ever persisted as digests. Digest
//! comparison goes through [`CredentialHasher::verify`], which compares in
//! constant time.

use std::fmt;

use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Number of bytes of entropy in a session token.
pub const SESSION_TOKEN_BYTES: usize = 32;

/// One-way digest used for stored credentials.
pub trait CredentialHasher: Send + Sync + fmt::Debug {
    /// Hex digest of `secret`.
    fn digest(&self, secret: &str) -> String;

    /// Whether `secret` hashes to `stored_digest`, compared in constant time.
    fn verify(&self, secret: &str, stored_digest: &str) -> bool {
        let candidate = self.digest(secret);
        candidate.as_bytes().ct_eq(stored_digest.as_bytes()).into()
    }
}

/// SHA-256, hex encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl CredentialHasher for Sha256Hasher {
    fn digest(&self, secret: &str) -> String {
        hex::encode(Sha256::digest(secret.as_bytes()))
    }
}

/// A uniformly random code in `000000..=999999`.
pub fn generate_otp_code() -> String {
    let n: u32 = OsRng.gen_range(0..1_000_000);
    format!("{n:06}")
}

/// A fresh opaque bearer token (hex of 32 random bytes).
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// The string actually hashed for a code: binding the phone in means equal
/// codes for different phones never share a digest.
pub fn otp_material(phone: &str, code: &str) -> String {
    format!("{phone}:{code}")
}
