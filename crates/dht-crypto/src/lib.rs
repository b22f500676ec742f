//! # dht-crypto
//!
//! Cryptographic primitives consumed by `dht-core`'s admission layer (C9).
//!
//! `dht-core` never links against `ed25519-dalek` or `blake3` directly — it
//! depends only on the `Signer`/`Verifier`/`Hasher` traits it declares
//! itself (see `dht_core::collab`). This crate is one concrete
//! implementation of those traits, built on:
//!
//! - [`blake3`] — content hashing and record-key derivation
//! - [`ed25519`] — Ed25519 signing and verification (RFC 8032)

pub mod blake3;
pub mod collab;
pub mod ed25519;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Ed25519 signature verification failed.
    #[error("signature verification failed")]
    SignatureVerification,

    /// Invalid key length or malformed key bytes.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
