//! BLAKE3 hashing for content addressing and record-key derivation.
//!
//! [`hash`] is used wherever the core needs a digest of arbitrary bytes
//! (peer ids are derived from public keys, record keys from public key +
//! name); [`derive_key`] is BLAKE3's keyed-derivation mode, used to derive
//! a record's storage key (spec §6: `key = H(public_key ‖ name)`).

/// Compute a 256-bit BLAKE3 hash of the input data.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *::blake3::hash(data).as_bytes()
}

/// Derive a 256-bit key using BLAKE3's built-in key-derivation mode.
///
/// `context` should be a fixed, deployment-wide string identifying the
/// purpose of the derivation (domain separation).
pub fn derive_key(context: &str, key_material: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut hasher = ::blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    out.copy_from_slice(hasher.finalize().as_bytes());
    out
}
