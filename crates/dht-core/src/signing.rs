//! Admission / signing (C9): builds the canonical signed form of a record
//! and checks signature, key derivation, and timestamp/expiry bounds.

use crate::collab::{Hasher, Signer, UnsignedRecord, Verifier};
use crate::id::Id;
use crate::message::Record;
use crate::DhtError;

/// Small allowance for clock skew between the signer and the verifier when
/// checking `timestamp <= now + skew` (§4.8).
pub const TIMESTAMP_SKEW_SECS: u64 = 15;

/// Canonical bytes signed and verified (§4 implementation note):
/// `value || timestamp_be(8) || expires_be(8) || name_len_be(4) || name ||
/// meta`, matching the teacher's `build_signed_data` idiom of
/// length-prefixing only the variable field that isn't last.
pub fn canonical_form(value: &[u8], timestamp: u64, expires: u64, name: &str, meta: &[u8]) -> Vec<u8> {
    let name_bytes = name.as_bytes();
    let mut buf = Vec::with_capacity(value.len() + 16 + 4 + name_bytes.len() + meta.len());
    buf.extend_from_slice(value);
    buf.extend_from_slice(&timestamp.to_be_bytes());
    buf.extend_from_slice(&expires.to_be_bytes());
    buf.extend_from_slice(&(name_bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(name_bytes);
    buf.extend_from_slice(meta);
    buf
}

/// `key = H(public_key ‖ name)` (§6).
pub fn derive_key(hasher: &dyn Hasher, public_key: &[u8], name: &str) -> Id {
    let mut buf = Vec::with_capacity(public_key.len() + name.len());
    buf.extend_from_slice(public_key);
    buf.extend_from_slice(name.as_bytes());
    hasher.hash(&buf)
}

/// Sign an unsigned record and assemble the full wire `Record`, deriving
/// its key with the same hasher the verifier side will use.
pub fn sign_record(
    signer: &dyn Signer,
    hasher: &dyn Hasher,
    value: Vec<u8>,
    timestamp: u64,
    expires: u64,
    name: String,
    meta: Vec<u8>,
) -> Record {
    let unsigned = UnsignedRecord {
        value: value.clone(),
        timestamp,
        expires,
        name: name.clone(),
        meta: meta.clone(),
    };
    let signature = signer.sign(&unsigned);
    let public_key = signer.public_key();
    let key = derive_key(hasher, &public_key, &name);
    Record {
        key,
        value,
        timestamp,
        expires,
        public_key,
        name,
        meta,
        signature,
    }
}

/// Full verification of an inbound record (§4.8): signature, key
/// derivation, and the two time bounds.
pub fn verify_record(verifier: &dyn Verifier, hasher: &dyn Hasher, record: &Record, now: u64) -> Result<(), DhtError> {
    verifier.verify(record)?;

    let expected_key = derive_key(hasher, &record.public_key, &record.name);
    if expected_key != record.key {
        return Err(DhtError::InvalidSignature);
    }
    if record.timestamp > now + TIMESTAMP_SKEW_SECS {
        return Err(DhtError::InvalidSignature);
    }
    if record.expires <= now {
        return Err(DhtError::InvalidSignature);
    }
    Ok(())
}
