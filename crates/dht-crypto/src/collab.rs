//! Implements `dht_core::collab`'s `Signer`/`Verifier`/`Hasher` traits on
//! top of this crate's Ed25519 and BLAKE3 primitives — the concrete
//! collaborator `dht-node` wires into a running `Node`.

use dht_core::collab::{Hasher, Signer, UnsignedRecord, Verifier};
use dht_core::id::Id;
use dht_core::message::Record;
use dht_core::DhtError;

use crate::ed25519::{KeyPair, Signature, VerifyingKey};

/// `Signer` backed by a local keypair. Built once per node at startup.
pub struct Ed25519Signer {
    keypair: KeyPair,
}

impl Ed25519Signer {
    pub fn new(keypair: KeyPair) -> Self {
        Ed25519Signer { keypair }
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, record: &UnsignedRecord) -> Vec<u8> {
        let bytes = dht_core::signing::canonical_form(
            &record.value,
            record.timestamp,
            record.expires,
            &record.name,
            &record.meta,
        );
        self.keypair.signing_key.sign(&bytes).to_bytes().to_vec()
    }

    fn public_key(&self) -> Vec<u8> {
        self.keypair.verifying_key.to_bytes().to_vec()
    }
}

/// `Verifier` that checks a record's signature against its own embedded
/// `public_key` field — any peer's records can be verified without a
/// pre-shared key, which is the point of a signed-record DHT.
pub struct Ed25519Verifier;

impl Verifier for Ed25519Verifier {
    fn verify(&self, record: &Record) -> Result<(), DhtError> {
        let key_bytes: [u8; 32] = record
            .public_key
            .as_slice()
            .try_into()
            .map_err(|_| DhtError::InvalidSignature)?;
        let verifying_key =
            VerifyingKey::from_bytes(&key_bytes).map_err(|_| DhtError::InvalidSignature)?;

        let sig_bytes: [u8; 64] = record
            .signature
            .as_slice()
            .try_into()
            .map_err(|_| DhtError::InvalidSignature)?;
        let signature = Signature::from_bytes(&sig_bytes);

        let canonical = dht_core::signing::canonical_form(
            &record.value,
            record.timestamp,
            record.expires,
            &record.name,
            &record.meta,
        );
        verifying_key
            .verify(&canonical, &signature)
            .map_err(|_| DhtError::InvalidSignature)
    }
}

/// BLAKE3-backed `Hasher`, truncated to the 160-bit id space.
pub struct Blake3Hasher;

impl Hasher for Blake3Hasher {
    fn hash(&self, bytes: &[u8]) -> Id {
        let full = crate::blake3::hash(bytes);
        let mut out = [0u8; 20];
        out.copy_from_slice(&full[..20]);
        Id::from_bytes(out)
    }
}

/// Derive a node id from a verifying key the same way [`Blake3Hasher`]
/// derives record keys, so node ids and record keys share one derivation
/// rule.
pub fn derive_node_id(public_key: &VerifyingKey) -> Id {
    Id::from_bytes(crate::ed25519::derive_node_id(public_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signer_and_verifier_round_trip() {
        let keypair = KeyPair::generate();
        let public_key = keypair.verifying_key.to_bytes().to_vec();
        let signer = Ed25519Signer::new(keypair);
        let hasher = Blake3Hasher;

        let record = dht_core::signing::sign_record(
            &signer,
            &hasher,
            b"value".to_vec(),
            100,
            200,
            "name".into(),
            vec![],
        );
        assert_eq!(record.public_key, public_key);

        let verifier = Ed25519Verifier;
        assert!(verifier.verify(&record).is_ok());
    }

    #[test]
    fn tampered_value_fails_verification() {
        let keypair = KeyPair::generate();
        let signer = Ed25519Signer::new(keypair);
        let hasher = Blake3Hasher;
        let mut record = dht_core::signing::sign_record(
            &signer,
            &hasher,
            b"value".to_vec(),
            100,
            200,
            "name".into(),
            vec![],
        );
        record.value = b"tampered".to_vec();
        let verifier = Ed25519Verifier;
        assert!(verifier.verify(&record).is_err());
    }
}
