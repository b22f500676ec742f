//! # dht-core
//!
//! The routing table, pending-RPC state machine, iterative lookup engine
//! and record-admission rules of a Kademlia-style DHT node. Transport,
//! wire encoding and cryptography are external collaborators, consumed
//! here only as traits (see [`collab`]).
//!
//! Constants: `K` = 20 (bucket size / lookup result width), `ALPHA` = 3
//! (lookup parallelism).

pub mod collab;
pub mod contact;
pub mod dispatcher;
pub mod id;
pub mod kbucket;
pub mod lookup;
pub mod message;
pub mod pending;
pub mod replicate;
pub mod routing_table;
pub mod signing;
pub mod store;
pub mod testing;

pub use kbucket::K;

/// Lookup parallelism (§4.7).
pub const ALPHA: usize = 3;

/// Re-publish interval for still-valid records (§9 Design Notes, §10.6).
pub const REPLICATE_INTERVAL_SECS: u64 = 3600;

/// Threshold past which a bucket is considered stale and due for a
/// refresh lookup (§4.3 `refresh_buckets`).
pub const BUCKET_REFRESH_THRESHOLD_SECS: u64 = 3600;

#[derive(Debug, thiserror::Error)]
pub enum DhtError {
    #[error("bucket is full")]
    BucketFull,

    #[error("not found")]
    NotFound,

    #[error("stale write: current timestamp is {current_timestamp}")]
    Stale { current_timestamp: u64 },

    #[error("invalid signature")]
    InvalidSignature,

    #[error("request timed out")]
    Timeout,

    #[error("request was cancelled")]
    Cancelled,

    #[error("no peers known")]
    NoPeersKnown,

    #[error("lookup timed out")]
    LookupTimeout,

    #[error("value not found")]
    ValueNotFound,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error {code} ({title})")]
    Protocol {
        code: u32,
        title: String,
        details: message::ErrorDetails,
    },
}

pub type Result<T> = std::result::Result<T, DhtError>;

impl From<DhtError> for message::ErrorDetails {
    fn from(err: DhtError) -> Self {
        match err {
            DhtError::Stale { current_timestamp } => message::ErrorDetails {
                new_timestamp: Some(current_timestamp),
            },
            _ => message::ErrorDetails::default(),
        }
    }
}
