//! Collaborator interfaces (§6): the traits `dht-core` consumes but never
//! implements. Transport, scheduling and cryptography are external to the
//! core (§1) — concrete implementations live in `dht-crypto` and
//! `dht-node`, mirroring the teacher's `BootstrapTransport` pattern in
//! `ochra-dht::bootstrap`.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;

use crate::message::{Record, WireMessage};
use crate::{DhtError, Result};

/// Establishes outbound connections. One implementation per deployment
/// (QUIC, TCP, in-memory for tests). `Box<dyn Channel>` needs `dyn`
/// compatibility, which async-fn-in-trait doesn't give us for free, hence
/// `async_trait` here (the teacher's own `BootstrapTransport` avoids this
/// by taking its transport generically instead of as a trait object — we
/// need the object form so `dht-node` can pick a transport at runtime).
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self, addr: SocketAddr) -> Result<Box<dyn Channel>>;
}

/// A single outbound connection to a peer.
#[async_trait]
pub trait Channel: Send {
    async fn send(&mut self, msg: WireMessage) -> Result<()>;
    /// Abort the underlying connection. Used on timeout (§4.5) — an abort,
    /// never a graceful close.
    fn abort(&mut self);
}

/// A handle returned by `Scheduler::schedule_after`; dropping or calling
/// `cancel` prevents the scheduled closure from firing.
pub trait CancelHandle: Send {
    fn cancel(self: Box<Self>);
}

/// Injected timer source (§9: "Global reactor/scheduler becomes an
/// injected scheduler interface"). Production code schedules on the Tokio
/// timer; tests use a virtual clock (`dht-core::testing::VirtualScheduler`).
pub trait Scheduler: Send + Sync + 'static {
    fn schedule_after(
        &self,
        delay: Duration,
        f: Box<dyn FnOnce() + Send>,
    ) -> Box<dyn CancelHandle>;
}

/// Unsigned record fields, passed to `Signer::sign` (§4.8).
pub struct UnsignedRecord {
    pub value: Vec<u8>,
    pub timestamp: u64,
    pub expires: u64,
    pub name: String,
    pub meta: Vec<u8>,
}

pub trait Signer: Send + Sync {
    fn sign(&self, record: &UnsignedRecord) -> Vec<u8>;
    fn public_key(&self) -> Vec<u8>;
}

pub trait Verifier: Send + Sync {
    /// Verify a record's signature against its own `public_key` field.
    /// Does not check timestamp skew or expiry — that's the caller's job
    /// (`signing::verify_record` composes this with the time checks).
    fn verify(&self, record: &Record) -> std::result::Result<(), DhtError>;
}

/// Computes a deterministic 160-bit id from arbitrary bytes — used both
/// for deriving node ids from public keys and record keys from
/// `public_key ‖ name` (§6).
pub trait Hasher: Send + Sync {
    fn hash(&self, bytes: &[u8]) -> crate::id::Id;
}
