//! Pending-RPC table (C6): correlates outbound requests to inbound
//! responses by uuid, with bounded timeouts that double as the routing
//! table's liveness signal.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::collab::CancelHandle;
use crate::message::WireMessage;
use crate::DhtError;

/// Outcome delivered to whoever is awaiting a pending RPC.
pub type PendingResult = Result<WireMessage, DhtError>;

struct PendingEntry {
    sender: Option<oneshot::Sender<PendingResult>>,
    timer: Box<dyn CancelHandle>,
}

/// Who sent the original request — needed so the timeout handler can
/// evict the right peer from the routing table (§4.5).
#[derive(Clone, Copy, Debug)]
pub struct SentTo {
    pub id: crate::id::Id,
}

/// `register`/`complete`/`fail`/`cancel` as specified in §4.5. The timeout
/// itself is driven by the caller via the injected `Scheduler`: `register`
/// is handed an already-armed `CancelHandle` so this table never touches
/// wall-clock time directly (§9: tests use a virtual clock).
pub struct PendingTable {
    entries: HashMap<Uuid, PendingEntry>,
}

impl PendingTable {
    pub fn new() -> Self {
        PendingTable {
            entries: HashMap::new(),
        }
    }

    /// Install a oneshot receiver for `uuid`, along with the scheduled
    /// timeout `CancelHandle` (armed by the caller before this call).
    pub fn register(
        &mut self,
        uuid: Uuid,
        sender: oneshot::Sender<PendingResult>,
        timer: Box<dyn CancelHandle>,
    ) {
        self.entries.insert(
            uuid,
            PendingEntry {
                sender: Some(sender),
                timer,
            },
        );
    }

    /// Fulfil the pending handle with a successful response, cancelling
    /// its timer. Responses for unknown uuids (already timed out, or never
    /// registered) are silently discarded (§5 ordering guarantees).
    pub fn complete(&mut self, uuid: Uuid, response: WireMessage) {
        if let Some(mut entry) = self.entries.remove(&uuid) {
            entry.timer.cancel();
            if let Some(sender) = entry.sender.take() {
                let _ = sender.send(Ok(response));
            }
        }
    }

    pub fn fail(&mut self, uuid: Uuid, error: DhtError) {
        if let Some(mut entry) = self.entries.remove(&uuid) {
            entry.timer.cancel();
            if let Some(sender) = entry.sender.take() {
                let _ = sender.send(Err(error));
            }
        }
    }

    pub fn cancel(&mut self, uuid: Uuid) {
        self.fail(uuid, DhtError::Cancelled);
    }

    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.entries.contains_key(uuid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}

pub const RPC_TIMEOUT: Duration = Duration::from_secs(5);
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandle;
    impl CancelHandle for NoopHandle {
        fn cancel(self: Box<Self>) {}
    }

    fn ping(uuid: Uuid) -> WireMessage {
        WireMessage::Pong {
            uuid,
            node: crate::id::Id::random(),
            version: "1".into(),
        }
    }

    #[tokio::test]
    async fn complete_fulfils_the_receiver() {
        let mut table = PendingTable::new();
        let uuid = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        table.register(uuid, tx, Box::new(NoopHandle));
        table.complete(uuid, ping(uuid));
        let result = rx.await.unwrap();
        assert!(result.is_ok());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn fail_delivers_an_error() {
        let mut table = PendingTable::new();
        let uuid = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        table.register(uuid, tx, Box::new(NoopHandle));
        table.fail(uuid, DhtError::Timeout);
        let result = rx.await.unwrap();
        assert!(matches!(result, Err(DhtError::Timeout)));
    }

    #[tokio::test]
    async fn unknown_uuid_is_a_no_op() {
        let mut table = PendingTable::new();
        table.complete(Uuid::new_v4(), ping(Uuid::new_v4()));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn cancel_fails_with_cancelled() {
        let mut table = PendingTable::new();
        let uuid = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        table.register(uuid, tx, Box::new(NoopHandle));
        table.cancel(uuid);
        assert!(matches!(rx.await.unwrap(), Err(DhtError::Cancelled)));
    }
}
