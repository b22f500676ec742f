//! Replication (§9 Design Notes, §10.6): re-publishing a still-valid
//! record to its key's current k closest live peers, periodically, so
//! that churn does not erase it.
//!
//! The source's `send_replicate` is only partially implemented; this
//! specification's resolution (adopted here) is that the target set is
//! `find_close_nodes(record.key, K)` minus any peer known dead — callers
//! discover "known dead" by the `store` RPC itself failing.

use crate::contact::Contact;
use crate::message::Record;
use crate::routing_table::RoutingTable;
use crate::K;

/// The set of peers a still-valid record should be re-stored to right
/// now. Re-reads the routing table rather than caching a peer list, since
/// replication callbacks may fire long after the record they reference
/// was first admitted (§5 shared-resource policy).
pub fn replicate_targets(routing_table: &RoutingTable, record: &Record) -> Vec<Contact> {
    routing_table.find_close_nodes(&record.key, K, None)
}

/// Whether a record is still worth replicating: its `expires` must not
/// have passed `now`. A scheduled replicate callback for an expired
/// record is a no-op (§4.6 STORE handler: "cancelled if the record's
/// `expires` has passed").
pub fn should_replicate(record: &Record, now: u64) -> bool {
    record.expires > now
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::Contact as C;
    use crate::id::Id;

    fn mk_record(expires: u64) -> Record {
        Record {
            key: Id::random(),
            value: b"v".to_vec(),
            timestamp: 1,
            expires,
            public_key: vec![0; 32],
            name: "n".into(),
            meta: vec![],
            signature: vec![0; 64],
        }
    }

    #[test]
    fn expired_record_is_not_replicated() {
        let record = mk_record(100);
        assert!(!should_replicate(&record, 200));
    }

    #[test]
    fn live_record_is_replicated() {
        let record = mk_record(200);
        assert!(should_replicate(&record, 100));
    }

    #[tokio::test]
    async fn targets_come_from_current_routing_table_state() {
        let local = Id::random();
        let mut rt = RoutingTable::new(local);
        let peer = C::new(Id::random(), "127.0.0.1".parse().unwrap(), 1, "1.0");
        let peer_id = peer.id;
        rt.add_contact(peer, |_| async { true }).await.unwrap();
        let record = mk_record(u64::MAX);
        let targets = replicate_targets(&rt, &record);
        assert!(targets.iter().any(|c| c.id == peer_id));
    }
}
