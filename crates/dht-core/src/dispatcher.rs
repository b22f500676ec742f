//! Message dispatcher (C7): receives an inbound message, refreshes the
//! sender's liveness in the routing table, validates, and routes to a
//! per-type handler (§4.6).

use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::collab::{Hasher, Verifier};
use crate::contact::Contact;
use crate::id::Id;
use crate::message::{error_code, DispatchOutcome, ErrorDetails, NodeTuple, Record, WireMessage};
use crate::pending::PendingTable;
use crate::routing_table::RoutingTable;
use crate::signing;
use crate::store::RecordStore;
use crate::{DhtError, K};

pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs()
}

/// Everything the dispatcher needs to process one inbound message. Holding
/// these as `&mut` references (rather than behind a shared `Node` type)
/// keeps the dispatcher a pure function of its inputs and easy to test in
/// isolation.
pub struct DispatchContext<'a> {
    pub local_id: Id,
    pub local_version: String,
    pub routing_table: &'a mut RoutingTable,
    pub store: &'a mut RecordStore,
    pub pending: &'a mut PendingTable,
    pub verifier: &'a dyn Verifier,
    pub hasher: &'a dyn Hasher,
}

/// Process one inbound message from `peer_addr` (§4.6 steps 1-3).
///
/// Liveness refresh (step 1-2) always happens, independent of message
/// type; probing the bucket head on a full non-local bucket is delegated
/// to `probe`, matching `RoutingTable::add_contact`'s own collaborator
/// seam.
pub async fn dispatch<F, Fut>(
    ctx: &mut DispatchContext<'_>,
    peer_addr: IpAddr,
    peer_port: u16,
    msg: WireMessage,
    probe: F,
) -> DispatchOutcome
where
    F: FnOnce(Contact) -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let contact = Contact::new(msg.sender(), peer_addr, peer_port, msg.version().to_string());
    let _ = ctx.routing_table.add_contact(contact, probe).await;

    match msg {
        WireMessage::Ping { uuid, .. } => DispatchOutcome::Reply(WireMessage::Pong {
            uuid,
            node: ctx.local_id,
            version: ctx.local_version.clone(),
        }),
        WireMessage::Pong { uuid, node, version } => {
            ctx.pending
                .complete(uuid, WireMessage::Pong { uuid, node, version });
            DispatchOutcome::NoReply
        }
        WireMessage::Store { uuid, node, record, .. } => handle_store(ctx, uuid, node, record),
        WireMessage::FindNode { uuid, key, .. } => handle_find_node(ctx, uuid, key),
        WireMessage::FindValue { uuid, key, .. } => handle_find_value(ctx, uuid, key),
        WireMessage::Value { uuid, node, record, .. } => handle_value(ctx, uuid, node, record),
        WireMessage::Nodes { uuid, node, version, nodes } => {
            ctx.pending
                .complete(uuid, WireMessage::Nodes { uuid, node, version, nodes });
            DispatchOutcome::NoReply
        }
        WireMessage::Error { uuid, code, title, details, .. } => {
            ctx.pending.fail(
                uuid,
                DhtError::Protocol {
                    code,
                    title,
                    details,
                },
            );
            DispatchOutcome::NoReply
        }
    }
}

fn handle_store(ctx: &mut DispatchContext<'_>, uuid: Uuid, sender: Id, record: Record) -> DispatchOutcome {
    let now = now_unix();
    if signing::verify_record(ctx.verifier, ctx.hasher, &record, now).is_err() {
        let _ = ctx.routing_table.remove_contact(&sender);
        return DispatchOutcome::ErrorReply {
            code: error_code::INVALID_SIGNATURE,
            title: "invalid signature".into(),
            details: ErrorDetails::default(),
        };
    }

    let key = record.key;
    match ctx.store.set(key, record) {
        Ok(()) => DispatchOutcome::Reply(WireMessage::Pong {
            uuid,
            node: ctx.local_id,
            version: ctx.local_version.clone(),
        }),
        Err(DhtError::Stale { current_timestamp }) => DispatchOutcome::ErrorReply {
            code: error_code::OUT_OF_DATE,
            title: "out of date".into(),
            details: ErrorDetails {
                new_timestamp: Some(current_timestamp),
            },
        },
        Err(_) => DispatchOutcome::ErrorReply {
            code: error_code::INVALID_MESSAGE,
            title: "rejected".into(),
            details: ErrorDetails::default(),
        },
    }
}

fn handle_find_node(ctx: &mut DispatchContext<'_>, uuid: Uuid, key: Id) -> DispatchOutcome {
    let nodes = close_node_tuples(ctx, &key);
    DispatchOutcome::Reply(WireMessage::Nodes {
        uuid,
        node: ctx.local_id,
        version: ctx.local_version.clone(),
        nodes,
    })
}

fn handle_find_value(ctx: &mut DispatchContext<'_>, uuid: Uuid, key: Id) -> DispatchOutcome {
    if let Some(record) = ctx.store.get(&key).cloned() {
        return DispatchOutcome::Reply(WireMessage::Value {
            uuid,
            node: ctx.local_id,
            version: ctx.local_version.clone(),
            record,
        });
    }
    handle_find_node(ctx, uuid, key)
}

fn handle_value(ctx: &mut DispatchContext<'_>, uuid: Uuid, sender: Id, record: Record) -> DispatchOutcome {
    let now = now_unix();
    if signing::verify_record(ctx.verifier, ctx.hasher, &record, now).is_err() {
        let _ = ctx.routing_table.remove_contact(&sender);
        ctx.pending.fail(uuid, DhtError::InvalidSignature);
        return DispatchOutcome::NoReply;
    }
    ctx.pending.complete(
        uuid,
        WireMessage::Value {
            uuid,
            node: sender,
            version: ctx.local_version.clone(),
            record,
        },
    );
    DispatchOutcome::NoReply
}

fn close_node_tuples(ctx: &DispatchContext<'_>, key: &Id) -> Vec<NodeTuple> {
    ctx.routing_table
        .find_close_nodes(key, K, None)
        .into_iter()
        .map(|c| NodeTuple {
            id: c.id,
            address: c.address.to_string(),
            port: c.port,
            version: c.version,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dht_crypto::collab::{Blake3Hasher, Ed25519Signer, Ed25519Verifier};
    use dht_crypto::ed25519::KeyPair;

    fn ctx_parts() -> (Id, RoutingTable, RecordStore, PendingTable) {
        let local = Id::random();
        (local, RoutingTable::new(local), RecordStore::new(), PendingTable::new())
    }

    #[tokio::test]
    async fn ping_produces_pong_with_same_uuid() {
        let (local, mut rt, mut store, mut pending) = ctx_parts();
        let verifier = Ed25519Verifier;
        let hasher = Blake3Hasher;
        let mut ctx = DispatchContext {
            local_id: local,
            local_version: "1.0".into(),
            routing_table: &mut rt,
            store: &mut store,
            pending: &mut pending,
            verifier: &verifier,
            hasher: &hasher,
        };
        let uuid = Uuid::new_v4();
        let peer = Id::random();
        let outcome = dispatch(
            &mut ctx,
            "192.168.1.1".parse().unwrap(),
            54321,
            WireMessage::Ping {
                uuid,
                node: peer,
                version: "1.0".into(),
            },
            |_| async { true },
        )
        .await;
        match outcome {
            DispatchOutcome::Reply(WireMessage::Pong { uuid: ruuid, node, .. }) => {
                assert_eq!(ruuid, uuid);
                assert_eq!(node, local);
            }
            other => panic!("expected Pong reply, got {other:?}"),
        }
        assert!(rt.find_close_nodes(&peer, 1, None).iter().any(|c| c.id == peer));
    }

    #[tokio::test]
    async fn stale_store_is_rejected_with_code_8() {
        let (local, mut rt, mut store, mut pending) = ctx_parts();
        let keypair = KeyPair::generate();
        let signer = Ed25519Signer::new(keypair);
        let hasher = Blake3Hasher;
        let verifier = Ed25519Verifier;

        let newer = dht_core_sign(&signer, &hasher, 1_350_544_046);
        store.set(newer.key, newer.clone()).unwrap();

        let mut ctx = DispatchContext {
            local_id: local,
            local_version: "1.0".into(),
            routing_table: &mut rt,
            store: &mut store,
            pending: &mut pending,
            verifier: &verifier,
            hasher: &hasher,
        };
        let older = dht_core_sign(&signer, &hasher, 1_350_534_047);
        let outcome = handle_store(&mut ctx, Uuid::new_v4(), Id::random(), older);
        match outcome {
            DispatchOutcome::ErrorReply { code, details, .. } => {
                assert_eq!(code, error_code::OUT_OF_DATE);
                assert_eq!(details.new_timestamp, Some(1_350_544_046));
            }
            other => panic!("expected ErrorReply, got {other:?}"),
        }
        assert_eq!(store.get(&newer.key).unwrap().timestamp, 1_350_544_046);
    }

    fn dht_core_sign(signer: &Ed25519Signer, hasher: &Blake3Hasher, timestamp: u64) -> Record {
        signing::sign_record(
            signer,
            hasher,
            b"value".to_vec(),
            timestamp,
            timestamp + 10_000,
            "name".into(),
            vec![],
        )
    }
}
