//! The running node: owns the routing table, record store and pending-RPC
//! table behind per-structure `tokio::sync::Mutex`es (SPEC_FULL §5's
//! permitted alternative to single-task ownership — the routing table
//! must not stay locked for a whole multi-second lookup, so each lock is
//! held only across the synchronous slice of work that touches it).

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use dht_core::collab::{Hasher, Scheduler, Signer, Transport, Verifier};
use dht_core::contact::Contact;
use dht_core::dispatcher::{dispatch, now_unix, DispatchContext};
use dht_core::id::Id;
use dht_core::lookup::{run_lookup, LookupOutcome, ProbeOutcome, QueryType};
use dht_core::message::{DispatchOutcome, Record, WireMessage};
use dht_core::pending::PendingTable;
use dht_core::replicate;
use dht_core::routing_table::RoutingTable;
use dht_core::store::RecordStore;
use dht_core::{signing, DhtError, Result, K};
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

use crate::config::{NetworkConfig, StorageConfig};
use crate::transport::read_message;

pub struct Node {
    pub local_id: Id,
    pub version: String,
    routing_table: Mutex<RoutingTable>,
    store: Mutex<RecordStore>,
    pending: Mutex<PendingTable>,
    transport: Box<dyn Transport>,
    scheduler: Box<dyn Scheduler>,
    signer: Box<dyn Signer>,
    verifier: Box<dyn Verifier>,
    hasher: Box<dyn Hasher>,
    network: NetworkConfig,
    storage: StorageConfig,
}

impl Node {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local_id: Id,
        version: String,
        transport: Box<dyn Transport>,
        scheduler: Box<dyn Scheduler>,
        signer: Box<dyn Signer>,
        verifier: Box<dyn Verifier>,
        hasher: Box<dyn Hasher>,
        network: NetworkConfig,
        storage: StorageConfig,
    ) -> Arc<Self> {
        Arc::new(Node {
            local_id,
            version,
            routing_table: Mutex::new(RoutingTable::new(local_id)),
            store: Mutex::new(RecordStore::new()),
            pending: Mutex::new(PendingTable::new()),
            transport,
            scheduler,
            signer,
            verifier,
            hasher,
            network,
            storage,
        })
    }

    /// Accept loop: run forever, spawning one reader task per inbound TCP
    /// connection.
    pub async fn run_listener(self: Arc<Self>, listen_address: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(listen_address).await?;
        tracing::info!(listen_address, "dht-node listening");
        loop {
            let (stream, peer) = listener.accept().await?;
            let node = self.clone();
            tokio::spawn(async move {
                if let Err(err) = node.handle_connection(stream, peer).await {
                    tracing::warn!(%peer, error = %err, "inbound connection ended");
                }
            });
        }
    }

    async fn handle_connection(
        self: Arc<Self>,
        mut stream: tokio::net::TcpStream,
        peer: SocketAddr,
    ) -> Result<()> {
        loop {
            let msg = read_message(&mut stream).await?;
            let outcome = self.handle_inbound(peer.ip(), peer.port(), msg).await;
            match outcome {
                DispatchOutcome::Reply(reply) => {
                    use tokio::io::AsyncWriteExt;
                    let mut buf = Vec::new();
                    ciborium::into_writer(&reply, &mut buf)
                        .map_err(|e| DhtError::Transport(e.to_string()))?;
                    stream
                        .write_all(&(buf.len() as u32).to_be_bytes())
                        .await
                        .map_err(|e| DhtError::Transport(e.to_string()))?;
                    stream
                        .write_all(&buf)
                        .await
                        .map_err(|e| DhtError::Transport(e.to_string()))?;
                    // §4.6 PING handler: reply then close. Every other
                    // handler either replies without closing or has no
                    // reply at all; this connection is one request/reply
                    // per accepted stream, so we return either way.
                    return Ok(());
                }
                DispatchOutcome::NoReply => return Ok(()),
                DispatchOutcome::ErrorReply { code, title, .. } => {
                    tracing::debug!(code, %title, "dispatch produced an error reply");
                    return Ok(());
                }
            }
        }
    }

    /// Process one inbound message, holding each shared structure's lock
    /// only for the synchronous duration of the dispatch call. The
    /// liveness probe used when a full, non-local bucket needs to decide
    /// whether to evict its head is a real PING/PONG round trip.
    pub async fn handle_inbound(
        self: &Arc<Self>,
        peer_addr: IpAddr,
        peer_port: u16,
        msg: WireMessage,
    ) -> DispatchOutcome {
        let stored_record = match &msg {
            WireMessage::Store { record, .. } => Some(record.clone()),
            _ => None,
        };

        let outcome = {
            let mut routing_table = self.routing_table.lock().await;
            let mut store = self.store.lock().await;
            let mut pending = self.pending.lock().await;
            let mut ctx = DispatchContext {
                local_id: self.local_id,
                local_version: self.version.clone(),
                routing_table: &mut routing_table,
                store: &mut store,
                pending: &mut pending,
                verifier: self.verifier.as_ref(),
                hasher: self.hasher.as_ref(),
            };
            let node = self.clone();
            dispatch(&mut ctx, peer_addr, peer_port, msg, move |contact| async move {
                node.ping_contact(&contact).await
            })
            .await
        };

        // §4.6 STORE: an admitted record gets a deferred replicate at
        // REPLICATE_INTERVAL, skipped at fire time if it has since expired.
        if let (Some(record), DispatchOutcome::Reply(WireMessage::Pong { .. })) = (&stored_record, &outcome) {
            self.schedule_replicate(record.clone());
        }

        outcome
    }

    /// Schedule a deferred re-store of `record` to its key's current k
    /// closest peers, REPLICATE_INTERVAL from now (§4.6, §10.6).
    fn schedule_replicate(self: &Arc<Self>, record: Record) {
        let node = self.clone();
        let interval = Duration::from_secs(self.storage.replicate_interval_secs);
        let _timer = self.scheduler.schedule_after(
            interval,
            Box::new(move || {
                let node = node.clone();
                tokio::spawn(async move {
                    node.replicate_now(record).await;
                });
            }),
        );
    }

    async fn replicate_now(self: &Arc<Self>, record: Record) {
        if !replicate::should_replicate(&record, now_unix()) {
            return;
        }
        let targets = {
            let rt = self.routing_table.lock().await;
            replicate::replicate_targets(&rt, &record)
        };
        for target in targets {
            let node = self.clone();
            let record = record.clone();
            tokio::spawn(async move {
                let uuid = Uuid::new_v4();
                let req = WireMessage::Store {
                    uuid,
                    node: node.local_id,
                    version: node.version.clone(),
                    record,
                };
                let _ = node.send_rpc(&target, req).await;
            });
        }
    }

    /// Send a single RPC to `contact` and await its response, registering
    /// it in the pending table with a scheduled timeout (§4.5). The
    /// timeout handler fails the pending handle, aborts the channel, and
    /// evicts the peer — the liveness signal that drives routing-table
    /// eviction (§4.5).
    async fn send_rpc(self: &Arc<Self>, contact: &Contact, request: WireMessage) -> Result<WireMessage> {
        let uuid = request.uuid();
        let addr = SocketAddr::new(contact.address, contact.port);
        let (tx, rx) = oneshot::channel();

        let node_for_timeout = self.clone();
        let target_id = contact.id;
        let timer = self.scheduler.schedule_after(
            self.network.response_timeout_secs_duration(),
            Box::new(move || {
                let node = node_for_timeout.clone();
                tokio::spawn(async move {
                    let mut pending = node.pending.lock().await;
                    if pending.contains(&uuid) {
                        pending.fail(uuid, DhtError::Timeout);
                        drop(pending);
                        let mut rt = node.routing_table.lock().await;
                        let _ = rt.remove_contact(&target_id);
                    }
                });
            }),
        );

        {
            let mut pending = self.pending.lock().await;
            pending.register(uuid, tx, timer);
        }

        let mut channel = match self.transport.connect(addr).await {
            Ok(c) => c,
            Err(e) => {
                let mut pending = self.pending.lock().await;
                pending.fail(uuid, DhtError::Transport(e.to_string()));
                return Err(e);
            }
        };
        if let Err(e) = channel.send(request).await {
            let mut pending = self.pending.lock().await;
            pending.fail(uuid, DhtError::Transport(e.to_string()));
            channel.abort();
            let mut rt = self.routing_table.lock().await;
            let _ = rt.remove_contact(&contact.id);
            return Err(e);
        }

        rx.await.unwrap_or(Err(DhtError::Cancelled))
    }

    /// A bare liveness probe: PING and wait for PONG, used only by
    /// `RoutingTable::add_contact`'s full-bucket-head check (§4.3).
    async fn ping_contact(self: &Arc<Self>, contact: &Contact) -> bool {
        let uuid = Uuid::new_v4();
        let request = WireMessage::Ping {
            uuid,
            node: self.local_id,
            version: self.version.clone(),
        };
        matches!(self.send_rpc(contact, request).await, Ok(WireMessage::Pong { .. }))
    }

    /// Ping a seed address whose node id isn't known yet (bootstrap only —
    /// everywhere else a `Contact` is already on hand). On success the
    /// responder is added to the routing table and its id returned.
    pub async fn ping_addr(self: &Arc<Self>, addr: SocketAddr) -> Option<Id> {
        let uuid = Uuid::new_v4();
        let request = WireMessage::Ping {
            uuid,
            node: self.local_id,
            version: self.version.clone(),
        };
        let (tx, rx) = oneshot::channel();
        let node_for_timeout = self.clone();
        let timer = self.scheduler.schedule_after(
            self.network.response_timeout_secs_duration(),
            Box::new(move || {
                let node = node_for_timeout.clone();
                tokio::spawn(async move {
                    let mut pending = node.pending.lock().await;
                    if pending.contains(&uuid) {
                        pending.fail(uuid, DhtError::Timeout);
                    }
                });
            }),
        );
        {
            let mut pending = self.pending.lock().await;
            pending.register(uuid, tx, timer);
        }
        let mut channel = self.transport.connect(addr).await.ok()?;
        channel.send(request).await.ok()?;
        let response = rx.await.ok()?.ok()?;
        let WireMessage::Pong { node, version, .. } = response else {
            return None;
        };
        let contact = Contact::new(node, addr.ip(), addr.port(), version);
        let mut rt = self.routing_table.lock().await;
        let _ = rt.add_contact(contact, |_| async { true }).await;
        Some(node)
    }

    /// Drive an iterative FIND_NODE / FIND_VALUE (C8). Seeds the shortlist
    /// under the routing-table lock, then releases it for the lookup's
    /// duration so inbound traffic keeps flowing while it runs.
    pub async fn lookup(self: &Arc<Self>, target: Id, query_type: QueryType) -> LookupOutcome {
        let shortlist = {
            let mut rt = self.routing_table.lock().await;
            let shortlist = rt.find_close_nodes(&target, K, None);
            if target != self.local_id {
                rt.touch_kbucket(&target);
            }
            shortlist
        };

        let timeout = Duration::from_secs(self.network.lookup_timeout_secs);
        let node = self.clone();
        run_lookup(target, query_type, self.local_id, shortlist, timeout, move |contact, qt, tgt| {
            let node = node.clone();
            async move { node.probe_one(contact, qt, tgt).await }
        })
        .await
    }

    async fn probe_one(self: &Arc<Self>, contact: Contact, query_type: QueryType, target: Id) -> ProbeOutcome {
        let uuid = Uuid::new_v4();
        let request = match query_type {
            QueryType::FindNode => WireMessage::FindNode {
                uuid,
                node: self.local_id,
                version: self.version.clone(),
                key: target,
            },
            QueryType::FindValue => WireMessage::FindValue {
                uuid,
                node: self.local_id,
                version: self.version.clone(),
                key: target,
            },
        };
        match self.send_rpc(&contact, request).await {
            Ok(WireMessage::Nodes { nodes, .. }) => ProbeOutcome::Nodes(
                nodes
                    .into_iter()
                    .filter_map(|n| n.address.parse().ok().map(|addr| Contact::new(n.id, addr, n.port, n.version)))
                    .collect(),
            ),
            Ok(WireMessage::Value { record, .. }) => ProbeOutcome::Value(record),
            _ => ProbeOutcome::Failed,
        }
    }

    /// Sign and store a value locally, then STORE it to the k closest
    /// peers, mirroring the replicate target-set resolution of §10.6.
    pub async fn put(self: &Arc<Self>, value: Vec<u8>, name: String, ttl_secs: u64) -> Result<Record> {
        let now = now_unix();
        let record = signing::sign_record(
            self.signer.as_ref(),
            self.hasher.as_ref(),
            value,
            now,
            now + ttl_secs,
            name,
            vec![],
        );

        {
            let mut store = self.store.lock().await;
            store.set(record.key, record.clone())?;
        }

        let targets = {
            let rt = self.routing_table.lock().await;
            dht_core::replicate::replicate_targets(&rt, &record)
        };
        for target in targets {
            let node = self.clone();
            let record = record.clone();
            tokio::spawn(async move {
                let uuid = Uuid::new_v4();
                let req = WireMessage::Store {
                    uuid,
                    node: node.local_id,
                    version: node.version.clone(),
                    record,
                };
                let _ = node.send_rpc(&target, req).await;
            });
        }

        Ok(record)
    }
}

impl NetworkConfig {
    fn response_timeout_secs_duration(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}
