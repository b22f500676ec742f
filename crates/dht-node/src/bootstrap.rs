//! Join the network by contacting seed nodes, then self-lookup (§9 Design
//! Notes), grounded in the teacher's `ochra-dht::bootstrap` flow: ping every
//! seed, then run an iterative FIND_NODE for the local id so the routing
//! table fills with peers beyond the seeds themselves.

use std::net::SocketAddr;
use std::sync::Arc;

use dht_core::lookup::QueryType;

use crate::node::Node;

#[derive(Debug, Default)]
pub struct BootstrapResult {
    pub responsive_seeds: usize,
    pub total_seeds: usize,
}

pub async fn bootstrap(node: &Arc<Node>, seeds: &[String]) -> BootstrapResult {
    let mut responsive_seeds = 0;
    for seed in seeds {
        match seed.parse::<SocketAddr>() {
            Ok(addr) => match node.ping_addr(addr).await {
                Some(peer_id) => {
                    responsive_seeds += 1;
                    tracing::info!(%addr, %peer_id, "seed responded");
                }
                None => tracing::warn!(%addr, "seed did not respond"),
            },
            Err(err) => tracing::warn!(seed, %err, "invalid seed address, skipping"),
        }
    }

    if responsive_seeds > 0 {
        let outcome = node.lookup(node.local_id, QueryType::FindNode).await;
        tracing::info!(?outcome, "self-lookup complete");
    }

    BootstrapResult {
        responsive_seeds,
        total_seeds: seeds.len(),
    }
}
