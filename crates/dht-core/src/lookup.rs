//! Iterative lookup engine (C8): parallel, convergent FIND_NODE /
//! FIND_VALUE search built entirely on top of the routing table (C4) and
//! the outbound-request path (C6) — this module knows nothing about the
//! transport.
//!
//! The source expressed concurrent lookups as nested callbacks; here the
//! state machine of §4.7/§3 `LookupState` is driven by an explicit loop
//! re-entered whenever a probe completes, using a `JoinSet` to track the
//! in-flight probes of the current round (§9 Design Notes).

use std::collections::HashSet;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::contact::Contact;
use crate::id::Id;
use crate::message::Record;
use crate::routing_table::RoutingTable;
use crate::ALPHA;
use crate::K;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryType {
    FindNode,
    FindValue,
}

/// What a single probe (a FIND_NODE or FIND_VALUE RPC to one contact)
/// resolved to. Supplied by the caller's `probe` closure, which is the
/// seam between this module and the pending-RPC table / transport.
pub enum ProbeOutcome {
    Nodes(Vec<Contact>),
    Value(Record),
    Failed,
}

#[derive(Debug)]
pub enum LookupOutcome {
    Nodes(Vec<Contact>),
    Value(Record),
    NoPeersKnown,
    ValueNotFound,
    Timeout,
}

/// Ascending distance to `target`; ties broken lexicographically by id
/// bytes, then by recency descending (§4.7 Tie-breaking).
fn distance_key(c: &Contact, target: &Id) -> (Id, Id, std::cmp::Reverse<std::time::Instant>) {
    (c.id.distance(target), c.id, std::cmp::Reverse(c.last_seen))
}

fn sort_by_distance(contacts: &mut [Contact], target: &Id) {
    contacts.sort_by(|a, b| distance_key(a, target).cmp(&distance_key(b, target)));
}

fn merge_contact(shortlist: &mut Vec<Contact>, contacted: &HashSet<Id>, local_id: &Id, candidate: Contact) {
    if candidate.id == *local_id {
        return;
    }
    if contacted.contains(&candidate.id) {
        return;
    }
    if shortlist.iter().any(|c| c.id == candidate.id) {
        return;
    }
    shortlist.push(candidate);
}

/// Drives one iterative lookup to completion. `probe` sends the typed
/// request to a contact and resolves to its outcome; it is expected to
/// already be wired to C6 (register a pending entry, await the oneshot)
/// and to routing-table eviction on failure.
///
/// `shortlist` is the initial seed, `routing_table.find_close_nodes(target,
/// K, None)` — seeded by the caller rather than read from a `&mut
/// RoutingTable` here, since the routing table is shared node-wide state
/// (behind a mutex in `dht-node`) and a lookup must not hold that lock for
/// its whole, potentially multi-second, duration. The caller is also
/// responsible for `routing_table.touch_kbucket(target)` before calling.
pub async fn run_lookup<P, Fut>(
    target: Id,
    query_type: QueryType,
    local_id: Id,
    mut shortlist: Vec<Contact>,
    timeout: Duration,
    probe: P,
) -> LookupOutcome
where
    P: Fn(Contact, QueryType, Id) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ProbeOutcome> + Send + 'static,
{
    if shortlist.is_empty() {
        return LookupOutcome::NoPeersKnown;
    }
    sort_by_distance(&mut shortlist, &target);

    let probe = std::sync::Arc::new(probe);
    let mut contacted: HashSet<Id> = HashSet::new();
    let mut active_probes: HashSet<Id> = HashSet::new();
    let mut active_candidates: Vec<Contact> = Vec::new();
    let mut slow_node_count: usize = 0;
    let mut in_flight: JoinSet<(Id, ProbeOutcome)> = JoinSet::new();

    let drive = async {
        loop {
            // §4.7 step 1: fill the round up to ALPHA (plus one extra slot
            // per outstanding "slow node" probe opened during convergence
            // checks below).
            let budget = ALPHA + slow_node_count;
            let mut started_any = false;
            while active_probes.len() < budget {
                let next = shortlist
                    .iter()
                    .find(|c| !contacted.contains(&c.id))
                    .cloned();
                let Some(contact) = next else { break };
                contacted.insert(contact.id);
                active_probes.insert(contact.id);
                started_any = true;
                let probe = probe.clone();
                let id = contact.id;
                let qt = query_type;
                let tgt = target;
                in_flight.spawn(async move { (id, probe(contact, qt, tgt).await) });
            }

            if active_probes.is_empty() && !started_any {
                // no unqueried contacts left and nothing in flight: done.
                break;
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let (id, outcome) = match joined {
                Ok(pair) => pair,
                Err(_) => continue, // a join error (panic) is treated like a failed probe
            };
            active_probes.remove(&id);

            match outcome {
                ProbeOutcome::Value(record) => {
                    return Some(LookupOutcome::Value(record));
                }
                ProbeOutcome::Nodes(nodes) => {
                    if let Some(responder) = shortlist.iter().find(|c| c.id == id).cloned() {
                        merge_contact(&mut active_candidates, &HashSet::new(), &local_id, responder);
                    }
                    for n in nodes {
                        merge_contact(&mut shortlist, &contacted, &local_id, n);
                    }
                    sort_by_distance(&mut shortlist, &target);
                    sort_by_distance(&mut active_candidates, &target);
                    active_candidates.truncate(K);
                }
                ProbeOutcome::Failed => {
                    // routing-table eviction already happened via C6; this
                    // id is simply not added to active_candidates.
                }
            }

            // §4.7 step 3: convergence check.
            let closest_unqueried = shortlist.iter().find(|c| !contacted.contains(&c.id));
            let kth_candidate_distance = active_candidates
                .get(K.saturating_sub(1))
                .or_else(|| active_candidates.last())
                .map(|c| c.id.distance(&target));

            if let (Some(next), Some(kth)) = (closest_unqueried, kth_candidate_distance) {
                if next.id.distance(&target) >= kth && !active_probes.is_empty() {
                    slow_node_count += 1;
                }
            }

            // §4.7 step 4: round termination.
            let no_closer_unqueried = match (closest_unqueried, kth_candidate_distance) {
                (Some(next), Some(kth)) => next.id.distance(&target) >= kth,
                (None, _) => true,
                (Some(_), None) => false,
            };
            if active_probes.is_empty() && no_closer_unqueried {
                break;
            }
        }

        match query_type {
            QueryType::FindValue => Some(LookupOutcome::ValueNotFound),
            QueryType::FindNode => {
                sort_by_distance(&mut active_candidates, &target);
                active_candidates.truncate(K);
                Some(LookupOutcome::Nodes(std::mem::take(&mut active_candidates)))
            }
        }
    };

    match tokio::time::timeout(timeout, drive).await {
        Ok(Some(outcome)) => outcome,
        Ok(None) => LookupOutcome::Timeout,
        Err(_) => {
            // global bound elapsed: in-flight probes are abandoned, not
            // cancelled (§5 Cancellation semantics) — dropping `in_flight`
            // here detaches the spawned tasks' JoinHandles but the tasks
            // themselves keep running to completion and their results are
            // simply never read.
            LookupOutcome::Timeout
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn mk_contact(byte: u8) -> Contact {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        Contact::new(Id(bytes), "127.0.0.1".parse().unwrap(), 1, "1.0")
    }

    #[tokio::test]
    async fn empty_routing_table_yields_no_peers_known() {
        let local = Id::random();
        let outcome = run_lookup(
            Id::random(),
            QueryType::FindNode,
            local,
            Vec::new(),
            Duration::from_secs(1),
            |_c, _qt, _t| async { ProbeOutcome::Failed },
        )
        .await;
        assert!(matches!(outcome, LookupOutcome::NoPeersKnown));
    }

    #[tokio::test]
    async fn lookup_for_known_id_returns_it_first() {
        let local = Id::random();
        let mut rt = RoutingTable::new(local);
        let target_contact = mk_contact(1);
        let target = target_contact.id;
        rt.add_contact(target_contact, |_| async { true }).await.unwrap();
        let shortlist = rt.find_close_nodes(&target, K, None);

        let outcome = run_lookup(
            target,
            QueryType::FindNode,
            local,
            shortlist,
            Duration::from_secs(2),
            move |c, _qt, _t| {
                let is_target = c.id == target;
                async move {
                    if is_target {
                        ProbeOutcome::Nodes(vec![])
                    } else {
                        ProbeOutcome::Failed
                    }
                }
            },
        )
        .await;

        match outcome {
            LookupOutcome::Nodes(nodes) => {
                assert_eq!(nodes.first().map(|c| c.id), Some(target));
            }
            other => panic!("expected Nodes outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn find_value_short_circuits_on_first_value() {
        let local = Id::random();
        let mut rt = RoutingTable::new(local);
        for i in 1..=3u8 {
            rt.add_contact(mk_contact(i), |_| async { true }).await.unwrap();
        }
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let record = Record {
            key: Id::ZERO,
            value: b"v".to_vec(),
            timestamp: 1,
            expires: u64::MAX,
            public_key: vec![0; 32],
            name: "n".into(),
            meta: vec![],
            signature: vec![0; 64],
        };
        let target = Id::random();
        let shortlist = rt.find_close_nodes(&target, K, None);
        let outcome = run_lookup(
            target,
            QueryType::FindValue,
            local,
            shortlist,
            Duration::from_secs(2),
            move |_c, _qt, _t| {
                calls2.fetch_add(1, Ordering::SeqCst);
                let record = record.clone();
                async move { ProbeOutcome::Value(record) }
            },
        )
        .await;
        assert!(matches!(outcome, LookupOutcome::Value(_)));
    }

    #[tokio::test]
    async fn no_response_eventually_reports_value_not_found() {
        let local = Id::random();
        let mut rt = RoutingTable::new(local);
        rt.add_contact(mk_contact(1), |_| async { true }).await.unwrap();
        let target = Id::random();
        let shortlist = rt.find_close_nodes(&target, K, None);
        let outcome = run_lookup(
            target,
            QueryType::FindValue,
            local,
            shortlist,
            Duration::from_secs(2),
            |_c, _qt, _t| async { ProbeOutcome::Failed },
        )
        .await;
        assert!(matches!(outcome, LookupOutcome::ValueNotFound));
    }
}
