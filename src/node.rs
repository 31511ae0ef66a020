//! The node itself: routing, membership and the maintenance operations
//! that keep the ring's pointers honest.
//!
//! A [`Node`] owns a [`NodeState`] and a weak handle to itself so it can
//! hand out a [`PeerRef::Local`] whenever routing resolves an address back
//! to its own — avoiding the reference cycle an `Arc<Node>` pointing at
//! itself would otherwise create (see the spec's notes on cyclic
//! references).

use std::sync::{Arc, Weak};
use std::time::Duration;

use rand::Rng;

use crate::address::Address;
use crate::error::{NodeError, NodeResult};
use crate::id::{self, Id, M};
use crate::peer::PeerRef;
use crate::state::{NodeState, RingSnapshot};

pub struct Node {
    state: NodeState,
    self_ref: Weak<Node>,
    rpc_timeout: Duration,
}

impl Node {
    /// Builds a node bound to `self_addr`. The returned node has not
    /// joined any ring yet — callers must run [`Node::join`] with `None`
    /// to start a fresh ring or `Some(bootstrap)` to join an existing one.
    pub fn new(self_addr: Address, rpc_timeout: Duration) -> Arc<Node> {
        Arc::new_cyclic(|weak| Node {
            state: NodeState::new(self_addr),
            self_ref: weak.clone(),
            rpc_timeout,
        })
    }

    pub fn self_addr(&self) -> &Address {
        &self.state.self_addr
    }

    pub fn self_id(&self) -> Id {
        self.state.self_id
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    fn self_peer(&self) -> PeerRef {
        PeerRef::local(
            self.self_ref
                .upgrade()
                .expect("Node dropped while still in use"),
        )
    }

    /// Resolves an address to a handle, returning the cheap `Local`
    /// variant when it happens to be this node's own address.
    pub fn peer_for(&self, addr: &Address) -> PeerRef {
        if addr == self.self_addr() {
            self.self_peer()
        } else {
            PeerRef::remote(addr.clone(), self.rpc_timeout)
        }
    }

    /// `find_successor(key_id, depth)` — §4.4.
    pub async fn find_successor(&self, key_id: Id, depth: u32) -> NodeResult<Address> {
        if depth > M {
            log::error!("routing diverged looking up key {key_id} from {}", self.self_addr());
            return Err(NodeError::RoutingDiverged(M));
        }

        let snapshot = self.state.snapshot();

        if let Some(pred) = &snapshot.predecessor {
            if id::in_arc(key_id, pred.id(), self.self_id(), false, true) {
                return Ok(self.self_addr().clone());
            }
        }

        if id::in_arc(key_id, self.self_id(), snapshot.successor.id(), false, true) {
            return Ok(snapshot.successor.clone());
        }

        let closest = self.closest_preceding(key_id, &snapshot);
        if closest == *self.self_addr() {
            return Ok(closest);
        }

        self.peer_for(&closest)
            .find_successor(key_id, depth + 1)
            .await
    }

    /// `closest_preceding(key_id)` — §4.4.
    fn closest_preceding(&self, key_id: Id, snapshot: &RingSnapshot) -> Address {
        for finger in snapshot.finger_table.iter().rev() {
            if finger != self.self_addr() && id::in_arc(finger.id(), self.self_id(), key_id, false, false) {
                return finger.clone();
            }
        }
        self.self_addr().clone()
    }

    /// `put(k, v)` — §4.5.
    pub async fn put(&self, key: String, value: String) -> NodeResult<()> {
        let owner = self.find_successor(id::hash(&key), 0).await?;

        if owner == *self.self_addr() {
            log::info!("storing '{key}' locally at {}", self.self_addr());
            self.state.put_data(key, value);
            Ok(())
        } else {
            log::debug!("forwarding put('{key}') to owner {owner}");
            self.peer_for(&owner).put(key, value).await
        }
    }

    /// `lookup(k, history)` — §4.5. History only grows at the terminal
    /// (owning) hop; forwarding hops pass it through unchanged.
    pub async fn lookup(
        &self,
        key: String,
        history: Vec<String>,
    ) -> NodeResult<(Option<String>, Option<Address>, Vec<String>)> {
        let self_addr_str = self.self_addr().to_string();
        if history.iter().any(|visited| visited == &self_addr_str) {
            log::warn!("circular lookup detected for '{key}' at {self_addr_str}");
            return Ok((None, None, history));
        }

        let owner = self.find_successor(id::hash(&key), 0).await?;

        if owner == *self.self_addr() {
            let mut history = history;
            match self.state.get_data(&key) {
                Some(value) => {
                    history.push(format!("local hit at {}", self.self_addr()));
                    Ok((Some(value), Some(owner), history))
                }
                None => {
                    history.push(format!("not found at {}", self.self_addr()));
                    Ok((None, None, history))
                }
            }
        } else {
            self.peer_for(&owner).lookup(key, history).await
        }
    }

    /// `join(bootstrap)` — §4.6.
    pub async fn join(&self, bootstrap: Option<Address>) -> NodeResult<()> {
        match bootstrap {
            None => {
                log::info!("starting a new ring at {}", self.self_addr());
                let me = self.self_addr().clone();
                self.state.set_predecessor(Some(me.clone()));
                self.state.set_all_fingers(me);
                Ok(())
            }
            Some(bootstrap_addr) => {
                log::info!("joining the ring through {bootstrap_addr}");
                let bootstrap_peer = self.peer_for(&bootstrap_addr);

                let new_succ = bootstrap_peer.find_successor(self.self_id(), 0).await?;
                let succ_peer = self.peer_for(&new_succ);
                let new_pred = succ_peer.get_predecessor().await?;

                self.state.set_successor(new_succ.clone());
                self.state.set_predecessor(new_pred.clone());

                succ_peer.pass_data(self.self_addr().clone()).await?;

                self.rebuild_finger_table(&bootstrap_peer).await?;

                if let Some(pred) = &new_pred {
                    self.peer_for(pred)
                        .set_successor(self.self_addr().clone())
                        .await?;
                }
                succ_peer.set_predecessor(self.self_addr().clone()).await?;

                log::info!("{} joined the ring", self.self_addr());
                Ok(())
            }
        }
    }

    /// Rebuilds every finger slot using `router` to resolve each target.
    async fn rebuild_finger_table(&self, router: &PeerRef) -> NodeResult<()> {
        for i in 0..M {
            let target = id::finger_start(self.self_id(), i);
            let resolved = router.find_successor(target, 0).await?;
            self.state.set_finger(i as usize, resolved);
        }
        Ok(())
    }

    /// `exit_network` — §4.6.
    pub async fn exit_network(&self) -> NodeResult<()> {
        log::info!("{} is leaving the ring", self.self_addr());
        let snapshot = self.state.snapshot();

        let degenerate = snapshot.successor == *self.self_addr()
            || snapshot.predecessor.as_ref() == Some(self.self_addr());

        if !degenerate {
            if let Some(pred) = &snapshot.predecessor {
                self.peer_for(pred)
                    .set_successor(snapshot.successor.clone())
                    .await?;
                self.peer_for(&snapshot.successor)
                    .set_predecessor(pred.clone())
                    .await?;
                self.pass_data(snapshot.successor.clone()).await?;
            }
        }

        self.state.reset_to_solo();
        log::info!("{} has left the ring", self.self_addr());
        Ok(())
    }

    /// `stabilize` — §4.7.
    pub async fn stabilize(&self) -> NodeResult<()> {
        let snapshot = self.state.snapshot();

        if snapshot.successor == *self.self_addr() {
            let router = self.self_peer();
            return self.rebuild_finger_table(&router).await;
        }

        let succ_peer = self.peer_for(&snapshot.successor);
        let candidate = succ_peer.get_predecessor().await?;

        let mut successor = snapshot.successor.clone();
        if let Some(candidate) = candidate {
            if id::in_arc(candidate.id(), self.self_id(), successor.id(), false, false) {
                successor = candidate;
                self.state.set_successor(successor.clone());
            }
        }

        self.peer_for(&successor)
            .notify(self.self_addr().clone())
            .await?;

        self.fix_fingers().await
    }

    /// `notify(candidate)` — §4.7. Purely local: never crosses the wire
    /// on the receiving side, so it has no RPC failure mode of its own.
    pub fn notify(&self, candidate: Address) {
        let predecessor = self.state.predecessor();
        let accept = match &predecessor {
            None => true,
            Some(pred) => id::in_arc(candidate.id(), pred.id(), self.self_id(), false, false),
        };

        if accept {
            log::debug!("{} accepted {candidate} as predecessor", self.self_addr());
            self.state.set_predecessor(Some(candidate));
        }
    }

    /// `fix_fingers` — §4.7.
    pub async fn fix_fingers(&self) -> NodeResult<()> {
        let slot = rand::rng().random_range(0..M);
        let target = id::finger_start(self.self_id(), slot);
        let resolved = self.find_successor(target, 0).await?;
        self.state.set_finger(slot as usize, resolved);
        Ok(())
    }

    /// `pass_data(receiver)` — §4.8.
    pub async fn pass_data(&self, receiver: Address) -> NodeResult<()> {
        let snapshot = self.state.snapshot();

        let degenerate = snapshot.successor == *self.self_addr()
            && snapshot.predecessor.as_ref() == Some(self.self_addr());

        if receiver == *self.self_addr() || degenerate {
            return Ok(());
        }

        if snapshot.successor != receiver {
            let owner = self.find_successor(receiver.id(), 0).await?;
            if owner != *self.self_addr() {
                log::debug!("forwarding pass_data({receiver}) to current owner {owner}");
                return self.peer_for(&owner).pass_data(receiver).await;
            }
        }

        let pred = snapshot
            .predecessor
            .clone()
            .unwrap_or_else(|| self.self_addr().clone());

        let start = pred.id();
        let end = if snapshot.predecessor.as_ref() == Some(&receiver) {
            self.self_id()
        } else {
            receiver.id()
        };

        let transfer = self.state.take_data_in_arc(start, end);
        log::info!("transferring {} keys to {receiver}", transfer.len());
        self.peer_for(&receiver).update_data(transfer).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_solo(port: u16) -> Arc<Node> {
        let node = Node::new(Address::new("127.0.0.1", port), Duration::from_millis(300));
        node
    }

    #[tokio::test]
    async fn solo_node_is_its_own_owner() {
        let node = new_solo(8008);
        node.join(None).await.unwrap();

        let owner = node.find_successor(12345, 0).await.unwrap();
        assert_eq!(owner, *node.self_addr());
    }

    #[tokio::test]
    async fn solo_put_then_get_round_trips() {
        let node = new_solo(8008);
        node.join(None).await.unwrap();

        node.put("apple".into(), "fruit".into()).await.unwrap();
        let (value, owner, history) = node.lookup("apple".into(), Vec::new()).await.unwrap();

        assert_eq!(value.as_deref(), Some("fruit"));
        assert_eq!(owner.as_ref(), Some(node.self_addr()));
        assert_eq!(history, vec![format!("local hit at {}", node.self_addr())]);
    }

    #[tokio::test]
    async fn lookup_of_missing_key_returns_none() {
        let node = new_solo(8008);
        node.join(None).await.unwrap();

        let (value, owner, _history) = node.lookup("missing".into(), Vec::new()).await.unwrap();
        assert!(value.is_none());
        assert!(owner.is_none());
    }

    #[tokio::test]
    async fn lookup_detects_cycle_in_incoming_history() {
        let node = new_solo(8008);
        node.join(None).await.unwrap();

        let history = vec![node.self_addr().to_string()];
        let (value, owner, returned) = node.lookup("apple".into(), history.clone()).await.unwrap();

        assert!(value.is_none());
        assert!(owner.is_none());
        assert_eq!(returned, history);
    }

    #[tokio::test]
    async fn exit_network_on_solo_node_is_a_no_op() {
        let node = new_solo(8008);
        node.join(None).await.unwrap();
        node.put("a".into(), "1".into()).await.unwrap();

        node.exit_network().await.unwrap();

        assert_eq!(node.state().successor(), *node.self_addr());
        assert!(node.state().predecessor().is_none());
        assert!(node.state().get_data("a").is_none());
    }

    #[test]
    fn closest_preceding_falls_back_to_self_with_no_useful_fingers() {
        let node = new_solo(8008);
        let snapshot = node.state().snapshot();
        let result = node.closest_preceding(1, &snapshot);
        assert_eq!(result, *node.self_addr());
    }
}
