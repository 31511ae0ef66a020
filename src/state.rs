//! Ring-state store: the node's identity, predecessor, successor, finger
//! table, and owned key/value map, plus the locking discipline that
//! protects them.
//!
//! Every mutable field lives behind a single [`parking_lot::Mutex`] — "the
//! node lock" of the spec. `parking_lot`'s mutex is synchronous and never
//! yields to the async runtime while held, which is exactly the property
//! routing code depends on: snapshot the fields it needs under the lock,
//! drop the guard, then perform any remote RPC, then reacquire only to
//! commit results.

use ahash::HashMap;
use parking_lot::Mutex;

use crate::address::Address;
use crate::id::{Id, M};

/// Everything that changes after construction, guarded by one lock.
pub struct RingState {
    pub predecessor: Option<Address>,
    pub successor: Address,
    pub finger_table: Vec<Address>,
    pub data: HashMap<String, String>,
}

/// A node's full identity plus its guarded mutable state.
pub struct NodeState {
    pub self_id: Id,
    pub self_addr: Address,
    inner: Mutex<RingState>,
}

/// Snapshot of the fields routing code needs before it releases the lock
/// to make a remote call.
#[derive(Clone)]
pub struct RingSnapshot {
    pub predecessor: Option<Address>,
    pub successor: Address,
    pub finger_table: Vec<Address>,
}

impl NodeState {
    /// Builds a node state for a node that has not yet joined any ring.
    /// `successor` is set to `self_addr` as a placeholder; callers must
    /// run `join(None)` or `join(Some(bootstrap))` before routing through
    /// this node.
    pub fn new(self_addr: Address) -> Self {
        let self_id = self_addr.id();

        Self {
            self_id,
            inner: Mutex::new(RingState {
                predecessor: None,
                successor: self_addr.clone(),
                finger_table: vec![self_addr.clone(); M as usize],
                data: HashMap::default(),
            }),
            self_addr,
        }
    }

    /// Snapshots predecessor/successor/finger table under the lock.
    pub fn snapshot(&self) -> RingSnapshot {
        let guard = self.inner.lock();
        RingSnapshot {
            predecessor: guard.predecessor.clone(),
            successor: guard.successor.clone(),
            finger_table: guard.finger_table.clone(),
        }
    }

    pub fn successor(&self) -> Address {
        self.inner.lock().successor.clone()
    }

    pub fn set_successor(&self, addr: Address) {
        let mut guard = self.inner.lock();
        guard.successor = addr.clone();
        guard.finger_table[0] = addr;
    }

    pub fn predecessor(&self) -> Option<Address> {
        self.inner.lock().predecessor.clone()
    }

    pub fn set_predecessor(&self, addr: Option<Address>) {
        self.inner.lock().predecessor = addr;
    }

    pub fn finger(&self, i: usize) -> Address {
        self.inner.lock().finger_table[i].clone()
    }

    pub fn set_finger(&self, i: usize, addr: Address) {
        let mut guard = self.inner.lock();
        guard.finger_table[i] = addr.clone();
        if i == 0 {
            guard.successor = addr;
        }
    }

    pub fn set_all_fingers(&self, addr: Address) {
        let mut guard = self.inner.lock();
        guard.finger_table = vec![addr.clone(); M as usize];
        guard.successor = addr;
    }

    pub fn finger_table(&self) -> Vec<Address> {
        self.inner.lock().finger_table.clone()
    }

    pub fn get_data(&self, key: &str) -> Option<String> {
        self.inner.lock().data.get(key).cloned()
    }

    pub fn put_data(&self, key: String, value: String) {
        self.inner.lock().data.insert(key, value);
    }

    pub fn snapshot_data(&self) -> HashMap<String, String> {
        self.inner.lock().data.clone()
    }

    pub fn merge_data(&self, entries: HashMap<String, String>) {
        self.inner.lock().data.extend(entries);
    }

    /// Removes and returns every entry whose hash falls in `(start, end]`.
    pub fn take_data_in_arc(&self, start: Id, end: Id) -> HashMap<String, String> {
        let mut guard = self.inner.lock();
        let mut moved = HashMap::default();

        let keys: Vec<String> = guard
            .data
            .keys()
            .filter(|k| crate::id::in_arc(crate::id::hash(k), start, end, false, true))
            .cloned()
            .collect();

        for key in keys {
            if let Some(value) = guard.data.remove(&key) {
                moved.insert(key, value);
            }
        }

        moved
    }

    /// Wipes predecessor, successor (reset to self), finger table (reset
    /// to self) and local data. Used by `exit_network`.
    pub fn reset_to_solo(&self) {
        let mut guard = self.inner.lock();
        guard.predecessor = None;
        guard.successor = self.self_addr.clone();
        guard.finger_table = vec![self.self_addr.clone(); M as usize];
        guard.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_node_is_its_own_successor() {
        let addr = Address::new("127.0.0.1", 8008);
        let state = NodeState::new(addr.clone());
        assert_eq!(state.successor(), addr);
        assert!(state.predecessor().is_none());
        assert_eq!(state.finger_table().len(), M as usize);
        assert!(state.finger_table().iter().all(|f| *f == addr));
    }

    #[test]
    fn set_finger_zero_also_updates_successor() {
        let addr = Address::new("127.0.0.1", 8008);
        let other = Address::new("127.0.0.1", 8009);
        let state = NodeState::new(addr);
        state.set_finger(0, other.clone());
        assert_eq!(state.successor(), other);
    }

    #[test]
    fn take_data_in_arc_moves_only_matching_keys() {
        let addr = Address::new("127.0.0.1", 8008);
        let state = NodeState::new(addr);
        state.put_data("a".into(), "1".into());
        state.put_data("b".into(), "2".into());
        state.put_data("c".into(), "3".into());

        let ids: Vec<_> = ["a", "b", "c"].iter().map(|k| crate::id::hash(k)).collect();
        let mut sorted = ids.clone();
        sorted.sort();

        // Arc covering only the lowest-hashing key.
        let moved = state.take_data_in_arc(sorted[2].wrapping_sub(1), sorted[0]);
        assert!(moved.len() <= 1);
    }
}
