// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Per-peer bookkeeping.
//!
//! A peer can play both roles at once: it delegates resources to us (tracked in `id_map`) and
//! borrows resources from us (tracked in `loans`).  Teardown of the session has to unwind both.

use crate::descriptors::ReturnDescriptor;
use crate::ids::{PeerId, ResourceId};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

/// Invoked with each batch of resources returned to a peer.
///
/// Typically forwards the batch to the messaging layer.
pub type ReturnCallback = Box<dyn FnMut(Vec<ReturnDescriptor>)>;

pub(crate) struct PeerSession {
    pub id: PeerId,
    /// Peer's resource id → our resource id, for everything the peer delegated to us.
    pub id_map: HashMap<ResourceId, ResourceId>,
    /// Our resource id → loans outstanding to this peer.
    pub loans: HashMap<ResourceId, u32>,
    pub needs_sync_tokens: bool,
    /// Set while the session is being torn down.
    pub marked_for_deletion: bool,
    return_callback: ReturnCallback,
}

impl Debug for PeerSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("id", &self.id)
            .field("id_map", &self.id_map)
            .field("loans", &self.loans)
            .field("needs_sync_tokens", &self.needs_sync_tokens)
            .field("marked_for_deletion", &self.marked_for_deletion)
            .finish()
    }
}

impl PeerSession {
    fn new(id: PeerId, return_callback: ReturnCallback, needs_sync_tokens: bool) -> Self {
        PeerSession {
            id,
            id_map: HashMap::new(),
            loans: HashMap::new(),
            needs_sync_tokens,
            marked_for_deletion: false,
            return_callback,
        }
    }

    pub fn send_returns(&mut self, returns: Vec<ReturnDescriptor>) {
        if returns.is_empty() {
            return;
        }
        logwise::trace_sync!(
            "returning {count} resources to peer {peer}",
            count = returns.len(),
            peer = self.id.0
        );
        (self.return_callback)(returns);
    }

    pub fn add_loan(&mut self, id: ResourceId) {
        *self.loans.entry(id).or_insert(0) += 1;
    }

    /// Releases `count` of this peer's loans of `id`.
    pub fn release_loans(&mut self, id: ResourceId, count: u32) {
        let outstanding = self.loans.get(&id).copied().unwrap_or(0);
        assert!(
            count <= outstanding,
            "protocol violation: peer {peer} returned {count} loans of {id} but holds {outstanding}",
            peer = self.id
        );
        if count == outstanding {
            self.loans.remove(&id);
        } else {
            self.loans.insert(id, outstanding - count);
        }
    }
}

#[derive(Debug)]
pub(crate) struct PeerTable {
    peers: HashMap<PeerId, PeerSession>,
    next_id: u32,
}

impl PeerTable {
    pub fn new() -> Self {
        PeerTable {
            peers: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn create(&mut self, return_callback: ReturnCallback, needs_sync_tokens: bool) -> PeerId {
        let id = PeerId(self.next_id);
        self.next_id = self.next_id.checked_add(1).expect("peer id space exhausted");
        self.peers
            .insert(id, PeerSession::new(id, return_callback, needs_sync_tokens));
        id
    }

    pub fn get(&self, id: PeerId) -> &PeerSession {
        self.peers
            .get(&id)
            .unwrap_or_else(|| panic!("protocol violation: unknown peer {id}"))
    }

    pub fn get_mut(&mut self, id: PeerId) -> &mut PeerSession {
        self.peers
            .get_mut(&id)
            .unwrap_or_else(|| panic!("protocol violation: unknown peer {id}"))
    }

    /// Lookup for paths that tolerate a peer which has already gone away.
    pub fn try_get_mut(&mut self, id: PeerId) -> Option<&mut PeerSession> {
        self.peers.get_mut(&id)
    }

    pub fn remove(&mut self, id: PeerId) -> PeerSession {
        self.peers
            .remove(&id)
            .unwrap_or_else(|| panic!("protocol violation: unknown peer {id}"))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PeerSession> {
        self.peers.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn loans_are_tracked_per_resource() {
        let mut table = PeerTable::new();
        let peer = table.create(Box::new(|_| {}), true);
        let session = table.get_mut(peer);
        session.add_loan(ResourceId(3));
        session.add_loan(ResourceId(3));
        session.release_loans(ResourceId(3), 1);
        assert_eq!(session.loans.get(&ResourceId(3)), Some(&1));
        session.release_loans(ResourceId(3), 1);
        assert!(session.loans.is_empty());
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    #[should_panic(expected = "protocol violation")]
    fn returning_unheld_loans_panics() {
        let mut table = PeerTable::new();
        let peer = table.create(Box::new(|_| {}), true);
        table.get_mut(peer).release_loans(ResourceId(1), 1);
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    #[should_panic(expected = "unknown peer")]
    fn unknown_peer_panics() {
        let mut table = PeerTable::new();
        table.get_mut(PeerId(40));
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn empty_batches_are_not_sent() {
        let calls = Rc::new(RefCell::new(0));
        let mut table = PeerTable::new();
        let peer = table.create(
            Box::new({
                let calls = calls.clone();
                move |_| *calls.borrow_mut() += 1
            }),
            true,
        );
        table.get_mut(peer).send_returns(Vec::new());
        assert_eq!(*calls.borrow(), 0);
    }
}
