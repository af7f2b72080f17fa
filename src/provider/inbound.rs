// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The consumer half of the protocol: accepting resources from a peer and reconciling which of
//! them are still in use.

use super::ResourceProvider;
use crate::context::{GraphicsContext, HandleKind};
use crate::descriptors::TransferDescriptor;
use crate::ids::{PeerId, ResourceId};
use crate::resource::Resource;
use std::collections::HashSet;

impl<C: GraphicsContext> ResourceProvider<C> {
    /**
    Accepts resources delegated by `peer`.

    A resource we already hold from this peer gains another import, and if it was waiting to be
    returned it is claimed again instead.  New resources are registered as delegated.

    Descriptors this process cannot use (a GPU handle without GPU support here, a handle kind
    that disagrees with `is_software`, or an empty size) are not stored; they go straight back
    to the peer as an unused return.

    Call [ResourceProvider::declare_in_use] after every batch.

    # Panics
    If `peer` is unknown.
    */
    pub fn receive(&mut self, peer: PeerId, descriptors: &[TransferDescriptor]) {
        let supports_gpu = self.context.supports_gpu_handles();
        let session = self.peers.get_mut(peer);
        if session.marked_for_deletion {
            logwise::warn_sync!("dropping transfer from peer {peer} during teardown", peer = peer.0);
            return;
        }
        let mut rejected = Vec::new();
        for descriptor in descriptors {
            if let Some(&local) = session.id_map.get(&descriptor.peer_resource_id) {
                let resource = self
                    .registry
                    .get_mut(local)
                    .unwrap_or_else(|| panic!("peer {peer} maps to unregistered {local}"));
                resource.imported.add(1);
                if resource.marked_for_deletion {
                    logwise::trace_sync!(
                        "peer {peer} reclaimed {id} before its return completed",
                        peer = peer.0,
                        id = local.0
                    );
                    resource.marked_for_deletion = false;
                }
                continue;
            }

            let usable = match descriptor.handle.kind {
                HandleKind::Gpu => supports_gpu && !descriptor.is_software,
                HandleKind::SharedMemory => descriptor.is_software,
            } && !descriptor.size.is_empty();
            if !usable {
                logwise::warn_sync!(
                    "returning untransportable resource {id} from peer {peer} unused",
                    id = descriptor.peer_resource_id.0,
                    peer = peer.0
                );
                rejected.push(descriptor.to_unused_return());
                continue;
            }

            let local = self.registry.allocate();
            self.registry
                .insert(Resource::new_delegated(local, peer, descriptor));
            session.id_map.insert(descriptor.peer_resource_id, local);
            logwise::trace_sync!(
                "received {peer_id} from peer {peer} as {id}",
                peer_id = descriptor.peer_resource_id.0,
                peer = peer.0,
                id = local.0
            );
        }
        session.send_returns(rejected);
    }

    /**
    Declares which of `peer`'s resources are still in use, by the peer's ids.

    Every resource held from `peer` and absent from `in_use` is returned.  Resources we are still
    reading or have loaned onward are marked and returned when that ends.  Calling this twice with
    the same set returns nothing the second time.

    # Panics
    If `peer` is unknown.
    */
    pub fn declare_in_use<I>(&mut self, peer: PeerId, in_use: I)
    where
        I: IntoIterator<Item = ResourceId>,
    {
        let in_use: HashSet<ResourceId> = in_use.into_iter().collect();
        let session = self.peers.get(peer);
        let mut to_return = Vec::new();
        for (peer_resource_id, &local) in &session.id_map {
            let resource = self
                .registry
                .get_mut(local)
                .unwrap_or_else(|| panic!("peer {peer} maps to unregistered {local}"));
            if in_use.contains(peer_resource_id) {
                resource.marked_for_deletion = false;
            } else if resource.is_idle() {
                to_return.push(local);
            } else {
                resource.marked_for_deletion = true;
            }
        }
        to_return.sort();
        logwise::trace_sync!(
            "peer {peer} declared {used} in use; returning {count}",
            peer = peer.0,
            used = in_use.len(),
            count = to_return.len()
        );
        self.return_to_owner(peer, to_return);
    }
}
