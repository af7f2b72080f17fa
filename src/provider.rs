// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The resource provider: one process's half of the transfer protocol.

A [ResourceProvider] owns the resource registry, the peer sessions, and the graphics context.  It
plays both protocol roles:

* as a **producer** it exports resources to peers and processes their returns
  (see [ResourceProvider::export] and [ResourceProvider::process_returns]);
* as a **consumer** it receives resources from peers and declares which of them are still in use
  (see [ResourceProvider::receive] and [ResourceProvider::declare_in_use]).

A delegated resource may be exported onward, so the same process can be a consumer of one peer
and a producer for another; returns are forwarded upstream once every downstream loan ends.

# Threading

The provider is not thread-safe.  All calls must come from one sequence, which is why it takes
`&mut self` everywhere and holds no locks.  Peer return callbacks are invoked synchronously on
that sequence and must not call back into the provider.
*/

mod builder;
mod inbound;
mod outbound;

pub use builder::ProviderBuilder;
pub use outbound::ExportOutcome;

use crate::context::{GraphicsContext, HandleRequest, TransferHandle};
use crate::descriptors::ReturnDescriptor;
use crate::error::Error;
use crate::ids::{PeerId, ResourceId};
use crate::peer::{PeerTable, ReturnCallback};
use crate::pixel_formats::{PixelFormat, Size};
use crate::registry::ResourceRegistry;
use crate::resource::{Origin, Resource, ResourceInfo};
use crate::sampler::FilterType;
use crate::sync_token::SyncTokenBatcher;
use std::collections::{BTreeMap, HashMap};

/// Proof that a resource is being read by this process.
///
/// Pass it back to [ResourceProvider::unlock_for_read] when the reads have been issued.  While any
/// lock is held the resource will not be returned to its owner or deleted.
#[must_use = "a read lock must be passed back to unlock_for_read"]
#[derive(Debug)]
pub struct ReadLock {
    id: ResourceId,
    handle: TransferHandle,
    size: Size,
    format: PixelFormat,
    filter: FilterType,
}

impl ReadLock {
    pub fn id(&self) -> ResourceId {
        self.id
    }
    pub fn handle(&self) -> TransferHandle {
        self.handle
    }
    pub fn size(&self) -> Size {
        self.size
    }
    pub fn format(&self) -> PixelFormat {
        self.format
    }
    pub fn filter(&self) -> FilterType {
        self.filter
    }
}

#[derive(Debug)]
pub struct ResourceProvider<C: GraphicsContext> {
    context: C,
    registry: ResourceRegistry,
    peers: PeerTable,
    default_needs_sync_tokens: bool,
    debug_name: String,
}

impl<C: GraphicsContext> ResourceProvider<C> {
    /// Creates a provider with default configuration.  See [ProviderBuilder] for options.
    pub fn new(context: C) -> Self {
        ProviderBuilder::new(context).build()
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    /* peer management */

    /// Starts a session with a peer.  `return_callback` receives every batch of resources this
    /// process returns to it.
    pub fn create_peer<F>(&mut self, return_callback: F) -> PeerId
    where
        F: FnMut(Vec<ReturnDescriptor>) + 'static,
    {
        let callback: ReturnCallback = Box::new(return_callback);
        let peer = self.peers.create(callback, self.default_needs_sync_tokens);
        logwise::info_sync!(
            "{provider}: created peer {peer}",
            provider = logwise::privacy::LogIt(&self.debug_name),
            peer = peer.0
        );
        peer
    }

    /// Whether returns to `peer` must carry verified sync tokens.
    pub fn set_needs_sync_tokens(&mut self, peer: PeerId, needs_sync_tokens: bool) {
        self.peers.get_mut(peer).needs_sync_tokens = needs_sync_tokens;
    }

    /**
    Tears down a peer session.

    Every resource the peer delegated to us is dropped, whatever its counts, and nothing is sent
    back since the peer can no longer be reached.  Every loan the peer held from us is cancelled;
    resources whose last loan this was and which were already released are reclaimed as though the
    peer had returned them.
    */
    pub fn destroy_peer(&mut self, peer: PeerId) {
        let session = self.peers.get_mut(peer);
        session.marked_for_deletion = true;
        let delegated: Vec<ResourceId> = session.id_map.drain().map(|(_, local)| local).collect();
        let loans: Vec<(ResourceId, u32)> = session.loans.drain().collect();
        logwise::info_sync!(
            "{provider}: destroying peer {peer} with {delegated} delegated resources and {loans} loans",
            provider = logwise::privacy::LogIt(&self.debug_name),
            peer = peer.0,
            delegated = delegated.len(),
            loans = loans.len()
        );

        for id in delegated {
            if let Some(resource) = self.registry.remove(id) {
                if !resource.exported.is_zero() {
                    logwise::trace_sync!(
                        "dropping {id} with {count} onward loans outstanding",
                        id = id.0,
                        count = resource.exported.get()
                    );
                }
            }
            //downstream peers' returns for this id will now miss, which they tolerate
            for other in self.peers.iter_mut() {
                other.loans.remove(&id);
            }
        }

        let mut reclaim = Vec::new();
        for (id, count) in loans {
            if let Some(resource) = self.registry.get_mut(id) {
                resource.exported.force_release(count);
                if resource.is_reclaimable() {
                    reclaim.push(id);
                }
            }
        }
        reclaim.sort();
        self.reclaim(reclaim);
        self.peers.remove(peer);
    }

    /* local resources */

    /// Creates a GPU-backed resource owned by this process.  Memory is allocated on first export
    /// or lock.
    pub fn create_gpu_resource(&mut self, size: Size, format: PixelFormat, filter: FilterType) -> ResourceId {
        self.create_local(size, format, filter, false)
    }

    /// Creates a shared-memory-backed resource owned by this process.
    pub fn create_software_resource(
        &mut self,
        size: Size,
        format: PixelFormat,
        filter: FilterType,
    ) -> ResourceId {
        self.create_local(size, format, filter, true)
    }

    fn create_local(&mut self, size: Size, format: PixelFormat, filter: FilterType, is_software: bool) -> ResourceId {
        let id = self.registry.allocate();
        self.registry
            .insert(Resource::new_local(id, size, format, filter, is_software));
        logwise::trace_sync!(
            "created local resource {id} software={software}",
            id = id.0,
            software = logwise::privacy::LogIt(&is_software)
        );
        id
    }

    /**
    Records that new content has been drawn into a local resource.

    The next export will carry a fresh fence.  Fails if the resource is currently loaned to a
    peer, since a borrower may be reading it.
    */
    pub fn mark_content_updated(&mut self, id: ResourceId) -> Result<(), Error> {
        let resource = self.registry.get_mut(id).ok_or(Error::NoSuchResource(id))?;
        if !resource.is_local() {
            return Err(Error::NotLocal(id));
        }
        if resource.lost {
            return Err(Error::ResourceLost(id));
        }
        if !resource.exported.is_zero() {
            return Err(Error::Exported(id));
        }
        if !resource.is_software {
            resource.needs_fence = true;
        }
        Ok(())
    }

    /// The owner is done with a local resource.  It is deleted once every loan and read lock has
    /// ended.
    pub fn release(&mut self, id: ResourceId) -> Result<(), Error> {
        let resource = self.registry.get_mut(id).ok_or(Error::NoSuchResource(id))?;
        if !resource.is_local() {
            return Err(Error::NotLocal(id));
        }
        resource.marked_for_deletion = true;
        if resource.is_reclaimable() {
            self.reclaim(vec![id]);
        }
        Ok(())
    }

    /* local reads */

    /**
    Locks a resource for reading by this process.

    If the resource carries a sync token this process hasn't waited on yet, the wait is issued
    here, so reads recorded after this call are ordered after the producer's writes.
    */
    pub fn lock_for_read(&mut self, id: ResourceId) -> Result<ReadLock, Error> {
        let resource = self.registry.get(id).ok_or(Error::NoSuchResource(id))?;
        if resource.lost {
            return Err(Error::ResourceLost(id));
        }
        let handle = self.ensure_handle(id)?;
        let resource = self.registry.get_mut(id).ok_or(Error::NoSuchResource(id))?;
        if !resource.token_waited && !resource.is_software {
            if let Some(token) = resource.sync_token {
                self.context.wait_on_token(&token)?;
            }
        }
        resource.token_waited = true;
        resource.read_locks.add(1);
        Ok(ReadLock {
            id,
            handle,
            size: resource.size,
            format: resource.format,
            filter: resource.filter,
        })
    }

    /// Ends a read started by [ResourceProvider::lock_for_read].
    pub fn unlock_for_read(&mut self, lock: ReadLock) {
        let id = lock.id;
        let Some(resource) = self.registry.get_mut(id) else {
            //the owning peer was torn down while we were reading
            logwise::trace_sync!("unlock of dropped resource {id}", id = id.0);
            return;
        };
        resource.read_locks.release(1, "read locks", id);
        if !resource.is_software {
            resource.needs_fence = true;
        }
        if resource.is_reclaimable() {
            self.reclaim(vec![id]);
        }
    }

    /// The graphics context was lost.  Every resource is marked lost; lost resources can still be
    /// returned and released but never read or exported again.
    pub fn context_lost(&mut self) {
        logwise::warn_sync!(
            "{provider}: context lost; marking {count} resources lost",
            provider = logwise::privacy::LogIt(&self.debug_name),
            count = self.registry.len()
        );
        for resource in self.registry.iter_mut() {
            resource.lost = true;
        }
    }

    /* introspection */

    pub fn get(&self, id: ResourceId) -> Option<ResourceInfo> {
        self.registry.get(id).map(Resource::info)
    }

    pub fn resource_count(&self) -> usize {
        self.registry.len()
    }

    pub fn resource_ids(&self) -> Vec<ResourceId> {
        let mut ids: Vec<_> = self.registry.ids().collect();
        ids.sort();
        ids
    }

    /// The peer's resource ids mapped to ours, for everything `peer` has delegated to us.
    pub fn peer_resource_map(&self, peer: PeerId) -> HashMap<ResourceId, ResourceId> {
        self.peers.get(peer).id_map.clone()
    }

    /// Whether any peer holds a loan of `id`.  False for unknown ids.
    pub fn in_use_by_peer(&self, id: ResourceId) -> bool {
        self.registry.get(id).is_some_and(|r| !r.exported.is_zero())
    }

    /// Loans of `id` currently held by `peer`.
    pub fn loans_to_peer(&self, peer: PeerId, id: ResourceId) -> u32 {
        self.peers.get(peer).loans.get(&id).copied().unwrap_or(0)
    }

    /* shared internals */

    /// Materializes the transferable handle on first use.
    fn ensure_handle(&mut self, id: ResourceId) -> Result<TransferHandle, Error> {
        let resource = self.registry.get_mut(id).ok_or(Error::NoSuchResource(id))?;
        if let Some(handle) = resource.handle {
            return Ok(handle);
        }
        let request = HandleRequest {
            size: resource.size,
            format: resource.format,
            is_software: resource.is_software,
        };
        let handle = self.context.materialize_handle(&request)?;
        logwise::trace_sync!(
            "materialized {id} as {name}",
            id = id.0,
            name = logwise::privacy::LogIt(&handle.name)
        );
        resource.handle = Some(handle);
        Ok(handle)
    }

    /**
    Ends the life of reclaimable resources.

    Local resources are deleted.  Delegated resources are returned to their owners, one batch per
    owner.
    */
    fn reclaim(&mut self, ids: Vec<ResourceId>) {
        let mut by_owner: BTreeMap<PeerId, Vec<ResourceId>> = BTreeMap::new();
        for id in ids {
            let Some(resource) = self.registry.get(id) else {
                continue;
            };
            match resource.origin.owning_peer() {
                None => self.delete_local(id),
                Some(peer) => by_owner.entry(peer).or_default().push(id),
            }
        }
        for (owner, ids) in by_owner {
            self.return_to_owner(owner, ids);
        }
    }

    fn delete_local(&mut self, id: ResourceId) {
        let resource = self
            .registry
            .remove(id)
            .unwrap_or_else(|| panic!("deleting {id}, which is not registered"));
        debug_assert!(resource.is_local());
        assert!(
            resource.exported.is_zero(),
            "deleting {id} with {count} loans outstanding",
            count = resource.exported.get()
        );
        if let Some(handle) = resource.handle {
            self.context.release_handle(&handle);
        }
        logwise::trace_sync!("deleted local resource {id}", id = id.0);
    }

    /**
    Returns delegated resources to the peer that owns them.

    Every resource must be idle.  Resources read by this process since their last token share a
    single new fence; if the owner wants verified tokens, unverified ones are verified in the same
    batch.  The mapping is forgotten as soon as the batch is handed to the owner's callback.
    */
    fn return_to_owner(&mut self, owner: PeerId, ids: Vec<ResourceId>) {
        if ids.is_empty() {
            return;
        }
        let Some(session) = self.peers.try_get_mut(owner) else {
            //owner already gone; its resources went with it
            for id in ids {
                self.registry.remove(id);
            }
            return;
        };
        if session.marked_for_deletion {
            for id in ids {
                self.registry.remove(id);
            }
            return;
        }
        let verify = session.needs_sync_tokens;

        let mut batcher = SyncTokenBatcher::new();
        for &id in &ids {
            let Some(resource) = self.registry.get(id) else {
                continue;
            };
            if resource.is_software || resource.lost {
                continue;
            }
            match resource.sync_token {
                _ if resource.needs_fence => batcher.needs_fence(id),
                Some(token) if verify && !token.is_verified() => batcher.needs_verification(id, token),
                _ => {}
            }
        }
        match batcher.flush(&mut self.context, verify) {
            Ok(assignments) => {
                for (id, token) in assignments {
                    if let Some(resource) = self.registry.get_mut(id) {
                        resource.sync_token = Some(token);
                        resource.needs_fence = false;
                    }
                }
            }
            Err(err) => {
                logwise::error_sync!(
                    "failed to synchronize returns to peer {peer}: {err}",
                    peer = owner.0,
                    err = logwise::privacy::LogIt(&err)
                );
                for &id in &ids {
                    if let Some(resource) = self.registry.get_mut(id) {
                        if !resource.is_software {
                            resource.lost = true;
                        }
                    }
                }
            }
        }

        let mut returns = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(resource) = self.registry.remove(id) else {
                continue;
            };
            let Origin::Delegated { peer, peer_resource_id } = resource.origin else {
                panic!("returning local resource {id} to peer {owner}");
            };
            debug_assert_eq!(peer, owner);
            assert!(resource.is_idle(), "returning {id} while still in use");
            self.peers.get_mut(owner).id_map.remove(&peer_resource_id);
            returns.push(ReturnDescriptor {
                id: peer_resource_id,
                count: resource.imported.get(),
                sync_token: if resource.is_software {
                    None
                } else {
                    resource.sync_token
                },
                lost: resource.lost,
            });
        }
        self.peers.get_mut(owner).send_returns(returns);
    }
}

