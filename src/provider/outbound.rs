// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The producer half of the protocol: lending resources to a peer and reclaiming them when they
//! come back.

use super::ResourceProvider;
use crate::context::GraphicsContext;
use crate::descriptors::{ReturnDescriptor, TransferDescriptor};
use crate::error::Error;
use crate::ids::{PeerId, ResourceId};
use crate::resource::Origin;
use crate::sync_token::SyncTokenBatcher;
use std::collections::HashSet;

/// Result of [ResourceProvider::export].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExportOutcome {
    /// Hand these to the messaging layer for delivery to the peer.
    pub descriptors: Vec<TransferDescriptor>,
    /// Requested resources that were not exported because they are lost.
    pub lost: Vec<ResourceId>,
}

impl<C: GraphicsContext> ResourceProvider<C> {
    /**
    Lends resources to `peer`.

    Handles are materialized on first export.  Every GPU resource that needs a fence shares one
    fence, and every unverified token in the batch is verified in one round-trip with it, so this
    blocks on the context at most once per call.

    Each id exported adds one loan; an id may appear more than once.  Lost resources, including
    any that become lost because the context fails during this call, are skipped and listed in
    [ExportOutcome::lost].

    Fails without side effects if any id is unknown, or names a local resource already passed to
    [ResourceProvider::release].

    # Panics
    If `peer` is unknown.
    */
    pub fn export(&mut self, peer: PeerId, ids: &[ResourceId]) -> Result<ExportOutcome, Error> {
        assert!(
            !self.peers.get(peer).marked_for_deletion,
            "exporting to peer {peer} during its teardown"
        );
        for &id in ids {
            match self.registry.get(id) {
                None => return Err(Error::NoSuchResource(id)),
                Some(resource) if resource.origin == Origin::Local && resource.marked_for_deletion => {
                    return Err(Error::Released(id));
                }
                Some(_) => {}
            }
        }

        let mut lost: Vec<ResourceId> = Vec::new();
        let mut seen = HashSet::new();
        for &id in ids {
            if !seen.insert(id) {
                continue;
            }
            let already_lost = self.registry.get(id).is_some_and(|r| r.lost);
            if already_lost {
                lost.push(id);
                continue;
            }
            if let Err(err) = self.ensure_handle(id) {
                logwise::error_sync!(
                    "failed to materialize {id}: {err}",
                    id = id.0,
                    err = logwise::privacy::LogIt(&err)
                );
                if let Some(resource) = self.registry.get_mut(id) {
                    resource.lost = true;
                }
                lost.push(id);
            }
        }

        let mut batcher = SyncTokenBatcher::new();
        let mut synchronized = Vec::new();
        for &id in seen.iter() {
            let Some(resource) = self.registry.get(id) else {
                continue;
            };
            if resource.lost || resource.is_software {
                continue;
            }
            match resource.sync_token {
                Some(token) if !resource.needs_fence => {
                    if !token.is_verified() {
                        batcher.needs_verification(id, token);
                        synchronized.push(id);
                    }
                }
                _ => {
                    batcher.needs_fence(id);
                    synchronized.push(id);
                }
            }
        }
        match batcher.flush(&mut self.context, true) {
            Ok(assignments) => {
                for (id, token) in assignments {
                    if let Some(resource) = self.registry.get_mut(id) {
                        if resource.needs_fence || resource.sync_token.is_none() {
                            //our own fence; nothing further to wait on
                            resource.token_waited = true;
                            resource.forwarded = false;
                        }
                        resource.sync_token = Some(token);
                        resource.needs_fence = false;
                    }
                }
            }
            Err(err) => {
                logwise::error_sync!(
                    "failed to synchronize export to peer {peer}: {err}",
                    peer = peer.0,
                    err = logwise::privacy::LogIt(&err)
                );
                for id in synchronized {
                    if let Some(resource) = self.registry.get_mut(id) {
                        resource.lost = true;
                    }
                    lost.push(id);
                }
            }
        }
        lost.sort();
        lost.dedup();
        if !lost.is_empty() {
            logwise::warn_sync!(
                "skipping {count} lost resources in export to peer {peer}",
                count = lost.len(),
                peer = peer.0
            );
        }

        let session = self.peers.get_mut(peer);
        let mut descriptors = Vec::with_capacity(ids.len());
        for &id in ids {
            if lost.binary_search(&id).is_ok() {
                continue;
            }
            let resource = self
                .registry
                .get_mut(id)
                .unwrap_or_else(|| panic!("{id} vanished during export"));
            let handle = resource
                .handle
                .unwrap_or_else(|| panic!("{id} exported without a handle"));
            resource.exported.add(1);
            session.add_loan(id);
            descriptors.push(TransferDescriptor {
                peer_resource_id: id,
                handle,
                sync_token: if resource.is_software {
                    None
                } else {
                    resource.sync_token
                },
                size: resource.size,
                format: resource.format,
                is_software: resource.is_software,
                filter: resource.filter,
            });
        }
        logwise::trace_sync!(
            "exported {count} resources to peer {peer}",
            count = descriptors.len(),
            peer = peer.0
        );
        Ok(ExportOutcome { descriptors, lost })
    }

    /**
    Processes resources `peer` has handed back.

    Returns for resources that no longer exist are ignored: the resource's owner may have been
    torn down while the return was in flight.  Otherwise the returned loans are released, and the
    return's token is waited on (for our own resources, so we don't overwrite them under the
    peer's reads) or recorded (for delegated resources, to pass upstream).

    Released resources with no loans left are deleted, or returned to their owner if delegated.

    # Panics
    If `peer` is unknown, if a return has a zero count, or if `peer` returns more loans of a
    resource than it holds.
    */
    pub fn process_returns(&mut self, peer: PeerId, returns: &[ReturnDescriptor]) {
        let session = self.peers.get_mut(peer);
        let mut reclaim = Vec::new();
        for ret in returns {
            assert!(
                ret.count >= 1,
                "protocol violation: peer {peer} returned {id} with a zero count",
                id = ret.id
            );
            let Some(resource) = self.registry.get_mut(ret.id) else {
                logwise::trace_sync!(
                    "ignoring return of deleted {id} from peer {peer}",
                    id = ret.id.0,
                    peer = peer.0
                );
                session.loans.remove(&ret.id);
                continue;
            };
            session.release_loans(ret.id, ret.count);
            resource.exported.release(ret.count, "loans", ret.id);
            resource.lost |= ret.lost;

            if let Some(token) = ret.sync_token {
                if !resource.is_software && !resource.lost {
                    let earlier = resource.pending_forwarded_token();
                    let must_wait = match resource.origin {
                        Origin::Local => true,
                        //our own reads still need a fence; order it after the peer's
                        Origin::Delegated { .. } => {
                            resource.needs_fence || !resource.read_locks.is_zero() || earlier.is_some()
                        }
                    };
                    if must_wait {
                        //another downstream release is already owed upstream; one token can't
                        //carry both, so wait on each here and fence after them
                        let waits = earlier.into_iter().chain(std::iter::once(token));
                        for wait in waits {
                            if let Err(err) = self.context.wait_on_token(&wait) {
                                logwise::error_sync!(
                                    "failed to wait on returned token for {id}: {err}",
                                    id = ret.id.0,
                                    err = logwise::privacy::LogIt(&err)
                                );
                                resource.lost = true;
                                break;
                            }
                        }
                        if earlier.is_some() {
                            logwise::trace_sync!(
                                "merged downstream releases of {id} behind a local fence",
                                id = ret.id.0
                            );
                            resource.token_waited = true;
                            resource.forwarded = false;
                            resource.needs_fence = true;
                        }
                    } else {
                        resource.record_token(token);
                    }
                }
            }

            if resource.is_reclaimable() {
                reclaim.push(ret.id);
            }
        }
        reclaim.sort();
        reclaim.dedup();
        self.reclaim(reclaim);
    }
}
