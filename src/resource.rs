// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The resource record and its reference counts.
//!
//! A resource is either *local* (this process created the memory behind it) or *delegated*
//! (received from a peer; this process holds only a logical reference).  Local resources track
//! how many loans are outstanding to downstream peers.  Delegated resources additionally track how
//! many times the owning peer has handed them to us, which is exactly the count we owe back.
//!
//! Counts are [Count] values rather than bare integers so that the "never below zero" rule is
//! checked at the point of mutation.

use crate::context::TransferHandle;
use crate::descriptors::TransferDescriptor;
use crate::ids::{PeerId, ResourceId};
use crate::pixel_formats::{PixelFormat, Size};
use crate::sampler::FilterType;
use crate::sync_token::SyncToken;

/// Where a resource came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Created by this process.
    Local,
    /// Received from `peer`, which knows it as `peer_resource_id`.
    Delegated {
        peer: PeerId,
        peer_resource_id: ResourceId,
    },
}

impl Origin {
    pub const fn owning_peer(&self) -> Option<PeerId> {
        match self {
            Origin::Local => None,
            Origin::Delegated { peer, .. } => Some(*peer),
        }
    }
}

/// A non-negative reference count.
///
/// Releasing more than is outstanding means some party has lost track of its references, which
/// corrupts shared state; this panics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Count(u32);

impl Count {
    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn add(&mut self, n: u32) {
        self.0 = self.0.checked_add(n).expect("reference count overflow");
    }

    pub fn release(&mut self, n: u32, what: &str, id: ResourceId) {
        assert!(
            n <= self.0,
            "protocol violation: releasing {n} {what} of {id} with only {outstanding} outstanding",
            outstanding = self.0
        );
        self.0 -= n;
    }

    /// Drops every reference at once.  Only peer teardown may do this.
    pub fn force_release(&mut self, n: u32) {
        self.0 = self.0.saturating_sub(n);
    }
}

#[derive(Debug)]
pub(crate) struct Resource {
    pub id: ResourceId,
    pub origin: Origin,
    pub size: Size,
    pub format: PixelFormat,
    pub filter: FilterType,
    pub is_software: bool,
    pub handle: Option<TransferHandle>,
    pub sync_token: Option<SyncToken>,
    /// Set once this process has waited on `sync_token`.
    pub token_waited: bool,
    /// Work has been issued against the resource since `sync_token` was minted.
    pub needs_fence: bool,
    /// `sync_token` came back from a downstream peer and is owed upstream.
    pub forwarded: bool,
    pub imported: Count,
    pub exported: Count,
    pub read_locks: Count,
    pub marked_for_deletion: bool,
    pub lost: bool,
}

impl Resource {
    pub fn new_local(
        id: ResourceId,
        size: Size,
        format: PixelFormat,
        filter: FilterType,
        is_software: bool,
    ) -> Self {
        Resource {
            id,
            origin: Origin::Local,
            size,
            format,
            filter,
            is_software,
            handle: None,
            sync_token: None,
            token_waited: true,
            //content is drawn before the first export
            needs_fence: !is_software,
            forwarded: false,
            imported: Count::default(),
            exported: Count::default(),
            read_locks: Count::default(),
            marked_for_deletion: false,
            lost: false,
        }
    }

    pub fn new_delegated(id: ResourceId, peer: PeerId, descriptor: &TransferDescriptor) -> Self {
        let mut imported = Count::default();
        imported.add(1);
        Resource {
            id,
            origin: Origin::Delegated {
                peer,
                peer_resource_id: descriptor.peer_resource_id,
            },
            size: descriptor.size,
            format: descriptor.format,
            filter: descriptor.filter,
            is_software: descriptor.is_software,
            handle: Some(descriptor.handle),
            sync_token: descriptor.sync_token,
            token_waited: descriptor.sync_token.is_none(),
            needs_fence: false,
            forwarded: false,
            imported,
            exported: Count::default(),
            read_locks: Count::default(),
            marked_for_deletion: false,
            lost: false,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self.origin, Origin::Local)
    }

    /// Neither loaned downstream nor read locally.
    pub fn is_idle(&self) -> bool {
        self.exported.is_zero() && self.read_locks.is_zero()
    }

    /// Ready for the end of its life: released by its owner and referenced by nobody.
    pub fn is_reclaimable(&self) -> bool {
        self.marked_for_deletion && self.is_idle()
    }

    /// Records a downstream peer's release token for forwarding upstream.
    pub fn record_token(&mut self, token: SyncToken) {
        self.sync_token = Some(token);
        self.token_waited = false;
        self.forwarded = true;
    }

    /// A downstream release token that nothing in this process has waited on yet.
    ///
    /// There is one token slot; a second downstream release must not overwrite this one.
    pub fn pending_forwarded_token(&self) -> Option<SyncToken> {
        if self.forwarded && !self.token_waited {
            self.sync_token
        } else {
            None
        }
    }

    pub fn info(&self) -> ResourceInfo {
        ResourceInfo {
            id: self.id,
            origin: self.origin,
            size: self.size,
            format: self.format,
            filter: self.filter,
            is_software: self.is_software,
            handle: self.handle,
            sync_token: self.sync_token,
            imported_count: self.imported.get(),
            exported_count: self.exported.get(),
            read_lock_count: self.read_locks.get(),
            marked_for_deletion: self.marked_for_deletion,
            lost: self.lost,
        }
    }
}

/// Snapshot of a resource's bookkeeping, for callers and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub id: ResourceId,
    pub origin: Origin,
    pub size: Size,
    pub format: PixelFormat,
    pub filter: FilterType,
    pub is_software: bool,
    pub handle: Option<TransferHandle>,
    pub sync_token: Option<SyncToken>,
    pub imported_count: u32,
    pub exported_count: u32,
    pub read_lock_count: u32,
    pub marked_for_deletion: bool,
    pub lost: bool,
}
