// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Synchronization tokens and the batcher that mints them.
//!
//! A [SyncToken] names a point in some command stream.  Waiting on it orders later work after
//! everything submitted before that point.  A token is *verified* once the context has confirmed
//! the point is visible to other processes; only verified tokens may be handed to a peer that
//! asked for them.
//!
//! Verification is a synchronous round-trip to the context, so [SyncTokenBatcher] collects every
//! resource in a batch that needs synchronization and pays for at most one fence and one
//! verification call, regardless of how many resources are involved.

use crate::context::{ContextError, GraphicsContext};
use crate::ids::ResourceId;

/// Which kind of command stream a token refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandBufferNamespace {
    Gpu,
    Software,
    /// Minted by a context we know nothing about, e.g. forwarded from an upstream peer.
    Foreign,
}

impl CommandBufferNamespace {
    fn to_byte(self) -> u8 {
        match self {
            CommandBufferNamespace::Gpu => 0,
            CommandBufferNamespace::Software => 1,
            CommandBufferNamespace::Foreign => 2,
        }
    }
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(CommandBufferNamespace::Gpu),
            1 => Some(CommandBufferNamespace::Software),
            2 => Some(CommandBufferNamespace::Foreign),
            _ => None,
        }
    }
}

/// Proof that work up to `release_count` on a command buffer has been ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyncToken {
    pub namespace: CommandBufferNamespace,
    pub command_buffer_id: u64,
    pub release_count: u64,
    verified: bool,
}

/// Length of [SyncToken::to_bytes].
pub const SYNC_TOKEN_BYTES: usize = 18;

impl SyncToken {
    /// Creates an unverified token.
    pub const fn new(namespace: CommandBufferNamespace, command_buffer_id: u64, release_count: u64) -> Self {
        SyncToken {
            namespace,
            command_buffer_id,
            release_count,
            verified: false,
        }
    }

    pub const fn is_verified(&self) -> bool {
        self.verified
    }

    /// Marks the token verified.  Intended for [GraphicsContext::verify_tokens] implementations.
    pub const fn into_verified(mut self) -> Self {
        self.verified = true;
        self
    }

    pub fn to_bytes(&self) -> [u8; SYNC_TOKEN_BYTES] {
        let mut out = [0u8; SYNC_TOKEN_BYTES];
        out[0] = self.namespace.to_byte();
        out[1] = self.verified as u8;
        out[2..10].copy_from_slice(&self.command_buffer_id.to_le_bytes());
        out[10..18].copy_from_slice(&self.release_count.to_le_bytes());
        out
    }

    /// Parses the wire encoding.  Returns `None` for an unknown namespace or verified byte.
    pub fn from_bytes(bytes: &[u8; SYNC_TOKEN_BYTES]) -> Option<Self> {
        let namespace = CommandBufferNamespace::from_byte(bytes[0])?;
        let verified = match bytes[1] {
            0 => false,
            1 => true,
            _ => return None,
        };
        let mut command_buffer_id = [0u8; 8];
        command_buffer_id.copy_from_slice(&bytes[2..10]);
        let mut release_count = [0u8; 8];
        release_count.copy_from_slice(&bytes[10..18]);
        Some(SyncToken {
            namespace,
            command_buffer_id: u64::from_le_bytes(command_buffer_id),
            release_count: u64::from_le_bytes(release_count),
            verified,
        })
    }
}

/**
Coalesces synchronization requests for a batch of resources.

Resources enter the batcher in one of two ways:

* [SyncTokenBatcher::needs_fence]: the resource has had work issued against it since its last
  token, so it needs a new fence.  Every such resource shares a single fence.
* [SyncTokenBatcher::needs_verification]: the resource already has a token, but it is not
  verified yet.

[SyncTokenBatcher::flush] then performs at most one [GraphicsContext::insert_fence] and at most one
[GraphicsContext::verify_tokens] and reports the token each resource should carry.
*/
#[derive(Debug, Default)]
pub(crate) struct SyncTokenBatcher {
    needs_fence: Vec<ResourceId>,
    unverified: Vec<(ResourceId, SyncToken)>,
}

impl SyncTokenBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn needs_fence(&mut self, id: ResourceId) {
        self.needs_fence.push(id);
    }

    pub fn needs_verification(&mut self, id: ResourceId, token: SyncToken) {
        debug_assert!(!token.is_verified());
        self.unverified.push((id, token));
    }

    pub fn is_empty(&self) -> bool {
        self.needs_fence.is_empty() && self.unverified.is_empty()
    }

    /**
    Issues the batched fence and verification.

    When `verify` is false, the fence is still inserted but tokens are reported unverified; this
    is used for peers that don't require verified tokens.

    On error, no resource in the batch has been assigned a token.
    */
    pub fn flush<C: GraphicsContext + ?Sized>(
        self,
        context: &mut C,
        verify: bool,
    ) -> Result<Vec<(ResourceId, SyncToken)>, ContextError> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let fence = if self.needs_fence.is_empty() {
            None
        } else {
            Some(context.insert_fence()?)
        };
        let mut pending: Vec<SyncToken> = Vec::new();
        if verify {
            pending.extend(self.unverified.iter().map(|(_, token)| *token));
        }
        pending.extend(fence);

        let tokens = if verify && !pending.is_empty() {
            let _interval = logwise::perfwarn_begin!("verify_sync_tokens");
            logwise::trace_sync!(
                "verifying {count} sync tokens in one batch",
                count = pending.len()
            );
            let verified = context.verify_tokens(&pending)?;
            assert_eq!(
                verified.len(),
                pending.len(),
                "verify_tokens must return one token per input"
            );
            verified
        } else {
            pending
        };

        let mut assignments = Vec::with_capacity(self.unverified.len() + self.needs_fence.len());
        if verify {
            assignments.extend(
                self.unverified
                    .iter()
                    .zip(tokens.iter())
                    .map(|((id, _), token)| (*id, *token)),
            );
            if fence.is_some() {
                let fence = tokens[tokens.len() - 1];
                assignments.extend(self.needs_fence.iter().map(|id| (*id, fence)));
            }
        } else {
            assignments.extend(self.unverified.iter().copied());
            if let Some(fence) = tokens.last() {
                assignments.extend(self.needs_fence.iter().map(|id| (*id, *fence)));
            }
        }
        Ok(assignments)
    }
}
