// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The graphics-context collaborator.
//!
//! The transfer protocol never draws.  It needs a handful of capabilities from whatever owns the
//! GPU (or the shared-memory allocator, for software surfaces): minting transferable handles,
//! inserting fences, verifying tokens, and waiting on tokens.  [GraphicsContext] is the seam.
//!
//! Backends live in [crate::imp].

use crate::pixel_formats::{PixelFormat, Size};
use crate::sync_token::SyncToken;
use std::fmt::{Display, Formatter};

/// Name of a transferable buffer.  Opaque to this crate; meaningful to the context that minted
/// it and to any context it is handed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleName(pub [u8; 16]);

impl HandleName {
    /// Builds a name from a context-unique serial.  Contexts that have nothing better to put in
    /// a name use this.
    pub fn from_serial(namespace: u64, serial: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&namespace.to_le_bytes());
        bytes[8..].copy_from_slice(&serial.to_le_bytes());
        HandleName(bytes)
    }
}

impl Display for HandleName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// What sort of memory stands behind a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// A GPU texture; requires a graphics context on the receiving side.
    Gpu,
    /// A shared-memory bitmap; any process can map it.
    SharedMemory,
}

/// Opaque transferable reference standing in for the underlying buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferHandle {
    pub kind: HandleKind,
    pub name: HandleName,
}

/// Everything a context needs to know to back a resource with memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleRequest {
    pub size: Size,
    pub format: PixelFormat,
    pub is_software: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("graphics context lost")]
    Lost,
    #[error("no handle named {0}")]
    UnknownHandle(HandleName),
    #[error("can't back a {}x{} surface", .0.width, .0.height)]
    UnsupportedSize(Size),
    #[cfg(feature = "backend_wgpu")]
    #[error("No such adapter")]
    NoSuchAdapter,
    #[cfg(feature = "backend_wgpu")]
    #[error("{0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[cfg(feature = "backend_wgpu")]
    #[error("wgpu poll failed: {0}")]
    Poll(#[from] wgpu::PollError),
}

/// Capabilities consumed from the graphics context.
///
/// All methods are called from the single sequence that owns the
/// [crate::provider::ResourceProvider].  [GraphicsContext::verify_tokens] is the only method
/// permitted to block, and the provider batches calls so that it blocks at most once per export
/// or return batch.
pub trait GraphicsContext {
    /// Backs a resource with transferable memory.
    fn materialize_handle(&mut self, request: &HandleRequest) -> Result<TransferHandle, ContextError>;

    /// Inserts a fence after all previously issued work and returns an unverified token for it.
    fn insert_fence(&mut self) -> Result<SyncToken, ContextError>;

    /// Verifies every token in one round-trip.  The result has the same length and order as the
    /// input, with every token marked verified.
    fn verify_tokens(&mut self, tokens: &[SyncToken]) -> Result<Vec<SyncToken>, ContextError>;

    /// Orders subsequent work on this context after `token`.
    fn wait_on_token(&mut self, token: &SyncToken) -> Result<(), ContextError>;

    /// Frees the memory behind a handle this context materialized.
    ///
    /// Called exactly once per deleted local resource.
    fn release_handle(&mut self, handle: &TransferHandle);

    /// Whether handles of kind [HandleKind::Gpu] can be used in this process.
    fn supports_gpu_handles(&self) -> bool {
        true
    }
}
