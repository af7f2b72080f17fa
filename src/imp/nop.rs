// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! A graphics context with no graphics.
//!
//! Handle names and fence release counts come from counters, so tokens are ordered and unique
//! but nothing is ever actually waited on.  The context records every call it receives, which
//! makes it useful for checking batching behavior.

use crate::context::{
    ContextError, GraphicsContext, HandleKind, HandleName, HandleRequest, TransferHandle,
};
use crate::sync_token::{CommandBufferNamespace, SyncToken};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
pub struct NopContext {
    context_id: u64,
    next_serial: u64,
    release_count: u64,
    supports_gpu: bool,
    lost: bool,
    live: HashSet<HandleName>,
    released: Vec<TransferHandle>,
    fences_inserted: usize,
    verify_calls: usize,
    waited: Vec<SyncToken>,
}

impl NopContext {
    /// A context that accepts both GPU and shared-memory handles.
    pub fn new() -> Self {
        NopContext {
            context_id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            next_serial: 1,
            release_count: 0,
            supports_gpu: true,
            lost: false,
            live: HashSet::new(),
            released: Vec::new(),
            fences_inserted: 0,
            verify_calls: 0,
            waited: Vec::new(),
        }
    }

    /// A context for a process without GPU access; GPU handles can't be received.
    pub fn without_gpu() -> Self {
        NopContext {
            supports_gpu: false,
            ..Self::new()
        }
    }

    /// Simulates losing the context.  Every later call fails with [ContextError::Lost].
    pub fn lose(&mut self) {
        self.lost = true;
    }

    pub fn context_id(&self) -> u64 {
        self.context_id
    }

    pub fn fences_inserted(&self) -> usize {
        self.fences_inserted
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls
    }

    /// Tokens passed to [GraphicsContext::wait_on_token], in order.
    pub fn waited_tokens(&self) -> &[SyncToken] {
        &self.waited
    }

    /// Handles passed to [GraphicsContext::release_handle], in order.
    pub fn released_handles(&self) -> &[TransferHandle] {
        &self.released
    }

    /// Handles materialized and not yet released.
    pub fn live_handle_count(&self) -> usize {
        self.live.len()
    }

    fn check_lost(&self) -> Result<(), ContextError> {
        if self.lost {
            Err(ContextError::Lost)
        } else {
            Ok(())
        }
    }
}

impl Default for NopContext {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsContext for NopContext {
    fn materialize_handle(&mut self, request: &HandleRequest) -> Result<TransferHandle, ContextError> {
        self.check_lost()?;
        if request.size.is_empty() || request.size.byte_len(request.format).is_none() {
            return Err(ContextError::UnsupportedSize(request.size));
        }
        let name = HandleName::from_serial(self.context_id, self.next_serial);
        self.next_serial += 1;
        let kind = if request.is_software {
            HandleKind::SharedMemory
        } else {
            HandleKind::Gpu
        };
        self.live.insert(name);
        Ok(TransferHandle { kind, name })
    }

    fn insert_fence(&mut self) -> Result<SyncToken, ContextError> {
        self.check_lost()?;
        self.fences_inserted += 1;
        self.release_count += 1;
        Ok(SyncToken::new(
            CommandBufferNamespace::Software,
            self.context_id,
            self.release_count,
        ))
    }

    fn verify_tokens(&mut self, tokens: &[SyncToken]) -> Result<Vec<SyncToken>, ContextError> {
        self.check_lost()?;
        self.verify_calls += 1;
        Ok(tokens.iter().map(|t| t.into_verified()).collect())
    }

    fn wait_on_token(&mut self, token: &SyncToken) -> Result<(), ContextError> {
        self.check_lost()?;
        self.waited.push(*token);
        Ok(())
    }

    fn release_handle(&mut self, handle: &TransferHandle) {
        assert!(
            self.live.remove(&handle.name),
            "handle {name} released twice or never materialized",
            name = handle.name
        );
        self.released.push(*handle);
    }

    fn supports_gpu_handles(&self) -> bool {
        self.supports_gpu
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel_formats::{PixelFormat, Size};

    fn request(is_software: bool) -> HandleRequest {
        HandleRequest {
            size: Size::new(8, 8),
            format: PixelFormat::Rgba8Unorm,
            is_software,
        }
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn contexts_mint_distinct_names() {
        let mut a = NopContext::new();
        let mut b = NopContext::new();
        let ha = a.materialize_handle(&request(false)).unwrap();
        let hb = b.materialize_handle(&request(true)).unwrap();
        assert_ne!(ha.name, hb.name);
        assert_eq!(ha.kind, HandleKind::Gpu);
        assert_eq!(hb.kind, HandleKind::SharedMemory);
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn fences_are_ordered() {
        let mut context = NopContext::new();
        let first = context.insert_fence().unwrap();
        let second = context.insert_fence().unwrap();
        assert!(second.release_count > first.release_count);
        assert_eq!(first.command_buffer_id, context.context_id());
        assert!(!first.is_verified());
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn lost_context_fails() {
        let mut context = NopContext::new();
        context.lose();
        assert!(matches!(context.insert_fence(), Err(ContextError::Lost)));
        assert!(matches!(
            context.materialize_handle(&request(false)),
            Err(ContextError::Lost)
        ));
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn empty_size_is_unsupported() {
        let mut context = NopContext::new();
        let request = HandleRequest {
            size: Size::new(0, 16),
            format: PixelFormat::Rgba8Unorm,
            is_software: true,
        };
        assert!(matches!(
            context.materialize_handle(&request),
            Err(ContextError::UnsupportedSize(size)) if size == Size::new(0, 16)
        ));
        assert_eq!(context.live_handle_count(), 0);
    }

    #[test]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    #[should_panic(expected = "released twice")]
    fn double_release_panics() {
        let mut context = NopContext::new();
        let handle = context.materialize_handle(&request(false)).unwrap();
        context.release_handle(&handle);
        context.release_handle(&handle);
    }
}
