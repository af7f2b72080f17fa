// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Graphics-context backends.
//!
//! [nop] is always available; it has no GPU and is suitable for software-only processes and for
//! exercising the protocol.  [wgpu] is available with the `backend_wgpu` feature.

pub mod nop;

#[cfg(feature = "backend_wgpu")]
pub mod wgpu;
