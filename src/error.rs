// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::context::ContextError;
use crate::ids::ResourceId;

/// Recoverable failures.
///
/// Protocol violations are not represented here; they panic.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no such resource {0}")]
    NoSuchResource(ResourceId),
    #[error("resource {0} was lost with its context")]
    ResourceLost(ResourceId),
    #[error("resource {0} is loaned to a peer and can't be written")]
    Exported(ResourceId),
    #[error("resource {0} was released by its owner")]
    Released(ResourceId),
    #[error("resource {0} is not owned by this process")]
    NotLocal(ResourceId),
    #[error("graphics context error {0}")]
    Context(#[from] ContextError),
}
