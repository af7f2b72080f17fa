// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Builder pattern for provider configuration.

use super::ResourceProvider;
use crate::context::GraphicsContext;
use crate::peer::PeerTable;
use crate::registry::ResourceRegistry;

/// Builder for [ResourceProvider].
///
/// ```
/// use surface_transfer::imp::nop::NopContext;
/// use surface_transfer::provider::ProviderBuilder;
///
/// let provider = ProviderBuilder::new(NopContext::new())
///     .with_debug_name("display compositor")
///     .with_default_needs_sync_tokens(false)
///     .build();
/// assert_eq!(provider.debug_name(), "display compositor");
/// ```
pub struct ProviderBuilder<C> {
    context: C,
    debug_name: String,
    default_needs_sync_tokens: bool,
}

impl<C: GraphicsContext> ProviderBuilder<C> {
    /// Create a new builder around the context the provider will use.
    pub fn new(context: C) -> Self {
        Self {
            context,
            debug_name: "resource provider".to_string(),
            default_needs_sync_tokens: true,
        }
    }

    /// Set the name used in log messages.
    pub fn with_debug_name(mut self, debug_name: &str) -> Self {
        self.debug_name = debug_name.to_string();
        self
    }

    /// Set whether newly created peers require verified sync tokens on returns.
    ///
    /// Individual peers can be changed later with [ResourceProvider::set_needs_sync_tokens].
    pub fn with_default_needs_sync_tokens(mut self, needs_sync_tokens: bool) -> Self {
        self.default_needs_sync_tokens = needs_sync_tokens;
        self
    }

    /// Get the debug name.
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    pub fn build(self) -> ResourceProvider<C> {
        ResourceProvider {
            context: self.context,
            registry: ResourceRegistry::new(),
            peers: PeerTable::new(),
            default_needs_sync_tokens: self.default_needs_sync_tokens,
            debug_name: self.debug_name,
        }
    }
}
