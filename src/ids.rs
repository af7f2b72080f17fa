// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Identifier types.
//!
//! Both identifiers are plain integers on the wire.  They are wrapped in newtypes so that a
//! resource id from one process can't be confused with a peer id, although nothing prevents
//! confusing a resource id minted by *this* process with one minted by a peer.  Code that holds a
//! peer-minted id names it `peer_resource_id` by convention.

use std::fmt::{Display, Formatter};

/// Identifies a resource within the process that minted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u32);

/// Identifies a connected peer for the lifetime of its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u32);

impl Display for ResourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl Display for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "p{}", self.0)
    }
}
