// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Messages exchanged with peers.
//!
//! This crate only builds and consumes these; moving them between processes is the job of the
//! messaging layer.

use crate::context::TransferHandle;
use crate::ids::ResourceId;
use crate::pixel_formats::{PixelFormat, Size};
use crate::sampler::FilterType;
use crate::sync_token::SyncToken;

/// Producer → consumer: "you may read this resource".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDescriptor {
    /// The resource's id in the producing process.
    pub peer_resource_id: ResourceId,
    pub handle: TransferHandle,
    /// Consumers must wait on this before reading.  Absent for software resources.
    pub sync_token: Option<SyncToken>,
    pub size: Size,
    pub format: PixelFormat,
    pub is_software: bool,
    pub filter: FilterType,
}

/// Consumer → producer: "I am done with `count` of the loans you gave me".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnDescriptor {
    /// The resource's id as the producer knows it.
    pub id: ResourceId,
    /// Number of loans released at once; at least 1.
    pub count: u32,
    /// Producers must wait on this before writing to the resource again.
    pub sync_token: Option<SyncToken>,
    pub lost: bool,
}

impl TransferDescriptor {
    /// A return that undoes this single transfer without the consumer ever having used it.
    pub fn to_unused_return(&self) -> ReturnDescriptor {
        ReturnDescriptor {
            id: self.peer_resource_id,
            count: 1,
            sync_token: self.sync_token,
            lost: false,
        }
    }
}
