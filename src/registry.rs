// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The process-local table of resources.

Ids are allocated monotonically and never reused, so a stale id held by a peer or a late message
can only ever miss; it can't alias a newer resource.
*/

use crate::ids::ResourceId;
use crate::resource::Resource;
use std::collections::HashMap;

#[derive(Debug)]
pub(crate) struct ResourceRegistry {
    resources: HashMap<ResourceId, Resource>,
    next_id: u32,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        ResourceRegistry {
            resources: HashMap::new(),
            //0 is never handed out so that it can't be mistaken for a default-initialized id
            next_id: 1,
        }
    }

    /// Returns an id that has never been returned before.
    pub fn allocate(&mut self) -> ResourceId {
        let id = self.next_id;
        self.next_id = self
            .next_id
            .checked_add(1)
            .expect("resource id space exhausted");
        ResourceId(id)
    }

    pub fn insert(&mut self, resource: Resource) {
        let id = resource.id;
        assert!(id.0 < self.next_id, "inserting unallocated id {id}");
        let prior = self.resources.insert(id, resource);
        assert!(prior.is_none(), "id {id} inserted twice");
    }

    pub fn get(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(&id)
    }

    pub fn get_mut(&mut self, id: ResourceId) -> Option<&mut Resource> {
        self.resources.get_mut(&id)
    }

    pub fn remove(&mut self, id: ResourceId) -> Option<Resource> {
        self.resources.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.resources.keys().copied()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Resource> {
        self.resources.values_mut()
    }
}
