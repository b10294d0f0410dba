//! View over materialized resources handed to a node's execution closure.
//! Node closures never see the registry directly — only the concrete RHI
//! objects for the resources they declared, looked up by id.

use std::collections::HashMap;

use rg_rhi::{Buffer, Texture};

use crate::error::GraphError;
use crate::handle::ResourceId;

pub struct ResolvedResources<'a> {
    pub(crate) buffers: HashMap<ResourceId, &'a dyn Buffer>,
    pub(crate) textures: HashMap<ResourceId, &'a dyn Texture>,
}

impl<'a> ResolvedResources<'a> {
    pub(crate) fn new() -> Self {
        Self { buffers: HashMap::new(), textures: HashMap::new() }
    }

    pub fn buffer(&self, id: ResourceId) -> Result<&'a dyn Buffer, GraphError> {
        self.buffers.get(&id).copied().ok_or(GraphError::UnknownResource(id))
    }

    pub fn texture(&self, id: ResourceId) -> Result<&'a dyn Texture, GraphError> {
        self.textures.get(&id).copied().ok_or(GraphError::UnknownResource(id))
    }
}
