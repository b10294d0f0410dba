//! Node data model and builder (C5, C6).
//!
//! A node declares the resources it reads and writes, tagged with the
//! canonical [`AccessState`] it touches them with, plus an optional pipeline
//! handle and the closure that records its commands. The builder validates
//! that `common_*` calls only ever see non-raster access states and that
//! `raster_*` calls only ever see raster ones, so a node can't accidentally
//! declare a dependency the barrier engine wouldn't actually synchronize
//! correctly.

use rg_rhi::AccessState;

use crate::descriptor_cache::FrameDescriptorCache;
use crate::handle::{ComputePipelineHandle, RasterPipelineHandle, ResourceId};
use crate::resolved::ResolvedResources;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

#[derive(Debug, Clone, Copy)]
pub struct NodeResourceUse {
    pub resource: ResourceId,
    pub access: AccessState,
}

pub type NodeExecuteFn = Box<dyn FnOnce(&mut dyn rg_rhi::CommandEncoder, &ResolvedResources, &mut FrameDescriptorCache) + Send>;

pub struct Node {
    pub name: String,
    pub id: NodeId,
    pub inputs: Vec<NodeResourceUse>,
    pub outputs: Vec<NodeResourceUse>,
    pub raster_pipeline: Option<RasterPipelineHandle>,
    pub compute_pipeline: Option<ComputePipelineHandle>,
    pub(crate) execute: Option<NodeExecuteFn>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .finish()
    }
}

/// Builds a single node. Obtained from `RenderGraph::add_node`; dropped
/// without calling `execute` silently discards the node (it is never pushed
/// into the graph), matching the "builder that must be finished to take
/// effect" pattern used elsewhere in the RHI (pipeline descriptors).
pub struct NodeBuilder<'g> {
    pub(crate) graph: &'g mut crate::graph::RenderGraph,
    pub(crate) name: String,
    pub(crate) inputs: Vec<NodeResourceUse>,
    pub(crate) outputs: Vec<NodeResourceUse>,
    pub(crate) raster_pipeline: Option<RasterPipelineHandle>,
    pub(crate) compute_pipeline: Option<ComputePipelineHandle>,
}

impl<'g> NodeBuilder<'g> {
    pub(crate) fn new(graph: &'g mut crate::graph::RenderGraph, name: impl Into<String>) -> Self {
        Self { graph, name: name.into(), inputs: Vec::new(), outputs: Vec::new(), raster_pipeline: None, compute_pipeline: None }
    }

    /// Declares a read with a non-raster access state (shader reads of
    /// uniform/storage/sampled resources, vertex/index/indirect buffer reads,
    /// transfer/host reads).
    pub fn common_read(mut self, resource: ResourceId, access: AccessState) -> Self {
        debug_assert!(access.is_common_read(), "common_read given a non-common-read access state: {access:?}");
        self.inputs.push(NodeResourceUse { resource, access });
        self
    }

    /// Declares a write with a non-raster access state (compute/any-shader
    /// writes, transfer writes, host writes). Bumps the resource's version in
    /// the registry immediately, so a caller still holding the pre-write
    /// handle trips `VersionMismatch` the next time it tries to use it.
    pub fn common_write(mut self, resource: ResourceId, access: AccessState) -> Self {
        debug_assert!(access.is_write() && !access.is_raster_write(), "common_write given a raster or non-write access state: {access:?}");
        let resource = self.graph.write(resource).expect("common_write given a stale or unknown resource handle");
        self.outputs.push(NodeResourceUse { resource, access });
        self
    }

    /// Declares a read via a color/depth-stencil input attachment.
    pub fn raster_read(mut self, resource: ResourceId, access: AccessState) -> Self {
        debug_assert!(access.is_raster_read(), "raster_read given a non-raster-read access state: {access:?}");
        self.inputs.push(NodeResourceUse { resource, access });
        self
    }

    /// Declares a write to a color/depth-stencil attachment. Bumps the
    /// resource's version the same way `common_write` does.
    pub fn raster_write(mut self, resource: ResourceId, access: AccessState) -> Self {
        debug_assert!(access.is_raster_write(), "raster_write given a non-raster-write access state: {access:?}");
        let resource = self.graph.write(resource).expect("raster_write given a stale or unknown resource handle");
        self.outputs.push(NodeResourceUse { resource, access });
        self
    }

    pub fn register_raster_pipeline(mut self, pipeline: RasterPipelineHandle) -> Self {
        self.raster_pipeline = Some(pipeline);
        self
    }

    pub fn register_compute_pipeline(mut self, pipeline: ComputePipelineHandle) -> Self {
        self.compute_pipeline = Some(pipeline);
        self
    }

    /// Finalizes the node with the closure that records its commands, and
    /// inserts it into the graph in authored order.
    pub fn execute<F>(self, f: F) -> NodeId
    where
        F: FnOnce(&mut dyn rg_rhi::CommandEncoder, &ResolvedResources, &mut FrameDescriptorCache) + Send + 'static,
    {
        self.graph.push_node(self.name, self.inputs, self.outputs, self.raster_pipeline, self.compute_pipeline, Box::new(f))
    }
}
