//! Resource and pipeline handles (C5).
//!
//! A [`ResourceId`] names a slot in the registry plus the version it was
//! bound at; `write()` bumps the slot's version so a node holding an older
//! version can be told its view of the resource is stale.

use std::sync::Arc;

use parking_lot::RwLock;

use rg_rhi::{BufferDescriptor, RasterPipeline, TextureDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ResourceId {
    pub(crate) index: u32,
    pub(crate) version: u32,
}

impl ResourceId {
    pub fn version(&self) -> u32 {
        self.version
    }
}

#[derive(Debug, Clone)]
pub enum ResourceKind {
    Buffer(BufferDescriptor),
    Texture(TextureDescriptor),
}

impl ResourceKind {
    pub fn descriptor_hash(&self) -> u64 {
        match self {
            ResourceKind::Buffer(d) => d.stable_hash(),
            ResourceKind::Texture(d) => d.stable_hash(),
        }
    }
}

/// A cell a pipeline is registered into, resolved asynchronously by whatever
/// owns shader compilation (out of scope here). The compiler (C8) treats an
/// unresolved slot as [`rg_rhi::RhiError::NotReady`] and aborts the frame
/// without having recorded anything, so the caller can simply retry next
/// frame.
pub struct PipelineSlot<P: ?Sized> {
    ready: RwLock<Option<Arc<P>>>,
}

impl<P: ?Sized> PipelineSlot<P> {
    pub fn pending() -> Arc<Self> {
        Arc::new(Self { ready: RwLock::new(None) })
    }

    pub fn resolved(pipeline: Arc<P>) -> Arc<Self> {
        Arc::new(Self { ready: RwLock::new(Some(pipeline)) })
    }

    pub fn resolve(&self, pipeline: Arc<P>) {
        *self.ready.write() = Some(pipeline);
    }

    pub fn get(&self) -> Option<Arc<P>> {
        self.ready.read().clone()
    }
}

pub type RasterPipelineHandle = Arc<PipelineSlot<dyn RasterPipeline>>;
pub type ComputePipelineHandle = Arc<PipelineSlot<dyn rg_rhi::ComputePipeline>>;
