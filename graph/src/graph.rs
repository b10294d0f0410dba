//! `RenderGraph` (C5-C10): the public façade over the registry, resolver,
//! compiler, executor, and descriptor cache. An embedder declares this
//! frame's resources and nodes against a `RenderGraph`, then calls
//! `execute_frame` once per frame to compile and run everything that was
//! authored since the last call.

use std::sync::Arc;

use rg_rhi::cache::TransientCache;
use rg_rhi::config::GraphConfig;
use rg_rhi::{Buffer, BufferDescriptor, Device, RhiError, Swapchain, Texture, TextureDescriptor};

use crate::compiler;
use crate::descriptor_cache::{FrameDescriptorCache, DEFAULT_MAX_DESCRIPTOR_SETS_PER_FRAME};
use crate::error::GraphError;
use crate::executor::{self, AccessTimeline};
use crate::handle::{ComputePipelineHandle, RasterPipelineHandle, ResourceId, ResourceKind};
use crate::node::{Node, NodeBuilder, NodeExecuteFn, NodeId, NodeResourceUse};
use crate::registry::{CompiledResource, ResourceRegistry};

pub struct RenderGraph {
    device: Arc<dyn Device>,
    registry: ResourceRegistry,
    nodes: Vec<Node>,
    next_node_id: u32,
    buffer_cache: TransientCache<Box<dyn Buffer>>,
    texture_cache: TransientCache<Box<dyn Texture>>,
    /// The most recently declared presentation target, if any (C10). Only one
    /// can be live per frame; declaring a new one replaces it.
    present_resource: Option<ResourceId>,
}

impl RenderGraph {
    pub fn new(device: Arc<dyn Device>, config: GraphConfig) -> Self {
        Self {
            device,
            registry: ResourceRegistry::new(),
            nodes: Vec::new(),
            next_node_id: 0,
            buffer_cache: TransientCache::new(config.transient_cache_evict_after_frames),
            texture_cache: TransientCache::new(config.transient_cache_evict_after_frames),
            present_resource: None,
        }
    }

    /// Declares a buffer that lives only for the frame it's used in, pulled
    /// from (or released back to) the transient cache across frames.
    pub fn create_transient_buffer(&mut self, desc: BufferDescriptor) -> ResourceId {
        self.registry.declare_transient(ResourceKind::Buffer(desc))
    }

    /// Declares a texture that lives only for the frame it's used in.
    pub fn create_transient_texture(&mut self, desc: TextureDescriptor) -> ResourceId {
        self.registry.declare_transient(ResourceKind::Texture(desc))
    }

    /// Imports an engine-owned buffer under a stable name, reusing the same
    /// slot (and version sequence) across frames if `name` was already
    /// imported before.
    pub fn import_buffer(&mut self, name: &str, resource: Box<dyn Buffer>) -> ResourceId {
        let desc = resource.descriptor().clone();
        self.registry.import_named(name, ResourceKind::Buffer(desc), Some(CompiledResource::Buffer(resource)))
    }

    /// Imports an engine-owned texture under a stable name.
    pub fn import_texture(&mut self, name: &str, resource: Box<dyn Texture>) -> ResourceId {
        let desc = resource.descriptor().clone();
        self.registry.import_named(name, ResourceKind::Texture(desc), Some(CompiledResource::Texture(resource)))
    }

    /// Declares the resource a present node writes to, leaving its compiled
    /// slot empty until the executor's present phase binds it to whatever
    /// image the swapchain hands back from `acquire_next_image` (C10).
    pub fn import_presentation_target(&mut self, name: &str, desc: TextureDescriptor) -> ResourceId {
        let id = self.registry.import_named(name, ResourceKind::Texture(desc), Some(CompiledResource::PendingPresent));
        self.present_resource = Some(id);
        id
    }

    /// Bumps `id`'s version after a node writes it, returning the new handle
    /// later reads/writes must use.
    pub fn write(&mut self, id: ResourceId) -> Result<ResourceId, GraphError> {
        self.registry.bump_version(id)
    }

    pub fn add_node(&mut self, name: impl Into<String>) -> NodeBuilder<'_> {
        NodeBuilder::new(self, name)
    }

    pub(crate) fn push_node(
        &mut self,
        name: String,
        inputs: Vec<NodeResourceUse>,
        outputs: Vec<NodeResourceUse>,
        raster_pipeline: Option<RasterPipelineHandle>,
        compute_pipeline: Option<ComputePipelineHandle>,
        execute: NodeExecuteFn,
    ) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        self.nodes.push(Node { name, id, inputs, outputs, raster_pipeline, compute_pipeline, execute: Some(execute) });
        id
    }

    /// Compiles and runs every node authored since the previous call, then
    /// retires the frame: resolves lifetimes (C7), compiles (C8) — aborting
    /// before any mutation if a registered pipeline isn't ready yet — runs
    /// the barrier-engine executor (C9), and if any node targets the
    /// presentation resource, acquires a swapchain image, runs the present
    /// pass, transitions it, submits, and presents (C10). `swapchain` may be
    /// `None` for graphs that never present (e.g. offscreen/headless render
    /// passes); omitting it while a present node was authored is a
    /// validation error.
    pub fn execute_frame(&mut self, swapchain: Option<&mut dyn Swapchain>) -> Result<(), GraphError> {
        self.device.begin_frame()?;

        let nodes = std::mem::take(&mut self.nodes);
        crate::resolver::resolve_lifetimes(&nodes, &mut self.registry);

        let compiled = compiler::compile(nodes, &mut self.registry, self.device.as_ref(), &mut self.buffer_cache, &mut self.texture_cache)?;

        let total = compiled.nodes.len();
        let present_count = compiled.present_node_indices.len();
        let split = total - present_count;
        let mut all_nodes = compiled.nodes;

        let pool = self.device.create_descriptor_pool(DEFAULT_MAX_DESCRIPTOR_SETS_PER_FRAME)?;
        let mut descriptor_cache = FrameDescriptorCache::new(pool);
        let mut encoder = self.device.create_command_encoder();
        let mut timeline = AccessTimeline::new();

        let command_buffer;
        if present_count == 0 {
            executor::pre_transition_resources(encoder.as_mut(), &all_nodes, &self.registry, &mut timeline, None)?;

            let (execute_slice, _) = all_nodes.split_at_mut(split);
            executor::run_nodes(encoder.as_mut(), execute_slice, &self.registry, &mut descriptor_cache, &mut timeline)?;

            command_buffer = encoder.finish();
            self.device.queue().submit(&[command_buffer.as_ref()], &[], &[], None)?;
        } else {
            let present_id = self
                .present_resource
                .ok_or_else(|| GraphError::Rhi(RhiError::ValidationFailure("graph compiled present node(s) but no presentation target was ever declared".into())))?;
            let swapchain = swapchain
                .ok_or_else(|| GraphError::Rhi(RhiError::ValidationFailure("graph compiled present node(s) but no swapchain was supplied".into())))?;

            let frame = swapchain.acquire_next_image()?;
            let image_index = frame.image_index;
            let texture = frame.texture;
            let acquire_semaphore = frame.acquire_semaphore;
            let render_complete_semaphore = frame.render_complete_semaphore;

            executor::pre_transition_resources(encoder.as_mut(), &all_nodes, &self.registry, &mut timeline, Some((present_id, texture)))?;

            let (execute_slice, present_slice) = all_nodes.split_at_mut(split);
            executor::run_nodes(encoder.as_mut(), execute_slice, &self.registry, &mut descriptor_cache, &mut timeline)?;
            executor::run_present_nodes(encoder.as_mut(), present_slice, &self.registry, &mut descriptor_cache, &mut timeline, present_id, texture)?;
            executor::transition_to_present(encoder.as_mut(), &mut timeline, present_id, texture);

            command_buffer = encoder.finish();
            self.device.queue().submit(&[command_buffer.as_ref()], &[acquire_semaphore], &[render_complete_semaphore], None)?;
            swapchain.present(image_index)?;
        }

        descriptor_cache.reset()?;

        for (hash, resource) in self.registry.retire() {
            match resource {
                CompiledResource::Buffer(b) => self.buffer_cache.release(hash, b),
                CompiledResource::Texture(t) => self.texture_cache.release(hash, t),
                CompiledResource::PendingPresent => {}
            }
        }
        self.buffer_cache.advance_frame();
        self.texture_cache.advance_frame();
        self.device.end_frame();

        Ok(())
    }
}

#[cfg(test)]
impl RenderGraph {
    pub(crate) fn buffer_cache_idle_count(&self) -> usize {
        self.buffer_cache.idle_count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use rg_rhi::{AccessState, BufferDescriptor, BufferUsage, MemoryUsage, PixelFormat, RhiError, TextureDescriptor, TextureUsage};

    use super::*;
    use crate::error::GraphError;
    use crate::handle::PipelineSlot;
    use crate::mock::{MockDevice, MockRasterPipeline, MockSwapchain};

    #[test]
    fn single_raster_pass_runs_full_barrier_and_present_sequence() {
        let device = Arc::new(MockDevice::default());
        let mut graph = RenderGraph::new(device.clone(), GraphConfig::default());
        let present_id = graph.import_presentation_target("backbuffer", TextureDescriptor::texture_2d(800, 600, PixelFormat::Bgra8Unorm, TextureUsage::COLOR));
        graph.add_node("forward").raster_write(present_id, AccessState::ColorAttachmentWrite).execute(|_enc, _res, _desc| {});

        let mut swapchain = MockSwapchain::new((800, 600));
        graph.execute_frame(Some(&mut swapchain)).expect("frame with one raster node should compile and run");

        assert_eq!(swapchain.acquire_count.load(Ordering::Relaxed), 1);
        assert_eq!(swapchain.present_count.load(Ordering::Relaxed), 1);
        assert_eq!(device.queue.submit_count.load(Ordering::Relaxed), 1);
        assert_eq!(device.begin_frame_count.load(Ordering::Relaxed), 1);
        assert_eq!(device.end_frame_count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn frame_with_no_present_node_never_touches_the_swapchain() {
        let device = Arc::new(MockDevice::default());
        let mut graph = RenderGraph::new(device.clone(), GraphConfig::default());
        let buffer = graph.create_transient_buffer(BufferDescriptor::new(256, BufferUsage::STORAGE, MemoryUsage::GpuOnly));
        graph.add_node("compute").common_write(buffer, AccessState::ComputeShaderWrite).execute(|_enc, _res, _desc| {});

        graph.execute_frame(None).expect("headless frame should not require a swapchain");
        assert_eq!(device.queue.submit_count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn transient_buffer_is_reused_then_evicted_after_idle_frames() {
        let device = Arc::new(MockDevice::default());
        let mut graph = RenderGraph::new(device, GraphConfig::default());
        let desc = BufferDescriptor::new(256, BufferUsage::STORAGE, MemoryUsage::GpuOnly);

        for _ in 0..2 {
            let id = graph.create_transient_buffer(desc.clone());
            graph.add_node("compute").common_write(id, AccessState::ComputeShaderWrite).execute(|_enc, _res, _desc| {});
            graph.execute_frame(None).unwrap();
        }
        assert_eq!(graph.buffer_cache_idle_count(), 1, "the buffer released at retire() should sit in the free list");

        // Three more idle frames push it past the default eviction threshold.
        for _ in 0..3 {
            graph.execute_frame(None).unwrap();
        }
        assert_eq!(graph.buffer_cache_idle_count(), 0, "an idle entry untouched for evict_after_frames should be gone by F5");
    }

    #[test]
    fn unresolved_pipeline_aborts_before_touching_the_swapchain_then_succeeds_on_retry() {
        let device = Arc::new(MockDevice::default());
        let mut graph = RenderGraph::new(device, GraphConfig::default());
        let present_id = graph.import_presentation_target("backbuffer", TextureDescriptor::texture_2d(64, 64, PixelFormat::Bgra8Unorm, TextureUsage::COLOR));
        let slot = PipelineSlot::<dyn rg_rhi::RasterPipeline>::pending();

        graph
            .add_node("forward")
            .raster_write(present_id, AccessState::ColorAttachmentWrite)
            .register_raster_pipeline(slot.clone())
            .execute(|_enc, _res, _desc| {});

        let mut swapchain = MockSwapchain::new((64, 64));
        let err = graph.execute_frame(Some(&mut swapchain)).unwrap_err();
        assert!(matches!(err, GraphError::Rhi(RhiError::NotReady(_))));
        assert_eq!(swapchain.acquire_count.load(Ordering::Relaxed), 0, "compile must fail before the present phase acquires a frame");

        slot.resolve(Arc::new(MockRasterPipeline::new(1)));
        // raster_write already bumped the presentation target's version on the
        // first (failed) attempt; re-declare it for the retry the same way an
        // embedder re-declares every resource it touches each frame.
        let present_id = graph.import_presentation_target("backbuffer", TextureDescriptor::texture_2d(64, 64, PixelFormat::Bgra8Unorm, TextureUsage::COLOR));
        graph
            .add_node("forward")
            .raster_write(present_id, AccessState::ColorAttachmentWrite)
            .register_raster_pipeline(slot)
            .execute(|_enc, _res, _desc| {});
        graph.execute_frame(Some(&mut swapchain)).expect("retry after the pipeline resolves should succeed");
        assert_eq!(swapchain.acquire_count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn writing_a_stale_resource_handle_trips_version_mismatch() {
        let device = Arc::new(MockDevice::default());
        let mut graph = RenderGraph::new(device, GraphConfig::default());
        let buffer = graph.create_transient_buffer(BufferDescriptor::new(256, BufferUsage::STORAGE, MemoryUsage::GpuOnly));

        let bumped = graph.write(buffer).unwrap();
        assert_ne!(bumped.version(), buffer.version());

        let err = graph.write(buffer).unwrap_err();
        assert!(matches!(err, GraphError::VersionMismatch(id, stale, current) if id == buffer && stale == buffer.version() && current == bumped.version()));
    }
}
