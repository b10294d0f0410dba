//! GPU-less test doubles for the RHI traits (`MockDevice`/`MockBuffer`/
//! `MockTexture` and friends), so the graph's compiler, resolver, and barrier
//! engine can be exercised without a Vulkan context.
//!
//! `MockCommandEncoder` records every `pipeline_barrier` call it receives as
//! `(src, dst)` access-state pairs, which is what the scenario tests assert
//! against — these tests care about *which transitions the executor derived
//! and in what order*, not about any actual GPU side effect.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use rg_rhi::*;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> ResourceId {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug)]
pub struct MockBuffer {
    id: ResourceId,
    descriptor: BufferDescriptor,
}

impl Buffer for MockBuffer {
    fn id(&self) -> ResourceId {
        self.id
    }
    fn size(&self) -> u64 {
        self.descriptor.size
    }
    fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct MockTexture {
    id: ResourceId,
    descriptor: TextureDescriptor,
}

impl Texture for MockTexture {
    fn id(&self) -> ResourceId {
        self.id
    }
    fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct MockTextureView;
impl TextureView for MockTextureView {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct MockSampler;
impl Sampler for MockSampler {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct MockRasterPipeline {
    hash: u64,
}
impl MockRasterPipeline {
    pub fn new(hash: u64) -> Self {
        Self { hash }
    }
}
impl RasterPipeline for MockRasterPipeline {
    fn descriptor_hash(&self) -> u64 {
        self.hash
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct MockComputePipeline {
    hash: u64,
}
impl MockComputePipeline {
    pub fn new(hash: u64) -> Self {
        Self { hash }
    }
}
impl ComputePipeline for MockComputePipeline {
    fn descriptor_hash(&self) -> u64 {
        self.hash
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct MockFence {
    signaled: Mutex<bool>,
}
impl Fence for MockFence {
    fn wait(&self, _timeout_ns: u64) -> Result<(), RhiError> {
        Ok(())
    }
    fn reset(&self) -> Result<(), RhiError> {
        *self.signaled.lock().unwrap() = false;
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct MockSemaphore;
impl Semaphore for MockSemaphore {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Default)]
pub struct MockQueue {
    pub submit_count: AtomicU32,
}
impl Queue for MockQueue {
    fn submit(&self, _command_buffers: &[&dyn CommandBuffer], _wait: &[&dyn Semaphore], _signal: &[&dyn Semaphore], _fence: Option<&dyn Fence>) -> Result<(), RhiError> {
        self.submit_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockCommandBuffer;
impl CommandBuffer for MockCommandBuffer {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One frame's worth of barrier calls, in the order the executor issued them.
pub type BarrierLogEntry = (Vec<(AccessState, AccessState)>, Vec<(AccessState, AccessState)>);

#[derive(Debug, Default)]
pub struct MockCommandEncoder {
    pub barrier_log: Vec<BarrierLogEntry>,
}

impl CommandEncoder for MockCommandEncoder {
    fn begin_render_pass<'a>(&mut self, _desc: RenderPassBegin<'a>) -> Box<dyn RenderPass + 'a> {
        Box::new(MockRenderPass)
    }
    fn begin_compute_pass(&mut self) -> Box<dyn ComputePass> {
        Box::new(MockComputePass)
    }
    fn copy_buffer_to_buffer(&mut self, _src: &dyn Buffer, _src_offset: u64, _dst: &dyn Buffer, _dst_offset: u64, _size: u64) {}
    fn copy_buffer_to_texture(&mut self, _src: &dyn Buffer, _src_offset: u64, _dst: &dyn Texture, _dst_mip: u32, _dst_origin: (u32, u32, u32), _size: (u32, u32, u32)) {}
    fn pipeline_barrier(&mut self, buffers: &[BufferBarrier], textures: &[TextureBarrier]) {
        let buf_pairs = buffers.iter().map(|b| (b.src, b.dst)).collect();
        let tex_pairs = textures.iter().map(|t| (t.src, t.dst)).collect();
        self.barrier_log.push((buf_pairs, tex_pairs));
    }
    fn finish(self: Box<Self>) -> Box<dyn CommandBuffer> {
        Box::new(MockCommandBuffer)
    }
}

#[derive(Debug)]
struct MockRenderPass;
impl RenderPass for MockRenderPass {
    fn set_pipeline(&mut self, _pipeline: &dyn RasterPipeline) {}
    fn bind_descriptor_set(&mut self, _set_index: u32, _set: &dyn DescriptorSet, _dynamic_offsets: &[u32]) {}
    fn set_vertex_buffer(&mut self, _index: u32, _buffer: &dyn Buffer, _offset: u64) {}
    fn set_index_buffer(&mut self, _buffer: &dyn Buffer, _offset: u64, _index_format: IndexFormat) {}
    fn draw(&mut self, _vertex_count: u32, _instance_count: u32, _first_vertex: u32, _first_instance: u32) {}
    fn draw_indexed(&mut self, _index_count: u32, _instance_count: u32, _first_index: u32, _vertex_offset: i32, _first_instance: u32) {}
    fn draw_indexed_indirect(&mut self, _buffer: &dyn Buffer, _offset: u64) {}
    fn end(self: Box<Self>) {}
}

#[derive(Debug)]
struct MockComputePass;
impl ComputePass for MockComputePass {
    fn set_pipeline(&mut self, _pipeline: &dyn ComputePipeline) {}
    fn bind_descriptor_set(&mut self, _set_index: u32, _set: &dyn DescriptorSet, _dynamic_offsets: &[u32]) {}
    fn dispatch(&mut self, _x: u32, _y: u32, _z: u32) {}
}

#[derive(Debug)]
pub struct MockDescriptorSetLayout {
    bindings: Vec<DescriptorSetLayoutBinding>,
}
impl DescriptorSetLayout for MockDescriptorSetLayout {
    fn bindings(&self) -> &[DescriptorSetLayoutBinding] {
        &self.bindings
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct MockDescriptorSet;
impl DescriptorSet for MockDescriptorSet {
    fn write_buffer(&mut self, _binding: u32, _buffer: &dyn Buffer, _offset: u64, _size: u64) {}
    fn write_texture(&mut self, _binding: u32, _view: &dyn TextureView) {}
    fn write_sampler(&mut self, _binding: u32, _sampler: &dyn Sampler) {}
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Default)]
pub struct MockDescriptorPool {
    pub allocate_count: AtomicU32,
    pub reset_count: AtomicU32,
}
impl DescriptorPool for MockDescriptorPool {
    fn allocate_set(&self, _layout: &dyn DescriptorSetLayout) -> Result<Box<dyn DescriptorSet>, RhiError> {
        self.allocate_count.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MockDescriptorSet))
    }
    fn reset(&self) -> Result<(), RhiError> {
        self.reset_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MockDevice {
    pub queue: MockQueue,
    pub begin_frame_count: AtomicU32,
    pub end_frame_count: AtomicU32,
}

impl Device for MockDevice {
    fn create_buffer(&self, desc: &BufferDescriptor) -> Result<Box<dyn Buffer>, RhiError> {
        Ok(Box::new(MockBuffer { id: next_id(), descriptor: desc.clone() }))
    }
    fn create_texture(&self, desc: &TextureDescriptor) -> Result<Box<dyn Texture>, RhiError> {
        Ok(Box::new(MockTexture { id: next_id(), descriptor: desc.clone() }))
    }
    fn create_texture_view(&self, _texture: &dyn Texture, _desc: &TextureViewDescriptor) -> Result<Box<dyn TextureView>, RhiError> {
        Ok(Box::new(MockTextureView))
    }
    fn create_sampler(&self, _desc: &SamplerDescriptor) -> Result<Box<dyn Sampler>, RhiError> {
        Ok(Box::new(MockSampler))
    }
    fn create_raster_pipeline(&self, desc: &RasterPipelineDescriptor) -> Result<Box<dyn RasterPipeline>, RhiError> {
        Ok(Box::new(MockRasterPipeline { hash: desc.stable_hash() }))
    }
    fn create_compute_pipeline(&self, desc: &ComputePipelineDescriptor) -> Result<Box<dyn ComputePipeline>, RhiError> {
        Ok(Box::new(MockComputePipeline { hash: desc.stable_hash() }))
    }
    fn create_descriptor_set_layout(&self, bindings: &[DescriptorSetLayoutBinding]) -> Result<Box<dyn DescriptorSetLayout>, RhiError> {
        Ok(Box::new(MockDescriptorSetLayout { bindings: bindings.to_vec() }))
    }
    fn create_descriptor_pool(&self, _max_sets: u32) -> Result<Box<dyn DescriptorPool>, RhiError> {
        Ok(Box::new(MockDescriptorPool::default()))
    }
    fn begin_frame(&self) -> Result<(), RhiError> {
        self.begin_frame_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
    fn end_frame(&self) {
        self.end_frame_count.fetch_add(1, Ordering::Relaxed);
    }
    fn create_command_encoder(&self) -> Box<dyn CommandEncoder> {
        Box::new(MockCommandEncoder::default())
    }
    fn queue(&self) -> &dyn Queue {
        &self.queue
    }
    fn write_buffer(&self, _buffer: &dyn Buffer, _offset: u64, _data: &[u8]) -> Result<(), RhiError> {
        Ok(())
    }
    fn wait_idle(&self) -> Result<(), RhiError> {
        Ok(())
    }
    fn create_fence(&self, signaled: bool) -> Result<Box<dyn Fence>, RhiError> {
        Ok(Box::new(MockFence { signaled: Mutex::new(signaled) }))
    }
    fn create_semaphore(&self) -> Result<Box<dyn Semaphore>, RhiError> {
        Ok(Box::new(MockSemaphore))
    }
    fn defer_destroy_buffer(&self, _buffer: Box<dyn Buffer>) {}
    fn defer_destroy_texture(&self, _texture: Box<dyn Texture>) {}
}

/// A swapchain double that always hands back the same single image, for
/// testing the present phase of the executor without a surface.
pub struct MockSwapchain {
    texture: MockTexture,
    acquire_semaphore: MockSemaphore,
    render_complete_semaphore: MockSemaphore,
    extent: (u32, u32),
    pub acquire_count: AtomicU32,
    pub present_count: AtomicU32,
}

impl fmt::Debug for MockSwapchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockSwapchain").field("extent", &self.extent).finish()
    }
}

impl MockSwapchain {
    pub fn new(extent: (u32, u32)) -> Self {
        let desc = TextureDescriptor::texture_2d(extent.0, extent.1, PixelFormat::Bgra8Unorm, TextureUsage::COLOR);
        Self {
            texture: MockTexture { id: next_id(), descriptor: desc },
            acquire_semaphore: MockSemaphore,
            render_complete_semaphore: MockSemaphore,
            extent,
            acquire_count: AtomicU32::new(0),
            present_count: AtomicU32::new(0),
        }
    }
}

impl Swapchain for MockSwapchain {
    fn acquire_next_image(&mut self) -> Result<SwapchainFrame<'_>, RhiError> {
        self.acquire_count.fetch_add(1, Ordering::Relaxed);
        Ok(SwapchainFrame { image_index: 0, texture: &self.texture, acquire_semaphore: &self.acquire_semaphore, render_complete_semaphore: &self.render_complete_semaphore })
    }
    fn present(&self, _image_index: u32) -> Result<(), RhiError> {
        self.present_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
    fn extent(&self) -> (u32, u32) {
        self.extent
    }
    fn resize(&mut self, new_extent: (u32, u32)) -> Result<(), RhiError> {
        self.extent = new_extent;
        self.texture = MockTexture { id: next_id(), descriptor: TextureDescriptor::texture_2d(new_extent.0, new_extent.1, PixelFormat::Bgra8Unorm, TextureUsage::COLOR) };
        Ok(())
    }
}
