//! Render hardware interface: an explicit GPU abstraction (buffers, textures,
//! command buffers, descriptor sets, swapchains) sitting underneath the
//! render graph. Backends implement the trait family below as trait objects;
//! concrete backend structs are reached via `as_any` downcasting when a
//! caller genuinely needs backend-specific behavior (see `vulkan`).

use std::any::Any;
use std::fmt::Debug;

pub mod access;
pub mod cache;
pub mod config;
pub mod descriptor;
pub mod error;

#[cfg(feature = "vulkan")]
pub mod vulkan;

pub use access::{AccessInfo, AccessMask, AccessState, BarrierRequest, DerivedBarrier, ImageLayout, LayoutMode, StageMask, derive_barrier};
pub use descriptor::*;
pub use error::RhiError;

/// Monotonic identifier assigned to every RHI-owned resource at creation.
pub type ResourceId = u64;

pub trait Device: Send + Sync + Debug {
    fn create_buffer(&self, desc: &BufferDescriptor) -> Result<Box<dyn Buffer>, RhiError>;
    fn create_texture(&self, desc: &TextureDescriptor) -> Result<Box<dyn Texture>, RhiError>;
    fn create_texture_view(&self, texture: &dyn Texture, desc: &TextureViewDescriptor) -> Result<Box<dyn TextureView>, RhiError>;
    fn create_sampler(&self, desc: &SamplerDescriptor) -> Result<Box<dyn Sampler>, RhiError>;

    fn create_raster_pipeline(&self, desc: &RasterPipelineDescriptor) -> Result<Box<dyn RasterPipeline>, RhiError>;
    fn create_compute_pipeline(&self, desc: &ComputePipelineDescriptor) -> Result<Box<dyn ComputePipeline>, RhiError>;

    fn create_descriptor_set_layout(&self, bindings: &[DescriptorSetLayoutBinding]) -> Result<Box<dyn DescriptorSetLayout>, RhiError>;
    fn create_descriptor_pool(&self, max_sets: u32) -> Result<Box<dyn DescriptorPool>, RhiError>;

    /// Begins a new device-frame slot: waits on that slot's fences, flushes
    /// its deferred-destroy queue, and resets its command-buffer pools.
    fn begin_frame(&self) -> Result<(), RhiError>;
    /// Advances the frame-slot index modulo the configured slot count.
    fn end_frame(&self);

    fn create_command_encoder(&self) -> Box<dyn CommandEncoder>;

    fn queue(&self) -> &dyn Queue;
    /// Transfer queue used for immediate uploads, if the device exposes one
    /// distinct from the graphics queue.
    fn transfer_queue(&self) -> Option<&dyn Queue> {
        None
    }

    fn write_buffer(&self, buffer: &dyn Buffer, offset: u64, data: &[u8]) -> Result<(), RhiError>;
    fn wait_idle(&self) -> Result<(), RhiError>;

    fn create_fence(&self, signaled: bool) -> Result<Box<dyn Fence>, RhiError>;
    fn create_semaphore(&self) -> Result<Box<dyn Semaphore>, RhiError>;

    fn create_swapchain(&self, extent: (u32, u32)) -> Result<Box<dyn Swapchain>, RhiError> {
        let _ = extent;
        Err(RhiError::ValidationFailure("device was created without a surface".into()))
    }

    /// Destroys a resource immediately if no frame in flight could still be
    /// reading it, otherwise defers destruction to the current frame slot's
    /// deferred-release queue.
    fn defer_destroy_buffer(&self, buffer: Box<dyn Buffer>);
    fn defer_destroy_texture(&self, texture: Box<dyn Texture>);
}

pub trait Fence: Send + Sync + Debug {
    fn wait(&self, timeout_ns: u64) -> Result<(), RhiError>;
    fn reset(&self) -> Result<(), RhiError>;
    fn as_any(&self) -> &dyn Any;
}

pub trait Semaphore: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
}

pub trait Queue: Send + Sync + Debug {
    fn submit(
        &self,
        command_buffers: &[&dyn CommandBuffer],
        wait_semaphores: &[&dyn Semaphore],
        signal_semaphores: &[&dyn Semaphore],
        signal_fence: Option<&dyn Fence>,
    ) -> Result<(), RhiError>;
}

pub trait Buffer: Send + Sync + Debug {
    fn id(&self) -> ResourceId;
    fn size(&self) -> u64;
    fn descriptor(&self) -> &BufferDescriptor;
    fn as_any(&self) -> &dyn Any;
}

pub trait Texture: Send + Sync + Debug {
    fn id(&self) -> ResourceId;
    fn descriptor(&self) -> &TextureDescriptor;
    fn as_any(&self) -> &dyn Any;
}

pub trait TextureView: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MipmapMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

/// Samplers are immutable once created and deduplicated by a textual key
/// derived from (filter, mipmap mode, address mode) so pipelines referencing
/// the same sampler configuration share a single backing object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDescriptor {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub mipmap_mode: MipmapMode,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
}

impl Default for SamplerDescriptor {
    /// The configuration used for the shared immutable sampler backing
    /// `DescriptorType::StaticSampler` bindings that don't otherwise specify one.
    fn default() -> Self {
        Self {
            min_filter: Filter::Linear,
            mag_filter: Filter::Linear,
            mipmap_mode: MipmapMode::Linear,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
        }
    }
}

impl SamplerDescriptor {
    /// Compact textual key used to look up (and dedupe) an immutable sampler.
    pub fn static_key(&self) -> String {
        format!(
            "{:?}/{:?}/{:?}/{:?}/{:?}/{:?}",
            self.min_filter, self.mag_filter, self.mipmap_mode, self.address_mode_u, self.address_mode_v, self.address_mode_w
        )
    }
}

pub trait Sampler: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
}

pub trait RasterPipeline: Send + Sync + Debug {
    fn descriptor_hash(&self) -> u64;
    fn as_any(&self) -> &dyn Any;
}

pub trait ComputePipeline: Send + Sync + Debug {
    fn descriptor_hash(&self) -> u64;
    fn as_any(&self) -> &dyn Any;
}

pub struct RenderPassBegin<'a> {
    pub color_attachments: Vec<ColorAttachmentBinding<'a>>,
    pub depth_attachment: Option<DepthAttachmentBinding<'a>>,
    pub extent: (u32, u32),
}

pub struct ColorAttachmentBinding<'a> {
    pub view: &'a dyn TextureView,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear: Option<[f32; 4]>,
}

pub struct DepthAttachmentBinding<'a> {
    pub view: &'a dyn TextureView,
    pub depth_load_op: LoadOp,
    pub depth_store_op: StoreOp,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
    pub clear_depth: f32,
}

pub trait CommandEncoder: Debug {
    fn begin_render_pass<'a>(&mut self, desc: RenderPassBegin<'a>) -> Box<dyn RenderPass + 'a>;
    fn begin_compute_pass(&mut self) -> Box<dyn ComputePass>;

    fn copy_buffer_to_buffer(&mut self, src: &dyn Buffer, src_offset: u64, dst: &dyn Buffer, dst_offset: u64, size: u64);
    fn copy_buffer_to_texture(&mut self, src: &dyn Buffer, src_offset: u64, dst: &dyn Texture, dst_mip: u32, dst_origin: (u32, u32, u32), size: (u32, u32, u32));

    /// Records a single batched barrier covering every buffer/texture in the
    /// slice, rather than one call per resource. The barrier engine (C9)
    /// relies on this batching to keep per-node overhead to one call.
    fn pipeline_barrier(&mut self, buffers: &[BufferBarrier], textures: &[TextureBarrier]);

    fn finish(self: Box<Self>) -> Box<dyn CommandBuffer>;
}

#[derive(Debug, Clone, Copy)]
pub struct BufferBarrier<'a> {
    pub buffer: &'a dyn Buffer,
    pub src: AccessState,
    pub dst: AccessState,
}

#[derive(Debug, Clone, Copy)]
pub struct TextureBarrier<'a> {
    pub texture: &'a dyn Texture,
    pub src: AccessState,
    pub dst: AccessState,
}

pub trait RenderPass: Debug {
    fn set_pipeline(&mut self, pipeline: &dyn RasterPipeline);
    /// `dynamic_offsets` supplies one offset per `DynamicUniformBuffer`
    /// binding in the set, in binding order; empty for a set with no dynamic
    /// bindings.
    fn bind_descriptor_set(&mut self, set_index: u32, set: &dyn DescriptorSet, dynamic_offsets: &[u32]);
    fn set_vertex_buffer(&mut self, index: u32, buffer: &dyn Buffer, offset: u64);
    fn set_index_buffer(&mut self, buffer: &dyn Buffer, offset: u64, index_format: IndexFormat);
    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);
    fn draw_indexed(&mut self, index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32);
    fn draw_indexed_indirect(&mut self, buffer: &dyn Buffer, offset: u64);
    fn end(self: Box<Self>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

pub trait ComputePass: Debug {
    fn set_pipeline(&mut self, pipeline: &dyn ComputePipeline);
    fn bind_descriptor_set(&mut self, set_index: u32, set: &dyn DescriptorSet, dynamic_offsets: &[u32]);
    fn dispatch(&mut self, x: u32, y: u32, z: u32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    UniformBuffer,
    DynamicUniformBuffer,
    StorageBuffer,
    StorageImage,
    SampledImage,
    CombinedImageSampler,
    StaticSampler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayoutBinding {
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    pub count: u32,
    pub stages: ShaderStageFlags,
    /// Trailing binding with a runtime-sized array (must be last in the set),
    /// created with partially-bound + variable-count update-after-bind flags.
    pub variable_count: bool,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX   = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE  = 1 << 2;
        const GEOMETRY = 1 << 3;
    }
}

pub trait DescriptorSetLayout: Send + Sync + Debug {
    fn bindings(&self) -> &[DescriptorSetLayoutBinding];
    fn as_any(&self) -> &dyn Any;
}

pub trait DescriptorPool: Send + Sync + Debug {
    fn allocate_set(&self, layout: &dyn DescriptorSetLayout) -> Result<Box<dyn DescriptorSet>, RhiError>;
    fn reset(&self) -> Result<(), RhiError>;
}

pub trait DescriptorSet: Send + Sync + Debug {
    fn write_buffer(&mut self, binding: u32, buffer: &dyn Buffer, offset: u64, size: u64);
    fn write_texture(&mut self, binding: u32, view: &dyn TextureView);
    fn write_sampler(&mut self, binding: u32, sampler: &dyn Sampler);
    fn as_any(&self) -> &dyn Any;
}

pub trait CommandBuffer: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
}

pub struct SwapchainFrame<'a> {
    pub image_index: u32,
    pub texture: &'a dyn Texture,
    pub acquire_semaphore: &'a dyn Semaphore,
    pub render_complete_semaphore: &'a dyn Semaphore,
}

pub trait Swapchain: Send + Sync + Debug {
    fn acquire_next_image(&mut self) -> Result<SwapchainFrame<'_>, RhiError>;
    /// Waits on the render-complete semaphore for the slot that was acquired
    /// by the matching `acquire_next_image` call. Deliberately takes no
    /// semaphore argument: one borrowed from that call's `&mut self` would
    /// still be "alive" at the point of this call (it's the same `self`),
    /// which the borrow checker rejects outright. The implementation tracks
    /// which slot's semaphore to wait on internally instead.
    fn present(&self, image_index: u32) -> Result<(), RhiError>;
    fn extent(&self) -> (u32, u32);
    /// Destroys and recreates the swapchain and its per-image sync
    /// primitives at the new extent. Existing framebuffer-cache entries
    /// keyed on the old extent become stale and must be garbage collected
    /// by the caller (see `DeviceConfig`-driven framebuffer cache in C3).
    fn resize(&mut self, new_extent: (u32, u32)) -> Result<(), RhiError>;
}
