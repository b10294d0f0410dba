//! Per-(frame-slot, queue) command buffer pool: batched allocation, FIFO idle
//! recycling, and silent pool growth on exhaustion (never a user-visible error).

use std::collections::VecDeque;
use std::sync::Arc;

use ash::vk;
use log::warn;

use crate::{BufferBarrier, CommandBuffer, CommandEncoder, ComputePass, RenderPass, RenderPassBegin, RhiError, TextureBarrier};

use super::descriptor::VulkanDescriptorSet;
use super::pipeline::{VulkanComputePipeline, VulkanRasterPipeline};
use super::render_pass::VulkanRenderPassRecorder;
use super::texture::VulkanTextureView;
use super::{access_mask_to_vk, buffer::VulkanBuffer, image_layout_to_vk, stage_mask_to_vk, texture::VulkanTexture};

pub struct CommandBufferPool {
    device: Arc<ash::Device>,
    pools: Vec<vk::CommandPool>,
    all_buffers: Vec<vk::CommandBuffer>,
    idle: VecDeque<vk::CommandBuffer>,
    queue_family_index: u32,
    batch_size: u32,
}

impl CommandBufferPool {
    pub(crate) fn new(device: Arc<ash::Device>, queue_family_index: u32, batch_size: u32) -> Result<Self, RhiError> {
        let mut pool = Self { device, pools: Vec::new(), all_buffers: Vec::new(), idle: VecDeque::new(), queue_family_index, batch_size };
        pool.grow()?;
        Ok(pool)
    }

    fn grow(&mut self) -> Result<(), RhiError> {
        let pool_info = vk::CommandPoolCreateInfo::default().queue_family_index(self.queue_family_index).flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let pool = unsafe { self.device.create_command_pool(&pool_info, None) }.map_err(|e| RhiError::AllocationFailure(format!("vkCreateCommandPool failed: {e:?}")))?;
        let alloc_info = vk::CommandBufferAllocateInfo::default().command_pool(pool).level(vk::CommandBufferLevel::PRIMARY).command_buffer_count(self.batch_size);
        let buffers = unsafe { self.device.allocate_command_buffers(&alloc_info) }.map_err(|e| RhiError::AllocationFailure(format!("vkAllocateCommandBuffers failed: {e:?}")))?;
        warn!("command buffer pool grew by {} buffers (pool count now {})", buffers.len(), self.pools.len() + 1);
        self.all_buffers.extend(&buffers);
        self.idle.extend(buffers);
        self.pools.push(pool);
        Ok(())
    }

    /// Takes the next idle buffer and begins recording. Pool growth on
    /// exhaustion is silent from the caller's perspective: no error, no
    /// user-visible pause beyond the allocation cost itself.
    pub(crate) fn acquire(&mut self) -> Result<vk::CommandBuffer, RhiError> {
        if self.idle.is_empty() {
            self.grow()?;
        }
        let cb = self.idle.pop_front().expect("pool grown but still empty");
        let begin_info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(cb, &begin_info) }.map_err(|e| RhiError::ValidationFailure(format!("vkBeginCommandBuffer failed: {e:?}")))?;
        Ok(cb)
    }

    /// Resets every `VkCommandPool` backing this pool, which implicitly
    /// resets every command buffer ever allocated from it, and refills the
    /// idle queue with all of them. Safe to call once the frame slot that
    /// owns this pool has had its fence wait satisfied — at that point no
    /// command buffer from this slot can still be in flight on the GPU.
    pub(crate) fn reset(&mut self) -> Result<(), RhiError> {
        for pool in &self.pools {
            unsafe { self.device.reset_command_pool(*pool, vk::CommandPoolResetFlags::empty()) }.map_err(|e| RhiError::ValidationFailure(format!("vkResetCommandPool failed: {e:?}")))?;
        }
        self.idle.clear();
        self.idle.extend(self.all_buffers.iter().copied());
        Ok(())
    }
}

impl Drop for CommandBufferPool {
    fn drop(&mut self) {
        for pool in &self.pools {
            unsafe { self.device.destroy_command_pool(*pool, None) };
        }
    }
}

trait CommandBufferExt {
    fn as_raw(&self) -> u64;
}
impl CommandBufferExt for vk::CommandBuffer {
    fn as_raw(&self) -> u64 {
        use ash::vk::Handle;
        Handle::as_raw(*self)
    }
}

pub struct VulkanCommandEncoder {
    device: Arc<ash::Device>,
    buffer: vk::CommandBuffer,
    render_pass_cache: Arc<parking_lot::Mutex<super::render_pass::RenderPassCache>>,
    framebuffer_cache: Arc<parking_lot::Mutex<super::render_pass::FramebufferCache>>,
}

impl VulkanCommandEncoder {
    pub(crate) fn new(
        device: Arc<ash::Device>,
        buffer: vk::CommandBuffer,
        render_pass_cache: Arc<parking_lot::Mutex<super::render_pass::RenderPassCache>>,
        framebuffer_cache: Arc<parking_lot::Mutex<super::render_pass::FramebufferCache>>,
    ) -> Self {
        Self { device, buffer, render_pass_cache, framebuffer_cache }
    }
}

impl std::fmt::Debug for VulkanCommandEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanCommandEncoder").finish()
    }
}

fn load_op_to_vk(op: crate::LoadOp) -> vk::AttachmentLoadOp {
    match op {
        crate::LoadOp::Load => vk::AttachmentLoadOp::LOAD,
        crate::LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        crate::LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

impl CommandEncoder for VulkanCommandEncoder {
    fn begin_render_pass<'a>(&mut self, desc: RenderPassBegin<'a>) -> Box<dyn RenderPass + 'a> {
        let device = self.device.clone();
        let extent = vk::Extent2D { width: desc.extent.0, height: desc.extent.1 };

        let mut clear_values = Vec::new();
        for att in &desc.color_attachments {
            let c = att.clear.unwrap_or([0.0; 4]);
            clear_values.push(vk::ClearValue { color: vk::ClearColorValue { float32: c } });
        }
        if let Some(depth) = &desc.depth_attachment {
            clear_values.push(vk::ClearValue { depth_stencil: vk::ClearDepthStencilValue { depth: depth.clear_depth, stencil: 0 } });
        }

        let (render_pass, framebuffer) = {
            let views: Vec<vk::ImageView> = desc
                .color_attachments
                .iter()
                .map(|a| a.view.as_any().downcast_ref::<VulkanTextureView>().expect("color attachment must be a VulkanTextureView").view)
                .chain(desc.depth_attachment.as_ref().map(|d| d.view.as_any().downcast_ref::<VulkanTextureView>().expect("depth attachment must be a VulkanTextureView").view))
                .collect();
            // Render pass/framebuffer materialization against the persistent
            // caches happens in render_pass.rs, keyed by attachment shape.
            super::render_pass::begin(&device, &desc, &views, &self.render_pass_cache, &self.framebuffer_cache)
        };

        let color_attachment_count = desc.color_attachments.len();
        let begin_info = vk::RenderPassBeginInfo::default().render_pass(render_pass).framebuffer(framebuffer).render_area(vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent }).clear_values(&clear_values);
        unsafe { self.device.cmd_begin_render_pass(self.buffer, &begin_info, vk::SubpassContents::INLINE) };

        Box::new(VulkanRenderPassRecorder::new(device, self.buffer, extent, color_attachment_count))
    }

    fn begin_compute_pass(&mut self) -> Box<dyn ComputePass> {
        Box::new(VulkanComputePass { device: self.device.clone(), buffer: self.buffer, pipeline_layout: None })
    }

    fn copy_buffer_to_buffer(&mut self, src: &dyn crate::Buffer, src_offset: u64, dst: &dyn crate::Buffer, dst_offset: u64, size: u64) {
        let src_buf = src.as_any().downcast_ref::<VulkanBuffer>().expect("src must be a VulkanBuffer");
        let dst_buf = dst.as_any().downcast_ref::<VulkanBuffer>().expect("dst must be a VulkanBuffer");
        let region = vk::BufferCopy::default().src_offset(src_offset).dst_offset(dst_offset).size(size);
        unsafe { self.device.cmd_copy_buffer(self.buffer, src_buf.buffer, dst_buf.buffer, &[region]) };
    }

    fn copy_buffer_to_texture(&mut self, src: &dyn crate::Buffer, src_offset: u64, dst: &dyn crate::Texture, dst_mip: u32, dst_origin: (u32, u32, u32), size: (u32, u32, u32)) {
        let src_buf = src.as_any().downcast_ref::<VulkanBuffer>().expect("src must be a VulkanBuffer");
        let dst_tex = dst.as_any().downcast_ref::<VulkanTexture>().expect("dst must be a VulkanTexture");
        let aspect = if dst.descriptor().format.is_depth() { vk::ImageAspectFlags::DEPTH } else { vk::ImageAspectFlags::COLOR };
        let region = vk::BufferImageCopy::default()
            .buffer_offset(src_offset)
            .image_subresource(vk::ImageSubresourceLayers::default().aspect_mask(aspect).mip_level(dst_mip).base_array_layer(0).layer_count(1))
            .image_offset(vk::Offset3D { x: dst_origin.0 as i32, y: dst_origin.1 as i32, z: dst_origin.2 as i32 })
            .image_extent(vk::Extent3D { width: size.0, height: size.1, depth: size.2 });
        unsafe { self.device.cmd_copy_buffer_to_image(self.buffer, src_buf.buffer, dst_tex.image, vk::ImageLayout::TRANSFER_DST_OPTIMAL, &[region]) };
    }

    fn pipeline_barrier(&mut self, buffers: &[BufferBarrier], textures: &[TextureBarrier]) {
        if buffers.is_empty() && textures.is_empty() {
            return;
        }
        let mut src_stage = vk::PipelineStageFlags::empty();
        let mut dst_stage = vk::PipelineStageFlags::empty();

        let buffer_barriers: Vec<vk::BufferMemoryBarrier> = buffers
            .iter()
            .filter_map(|b| {
                let derived = crate::derive_barrier(crate::BarrierRequest { previous: b.src, next: b.dst, layout_mode: Default::default(), skip_sync_if_continuous: true })?;
                src_stage |= stage_mask_to_vk(derived.src_stage_mask);
                dst_stage |= stage_mask_to_vk(derived.dst_stage_mask);
                let vb = b.buffer.as_any().downcast_ref::<VulkanBuffer>().expect("buffer barrier target must be a VulkanBuffer");
                Some(
                    vk::BufferMemoryBarrier::default()
                        .src_access_mask(access_mask_to_vk(derived.src_access_mask))
                        .dst_access_mask(access_mask_to_vk(derived.dst_access_mask))
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .buffer(vb.buffer)
                        .offset(0)
                        .size(vk::WHOLE_SIZE),
                )
            })
            .collect();

        let image_barriers: Vec<vk::ImageMemoryBarrier> = textures
            .iter()
            .filter_map(|t| {
                let derived = crate::derive_barrier(crate::BarrierRequest { previous: t.src, next: t.dst, layout_mode: Default::default(), skip_sync_if_continuous: true })?;
                src_stage |= stage_mask_to_vk(derived.src_stage_mask);
                dst_stage |= stage_mask_to_vk(derived.dst_stage_mask);
                let vt = t.texture.as_any().downcast_ref::<VulkanTexture>().expect("texture barrier target must be a VulkanTexture");
                let (old_layout, new_layout) = derived.layout_transition.map(|(o, n)| (image_layout_to_vk(o), image_layout_to_vk(n))).unwrap_or((vk::ImageLayout::UNDEFINED, vk::ImageLayout::UNDEFINED));
                let aspect = if t.texture.descriptor().format.is_depth() { vk::ImageAspectFlags::DEPTH } else { vk::ImageAspectFlags::COLOR };
                Some(
                    vk::ImageMemoryBarrier::default()
                        .old_layout(old_layout)
                        .new_layout(new_layout)
                        .src_access_mask(access_mask_to_vk(derived.src_access_mask))
                        .dst_access_mask(access_mask_to_vk(derived.dst_access_mask))
                        .image(vt.image)
                        .subresource_range(vk::ImageSubresourceRange::default().aspect_mask(aspect).base_mip_level(0).level_count(vk::REMAINING_MIP_LEVELS).base_array_layer(0).layer_count(vk::REMAINING_ARRAY_LAYERS)),
                )
            })
            .collect();

        if src_stage.is_empty() {
            src_stage = vk::PipelineStageFlags::TOP_OF_PIPE;
        }
        if dst_stage.is_empty() {
            dst_stage = vk::PipelineStageFlags::BOTTOM_OF_PIPE;
        }

        unsafe { self.device.cmd_pipeline_barrier(self.buffer, src_stage, dst_stage, vk::DependencyFlags::empty(), &[], &buffer_barriers, &image_barriers) };
    }

    fn finish(self: Box<Self>) -> Box<dyn CommandBuffer> {
        unsafe { self.device.end_command_buffer(self.buffer) }.expect("vkEndCommandBuffer failed");
        Box::new(VulkanCommandBuffer { buffer: self.buffer })
    }
}

pub(crate) struct VulkanCommandBuffer {
    buffer: vk::CommandBuffer,
}

impl VulkanCommandBuffer {
    pub(crate) fn raw(&self) -> vk::CommandBuffer {
        self.buffer
    }
}

impl std::fmt::Debug for VulkanCommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanCommandBuffer").finish()
    }
}

impl CommandBuffer for VulkanCommandBuffer {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

struct VulkanComputePass {
    device: Arc<ash::Device>,
    buffer: vk::CommandBuffer,
    pipeline_layout: Option<vk::PipelineLayout>,
}

impl std::fmt::Debug for VulkanComputePass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanComputePass").finish()
    }
}

impl ComputePass for VulkanComputePass {
    fn set_pipeline(&mut self, pipeline: &dyn crate::ComputePipeline) {
        let vk_pipe = pipeline.as_any().downcast_ref::<VulkanComputePipeline>().expect("compute pipeline must be VulkanComputePipeline");
        unsafe { self.device.cmd_bind_pipeline(self.buffer, vk::PipelineBindPoint::COMPUTE, vk_pipe.pipeline) };
        self.pipeline_layout = Some(vk_pipe.layout);
    }

    fn bind_descriptor_set(&mut self, set_index: u32, set: &dyn crate::DescriptorSet, dynamic_offsets: &[u32]) {
        let vk_set = set.as_any().downcast_ref::<VulkanDescriptorSet>().expect("descriptor set must be VulkanDescriptorSet");
        let layout = self.pipeline_layout.expect("bind_descriptor_set called before set_pipeline");
        unsafe { self.device.cmd_bind_descriptor_sets(self.buffer, vk::PipelineBindPoint::COMPUTE, layout, set_index, &[vk_set.set], dynamic_offsets) };
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        unsafe { self.device.cmd_dispatch(self.buffer, x, y, z) };
    }
}
