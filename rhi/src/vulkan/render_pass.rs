//! Persistent render pass + framebuffer caching and render pass recording.
//!
//! Render passes and framebuffers are immutable GPU objects that are cheap to
//! reuse and expensive to keep rebuilding, so both live in device-owned
//! caches keyed by attachment shape (not by the live image views backing
//! them) and survive across frames until the device itself is dropped.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ash::vk;
use fnv::FnvHasher;
use log::debug;
use parking_lot::Mutex;

use crate::{ColorAttachmentDescriptor, DepthAttachmentDescriptor, LoadOp, RenderPassBegin, RenderPassDescriptor, StoreOp};

use super::texture::{VulkanTextureView, pixel_format_to_vk};

fn load_op_to_vk(op: LoadOp) -> vk::AttachmentLoadOp {
    match op {
        LoadOp::Load => vk::AttachmentLoadOp::LOAD,
        LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

fn store_op_to_vk(op: StoreOp) -> vk::AttachmentStoreOp {
    match op {
        StoreOp::Store => vk::AttachmentStoreOp::STORE,
        StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
    }
}

pub(crate) fn sample_count_to_vk(s: crate::SampleCount) -> vk::SampleCountFlags {
    match s {
        crate::SampleCount::X1 => vk::SampleCountFlags::TYPE_1,
        crate::SampleCount::X2 => vk::SampleCountFlags::TYPE_2,
        crate::SampleCount::X4 => vk::SampleCountFlags::TYPE_4,
        crate::SampleCount::X8 => vk::SampleCountFlags::TYPE_8,
    }
}

fn create_vk_render_pass(device: &ash::Device, desc: &RenderPassDescriptor) -> vk::RenderPass {
    let mut attachments = Vec::new();
    let mut color_refs = Vec::new();
    let mut depth_ref = None;

    for att in &desc.color_attachments {
        attachments.push(
            vk::AttachmentDescription::default()
                .format(pixel_format_to_vk(att.format))
                .samples(sample_count_to_vk(att.samples))
                .load_op(load_op_to_vk(att.load_op))
                .store_op(store_op_to_vk(att.store_op))
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
        );
        color_refs.push(vk::AttachmentReference::default().attachment((attachments.len() - 1) as u32).layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL));
    }

    if let Some(dep) = &desc.depth_attachment {
        attachments.push(
            vk::AttachmentDescription::default()
                .format(pixel_format_to_vk(dep.format))
                .samples(sample_count_to_vk(dep.samples))
                .load_op(load_op_to_vk(dep.load_op))
                .store_op(store_op_to_vk(dep.store_op))
                .stencil_load_op(load_op_to_vk(dep.stencil_load_op))
                .stencil_store_op(store_op_to_vk(dep.stencil_store_op))
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        );
        depth_ref = Some(vk::AttachmentReference::default().attachment((attachments.len() - 1) as u32).layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL));
    }

    let subpass = match &depth_ref {
        Some(d) => vk::SubpassDescription::default().pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS).color_attachments(&color_refs).depth_stencil_attachment(d),
        None => vk::SubpassDescription::default().pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS).color_attachments(&color_refs),
    };

    let create_info = vk::RenderPassCreateInfo::default().attachments(&attachments).subpasses(std::slice::from_ref(&subpass));
    unsafe { device.create_render_pass(&create_info, None) }.expect("vkCreateRenderPass failed")
}

#[derive(Default)]
pub struct RenderPassCache {
    entries: HashMap<u64, vk::RenderPass>,
}

impl RenderPassCache {
    pub(crate) fn get_or_create(&mut self, device: &ash::Device, desc: &RenderPassDescriptor) -> vk::RenderPass {
        let key = desc.stable_hash();
        if let Some(pass) = self.entries.get(&key) {
            debug!("render pass cache hit for key {key:#x}");
            return *pass;
        }
        let pass = create_vk_render_pass(device, desc);
        debug!("render pass cache miss for key {key:#x}, created new VkRenderPass");
        self.entries.insert(key, pass);
        pass
    }

    pub(crate) fn destroy_all(&mut self, device: &ash::Device) {
        for pass in self.entries.values() {
            unsafe { device.destroy_render_pass(*pass, None) };
        }
        self.entries.clear();
    }
}

#[derive(Default)]
pub struct FramebufferCache {
    entries: HashMap<u64, vk::Framebuffer>,
}

impl FramebufferCache {
    fn get_or_create(&mut self, device: &ash::Device, render_pass: vk::RenderPass, extent: (u32, u32), views: &[vk::ImageView]) -> vk::Framebuffer {
        let mut hasher = FnvHasher::default();
        {
            use ash::vk::Handle;
            render_pass.as_raw().hash(&mut hasher);
            extent.hash(&mut hasher);
            for v in views {
                v.as_raw().hash(&mut hasher);
            }
        }
        let key = hasher.finish();
        if let Some(fb) = self.entries.get(&key) {
            debug!("framebuffer cache hit for key {key:#x}");
            return *fb;
        }
        let info = vk::FramebufferCreateInfo::default().render_pass(render_pass).attachments(views).width(extent.0.max(1)).height(extent.1.max(1)).layers(1);
        let fb = unsafe { device.create_framebuffer(&info, None) }.expect("vkCreateFramebuffer failed");
        debug!("framebuffer cache miss for key {key:#x}, created new VkFramebuffer");
        self.entries.insert(key, fb);
        fb
    }

    /// Drops every cached framebuffer. Called by the caller after a
    /// swapchain resize, since the stale entries reference image views at
    /// the old extent and are no longer reusable.
    pub(crate) fn destroy_all(&mut self, device: &ash::Device) {
        for fb in self.entries.values() {
            unsafe { device.destroy_framebuffer(*fb, None) };
        }
        self.entries.clear();
    }
}

fn render_pass_descriptor_for(desc: &RenderPassBegin) -> RenderPassDescriptor {
    let color_attachments = desc
        .color_attachments
        .iter()
        .map(|a| {
            let vtv = a.view.as_any().downcast_ref::<VulkanTextureView>().expect("color attachment must be a VulkanTextureView");
            ColorAttachmentDescriptor { format: vtv.format, load_op: a.load_op, store_op: a.store_op, samples: vtv.samples }
        })
        .collect();
    let depth_attachment = desc.depth_attachment.as_ref().map(|d| {
        let vtv = d.view.as_any().downcast_ref::<VulkanTextureView>().expect("depth attachment must be a VulkanTextureView");
        DepthAttachmentDescriptor {
            format: vtv.format,
            load_op: d.depth_load_op,
            store_op: d.depth_store_op,
            stencil_load_op: d.stencil_load_op,
            stencil_store_op: d.stencil_store_op,
            samples: vtv.samples,
        }
    });
    RenderPassDescriptor { color_attachments, depth_attachment }
}

/// Resolves the cached (or freshly built) render pass + framebuffer for a
/// `begin_render_pass` call. Neither object is destroyed when the returned
/// recorder's `end()` runs; they stay in the device's caches for reuse by
/// any later pass with the same attachment shape and extent.
pub(crate) fn begin(
    device: &Arc<ash::Device>,
    desc: &RenderPassBegin,
    views: &[vk::ImageView],
    render_pass_cache: &Arc<Mutex<RenderPassCache>>,
    framebuffer_cache: &Arc<Mutex<FramebufferCache>>,
) -> (vk::RenderPass, vk::Framebuffer) {
    let rp_desc = render_pass_descriptor_for(desc);
    let render_pass = render_pass_cache.lock().get_or_create(device, &rp_desc);
    let framebuffer = framebuffer_cache.lock().get_or_create(device, render_pass, desc.extent, views);
    (render_pass, framebuffer)
}

pub struct VulkanRenderPassRecorder {
    device: Arc<ash::Device>,
    buffer: vk::CommandBuffer,
    extent: vk::Extent2D,
    pipeline_layout: Option<vk::PipelineLayout>,
    color_attachment_count: usize,
}

impl VulkanRenderPassRecorder {
    pub(crate) fn new(device: Arc<ash::Device>, buffer: vk::CommandBuffer, extent: vk::Extent2D, color_attachment_count: usize) -> Self {
        Self { device, buffer, extent, pipeline_layout: None, color_attachment_count }
    }
}

impl std::fmt::Debug for VulkanRenderPassRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanRenderPassRecorder").field("extent", &self.extent).field("color_attachment_count", &self.color_attachment_count).finish_non_exhaustive()
    }
}

impl crate::RenderPass for VulkanRenderPassRecorder {
    fn set_pipeline(&mut self, pipeline: &dyn crate::RasterPipeline) {
        let vk_pipe = pipeline.as_any().downcast_ref::<super::pipeline::VulkanRasterPipeline>().expect("pipeline must be a VulkanRasterPipeline");
        unsafe {
            self.device.cmd_bind_pipeline(self.buffer, vk::PipelineBindPoint::GRAPHICS, vk_pipe.pipeline);
            let viewport = vk::Viewport::default().width(self.extent.width as f32).height(self.extent.height as f32).max_depth(1.0);
            self.device.cmd_set_viewport(self.buffer, 0, &[viewport]);
            let scissor = vk::Rect2D::default().offset(vk::Offset2D { x: 0, y: 0 }).extent(self.extent);
            self.device.cmd_set_scissor(self.buffer, 0, &[scissor]);
        }
        self.pipeline_layout = Some(vk_pipe.layout);
    }

    fn bind_descriptor_set(&mut self, set_index: u32, set: &dyn crate::DescriptorSet, dynamic_offsets: &[u32]) {
        let vk_set = set.as_any().downcast_ref::<super::descriptor::VulkanDescriptorSet>().expect("descriptor set must be a VulkanDescriptorSet");
        let layout = self.pipeline_layout.expect("bind_descriptor_set called before set_pipeline");
        unsafe { self.device.cmd_bind_descriptor_sets(self.buffer, vk::PipelineBindPoint::GRAPHICS, layout, set_index, &[vk_set.set], dynamic_offsets) };
    }

    fn set_vertex_buffer(&mut self, index: u32, buffer: &dyn crate::Buffer, offset: u64) {
        let vk_buf = buffer.as_any().downcast_ref::<super::buffer::VulkanBuffer>().expect("buffer must be a VulkanBuffer");
        unsafe { self.device.cmd_bind_vertex_buffers(self.buffer, index, &[vk_buf.buffer], &[offset]) };
    }

    fn set_index_buffer(&mut self, buffer: &dyn crate::Buffer, offset: u64, index_format: crate::IndexFormat) {
        let vk_buf = buffer.as_any().downcast_ref::<super::buffer::VulkanBuffer>().expect("buffer must be a VulkanBuffer");
        let index_type = match index_format {
            crate::IndexFormat::Uint16 => vk::IndexType::UINT16,
            crate::IndexFormat::Uint32 => vk::IndexType::UINT32,
        };
        unsafe { self.device.cmd_bind_index_buffer(self.buffer, vk_buf.buffer, offset, index_type) };
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe { self.device.cmd_draw(self.buffer, vertex_count, instance_count, first_vertex, first_instance) };
    }

    fn draw_indexed(&mut self, index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32) {
        unsafe { self.device.cmd_draw_indexed(self.buffer, index_count, instance_count, first_index, vertex_offset, first_instance) };
    }

    fn draw_indexed_indirect(&mut self, buffer: &dyn crate::Buffer, offset: u64) {
        let vk_buf = buffer.as_any().downcast_ref::<super::buffer::VulkanBuffer>().expect("buffer must be a VulkanBuffer");
        unsafe { self.device.cmd_draw_indexed_indirect(self.buffer, vk_buf.buffer, offset, 1, std::mem::size_of::<vk::DrawIndexedIndirectCommand>() as u32) };
    }

    fn end(self: Box<Self>) {
        // Unlike a recorder that owns its render pass and framebuffer
        // outright, this one never destroys them: both live in the
        // device's persistent caches and are reused by the next pass with
        // a matching attachment shape.
        unsafe { self.device.cmd_end_render_pass(self.buffer) };
    }
}
