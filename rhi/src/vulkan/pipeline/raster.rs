//! Vulkan raster (graphics) pipeline.

use std::ffi::CString;
use std::sync::Arc;

use ash::vk;

use crate::{BlendFactor, BlendOp, CompareOp, CullMode, FrontFace, PolygonMode, PrimitiveTopology, RasterPipelineDescriptor, RhiError, ShaderStage};

use super::super::VulkanDevice;

fn topology_to_vk(t: PrimitiveTopology) -> vk::PrimitiveTopology {
    match t {
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
    }
}

fn polygon_mode_to_vk(p: PolygonMode) -> vk::PolygonMode {
    match p {
        PolygonMode::Fill => vk::PolygonMode::FILL,
        PolygonMode::Line => vk::PolygonMode::LINE,
        PolygonMode::Point => vk::PolygonMode::POINT,
    }
}

fn cull_mode_to_vk(c: CullMode) -> vk::CullModeFlags {
    match c {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Back => vk::CullModeFlags::BACK,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::FrontAndBack => vk::CullModeFlags::FRONT_AND_BACK,
    }
}

fn front_face_to_vk(f: FrontFace) -> vk::FrontFace {
    match f {
        FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
    }
}

fn blend_factor_to_vk(f: BlendFactor) -> vk::BlendFactor {
    match f {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
    }
}

fn blend_op_to_vk(o: BlendOp) -> vk::BlendOp {
    match o {
        BlendOp::Add => vk::BlendOp::ADD,
        BlendOp::Subtract => vk::BlendOp::SUBTRACT,
        BlendOp::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
    }
}

fn compare_op_to_vk(o: CompareOp) -> vk::CompareOp {
    match o {
        CompareOp::Never => vk::CompareOp::NEVER,
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::Equal => vk::CompareOp::EQUAL,
        CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOp::Greater => vk::CompareOp::GREATER,
        CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareOp::Always => vk::CompareOp::ALWAYS,
    }
}

fn create_shader_module(device: &ash::Device, code: &[u32]) -> Result<vk::ShaderModule, RhiError> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);
    unsafe { device.create_shader_module(&create_info, None) }.map_err(|e| RhiError::ValidationFailure(format!("vkCreateShaderModule failed: {e:?}")))
}

pub(crate) fn create(device: &VulkanDevice, desc: &RasterPipelineDescriptor) -> Result<Box<dyn crate::RasterPipeline>, RhiError> {
    let raw = device.raw();

    // The pipeline's render pass is resolved through the same persistent
    // cache `begin_render_pass` uses, so a pipeline built against a given
    // attachment shape is automatically compatible with any render pass
    // instance later materialized for that shape.
    let render_pass = device.render_pass_cache.lock().get_or_create(raw, &desc.render_pass);

    let mut modules = Vec::new();
    let mut entry_names = Vec::new();
    for shader in &desc.shaders {
        modules.push((shader.stage, create_shader_module(raw, &shader.code)?));
        entry_names.push(CString::new(shader.entry_point.as_str()).map_err(|e| RhiError::ValidationFailure(e.to_string()))?);
    }

    let stage_flag = |s: ShaderStage| match s {
        ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        ShaderStage::Geometry => vk::ShaderStageFlags::GEOMETRY,
        ShaderStage::TessControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
        ShaderStage::TessEvaluation => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
        ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
        ShaderStage::RayTracing => vk::ShaderStageFlags::RAYGEN_KHR,
    };
    let stages: Vec<vk::PipelineShaderStageCreateInfo> =
        modules.iter().zip(entry_names.iter()).map(|((stage, module), name)| vk::PipelineShaderStageCreateInfo::default().stage(stage_flag(*stage)).module(*module).name(name)).collect();

    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default().topology(topology_to_vk(desc.topology)).primitive_restart_enable(false);
    let viewport_state = vk::PipelineViewportStateCreateInfo::default().viewport_count(1).scissor_count(1);
    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(polygon_mode_to_vk(desc.rasterizer.polygon_mode))
        .line_width(1.0)
        .cull_mode(cull_mode_to_vk(desc.rasterizer.cull_mode))
        .front_face(front_face_to_vk(desc.rasterizer.front_face))
        .depth_bias_enable(desc.depth_bias);
    let multisampling = vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(super::super::render_pass::sample_count_to_vk(desc.samples));

    let color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = desc
        .blend_states
        .iter()
        .map(|maybe_blend| match maybe_blend {
            None => vk::PipelineColorBlendAttachmentState::default().blend_enable(false).color_write_mask(vk::ColorComponentFlags::RGBA),
            Some(b) => vk::PipelineColorBlendAttachmentState::default()
                .blend_enable(true)
                .src_color_blend_factor(blend_factor_to_vk(b.color.src))
                .dst_color_blend_factor(blend_factor_to_vk(b.color.dst))
                .color_blend_op(blend_op_to_vk(b.color.op))
                .src_alpha_blend_factor(blend_factor_to_vk(b.alpha.src))
                .dst_alpha_blend_factor(blend_factor_to_vk(b.alpha.dst))
                .alpha_blend_op(blend_op_to_vk(b.alpha.op))
                .color_write_mask(vk::ColorComponentFlags::RGBA),
        })
        .collect();
    let color_blend = vk::PipelineColorBlendStateCreateInfo::default().logic_op_enable(false).attachments(&color_blend_attachments);

    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(desc.depth_test)
        .depth_write_enable(desc.depth_write)
        .depth_compare_op(compare_op_to_vk(desc.depth_compare))
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let layout_info = vk::PipelineLayoutCreateInfo::default();
    let layout = unsafe { raw.create_pipeline_layout(&layout_info, None) }.map_err(|e| RhiError::AllocationFailure(format!("vkCreatePipelineLayout failed: {e:?}")))?;

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blend)
        .depth_stencil_state(&depth_stencil)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0);

    let pipelines = unsafe { raw.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None) }.map_err(|(_, e)| RhiError::AllocationFailure(format!("vkCreateGraphicsPipelines failed: {e:?}")))?;
    let pipeline = pipelines[0];

    for (_, module) in modules {
        unsafe { raw.destroy_shader_module(module, None) };
    }

    Ok(Box::new(VulkanRasterPipeline { device: device.raw_arc(), pipeline, layout, hash: desc.stable_hash() }))
}

pub struct VulkanRasterPipeline {
    device: Arc<ash::Device>,
    pub(crate) pipeline: vk::Pipeline,
    pub(crate) layout: vk::PipelineLayout,
    hash: u64,
}

unsafe impl Send for VulkanRasterPipeline {}
unsafe impl Sync for VulkanRasterPipeline {}

impl std::fmt::Debug for VulkanRasterPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanRasterPipeline").field("hash", &self.hash).finish()
    }
}

impl crate::RasterPipeline for VulkanRasterPipeline {
    fn descriptor_hash(&self) -> u64 {
        self.hash
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl Drop for VulkanRasterPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}
