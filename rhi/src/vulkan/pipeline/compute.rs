//! Vulkan compute pipeline.

use std::ffi::CString;
use std::sync::Arc;

use ash::vk;

use crate::{ComputePipelineDescriptor, RhiError};

use super::super::VulkanDevice;

pub(crate) fn create(device: &VulkanDevice, desc: &ComputePipelineDescriptor) -> Result<Box<dyn crate::ComputePipeline>, RhiError> {
    let raw = device.raw();
    let create_info = vk::ShaderModuleCreateInfo::default().code(&desc.shader.code);
    let module = unsafe { raw.create_shader_module(&create_info, None) }.map_err(|e| RhiError::ValidationFailure(format!("vkCreateShaderModule failed: {e:?}")))?;

    let layout_info = vk::PipelineLayoutCreateInfo::default();
    let layout = unsafe { raw.create_pipeline_layout(&layout_info, None) }.map_err(|e| RhiError::AllocationFailure(format!("vkCreatePipelineLayout failed: {e:?}")))?;

    let entry_name = CString::new(desc.shader.entry_point.as_str()).map_err(|e| RhiError::ValidationFailure(e.to_string()))?;
    let stage = vk::PipelineShaderStageCreateInfo::default().stage(vk::ShaderStageFlags::COMPUTE).module(module).name(&entry_name);
    let create_info = vk::ComputePipelineCreateInfo::default().stage(stage).layout(layout);
    let pipelines =
        unsafe { raw.create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None) }.map_err(|(_, e)| RhiError::AllocationFailure(format!("vkCreateComputePipelines failed: {e:?}")))?;
    let pipeline = pipelines[0];

    unsafe { raw.destroy_shader_module(module, None) };

    Ok(Box::new(VulkanComputePipeline { device: device.raw_arc(), pipeline, layout, hash: desc.stable_hash() }))
}

pub struct VulkanComputePipeline {
    device: Arc<ash::Device>,
    pub(crate) pipeline: vk::Pipeline,
    pub(crate) layout: vk::PipelineLayout,
    hash: u64,
}

unsafe impl Send for VulkanComputePipeline {}
unsafe impl Sync for VulkanComputePipeline {}

impl std::fmt::Debug for VulkanComputePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanComputePipeline").field("hash", &self.hash).finish()
    }
}

impl crate::ComputePipeline for VulkanComputePipeline {
    fn descriptor_hash(&self) -> u64 {
        self.hash
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl Drop for VulkanComputePipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}
