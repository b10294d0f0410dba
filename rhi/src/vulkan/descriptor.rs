//! Vulkan descriptor set layouts, pools, and sets.

use std::sync::Arc;

use ash::vk;

use crate::{Buffer, DescriptorPool, DescriptorSet, DescriptorSetLayout, DescriptorSetLayoutBinding, DescriptorType, RhiError, Sampler, ShaderStageFlags, TextureView};

use super::VulkanDevice;

fn descriptor_type_to_vk(t: DescriptorType) -> vk::DescriptorType {
    match t {
        DescriptorType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        DescriptorType::DynamicUniformBuffer => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        DescriptorType::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
        DescriptorType::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
        DescriptorType::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
        DescriptorType::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        DescriptorType::StaticSampler => vk::DescriptorType::SAMPLER,
    }
}

fn shader_stages_to_vk(s: ShaderStageFlags) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    if s.contains(ShaderStageFlags::VERTEX) {
        flags |= vk::ShaderStageFlags::VERTEX;
    }
    if s.contains(ShaderStageFlags::FRAGMENT) {
        flags |= vk::ShaderStageFlags::FRAGMENT;
    }
    if s.contains(ShaderStageFlags::COMPUTE) {
        flags |= vk::ShaderStageFlags::COMPUTE;
    }
    if s.contains(ShaderStageFlags::GEOMETRY) {
        flags |= vk::ShaderStageFlags::GEOMETRY;
    }
    flags
}

pub(crate) fn create_descriptor_set_layout(device: &VulkanDevice, bindings: &[DescriptorSetLayoutBinding]) -> Result<Box<dyn DescriptorSetLayout>, RhiError> {
    // A variable-count binding must be both last and alone in its "runtime
    // array" role; Vulkan only allows one such binding per set.
    if let Some(pos) = bindings.iter().position(|b| b.variable_count) {
        if pos != bindings.len() - 1 {
            return Err(RhiError::ValidationFailure("variable_count binding must be the last binding in the set".into()));
        }
    }

    // Static samplers are baked in as immutable samplers at layout-creation
    // time, so the `p_immutable_samplers` array must outlive the call to
    // vkCreateDescriptorSetLayout below.
    let default_static_sampler = if bindings.iter().any(|b| b.descriptor_type == DescriptorType::StaticSampler) {
        Some(device.get_or_create_static_sampler(&crate::SamplerDescriptor::default())?)
    } else {
        None
    };

    let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
        .iter()
        .map(|b| {
            let mut vb = vk::DescriptorSetLayoutBinding::default().binding(b.binding).descriptor_type(descriptor_type_to_vk(b.descriptor_type)).descriptor_count(b.count.max(1)).stage_flags(shader_stages_to_vk(b.stages));
            if b.descriptor_type == DescriptorType::StaticSampler {
                vb = vb.immutable_samplers(std::slice::from_ref(default_static_sampler.as_ref().expect("static sampler resolved above")));
            }
            vb
        })
        .collect();

    let binding_flags: Vec<vk::DescriptorBindingFlags> = bindings
        .iter()
        .map(|b| {
            if b.variable_count {
                vk::DescriptorBindingFlags::PARTIALLY_BOUND | vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND
            } else {
                vk::DescriptorBindingFlags::empty()
            }
        })
        .collect();
    let mut binding_flags_info = vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);
    let has_update_after_bind = bindings.iter().any(|b| b.variable_count);
    let mut flags = vk::DescriptorSetLayoutCreateFlags::empty();
    if has_update_after_bind {
        flags |= vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL;
    }

    let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings).flags(flags).push_next(&mut binding_flags_info);
    let layout = unsafe { device.raw().create_descriptor_set_layout(&create_info, None) }.map_err(|e| RhiError::AllocationFailure(format!("vkCreateDescriptorSetLayout failed: {e:?}")))?;

    Ok(Box::new(VulkanDescriptorSetLayout { device: device.raw_arc(), layout, bindings: bindings.to_vec() }))
}

pub struct VulkanDescriptorSetLayout {
    device: Arc<ash::Device>,
    pub(crate) layout: vk::DescriptorSetLayout,
    bindings: Vec<DescriptorSetLayoutBinding>,
}

unsafe impl Send for VulkanDescriptorSetLayout {}
unsafe impl Sync for VulkanDescriptorSetLayout {}

impl std::fmt::Debug for VulkanDescriptorSetLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanDescriptorSetLayout").field("bindings", &self.bindings.len()).finish()
    }
}

impl DescriptorSetLayout for VulkanDescriptorSetLayout {
    fn bindings(&self) -> &[DescriptorSetLayoutBinding] {
        &self.bindings
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl Drop for VulkanDescriptorSetLayout {
    fn drop(&mut self) {
        unsafe { self.device.destroy_descriptor_set_layout(self.layout, None) };
    }
}

const DEFAULT_POOL_MULTIPLIER: u32 = 4;

pub(crate) fn create_descriptor_pool(device: &VulkanDevice, max_sets: u32) -> Result<Box<dyn DescriptorPool>, RhiError> {
    let per_type = max_sets.max(1) * DEFAULT_POOL_MULTIPLIER;
    let types = [
        DescriptorType::UniformBuffer,
        DescriptorType::DynamicUniformBuffer,
        DescriptorType::StorageBuffer,
        DescriptorType::StorageImage,
        DescriptorType::SampledImage,
        DescriptorType::CombinedImageSampler,
        DescriptorType::StaticSampler,
    ];
    let pool_sizes: Vec<vk::DescriptorPoolSize> = types.iter().map(|ty| vk::DescriptorPoolSize::default().ty(descriptor_type_to_vk(*ty)).descriptor_count(per_type)).collect();
    let create_info = vk::DescriptorPoolCreateInfo::default()
        .max_sets(max_sets.max(1))
        .pool_sizes(&pool_sizes)
        .flags(vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND | vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);
    let pool = unsafe { device.raw().create_descriptor_pool(&create_info, None) }.map_err(|e| RhiError::AllocationFailure(format!("vkCreateDescriptorPool failed: {e:?}")))?;
    Ok(Box::new(VulkanDescriptorPool { device: device.raw_arc(), pool }))
}

pub struct VulkanDescriptorPool {
    device: Arc<ash::Device>,
    pool: vk::DescriptorPool,
}

unsafe impl Send for VulkanDescriptorPool {}
unsafe impl Sync for VulkanDescriptorPool {}

impl std::fmt::Debug for VulkanDescriptorPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanDescriptorPool").finish()
    }
}

impl DescriptorPool for VulkanDescriptorPool {
    fn allocate_set(&self, layout: &dyn DescriptorSetLayout) -> Result<Box<dyn DescriptorSet>, RhiError> {
        let vk_layout = layout.as_any().downcast_ref::<VulkanDescriptorSetLayout>().ok_or_else(|| RhiError::ValidationFailure("allocate_set given a non-Vulkan layout".into()))?;
        let alloc_info = vk::DescriptorSetAllocateInfo::default().descriptor_pool(self.pool).set_layouts(std::slice::from_ref(&vk_layout.layout));
        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }.map_err(|e| RhiError::AllocationFailure(format!("vkAllocateDescriptorSets failed: {e:?}")))?;
        Ok(Box::new(VulkanDescriptorSet { device: self.device.clone(), set: sets[0], bindings: vk_layout.bindings.clone() }))
    }

    fn reset(&self) -> Result<(), RhiError> {
        unsafe { self.device.reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty()) }.map_err(|e| RhiError::ValidationFailure(format!("vkResetDescriptorPool failed: {e:?}")))
    }
}

impl Drop for VulkanDescriptorPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy_descriptor_pool(self.pool, None) };
    }
}

pub struct VulkanDescriptorSet {
    device: Arc<ash::Device>,
    pub(crate) set: vk::DescriptorSet,
    bindings: Vec<DescriptorSetLayoutBinding>,
}

unsafe impl Send for VulkanDescriptorSet {}
unsafe impl Sync for VulkanDescriptorSet {}

impl std::fmt::Debug for VulkanDescriptorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanDescriptorSet").finish()
    }
}

impl VulkanDescriptorSet {
    fn descriptor_type_for_binding(&self, binding: u32) -> DescriptorType {
        self.bindings.iter().find(|b| b.binding == binding).map(|b| b.descriptor_type).unwrap_or(DescriptorType::UniformBuffer)
    }
}

impl DescriptorSet for VulkanDescriptorSet {
    fn write_buffer(&mut self, binding: u32, buffer: &dyn Buffer, offset: u64, size: u64) {
        let vk_ty = descriptor_type_to_vk(self.descriptor_type_for_binding(binding));
        let vk_buf = buffer.as_any().downcast_ref::<super::buffer::VulkanBuffer>().expect("write_buffer given a non-Vulkan buffer");
        let range = if size > 0 { size } else { vk::WHOLE_SIZE };
        let buffer_info = vk::DescriptorBufferInfo::default().buffer(vk_buf.buffer).offset(offset).range(range);
        let write = vk::WriteDescriptorSet::default().dst_set(self.set).dst_binding(binding).dst_array_element(0).descriptor_type(vk_ty).buffer_info(std::slice::from_ref(&buffer_info));
        unsafe { self.device.update_descriptor_sets(&[write], &[]) };
    }

    fn write_texture(&mut self, binding: u32, view: &dyn TextureView) {
        let vk_ty = descriptor_type_to_vk(self.descriptor_type_for_binding(binding));
        let vk_view = view.as_any().downcast_ref::<super::texture::VulkanTextureView>().expect("write_texture given a non-Vulkan texture view");
        let layout = if vk_ty == vk::DescriptorType::STORAGE_IMAGE { vk::ImageLayout::GENERAL } else { vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL };
        let image_info = vk::DescriptorImageInfo::default().image_view(vk_view.view).image_layout(layout);
        let write = vk::WriteDescriptorSet::default().dst_set(self.set).dst_binding(binding).dst_array_element(0).descriptor_type(vk_ty).image_info(std::slice::from_ref(&image_info));
        unsafe { self.device.update_descriptor_sets(&[write], &[]) };
    }

    fn write_sampler(&mut self, binding: u32, sampler: &dyn Sampler) {
        let vk_sampler = sampler.as_any().downcast_ref::<super::sampler::VulkanSampler>().expect("write_sampler given a non-Vulkan sampler");
        let image_info = vk::DescriptorImageInfo::default().sampler(vk_sampler.sampler);
        let write = vk::WriteDescriptorSet::default().dst_set(self.set).dst_binding(binding).dst_array_element(0).descriptor_type(vk::DescriptorType::SAMPLER).image_info(std::slice::from_ref(&image_info));
        unsafe { self.device.update_descriptor_sets(&[write], &[]) };
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
