use std::sync::Arc;

use ash::vk;

use crate::{AddressMode, Filter, MipmapMode, RhiError, SamplerDescriptor};

use super::VulkanDevice;

fn filter_to_vk(f: Filter) -> vk::Filter {
    match f {
        Filter::Nearest => vk::Filter::NEAREST,
        Filter::Linear => vk::Filter::LINEAR,
    }
}

fn mipmap_mode_to_vk(m: MipmapMode) -> vk::SamplerMipmapMode {
    match m {
        MipmapMode::Nearest => vk::SamplerMipmapMode::NEAREST,
        MipmapMode::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

fn address_mode_to_vk(a: AddressMode) -> vk::SamplerAddressMode {
    match a {
        AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        AddressMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
    }
}

/// Builds the raw `VkSampler` for a descriptor. Shared by `create_sampler`
/// (ordinary, ref-counted samplers) and the device's static-sampler table
/// (immutable samplers baked into a descriptor set layout).
pub(crate) fn create_raw(device: &ash::Device, desc: &SamplerDescriptor) -> Result<vk::Sampler, RhiError> {
    let info = vk::SamplerCreateInfo::default()
        .mag_filter(filter_to_vk(desc.mag_filter))
        .min_filter(filter_to_vk(desc.min_filter))
        .mipmap_mode(mipmap_mode_to_vk(desc.mipmap_mode))
        .address_mode_u(address_mode_to_vk(desc.address_mode_u))
        .address_mode_v(address_mode_to_vk(desc.address_mode_v))
        .address_mode_w(address_mode_to_vk(desc.address_mode_w))
        .unnormalized_coordinates(false);
    unsafe { device.create_sampler(&info, None) }.map_err(|e| RhiError::AllocationFailure(format!("vkCreateSampler failed: {e:?}")))
}

pub(crate) fn create_sampler(device: &VulkanDevice, desc: &SamplerDescriptor) -> Result<Box<dyn crate::Sampler>, RhiError> {
    let sampler = create_raw(device.raw(), desc)?;
    Ok(Box::new(VulkanSampler { device: device.raw_arc(), sampler }))
}

pub struct VulkanSampler {
    device: Arc<ash::Device>,
    pub(crate) sampler: vk::Sampler,
}

unsafe impl Send for VulkanSampler {}
unsafe impl Sync for VulkanSampler {}

impl std::fmt::Debug for VulkanSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanSampler").finish()
    }
}

impl crate::Sampler for VulkanSampler {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl Drop for VulkanSampler {
    fn drop(&mut self) {
        unsafe { self.device.destroy_sampler(self.sampler, None) };
    }
}
