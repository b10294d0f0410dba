use std::sync::Arc;

use ash::vk;

use crate::{PixelFormat, ResourceId, RhiError, TextureCreateFlags, TextureDescriptor, TextureUsage, TextureViewDescriptor, ViewType};

use super::VulkanDevice;

pub struct VulkanTexture {
    device: Arc<ash::Device>,
    pub(crate) image: vk::Image,
    memory: vk::DeviceMemory,
    id: ResourceId,
    descriptor: TextureDescriptor,
}

unsafe impl Send for VulkanTexture {}
unsafe impl Sync for VulkanTexture {}

impl std::fmt::Debug for VulkanTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanTexture").field("id", &self.id).field("extent", &self.descriptor.extent).field("format", &self.descriptor.format).finish()
    }
}

pub(crate) fn pixel_format_to_vk(format: PixelFormat) -> vk::Format {
    match format {
        PixelFormat::R8Unorm => vk::Format::R8_UNORM,
        PixelFormat::R8Uint => vk::Format::R8_UINT,
        PixelFormat::R8Sint => vk::Format::R8_SINT,
        PixelFormat::Rg8Unorm => vk::Format::R8G8_UNORM,
        PixelFormat::Rg8Uint => vk::Format::R8G8_UINT,
        PixelFormat::Rg8Sint => vk::Format::R8G8_SINT,
        PixelFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        PixelFormat::Rgba8Uint => vk::Format::R8G8B8A8_UINT,
        PixelFormat::Rgba8Sint => vk::Format::R8G8B8A8_SINT,
        PixelFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        PixelFormat::R16Float => vk::Format::R16_SFLOAT,
        PixelFormat::Rg16Float => vk::Format::R16G16_SFLOAT,
        PixelFormat::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
        PixelFormat::R32Float => vk::Format::R32_SFLOAT,
        PixelFormat::Rg32Float => vk::Format::R32G32_SFLOAT,
        PixelFormat::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
        PixelFormat::R32Uint => vk::Format::R32_UINT,
        PixelFormat::Rg32Uint => vk::Format::R32G32_UINT,
        PixelFormat::Rgba32Uint => vk::Format::R32G32B32A32_UINT,
        PixelFormat::Depth32Float => vk::Format::D32_SFLOAT,
        PixelFormat::Depth24Stencil8 => vk::Format::D24_UNORM_S8_UINT,
        PixelFormat::Bc1Unorm => vk::Format::BC1_RGBA_UNORM_BLOCK,
        PixelFormat::Bc3Unorm => vk::Format::BC3_UNORM_BLOCK,
        PixelFormat::Bc4Unorm => vk::Format::BC4_UNORM_BLOCK,
        PixelFormat::Bc5Unorm => vk::Format::BC5_UNORM_BLOCK,
        PixelFormat::Bc7Unorm => vk::Format::BC7_UNORM_BLOCK,
    }
}

fn texture_usage_to_vk(usage: TextureUsage) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    if usage.contains(TextureUsage::TRANSFER_SRC) {
        flags |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(TextureUsage::TRANSFER_DST) {
        flags |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    if usage.contains(TextureUsage::SAMPLED) {
        flags |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(TextureUsage::STORAGE) {
        flags |= vk::ImageUsageFlags::STORAGE;
    }
    if usage.contains(TextureUsage::COLOR) {
        flags |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
    }
    if usage.contains(TextureUsage::DEPTH_STENCIL) {
        flags |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    if usage.contains(TextureUsage::TRANSIENT) {
        flags |= vk::ImageUsageFlags::TRANSIENT_ATTACHMENT;
    }
    if usage.contains(TextureUsage::INPUT) {
        flags |= vk::ImageUsageFlags::INPUT_ATTACHMENT;
    }
    flags
}

fn image_type_for(extent: (u32, u32, u32)) -> vk::ImageType {
    if extent.2 > 1 {
        vk::ImageType::TYPE_3D
    } else if extent.1 > 1 || extent.0 > 1 {
        vk::ImageType::TYPE_2D
    } else {
        vk::ImageType::TYPE_1D
    }
}

fn default_view_type(desc: &TextureDescriptor) -> vk::ImageViewType {
    let is_cube = desc.create_flags.contains(TextureCreateFlags::CUBE_COMPATIBLE);
    match (image_type_for(desc.extent), desc.array_layers, is_cube) {
        (_, _, true) if desc.array_layers > 6 => vk::ImageViewType::CUBE_ARRAY,
        (_, _, true) => vk::ImageViewType::CUBE,
        (vk::ImageType::TYPE_1D, 1, _) => vk::ImageViewType::TYPE_1D,
        (vk::ImageType::TYPE_1D, _, _) => vk::ImageViewType::TYPE_1D_ARRAY,
        (vk::ImageType::TYPE_3D, _, _) => vk::ImageViewType::TYPE_3D,
        (_, 1, _) => vk::ImageViewType::TYPE_2D,
        (_, _, _) => vk::ImageViewType::TYPE_2D_ARRAY,
    }
}

pub(crate) fn create_texture(device: &VulkanDevice, desc: &TextureDescriptor, id: ResourceId) -> Result<Box<dyn crate::Texture>, RhiError> {
    desc.validate()?;
    let raw = device.raw();
    let (width, height, depth) = desc.extent;
    let mut flags = vk::ImageCreateFlags::empty();
    if desc.create_flags.contains(TextureCreateFlags::CUBE_COMPATIBLE) {
        flags |= vk::ImageCreateFlags::CUBE_COMPATIBLE;
    }

    let image_info = vk::ImageCreateInfo::default()
        .image_type(image_type_for(desc.extent))
        .format(pixel_format_to_vk(desc.format))
        .extent(vk::Extent3D { width: width.max(1), height: height.max(1), depth: depth.max(1) })
        .mip_levels(desc.mip_levels.max(1))
        .array_layers(desc.array_layers.max(1))
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(texture_usage_to_vk(desc.usage))
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .flags(flags);

    let image = unsafe { raw.create_image(&image_info, None) }.map_err(|e| RhiError::AllocationFailure(format!("vkCreateImage failed: {e:?}")))?;
    let requirements = unsafe { raw.get_image_memory_requirements(image) };
    let memory_type = device
        .find_memory_type(requirements.memory_type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL, vk::MemoryPropertyFlags::DEVICE_LOCAL)
        .map_err(|e| {
            unsafe { raw.destroy_image(image, None) };
            e
        })?;
    let alloc_info = vk::MemoryAllocateInfo::default().allocation_size(requirements.size).memory_type_index(memory_type);
    let memory = unsafe { raw.allocate_memory(&alloc_info, None) }.map_err(|e| {
        unsafe { raw.destroy_image(image, None) };
        RhiError::AllocationFailure(format!("vkAllocateMemory failed: {e:?}"))
    })?;
    unsafe { raw.bind_image_memory(image, memory, 0) }.map_err(|e| RhiError::AllocationFailure(format!("vkBindImageMemory failed: {e:?}")))?;

    if let Some(initial) = &desc.initial_data {
        let final_layout = if desc.usage.contains(TextureUsage::SAMPLED) {
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        } else if desc.usage.contains(TextureUsage::STORAGE) {
            vk::ImageLayout::GENERAL
        } else {
            vk::ImageLayout::TRANSFER_DST_OPTIMAL
        };
        super::upload::upload_texture_via_staging(device, image, desc, &initial.bytes, final_layout).map_err(|e| {
            unsafe {
                raw.destroy_image(image, None);
                raw.free_memory(memory, None);
            }
            e
        })?;
    }

    Ok(Box::new(VulkanTexture { device: device.raw_arc(), image, memory, id, descriptor: desc.clone() }))
}

pub(crate) fn create_texture_view(device: &VulkanDevice, texture: &dyn crate::Texture, desc: &TextureViewDescriptor) -> Result<Box<dyn crate::TextureView>, RhiError> {
    let vt = match texture.as_any().downcast_ref::<VulkanTexture>() {
        Some(vt) => vt,
        None => {
            #[cfg(feature = "window")]
            if let Some(si) = texture.as_any().downcast_ref::<super::swapchain::VulkanSwapchainImage>() {
                return super::swapchain::create_swapchain_image_view(device.raw(), si, desc);
            }
            return Err(RhiError::ValidationFailure("create_texture_view given a non-Vulkan texture".into()));
        }
    };
    let raw = device.raw();
    let parent = &vt.descriptor;
    let format = pixel_format_to_vk(desc.format.unwrap_or(parent.format));
    let view_type = match desc.view_type {
        Some(ViewType::D1) => vk::ImageViewType::TYPE_1D,
        Some(ViewType::D1Array) => vk::ImageViewType::TYPE_1D_ARRAY,
        Some(ViewType::D2) => vk::ImageViewType::TYPE_2D,
        Some(ViewType::D2Array) => vk::ImageViewType::TYPE_2D_ARRAY,
        Some(ViewType::D3) => vk::ImageViewType::TYPE_3D,
        Some(ViewType::Cube) => vk::ImageViewType::CUBE,
        Some(ViewType::CubeArray) => vk::ImageViewType::CUBE_ARRAY,
        None => default_view_type(parent),
    };
    let aspect_mask = aspect_flags_to_vk(desc.aspect);
    let level_count = desc.level_count.unwrap_or(parent.mip_levels.saturating_sub(desc.base_mip).max(1));

    let view_info = vk::ImageViewCreateInfo::default().image(vt.image).view_type(view_type).format(format).subresource_range(
        vk::ImageSubresourceRange::default().aspect_mask(aspect_mask).base_mip_level(desc.base_mip).level_count(level_count).base_array_layer(0).layer_count(parent.array_layers.max(1)),
    );
    let view = unsafe { raw.create_image_view(&view_info, None) }.map_err(|e| RhiError::AllocationFailure(format!("vkCreateImageView failed: {e:?}")))?;
    let resolved_format = desc.format.unwrap_or(parent.format);
    Ok(Box::new(VulkanTextureView { device: device.raw_arc(), view, format: resolved_format, samples: parent.samples }))
}

fn aspect_flags_to_vk(aspect: crate::AspectFlags) -> vk::ImageAspectFlags {
    use crate::AspectFlags as A;
    let mut out = vk::ImageAspectFlags::empty();
    if aspect.contains(A::COLOR) {
        out |= vk::ImageAspectFlags::COLOR;
    }
    if aspect.contains(A::DEPTH) {
        out |= vk::ImageAspectFlags::DEPTH;
    }
    if aspect.contains(A::STENCIL) {
        out |= vk::ImageAspectFlags::STENCIL;
    }
    if aspect.contains(A::METADATA) {
        out |= vk::ImageAspectFlags::METADATA;
    }
    out
}

pub struct VulkanTextureView {
    device: Arc<ash::Device>,
    pub(crate) view: vk::ImageView,
    pub(crate) format: PixelFormat,
    pub(crate) samples: crate::SampleCount,
}

unsafe impl Send for VulkanTextureView {}
unsafe impl Sync for VulkanTextureView {}

impl VulkanTextureView {
    pub(crate) fn new(device: Arc<ash::Device>, view: vk::ImageView, format: PixelFormat, samples: crate::SampleCount) -> Self {
        Self { device, view, format, samples }
    }
}

impl std::fmt::Debug for VulkanTextureView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanTextureView").field("format", &self.format).finish()
    }
}

impl crate::TextureView for VulkanTextureView {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl Drop for VulkanTextureView {
    fn drop(&mut self) {
        unsafe { self.device.destroy_image_view(self.view, None) };
    }
}

impl crate::Texture for VulkanTexture {
    fn id(&self) -> ResourceId {
        self.id
    }
    fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}
