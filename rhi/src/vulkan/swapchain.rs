//! Vulkan swapchain and surface support (feature "window").

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ash::khr::swapchain::Device as SwapchainDevice;
use ash::vk;

use crate::{PixelFormat, ResourceId, RhiError, SampleCount, Swapchain, SwapchainFrame, TextureDescriptor, TextureUsage};

use super::queue::VulkanSemaphore;
use super::texture::pixel_format_to_vk;

/// Swapchain image wrapper: implements `Texture` for use as a color
/// attachment. Does not own the `VkImage`, only the per-image view.
pub struct VulkanSwapchainImage {
    device: Arc<ash::Device>,
    pub(crate) image: vk::Image,
    id: ResourceId,
    descriptor: TextureDescriptor,
}

impl std::fmt::Debug for VulkanSwapchainImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanSwapchainImage").field("id", &self.id).field("extent", &self.descriptor.extent).finish()
    }
}

unsafe impl Send for VulkanSwapchainImage {}
unsafe impl Sync for VulkanSwapchainImage {}

impl crate::Texture for VulkanSwapchainImage {
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

fn surface_format_to_pixel_format(format: vk::Format) -> PixelFormat {
    if format == vk::Format::B8G8R8A8_UNORM {
        PixelFormat::Bgra8Unorm
    } else {
        PixelFormat::Rgba8Unorm
    }
}

/// A presentable chain of swapchain images plus the per-slot semaphore pairs
/// `acquire_next_image` hands back. Acquire/present semaphores are owned
/// here (not supplied by the caller) since `present` takes no semaphore
/// argument of its own; `current_slot` tracks which pair to wait on.
pub struct VulkanSwapchain {
    device: Arc<ash::Device>,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: SwapchainDevice,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    queue: vk::Queue,
    format: vk::Format,
    extent: (u32, u32),
    images: Vec<VulkanSwapchainImage>,
    acquire_semaphores: Vec<VulkanSemaphore>,
    render_complete_semaphores: Vec<VulkanSemaphore>,
    frame_index: usize,
    /// Slot used by the most recent `acquire_next_image`, so `present` knows
    /// which `render_complete_semaphores` entry to wait on without the
    /// caller handing one back (see the `Swapchain::present` doc comment).
    current_slot: usize,
    next_id: Arc<AtomicU64>,
}

struct BuiltSwapchain {
    swapchain: vk::SwapchainKHR,
    format: vk::Format,
    extent: (u32, u32),
    images: Vec<vk::Image>,
}

fn build_swapchain(
    surface_loader: &ash::khr::surface::Instance,
    swapchain_loader: &SwapchainDevice,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    requested_extent: (u32, u32),
    old_swapchain: vk::SwapchainKHR,
) -> Result<BuiltSwapchain, RhiError> {
    let caps = unsafe { surface_loader.get_physical_device_surface_capabilities(physical_device, surface) }
        .map_err(|e| RhiError::ValidationFailure(format!("vkGetPhysicalDeviceSurfaceCapabilitiesKHR failed: {e:?}")))?;
    let extent_vk = vk::Extent2D {
        width: requested_extent.0.clamp(caps.min_image_extent.width, caps.max_image_extent.width.max(caps.min_image_extent.width)),
        height: requested_extent.1.clamp(caps.min_image_extent.height, caps.max_image_extent.height.max(caps.min_image_extent.height)),
    };
    let image_count = if caps.max_image_count == 0 { caps.min_image_count + 1 } else { (caps.min_image_count + 1).min(caps.max_image_count) };

    let formats = unsafe { surface_loader.get_physical_device_surface_formats(physical_device, surface) }
        .map_err(|e| RhiError::ValidationFailure(format!("vkGetPhysicalDeviceSurfaceFormatsKHR failed: {e:?}")))?;
    let format = formats.iter().find(|f| f.format == vk::Format::B8G8R8A8_UNORM).or_else(|| formats.first()).copied().unwrap_or_default();

    let present_modes = unsafe { surface_loader.get_physical_device_surface_present_modes(physical_device, surface) }
        .map_err(|e| RhiError::ValidationFailure(format!("vkGetPhysicalDeviceSurfacePresentModesKHR failed: {e:?}")))?;
    let present_mode = present_modes
        .iter()
        .copied()
        .find(|m| *m == vk::PresentModeKHR::MAILBOX)
        .or_else(|| present_modes.iter().copied().find(|m| *m == vk::PresentModeKHR::IMMEDIATE))
        .unwrap_or(vk::PresentModeKHR::FIFO);

    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface)
        .min_image_count(image_count)
        .image_format(format.format)
        .image_color_space(format.color_space)
        .image_extent(extent_vk)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        .pre_transform(caps.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true)
        .old_swapchain(old_swapchain);

    let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }.map_err(|e| RhiError::ValidationFailure(format!("vkCreateSwapchainKHR failed: {e:?}")))?;
    let images = unsafe { swapchain_loader.get_swapchain_images(swapchain) }.map_err(|e| RhiError::ValidationFailure(format!("vkGetSwapchainImagesKHR failed: {e:?}")))?;

    Ok(BuiltSwapchain { swapchain, format: format.format, extent: (extent_vk.width, extent_vk.height), images })
}

impl VulkanSwapchain {
    pub(crate) fn new(
        device: Arc<ash::Device>,
        surface_loader: ash::khr::surface::Instance,
        swapchain_loader: SwapchainDevice,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        queue: vk::Queue,
        extent: (u32, u32),
        next_id: Arc<AtomicU64>,
    ) -> Result<Self, RhiError> {
        let built = build_swapchain(&surface_loader, &swapchain_loader, physical_device, surface, extent, vk::SwapchainKHR::null())?;
        let pixel_format = surface_format_to_pixel_format(built.format);
        let images = built
            .images
            .iter()
            .map(|image| VulkanSwapchainImage {
                device: device.clone(),
                image: *image,
                id: next_id.fetch_add(1, Ordering::Relaxed),
                descriptor: TextureDescriptor::texture_2d(built.extent.0, built.extent.1, pixel_format, TextureUsage::COLOR),
            })
            .collect::<Vec<_>>();
        let (acquire_semaphores, render_complete_semaphores) = create_semaphore_pairs(&device, images.len())?;

        Ok(Self {
            device,
            surface_loader,
            swapchain_loader,
            physical_device,
            surface,
            swapchain: built.swapchain,
            queue,
            format: built.format,
            extent: built.extent,
            images,
            acquire_semaphores,
            render_complete_semaphores,
            frame_index: 0,
            current_slot: 0,
            next_id,
        })
    }
}

fn create_semaphore_pairs(device: &Arc<ash::Device>, count: usize) -> Result<(Vec<VulkanSemaphore>, Vec<VulkanSemaphore>), RhiError> {
    let make = |device: &Arc<ash::Device>| -> Result<VulkanSemaphore, RhiError> {
        let info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.create_semaphore(&info, None) }.map_err(|e| RhiError::AllocationFailure(format!("vkCreateSemaphore failed: {e:?}")))?;
        Ok(VulkanSemaphore { device: device.clone(), semaphore })
    };
    let acquire = (0..count.max(1)).map(|_| make(device)).collect::<Result<Vec<_>, _>>()?;
    let render_complete = (0..count.max(1)).map(|_| make(device)).collect::<Result<Vec<_>, _>>()?;
    Ok((acquire, render_complete))
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        unsafe { self.swapchain_loader.destroy_swapchain(self.swapchain, None) };
    }
}

impl std::fmt::Debug for VulkanSwapchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanSwapchain").field("extent", &self.extent).field("image_count", &self.images.len()).finish()
    }
}

impl Swapchain for VulkanSwapchain {
    fn acquire_next_image(&mut self) -> Result<SwapchainFrame<'_>, RhiError> {
        let slot = self.frame_index % self.acquire_semaphores.len();
        let acquire_semaphore = &self.acquire_semaphores[slot];
        let (index, suboptimal) =
            unsafe { self.swapchain_loader.acquire_next_image(self.swapchain, u64::MAX, acquire_semaphore.semaphore, vk::Fence::null()) }.map_err(|e| match e {
                vk::Result::ERROR_OUT_OF_DATE_KHR => RhiError::OutOfDate,
                _ => RhiError::DeviceLost(format!("vkAcquireNextImageKHR failed: {e:?}")),
            })?;
        if suboptimal {
            return Err(RhiError::OutOfDate);
        }
        self.frame_index += 1;
        self.current_slot = slot;

        let texture = &self.images[index as usize];
        let render_complete_semaphore = &self.render_complete_semaphores[slot];
        Ok(SwapchainFrame { image_index: index, texture, acquire_semaphore, render_complete_semaphore })
    }

    fn present(&self, image_index: u32) -> Result<(), RhiError> {
        let wait_semas = [self.render_complete_semaphores[self.current_slot].semaphore];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default().wait_semaphores(&wait_semas).swapchains(std::slice::from_ref(&self.swapchain)).image_indices(&image_indices);
        match unsafe { self.swapchain_loader.queue_present(self.queue, &present_info) } {
            Ok(_) => Ok(()),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) | Err(vk::Result::SUBOPTIMAL_KHR) => Err(RhiError::OutOfDate),
            Err(e) => Err(RhiError::DeviceLost(format!("vkQueuePresentKHR failed: {e:?}"))),
        }
    }

    fn extent(&self) -> (u32, u32) {
        self.extent
    }

    fn resize(&mut self, new_extent: (u32, u32)) -> Result<(), RhiError> {
        let built = build_swapchain(&self.surface_loader, &self.swapchain_loader, self.physical_device, self.surface, new_extent, self.swapchain)?;
        unsafe { self.swapchain_loader.destroy_swapchain(self.swapchain, None) };

        let pixel_format = surface_format_to_pixel_format(built.format);
        self.images = built
            .images
            .iter()
            .map(|image| VulkanSwapchainImage {
                device: self.device.clone(),
                image: *image,
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
                descriptor: TextureDescriptor::texture_2d(built.extent.0, built.extent.1, pixel_format, TextureUsage::COLOR),
            })
            .collect();
        self.swapchain = built.swapchain;
        self.format = built.format;
        self.extent = built.extent;
        self.frame_index = 0;
        self.current_slot = 0;
        Ok(())
    }
}

/// Builds a throwaway `TextureView` over a swapchain image's raw `VkImage`.
/// Swapchain images never go through `create_texture`, so they have no
/// `VulkanTexture` to downcast to; `create_texture_view` routes here when it
/// detects a `VulkanSwapchainImage` instead.
pub(crate) fn create_swapchain_image_view(device: &ash::Device, image: &VulkanSwapchainImage, desc: &crate::TextureViewDescriptor) -> Result<Box<dyn crate::TextureView>, RhiError> {
    let format = desc.format.unwrap_or(image.descriptor.format);
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image.image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(pixel_format_to_vk(format))
        .subresource_range(vk::ImageSubresourceRange::default().aspect_mask(vk::ImageAspectFlags::COLOR).base_mip_level(0).level_count(1).base_array_layer(0).layer_count(1));
    let view = unsafe { device.create_image_view(&view_info, None) }.map_err(|e| RhiError::AllocationFailure(format!("vkCreateImageView failed: {e:?}")))?;
    Ok(Box::new(super::texture::VulkanTextureView::new(image.device.clone(), view, format, SampleCount::X1)))
}
