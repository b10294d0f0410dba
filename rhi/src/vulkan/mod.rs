//! Vulkan backend for the render hardware interface.

mod buffer;
mod command_pool;
mod descriptor;
mod pipeline;
mod queue;
mod render_pass;
mod sampler;
mod texture;
mod upload;

#[cfg(feature = "window")]
mod swapchain;

use std::collections::HashMap;
use std::ffi::CString;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ash::vk;
use log::{debug, info, warn};
use parking_lot::{Mutex, ReentrantMutex};

use crate::config::DeviceConfig;
use crate::{AccessState, ImageLayout as RgImageLayout, RhiError};

pub use buffer::VulkanBuffer;
pub use command_pool::CommandBufferPool;
pub use descriptor::{VulkanDescriptorPool, VulkanDescriptorSet, VulkanDescriptorSetLayout};
pub use pipeline::{VulkanComputePipeline, VulkanRasterPipeline};
pub use queue::VulkanQueue;
pub use render_pass::{FramebufferCache, RenderPassCache};
pub use sampler::VulkanSampler;
pub use texture::VulkanTexture;

#[cfg(feature = "window")]
pub use swapchain::{VulkanSwapchain, VulkanSwapchainImage};

/// Returns validation layer names to enable, honoring both the `validation`
/// feature and the `LUME_VALIDATION` environment toggle (kept from the
/// engine this crate's device setup descends from).
#[cfg(feature = "validation")]
fn validation_layer_names(entry: &ash::Entry) -> Vec<CString> {
    let disable = std::env::var("LUME_VALIDATION").is_ok_and(|v| v == "0" || v.eq_ignore_ascii_case("false"));
    if disable {
        return vec![];
    }
    let layers = match unsafe { entry.enumerate_instance_layer_properties() } {
        Ok(l) => l,
        Err(_) => return vec![],
    };
    const KHRONOS: &str = "VK_LAYER_KHRONOS_validation";
    for prop in &layers {
        let name = unsafe { std::ffi::CStr::from_ptr(prop.layer_name.as_ptr()).to_string_lossy() };
        if name == KHRONOS {
            return vec![CString::new(KHRONOS).unwrap()];
        }
    }
    vec![]
}

#[cfg(not(feature = "validation"))]
fn validation_layer_names(_entry: &ash::Entry) -> Vec<CString> {
    if std::env::var("LUME_VALIDATION").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true")) {
        eprintln!("LUME_VALIDATION=1 set but rg-rhi built without the 'validation' feature; validation layers unavailable");
    }
    vec![]
}

pub(crate) fn image_layout_to_vk(l: RgImageLayout) -> vk::ImageLayout {
    match l {
        RgImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        RgImageLayout::General => vk::ImageLayout::GENERAL,
        RgImageLayout::ColorAttachmentOptimal => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        RgImageLayout::DepthStencilAttachmentOptimal => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        RgImageLayout::DepthStencilReadOnlyOptimal => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        RgImageLayout::ShaderReadOnlyOptimal => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        RgImageLayout::TransferSrcOptimal => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        RgImageLayout::TransferDstOptimal => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        RgImageLayout::PresentSrcKhr => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

pub(crate) fn stage_mask_to_vk(mask: crate::StageMask) -> vk::PipelineStageFlags {
    use crate::StageMask as S;
    let mut out = vk::PipelineStageFlags::empty();
    let table: &[(S, vk::PipelineStageFlags)] = &[
        (S::TOP_OF_PIPE, vk::PipelineStageFlags::TOP_OF_PIPE),
        (S::BOTTOM_OF_PIPE, vk::PipelineStageFlags::BOTTOM_OF_PIPE),
        (S::DRAW_INDIRECT, vk::PipelineStageFlags::DRAW_INDIRECT),
        (S::VERTEX_INPUT, vk::PipelineStageFlags::VERTEX_INPUT),
        (S::VERTEX_SHADER, vk::PipelineStageFlags::VERTEX_SHADER),
        (S::FRAGMENT_SHADER, vk::PipelineStageFlags::FRAGMENT_SHADER),
        (S::EARLY_FRAGMENT, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS),
        (S::LATE_FRAGMENT, vk::PipelineStageFlags::LATE_FRAGMENT_TESTS),
        (S::COLOR_OUTPUT, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT),
        (S::COMPUTE_SHADER, vk::PipelineStageFlags::COMPUTE_SHADER),
        (S::TRANSFER, vk::PipelineStageFlags::TRANSFER),
        (S::HOST, vk::PipelineStageFlags::HOST),
    ];
    for (bit, vk_bit) in table {
        if mask.contains(*bit) {
            out |= *vk_bit;
        }
    }
    out
}

pub(crate) fn access_mask_to_vk(mask: crate::AccessMask) -> vk::AccessFlags {
    use crate::AccessMask as A;
    let mut out = vk::AccessFlags::empty();
    let table: &[(A, vk::AccessFlags)] = &[
        (A::INDIRECT_COMMAND_READ, vk::AccessFlags::INDIRECT_COMMAND_READ),
        (A::INDEX_READ, vk::AccessFlags::INDEX_READ),
        (A::VERTEX_ATTRIBUTE_READ, vk::AccessFlags::VERTEX_ATTRIBUTE_READ),
        (A::UNIFORM_READ, vk::AccessFlags::UNIFORM_READ),
        (A::SHADER_READ, vk::AccessFlags::SHADER_READ),
        (A::SHADER_WRITE, vk::AccessFlags::SHADER_WRITE),
        (A::COLOR_ATTACHMENT_READ, vk::AccessFlags::COLOR_ATTACHMENT_READ),
        (A::COLOR_ATTACHMENT_WRITE, vk::AccessFlags::COLOR_ATTACHMENT_WRITE),
        (A::DEPTH_STENCIL_READ, vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ),
        (A::DEPTH_STENCIL_WRITE, vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE),
        (A::TRANSFER_READ, vk::AccessFlags::TRANSFER_READ),
        (A::TRANSFER_WRITE, vk::AccessFlags::TRANSFER_WRITE),
        (A::HOST_READ, vk::AccessFlags::HOST_READ),
        (A::HOST_WRITE, vk::AccessFlags::HOST_WRITE),
        (A::MEMORY_READ, vk::AccessFlags::MEMORY_READ),
        (A::MEMORY_WRITE, vk::AccessFlags::MEMORY_WRITE),
    ];
    for (bit, vk_bit) in table {
        if mask.contains(*bit) {
            out |= *vk_bit;
        }
    }
    out
}

/// One resource awaiting destruction once the frame slot that queued it comes
/// back around (guaranteeing no in-flight command buffer still references it).
pub(crate) enum DeferredDestroy {
    Buffer(Box<dyn crate::Buffer>),
    Texture(Box<dyn crate::Texture>),
}

struct FrameSlot {
    fence: vk::Fence,
    deferred: Vec<DeferredDestroy>,
    graphics_pool: CommandBufferPool,
}

pub struct VulkanDevice {
    #[allow(dead_code)]
    entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: Arc<ash::Device>,
    queue: VulkanQueue,
    queue_family_index: u32,
    transfer_queue: Option<VulkanQueue>,
    next_id: Arc<AtomicU64>,
    /// Guards object creation/destruction. Re-entrant because `begin_frame`
    /// may flush a deferred-destroy queue (itself a destroy path) from within
    /// a call already holding the lock for creation of the next frame's pool.
    creation_lock: ReentrantMutex<()>,
    frame_slots: Mutex<Vec<FrameSlot>>,
    current_slot: AtomicU64,
    pub(crate) render_pass_cache: Arc<Mutex<RenderPassCache>>,
    pub(crate) framebuffer_cache: Arc<Mutex<FramebufferCache>>,
    /// Immutable samplers baked into `DescriptorType::StaticSampler`
    /// bindings, deduplicated by `SamplerDescriptor::static_key()`.
    static_samplers: Mutex<HashMap<String, vk::Sampler>>,
    config: DeviceConfig,
    #[cfg(feature = "window")]
    surface_state: Option<SurfaceState>,
}

#[cfg(feature = "window")]
struct SurfaceState {
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
}

impl std::fmt::Debug for VulkanDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanDevice").field("physical_device", &self.physical_device).finish_non_exhaustive()
    }
}

impl VulkanDevice {
    /// Creates a headless device (no surface). Window-capable construction
    /// goes through `new_with_surface` behind the `window` feature.
    pub fn new(config: DeviceConfig) -> Result<Arc<Self>, RhiError> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| RhiError::ValidationFailure(format!("failed to load Vulkan: {e}")))?;

        let app_info = vk::ApplicationInfo::default().api_version(vk::API_VERSION_1_2);
        let layers = if config.enable_validation { validation_layer_names(&entry) } else { vec![] };
        let layer_ptrs: Vec<_> = layers.iter().map(|c| c.as_ptr()).collect();
        let instance_info = vk::InstanceCreateInfo::default().application_info(&app_info).enabled_layer_names(&layer_ptrs);
        let instance = unsafe { entry.create_instance(&instance_info, None) }
            .map_err(|e| RhiError::ValidationFailure(format!("vkCreateInstance failed: {e:?}")))?;

        let physical_device = unsafe { instance.enumerate_physical_devices() }
            .map_err(|e| RhiError::ValidationFailure(format!("vkEnumeratePhysicalDevices failed: {e:?}")))?
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::ValidationFailure("no Vulkan physical devices found".into()))?;

        let queue_family_properties = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        let queue_family_index = queue_family_properties
            .iter()
            .position(|p| p.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .ok_or_else(|| RhiError::ValidationFailure("no graphics-capable queue family".into()))? as u32;
        let transfer_family_index = queue_family_properties
            .iter()
            .enumerate()
            .position(|(i, p)| i as u32 != queue_family_index && p.queue_flags.contains(vk::QueueFlags::TRANSFER))
            .map(|i| i as u32);

        let priorities = [1.0f32];
        let mut queue_infos = vec![vk::DeviceQueueCreateInfo::default().queue_family_index(queue_family_index).queue_priorities(&priorities)];
        if let Some(tf) = transfer_family_index {
            queue_infos.push(vk::DeviceQueueCreateInfo::default().queue_family_index(tf).queue_priorities(&priorities));
        }
        let device_info = vk::DeviceCreateInfo::default().queue_create_infos(&queue_infos);
        let device = unsafe { instance.create_device(physical_device, &device_info, None) }
            .map_err(|e| RhiError::ValidationFailure(format!("vkCreateDevice failed: {e:?}")))?;
        let device = Arc::new(device);

        let raw_queue = unsafe { device.get_device_queue(queue_family_index, 0) };
        let queue = VulkanQueue::new(device.clone(), raw_queue);
        let transfer_queue = transfer_family_index.map(|tf| {
            let raw = unsafe { device.get_device_queue(tf, 0) };
            VulkanQueue::new(device.clone(), raw)
        });

        info!("vulkan device created: frames_in_flight={}", config.frames_in_flight);

        let mut frame_slots = Vec::with_capacity(config.frames_in_flight as usize);
        for _ in 0..config.frames_in_flight {
            let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
            let fence = unsafe { device.create_fence(&fence_info, None) }
                .map_err(|e| RhiError::ValidationFailure(format!("vkCreateFence failed: {e:?}")))?;
            let graphics_pool = CommandBufferPool::new(device.clone(), queue_family_index, config.max_command_buffers_per_pool)?;
            frame_slots.push(FrameSlot { fence, deferred: Vec::new(), graphics_pool });
        }

        Ok(Arc::new(Self {
            entry,
            instance,
            physical_device,
            device,
            queue,
            queue_family_index,
            transfer_queue,
            next_id: Arc::new(AtomicU64::new(1)),
            creation_lock: ReentrantMutex::new(()),
            frame_slots: Mutex::new(frame_slots),
            current_slot: AtomicU64::new(0),
            render_pass_cache: Arc::new(Mutex::new(RenderPassCache::default())),
            framebuffer_cache: Arc::new(Mutex::new(FramebufferCache::default())),
            static_samplers: Mutex::new(HashMap::new()),
            config,
            #[cfg(feature = "window")]
            surface_state: None,
        }))
    }

    /// Creates a Vulkan device bound to a window surface, for presentation.
    /// Only Win32 window handles are currently supported.
    #[cfg(feature = "window")]
    pub fn new_with_surface(window: &dyn raw_window_handle::HasWindowHandle, config: DeviceConfig) -> Result<Arc<Self>, RhiError> {
        use raw_window_handle::{HasWindowHandle, RawWindowHandle};

        let handle = window.window_handle().map_err(|e| RhiError::ValidationFailure(format!("window_handle: {e:?}")))?;
        let (hwnd, hinstance) = match handle.as_raw() {
            RawWindowHandle::Win32(win) => (win.hwnd.get() as isize, win.hinstance.map(|h| h.get() as isize).unwrap_or(0)),
            _ => return Err(RhiError::ValidationFailure("only Win32 window handles are supported".into())),
        };

        let entry = unsafe { ash::Entry::load() }.map_err(|e| RhiError::ValidationFailure(format!("failed to load Vulkan: {e}")))?;
        let app_info = vk::ApplicationInfo::default().api_version(vk::API_VERSION_1_2);
        let layers = if config.enable_validation { validation_layer_names(&entry) } else { vec![] };
        let layer_ptrs: Vec<_> = layers.iter().map(|c| c.as_ptr()).collect();
        let ext_names = [ash::khr::surface::NAME.as_ptr(), ash::khr::win32_surface::NAME.as_ptr()];
        let instance_info = vk::InstanceCreateInfo::default().application_info(&app_info).enabled_extension_names(&ext_names).enabled_layer_names(&layer_ptrs);
        let instance = unsafe { entry.create_instance(&instance_info, None) }.map_err(|e| RhiError::ValidationFailure(format!("vkCreateInstance failed: {e:?}")))?;

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
        let win32_loader = ash::khr::win32_surface::Instance::new(&entry, &instance);
        let win32_info = vk::Win32SurfaceCreateInfoKHR::default().hinstance(hinstance).hwnd(hwnd);
        let surface = unsafe { win32_loader.create_win32_surface(&win32_info, None) }.map_err(|e| RhiError::ValidationFailure(format!("vkCreateWin32SurfaceKHR failed: {e:?}")))?;

        let physical_device = unsafe { instance.enumerate_physical_devices() }
            .map_err(|e| RhiError::ValidationFailure(format!("vkEnumeratePhysicalDevices failed: {e:?}")))?
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::ValidationFailure("no Vulkan physical devices found".into()))?;

        let queue_family_properties = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        let queue_family_index = queue_family_properties
            .iter()
            .enumerate()
            .position(|(i, p)| {
                p.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                    && unsafe { surface_loader.get_physical_device_surface_support(physical_device, i as u32, surface) }.unwrap_or(false)
            })
            .ok_or_else(|| RhiError::ValidationFailure("no queue family with graphics and present support".into()))? as u32;
        let transfer_family_index = queue_family_properties
            .iter()
            .enumerate()
            .position(|(i, p)| i as u32 != queue_family_index && p.queue_flags.contains(vk::QueueFlags::TRANSFER))
            .map(|i| i as u32);

        let priorities = [1.0f32];
        let mut queue_infos = vec![vk::DeviceQueueCreateInfo::default().queue_family_index(queue_family_index).queue_priorities(&priorities)];
        if let Some(tf) = transfer_family_index {
            queue_infos.push(vk::DeviceQueueCreateInfo::default().queue_family_index(tf).queue_priorities(&priorities));
        }
        let device_ext_names = [ash::khr::swapchain::NAME.as_ptr()];
        let device_info = vk::DeviceCreateInfo::default().queue_create_infos(&queue_infos).enabled_extension_names(&device_ext_names);
        let device = unsafe { instance.create_device(physical_device, &device_info, None) }.map_err(|e| RhiError::ValidationFailure(format!("vkCreateDevice failed: {e:?}")))?;
        let device = Arc::new(device);

        let raw_queue = unsafe { device.get_device_queue(queue_family_index, 0) };
        let queue = VulkanQueue::new(device.clone(), raw_queue);
        let transfer_queue = transfer_family_index.map(|tf| {
            let raw = unsafe { device.get_device_queue(tf, 0) };
            VulkanQueue::new(device.clone(), raw)
        });
        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);

        info!("vulkan device created with surface: frames_in_flight={}", config.frames_in_flight);

        let mut frame_slots = Vec::with_capacity(config.frames_in_flight as usize);
        for _ in 0..config.frames_in_flight {
            let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
            let fence = unsafe { device.create_fence(&fence_info, None) }.map_err(|e| RhiError::ValidationFailure(format!("vkCreateFence failed: {e:?}")))?;
            let graphics_pool = CommandBufferPool::new(device.clone(), queue_family_index, config.max_command_buffers_per_pool)?;
            frame_slots.push(FrameSlot { fence, deferred: Vec::new(), graphics_pool });
        }

        Ok(Arc::new(Self {
            entry,
            instance,
            physical_device,
            device,
            queue,
            queue_family_index,
            transfer_queue,
            next_id: Arc::new(AtomicU64::new(1)),
            creation_lock: ReentrantMutex::new(()),
            frame_slots: Mutex::new(frame_slots),
            current_slot: AtomicU64::new(0),
            render_pass_cache: Arc::new(Mutex::new(RenderPassCache::default())),
            framebuffer_cache: Arc::new(Mutex::new(FramebufferCache::default())),
            static_samplers: Mutex::new(HashMap::new()),
            config,
            surface_state: Some(SurfaceState { surface, surface_loader, swapchain_loader }),
        }))
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn find_memory_type(&self, type_bits: u32, preferred: vk::MemoryPropertyFlags, fallback: vk::MemoryPropertyFlags) -> Result<u32, RhiError> {
        let props = unsafe { self.instance.get_physical_device_memory_properties(self.physical_device) };
        for pass in [preferred, fallback] {
            for i in 0..props.memory_type_count {
                if type_bits & (1 << i) != 0 && props.memory_types[i as usize].property_flags.contains(pass) {
                    return Ok(i);
                }
            }
        }
        Err(RhiError::AllocationFailure("no matching Vulkan memory type".into()))
    }

    fn slot_index(&self) -> usize {
        (self.current_slot.load(Ordering::Relaxed) as usize) % self.config.frames_in_flight as usize
    }

    pub(crate) fn raw(&self) -> &ash::Device {
        &self.device
    }

    pub(crate) fn raw_arc(&self) -> Arc<ash::Device> {
        self.device.clone()
    }

    /// Queue (and its family) that staging uploads submit to. Always the main
    /// graphics queue: graphics queues always support transfer operations, and
    /// a dedicated transfer queue family isn't tracked on `VulkanDevice` today.
    pub(crate) fn immediate_upload_queue(&self) -> (&VulkanQueue, u32) {
        (&self.queue, self.queue_family_index)
    }

    /// Returns the immutable sampler for `desc`, creating it on first use.
    /// Backing storage for `DescriptorType::StaticSampler` bindings.
    pub(crate) fn get_or_create_static_sampler(&self, desc: &crate::SamplerDescriptor) -> Result<vk::Sampler, RhiError> {
        let key = desc.static_key();
        let mut table = self.static_samplers.lock();
        if let Some(sampler) = table.get(&key) {
            return Ok(*sampler);
        }
        let sampler = sampler::create_raw(&self.device, desc)?;
        table.insert(key, sampler);
        Ok(sampler)
    }
}

impl crate::Device for VulkanDevice {
    fn create_buffer(&self, desc: &crate::BufferDescriptor) -> Result<Box<dyn crate::Buffer>, RhiError> {
        let _guard = self.creation_lock.lock();
        buffer::create_buffer(self, desc, self.next_id())
    }

    fn create_texture(&self, desc: &crate::TextureDescriptor) -> Result<Box<dyn crate::Texture>, RhiError> {
        let _guard = self.creation_lock.lock();
        texture::create_texture(self, desc, self.next_id())
    }

    fn create_texture_view(&self, texture: &dyn crate::Texture, desc: &crate::TextureViewDescriptor) -> Result<Box<dyn crate::TextureView>, RhiError> {
        let _guard = self.creation_lock.lock();
        texture::create_texture_view(self, texture, desc)
    }

    fn create_sampler(&self, desc: &crate::SamplerDescriptor) -> Result<Box<dyn crate::Sampler>, RhiError> {
        let _guard = self.creation_lock.lock();
        sampler::create_sampler(self, desc)
    }

    fn create_raster_pipeline(&self, desc: &crate::RasterPipelineDescriptor) -> Result<Box<dyn crate::RasterPipeline>, RhiError> {
        desc.validate()?;
        let _guard = self.creation_lock.lock();
        pipeline::create_raster_pipeline(self, desc)
    }

    fn create_compute_pipeline(&self, desc: &crate::ComputePipelineDescriptor) -> Result<Box<dyn crate::ComputePipeline>, RhiError> {
        desc.validate()?;
        let _guard = self.creation_lock.lock();
        pipeline::create_compute_pipeline(self, desc)
    }

    fn create_descriptor_set_layout(&self, bindings: &[crate::DescriptorSetLayoutBinding]) -> Result<Box<dyn crate::DescriptorSetLayout>, RhiError> {
        let _guard = self.creation_lock.lock();
        descriptor::create_descriptor_set_layout(self, bindings)
    }

    fn create_descriptor_pool(&self, max_sets: u32) -> Result<Box<dyn crate::DescriptorPool>, RhiError> {
        let _guard = self.creation_lock.lock();
        descriptor::create_descriptor_pool(self, max_sets)
    }

    fn begin_frame(&self) -> Result<(), RhiError> {
        let idx = self.slot_index();
        let mut slots = self.frame_slots.lock();
        let slot = &mut slots[idx];
        unsafe { self.device.wait_for_fences(&[slot.fence], true, u64::MAX) }
            .map_err(|e| RhiError::DeviceLost(format!("vkWaitForFences failed: {e:?}")))?;
        unsafe { self.device.reset_fences(&[slot.fence]) }.map_err(|e| RhiError::DeviceLost(format!("{e:?}")))?;

        let drained = slot.deferred.len();
        slot.deferred.clear();
        if drained > 0 {
            debug!("frame slot {idx}: released {drained} deferred-destroy resource(s)");
        }
        slot.graphics_pool.reset()?;
        Ok(())
    }

    fn end_frame(&self) {
        self.current_slot.fetch_add(1, Ordering::Relaxed);
    }

    fn create_command_encoder(&self) -> Box<dyn crate::CommandEncoder> {
        let idx = self.slot_index();
        let mut slots = self.frame_slots.lock();
        let cb = slots[idx].graphics_pool.acquire().expect("command buffer pool exhausted and failed to grow");
        Box::new(crate::vulkan::command_pool::VulkanCommandEncoder::new(self.device.clone(), cb, self.render_pass_cache.clone(), self.framebuffer_cache.clone()))
    }

    fn queue(&self) -> &dyn crate::Queue {
        &self.queue
    }

    fn transfer_queue(&self) -> Option<&dyn crate::Queue> {
        self.transfer_queue.as_ref().map(|q| q as &dyn crate::Queue)
    }

    fn write_buffer(&self, buffer: &dyn crate::Buffer, offset: u64, data: &[u8]) -> Result<(), RhiError> {
        let vb = buffer
            .as_any()
            .downcast_ref::<VulkanBuffer>()
            .ok_or_else(|| RhiError::ValidationFailure("write_buffer given a non-Vulkan buffer".into()))?;
        if vb.is_host_visible() {
            return vb.write(offset, data);
        }
        if offset + data.len() as u64 > vb.descriptor().allocated_size {
            return Err(RhiError::ValidationFailure("write_buffer range exceeds buffer size".into()));
        }
        upload::upload_buffer_via_staging(self, vb.buffer, offset, data)
    }

    fn wait_idle(&self) -> Result<(), RhiError> {
        unsafe { self.device.device_wait_idle() }.map_err(|e| RhiError::DeviceLost(format!("vkDeviceWaitIdle failed: {e:?}")))
    }

    fn create_fence(&self, signaled: bool) -> Result<Box<dyn crate::Fence>, RhiError> {
        let mut flags = vk::FenceCreateFlags::empty();
        if signaled {
            flags |= vk::FenceCreateFlags::SIGNALED;
        }
        let info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { self.device.create_fence(&info, None) }.map_err(|e| RhiError::AllocationFailure(format!("{e:?}")))?;
        Ok(Box::new(queue::VulkanFence { device: self.device.clone(), fence }))
    }

    fn create_semaphore(&self) -> Result<Box<dyn crate::Semaphore>, RhiError> {
        let info = vk::SemaphoreCreateInfo::default();
        let sem = unsafe { self.device.create_semaphore(&info, None) }.map_err(|e| RhiError::AllocationFailure(format!("{e:?}")))?;
        Ok(Box::new(queue::VulkanSemaphore { device: self.device.clone(), semaphore: sem }))
    }

    #[cfg(feature = "window")]
    fn create_swapchain(&self, extent: (u32, u32)) -> Result<Box<dyn crate::Swapchain>, RhiError> {
        let state = self.surface_state.as_ref().ok_or_else(|| RhiError::ValidationFailure("device was created without a surface".into()))?;
        let swapchain = swapchain::VulkanSwapchain::new(
            self.device.clone(),
            state.surface_loader.clone(),
            state.swapchain_loader.clone(),
            self.physical_device,
            state.surface,
            self.queue.raw(),
            extent,
            self.next_id.clone(),
        )?;
        Ok(Box::new(swapchain))
    }

    fn defer_destroy_buffer(&self, buffer: Box<dyn crate::Buffer>) {
        let idx = self.slot_index();
        self.frame_slots.lock()[idx].deferred.push(DeferredDestroy::Buffer(buffer));
    }

    fn defer_destroy_texture(&self, texture: Box<dyn crate::Texture>) {
        let idx = self.slot_index();
        self.frame_slots.lock()[idx].deferred.push(DeferredDestroy::Texture(texture));
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        let _ = unsafe { self.device.device_wait_idle() };
        warn!("dropping VulkanDevice, caches and frame slots released");
        self.render_pass_cache.lock().destroy_all(&self.device);
        self.framebuffer_cache.lock().destroy_all(&self.device);
        for sampler in self.static_samplers.lock().values() {
            unsafe { self.device.destroy_sampler(*sampler, None) };
        }
        unsafe {
            #[cfg(feature = "window")]
            if let Some(surface) = &self.surface_state {
                surface.surface_loader.destroy_surface(surface.surface, None);
            }
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
