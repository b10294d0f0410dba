//! Staging-buffer uploads and the thread-local immediate-submission pool that
//! backs them. `create_buffer`/`create_texture`'s `initial_data` and
//! `Device::write_buffer` on device-local memory both need bytes to land in
//! memory the host can't write directly, which means: copy into a host-visible
//! staging buffer, record a transfer command, submit it, and wait — there's no
//! way around a round trip through the GPU.
//!
//! One command pool/buffer/fence triple is kept per thread, reused across
//! calls instead of allocated fresh each time. The pool is rebuilt if the
//! thread is later used to upload to a different `VulkanDevice`.

use std::cell::RefCell;
use std::sync::Arc;

use ash::vk;

use crate::{RhiError, TextureDescriptor};

use super::queue::VulkanQueue;
use super::VulkanDevice;

struct ImmediatePool {
    device: Arc<ash::Device>,
    pool: vk::CommandPool,
    buffer: vk::CommandBuffer,
    fence: vk::Fence,
}

impl ImmediatePool {
    fn new(device: &Arc<ash::Device>, queue_family_index: u32) -> Result<Self, RhiError> {
        let pool_info = vk::CommandPoolCreateInfo::default().queue_family_index(queue_family_index).flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let pool = unsafe { device.create_command_pool(&pool_info, None) }.map_err(|e| RhiError::AllocationFailure(format!("vkCreateCommandPool (immediate upload) failed: {e:?}")))?;

        let alloc_info = vk::CommandBufferAllocateInfo::default().command_pool(pool).level(vk::CommandBufferLevel::PRIMARY).command_buffer_count(1);
        let buffer = match unsafe { device.allocate_command_buffers(&alloc_info) } {
            Ok(bufs) => bufs[0],
            Err(e) => {
                unsafe { device.destroy_command_pool(pool, None) };
                return Err(RhiError::AllocationFailure(format!("vkAllocateCommandBuffers (immediate upload) failed: {e:?}")));
            }
        };

        let fence = match unsafe { device.create_fence(&vk::FenceCreateInfo::default(), None) } {
            Ok(f) => f,
            Err(e) => {
                unsafe { device.destroy_command_pool(pool, None) };
                return Err(RhiError::AllocationFailure(format!("vkCreateFence (immediate upload) failed: {e:?}")));
            }
        };

        Ok(Self { device: device.clone(), pool, buffer, fence })
    }
}

impl Drop for ImmediatePool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}

thread_local! {
    static IMMEDIATE_POOL: RefCell<Option<ImmediatePool>> = const { RefCell::new(None) };
}

/// Records `record` into a thread-local one-shot command buffer, submits it to
/// `queue`, and blocks until the GPU is done. Callers append transfer commands
/// (copies, pre/post barriers) inside `record`; this function owns begin/end,
/// submission, and the wait.
fn run_immediate<R>(device: &Arc<ash::Device>, queue: &VulkanQueue, queue_family_index: u32, record: impl FnOnce(vk::CommandBuffer) -> R) -> Result<R, RhiError> {
    IMMEDIATE_POOL.with(|cell| {
        let mut slot = cell.borrow_mut();
        let stale = !matches!(slot.as_ref(), Some(p) if Arc::ptr_eq(&p.device, device));
        if stale {
            *slot = Some(ImmediatePool::new(device, queue_family_index)?);
        }
        let pool = slot.as_mut().expect("initialized above");

        unsafe { device.reset_command_pool(pool.pool, vk::CommandPoolResetFlags::empty()) }.map_err(|e| RhiError::ValidationFailure(format!("vkResetCommandPool (immediate upload) failed: {e:?}")))?;
        let begin_info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.begin_command_buffer(pool.buffer, &begin_info) }.map_err(|e| RhiError::ValidationFailure(format!("vkBeginCommandBuffer (immediate upload) failed: {e:?}")))?;

        let result = record(pool.buffer);

        unsafe { device.end_command_buffer(pool.buffer) }.map_err(|e| RhiError::ValidationFailure(format!("vkEndCommandBuffer (immediate upload) failed: {e:?}")))?;

        let buffers = [pool.buffer];
        let submit_info = vk::SubmitInfo::default().command_buffers(&buffers);
        unsafe { device.reset_fences(&[pool.fence]) }.map_err(|e| RhiError::DeviceLost(format!("{e:?}")))?;
        queue.submit_raw(&submit_info, pool.fence)?;
        unsafe { device.wait_for_fences(&[pool.fence], true, u64::MAX) }.map_err(|e| RhiError::DeviceLost(format!("vkWaitForFences (immediate upload) failed: {e:?}")))?;

        Ok(result)
    })
}

fn create_staging_buffer(device: &VulkanDevice, bytes: &[u8]) -> Result<(vk::Buffer, vk::DeviceMemory), RhiError> {
    let raw = device.raw();
    let size = (bytes.len() as u64).max(1);
    let info = vk::BufferCreateInfo::default().size(size).usage(vk::BufferUsageFlags::TRANSFER_SRC).sharing_mode(vk::SharingMode::EXCLUSIVE);
    let buffer = unsafe { raw.create_buffer(&info, None) }.map_err(|e| RhiError::AllocationFailure(format!("vkCreateBuffer (staging) failed: {e:?}")))?;

    let requirements = unsafe { raw.get_buffer_memory_requirements(buffer) };
    let memory_type = device
        .find_memory_type(requirements.memory_type_bits, vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT, vk::MemoryPropertyFlags::HOST_VISIBLE)
        .map_err(|e| {
            unsafe { raw.destroy_buffer(buffer, None) };
            e
        })?;
    let alloc_info = vk::MemoryAllocateInfo::default().allocation_size(requirements.size).memory_type_index(memory_type);
    let memory = unsafe { raw.allocate_memory(&alloc_info, None) }.map_err(|e| {
        unsafe { raw.destroy_buffer(buffer, None) };
        RhiError::AllocationFailure(format!("vkAllocateMemory (staging) failed: {e:?}"))
    })?;
    unsafe { raw.bind_buffer_memory(buffer, memory, 0) }.map_err(|e| RhiError::AllocationFailure(format!("vkBindBufferMemory (staging) failed: {e:?}")))?;

    if !bytes.is_empty() {
        unsafe {
            let ptr = raw.map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty()).map_err(|e| RhiError::AllocationFailure(format!("{e:?}")))? as *mut u8;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
            raw.unmap_memory(memory);
        }
    }
    Ok((buffer, memory))
}

fn destroy_staging_buffer(device: &VulkanDevice, buffer: vk::Buffer, memory: vk::DeviceMemory) {
    let raw = device.raw();
    unsafe {
        raw.destroy_buffer(buffer, None);
        raw.free_memory(memory, None);
    }
}

/// Uploads `bytes` into `dst` at `dst_offset` via a staging buffer and an
/// immediate command submission. Blocks until the copy completes.
pub(crate) fn upload_buffer_via_staging(device: &VulkanDevice, dst: vk::Buffer, dst_offset: u64, bytes: &[u8]) -> Result<(), RhiError> {
    if bytes.is_empty() {
        return Ok(());
    }
    let (staging, staging_memory) = create_staging_buffer(device, bytes)?;
    let (queue, queue_family_index) = device.immediate_upload_queue();
    let raw = device.raw();
    let result = run_immediate(&device.raw_arc(), queue, queue_family_index, |cb| {
        let region = vk::BufferCopy::default().src_offset(0).dst_offset(dst_offset).size(bytes.len() as u64);
        unsafe { raw.cmd_copy_buffer(cb, staging, dst, &[region]) };
    });
    destroy_staging_buffer(device, staging, staging_memory);
    result
}

/// Uploads a tightly packed per-layer mip chain into `image` via a staging
/// buffer, transitioning it `Undefined -> TransferDstOptimal -> final_layout`
/// in the same immediate submission.
pub(crate) fn upload_texture_via_staging(device: &VulkanDevice, image: vk::Image, desc: &TextureDescriptor, bytes: &[u8], final_layout: vk::ImageLayout) -> Result<(), RhiError> {
    if bytes.is_empty() {
        return Ok(());
    }
    let (staging, staging_memory) = create_staging_buffer(device, bytes)?;
    let (queue, queue_family_index) = device.immediate_upload_queue();
    let raw = device.raw();
    let aspect = if desc.format.is_depth() { vk::ImageAspectFlags::DEPTH } else { vk::ImageAspectFlags::COLOR };
    let mip_levels = desc.mip_levels.max(1);
    let array_layers = desc.array_layers.max(1);
    let (width, height, depth) = desc.extent;

    let mut regions = Vec::with_capacity((mip_levels * array_layers) as usize);
    let mut offset = 0u64;
    for layer in 0..array_layers {
        for mip in 0..mip_levels {
            let mip_w = (width.max(1) >> mip).max(1);
            let mip_h = (height.max(1) >> mip).max(1);
            let mip_d = (depth.max(1) >> mip).max(1);
            let (level_bytes, _) = desc.format.level_size(mip_w, mip_h);
            let level_bytes = level_bytes * mip_d as u64;
            regions.push(
                vk::BufferImageCopy::default()
                    .buffer_offset(offset)
                    .image_subresource(vk::ImageSubresourceLayers::default().aspect_mask(aspect).mip_level(mip).base_array_layer(layer).layer_count(1))
                    .image_extent(vk::Extent3D { width: mip_w, height: mip_h, depth: mip_d }),
            );
            offset += level_bytes;
        }
    }

    let subresource_range = vk::ImageSubresourceRange::default().aspect_mask(aspect).base_mip_level(0).level_count(mip_levels).base_array_layer(0).layer_count(array_layers);
    let result = run_immediate(&device.raw_arc(), queue, queue_family_index, |cb| {
        let to_transfer = vk::ImageMemoryBarrier::default()
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .image(image)
            .subresource_range(subresource_range);
        unsafe { raw.cmd_pipeline_barrier(cb, vk::PipelineStageFlags::TOP_OF_PIPE, vk::PipelineStageFlags::TRANSFER, vk::DependencyFlags::empty(), &[], &[], &[to_transfer]) };

        unsafe { raw.cmd_copy_buffer_to_image(cb, staging, image, vk::ImageLayout::TRANSFER_DST_OPTIMAL, &regions) };

        let to_final = vk::ImageMemoryBarrier::default()
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(final_layout)
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ | vk::AccessFlags::MEMORY_READ)
            .image(image)
            .subresource_range(subresource_range);
        unsafe { raw.cmd_pipeline_barrier(cb, vk::PipelineStageFlags::TRANSFER, vk::PipelineStageFlags::BOTTOM_OF_PIPE, vk::DependencyFlags::empty(), &[], &[], &[to_final]) };
    });
    destroy_staging_buffer(device, staging, staging_memory);
    result
}
