use std::sync::Arc;

use ash::vk;

use crate::{CommandBuffer, Fence, Queue, RhiError, Semaphore};

pub struct VulkanQueue {
    device: Arc<ash::Device>,
    queue: vk::Queue,
    submit_lock: parking_lot::Mutex<()>,
}

impl VulkanQueue {
    pub(crate) fn new(device: Arc<ash::Device>, queue: vk::Queue) -> Self {
        Self { device, queue, submit_lock: parking_lot::Mutex::new(()) }
    }

    pub(crate) fn raw(&self) -> vk::Queue {
        self.queue
    }

    /// Submits a single `VkSubmitInfo` directly, guarded by the same lock
    /// `submit()` uses. Backs the immediate-command-buffer upload path, which
    /// has no `CommandBuffer`/`Fence` trait objects to hand to `submit()`.
    pub(crate) fn submit_raw(&self, submit_info: &vk::SubmitInfo, fence: vk::Fence) -> Result<(), RhiError> {
        let _guard = self.submit_lock.lock();
        unsafe { self.device.queue_submit(self.queue, std::slice::from_ref(submit_info), fence) }.map_err(|e| RhiError::DeviceLost(format!("vkQueueSubmit (immediate) failed: {e:?}")))
    }
}

impl std::fmt::Debug for VulkanQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanQueue").finish()
    }
}

impl Queue for VulkanQueue {
    fn submit(&self, command_buffers: &[&dyn CommandBuffer], wait_semaphores: &[&dyn Semaphore], signal_semaphores: &[&dyn Semaphore], signal_fence: Option<&dyn Fence>) -> Result<(), RhiError> {
        let vk_buffers: Vec<vk::CommandBuffer> = command_buffers.iter().filter_map(|b| b.as_any().downcast_ref::<super::command_pool::VulkanCommandBuffer>().map(|vb| vb.raw())).collect();
        if vk_buffers.is_empty() {
            return Ok(());
        }

        let wait_semas: Vec<vk::Semaphore> = wait_semaphores.iter().filter_map(|s| s.as_any().downcast_ref::<VulkanSemaphore>().map(|vs| vs.semaphore)).collect();
        let signal_semas: Vec<vk::Semaphore> = signal_semaphores.iter().filter_map(|s| s.as_any().downcast_ref::<VulkanSemaphore>().map(|vs| vs.semaphore)).collect();
        let fence = signal_fence.and_then(|f| f.as_any().downcast_ref::<VulkanFence>().map(|vf| vf.fence)).unwrap_or(vk::Fence::null());

        let wait_stages = vec![vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT; wait_semas.len()];
        let submit_info = vk::SubmitInfo::default().command_buffers(&vk_buffers).wait_semaphores(&wait_semas).wait_dst_stage_mask(&wait_stages).signal_semaphores(&signal_semas);

        let _guard = self.submit_lock.lock();
        unsafe { self.device.queue_submit(self.queue, &[submit_info], fence) }.map_err(|e| RhiError::DeviceLost(format!("vkQueueSubmit failed: {e:?}")))
    }
}

pub(crate) struct VulkanFence {
    pub(crate) device: Arc<ash::Device>,
    pub(crate) fence: vk::Fence,
}

impl std::fmt::Debug for VulkanFence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanFence").finish()
    }
}

impl Fence for VulkanFence {
    fn wait(&self, timeout_ns: u64) -> Result<(), RhiError> {
        unsafe { self.device.wait_for_fences(&[self.fence], true, timeout_ns) }.map_err(|e| RhiError::DeviceLost(format!("vkWaitForFences failed: {e:?}")))
    }
    fn reset(&self) -> Result<(), RhiError> {
        unsafe { self.device.reset_fences(&[self.fence]) }.map_err(|e| RhiError::DeviceLost(format!("{e:?}")))
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl Drop for VulkanFence {
    fn drop(&mut self) {
        unsafe { self.device.destroy_fence(self.fence, None) };
    }
}

pub(crate) struct VulkanSemaphore {
    pub(crate) device: Arc<ash::Device>,
    pub(crate) semaphore: vk::Semaphore,
}

impl std::fmt::Debug for VulkanSemaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanSemaphore").finish()
    }
}

impl Semaphore for VulkanSemaphore {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl Drop for VulkanSemaphore {
    fn drop(&mut self) {
        unsafe { self.device.destroy_semaphore(self.semaphore, None) };
    }
}
