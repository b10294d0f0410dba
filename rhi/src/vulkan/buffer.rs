use std::sync::Arc;

use ash::vk;

use crate::{BufferDescriptor, BufferUsage, MemoryUsage, ResourceId, RhiError};

use super::VulkanDevice;

pub struct VulkanBuffer {
    device: Arc<ash::Device>,
    pub(crate) buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    id: ResourceId,
    descriptor: BufferDescriptor,
    mapped_ptr: Option<*mut u8>,
}

unsafe impl Send for VulkanBuffer {}
unsafe impl Sync for VulkanBuffer {}

impl std::fmt::Debug for VulkanBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBuffer").field("id", &self.id).field("size", &self.descriptor.size).finish()
    }
}

fn buffer_usage_to_vk(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut out = vk::BufferUsageFlags::empty();
    if usage.contains(BufferUsage::TRANSFER_SRC) {
        out |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(BufferUsage::TRANSFER_DST) {
        out |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    if usage.contains(BufferUsage::UNIFORM_TEXEL) {
        out |= vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE_TEXEL) {
        out |= vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        out |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE) {
        out |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        out |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::VERTEX) {
        out |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDIRECT) {
        out |= vk::BufferUsageFlags::INDIRECT_BUFFER;
    }
    if usage.contains(BufferUsage::SHADER_DEVICE_ADDRESS) {
        out |= vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS;
    }
    out
}

fn memory_property_flags(usage: MemoryUsage) -> (vk::MemoryPropertyFlags, vk::MemoryPropertyFlags) {
    match usage {
        MemoryUsage::GpuOnly | MemoryUsage::GpuLazily => (vk::MemoryPropertyFlags::DEVICE_LOCAL, vk::MemoryPropertyFlags::DEVICE_LOCAL),
        MemoryUsage::CpuToGpu => (
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ),
        MemoryUsage::GpuToCpu | MemoryUsage::CpuOnly => (
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        ),
        MemoryUsage::CpuCopy => (vk::MemoryPropertyFlags::HOST_VISIBLE, vk::MemoryPropertyFlags::HOST_VISIBLE),
    }
}

pub(crate) fn create_buffer(device: &VulkanDevice, desc: &BufferDescriptor, id: ResourceId) -> Result<Box<dyn crate::Buffer>, RhiError> {
    let raw = device.raw();
    let info = vk::BufferCreateInfo::default().size(desc.size.max(1)).usage(buffer_usage_to_vk(desc.usage)).sharing_mode(vk::SharingMode::EXCLUSIVE);
    let buffer = unsafe { raw.create_buffer(&info, None) }.map_err(|e| RhiError::AllocationFailure(format!("vkCreateBuffer failed: {e:?}")))?;
    let requirements = unsafe { raw.get_buffer_memory_requirements(buffer) };
    let (preferred, fallback) = memory_property_flags(desc.memory_usage);
    let memory_type = device.find_memory_type(requirements.memory_type_bits, preferred, fallback).map_err(|e| {
        unsafe { raw.destroy_buffer(buffer, None) };
        e
    })?;
    let alloc_info = vk::MemoryAllocateInfo::default().allocation_size(requirements.size).memory_type_index(memory_type);
    let memory = unsafe { raw.allocate_memory(&alloc_info, None) }.map_err(|e| {
        unsafe { raw.destroy_buffer(buffer, None) };
        RhiError::AllocationFailure(format!("vkAllocateMemory failed: {e:?}"))
    })?;
    unsafe { raw.bind_buffer_memory(buffer, memory, 0) }.map_err(|e| RhiError::AllocationFailure(format!("vkBindBufferMemory failed: {e:?}")))?;

    let host_visible = matches!(desc.memory_usage, MemoryUsage::CpuToGpu | MemoryUsage::GpuToCpu | MemoryUsage::CpuOnly | MemoryUsage::CpuCopy);
    let mapped_ptr = if host_visible {
        Some(unsafe { raw.map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty()) }.map_err(|e| RhiError::AllocationFailure(format!("{e:?}")))? as *mut u8)
    } else {
        None
    };

    let mut descriptor = desc.clone();
    descriptor.allocated_size = requirements.size;

    if let Some(initial) = &desc.initial_data {
        if initial.bytes.len() as u64 > requirements.size {
            unsafe {
                raw.destroy_buffer(buffer, None);
                raw.free_memory(memory, None);
            }
            return Err(RhiError::ValidationFailure("buffer initial_data exceeds allocated size".into()));
        }
        if let Some(ptr) = mapped_ptr {
            unsafe { std::ptr::copy_nonoverlapping(initial.bytes.as_ptr(), ptr, initial.bytes.len()) };
        } else {
            super::upload::upload_buffer_via_staging(device, buffer, 0, &initial.bytes).map_err(|e| {
                unsafe {
                    raw.destroy_buffer(buffer, None);
                    raw.free_memory(memory, None);
                }
                e
            })?;
        }
    }

    Ok(Box::new(VulkanBuffer { device: device.raw_arc(), buffer, memory, id, descriptor, mapped_ptr }))
}

impl crate::Buffer for VulkanBuffer {
    fn id(&self) -> ResourceId {
        self.id
    }
    fn size(&self) -> u64 {
        self.descriptor.size
    }
    fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl VulkanBuffer {
    pub(crate) fn is_host_visible(&self) -> bool {
        self.mapped_ptr.is_some()
    }

    pub(crate) fn write(&self, offset: u64, data: &[u8]) -> Result<(), RhiError> {
        let ptr = self.mapped_ptr.ok_or_else(|| RhiError::ValidationFailure("write_buffer called on a non-host-visible buffer".into()))?;
        if offset + data.len() as u64 > self.descriptor.allocated_size {
            return Err(RhiError::ValidationFailure("write_buffer range exceeds buffer size".into()));
        }
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset as usize), data.len());
        }
        Ok(())
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        unsafe {
            if self.mapped_ptr.is_some() {
                self.device.unmap_memory(self.memory);
            }
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}
