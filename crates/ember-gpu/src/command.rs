//! Command buffer management.

use crate::device::PresentDevice;
use crate::error::{GpuError, Result};
use ash::vk;

/// Command pool for allocating command buffers.
pub struct CommandPool {
    pool: vk::CommandPool,
    queue_family: u32,
}

impl CommandPool {
    /// Create a new command pool.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        device: &ash::Device,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        let pool = device.create_command_pool(&create_info, None)?;

        Ok(Self { pool, queue_family })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Get the queue family index.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate multiple primary command buffers in one call.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_command_buffers(
        &self,
        device: &ash::Device,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let buffers = device.allocate_command_buffers(&alloc_info)?;
        Ok(buffers)
    }

    /// Free command buffers allocated from this pool.
    ///
    /// # Safety
    /// The device must be valid and the buffers must not be pending execution.
    pub unsafe fn free_command_buffers(
        &self,
        device: &ash::Device,
        command_buffers: &[vk::CommandBuffer],
    ) {
        device.free_command_buffers(self.pool, command_buffers);
    }

    /// Destroy the command pool.
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_command_pool(self.pool, None);
    }
}

/// One primary command buffer per in-flight slot.
///
/// Allocated once; buffers are reset implicitly when recording begins and are
/// never reallocated per frame.
pub struct CommandBufferPool {
    buffers: Vec<vk::CommandBuffer>,
}

impl CommandBufferPool {
    /// Allocate `count` primary command buffers from the device's pool.
    pub fn new<D: PresentDevice>(device: &D, count: usize) -> Result<Self> {
        let requested = u32::try_from(count)
            .map_err(|_| GpuError::InvalidState(format!("Too many command buffers: {count}")))?;
        let buffers = device.allocate_command_buffers(requested)?;
        if buffers.len() != count {
            device.free_command_buffers(&buffers);
            return Err(GpuError::InvalidState(format!(
                "Requested {count} command buffers, got {}",
                buffers.len()
            )));
        }

        tracing::debug!(count, "Allocated frame command buffers");

        Ok(Self { buffers })
    }

    /// The command buffer of `slot`.
    pub fn get(&self, slot: usize) -> vk::CommandBuffer {
        self.buffers[slot]
    }

    /// Number of buffers in the pool.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Return all buffers to the device's pool as one batch.
    ///
    /// None of the buffers may be pending execution.
    pub fn free<D: PresentDevice>(&mut self, device: &D) {
        if !self.buffers.is_empty() {
            device.free_command_buffers(&self.buffers);
            self.buffers.clear();
        }
    }
}
