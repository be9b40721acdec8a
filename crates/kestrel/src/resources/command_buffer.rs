use std::sync::Arc;

use ash::vk;

use crate::{context::Device, error::CommandError};

///Pool that native command buffers are allocated from. Kept explicit: every
/// subsystem that records gets a pool passed in, there is no ambient pool.
pub struct CommandPool {
    pub device: Arc<Device>,
    ///The queue family this pool's buffers can be submitted on.
    pub queue_family: u32,
    pub inner: vk::CommandPool,
    pub can_reset_buffer: bool,
}

impl CommandPool {
    pub fn new(
        device: &Arc<Device>,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self, CommandError> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .flags(flags)
            .queue_family_index(queue_family);

        let pool = unsafe {
            device
                .inner
                .create_command_pool(&create_info, None)
                .map_err(crate::error::DeviceError::from)?
        };

        let can_reset_buffer = flags.contains(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        Ok(CommandPool {
            device: device.clone(),
            queue_family,
            inner: pool,
            can_reset_buffer,
        })
    }

    ///Allocates `count` primary command buffers from this pool.
    pub fn allocate(&self, count: u32) -> Result<Vec<vk::CommandBuffer>, CommandError> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.inner)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let buffers = unsafe {
            self.device
                .inner
                .allocate_command_buffers(&info)
                .map_err(crate::error::DeviceError::from)?
        };

        if buffers.len() != count as usize {
            return Err(CommandError::FailedToAllocate {
                requested: count as usize,
                allocated: buffers.len(),
            });
        }

        Ok(buffers)
    }

    ///Resets `buffer` for re-recording. Only valid if the pool was created
    /// with the `RESET_COMMAND_BUFFER` flag.
    pub fn reset_buffer(
        &self,
        buffer: vk::CommandBuffer,
        release_resources: bool,
    ) -> Result<(), CommandError> {
        if !self.can_reset_buffer {
            return Err(CommandError::PoolNotResetable);
        }

        let flags = if release_resources {
            vk::CommandBufferResetFlags::RELEASE_RESOURCES
        } else {
            vk::CommandBufferResetFlags::empty()
        };

        unsafe {
            self.device
                .inner
                .reset_command_buffer(buffer, flags)
                .map_err(crate::error::DeviceError::from)?
        };
        Ok(())
    }

    ///Returns buffers allocated from this pool. The handles must not be
    /// referenced afterwards.
    pub fn free(&self, buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.inner.free_command_buffers(self.inner, buffers) }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_command_pool(self.inner, None) }
    }
}
