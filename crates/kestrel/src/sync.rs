//! Thin wrappers around the two synchronisation primitives the frame loop
//! needs: binary semaphores for queue/present ordering and fences for the
//! CPU-side frame-in-flight wait point.

use std::sync::Arc;

use ash::vk;

use crate::{context::Device, error::DeviceError};

pub struct Fence {
    pub inner: vk::Fence,
    pub device: Arc<Device>,
}

impl Fence {
    pub fn new(device: &Arc<Device>, signaled: bool) -> Result<Self, DeviceError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence = unsafe {
            device
                .inner
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)?
        };

        Ok(Fence {
            inner: fence,
            device: device.clone(),
        })
    }

    ///Blocks until the fence is signaled, or `timeout` nanoseconds passed.
    pub fn wait(&self, timeout: u64) -> Result<(), DeviceError> {
        unsafe {
            self.device
                .inner
                .wait_for_fences(core::slice::from_ref(&self.inner), true, timeout)?
        };
        Ok(())
    }

    pub fn reset(&self) -> Result<(), DeviceError> {
        unsafe {
            self.device
                .inner
                .reset_fences(core::slice::from_ref(&self.inner))?
        };
        Ok(())
    }

    ///Returns true if the fence is currently signaled.
    pub fn is_signaled(&self) -> bool {
        unsafe { self.device.inner.get_fence_status(self.inner) }.unwrap_or(false)
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_fence(self.inner, None) }
    }
}

///Binary semaphore for GPU→GPU ordering (acquire/present edges).
pub struct Semaphore {
    pub inner: vk::Semaphore,
    pub device: Arc<Device>,
}

impl Semaphore {
    pub fn new(device: &Arc<Device>) -> Result<Self, DeviceError> {
        let semaphore = unsafe {
            device
                .inner
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };

        Ok(Semaphore {
            inner: semaphore,
            device: device.clone(),
        })
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_semaphore(self.inner, None) }
    }
}
