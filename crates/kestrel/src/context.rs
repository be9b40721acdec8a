use std::sync::Arc;

use ash::vk;

use crate::error::DeviceError;

/// A single execution queue. Kestrel assumes exactly one queue context per
/// recorded command buffer, so the device carries exactly one of these.
pub struct Queue {
    pub inner: vk::Queue,
    pub family_index: u32,
}

/// Logical device wrapper. Device and queue *selection* happen outside of
/// kestrel; this type is constructed from handles the caller already created
/// and only adds the helpers the rest of the crates need.
///
/// The wrapped `ash::Device` is destroyed on drop, the instance is not; the
/// caller keeps ownership of instance and physical device.
pub struct Device {
    ///The raw ash device.
    pub inner: ash::Device,
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub queue: Queue,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl Device {
    /// Wraps an already created logical device.
    ///
    /// # Safety
    /// `device` must have been created from `physical_device` on `instance`,
    /// with at least one queue of family `queue_family`. Timeline-free
    /// synchronization2 and dynamic rendering (Vulkan 1.3 core) must be
    /// enabled, the encoder records through those entry points.
    pub unsafe fn from_handles(
        instance: ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        queue_family: u32,
    ) -> Result<Arc<Self>, DeviceError> {
        let queue = unsafe { device.get_device_queue(queue_family, 0) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        Ok(Arc::new(Device {
            inner: device,
            instance,
            physical_device,
            queue: Queue {
                inner: queue,
                family_index: queue_family,
            },
            memory_properties,
        }))
    }

    /// Finds a memory type index matching the requirement's type filter and
    /// the requested property flags.
    pub fn memory_type_index(
        &self,
        requirements: vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<u32, DeviceError> {
        for idx in 0..self.memory_properties.memory_type_count {
            let type_matches = requirements.memory_type_bits & (1 << idx) != 0;
            let props_match = self.memory_properties.memory_types[idx as usize]
                .property_flags
                .contains(properties);
            if type_matches && props_match {
                return Ok(idx);
            }
        }

        Err(DeviceError::NoCompatibleMemory {
            filter: requirements.memory_type_bits,
            properties,
        })
    }

    ///Blocks until the device is idle. Failure (device loss) is logged, not
    /// returned, since this is almost always called on teardown paths.
    pub fn wait_idle(&self) {
        if let Err(_e) = unsafe { self.inner.device_wait_idle() } {
            #[cfg(feature = "logging")]
            log::error!("device_wait_idle failed: {}", _e);
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe { self.inner.destroy_device(None) };
    }
}
