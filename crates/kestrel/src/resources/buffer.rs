use std::sync::Arc;

use ash::vk;

use crate::{context::Device, error::ResourceError};

/// Buffer description. Creation-time specifics (sparse binding flags, p_next
/// chains) are intentionally left out, sharing is always exclusive since
/// kestrel records against a single queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufDesc {
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
}

impl BufDesc {
    pub fn storage(size: u64) -> Self {
        BufDesc {
            size,
            usage: vk::BufferUsageFlags::STORAGE_BUFFER
                | vk::BufferUsageFlags::TRANSFER_SRC
                | vk::BufferUsageFlags::TRANSFER_DST,
        }
    }

    pub fn vertex(size: u64) -> Self {
        BufDesc {
            size,
            usage: vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        }
    }

    pub fn index(size: u64) -> Self {
        BufDesc {
            size,
            usage: vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        }
    }

    pub fn staging(size: u64) -> Self {
        BufDesc {
            size,
            usage: vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    pub fn add_usage(mut self, usage: vk::BufferUsageFlags) -> Self {
        self.usage |= usage;
        self
    }
}

///Self managing buffer. Memory is allocated dedicated per buffer, which is
/// good enough for the handful of long-lived buffers the graph tracks.
pub struct Buffer {
    pub inner: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub desc: BufDesc,
    pub device: Arc<Device>,
}

impl Buffer {
    pub fn new(
        device: &Arc<Device>,
        desc: BufDesc,
        memory_properties: vk::MemoryPropertyFlags,
    ) -> Result<Self, ResourceError> {
        if desc.size == 0 {
            return Err(ResourceError::EmptyBuffer);
        }

        let create_info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .inner
                .create_buffer(&create_info, None)
                .map_err(crate::error::DeviceError::from)?
        };

        let requirements = unsafe { device.inner.get_buffer_memory_requirements(buffer) };
        let memory_type = match device.memory_type_index(requirements, memory_properties) {
            Ok(t) => t,
            Err(e) => {
                unsafe { device.inner.destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        let memory = match unsafe { device.inner.allocate_memory(&alloc_info, None) } {
            Ok(m) => m,
            Err(e) => {
                unsafe { device.inner.destroy_buffer(buffer, None) };
                return Err(crate::error::DeviceError::from(e).into());
            }
        };

        unsafe {
            device
                .inner
                .bind_buffer_memory(buffer, memory, 0)
                .map_err(crate::error::DeviceError::from)?
        };

        Ok(Buffer {
            inner: buffer,
            memory,
            desc,
            device: device.clone(),
        })
    }

    ///Maps the buffer memory and copies `data` to `offset`. Only valid for
    /// host-visible allocations.
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let ptr = unsafe {
            self.device
                .inner
                .map_memory(
                    self.memory,
                    offset,
                    data.len() as u64,
                    vk::MemoryMapFlags::empty(),
                )
                .map_err(crate::error::DeviceError::from)?
        };
        unsafe {
            core::ptr::copy_nonoverlapping(data.as_ptr(), ptr as *mut u8, data.len());
            self.device.inner.unmap_memory(self.memory);
        }
        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.inner.destroy_buffer(self.inner, None);
            self.device.inner.free_memory(self.memory, None);
        }
    }
}
