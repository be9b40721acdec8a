use std::sync::Arc;

use ash::vk;

use crate::{context::Device, error::DescriptorError};

/// Wrapped descriptor set layout. Handles on-drop destruction of the
/// resource.
pub struct DescriptorSetLayout {
    pub device: Arc<Device>,
    pub inner: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    pub fn new(
        device: &Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> Result<Self, DescriptorError> {
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let layout = unsafe {
            device
                .inner
                .create_descriptor_set_layout(&info, None)
                .map_err(crate::error::DeviceError::from)?
        };

        Ok(DescriptorSetLayout {
            device: device.clone(),
            inner: layout,
        })
    }

    ///Like [new](Self::new), but with per-binding flags and layout flags.
    /// Needed for the partially-bound bindless array where the last binding
    /// carries `VARIABLE_DESCRIPTOR_COUNT`.
    pub fn new_with_flags(
        device: &Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
        binding_flags: &[vk::DescriptorBindingFlags],
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> Result<Self, DescriptorError> {
        let mut ext_flags =
            vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(binding_flags);

        let info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(bindings)
            .flags(flags)
            .push_next(&mut ext_flags);

        let layout = unsafe {
            device
                .inner
                .create_descriptor_set_layout(&info, None)
                .map_err(crate::error::DeviceError::from)?
        };

        Ok(DescriptorSetLayout {
            device: device.clone(),
            inner: layout,
        })
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .inner
                .destroy_descriptor_set_layout(self.inner, None)
        }
    }
}

pub struct DescriptorPool {
    pub device: Arc<Device>,
    pub inner: vk::DescriptorPool,
    ///True if descriptor sets can be freed individually on this pool.
    pub can_free: bool,
}

impl DescriptorPool {
    pub fn new(
        device: &Arc<Device>,
        flags: vk::DescriptorPoolCreateFlags,
        sizes: &[vk::DescriptorPoolSize],
        set_count: u32,
    ) -> Result<Self, DescriptorError> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .flags(flags)
            .max_sets(set_count)
            .pool_sizes(sizes);

        let pool = unsafe {
            device
                .inner
                .create_descriptor_pool(&create_info, None)
                .map_err(crate::error::DeviceError::from)?
        };

        let can_free = flags.contains(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);

        Ok(DescriptorPool {
            device: device.clone(),
            inner: pool,
            can_free,
        })
    }

    ///Allocates a single set of `layout`. `variable_count` is the actual
    /// descriptor count of a trailing variable-count binding, if the layout
    /// has one.
    pub fn allocate(
        self: &Arc<Self>,
        layout: &DescriptorSetLayout,
        variable_count: Option<u32>,
    ) -> Result<DescriptorSet, DescriptorError> {
        let mut count_info;
        let mut info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.inner)
            .set_layouts(core::slice::from_ref(&layout.inner));

        if let Some(count) = &variable_count {
            count_info = vk::DescriptorSetVariableDescriptorCountAllocateInfo::default()
                .descriptor_counts(core::slice::from_ref(count));
            info = info.push_next(&mut count_info);
        }

        let mut sets = unsafe {
            self.device
                .inner
                .allocate_descriptor_sets(&info)
                .map_err(crate::error::DeviceError::from)?
        };

        if sets.len() != 1 {
            return Err(DescriptorError::Allocation {
                requested: 1,
                allocated: sets.len(),
            });
        }

        Ok(DescriptorSet {
            inner: sets.remove(0),
            parent_pool: self.clone(),
        })
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_descriptor_pool(self.inner, None) }
    }
}

///Single allocated descriptor set. Freed on drop if the pool allows it,
/// otherwise reclaimed when the pool is destroyed.
pub struct DescriptorSet {
    pub inner: vk::DescriptorSet,
    pub parent_pool: Arc<DescriptorPool>,
}

impl Drop for DescriptorSet {
    fn drop(&mut self) {
        if self.parent_pool.can_free {
            if let Err(_e) = unsafe {
                self.parent_pool.device.inner.free_descriptor_sets(
                    self.parent_pool.inner,
                    core::slice::from_ref(&self.inner),
                )
            } {
                #[cfg(feature = "logging")]
                log::error!("Failed to free descriptor set: {}", _e);
            }
        }
    }
}
