//! Per-frame bindless descriptor mirroring. Each frame in flight owns one
//! [FrameBindings] set on a shared layout: a fixed run of storage-buffer
//! bindings, one per declared buffer slot, followed by a single trailing
//! combined-image-sampler array that is partially bound and sized at
//! allocation time. Shaders index the array with plain integers; the CPU side
//! rewrites the set once per frame before the graph records, so a set is
//! never updated while its frame is in flight.

use std::sync::Arc;

use kestrel::ash::vk;
use kestrel::context::Device;
use kestrel::resources::{DescriptorPool, DescriptorSet, DescriptorSetLayout};
use kestrel::DescriptorError;

use crate::resources::{BufferKey, ImageKey, Resources};

///Descriptor layout description shared by all frames. Bindings
/// `0..buffer_capacity` are storage buffers, binding `buffer_capacity` is the
/// texture array.
pub fn layout_bindings(
    buffer_capacity: u32,
    texture_capacity: u32,
) -> (
    Vec<vk::DescriptorSetLayoutBinding<'static>>,
    Vec<vk::DescriptorBindingFlags>,
) {
    let mut bindings = Vec::with_capacity(buffer_capacity as usize + 1);
    let mut flags = Vec::with_capacity(buffer_capacity as usize + 1);

    for binding in 0..buffer_capacity {
        bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::ALL),
        );
        flags.push(vk::DescriptorBindingFlags::PARTIALLY_BOUND);
    }

    bindings.push(
        vk::DescriptorSetLayoutBinding::default()
            .binding(buffer_capacity)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(texture_capacity)
            .stage_flags(vk::ShaderStageFlags::ALL),
    );
    flags.push(
        vk::DescriptorBindingFlags::PARTIALLY_BOUND
            | vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT
            | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND,
    );

    (bindings, flags)
}

///Pool sizes matching [layout_bindings] for `set_count` frames.
pub fn pool_sizes(
    buffer_capacity: u32,
    texture_capacity: u32,
    set_count: u32,
) -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::STORAGE_BUFFER,
            descriptor_count: buffer_capacity * set_count,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: texture_capacity * set_count,
        },
    ]
}

///One frame's bindless set.
pub struct FrameBindings {
    device: Arc<Device>,
    layout: Arc<DescriptorSetLayout>,
    set: DescriptorSet,
    buffer_capacity: u32,
    texture_capacity: u32,
}

impl FrameBindings {
    ///Creates the shared set layout. Built once and handed to every frame
    /// and to pipeline-layout creation.
    pub fn create_layout(
        device: &Arc<Device>,
        buffer_capacity: u32,
        texture_capacity: u32,
    ) -> Result<Arc<DescriptorSetLayout>, DescriptorError> {
        let (bindings, flags) = layout_bindings(buffer_capacity, texture_capacity);
        Ok(Arc::new(DescriptorSetLayout::new_with_flags(
            device,
            &bindings,
            &flags,
            vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL,
        )?))
    }

    pub fn new(
        device: &Arc<Device>,
        pool: &Arc<DescriptorPool>,
        layout: Arc<DescriptorSetLayout>,
        buffer_capacity: u32,
        texture_capacity: u32,
    ) -> Result<Self, DescriptorError> {
        let set = pool.allocate(&layout, Some(texture_capacity))?;
        Ok(FrameBindings {
            device: device.clone(),
            layout,
            set,
            buffer_capacity,
            texture_capacity,
        })
    }

    pub fn raw_set(&self) -> vk::DescriptorSet {
        self.set.inner
    }

    pub fn raw_layout(&self) -> vk::DescriptorSetLayout {
        self.layout.inner
    }

    ///Mirrors the current declarations into the set. Buffer slots are
    /// written in declaration order starting at binding 0, textures fill the
    /// trailing array from element 0. Declared buffers have to carry storage
    /// usage, declared textures sampled usage.
    pub fn write(
        &self,
        res: &Resources,
        buffers: &[BufferKey],
        textures: &[ImageKey],
        sampler: vk::Sampler,
    ) {
        assert!(
            buffers.len() <= self.buffer_capacity as usize,
            "{} buffers declared, the binding table holds {}",
            buffers.len(),
            self.buffer_capacity
        );
        assert!(
            textures.len() <= self.texture_capacity as usize,
            "{} textures declared, the binding table holds {}",
            textures.len(),
            self.texture_capacity
        );

        let buffer_infos = buffers
            .iter()
            .map(|key| {
                let entry = res.buffer_expect(*key);
                assert!(
                    entry.is_storage(),
                    "Buffer {:?} declared for binding without STORAGE_BUFFER usage",
                    key
                );
                vk::DescriptorBufferInfo {
                    buffer: entry.raw,
                    offset: 0,
                    range: vk::WHOLE_SIZE,
                }
            })
            .collect::<Vec<_>>();

        let image_infos = textures
            .iter()
            .map(|key| {
                let entry = res.image_expect(*key);
                assert!(
                    entry.is_sampled(),
                    "Image {:?} declared for binding without SAMPLED usage",
                    key
                );
                vk::DescriptorImageInfo {
                    sampler,
                    image_view: entry.raw_view,
                    image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                }
            })
            .collect::<Vec<_>>();

        let mut writes = Vec::with_capacity(buffer_infos.len() + 1);
        for (binding, info) in buffer_infos.iter().enumerate() {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(self.set.inner)
                    .dst_binding(binding as u32)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .buffer_info(core::slice::from_ref(info)),
            );
        }
        if !image_infos.is_empty() {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(self.set.inner)
                    .dst_binding(self.buffer_capacity)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_infos),
            );
        }

        if !writes.is_empty() {
            unsafe { self.device.inner.update_descriptor_sets(&writes, &[]) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_shape() {
        let (bindings, flags) = layout_bindings(4, 256);
        assert_eq!(bindings.len(), 5);
        assert_eq!(flags.len(), 5);

        for (i, binding) in bindings[..4].iter().enumerate() {
            assert_eq!(binding.binding, i as u32);
            assert_eq!(binding.descriptor_type, vk::DescriptorType::STORAGE_BUFFER);
            assert_eq!(binding.descriptor_count, 1);
        }

        let array = &bindings[4];
        assert_eq!(array.binding, 4);
        assert_eq!(
            array.descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(array.descriptor_count, 256);
        assert!(flags[4].contains(
            vk::DescriptorBindingFlags::PARTIALLY_BOUND
                | vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT
                | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND
        ));
    }

    #[test]
    fn pool_sizes_scale_with_frames() {
        let sizes = pool_sizes(4, 256, 3);
        assert_eq!(sizes[0].descriptor_count, 12);
        assert_eq!(sizes[1].descriptor_count, 768);
    }
}
