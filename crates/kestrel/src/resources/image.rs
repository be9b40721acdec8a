use std::sync::Arc;

use ash::vk;

use crate::{context::Device, error::ResourceError};

///Returns true if `format` has a depth aspect.
pub fn is_depth_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::D32_SFLOAT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

///Returns true if `format` carries a stencil aspect.
pub fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

/// Image description. 2d images only, the render-graph core never attaches
/// anything else. Cube/3d support would be added here if it did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImgDesc {
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub mip_levels: u32,
    pub layers: u32,
    pub samples: vk::SampleCountFlags,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
}

impl Default for ImgDesc {
    fn default() -> Self {
        ImgDesc {
            format: vk::Format::R8G8B8A8_UNORM,
            extent: vk::Extent2D {
                width: 512,
                height: 512,
            },
            mip_levels: 1,
            layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
        }
    }
}

impl ImgDesc {
    pub fn color_attachment(width: u32, height: u32, format: vk::Format) -> Self {
        ImgDesc {
            format,
            extent: vk::Extent2D { width, height },
            ..Default::default()
        }
    }

    pub fn depth_attachment(width: u32, height: u32, format: vk::Format) -> Self {
        ImgDesc {
            format,
            extent: vk::Extent2D { width, height },
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            ..Default::default()
        }
    }

    pub fn texture(width: u32, height: u32, format: vk::Format) -> Self {
        ImgDesc {
            format,
            extent: vk::Extent2D { width, height },
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            ..Default::default()
        }
    }

    pub fn add_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage |= usage;
        self
    }

    ///Aspect mask derived from the format.
    pub fn aspect_mask(&self) -> vk::ImageAspectFlags {
        if is_depth_format(self.format) {
            if has_stencil(self.format) {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            } else {
                vk::ImageAspectFlags::DEPTH
            }
        } else {
            vk::ImageAspectFlags::COLOR
        }
    }

    ///Subresource range enclosing the whole image.
    pub fn subresource_all(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect_mask(),
            base_mip_level: 0,
            level_count: self.mip_levels,
            base_array_layer: 0,
            layer_count: self.layers,
        }
    }
}

///Self managing image with a dedicated allocation. Created in the UNDEFINED
/// layout; layout tracking happens in the graph layer, not here.
pub struct Image {
    pub inner: vk::Image,
    pub memory: vk::DeviceMemory,
    pub desc: ImgDesc,
    pub device: Arc<Device>,
}

impl Image {
    pub fn new(device: &Arc<Device>, desc: ImgDesc) -> Result<Self, ResourceError> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(ResourceError::InvalidExtent {
                width: desc.extent.width,
                height: desc.extent.height,
            });
        }

        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(desc.layers)
            .samples(desc.samples)
            .tiling(desc.tiling)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe {
            device
                .inner
                .create_image(&create_info, None)
                .map_err(crate::error::DeviceError::from)?
        };

        let requirements = unsafe { device.inner.get_image_memory_requirements(image) };
        let memory_type =
            match device.memory_type_index(requirements, vk::MemoryPropertyFlags::DEVICE_LOCAL) {
                Ok(t) => t,
                Err(e) => {
                    unsafe { device.inner.destroy_image(image, None) };
                    return Err(e.into());
                }
            };

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        let memory = match unsafe { device.inner.allocate_memory(&alloc_info, None) } {
            Ok(m) => m,
            Err(e) => {
                unsafe { device.inner.destroy_image(image, None) };
                return Err(crate::error::DeviceError::from(e).into());
            }
        };

        unsafe {
            device
                .inner
                .bind_image_memory(image, memory, 0)
                .map_err(crate::error::DeviceError::from)?
        };

        Ok(Image {
            inner: image,
            memory,
            desc,
            device: device.clone(),
        })
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.inner.destroy_image(self.inner, None);
            self.device.inner.free_memory(self.memory, None);
        }
    }
}

///View over the whole (or a part) of an image. Keeps the source image alive.
pub struct ImageView {
    pub inner: vk::ImageView,
    pub range: vk::ImageSubresourceRange,
    pub src_img: Arc<Image>,
    pub device: Arc<Device>,
}

impl ImageView {
    ///Creates a view over `range` of `image`.
    pub fn new(
        device: &Arc<Device>,
        image: &Arc<Image>,
        range: vk::ImageSubresourceRange,
    ) -> Result<Self, ResourceError> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image.inner)
            .view_type(if image.desc.layers > 1 {
                vk::ImageViewType::TYPE_2D_ARRAY
            } else {
                vk::ImageViewType::TYPE_2D
            })
            .format(image.desc.format)
            .subresource_range(range);

        let view = unsafe {
            device
                .inner
                .create_image_view(&create_info, None)
                .map_err(crate::error::DeviceError::from)?
        };

        Ok(ImageView {
            inner: view,
            range,
            src_img: image.clone(),
            device: device.clone(),
        })
    }

    ///Creates a view enclosing the whole image.
    pub fn new_all(device: &Arc<Device>, image: &Arc<Image>) -> Result<Self, ResourceError> {
        Self::new(device, image, image.desc.subresource_all())
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_image_view(self.inner, None) }
    }
}

pub struct Sampler {
    pub inner: vk::Sampler,
    pub device: Arc<Device>,
}

impl Sampler {
    pub fn new(
        device: &Arc<Device>,
        create_info: &vk::SamplerCreateInfo,
    ) -> Result<Self, ResourceError> {
        let sampler = unsafe {
            device
                .inner
                .create_sampler(create_info, None)
                .map_err(crate::error::DeviceError::from)?
        };

        Ok(Sampler {
            inner: sampler,
            device: device.clone(),
        })
    }

    ///Linear-filtered, repeat-addressed default sampler.
    pub fn new_linear(device: &Arc<Device>) -> Result<Self, ResourceError> {
        Self::new(
            device,
            &vk::SamplerCreateInfo::default()
                .mag_filter(vk::Filter::LINEAR)
                .min_filter(vk::Filter::LINEAR)
                .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
                .address_mode_u(vk::SamplerAddressMode::REPEAT)
                .address_mode_v(vk::SamplerAddressMode::REPEAT)
                .address_mode_w(vk::SamplerAddressMode::REPEAT),
        )
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_sampler(self.inner, None) }
    }
}
