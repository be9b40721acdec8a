//! Allocatable and bindable resources. All wrappers keep their device alive
//! through an `Arc` and destroy the wrapped handle on drop.

mod buffer;
mod command_buffer;
mod descriptor;
mod image;
mod pipeline;
mod shader_module;

pub use buffer::{BufDesc, Buffer};
pub use command_buffer::CommandPool;
pub use descriptor::{DescriptorPool, DescriptorSet, DescriptorSetLayout};
pub use image::{has_stencil, is_depth_format, Image, ImageView, ImgDesc, Sampler};
pub use pipeline::{ComputePipeline, GraphicsPipeline, PipelineLayout};
pub use shader_module::{ShaderModule, ShaderStage};
