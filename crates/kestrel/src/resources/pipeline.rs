use std::sync::Arc;

use ash::vk;

use crate::{context::Device, error::PipelineError};

use super::ShaderStage;

pub struct PipelineLayout {
    pub device: Arc<Device>,
    pub layout: vk::PipelineLayout,
}

impl PipelineLayout {
    pub fn new(
        device: &Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self, PipelineError> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe {
            device
                .inner
                .create_pipeline_layout(&create_info, None)
                .map_err(crate::error::DeviceError::from)?
        };

        Ok(PipelineLayout {
            device: device.clone(),
            layout,
        })
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_pipeline_layout(self.layout, None) }
    }
}

///Pipeline that manages its own lifetime and keeps its layout alive.
pub struct ComputePipeline {
    pub device: Arc<Device>,
    pub pipeline: vk::Pipeline,
    pub layout: PipelineLayout,
}

impl ComputePipeline {
    pub fn new(
        device: &Arc<Device>,
        stage: &ShaderStage,
        layout: PipelineLayout,
    ) -> Result<Self, PipelineError> {
        let create_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage.as_create_info())
            .layout(layout.layout);

        let mut pipelines = unsafe {
            device
                .inner
                .create_compute_pipelines(
                    vk::PipelineCache::null(),
                    core::slice::from_ref(&create_info),
                    None,
                )
                .map_err(|(_plines, err)| crate::error::DeviceError::from(err))?
        };

        if pipelines.len() != 1 {
            return Err(PipelineError::UnexpectedCount(pipelines.len()));
        }

        Ok(ComputePipeline {
            device: device.clone(),
            pipeline: pipelines.remove(0),
            layout,
        })
    }
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_pipeline(self.pipeline, None) }
    }
}

///Thin graphics pipeline wrapper. Assumes `create_info` is valid apart from
/// the layout field, which is patched in before creation. The caller keeps
/// the referenced render pass alive, kestrel-graph's catalog does this for
/// pipelines it creates.
pub struct GraphicsPipeline {
    pub device: Arc<Device>,
    pub pipeline: vk::Pipeline,
    pub layout: PipelineLayout,
}

impl GraphicsPipeline {
    pub fn new(
        device: &Arc<Device>,
        create_info: vk::GraphicsPipelineCreateInfo,
        layout: PipelineLayout,
    ) -> Result<Self, PipelineError> {
        let create_info = create_info.layout(layout.layout);

        let mut pipelines = unsafe {
            device
                .inner
                .create_graphics_pipelines(
                    vk::PipelineCache::null(),
                    core::slice::from_ref(&create_info),
                    None,
                )
                .map_err(|(_plines, err)| crate::error::DeviceError::from(err))?
        };

        if pipelines.len() != 1 {
            return Err(PipelineError::UnexpectedCount(pipelines.len()));
        }

        Ok(GraphicsPipeline {
            device: device.clone(),
            pipeline: pipelines.remove(0),
            layout,
        })
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_pipeline(self.pipeline, None) }
    }
}
