use std::{ffi::CString, path::Path, sync::Arc};

use ash::vk;

use crate::{context::Device, error::ShaderError};

///Single shader module built from an already compiled SPIR-V blob. Shader
/// *compilation* is not this crate's business.
pub struct ShaderModule {
    pub device: Arc<Device>,
    pub module: vk::ShaderModule,
}

impl ShaderModule {
    ///Reads the file at `path`, checks that it is a SPIR-V blob and, if so,
    /// creates the shader module from it.
    pub fn new_from_file(
        device: &Arc<Device>,
        path: impl AsRef<Path>,
    ) -> Result<Self, ShaderError> {
        let mut file = std::fs::File::open(path)?;
        let code = ash::util::read_spv(&mut file)?;

        Self::new(device, &code)
    }

    pub fn new(device: &Arc<Device>, code: &[u32]) -> Result<Self, ShaderError> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(code);

        let module = unsafe {
            device
                .inner
                .create_shader_module(&create_info, None)
                .map_err(crate::error::DeviceError::from)?
        };

        Ok(ShaderModule {
            device: device.clone(),
            module,
        })
    }

    ///Specialises this module to a pipeline stage, using `main` as the entry
    /// point.
    pub fn into_stage(self: Arc<Self>, stage: vk::ShaderStageFlags) -> ShaderStage {
        ShaderStage {
            module: self,
            stage,
            entry_name: CString::new("main").unwrap(),
        }
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_shader_module(self.module, None) }
    }
}

///A shader module bound to one pipeline stage. Keeps the module alive for as
/// long as any pipeline create-info references it.
pub struct ShaderStage {
    pub module: Arc<ShaderModule>,
    pub stage: vk::ShaderStageFlags,
    entry_name: CString,
}

impl ShaderStage {
    pub fn as_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .module(self.module.module)
            .stage(self.stage)
            .name(&self.entry_name)
    }
}
