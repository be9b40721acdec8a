use ash::vk;

use thiserror::Error;

/// Splits `vk::Result` into the conditions a caller can act on.
///
/// Memory exhaustion and device loss are runtime conditions and therefore
/// reported through these variants; everything else the driver can return is
/// carried verbatim in [DeviceError::VkError].
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Host memory exhausted")]
    OutOfHostMemory,
    #[error("Device memory exhausted")]
    OutOfDeviceMemory,
    #[error("Device lost, submitted work is in an undefined state")]
    DeviceLost,
    #[error("Feature {0} not supported by the device")]
    UnsupportedFeature(&'static str),
    #[error("No memory type satisfies type filter {filter:#b} with properties {properties:?}")]
    NoCompatibleMemory {
        filter: u32,
        properties: vk::MemoryPropertyFlags,
    },
    #[error("Vulkan error: {0}")]
    VkError(vk::Result),
}

impl From<vk::Result> for DeviceError {
    fn from(res: vk::Result) -> Self {
        match res {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => DeviceError::OutOfHostMemory,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => DeviceError::OutOfDeviceMemory,
            vk::Result::ERROR_DEVICE_LOST => DeviceError::DeviceLost,
            other => DeviceError::VkError(other),
        }
    }
}

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("Buffer of size 0 can not be created")]
    EmptyBuffer,
    #[error("Image extent {width}x{height} is invalid, both axes must be > 0")]
    InvalidExtent { width: u32, height: u32 },
}

#[derive(Error, Debug)]
pub enum ShaderError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("SPIR-V blob is malformed: {0}")]
    InvalidSpirv(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("Expected exactly one pipeline from creation, got {0}")]
    UnexpectedCount(usize),
}

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("Failed to allocate descriptor sets, requested {requested}, got {allocated}")]
    Allocation { requested: usize, allocated: usize },
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("Failed to allocate command buffers, requested {requested}, got {allocated}")]
    FailedToAllocate { requested: usize, allocated: usize },
    #[error("Command pool was created without the RESET_COMMAND_BUFFER flag")]
    PoolNotResetable,
    #[error("Submitting to queue failed: {0}")]
    SubmitFailed(DeviceError),
}

/// Top level error of this crate.
#[derive(Error, Debug)]
pub enum KestrelError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),
    #[error("Shader error: {0}")]
    Shader(#[from] ShaderError),
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),
    #[error("Command error: {0}")]
    Command(#[from] CommandError),
}

#[cfg(test)]
mod test {
    use static_assertions::assert_impl_all;

    use crate::error::{
        CommandError, DescriptorError, DeviceError, KestrelError, PipelineError, ResourceError,
        ShaderError,
    };

    #[test]
    fn assure_send_sync() {
        assert_impl_all!(DeviceError: Send, Sync);
        assert_impl_all!(ResourceError: Send, Sync);
        assert_impl_all!(ShaderError: Send, Sync);
        assert_impl_all!(PipelineError: Send, Sync);
        assert_impl_all!(DescriptorError: Send, Sync);
        assert_impl_all!(CommandError: Send, Sync);
        assert_impl_all!(KestrelError: Send, Sync);
    }

    #[test]
    fn vk_result_mapping() {
        assert!(matches!(
            DeviceError::from(ash::vk::Result::ERROR_OUT_OF_HOST_MEMORY),
            DeviceError::OutOfHostMemory
        ));
        assert!(matches!(
            DeviceError::from(ash::vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            DeviceError::OutOfDeviceMemory
        ));
        assert!(matches!(
            DeviceError::from(ash::vk::Result::ERROR_DEVICE_LOST),
            DeviceError::DeviceLost
        ));
        assert!(matches!(
            DeviceError::from(ash::vk::Result::TIMEOUT),
            DeviceError::VkError(ash::vk::Result::TIMEOUT)
        ));
    }
}
