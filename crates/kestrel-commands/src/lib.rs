//! # Kestrel-Commands
//!
//! Small helpers around native command submission: the [BarrierBuilder] used
//! to assemble synchronization2 barriers, and [oneshot], a blocking
//! record-submit-wait helper for initialization work that happens outside
//! the frame loop (uploads, initial layout transitions).

use std::sync::Arc;

use kestrel::{
    ash::vk,
    context::Device,
    resources::CommandPool,
    sync::Fence,
    CommandError,
};

pub use kestrel::ash;

mod barrier_builder;
pub use barrier_builder::BarrierBuilder;

///Records a transient command buffer via `recorder`, submits it on the
/// device's queue and blocks until execution finished. The buffer is freed
/// before returning.
///
/// This is deliberately synchronous. Anything that should overlap with the
/// frame loop belongs into a graph pass instead.
pub fn oneshot<R>(
    device: &Arc<Device>,
    pool: &CommandPool,
    recorder: R,
) -> Result<(), CommandError>
where
    R: FnOnce(&ash::Device, vk::CommandBuffer),
{
    let buffer = pool.allocate(1)?.remove(0);

    let res = oneshot_inner(device, buffer, recorder);

    pool.free(core::slice::from_ref(&buffer));

    res
}

fn oneshot_inner<R>(
    device: &Arc<Device>,
    buffer: vk::CommandBuffer,
    recorder: R,
) -> Result<(), CommandError>
where
    R: FnOnce(&ash::Device, vk::CommandBuffer),
{
    unsafe {
        device
            .inner
            .begin_command_buffer(
                buffer,
                &vk::CommandBufferBeginInfo::default()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            )
            .map_err(kestrel::DeviceError::from)?
    };

    recorder(&device.inner, buffer);

    unsafe {
        device
            .inner
            .end_command_buffer(buffer)
            .map_err(kestrel::DeviceError::from)?
    };

    let fence = Fence::new(device, false).map_err(CommandError::Device)?;

    let submit = vk::SubmitInfo::default().command_buffers(core::slice::from_ref(&buffer));
    if let Err(e) = unsafe {
        device
            .inner
            .queue_submit(device.queue.inner, core::slice::from_ref(&submit), fence.inner)
    } {
        #[cfg(feature = "logging")]
        log::error!(
            "Failed to submit one-shot buffer to queue family {}: {}",
            device.queue.family_index,
            e
        );
        return Err(CommandError::SubmitFailed(kestrel::DeviceError::from(e)));
    }

    fence.wait(u64::MAX).map_err(CommandError::Device)?;

    Ok(())
}
