//! Native translation of the command log. [VkEncoder] implements
//! [CommandSink](crate::recorder::CommandSink) against a live device, turning
//! each accepted record into its `vkCmd*` call while the recorder keeps
//! appending. The `vkCmd*` calls themselves can not fail; the fallible edges
//! are opening and closing the native buffer.

use std::ffi::CString;
use std::sync::Arc;

use kestrel::ash::{self, vk};
use kestrel::context::Device;
use kestrel_commands::BarrierBuilder;

use crate::error::EncodeError;
use crate::recorder::{Command, CommandSink, DynAttachment};

pub struct VkEncoder {
    device: Arc<Device>,
    cmd: vk::CommandBuffer,
    ///Present when the instance loaded the debug-utils extension; label
    /// records are dropped otherwise.
    debug: Option<ash::ext::debug_utils::Device>,
}

impl VkEncoder {
    pub fn new(device: &Arc<Device>, cmd: vk::CommandBuffer) -> Self {
        VkEncoder {
            device: device.clone(),
            cmd,
            debug: None,
        }
    }

    pub fn with_debug(mut self, debug: ash::ext::debug_utils::Device) -> Self {
        self.debug = Some(debug);
        self
    }

    fn rendering_attachment(att: &DynAttachment) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(att.view)
            .image_layout(att.layout)
            .load_op(att.load_op)
            .store_op(att.store_op)
            .clear_value(att.clear)
    }
}

impl CommandSink for VkEncoder {
    fn begin(&mut self) -> Result<(), EncodeError> {
        unsafe {
            self.device
                .inner
                .begin_command_buffer(
                    self.cmd,
                    &vk::CommandBufferBeginInfo::default()
                        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
                )
                .map_err(kestrel::DeviceError::from)?
        };
        Ok(())
    }

    fn emit(&mut self, command: &Command) {
        let device = &self.device.inner;
        unsafe {
            match command {
                Command::BindPipeline {
                    pipeline,
                    bind_point,
                } => device.cmd_bind_pipeline(self.cmd, *bind_point, *pipeline),
                Command::BindDescriptorSets {
                    bind_point,
                    layout,
                    first_set,
                    sets,
                } => device.cmd_bind_descriptor_sets(
                    self.cmd,
                    *bind_point,
                    *layout,
                    *first_set,
                    sets,
                    &[],
                ),
                Command::BindVertexBuffer {
                    binding,
                    buffer,
                    offset,
                } => device.cmd_bind_vertex_buffers(
                    self.cmd,
                    *binding,
                    core::slice::from_ref(buffer),
                    core::slice::from_ref(offset),
                ),
                Command::BindIndexBuffer {
                    buffer,
                    offset,
                    index_type,
                } => device.cmd_bind_index_buffer(self.cmd, *buffer, *offset, *index_type),
                Command::Draw {
                    vertex_count,
                    instance_count,
                    first_vertex,
                    first_instance,
                } => device.cmd_draw(
                    self.cmd,
                    *vertex_count,
                    *instance_count,
                    *first_vertex,
                    *first_instance,
                ),
                Command::DrawIndexed {
                    index_count,
                    instance_count,
                    first_index,
                    vertex_offset,
                    first_instance,
                } => device.cmd_draw_indexed(
                    self.cmd,
                    *index_count,
                    *instance_count,
                    *first_index,
                    *vertex_offset,
                    *first_instance,
                ),
                Command::DrawIndirect {
                    buffer,
                    offset,
                    draw_count,
                    stride,
                } => device.cmd_draw_indirect(self.cmd, *buffer, *offset, *draw_count, *stride),
                Command::Dispatch { group_count } => {
                    device.cmd_dispatch(self.cmd, group_count[0], group_count[1], group_count[2])
                }
                Command::CopyBufferToBuffer { src, dst, region } => {
                    device.cmd_copy_buffer(self.cmd, *src, *dst, core::slice::from_ref(region))
                }
                Command::CopyBufferToImage {
                    src,
                    dst,
                    dst_layout,
                    region,
                } => device.cmd_copy_buffer_to_image(
                    self.cmd,
                    *src,
                    *dst,
                    *dst_layout,
                    core::slice::from_ref(region),
                ),
                Command::CopyImageToImage {
                    src,
                    src_layout,
                    dst,
                    dst_layout,
                    region,
                } => device.cmd_copy_image(
                    self.cmd,
                    *src,
                    *src_layout,
                    *dst,
                    *dst_layout,
                    core::slice::from_ref(region),
                ),
                Command::TransitionImageLayout {
                    raw,
                    from,
                    to,
                    src_access,
                    src_stage,
                    dst_access,
                    dst_stage,
                    range,
                    ..
                } => {
                    let mut barriers = BarrierBuilder::new();
                    barriers.image_barrier(
                        *raw,
                        *range,
                        *src_access,
                        *src_stage,
                        *from,
                        *dst_access,
                        *dst_stage,
                        *to,
                    );
                    device.cmd_pipeline_barrier2(self.cmd, &barriers.as_dependency_info());
                }
                Command::BeginRenderPass {
                    pass,
                    framebuffer,
                    area,
                    clear_values,
                } => {
                    let begin = vk::RenderPassBeginInfo::default()
                        .render_pass(*pass)
                        .framebuffer(*framebuffer)
                        .render_area(*area)
                        .clear_values(clear_values);
                    device.cmd_begin_render_pass(self.cmd, &begin, vk::SubpassContents::INLINE);
                }
                Command::EndRenderPass { .. } => device.cmd_end_render_pass(self.cmd),
                Command::BeginRendering {
                    area,
                    color_attachments,
                    depth_attachment,
                } => {
                    let colors = color_attachments
                        .iter()
                        .map(Self::rendering_attachment)
                        .collect::<Vec<_>>();
                    let depth = depth_attachment.as_ref().map(|a| Self::rendering_attachment(a));

                    let mut info = vk::RenderingInfo::default()
                        .render_area(*area)
                        .layer_count(1)
                        .color_attachments(&colors);
                    if let Some(depth) = &depth {
                        info = info.depth_attachment(depth);
                    }
                    device.cmd_begin_rendering(self.cmd, &info);
                }
                Command::EndRendering => device.cmd_end_rendering(self.cmd),
                Command::SetScissor { scissor } => {
                    device.cmd_set_scissor(self.cmd, 0, core::slice::from_ref(scissor))
                }
                Command::DebugLabel { label } => {
                    if let Some(debug) = &self.debug {
                        let name = CString::new(label.as_str()).unwrap_or_default();
                        let info = vk::DebugUtilsLabelEXT::default().label_name(&name);
                        debug.cmd_insert_debug_utils_label(self.cmd, &info);
                    }
                }
            }
        }
    }

    fn finish(&mut self) -> Result<(), EncodeError> {
        unsafe {
            self.device
                .inner
                .end_command_buffer(self.cmd)
                .map_err(kestrel::DeviceError::from)?
        };
        Ok(())
    }
}
