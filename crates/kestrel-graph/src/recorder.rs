//! Command buffer recording.
//!
//! A [CommandBuffer] owns an ordered log of tagged [Command] records plus the
//! `recording` flag. Opening a session clears the log; every append first
//! validates its domain preconditions (violations are programmer errors and
//! panic), then hands the record to the [CommandSink] for native translation,
//! then pushes it onto the log. The log is what the
//! [state tracker](crate::state) folds over, so records carry everything the
//! fold needs and nothing more.
//!
//! Recording is single-threaded per buffer. The flag catches re-entrant
//! `record` calls, not cross-thread races; those are the caller's problem.

use core::ops::{Deref, DerefMut};

use kestrel::ash::vk;
use smallvec::SmallVec;

use crate::error::{EncodeError, RecordError};
use crate::resources::{BufferKey, FramebufferKey, ImageKey, PassKey, PipelineKey, Resources};
use crate::state;

///One attachment of a dynamic-rendering scope.
#[derive(Clone, Copy)]
pub struct DynAttachment {
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear: vk::ClearValue,
}

impl DynAttachment {
    pub fn color_clear(view: vk::ImageView, clear: [f32; 4]) -> Self {
        DynAttachment {
            view,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear: vk::ClearValue {
                color: vk::ClearColorValue { float32: clear },
            },
        }
    }

    pub fn depth_clear(view: vk::ImageView) -> Self {
        DynAttachment {
            view,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            clear: vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        }
    }
}

///Closed set of record kinds. Immutable once appended; replaying a buffer
/// means folding or re-emitting this list in order.
pub enum Command {
    BindPipeline {
        pipeline: vk::Pipeline,
        bind_point: vk::PipelineBindPoint,
    },
    BindDescriptorSets {
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: SmallVec<[vk::DescriptorSet; 4]>,
    },
    BindVertexBuffer {
        binding: u32,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
    },
    BindIndexBuffer {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    DrawIndirect {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        draw_count: u32,
        stride: u32,
    },
    Dispatch {
        group_count: [u32; 3],
    },
    CopyBufferToBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        region: vk::BufferCopy,
    },
    CopyBufferToImage {
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        region: vk::BufferImageCopy,
    },
    CopyImageToImage {
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        region: vk::ImageCopy,
    },
    TransitionImageLayout {
        image: ImageKey,
        raw: vk::Image,
        from: vk::ImageLayout,
        to: vk::ImageLayout,
        src_access: vk::AccessFlags2,
        src_stage: vk::PipelineStageFlags2,
        dst_access: vk::AccessFlags2,
        dst_stage: vk::PipelineStageFlags2,
        range: vk::ImageSubresourceRange,
    },
    BeginRenderPass {
        pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        area: vk::Rect2D,
        clear_values: SmallVec<[vk::ClearValue; 4]>,
    },
    EndRenderPass {
        ///Attached images paired with the final layout the pass leaves them
        /// in; the state tracker folds these without any catalog lookup.
        attachments: SmallVec<[(ImageKey, vk::ImageLayout); 4]>,
    },
    BeginRendering {
        area: vk::Rect2D,
        color_attachments: SmallVec<[DynAttachment; 4]>,
        depth_attachment: Option<DynAttachment>,
    },
    EndRendering,
    SetScissor {
        scissor: vk::Rect2D,
    },
    DebugLabel {
        label: String,
    },
}

///Native translation seam. The recorder validates and logs; the sink turns
/// each accepted record into the corresponding native submission calls.
pub trait CommandSink {
    ///Opens the native buffer.
    fn begin(&mut self) -> Result<(), EncodeError>;
    ///Translates one record. `vkCmd*` calls can not fail, so neither can
    /// this.
    fn emit(&mut self, command: &Command);
    ///Closes the native buffer.
    fn finish(&mut self) -> Result<(), EncodeError>;
}

///Sink that accepts every record and translates to nothing. Lets a
/// recording be driven and inspected without a device.
pub struct NoopSink;

impl CommandSink for NoopSink {
    fn begin(&mut self) -> Result<(), EncodeError> {
        Ok(())
    }

    fn emit(&mut self, _command: &Command) {}

    fn finish(&mut self) -> Result<(), EncodeError> {
        Ok(())
    }
}

///Ordered log of commands for one submission cycle.
pub struct CommandBuffer {
    commands: Vec<Command>,
    recording: bool,
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBuffer {
    pub fn new() -> Self {
        CommandBuffer {
            commands: Vec::new(),
            recording: false,
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    ///Opens a recording session. Clears the previous cycle's log, since
    /// recorded commands are only meaningful for a single submission. Fails
    /// if a session is already open on this buffer.
    pub fn record<'a>(
        &'a mut self,
        res: &'a Resources,
        sink: &'a mut dyn CommandSink,
    ) -> Result<Recording<'a>, RecordError> {
        if self.recording {
            return Err(RecordError::AlreadyRecording);
        }

        self.commands.clear();
        sink.begin()?;
        self.recording = true;

        Ok(Recording {
            buffer: self,
            res,
            sink,
            finished: false,
        })
    }
}

///Open recording session. Appends go through this guard; dropping it (or
/// calling [finish](Self::finish)) closes the buffer on every exit path.
pub struct Recording<'a> {
    buffer: &'a mut CommandBuffer,
    res: &'a Resources,
    sink: &'a mut dyn CommandSink,
    finished: bool,
}

impl<'a> Recording<'a> {
    pub fn resources(&self) -> &Resources {
        self.res
    }

    pub fn commands(&self) -> &[Command] {
        &self.buffer.commands
    }

    ///Layout `image` will be in at this point of the recording, assuming
    /// everything recorded so far executes in order.
    pub fn projected_layout(&self, image: ImageKey) -> vk::ImageLayout {
        state::projected_layout(
            &self.buffer.commands,
            image,
            self.res.image_expect(image).committed_layout,
        )
    }

    fn push(&mut self, command: Command) {
        self.sink.emit(&command);
        self.buffer.commands.push(command);
    }

    pub fn bind_pipeline(&mut self, pipeline: PipelineKey) {
        let entry = self.res.pipeline_expect(pipeline);
        let (raw, bind_point) = (entry.raw, entry.bind_point);
        self.push(Command::BindPipeline {
            pipeline: raw,
            bind_point,
        });
    }

    ///Binding a set does not disturb sets bound to other, layout-compatible
    /// slots; that is native behaviour and kept here.
    pub fn bind_descriptor_sets(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        self.push(Command::BindDescriptorSets {
            bind_point,
            layout,
            first_set,
            sets: SmallVec::from_slice(sets),
        });
    }

    pub fn bind_vertex_buffer(&mut self, binding: u32, buffer: BufferKey, offset: vk::DeviceSize) {
        let entry = self.res.buffer_expect(buffer);
        assert!(
            entry.desc.usage.contains(vk::BufferUsageFlags::VERTEX_BUFFER),
            "Buffer {:?} bound as vertex buffer but was created without VERTEX_BUFFER usage",
            buffer
        );
        let raw = entry.raw;
        self.push(Command::BindVertexBuffer {
            binding,
            buffer: raw,
            offset,
        });
    }

    pub fn bind_index_buffer(
        &mut self,
        buffer: BufferKey,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        let entry = self.res.buffer_expect(buffer);
        assert!(
            entry.desc.usage.contains(vk::BufferUsageFlags::INDEX_BUFFER),
            "Buffer {:?} bound as index buffer but was created without INDEX_BUFFER usage",
            buffer
        );
        let raw = entry.raw;
        self.push(Command::BindIndexBuffer {
            buffer: raw,
            offset,
            index_type,
        });
    }

    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        self.push(Command::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.push(Command::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
    }

    pub fn draw_indirect(
        &mut self,
        buffer: BufferKey,
        offset: vk::DeviceSize,
        draw_count: u32,
        stride: u32,
    ) {
        let entry = self.res.buffer_expect(buffer);
        assert!(
            entry
                .desc
                .usage
                .contains(vk::BufferUsageFlags::INDIRECT_BUFFER),
            "Buffer {:?} used for indirect draws but was created without INDIRECT_BUFFER usage",
            buffer
        );
        let raw = entry.raw;
        self.push(Command::DrawIndirect {
            buffer: raw,
            offset,
            draw_count,
            stride,
        });
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.push(Command::Dispatch {
            group_count: [x, y, z],
        });
    }

    pub fn copy_buffer_to_buffer(&mut self, src: BufferKey, dst: BufferKey, region: vk::BufferCopy) {
        let src_entry = self.res.buffer_expect(src);
        let dst_entry = self.res.buffer_expect(dst);
        assert!(
            src_entry
                .desc
                .usage
                .contains(vk::BufferUsageFlags::TRANSFER_SRC),
            "Copy source buffer {:?} was created without TRANSFER_SRC usage",
            src
        );
        assert!(
            dst_entry
                .desc
                .usage
                .contains(vk::BufferUsageFlags::TRANSFER_DST),
            "Copy destination buffer {:?} was created without TRANSFER_DST usage",
            dst
        );
        let (src_raw, dst_raw) = (src_entry.raw, dst_entry.raw);
        self.push(Command::CopyBufferToBuffer {
            src: src_raw,
            dst: dst_raw,
            region,
        });
    }

    pub fn copy_buffer_to_image(
        &mut self,
        src: BufferKey,
        dst: ImageKey,
        region: vk::BufferImageCopy,
    ) {
        let src_entry = self.res.buffer_expect(src);
        assert!(
            src_entry
                .desc
                .usage
                .contains(vk::BufferUsageFlags::TRANSFER_SRC),
            "Copy source buffer {:?} was created without TRANSFER_SRC usage",
            src
        );
        let projected = self.projected_layout(dst);
        assert!(
            projected == vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            "Copy destination image {:?} projects to layout {:?} at this point, expected TRANSFER_DST_OPTIMAL",
            dst,
            projected
        );
        let (src_raw, dst_raw) = (src_entry.raw, self.res.image_expect(dst).raw);
        self.push(Command::CopyBufferToImage {
            src: src_raw,
            dst: dst_raw,
            dst_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            region,
        });
    }

    pub fn copy_image_to_image(&mut self, src: ImageKey, dst: ImageKey, region: vk::ImageCopy) {
        let src_projected = self.projected_layout(src);
        assert!(
            src_projected == vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            "Copy source image {:?} projects to layout {:?} at this point, expected TRANSFER_SRC_OPTIMAL",
            src,
            src_projected
        );
        let dst_projected = self.projected_layout(dst);
        assert!(
            dst_projected == vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            "Copy destination image {:?} projects to layout {:?} at this point, expected TRANSFER_DST_OPTIMAL",
            dst,
            dst_projected
        );
        let (src_raw, dst_raw) = (self.res.image_expect(src).raw, self.res.image_expect(dst).raw);
        self.push(Command::CopyImageToImage {
            src: src_raw,
            src_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            dst: dst_raw,
            dst_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            region,
        });
    }

    ///Emits the memory barrier moving `image` from its projected layout to
    /// `to`. The source layout comes from the state tracker, never from the
    /// caller. `mip_levels` and `layers` select the subresource range and
    /// must each be ascending without gaps.
    ///
    /// A transition to the layout the image already projects to is a caller
    /// bug and panics.
    #[allow(clippy::too_many_arguments)]
    pub fn transition_image_layout(
        &mut self,
        image: ImageKey,
        to: vk::ImageLayout,
        src_access: vk::AccessFlags2,
        src_stage: vk::PipelineStageFlags2,
        dst_access: vk::AccessFlags2,
        dst_stage: vk::PipelineStageFlags2,
        mip_levels: &[u32],
        layers: &[u32],
    ) {
        let from = self.projected_layout(image);
        assert!(
            from != to,
            "no-op layout transition: image {:?} already projects to {:?}",
            image,
            to
        );
        assert!(
            !mip_levels.is_empty() && state::is_contiguous(mip_levels),
            "Mip level list {:?} for image {:?} is empty or not contiguous",
            mip_levels,
            image
        );
        assert!(
            !layers.is_empty() && state::is_contiguous(layers),
            "Layer list {:?} for image {:?} is empty or not contiguous",
            layers,
            image
        );

        let entry = self.res.image_expect(image);
        let range = vk::ImageSubresourceRange {
            aspect_mask: entry.desc.aspect_mask(),
            base_mip_level: mip_levels[0],
            level_count: mip_levels.len() as u32,
            base_array_layer: layers[0],
            layer_count: layers.len() as u32,
        };
        let raw = entry.raw;

        self.push(Command::TransitionImageLayout {
            image,
            raw,
            from,
            to,
            src_access,
            src_stage,
            dst_access,
            dst_stage,
            range,
        });
    }

    ///Opens a render-pass scope. Emits the native begin-pass call with one
    /// clear value per attachment: colour attachments take the caller's
    /// colours in declaration order, depth attachments a fixed
    /// `{depth: 1.0, stencil: 0}`. The returned guard emits the matching
    /// end-pass record on every exit path.
    pub fn begin_render_pass<'r>(
        &'r mut self,
        pass: PassKey,
        framebuffer: FramebufferKey,
        clear_colors: &[[f32; 4]],
    ) -> PassRun<'r, 'a> {
        let fb = self.res.framebuffer_expect(framebuffer);
        assert!(
            fb.pass == pass,
            "Framebuffer {:?} was built for pass {:?}, not {:?}",
            framebuffer,
            fb.pass,
            pass
        );
        let pass_entry = self.res.pass_expect(pass);

        let mut colors = clear_colors.iter();
        let mut clear_values: SmallVec<[vk::ClearValue; 4]> = SmallVec::new();
        for attachment in pass_entry.desc.attachments.iter() {
            if attachment.is_depth() {
                clear_values.push(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                });
            } else {
                let color = colors.next().unwrap_or_else(|| {
                    panic!(
                        "Pass {:?} declares more colour attachments than clear colours supplied",
                        pass
                    )
                });
                clear_values.push(vk::ClearValue {
                    color: vk::ClearColorValue { float32: *color },
                });
            }
        }
        assert!(
            colors.next().is_none(),
            "More clear colours supplied than pass {:?} has colour attachments",
            pass
        );

        let attachments = fb
            .attachments
            .iter()
            .zip(pass_entry.desc.attachments.iter())
            .map(|(image, desc)| (*image, desc.final_layout))
            .collect::<SmallVec<[(ImageKey, vk::ImageLayout); 4]>>();

        let (raw_pass, raw_fb, extent) = (pass_entry.raw, fb.raw, fb.extent);
        self.push(Command::BeginRenderPass {
            pass: raw_pass,
            framebuffer: raw_fb,
            area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            clear_values,
        });

        PassRun {
            recording: self,
            attachments,
            ended: false,
        }
    }

    ///Opens an attachment-only rendering scope without a pass object. No
    /// layout side effects; the caller transitions the attachments
    /// explicitly.
    pub fn begin_rendering<'r>(
        &'r mut self,
        area: vk::Rect2D,
        color_attachments: &[DynAttachment],
        depth_attachment: Option<DynAttachment>,
    ) -> RenderingRun<'r, 'a> {
        self.push(Command::BeginRendering {
            area,
            color_attachments: SmallVec::from_slice(color_attachments),
            depth_attachment,
        });

        RenderingRun {
            recording: self,
            ended: false,
        }
    }

    pub fn set_scissor(&mut self, scissor: vk::Rect2D) {
        self.push(Command::SetScissor { scissor });
    }

    pub fn debug_label(&mut self, label: impl Into<String>) {
        self.push(Command::DebugLabel {
            label: label.into(),
        });
    }

    ///Closes the session and flushes the sink. Prefer this over dropping so
    /// encoder errors surface.
    pub fn finish(mut self) -> Result<(), RecordError> {
        self.finished = true;
        self.buffer.recording = false;
        self.sink.finish()?;
        Ok(())
    }
}

impl Drop for Recording<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.buffer.recording = false;
            if let Err(_e) = self.sink.finish() {
                #[cfg(feature = "logging")]
                log::error!("Closing recording on drop failed: {}", _e);
            }
        }
    }
}

///Scope guard for a render pass opened with
/// [begin_render_pass](Recording::begin_render_pass). Commands appended
/// through it are inside the pass; the end-pass record is emitted exactly
/// once, on [end](Self::end) or on drop.
pub struct PassRun<'r, 'a> {
    recording: &'r mut Recording<'a>,
    attachments: SmallVec<[(ImageKey, vk::ImageLayout); 4]>,
    ended: bool,
}

impl<'a> Deref for PassRun<'_, 'a> {
    type Target = Recording<'a>;
    fn deref(&self) -> &Self::Target {
        self.recording
    }
}

impl DerefMut for PassRun<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.recording
    }
}

impl PassRun<'_, '_> {
    fn end_inner(&mut self) {
        let attachments = core::mem::take(&mut self.attachments);
        self.recording.push(Command::EndRenderPass { attachments });
        self.ended = true;
    }

    pub fn end(mut self) {
        self.end_inner();
    }
}

impl Drop for PassRun<'_, '_> {
    fn drop(&mut self) {
        if !self.ended {
            self.end_inner();
        }
    }
}

///Scope guard for a dynamic-rendering scope.
pub struct RenderingRun<'r, 'a> {
    recording: &'r mut Recording<'a>,
    ended: bool,
}

impl<'a> Deref for RenderingRun<'_, 'a> {
    type Target = Recording<'a>;
    fn deref(&self) -> &Self::Target {
        self.recording
    }
}

impl DerefMut for RenderingRun<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.recording
    }
}

impl RenderingRun<'_, '_> {
    fn end_inner(&mut self) {
        self.recording.push(Command::EndRendering);
        self.ended = true;
    }

    pub fn end(mut self) {
        self.end_inner();
    }
}

impl Drop for RenderingRun<'_, '_> {
    fn drop(&mut self) {
        if !self.ended {
            self.end_inner();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel::resources::{BufDesc, ImgDesc};

    fn color_image(res: &mut Resources) -> ImageKey {
        res.import_image(
            ImgDesc::color_attachment(32, 32, vk::Format::R8G8B8A8_UNORM)
                .add_usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::TRANSFER_SRC),
            vk::Image::null(),
            vk::ImageView::null(),
            vk::ImageLayout::UNDEFINED,
        )
    }

    fn staging_buffer(res: &mut Resources) -> BufferKey {
        res.import_buffer(BufDesc::staging(256), vk::Buffer::null())
    }

    fn color_pass(res: &mut Resources) -> (PassKey, FramebufferKey, ImageKey) {
        use crate::pass::{AttachmentDesc, AttachmentRef, PassDesc, SubpassDesc};

        let img = color_image(res);
        let pass = res.import_pass(
            PassDesc::new()
                .add_attachment(AttachmentDesc::color_present(vk::Format::R8G8B8A8_UNORM))
                .add_subpass(SubpassDesc::new().with_color(AttachmentRef::color(0))),
            vk::RenderPass::null(),
        );
        let fb = res.import_framebuffer(
            pass,
            &[img],
            vk::Extent2D {
                width: 32,
                height: 32,
            },
            vk::Framebuffer::null(),
        );
        (pass, fb, img)
    }

    ///Sink whose native open fails, standing in for a frame whose encoder
    /// errors before any work was submitted.
    struct RefusingSink;

    impl CommandSink for RefusingSink {
        fn begin(&mut self) -> Result<(), EncodeError> {
            Err(EncodeError::Device(
                kestrel::DeviceError::VkError(vk::Result::ERROR_OUT_OF_DATE_KHR),
            ))
        }

        fn emit(&mut self, _command: &Command) {}

        fn finish(&mut self) -> Result<(), EncodeError> {
            Ok(())
        }
    }

    #[test]
    fn failed_open_leaves_the_buffer_reusable() {
        let res = Resources::new();
        let mut buffer = CommandBuffer::new();

        let mut failing = RefusingSink;
        assert!(matches!(
            buffer.record(&res, &mut failing),
            Err(RecordError::Encode(_))
        ));
        //the error path must leave the slot in its idle state, a retry on
        //the same buffer has to succeed
        assert!(!buffer.is_recording());

        let mut sink = NoopSink;
        let mut recording = buffer.record(&res, &mut sink).unwrap();
        recording.draw(3, 1, 0, 0);
        recording.finish().unwrap();
        assert_eq!(buffer.commands().len(), 1);
    }

    #[test]
    fn second_session_on_open_buffer_is_rejected() {
        let res = Resources::new();
        let mut buffer = CommandBuffer::new();
        let mut sink = NoopSink;

        let recording = buffer.record(&res, &mut sink).unwrap();
        core::mem::forget(recording);

        let mut sink = NoopSink;
        assert!(matches!(
            buffer.record(&res, &mut sink),
            Err(RecordError::AlreadyRecording)
        ));
    }

    #[test]
    fn reopening_clears_the_previous_log() {
        let res = Resources::new();
        let mut buffer = CommandBuffer::new();
        let mut sink = NoopSink;

        let mut recording = buffer.record(&res, &mut sink).unwrap();
        recording.draw(3, 1, 0, 0);
        recording.finish().unwrap();
        assert_eq!(buffer.commands().len(), 1);
        assert!(!buffer.is_recording());

        let recording = buffer.record(&res, &mut sink).unwrap();
        assert!(recording.commands().is_empty());
        drop(recording);
        assert!(!buffer.is_recording());
    }

    #[test]
    fn commands_are_logged_in_order() {
        let res = Resources::new();
        let mut buffer = CommandBuffer::new();
        let mut sink = NoopSink;

        let mut recording = buffer.record(&res, &mut sink).unwrap();
        recording.draw(3, 1, 0, 0);
        recording.dispatch(8, 8, 1);
        recording.set_scissor(vk::Rect2D::default());
        recording.finish().unwrap();

        assert!(matches!(
            buffer.commands(),
            [
                Command::Draw {
                    vertex_count: 3,
                    ..
                },
                Command::Dispatch {
                    group_count: [8, 8, 1]
                },
                Command::SetScissor { .. },
            ]
        ));
    }

    #[test]
    fn transition_source_is_the_projected_layout() {
        let mut res = Resources::new();
        let img = color_image(&mut res);
        let mut buffer = CommandBuffer::new();
        let mut sink = NoopSink;

        let mut recording = buffer.record(&res, &mut sink).unwrap();
        recording.transition_image_layout(
            img,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::AccessFlags2::empty(),
            vk::PipelineStageFlags2::TOP_OF_PIPE,
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::PipelineStageFlags2::TRANSFER,
            &[0],
            &[0],
        );
        recording.transition_image_layout(
            img,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::SHADER_READ,
            vk::PipelineStageFlags2::FRAGMENT_SHADER,
            &[0],
            &[0],
        );
        recording.finish().unwrap();

        assert!(matches!(
            buffer.commands(),
            [
                Command::TransitionImageLayout {
                    from: vk::ImageLayout::UNDEFINED,
                    to: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    ..
                },
                Command::TransitionImageLayout {
                    from: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    to: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    ..
                },
            ]
        ));
    }

    #[test]
    #[should_panic(expected = "no-op layout transition")]
    fn noop_transition_panics() {
        let mut res = Resources::new();
        let img = res.import_image(
            ImgDesc::default(),
            vk::Image::null(),
            vk::ImageView::null(),
            vk::ImageLayout::GENERAL,
        );
        let mut buffer = CommandBuffer::new();
        let mut sink = NoopSink;

        let mut recording = buffer.record(&res, &mut sink).unwrap();
        recording.transition_image_layout(
            img,
            vk::ImageLayout::GENERAL,
            vk::AccessFlags2::empty(),
            vk::PipelineStageFlags2::TOP_OF_PIPE,
            vk::AccessFlags2::empty(),
            vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
            &[0],
            &[0],
        );
    }

    #[test]
    #[should_panic(expected = "not contiguous")]
    fn gapped_mip_list_panics() {
        let mut res = Resources::new();
        let img = color_image(&mut res);
        let mut buffer = CommandBuffer::new();
        let mut sink = NoopSink;

        let mut recording = buffer.record(&res, &mut sink).unwrap();
        recording.transition_image_layout(
            img,
            vk::ImageLayout::GENERAL,
            vk::AccessFlags2::empty(),
            vk::PipelineStageFlags2::TOP_OF_PIPE,
            vk::AccessFlags2::empty(),
            vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
            &[0, 2],
            &[0],
        );
    }

    #[test]
    #[should_panic(expected = "without VERTEX_BUFFER usage")]
    fn vertex_bind_needs_vertex_usage() {
        let mut res = Resources::new();
        let buf = staging_buffer(&mut res);
        let mut buffer = CommandBuffer::new();
        let mut sink = NoopSink;

        let mut recording = buffer.record(&res, &mut sink).unwrap();
        recording.bind_vertex_buffer(0, buf, 0);
    }

    #[test]
    #[should_panic(expected = "expected TRANSFER_DST_OPTIMAL")]
    fn copy_into_untransitioned_image_panics() {
        let mut res = Resources::new();
        let img = color_image(&mut res);
        let buf = staging_buffer(&mut res);
        let mut buffer = CommandBuffer::new();
        let mut sink = NoopSink;

        let mut recording = buffer.record(&res, &mut sink).unwrap();
        recording.copy_buffer_to_image(buf, img, vk::BufferImageCopy::default());
    }

    #[test]
    fn copy_after_transition_is_accepted() {
        let mut res = Resources::new();
        let img = color_image(&mut res);
        let buf = staging_buffer(&mut res);
        let mut buffer = CommandBuffer::new();
        let mut sink = NoopSink;

        let mut recording = buffer.record(&res, &mut sink).unwrap();
        recording.transition_image_layout(
            img,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::AccessFlags2::empty(),
            vk::PipelineStageFlags2::TOP_OF_PIPE,
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::PipelineStageFlags2::TRANSFER,
            &[0],
            &[0],
        );
        recording.copy_buffer_to_image(buf, img, vk::BufferImageCopy::default());
        recording.finish().unwrap();

        assert!(matches!(
            buffer.commands().last(),
            Some(Command::CopyBufferToImage {
                dst_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                ..
            })
        ));
    }

    #[test]
    fn pass_scope_emits_begin_and_end() {
        let mut res = Resources::new();
        let (pass, fb, img) = color_pass(&mut res);
        let mut buffer = CommandBuffer::new();
        let mut sink = NoopSink;

        let mut recording = buffer.record(&res, &mut sink).unwrap();
        {
            let mut run = recording.begin_render_pass(pass, fb, &[[0.0, 0.0, 0.0, 1.0]]);
            run.draw(3, 1, 0, 0);
            run.end();
        }
        assert_eq!(
            recording.projected_layout(img),
            vk::ImageLayout::PRESENT_SRC_KHR
        );
        recording.finish().unwrap();

        match buffer.commands() {
            [Command::BeginRenderPass { clear_values, .. }, Command::Draw { .. }, Command::EndRenderPass { attachments }] =>
            {
                assert_eq!(clear_values.len(), 1);
                assert_eq!(
                    attachments.as_slice(),
                    &[(img, vk::ImageLayout::PRESENT_SRC_KHR)]
                );
            }
            _ => panic!("unexpected command sequence"),
        }
    }

    #[test]
    fn dropping_the_pass_guard_ends_the_pass() {
        let mut res = Resources::new();
        let (pass, fb, _img) = color_pass(&mut res);
        let mut buffer = CommandBuffer::new();
        let mut sink = NoopSink;

        let mut recording = buffer.record(&res, &mut sink).unwrap();
        {
            let _run = recording.begin_render_pass(pass, fb, &[[0.0; 4]]);
        }
        recording.finish().unwrap();

        assert!(matches!(
            buffer.commands(),
            [
                Command::BeginRenderPass { .. },
                Command::EndRenderPass { .. }
            ]
        ));
    }

    #[test]
    fn depth_attachment_gets_the_fixed_clear() {
        use crate::pass::{AttachmentDesc, AttachmentRef, PassDesc, SubpassDesc};

        let mut res = Resources::new();
        let color = color_image(&mut res);
        let depth = res.import_image(
            ImgDesc::depth_attachment(32, 32, vk::Format::D32_SFLOAT),
            vk::Image::null(),
            vk::ImageView::null(),
            vk::ImageLayout::UNDEFINED,
        );
        let pass = res.import_pass(
            PassDesc::new()
                .add_attachment(AttachmentDesc::color(vk::Format::R8G8B8A8_UNORM))
                .add_attachment(AttachmentDesc::depth(vk::Format::D32_SFLOAT))
                .add_subpass(
                    SubpassDesc::new()
                        .with_color(AttachmentRef::color(0))
                        .with_depth_stencil(AttachmentRef::depth(1)),
                ),
            vk::RenderPass::null(),
        );
        let fb = res.import_framebuffer(
            pass,
            &[color, depth],
            vk::Extent2D {
                width: 32,
                height: 32,
            },
            vk::Framebuffer::null(),
        );

        let mut buffer = CommandBuffer::new();
        let mut sink = NoopSink;
        let mut recording = buffer.record(&res, &mut sink).unwrap();
        recording
            .begin_render_pass(pass, fb, &[[0.1, 0.2, 0.3, 1.0]])
            .end();
        recording.finish().unwrap();

        match &buffer.commands()[0] {
            Command::BeginRenderPass { clear_values, .. } => {
                assert_eq!(clear_values.len(), 2);
                //union reads, the slots were written with these members
                unsafe {
                    assert_eq!(clear_values[0].color.float32, [0.1, 0.2, 0.3, 1.0]);
                    assert_eq!(clear_values[1].depth_stencil.depth, 1.0);
                    assert_eq!(clear_values[1].depth_stencil.stencil, 0);
                }
            }
            _ => panic!("expected a begin-pass record"),
        }
    }

    #[test]
    #[should_panic(expected = "more colour attachments than clear colours")]
    fn missing_clear_colour_panics() {
        let mut res = Resources::new();
        let (pass, fb, _img) = color_pass(&mut res);
        let mut buffer = CommandBuffer::new();
        let mut sink = NoopSink;

        let mut recording = buffer.record(&res, &mut sink).unwrap();
        let _run = recording.begin_render_pass(pass, fb, &[]);
    }

    #[test]
    fn rendering_scope_has_no_layout_effect() {
        let mut res = Resources::new();
        let img = color_image(&mut res);
        let view = res.image_expect(img).raw_view;
        let mut buffer = CommandBuffer::new();
        let mut sink = NoopSink;

        let mut recording = buffer.record(&res, &mut sink).unwrap();
        {
            let mut run = recording.begin_rendering(
                vk::Rect2D::default(),
                &[DynAttachment::color_clear(view, [0.0; 4])],
                None,
            );
            run.draw(3, 1, 0, 0);
        }
        assert_eq!(recording.projected_layout(img), vk::ImageLayout::UNDEFINED);
        recording.finish().unwrap();

        assert!(matches!(
            buffer.commands(),
            [
                Command::BeginRendering { .. },
                Command::Draw { .. },
                Command::EndRendering
            ]
        ));
    }
}
