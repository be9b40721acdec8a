//! Frame-loop runtime. [Runtime] owns the device, the resource catalog, the
//! command pool and N frames in flight, each with its own native buffer,
//! record log, fence, semaphore pair and bindless set. [Runtime::execute]
//! runs one graph through one frame slot: wait on the slot's fence, rewrite
//! its bindings, record the graph through a [VkEncoder], submit on the single
//! queue, commit the projected image layouts, and optionally hand the result
//! to a [PresentTarget].

use std::sync::Arc;

use kestrel::ash::{self, vk};
use kestrel::context::Device;
use kestrel::resources::{
    BufDesc, Buffer, CommandPool, ComputePipeline, DescriptorPool, DescriptorSetLayout,
    GraphicsPipeline, Image, ImageView, ImgDesc, PipelineLayout, Sampler, ShaderStage,
};
use kestrel::sync::{Fence, Semaphore};
use kestrel::{CommandError, DeviceError};
use slotmap::SlotMap;

use crate::bindless::{self, FrameBindings};
use crate::encoder::VkEncoder;
use crate::error::RuntimeError;
use crate::graph::{Graph, GraphBuilder};
use crate::pass::{framebuffer_extent, Framebuffer, PassDesc, RenderPass};
use crate::recorder::{Command, CommandBuffer, Recording};
use crate::resources::{
    BufferKey, FramebufferKey, GraphKey, ImageKey, PassKey, PipelineKey, Resources, SamplerKey,
};
use crate::state;

///Presentation collaborator. The runtime drives the frame loop and the
/// queue; the target owns the swapchain (or equivalent) and the images the
/// graphs render into.
pub trait PresentTarget {
    ///Acquires the next presentable image, signaling `signal` once it is
    /// ready to be rendered to.
    fn acquire(&mut self, signal: vk::Semaphore) -> Result<(), DeviceError>;
    ///Queues presentation of the acquired image, waiting on `wait`.
    fn present(&mut self, queue: vk::Queue, wait: vk::Semaphore) -> Result<(), DeviceError>;
}

///Construction parameters. The defaults fit a double-buffered frame loop
/// with a moderate binding table.
pub struct RuntimeDesc {
    pub frames_in_flight: usize,
    ///Storage-buffer slots in the bindless table.
    pub bound_buffers: u32,
    ///Capacity of the trailing texture array.
    pub bound_textures: u32,
}

impl Default for RuntimeDesc {
    fn default() -> Self {
        RuntimeDesc {
            frames_in_flight: 2,
            bound_buffers: 64,
            bound_textures: 1024,
        }
    }
}

struct Frame {
    cmd: vk::CommandBuffer,
    log: CommandBuffer,
    fence: Fence,
    acquire: Semaphore,
    release: Semaphore,
    bindings: FrameBindings,
}

pub struct Runtime {
    device: Arc<Device>,
    pub resources: Resources,
    pool: CommandPool,
    #[allow(dead_code)]
    descriptor_pool: Arc<DescriptorPool>,
    bindless_layout: Arc<DescriptorSetLayout>,
    frames: Vec<Frame>,
    frame_index: usize,
    ///Present once [enable_debug_labels](Self::enable_debug_labels) ran;
    /// encoders drop label records otherwise.
    debug: Option<ash::ext::debug_utils::Device>,
    graphs: SlotMap<GraphKey, Graph>,
    declared_buffers: Vec<BufferKey>,
    declared_textures: Vec<ImageKey>,
    default_sampler: Arc<Sampler>,
}

impl Runtime {
    pub fn new(device: &Arc<Device>, desc: RuntimeDesc) -> Result<Self, RuntimeError> {
        let pool = CommandPool::new(
            device,
            device.queue.family_index,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;

        let sizes = bindless::pool_sizes(
            desc.bound_buffers,
            desc.bound_textures,
            desc.frames_in_flight as u32,
        );
        let descriptor_pool = Arc::new(DescriptorPool::new(
            device,
            vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND,
            &sizes,
            desc.frames_in_flight as u32,
        )?);
        let bindless_layout =
            FrameBindings::create_layout(device, desc.bound_buffers, desc.bound_textures)?;

        let cmds = pool.allocate(desc.frames_in_flight as u32)?;
        let mut frames = Vec::with_capacity(desc.frames_in_flight);
        for cmd in cmds {
            frames.push(Frame {
                cmd,
                log: CommandBuffer::new(),
                //signaled, the first wait on a fresh slot must pass
                fence: Fence::new(device, true)?,
                acquire: Semaphore::new(device)?,
                release: Semaphore::new(device)?,
                bindings: FrameBindings::new(
                    device,
                    &descriptor_pool,
                    bindless_layout.clone(),
                    desc.bound_buffers,
                    desc.bound_textures,
                )?,
            });
        }

        let default_sampler = Arc::new(Sampler::new_linear(device)?);

        Ok(Runtime {
            device: device.clone(),
            resources: Resources::new(),
            pool,
            descriptor_pool,
            bindless_layout,
            frames,
            frame_index: 0,
            debug: None,
            graphs: SlotMap::with_key(),
            declared_buffers: Vec::new(),
            declared_textures: Vec::new(),
            default_sampler,
        })
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    ///The descriptor set layout every pipeline created through the runtime
    /// is built against.
    pub fn bindless_layout(&self) -> vk::DescriptorSetLayout {
        self.bindless_layout.inner
    }

    ///Turns the graphs' per-node labels into debug-utils command labels.
    /// Only valid when the instance was created with the debug-utils
    /// extension enabled.
    pub fn enable_debug_labels(&mut self) {
        self.debug = Some(ash::ext::debug_utils::Device::new(
            &self.device.instance,
            &self.device.inner,
        ));
    }

    //---- resource creation -------------------------------------------------

    pub fn new_image(&mut self, desc: ImgDesc) -> Result<ImageKey, RuntimeError> {
        let image = Arc::new(Image::new(&self.device, desc)?);
        let view = Arc::new(ImageView::new_all(&self.device, &image)?);
        Ok(self.resources.add_image(image, view))
    }

    pub fn new_buffer(
        &mut self,
        desc: BufDesc,
        memory_properties: vk::MemoryPropertyFlags,
    ) -> Result<BufferKey, RuntimeError> {
        let buffer = Arc::new(Buffer::new(&self.device, desc, memory_properties)?);
        Ok(self.resources.add_buffer(buffer))
    }

    pub fn new_sampler(&mut self) -> Result<SamplerKey, RuntimeError> {
        let sampler = Arc::new(Sampler::new_linear(&self.device)?);
        Ok(self.resources.add_sampler(sampler))
    }

    ///Registers an externally owned image, for instance a swapchain image.
    pub fn import_image(
        &mut self,
        desc: ImgDesc,
        raw: vk::Image,
        raw_view: vk::ImageView,
        committed_layout: vk::ImageLayout,
    ) -> ImageKey {
        self.resources
            .import_image(desc, raw, raw_view, committed_layout)
    }

    pub fn create_pass(&mut self, desc: PassDesc) -> Result<PassKey, RuntimeError> {
        let pass = RenderPass::new(&self.device, desc)?;
        Ok(self.resources.add_pass(pass))
    }

    ///A pass key without a native pass behind it, the graph identity of a
    /// compute node.
    pub fn create_compute_pass(&mut self) -> PassKey {
        self.resources
            .import_pass(PassDesc::new(), vk::RenderPass::null())
    }

    pub fn create_framebuffer(
        &mut self,
        pass: PassKey,
        attachments: &[ImageKey],
    ) -> Result<FramebufferKey, RuntimeError> {
        let (raw_pass, extent, views) = {
            let pass_entry = self.resources.pass_expect(pass);
            let descs = attachments
                .iter()
                .map(|key| &self.resources.image_expect(*key).desc)
                .collect::<Vec<_>>();
            let extent = framebuffer_extent(&pass_entry.desc, &descs)?;
            let views = attachments
                .iter()
                .map(|key| self.resources.image_expect(*key).raw_view)
                .collect::<Vec<_>>();
            (pass_entry.raw, extent, views)
        };

        let framebuffer = Framebuffer::new(&self.device, raw_pass, &views, extent)?;
        Ok(self.resources.add_framebuffer(
            pass,
            attachments.iter().copied().collect(),
            framebuffer,
        ))
    }

    ///Builds a graphics pipeline against the bindless layout. `create_info`
    /// carries everything but the layout, which is patched in.
    pub fn create_graphics_pipeline(
        &mut self,
        create_info: vk::GraphicsPipelineCreateInfo,
        push_constants: &[vk::PushConstantRange],
    ) -> Result<PipelineKey, RuntimeError> {
        let layout = PipelineLayout::new(
            &self.device,
            core::slice::from_ref(&self.bindless_layout.inner),
            push_constants,
        )?;
        let pipeline = GraphicsPipeline::new(&self.device, create_info, layout)?;
        Ok(self.resources.add_graphics_pipeline(pipeline))
    }

    pub fn create_compute_pipeline(
        &mut self,
        stage: &ShaderStage,
        push_constants: &[vk::PushConstantRange],
    ) -> Result<PipelineKey, RuntimeError> {
        let layout = PipelineLayout::new(
            &self.device,
            core::slice::from_ref(&self.bindless_layout.inner),
            push_constants,
        )?;
        let pipeline = ComputePipeline::new(&self.device, stage, layout)?;
        Ok(self.resources.add_compute_pipeline(pipeline))
    }

    pub fn create_graph(&mut self, builder: GraphBuilder) -> Result<GraphKey, RuntimeError> {
        let graph = builder.build()?;
        Ok(self.graphs.insert(graph))
    }

    pub fn graph(&self, key: GraphKey) -> Option<&Graph> {
        self.graphs.get(key)
    }

    //---- bindless declarations ---------------------------------------------

    ///Declares `buffer` for the next storage-buffer slot. Slot order is
    /// declaration order; shaders address the buffer by that slot index.
    pub fn declare_buffer(&mut self, buffer: BufferKey) -> u32 {
        self.declared_buffers.push(buffer);
        self.declared_buffers.len() as u32 - 1
    }

    ///Declares `image` for the next element of the texture array, returning
    /// the index shaders use.
    pub fn declare_texture(&mut self, image: ImageKey) -> u32 {
        self.declared_textures.push(image);
        self.declared_textures.len() as u32 - 1
    }

    //---- execution ---------------------------------------------------------

    ///Executes `graph` through the current frame slot and advances to the
    /// next one. When the graph was built with `present_after` and a target
    /// is supplied, the submit waits on the target's acquire semaphore and
    /// presentation waits on the submit.
    pub fn execute(
        &mut self,
        graph: GraphKey,
        mut present: Option<&mut dyn PresentTarget>,
    ) -> Result<(), RuntimeError> {
        let graph = self
            .graphs
            .get(graph)
            .ok_or(RuntimeError::UnknownGraph(graph))?;
        let frame = &mut self.frames[self.frame_index];

        frame.fence.wait(u64::MAX)?;
        self.pool.reset_buffer(frame.cmd, false)?;

        frame.bindings.write(
            &self.resources,
            &self.declared_buffers,
            &self.declared_textures,
            self.default_sampler.inner,
        );

        let presenting = graph.present_after && present.is_some();
        if presenting {
            if let Some(target) = present.as_mut() {
                target.acquire(frame.acquire.inner)?;
            }
        }

        let mut encoder = match &self.debug {
            Some(debug) => VkEncoder::new(&self.device, frame.cmd).with_debug(debug.clone()),
            None => VkEncoder::new(&self.device, frame.cmd),
        };
        let mut recording = frame.log.record(&self.resources, &mut encoder)?;
        graph.record(&mut recording, Some(frame.bindings.raw_set()));
        recording.finish()?;

        let wait = [frame.acquire.inner];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal = [frame.release.inner];
        let buffers = [frame.cmd];
        let mut submit = vk::SubmitInfo::default().command_buffers(&buffers);
        if presenting {
            submit = submit
                .wait_semaphores(&wait)
                .wait_dst_stage_mask(&wait_stages)
                .signal_semaphores(&signal);
        }

        //The fence is reset only once every earlier fallible step passed. A
        //reported error (a recoverable acquire failure, say) leaves the slot
        //with a signaled fence, so a retried execute does not deadlock on
        //wait.
        frame.fence.reset()?;
        unsafe {
            self.device
                .inner
                .queue_submit(
                    self.device.queue.inner,
                    core::slice::from_ref(&submit),
                    frame.fence.inner,
                )
                .map_err(|e| CommandError::SubmitFailed(DeviceError::from(e)))?
        };

        commit_projected(&mut self.resources, &frame.log);

        if presenting {
            if let Some(target) = present.as_mut() {
                target.present(self.device.queue.inner, frame.release.inner)?;
            }
        }

        self.frame_index = (self.frame_index + 1) % self.frames.len();
        Ok(())
    }

    ///Records through `recorder` into a transient buffer, submits it and
    /// blocks until execution finished. For uploads and initial layout
    /// transitions outside the frame loop.
    pub fn record_oneshot<R>(&mut self, recorder: R) -> Result<(), RuntimeError>
    where
        R: FnOnce(&mut Recording),
    {
        let cmd = self.pool.allocate(1)?.remove(0);

        let mut log = CommandBuffer::new();
        let result: Result<(), RuntimeError> = (|| {
            let mut encoder = match &self.debug {
                Some(debug) => VkEncoder::new(&self.device, cmd).with_debug(debug.clone()),
                None => VkEncoder::new(&self.device, cmd),
            };
            let mut recording = log.record(&self.resources, &mut encoder)?;
            recorder(&mut recording);
            recording.finish()?;

            let fence = Fence::new(&self.device, false)?;
            let submit = vk::SubmitInfo::default().command_buffers(core::slice::from_ref(&cmd));
            unsafe {
                self.device
                    .inner
                    .queue_submit(
                        self.device.queue.inner,
                        core::slice::from_ref(&submit),
                        fence.inner,
                    )
                    .map_err(|e| CommandError::SubmitFailed(DeviceError::from(e)))?
            };
            fence.wait(u64::MAX)?;
            Ok(())
        })();

        self.pool.free(core::slice::from_ref(&cmd));
        result?;

        commit_projected(&mut self.resources, &log);
        Ok(())
    }

    ///Copies `data` into `dst` through a host-visible staging buffer and a
    /// blocking transient submit.
    pub fn upload_buffer(&mut self, dst: BufferKey, data: &[u8]) -> Result<(), RuntimeError> {
        let (dst_raw, dst_desc) = {
            let entry = self.resources.buffer_expect(dst);
            (entry.raw, entry.desc)
        };
        assert!(
            dst_desc.usage.contains(vk::BufferUsageFlags::TRANSFER_DST),
            "Upload target {:?} was created without TRANSFER_DST usage",
            dst
        );

        let staging = Buffer::new(
            &self.device,
            BufDesc::staging(data.len() as u64),
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging.write(0, data)?;

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size: data.len() as u64,
        };
        kestrel_commands::oneshot(&self.device, &self.pool, |device, cmd| unsafe {
            device.cmd_copy_buffer(cmd, staging.inner, dst_raw, core::slice::from_ref(&region));
        })?;

        Ok(())
    }

    //---- destruction -------------------------------------------------------

    //All destroy paths drain the queue first. Coarse, but the runtime tracks
    //no per-resource submission epochs.

    pub fn destroy_image(&mut self, key: ImageKey) -> bool {
        self.device.wait_idle();
        self.declared_textures.retain(|k| *k != key);
        self.resources.remove_image(key)
    }

    pub fn destroy_buffer(&mut self, key: BufferKey) -> bool {
        self.device.wait_idle();
        self.declared_buffers.retain(|k| *k != key);
        self.resources.remove_buffer(key)
    }

    pub fn destroy_sampler(&mut self, key: SamplerKey) -> bool {
        self.device.wait_idle();
        self.resources.remove_sampler(key)
    }

    pub fn destroy_pass(&mut self, key: PassKey) -> bool {
        self.device.wait_idle();
        self.resources.remove_pass(key)
    }

    pub fn destroy_framebuffer(&mut self, key: FramebufferKey) -> bool {
        self.device.wait_idle();
        self.resources.remove_framebuffer(key)
    }

    pub fn destroy_pipeline(&mut self, key: PipelineKey) -> bool {
        self.device.wait_idle();
        self.resources.remove_pipeline(key)
    }

    pub fn destroy_graph(&mut self, key: GraphKey) -> bool {
        self.graphs.remove(key).is_some()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.device.wait_idle();
    }
}

///Folds the submitted log once and moves every referenced image's committed
/// layout to its projected end state.
fn commit_projected(resources: &mut Resources, log: &CommandBuffer) {
    let mut touched = Vec::new();
    for command in log.commands() {
        match command {
            Command::TransitionImageLayout { image, .. } => touched.push(*image),
            Command::EndRenderPass { attachments } => {
                touched.extend(attachments.iter().map(|(key, _)| *key))
            }
            _ => {}
        }
    }
    touched.sort_unstable();
    touched.dedup();

    for image in touched {
        if let Some(entry) = resources.image(image) {
            let projected = state::projected_layout(log.commands(), image, entry.committed_layout);
            resources.commit_layout(image, projected);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::NoopSink;
    use kestrel::resources::ImgDesc;

    #[test]
    fn commit_moves_only_referenced_images() {
        let mut res = Resources::new();
        let touched = res.import_image(
            ImgDesc::color_attachment(8, 8, vk::Format::R8G8B8A8_UNORM)
                .add_usage(vk::ImageUsageFlags::TRANSFER_DST),
            vk::Image::null(),
            vk::ImageView::null(),
            vk::ImageLayout::UNDEFINED,
        );
        let untouched = res.import_image(
            ImgDesc::default(),
            vk::Image::null(),
            vk::ImageView::null(),
            vk::ImageLayout::GENERAL,
        );

        let mut log = CommandBuffer::new();
        let mut sink = NoopSink;
        let mut recording = log.record(&res, &mut sink).unwrap();
        recording.transition_image_layout(
            touched,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::AccessFlags2::empty(),
            vk::PipelineStageFlags2::TOP_OF_PIPE,
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::PipelineStageFlags2::TRANSFER,
            &[0],
            &[0],
        );
        recording.finish().unwrap();

        commit_projected(&mut res, &log);

        assert_eq!(
            res.image(touched).unwrap().committed_layout,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL
        );
        assert_eq!(
            res.image(untouched).unwrap().committed_layout,
            vk::ImageLayout::GENERAL
        );
    }

    #[test]
    fn commit_prefers_the_pass_final_layout() {
        let mut res = Resources::new();
        let img = res.import_image(
            ImgDesc::color_attachment(8, 8, vk::Format::R8G8B8A8_UNORM),
            vk::Image::null(),
            vk::ImageView::null(),
            vk::ImageLayout::UNDEFINED,
        );
        let pass = res.import_pass(
            crate::pass::PassDesc::new()
                .add_attachment(crate::pass::AttachmentDesc::color_present(
                    vk::Format::R8G8B8A8_UNORM,
                ))
                .add_subpass(
                    crate::pass::SubpassDesc::new()
                        .with_color(crate::pass::AttachmentRef::color(0)),
                ),
            vk::RenderPass::null(),
        );
        let fb = res.import_framebuffer(
            pass,
            &[img],
            vk::Extent2D {
                width: 8,
                height: 8,
            },
            vk::Framebuffer::null(),
        );

        let mut log = CommandBuffer::new();
        let mut sink = NoopSink;
        let mut recording = log.record(&res, &mut sink).unwrap();
        recording.begin_render_pass(pass, fb, &[[0.0; 4]]).end();
        recording.finish().unwrap();

        commit_projected(&mut res, &log);
        assert_eq!(
            res.image(img).unwrap().committed_layout,
            vk::ImageLayout::PRESENT_SRC_KHR
        );
    }
}
