//! Catalog of backend-owned resources. Everything the recorder touches is
//! referenced through a generation-checked slotmap key, never through an
//! owning pointer. A key is nullable ([slotmap::Key::null]) and compared by
//! value.
//!
//! Entries carry the raw Vulkan handle plus the plain description needed for
//! validation at record time. The owning wrapper is optional: imported
//! resources (swapchain images, test doubles) are registered with `None` and
//! outlive the catalog by the caller's discipline.

use std::sync::Arc;

use kestrel::ash::vk;
use kestrel::resources::{
    Buffer, BufDesc, ComputePipeline, GraphicsPipeline, Image, ImageView, ImgDesc, Sampler,
};
use slotmap::SlotMap;
use smallvec::SmallVec;

use crate::pass::{Framebuffer, PassDesc, RenderPass};

slotmap::new_key_type! {
    pub struct ImageKey;
    pub struct BufferKey;
    pub struct SamplerKey;
    pub struct PassKey;
    pub struct FramebufferKey;
    pub struct PipelineKey;
    pub struct GraphKey;
}

pub struct ImageEntry {
    pub desc: ImgDesc,
    pub raw: vk::Image,
    pub raw_view: vk::ImageView,
    ///Layout the image is guaranteed to be in once all previously submitted
    /// command buffers referencing it have finished. Only moved by a
    /// successful submission, never while a recording is open.
    pub committed_layout: vk::ImageLayout,
    ///`None` for imported images.
    pub(crate) owner: Option<(Arc<Image>, Arc<ImageView>)>,
}

impl ImageEntry {
    pub fn is_sampled(&self) -> bool {
        self.desc.usage.contains(vk::ImageUsageFlags::SAMPLED)
    }
}

pub struct BufferEntry {
    pub desc: BufDesc,
    pub raw: vk::Buffer,
    pub(crate) owner: Option<Arc<Buffer>>,
}

impl BufferEntry {
    pub fn is_storage(&self) -> bool {
        self.desc.usage.contains(vk::BufferUsageFlags::STORAGE_BUFFER)
    }
}

pub struct SamplerEntry {
    pub raw: vk::Sampler,
    pub(crate) owner: Option<Arc<Sampler>>,
}

pub struct PassEntry {
    pub desc: PassDesc,
    pub raw: vk::RenderPass,
    pub(crate) owner: Option<RenderPass>,
}

pub struct FramebufferEntry {
    pub pass: PassKey,
    ///Attached images, index-aligned with the pass's attachment list.
    pub attachments: SmallVec<[ImageKey; 4]>,
    pub extent: vk::Extent2D,
    pub raw: vk::Framebuffer,
    pub(crate) owner: Option<Framebuffer>,
}

pub(crate) enum AnyPipeline {
    Graphics(GraphicsPipeline),
    Compute(ComputePipeline),
}

pub struct PipelineEntry {
    pub raw: vk::Pipeline,
    pub raw_layout: vk::PipelineLayout,
    pub bind_point: vk::PipelineBindPoint,
    pub(crate) owner: Option<AnyPipeline>,
}

///Backend-owned storage behind the catalog keys.
#[derive(Default)]
pub struct Resources {
    pub(crate) images: SlotMap<ImageKey, ImageEntry>,
    pub(crate) buffers: SlotMap<BufferKey, BufferEntry>,
    pub(crate) samplers: SlotMap<SamplerKey, SamplerEntry>,
    pub(crate) passes: SlotMap<PassKey, PassEntry>,
    pub(crate) framebuffers: SlotMap<FramebufferKey, FramebufferEntry>,
    pub(crate) pipelines: SlotMap<PipelineKey, PipelineEntry>,
}

impl Resources {
    pub fn new() -> Self {
        Resources::default()
    }

    pub fn add_image(&mut self, image: Arc<Image>, view: Arc<ImageView>) -> ImageKey {
        self.images.insert(ImageEntry {
            desc: image.desc,
            raw: image.inner,
            raw_view: view.inner,
            committed_layout: vk::ImageLayout::UNDEFINED,
            owner: Some((image, view)),
        })
    }

    ///Registers an externally owned image, for instance a swapchain image.
    /// The caller keeps `raw` and `raw_view` alive for as long as the key is
    /// referenced; the catalog will not destroy them.
    pub fn import_image(
        &mut self,
        desc: ImgDesc,
        raw: vk::Image,
        raw_view: vk::ImageView,
        committed_layout: vk::ImageLayout,
    ) -> ImageKey {
        self.images.insert(ImageEntry {
            desc,
            raw,
            raw_view,
            committed_layout,
            owner: None,
        })
    }

    pub fn add_buffer(&mut self, buffer: Arc<Buffer>) -> BufferKey {
        self.buffers.insert(BufferEntry {
            desc: buffer.desc,
            raw: buffer.inner,
            owner: Some(buffer),
        })
    }

    ///Registers an externally owned buffer. See [import_image](Self::import_image).
    pub fn import_buffer(&mut self, desc: BufDesc, raw: vk::Buffer) -> BufferKey {
        self.buffers.insert(BufferEntry {
            desc,
            raw,
            owner: None,
        })
    }

    pub fn add_sampler(&mut self, sampler: Arc<Sampler>) -> SamplerKey {
        self.samplers.insert(SamplerEntry {
            raw: sampler.inner,
            owner: Some(sampler),
        })
    }

    pub(crate) fn add_pass(&mut self, pass: RenderPass) -> PassKey {
        self.passes.insert(PassEntry {
            desc: pass.desc.clone(),
            raw: pass.inner,
            owner: Some(pass),
        })
    }

    ///Registers a pass description without a native object behind it. Used
    /// for compute-only passes and for validating recordings off-device.
    pub fn import_pass(&mut self, desc: PassDesc, raw: vk::RenderPass) -> PassKey {
        self.passes.insert(PassEntry {
            desc,
            raw,
            owner: None,
        })
    }

    pub(crate) fn add_framebuffer(
        &mut self,
        pass: PassKey,
        attachments: SmallVec<[ImageKey; 4]>,
        framebuffer: Framebuffer,
    ) -> FramebufferKey {
        self.framebuffers.insert(FramebufferEntry {
            pass,
            attachments,
            extent: framebuffer.extent,
            raw: framebuffer.inner,
            owner: Some(framebuffer),
        })
    }

    ///See [import_pass](Self::import_pass).
    pub fn import_framebuffer(
        &mut self,
        pass: PassKey,
        attachments: &[ImageKey],
        extent: vk::Extent2D,
        raw: vk::Framebuffer,
    ) -> FramebufferKey {
        self.framebuffers.insert(FramebufferEntry {
            pass,
            attachments: SmallVec::from_slice(attachments),
            extent,
            raw,
            owner: None,
        })
    }

    pub(crate) fn add_graphics_pipeline(&mut self, pipeline: GraphicsPipeline) -> PipelineKey {
        self.pipelines.insert(PipelineEntry {
            raw: pipeline.pipeline,
            raw_layout: pipeline.layout.layout,
            bind_point: vk::PipelineBindPoint::GRAPHICS,
            owner: Some(AnyPipeline::Graphics(pipeline)),
        })
    }

    pub(crate) fn add_compute_pipeline(&mut self, pipeline: ComputePipeline) -> PipelineKey {
        self.pipelines.insert(PipelineEntry {
            raw: pipeline.pipeline,
            raw_layout: pipeline.layout.layout,
            bind_point: vk::PipelineBindPoint::COMPUTE,
            owner: Some(AnyPipeline::Compute(pipeline)),
        })
    }

    ///See [import_pass](Self::import_pass).
    pub fn import_pipeline(
        &mut self,
        raw: vk::Pipeline,
        raw_layout: vk::PipelineLayout,
        bind_point: vk::PipelineBindPoint,
    ) -> PipelineKey {
        self.pipelines.insert(PipelineEntry {
            raw,
            raw_layout,
            bind_point,
            owner: None,
        })
    }

    pub fn image(&self, key: ImageKey) -> Option<&ImageEntry> {
        self.images.get(key)
    }

    pub fn buffer(&self, key: BufferKey) -> Option<&BufferEntry> {
        self.buffers.get(key)
    }

    pub fn sampler(&self, key: SamplerKey) -> Option<&SamplerEntry> {
        self.samplers.get(key)
    }

    pub fn pass(&self, key: PassKey) -> Option<&PassEntry> {
        self.passes.get(key)
    }

    pub fn framebuffer(&self, key: FramebufferKey) -> Option<&FramebufferEntry> {
        self.framebuffers.get(key)
    }

    pub fn pipeline(&self, key: PipelineKey) -> Option<&PipelineEntry> {
        self.pipelines.get(key)
    }

    //Record-time lookups. A stale or null key during recording is a
    //programming error, not a runtime condition.

    pub(crate) fn image_expect(&self, key: ImageKey) -> &ImageEntry {
        self.images
            .get(key)
            .unwrap_or_else(|| panic!("Image key {:?} is stale or null", key))
    }

    pub(crate) fn buffer_expect(&self, key: BufferKey) -> &BufferEntry {
        self.buffers
            .get(key)
            .unwrap_or_else(|| panic!("Buffer key {:?} is stale or null", key))
    }

    pub(crate) fn pass_expect(&self, key: PassKey) -> &PassEntry {
        self.passes
            .get(key)
            .unwrap_or_else(|| panic!("Pass key {:?} is stale or null", key))
    }

    pub(crate) fn framebuffer_expect(&self, key: FramebufferKey) -> &FramebufferEntry {
        self.framebuffers
            .get(key)
            .unwrap_or_else(|| panic!("Framebuffer key {:?} is stale or null", key))
    }

    pub(crate) fn pipeline_expect(&self, key: PipelineKey) -> &PipelineEntry {
        self.pipelines
            .get(key)
            .unwrap_or_else(|| panic!("Pipeline key {:?} is stale or null", key))
    }

    ///Moves the committed layout of `key`. Called once per image after a
    /// successful submission.
    pub(crate) fn commit_layout(&mut self, key: ImageKey, layout: vk::ImageLayout) {
        if let Some(entry) = self.images.get_mut(key) {
            entry.committed_layout = layout;
        }
    }

    pub fn remove_image(&mut self, key: ImageKey) -> bool {
        self.images.remove(key).is_some()
    }

    pub fn remove_buffer(&mut self, key: BufferKey) -> bool {
        self.buffers.remove(key).is_some()
    }

    pub fn remove_sampler(&mut self, key: SamplerKey) -> bool {
        self.samplers.remove(key).is_some()
    }

    pub fn remove_pass(&mut self, key: PassKey) -> bool {
        self.passes.remove(key).is_some()
    }

    pub fn remove_framebuffer(&mut self, key: FramebufferKey) -> bool {
        self.framebuffers.remove(key).is_some()
    }

    pub fn remove_pipeline(&mut self, key: PipelineKey) -> bool {
        self.pipelines.remove(key).is_some()
    }
}
