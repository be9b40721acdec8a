use kestrel::ash::vk;
use tinyvec::TinyVec;

///Barrier building helper. Lets you collect synchronization2 barriers for
/// images and buffers via a simple builder API and turn them into a single
/// `vk::DependencyInfo`.
///
/// Uses tinyvec internally, so the common one-or-two-barrier case stays off
/// the heap.
#[derive(Debug, Default)]
pub struct BarrierBuilder {
    pub images: TinyVec<[vk::ImageMemoryBarrier2<'static>; Self::STACK_ALLOCATION]>,
    pub buffers: TinyVec<[vk::BufferMemoryBarrier2<'static>; Self::STACK_ALLOCATION]>,
}

impl BarrierBuilder {
    ///Amount of barriers per type that can be stack allocated.
    pub const STACK_ALLOCATION: usize = 6;

    pub fn new() -> Self {
        BarrierBuilder::default()
    }

    ///Adds a full buffer barrier.
    ///
    /// # Safety
    ///
    /// The `buffer` handle must stay alive until the barrier has executed on
    /// the GPU. The builder is dropped when the command buffer is built, so
    /// it can not extend the lifetime itself.
    pub fn buffer_barrier(
        &mut self,
        buffer: vk::Buffer,
        offset: u64,
        size: u64,
        src_access_mask: vk::AccessFlags2,
        src_stage_mask: vk::PipelineStageFlags2,
        dst_access_mask: vk::AccessFlags2,
        dst_stage_mask: vk::PipelineStageFlags2,
    ) -> &mut Self {
        let item = vk::BufferMemoryBarrier2::default()
            .buffer(buffer)
            .offset(offset)
            .size(size)
            .src_access_mask(src_access_mask)
            .src_stage_mask(src_stage_mask)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_access_mask(dst_access_mask)
            .dst_stage_mask(dst_stage_mask)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED);
        self.buffers.push(item);

        self
    }

    pub fn buffer_custom_barrier(&mut self, barrier: vk::BufferMemoryBarrier2<'static>) -> &mut Self {
        self.buffers.push(barrier);
        self
    }

    ///Adds a full image barrier including a layout transition.
    ///
    /// # Safety see [Self::buffer_barrier].
    pub fn image_barrier(
        &mut self,
        image: vk::Image,
        subresource_range: vk::ImageSubresourceRange,
        src_access_mask: vk::AccessFlags2,
        src_stage_mask: vk::PipelineStageFlags2,
        src_layout: vk::ImageLayout,
        dst_access_mask: vk::AccessFlags2,
        dst_stage_mask: vk::PipelineStageFlags2,
        dst_layout: vk::ImageLayout,
    ) -> &mut Self {
        let item = vk::ImageMemoryBarrier2::default()
            .image(image)
            .subresource_range(subresource_range)
            .src_access_mask(src_access_mask)
            .src_stage_mask(src_stage_mask)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .old_layout(src_layout)
            .dst_access_mask(dst_access_mask)
            .dst_stage_mask(dst_stage_mask)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .new_layout(dst_layout);

        #[cfg(feature = "logging")]
        log::trace!("full_transition[{:?}] {:#?}", image, item);

        self.images.push(item);

        self
    }

    ///Pushes only a layout transition for the given region.
    ///
    /// # Safety see [Self::image_barrier].
    pub fn image_layout_transition(
        &mut self,
        image: vk::Image,
        subresource_range: vk::ImageSubresourceRange,
        src_layout: vk::ImageLayout,
        dst_layout: vk::ImageLayout,
    ) -> &mut Self {
        #[cfg(feature = "logging")]
        log::trace!("layout[{:?}] {:#?} -> {:#?}", image, src_layout, dst_layout);

        let item = vk::ImageMemoryBarrier2::default()
            .image(image)
            .subresource_range(subresource_range)
            .old_layout(src_layout)
            .new_layout(dst_layout);
        self.images.push(item);

        self
    }

    pub fn image_custom_barrier(&mut self, barrier: vk::ImageMemoryBarrier2<'static>) -> &mut Self {
        self.images.push(barrier);
        self
    }

    ///Returns the dependency info containing the currently pushed barriers.
    pub fn as_dependency_info(&self) -> vk::DependencyInfo<'_> {
        vk::DependencyInfo::default()
            .image_memory_barriers(self.images.as_slice())
            .buffer_memory_barriers(self.buffers.as_slice())
    }

    ///Returns true if at least one barrier has been added.
    pub fn has_barrier(&self) -> bool {
        !self.images.is_empty() || !self.buffers.is_empty()
    }
}
