//! Render-pass and framebuffer model. A [PassDesc] is a plain description of
//! attachments and subpasses; [PassDesc::link] validates it and flattens the
//! per-subpass references, synthesizing the single external dependency that
//! makes prior attachment writes visible before the first subpass.

use std::sync::Arc;

use kestrel::ash::vk;
use kestrel::context::Device;
use kestrel::resources::{has_stencil, is_depth_format, ImgDesc};

use crate::error::PassError;

///One attachment of a render pass. Load/store operations for colour and
/// stencil are declared separately, as are the layout the image is expected
/// in when the pass begins and the layout it is left in when it ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentDesc {
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub stencil_load_op: vk::AttachmentLoadOp,
    pub stencil_store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

impl AttachmentDesc {
    ///Cleared-and-stored colour attachment ending up attachment-readable.
    pub fn color(format: vk::Format) -> Self {
        AttachmentDesc {
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }
    }

    ///Colour attachment that is handed to presentation when the pass ends.
    pub fn color_present(format: vk::Format) -> Self {
        AttachmentDesc {
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Self::color(format)
        }
    }

    pub fn depth(format: vk::Format) -> Self {
        AttachmentDesc {
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        }
    }

    pub fn is_depth(&self) -> bool {
        is_depth_format(self.format)
    }

    pub fn aspect_mask(&self) -> vk::ImageAspectFlags {
        if self.is_depth() {
            if has_stencil(self.format) {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            } else {
                vk::ImageAspectFlags::DEPTH
            }
        } else {
            vk::ImageAspectFlags::COLOR
        }
    }
}

///Reference to an attachment by index, together with the layout the
/// attachment has to be in while the subpass runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentRef {
    pub index: u32,
    pub layout: vk::ImageLayout,
}

impl AttachmentRef {
    pub fn color(index: u32) -> Self {
        AttachmentRef {
            index,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }
    }

    pub fn depth(index: u32) -> Self {
        AttachmentRef {
            index,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        }
    }

    pub fn input(index: u32) -> Self {
        AttachmentRef {
            index,
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SubpassDesc {
    pub inputs: Vec<AttachmentRef>,
    pub colors: Vec<AttachmentRef>,
    ///At most one entry. A list instead of an option so that an over-declared
    /// description is caught by [PassDesc::link] instead of silently dropped.
    pub depth_stencil: Vec<AttachmentRef>,
}

impl SubpassDesc {
    pub fn new() -> Self {
        SubpassDesc::default()
    }

    pub fn with_color(mut self, reference: AttachmentRef) -> Self {
        self.colors.push(reference);
        self
    }

    pub fn with_input(mut self, reference: AttachmentRef) -> Self {
        self.inputs.push(reference);
        self
    }

    pub fn with_depth_stencil(mut self, reference: AttachmentRef) -> Self {
        self.depth_stencil.push(reference);
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct PassDesc {
    pub attachments: Vec<AttachmentDesc>,
    pub subpasses: Vec<SubpassDesc>,
}

///Flattened, validated form of a [PassDesc].
pub struct PassLinks {
    pub subpasses: Vec<SubpassLinks>,
    ///The one external dependency covering attachment writes of prior work.
    pub dependency: vk::SubpassDependency,
}

pub struct SubpassLinks {
    ///(attachment index, layout, aspect mask) per input reference.
    pub inputs: Vec<(u32, vk::ImageLayout, vk::ImageAspectFlags)>,
    pub colors: Vec<(u32, vk::ImageLayout)>,
    pub depth_stencil: Option<(u32, vk::ImageLayout)>,
}

impl PassDesc {
    pub fn new() -> Self {
        PassDesc::default()
    }

    pub fn add_attachment(mut self, attachment: AttachmentDesc) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn add_subpass(mut self, subpass: SubpassDesc) -> Self {
        self.subpasses.push(subpass);
        self
    }

    pub fn has_depth_attachment(&self) -> bool {
        self.attachments.iter().any(|a| a.is_depth())
    }

    ///Validates the description and produces the flattened reference lists
    /// plus the synthesized external dependency.
    pub fn link(&self) -> Result<PassLinks, PassError> {
        if self.subpasses.is_empty() {
            return Err(PassError::NoSubpass);
        }

        let mut subpasses = Vec::with_capacity(self.subpasses.len());
        for (subpass_idx, subpass) in self.subpasses.iter().enumerate() {
            if subpass.depth_stencil.len() > 1 {
                return Err(PassError::MultipleDepthStencil {
                    subpass: subpass_idx,
                    count: subpass.depth_stencil.len(),
                });
            }

            let check = |reference: &AttachmentRef| -> Result<(), PassError> {
                if reference.index as usize >= self.attachments.len() {
                    Err(PassError::AttachmentOutOfRange {
                        subpass: subpass_idx,
                        reference: reference.index,
                        attachment_count: self.attachments.len(),
                    })
                } else {
                    Ok(())
                }
            };

            for reference in subpass
                .inputs
                .iter()
                .chain(subpass.colors.iter())
                .chain(subpass.depth_stencil.iter())
            {
                check(reference)?;
            }

            subpasses.push(SubpassLinks {
                inputs: subpass
                    .inputs
                    .iter()
                    .map(|r| {
                        (
                            r.index,
                            r.layout,
                            self.attachments[r.index as usize].aspect_mask(),
                        )
                    })
                    .collect(),
                colors: subpass.colors.iter().map(|r| (r.index, r.layout)).collect(),
                depth_stencil: subpass
                    .depth_stencil
                    .first()
                    .map(|r| (r.index, r.layout)),
            });
        }

        let mut stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let mut access = vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
        if self.has_depth_attachment() {
            stages |= vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
            access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
        }

        let dependency = vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: stages,
            dst_stage_mask: stages,
            src_access_mask: access,
            dst_access_mask: access,
            dependency_flags: vk::DependencyFlags::empty(),
        };

        Ok(PassLinks {
            subpasses,
            dependency,
        })
    }
}

///Wrapped native render pass. Must not be destroyed while any command buffer
/// referencing it is unsubmitted or in flight; that discipline stays with
/// the caller.
pub struct RenderPass {
    pub device: Arc<Device>,
    pub inner: vk::RenderPass,
    pub desc: PassDesc,
}

impl RenderPass {
    pub fn new(device: &Arc<Device>, desc: PassDesc) -> Result<Self, PassError> {
        let links = desc.link()?;

        let attachments = desc
            .attachments
            .iter()
            .map(|a| vk::AttachmentDescription {
                flags: vk::AttachmentDescriptionFlags::empty(),
                format: a.format,
                samples: a.samples,
                load_op: a.load_op,
                store_op: a.store_op,
                stencil_load_op: a.stencil_load_op,
                stencil_store_op: a.stencil_store_op,
                initial_layout: a.initial_layout,
                final_layout: a.final_layout,
            })
            .collect::<Vec<_>>();

        //Reference arrays need stable storage while the create-info borrows
        // them, so collect per subpass first.
        struct SubpassRefs {
            inputs: Vec<vk::AttachmentReference>,
            colors: Vec<vk::AttachmentReference>,
            depth: Option<vk::AttachmentReference>,
        }

        let refs = links
            .subpasses
            .iter()
            .map(|sp| SubpassRefs {
                inputs: sp
                    .inputs
                    .iter()
                    .map(|(index, layout, _aspect)| vk::AttachmentReference {
                        attachment: *index,
                        layout: *layout,
                    })
                    .collect(),
                colors: sp
                    .colors
                    .iter()
                    .map(|(index, layout)| vk::AttachmentReference {
                        attachment: *index,
                        layout: *layout,
                    })
                    .collect(),
                depth: sp.depth_stencil.map(|(index, layout)| {
                    vk::AttachmentReference {
                        attachment: index,
                        layout,
                    }
                }),
            })
            .collect::<Vec<_>>();

        let subpasses = refs
            .iter()
            .map(|r| {
                let mut subpass = vk::SubpassDescription::default()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .input_attachments(&r.inputs)
                    .color_attachments(&r.colors);
                if let Some(depth) = &r.depth {
                    subpass = subpass.depth_stencil_attachment(depth);
                }
                subpass
            })
            .collect::<Vec<_>>();

        //Input references carry an aspect mask, classic render passes take
        // those through a create-info extension.
        let aspect_refs = links
            .subpasses
            .iter()
            .enumerate()
            .flat_map(|(subpass_idx, sp)| {
                sp.inputs
                    .iter()
                    .enumerate()
                    .map(move |(input_idx, (_index, _layout, aspect))| {
                        vk::InputAttachmentAspectReference {
                            subpass: subpass_idx as u32,
                            input_attachment_index: input_idx as u32,
                            aspect_mask: *aspect,
                        }
                    })
            })
            .collect::<Vec<_>>();

        let mut aspect_info =
            vk::RenderPassInputAttachmentAspectCreateInfo::default().aspect_references(&aspect_refs);

        let mut create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(core::slice::from_ref(&links.dependency));
        if !aspect_refs.is_empty() {
            create_info = create_info.push_next(&mut aspect_info);
        }

        let pass = unsafe {
            device
                .inner
                .create_render_pass(&create_info, None)
                .map_err(kestrel::DeviceError::from)?
        };

        Ok(RenderPass {
            device: device.clone(),
            inner: pass,
            desc,
        })
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_render_pass(self.inner, None) }
    }
}

///Validates that `images` matches `pass` attachment-for-attachment and that
/// all of them agree on one extent, which is returned.
pub fn framebuffer_extent(
    pass: &PassDesc,
    images: &[&ImgDesc],
) -> Result<vk::Extent2D, PassError> {
    if images.len() != pass.attachments.len() {
        return Err(PassError::AttachmentCountMismatch {
            expected: pass.attachments.len(),
            got: images.len(),
        });
    }

    let mut extent = None;
    for (index, (attachment, image)) in pass.attachments.iter().zip(images.iter()).enumerate() {
        if attachment.format != image.format {
            return Err(PassError::FormatMismatch {
                index,
                expected: attachment.format,
                got: image.format,
            });
        }

        match extent {
            None => extent = Some(image.extent),
            Some(expected) if expected != image.extent => {
                return Err(PassError::ExtentMismatch {
                    index,
                    expected,
                    got: image.extent,
                })
            }
            Some(_) => {}
        }
    }

    //images is non-empty here unless the pass has no attachments at all
    Ok(extent.unwrap_or_default())
}

///Native framebuffer binding a pass to concrete image views.
pub struct Framebuffer {
    pub device: Arc<Device>,
    pub inner: vk::Framebuffer,
    pub extent: vk::Extent2D,
}

impl Framebuffer {
    pub fn new(
        device: &Arc<Device>,
        render_pass: vk::RenderPass,
        views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<Self, PassError> {
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe {
            device
                .inner
                .create_framebuffer(&create_info, None)
                .map_err(kestrel::DeviceError::from)?
        };

        Ok(Framebuffer {
            device: device.clone(),
            inner: framebuffer,
            extent,
        })
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_framebuffer(self.inner, None) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_pass() -> PassDesc {
        PassDesc::new()
            .add_attachment(AttachmentDesc::color(vk::Format::R8G8B8A8_UNORM))
            .add_subpass(SubpassDesc::new().with_color(AttachmentRef::color(0)))
    }

    #[test]
    fn links_valid_pass() {
        let links = simple_pass().link().unwrap();
        assert_eq!(links.subpasses.len(), 1);
        assert_eq!(
            links.subpasses[0].colors,
            vec![(0, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)]
        );
        assert!(links.subpasses[0].depth_stencil.is_none());
    }

    #[test]
    fn rejects_out_of_range_reference() {
        let desc = PassDesc::new()
            .add_attachment(AttachmentDesc::color(vk::Format::R8G8B8A8_UNORM))
            .add_subpass(SubpassDesc::new().with_color(AttachmentRef::color(1)));

        assert!(matches!(
            desc.link(),
            Err(PassError::AttachmentOutOfRange {
                subpass: 0,
                reference: 1,
                attachment_count: 1,
            })
        ));
    }

    #[test]
    fn rejects_double_depth_stencil() {
        let desc = PassDesc::new()
            .add_attachment(AttachmentDesc::color(vk::Format::R8G8B8A8_UNORM))
            .add_attachment(AttachmentDesc::depth(vk::Format::D32_SFLOAT))
            .add_attachment(AttachmentDesc::depth(vk::Format::D16_UNORM))
            .add_subpass(
                SubpassDesc::new()
                    .with_color(AttachmentRef::color(0))
                    .with_depth_stencil(AttachmentRef::depth(1))
                    .with_depth_stencil(AttachmentRef::depth(2)),
            );

        assert!(matches!(
            desc.link(),
            Err(PassError::MultipleDepthStencil {
                subpass: 0,
                count: 2
            })
        ));
    }

    #[test]
    fn rejects_empty_pass() {
        assert!(matches!(PassDesc::new().link(), Err(PassError::NoSubpass)));
    }

    #[test]
    fn dependency_covers_color_only_pass() {
        let links = simple_pass().link().unwrap();
        assert_eq!(links.dependency.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(links.dependency.dst_subpass, 0);
        assert_eq!(
            links.dependency.src_access_mask,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        );
        assert!(!links
            .dependency
            .src_stage_mask
            .contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
    }

    #[test]
    fn dependency_widens_for_depth() {
        let links = PassDesc::new()
            .add_attachment(AttachmentDesc::color(vk::Format::R8G8B8A8_UNORM))
            .add_attachment(AttachmentDesc::depth(vk::Format::D32_SFLOAT))
            .add_subpass(
                SubpassDesc::new()
                    .with_color(AttachmentRef::color(0))
                    .with_depth_stencil(AttachmentRef::depth(1)),
            )
            .link()
            .unwrap();

        assert!(links
            .dependency
            .src_access_mask
            .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
        assert!(links
            .dependency
            .src_stage_mask
            .contains(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS));
    }

    #[test]
    fn input_reference_gains_aspect() {
        let links = PassDesc::new()
            .add_attachment(AttachmentDesc::depth(vk::Format::D32_SFLOAT))
            .add_attachment(AttachmentDesc::color(vk::Format::R8G8B8A8_UNORM))
            .add_subpass(
                SubpassDesc::new()
                    .with_input(AttachmentRef::input(0))
                    .with_color(AttachmentRef::color(1)),
            )
            .link()
            .unwrap();

        assert_eq!(
            links.subpasses[0].inputs,
            vec![(
                0,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::ImageAspectFlags::DEPTH
            )]
        );
    }

    #[test]
    fn framebuffer_extent_checks_shape() {
        let pass = simple_pass();
        let good = ImgDesc::color_attachment(32, 32, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(
            framebuffer_extent(&pass, &[&good]).unwrap(),
            vk::Extent2D {
                width: 32,
                height: 32
            }
        );

        let wrong_format = ImgDesc::color_attachment(32, 32, vk::Format::B8G8R8A8_UNORM);
        assert!(matches!(
            framebuffer_extent(&pass, &[&wrong_format]),
            Err(PassError::FormatMismatch { index: 0, .. })
        ));

        assert!(matches!(
            framebuffer_extent(&pass, &[]),
            Err(PassError::AttachmentCountMismatch {
                expected: 1,
                got: 0
            })
        ));

        let two = PassDesc::new()
            .add_attachment(AttachmentDesc::color(vk::Format::R8G8B8A8_UNORM))
            .add_attachment(AttachmentDesc::color(vk::Format::R8G8B8A8_UNORM))
            .add_subpass(
                SubpassDesc::new()
                    .with_color(AttachmentRef::color(0))
                    .with_color(AttachmentRef::color(1)),
            );
        let smaller = ImgDesc::color_attachment(16, 32, vk::Format::R8G8B8A8_UNORM);
        assert!(matches!(
            framebuffer_extent(&two, &[&good, &smaller]),
            Err(PassError::ExtentMismatch { index: 1, .. })
        ));
    }
}
