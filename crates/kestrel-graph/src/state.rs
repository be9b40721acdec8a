//! Image state tracking over the record log.
//!
//! GPU execution is deferred: at record time, nothing the driver knows about
//! an image is current. The layout an image *will* be in at a given point of
//! a recording is therefore derived by folding the commands recorded so far
//! over the image's last committed layout. A pure function over an ordered
//! log of immutable records, no live mutable layout state anywhere.

use kestrel::ash::vk;

use crate::recorder::Command;
use crate::resources::ImageKey;

///Layout `image` will be in once every command in `commands` executed,
/// starting from `committed`, the layout the image is known to have after all
/// previously submitted work.
///
/// Two record kinds move the value: an explicit layout transition targeting
/// the image, and the end of a render pass whose framebuffer attaches the
/// image, which leaves it in the attachment's declared final layout. An
/// image never referenced yields `committed` unchanged. O(n), no side
/// effects.
pub fn projected_layout(
    commands: &[Command],
    image: ImageKey,
    committed: vk::ImageLayout,
) -> vk::ImageLayout {
    commands.iter().fold(committed, |layout, command| match command {
        Command::TransitionImageLayout {
            image: target, to, ..
        } if *target == image => *to,
        Command::EndRenderPass { attachments } => attachments
            .iter()
            .find(|(attached, _)| *attached == image)
            .map(|(_, final_layout)| *final_layout)
            .unwrap_or(layout),
        _ => layout,
    })
}

///True if `indices` is ascending with no gaps. Barrier subresource ranges
/// are contiguous by construction in Vulkan, so mip/layer lists handed to
/// the recorder have to satisfy this.
pub fn is_contiguous(indices: &[u32]) -> bool {
    indices.windows(2).all(|pair| pair[1] == pair[0] + 1)
}

#[cfg(test)]
mod tests {
    use smallvec::smallvec;

    use super::*;
    use crate::recorder::Command;
    use crate::resources::Resources;
    use kestrel::resources::ImgDesc;

    fn transition(image: ImageKey, to: vk::ImageLayout) -> Command {
        Command::TransitionImageLayout {
            image,
            raw: vk::Image::null(),
            from: vk::ImageLayout::UNDEFINED,
            to,
            src_access: vk::AccessFlags2::empty(),
            src_stage: vk::PipelineStageFlags2::empty(),
            dst_access: vk::AccessFlags2::empty(),
            dst_stage: vk::PipelineStageFlags2::empty(),
            range: vk::ImageSubresourceRange::default(),
        }
    }

    fn test_image(res: &mut Resources) -> ImageKey {
        res.import_image(
            ImgDesc::default(),
            vk::Image::null(),
            vk::ImageView::null(),
            vk::ImageLayout::UNDEFINED,
        )
    }

    #[test]
    fn unreferenced_image_keeps_committed_layout() {
        let mut res = Resources::new();
        let img = test_image(&mut res);
        let other = test_image(&mut res);

        let commands = vec![transition(other, vk::ImageLayout::TRANSFER_DST_OPTIMAL)];
        assert_eq!(
            projected_layout(&commands, img, vk::ImageLayout::GENERAL),
            vk::ImageLayout::GENERAL
        );
    }

    #[test]
    fn single_transition_is_adopted() {
        let mut res = Resources::new();
        let img = test_image(&mut res);

        let commands = vec![transition(img, vk::ImageLayout::TRANSFER_DST_OPTIMAL)];
        assert_eq!(
            projected_layout(&commands, img, vk::ImageLayout::UNDEFINED),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL
        );
    }

    #[test]
    fn every_prefix_projects_the_matching_transition() {
        let mut res = Resources::new();
        let img = test_image(&mut res);

        let targets = [
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::GENERAL,
        ];
        let commands = targets
            .iter()
            .map(|target| transition(img, *target))
            .collect::<Vec<_>>();

        for (taken, expected) in targets.iter().enumerate() {
            assert_eq!(
                projected_layout(&commands[..=taken], img, vk::ImageLayout::UNDEFINED),
                *expected
            );
        }
    }

    #[test]
    fn pass_end_overrides_transition_history() {
        let mut res = Resources::new();
        let img = test_image(&mut res);

        let commands = vec![
            transition(img, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            Command::EndRenderPass {
                attachments: smallvec![(img, vk::ImageLayout::PRESENT_SRC_KHR)],
            },
        ];
        assert_eq!(
            projected_layout(&commands, img, vk::ImageLayout::UNDEFINED),
            vk::ImageLayout::PRESENT_SRC_KHR
        );
    }

    #[test]
    fn pass_end_without_the_image_changes_nothing() {
        let mut res = Resources::new();
        let img = test_image(&mut res);
        let other = test_image(&mut res);

        let commands = vec![
            transition(img, vk::ImageLayout::GENERAL),
            Command::EndRenderPass {
                attachments: smallvec![(other, vk::ImageLayout::PRESENT_SRC_KHR)],
            },
        ];
        assert_eq!(
            projected_layout(&commands, img, vk::ImageLayout::UNDEFINED),
            vk::ImageLayout::GENERAL
        );
    }

    #[test]
    fn contiguity() {
        assert!(is_contiguous(&[]));
        assert!(is_contiguous(&[3]));
        assert!(is_contiguous(&[0, 1, 2, 3]));
        assert!(is_contiguous(&[5, 6, 7]));
        assert!(!is_contiguous(&[0, 2]));
        assert!(!is_contiguous(&[1, 0]));
        assert!(!is_contiguous(&[0, 0, 1]));
    }
}
