use kestrel::ash::vk;
use kestrel::DeviceError;

use thiserror::Error;

use crate::resources::{GraphKey, PassKey};

///Validation errors of the render-pass / framebuffer model. All of these
/// indicate a malformed description handed to `create_pass` or
/// `create_framebuffer`.
#[derive(Error, Debug)]
pub enum PassError {
    #[error(
        "Subpass {subpass} references attachment {reference}, but the pass only declares {attachment_count}"
    )]
    AttachmentOutOfRange {
        subpass: usize,
        reference: u32,
        attachment_count: usize,
    },
    #[error("Subpass {subpass} declares {count} depth-stencil references, at most one is allowed")]
    MultipleDepthStencil { subpass: usize, count: usize },
    #[error("A pass needs at least one subpass")]
    NoSubpass,
    #[error("Framebuffer attaches {got} images, the pass declares {expected} attachments")]
    AttachmentCountMismatch { expected: usize, got: usize },
    #[error("Attachment {index}: image format {got:?} does not match declared format {expected:?}")]
    FormatMismatch {
        index: usize,
        expected: vk::Format,
        got: vk::Format,
    },
    #[error("Attachment {index}: extent {got:?} differs from the other attachments' {expected:?}")]
    ExtentMismatch {
        index: usize,
        expected: vk::Extent2D,
        got: vk::Extent2D,
    },
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
}

///Errors of the graph builder.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Dependency relation contains a cycle through the passes {0:?}")]
    DependencyCycle(Vec<PassKey>),
    #[error("Graph contains no passes")]
    Empty,
}

///Native translation errors. The per-command `vkCmd*` calls can not fail,
/// so these only surface when a native buffer is opened or closed.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
}

///Errors of the recording session itself.
#[derive(Error, Debug)]
pub enum RecordError {
    ///A recording session is already open on this buffer. Close it before
    /// starting the next one.
    #[error("Command buffer is already recording")]
    AlreadyRecording,
    #[error("Encoder error: {0}")]
    Encode(#[from] EncodeError),
}

///Top level error of the runtime surface.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("Resource error: {0}")]
    Resource(#[from] kestrel::ResourceError),
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] kestrel::PipelineError),
    #[error("Descriptor error: {0}")]
    Descriptor(#[from] kestrel::DescriptorError),
    #[error("Command error: {0}")]
    Command(#[from] kestrel::CommandError),
    #[error("Pass error: {0}")]
    Pass(#[from] PassError),
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("Recording error: {0}")]
    Record(#[from] RecordError),
    #[error("Encoder error: {0}")]
    Encode(#[from] EncodeError),
    #[error("Graph {0:?} was destroyed or never created")]
    UnknownGraph(GraphKey),
}

#[cfg(test)]
mod test {
    use static_assertions::assert_impl_all;

    use super::{EncodeError, GraphError, PassError, RecordError, RuntimeError};

    #[test]
    fn assure_send_sync() {
        assert_impl_all!(PassError: Send, Sync);
        assert_impl_all!(GraphError: Send, Sync);
        assert_impl_all!(EncodeError: Send, Sync);
        assert_impl_all!(RecordError: Send, Sync);
        assert_impl_all!(RuntimeError: Send, Sync);
    }
}
