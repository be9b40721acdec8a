//! # Kestrel-Graph
//!
//! Command recording and render-graph execution on top of the
//! [kestrel](::kestrel) wrappers.
//!
//! The crate revolves around an ordered log of tagged command records. A
//! [CommandBuffer] opens a [Recording] session that validates every append,
//! mirrors it into a native buffer through the [CommandSink] seam, and keeps
//! the record so image layouts can be *projected* at any point of the
//! recording by replaying history ([state::projected_layout]) instead of
//! mutating live state. On top of that sit the render-pass/framebuffer model
//! ([pass]), the dependency-ordered render graph ([graph]), per-frame
//! bindless descriptor mirroring ([bindless]) and the frame-loop [Runtime].
//!
//! Everything except the [Runtime] and the [VkEncoder] runs without a
//! device, which is also how the test suites drive it.

pub use kestrel;
pub use kestrel::ash;

pub mod bindless;
pub mod encoder;
pub mod error;
pub mod graph;
pub mod pass;
pub mod recorder;
pub mod resources;
pub mod runtime;
pub mod state;

pub use encoder::VkEncoder;
pub use error::{EncodeError, GraphError, PassError, RecordError, RuntimeError};
pub use graph::{Graph, GraphBuilder, PassNode, Work};
pub use pass::{AttachmentDesc, AttachmentRef, PassDesc, SubpassDesc};
pub use recorder::{Command, CommandBuffer, CommandSink, NoopSink, Recording};
pub use resources::{
    BufferKey, FramebufferKey, GraphKey, ImageKey, PassKey, PipelineKey, Resources, SamplerKey,
};
pub use runtime::{PresentTarget, Runtime, RuntimeDesc};
