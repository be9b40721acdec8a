//! # Kestrel
//!
//! Transparent, lifetime-tracking wrappers around the Vulkan objects the
//! command/render-graph core consumes. The wrappers keep their [Device]
//! alive through an `Arc` and destroy the wrapped handle on drop.
//!
//! Structures that are not sensitive to lifetime requirements (create-info
//! and the like) are not wrapped, the raw `ash` types are used directly.
//!
//! Instance creation and physical-device selection happen outside of this
//! crate. A [Device](context::Device) is built from handles the caller
//! already owns via [Device::from_handles](context::Device::from_handles).

pub use ash;

///[Device](context::Device) and [Queue](context::Queue) wrappers.
pub mod context;

///Allocatable and bindable resources. Mostly [Image](resources::Image) and
/// [Buffer](resources::Buffer).
pub mod resources;

///Vulkan synchronisation primitives.
pub mod sync;

mod error;
pub use error::{
    CommandError, DescriptorError, DeviceError, KestrelError, PipelineError, ResourceError,
    ShaderError,
};
