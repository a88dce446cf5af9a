pub mod animation;
pub mod batch;
pub mod error;
pub mod logging;
pub mod smd;
pub mod transform;

pub use animation::{Animation, Frame, FrameEntry, Mode, Node, Space};
pub use error::{AnimationError, SmdError};
