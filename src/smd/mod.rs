//! SMD (studiomdl data) skeleton + animation codec.
//!
//! ```text
//! version 1
//! nodes
//!   0 "Pelvis" -1
//!   1 "Spine" 0
//! end
//! skeleton
//! time 0
//!   0   tx ty tz rx ry rz
//!   1   tx ty tz rx ry rz
//! end
//! ```
//!
//! Angles are radians applied Z, then Y, then X. Reading and writing only
//! cover the `nodes` and `skeleton` blocks; other blocks are skipped.

mod reader;
mod writer;

pub use crate::error::SmdError;
pub use reader::{load_animation, parse_animation};
pub use writer::{save_animation, save_skeleton_obj, write_animation, write_skeleton_obj};
