use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading or writing SMD files.
///
/// Every parse variant is unrecoverable for the file being read: the format
/// has no marker to resynchronize on.
#[derive(Error, Debug)]
pub enum SmdError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: unsupported version {version}, expected 1")]
    BadVersion { line: usize, version: String },

    #[error("line {line}: malformed node definition: {text}")]
    MalformedNode { line: usize, text: String },

    #[error("line {line}: malformed bone transform: {text}")]
    MalformedTransform { line: usize, text: String },

    #[error("line {line}: bone transform appears before any `time` marker")]
    TransformBeforeTime { line: usize },

    #[error("line {line}: bone index {index} is out of range ({count} nodes)")]
    BoneIndexOutOfRange {
        line: usize,
        index: usize,
        count: usize,
    },

    #[error("line {line}: invalid bone hierarchy: {reason}")]
    InvalidHierarchy { line: usize, reason: String },

    #[error("line {line}: file is not valid UTF-8 text")]
    InvalidEncoding { line: usize },

    #[error("unexpected end of file inside `{block}` block at line {line}")]
    UnexpectedEof { line: usize, block: &'static str },
}

impl SmdError {
    /// True for grammar violations, false for file-system failures.
    pub fn is_format_error(&self) -> bool {
        !matches!(self, SmdError::Io { .. })
    }
}

/// Errors raised by hierarchy edits and retargeting operations when the
/// caller names bones, frames or parents that do not fit the animation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnimationError {
    #[error("bone '{bone}' not found in animation '{animation}'")]
    BoneNotFound { animation: String, bone: String },

    #[error("bone name '{name}' already exists in animation '{animation}'")]
    DuplicateBoneName { animation: String, name: String },

    #[error("invalid bone name '{name}': {reason}")]
    InvalidBoneName { name: String, reason: &'static str },

    #[error("bone '{bone}' cannot be parented to '{parent}': {reason}")]
    InvalidParent {
        bone: String,
        parent: String,
        reason: &'static str,
    },

    #[error("frame {frame} is out of range for animation '{animation}' ({count} frames)")]
    FrameOutOfRange {
        animation: String,
        frame: usize,
        count: usize,
    },

    #[error(
        "animation '{animation}' has {expected} frames but '{other}' only has {actual}"
    )]
    FrameCountMismatch {
        animation: String,
        other: String,
        expected: usize,
        actual: usize,
    },

    #[error("animation '{animation}' has no frames")]
    NoFrames { animation: String },
}
