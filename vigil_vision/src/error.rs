// THEORY:
// Errors fall into exactly two families. A `ConfigError` means the pipeline was
// set up with something it can never process (bad kernel, zone off the frame,
// frames whose shape drifts between calls). Those are fatal to the pipeline
// instance that hit them. Everything else that can go wrong is a property of a
// single frame (it is empty, or its buffer does not match its declared shape)
// and leaves all cross-frame state exactly as it was.

use crate::core_modules::frame::FrameShape;
use crate::core_modules::geometry::Rect;
use thiserror::Error;

/// A setup-time problem. Once a pipeline reports one of these it stays faulted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("smoothing kernel size must be an odd integer >= 1, got {0}")]
    InvalidKernelSize(u32),
    #[error("closing kernel size must be an odd integer between 1 and 511, got {0}")]
    InvalidCloseKernel(u32),
    #[error("static reference mode requires at least one zone")]
    EmptyZoneList,
    #[error("static reference mode requires a reference frame")]
    MissingReference,
    #[error("reference frame has no pixels")]
    EmptyReference,
    #[error("zone `{0}` has zero area")]
    EmptyZone(String),
    #[error("zone `{name}` ({rect}) does not fit inside the {width}x{height} frame")]
    ZoneOutOfBounds {
        name: String,
        rect: Rect,
        width: u32,
        height: u32,
    },
    #[error("invalid filter policy: {0}")]
    InvalidPolicy(String),
    #[error("invalid background model settings: {0}")]
    InvalidModelSettings(String),
    #[error("frame is {actual}, pipeline expects {expected}")]
    DimensionMismatch {
        expected: FrameShape,
        actual: FrameShape,
    },
    #[error("estimator was handed state that belongs to a different strategy")]
    StateMismatch,
    #[error("this pipeline cannot run in the configured detection mode")]
    UnsupportedMode,
    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Anything the pipeline can return from a call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VisionError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("frame has no pixels ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },
    #[error("sample buffer holds {actual} bytes, {expected} expected for its shape")]
    MalformedBuffer { expected: usize, actual: usize },
    #[error("zone worker failed: {0}")]
    WorkerFailed(String),
}

pub type Result<T> = std::result::Result<T, VisionError>;
