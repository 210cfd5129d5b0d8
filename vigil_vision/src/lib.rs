// THEORY:
// This file is the entry point of the `vigil_vision` library crate. It exposes
// the two pipelines (`MotionPipeline` for frame-sequential processing in either
// detection mode, `ZoneParallelPipeline` for concurrent zone analysis in
// static-reference mode) together with the plain data types that go in and
// come out of them: `PipelineConfig`, `Frame` and `MotionReport`.
//
// The individual stages live in `core_modules` and stay public, so a caller
// can run any one of them on its own (e.g. segment a change map it computed
// elsewhere), but the pipelines are the intended way in. The crate performs no
// I/O of its own: frames arrive as buffers and configuration arrives as data.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use config::{DetectionMode, LoggingConfig, PipelineConfig, SegmentationConfig};
pub use core_modules::background_model::{AdaptiveBackgroundModel, BackgroundState, ModelSettings};
pub use core_modules::candidate_filter::{Candidate, FilterPolicy};
pub use core_modules::frame::{ChannelLayout, Frame, FrameShape};
pub use core_modules::geometry::{Point, Polygon, Rect};
pub use core_modules::preprocessor::{PreprocessOptions, Smoothing, SmoothingKind};
pub use core_modules::report::{MotionEvent, MotionReport, MotionStatus, Scope, ZoneReport};
pub use core_modules::zone::Zone;
pub use error::{ConfigError, Result, VisionError};
pub use parallel_pipeline::ZoneParallelPipeline;
pub use pipeline::MotionPipeline;
