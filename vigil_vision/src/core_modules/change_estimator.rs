// THEORY:
// The `ChangeEstimator` is the temporal heart of the pipeline. It answers "how
// different is each pixel from what we expect to see?" and leaves the decision of
// what counts as "different enough" to the segmenter.
//
// There are exactly two strategies, and they form a closed set chosen when the
// pipeline is configured:
// 1.  **StaticReference**: compare each zone of the live frame against the same
//     zone of one fixed reference frame. Stateless; one `ChangeMap` per zone.
// 2.  **Adaptive**: compare the whole frame against a learned per-pixel background
//     model and then fold the frame into that model. The model's memory lives in
//     an explicit `BackgroundState` owned by the caller, never inside the
//     estimator, so warm-up, reset and running several independent pipelines are
//     all just a matter of which state object is passed in.

use crate::core_modules::background_model::{AdaptiveBackgroundModel, BackgroundState};
use crate::core_modules::frame::Frame;
use crate::core_modules::static_reference::{StaticReferenceDiff, ZoneChange};
use crate::error::ConfigError;
use image::{GrayImage, Luma};

/// Per-pixel change intensity. Zero means "looks exactly like the background".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeMap(GrayImage);

impl ChangeMap {
    pub fn new(image: GrayImage) -> Self {
        Self(image)
    }

    pub fn zeros(width: u32, height: u32) -> Self {
        Self(GrayImage::new(width, height))
    }

    /// Wraps a row-major buffer of `width * height` intensities.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        GrayImage::from_raw(width, height, data).map(Self)
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> u8) -> Self {
        Self(GrayImage::from_fn(width, height, |x, y| Luma([f(x, y)])))
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.0.get_pixel(x, y).0[0]
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.0
    }

    pub fn into_image(self) -> GrayImage {
        self.0
    }

    /// True when no pixel changed at all.
    pub fn is_zero(&self) -> bool {
        self.0.as_raw().iter().all(|&v| v == 0)
    }

    pub fn max(&self) -> u8 {
        self.0.as_raw().iter().copied().max().unwrap_or(0)
    }
}

/// What one call to `estimate` produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEstimate {
    /// One independent map per configured zone, in zone order.
    Zoned(Vec<ZoneChange>),
    /// One map covering the whole frame.
    Global(ChangeMap),
}

/// Cross-frame state owned by whoever drives the estimator.
#[derive(Debug, Clone, PartialEq)]
pub enum EstimatorState {
    Stateless,
    Background(BackgroundState),
}

impl EstimatorState {
    pub fn background(&self) -> Option<&BackgroundState> {
        match self {
            EstimatorState::Background(state) => Some(state),
            EstimatorState::Stateless => None,
        }
    }
}

/// The closed set of change estimation strategies.
#[derive(Debug, Clone)]
pub enum ChangeEstimator {
    StaticReference(StaticReferenceDiff),
    Adaptive(AdaptiveBackgroundModel),
}

impl ChangeEstimator {
    /// A fresh state suitable for this estimator.
    pub fn initial_state(&self) -> EstimatorState {
        match self {
            ChangeEstimator::StaticReference(_) => EstimatorState::Stateless,
            ChangeEstimator::Adaptive(_) => EstimatorState::Background(BackgroundState::new()),
        }
    }

    /// Estimates the change in `frame`. For the adaptive strategy this also folds
    /// the frame into `state`, exactly once.
    ///
    /// `state` must come from this estimator's `initial_state`; state of the
    /// other strategy is a `StateMismatch`.
    pub fn estimate(&self, frame: &Frame, state: &mut EstimatorState) -> Result<ChangeEstimate, ConfigError> {
        match (self, state) {
            (ChangeEstimator::StaticReference(diff), EstimatorState::Stateless) => {
                Ok(ChangeEstimate::Zoned(diff.estimate(frame)?))
            }
            (ChangeEstimator::Adaptive(model), EstimatorState::Background(background)) => {
                Ok(ChangeEstimate::Global(model.estimate(frame, background)?))
            }
            _ => Err(ConfigError::StateMismatch),
        }
    }
}
