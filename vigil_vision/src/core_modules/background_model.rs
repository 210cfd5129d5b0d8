// THEORY:
// The `AdaptiveBackgroundModel` is the stateful, learning half of the change
// estimator. Every pixel location keeps a small mixture of Gaussians describing
// the gray levels it has recently shown. Components that carry most of the
// weight, and are tight, describe the background; a new sample far from all of
// them (in standard deviations) is foreground.
//
// Key architectural principles:
// 1.  **Explicit memory**: all learned numbers live in `BackgroundState`, which
//     the caller owns and passes in. The model itself is just settings, so it
//     can be shared, while each frame sequence gets its own state.
// 2.  **Exponential forgetting**: each observation is folded in with learning
//     rate `1 / min(n, history)`. Early on the rate is high so the model warms
//     up in a handful of frames; afterwards it settles at `1 / history`. Because
//     the update is recency-weighted, observation order matters.
// 3.  **Score first, learn second**: `estimate` scores the frame against the
//     model as it stood *before* the frame, then advances the model by exactly
//     one observation.
// 4.  **Significance, not raw difference**: like a z-score, the output measures
//     distance in standard deviations, so noisy locations need a larger jump
//     before they light up than quiet ones do.

use crate::core_modules::change_estimator::ChangeMap;
use crate::core_modules::frame::{ChannelLayout, Frame, FrameShape};
use crate::core_modules::preprocessor::to_gray;
use crate::error::ConfigError;
use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

/// Foreground likelihood assigned to a sample exactly `match_threshold` sigmas away.
const THRESHOLD_LIKELIHOOD: f32 = 128.0;

/// Tunables for the background mixture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Number of observations the model effectively remembers.
    pub history: u32,
    /// Gaussians kept per pixel.
    pub max_components: usize,
    /// Variance given to a freshly created component.
    pub initial_variance: f32,
    pub min_variance: f32,
    pub max_variance: f32,
    /// A sample matches a component within this many standard deviations.
    pub match_threshold: f32,
    /// Cumulative weight of the components treated as background.
    pub background_ratio: f32,
    /// Observations before the model's output is considered reliable.
    pub warmup_frames: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            history: 500,
            max_components: 3,
            initial_variance: 15.0,
            min_variance: 4.0,
            max_variance: 75.0,
            match_threshold: 2.5,
            background_ratio: 0.9,
            warmup_frames: 30,
        }
    }
}

impl ModelSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| Err(ConfigError::InvalidModelSettings(reason.to_string()));
        if self.history == 0 {
            return invalid("history must be at least 1");
        }
        if self.max_components == 0 || self.max_components > u8::MAX as usize {
            return invalid("max_components must be between 1 and 255");
        }
        if !(self.min_variance > 0.0 && self.min_variance <= self.max_variance) {
            return invalid("variance bounds must satisfy 0 < min_variance <= max_variance");
        }
        if !(self.initial_variance >= self.min_variance && self.initial_variance <= self.max_variance) {
            return invalid("initial_variance must lie within the variance bounds");
        }
        if !(self.match_threshold > 0.0 && self.match_threshold.is_finite()) {
            return invalid("match_threshold must be a positive number");
        }
        if !(self.background_ratio > 0.0 && self.background_ratio <= 1.0) {
            return invalid("background_ratio must lie in (0, 1]");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Component {
    weight: f32,
    mean: f32,
    variance: f32,
}

impl Component {
    /// Ordering key: heavy, tight components first.
    fn fitness(&self) -> f32 {
        self.weight / self.variance.sqrt()
    }
}

/// The learned per-pixel mixtures. Empty until the first observation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackgroundState {
    width: u32,
    height: u32,
    slots: usize,
    /// `width * height * slots` components, each pixel's sorted by fitness.
    components: Vec<Component>,
    /// Live component count per pixel.
    active: Vec<u8>,
    /// Frames folded in so far; doubles as the state's version number.
    observations: u64,
}

impl BackgroundState {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many frames have been folded into the model.
    pub fn observations(&self) -> u64 {
        self.observations
    }

    pub fn is_initialized(&self) -> bool {
        self.observations > 0
    }

    /// True once at least `warmup_frames` observations have been made.
    pub fn is_warm(&self, settings: &ModelSettings) -> bool {
        self.observations >= settings.warmup_frames as u64
    }

    /// Forgets everything.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// The mean of each pixel's strongest component, i.e. the model's idea of
    /// the empty scene.
    pub fn background_estimate(&self) -> Option<GrayImage> {
        if !self.is_initialized() {
            return None;
        }
        Some(GrayImage::from_fn(self.width, self.height, |x, y| {
            let pixel = y as usize * self.width as usize + x as usize;
            let mean = self.components[pixel * self.slots].mean;
            Luma([mean.round().clamp(0.0, 255.0) as u8])
        }))
    }

    fn initialize(&mut self, gray: &Frame, settings: &ModelSettings) {
        let slots = settings.max_components;
        let pixels = gray.width() as usize * gray.height() as usize;
        let mut components = vec![Component::default(); pixels * slots];
        for (pixel, &sample) in gray.as_bytes().iter().enumerate() {
            components[pixel * slots] = Component {
                weight: 1.0,
                mean: sample as f32,
                variance: settings.initial_variance,
            };
        }
        *self = Self {
            width: gray.width(),
            height: gray.height(),
            slots,
            components,
            active: vec![1; pixels],
            observations: 1,
        };
    }

    /// The gray shape the state was learned on, once it has learned anything.
    pub fn shape(&self) -> Option<FrameShape> {
        self.is_initialized().then_some(FrameShape {
            width: self.width,
            height: self.height,
            layout: ChannelLayout::Gray,
        })
    }

    /// Whether `gray` can be folded into this state as it stands.
    fn check(&self, gray: &Frame, settings: &ModelSettings) -> Result<(), ConfigError> {
        match self.shape() {
            Some(expected) if expected != gray.shape() => {
                return Err(ConfigError::DimensionMismatch {
                    expected,
                    actual: gray.shape(),
                });
            }
            _ => {}
        }
        if self.is_initialized() && self.slots != settings.max_components {
            return Err(ConfigError::InvalidModelSettings(format!(
                "state holds {} components per pixel, model uses {}",
                self.slots, settings.max_components
            )));
        }
        Ok(())
    }
}

/// Gaussian-mixture background subtraction over gray intensity.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveBackgroundModel {
    settings: ModelSettings,
}

impl AdaptiveBackgroundModel {
    pub fn new(settings: ModelSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    /// Scores `frame` against `state`, then folds it into `state`.
    ///
    /// The first observation of an empty state has nothing to compare against
    /// and yields an all-zero map. RGB frames are reduced to luma first. A
    /// frame whose size differs from what `state` learned on is rejected with
    /// `DimensionMismatch` and leaves `state` untouched.
    pub fn estimate(&self, frame: &Frame, state: &mut BackgroundState) -> Result<ChangeMap, ConfigError> {
        let gray = match frame.layout() {
            ChannelLayout::Gray => frame.clone(),
            ChannelLayout::Rgb => to_gray(frame),
        };

        state.check(&gray, &self.settings)?;
        if !state.is_initialized() {
            state.initialize(&gray, &self.settings);
            return Ok(ChangeMap::zeros(gray.width(), gray.height()));
        }

        state.observations += 1;
        let horizon = state.observations.min(self.settings.history as u64);
        let alpha = 1.0 / horizon as f32;
        let slots = state.slots;

        let likelihood: Vec<u8> = gray
            .as_bytes()
            .iter()
            .enumerate()
            .map(|(pixel, &sample)| {
                let active = state.active[pixel] as usize;
                let mixture = &mut state.components[pixel * slots..(pixel + 1) * slots];
                let score = self.foreground_likelihood(sample as f32, &mixture[..active]);
                state.active[pixel] = self.observe(sample as f32, mixture, active, alpha) as u8;
                score
            })
            .collect();

        Ok(ChangeMap::from_raw(gray.width(), gray.height(), likelihood)
            .unwrap_or_else(|| ChangeMap::zeros(gray.width(), gray.height())))
    }

    /// Distance to the nearest background component, scaled so that the match
    /// threshold lands on `THRESHOLD_LIKELIHOOD`. Matching samples score zero.
    fn foreground_likelihood(&self, sample: f32, mixture: &[Component]) -> u8 {
        let mut cumulative = 0.0;
        let mut nearest = f32::INFINITY;
        for component in mixture {
            let d = sample - component.mean;
            nearest = nearest.min(d * d / component.variance);
            cumulative += component.weight;
            if cumulative >= self.settings.background_ratio {
                break;
            }
        }

        let threshold = self.settings.match_threshold;
        if nearest <= threshold * threshold {
            return 0;
        }
        (nearest.sqrt() / threshold * THRESHOLD_LIKELIHOOD)
            .round()
            .clamp(THRESHOLD_LIKELIHOOD, 255.0) as u8
    }

    /// Folds one sample into a pixel's mixture. Returns the new active count.
    fn observe(&self, sample: f32, mixture: &mut [Component], active: usize, alpha: f32) -> usize {
        let settings = &self.settings;
        let threshold_sq = settings.match_threshold * settings.match_threshold;

        let matched = mixture[..active].iter().position(|c| {
            let d = sample - c.mean;
            d * d <= threshold_sq * c.variance
        });

        for (index, component) in mixture[..active].iter_mut().enumerate() {
            if Some(index) == matched {
                component.weight += alpha * (1.0 - component.weight);
                let rho = alpha / component.weight;
                let d = sample - component.mean;
                component.mean += rho * d;
                component.variance = (component.variance + rho * (d * d - component.variance))
                    .clamp(settings.min_variance, settings.max_variance);
            } else {
                component.weight *= 1.0 - alpha;
            }
        }

        let mut active = active;
        if matched.is_none() {
            let fresh = Component {
                weight: alpha,
                mean: sample,
                variance: settings.initial_variance,
            };
            // Components are sorted, so the last live one is the weakest.
            if active < mixture.len() {
                mixture[active] = fresh;
                active += 1;
            } else {
                mixture[active - 1] = fresh;
            }
        }

        let total: f32 = mixture[..active].iter().map(|c| c.weight).sum();
        if total > 0.0 {
            mixture[..active].iter_mut().for_each(|c| c.weight /= total);
        }
        mixture[..active].sort_by(|a, b| b.fitness().total_cmp(&a.fitness()));
        active
    }
}
