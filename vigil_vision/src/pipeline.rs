// THEORY:
// The `pipeline` module is the top-level API of the engine. A `MotionPipeline`
// owns one configured change estimator plus whatever cross-frame state it needs,
// and turns each incoming frame into a `MotionReport`:
//
//   exclusion -> reduce -> estimate -> segment -> close -> extract -> filter -> report
//
// Key architectural principles:
// 1.  **Frame-sequential**: frames are processed one at a time in arrival order,
//     and the adaptive background is advanced exactly once per accepted frame.
// 2.  **Locked shape**: the first frame (or the reference) fixes the dimensions
//     and channel layout. A frame of any other shape is a configuration error.
// 3.  **Fail closed**: a configuration error discovered while processing faults
//     the pipeline for good; every later call returns the same error. An empty
//     frame, by contrast, is just a bad input: it is rejected and the pipeline
//     carries on as if it never arrived.

use crate::config::{DetectionMode, PipelineConfig, SegmentationConfig};
use crate::core_modules::background_model::{AdaptiveBackgroundModel, BackgroundState};
use crate::core_modules::candidate_filter::{filter, Candidate, FilterPolicy};
use crate::core_modules::change_estimator::{ChangeEstimate, ChangeEstimator, ChangeMap, EstimatorState};
use crate::core_modules::frame::{Frame, FrameShape};
use crate::core_modules::preprocessor::reduce;
use crate::core_modules::region_extractor::extract_contours;
use crate::core_modules::region_mask::RegionMask;
use crate::core_modules::report::{MotionReport, Scope};
use crate::core_modules::segmenter::{morphological_close, segment};
use crate::core_modules::static_reference::{StaticReferenceDiff, ZoneChange};
use crate::error::{ConfigError, Result, VisionError};
use tracing::{debug, info, warn};

/// Segments, closes, traces and filters one change map.
pub fn analyze_change(
    map: &ChangeMap,
    threshold: u8,
    segmentation: &SegmentationConfig,
    policy: &FilterPolicy,
) -> Vec<Candidate> {
    let mask = segment(map, threshold);
    let mask = morphological_close(&mask, segmentation.close_kernel, segmentation.erode);
    filter(extract_contours(&mask), &mask, policy)
}

/// Runs the post-estimation stages for one zone and moves the accepted
/// candidates into frame coordinates.
pub(crate) fn analyze_zone(
    diff: &StaticReferenceDiff,
    change: ZoneChange,
    config: &PipelineConfig,
) -> (Scope, Vec<Candidate>) {
    let Some(zone) = diff.zone(change.zone) else {
        return (Scope::Frame, Vec::new());
    };
    let policy = zone.effective_policy(&config.policy);
    let candidates = analyze_change(&change.map, zone.threshold, &config.segmentation, policy)
        .into_iter()
        .map(|c| c.offset(change.window.x, change.window.y))
        .collect();
    (Scope::Zone(zone.name.clone()), candidates)
}

/// Builds the zone estimator from the raw reference frame. The reference goes
/// through the same global exclusion and reduction as every live frame.
pub(crate) fn prepare_static_reference(
    config: &PipelineConfig,
    reference: &Frame,
) -> std::result::Result<(StaticReferenceDiff, FrameGate), ConfigError> {
    if reference.is_empty() {
        return Err(ConfigError::EmptyReference);
    }
    let mut gate = FrameGate::new();
    gate.lock(reference.shape(), config);
    let reduced = reduce(&gate.mask(reference, config.exclusion_fill), &config.preprocess);
    let diff = StaticReferenceDiff::new(&reduced, config.zones.clone(), config.exclusion_fill)?;
    Ok((diff, gate))
}

/// Admission control shared by the pipelines: shape locking, fault latching and
/// the global exclusion mask.
#[derive(Debug, Clone, Default)]
pub(crate) struct FrameGate {
    shape: Option<FrameShape>,
    exclusion: Option<RegionMask>,
    fault: Option<ConfigError>,
}

impl FrameGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn shape(&self) -> Option<FrameShape> {
        self.shape
    }

    pub(crate) fn fault(&self) -> Option<&ConfigError> {
        self.fault.as_ref()
    }

    fn lock(&mut self, shape: FrameShape, config: &PipelineConfig) {
        self.shape = Some(shape);
        let mask = RegionMask::from_polygons(shape.width, shape.height, &config.exclusions);
        self.exclusion = (!mask.is_clear()).then_some(mask);
    }

    fn mask(&self, frame: &Frame, fill: u8) -> Frame {
        match &self.exclusion {
            Some(mask) => mask.apply(frame, fill),
            None => frame.clone(),
        }
    }

    /// Faults the gate for good; every later `admit` returns `fault`.
    pub(crate) fn latch(&mut self, fault: ConfigError) -> VisionError {
        warn!(error = %fault, "Pipeline faulted");
        self.fault = Some(fault.clone());
        VisionError::Config(fault)
    }

    /// Checks `frame` and returns it with the global exclusion applied.
    pub(crate) fn admit(&mut self, frame: &Frame, config: &PipelineConfig) -> Result<Frame> {
        if let Some(fault) = &self.fault {
            return Err(VisionError::Config(fault.clone()));
        }
        if frame.is_empty() {
            warn!(width = frame.width(), height = frame.height(), "Rejected empty frame");
            return Err(VisionError::EmptyFrame {
                width: frame.width(),
                height: frame.height(),
            });
        }
        match self.shape {
            Some(expected) if expected != frame.shape() => {
                return Err(self.latch(ConfigError::DimensionMismatch {
                    expected,
                    actual: frame.shape(),
                }));
            }
            Some(_) => {}
            None => self.lock(frame.shape(), config),
        }
        Ok(self.mask(frame, config.exclusion_fill))
    }
}

/// The synchronous, frame-sequential motion detector.
#[derive(Debug, Clone)]
pub struct MotionPipeline {
    config: PipelineConfig,
    estimator: ChangeEstimator,
    state: EstimatorState,
    gate: FrameGate,
    frame_index: u64,
}

impl MotionPipeline {
    /// Builds a pipeline for `config.mode`. Static-reference mode needs the
    /// reference frame; adaptive mode ignores it.
    pub fn new(config: PipelineConfig, reference: Option<&Frame>) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let (estimator, gate) = match config.mode {
            DetectionMode::StaticReference => {
                let reference = reference.ok_or(ConfigError::MissingReference)?;
                let (diff, gate) = prepare_static_reference(&config, reference)?;
                (ChangeEstimator::StaticReference(diff), gate)
            }
            DetectionMode::Adaptive => (
                ChangeEstimator::Adaptive(AdaptiveBackgroundModel::new(config.adaptive)?),
                FrameGate::new(),
            ),
        };

        info!(
            mode = %config.mode,
            zones = config.zones.len(),
            shape = %gate.shape().map(|s| s.to_string()).unwrap_or_else(|| "unlocked".into()),
            "Motion pipeline ready"
        );

        Ok(Self {
            state: estimator.initial_state(),
            config,
            estimator,
            gate,
            frame_index: 0,
        })
    }

    /// Static-reference pipeline against `reference`.
    pub fn with_reference(config: PipelineConfig, reference: &Frame) -> std::result::Result<Self, ConfigError> {
        if config.mode != DetectionMode::StaticReference {
            return Err(ConfigError::UnsupportedMode);
        }
        Self::new(config, Some(reference))
    }

    /// Adaptive pipeline; the first frame fixes the expected shape.
    pub fn adaptive(config: PipelineConfig) -> std::result::Result<Self, ConfigError> {
        if config.mode != DetectionMode::Adaptive {
            return Err(ConfigError::UnsupportedMode);
        }
        Self::new(config, None)
    }

    /// Analyses one frame.
    pub fn process(&mut self, frame: &Frame) -> Result<MotionReport> {
        // Stage 1: Admission and global exclusion
        let admitted = self.gate.admit(frame, &self.config)?;

        // Stage 2: Reduction
        let reduced = reduce(&admitted, &self.config.preprocess);

        // Stage 3: Change estimation (advances the background, if any).
        // Warm-up describes the model the frame is scored against.
        let warming_up = !self.is_warm();
        let estimate = self
            .estimator
            .estimate(&reduced, &mut self.state)
            .map_err(|fault| self.gate.latch(fault))?;

        // Stage 4: Segmentation, extraction and filtering per scope
        let scoped: Vec<(Scope, Vec<Candidate>)> = match (estimate, &self.estimator) {
            (ChangeEstimate::Zoned(changes), ChangeEstimator::StaticReference(diff)) => changes
                .into_iter()
                .map(|change| analyze_zone(diff, change, &self.config))
                .collect(),
            (ChangeEstimate::Global(map), _) => vec![(
                Scope::Frame,
                analyze_change(
                    &map,
                    self.config.global_threshold,
                    &self.config.segmentation,
                    &self.config.policy,
                ),
            )],
            (ChangeEstimate::Zoned(_), ChangeEstimator::Adaptive(_)) => Vec::new(),
        };

        // Stage 5: Report
        let report = MotionReport::assemble(self.frame_index, scoped).with_warming_up(warming_up);
        debug!(
            frame = report.frame_index,
            status = %report.status,
            events = report.event_count(),
            warming_up = report.warming_up,
            "Frame processed"
        );
        for zone in report.zones.iter().filter(|z| !z.events.is_empty()) {
            debug!(frame = report.frame_index, scope = %zone.scope, events = zone.events.len(), "Zone candidates");
        }

        self.frame_index += 1;
        Ok(report)
    }

    /// Forgets the learned background and restarts frame numbering. A faulted
    /// pipeline stays faulted.
    pub fn reset(&mut self) {
        self.state = self.estimator.initial_state();
        self.frame_index = 0;
    }

    pub fn background_state(&self) -> Option<&BackgroundState> {
        self.state.background()
    }

    /// Always true for the static-reference strategy.
    pub fn is_warm(&self) -> bool {
        match (&self.estimator, self.state.background()) {
            (ChangeEstimator::Adaptive(model), Some(state)) => state.is_warm(model.settings()),
            (ChangeEstimator::Adaptive(_), None) => false,
            (ChangeEstimator::StaticReference(_), _) => true,
        }
    }

    pub fn is_faulted(&self) -> bool {
        self.gate.fault().is_some()
    }

    /// Index the next processed frame will carry.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}
