// THEORY:
// `ZoneParallelPipeline` is the concurrent twin of the static-reference path of
// `MotionPipeline`. Zones never share mutable state, so once a frame has been
// admitted and reduced, each zone's diff / segment / extract / filter chain can
// run on its own blocking worker.
//
// Key architectural principles:
// 1.  **Read-only sharing**: the reduced frame and the prepared zone references
//     are behind `Arc`s; workers only read them.
// 2.  **Bounded fan-out**: a semaphore sized to the machine's cores caps how many
//     zone workers run at once, so a config with dozens of zones does not flood
//     the blocking pool.
// 3.  **Deterministic assembly**: results are joined and reported in configured
//     zone order, whatever order the workers finish in, so the report is the
//     same one the synchronous pipeline would produce.

use crate::config::{DetectionMode, PipelineConfig};
use crate::core_modules::candidate_filter::Candidate;
use crate::core_modules::frame::Frame;
use crate::core_modules::preprocessor::reduce;
use crate::core_modules::report::{MotionReport, Scope};
use crate::core_modules::static_reference::StaticReferenceDiff;
use crate::error::{ConfigError, Result, VisionError};
use crate::pipeline::{analyze_zone, prepare_static_reference, FrameGate};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// What every zone worker needs, shared read-only.
#[derive(Debug)]
struct ZoneContext {
    diff: StaticReferenceDiff,
    config: PipelineConfig,
}

impl ZoneContext {
    fn run(&self, index: usize, frame: &Frame) -> std::result::Result<(Scope, Vec<Candidate>), ConfigError> {
        Ok(match self.diff.estimate_zone(index, frame)? {
            Some(change) => analyze_zone(&self.diff, change, &self.config),
            None => (Scope::Frame, Vec::new()),
        })
    }
}

/// Static-reference detection with zones analysed concurrently.
pub struct ZoneParallelPipeline {
    context: Arc<ZoneContext>,
    permits: Arc<Semaphore>,
    gate: FrameGate,
    frame_index: u64,
}

impl ZoneParallelPipeline {
    /// Sizes the worker limit from the number of logical CPUs.
    pub fn new(config: PipelineConfig, reference: &Frame) -> std::result::Result<Self, ConfigError> {
        Self::with_workers(config, reference, num_cpus::get())
    }

    pub fn with_workers(
        config: PipelineConfig,
        reference: &Frame,
        workers: usize,
    ) -> std::result::Result<Self, ConfigError> {
        if config.mode != DetectionMode::StaticReference {
            return Err(ConfigError::UnsupportedMode);
        }
        config.validate()?;
        let (diff, gate) = prepare_static_reference(&config, reference)?;
        let workers = workers.max(1);

        info!(
            zones = diff.zone_count(),
            workers,
            shape = %reference.shape(),
            "Zone-parallel pipeline ready"
        );

        Ok(Self {
            context: Arc::new(ZoneContext { diff, config }),
            permits: Arc::new(Semaphore::new(workers)),
            gate,
            frame_index: 0,
        })
    }

    /// Analyses one frame, fanning its zones out over blocking workers.
    pub async fn process(&mut self, frame: &Frame) -> Result<MotionReport> {
        let config = &self.context.config;
        let admitted = self.gate.admit(frame, config)?;
        let reduced = Arc::new(reduce(&admitted, &config.preprocess));

        let mut handles = Vec::with_capacity(self.context.diff.zone_count());
        for index in 0..self.context.diff.zone_count() {
            let permit = Arc::clone(&self.permits)
                .acquire_owned()
                .await
                .map_err(|e| VisionError::WorkerFailed(e.to_string()))?;
            let context = Arc::clone(&self.context);
            let frame = Arc::clone(&reduced);
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                context.run(index, &frame)
            }));
        }

        let scoped = join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.map_err(|e| VisionError::WorkerFailed(e.to_string())))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .collect::<std::result::Result<Vec<_>, ConfigError>>()
            .map_err(|fault| self.gate.latch(fault))?;

        let report = MotionReport::assemble(self.frame_index, scoped);
        debug!(
            frame = report.frame_index,
            status = %report.status,
            events = report.event_count(),
            "Frame processed in parallel"
        );
        self.frame_index += 1;
        Ok(report)
    }

    pub fn is_faulted(&self) -> bool {
        self.gate.fault().is_some()
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.context.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::background_model::ModelSettings;
    use crate::core_modules::frame::ChannelLayout;
    use crate::core_modules::geometry::Rect;
    use crate::core_modules::zone::Zone;
    use crate::pipeline::MotionPipeline;

    fn grid_config() -> PipelineConfig {
        let zones = (0..4)
            .flat_map(|row| {
                (0..4).map(move |col| Zone::new(format!("z{row}{col}"), Rect::new(col * 40, row * 30, 40, 30), 15))
            })
            .collect();
        PipelineConfig::static_reference(zones)
    }

    fn scene(blocks: &[Rect]) -> Frame {
        Frame::from_fn(160, 120, ChannelLayout::Gray, |x, y, _| {
            if blocks.iter().any(|b| b.contains(x, y)) { 220 } else { 30 }
        })
    }

    #[tokio::test]
    async fn matches_the_sequential_pipeline() {
        let reference = scene(&[]);
        let mut sequential = MotionPipeline::with_reference(grid_config(), &reference).unwrap();
        let mut parallel = ZoneParallelPipeline::with_workers(grid_config(), &reference, 3).unwrap();

        for frame in [
            scene(&[]),
            scene(&[Rect::new(2, 2, 25, 25)]),
            scene(&[Rect::new(45, 35, 30, 22), Rect::new(125, 90, 30, 25)]),
        ] {
            let expected = sequential.process(&frame).unwrap();
            let actual = parallel.process(&frame).await.unwrap();
            assert_eq!(actual, expected);
        }
    }

    #[tokio::test]
    async fn rejects_adaptive_mode() {
        let config = PipelineConfig::adaptive(ModelSettings::default());
        assert!(matches!(
            ZoneParallelPipeline::new(config, &scene(&[])),
            Err(ConfigError::UnsupportedMode)
        ));
    }

    #[tokio::test]
    async fn empty_frame_leaves_pipeline_usable() {
        let mut pipeline = ZoneParallelPipeline::new(grid_config(), &scene(&[])).unwrap();
        assert!(matches!(
            pipeline.process(&Frame::filled(0, 10, ChannelLayout::Gray, 0)).await,
            Err(VisionError::EmptyFrame { .. })
        ));
        assert!(!pipeline.is_faulted());
        assert_eq!(pipeline.process(&scene(&[])).await.unwrap().frame_index, 0);
    }
}
