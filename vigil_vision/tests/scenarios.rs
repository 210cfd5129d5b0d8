use vigil_vision::core_modules::preprocessor::reduce;
use vigil_vision::{
    ChannelLayout, ConfigError, DetectionMode, Frame, ModelSettings, MotionPipeline, MotionReport,
    MotionStatus, PipelineConfig, Polygon, PreprocessOptions, Rect, Smoothing, VisionError, Zone,
    ZoneParallelPipeline,
};

const BACKGROUND: u8 = 40;
const BRIGHT: u8 = 230;

fn scene(width: u32, height: u32, blocks: &[Rect]) -> Frame {
    Frame::from_fn(width, height, ChannelLayout::Gray, |x, y, _| {
        if blocks.iter().any(|b| b.contains(x, y)) { BRIGHT } else { BACKGROUND }
    })
}

fn rgb_scene(width: u32, height: u32, blocks: &[Rect]) -> Frame {
    Frame::from_fn(width, height, ChannelLayout::Rgb, |x, y, c| {
        if blocks.iter().any(|b| b.contains(x, y)) { [BRIGHT, 90, 20][c] } else { BACKGROUND }
    })
}

fn three_zones() -> PipelineConfig {
    PipelineConfig::static_reference(vec![
        Zone::new("north", Rect::new(0, 0, 200, 70), 20),
        Zone::new("south_west", Rect::new(0, 70, 100, 80), 20),
        Zone::new("south_east", Rect::new(100, 70, 100, 80), 20),
    ])
}

fn assert_near(actual: Rect, expected: Rect, tolerance: u32) {
    let close = |a: u32, b: u32| a.abs_diff(b) <= tolerance;
    assert!(
        close(actual.x, expected.x)
            && close(actual.y, expected.y)
            && close(actual.width, expected.width)
            && close(actual.height, expected.height),
        "{actual} is not within {tolerance}px of {expected}"
    );
}

#[test]
fn identical_frames_are_quiescent() {
    let reference = scene(200, 150, &[]);
    let mut pipeline = MotionPipeline::with_reference(three_zones(), &reference).unwrap();
    let report = pipeline.process(&reference).unwrap();

    assert_eq!(report.status, MotionStatus::Quiescent);
    assert_eq!(report.zones.len(), 3);
    assert!(report.zones.iter().all(|z| z.status == MotionStatus::Quiescent));
    assert_eq!(report.event_count(), 0);
}

#[test]
fn filled_block_yields_one_candidate_in_its_zone() {
    let reference = scene(200, 150, &[]);
    let block = Rect::new(120, 90, 40, 40);
    let mut pipeline = MotionPipeline::with_reference(three_zones(), &reference).unwrap();
    let report = pipeline.process(&scene(200, 150, &[block])).unwrap();

    assert_eq!(report.status, MotionStatus::MotionDetected);
    let zone = report.zone("south_east").unwrap();
    assert_eq!(zone.status, MotionStatus::MotionDetected);
    assert_eq!(zone.events.len(), 1);
    assert_near(zone.events[0].bounding_box, block, 1);
    assert_eq!(report.zone("north").unwrap().events.len(), 0);
    assert_eq!(report.zone("south_west").unwrap().events.len(), 0);
}

#[test]
fn block_on_zone_left_edge_is_reported() {
    let reference = scene(200, 150, &[]);
    let block = Rect::new(100, 90, 40, 40);
    let mut pipeline = MotionPipeline::with_reference(three_zones(), &reference).unwrap();
    let report = pipeline.process(&scene(200, 150, &[block])).unwrap();

    let zone = report.zone("south_east").unwrap();
    assert_eq!(zone.status, MotionStatus::MotionDetected);
    assert_eq!(zone.events.len(), 1);
    assert_near(zone.events[0].bounding_box, block, 1);
}

#[test]
fn colour_frames_work_without_grayscale_reduction() {
    let mut config = three_zones();
    config.preprocess = PreprocessOptions {
        grayscale: false,
        smoothing: Some(Smoothing::box_filter(3).unwrap()),
    };
    let reference = rgb_scene(200, 150, &[]);
    let block = Rect::new(20, 10, 40, 30);
    let mut pipeline = MotionPipeline::with_reference(config, &reference).unwrap();
    let report = pipeline.process(&rgb_scene(200, 150, &[block])).unwrap();

    let north = report.zone("north").unwrap();
    assert_eq!(north.events.len(), 1);
    assert_near(north.events[0].bounding_box, block, 2);
}

#[test]
fn static_reference_is_deterministic() {
    let reference = scene(200, 150, &[]);
    let frame = scene(200, 150, &[Rect::new(10, 10, 35, 30), Rect::new(130, 100, 30, 30)]);

    let mut first = MotionPipeline::with_reference(three_zones(), &reference).unwrap();
    let mut second = MotionPipeline::with_reference(three_zones(), &reference).unwrap();
    let a = first.process(&frame).unwrap();
    let b = second.process(&frame).unwrap();
    assert_eq!(a, b);

    // Processing the same frame again on the same pipeline changes only the index.
    let again = first.process(&frame).unwrap();
    assert_eq!(again.zones.len(), a.zones.len());
    for (x, y) in again.zones.iter().zip(&a.zones) {
        assert_eq!(x.status, y.status);
        let boxes = |z: &vigil_vision::ZoneReport| z.events.iter().map(|e| e.bounding_box).collect::<Vec<_>>();
        assert_eq!(boxes(x), boxes(y));
    }
}

#[test]
fn zone_threshold_changes_do_not_leak() {
    let reference = scene(200, 150, &[]);
    let frame = scene(200, 150, &[Rect::new(10, 10, 35, 30), Rect::new(130, 100, 30, 30)]);

    let baseline = MotionPipeline::with_reference(three_zones(), &reference)
        .unwrap()
        .process(&frame)
        .unwrap();

    let mut strict = three_zones();
    strict.zones[0].threshold = 255;
    let tightened = MotionPipeline::with_reference(strict, &reference)
        .unwrap()
        .process(&frame)
        .unwrap();

    assert_eq!(tightened.zone("north").unwrap().events.len(), 0);
    assert_eq!(baseline.zone("north").unwrap().events.len(), 1);
    for name in ["south_west", "south_east"] {
        assert_eq!(tightened.zone(name), baseline.zone(name));
    }
}

#[test]
fn change_inside_zone_exclusion_is_ignored() {
    let mut config = three_zones();
    config.zones[2] = config.zones[2]
        .clone()
        .with_exclusion(Polygon::from_rect(Rect::new(110, 80, 70, 60)));
    let reference = scene(200, 150, &[]);
    let mut pipeline = MotionPipeline::with_reference(config, &reference).unwrap();

    let report = pipeline.process(&scene(200, 150, &[Rect::new(120, 90, 40, 40)])).unwrap();
    assert_eq!(report.status, MotionStatus::Quiescent);
}

#[test]
fn overlapping_zones_both_see_the_change() {
    let config = PipelineConfig::static_reference(vec![
        Zone::new("wide", Rect::new(0, 0, 200, 150), 20),
        Zone::new("inner", Rect::new(50, 30, 100, 90), 20),
    ]);
    let reference = scene(200, 150, &[]);
    let block = Rect::new(80, 50, 30, 30);
    let report = MotionPipeline::with_reference(config, &reference)
        .unwrap()
        .process(&scene(200, 150, &[block]))
        .unwrap();

    assert_eq!(report.zone("wide").unwrap().events[0].bounding_box, block);
    assert_eq!(report.zone("inner").unwrap().events[0].bounding_box, block);
}

fn adaptive_run(pipeline: &mut MotionPipeline, block: Rect) -> (Vec<MotionReport>, MotionReport) {
    let still = scene(200, 150, &[]);
    let warmup: Vec<MotionReport> = (0..30).map(|_| pipeline.process(&still).unwrap()).collect();
    let moved = pipeline.process(&scene(200, 150, &[block])).unwrap();
    (warmup, moved)
}

#[test]
fn adaptive_model_finds_block_after_warm_up() {
    let block = Rect::new(70, 40, 50, 50);
    let mut pipeline = MotionPipeline::adaptive(PipelineConfig::adaptive(ModelSettings::default())).unwrap();
    let (warmup, moved) = adaptive_run(&mut pipeline, block);

    assert!(warmup.iter().all(|r| r.status == MotionStatus::Quiescent));
    assert!(warmup[0].warming_up);
    assert!(!moved.warming_up);
    assert_eq!(moved.status, MotionStatus::MotionDetected);
    assert_eq!(moved.event_count(), 1);
    let event = moved.events().next().unwrap();
    assert_near(event.bounding_box, block, 2);
}

#[test]
fn adaptive_warm_up_is_repeatable_after_reset() {
    let block = Rect::new(70, 40, 50, 50);
    let mut pipeline = MotionPipeline::adaptive(PipelineConfig::adaptive(ModelSettings::default())).unwrap();
    let first = adaptive_run(&mut pipeline, block);
    pipeline.reset();
    let second = adaptive_run(&mut pipeline, block);
    assert_eq!(first, second);
}

#[test]
fn empty_frame_leaves_background_untouched() {
    let mut pipeline = MotionPipeline::adaptive(PipelineConfig::adaptive(ModelSettings::default())).unwrap();
    for _ in 0..4 {
        pipeline.process(&scene(64, 48, &[])).unwrap();
    }
    let before = pipeline.background_state().cloned();

    let err = pipeline.process(&Frame::filled(64, 0, ChannelLayout::Gray, 0)).unwrap_err();
    assert!(matches!(err, VisionError::EmptyFrame { width: 64, height: 0 }));
    assert_eq!(pipeline.background_state().cloned(), before);
    assert_eq!(pipeline.background_state().map(|s| s.observations()), Some(4));
    assert!(pipeline.process(&scene(64, 48, &[])).is_ok());
}

#[test]
fn dimension_mismatch_faults_the_pipeline() {
    let mut pipeline = MotionPipeline::adaptive(PipelineConfig::adaptive(ModelSettings::default())).unwrap();
    pipeline.process(&scene(64, 48, &[])).unwrap();

    let rgb = Frame::filled(64, 48, ChannelLayout::Rgb, BACKGROUND);
    assert!(matches!(
        pipeline.process(&rgb),
        Err(VisionError::Config(ConfigError::DimensionMismatch { .. }))
    ));
    assert!(matches!(
        pipeline.process(&scene(64, 48, &[])),
        Err(VisionError::Config(ConfigError::DimensionMismatch { .. }))
    ));
}

#[test]
fn invalid_kernels_are_rejected_up_front() {
    assert_eq!(Smoothing::gaussian(6), Err(ConfigError::InvalidKernelSize(6)));

    let mut config = three_zones();
    config.segmentation.close_kernel = 4;
    assert!(matches!(
        MotionPipeline::with_reference(config, &scene(200, 150, &[])),
        Err(ConfigError::InvalidCloseKernel(4))
    ));
}

#[test]
fn reduce_is_identity_on_gray_without_blur() {
    let frame = scene(31, 17, &[Rect::new(3, 3, 5, 9)]);
    let options = PreprocessOptions {
        grayscale: true,
        smoothing: None,
    };
    assert_eq!(reduce(&frame, &options), frame);
}

#[test]
fn sample_zone_config_detects_block_in_gate() {
    let config = PipelineConfig::from_toml_str(include_str!("../../demos/sample_zones.toml")).unwrap();
    assert_eq!(config.mode, DetectionMode::StaticReference);
    let thresholds: Vec<u8> = config.zones.iter().map(|z| z.threshold).collect();
    assert_eq!(thresholds, vec![18, 12, 22, 12, 20]);

    let reference = rgb_scene(1920, 1080, &[]);
    let block = Rect::new(1090, 605, 40, 40);
    let mut pipeline = MotionPipeline::with_reference(config, &reference).unwrap();
    let report = pipeline.process(&rgb_scene(1920, 1080, &[block])).unwrap();

    assert_eq!(report.event_count(), 1);
    let gate = report.zone("gate").unwrap();
    assert_eq!(gate.events.len(), 1);
    assert_near(gate.events[0].bounding_box, block, 6);
}

#[test]
fn adaptive_demo_config_parses() {
    let config = PipelineConfig::from_toml_str(include_str!("../../demos/adaptive.toml")).unwrap();
    assert_eq!(config.mode, DetectionMode::Adaptive);
    assert_eq!(config.adaptive, ModelSettings::default());
}

#[tokio::test]
async fn parallel_pipeline_agrees_with_sequential() {
    let reference = scene(200, 150, &[]);
    let mut sequential = MotionPipeline::with_reference(three_zones(), &reference).unwrap();
    let mut parallel = ZoneParallelPipeline::new(three_zones(), &reference).unwrap();

    for blocks in [
        vec![],
        vec![Rect::new(120, 90, 40, 40)],
        vec![Rect::new(10, 10, 35, 30), Rect::new(20, 80, 30, 40), Rect::new(130, 100, 30, 30)],
    ] {
        let frame = scene(200, 150, &blocks);
        assert_eq!(parallel.process(&frame).await.unwrap(), sequential.process(&frame).unwrap());
    }
}
