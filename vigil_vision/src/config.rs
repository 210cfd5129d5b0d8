// THEORY:
// `PipelineConfig` is the whole of what a pipeline needs to know up front, as
// plain data. It can be built in code or parsed from TOML, and in both cases it
// is checked once by `validate` so that nothing later in the pipeline has to
// second-guess its inputs. The core never reads files: `from_toml_str` takes
// text, and loading that text is the caller's business.

use crate::core_modules::background_model::ModelSettings;
use crate::core_modules::candidate_filter::FilterPolicy;
use crate::core_modules::geometry::Polygon;
use crate::core_modules::preprocessor::PreprocessOptions;
use crate::core_modules::segmenter::check_close_kernel;
use crate::core_modules::zone::Zone;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which change estimator the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectionMode {
    /// Per-zone difference against a fixed reference frame.
    #[default]
    StaticReference,
    /// Whole-frame comparison against a learned background.
    Adaptive,
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DetectionMode::StaticReference => "static_reference",
            DetectionMode::Adaptive => "adaptive",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Side of the square closing element. Odd; 1 disables closing.
    #[serde(default = "default_close_kernel")]
    pub close_kernel: u32,
    /// Erode after dilating. Without it the close is a plain dilation.
    #[serde(default = "default_erode")]
    pub erode: bool,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            close_kernel: default_close_kernel(),
            erode: default_erode(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Change threshold for adaptive mode, where there are no zones.
    #[serde(default = "default_global_threshold")]
    pub global_threshold: u8,
    /// Areas blanked out of every frame before anything else happens.
    #[serde(default)]
    pub exclusions: Vec<Polygon>,
    /// Value written into excluded pixels, zone exclusions included.
    #[serde(default)]
    pub exclusion_fill: u8,
    #[serde(default)]
    pub preprocess: PreprocessOptions,
    #[serde(default)]
    pub mode: DetectionMode,
    /// Analysed independently, in this order. Required in static-reference mode.
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default)]
    pub adaptive: ModelSettings,
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    /// Candidate gates for every zone that does not bring its own.
    #[serde(default)]
    pub policy: FilterPolicy,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            global_threshold: default_global_threshold(),
            exclusions: Vec::new(),
            exclusion_fill: 0,
            preprocess: PreprocessOptions::default(),
            mode: DetectionMode::default(),
            zones: Vec::new(),
            adaptive: ModelSettings::default(),
            segmentation: SegmentationConfig::default(),
            policy: FilterPolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// A static-reference configuration over `zones`, defaults elsewhere.
    pub fn static_reference(zones: Vec<Zone>) -> Self {
        Self {
            mode: DetectionMode::StaticReference,
            zones,
            ..Self::default()
        }
    }

    /// An adaptive configuration with the given model settings.
    pub fn adaptive(settings: ModelSettings) -> Self {
        Self {
            mode: DetectionMode::Adaptive,
            adaptive: settings,
            ..Self::default()
        }
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks everything that can be checked without seeing a frame. Zone
    /// bounds are checked against the reference when the pipeline is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_close_kernel(self.segmentation.close_kernel)?;
        self.policy.validate()?;
        match self.mode {
            DetectionMode::StaticReference => {
                if self.zones.is_empty() {
                    return Err(ConfigError::EmptyZoneList);
                }
                self.zones.iter().try_for_each(Zone::validate)
            }
            DetectionMode::Adaptive => self.adaptive.validate(),
        }
    }
}

// Default value functions
fn default_global_threshold() -> u8 {
    25
}
fn default_close_kernel() -> u32 {
    3
}
fn default_erode() -> bool {
    true
}
fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::geometry::{Point, Rect};
    use crate::core_modules::preprocessor::SmoothingKind;

    const SAMPLE: &str = r#"
        global_threshold = 30
        exclusion_fill = 7
        exclusions = [[[0, 0], [10, 0], [10, 10], [0, 10]]]

        [preprocess]
        grayscale = true
        smoothing = { kind = "gaussian", kernel_size = 11 }

        [mode]
        kind = "static_reference"

        [[zones]]
        name = "gate"
        x = 1560
        y = 920
        width = 360
        height = 160
        threshold = 18

        [[zones]]
        name = "path"
        x = 610
        y = 900
        width = 150
        height = 180
        threshold = 12
        exclusions = [[[620, 910], [640, 910], [640, 930]]]
        policy = { min_area = 500.0, min_fill_ratio = 0.25 }

        [segmentation]
        close_kernel = 5

        [policy]
        min_area = 300.0

        [logging]
        level = "debug"
    "#;

    #[test]
    fn parses_a_full_document() {
        let config = PipelineConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.global_threshold, 30);
        assert_eq!(config.exclusion_fill, 7);
        assert_eq!(config.exclusions[0].vertices[2], Point::new(10, 10));
        assert_eq!(config.preprocess.smoothing.map(|s| s.kind()), Some(SmoothingKind::Gaussian));
        assert_eq!(config.mode, DetectionMode::StaticReference);
        assert_eq!(config.zones.len(), 2);
        assert_eq!(config.zones[0].rect, Rect::new(1560, 920, 360, 160));
        assert_eq!(config.zones[1].exclusions.len(), 1);

        let path_policy = config.zones[1].policy.unwrap();
        assert_eq!(path_policy.min_area, 500.0);
        assert_eq!(path_policy.max_aspect_ratio, FilterPolicy::default().max_aspect_ratio);
        assert_eq!(config.segmentation, SegmentationConfig { close_kernel: 5, erode: true });
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.adaptive, ModelSettings::default());
    }

    #[test]
    fn adaptive_mode_needs_no_zones() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [mode]
            kind = "adaptive"

            [adaptive]
            history = 200
            warmup_frames = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.mode, DetectionMode::Adaptive);
        assert_eq!(config.adaptive.history, 200);
        assert_eq!(config.adaptive.max_components, 3);
    }

    #[test]
    fn even_smoothing_kernel_is_rejected_while_parsing() {
        let text = SAMPLE.replace("kernel_size = 11", "kernel_size = 10");
        assert!(matches!(PipelineConfig::from_toml_str(&text), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn static_mode_without_zones_is_rejected() {
        assert_eq!(
            PipelineConfig::static_reference(Vec::new()).validate(),
            Err(ConfigError::EmptyZoneList)
        );
    }

    #[test]
    fn bad_close_kernel_and_policy_are_rejected() {
        let mut config = PipelineConfig::static_reference(vec![Zone::new("a", Rect::new(0, 0, 4, 4), 10)]);
        config.segmentation.close_kernel = 2;
        assert_eq!(config.validate(), Err(ConfigError::InvalidCloseKernel(2)));

        config.segmentation.close_kernel = 3;
        config.policy.min_fill_ratio = 2.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPolicy(_))));
    }
}
