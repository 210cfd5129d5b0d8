// THEORY:
// A `Zone` is a named, rectangular window onto the scene with its own detection
// threshold. Zones are plain data supplied by whoever configures the pipeline;
// there are no compiled-in coordinates. Zones may overlap, but each one is
// analysed on its own: its diff, threshold, contours and filter verdicts never
// depend on any other zone.

use crate::core_modules::candidate_filter::FilterPolicy;
use crate::core_modules::geometry::{Polygon, Rect};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// A configured region of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    /// Human-readable identifier, used to label reports.
    pub name: String,
    /// The zone's window in frame coordinates.
    #[serde(flatten)]
    pub rect: Rect,
    /// Change intensity at or above which a pixel counts as foreground.
    pub threshold: u8,
    /// Areas inside this zone to ignore, in frame coordinates.
    #[serde(default)]
    pub exclusions: Vec<Polygon>,
    /// Replaces the pipeline-wide candidate policy for this zone only.
    #[serde(default)]
    pub policy: Option<FilterPolicy>,
}

impl Zone {
    pub fn new(name: impl Into<String>, rect: Rect, threshold: u8) -> Self {
        Self {
            name: name.into(),
            rect,
            threshold,
            exclusions: Vec::new(),
            policy: None,
        }
    }

    pub fn with_exclusion(mut self, polygon: Polygon) -> Self {
        self.exclusions.push(polygon);
        self
    }

    pub fn with_policy(mut self, policy: FilterPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// The policy this zone filters with, given the pipeline-wide default.
    pub fn effective_policy<'a>(&'a self, default: &'a FilterPolicy) -> &'a FilterPolicy {
        self.policy.as_ref().unwrap_or(default)
    }

    /// Checks everything about the zone that does not depend on frame size.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rect.is_empty() {
            return Err(ConfigError::EmptyZone(self.name.clone()));
        }
        if let Some(policy) = &self.policy {
            policy.validate()?;
        }
        Ok(())
    }

    /// Checks that the zone lies inside a `width x height` frame.
    pub fn validate_bounds(&self, width: u32, height: u32) -> Result<(), ConfigError> {
        self.validate()?;
        if !self.rect.fits_within(width, height) {
            return Err(ConfigError::ZoneOutOfBounds {
                name: self.name.clone(),
                rect: self.rect,
                width,
                height,
            });
        }
        Ok(())
    }
}
