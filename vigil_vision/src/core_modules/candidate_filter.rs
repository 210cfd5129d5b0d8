// THEORY:
// The `CandidateFilter` is the last line of defence against noise. Every traced
// outline is measured and then has to pass three gates before it becomes a
// motion event:
// 1.  **Size**: its polygon area must reach `min_area`. Speckle and sensor noise
//     produce tiny outlines; real objects do not.
// 2.  **Solidity**: the foreground pixels inside its bounding box must cover at
//     least `min_fill_ratio` of that box. Thin diagonal streaks and sparse
//     scatter have large boxes but little fill.
// 3.  **Shape**: neither side of its bounding box may be more than
//     `max_aspect_ratio` times the other. Long slivers are usually edges that
//     shimmered, not objects that moved.
//
// All bounds are inclusive and compared by cross-multiplication, so a value
// sitting exactly on a limit passes no matter how the ratio would round.

use crate::core_modules::geometry::Rect;
use crate::core_modules::region_extractor::Contour;
use crate::core_modules::segmenter::BinaryMask;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

/// The three gates a candidate must pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterPolicy {
    /// Minimum polygon area of the outline, in square pixels.
    pub min_area: f64,
    /// Minimum share of the bounding box covered by foreground, `0.0..=1.0`.
    pub min_fill_ratio: f64,
    /// Maximum of `width / height` and `height / width`. At least `1.0`.
    pub max_aspect_ratio: f64,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            min_area: 300.0,
            min_fill_ratio: 0.0,
            max_aspect_ratio: 10.0,
        }
    }
}

impl FilterPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_area.is_finite() && self.min_area >= 0.0) {
            return Err(ConfigError::InvalidPolicy(format!(
                "min_area must be a non-negative number, got {}",
                self.min_area
            )));
        }
        if !(0.0..=1.0).contains(&self.min_fill_ratio) {
            return Err(ConfigError::InvalidPolicy(format!(
                "min_fill_ratio must lie in 0..=1, got {}",
                self.min_fill_ratio
            )));
        }
        if !(self.max_aspect_ratio >= 1.0) {
            return Err(ConfigError::InvalidPolicy(format!(
                "max_aspect_ratio must be at least 1, got {}",
                self.max_aspect_ratio
            )));
        }
        Ok(())
    }

    /// The first gate `candidate` fails, if any.
    pub fn check(&self, candidate: &Candidate) -> Option<Rejection> {
        let bbox = candidate.bounding_box;
        let (w, h) = (bbox.width as f64, bbox.height as f64);

        if candidate.area < self.min_area {
            return Some(Rejection::Area);
        }
        if (candidate.foreground_pixels as f64) < self.min_fill_ratio * bbox.area() as f64 {
            return Some(Rejection::FillRatio);
        }
        if w > self.max_aspect_ratio * h || h > self.max_aspect_ratio * w {
            return Some(Rejection::AspectRatio);
        }
        None
    }
}

/// Why a candidate was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    Area,
    FillRatio,
    AspectRatio,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Rejection::Area => "area below minimum",
            Rejection::FillRatio => "fill ratio below minimum",
            Rejection::AspectRatio => "aspect ratio above maximum",
        })
    }
}

/// A measured outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub contour: Contour,
    pub bounding_box: Rect,
    /// Polygon area of `contour`.
    pub area: f64,
    /// Foreground pixels in `bounding_box` divided by its area.
    pub fill_ratio: f64,
    /// The larger of `width / height` and `height / width`.
    pub aspect_ratio: f64,
    pub foreground_pixels: u64,
}

impl Candidate {
    /// Measures `contour` against the mask it was traced from.
    pub fn measure(contour: Contour, mask: &BinaryMask) -> Self {
        let bounding_box = contour.bounding_box();
        let foreground_pixels = mask.count_in(bounding_box);
        let box_area = bounding_box.area().max(1) as f64;
        let (w, h) = (bounding_box.width.max(1) as f64, bounding_box.height.max(1) as f64);
        Self {
            area: contour.area(),
            fill_ratio: foreground_pixels as f64 / box_area,
            aspect_ratio: (w / h).max(h / w),
            foreground_pixels,
            bounding_box,
            contour,
        }
    }

    /// Moves the candidate by a non-negative offset, e.g. from zone-local to
    /// frame coordinates. Measurements are unaffected.
    pub fn offset(self, dx: u32, dy: u32) -> Self {
        Self {
            contour: self.contour.translate(dx as i32, dy as i32),
            bounding_box: self.bounding_box.offset(dx, dy),
            ..self
        }
    }
}

/// Measures every contour and keeps the ones `policy` accepts, in input order.
pub fn filter(contours: Vec<Contour>, mask: &BinaryMask, policy: &FilterPolicy) -> Vec<Candidate> {
    contours
        .into_iter()
        .map(|contour| Candidate::measure(contour, mask))
        .filter(|candidate| match policy.check(candidate) {
            None => true,
            Some(reason) => {
                trace!(
                    bbox = %candidate.bounding_box,
                    area = candidate.area,
                    fill = candidate.fill_ratio,
                    aspect = candidate.aspect_ratio,
                    %reason,
                    "Candidate rejected"
                );
                false
            }
        })
        .collect()
}
