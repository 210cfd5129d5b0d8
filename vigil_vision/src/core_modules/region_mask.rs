// THEORY:
// A `RegionMask` blinds the pipeline to parts of the scene that are known to
// change for uninteresting reasons: a burned-in timestamp, a reflective window,
// a tree that moves with the wind. The polygons are rasterized once, when the
// pipeline is configured, and the same raster is re-applied to every frame.
//
// Blinding works by flat-filling the covered pixels with a sentinel value. Since
// the reference frame (or the adaptive model's view of the scene) sees exactly
// the same fill, the difference inside a covered area is always zero and it can
// never become foreground.

use crate::core_modules::frame::Frame;
use crate::core_modules::geometry::{Polygon, Rect};

/// A boolean raster marking pixels that are excluded from analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionMask {
    width: u32,
    height: u32,
    covered: Vec<bool>,
}

impl RegionMask {
    /// An empty mask that covers nothing.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            covered: vec![false; width as usize * height as usize],
        }
    }

    /// Rasterizes the union of `polygons` onto a `width x height` grid.
    /// Polygon parts outside the grid are clipped.
    pub fn from_polygons(width: u32, height: u32, polygons: &[Polygon]) -> Self {
        let mut mask = Self::empty(width, height);
        if width == 0 || height == 0 {
            return mask;
        }

        for polygon in polygons {
            let Some((x0, y0, x1, y1)) = polygon.bounds() else {
                continue;
            };
            // Only visit the polygon's bounding box, clipped to the grid.
            let x0 = x0.max(0);
            let y0 = y0.max(0);
            let x1 = x1.min(width as i32 - 1);
            let y1 = y1.min(height as i32 - 1);

            for y in y0..=y1 {
                for x in x0..=x1 {
                    if polygon.covers(x, y) {
                        mask.covered[y as usize * width as usize + x as usize] = true;
                    }
                }
            }
        }
        mask
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_covered(&self, x: u32, y: u32) -> bool {
        self.covered[y as usize * self.width as usize + x as usize]
    }

    /// Number of covered pixels.
    pub fn count(&self) -> usize {
        self.covered.iter().filter(|&&c| c).count()
    }

    /// True when no pixel is covered, i.e. applying the mask is a no-op.
    pub fn is_clear(&self) -> bool {
        !self.covered.iter().any(|&c| c)
    }

    /// The part of the mask under `rect`, re-based to the rectangle's origin.
    pub fn crop(&self, rect: Rect) -> RegionMask {
        let mut covered = Vec::with_capacity(rect.area() as usize);
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                covered.push(self.is_covered(x, y));
            }
        }
        RegionMask {
            width: rect.width,
            height: rect.height,
            covered,
        }
    }

    /// Returns a copy of `frame` with every covered pixel set to `sentinel` in all channels.
    /// The frame must have the mask's dimensions.
    pub fn apply(&self, frame: &Frame, sentinel: u8) -> Frame {
        debug_assert_eq!((frame.width(), frame.height()), (self.width, self.height));
        if self.is_clear() {
            return frame.clone();
        }

        let channels = frame.channels();
        let mut data = frame.as_bytes().to_vec();
        for (index, _) in self.covered.iter().enumerate().filter(|(_, c)| **c) {
            data[index * channels..(index + 1) * channels].fill(sentinel);
        }
        Frame::from_raw_parts(frame.width(), frame.height(), frame.layout(), data)
    }
}

/// Flat-fills the interior of each polygon with `sentinel`.
pub fn apply_exclusion(frame: &Frame, polygons: &[Polygon], sentinel: u8) -> Frame {
    RegionMask::from_polygons(frame.width(), frame.height(), polygons).apply(frame, sentinel)
}
