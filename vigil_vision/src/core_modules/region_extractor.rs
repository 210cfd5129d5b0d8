// THEORY:
// The `RegionExtractor` turns foreground blobs into outlines. It follows the
// border of every connected foreground component and keeps only the outermost
// ones: a hole inside a blob, or a blob sitting inside such a hole, is part of
// the enclosing object and is not reported on its own.
//
// Each traced border is a chain of unit steps. Only the corners, the points
// where the step direction changes, are kept, so a filled rectangle comes out
// as exactly four vertices no matter how large it is.

use crate::core_modules::geometry::{Point, Rect};
use crate::core_modules::segmenter::BinaryMask;
use image::GrayImage;
use image::imageops::replace;
use imageproc::contours::{BorderType, find_contours};
use serde::{Deserialize, Serialize};

/// A closed outline in pixel coordinates. The last point joins the first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contour {
    points: Vec<Point>,
}

impl Contour {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Smallest rectangle containing every vertex, counting vertex pixels
    /// themselves (a single point yields a 1x1 box). Negative coordinates are
    /// clamped to zero.
    pub fn bounding_box(&self) -> Rect {
        let Some(first) = self.points.first() else {
            return Rect::default();
        };
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &self.points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        let (min_x, min_y) = (min_x.max(0), min_y.max(0));
        let (max_x, max_y) = (max_x.max(min_x), max_y.max(min_y));
        Rect::new(
            min_x as u32,
            min_y as u32,
            (max_x - min_x) as u32 + 1,
            (max_y - min_y) as u32 + 1,
        )
    }

    /// Polygon area of the outline by the shoelace formula.
    pub fn area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let twice: i64 = (0..n)
            .map(|i| {
                let a = self.points[i];
                let b = self.points[(i + 1) % n];
                a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64
            })
            .sum();
        twice.abs() as f64 / 2.0
    }

    /// Shifts every point, e.g. from zone-local to frame coordinates.
    pub fn translate(&self, dx: i32, dy: i32) -> Contour {
        Contour::new(
            self.points
                .iter()
                .map(|p| Point::new(p.x + dx, p.y + dy))
                .collect(),
        )
    }
}

/// Traces the outer borders of the top-level foreground components of `mask`.
pub fn extract_contours(mask: &BinaryMask) -> Vec<Contour> {
    // The tracer only starts an outer border after a background pixel, so a
    // blob in column 0 would come back as a hole. Trace on a copy framed by one
    // pixel of background and shift the points back.
    let mut padded = GrayImage::new(mask.width() + 2, mask.height() + 2);
    replace(&mut padded, mask.as_image(), 1, 1);

    find_contours::<i32>(&padded)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .map(|c| {
            let chain: Vec<Point> = c
                .points
                .iter()
                .map(|p| Point::new(p.x - 1, p.y - 1))
                .collect();
            Contour::new(simplify_chain(&chain))
        })
        .collect()
}

/// Keeps only the points of a closed chain where the step direction changes.
fn simplify_chain(chain: &[Point]) -> Vec<Point> {
    let mut points: Vec<Point> = Vec::with_capacity(chain.len());
    for &p in chain {
        if points.last() != Some(&p) {
            points.push(p);
        }
    }
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    let n = points.len();
    if n <= 2 {
        return points;
    }

    let step = |from: Point, to: Point| (to.x - from.x, to.y - from.y);
    let corners: Vec<Point> = (0..n)
        .filter(|&i| {
            let prev = points[(i + n - 1) % n];
            let next = points[(i + 1) % n];
            step(prev, points[i]) != step(points[i], next)
        })
        .map(|i| points[i])
        .collect();

    if corners.is_empty() { points } else { corners }
}
