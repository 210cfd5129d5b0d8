// THEORY:
// Plain integer geometry shared by every stage: pixel points, axis-aligned
// rectangles (zones and bounding boxes) and polygons (exclusion areas). These
// are "dumb" value types in the same spirit as `Frame`; the stages that need
// rasterization or scoring do it themselves.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An integer pixel coordinate. Deserializes from a `[x, y]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<[i32; 2]> for Point {
    fn from([x, y]: [i32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [i32; 2] {
    fn from(point: Point) -> Self {
        [point.x, point.y]
    }
}

/// An axis-aligned rectangle covering the half-open pixel range
/// `[x, x + width) x [y, y + height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// True when the whole rectangle lies inside a `width x height` frame.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        // u64 so a zone near u32::MAX cannot wrap into range.
        self.x as u64 + self.width as u64 <= width as u64
            && self.y as u64 + self.height as u64 <= height as u64
    }

    pub fn offset(&self, dx: u32, dy: u32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Overlap of two rectangles, if any.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        (x1 > x0 && y1 > y0).then(|| Rect::new(x0, y0, x1 - x0, y1 - y0))
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// A closed polygon. The last vertex connects back to the first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon {
    pub vertices: Vec<Point>,
}

impl Polygon {
    pub fn new(vertices: Vec<Point>) -> Self {
        Self { vertices }
    }

    /// Convenience constructor for a rectangular polygon covering `rect`.
    pub fn from_rect(rect: Rect) -> Self {
        let (x0, y0) = (rect.x as i32, rect.y as i32);
        let (x1, y1) = (rect.right() as i32 - 1, rect.bottom() as i32 - 1);
        Self::new(vec![
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ])
    }

    /// Inclusive pixel bounds of the vertices as `(min_x, min_y, max_x, max_y)`.
    pub fn bounds(&self) -> Option<(i32, i32, i32, i32)> {
        let first = self.vertices.first()?;
        Some(self.vertices.iter().fold(
            (first.x, first.y, first.x, first.y),
            |(x0, y0, x1, y1), p| (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y)),
        ))
    }

    /// Whether pixel `(x, y)` is covered by the polygon.
    ///
    /// A pixel is covered when its centre is inside by the even-odd rule, or when
    /// the pixel itself lies on one of the edges. Counting edge pixels makes a
    /// polygon built from a rectangle's corner pixels cover the whole rectangle.
    pub fn covers(&self, x: i32, y: i32) -> bool {
        let n = self.vertices.len();
        if n == 0 {
            return false;
        }
        if n == 1 {
            return self.vertices[0] == Point::new(x, y);
        }

        let mut inside = false;
        let (cx, cy) = (x as f64 + 0.5, y as f64 + 0.5);
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];

            if on_segment(a, b, x, y) {
                return true;
            }

            let (ax, ay, bx, by) = (a.x as f64, a.y as f64, b.x as f64, b.y as f64);
            if (ay > cy) != (by > cy) {
                let crossing = ax + (cy - ay) * (bx - ax) / (by - ay);
                if cx < crossing {
                    inside = !inside;
                }
            }
        }
        inside
    }
}

fn on_segment(a: Point, b: Point, x: i32, y: i32) -> bool {
    let cross = (b.x - a.x) as i64 * (y - a.y) as i64 - (b.y - a.y) as i64 * (x - a.x) as i64;
    cross == 0
        && x >= a.x.min(b.x)
        && x <= a.x.max(b.x)
        && y >= a.y.min(b.y)
        && y <= a.y.max(b.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_fits_and_intersects() {
        let zone = Rect::new(10, 10, 20, 5);
        assert!(zone.fits_within(30, 15));
        assert!(!zone.fits_within(29, 15));
        assert_eq!(zone.intersection(&Rect::new(25, 0, 100, 12)), Some(Rect::new(25, 10, 5, 2)));
        assert_eq!(zone.intersection(&Rect::new(0, 0, 10, 10)), None);
    }

    #[test]
    fn rectangle_polygon_covers_its_edges() {
        let polygon = Polygon::from_rect(Rect::new(2, 3, 4, 2));
        let covered: Vec<(i32, i32)> = (0..10)
            .flat_map(|y| (0..10).map(move |x| (x, y)))
            .filter(|&(x, y)| polygon.covers(x, y))
            .collect();
        assert_eq!(covered.len(), 8);
        assert!(covered.contains(&(2, 3)));
        assert!(covered.contains(&(5, 4)));
        assert!(!covered.contains(&(6, 4)));
    }

    #[test]
    fn triangle_excludes_far_corner() {
        let polygon = Polygon::new(vec![Point::new(0, 0), Point::new(10, 0), Point::new(0, 10)]);
        assert!(polygon.covers(1, 1));
        assert!(polygon.covers(5, 5));
        assert!(!polygon.covers(9, 9));
    }
}
