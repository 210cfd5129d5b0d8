// THEORY:
// `StaticReferenceDiff` compares every configured zone of a live frame with the
// same zone of one fixed "empty scene" reference. It is the simplest possible
// change estimator and the easiest one to reason about: no memory, no warm-up,
// the same frame always produces the same maps.
//
// The reference is cut into per-zone windows once, at construction, with each
// zone's exclusion polygons already burned in. At estimate time the live frame
// is cut the same way, blinded the same way, and differenced pixel by pixel.
// Colour frames are differenced per channel and the channel differences are then
// collapsed with the luma weights, so a change in any channel still counts.

use crate::core_modules::change_estimator::ChangeMap;
use crate::core_modules::frame::{ChannelLayout, Frame, FrameShape};
use crate::core_modules::geometry::Rect;
use crate::core_modules::preprocessor::luma;
use crate::core_modules::region_mask::RegionMask;
use crate::core_modules::zone::Zone;
use crate::error::ConfigError;

/// The change map of one zone, in zone-local coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneChange {
    /// Index of the zone in configuration order.
    pub zone: usize,
    /// Where the map sits in the frame.
    pub window: Rect,
    pub map: ChangeMap,
}

#[derive(Debug, Clone)]
struct PreparedZone {
    zone: Zone,
    /// The zone's window of the reference, exclusions already applied.
    reference: Frame,
    /// The zone's exclusions, re-based to the zone window.
    exclusion: RegionMask,
}

/// Zone-by-zone absolute difference against a fixed reference frame.
#[derive(Debug, Clone)]
pub struct StaticReferenceDiff {
    shape: FrameShape,
    sentinel: u8,
    zones: Vec<PreparedZone>,
}

impl StaticReferenceDiff {
    /// Prepares the per-zone reference windows.
    ///
    /// Fails when the reference is empty, when no zones are given, or when a
    /// zone is empty or does not fit inside the reference.
    pub fn new(reference: &Frame, zones: Vec<Zone>, sentinel: u8) -> Result<Self, ConfigError> {
        if reference.is_empty() {
            return Err(ConfigError::EmptyReference);
        }
        if zones.is_empty() {
            return Err(ConfigError::EmptyZoneList);
        }

        let (width, height) = (reference.width(), reference.height());
        let prepared = zones
            .into_iter()
            .map(|zone| {
                zone.validate_bounds(width, height)?;
                let exclusion =
                    RegionMask::from_polygons(width, height, &zone.exclusions).crop(zone.rect);
                let window = exclusion.apply(&reference.crop(zone.rect), sentinel);
                Ok(PreparedZone {
                    zone,
                    reference: window,
                    exclusion,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            shape: reference.shape(),
            sentinel,
            zones: prepared,
        })
    }

    /// The shape every estimated frame must have.
    pub fn shape(&self) -> FrameShape {
        self.shape
    }

    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    pub fn zone(&self, index: usize) -> Option<&Zone> {
        self.zones.get(index).map(|p| &p.zone)
    }

    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter().map(|p| &p.zone)
    }

    /// One change map per zone, in zone order. Fails with `DimensionMismatch`
    /// unless `frame` has the reference's shape.
    pub fn estimate(&self, frame: &Frame) -> Result<Vec<ZoneChange>, ConfigError> {
        self.check_shape(frame)?;
        Ok((0..self.zones.len())
            .filter_map(|index| self.diff_zone(index, frame))
            .collect())
    }

    /// The change map of a single zone, or `None` when `index` is not below
    /// `zone_count()`.
    pub fn estimate_zone(&self, index: usize, frame: &Frame) -> Result<Option<ZoneChange>, ConfigError> {
        self.check_shape(frame)?;
        Ok(self.diff_zone(index, frame))
    }

    fn check_shape(&self, frame: &Frame) -> Result<(), ConfigError> {
        if frame.shape() != self.shape {
            return Err(ConfigError::DimensionMismatch {
                expected: self.shape,
                actual: frame.shape(),
            });
        }
        Ok(())
    }

    fn diff_zone(&self, index: usize, frame: &Frame) -> Option<ZoneChange> {
        let prepared = self.zones.get(index)?;
        let rect = prepared.zone.rect;
        let live = prepared.exclusion.apply(&frame.crop(rect), self.sentinel);

        Some(ZoneChange {
            zone: index,
            window: rect,
            map: absolute_difference(&prepared.reference, &live),
        })
    }
}

/// Per-pixel absolute difference of two same-shaped frames as a single channel.
pub fn absolute_difference(a: &Frame, b: &Frame) -> ChangeMap {
    debug_assert_eq!(a.shape(), b.shape());
    let data = match a.layout() {
        ChannelLayout::Gray => a
            .as_bytes()
            .iter()
            .zip(b.as_bytes())
            .map(|(&p, &q)| p.abs_diff(q))
            .collect(),
        ChannelLayout::Rgb => a
            .as_bytes()
            .chunks_exact(3)
            .zip(b.as_bytes().chunks_exact(3))
            .map(|(p, q)| luma(p[0].abs_diff(q[0]), p[1].abs_diff(q[1]), p[2].abs_diff(q[2])))
            .collect(),
    };
    ChangeMap::from_raw(a.width(), a.height(), data)
        .unwrap_or_else(|| ChangeMap::zeros(a.width(), a.height()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::geometry::Polygon;

    fn scene() -> Frame {
        Frame::filled(40, 30, ChannelLayout::Gray, 60)
    }

    fn with_square(frame: &Frame, rect: Rect, value: u8) -> Frame {
        Frame::from_fn(frame.width(), frame.height(), frame.layout(), |x, y, c| {
            if rect.contains(x, y) { value } else { frame.pixel(x, y)[c] }
        })
    }

    #[test]
    fn identical_frames_produce_zero_maps() {
        let zones = vec![
            Zone::new("left", Rect::new(0, 0, 20, 30), 10),
            Zone::new("right", Rect::new(20, 0, 20, 30), 10),
        ];
        let diff = StaticReferenceDiff::new(&scene(), zones, 0).unwrap();
        let changes = diff.estimate(&scene()).unwrap();
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.map.is_zero()));
    }

    #[test]
    fn change_lands_only_in_overlapping_zone() {
        let zones = vec![
            Zone::new("left", Rect::new(0, 0, 20, 30), 10),
            Zone::new("right", Rect::new(20, 0, 20, 30), 10),
        ];
        let diff = StaticReferenceDiff::new(&scene(), zones, 0).unwrap();
        let changed = with_square(&scene(), Rect::new(25, 10, 5, 5), 160);

        let changes = diff.estimate(&changed).unwrap();
        assert!(changes[0].map.is_zero());
        assert_eq!(changes[1].map.get(5, 10), 100);
        assert_eq!(changes[1].map.get(4, 10), 0);
        assert_eq!(changes[1].window, Rect::new(20, 0, 20, 30));
    }

    #[test]
    fn zone_exclusions_hide_changes() {
        let zone = Zone::new("yard", Rect::new(0, 0, 40, 30), 10)
            .with_exclusion(Polygon::from_rect(Rect::new(20, 5, 15, 15)));
        let diff = StaticReferenceDiff::new(&scene(), vec![zone], 0).unwrap();
        let changed = with_square(&scene(), Rect::new(25, 10, 5, 5), 160);
        assert!(diff.estimate(&changed).unwrap()[0].map.is_zero());
    }

    #[test]
    fn frame_of_another_shape_is_a_config_error() {
        let zones = vec![Zone::new("all", Rect::new(0, 0, 40, 30), 10)];
        let diff = StaticReferenceDiff::new(&scene(), zones, 0).unwrap();

        let small = Frame::filled(30, 20, ChannelLayout::Gray, 60);
        assert_eq!(
            diff.estimate(&small),
            Err(ConfigError::DimensionMismatch {
                expected: scene().shape(),
                actual: small.shape(),
            })
        );
        let rgb = Frame::filled(40, 30, ChannelLayout::Rgb, 60);
        assert!(matches!(
            diff.estimate_zone(0, &rgb),
            Err(ConfigError::DimensionMismatch { .. })
        ));
        assert_eq!(diff.estimate_zone(1, &scene()), Ok(None));
        assert!(diff.estimate_zone(0, &scene()).unwrap().is_some());
    }

    #[test]
    fn rgb_differences_are_collapsed_with_luma_weights() {
        let reference = Frame::filled(4, 4, ChannelLayout::Rgb, 0);
        let frame = Frame::from_fn(4, 4, ChannelLayout::Rgb, |_, _, c| if c == 1 { 255 } else { 0 });
        let map = absolute_difference(&reference, &frame);
        assert_eq!(map.get(0, 0), 150);
    }

    #[test]
    fn setup_errors() {
        assert_eq!(
            StaticReferenceDiff::new(&scene(), Vec::new(), 0).unwrap_err(),
            ConfigError::EmptyZoneList
        );
        assert_eq!(
            StaticReferenceDiff::new(&Frame::filled(0, 0, ChannelLayout::Gray, 0), vec![], 0).unwrap_err(),
            ConfigError::EmptyReference
        );
        let outside = Zone::new("outside", Rect::new(30, 0, 20, 10), 10);
        assert!(matches!(
            StaticReferenceDiff::new(&scene(), vec![outside], 0),
            Err(ConfigError::ZoneOutOfBounds { .. })
        ));
    }
}
