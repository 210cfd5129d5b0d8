// THEORY:
// A `MotionReport` is the only thing the pipeline hands back to the outside
// world. It is assembled from the accepted candidates of one frame and nothing
// else, so there is no hysteresis: a frame is `MotionDetected` exactly when at
// least one candidate survived filtering somewhere, and `Quiescent` otherwise.

use crate::core_modules::candidate_filter::Candidate;
use crate::core_modules::geometry::Rect;
use crate::core_modules::region_extractor::Contour;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MotionStatus {
    Quiescent,
    MotionDetected,
}

impl MotionStatus {
    fn from_any(detected: bool) -> Self {
        if detected {
            MotionStatus::MotionDetected
        } else {
            MotionStatus::Quiescent
        }
    }
}

impl fmt::Display for MotionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MotionStatus::Quiescent => "quiescent",
            MotionStatus::MotionDetected => "motion-detected",
        })
    }
}

/// Which part of the frame an event was found in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Zone(String),
    Frame,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Zone(name) => write!(f, "zone '{name}'"),
            Scope::Frame => f.write_str("frame"),
        }
    }
}

/// One accepted region of change, in frame coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionEvent {
    pub scope: Scope,
    pub bounding_box: Rect,
    pub contour: Contour,
    pub frame_index: u64,
    /// The measurements the event was accepted on.
    pub area: f64,
    pub fill_ratio: f64,
    pub aspect_ratio: f64,
}

impl MotionEvent {
    pub fn from_candidate(scope: Scope, frame_index: u64, candidate: Candidate) -> Self {
        Self {
            scope,
            bounding_box: candidate.bounding_box,
            contour: candidate.contour,
            frame_index,
            area: candidate.area,
            fill_ratio: candidate.fill_ratio,
            aspect_ratio: candidate.aspect_ratio,
        }
    }
}

/// The verdict for one zone, or for the whole frame in global mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneReport {
    pub scope: Scope,
    pub status: MotionStatus,
    pub events: Vec<MotionEvent>,
}

impl ZoneReport {
    pub fn new(scope: Scope, frame_index: u64, candidates: Vec<Candidate>) -> Self {
        let events: Vec<MotionEvent> = candidates
            .into_iter()
            .map(|c| MotionEvent::from_candidate(scope.clone(), frame_index, c))
            .collect();
        Self {
            status: MotionStatus::from_any(!events.is_empty()),
            scope,
            events,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match &self.scope {
            Scope::Zone(name) => Some(name),
            Scope::Frame => None,
        }
    }
}

/// The outcome of processing one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionReport {
    pub frame_index: u64,
    /// Combined verdict over every zone.
    pub status: MotionStatus,
    pub zones: Vec<ZoneReport>,
    /// Set while an adaptive background model is still warming up.
    pub warming_up: bool,
}

impl MotionReport {
    /// Builds the report from per-scope accepted candidates, keeping scope order.
    pub fn assemble(frame_index: u64, scoped: Vec<(Scope, Vec<Candidate>)>) -> Self {
        let zones: Vec<ZoneReport> = scoped
            .into_iter()
            .map(|(scope, candidates)| ZoneReport::new(scope, frame_index, candidates))
            .collect();
        let detected = zones.iter().any(|z| z.status == MotionStatus::MotionDetected);
        Self {
            frame_index,
            status: MotionStatus::from_any(detected),
            zones,
            warming_up: false,
        }
    }

    pub fn with_warming_up(mut self, warming_up: bool) -> Self {
        self.warming_up = warming_up;
        self
    }

    pub fn is_motion(&self) -> bool {
        self.status == MotionStatus::MotionDetected
    }

    /// Every accepted event, in zone order.
    pub fn events(&self) -> impl Iterator<Item = &MotionEvent> {
        self.zones.iter().flat_map(|z| z.events.iter())
    }

    pub fn event_count(&self) -> usize {
        self.zones.iter().map(|z| z.events.len()).sum()
    }

    pub fn zone(&self, name: &str) -> Option<&ZoneReport> {
        self.zones.iter().find(|z| z.name() == Some(name))
    }
}
