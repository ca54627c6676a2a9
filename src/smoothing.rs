//! Frame-to-frame landmark state.
//!
//! Face landmarks are smoothed with a per-coordinate exponential moving
//! average. Hands are not smoothed: each frame replaces them wholesale.

use std::sync::Arc;
use tracing::{trace, warn};

use crate::landmarks::{FaceLandmarks, HandLandmarks};
use crate::tracking::Observation;

/// Weight given to the newest observation each frame.
pub const SMOOTHING_FACTOR: f32 = 0.2;

/// Owns the smoothed face state.
#[derive(Debug, Default)]
pub struct FaceSmoother {
    current: Option<FaceLandmarks>,
}

impl FaceSmoother {
    pub fn new() -> Self {
        Self { current: None }
    }

    pub fn current(&self) -> Option<&FaceLandmarks> {
        self.current.as_ref()
    }

    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Advance the state with this frame's raw face (or its absence).
    ///
    /// No face clears the state; there is no hold across a detection gap.
    pub fn update(&mut self, raw: Option<&FaceLandmarks>) -> Option<&FaceLandmarks> {
        self.current = match (self.current.take(), raw) {
            (_, None) => None,
            (None, Some(raw)) => Some(raw.clone()),
            (Some(prev), Some(raw)) if prev.len() != raw.len() => {
                warn!(
                    "Face topology changed ({} -> {} points), resetting smoothing",
                    prev.len(),
                    raw.len()
                );
                Some(raw.clone())
            }
            (Some(prev), Some(raw)) => Some(prev.blended(raw, SMOOTHING_FACTOR)),
        };

        self.current.as_ref()
    }
}

/// Landmarks the render step works from. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct TrackingSnapshot {
    pub face: Option<Arc<FaceLandmarks>>,
    pub hands: Arc<Vec<HandLandmarks>>,
}

impl TrackingSnapshot {
    /// Neither a face nor a hand is tracked.
    pub fn is_empty(&self) -> bool {
        self.face.is_none() && self.hands.is_empty()
    }
}

/// Turns raw detector observations into render snapshots.
#[derive(Debug, Default)]
pub struct Tracker {
    face: FaceSmoother,
    latest: TrackingSnapshot,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, observation: &Observation) -> TrackingSnapshot {
        let face = self.face.update(observation.face.as_ref()).cloned().map(Arc::new);
        trace!(
            "Tracking face: {}, hands: {}",
            face.is_some(),
            observation.hands.len()
        );

        self.latest = TrackingSnapshot {
            face,
            hands: Arc::new(observation.hands.clone()),
        };
        self.latest.clone()
    }

    pub fn latest(&self) -> &TrackingSnapshot {
        &self.latest
    }

    pub fn reset(&mut self) {
        self.face.reset();
        self.latest = TrackingSnapshot::default();
    }
}
