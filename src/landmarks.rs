//! Landmark sets reported by the external face/hand detector.
//!
//! Index meaning is a contract with the detector's mesh topology. Raw
//! indices stay in this module; everything else goes through the named
//! accessors on [`FaceLandmarks`] and [`HandLandmarks`].

use serde::{Deserialize, Serialize};

use crate::error::TrackingError;
use crate::shapes::Point;

pub const FACE_LANDMARK_COUNT: usize = 468;
pub const HAND_LANDMARK_COUNT: usize = 21;

const LEFT_EAR_IDX: usize = 132;
const CHIN_IDX: usize = 152;
const RIGHT_EAR_IDX: usize = 361;

const WRIST_IDX: usize = 0;
const MIDDLE_KNUCKLE_IDX: usize = 9;
const RING_JOINT_IDX: usize = 14;

/// Normalized detector point: x, y in [0, 1] relative to the frame, z is
/// relative depth.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "RawLandmark")]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLandmark {
    Array([f32; 3]),
    Object {
        x: f32,
        y: f32,
        #[serde(default)]
        z: f32,
    },
}

impl From<RawLandmark> for Landmark {
    fn from(raw: RawLandmark) -> Landmark {
        match raw {
            RawLandmark::Array([x, y, z]) => Landmark { x, y, z },
            RawLandmark::Object { x, y, z } => Landmark { x, y, z },
        }
    }
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Landmark {
        Landmark { x, y, z }
    }

    /// Map into pixel space of a `width` x `height` surface.
    pub fn to_pixel(&self, width: f32, height: f32) -> Point {
        Point::new(self.x * width, self.y * height)
    }

    /// Exponential blend toward `newest`, weighting it by `alpha`.
    pub fn blend(&self, newest: &Landmark, alpha: f32) -> Landmark {
        Landmark {
            x: self.x * (1. - alpha) + newest.x * alpha,
            y: self.y * (1. - alpha) + newest.y * alpha,
            z: self.z * (1. - alpha) + newest.z * alpha,
        }
    }
}

pub type LandmarkSet = Vec<Landmark>;

/// Face mesh landmarks, at least [`FACE_LANDMARK_COUNT`] points.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceLandmarks(LandmarkSet);

impl TryFrom<LandmarkSet> for FaceLandmarks {
    type Error = TrackingError;

    fn try_from(points: LandmarkSet) -> Result<Self, Self::Error> {
        if points.len() < FACE_LANDMARK_COUNT {
            return Err(TrackingError::Topology {
                kind: "face",
                actual: points.len(),
                expected: FACE_LANDMARK_COUNT,
            });
        }
        Ok(FaceLandmarks(points))
    }
}

impl FaceLandmarks {
    pub fn points(&self) -> &[Landmark] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Blend every point toward the matching point of `newest`. Callers must
    /// make sure both sets share a topology.
    pub(crate) fn blended(&self, newest: &FaceLandmarks, alpha: f32) -> FaceLandmarks {
        FaceLandmarks(
            self.0
                .iter()
                .zip(newest.0.iter())
                .map(|(prev, new)| prev.blend(new, alpha))
                .collect(),
        )
    }

    pub fn left_ear_anchor(&self) -> Landmark {
        self.0[LEFT_EAR_IDX]
    }

    pub fn right_ear_anchor(&self) -> Landmark {
        self.0[RIGHT_EAR_IDX]
    }

    pub fn chin(&self) -> Landmark {
        self.0[CHIN_IDX]
    }
}

/// Hand landmarks, exactly [`HAND_LANDMARK_COUNT`] points.
#[derive(Debug, Clone, PartialEq)]
pub struct HandLandmarks(LandmarkSet);

impl TryFrom<LandmarkSet> for HandLandmarks {
    type Error = TrackingError;

    fn try_from(points: LandmarkSet) -> Result<Self, Self::Error> {
        if points.len() != HAND_LANDMARK_COUNT {
            return Err(TrackingError::Topology {
                kind: "hand",
                actual: points.len(),
                expected: HAND_LANDMARK_COUNT,
            });
        }
        Ok(HandLandmarks(points))
    }
}

impl HandLandmarks {
    pub fn points(&self) -> &[Landmark] {
        &self.0
    }

    pub fn wrist(&self) -> Landmark {
        self.0[WRIST_IDX]
    }

    pub fn middle_knuckle(&self) -> Landmark {
        self.0[MIDDLE_KNUCKLE_IDX]
    }

    pub fn ring_joint(&self) -> Landmark {
        self.0[RING_JOINT_IDX]
    }
}
