//! Maps tracked landmarks to accessory draw operations.
//!
//! Everything here is a pure function of the tracking snapshot, the surface
//! size and the natural size of each committed image. Accessory sizes come
//! from fixed per-kind scale factors; they do not follow subject distance.

use serde::{Deserialize, Serialize};
use std::f32::consts::FRAC_PI_2;
use tracing::{Level, span, trace};

use crate::accessory::{AccessoryKind, AccessorySlots};
use crate::landmarks::{FaceLandmarks, HandLandmarks};
use crate::shapes::{Point, Rect};
use crate::smoothing::TrackingSnapshot;

/// Empirically tuned offsets and scales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Horizontal push away from the face for each ear anchor (px)
    pub ear_offset_x: f32,
    /// Vertical shift of both ear anchors (px)
    pub ear_offset_y: f32,
    pub neck_offset_x: f32,
    pub neck_offset_y: f32,
    pub earring_scale: f32,
    pub necklace_scale: f32,
    pub bracelet_scale: f32,
    pub ring_scale: f32,
    /// Added to the forearm angle; bracelet art is drawn pointing up
    pub bracelet_angle_offset: f32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            ear_offset_x: 6.,
            ear_offset_y: -16.,
            neck_offset_x: -8.,
            neck_offset_y: 10.,
            earring_scale: 0.07,
            necklace_scale: 0.18,
            bracelet_scale: 0.15,
            ring_scale: 0.05,
            bracelet_angle_offset: FRAC_PI_2,
        }
    }
}

/// One accessory draw. The image itself is looked up from the slots when
/// the op is executed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawOp {
    Image {
        kind: AccessoryKind,
        rect: Rect,
    },
    /// Image of size `w` x `h` centered on `center`, rotated by `theta`
    /// radians about that center.
    Rotated {
        kind: AccessoryKind,
        center: Point,
        w: f32,
        h: f32,
        theta: f32,
    },
}

impl DrawOp {
    pub fn kind(&self) -> AccessoryKind {
        match self {
            DrawOp::Image { kind, .. } | DrawOp::Rotated { kind, .. } => *kind,
        }
    }
}

/// Pixel-space anchors derived from one hand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandAnchors {
    pub wrist: Point,
    pub knuckle: Point,
    pub ring_joint: Point,
    /// Angle of the wrist to middle knuckle vector
    pub angle: f32,
}

#[derive(Debug, Clone, Default)]
pub struct PlacementEngine {
    config: PlacementConfig,
}

impl PlacementEngine {
    pub fn new(config: PlacementConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    pub fn left_ear(&self, face: &FaceLandmarks, width: f32, height: f32) -> Point {
        face.left_ear_anchor()
            .to_pixel(width, height)
            .offset(-self.config.ear_offset_x, self.config.ear_offset_y)
    }

    pub fn right_ear(&self, face: &FaceLandmarks, width: f32, height: f32) -> Point {
        face.right_ear_anchor()
            .to_pixel(width, height)
            .offset(self.config.ear_offset_x, self.config.ear_offset_y)
    }

    pub fn neck(&self, face: &FaceLandmarks, width: f32, height: f32) -> Point {
        face.chin()
            .to_pixel(width, height)
            .offset(self.config.neck_offset_x, self.config.neck_offset_y)
    }

    pub fn hand_anchors(&self, hand: &HandLandmarks, width: f32, height: f32) -> HandAnchors {
        let wrist = hand.wrist().to_pixel(width, height);
        let knuckle = hand.middle_knuckle().to_pixel(width, height);
        let ring_joint = hand.ring_joint().to_pixel(width, height);

        HandAnchors {
            wrist,
            knuckle,
            ring_joint,
            angle: wrist.angle_to(&knuckle),
        }
    }

    /// Draw operations for the current frame, in paint order.
    pub fn place(
        &self,
        tracking: &TrackingSnapshot,
        width: u32,
        height: u32,
        slots: &AccessorySlots,
    ) -> Vec<DrawOp> {
        let span = span!(Level::DEBUG, "place");
        let _guard = span.enter();

        let (w, h) = (width as f32, height as f32);
        let mut ops = Vec::new();

        if let Some(face) = &tracking.face {
            if let Some(size) = scaled(slots, AccessoryKind::Earring, self.config.earring_scale) {
                for anchor in [self.left_ear(face, w, h), self.right_ear(face, w, h)] {
                    ops.push(DrawOp::Image {
                        kind: AccessoryKind::Earring,
                        rect: Rect::top_centered(anchor, size.0, size.1),
                    });
                }
            }

            if let Some(size) = scaled(slots, AccessoryKind::Necklace, self.config.necklace_scale) {
                ops.push(DrawOp::Image {
                    kind: AccessoryKind::Necklace,
                    rect: Rect::top_centered(self.neck(face, w, h), size.0, size.1),
                });
            }
        }

        let bracelet = scaled(slots, AccessoryKind::Bracelet, self.config.bracelet_scale);
        let ring = scaled(slots, AccessoryKind::Ring, self.config.ring_scale);

        for hand in tracking.hands.iter() {
            let anchors = self.hand_anchors(hand, w, h);
            trace!("Hand anchors: {anchors:?}");

            if let Some((bw, bh)) = bracelet {
                ops.push(DrawOp::Rotated {
                    kind: AccessoryKind::Bracelet,
                    center: anchors.wrist,
                    w: bw,
                    h: bh,
                    theta: anchors.angle + self.config.bracelet_angle_offset,
                });
            }

            if let Some((rw, rh)) = ring {
                ops.push(DrawOp::Image {
                    kind: AccessoryKind::Ring,
                    rect: Rect::from_center(anchors.ring_joint.x, anchors.ring_joint.y, rw, rh),
                });
            }
        }

        ops
    }
}

/// Natural image size times `scale`, if the slot holds an image.
fn scaled(slots: &AccessorySlots, kind: AccessoryKind, scale: f32) -> Option<(f32, f32)> {
    slots
        .get(kind)
        .map(|img| (img.width() as f32 * scale, img.height() as f32 * scale))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::Landmark;
    use crate::landmarks::fixtures::{face_with, hand_with};
    use image::RgbaImage;
    use std::sync::Arc;

    const W: u32 = 640;
    const H: u32 = 480;

    fn slots_with(kinds: &[(AccessoryKind, u32, u32)]) -> AccessorySlots {
        let mut slots = AccessorySlots::default();
        for (kind, w, h) in kinds {
            slots.set(*kind, Arc::new(RgbaImage::new(*w, *h)));
        }
        slots
    }

    fn face_snapshot() -> TrackingSnapshot {
        let face = face_with(
            Landmark::new(0.5, 0.5, 0.),
            &[
                (132, Landmark::new(0.3, 0.45, 0.)),
                (361, Landmark::new(0.7, 0.46, 0.)),
                (152, Landmark::new(0.5, 0.8, 0.)),
            ],
        );
        TrackingSnapshot {
            face: Some(Arc::new(face)),
            hands: Arc::new(Vec::new()),
        }
    }

    #[test]
    fn test_earring_anchors() {
        let engine = PlacementEngine::default();
        let snap = face_snapshot();
        let face = snap.face.as_ref().unwrap();

        let left = engine.left_ear(face, W as f32, H as f32);
        let right = engine.right_ear(face, W as f32, H as f32);

        assert_eq!(left, Point::new(0.3 * 640. - 6., 0.45 * 480. - 16.));
        assert_eq!(right, Point::new(0.7 * 640. + 6., 0.46 * 480. - 16.));
    }

    #[test]
    fn test_face_ops() {
        let engine = PlacementEngine::default();
        let slots = slots_with(&[
            (AccessoryKind::Earring, 200, 400),
            (AccessoryKind::Necklace, 1000, 500),
        ]);

        let ops = engine.place(&face_snapshot(), W, H, &slots);
        assert_eq!(ops.len(), 3);

        let ew = 200. * 0.07;
        let eh = 400. * 0.07;
        let left = Point::new(0.3 * 640. - 6., 0.45 * 480. - 16.);
        assert_eq!(
            ops[0],
            DrawOp::Image {
                kind: AccessoryKind::Earring,
                rect: Rect::from_tl(left.x - ew / 2., left.y, ew, eh),
            }
        );

        let nw = 1000. * 0.18;
        let nh = 500. * 0.18;
        let neck = Point::new(0.5 * 640. - 8., 0.8 * 480. + 10.);
        assert_eq!(
            ops[2],
            DrawOp::Image {
                kind: AccessoryKind::Necklace,
                rect: Rect::from_tl(neck.x - nw / 2., neck.y, nw, nh),
            }
        );
    }

    #[test]
    fn test_empty_slots_draw_nothing() {
        let engine = PlacementEngine::default();
        let mut snap = face_snapshot();
        snap.hands = Arc::new(vec![hand_with(
            Landmark::new(0.5, 0.5, 0.),
            Landmark::new(0.6, 0.5, 0.),
            Landmark::new(0.6, 0.6, 0.),
        )]);

        assert!(engine.place(&snap, W, H, &AccessorySlots::default()).is_empty());
    }

    #[test]
    fn test_tiara_is_never_placed() {
        let engine = PlacementEngine::default();
        let slots = slots_with(&[(AccessoryKind::Tiara, 100, 100)]);
        assert!(engine.place(&face_snapshot(), W, H, &slots).is_empty());
    }

    #[test]
    fn test_hand_angle_horizontal() {
        let engine = PlacementEngine::default();
        let hand = hand_with(
            Landmark::new(0., 0., 0.),
            Landmark::new(1. / 640., 0., 0.),
            Landmark::new(0., 0., 0.),
        );

        let anchors = engine.hand_anchors(&hand, W as f32, H as f32);
        assert_eq!(anchors.angle, 0.);
    }

    #[test]
    fn test_bracelet_and_ring_per_hand() {
        let engine = PlacementEngine::default();
        let hand = |x: f32| {
            hand_with(
                Landmark::new(x, 0.5, 0.),
                Landmark::new(x, 0.25, 0.),
                Landmark::new(x + 0.05, 0.3, 0.),
            )
        };
        let snap = TrackingSnapshot {
            face: None,
            hands: Arc::new(vec![hand(0.25), hand(0.75)]),
        };
        let slots = slots_with(&[
            (AccessoryKind::Bracelet, 400, 200),
            (AccessoryKind::Ring, 100, 100),
            (AccessoryKind::Earring, 100, 100),
        ]);

        let ops = engine.place(&snap, W, H, &slots);
        let kinds: Vec<AccessoryKind> = ops.iter().map(DrawOp::kind).collect();
        assert_eq!(
            kinds,
            vec![
                AccessoryKind::Bracelet,
                AccessoryKind::Ring,
                AccessoryKind::Bracelet,
                AccessoryKind::Ring,
            ]
        );

        match ops[0] {
            DrawOp::Rotated {
                center, w, h, theta, ..
            } => {
                assert_eq!(center, Point::new(0.25 * 640., 0.5 * 480.));
                assert_eq!((w, h), (400. * 0.15, 200. * 0.15));
                // knuckle straight above the wrist: -pi/2, plus the quarter turn
                assert!(theta.abs() < 1e-6);
            }
            other => panic!("expected rotated bracelet, got {other:?}"),
        }

        let ring_center = Point::new((0.25 + 0.05) * 640., 0.3 * 480.);
        assert_eq!(
            ops[1],
            DrawOp::Image {
                kind: AccessoryKind::Ring,
                rect: Rect::from_center(ring_center.x, ring_center.y, 100. * 0.05, 100. * 0.05),
            }
        );
    }
}
