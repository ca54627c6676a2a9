use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use tracing::{Level, span, trace};

use crate::accessory::AccessorySlots;
use crate::placement::DrawOp;
use crate::shapes::{Point, Rect};

/// 2D drawing target sized to the video frame.
pub trait RenderSurface {
    fn size(&self) -> (u32, u32);

    fn draw_image(&mut self, img: &RgbaImage, rect: Rect);

    /// Draw `img` scaled to `w` x `h`, centered on `center` and rotated by
    /// `theta` radians (clockwise in image space) about its own center.
    fn draw_image_rotated(&mut self, img: &RgbaImage, center: Point, w: f32, h: f32, theta: f32);
}

/// CPU render surface over an RGBA frame buffer.
pub struct Canvas {
    img: RgbaImage,
}

impl Canvas {
    pub fn new(img: RgbaImage) -> Self {
        Self { img }
    }

    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(RgbaImage::new(width, height))
    }

    pub fn image(&self) -> &RgbaImage {
        &self.img
    }

    pub fn into_image(self) -> RgbaImage {
        self.img
    }
}

impl RenderSurface for Canvas {
    fn size(&self) -> (u32, u32) {
        self.img.dimensions()
    }

    fn draw_image(&mut self, img: &RgbaImage, rect: Rect) {
        let (w, h) = rect.pixel_size();
        let scaled = imageops::resize(img, w, h, FilterType::Triangle);
        imageops::overlay(
            &mut self.img,
            &scaled,
            rect.left().round() as i64,
            rect.top().round() as i64,
        );
    }

    fn draw_image_rotated(&mut self, img: &RgbaImage, center: Point, w: f32, h: f32, theta: f32) {
        let (w, h) = Rect::from_tl(0., 0., w, h).pixel_size();
        let scaled = imageops::resize(img, w, h, FilterType::Triangle);

        // Pad to the diagonal so no corner is clipped by the rotation
        let side = (w as f32).hypot(h as f32).ceil() as u32;
        let mut padded = RgbaImage::new(side, side);
        imageops::overlay(
            &mut padded,
            &scaled,
            ((side - w) / 2) as i64,
            ((side - h) / 2) as i64,
        );

        let rotated = rotate_about_center(
            &padded,
            theta,
            Interpolation::Bilinear,
            Rgba([0, 0, 0, 0]),
        );
        let half = side as f32 / 2.;
        imageops::overlay(
            &mut self.img,
            &rotated,
            (center.x - half).round() as i64,
            (center.y - half).round() as i64,
        );
    }
}

/// Execute `ops` against `surface`, skipping any op whose slot is empty.
pub fn draw_all<S: RenderSurface + ?Sized>(
    surface: &mut S,
    ops: &[DrawOp],
    slots: &AccessorySlots,
) {
    let span = span!(Level::DEBUG, "draw");
    let _guard = span.enter();

    for op in ops {
        let Some(img) = slots.get(op.kind()) else {
            trace!("No image for {}, skipping", op.kind());
            continue;
        };

        match *op {
            DrawOp::Image { rect, .. } => surface.draw_image(img, rect),
            DrawOp::Rotated {
                center, w, h, theta, ..
            } => surface.draw_image_rotated(img, center, w, h, theta),
        }
    }
}
