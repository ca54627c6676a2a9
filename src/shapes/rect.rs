use super::point::Point;

/// Axis aligned draw rectangle, stored by its top-left corner.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn from_tl(x: f32, y: f32, w: f32, h: f32) -> Rect {
        Rect { x, y, w, h }
    }

    pub fn from_center(xc: f32, yc: f32, w: f32, h: f32) -> Rect {
        Rect {
            x: xc - w / 2.,
            y: yc - h / 2.,
            w,
            h,
        }
    }

    /// Centered horizontally on `anchor`, extending downward from it.
    pub fn top_centered(anchor: Point, w: f32, h: f32) -> Rect {
        Rect {
            x: anchor.x - w / 2.,
            y: anchor.y,
            w,
            h,
        }
    }

    pub fn left(&self) -> f32 {
        self.x
    }
    pub fn top(&self) -> f32 {
        self.y
    }

    /// Pixel extent rounded for rasterization, never smaller than 1x1.
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            self.w.round().max(1.) as u32,
            self.h.round().max(1.) as u32,
        )
    }
}
