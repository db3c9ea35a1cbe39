//! Orientation correction for sensor frames.
//!
//! Sensors are mounted at a fixed angle relative to the device's natural
//! orientation and front sensors are mirrored. Preview buffers arrive
//! unrotated, so the correction is done in software with an affine transform
//! computed once per session open.

use crate::types::{Facing, Rotation, Size};
use image::{imageops, RgbImage};

/// 2D affine matrix mapping `(x, y)` to
/// `(a*x + b*y + tx, c*x + d*y + ty)`, y axis pointing down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub fn map(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.b * y + self.tx,
            self.c * x + self.d * y + self.ty,
        )
    }

    /// `other` applied after `self`.
    pub fn then(&self, other: &Affine) -> Affine {
        Affine {
            a: other.a * self.a + other.b * self.c,
            b: other.a * self.b + other.b * self.d,
            c: other.c * self.a + other.d * self.c,
            d: other.c * self.b + other.d * self.d,
            tx: other.a * self.tx + other.b * self.ty + other.tx,
            ty: other.c * self.tx + other.d * self.ty + other.ty,
        }
    }

    pub fn post_translate(&self, dx: f64, dy: f64) -> Affine {
        self.then(&Affine {
            tx: dx,
            ty: dy,
            ..Affine::IDENTITY
        })
    }

    /// Clockwise (on screen) rotation by a quarter-turn multiple about `(px, py)`.
    pub fn post_rotate(&self, rotation: Rotation, px: f64, py: f64) -> Affine {
        let (cos, sin) = match rotation {
            Rotation::Deg0 => (1.0, 0.0),
            Rotation::Deg90 => (0.0, 1.0),
            Rotation::Deg180 => (-1.0, 0.0),
            Rotation::Deg270 => (0.0, -1.0),
        };
        let rotate = Affine {
            a: cos,
            b: -sin,
            c: sin,
            d: cos,
            tx: 0.0,
            ty: 0.0,
        };
        self.post_translate(-px, -py)
            .then(&rotate)
            .post_translate(px, py)
    }

    pub fn post_scale(&self, sx: f64, sy: f64, px: f64, py: f64) -> Affine {
        let scale = Affine {
            a: sx,
            d: sy,
            ..Affine::IDENTITY
        };
        self.post_translate(-px, -py)
            .then(&scale)
            .post_translate(px, py)
    }

    pub fn invert(&self) -> Option<Affine> {
        let det = self.a * self.d - self.b * self.c;
        if det == 0.0 {
            return None;
        }
        let a = self.d / det;
        let b = -self.b / det;
        let c = -self.c / det;
        let d = self.a / det;
        Some(Affine {
            a,
            b,
            c,
            d,
            tx: -(a * self.tx + b * self.ty),
            ty: -(c * self.tx + d * self.ty),
        })
    }
}

/// Orientation correction for one negotiated preview size.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    rotation: Rotation,
    flipped: bool,
    matrix: Affine,
    source: Size,
}

impl Transform {
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn is_flipped(&self) -> bool {
        self.flipped
    }

    pub fn dimensions_swapped(&self) -> bool {
        self.rotation.degrees() % 180 == 90
    }

    pub fn matrix(&self) -> &Affine {
        &self.matrix
    }

    /// Size of the corrected image.
    pub fn output_size(&self) -> Size {
        if self.dimensions_swapped() {
            self.source.swapped()
        } else {
            self.source
        }
    }

    pub fn is_identity(&self) -> bool {
        self.rotation == Rotation::Deg0 && !self.flipped
    }

    /// Draw `src` into the pre-allocated `dst` through the matrix.
    ///
    /// Every destination pixel is sampled (nearest neighbour) from the
    /// inverse-mapped source point. Destination pixels whose preimage falls
    /// outside `src` are left untouched.
    pub fn draw_into(&self, src: &RgbImage, dst: &mut RgbImage) {
        if self.is_identity() && src.dimensions() == dst.dimensions() {
            dst.copy_from_slice(src.as_raw());
            return;
        }
        let Some(inverse) = self.matrix.invert() else {
            return;
        };
        let (sw, sh) = (src.width() as f64, src.height() as f64);
        let (dw, dh) = dst.dimensions();
        for y in 0..dh {
            let (mut sx, mut sy) = inverse.map(0.5, y as f64 + 0.5);
            for x in 0..dw {
                if sx >= 0.0 && sy >= 0.0 && sx < sw && sy < sh {
                    let px = *src.get_pixel(sx as u32, sy as u32);
                    dst.put_pixel(x, y, px);
                }
                sx += inverse.a;
                sy += inverse.c;
            }
        }
    }

    /// Apply the rotation and flip to an image of any size, returning a
    /// freshly sized image. Used for captures, which are much larger than
    /// the preview the matrix was computed for.
    pub fn apply_to_new(&self, src: &RgbImage) -> RgbImage {
        let mut out = match self.rotation {
            Rotation::Deg0 => src.clone(),
            Rotation::Deg90 => imageops::rotate90(src),
            Rotation::Deg180 => imageops::rotate180(src),
            Rotation::Deg270 => imageops::rotate270(src),
        };
        if self.flipped {
            imageops::flip_vertical_in_place(&mut out);
        }
        out
    }
}

/// Correction angle for a sensor mounted at `mount` shown on a display
/// rotated by `display`. Front sensors are mirrored, so their angle runs the
/// other way.
pub fn correction_degrees(facing: Facing, mount: Rotation, display: Rotation) -> u32 {
    let (m, d) = (mount.degrees(), display.degrees());
    match facing {
        Facing::Front => (360 - (m + d) % 360) % 360,
        Facing::Back => (m + 360 - d) % 360,
    }
}

/// Compute the preview transform for a device/display combination.
pub fn resolve(facing: Facing, mount: Rotation, display: Rotation, preview: Size) -> Transform {
    let degrees = correction_degrees(facing, mount, display);
    let rotation = Rotation::from_degrees(degrees).unwrap_or_default();
    let (w, h) = (preview.width as i64, preview.height as i64);

    let mut matrix = Affine::IDENTITY;
    if rotation != Rotation::Deg0 {
        matrix = matrix.post_rotate(rotation, (w / 2) as f64, (h / 2) as f64);
        if degrees % 180 == 90 {
            let dx = (w - h) / 2;
            let dy = (h - w) / 2;
            log::debug!("resolve: translate {}, {}", -dx, -dy);
            matrix = matrix.post_translate(-dx as f64, -dy as f64);
        }
    }

    // Front sensors come out mirrored in the natural orientation.
    let flipped = facing == Facing::Front && display == Rotation::Deg0;
    if flipped {
        let (cx, cy) = if degrees % 180 == 0 {
            (w / 2, h / 2)
        } else {
            (h / 2, w / 2)
        };
        matrix = matrix.post_scale(1.0, -1.0, cx as f64, cy as f64);
    }

    log::debug!(
        "resolve: facing={:?} mount={} display={} -> rotate {} flip={}",
        facing,
        mount.degrees(),
        display.degrees(),
        degrees,
        flipped
    );

    Transform {
        rotation,
        flipped,
        matrix,
        source: preview,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn numbered(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, (x * 7 + y) as u8]))
    }

    #[test]
    fn test_truth_table() {
        use Facing::*;
        use Rotation::*;
        // (facing, mount, display) -> (rotation, swapped, flipped)
        let table = [
            (Back, Deg90, Deg0, 90, true, false),
            (Back, Deg90, Deg90, 0, false, false),
            (Back, Deg90, Deg270, 180, false, false),
            (Back, Deg0, Deg90, 270, true, false),
            (Back, Deg270, Deg0, 270, true, false),
            (Front, Deg270, Deg0, 90, true, true),
            (Front, Deg270, Deg90, 0, false, false),
            (Front, Deg90, Deg0, 270, true, true),
            (Front, Deg0, Deg0, 0, false, true),
            (Front, Deg270, Deg180, 270, true, false),
        ];
        for (facing, mount, display, rot, swapped, flipped) in table {
            let t = resolve(facing, mount, display, Size::new(640, 480));
            assert_eq!(t.rotation().degrees(), rot, "{facing:?} {mount:?} {display:?}");
            assert_eq!(t.dimensions_swapped(), swapped, "{facing:?} {mount:?} {display:?}");
            assert_eq!(t.is_flipped(), flipped, "{facing:?} {mount:?} {display:?}");
        }
    }

    #[test]
    fn test_rotated_matrix_maps_frame_onto_swapped_bounds() {
        let t = resolve(Facing::Back, Rotation::Deg90, Rotation::Deg0, Size::new(640, 480));
        assert_eq!(t.output_size(), Size::new(480, 640));
        let m = t.matrix();
        let corners = [(0.0, 0.0), (640.0, 0.0), (0.0, 480.0), (640.0, 480.0)];
        for (x, y) in corners {
            let (mx, my) = m.map(x, y);
            assert!((0.0..=480.0).contains(&mx), "x {mx}");
            assert!((0.0..=640.0).contains(&my), "y {my}");
        }
    }

    #[test]
    fn test_draw_into_matches_imageops_rotation() {
        for (mount, expected) in [
            (Rotation::Deg90, imageops::rotate90::<RgbImage> as fn(&RgbImage) -> RgbImage),
            (Rotation::Deg180, imageops::rotate180::<RgbImage>),
            (Rotation::Deg270, imageops::rotate270::<RgbImage>),
        ] {
            let src = numbered(8, 4);
            let t = resolve(Facing::Back, mount, Rotation::Deg0, Size::new(8, 4));
            let out = t.output_size();
            let mut dst = RgbImage::new(out.width, out.height);
            t.draw_into(&src, &mut dst);
            assert_eq!(dst, expected(&src), "mount {mount:?}");
        }
    }

    #[test]
    fn test_front_camera_flip_matches_apply_to_new() {
        let src = numbered(8, 4);
        let t = resolve(Facing::Front, Rotation::Deg270, Rotation::Deg0, Size::new(8, 4));
        assert!(t.is_flipped());
        let mut dst = RgbImage::new(4, 8);
        t.draw_into(&src, &mut dst);
        assert_eq!(dst, t.apply_to_new(&src));
    }

    #[test]
    fn test_identity_copies() {
        let src = numbered(6, 4);
        let t = resolve(Facing::Back, Rotation::Deg0, Rotation::Deg0, Size::new(6, 4));
        assert!(t.is_identity());
        let mut dst = RgbImage::new(6, 4);
        t.draw_into(&src, &mut dst);
        assert_eq!(dst, src);
    }

    #[test]
    fn test_invert_round_trips() {
        let m = Affine::IDENTITY
            .post_rotate(Rotation::Deg90, 320.0, 240.0)
            .post_translate(-80.0, 80.0)
            .post_scale(1.0, -1.0, 240.0, 320.0);
        let inv = m.invert().unwrap();
        let (x, y) = m.map(17.0, 33.0);
        assert_eq!(inv.map(x, y), (17.0, 33.0));
    }
}
