use crate::foundation::error::{StructuresError, StructuresResult};

pub use kurbo::{Affine, Point, Vec2};

/// Pixel dimensions of a drawing surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> StructuresResult<Self> {
        if width == 0 || height == 0 {
            return Err(StructuresError::validation(
                "surface width/height must be > 0",
            ));
        }
        Ok(Self { width, height })
    }

    pub fn center(self) -> Point {
        Point::new(f64::from(self.width) / 2.0, f64::from(self.height) / 2.0)
    }
}

/// Premultiplied RGBA8 (r,g,b already multiplied by a).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rgba8Premul {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8Premul {
    pub fn from_straight_rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        fn premul(c: u8, a: u8) -> u8 {
            let c = u16::from(c);
            let a = u16::from(a);
            (((c * a) + 127) / 255) as u8
        }

        Self {
            r: premul(r, a),
            g: premul(g, a),
            b: premul(b, a),
            a,
        }
    }

    /// Opaque gray level, the way the background is specified.
    pub fn gray(level: u8) -> Self {
        Self {
            r: level,
            g: level,
            b: level,
            a: 255,
        }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_size_rejects_zero_and_reports_center() {
        assert!(SurfaceSize::new(0, 10).is_err());
        let s = SurfaceSize::new(1920, 1080).unwrap();
        assert_eq!(s.center(), Point::new(960.0, 540.0));
    }

    #[test]
    fn straight_to_premul_rounds() {
        let p = Rgba8Premul::from_straight_rgba(100, 50, 200, 128);
        assert_eq!(
            p.to_array(),
            [
                ((100u16 * 128 + 127) / 255) as u8,
                ((50u16 * 128 + 127) / 255) as u8,
                ((200u16 * 128 + 127) / 255) as u8,
                128
            ]
        );
        assert_eq!(Rgba8Premul::gray(24).to_array(), [24, 24, 24, 255]);
    }
}
