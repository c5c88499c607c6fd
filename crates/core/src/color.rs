use crate::Vec4;
use std::fmt::Debug;

/// Color model of a sampler read or a fragment output.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ColorModel {
    Rgb,
    Yuv,
}

/// Color-space transform used by `toYUV`/`toRGB`.
///
/// Only the first three lanes are converted, callers keep the 4th lane untouched.
pub trait ColorTransform: Debug + Send + Sync {
    fn rgb_to_yuv(&self, rgb: Vec4) -> Vec4;
    fn yuv_to_rgb(&self, yuv: Vec4) -> Vec4;
}

/// A 3x4 color matrix (3x3 coefficients plus offset column), row major.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorMatrix {
    pub to_yuv: [[f32; 4]; 3],
    pub to_rgb: [[f32; 4]; 3],
}

impl ColorMatrix {
    /// Full range BT.601.
    pub const BT601: Self = Self {
        to_yuv: [
            [0.299, 0.587, 0.114, 0.0],
            [-0.168736, -0.331264, 0.5, 0.5],
            [0.5, -0.418688, -0.081312, 0.5],
        ],
        to_rgb: [
            [1.0, 0.0, 1.402, -0.701],
            [1.0, -0.344136, -0.714136, 0.529136],
            [1.0, 1.772, 0.0, -0.886],
        ],
    };

    /// Full range BT.709.
    pub const BT709: Self = Self {
        to_yuv: [
            [0.2126, 0.7152, 0.0722, 0.0],
            [-0.114572, -0.385428, 0.5, 0.5],
            [0.5, -0.454153, -0.045847, 0.5],
        ],
        to_rgb: [
            [1.0, 0.0, 1.5748, -0.7874],
            [1.0, -0.187324, -0.468124, 0.327724],
            [1.0, 1.8556, 0.0, -0.9278],
        ],
    };

    fn apply(m: &[[f32; 4]; 3], v: Vec4) -> Vec4 {
        let row = |r: &[f32; 4]| r[0] * v.x + r[1] * v.y + r[2] * v.z + r[3];
        Vec4::new(row(&m[0]), row(&m[1]), row(&m[2]), v.q)
    }
}

impl Default for ColorMatrix {
    fn default() -> Self {
        Self::BT601
    }
}

impl ColorTransform for ColorMatrix {
    fn rgb_to_yuv(&self, rgb: Vec4) -> Vec4 {
        Self::apply(&self.to_yuv, rgb)
    }

    fn yuv_to_rgb(&self, yuv: Vec4) -> Vec4 {
        Self::apply(&self.to_rgb, yuv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec4, b: Vec4) -> bool {
        a.to_array().iter().zip(b.to_array()).all(|(a, b)| (a - b).abs() < 1e-3)
    }

    #[test]
    fn bt601_roundtrip_keeps_alpha() {
        let cmx = ColorMatrix::BT601;
        let rgb = Vec4::new(0.2, 0.7, 0.4, 0.3);
        let yuv = cmx.rgb_to_yuv(rgb);
        assert_eq!(yuv.q, 0.3);
        assert!(close(cmx.yuv_to_rgb(yuv), rgb));
    }

    #[test]
    fn white_is_neutral_chroma() {
        let yuv = ColorMatrix::BT709.rgb_to_yuv(Vec4::ONE);
        assert!(close(yuv, Vec4::new(1.0, 0.5, 0.5, 1.0)));
    }
}
