use crate::{ColorModel, Vec4};
use std::fmt::Debug;

/// A texture that sampler instructions read from.
///
/// Sampling is owned by the host; coordinates are in the space the program passes
/// (normalized or screen, depending on which built-in coordinate it reads).
pub trait Texture: Debug + Send + Sync {
    fn sample(&self, x: f32, y: f32, model: ColorModel) -> Vec4;
}

/// An opaque read-only matrix applied by `mul` instructions.
pub trait Transform: Debug + Send + Sync {
    fn apply(&self, v: Vec4) -> Vec4;
}

/// Column-major 4x4 matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix4(pub [f32; 16]);

impl Matrix4 {
    pub const IDENTITY: Self = Self([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    pub fn translation(x: f32, y: f32, z: f32) -> Self {
        let mut m = Self::IDENTITY;
        m.0[12] = x;
        m.0[13] = y;
        m.0[14] = z;
        m
    }

    pub fn scale(x: f32, y: f32, z: f32) -> Self {
        let mut m = Self::IDENTITY;
        m.0[0] = x;
        m.0[5] = y;
        m.0[10] = z;
        m
    }
}

impl Transform for Matrix4 {
    fn apply(&self, v: Vec4) -> Vec4 {
        let m = &self.0;
        let row = |r: usize| m[r] * v.x + m[4 + r] * v.y + m[8 + r] * v.z + m[12 + r] * v.q;
        Vec4::new(row(0), row(1), row(2), row(3))
    }
}

/// Texture returning a single color everywhere.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolidTexture(pub Vec4);

impl Texture for SolidTexture {
    fn sample(&self, _: f32, _: f32, _: ColorModel) -> Vec4 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_point() {
        let m = Matrix4::translation(1.0, 2.0, 3.0);
        assert_eq!(m.apply(Vec4::new(1.0, 1.0, 1.0, 1.0)), Vec4::new(2.0, 3.0, 4.0, 1.0));
        // directions ignore translation
        assert_eq!(m.apply(Vec4::new(1.0, 1.0, 1.0, 0.0)), Vec4::new(1.0, 1.0, 1.0, 0.0));
    }
}
