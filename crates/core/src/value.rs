use bitflags::bitflags;
use std::ops::{Index, IndexMut};

/// A 4-lane float register. Lanes are named `x`, `y`, `z`, `q` (or `r`, `g`, `b`, `a`).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub q: f32,
}

impl Vec4 {
    pub const ZERO: Self = Self::splat(0.0);
    pub const ONE: Self = Self::splat(1.0);

    pub const fn new(x: f32, y: f32, z: f32, q: f32) -> Self {
        Self { x, y, z, q }
    }

    pub const fn splat(v: f32) -> Self {
        Self { x: v, y: v, z: v, q: v }
    }

    /// Builds a vector from up to 4 floats, missing lanes are zero.
    pub fn from_slice(values: &[f32]) -> Self {
        let mut out = Self::ZERO;
        for (i, v) in values.iter().take(4).enumerate() {
            out[i] = *v;
        }
        out
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.x, self.y, self.z, self.q]
    }

    pub fn map(self, mut f: impl FnMut(f32) -> f32) -> Self {
        Self::new(f(self.x), f(self.y), f(self.z), f(self.q))
    }

    pub fn zip(self, other: Self, mut f: impl FnMut(f32, f32) -> f32) -> Self {
        Self::new(f(self.x, other.x), f(self.y, other.y), f(self.z, other.z), f(self.q, other.q))
    }

    pub fn dot3(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn length3(self) -> f32 {
        self.dot3(self).sqrt()
    }

    pub fn cross3(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
            self.q,
        )
    }

    /// Renormalizes the first `lanes` components (2 or 3) in place.
    ///
    /// A zero-length vector is left as is, so no NaN ever leaks out.
    pub fn normalize(&mut self, lanes: usize) {
        let lanes = lanes.clamp(1, 3);
        let len = (0..lanes).map(|i| self[i] * self[i]).sum::<f32>().sqrt();
        if len > 0.0 && len.is_finite() {
            for i in 0..lanes {
                self[i] /= len;
            }
        }
    }
}

impl Index<usize> for Vec4 {
    type Output = f32;

    #[inline(always)]
    fn index(&self, lane: usize) -> &f32 {
        match lane {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            3 => &self.q,
            _ => panic!("lane {lane} out of range"),
        }
    }
}

impl IndexMut<usize> for Vec4 {
    #[inline(always)]
    fn index_mut(&mut self, lane: usize) -> &mut f32 {
        match lane {
            0 => &mut self.x,
            1 => &mut self.y,
            2 => &mut self.z,
            3 => &mut self.q,
            _ => panic!("lane {lane} out of range"),
        }
    }
}

impl From<[f32; 4]> for Vec4 {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

bitflags! {
    /// Swizzle mask: which of the 4 lanes an operand reads or writes.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Mask: u8 {
        const X = 0b0001;
        const Y = 0b0010;
        const Z = 0b0100;
        const Q = 0b1000;

        const XY = Self::X.bits() | Self::Y.bits();
        const XYZ = Self::XY.bits() | Self::Z.bits();
        const XYZQ = Self::XYZ.bits() | Self::Q.bits();
    }
}

impl Mask {
    /// Parses a swizzle suffix (`xy`, `rgb`, `q`, ...).
    ///
    /// Letters may come in any order but each lane at most once.
    pub fn parse(suffix: &str) -> Option<Self> {
        if suffix.is_empty() || suffix.len() > 4 {
            return None;
        }

        let mut mask = Mask::empty();
        for c in suffix.chars() {
            let lane = match c {
                'x' | 'r' | 's' => Mask::X,
                'y' | 'g' | 't' => Mask::Y,
                'z' | 'b' | 'p' => Mask::Z,
                'q' | 'w' | 'a' => Mask::Q,
                _ => return None,
            };

            if mask.contains(lane) {
                return None;
            }
            mask |= lane;
        }

        Some(mask)
    }

    /// Mask of the first `n` lanes.
    pub fn first(n: usize) -> Self {
        Mask::from_bits_truncate(((1u32 << n.min(4)) - 1) as u8)
    }

    /// Active lanes, ascending (X before Y before Z before Q).
    #[inline(always)]
    pub fn lanes(self) -> impl Iterator<Item = usize> {
        (0..4).filter(move |i| self.bits() & (1 << i) != 0)
    }

    pub fn lane_count(self) -> usize {
        self.bits().count_ones() as usize
    }

    pub fn is_full(self) -> bool {
        self == Mask::XYZQ
    }
}

/// Value held by a variable slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec(Vec4),
}

impl Default for Value {
    fn default() -> Self {
        Value::Float(0.0)
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Float(_) => "float",
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Vec(_) => "vec4",
        }
    }

    /// Float view of the value, first lane for vectors.
    pub fn as_f32(&self) -> f32 {
        match *self {
            Value::Float(v) => v,
            Value::Int(v) => v as f32,
            Value::Bool(v) => v as i32 as f32,
            Value::Vec(v) => v.x,
        }
    }

    /// Vector view of the value, scalars land in `x` with the other lanes zeroed.
    pub fn as_vec4(&self) -> Vec4 {
        match *self {
            Value::Vec(v) => v,
            _ => Vec4::new(self.as_f32(), 0.0, 0.0, 0.0),
        }
    }

    /// Reads the value as a right-hand operand under a swizzle mask.
    ///
    /// Scalars ignore the mask.
    pub fn operand(&self, mask: Mask) -> Operand {
        match *self {
            Value::Float(v) => Operand::Float(v),
            Value::Int(v) => Operand::Int(v),
            Value::Bool(v) => Operand::Bool(v),
            Value::Vec(v) => Operand::Vec(v, mask),
        }
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Vec4> for Value {
    fn from(v: Vec4) -> Self {
        Value::Vec(v)
    }
}

impl From<[f32; 4]> for Value {
    fn from(v: [f32; 4]) -> Self {
        Value::Vec(v.into())
    }
}

/// A resolved right-hand value together with its component type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Operand {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec(Vec4, Mask),
}

impl Operand {
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Operand::Vec(..))
    }

    /// Scalar float view; int and bool convert implicitly, vectors yield their first active lane.
    pub fn scalar(&self) -> f32 {
        match *self {
            Operand::Float(v) => v,
            Operand::Int(v) => v as f32,
            Operand::Bool(v) => v as i32 as f32,
            Operand::Vec(v, mask) => mask.lanes().next().map(|i| v[i]).unwrap_or(0.0),
        }
    }

    /// Active lanes packed in ascending order, and how many there are.
    /// A scalar is a single lane.
    #[inline(always)]
    pub fn packed(&self) -> ([f32; 4], usize) {
        match *self {
            Operand::Vec(v, mask) => {
                let mut out = [0.0; 4];
                let mut n = 0;
                for lane in mask.lanes() {
                    out[n] = v[lane];
                    n += 1;
                }
                (out, n)
            }
            _ => ([self.scalar(); 4], 1),
        }
    }

    /// Full vector view ignoring the swizzle; scalars are broadcast.
    pub fn full(&self) -> Vec4 {
        match *self {
            Operand::Vec(v, _) => v,
            _ => Vec4::splat(self.scalar()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Operand::Float(_) => "float",
            Operand::Int(_) => "int",
            Operand::Bool(_) => "bool",
            Operand::Vec(..) => "vector",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_parse() {
        assert_eq!(Mask::parse("xy"), Some(Mask::XY));
        assert_eq!(Mask::parse("rgba"), Some(Mask::XYZQ));
        assert_eq!(Mask::parse("zx"), Some(Mask::X | Mask::Z));
        assert_eq!(Mask::parse("w"), Some(Mask::Q));
        assert_eq!(Mask::parse("xx"), None);
        assert_eq!(Mask::parse("xyzqa"), None);
        assert_eq!(Mask::parse("k"), None);
        assert_eq!(Mask::parse(""), None);
    }

    #[test]
    fn mask_lanes_ascending() {
        let lanes: Vec<_> = Mask::parse("qx").unwrap().lanes().collect();
        assert_eq!(lanes, vec![0, 3]);
        assert_eq!(Mask::first(3), Mask::XYZ);
        assert_eq!(Mask::first(0), Mask::empty());
    }

    #[test]
    fn operand_packing() {
        let op = Operand::Vec(Vec4::new(1.0, 2.0, 3.0, 4.0), Mask::Y | Mask::Q);
        assert_eq!(op.packed(), ([2.0, 4.0, 0.0, 0.0], 2));
        assert_eq!(Operand::Int(3).packed(), ([3.0; 4], 1));
        assert_eq!(Operand::Bool(true).scalar(), 1.0);
    }

    #[test]
    fn normalize_zero_is_zero() {
        let mut v = Vec4::ZERO;
        v.normalize(3);
        assert_eq!(v, Vec4::ZERO);

        let mut v = Vec4::new(3.0, 4.0, 0.0, 7.0);
        v.normalize(2);
        assert_eq!(v, Vec4::new(0.6, 0.8, 0.0, 7.0));
    }
}
