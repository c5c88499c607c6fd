use crate::{FragmentContext, Mask, PrimitiveType, ShaderError, Vec4, VertexContext};

/// How an attribute buffer is addressed.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum AttribMode {
    /// One tuple per vertex, addressed by the vertex indices of the invocation.
    VertexIndex,
    /// One tuple per primitive, read flat.
    Primitive,
    /// One tuple per vertex, stored in primitive order:
    /// `prim_index * vertices_per_primitive + position_in_primitive`.
    PrimitiveVertex,
}

/// Flat buffer of float tuples with 1 to 4 components each.
#[derive(Clone, Debug, PartialEq)]
struct AttribBuffer {
    data: Vec<f32>,
    components: usize,
}

impl AttribBuffer {
    fn new(data: Vec<f32>, components: usize) -> Result<Self, ShaderError> {
        if !(1..=4).contains(&components) {
            return Err(ShaderError::BadComponentCount(components));
        }
        Ok(Self { data, components })
    }

    #[inline(always)]
    fn tuple(&self, index: usize) -> Option<Vec4> {
        let start = index.checked_mul(self.components)?;
        let end = start.checked_add(self.components)?;
        self.data.get(start..end).map(Vec4::from_slice)
    }
}

/// Per-primitive anchor cache of an [`Interpolator`].
///
/// Lives in the thread-private register file. The cache is only refreshed when the
/// primitive changes, so the fragments of a primitive must reach one cache contiguously
/// for the gather to happen once per primitive. Interleaving primitives stays correct,
/// it only costs a re-gather.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AnchorCache {
    key: Option<(u32, [u32; 3], PrimitiveType)>,
    anchors: [Vec4; 3],
}

impl AnchorCache {
    pub fn invalidate(&mut self) {
        self.key = None;
    }
}

/// Vertex attribute interpolator: feeds fragment programs with per-vertex or
/// per-primitive data interpolated across the primitive.
#[derive(Clone, Debug, PartialEq)]
pub struct Interpolator {
    buffer: AttribBuffer,
    mode: AttribMode,
    normalize: bool,
}

impl Interpolator {
    pub fn new(data: impl Into<Vec<f32>>, components: usize, mode: AttribMode) -> Result<Self, ShaderError> {
        Ok(Self {
            buffer: AttribBuffer::new(data.into(), components)?,
            mode,
            normalize: false,
        })
    }

    /// Renormalize the interpolated 2- or 3-component vector.
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn components(&self) -> usize {
        self.buffer.components
    }

    pub fn mode(&self) -> AttribMode {
        self.mode
    }

    /// Lanes populated by [`Interpolator::lerp`].
    pub fn mask(&self) -> Mask {
        Mask::first(self.buffer.components)
    }

    /// Value of the attribute at the given fragment.
    ///
    /// Returns `None` when an index falls outside the buffer or the perspective
    /// denominator is degenerate; the caller treats that as no contribution.
    pub fn lerp(&self, frag: &FragmentContext, cache: &mut AnchorCache) -> Option<Vec4> {
        let mut value = match self.mode {
            AttribMode::Primitive => self.buffer.tuple(frag.prim_index as usize)?,
            AttribMode::VertexIndex | AttribMode::PrimitiveVertex => {
                let count = frag.ptype.vertex_count();
                let key = (frag.prim_index, frag.vertex_index, frag.ptype);

                if cache.key != Some(key) {
                    cache.key = None;
                    for slot in 0..count {
                        let index = match self.mode {
                            AttribMode::VertexIndex => frag.vertex_index[slot] as usize,
                            _ => (frag.prim_index as usize).checked_mul(count)?.checked_add(slot)?,
                        };
                        cache.anchors[slot] = self.buffer.tuple(index)?;
                    }
                    cache.key = Some(key);
                }

                if frag.persp_denom == 0.0 || !frag.persp_denom.is_finite() {
                    return None;
                }

                let mut sum = Vec4::ZERO;
                for slot in 0..count {
                    let w = frag.bc[slot];
                    sum = sum.zip(cache.anchors[slot], |acc, a| acc + a * w);
                }
                sum.map(|v| v / frag.persp_denom)
            }
        };

        if self.normalize && self.buffer.components >= 2 {
            value.normalize(self.buffer.components.min(3));
        }

        Some(value)
    }
}

/// Vertex attribute: per-vertex data read without interpolation, for vertex programs.
#[derive(Clone, Debug, PartialEq)]
pub struct VertexAttrib {
    buffer: AttribBuffer,
    mode: AttribMode,
    normalize: bool,
}

impl VertexAttrib {
    pub fn new(data: impl Into<Vec<f32>>, components: usize, mode: AttribMode) -> Result<Self, ShaderError> {
        Ok(Self {
            buffer: AttribBuffer::new(data.into(), components)?,
            mode,
            normalize: false,
        })
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn components(&self) -> usize {
        self.buffer.components
    }

    pub fn mask(&self) -> Mask {
        Mask::first(self.buffer.components)
    }

    /// Value of the attribute for the given vertex, `None` when out of range.
    pub fn read(&self, vert: &VertexContext) -> Option<Vec4> {
        let index = match self.mode {
            AttribMode::VertexIndex => vert.vertex_index as usize,
            AttribMode::Primitive => vert.prim_index as usize,
            AttribMode::PrimitiveVertex => (vert.prim_index as usize)
                .checked_mul(vert.ptype.vertex_count())?
                .checked_add(vert.vertex_index_in_prim as usize)?,
        };

        let mut value = self.buffer.tuple(index)?;
        if self.normalize && self.buffer.components >= 2 {
            value.normalize(self.buffer.components.min(3));
        }
        Some(value)
    }
}
