use crate::Vec4;

/// Which invocation unit a program runs for.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Stage {
    Fragment,
    Vertex,
}

/// Topology of the primitive enclosing an invocation.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub enum PrimitiveType {
    Points,
    Lines,
    #[default]
    Triangles,
}

impl PrimitiveType {
    /// Number of anchor vertices per primitive.
    pub fn vertex_count(self) -> usize {
        match self {
            PrimitiveType::Points => 1,
            PrimitiveType::Lines => 2,
            PrimitiveType::Triangles => 3,
        }
    }
}

/// Validity and color model of a fragment's output.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub enum FragmentOutput {
    #[default]
    Invalid,
    Rgb,
    Yuv,
}

/// Per-pixel invocation record, owned by the rasterizer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FragmentContext {
    /// Screen position of the pixel.
    pub x: f32,
    pub y: f32,
    /// Window-space z.
    pub z: f32,
    /// Interpolated depth; the program may overwrite it.
    pub depth: f32,
    /// Perspective-divide denominator (1/w of the fragment).
    pub persp_denom: f32,
    /// Perspective-corrected barycentric weights. Lines only use the first two.
    pub bc: [f32; 3],
    pub prim_index: u32,
    /// Vertex indices of the enclosing primitive in the vertex buffer.
    pub vertex_index: [u32; 3],
    pub ptype: PrimitiveType,
    /// Odd/even line flag for interlaced output.
    pub odd: bool,
    /// Output color, RGBA or YUVA depending on `output`.
    pub color: Vec4,
    pub output: FragmentOutput,
    /// Size of the target surface, used to normalize texture coordinates.
    pub surface: [u32; 2],
}

impl FragmentContext {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            z: 0.0,
            depth: 0.0,
            persp_denom: 1.0,
            bc: [1.0, 0.0, 0.0],
            prim_index: 0,
            vertex_index: [0, 1, 2],
            ptype: PrimitiveType::Triangles,
            odd: (y as i64) & 1 != 0,
            color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            output: FragmentOutput::Invalid,
            surface: [1, 1],
        }
    }

    /// Sets the barycentric weights and derives the perspective denominator from their sum.
    pub fn with_barycentric(mut self, bc: [f32; 3]) -> Self {
        self.bc = bc;
        self.persp_denom = match self.ptype {
            PrimitiveType::Points => bc[0],
            PrimitiveType::Lines => bc[0] + bc[1],
            PrimitiveType::Triangles => bc[0] + bc[1] + bc[2],
        };
        self
    }

    pub fn with_primitive(mut self, ptype: PrimitiveType, prim_index: u32, vertex_index: [u32; 3]) -> Self {
        self.ptype = ptype;
        self.prim_index = prim_index;
        self.vertex_index = vertex_index;
        self
    }

    pub fn with_surface(mut self, width: u32, height: u32) -> Self {
        self.surface = [width, height];
        self
    }

    pub fn is_valid(&self) -> bool {
        self.output != FragmentOutput::Invalid
    }

    /// Output color clamped and quantized to 8 bits per lane.
    pub fn rgba8(&self) -> [u8; 4] {
        fn quantize(v: f32) -> u8 {
            if v.is_nan() { 0 } else { (v.clamp(0.0, 1.0) * 255.0).round() as u8 }
        }

        let c = self.color;
        [quantize(c.x), quantize(c.y), quantize(c.z), quantize(c.q)]
    }
}

/// Per-vertex invocation record.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VertexContext {
    pub in_vertex: Vec4,
    /// Written by the program; starts as a copy of `in_vertex`.
    pub out_vertex: Vec4,
    pub prim_index: u32,
    pub vertex_index: u32,
    pub vertex_index_in_prim: u32,
    pub ptype: PrimitiveType,
}

impl VertexContext {
    pub fn new(in_vertex: Vec4) -> Self {
        Self {
            in_vertex,
            out_vertex: in_vertex,
            prim_index: 0,
            vertex_index: 0,
            vertex_index_in_prim: 0,
            ptype: PrimitiveType::Triangles,
        }
    }

    pub fn with_index(mut self, prim_index: u32, vertex_index: u32, vertex_index_in_prim: u32) -> Self {
        self.prim_index = prim_index;
        self.vertex_index = vertex_index;
        self.vertex_index_in_prim = vertex_index_in_prim;
        self
    }
}
