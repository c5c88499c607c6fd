use crate::{ColorModel, Mask, Operand, Stage};

/// Index of a variable slot in a program's register file.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SlotId(pub u16);

/// Index of a texture handle in a program.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct TextureId(pub u16);

/// Index of a matrix handle in a program.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct MatrixId(pub u16);

/// Index of an attribute interpolator in a program.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct InterpId(pub u16);

/// Index of a vertex attribute in a program.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct AttribId(pub u16);

/// Built-in identifiers, bound to fields of the invocation context.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Builtin {
    /// `fragColor` / `fragRGBA`, writes an RGB fragment.
    FragRgba,
    /// `fragYUVA`, writes a YUV fragment.
    FragYuva,
    FragX,
    FragY,
    FragZ,
    FragDepth,
    /// `fragW`, the perspective denominator.
    FragW,
    /// `txCoord`, screen position normalized by the surface size.
    TexCoord,
    /// `txCoordi`, screen position in pixels.
    TexCoordScreen,
    FragOdd,
    PrimIdx,
    /// `vertex`, input position.
    Vertex,
    /// `vertexOut`, output position.
    VertexOut,
    VertexIdx,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "fragColor" | "fragRGBA" => Builtin::FragRgba,
            "fragYUVA" => Builtin::FragYuva,
            "fragX" => Builtin::FragX,
            "fragY" => Builtin::FragY,
            "fragZ" => Builtin::FragZ,
            "fragDepth" => Builtin::FragDepth,
            "fragW" => Builtin::FragW,
            "txCoord" => Builtin::TexCoord,
            "txCoordi" => Builtin::TexCoordScreen,
            "fragOdd" => Builtin::FragOdd,
            "primIdx" => Builtin::PrimIdx,
            "vertex" => Builtin::Vertex,
            "vertexOut" => Builtin::VertexOut,
            "vertexIdx" => Builtin::VertexIdx,
            _ => return None,
        })
    }

    /// Stage the identifier belongs to, `None` if shared.
    pub fn stage(self) -> Option<Stage> {
        match self {
            Builtin::PrimIdx => None,
            Builtin::Vertex | Builtin::VertexOut | Builtin::VertexIdx => Some(Stage::Vertex),
            _ => Some(Stage::Fragment),
        }
    }

    pub fn is_writable(self) -> bool {
        matches!(
            self,
            Builtin::FragRgba | Builtin::FragYuva | Builtin::FragDepth | Builtin::VertexOut
        )
    }

    /// Whether the identifier is a vector (as opposed to a scalar).
    pub fn is_vector(self) -> bool {
        matches!(
            self,
            Builtin::FragRgba
                | Builtin::FragYuva
                | Builtin::TexCoord
                | Builtin::TexCoordScreen
                | Builtin::Vertex
                | Builtin::VertexOut
        )
    }
}

/// Comparison applied per active lane, reduced with a logical AND.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Cmp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Cmp {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "<" => Cmp::Lt,
            "<=" => Cmp::Le,
            ">" => Cmp::Gt,
            ">=" => Cmp::Ge,
            "==" => Cmp::Eq,
            "!=" => Cmp::Ne,
            _ => return None,
        })
    }

    #[inline(always)]
    pub fn test(self, a: f32, b: f32) -> bool {
        match self {
            Cmp::Lt => a < b,
            Cmp::Le => a <= b,
            Cmp::Gt => a > b,
            Cmp::Ge => a >= b,
            Cmp::Eq => a == b,
            Cmp::Ne => a != b,
        }
    }
}

/// Math builtins.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Func {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Exp,
    Log,
    Exp2,
    Log2,
    Floor,
    Ceil,
    Fract,
    Sign,
    Abs,
    Sqrt,
    InverseSqrt,
    Normalize,
    Length,

    Pow,
    Mod,
    Min,
    Max,
    Atan2,
    Clamp,
    Distance,
    Dot,
    Cross,
}

impl Func {
    pub fn from_name(name: &str) -> Option<Self> {
        use Func::*;
        Some(match name {
            "sin" => Sin,
            "cos" => Cos,
            "tan" => Tan,
            "asin" => Asin,
            "acos" => Acos,
            "atan" => Atan,
            "exp" => Exp,
            "log" => Log,
            "exp2" => Exp2,
            "log2" => Log2,
            "floor" => Floor,
            "ceil" => Ceil,
            "fract" => Fract,
            "sign" => Sign,
            "abs" => Abs,
            "sqrt" => Sqrt,
            "inversesqrt" => InverseSqrt,
            "normalize" => Normalize,
            "length" => Length,
            "pow" => Pow,
            "mod" => Mod,
            "min" => Min,
            "max" => Max,
            "atan2" => Atan2,
            "clamp" => Clamp,
            "distance" => Distance,
            "dot" => Dot,
            "cross" => Cross,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        use Func::*;
        match self {
            Sin => "sin",
            Cos => "cos",
            Tan => "tan",
            Asin => "asin",
            Acos => "acos",
            Atan => "atan",
            Exp => "exp",
            Log => "log",
            Exp2 => "exp2",
            Log2 => "log2",
            Floor => "floor",
            Ceil => "ceil",
            Fract => "fract",
            Sign => "sign",
            Abs => "abs",
            Sqrt => "sqrt",
            InverseSqrt => "inversesqrt",
            Normalize => "normalize",
            Length => "length",
            Pow => "pow",
            Mod => "mod",
            Min => "min",
            Max => "max",
            Atan2 => "atan2",
            Clamp => "clamp",
            Distance => "distance",
            Dot => "dot",
            Cross => "cross",
        }
    }

    /// Number of source operands.
    pub fn arity(self) -> usize {
        use Func::*;
        match self {
            Pow | Mod | Min | Max | Atan2 | Clamp | Distance | Dot | Cross => 2,
            _ => 1,
        }
    }

    /// Builtins that read whole vectors regardless of swizzle.
    pub fn is_geometric(self) -> bool {
        matches!(self, Func::Normalize | Func::Length | Func::Distance | Func::Dot | Func::Cross)
    }
}

/// Absolute jump target of a `goto`, 0-based once resolved.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum JumpTarget {
    Index(usize),
    /// 1-based index read from a uniform at run time.
    Uniform(SlotId),
}

/// Operation kind, with its kind-specific payload.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OpKind {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    /// `dst = src <cmp> src2`, produces a bool.
    Compare(Cmp),
    /// `if dst <cmp> src`.
    If(Cmp),
    ElseIf(Cmp),
    Else,
    End,
    Goto(JumpTarget),
    Discard,
    /// `dst = texture(src.x, src.y)`.
    Sampler(TextureId, ColorModel),
    Call(Func),
    ToYuv,
    ToRgb,
    Print,
}

impl OpKind {
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Assign => "=",
            OpKind::Add => "+=",
            OpKind::Sub => "-=",
            OpKind::Mul => "*=",
            OpKind::Div => "/=",
            OpKind::Compare(_) => "compare",
            OpKind::If(_) => "if",
            OpKind::ElseIf(_) => "elseif",
            OpKind::Else => "else",
            OpKind::End => "end",
            OpKind::Goto(_) => "goto",
            OpKind::Discard => "discard",
            OpKind::Sampler(_, ColorModel::Rgb) => "sampler",
            OpKind::Sampler(_, ColorModel::Yuv) => "samplerYUV",
            OpKind::Call(f) => f.name(),
            OpKind::ToYuv => "toYUV",
            OpKind::ToRgb => "toRGB",
            OpKind::Print => "print",
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(
            self,
            OpKind::If(_) | OpKind::ElseIf(_) | OpKind::Else | OpKind::End | OpKind::Goto(_)
        )
    }
}

/// What a destination reference points at.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Target {
    Builtin(Builtin),
    Var(SlotId),
}

/// Destination reference. `mask == None` means the whole target.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct Dst {
    pub target: Target,
    pub mask: Option<Mask>,
}

/// What a source reference reads from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Source {
    Builtin(Builtin),
    Var(SlotId),
    Literal(Operand),
    Matrix(MatrixId),
    Interp(InterpId),
    Attrib(AttribId),
}

/// Source reference. `mask == None` means every lane the source exposes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Src {
    pub source: Source,
    pub mask: Option<Mask>,
}

/// One interpreter instruction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Instruction {
    pub op: OpKind,
    pub dst: Option<Dst>,
    pub src: Option<Src>,
    /// Second source: the right-hand side of a comparison, or the second argument of a
    /// two-operand builtin, which is always a variable slot.
    pub src2: Option<Src>,
}
