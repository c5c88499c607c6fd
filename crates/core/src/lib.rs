//! Core data model of the fragment/vertex interpreter: values and swizzle masks,
//! invocation contexts, the instruction set, programs and attribute interpolators.

mod attrib;
mod color;
mod context;
mod error;
mod op;
mod program;
mod resource;
mod value;

pub use attrib::{AnchorCache, AttribMode, Interpolator, VertexAttrib};
pub use color::{ColorMatrix, ColorModel, ColorTransform};
pub use context::{FragmentContext, FragmentOutput, PrimitiveType, Stage, VertexContext};
pub use error::ShaderError;
pub use op::{
    AttribId, Builtin, Cmp, Dst, Func, InterpId, Instruction, JumpTarget, MatrixId, OpKind, SlotId, Source, Src,
    Target, TextureId,
};
pub use program::{Arg, Program, ProgramId, Registers, UniformSource, VarDecl, jump_index};
pub use resource::{Matrix4, SolidTexture, Texture, Transform};
pub use value::{Mask, Operand, Value, Vec4};
