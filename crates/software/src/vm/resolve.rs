use super::{BuiltinMut, Invocation};
use fragvm_core::{Builtin, Dst, Mask, Operand, Program, Registers, Source, Src, Target, Value};

/// Lanes a built-in exposes when read without a swizzle.
#[inline(always)]
fn builtin_lanes(builtin: Builtin) -> Mask {
    match builtin {
        Builtin::TexCoord | Builtin::TexCoordScreen => Mask::XY,
        _ => Mask::XYZQ,
    }
}

/// Reads a source operand.
///
/// `None` means the source yields no value for this invocation (an attribute read out
/// of range, or a matrix, which is not a plain operand).
#[inline(always)]
pub fn read_src<I: Invocation>(src: &Src, program: &Program, inv: &I, regs: &mut Registers) -> Option<Operand> {
    match src.source {
        Source::Builtin(b) => Some(inv.builtin(b).operand(src.mask.unwrap_or(builtin_lanes(b)))),
        Source::Var(slot) => Some(regs.var(slot)?.operand(src.mask.unwrap_or(Mask::XYZQ))),
        Source::Literal(value) => Some(value),
        Source::Interp(id) => {
            let interp = program.interpolator(id)?;
            let v = inv.interpolate(interp, regs.anchor_mut(id)?)?;
            Some(Operand::Vec(v, src.mask.unwrap_or(interp.mask())))
        }
        Source::Attrib(id) => {
            let attrib = program.attrib(id)?;
            let v = inv.attribute(attrib)?;
            Some(Operand::Vec(v, src.mask.unwrap_or(attrib.mask())))
        }
        Source::Matrix(_) => None,
    }
}

/// Current value behind a destination reference.
#[inline(always)]
pub fn read_dst<I: Invocation>(dst: &Dst, inv: &I, regs: &Registers) -> Value {
    match dst.target {
        Target::Builtin(b) => inv.builtin(b),
        Target::Var(slot) => regs.var(slot).copied().unwrap_or_default(),
    }
}

/// A destination read as the left operand of a condition.
#[inline(always)]
pub fn read_dst_operand<I: Invocation>(dst: &Dst, inv: &I, regs: &Registers) -> Operand {
    let lanes = match dst.target {
        Target::Builtin(b) => builtin_lanes(b),
        Target::Var(_) => Mask::XYZQ,
    };
    read_dst(dst, inv, regs).operand(dst.mask.unwrap_or(lanes))
}

/// Stores a value through a destination reference.
#[inline(always)]
pub fn write_dst<I: Invocation>(dst: &Dst, inv: &mut I, regs: &mut Registers, value: Value) {
    match dst.target {
        Target::Builtin(b) => match inv.builtin_mut(b) {
            Some(BuiltinMut::Vec(v)) => *v = value.as_vec4(),
            Some(BuiltinMut::Scalar(s)) => *s = value.as_f32(),
            None => {}
        },
        Target::Var(slot) => {
            if let Some(var) = regs.var_mut(slot) {
                *var = value;
            }
        }
    }
}
