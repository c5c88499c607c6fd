use super::{
    Invocation,
    alu::{self, Arith},
    resolve::{read_dst, read_dst_operand, read_src, write_dst},
};
use fragvm_core::{
    Cmp, FragmentContext, Func, Instruction, JumpTarget, Mask, OpKind, Operand, Program, Registers, ShaderError,
    Source, VertexContext, jump_index,
};
use tracing::debug;

/// Runs a fragment program for one pixel.
///
/// Returns the validity of the fragment: `false` when the program is not runnable,
/// discarded the fragment, or never wrote a color.
#[inline]
pub fn execute_fragment(program: &Program, ctx: &mut FragmentContext, regs: &mut Registers) -> bool {
    if !program.is_runnable() {
        return false;
    }
    run(program, ctx, regs) && ctx.is_valid()
}

/// Runs a vertex program for one vertex. On `true` the output position is in `ctx.out_vertex`.
#[inline]
pub fn execute_vertex(program: &Program, ctx: &mut VertexContext, regs: &mut Registers) -> bool {
    if !program.is_runnable() {
        return false;
    }
    run(program, ctx, regs)
}

#[inline(always)]
fn run<I: Invocation>(program: &Program, inv: &mut I, regs: &mut Registers) -> bool {
    if program.has_branches() {
        run_branching(program, inv, regs)
    } else {
        run_linear(program, inv, regs)
    }
}

/// Branch-free path: one pass over the instructions, no level bookkeeping.
#[inline(always)]
fn run_linear<I: Invocation>(program: &Program, inv: &mut I, regs: &mut Registers) -> bool {
    for ins in program.instructions() {
        if !step(ins, program, inv, regs) {
            return false;
        }
    }
    true
}

/// Nesting counters of the branching path.
#[derive(Debug, Default)]
struct Levels {
    /// Entered blocks whose branch is executing.
    taken: usize,
    /// Depth of not-taken blocks being skipped.
    skip: usize,
    /// The outermost skipped block already ran one of its branches, so its
    /// remaining `elseif`/`else` stay skipped.
    done: bool,
}

impl Levels {
    #[inline(always)]
    fn enter(&mut self, cond: bool) {
        if cond {
            self.taken += 1;
        } else {
            self.skip = 1;
            self.done = false;
        }
    }

    /// Leaves the executing branch for the rest of its block.
    #[inline(always)]
    fn close(&mut self) {
        self.taken = self.taken.saturating_sub(1);
        self.skip = 1;
        self.done = true;
    }

    #[inline(always)]
    fn open(&mut self) {
        self.skip = 0;
        self.taken += 1;
    }
}

/// Instructions an invocation may execute per instruction of its program. Only
/// backward jumps can reach it.
const STEPS_PER_INSTRUCTION: usize = 1024;

fn run_branching<I: Invocation>(program: &Program, inv: &mut I, regs: &mut Registers) -> bool {
    let ops = program.instructions();
    let limit = ops.len().saturating_mul(STEPS_PER_INSTRUCTION);
    let mut levels = Levels::default();
    let mut pc = 0;
    let mut steps = 0;

    while let Some(ins) = ops.get(pc) {
        pc += 1;
        steps += 1;
        if steps > limit {
            program.invalidate(&ShaderError::StepLimit { limit });
            inv.discard();
            return false;
        }

        match ins.op {
            OpKind::If(cmp) => {
                if levels.skip > 0 {
                    levels.skip += 1;
                } else {
                    levels.enter(condition(cmp, ins, program, inv, regs));
                }
            }
            OpKind::ElseIf(cmp) => match levels.skip {
                0 => levels.close(),
                1 if !levels.done => {
                    if condition(cmp, ins, program, inv, regs) {
                        levels.open();
                    }
                }
                _ => {}
            },
            OpKind::Else => match levels.skip {
                0 => levels.close(),
                1 if !levels.done => levels.open(),
                _ => {}
            },
            OpKind::End => {
                if levels.skip > 0 {
                    levels.skip -= 1;
                    if levels.skip == 0 {
                        levels.done = false;
                    }
                } else {
                    levels.taken = levels.taken.saturating_sub(1);
                }
            }

            _ if levels.skip > 0 => {}

            OpKind::Goto(target) => {
                let index = match target {
                    JumpTarget::Index(i) => Some(i),
                    JumpTarget::Uniform(slot) => {
                        jump_index(&regs.var(slot).copied().unwrap_or_default(), ops.len())
                    }
                };

                match index {
                    Some(i) if i < ops.len() => pc = i,
                    _ => {
                        let target = match target {
                            JumpTarget::Index(i) => i as i64 + 1,
                            JumpTarget::Uniform(slot) => regs.var(slot).map_or(0, |v| v.as_f32() as i64),
                        };
                        program.invalidate(&ShaderError::BadJumpTarget {
                            target,
                            len: ops.len(),
                        });
                        inv.discard();
                        return false;
                    }
                }
            }

            _ => {
                if !step(ins, program, inv, regs) {
                    return false;
                }
            }
        }
    }

    true
}

#[inline(always)]
fn condition<I: Invocation>(cmp: Cmp, ins: &Instruction, program: &Program, inv: &I, regs: &mut Registers) -> bool {
    let (Some(dst), Some(src)) = (&ins.dst, &ins.src) else {
        return false;
    };
    let lhs = read_dst_operand(dst, inv, regs);
    match read_src(src, program, inv, regs) {
        Some(rhs) => alu::compare(cmp, lhs, rhs),
        None => false,
    }
}

/// Executes one non-branch instruction. Returns `false` when the invocation ends here.
#[inline(always)]
fn step<I: Invocation>(ins: &Instruction, program: &Program, inv: &mut I, regs: &mut Registers) -> bool {
    let arith = match ins.op {
        OpKind::Assign => Arith::Assign,
        OpKind::Add => Arith::Add,
        OpKind::Sub => Arith::Sub,
        OpKind::Mul => Arith::Mul,
        OpKind::Div => Arith::Div,

        OpKind::Discard => {
            inv.discard();
            return false;
        }

        OpKind::Compare(cmp) => {
            if let (Some(dst), Some(a), Some(b)) = (&ins.dst, &ins.src, &ins.src2) {
                if let (Some(a), Some(b)) = (read_src(a, program, inv, regs), read_src(b, program, inv, regs)) {
                    let old = read_dst(dst, inv, regs);
                    let value = alu::combine(Arith::Assign, old, dst.mask, Operand::Bool(alu::compare(cmp, a, b)));
                    write_dst(dst, inv, regs, value);
                }
            }
            return true;
        }

        OpKind::Call(func) => {
            call(func, ins, program, inv, regs);
            return true;
        }

        OpKind::Sampler(texture, model) => {
            let (Some(dst), Some(src), Some(texture)) = (&ins.dst, &ins.src, program.texture(texture)) else {
                return true;
            };
            if let Some(coords) = read_src(src, program, inv, regs) {
                let (c, n) = coords.packed();
                let texel = texture.sample(c[0], if n > 1 { c[1] } else { c[0] }, model);
                let old = read_dst(dst, inv, regs);
                let value = alu::combine(Arith::Assign, old, dst.mask, Operand::Vec(texel, Mask::XYZQ));
                write_dst(dst, inv, regs, value);
            }
            return true;
        }

        OpKind::ToYuv | OpKind::ToRgb => {
            let (Some(dst), Some(src)) = (&ins.dst, &ins.src) else {
                return true;
            };
            if let Some(color) = read_src(src, program, inv, regs) {
                let color = color.full();
                let converted = match ins.op {
                    OpKind::ToYuv => program.color_transform().rgb_to_yuv(color),
                    _ => program.color_transform().yuv_to_rgb(color),
                };
                // the 4th lane is never touched
                let mask = dst.mask.unwrap_or(Mask::XYZQ) & Mask::XYZ;
                let old = read_dst(dst, inv, regs);
                let value = alu::combine(Arith::Assign, old, Some(mask), Operand::Vec(converted, Mask::XYZ));
                write_dst(dst, inv, regs, value);
            }
            return true;
        }

        OpKind::Print => {
            if let Some(src) = &ins.src {
                let [x, y] = inv.position();
                match read_src(src, program, inv, regs) {
                    Some(value) => debug!(target: "fragvm::print", x = x, y = y, value = ?value, "print"),
                    None => debug!(target: "fragvm::print", x = x, y = y, "print: no value"),
                }
            }
            return true;
        }

        OpKind::If(_) | OpKind::ElseIf(_) | OpKind::Else | OpKind::End | OpKind::Goto(_) => return true,
    };

    let (Some(dst), Some(src)) = (&ins.dst, &ins.src) else {
        return true;
    };

    if let Source::Matrix(id) = src.source {
        if let Some(matrix) = program.matrix(id) {
            let old = read_dst(dst, inv, regs);
            write_dst(dst, inv, regs, alu::transform(old, dst.mask, |v| matrix.apply(v)));
        }
        return true;
    }

    if let Some(src) = read_src(src, program, inv, regs) {
        let old = read_dst(dst, inv, regs);
        write_dst(dst, inv, regs, alu::combine(arith, old, dst.mask, src));
    }
    true
}

#[inline(always)]
fn call<I: Invocation>(func: Func, ins: &Instruction, program: &Program, inv: &mut I, regs: &mut Registers) {
    let (Some(dst), Some(src)) = (&ins.dst, &ins.src) else {
        return;
    };
    let Some(a) = read_src(src, program, inv, regs) else {
        return;
    };
    let b = match &ins.src2 {
        Some(src2) => match read_src(src2, program, inv, regs) {
            Some(b) => Some(b),
            None => return,
        },
        None => None,
    };

    let old = read_dst(dst, inv, regs);
    let value = match func {
        Func::Clamp => match b {
            Some(b) => alu::clamp(old, dst.mask, a, b),
            None => return,
        },
        _ => match alu::call(func, a, b) {
            Some(result) => alu::combine(Arith::Assign, old, dst.mask, result),
            None => return,
        },
    };
    write_dst(dst, inv, regs, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use fragvm_core::{Arg, FragmentOutput, Value, Vec4};
    use pretty_assertions::assert_eq;

    fn run_frag(program: &mut Program, x: f32) -> (bool, FragmentContext) {
        let mut ctx = FragmentContext::new(x, 0.0);
        let valid = program.with_registers(|p, regs| execute_fragment(p, &mut ctx, regs));
        (valid, ctx)
    }

    #[test]
    fn unsealed_program_refuses_to_run() {
        let mut program = Program::fragment();
        program.push("=", ["fragColor".into(), Arg::from(1.0)]).unwrap();
        let (valid, ctx) = run_frag(&mut program, 0.0);
        assert!(!valid);
        assert_eq!(ctx.output, FragmentOutput::Invalid);
    }

    #[test]
    fn nested_branches() {
        let mut program = Program::fragment();
        program.push("if", ["fragX".into(), ">".into(), Arg::from(0.0)]).unwrap();
        program.push("if", ["fragX".into(), ">".into(), Arg::from(10.0)]).unwrap();
        program.push("=", ["fragColor".into(), Arg::from(3.0)]).unwrap();
        program.push("else", []).unwrap();
        program.push("=", ["fragColor".into(), Arg::from(2.0)]).unwrap();
        program.push("end", []).unwrap();
        program.push("else", []).unwrap();
        program.push("=", ["fragColor".into(), Arg::from(1.0)]).unwrap();
        program.push("end", []).unwrap();
        program.seal().unwrap();

        assert_eq!(run_frag(&mut program, 20.0).1.color, Vec4::splat(3.0));
        assert_eq!(run_frag(&mut program, 5.0).1.color, Vec4::splat(2.0));
        assert_eq!(run_frag(&mut program, -5.0).1.color, Vec4::splat(1.0));
    }

    #[test]
    fn elseif_chain_takes_first_match() {
        let mut program = Program::fragment();
        program.push("if", ["fragX".into(), "<".into(), Arg::from(1.0)]).unwrap();
        program.push("=", ["fragColor".into(), Arg::from(1.0)]).unwrap();
        program.push("elseif", ["fragX".into(), "<".into(), Arg::from(2.0)]).unwrap();
        program.push("=", ["fragColor".into(), Arg::from(2.0)]).unwrap();
        program.push("elseif", ["fragX".into(), "<".into(), Arg::from(3.0)]).unwrap();
        program.push("=", ["fragColor".into(), Arg::from(3.0)]).unwrap();
        program.push("else", []).unwrap();
        program.push("=", ["fragColor".into(), Arg::from(4.0)]).unwrap();
        program.push("end", []).unwrap();
        program.seal().unwrap();

        for (x, expected) in [(0.5, 1.0), (1.5, 2.0), (2.5, 3.0), (3.5, 4.0)] {
            assert_eq!(run_frag(&mut program, x).1.color, Vec4::splat(expected), "x = {x}");
        }
    }

    #[test]
    fn goto_skips_forward() {
        let mut program = Program::fragment();
        program.push("=", ["fragColor".into(), Arg::from(1.0)]).unwrap();
        program.push("goto", [Arg::from(4)]).unwrap();
        program.push("=", ["fragColor".into(), Arg::from(0.0)]).unwrap();
        program.push("+=", ["fragColor.x".into(), Arg::from(1.0)]).unwrap();
        program.seal().unwrap();

        let (valid, ctx) = run_frag(&mut program, 0.0);
        assert!(valid);
        assert_eq!(ctx.color, Vec4::new(2.0, 1.0, 1.0, 1.0));
    }

    #[test]
    fn backward_goto_loops() {
        let mut program = Program::fragment();
        program.push("=", ["n".into(), Arg::from(0.0)]).unwrap();
        program.push("+=", ["n".into(), Arg::from(1.0)]).unwrap();
        program.push("if", ["n".into(), "<".into(), Arg::from(10.0)]).unwrap();
        program.push("goto", [Arg::from(2)]).unwrap();
        program.push("end", []).unwrap();
        program.push("=", ["fragColor.x".into(), "n".into()]).unwrap();
        program.seal().unwrap();

        let (valid, ctx) = run_frag(&mut program, 0.0);
        assert!(valid);
        assert_eq!(ctx.color.x, 10.0);
    }

    #[test]
    fn endless_loop_is_cut_off() {
        let mut program = Program::fragment();
        program.push("=", ["fragColor".into(), Arg::from(1.0)]).unwrap();
        program.push("goto", [Arg::from(2)]).unwrap();
        program.seal().unwrap();

        let (valid, ctx) = run_frag(&mut program, 0.0);
        assert!(!valid);
        assert_eq!(ctx.output, FragmentOutput::Invalid);
        assert!(program.is_invalid());
        assert!(!run_frag(&mut program, 0.0).0);
    }

    #[test]
    fn bad_uniform_jump_aborts() {
        let mut program = Program::fragment();
        program.push("=", ["fragColor".into(), Arg::from(1.0)]).unwrap();
        program.push("goto", [Arg::from(".target")]).unwrap();
        program.seal().unwrap();

        // uniform never pushed: slot holds 0.0
        let (valid, ctx) = run_frag(&mut program, 0.0);
        assert!(!valid);
        assert_eq!(ctx.output, FragmentOutput::Invalid);
        assert!(program.is_invalid());
    }

    #[test]
    fn compare_writes_bool() {
        let mut program = Program::fragment();
        program.push(">", ["flag".into(), "fragX".into(), Arg::from(2.0)]).unwrap();
        program.push("=", ["fragColor".into(), "flag".into()]).unwrap();
        program.seal().unwrap();

        assert_eq!(run_frag(&mut program, 3.0).1.color, Vec4::ONE);
        assert_eq!(program.value("flag"), Some(Value::Bool(true)));
        assert_eq!(run_frag(&mut program, 1.0).1.color, Vec4::ZERO);
    }

    #[test]
    fn color_conversion_keeps_alpha() {
        let mut program = Program::fragment();
        program.push("=", ["c".into(), Arg::from([1.0, 1.0, 1.0, 0.25])]).unwrap();
        program.push("toYUV", ["c".into(), "c".into()]).unwrap();
        program.push("=", ["fragYUVA".into(), "c".into()]).unwrap();
        program.seal().unwrap();

        let (valid, ctx) = run_frag(&mut program, 0.0);
        assert!(valid);
        assert_eq!(ctx.output, FragmentOutput::Yuv);
        assert_eq!(ctx.color.q, 0.25);
        assert!((ctx.color.x - 1.0).abs() < 1e-4);
        assert!((ctx.color.y - 0.5).abs() < 1e-4);
    }

    #[test]
    fn clamp_reads_destination() {
        let mut program = Program::fragment();
        program.push("=", ["lo".into(), Arg::from(0.25)]).unwrap();
        program.push("=", ["hi".into(), Arg::from(0.75)]).unwrap();
        program.push("=", ["fragColor".into(), Arg::from([0.0, 0.5, 1.0, 1.0])]).unwrap();
        program.push("clamp", ["fragColor".into(), "lo".into(), "hi".into()]).unwrap();
        program.seal().unwrap();

        assert_eq!(run_frag(&mut program, 0.0).1.color, Vec4::new(0.25, 0.5, 0.75, 0.75));
    }

    #[test]
    fn vertex_program_writes_position() {
        let mut program = Program::vertex();
        program.push("=", ["vertexOut".into(), "vertex".into()]).unwrap();
        program.push("*=", ["vertexOut.xy".into(), Arg::from(2.0)]).unwrap();
        program.seal().unwrap();

        let mut ctx = VertexContext::new(Vec4::new(1.0, 2.0, 3.0, 1.0));
        let valid = program.with_registers(|p, regs| execute_vertex(p, &mut ctx, regs));
        assert!(valid);
        assert_eq!(ctx.out_vertex, Vec4::new(2.0, 4.0, 3.0, 1.0));
    }
}
