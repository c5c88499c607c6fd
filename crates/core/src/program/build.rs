use super::{Program, VarDecl};
use crate::{
    AttribId, Builtin, Cmp, ColorModel, Dst, Func, InterpId, Instruction, Interpolator, JumpTarget, Mask, MatrixId,
    OpKind, Operand, ShaderError, SlotId, Source, Src, Stage, Target, Texture, TextureId, Transform, Value, Vec4,
    VertexAttrib,
};
use std::sync::Arc;

/// One argument of [`Program::push`].
///
/// Names may carry a swizzle suffix (`color.xy`). A leading dot marks a uniform (`.time`).
#[derive(Clone, Debug)]
pub enum Arg<'a> {
    Name(&'a str),
    Literal(Operand),
    Texture(Arc<dyn Texture>),
    Matrix(Arc<dyn Transform>),
    Interp(Arc<Interpolator>),
    Attrib(Arc<VertexAttrib>),
}

impl<'a> Arg<'a> {
    pub fn texture(texture: Arc<dyn Texture>) -> Self {
        Arg::Texture(texture)
    }

    pub fn matrix(matrix: Arc<dyn Transform>) -> Self {
        Arg::Matrix(matrix)
    }

    pub fn interp(interp: Arc<Interpolator>) -> Self {
        Arg::Interp(interp)
    }

    pub fn attrib(attrib: Arc<VertexAttrib>) -> Self {
        Arg::Attrib(attrib)
    }

    /// Vector literal using only its first `lanes` components.
    pub fn vector(v: Vec4, lanes: usize) -> Self {
        Arg::Literal(Operand::Vec(v, Mask::first(lanes.clamp(1, 4))))
    }
}

impl<'a> From<&'a str> for Arg<'a> {
    fn from(name: &'a str) -> Self {
        Arg::Name(name)
    }
}

impl From<f32> for Arg<'_> {
    fn from(v: f32) -> Self {
        Arg::Literal(Operand::Float(v))
    }
}

impl From<i32> for Arg<'_> {
    fn from(v: i32) -> Self {
        Arg::Literal(Operand::Int(v))
    }
}

impl From<bool> for Arg<'_> {
    fn from(v: bool) -> Self {
        Arg::Literal(Operand::Bool(v))
    }
}

impl From<[f32; 2]> for Arg<'_> {
    fn from(v: [f32; 2]) -> Self {
        Arg::vector(Vec4::from_slice(&v), 2)
    }
}

impl From<[f32; 3]> for Arg<'_> {
    fn from(v: [f32; 3]) -> Self {
        Arg::vector(Vec4::from_slice(&v), 3)
    }
}

impl From<[f32; 4]> for Arg<'_> {
    fn from(v: [f32; 4]) -> Self {
        Arg::vector(v.into(), 4)
    }
}

impl From<Value> for Arg<'_> {
    fn from(v: Value) -> Self {
        Arg::Literal(v.operand(Mask::XYZQ))
    }
}

type Args<'a> = std::vec::IntoIter<Arg<'a>>;

impl Program {
    /// Appends one instruction.
    ///
    /// Returns the 1-based index of the new instruction, usable as a `goto` target.
    /// Any error marks the program invalid; later pushes fail with
    /// [`ShaderError::InvalidProgram`].
    ///
    /// ```text
    /// push("=",     ["fragColor", [1.0, 0.0, 0.0, 1.0]])
    /// push("+=",    ["acc.xy", "uv"])
    /// push("if",    ["fragX", "<", 8.0])
    /// push("clamp", ["color", "lo", "hi"])
    /// push("goto",  [3])
    /// ```
    pub fn push<'a>(&mut self, op: &str, args: impl IntoIterator<Item = Arg<'a>>) -> Result<usize, ShaderError> {
        if self.is_invalid() {
            return Err(ShaderError::InvalidProgram);
        }

        let args: Vec<Arg<'a>> = args.into_iter().collect();
        match self.build(op, args.into_iter()) {
            Ok(ins) => {
                self.has_branches |= ins.op.is_branch();
                self.sealed = false;
                self.ops.push(ins);
                Ok(self.ops.len())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn build(&mut self, name: &str, mut args: Args<'_>) -> Result<Instruction, ShaderError> {
        let ins = match name {
            "=" | "assign" => self.arith(OpKind::Assign, &mut args)?,
            "+=" | "add" => self.arith(OpKind::Add, &mut args)?,
            "-=" | "sub" => self.arith(OpKind::Sub, &mut args)?,
            "*=" | "mul" => self.arith(OpKind::Mul, &mut args)?,
            "/=" | "div" => self.arith(OpKind::Div, &mut args)?,

            "if" | "elseif" => {
                let lhs = self.condition_lhs(name_of(name), args.next())?;
                let cmp = match args.next() {
                    Some(Arg::Name(c)) => Cmp::from_name(c).ok_or_else(|| ShaderError::UnknownOp(c.to_string()))?,
                    _ => return Err(missing(name_of(name), "comparison")),
                };
                let rhs = self.src(name_of(name), args.next())?;
                self.no_matrix(name_of(name), &rhs)?;

                let op = if name == "if" { OpKind::If(cmp) } else { OpKind::ElseIf(cmp) };
                Instruction {
                    op,
                    dst: Some(lhs),
                    src: Some(rhs),
                    src2: None,
                }
            }
            "else" => bare(OpKind::Else),
            "end" => bare(OpKind::End),
            "discard" => {
                if self.stage != Stage::Fragment {
                    return Err(ShaderError::StageMismatch {
                        op: "discard",
                        stage: self.stage,
                    });
                }
                bare(OpKind::Discard)
            }
            "goto" => {
                let target = self.jump_target(args.next())?;
                bare(OpKind::Goto(target))
            }

            "<" | "<=" | ">" | ">=" | "==" | "!=" => {
                let cmp = Cmp::from_name(name).ok_or_else(|| ShaderError::UnknownOp(name.to_string()))?;
                let dst = self.dst("compare", args.next())?;
                let lhs = self.src("compare", args.next())?;
                let rhs = self.src("compare", args.next())?;
                self.no_matrix("compare", &lhs)?;
                self.no_matrix("compare", &rhs)?;
                Instruction {
                    op: OpKind::Compare(cmp),
                    dst: Some(dst),
                    src: Some(lhs),
                    src2: Some(rhs),
                }
            }

            "sampler" | "samplerYUV" => {
                let model = if name == "sampler" { ColorModel::Rgb } else { ColorModel::Yuv };
                let op = OpKind::Sampler(TextureId(0), model).name();
                let dst = self.dst(op, args.next())?;
                let texture = match args.next() {
                    Some(Arg::Texture(t)) => self.intern_texture(t)?,
                    Some(_) => {
                        return Err(ShaderError::UnsupportedOperands {
                            op,
                            reason: "expected a texture",
                        });
                    }
                    None => return Err(missing(op, "texture")),
                };
                let coords = self.src(op, args.next())?;
                self.no_matrix(op, &coords)?;
                Instruction {
                    op: OpKind::Sampler(texture, model),
                    dst: Some(dst),
                    src: Some(coords),
                    src2: None,
                }
            }

            "toYUV" | "toRGB" => {
                let kind = if name == "toYUV" { OpKind::ToYuv } else { OpKind::ToRgb };
                let dst = self.dst(kind.name(), args.next())?;
                let src = self.src(kind.name(), args.next())?;
                self.no_matrix(kind.name(), &src)?;
                self.vector_source(kind.name(), &src)?;
                Instruction {
                    op: kind,
                    dst: Some(dst),
                    src: Some(src),
                    src2: None,
                }
            }

            "print" => {
                let src = self.src("print", args.next())?;
                self.no_matrix("print", &src)?;
                Instruction {
                    op: OpKind::Print,
                    dst: None,
                    src: Some(src),
                    src2: None,
                }
            }

            other => match Func::from_name(other) {
                Some(func) => self.call(func, &mut args)?,
                None => return Err(ShaderError::UnknownOp(other.to_string())),
            },
        };

        if args.next().is_some() {
            return Err(ShaderError::UnsupportedOperands {
                op: ins.op.name(),
                reason: "too many operands",
            });
        }

        Ok(ins)
    }

    fn arith(&mut self, kind: OpKind, args: &mut Args<'_>) -> Result<Instruction, ShaderError> {
        let op = kind.name();
        let dst = self.dst(op, args.next())?;
        let src = self.src(op, args.next())?;

        if let Source::Matrix(_) = src.source {
            if kind != OpKind::Mul {
                return Err(ShaderError::UnsupportedOperands {
                    op,
                    reason: "a matrix can only multiply a vector in place",
                });
            }
            if !self.dst_is_vector(&dst) {
                return Err(ShaderError::UnsupportedOperands {
                    op,
                    reason: "a matrix can only multiply a vector",
                });
            }
        }

        Ok(Instruction {
            op: kind,
            dst: Some(dst),
            src: Some(src),
            src2: None,
        })
    }

    fn call(&mut self, func: Func, args: &mut Args<'_>) -> Result<Instruction, ShaderError> {
        let op = func.name();
        let dst = self.dst(op, args.next())?;
        let src = self.src(op, args.next())?;
        self.no_matrix(op, &src)?;

        let src2 = if func.arity() == 2 {
            match args.next() {
                Some(arg) => Some(self.src2(op, arg)?),
                None => return Err(missing(op, "second")),
            }
        } else {
            None
        };

        if func.is_geometric() {
            self.vector_source(op, &src)?;
        }
        if func == Func::Cross && !self.dst_is_vector(&dst) {
            return Err(ShaderError::UnsupportedOperands {
                op,
                reason: "cross writes a vector",
            });
        }

        Ok(Instruction {
            op: OpKind::Call(func),
            dst: Some(dst),
            src: Some(src),
            src2,
        })
    }

    fn dst(&mut self, op: &'static str, arg: Option<Arg<'_>>) -> Result<Dst, ShaderError> {
        let name = match arg {
            Some(Arg::Name(name)) => name,
            Some(_) => {
                return Err(ShaderError::UnsupportedOperands {
                    op,
                    reason: "destination must be a name",
                });
            }
            None => return Err(missing(op, "destination")),
        };

        let (base, mask) = split_swizzle(name)?;

        if let Some(builtin) = Builtin::from_name(base) {
            self.check_builtin_stage(op, builtin)?;
            if !builtin.is_writable() {
                return Err(ShaderError::UnsupportedOperands {
                    op,
                    reason: "built-in is read-only",
                });
            }
            if mask.is_some() && !builtin.is_vector() {
                return Err(ShaderError::InvalidSwizzle(name.to_string()));
            }
            if builtin == Builtin::FragDepth {
                self.disable_depth_shortcut = true;
            }
            return Ok(Dst {
                target: Target::Builtin(builtin),
                mask,
            });
        }

        if base.starts_with('.') {
            return Err(ShaderError::UnsupportedOperands {
                op,
                reason: "uniforms are read-only",
            });
        }
        if !is_identifier(base) {
            return Err(ShaderError::UnresolvedIdentifier(name.to_string()));
        }

        let slot = match self.slot(base) {
            Some(slot) => slot,
            None => self.declare(base, false)?,
        };
        Ok(Dst {
            target: Target::Var(slot),
            mask,
        })
    }

    /// Left side of a condition: any readable name, written as a destination reference.
    fn condition_lhs(&mut self, op: &'static str, arg: Option<Arg<'_>>) -> Result<Dst, ShaderError> {
        let src = self.src(op, arg)?;
        let target = match src.source {
            Source::Builtin(b) => Target::Builtin(b),
            Source::Var(slot) => Target::Var(slot),
            _ => {
                return Err(ShaderError::UnsupportedOperands {
                    op,
                    reason: "left side of a condition must be a name",
                });
            }
        };
        Ok(Dst { target, mask: src.mask })
    }

    fn src(&mut self, op: &'static str, arg: Option<Arg<'_>>) -> Result<Src, ShaderError> {
        let arg = arg.ok_or_else(|| missing(op, "source"))?;
        let source = match arg {
            Arg::Name(name) => {
                let (base, mask) = split_swizzle(name)?;
                let source = if let Some(builtin) = Builtin::from_name(base) {
                    self.check_builtin_stage(op, builtin)?;
                    if mask.is_some() && !builtin.is_vector() {
                        return Err(ShaderError::InvalidSwizzle(name.to_string()));
                    }
                    Source::Builtin(builtin)
                } else if let Some(uniform) = base.strip_prefix('.') {
                    if !is_identifier(uniform) {
                        return Err(ShaderError::UnresolvedIdentifier(name.to_string()));
                    }
                    match self.slot(base) {
                        Some(slot) => Source::Var(slot),
                        None => Source::Var(self.declare(base, true)?),
                    }
                } else {
                    let slot = self
                        .slot(base)
                        .ok_or_else(|| ShaderError::UnresolvedIdentifier(name.to_string()))?;
                    Source::Var(slot)
                };
                return Ok(Src { source, mask });
            }
            Arg::Literal(value) => Source::Literal(value),
            Arg::Texture(_) => {
                return Err(ShaderError::UnsupportedOperands {
                    op,
                    reason: "textures are only read through a sampler",
                });
            }
            Arg::Matrix(m) => Source::Matrix(self.intern_matrix(m)?),
            Arg::Interp(i) => {
                if self.stage != Stage::Fragment {
                    return Err(ShaderError::StageMismatch { op, stage: self.stage });
                }
                Source::Interp(self.intern_interp(i)?)
            }
            Arg::Attrib(a) => {
                if self.stage != Stage::Vertex {
                    return Err(ShaderError::StageMismatch { op, stage: self.stage });
                }
                Source::Attrib(self.intern_attrib(a)?)
            }
        };
        Ok(Src { source, mask: None })
    }

    /// Second source of a two-operand builtin: a named variable or uniform.
    fn src2(&mut self, op: &'static str, arg: Arg<'_>) -> Result<Src, ShaderError> {
        if let Arg::Literal(_) = arg {
            return Err(ShaderError::LiteralSecondOperand(op));
        }
        let src = self.src(op, Some(arg))?;
        match src.source {
            Source::Var(_) => Ok(src),
            _ => Err(ShaderError::UnsupportedOperands {
                op,
                reason: "second operand must be a variable",
            }),
        }
    }

    fn no_matrix(&self, op: &'static str, src: &Src) -> Result<(), ShaderError> {
        match src.source {
            Source::Matrix(_) => Err(ShaderError::UnsupportedOperands {
                op,
                reason: "matrix operand not allowed here",
            }),
            _ => Ok(()),
        }
    }

    /// Rejects sources that are scalar for sure at build time.
    fn vector_source(&self, op: &'static str, src: &Src) -> Result<(), ShaderError> {
        let scalar = match src.source {
            Source::Literal(value) => value.is_scalar(),
            Source::Builtin(b) => !b.is_vector(),
            _ => false,
        };
        if scalar {
            return Err(ShaderError::UnsupportedOperands {
                op,
                reason: "vector operand required",
            });
        }
        Ok(())
    }

    fn dst_is_vector(&self, dst: &Dst) -> bool {
        match dst.target {
            Target::Builtin(b) => b.is_vector(),
            Target::Var(_) => true,
        }
    }

    fn check_builtin_stage(&self, op: &'static str, builtin: Builtin) -> Result<(), ShaderError> {
        match builtin.stage() {
            Some(stage) if stage != self.stage => Err(ShaderError::StageMismatch { op, stage: self.stage }),
            _ => Ok(()),
        }
    }

    fn jump_target(&mut self, arg: Option<Arg<'_>>) -> Result<JumpTarget, ShaderError> {
        let len = self.ops.len();
        let fixed = move |target: i64| {
            if target < 1 {
                Err(ShaderError::BadJumpTarget { target, len })
            } else {
                Ok(JumpTarget::Index(target as usize - 1))
            }
        };

        match arg {
            Some(Arg::Literal(Operand::Int(i))) => fixed(i as i64),
            Some(Arg::Literal(Operand::Float(f))) if f.fract() == 0.0 => fixed(f as i64),
            Some(Arg::Name(name)) if name.starts_with('.') && is_identifier(&name[1..]) => {
                let slot = match self.slot(name) {
                    Some(slot) => slot,
                    None => self.declare(name, true)?,
                };
                Ok(JumpTarget::Uniform(slot))
            }
            Some(_) => Err(ShaderError::UnsupportedOperands {
                op: "goto",
                reason: "target must be an integer or a uniform",
            }),
            None => Err(missing("goto", "target")),
        }
    }

    fn declare(&mut self, name: &str, uniform: bool) -> Result<SlotId, ShaderError> {
        let id = u16::try_from(self.vars.len()).map_err(|_| ShaderError::UnsupportedOperands {
            op: "declare",
            reason: "too many variables",
        })?;
        self.vars.push(VarDecl {
            name: name.to_string(),
            uniform,
        });
        self.registers.vars.push(Value::default());
        Ok(SlotId(id))
    }

    fn intern_texture(&mut self, texture: Arc<dyn Texture>) -> Result<TextureId, ShaderError> {
        intern(&mut self.textures, texture).map(TextureId)
    }

    fn intern_matrix(&mut self, matrix: Arc<dyn Transform>) -> Result<MatrixId, ShaderError> {
        intern(&mut self.matrices, matrix).map(MatrixId)
    }

    fn intern_interp(&mut self, interp: Arc<Interpolator>) -> Result<InterpId, ShaderError> {
        let before = self.interps.len();
        let id = intern(&mut self.interps, interp)?;
        if self.interps.len() != before {
            self.registers.anchors.push(Default::default());
        }
        Ok(InterpId(id))
    }

    fn intern_attrib(&mut self, attrib: Arc<VertexAttrib>) -> Result<AttribId, ShaderError> {
        intern(&mut self.attribs, attrib).map(AttribId)
    }
}

fn intern<T: ?Sized>(list: &mut Vec<Arc<T>>, item: Arc<T>) -> Result<u16, ShaderError> {
    if let Some(i) = list.iter().position(|x| Arc::ptr_eq(x, &item)) {
        return Ok(i as u16);
    }
    let id = u16::try_from(list.len()).map_err(|_| ShaderError::UnsupportedOperands {
        op: "declare",
        reason: "too many handles",
    })?;
    list.push(item);
    Ok(id)
}

fn bare(op: OpKind) -> Instruction {
    Instruction {
        op,
        dst: None,
        src: None,
        src2: None,
    }
}

fn missing(op: &'static str, operand: &'static str) -> ShaderError {
    ShaderError::MissingOperand { op, operand }
}

fn name_of(op: &str) -> &'static str {
    if op == "if" { "if" } else { "elseif" }
}

/// Splits `name.xy` into `("name", Some(XY))`. The leading dot of a uniform is kept.
fn split_swizzle(name: &str) -> Result<(&str, Option<Mask>), ShaderError> {
    let skip = usize::from(name.starts_with('.'));
    match name[skip..].find('.') {
        Some(dot) => {
            let (base, suffix) = name.split_at(skip + dot);
            let mask = Mask::parse(&suffix[1..]).ok_or_else(|| ShaderError::InvalidSwizzle(name.to_string()))?;
            Ok((base, Some(mask)))
        }
        None => Ok((name, None)),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
