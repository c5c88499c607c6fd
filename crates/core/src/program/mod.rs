mod build;
mod uniform;

pub use build::Arg;
pub use uniform::UniformSource;

use crate::{
    AnchorCache, AttribId, ColorMatrix, ColorTransform, InterpId, Instruction, Interpolator, JumpTarget, MatrixId,
    OpKind, ShaderError, SlotId, Stage, Texture, TextureId, Transform, Value, VertexAttrib,
};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tracing::{debug, warn};

/// Identifier of a program stored in a backend.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct ProgramId(pub u64);

/// A named variable slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VarDecl {
    pub name: String,
    /// Leading-dot names are uniforms, pushed by the host once per pass.
    pub uniform: bool,
}

/// Mutable state of one program invocation: variable slots and interpolator anchor caches.
///
/// The program owns a canonical copy; worker threads run on private snapshots of it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Registers {
    vars: Vec<Value>,
    anchors: Vec<AnchorCache>,
}

impl Registers {
    pub fn new(vars: usize, anchors: usize) -> Self {
        Self {
            vars: vec![Value::default(); vars],
            anchors: vec![AnchorCache::default(); anchors],
        }
    }

    #[inline(always)]
    pub fn var(&self, id: SlotId) -> Option<&Value> {
        self.vars.get(id.0 as usize)
    }

    #[inline(always)]
    pub fn var_mut(&mut self, id: SlotId) -> Option<&mut Value> {
        self.vars.get_mut(id.0 as usize)
    }

    #[inline(always)]
    pub fn anchor_mut(&mut self, id: InterpId) -> Option<&mut AnchorCache> {
        self.anchors.get_mut(id.0 as usize)
    }

    /// Overwrites this register file with `canonical`, reusing the allocations.
    pub fn reset_from(&mut self, canonical: &Registers) {
        self.vars.clone_from(&canonical.vars);
        self.anchors.clone_from(&canonical.anchors);
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// A compiled program: the instruction list, the variable table and the external
/// handles the instructions reference.
///
/// Programs are append-only while being built. Once sealed they are shared read-only
/// between worker threads; only the `invalid` flag may still flip.
#[derive(Debug)]
pub struct Program {
    stage: Stage,
    ops: Vec<Instruction>,
    vars: Vec<VarDecl>,
    registers: Registers,

    textures: Vec<Arc<dyn Texture>>,
    matrices: Vec<Arc<dyn Transform>>,
    interps: Vec<Arc<Interpolator>>,
    attribs: Vec<Arc<VertexAttrib>>,
    color: Arc<dyn ColorTransform>,

    has_branches: bool,
    disable_depth_shortcut: bool,
    sealed: bool,
    invalid: AtomicBool,
}

impl Program {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            ops: Vec::new(),
            vars: Vec::new(),
            registers: Registers::default(),
            textures: Vec::new(),
            matrices: Vec::new(),
            interps: Vec::new(),
            attribs: Vec::new(),
            color: Arc::new(ColorMatrix::default()),
            has_branches: false,
            disable_depth_shortcut: false,
            sealed: false,
            invalid: AtomicBool::new(false),
        }
    }

    pub fn fragment() -> Self {
        Self::new(Stage::Fragment)
    }

    pub fn vertex() -> Self {
        Self::new(Stage::Vertex)
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.ops
    }

    pub fn vars(&self) -> &[VarDecl] {
        &self.vars
    }

    /// The canonical register file.
    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    #[inline(always)]
    pub fn texture(&self, id: TextureId) -> Option<&dyn Texture> {
        self.textures.get(id.0 as usize).map(|t| &**t)
    }

    #[inline(always)]
    pub fn matrix(&self, id: MatrixId) -> Option<&dyn Transform> {
        self.matrices.get(id.0 as usize).map(|m| &**m)
    }

    #[inline(always)]
    pub fn interpolator(&self, id: InterpId) -> Option<&Interpolator> {
        self.interps.get(id.0 as usize).map(|i| &**i)
    }

    #[inline(always)]
    pub fn attrib(&self, id: AttribId) -> Option<&VertexAttrib> {
        self.attribs.get(id.0 as usize).map(|a| &**a)
    }

    pub fn color_transform(&self) -> &dyn ColorTransform {
        &*self.color
    }

    pub fn set_color_transform(&mut self, color: Arc<dyn ColorTransform>) {
        self.color = color;
    }

    /// Slot of a named variable or uniform (uniforms keep their leading dot).
    pub fn slot(&self, name: &str) -> Option<SlotId> {
        self.vars.iter().position(|v| v.name == name).map(|i| SlotId(i as u16))
    }

    /// Current canonical value of a named variable.
    pub fn value(&self, name: &str) -> Option<Value> {
        self.slot(name).and_then(|id| self.registers.var(id)).copied()
    }

    /// Whether any branch instruction is present. Without branches the interpreter takes
    /// a linear path with no nesting bookkeeping.
    pub fn has_branches(&self) -> bool {
        self.has_branches
    }

    /// The program writes depth, so the rasterizer must not test depth before shading.
    pub fn disables_early_depth(&self) -> bool {
        self.disable_depth_shortcut
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid.load(Ordering::Relaxed)
    }

    /// Sealed and not invalid.
    #[inline(always)]
    pub fn is_runnable(&self) -> bool {
        self.sealed && !self.is_invalid()
    }

    /// Marks the program invalid for good. Usable from worker threads.
    pub fn invalidate(&self, reason: &ShaderError) {
        if !self.invalid.swap(true, Ordering::Relaxed) {
            warn!(%reason, ops = self.ops.len(), "program marked invalid");
        }
    }

    fn fail(&self, err: ShaderError) -> ShaderError {
        self.invalidate(&err);
        err
    }

    /// Runs `f` with the canonical register file, for single-threaded execution.
    pub fn with_registers<R>(&mut self, f: impl FnOnce(&Self, &mut Registers) -> R) -> R {
        let mut registers = std::mem::take(&mut self.registers);
        let result = f(self, &mut registers);
        self.registers = registers;
        result
    }

    /// Drops every instruction, variable and handle. The program becomes buildable again.
    pub fn reset(&mut self) {
        let stage = self.stage;
        let color = self.color.clone();
        *self = Self::new(stage);
        self.color = color;
    }

    /// Validates the program structure and freezes it for execution.
    ///
    /// Checks `if`/`end` balance and fixed jump targets. Errors mark the program invalid.
    pub fn seal(&mut self) -> Result<(), ShaderError> {
        if self.is_invalid() {
            return Err(ShaderError::InvalidProgram);
        }

        if let Err(err) = self.check_structure() {
            return Err(self.fail(err));
        }

        self.has_branches = self.ops.iter().any(|op| op.op.is_branch());
        self.sealed = true;

        debug!(
            ops = self.ops.len(),
            vars = self.vars.len(),
            branches = self.has_branches,
            early_depth = !self.disable_depth_shortcut,
            "program sealed"
        );
        Ok(())
    }

    fn check_structure(&self) -> Result<(), ShaderError> {
        let mut depth = 0usize;
        for ins in &self.ops {
            match ins.op {
                OpKind::If(_) => depth += 1,
                OpKind::Else | OpKind::ElseIf(_) if depth == 0 => return Err(ShaderError::UnbalancedBranches),
                OpKind::End => depth = depth.checked_sub(1).ok_or(ShaderError::UnbalancedBranches)?,
                OpKind::Goto(JumpTarget::Index(i)) if i >= self.ops.len() => {
                    return Err(ShaderError::BadJumpTarget {
                        target: i as i64 + 1,
                        len: self.ops.len(),
                    });
                }
                _ => {}
            }
        }

        if depth != 0 {
            return Err(ShaderError::UnbalancedBranches);
        }
        Ok(())
    }

    /// Pushes live values for every uniform from the host. Call once per pass,
    /// before any invocation of that pass.
    pub fn update_uniforms(&mut self, source: &dyn UniformSource) -> Result<(), ShaderError> {
        if self.is_invalid() {
            return Err(ShaderError::InvalidProgram);
        }

        for i in 0..self.vars.len() {
            if !self.vars[i].uniform {
                continue;
            }

            let name = &self.vars[i].name;
            match source.uniform(name.trim_start_matches('.')) {
                Some(value) => self.registers.vars[i] = value,
                None => {
                    let err = ShaderError::UnknownUniform(name.clone());
                    return Err(self.fail(err));
                }
            }
        }

        for i in 0..self.ops.len() {
            if let OpKind::Goto(JumpTarget::Uniform(slot)) = self.ops[i].op {
                let value = self.registers.var(slot).copied().unwrap_or_default();
                if jump_index(&value, self.ops.len()).is_none() {
                    let err = ShaderError::BadJumpTarget {
                        target: value.as_f32() as i64,
                        len: self.ops.len(),
                    };
                    return Err(self.fail(err));
                }
            }
        }

        Ok(())
    }
}

/// Converts a 1-based jump target value into a 0-based instruction index.
#[inline(always)]
pub fn jump_index(value: &Value, len: usize) -> Option<usize> {
    let target = match *value {
        Value::Int(i) => i as i64,
        Value::Float(f) if f.fract() == 0.0 => f as i64,
        _ => return None,
    };

    if target >= 1 && target as usize <= len {
        Some(target as usize - 1)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn seal_rejects_unbalanced() {
        let mut program = Program::fragment();
        program.push("if", [Arg::from("fragX"), "<".into(), 0.0.into()]).unwrap();
        assert_eq!(program.seal(), Err(ShaderError::UnbalancedBranches));
        assert!(program.is_invalid());
        assert!(!program.is_runnable());
    }

    #[test]
    fn seal_rejects_jump_past_end() {
        let mut program = Program::fragment();
        program.push("goto", [Arg::from(3)]).unwrap();
        program.push("=", ["fragColor".into(), Arg::from(1.0)]).unwrap();
        assert_eq!(
            program.seal(),
            Err(ShaderError::BadJumpTarget { target: 3, len: 2 })
        );
    }

    #[test]
    fn seal_sets_flags() {
        let mut program = Program::fragment();
        program.push("=", ["fragDepth".into(), Arg::from(0.5)]).unwrap();
        program.seal().unwrap();
        assert!(program.disables_early_depth());
        assert!(!program.has_branches());
        assert!(program.is_runnable());
    }

    #[test]
    fn uniforms_are_pushed() {
        let mut program = Program::fragment();
        program.push("=", ["fragColor.x".into(), ".level".into()]).unwrap();
        program.seal().unwrap();

        let mut uniforms = HashMap::new();
        uniforms.insert("level".to_string(), Value::Float(0.25));
        program.update_uniforms(&uniforms).unwrap();
        assert_eq!(program.value(".level"), Some(Value::Float(0.25)));

        let empty: HashMap<String, Value> = HashMap::new();
        assert_eq!(
            program.update_uniforms(&empty),
            Err(ShaderError::UnknownUniform(".level".into()))
        );
        assert!(program.is_invalid());
    }

    #[test]
    fn uniform_jump_target_is_checked() {
        let mut program = Program::fragment();
        program.push("goto", [Arg::from(".target")]).unwrap();
        program.seal().unwrap();

        let mut uniforms = HashMap::new();
        uniforms.insert("target".to_string(), Value::Int(1));
        program.update_uniforms(&uniforms).unwrap();

        uniforms.insert("target".to_string(), Value::Int(2));
        assert!(matches!(
            program.update_uniforms(&uniforms),
            Err(ShaderError::BadJumpTarget { target: 2, len: 1 })
        ));
    }

    #[test]
    fn jump_index_bounds() {
        assert_eq!(jump_index(&Value::Int(1), 4), Some(0));
        assert_eq!(jump_index(&Value::Float(4.0), 4), Some(3));
        assert_eq!(jump_index(&Value::Int(0), 4), None);
        assert_eq!(jump_index(&Value::Int(5), 4), None);
        assert_eq!(jump_index(&Value::Float(1.5), 4), None);
    }

    #[test]
    fn reset_clears_invalid() {
        let mut program = Program::fragment();
        program.push("bogus", []).unwrap_err();
        assert!(program.is_invalid());
        program.reset();
        assert!(!program.is_invalid());
        assert!(program.is_empty());
    }
}
