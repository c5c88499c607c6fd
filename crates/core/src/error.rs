use crate::Stage;
use thiserror::Error;

/// Structural error of a program.
///
/// Most are raised while building; a bad jump target or a runaway loop can also be
/// found while running. Any of these marks the program invalid for good, and an
/// invalid program refuses to run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShaderError {
    #[error("unknown operation `{0}`")]
    UnknownOp(String),
    #[error("unresolved identifier `{0}`")]
    UnresolvedIdentifier(String),
    #[error("invalid swizzle in `{0}`")]
    InvalidSwizzle(String),
    #[error("`{op}` is missing its {operand} operand")]
    MissingOperand { op: &'static str, operand: &'static str },
    #[error("`{0}` takes its second operand from a named variable, not a literal")]
    LiteralSecondOperand(&'static str),
    #[error("jump target {target} is outside of the program (1..={len})")]
    BadJumpTarget { target: i64, len: usize },
    #[error("unsupported operands for `{op}`: {reason}")]
    UnsupportedOperands { op: &'static str, reason: &'static str },
    #[error("`{op}` is not allowed in a {stage:?} program")]
    StageMismatch { op: &'static str, stage: Stage },
    #[error("invocation ran past {limit} instructions")]
    StepLimit { limit: usize },
    #[error("if/else/end blocks are not balanced")]
    UnbalancedBranches,
    #[error("no value supplied for uniform `{0}`")]
    UnknownUniform(String),
    #[error("attribute buffer must hold 1 to 4 components per tuple, got {0}")]
    BadComponentCount(usize),
    #[error("program is invalid")]
    InvalidProgram,
}
