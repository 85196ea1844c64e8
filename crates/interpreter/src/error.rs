use slicefold_ir::Opcode;
use smol_str::SmolStr;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InterpretError {
    #[error("unhandled exception `{0}`")]
    Unhandled(String),

    #[error("`{op}` cannot operate on {found}")]
    TypeMismatch { op: Opcode, found: String },

    #[error("`{0}` pops from an empty stack")]
    StackUnderflow(Opcode),

    #[error("module `{0}` is not loaded")]
    UnresolvedModule(SmolStr),

    #[error("method `{0}` cannot be resolved")]
    UnresolvedMethod(String),

    #[error("field `{0}` cannot be resolved")]
    UnresolvedField(String),

    #[error("method `{0}` has no body")]
    MissingBody(String),

    #[error("`{func}` takes {expected} arguments, {found} given")]
    ArityMismatch {
        func: String,
        expected: usize,
        found: usize,
    },

    #[error("control falls off the end of `{0}`")]
    FellOffEnd(String),

    #[error("invalid program: {0}")]
    InvalidProgram(String),

    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    #[error("step limit exceeded")]
    OutOfFuel,
}
