use std::fmt;

use cranelift_entity::EntityRef;
use slicefold_ir::{module::FuncRef, InstId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DiagnosticCode {
    InvalidArgRef,
    InvalidLocalRef,
    InvalidFieldRef,
    InvalidMethodRef,
    InvalidTypeDefRef,
    OperandKindMismatch,
    BranchToDetachedInst,
    HandlerBoundaryDetached,
    HandlerRegionInverted,
    EmptyBody,
    FallsOffEnd,
    ShortOperandOutOfRange,
    ShortBranchOutOfRange,
    StackUnderflow,
    StackHeightMismatch,
    ReturnStackMismatch,
    UnreachableInst,
}

impl DiagnosticCode {
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::InvalidArgRef => 1,
            Self::InvalidLocalRef => 2,
            Self::InvalidFieldRef => 3,
            Self::InvalidMethodRef => 4,
            Self::InvalidTypeDefRef => 5,
            Self::OperandKindMismatch => 100,
            Self::BranchToDetachedInst => 101,
            Self::HandlerBoundaryDetached => 102,
            Self::HandlerRegionInverted => 103,
            Self::EmptyBody => 200,
            Self::FallsOffEnd => 201,
            Self::ShortOperandOutOfRange => 300,
            Self::ShortBranchOutOfRange => 301,
            Self::StackUnderflow => 400,
            Self::StackHeightMismatch => 401,
            Self::ReturnStackMismatch => 402,
            Self::UnreachableInst => 500,
        }
    }

    pub fn as_str(self) -> String {
        format!("SF{:04}", self.as_u16())
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => "error".fmt(f),
            Self::Warning => "warning".fmt(f),
            Self::Info => "info".fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Location {
    Module,
    Function(#[cfg_attr(feature = "serde", serde(with = "entity"))] FuncRef),
    Inst {
        #[cfg_attr(feature = "serde", serde(with = "entity"))]
        func: FuncRef,
        #[cfg_attr(feature = "serde", serde(with = "entity"))]
        inst: InstId,
    },
    Handler {
        #[cfg_attr(feature = "serde", serde(with = "entity"))]
        func: FuncRef,
        index: usize,
    },
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module => "module".fmt(f),
            Self::Function(func) => write!(f, "func{}", func.index()),
            Self::Inst { func, inst } => write!(f, "func{}:{inst}", func.index()),
            Self::Handler { func, index } => write!(f, "func{}:handler{index}", func.index()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Note {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiagnosticContext {
    pub function_name: Option<String>,
    pub inst_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub severity: Severity,
    pub message: String,
    pub primary: Location,
    pub notes: Vec<Note>,
    pub context: Option<DiagnosticContext>,
}

impl Diagnostic {
    pub fn new(
        code: DiagnosticCode,
        severity: Severity,
        message: impl Into<String>,
        primary: Location,
    ) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            primary,
            notes: Vec::new(),
            context: None,
        }
    }

    pub fn error(code: DiagnosticCode, message: impl Into<String>, primary: Location) -> Self {
        Self::new(code, Severity::Error, message, primary)
    }

    pub fn warning(code: DiagnosticCode, message: impl Into<String>, primary: Location) -> Self {
        Self::new(code, Severity::Warning, message, primary)
    }

    pub fn info(code: DiagnosticCode, message: impl Into<String>, primary: Location) -> Self {
        Self::new(code, Severity::Info, message, primary)
    }

    pub fn with_note(mut self, message: impl Into<String>) -> Self {
        self.notes.push(Note {
            message: message.into(),
        });
        self
    }

    pub fn with_context(mut self, context: DiagnosticContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} @ {}",
            self.severity, self.code, self.message, self.primary
        )?;

        if let Some(context) = &self.context {
            match (&context.function_name, &context.inst_text) {
                (Some(function_name), Some(inst_text)) => {
                    write!(f, " ({function_name}, {inst_text})")?;
                }
                (Some(function_name), None) => {
                    write!(f, " ({function_name})")?;
                }
                (None, Some(inst_text)) => {
                    write!(f, " ({inst_text})")?;
                }
                (None, None) => {}
            }
        }

        writeln!(f)?;

        for note in &self.notes {
            writeln!(f, "  note: {}", note.message)?;
        }

        Ok(())
    }
}

#[cfg(feature = "serde")]
mod entity {
    use cranelift_entity::EntityRef;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, E: EntityRef>(e: &E, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(e.index() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>, E: EntityRef>(d: D) -> Result<E, D::Error> {
        Ok(E::new(u64::deserialize(d)? as usize))
    }
}
