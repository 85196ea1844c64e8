//! This module contains the type representation used by signatures, locals and
//! member references.
use std::fmt;

use smol_str::SmolStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Bool,
    Char,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    String,
    Object,
    /// Single dimensional, zero based array.
    Array(Box<Type>),
    /// Managed pointer, e.g. `ref`/`out` parameters.
    ByRef(Box<Type>),
    /// `!n`, the n-th generic parameter of the enclosing type.
    GenericParam(u16),
    Named(NamedType),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedType {
    /// Name of the module defining the type. `None` means the type is defined
    /// in the module that refers to it.
    pub scope: Option<SmolStr>,
    /// Full name including namespace and generic arity suffix.
    pub name: SmolStr,
    pub args: Vec<Type>,
}

impl Type {
    pub fn named(scope: Option<&str>, name: &str) -> Self {
        Self::Named(NamedType {
            scope: scope.map(SmolStr::new),
            name: name.into(),
            args: Vec::new(),
        })
    }

    pub fn generic(scope: Option<&str>, name: &str, args: Vec<Type>) -> Self {
        Self::Named(NamedType {
            scope: scope.map(SmolStr::new),
            name: name.into(),
            args,
        })
    }

    pub fn array_of(elem: Type) -> Self {
        Self::Array(Box::new(elem))
    }

    pub fn by_ref(ty: Type) -> Self {
        Self::ByRef(Box::new(ty))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            Self::Bool
                | Self::Char
                | Self::I8
                | Self::U8
                | Self::I16
                | Self::U16
                | Self::I32
                | Self::U32
                | Self::I64
                | Self::U64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    pub fn is_by_ref(&self) -> bool {
        matches!(self, Self::ByRef(_))
    }

    pub fn as_named(&self) -> Option<&NamedType> {
        match self {
            Self::Named(named) => Some(named),
            _ => None,
        }
    }

    pub fn elem_ty(&self) -> Option<&Type> {
        match self {
            Self::Array(elem) => Some(elem),
            _ => None,
        }
    }

    /// Replaces generic parameters by the given arguments.
    pub fn substitute(&self, args: &[Type]) -> Type {
        match self {
            Self::GenericParam(idx) => args
                .get(*idx as usize)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            Self::Array(elem) => Self::array_of(elem.substitute(args)),
            Self::ByRef(ty) => Self::by_ref(ty.substitute(args)),
            Self::Named(named) => Self::Named(NamedType {
                scope: named.scope.clone(),
                name: named.name.clone(),
                args: named.args.iter().map(|arg| arg.substitute(args)).collect(),
            }),
            _ => self.clone(),
        }
    }

    /// Returns the keyword of a primitive type.
    pub fn keyword(&self) -> Option<&'static str> {
        let kw = match self {
            Self::Void => "void",
            Self::Bool => "bool",
            Self::Char => "char",
            Self::I8 => "int8",
            Self::U8 => "uint8",
            Self::I16 => "int16",
            Self::U16 => "uint16",
            Self::I32 => "int32",
            Self::U32 => "uint32",
            Self::I64 => "int64",
            Self::U64 => "uint64",
            Self::F32 => "float32",
            Self::F64 => "float64",
            Self::String => "string",
            Self::Object => "object",
            _ => return None,
        };
        Some(kw)
    }

    pub fn from_keyword(kw: &str) -> Option<Self> {
        let ty = match kw {
            "void" => Self::Void,
            "bool" => Self::Bool,
            "char" => Self::Char,
            "int8" => Self::I8,
            "uint8" => Self::U8,
            "int16" => Self::I16,
            "uint16" => Self::U16,
            "int32" => Self::I32,
            "uint32" => Self::U32,
            "int64" => Self::I64,
            "uint64" => Self::U64,
            "float32" => Self::F32,
            "float64" => Self::F64,
            "string" => Self::String,
            "object" => Self::Object,
            _ => return None,
        };
        Some(ty)
    }
}

impl NamedType {
    /// Returns `true` if `self` names the type `name` defined in `module`,
    /// seen from a module called `viewer`.
    pub fn is(&self, module: &str, name: &str, viewer: &str) -> bool {
        let scope = self.scope.as_deref().unwrap_or(viewer);
        scope == module && self.name == name
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(kw) = self.keyword() {
            return f.write_str(kw);
        }

        match self {
            Self::Array(elem) => write!(f, "{elem}[]"),
            Self::ByRef(ty) => write!(f, "{ty}&"),
            Self::GenericParam(idx) => write!(f, "!{idx}"),
            Self::Named(named) => named.fmt(f),
            _ => unreachable!(),
        }
    }
}

impl fmt::Display for NamedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scope) = &self.scope {
            write!(f, "[{scope}]")?;
        }
        f.write_str(&self.name)?;

        if !self.args.is_empty() {
            f.write_str("<")?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{arg}")?;
            }
            f.write_str(">")?;
        }

        Ok(())
    }
}
