use std::fmt;

use slicefold_ir::Type;
use smol_str::SmolStr;

use crate::heap::ObjRef;

/// A value on the evaluation stack or in a slot.
///
/// Small integral types are widened to `I4` as on a real evaluation stack;
/// the narrowing happens when a value is stored into an array element.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    I4(i32),
    I8(i64),
    R4(f32),
    R8(f64),
    Str(SmolStr),
    Obj(ObjRef),
}

impl Value {
    /// Default value of a slot or field of type `ty`.
    pub fn zero_of(ty: &Type) -> Self {
        match ty {
            Type::I64 | Type::U64 => Self::I8(0),
            Type::F32 => Self::R4(0.0),
            Type::F64 => Self::R8(0.0),
            ty if ty.is_integral() => Self::I4(0),
            _ => Self::Null,
        }
    }

    pub fn as_i4(&self) -> Option<i32> {
        match self {
            Self::I4(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_obj(&self) -> Option<ObjRef> {
        match self {
            Self::Obj(obj) => Some(*obj),
            _ => None,
        }
    }

    /// Truth value as seen by `brtrue`/`brfalse`.
    pub fn is_true(&self) -> bool {
        match self {
            Self::Null => false,
            Self::I4(v) => *v != 0,
            Self::I8(v) => *v != 0,
            Self::R4(v) => *v != 0.0,
            Self::R8(v) => *v != 0.0,
            Self::Str(_) | Self::Obj(_) => true,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::I4(_) => "int32",
            Self::I8(_) => "int64",
            Self::R4(_) => "float32",
            Self::R8(_) => "float64",
            Self::Str(_) => "string",
            Self::Obj(_) => "object",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::I4(v) => write!(f, "{v}"),
            Self::I8(v) => write!(f, "{v}L"),
            Self::R4(v) => write!(f, "{v:?}f"),
            Self::R8(v) => write!(f, "{v:?}"),
            Self::Str(s) => write!(f, "{:?}", s.as_str()),
            Self::Obj(obj) => write!(f, "{obj}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values() {
        assert_eq!(Value::zero_of(&Type::Bool), Value::I4(0));
        assert_eq!(Value::zero_of(&Type::U64), Value::I8(0));
        assert_eq!(Value::zero_of(&Type::F32), Value::R4(0.0));
        assert_eq!(Value::zero_of(&Type::array_of(Type::I32)), Value::Null);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_true());
        assert!(!Value::I4(0).is_true());
        assert!(Value::I8(-1).is_true());
        assert!(Value::Str("".into()).is_true());
    }
}
