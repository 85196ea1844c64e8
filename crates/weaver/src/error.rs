use slicefold_ir::{InstId, Variable};

/// A fatal error. Methods woven before the error stay rewritten.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to weave `{func}`: {kind}")]
pub struct WeaveError {
    pub func: String,
    #[source]
    pub kind: MethodError,
}

/// An invariant violation found while rewriting a single method body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MethodError {
    #[error("method has no body")]
    MissingBody,

    #[error("store `{0}` is not in the layout")]
    DetachedStore(InstId),

    #[error("store `{0}` is the last instruction of the body")]
    StoreAtEnd(InstId),

    #[error("slice binding `{0}` has no element type argument")]
    MissingElementType(Variable),

    #[error("`{0}` is not declared")]
    DanglingSlot(Variable),

    #[error("candidate for `{0}` has no shadow locals")]
    NotMaterialized(Variable),
}

impl MethodError {
    pub(crate) fn in_method(self, func: impl Into<String>) -> WeaveError {
        WeaveError {
            func: func.into(),
            kind: self,
        }
    }
}
