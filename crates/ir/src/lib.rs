pub mod annotation;
pub mod body;
pub mod encoding;
pub mod func_cursor;
pub mod function;
pub mod inst;
pub mod ir_writer;
pub mod layout;
pub mod module;
pub mod resolve;
pub mod types;

pub use annotation::{Annotation, AnnotationHost, Annotations};
pub use body::{Body, ExceptionHandler, HandlerKind, LocalData, LocalId};
pub use function::{ArgData, ArgId, Function};
pub use inst::{
    FlowControl, Immediate, InstData, InstId, Opcode, Operand, OperandKind, StackBehaviour,
    Variable,
};
pub use layout::Layout;
pub use module::{
    FieldDef, FieldRef, FieldRefData, FuncRef, MemberStore, MethodRef, MethodRefData, Module,
    PropertyDef, TypeDef, TypeDefId,
};
pub use resolve::{ModuleResolver, ModuleSet};
pub use types::{NamedType, Type};
