use cranelift_entity::{entity_impl, PrimaryMap};
use smol_str::SmolStr;

use crate::{annotation::Annotations, module::TypeDefId, Body, Type};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArgId(pub u32);
entity_impl!(ArgId, "arg");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgData {
    pub name: SmolStr,
    pub ty: Type,
    pub annotations: Annotations,
}

impl ArgData {
    pub fn new(name: impl Into<SmolStr>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            annotations: Annotations::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: SmolStr,
    pub declaring_type: TypeDefId,
    pub is_static: bool,
    /// Arguments in slot order. Instance methods have the receiver `this` in
    /// slot 0.
    pub args: PrimaryMap<ArgId, ArgData>,
    pub ret_ty: Type,
    pub annotations: Annotations,
    pub body: Option<Body>,
}

impl Function {
    pub fn new(name: impl Into<SmolStr>, declaring_type: TypeDefId, is_static: bool) -> Self {
        Self {
            name: name.into(),
            declaring_type,
            is_static,
            args: PrimaryMap::new(),
            ret_ty: Type::Void,
            annotations: Annotations::default(),
            body: None,
        }
    }

    /// Declared parameters, i.e. arguments without `this`.
    pub fn params(&self) -> impl Iterator<Item = (ArgId, &ArgData)> {
        self.args.iter().skip(!self.is_static as usize)
    }

    pub fn param_count(&self) -> usize {
        self.args.len() - !self.is_static as usize
    }

    pub fn arg_by_name(&self, name: &str) -> Option<ArgId> {
        self.args
            .iter()
            .find(|(_, data)| data.name == name)
            .map(|(arg, _)| arg)
    }

    /// Returns the body, if the method has one.
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn body_mut(&mut self) -> Option<&mut Body> {
        self.body.as_mut()
    }
}
