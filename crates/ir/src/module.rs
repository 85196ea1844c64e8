use cranelift_entity::{entity_impl, PrimaryMap};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::{annotation::Annotations, types::NamedType, Function, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncRef(u32);
entity_impl!(FuncRef);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeDefId(u32);
entity_impl!(TypeDefId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldRef(u32);
entity_impl!(FieldRef);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodRef(u32);
entity_impl!(MethodRef);

#[derive(Debug, Clone)]
pub struct Module {
    pub name: SmolStr,
    /// Names of referenced modules.
    pub references: Vec<SmolStr>,
    pub annotations: Annotations,
    pub types: PrimaryMap<TypeDefId, TypeDef>,
    pub funcs: PrimaryMap<FuncRef, Function>,
    pub members: MemberStore,
}

impl Module {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            references: Vec::new(),
            annotations: Annotations::default(),
            types: PrimaryMap::new(),
            funcs: PrimaryMap::new(),
            members: MemberStore::default(),
        }
    }

    pub fn references(&self, module: &str) -> bool {
        self.references.iter().any(|r| r == module)
    }

    pub fn declare_type(&mut self, def: TypeDef) -> TypeDefId {
        self.types.push(def)
    }

    /// Adds `func` to the module and to the method list of its declaring type.
    pub fn declare_func(&mut self, func: Function) -> FuncRef {
        let ty = func.declaring_type;
        let func_ref = self.funcs.push(func);
        self.types[ty].methods.push(func_ref);
        func_ref
    }

    pub fn type_by_name(&self, name: &str) -> Option<TypeDefId> {
        self.types
            .iter()
            .find(|(_, def)| def.name == name)
            .map(|(id, _)| id)
    }

    pub fn func_by_name(&self, ty: TypeDefId, name: &str) -> Option<FuncRef> {
        self.types[ty]
            .methods
            .iter()
            .copied()
            .find(|&func| self.funcs[func].name == name)
    }

    /// Finds the method of `ty` named `name` taking `param_count` parameters.
    pub fn find_method(&self, ty: TypeDefId, name: &str, param_count: usize) -> Option<FuncRef> {
        self.types[ty].methods.iter().copied().find(|&func| {
            let func = &self.funcs[func];
            func.name == name && func.param_count() == param_count
        })
    }

    /// Returns the type definition a named type refers to, if it is defined in
    /// this module.
    pub fn resolve_named(&self, named: &NamedType) -> Option<TypeDefId> {
        match &named.scope {
            Some(scope) if *scope != self.name => None,
            _ => self.type_by_name(&named.name),
        }
    }

    pub fn qualified_func_name(&self, func: FuncRef) -> String {
        let func = &self.funcs[func];
        format!("{}::{}", self.types[func.declaring_type].name, func.name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TypeDef {
    /// Full name, including namespace and generic arity suffix.
    pub name: SmolStr,
    pub is_value_type: bool,
    pub generic_params: u16,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<FuncRef>,
    pub properties: Vec<PropertyDef>,
    pub annotations: Annotations,
}

impl TypeDef {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        let name = name.into();
        let generic_params = name
            .rsplit_once('`')
            .and_then(|(_, arity)| arity.parse().ok())
            .unwrap_or(0);
        Self {
            name,
            generic_params,
            ..Default::default()
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: SmolStr,
    pub ty: Type,
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDef {
    pub name: SmolStr,
    pub ty: Type,
    pub getter: Option<FuncRef>,
    pub setter: Option<FuncRef>,
    pub annotations: Annotations,
}

/// A reference to a field as it appears in an instruction operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRefData {
    pub parent: Type,
    pub name: SmolStr,
    /// Declared field type, generic parameters left open.
    pub ty: Type,
}

/// A reference to a method as it appears in an instruction operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRefData {
    pub parent: Type,
    pub name: SmolStr,
    pub has_this: bool,
    pub params: SmallVec<[Type; 4]>,
    pub ret_ty: Type,
}

/// Interned member references of a module.
#[derive(Debug, Clone, Default)]
pub struct MemberStore {
    fields: PrimaryMap<FieldRef, FieldRefData>,
    methods: PrimaryMap<MethodRef, MethodRefData>,
    field_lookup: FxHashMap<FieldRefData, FieldRef>,
    method_lookup: FxHashMap<MethodRefData, MethodRef>,
}

impl MemberStore {
    pub fn import_field(&mut self, data: FieldRefData) -> FieldRef {
        if let Some(&field) = self.field_lookup.get(&data) {
            return field;
        }
        let field = self.fields.push(data.clone());
        self.field_lookup.insert(data, field);
        field
    }

    pub fn import_method(&mut self, data: MethodRefData) -> MethodRef {
        if let Some(&method) = self.method_lookup.get(&data) {
            return method;
        }
        let method = self.methods.push(data.clone());
        self.method_lookup.insert(data, method);
        method
    }

    pub fn field_data(&self, field: FieldRef) -> &FieldRefData {
        &self.fields[field]
    }

    pub fn method_data(&self, method: MethodRef) -> &MethodRefData {
        &self.methods[method]
    }

    pub fn fields(&self) -> impl Iterator<Item = (FieldRef, &FieldRefData)> {
        self.fields.iter()
    }

    pub fn methods(&self) -> impl Iterator<Item = (MethodRef, &MethodRefData)> {
        self.methods.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_interning() {
        let mut store = MemberStore::default();
        let parent = Type::generic(Some("Lib"), "Lib.Slice`1", vec![Type::I32]);
        let data = FieldRefData {
            parent: parent.clone(),
            name: "Array".into(),
            ty: Type::array_of(Type::GenericParam(0)),
        };

        let f0 = store.import_field(data.clone());
        let f1 = store.import_field(data);
        assert_eq!(f0, f1);

        let f2 = store.import_field(FieldRefData {
            parent,
            name: "Offset".into(),
            ty: Type::I32,
        });
        assert_ne!(f0, f2);
        assert_eq!(store.field_data(f2).name, "Offset");
    }

    #[test]
    fn generic_arity_from_name() {
        assert_eq!(TypeDef::new("Lib.Slice`1").generic_params, 1);
        assert_eq!(TypeDef::new("Lib.Plain").generic_params, 0);
    }
}
