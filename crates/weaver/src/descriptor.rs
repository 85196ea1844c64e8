//! The slice type as seen by the weaver, resolved once per run.
use slicefold_ir::{
    FieldDef, FieldRef, FieldRefData, MemberStore, MethodRefData, Module, ModuleResolver, Type,
};
use smol_str::SmolStr;

use crate::WeaverConfig;

/// Why a module cannot be woven. None of these are errors: the module simply
/// does not use the slice library.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotApplicable {
    #[error("module does not reference `{library}`")]
    NoReference { library: SmolStr },

    #[error("referenced module `{library}` cannot be resolved")]
    UnresolvedModule { library: SmolStr },

    #[error("cannot find `{ty}` in `{library}`")]
    MissingType { library: SmolStr, ty: SmolStr },

    #[error("`{ty}` has no member `{member}`")]
    MissingMember { ty: SmolStr, member: SmolStr },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessor {
    Get,
    Set,
}

#[derive(Debug, Clone)]
pub struct SliceDescriptor {
    pub library: SmolStr,
    pub type_name: SmolStr,
    pub is_value_type: bool,
    pub array_field: FieldDef,
    pub offset_field: FieldDef,
    pub getter: SmolStr,
    pub setter: SmolStr,
}

impl SliceDescriptor {
    pub fn resolve(
        module: &Module,
        resolver: &impl ModuleResolver,
        config: &WeaverConfig,
    ) -> Result<Self, NotApplicable> {
        let library = SmolStr::new(&config.library);
        if !module.references(&library) {
            return Err(NotApplicable::NoReference { library });
        }
        let Some(lib) = resolver.resolve(&library) else {
            return Err(NotApplicable::UnresolvedModule { library });
        };

        let type_name = SmolStr::new(&config.slice_type);
        let Some(ty) = lib.type_by_name(&type_name) else {
            return Err(NotApplicable::MissingType {
                library,
                ty: type_name,
            });
        };
        let def = &lib.types[ty];

        let missing = |member: &str| NotApplicable::MissingMember {
            ty: type_name.clone(),
            member: member.into(),
        };
        let instance_field = |name: &str| {
            def.field(name)
                .filter(|field| !field.is_static)
                .cloned()
                .ok_or_else(|| missing(name))
        };
        let array_field = instance_field(&config.array_field)?;
        let offset_field = instance_field(&config.offset_field)?;

        for (name, param_count) in [(&config.getter, 1), (&config.setter, 2)] {
            let is_instance = lib
                .find_method(ty, name, param_count)
                .is_some_and(|func| !lib.funcs[func].is_static);
            if !is_instance {
                return Err(missing(name));
            }
        }

        Ok(Self {
            library,
            is_value_type: def.is_value_type,
            array_field,
            offset_field,
            getter: SmolStr::new(&config.getter),
            setter: SmolStr::new(&config.setter),
            type_name,
        })
    }

    /// Returns `true` if `ty` is an instantiation of the slice type, as seen
    /// from the module named `viewer`.
    pub fn is_slice(&self, ty: &Type, viewer: &str) -> bool {
        ty.as_named()
            .is_some_and(|named| named.is(&self.library, &self.type_name, viewer))
    }

    /// Element type of a slice instantiation.
    pub fn elem_ty<'a>(&self, ty: &'a Type) -> Option<&'a Type> {
        match ty.as_named()?.args.as_slice() {
            [elem] => Some(elem),
            _ => None,
        }
    }

    /// Classifies a method reference as one of the slice indexers.
    pub fn accessor(&self, sig: &MethodRefData, viewer: &str) -> Option<Accessor> {
        if !sig.has_this || !self.is_slice(&sig.parent, viewer) {
            return None;
        }
        match sig.params.len() {
            1 if sig.name == self.getter => Some(Accessor::Get),
            2 if sig.name == self.setter => Some(Accessor::Set),
            _ => None,
        }
    }

    /// Imports a reference to `field` of the slice instantiation `slice_ty`.
    pub fn import_field(
        &self,
        members: &mut MemberStore,
        slice_ty: &Type,
        field: &FieldDef,
    ) -> FieldRef {
        members.import_field(FieldRefData {
            parent: slice_ty.clone(),
            name: field.name.clone(),
            ty: field.ty.clone(),
        })
    }
}
