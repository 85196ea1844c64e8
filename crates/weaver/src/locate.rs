//! Discovery of slice-typed bindings that need a shadow snapshot.
use cranelift_entity::EntityRef;
use slicefold_ir::{Function, InstId, LocalId, Type, Variable};
use smol_str::{format_smolstr, SmolStr};

use crate::{MethodError, SliceDescriptor, WeaveContext};

/// An argument or local holding a slice.
pub type Binding = Variable;

/// Where the value of a binding that a candidate snapshots comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The incoming value of a parameter.
    Entry,
    /// The value stored by this instruction.
    Store(InstId),
}

/// Locals caching the backing array and offset of one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shadow {
    pub array: LocalId,
    pub offset: LocalId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub binding: Binding,
    pub origin: Origin,
    /// Declared type of the binding.
    pub slice_ty: Type,
    pub elem_ty: Type,
    pub stem: SmolStr,
    pub suffix: u32,
    pub shadow: Option<Shadow>,
}

impl Candidate {
    pub fn array_name(&self) -> SmolStr {
        format_smolstr!("__{}array{}", self.stem, self.suffix)
    }

    pub fn offset_name(&self) -> SmolStr {
        format_smolstr!("__{}offset{}", self.stem, self.suffix)
    }
}

/// Returns a candidate for every slice-typed parameter followed by one for
/// every store to a slice-typed parameter or local, in layout order.
pub fn locate(
    func: &Function,
    descriptor: &SliceDescriptor,
    viewer: &str,
    ctx: &mut WeaveContext,
) -> Result<Vec<Candidate>, MethodError> {
    let body = func.body().ok_or(MethodError::MissingBody)?;
    let mut candidates = Vec::new();

    let mut push = |binding: Binding, origin: Origin, ty: &Type| -> Result<(), MethodError> {
        let elem_ty = descriptor
            .elem_ty(ty)
            .ok_or(MethodError::MissingElementType(binding))?;
        candidates.push(Candidate {
            binding,
            origin,
            slice_ty: ty.clone(),
            elem_ty: elem_ty.clone(),
            stem: stem(func, binding),
            suffix: ctx.fresh_suffix(),
            shadow: None,
        });
        Ok(())
    };

    for (arg, data) in func.params() {
        if descriptor.is_slice(&data.ty, viewer) {
            push(Binding::Arg(arg), Origin::Entry, &data.ty)?;
        }
    }

    for inst in body.iter_inst() {
        let Some(binding) = body.inst(inst).stored_var() else {
            continue;
        };
        let ty = match binding {
            Binding::Arg(arg) => func.args.get(arg).map(|data| &data.ty),
            Binding::Local(local) => body.locals.get(local).map(|data| &data.ty),
        };
        let ty = ty.ok_or(MethodError::DanglingSlot(binding))?;
        if descriptor.is_slice(ty, viewer) {
            push(binding, Origin::Store(inst), ty)?;
        }
    }

    Ok(candidates)
}

fn stem(func: &Function, binding: Binding) -> SmolStr {
    match binding {
        Binding::Arg(arg) => {
            let name = func.args.get(arg).map_or("", |data| data.name.as_str());
            format_smolstr!("byname{name}_")
        }
        Binding::Local(local) => format_smolstr!("byidx{}_", local.index()),
    }
}

#[cfg(test)]
mod tests {
    use slicefold_ir::{ArgId, Module, ModuleSet};
    use slicefold_parser::parse_module;

    use super::*;
    use crate::{testing, WeaverConfig};

    fn run(src: &str, ctx: &mut WeaveContext) -> (Module, Vec<Candidate>) {
        let module = parse_module(src).unwrap();
        let libs: ModuleSet = [testing::library()].into_iter().collect();
        let desc = SliceDescriptor::resolve(&module, &libs, &WeaverConfig::default()).unwrap();
        let ty = module.type_by_name("App.Program").unwrap();
        let func = module.func_by_name(ty, "Run").unwrap();
        let candidates = locate(&module.funcs[func], &desc, &module.name, ctx).unwrap();
        (module, candidates)
    }

    #[test]
    fn parameters_then_stores() {
        let src = "module App
reference Corvalius.ArraySlice

type App.Program {
    method static void Run([Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<float32> data, int32 n, [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>& out) {
        .locals ([Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<float32> s, int32 i)
        ldarg.0
        stloc.0
        ldc.i4.0
        stloc.1
        ldloc.0
        starg.s data
        ret
    }
}
";
        let mut ctx = WeaveContext::new();
        let (module, candidates) = run(src, &mut ctx);
        let body = module.funcs.values().next().unwrap().body().unwrap();
        let insts: Vec<_> = body.iter_inst().collect();

        let found: Vec<_> = candidates
            .iter()
            .map(|c| (c.binding, c.origin, c.array_name(), c.offset_name()))
            .collect();
        assert_eq!(
            found,
            vec![
                (
                    Binding::Arg(ArgId::new(0)),
                    Origin::Entry,
                    "__bynamedata_array0".into(),
                    "__bynamedata_offset0".into(),
                ),
                (
                    Binding::Local(LocalId::new(0)),
                    Origin::Store(insts[1]),
                    "__byidx0_array1".into(),
                    "__byidx0_offset1".into(),
                ),
                (
                    Binding::Arg(ArgId::new(0)),
                    Origin::Store(insts[5]),
                    "__bynamedata_array2".into(),
                    "__bynamedata_offset2".into(),
                ),
            ]
        );
        assert!(candidates.iter().all(|c| c.elem_ty == Type::F32));

        // Suffixes keep counting across methods of the same run.
        let (_, again) = run(src, &mut ctx);
        assert_eq!(again[0].suffix, 3);
    }

    #[test]
    fn missing_element_type() {
        let src = "module App
reference Corvalius.ArraySlice

type App.Program {
    method static void Run([Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1 raw) {
        ret
    }
}
";
        let module = parse_module(src).unwrap();
        let libs: ModuleSet = [testing::library()].into_iter().collect();
        let desc = SliceDescriptor::resolve(&module, &libs, &WeaverConfig::default()).unwrap();
        let func = module.funcs.values().next().unwrap();
        let err = locate(func, &desc, &module.name, &mut WeaveContext::new()).unwrap_err();
        assert_eq!(err, MethodError::MissingElementType(Binding::Arg(ArgId::new(0))));
    }
}
