//! Synthesis of shadow locals and the snapshot code that fills them.
use slicefold_ir::{
    func_cursor::{CursorLocation, FuncCursor, InstInserter},
    Function, InstData, MemberStore, Opcode, Type,
};

use crate::{Candidate, MethodError, Origin, Shadow, SliceDescriptor, WeaverConfig};

/// Declares the shadow locals of every candidate and inserts a snapshot of
/// the binding's array and offset fields where the binding gets its value.
///
/// Candidates are processed from last to first so that insertions never move
/// a store that still has to be handled.
pub fn materialize(
    func: &mut Function,
    members: &mut MemberStore,
    descriptor: &SliceDescriptor,
    candidates: &mut [Candidate],
    config: &WeaverConfig,
) -> Result<(), MethodError> {
    let body = func.body_mut().ok_or(MethodError::MissingBody)?;
    let guard = config.null_guard && !descriptor.is_value_type;

    for candidate in candidates.iter_mut().rev() {
        let (loc, next) = match candidate.origin {
            Origin::Entry => (CursorLocation::Top, body.layout.first_inst()),
            Origin::Store(store) => {
                if !body.layout.is_inst_inserted(store) {
                    return Err(MethodError::DetachedStore(store));
                }
                let next = body
                    .layout
                    .next_inst_of(store)
                    .ok_or(MethodError::StoreAtEnd(store))?;
                (CursorLocation::At(store), Some(next))
            }
        };

        let array = body.declare_local(
            Some(candidate.array_name()),
            Type::array_of(candidate.elem_ty.clone()),
        );
        let offset = body.declare_local(Some(candidate.offset_name()), Type::I32);
        let array_field =
            descriptor.import_field(members, &candidate.slice_ty, &descriptor.array_field);
        let offset_field =
            descriptor.import_field(members, &candidate.slice_ty, &descriptor.offset_field);

        let load = InstData::load(candidate.binding);
        let mut seq = Vec::with_capacity(10);
        if let Some(next) = next.filter(|_| guard) {
            // A null binding leaves a null array behind, so a rewritten access
            // still faults the way the indexer call did.
            seq.extend([
                InstData::simple(Opcode::Ldnull),
                InstData::stloc(array),
                load.clone(),
                InstData::branch(Opcode::Brfalse, next),
            ]);
        }
        seq.extend([
            load.clone(),
            InstData::ldfld(array_field),
            InstData::stloc(array),
            load,
            InstData::ldfld(offset_field),
            InstData::stloc(offset),
        ]);

        InstInserter::at_location(loc).insert_seq(body, seq);
        candidate.shadow = Some(Shadow { array, offset });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use slicefold_ir::{ir_writer::FuncWriter, FuncRef, Module, ModuleSet};
    use slicefold_parser::parse_module;

    use super::*;
    use crate::{locate, testing, WeaveContext};

    const SRC: &str = "module App
reference Corvalius.ArraySlice

type App.Program {
    method static float32 Run([Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<float32> data) {
        .locals ([Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<float32> s)
        ldarg.0
        stloc.0
        ldloc.0
        ldc.i4.0
        callvirt instance !0 [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<float32>::get_Item(int32)
        ret
    }
}
";

    fn materialized(config: &WeaverConfig) -> (Module, FuncRef, Vec<Candidate>) {
        let mut module = parse_module(SRC).unwrap();
        let libs: ModuleSet = [testing::library()].into_iter().collect();
        let desc = SliceDescriptor::resolve(&module, &libs, config).unwrap();
        let func_ref = module.funcs.keys().next().unwrap();

        let Module {
            name,
            funcs,
            members,
            ..
        } = &mut module;
        let func = &mut funcs[func_ref];
        let mut candidates = locate(func, &desc, name, &mut WeaveContext::new()).unwrap();
        materialize(func, members, &desc, &mut candidates, config).unwrap();
        (module, func_ref, candidates)
    }

    fn texts(module: &Module, func: FuncRef) -> Vec<String> {
        let writer = FuncWriter::new(module, func);
        let body = module.funcs[func].body().unwrap();
        body.iter_inst().map(|inst| writer.inst_text(inst)).collect()
    }

    #[test]
    fn snapshots_follow_their_binding() {
        let config = WeaverConfig {
            null_guard: false,
            ..WeaverConfig::default()
        };
        let (module, func, candidates) = materialized(&config);

        let array = "!0[] [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<float32>::Array";
        let offset = "int32 [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<float32>::Offset";
        let expected = vec![
            "ldarg data".to_string(),
            format!("ldfld {array}"),
            "stloc __bynamedata_array0".into(),
            "ldarg data".into(),
            format!("ldfld {offset}"),
            "stloc __bynamedata_offset0".into(),
            "ldarg.0".into(),
            "stloc.0".into(),
            "ldloc s".into(),
            format!("ldfld {array}"),
            "stloc __byidx0_array1".into(),
            "ldloc s".into(),
            format!("ldfld {offset}"),
            "stloc __byidx0_offset1".into(),
            "ldloc.0".into(),
            "ldc.i4.0".into(),
            "callvirt instance !0 [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<float32>::get_Item(int32)".into(),
            "ret".into(),
        ];
        assert_eq!(texts(&module, func), expected);

        let body = module.funcs[func].body().unwrap();
        let names: Vec<_> = body
            .locals
            .values()
            .map(|local| local.name.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(
            names,
            [
                "s",
                "__byidx0_array1",
                "__byidx0_offset1",
                "__bynamedata_array0",
                "__bynamedata_offset0",
            ]
        );
        assert!(candidates.iter().all(|c| c.shadow.is_some()));
        let shadow = candidates[0].shadow.unwrap();
        assert_eq!(body.locals[shadow.array].ty, Type::array_of(Type::F32));
        assert_eq!(body.locals[shadow.offset].ty, Type::I32);
    }

    #[test]
    fn null_guard_branches_past_snapshot() {
        let (module, func, candidates) = materialized(&WeaverConfig::default());
        let body = module.funcs[func].body().unwrap();
        let insts: Vec<_> = body.iter_inst().collect();
        let texts = texts(&module, func);

        // Entry snapshot: 4 guard instructions and 6 snapshot instructions.
        assert_eq!(texts[0], "ldnull");
        assert_eq!(texts[1], "stloc __bynamedata_array0");
        assert_eq!(texts[2], "ldarg data");
        assert_eq!(body.inst(insts[3]).opcode, Opcode::Brfalse);
        assert_eq!(texts[10], "ldarg.0");
        assert_eq!(body.inst(insts[3]).branch_targets(), &[insts[10]]);

        // Store snapshot resumes at the instruction after the store.
        assert_eq!(candidates[1].origin, Origin::Store(insts[11]));
        assert_eq!(body.inst(insts[15]).opcode, Opcode::Brfalse);
        assert_eq!(texts[22], "ldloc.0");
        assert_eq!(body.inst(insts[15]).branch_targets(), &[insts[22]]);
        assert_eq!(texts.len(), 26);
    }

    #[test]
    fn store_at_end_is_an_error() {
        let src = "module App
reference Corvalius.ArraySlice

type App.Program {
    method static void Run([Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<float32> data) {
        ldarg.0
        starg.s data
    }
}
";
        let mut module = parse_module(src).unwrap();
        let libs: ModuleSet = [testing::library()].into_iter().collect();
        let config = WeaverConfig::default();
        let desc = SliceDescriptor::resolve(&module, &libs, &config).unwrap();
        let func_ref = module.funcs.keys().next().unwrap();
        let Module {
            name,
            funcs,
            members,
            ..
        } = &mut module;
        let func = &mut funcs[func_ref];
        let mut candidates = locate(func, &desc, name, &mut WeaveContext::new()).unwrap();
        let store = match candidates[1].origin {
            Origin::Store(store) => store,
            Origin::Entry => unreachable!(),
        };
        let err = materialize(func, members, &desc, &mut candidates, &config).unwrap_err();
        assert_eq!(err, MethodError::StoreAtEnd(store));
    }
}
