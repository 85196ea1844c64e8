//! Replacement of indexer calls by direct element accesses.
use std::fmt;

use rustc_hash::FxHashSet;
use slicefold_ir::{
    func_cursor::{CursorLocation, FuncCursor, InstInserter},
    Body, Function, InstData, InstId, MemberStore, Opcode, Type, Variable,
};

use crate::{
    reaching::{Reach, ReachingSnapshots},
    trace::StackTracer,
    Accessor, Candidate, MethodError, Shadow, SliceDescriptor,
};

/// Why an indexer call was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The receiver is not pushed by a single instruction.
    UntracedReceiver,
    /// The index is not pushed by a single instruction.
    UntracedIndex,
    /// The receiver is not loaded from an argument or local.
    NotABinding,
    AddressTaken(Variable),
    NoSnapshot(Variable),
    AmbiguousSnapshot(Variable),
    ElemTypeMismatch,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UntracedReceiver => write!(f, "receiver is not a single load"),
            Self::UntracedIndex => write!(f, "index is not a single load"),
            Self::NotABinding => write!(f, "receiver is not an argument or local"),
            Self::AddressTaken(var) => write!(f, "address of `{var}` is taken"),
            Self::NoSnapshot(var) => write!(f, "no snapshot of `{var}` reaches the call"),
            Self::AmbiguousSnapshot(var) => {
                write!(f, "several snapshots of `{var}` reach the call")
            }
            Self::ElemTypeMismatch => write!(f, "element type differs from the binding's"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteSummary {
    pub gets: usize,
    pub sets: usize,
    pub skipped: Vec<(InstId, SkipReason)>,
}

impl RewriteSummary {
    pub fn rewritten(&self) -> usize {
        self.gets + self.sets
    }
}

struct Site {
    call: InstId,
    accessor: Accessor,
    receiver: InstId,
    index: InstId,
    elem_ty: Type,
    shadow: Shadow,
}

/// Rewrites every indexer call whose receiver is a direct load of a
/// materialized binding.
///
/// `ldarg s; ldloc i; callvirt get_Item` becomes
/// `ldloc array; ldloc i; ldloc offset; add; ldelem`, and likewise for
/// `set_Item` with the value pushed between the index and the call. The
/// receiver load and the call are changed in place, so branches into the
/// site stay valid.
pub fn rewrite(
    func: &mut Function,
    members: &MemberStore,
    descriptor: &SliceDescriptor,
    candidates: &[Candidate],
    viewer: &str,
) -> Result<RewriteSummary, MethodError> {
    let body = func.body().ok_or(MethodError::MissingBody)?;
    let mut summary = RewriteSummary::default();
    let sites = plan(
        body,
        members,
        &func.ret_ty,
        descriptor,
        candidates,
        viewer,
        &mut summary,
    )?;

    let body = func.body_mut().ok_or(MethodError::MissingBody)?;
    for site in sites {
        body.replace_inst(site.receiver, InstData::ldloc(site.shadow.array));
        let access = match site.accessor {
            Accessor::Get => {
                summary.gets += 1;
                InstData::load_elem(&site.elem_ty)
            }
            Accessor::Set => {
                summary.sets += 1;
                InstData::store_elem(&site.elem_ty)
            }
        };
        body.replace_inst(site.call, access);
        InstInserter::at_location(CursorLocation::At(site.index)).insert_seq(
            body,
            [
                InstData::ldloc(site.shadow.offset),
                InstData::simple(Opcode::Add),
            ],
        );
    }

    Ok(summary)
}

fn plan(
    body: &Body,
    members: &MemberStore,
    ret_ty: &Type,
    descriptor: &SliceDescriptor,
    candidates: &[Candidate],
    viewer: &str,
    summary: &mut RewriteSummary,
) -> Result<Vec<Site>, MethodError> {
    let tracer = StackTracer::new(body, members, ret_ty);
    let mut reaching = ReachingSnapshots::new();
    reaching.compute(body, candidates);
    let address_taken: FxHashSet<Variable> = body
        .iter_inst()
        .filter_map(|inst| body.inst(inst).addressed_var())
        .collect();

    let mut sites = Vec::new();
    for call in body.iter_inst() {
        let data = body.inst(call);
        if !data.opcode.is_call() {
            continue;
        }
        let Some(sig) = data.method().map(|method| members.method_data(method)) else {
            continue;
        };
        let Some(accessor) = descriptor.accessor(sig, viewer) else {
            continue;
        };

        let resolved = (|| -> Result<_, SkipReason> {
            let receiver = tracer
                .trace_back(call, 0)
                .ok_or(SkipReason::UntracedReceiver)?;
            let index = tracer
                .trace_back(call, -1)
                .ok_or(SkipReason::UntracedIndex)?;
            let binding = body
                .inst(receiver)
                .loaded_var()
                .ok_or(SkipReason::NotABinding)?;
            if address_taken.contains(&binding) {
                return Err(SkipReason::AddressTaken(binding));
            }
            let candidate = match reaching.reaching(receiver, binding, candidates) {
                Reach::Unique(idx) => &candidates[idx],
                Reach::None => return Err(SkipReason::NoSnapshot(binding)),
                Reach::Ambiguous => return Err(SkipReason::AmbiguousSnapshot(binding)),
            };
            if descriptor.elem_ty(&sig.parent) != Some(&candidate.elem_ty) {
                return Err(SkipReason::ElemTypeMismatch);
            }
            Ok((receiver, index, candidate))
        })();

        match resolved {
            Ok((receiver, index, candidate)) => {
                let shadow = candidate
                    .shadow
                    .ok_or(MethodError::NotMaterialized(candidate.binding))?;
                sites.push(Site {
                    call,
                    accessor,
                    receiver,
                    index,
                    elem_ty: candidate.elem_ty.clone(),
                    shadow,
                });
            }
            Err(reason) => {
                tracing::debug!(%call, %reason, "indexer call left unchanged");
                summary.skipped.push((call, reason));
            }
        }
    }

    Ok(sites)
}

#[cfg(test)]
mod tests {
    use slicefold_ir::{ir_writer::FuncWriter, FuncRef, Module, ModuleSet};
    use slicefold_parser::parse_module;

    use super::*;
    use crate::{locate, materialize, testing, WeaveContext, WeaverConfig};

    const SLICE: &str = "[Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<float32>";

    fn source(params: &str, body: &str) -> String {
        format!(
            "module App
reference Corvalius.ArraySlice

type App.Program {{
    method static void Run({params}) {{
{body}    }}
}}
"
        )
    }

    fn get() -> String {
        format!("        callvirt instance !0 {SLICE}::get_Item(int32)\n")
    }

    fn set() -> String {
        format!("        callvirt instance void {SLICE}::set_Item(int32, !0)\n")
    }

    fn woven(src: &str) -> (Module, FuncRef, RewriteSummary) {
        let mut module = parse_module(src).unwrap();
        let libs: ModuleSet = [testing::library()].into_iter().collect();
        let config = WeaverConfig {
            null_guard: false,
            ..WeaverConfig::default()
        };
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
        materialize(func, members, &desc, &mut candidates, &config).unwrap();
        let summary = rewrite(func, members, &desc, &candidates, name).unwrap();
        (module, func_ref, summary)
    }

    fn texts(module: &Module, func: FuncRef) -> Vec<String> {
        let writer = FuncWriter::new(module, func);
        let body = module.funcs[func].body().unwrap();
        body.iter_inst().map(|inst| writer.inst_text(inst)).collect()
    }

    #[test]
    fn getter_and_setter() {
        let body = format!(
            "        ldarg.0\n        ldc.i4.1\n        ldarg.0\n        ldc.i4.0\n{}{}        ret\n",
            get(),
            set()
        );
        let (module, func, summary) = woven(&source(&format!("{SLICE} data"), &body));
        assert_eq!(summary.gets, 1);
        assert_eq!(summary.sets, 1);
        assert!(summary.skipped.is_empty());

        let texts = texts(&module, func);
        assert_eq!(
            texts[6..],
            [
                "ldloc __bynamedata_array0",
                "ldc.i4.1",
                "ldloc __bynamedata_offset0",
                "add",
                "ldloc __bynamedata_array0",
                "ldc.i4.0",
                "ldloc __bynamedata_offset0",
                "add",
                "ldelem.r4",
                "stelem.r4",
                "ret",
            ]
        );
    }

    #[test]
    fn receiver_must_be_a_binding() {
        let body = format!("        ldnull\n        ldc.i4.0\n{}        pop\n        ret\n", get());
        let (module, func, summary) = woven(&source(&format!("{SLICE} data"), &body));
        assert_eq!(summary.rewritten(), 0);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].1, SkipReason::NotABinding);
        assert!(texts(&module, func).iter().any(|text| text.contains("get_Item")));
    }

    #[test]
    fn computed_index_is_not_traced() {
        let body = format!(
            "        ldarg.0\n        ldc.i4.1\n        ldc.i4.2\n        add\n{}        pop\n        ret\n",
            get()
        );
        let (_, _, summary) = woven(&source(&format!("{SLICE} data"), &body));
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].1, SkipReason::UntracedIndex);
    }

    #[test]
    fn address_taken_binding() {
        let body = format!(
            "        ldarga.s data\n        pop\n        ldarg.0\n        ldc.i4.0\n{}        pop\n        ret\n",
            get()
        );
        let (_, _, summary) = woven(&source(&format!("{SLICE} data"), &body));
        assert_eq!(summary.rewritten(), 0);
        assert!(matches!(
            summary.skipped[..],
            [(_, SkipReason::AddressTaken(Variable::Arg(_)))]
        ));
    }

    #[test]
    fn ambiguous_snapshot_after_join() {
        let body = format!(
            "        .locals ({SLICE} s)
        ldarg.1
        brfalse.s B
        ldarg.0
        stloc.0
        br.s C
    B:  ldarg.0
        stloc.0
    C:  ldloc.0
        ldc.i4.0
{}        pop
        ret
",
            get()
        );
        let (_, _, summary) = woven(&source(&format!("{SLICE} data, bool flag"), &body));
        assert_eq!(summary.rewritten(), 0);
        assert!(matches!(
            summary.skipped[..],
            [(_, SkipReason::AmbiguousSnapshot(Variable::Local(_)))]
        ));
    }
}
