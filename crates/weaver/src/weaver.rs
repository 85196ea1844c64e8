//! Drives the passes over every method of a module.
use slicefold_ir::{
    encoding::{optimize_macros, simplify_macros},
    AnnotationHost, FuncRef, Module, ModuleResolver,
};
use slicefold_verifier::Severity;

use crate::{
    exclude::prune,
    locate, materialize,
    report::{Diagnostic, MethodOutcome, MethodReport, WeaveCode, WeaveReport},
    rewrite, MethodError, NotApplicable, SliceDescriptor, WeaveContext, WeaveError,
    WeaverConfig,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeaveOutcome {
    Woven(WeaveReport),
    /// The module does not use the slice library and was left unchanged.
    NotApplicable(NotApplicable),
}

impl WeaveOutcome {
    pub fn report(&self) -> Option<&WeaveReport> {
        match self {
            Self::Woven(report) => Some(report),
            Self::NotApplicable(_) => None,
        }
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            Self::Woven(report) => report.diagnostics.clone(),
            Self::NotApplicable(reason) => vec![Diagnostic::from(reason)],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Weaver {
    config: WeaverConfig,
}

impl Weaver {
    pub fn new(config: WeaverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WeaverConfig {
        &self.config
    }

    pub fn run(
        &self,
        module: &mut Module,
        resolver: &impl ModuleResolver,
    ) -> Result<WeaveOutcome, WeaveError> {
        self.run_with(module, resolver, &mut WeaveContext::new())
    }

    /// Weaves `module`, drawing shadow name suffixes from `ctx`.
    ///
    /// On error the methods woven so far keep their rewritten bodies.
    pub fn run_with(
        &self,
        module: &mut Module,
        resolver: &impl ModuleResolver,
        ctx: &mut WeaveContext,
    ) -> Result<WeaveOutcome, WeaveError> {
        let _span = tracing::info_span!("weave", module = %module.name).entered();

        let descriptor = match SliceDescriptor::resolve(module, resolver, &self.config) {
            Ok(descriptor) => descriptor,
            Err(reason) => {
                match reason {
                    NotApplicable::NoReference { .. } => {
                        tracing::debug!(%reason, "module left unchanged")
                    }
                    _ => tracing::warn!(%reason, "module left unchanged"),
                }
                return Ok(WeaveOutcome::NotApplicable(reason));
            }
        };

        let mut report = WeaveReport::default();
        let funcs: Vec<_> = module
            .funcs
            .keys()
            .filter(|&func| uses_accessor(module, &descriptor, func))
            .collect();
        for func in funcs {
            let method = self.weave_func(module, &descriptor, func, ctx, &mut report)?;
            report.methods.push(method);
        }

        report.markers_removed = self.strip_markers(module);
        tracing::info!(
            methods = report.woven().count(),
            rewritten = report.rewritten(),
            skipped = report.skipped(),
            markers_removed = report.markers_removed,
            "module woven"
        );
        Ok(WeaveOutcome::Woven(report))
    }

    fn weave_func(
        &self,
        module: &mut Module,
        descriptor: &SliceDescriptor,
        func_ref: FuncRef,
        ctx: &mut WeaveContext,
        report: &mut WeaveReport,
    ) -> Result<MethodReport, WeaveError> {
        let name = module.qualified_func_name(func_ref);
        let Module {
            name: viewer,
            funcs,
            members,
            ..
        } = module;
        let func = &mut funcs[func_ref];

        let result = (|| -> Result<MethodOutcome, MethodError> {
            let candidates = locate(func, descriptor, viewer, ctx)?;
            let mut candidates = prune(func, candidates, &self.config);
            if candidates.is_empty() {
                let config = &self.config;
                return Ok(if func.has_marker(&config.marker_namespace, &config.opt_out_marker) {
                    MethodOutcome::OptedOut
                } else {
                    MethodOutcome::NoCandidates
                });
            }

            let body = func.body_mut().ok_or(MethodError::MissingBody)?;
            simplify_macros(body);
            materialize(func, members, descriptor, &mut candidates, &self.config)?;
            let body = func.body_mut().ok_or(MethodError::MissingBody)?;
            simplify_macros(body);
            let rewrite = rewrite(func, members, descriptor, &candidates, viewer)?;
            let body = func.body_mut().ok_or(MethodError::MissingBody)?;
            optimize_macros(body);

            Ok(MethodOutcome::Woven {
                shadow_pairs: candidates.len(),
                rewrite,
            })
        })();

        let outcome = result.map_err(|kind| {
            tracing::error!(method = %name, error = %kind, "weaving aborted");
            kind.in_method(name.clone())
        })?;

        match &outcome {
            MethodOutcome::OptedOut => {
                tracing::debug!(method = %name, "opted out");
                report.diagnostics.push(
                    Diagnostic::new(WeaveCode::OptedOut, Severity::Info, "method opted out")
                        .in_method(name.clone(), None),
                );
            }
            MethodOutcome::NoCandidates => {
                tracing::debug!(method = %name, "no slice bindings");
            }
            MethodOutcome::Woven {
                shadow_pairs,
                rewrite,
            } => {
                tracing::info!(
                    method = %name,
                    shadow_pairs,
                    gets = rewrite.gets,
                    sets = rewrite.sets,
                    skipped = rewrite.skipped.len(),
                    "method woven"
                );
                if let Some(body) = func.body() {
                    let offsets = body.offsets();
                    for (call, reason) in &rewrite.skipped {
                        report.diagnostics.push(
                            Diagnostic::new(
                                WeaveCode::SkippedSite,
                                Severity::Info,
                                format!("indexer call left unchanged: {reason}"),
                            )
                            .in_method(name.clone(), Some(offsets[*call])),
                        );
                    }
                }
            }
        }

        Ok(MethodReport { name, outcome })
    }

    /// Removes every annotation of the marker namespace from the module and
    /// everything it declares.
    fn strip_markers(&self, module: &mut Module) -> usize {
        let ns = self.config.marker_namespace.as_str();
        let mut removed = module.remove_markers(ns);
        for def in module.types.values_mut() {
            removed += def.remove_markers(ns);
            for prop in &mut def.properties {
                removed += prop.remove_markers(ns);
            }
        }
        for func in module.funcs.values_mut() {
            removed += func.remove_markers(ns);
            for arg in func.args.values_mut() {
                removed += arg.remove_markers(ns);
            }
        }
        removed
    }
}

fn uses_accessor(module: &Module, descriptor: &SliceDescriptor, func: FuncRef) -> bool {
    let Some(body) = module.funcs[func].body() else {
        return false;
    };
    body.iter_inst().any(|inst| {
        let data = body.inst(inst);
        data.opcode.is_call()
            && data.method().is_some_and(|method| {
                let sig = module.members.method_data(method);
                descriptor.accessor(sig, &module.name).is_some()
            })
    })
}
