mod operands;
mod stack;

use cranelift_entity::SecondaryMap;
use slicefold_ir::{ir_writer::FuncWriter, module::FuncRef, Body, Function, InstId, Module};

use crate::{
    diagnostic::{Diagnostic, DiagnosticCode, DiagnosticContext, Location},
    report::VerificationReport,
    VerifierConfig,
};

pub fn verify_module(module: &Module, cfg: &VerifierConfig) -> VerificationReport {
    let mut report = VerificationReport::default();

    for (func_ref, func) in module.funcs.iter() {
        if !module.types.is_valid(func.declaring_type) {
            report.push(
                Diagnostic::error(
                    DiagnosticCode::InvalidTypeDefRef,
                    "function is declared by a type missing from the module",
                    Location::Function(func_ref),
                ),
                cfg.max_diagnostics,
            );
            continue;
        }

        verify_function_into(module, func_ref, cfg, &mut report);
        if report.is_full(cfg.max_diagnostics) {
            break;
        }
    }

    report
}

pub fn verify_function(
    module: &Module,
    func_ref: FuncRef,
    cfg: &VerifierConfig,
) -> VerificationReport {
    let mut report = VerificationReport::default();
    verify_function_into(module, func_ref, cfg, &mut report);
    report
}

pub fn verify_module_or_panic(module: &Module, cfg: &VerifierConfig) {
    let report = verify_module(module, cfg);
    if report.has_errors() {
        eprintln!("SLICEFOLD_IR_VERIFY_FAILURE: module");
        eprintln!("{report}");
        panic!("SLICEFOLD_IR_VERIFY_FAILURE");
    }
}

pub fn verify_function_or_panic(module: &Module, func_ref: FuncRef, cfg: &VerifierConfig) {
    let report = verify_function(module, func_ref, cfg);
    if report.has_errors() {
        eprintln!(
            "SLICEFOLD_IR_VERIFY_FAILURE: function {}",
            module.qualified_func_name(func_ref)
        );
        eprintln!("{report}");
        panic!("SLICEFOLD_IR_VERIFY_FAILURE");
    }
}

fn verify_function_into(
    module: &Module,
    func_ref: FuncRef,
    cfg: &VerifierConfig,
    report: &mut VerificationReport,
) {
    let func = &module.funcs[func_ref];
    let Some(body) = func.body() else {
        return;
    };

    let mut verifier = FuncVerifier {
        module,
        func_ref,
        func,
        body,
        offsets: body.offsets(),
        cfg,
        report,
        errors: 0,
    };

    if body.layout.is_empty() {
        verifier.error_at(
            DiagnosticCode::EmptyBody,
            "method body has no instructions",
            Location::Function(func_ref),
        );
        return;
    }

    verifier.check_operands();
    verifier.check_handlers();

    // Stack simulation needs valid operands.
    if verifier.errors == 0 && cfg.should_check_stack() {
        verifier.check_stack();
    }
}

pub(crate) struct FuncVerifier<'a> {
    module: &'a Module,
    func_ref: FuncRef,
    func: &'a Function,
    body: &'a Body,
    offsets: SecondaryMap<InstId, u32>,
    cfg: &'a VerifierConfig,
    report: &'a mut VerificationReport,
    errors: usize,
}

impl FuncVerifier<'_> {
    fn context(&self, inst: Option<InstId>) -> DiagnosticContext {
        DiagnosticContext {
            function_name: Some(self.module.qualified_func_name(self.func_ref)),
            inst_text: inst
                .map(|inst| FuncWriter::new(self.module, self.func_ref).inst_text(inst)),
        }
    }

    fn push(&mut self, diagnostic: Diagnostic) {
        if diagnostic.is_error() {
            self.errors += 1;
        }
        self.report.push(diagnostic, self.cfg.max_diagnostics);
    }

    fn error_at(&mut self, code: DiagnosticCode, message: impl Into<String>, primary: Location) {
        let context = self.context(None);
        self.push(Diagnostic::error(code, message, primary).with_context(context));
    }

    fn inst_error(&mut self, code: DiagnosticCode, message: impl Into<String>, inst: InstId) {
        let primary = Location::Inst {
            func: self.func_ref,
            inst,
        };
        let context = self.context(Some(inst));
        let offset = self.offsets[inst];
        self.push(
            Diagnostic::error(code, message, primary)
                .with_context(context)
                .with_note(format!("at IL_{offset:04x}")),
        );
    }

    fn inst_warning(&mut self, code: DiagnosticCode, message: impl Into<String>, inst: InstId) {
        let primary = Location::Inst {
            func: self.func_ref,
            inst,
        };
        let context = self.context(Some(inst));
        self.push(Diagnostic::warning(code, message, primary).with_context(context));
    }

    fn handler_error(&mut self, code: DiagnosticCode, message: impl Into<String>, index: usize) {
        self.error_at(
            code,
            message,
            Location::Handler {
                func: self.func_ref,
                index,
            },
        );
    }

    fn arg_count(&self) -> usize {
        self.func.args.len()
    }

    fn local_count(&self) -> usize {
        self.body.locals.len()
    }

    fn check_handlers(&mut self) {
        let body = self.body;
        for (index, handler) in body.handlers.iter().enumerate() {
            let detached = handler
                .boundaries()
                .find(|inst| !body.layout.is_inst_inserted(*inst));
            if let Some(inst) = detached {
                self.handler_error(
                    DiagnosticCode::HandlerBoundaryDetached,
                    format!("region boundary {inst} is not in the layout"),
                    index,
                );
                continue;
            }

            let inverted = |start: InstId, end: Option<InstId>| {
                end.is_some_and(|end| self.offsets[end] <= self.offsets[start])
            };
            if inverted(handler.try_start, handler.try_end)
                || inverted(handler.handler_start, handler.handler_end)
            {
                self.handler_error(
                    DiagnosticCode::HandlerRegionInverted,
                    "region ends before it starts",
                    index,
                );
            }
        }
    }
}
