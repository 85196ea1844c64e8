//! Evaluation stack simulation.
//!
//! Every reachable instruction must be entered with a single stack height,
//! whatever path leads to it. Handler entries start with the exception
//! object on the stack for `catch` and an empty stack otherwise.
use cranelift_entity::SecondaryMap;
use rustc_hash::FxHashSet;
use slicefold_ir::{HandlerKind, InstId, StackBehaviour};

use super::FuncVerifier;
use crate::diagnostic::DiagnosticCode;

impl FuncVerifier<'_> {
    pub(super) fn check_stack(&mut self) {
        let body = self.body;
        let Some(entry) = body.layout.first_inst() else {
            return;
        };

        let mut heights: SecondaryMap<InstId, Option<u32>> = SecondaryMap::new();
        let mut mismatched = FxHashSet::default();
        let mut worklist = vec![(entry, 0)];
        for handler in &body.handlers {
            let height = match handler.kind {
                HandlerKind::Catch(_) => 1,
                HandlerKind::Finally | HandlerKind::Fault => 0,
            };
            worklist.push((handler.handler_start, height));
        }

        while let Some((inst, height)) = worklist.pop() {
            if let Some(seen) = heights[inst] {
                if seen != height && mismatched.insert(inst) {
                    self.inst_error(
                        DiagnosticCode::StackHeightMismatch,
                        format!("entered with stack heights {seen} and {height}"),
                        inst,
                    );
                }
                continue;
            }
            heights[inst] = Some(height);

            let data = body.inst(inst);
            let after = match data.stack_effect(&self.module.members, &self.func.ret_ty) {
                Some((pop, _)) if data.opcode.stack_behaviour() == StackBehaviour::Ret => {
                    if height != pop {
                        self.inst_error(
                            DiagnosticCode::ReturnStackMismatch,
                            format!("returns with {height} values on the stack, expected {pop}"),
                            inst,
                        );
                    }
                    continue;
                }
                Some((pop, push)) => {
                    if height < pop {
                        self.inst_error(
                            DiagnosticCode::StackUnderflow,
                            format!("pops {pop} values from a stack of {height}"),
                            inst,
                        );
                        continue;
                    }
                    height - pop + push
                }
                None => 0,
            };

            for &target in data.branch_targets() {
                worklist.push((target, after));
            }

            if !data.flow().is_unconditional() {
                match body.layout.next_inst_of(inst) {
                    Some(next) => worklist.push((next, after)),
                    None => self.inst_error(
                        DiagnosticCode::FallsOffEnd,
                        "control falls off the end of the body",
                        inst,
                    ),
                }
            }
        }

        if self.cfg.should_report_unreachable() {
            let mut prev_reachable = true;
            for inst in body.iter_inst() {
                let reachable = heights[inst].is_some();
                if !reachable && prev_reachable {
                    self.inst_warning(
                        DiagnosticCode::UnreachableInst,
                        "instruction is unreachable",
                        inst,
                    );
                }
                prev_reachable = reachable;
            }
        }
    }
}
