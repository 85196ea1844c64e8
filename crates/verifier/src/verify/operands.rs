use cranelift_entity::EntityRef;
use slicefold_ir::{Immediate, InstId, Operand, OperandKind, Variable};

use super::FuncVerifier;
use crate::diagnostic::DiagnosticCode;

impl FuncVerifier<'_> {
    pub(super) fn check_operands(&mut self) {
        let field_count = self.module.members.fields().count();
        let method_count = self.module.members.methods().count();

        let body = self.body;
        for inst in body.iter_inst() {
            let data = body.inst(inst);
            let kind = data.opcode.operand_kind();

            let valid = match (kind, &data.operand) {
                (OperandKind::None, Operand::None) => true,
                (OperandKind::ShortArg | OperandKind::Arg, Operand::Arg(_)) => true,
                (OperandKind::ShortLocal | OperandKind::Local, Operand::Local(_)) => true,
                (OperandKind::ShortI4 | OperandKind::I4, Operand::Imm(Immediate::I4(_))) => true,
                (OperandKind::I8, Operand::Imm(Immediate::I8(_))) => true,
                (OperandKind::R4, Operand::Imm(Immediate::R4(_))) => true,
                (OperandKind::R8, Operand::Imm(Immediate::R8(_))) => true,
                (OperandKind::String, Operand::Imm(Immediate::Str(_))) => true,
                (OperandKind::Field, Operand::Field(field)) => {
                    if field.index() >= field_count {
                        self.inst_error(
                            DiagnosticCode::InvalidFieldRef,
                            format!("field reference {} is not interned", field.index()),
                            inst,
                        );
                    }
                    true
                }
                (OperandKind::Method, Operand::Method(method)) => {
                    if method.index() >= method_count {
                        self.inst_error(
                            DiagnosticCode::InvalidMethodRef,
                            format!("method reference {} is not interned", method.index()),
                            inst,
                        );
                    }
                    true
                }
                (OperandKind::Type, Operand::Type(_)) => true,
                (OperandKind::ShortTarget | OperandKind::Target, Operand::Target(_)) => true,
                (OperandKind::Switch, Operand::Targets(_)) => true,
                _ => false,
            };

            if !valid {
                self.inst_error(
                    DiagnosticCode::OperandKindMismatch,
                    format!("`{}` expects a {kind:?} operand", data.opcode),
                    inst,
                );
                continue;
            }

            self.check_slots(inst);

            for &target in data.branch_targets() {
                if !body.layout.is_inst_inserted(target) {
                    self.inst_error(
                        DiagnosticCode::BranchToDetachedInst,
                        format!("branch target {target} is not in the layout"),
                        inst,
                    );
                }
            }

            if self.cfg.should_check_short_forms() {
                self.check_short_form(inst);
            }
        }
    }

    fn check_slots(&mut self, inst: InstId) {
        let body = self.body;
        let data = body.inst(inst);
        let var = data
            .loaded_var()
            .or_else(|| data.stored_var())
            .or_else(|| data.addressed_var());

        match var {
            Some(Variable::Arg(arg)) if arg.index() >= self.arg_count() => {
                self.inst_error(
                    DiagnosticCode::InvalidArgRef,
                    format!("argument {} does not exist", arg.index()),
                    inst,
                );
            }
            Some(Variable::Local(local)) if local.index() >= self.local_count() => {
                self.inst_error(
                    DiagnosticCode::InvalidLocalRef,
                    format!("local {} is not declared", local.index()),
                    inst,
                );
            }
            _ => {}
        }
    }

    fn check_short_form(&mut self, inst: InstId) {
        let body = self.body;
        let data = body.inst(inst);
        match (data.opcode.operand_kind(), &data.operand) {
            (OperandKind::ShortArg, Operand::Arg(arg)) if arg.index() > u8::MAX as usize => {
                self.inst_error(
                    DiagnosticCode::ShortOperandOutOfRange,
                    format!("argument {} does not fit a short form", arg.index()),
                    inst,
                );
            }
            (OperandKind::ShortLocal, Operand::Local(local))
                if local.index() > u8::MAX as usize =>
            {
                self.inst_error(
                    DiagnosticCode::ShortOperandOutOfRange,
                    format!("local {} does not fit a short form", local.index()),
                    inst,
                );
            }
            (OperandKind::ShortI4, Operand::Imm(Immediate::I4(value)))
                if i8::try_from(*value).is_err() =>
            {
                self.inst_error(
                    DiagnosticCode::ShortOperandOutOfRange,
                    format!("constant {value} does not fit a short form"),
                    inst,
                );
            }
            (OperandKind::ShortTarget, Operand::Target(target)) => {
                let next = self.offsets[inst] as i64 + data.encoded_size() as i64;
                let disp = self.offsets[*target] as i64 - next;
                if i8::try_from(disp).is_err() {
                    self.inst_error(
                        DiagnosticCode::ShortBranchOutOfRange,
                        format!("displacement {disp} does not fit a short branch"),
                        inst,
                    );
                }
            }
            _ => {}
        }
    }
}
