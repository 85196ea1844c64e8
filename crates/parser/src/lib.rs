use cranelift_entity::EntityRef;
use ir::{
    func_cursor::{CursorLocation, FuncCursor, InstInserter},
    module::{FieldRefData, MethodRefData},
    Annotation, ArgData, ArgId, Body, ExceptionHandler, FieldDef, Function, HandlerKind,
    Immediate, InstData, InstId, LocalId, Module, Opcode, Operand, OperandKind, PropertyDef,
    Type, TypeDef, TypeDefId,
};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use smol_str::SmolStr;
use syntax::Spanned;

pub mod ast;
mod error;
pub mod syntax;
pub use error::{Error, UndefinedKind};
pub use syntax::Span;

/// Parses a module in text form and builds its IR.
pub fn parse_module(input: &str) -> Result<Module, Vec<Error>> {
    let ast = ast::parse(input)?;

    let mut ctx = BuildCtx::default();
    let mut module = Module::new(ast.name);
    module.references = ast.references;
    module.annotations = ast.annotations.into_iter().map(Annotation::new).collect();

    for ty in ast.types {
        ctx.build_type(&mut module, ty);
    }

    if ctx.errors.is_empty() {
        Ok(module)
    } else {
        Err(ctx.errors)
    }
}

#[derive(Default)]
struct BuildCtx {
    errors: Vec<Error>,
    labels: FxHashMap<SmolStr, InstId>,
}

impl BuildCtx {
    fn build_type(&mut self, module: &mut Module, ty: ast::TypeDef) {
        if module.type_by_name(&ty.name.inner).is_some() {
            self.errors.push(Error::DuplicatedDeclaration(
                ty.name.inner.clone(),
                ty.name.span,
            ));
            return;
        }

        let mut def = TypeDef::new(ty.name.inner.clone());
        def.is_value_type = ty.is_value_type;
        def.annotations = ty.annotations.into_iter().map(Annotation::new).collect();
        def.fields = ty
            .fields
            .into_iter()
            .map(|f| FieldDef {
                name: f.name,
                ty: f.ty,
                is_static: f.is_static,
            })
            .collect();
        let this_ty = self_type(&def);
        let type_id = module.declare_type(def);

        for method in ty.methods {
            self.build_func(module, type_id, &this_ty, method);
        }

        for prop in ty.properties {
            let getter = prop.getter.map(|name| self.accessor(module, type_id, name));
            let setter = prop.setter.map(|name| self.accessor(module, type_id, name));
            module.types[type_id].properties.push(PropertyDef {
                name: prop.name,
                ty: prop.ty,
                getter: getter.flatten(),
                setter: setter.flatten(),
                annotations: prop.annotations.into_iter().map(Annotation::new).collect(),
            });
        }
    }

    fn accessor(
        &mut self,
        module: &Module,
        ty: TypeDefId,
        name: Spanned<SmolStr>,
    ) -> Option<ir::FuncRef> {
        let func = module.func_by_name(ty, &name.inner);
        if func.is_none() {
            self.errors
                .push(Error::Undefined(UndefinedKind::Method(name.inner), name.span));
        }
        func
    }

    fn build_func(
        &mut self,
        module: &mut Module,
        type_id: TypeDefId,
        this_ty: &Type,
        method: ast::Method,
    ) {
        let mut func = Function::new(method.name.inner, type_id, method.is_static);
        func.ret_ty = method.ret_ty;
        func.annotations = method.annotations.into_iter().map(Annotation::new).collect();
        if !method.is_static {
            func.args.push(ArgData::new("this", this_ty.clone()));
        }
        for param in method.params {
            let mut arg = ArgData::new(param.name, param.ty);
            arg.annotations = param.annotations.into_iter().map(Annotation::new).collect();
            func.args.push(arg);
        }

        if let Some(body) = method.body {
            func.body = Some(self.build_body(module, &func, body));
        }
        module.declare_func(func);
    }

    fn build_body(&mut self, module: &mut Module, func: &Function, ast: ast::MethodBody) -> Body {
        self.labels.clear();
        let mut body = Body::new();

        for local in ast.locals {
            if body.local_by_name(&local.name.inner).is_some() {
                self.errors.push(Error::DuplicatedDeclaration(
                    local.name.inner.clone(),
                    local.name.span,
                ));
            }
            body.declare_local(Some(local.name.inner), local.ty);
        }

        // Allocate every instruction first so that forward branches resolve.
        let mut cursor = InstInserter::at_location(CursorLocation::Top);
        let mut insts = Vec::with_capacity(ast.insts.len());
        for line in &ast.insts {
            let inst = cursor.insert_inst_data(&mut body, InstData::simple(Opcode::Nop));
            insts.push(inst);

            if let Some(label) = &line.label {
                if self.labels.insert(label.inner.clone(), inst).is_some() {
                    self.errors
                        .push(Error::DuplicatedDeclaration(label.inner.clone(), label.span));
                }
            }
        }

        for (line, inst) in ast.insts.into_iter().zip(insts) {
            let Some(opcode) = Opcode::from_text(&line.opcode.inner) else {
                self.errors.push(Error::Undefined(
                    UndefinedKind::Opcode(line.opcode.inner),
                    line.opcode.span,
                ));
                continue;
            };

            let operand = match line.operand {
                Some(operand) => self.operand(module, func, &body, opcode, operand),
                None if opcode.operand_kind() == OperandKind::None => Operand::None,
                None => {
                    self.errors.push(Error::OperandKindMismatch {
                        expected: opcode.operand_kind(),
                        span: line.opcode.span,
                    });
                    Operand::None
                }
            };
            body.replace_inst(inst, InstData::new(opcode, operand));
        }

        for handler in ast.handlers {
            let kind = match handler.kind {
                ast::HandlerKindSyntax::Catch(ty) => HandlerKind::Catch(ty),
                ast::HandlerKindSyntax::Finally => HandlerKind::Finally,
                ast::HandlerKindSyntax::Fault => HandlerKind::Fault,
            };
            let (Some(try_start), Some(handler_start)) = (
                self.label(&handler.try_start),
                self.label(&handler.handler_start),
            ) else {
                continue;
            };
            body.handlers.push(ExceptionHandler {
                kind,
                try_start,
                try_end: self.region_end(&handler.try_end),
                handler_start,
                handler_end: self.region_end(&handler.handler_end),
            });
        }

        body
    }

    fn operand(
        &mut self,
        module: &mut Module,
        func: &Function,
        body: &Body,
        opcode: Opcode,
        operand: Spanned<ast::OperandSyntax>,
    ) -> Operand {
        use ast::OperandSyntax as S;

        let kind = opcode.operand_kind();
        let span = operand.span;
        let mismatch = |errors: &mut Vec<Error>| {
            errors.push(Error::OperandKindMismatch {
                expected: kind,
                span,
            });
            Operand::None
        };

        match (kind, operand.inner) {
            (OperandKind::None, _) => {
                self.errors.push(Error::UnexpectedOperand(span));
                Operand::None
            }

            (OperandKind::ShortArg | OperandKind::Arg, S::Type { text, .. }) => {
                match func.arg_by_name(&text) {
                    Some(arg) => Operand::Arg(arg),
                    None => {
                        self.errors
                            .push(Error::Undefined(UndefinedKind::Arg(text), span));
                        Operand::None
                    }
                }
            }
            (OperandKind::ShortArg | OperandKind::Arg, S::Number(n)) => {
                match self.slot(&n, func.args.len(), span, kind) {
                    Some(idx) => Operand::Arg(ArgId::new(idx)),
                    None => Operand::None,
                }
            }

            (OperandKind::ShortLocal | OperandKind::Local, S::Type { text, .. }) => {
                match body.local_by_name(&text) {
                    Some(local) => Operand::Local(local),
                    None => {
                        self.errors
                            .push(Error::Undefined(UndefinedKind::Local(text), span));
                        Operand::None
                    }
                }
            }
            (OperandKind::ShortLocal | OperandKind::Local, S::Number(n)) => {
                match self.slot(&n, body.locals.len(), span, kind) {
                    Some(idx) => Operand::Local(LocalId::new(idx)),
                    None => Operand::None,
                }
            }

            (OperandKind::ShortI4, S::Number(n)) => {
                self.imm(n.parse::<i8>().map(|v| Immediate::I4(v as i32)), span)
            }
            (OperandKind::I4, S::Number(n)) => self.imm(n.parse().map(Immediate::I4), span),
            (OperandKind::I8, S::Number(n)) => self.imm(n.parse().map(Immediate::I8), span),
            (OperandKind::R4, S::Number(n)) => self.imm(n.parse().map(Immediate::R4), span),
            (OperandKind::R8, S::Number(n)) => self.imm(n.parse().map(Immediate::R8), span),
            (OperandKind::String, S::Str(s)) => Operand::Imm(Immediate::Str(s)),

            (OperandKind::Field, S::Member(member)) if member.params.is_none() => {
                let field = module.members.import_field(FieldRefData {
                    parent: member.parent,
                    name: member.name,
                    ty: member.ty,
                });
                Operand::Field(field)
            }
            (OperandKind::Method, S::Member(member)) => {
                let Some(params) = member.params else {
                    return mismatch(&mut self.errors);
                };
                let method = module.members.import_method(MethodRefData {
                    parent: member.parent,
                    name: member.name,
                    has_this: member.has_this,
                    params: params.into_iter().collect(),
                    ret_ty: member.ty,
                });
                Operand::Method(method)
            }

            (OperandKind::Type, S::Type { ty, .. }) => Operand::Type(ty),

            (OperandKind::ShortTarget | OperandKind::Target, S::Type { text, .. }) => {
                let label = Spanned { span, inner: text };
                match self.label(&label) {
                    Some(target) => Operand::Target(target),
                    None => Operand::None,
                }
            }
            (OperandKind::Switch, S::Labels(labels)) => {
                let targets: SmallVec<[InstId; 4]> =
                    labels.iter().filter_map(|l| self.label(l)).collect();
                if targets.len() != labels.len() {
                    return Operand::None;
                }
                Operand::Targets(targets)
            }

            _ => mismatch(&mut self.errors),
        }
    }

    fn imm<E>(&mut self, value: Result<Immediate, E>, span: Span) -> Operand {
        match value {
            Ok(imm) => Operand::Imm(imm),
            Err(_) => {
                self.errors.push(Error::NumberOutOfBounds(span));
                Operand::None
            }
        }
    }

    fn slot(&mut self, text: &str, len: usize, span: Span, kind: OperandKind) -> Option<usize> {
        let max = if matches!(kind, OperandKind::ShortArg | OperandKind::ShortLocal) {
            u8::MAX as usize
        } else {
            u16::MAX as usize
        };
        match text.parse::<usize>() {
            Ok(idx) if idx < len && idx <= max => Some(idx),
            _ => {
                self.errors.push(Error::NumberOutOfBounds(span));
                None
            }
        }
    }

    fn label(&mut self, label: &Spanned<SmolStr>) -> Option<InstId> {
        let inst = self.labels.get(&label.inner).copied();
        if inst.is_none() {
            self.errors.push(Error::Undefined(
                UndefinedKind::Label(label.inner.clone()),
                label.span,
            ));
        }
        inst
    }

    fn region_end(&mut self, label: &Spanned<SmolStr>) -> Option<InstId> {
        if label.inner == "end" {
            None
        } else {
            self.label(label)
        }
    }
}

/// Type of `this` inside methods of `def`.
fn self_type(def: &TypeDef) -> Type {
    let args = (0..def.generic_params).map(Type::GenericParam).collect();
    let ty = Type::generic(None, &def.name, args);
    if def.is_value_type {
        Type::by_ref(ty)
    } else {
        ty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_branch_and_handler() {
        let src = r#"module App

type App.Program {
    method static int32 Run(int32 x) {
        .locals (int32 acc)
        IL_0000: ldarg x
        IL_0001: brfalse.s IL_0005
        IL_0002: ldc.i4.1
        IL_0003: stloc acc
        IL_0004: leave.s IL_0006
        IL_0005: leave.s IL_0006
        IL_0006: ldloc acc
        IL_0007: ret
        .try IL_0000 to IL_0005 finally handler IL_0005 to IL_0006
    }
}
"#;
        let module = parse_module(src).unwrap();
        let ty = module.type_by_name("App.Program").unwrap();
        let func = &module.funcs[module.func_by_name(ty, "Run").unwrap()];
        let body = func.body().unwrap();

        let insts: Vec<_> = body.iter_inst().collect();
        assert_eq!(insts.len(), 8);
        assert_eq!(body.inst(insts[1]).branch_targets(), &[insts[5]]);
        assert_eq!(body.inst(insts[0]).operand, Operand::Arg(ArgId::new(0)));
        assert_eq!(body.handlers.len(), 1);
        assert_eq!(body.handlers[0].try_end, Some(insts[5]));
        assert_eq!(body.handlers[0].handler_end, Some(insts[6]));
    }

    #[test]
    fn instance_method_has_this() {
        let src = "module App\n\ntype value App.Point`1 {\n    field !0 X\n    property !0 X get get_X\n\n    method !0 get_X() {\n        ldarg.0\n        ldfld !0 App.Point`1<!0>::X\n        ret\n    }\n}\n";
        let module = parse_module(src).unwrap();
        let ty = module.type_by_name("App.Point`1").unwrap();
        let func = &module.funcs[module.func_by_name(ty, "get_X").unwrap()];
        assert_eq!(func.param_count(), 0);
        assert_eq!(
            func.args[ArgId::new(0)].ty,
            Type::by_ref(Type::generic(None, "App.Point`1", vec![Type::GenericParam(0)]))
        );
        assert_eq!(module.types[ty].properties[0].getter, module.func_by_name(ty, "get_X"));
    }

    #[test]
    fn undefined_label() {
        let src = "module App\n\ntype App.P {\n    method static void F() {\n        br L9\n    }\n}\n";
        let errs = parse_module(src).unwrap_err();
        assert!(matches!(errs[0], Error::Undefined(UndefinedKind::Label(_), _)));
    }
}
