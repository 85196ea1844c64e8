use std::cmp::Ordering;

use cranelift_entity::{entity_impl, EntityRef, PrimaryMap};
use rustc_hash::FxHashMap;
use slicefold_ir::{
    module::{FieldRef, FuncRef, MethodRef},
    Body, HandlerKind, Immediate, InstData, InstId, Module, NamedType, Opcode, Operand, Type,
    TypeDefId, Variable,
};
use smol_str::SmolStr;

use crate::{
    frame::{Frame, Unwind},
    heap::{Heap, HeapObject, ObjRef},
    InterpretError, Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u32);
entity_impl!(ModuleId);

const NULL_REFERENCE: &str = "System.NullReferenceException";
const INDEX_OUT_OF_RANGE: &str = "System.IndexOutOfRangeException";
const DIVIDE_BY_ZERO: &str = "System.DivideByZeroException";
const ARITHMETIC: &str = "System.ArithmeticException";
const OVERFLOW: &str = "System.OverflowException";

/// Default number of instructions a single [`Machine::run`] may execute.
pub const DEFAULT_STEP_LIMIT: u64 = 10_000_000;

pub struct Machine {
    modules: PrimaryMap<ModuleId, Module>,
    module_ids: FxHashMap<SmolStr, ModuleId>,
    main: ModuleId,
    heap: Heap,
    statics: FxHashMap<(ModuleId, SmolStr, SmolStr), Value>,
    frames: Vec<Frame>,
    step_limit: u64,
    fuel: u64,
}

/// What the machine does after an instruction.
enum Flow {
    Next,
    Jump(InstId),
    /// The pc of the top frame is already in place.
    Stay,
    Done(Option<Value>),
}

/// Abnormal end of an instruction: a managed exception the program may
/// catch, or an error of the interpreter itself.
enum Fault {
    Exception(&'static str),
    Error(InterpretError),
}

impl From<InterpretError> for Fault {
    fn from(err: InterpretError) -> Self {
        Self::Error(err)
    }
}

impl Machine {
    pub fn new(module: Module) -> Self {
        let mut modules = PrimaryMap::new();
        let mut module_ids = FxHashMap::default();
        let name = module.name.clone();
        let main = modules.push(module);
        module_ids.insert(name, main);

        Self {
            modules,
            module_ids,
            main,
            heap: Heap::default(),
            statics: FxHashMap::default(),
            frames: Vec::new(),
            step_limit: DEFAULT_STEP_LIMIT,
            fuel: 0,
        }
    }

    /// Makes `module` available to calls and field accesses scoped to its
    /// name.
    pub fn add_module(&mut self, module: Module) -> ModuleId {
        let name = module.name.clone();
        let id = self.modules.push(module);
        self.module_ids.insert(name, id);
        id
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn module(&self) -> &Module {
        &self.modules[self.main]
    }

    /// Looks up a method of the main module by type and method name.
    pub fn func_by_name(&self, ty: &str, name: &str) -> Option<FuncRef> {
        let module = self.module();
        module.func_by_name(module.type_by_name(ty)?, name)
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn alloc_array(&mut self, elem: Type, elems: Vec<Value>) -> Value {
        Value::Obj(self.heap.alloc_array(elem, elems))
    }

    pub fn array_elems(&self, value: &Value) -> Option<&[Value]> {
        self.heap.elems(value.as_obj()?)
    }

    /// Runs `func` of the main module to completion and returns its result,
    /// `None` for `void` methods.
    pub fn run(
        &mut self,
        func: FuncRef,
        args: Vec<Value>,
    ) -> Result<Option<Value>, InterpretError> {
        self.frames.clear();
        self.fuel = self.step_limit;

        let frame = self.make_frame(self.main, func, args, Vec::new())?;
        self.frames.push(frame);

        let result = self.run_frames();
        self.frames.clear();
        result
    }

    pub fn clear_state(&mut self) {
        self.frames.clear();
        self.heap.clear();
        self.statics.clear();
    }

    fn run_frames(&mut self) -> Result<Option<Value>, InterpretError> {
        loop {
            if self.fuel == 0 {
                return Err(InterpretError::OutOfFuel);
            }
            self.fuel -= 1;

            let flow = match self.exec() {
                Ok(flow) => flow,
                Err(Fault::Exception(name)) => self.throw_new(name)?,
                Err(Fault::Error(err)) => return Err(err),
            };

            match flow {
                Flow::Next => self.advance()?,
                Flow::Jump(target) => self.top_mut().pc = target,
                Flow::Stay => {}
                Flow::Done(value) => return Ok(value),
            }
        }
    }

    fn make_frame(
        &self,
        module: ModuleId,
        func_ref: FuncRef,
        args: Vec<Value>,
        type_args: Vec<Type>,
    ) -> Result<Frame, InterpretError> {
        let m = &self.modules[module];
        let func = &m.funcs[func_ref];
        let Some(body) = func.body() else {
            return Err(InterpretError::MissingBody(m.qualified_func_name(func_ref)));
        };
        if args.len() != func.args.len() {
            return Err(InterpretError::ArityMismatch {
                func: m.qualified_func_name(func_ref),
                expected: func.args.len(),
                found: args.len(),
            });
        }
        let Some(entry) = body.layout.first_inst() else {
            return Err(InterpretError::FellOffEnd(m.qualified_func_name(func_ref)));
        };

        Ok(Frame::new(module, func_ref, body, entry, args, type_args))
    }

    fn top(&self) -> &Frame {
        self.frames.last().expect("machine has no active frame")
    }

    fn top_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("machine has no active frame")
    }

    fn advance(&mut self) -> Result<(), InterpretError> {
        let frame = self.top();
        match body_of(&self.modules, frame).layout.next_inst_of(frame.pc) {
            Some(next) => {
                self.top_mut().pc = next;
                Ok(())
            }
            None => Err(InterpretError::FellOffEnd(
                self.modules[frame.module].qualified_func_name(frame.func),
            )),
        }
    }

    fn exec(&mut self) -> Result<Flow, Fault> {
        let frame = self.top();
        let data = body_of(&self.modules, frame).inst(frame.pc).clone();
        let op = data.opcode;

        match op.long_form() {
            Opcode::Nop => {}

            Opcode::Ldarg | Opcode::Ldloc => {
                let value = match data.loaded_var() {
                    Some(Variable::Arg(arg)) => frame.args.get(arg.index()),
                    Some(Variable::Local(local)) => frame.locals.get(local.index()),
                    None => None,
                };
                let value = value.cloned().ok_or_else(|| invalid_slot(&data))?;
                self.top_mut().push(value);
            }
            Opcode::Starg | Opcode::Stloc => {
                let frame = self.top_mut();
                let value = frame.pop(op)?;
                let slot = match data.stored_var() {
                    Some(Variable::Arg(arg)) => frame.args.get_mut(arg.index()),
                    Some(Variable::Local(local)) => frame.locals.get_mut(local.index()),
                    None => None,
                };
                *slot.ok_or_else(|| invalid_slot(&data))? = value;
            }
            Opcode::Ldarga | Opcode::Ldloca | Opcode::Ldflda => {
                return Err(InterpretError::Unsupported("managed pointers").into());
            }

            Opcode::Ldnull => self.top_mut().push(Value::Null),
            Opcode::LdcI4 => {
                let value = data.i4().ok_or_else(|| invalid_operand(&data))?;
                self.top_mut().push(Value::I4(value));
            }
            Opcode::LdcI8 | Opcode::LdcR4 | Opcode::LdcR8 | Opcode::Ldstr => {
                let value = match &data.operand {
                    Operand::Imm(Immediate::I8(v)) => Value::I8(*v),
                    Operand::Imm(Immediate::R4(v)) => Value::R4(*v),
                    Operand::Imm(Immediate::R8(v)) => Value::R8(*v),
                    Operand::Imm(Immediate::Str(s)) => Value::Str(s.clone()),
                    _ => return Err(invalid_operand(&data).into()),
                };
                self.top_mut().push(value);
            }

            Opcode::Dup => {
                let frame = self.top_mut();
                let value = frame.peek(op)?.clone();
                frame.push(value);
            }
            Opcode::Pop => {
                self.top_mut().pop(op)?;
            }

            Opcode::Call | Opcode::Callvirt => {
                let method = data.method().ok_or_else(|| invalid_operand(&data))?;
                return self.call(op, method);
            }
            Opcode::Newobj => {
                let method = data.method().ok_or_else(|| invalid_operand(&data))?;
                return self.new_object(method);
            }
            Opcode::Ret => return self.ret(op),

            Opcode::Br => return Ok(Flow::Jump(target(&data)?)),
            Opcode::Brfalse | Opcode::Brtrue => {
                let value = self.top_mut().pop(op)?;
                if value.is_true() == (op.long_form() == Opcode::Brtrue) {
                    return Ok(Flow::Jump(target(&data)?));
                }
            }
            Opcode::Beq
            | Opcode::Bge
            | Opcode::Bgt
            | Opcode::Ble
            | Opcode::Blt
            | Opcode::BneUn => {
                let frame = self.top_mut();
                let rhs = frame.pop(op)?;
                let lhs = frame.pop(op)?;
                let ord = compare(op, &lhs, &rhs)?;
                let taken = match op.long_form() {
                    Opcode::Beq => ord == Some(Ordering::Equal),
                    Opcode::BneUn => ord != Some(Ordering::Equal),
                    Opcode::Bge => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
                    Opcode::Bgt => ord == Some(Ordering::Greater),
                    Opcode::Ble => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
                    _ => ord == Some(Ordering::Less),
                };
                if taken {
                    return Ok(Flow::Jump(target(&data)?));
                }
            }
            Opcode::Switch => {
                let value = self.top_mut().pop(op)?;
                let idx = value.as_i4().ok_or_else(|| mismatch(op, &value))?;
                if let Some(&target) = usize::try_from(idx)
                    .ok()
                    .and_then(|idx| data.branch_targets().get(idx))
                {
                    return Ok(Flow::Jump(target));
                }
            }

            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Rem
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor => {
                let frame = self.top_mut();
                let rhs = frame.pop(op)?;
                let lhs = frame.pop(op)?;
                let value = binary(op, lhs, rhs)?;
                self.top_mut().push(value);
            }
            Opcode::Shl | Opcode::Shr => {
                let frame = self.top_mut();
                let amount = frame.pop(op)?;
                let value = frame.pop(op)?;
                let value = shift(op, value, amount)?;
                frame.push(value);
            }
            Opcode::Neg | Opcode::Not => {
                let frame = self.top_mut();
                let value = frame.pop(op)?;
                let value = match (op, value) {
                    (Opcode::Neg, Value::I4(v)) => Value::I4(v.wrapping_neg()),
                    (Opcode::Neg, Value::I8(v)) => Value::I8(v.wrapping_neg()),
                    (Opcode::Neg, Value::R4(v)) => Value::R4(-v),
                    (Opcode::Neg, Value::R8(v)) => Value::R8(-v),
                    (Opcode::Not, Value::I4(v)) => Value::I4(!v),
                    (Opcode::Not, Value::I8(v)) => Value::I8(!v),
                    (_, value) => return Err(mismatch(op, &value).into()),
                };
                frame.push(value);
            }
            Opcode::Ceq | Opcode::Cgt | Opcode::Clt => {
                let frame = self.top_mut();
                let rhs = frame.pop(op)?;
                let lhs = frame.pop(op)?;
                let ord = compare(op, &lhs, &rhs)?;
                let expected = match op {
                    Opcode::Ceq => Ordering::Equal,
                    Opcode::Cgt => Ordering::Greater,
                    _ => Ordering::Less,
                };
                frame.push(Value::I4((ord == Some(expected)) as i32));
            }
            Opcode::ConvI4 | Opcode::ConvI8 | Opcode::ConvR4 | Opcode::ConvR8 => {
                let frame = self.top_mut();
                let value = frame.pop(op)?;
                let value = convert(op, value)?;
                frame.push(value);
            }

            Opcode::Ldfld => {
                let field = data.field().ok_or_else(|| invalid_operand(&data))?;
                let name = self.modules[frame.module].members.field_data(field).name.clone();
                let obj = self.top_mut().pop(op)?;
                let value = self.field_slot(op, obj, &name)?.clone();
                self.top_mut().push(value);
            }
            Opcode::Stfld => {
                let field = data.field().ok_or_else(|| invalid_operand(&data))?;
                let name = self.modules[frame.module].members.field_data(field).name.clone();
                let frame = self.top_mut();
                let value = frame.pop(op)?;
                let obj = frame.pop(op)?;
                *self.field_slot(op, obj, &name)? = value;
            }
            Opcode::Ldsfld => {
                let field = data.field().ok_or_else(|| invalid_operand(&data))?;
                let (key, ty) = self.static_key(field)?;
                let value = self
                    .statics
                    .entry(key)
                    .or_insert_with(|| Value::zero_of(&ty))
                    .clone();
                self.top_mut().push(value);
            }
            Opcode::Stsfld => {
                let field = data.field().ok_or_else(|| invalid_operand(&data))?;
                let (key, _) = self.static_key(field)?;
                let value = self.top_mut().pop(op)?;
                self.statics.insert(key, value);
            }

            Opcode::Newarr => {
                let Operand::Type(elem) = &data.operand else {
                    return Err(invalid_operand(&data).into());
                };
                let elem = elem.substitute(&frame.type_args);
                let len = self.top_mut().pop(op)?;
                let len = match len {
                    Value::I4(len) => len as i64,
                    Value::I8(len) => len,
                    value => return Err(mismatch(op, &value).into()),
                };
                let len = usize::try_from(len).map_err(|_| Fault::Exception(OVERFLOW))?;
                let elems = vec![Value::zero_of(&elem); len];
                let array = self.alloc_array(elem, elems);
                self.top_mut().push(array);
            }
            Opcode::Ldlen => {
                let array = self.top_mut().pop(op)?;
                let len = self.elems_mut(op, &array)?.len();
                self.top_mut().push(Value::I4(len as i32));
            }
            Opcode::LdelemI1
            | Opcode::LdelemU1
            | Opcode::LdelemI2
            | Opcode::LdelemU2
            | Opcode::LdelemI4
            | Opcode::LdelemU4
            | Opcode::LdelemI8
            | Opcode::LdelemR4
            | Opcode::LdelemR8
            | Opcode::LdelemRef
            | Opcode::Ldelem => {
                let kind = ElemKind::of(&data, &frame.type_args);
                let frame = self.top_mut();
                let index = frame.pop(op)?;
                let array = frame.pop(op)?;
                let elems = self.elems_mut(op, &array)?;
                let index = array_index(op, &index)?;
                let value = elems
                    .get(index)
                    .cloned()
                    .ok_or(Fault::Exception(INDEX_OUT_OF_RANGE))?;
                let value = kind.widen(op, value)?;
                self.top_mut().push(value);
            }
            Opcode::StelemI1
            | Opcode::StelemI2
            | Opcode::StelemI4
            | Opcode::StelemI8
            | Opcode::StelemR4
            | Opcode::StelemR8
            | Opcode::StelemRef
            | Opcode::Stelem => {
                let kind = ElemKind::of(&data, &frame.type_args);
                let frame = self.top_mut();
                let value = frame.pop(op)?;
                let index = frame.pop(op)?;
                let array = frame.pop(op)?;
                let value = kind.narrow(op, value)?;
                let elems = self.elems_mut(op, &array)?;
                let index = array_index(op, &index)?;
                let slot = elems
                    .get_mut(index)
                    .ok_or(Fault::Exception(INDEX_OUT_OF_RANGE))?;
                *slot = value;
            }

            Opcode::Throw => {
                let value = self.top_mut().pop(op)?;
                return match value {
                    Value::Obj(exception) => Ok(self.raise(exception, 0)?),
                    Value::Null => Err(Fault::Exception(NULL_REFERENCE)),
                    value => Err(mismatch(op, &value).into()),
                };
            }
            Opcode::Leave => return Ok(self.leave(target(&data)?)),
            Opcode::Endfinally => return Ok(self.end_finally()?),

            _ => {
                let msg = format!("unexpected opcode `{op}`");
                return Err(InterpretError::InvalidProgram(msg).into());
            }
        }

        Ok(Flow::Next)
    }

    fn call(&mut self, op: Opcode, method: MethodRef) -> Result<Flow, Fault> {
        let frame = self.top();
        let sig = self.modules[frame.module].members.method_data(method).clone();
        let parent = sig.parent.substitute(&frame.type_args);
        let (module, _, func) = self.resolve_method(frame.module, &parent, &sig.name, sig.params.len())?;

        let argc = sig.params.len() + sig.has_this as usize;
        let args = self.top_mut().pop_n(argc, op)?;
        if op == Opcode::Callvirt && sig.has_this && args[0] == Value::Null {
            return Err(Fault::Exception(NULL_REFERENCE));
        }

        let type_args = parent.as_named().map(|n| n.args.clone()).unwrap_or_default();
        let frame = self.make_frame(module, func, args, type_args)?;
        self.frames.push(frame);
        Ok(Flow::Stay)
    }

    fn new_object(&mut self, ctor: MethodRef) -> Result<Flow, Fault> {
        let frame = self.top();
        let sig = self.modules[frame.module].members.method_data(ctor).clone();
        let parent = sig.parent.substitute(&frame.type_args);
        let (module, ty, func) =
            self.resolve_method(frame.module, &parent, &sig.name, sig.params.len())?;

        let def = &self.modules[module].types[ty];
        if def.is_value_type {
            return Err(InterpretError::Unsupported("value type instances").into());
        }
        let type_args = parent.as_named().map(|n| n.args.clone()).unwrap_or_default();
        let fields = def
            .fields
            .iter()
            .filter(|field| !field.is_static)
            .map(|field| {
                let value = Value::zero_of(&field.ty.substitute(&type_args));
                (field.name.clone(), value)
            })
            .collect();
        let obj = Value::Obj(self.heap.alloc(HeapObject::Instance { ty: parent, fields }));

        let mut args = self.top_mut().pop_n(sig.params.len(), Opcode::Newobj)?;
        args.insert(0, obj.clone());
        let mut frame = self.make_frame(module, func, args, type_args)?;
        frame.ctor_result = Some(obj);
        self.frames.push(frame);
        Ok(Flow::Stay)
    }

    fn ret(&mut self, op: Opcode) -> Result<Flow, Fault> {
        let mut frame = self.frames.pop().expect("machine has no active frame");
        let ret_ty = &self.modules[frame.module].funcs[frame.func].ret_ty;
        let value = if ret_ty.is_void() {
            None
        } else {
            Some(frame.pop(op)?)
        };
        let value = frame.ctor_result.take().or(value);

        match self.frames.last_mut() {
            Some(caller) => {
                caller.stack.extend(value);
                Ok(Flow::Next)
            }
            None => Ok(Flow::Done(value)),
        }
    }

    fn leave(&mut self, target: InstId) -> Flow {
        let frame = self.top();
        let body = body_of(&self.modules, frame);
        let mut finallys: Vec<usize> = body
            .handlers
            .iter()
            .enumerate()
            .filter(|(_, handler)| {
                handler.kind == HandlerKind::Finally
                    && frame.in_region(handler.try_start, handler.try_end, frame.pc)
                    && !frame.in_region(handler.try_start, handler.try_end, target)
            })
            .map(|(idx, _)| idx)
            .collect();

        if finallys.is_empty() {
            self.top_mut().stack.clear();
            return Flow::Jump(target);
        }

        let first = finallys.remove(0);
        let start = body.handlers[first].handler_start;
        let frame = self.top_mut();
        frame.stack.clear();
        frame.unwinds.push(Unwind::Leave { target, finallys });
        Flow::Jump(start)
    }

    fn end_finally(&mut self) -> Result<Flow, InterpretError> {
        let frame = self.top_mut();
        frame.stack.clear();
        match frame.unwinds.pop() {
            Some(Unwind::Leave {
                target,
                mut finallys,
            }) => {
                if finallys.is_empty() {
                    return Ok(Flow::Jump(target));
                }
                let next = finallys.remove(0);
                frame.unwinds.push(Unwind::Leave { target, finallys });
                let start = body_of(&self.modules, self.top()).handlers[next].handler_start;
                Ok(Flow::Jump(start))
            }
            Some(Unwind::Throw {
                exception,
                next,
                origin,
            }) => {
                frame.pc = origin;
                self.raise(exception, next)
            }
            None => Err(InterpretError::InvalidProgram(
                "`endfinally` outside of a finally block".into(),
            )),
        }
    }

    fn throw_new(&mut self, name: &'static str) -> Result<Flow, InterpretError> {
        let exception = self.heap.alloc(HeapObject::Instance {
            ty: Type::named(None, name),
            fields: FxHashMap::default(),
        });
        self.raise(exception, 0)
    }

    /// Transfers control to the first handler, starting at handler index
    /// `from` of the top frame, that protects the top frame's pc. Frames
    /// without a handler are discarded.
    fn raise(&mut self, exception: ObjRef, mut from: usize) -> Result<Flow, InterpretError> {
        let type_name = self.heap.get(exception).type_name();

        loop {
            let Some(frame) = self.frames.last() else {
                return Err(InterpretError::Unhandled(type_name));
            };

            let body = body_of(&self.modules, frame);
            let found = body
                .handlers
                .iter()
                .enumerate()
                .skip(from)
                .filter(|(_, handler)| frame.in_region(handler.try_start, handler.try_end, frame.pc))
                .find_map(|(idx, handler)| match &handler.kind {
                    HandlerKind::Catch(ty) if catches(ty, &type_name) => {
                        Some((idx, handler.handler_start, true))
                    }
                    HandlerKind::Catch(_) => None,
                    HandlerKind::Finally | HandlerKind::Fault => {
                        Some((idx, handler.handler_start, false))
                    }
                });

            let Some((idx, start, is_catch)) = found else {
                self.frames.pop();
                from = 0;
                continue;
            };

            let frame = self.top_mut();
            frame.stack.clear();
            frame.unwinds.clear();
            if is_catch {
                frame.push(Value::Obj(exception));
            } else {
                frame.unwinds.push(Unwind::Throw {
                    exception,
                    next: idx + 1,
                    origin: frame.pc,
                });
            }
            frame.pc = start;
            return Ok(Flow::Stay);
        }
    }

    fn resolve_type(
        &self,
        current: ModuleId,
        named: &NamedType,
    ) -> Result<(ModuleId, TypeDefId), InterpretError> {
        let module = match &named.scope {
            Some(scope) => *self
                .module_ids
                .get(scope)
                .ok_or_else(|| InterpretError::UnresolvedModule(scope.clone()))?,
            None => current,
        };
        let ty = self.modules[module]
            .type_by_name(&named.name)
            .ok_or_else(|| InterpretError::UnresolvedMethod(named.to_string()))?;
        Ok((module, ty))
    }

    fn resolve_method(
        &self,
        current: ModuleId,
        parent: &Type,
        name: &str,
        param_count: usize,
    ) -> Result<(ModuleId, TypeDefId, FuncRef), InterpretError> {
        let unresolved = || InterpretError::UnresolvedMethod(format!("{parent}::{name}"));
        let named = parent.as_named().ok_or_else(unresolved)?;
        let (module, ty) = self.resolve_type(current, named)?;
        let func = self.modules[module]
            .find_method(ty, name, param_count)
            .ok_or_else(unresolved)?;
        Ok((module, ty, func))
    }

    fn static_key(
        &self,
        field: FieldRef,
    ) -> Result<((ModuleId, SmolStr, SmolStr), Type), InterpretError> {
        let frame = self.top();
        let data = self.modules[frame.module].members.field_data(field);
        let Some(named) = data.parent.as_named() else {
            return Err(InterpretError::UnresolvedField(format!(
                "{}::{}",
                data.parent, data.name
            )));
        };
        let (module, _) = self.resolve_type(frame.module, named)?;
        let key = (module, named.name.clone(), data.name.clone());
        Ok((key, data.ty.substitute(&frame.type_args)))
    }

    fn field_slot(&mut self, op: Opcode, obj: Value, name: &str) -> Result<&mut Value, Fault> {
        match obj {
            Value::Obj(obj) => match self.heap.get_mut(obj) {
                HeapObject::Instance { ty, fields } => fields.get_mut(name).ok_or_else(|| {
                    InterpretError::UnresolvedField(format!("{ty}::{name}")).into()
                }),
                HeapObject::Array { .. } => Err(mismatch(op, &Value::Obj(obj)).into()),
            },
            Value::Null => Err(Fault::Exception(NULL_REFERENCE)),
            value => Err(mismatch(op, &value).into()),
        }
    }

    fn elems_mut(&mut self, op: Opcode, array: &Value) -> Result<&mut Vec<Value>, Fault> {
        match array {
            Value::Obj(obj) => match self.heap.get_mut(*obj) {
                HeapObject::Array { elems, .. } => Ok(elems),
                HeapObject::Instance { .. } => Err(mismatch(op, array).into()),
            },
            Value::Null => Err(Fault::Exception(NULL_REFERENCE)),
            value => Err(mismatch(op, value).into()),
        }
    }
}

fn body_of<'a>(modules: &'a PrimaryMap<ModuleId, Module>, frame: &Frame) -> &'a Body {
    modules[frame.module].funcs[frame.func]
        .body()
        .expect("frames are only created for methods with a body")
}

fn catches(ty: &Type, type_name: &str) -> bool {
    match ty {
        Type::Object => true,
        Type::Named(named) => named.name == type_name || named.name == "System.Exception",
        _ => false,
    }
}

fn target(data: &InstData) -> Result<InstId, InterpretError> {
    match data.operand {
        Operand::Target(target) => Ok(target),
        _ => Err(invalid_operand(data)),
    }
}

fn invalid_operand(data: &InstData) -> InterpretError {
    InterpretError::InvalidProgram(format!("invalid operand for `{}`", data.opcode))
}

fn invalid_slot(data: &InstData) -> InterpretError {
    InterpretError::InvalidProgram(format!("`{}` accesses an undeclared slot", data.opcode))
}

fn mismatch(op: Opcode, value: &Value) -> InterpretError {
    InterpretError::TypeMismatch {
        op,
        found: value.kind().to_string(),
    }
}

fn mismatch2(op: Opcode, lhs: &Value, rhs: &Value) -> InterpretError {
    InterpretError::TypeMismatch {
        op,
        found: format!("{} and {}", lhs.kind(), rhs.kind()),
    }
}

fn array_index(op: Opcode, index: &Value) -> Result<usize, Fault> {
    let index = match index {
        Value::I4(idx) => *idx as i64,
        Value::I8(idx) => *idx,
        value => return Err(mismatch(op, value).into()),
    };
    usize::try_from(index).map_err(|_| Fault::Exception(INDEX_OUT_OF_RANGE))
}

/// Orders two stack values. `None` means unordered, i.e. unequal
/// references or a comparison involving NaN.
fn compare(op: Opcode, lhs: &Value, rhs: &Value) -> Result<Option<Ordering>, InterpretError> {
    let ord = match (lhs, rhs) {
        (Value::I4(a), Value::I4(b)) => Some(a.cmp(b)),
        (Value::I8(a), Value::I8(b)) => Some(a.cmp(b)),
        (Value::R4(a), Value::R4(b)) => a.partial_cmp(b),
        (Value::R8(a), Value::R8(b)) => a.partial_cmp(b),
        (Value::R4(a), Value::R8(b)) => (*a as f64).partial_cmp(b),
        (Value::R8(a), Value::R4(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Obj(a), Value::Obj(b)) => (a == b).then_some(Ordering::Equal),
        (Value::Str(a), Value::Str(b)) => (a == b).then_some(Ordering::Equal),
        (Value::Null, Value::Obj(_) | Value::Str(_))
        | (Value::Obj(_) | Value::Str(_), Value::Null) => None,
        _ => return Err(mismatch2(op, lhs, rhs)),
    };
    Ok(ord)
}

fn binary(op: Opcode, lhs: Value, rhs: Value) -> Result<Value, Fault> {
    macro_rules! int {
        ($a:expr, $b:expr) => {
            match op {
                Opcode::Add => $a.wrapping_add($b),
                Opcode::Sub => $a.wrapping_sub($b),
                Opcode::Mul => $a.wrapping_mul($b),
                Opcode::Div | Opcode::Rem if $b == 0 => {
                    return Err(Fault::Exception(DIVIDE_BY_ZERO));
                }
                Opcode::Div => $a.checked_div($b).ok_or(Fault::Exception(ARITHMETIC))?,
                Opcode::Rem => $a.checked_rem($b).ok_or(Fault::Exception(ARITHMETIC))?,
                Opcode::And => $a & $b,
                Opcode::Or => $a | $b,
                _ => $a ^ $b,
            }
        };
    }
    macro_rules! float {
        ($a:expr, $b:expr) => {
            match op {
                Opcode::Add => $a + $b,
                Opcode::Sub => $a - $b,
                Opcode::Mul => $a * $b,
                Opcode::Div => $a / $b,
                Opcode::Rem => $a % $b,
                _ => return Err(mismatch2(op, &lhs, &rhs).into()),
            }
        };
    }

    let value = match (&lhs, &rhs) {
        (Value::I4(a), Value::I4(b)) => Value::I4(int!(*a, *b)),
        (Value::I8(a), Value::I8(b)) => Value::I8(int!(*a, *b)),
        (Value::R4(a), Value::R4(b)) => Value::R4(float!(*a, *b)),
        (Value::R8(a), Value::R8(b)) => Value::R8(float!(*a, *b)),
        (Value::R4(a), Value::R8(b)) => Value::R8(float!(*a as f64, *b)),
        (Value::R8(a), Value::R4(b)) => Value::R8(float!(*a, *b as f64)),
        _ => return Err(mismatch2(op, &lhs, &rhs).into()),
    };
    Ok(value)
}

fn shift(op: Opcode, value: Value, amount: Value) -> Result<Value, InterpretError> {
    let Some(amount) = amount.as_i4() else {
        return Err(mismatch(op, &amount));
    };
    let amount = amount as u32;
    let value = match (op, value) {
        (Opcode::Shl, Value::I4(v)) => Value::I4(v.wrapping_shl(amount)),
        (Opcode::Shl, Value::I8(v)) => Value::I8(v.wrapping_shl(amount)),
        (Opcode::Shr, Value::I4(v)) => Value::I4(v.wrapping_shr(amount)),
        (Opcode::Shr, Value::I8(v)) => Value::I8(v.wrapping_shr(amount)),
        (_, value) => return Err(mismatch(op, &value)),
    };
    Ok(value)
}

fn convert(op: Opcode, value: Value) -> Result<Value, InterpretError> {
    let value = match (op, value) {
        (Opcode::ConvI4, Value::I4(v)) => Value::I4(v),
        (Opcode::ConvI4, Value::I8(v)) => Value::I4(v as i32),
        (Opcode::ConvI4, Value::R4(v)) => Value::I4(v as i32),
        (Opcode::ConvI4, Value::R8(v)) => Value::I4(v as i32),
        (Opcode::ConvI8, Value::I4(v)) => Value::I8(v as i64),
        (Opcode::ConvI8, Value::I8(v)) => Value::I8(v),
        (Opcode::ConvI8, Value::R4(v)) => Value::I8(v as i64),
        (Opcode::ConvI8, Value::R8(v)) => Value::I8(v as i64),
        (Opcode::ConvR4, Value::I4(v)) => Value::R4(v as f32),
        (Opcode::ConvR4, Value::I8(v)) => Value::R4(v as f32),
        (Opcode::ConvR4, Value::R4(v)) => Value::R4(v),
        (Opcode::ConvR4, Value::R8(v)) => Value::R4(v as f32),
        (Opcode::ConvR8, Value::I4(v)) => Value::R8(v as f64),
        (Opcode::ConvR8, Value::I8(v)) => Value::R8(v as f64),
        (Opcode::ConvR8, Value::R4(v)) => Value::R8(v as f64),
        (Opcode::ConvR8, Value::R8(v)) => Value::R8(v),
        (_, value) => return Err(mismatch(op, &value)),
    };
    Ok(value)
}

/// Representation of an array element, as selected by the element access
/// opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElemKind {
    I1,
    U1,
    I2,
    U2,
    I4,
    I8,
    R4,
    R8,
    Any,
}

impl ElemKind {
    fn of(data: &InstData, type_args: &[Type]) -> Self {
        let opcode = match &data.operand {
            Operand::Type(ty) => {
                let ty = ty.substitute(type_args);
                if data.opcode == Opcode::Ldelem {
                    InstData::load_elem(&ty).opcode
                } else {
                    InstData::store_elem(&ty).opcode
                }
            }
            _ => data.opcode,
        };

        match opcode {
            Opcode::LdelemI1 | Opcode::StelemI1 => Self::I1,
            Opcode::LdelemU1 => Self::U1,
            Opcode::LdelemI2 | Opcode::StelemI2 => Self::I2,
            Opcode::LdelemU2 => Self::U2,
            Opcode::LdelemI4 | Opcode::LdelemU4 | Opcode::StelemI4 => Self::I4,
            Opcode::LdelemI8 | Opcode::StelemI8 => Self::I8,
            Opcode::LdelemR4 | Opcode::StelemR4 => Self::R4,
            Opcode::LdelemR8 | Opcode::StelemR8 => Self::R8,
            _ => Self::Any,
        }
    }

    /// Converts a stored element to its stack representation.
    fn widen(self, op: Opcode, value: Value) -> Result<Value, InterpretError> {
        let value = match (self, value) {
            (Self::I1, Value::I4(v)) => Value::I4(v as i8 as i32),
            (Self::U1, Value::I4(v)) => Value::I4(v as u8 as i32),
            (Self::I2, Value::I4(v)) => Value::I4(v as i16 as i32),
            (Self::U2, Value::I4(v)) => Value::I4(v as u16 as i32),
            (Self::I4, Value::I4(v)) => Value::I4(v),
            (Self::I8, Value::I8(v)) => Value::I8(v),
            (Self::R4, Value::R4(v)) => Value::R4(v),
            (Self::R8, Value::R8(v)) => Value::R8(v),
            (Self::Any, value) => value,
            (_, value) => return Err(mismatch(op, &value)),
        };
        Ok(value)
    }

    /// Converts a stack value to the representation stored in the array.
    fn narrow(self, op: Opcode, value: Value) -> Result<Value, InterpretError> {
        let value = match (self, value) {
            (Self::I1 | Self::U1, Value::I4(v)) => Value::I4(v as i8 as i32),
            (Self::I2 | Self::U2, Value::I4(v)) => Value::I4(v as i16 as i32),
            (Self::I4, Value::I4(v)) => Value::I4(v),
            (Self::I8, Value::I8(v)) => Value::I8(v),
            (Self::I8, Value::I4(v)) => Value::I8(v as i64),
            (Self::R4, Value::R4(v)) => Value::R4(v),
            (Self::R4, Value::R8(v)) => Value::R4(v as f32),
            (Self::R8, Value::R8(v)) => Value::R8(v),
            (Self::R8, Value::R4(v)) => Value::R8(v as f64),
            (Self::Any, value) => value,
            (_, value) => return Err(mismatch(op, &value)),
        };
        Ok(value)
    }
}
