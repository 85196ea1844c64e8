use cranelift_entity::SecondaryMap;
use slicefold_ir::{module::FuncRef, Body, InstId, Opcode, Type};

use crate::{heap::ObjRef, machine::ModuleId, InterpretError, Value};

/// Work pending at the end of a `finally` or `fault` block.
#[derive(Debug, Clone)]
pub(crate) enum Unwind {
    /// A `leave` that still has to run the listed finally handlers (by
    /// handler index) before jumping to `target`.
    Leave {
        target: InstId,
        finallys: Vec<usize>,
    },
    /// An exception in flight; dispatch resumes at handler `next`.
    Throw {
        exception: ObjRef,
        next: usize,
        origin: InstId,
    },
}

pub(crate) struct Frame {
    pub module: ModuleId,
    pub func: FuncRef,
    pub pc: InstId,
    pub args: Vec<Value>,
    pub locals: Vec<Value>,
    pub stack: Vec<Value>,
    /// Generic arguments of the declaring type, substituted into `!n`.
    pub type_args: Vec<Type>,
    pub unwinds: Vec<Unwind>,
    /// Value `ret` hands to the caller of a constructor.
    pub ctor_result: Option<Value>,
    offsets: SecondaryMap<InstId, u32>,
}

impl Frame {
    pub fn new(
        module: ModuleId,
        func: FuncRef,
        body: &Body,
        entry: InstId,
        args: Vec<Value>,
        type_args: Vec<Type>,
    ) -> Self {
        let locals = body
            .locals
            .values()
            .map(|local| Value::zero_of(&local.ty.substitute(&type_args)))
            .collect();

        Self {
            module,
            func,
            pc: entry,
            args,
            locals,
            stack: Vec::new(),
            type_args,
            unwinds: Vec::new(),
            ctor_result: None,
            offsets: body.offsets(),
        }
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self, op: Opcode) -> Result<Value, InterpretError> {
        self.stack.pop().ok_or(InterpretError::StackUnderflow(op))
    }

    /// Pops `n` values, returned in push order.
    pub fn pop_n(&mut self, n: usize, op: Opcode) -> Result<Vec<Value>, InterpretError> {
        if self.stack.len() < n {
            return Err(InterpretError::StackUnderflow(op));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    pub fn peek(&self, op: Opcode) -> Result<&Value, InterpretError> {
        self.stack.last().ok_or(InterpretError::StackUnderflow(op))
    }

    /// Returns `true` if `inst` lies in the region `[start, end)`.
    pub fn in_region(&self, start: InstId, end: Option<InstId>, inst: InstId) -> bool {
        let at = self.offsets[inst];
        self.offsets[start] <= at && end.map_or(true, |end| at < self.offsets[end])
    }
}
