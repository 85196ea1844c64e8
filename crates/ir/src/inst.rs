//! Instructions of the stack machine.
//!
//! An instruction is an [`Opcode`] paired with an [`Operand`]. Instructions
//! are allocated in the body's arena and addressed by [`InstId`], which stays
//! valid for the lifetime of the body: rewriting an instruction replaces its
//! data but keeps the handle, so branches that point at it keep pointing at
//! it.
use std::fmt;

use cranelift_entity::{entity_impl, EntityRef};
use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::{
    body::LocalId,
    function::ArgId,
    module::{FieldRef, MemberStore, MethodRef},
    Type,
};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);
entity_impl!(InstId, "inst");

/// Operand shape of an opcode. It fixes the encoded operand size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    None,
    ShortArg,
    Arg,
    ShortLocal,
    Local,
    ShortI4,
    I4,
    I8,
    R4,
    R8,
    String,
    Field,
    Method,
    Type,
    ShortTarget,
    Target,
    Switch,
}

impl OperandKind {
    /// Encoded size of the operand in bytes. The size of a `switch` operand
    /// depends on the number of targets; this returns the size of its count.
    pub fn size(self) -> u32 {
        match self {
            Self::None => 0,
            Self::ShortArg | Self::ShortLocal | Self::ShortI4 | Self::ShortTarget => 1,
            Self::Arg | Self::Local => 2,
            Self::I4
            | Self::R4
            | Self::String
            | Self::Field
            | Self::Method
            | Self::Type
            | Self::Target
            | Self::Switch => 4,
            Self::I8 | Self::R8 => 8,
        }
    }

    pub fn is_branch(self) -> bool {
        matches!(self, Self::ShortTarget | Self::Target | Self::Switch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackBehaviour {
    Fixed { pop: u8, push: u8 },
    /// Pops the arguments (and receiver) of the callee, pushes its result.
    Call,
    /// Pops the constructor arguments, pushes the new object.
    Newobj,
    /// Pops the return value of the enclosing method, if any.
    Ret,
    /// Empties the evaluation stack.
    PopAll,
}

const fn fixed(pop: u8, push: u8) -> StackBehaviour {
    StackBehaviour::Fixed { pop, push }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    Next,
    Branch,
    CondBranch,
    Return,
    Throw,
}

impl FlowControl {
    /// Returns `true` if control never falls through to the next instruction.
    pub fn is_unconditional(self) -> bool {
        matches!(self, Self::Branch | Self::Return | Self::Throw)
    }
}

macro_rules! opcodes {
    ($($name:ident => $text:literal, $size:literal, $operand:ident, $stack:expr, $flow:ident;)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $($name,)*
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$name => $text,)*
                }
            }

            /// Encoded size of the opcode itself, excluding its operand.
            pub fn size(self) -> u32 {
                match self {
                    $(Self::$name => $size,)*
                }
            }

            pub fn operand_kind(self) -> OperandKind {
                match self {
                    $(Self::$name => OperandKind::$operand,)*
                }
            }

            pub fn stack_behaviour(self) -> StackBehaviour {
                match self {
                    $(Self::$name => $stack,)*
                }
            }

            pub fn flow(self) -> FlowControl {
                match self {
                    $(Self::$name => FlowControl::$flow,)*
                }
            }
        }
    };
}

opcodes! {
    Nop => "nop", 1, None, fixed(0, 0), Next;

    Ldarg0 => "ldarg.0", 1, None, fixed(0, 1), Next;
    Ldarg1 => "ldarg.1", 1, None, fixed(0, 1), Next;
    Ldarg2 => "ldarg.2", 1, None, fixed(0, 1), Next;
    Ldarg3 => "ldarg.3", 1, None, fixed(0, 1), Next;
    LdargS => "ldarg.s", 1, ShortArg, fixed(0, 1), Next;
    Ldarg => "ldarg", 2, Arg, fixed(0, 1), Next;
    LdargaS => "ldarga.s", 1, ShortArg, fixed(0, 1), Next;
    Ldarga => "ldarga", 2, Arg, fixed(0, 1), Next;
    StargS => "starg.s", 1, ShortArg, fixed(1, 0), Next;
    Starg => "starg", 2, Arg, fixed(1, 0), Next;

    Ldloc0 => "ldloc.0", 1, None, fixed(0, 1), Next;
    Ldloc1 => "ldloc.1", 1, None, fixed(0, 1), Next;
    Ldloc2 => "ldloc.2", 1, None, fixed(0, 1), Next;
    Ldloc3 => "ldloc.3", 1, None, fixed(0, 1), Next;
    LdlocS => "ldloc.s", 1, ShortLocal, fixed(0, 1), Next;
    Ldloc => "ldloc", 2, Local, fixed(0, 1), Next;
    LdlocaS => "ldloca.s", 1, ShortLocal, fixed(0, 1), Next;
    Ldloca => "ldloca", 2, Local, fixed(0, 1), Next;
    Stloc0 => "stloc.0", 1, None, fixed(1, 0), Next;
    Stloc1 => "stloc.1", 1, None, fixed(1, 0), Next;
    Stloc2 => "stloc.2", 1, None, fixed(1, 0), Next;
    Stloc3 => "stloc.3", 1, None, fixed(1, 0), Next;
    StlocS => "stloc.s", 1, ShortLocal, fixed(1, 0), Next;
    Stloc => "stloc", 2, Local, fixed(1, 0), Next;

    Ldnull => "ldnull", 1, None, fixed(0, 1), Next;
    LdcI4M1 => "ldc.i4.m1", 1, None, fixed(0, 1), Next;
    LdcI4_0 => "ldc.i4.0", 1, None, fixed(0, 1), Next;
    LdcI4_1 => "ldc.i4.1", 1, None, fixed(0, 1), Next;
    LdcI4_2 => "ldc.i4.2", 1, None, fixed(0, 1), Next;
    LdcI4_3 => "ldc.i4.3", 1, None, fixed(0, 1), Next;
    LdcI4_4 => "ldc.i4.4", 1, None, fixed(0, 1), Next;
    LdcI4_5 => "ldc.i4.5", 1, None, fixed(0, 1), Next;
    LdcI4_6 => "ldc.i4.6", 1, None, fixed(0, 1), Next;
    LdcI4_7 => "ldc.i4.7", 1, None, fixed(0, 1), Next;
    LdcI4_8 => "ldc.i4.8", 1, None, fixed(0, 1), Next;
    LdcI4S => "ldc.i4.s", 1, ShortI4, fixed(0, 1), Next;
    LdcI4 => "ldc.i4", 1, I4, fixed(0, 1), Next;
    LdcI8 => "ldc.i8", 1, I8, fixed(0, 1), Next;
    LdcR4 => "ldc.r4", 1, R4, fixed(0, 1), Next;
    LdcR8 => "ldc.r8", 1, R8, fixed(0, 1), Next;
    Ldstr => "ldstr", 1, String, fixed(0, 1), Next;

    Dup => "dup", 1, None, fixed(1, 2), Next;
    Pop => "pop", 1, None, fixed(1, 0), Next;

    Call => "call", 1, Method, StackBehaviour::Call, Next;
    Callvirt => "callvirt", 1, Method, StackBehaviour::Call, Next;
    Newobj => "newobj", 1, Method, StackBehaviour::Newobj, Next;
    Ret => "ret", 1, None, StackBehaviour::Ret, Return;

    BrS => "br.s", 1, ShortTarget, fixed(0, 0), Branch;
    Br => "br", 1, Target, fixed(0, 0), Branch;
    BrfalseS => "brfalse.s", 1, ShortTarget, fixed(1, 0), CondBranch;
    Brfalse => "brfalse", 1, Target, fixed(1, 0), CondBranch;
    BrtrueS => "brtrue.s", 1, ShortTarget, fixed(1, 0), CondBranch;
    Brtrue => "brtrue", 1, Target, fixed(1, 0), CondBranch;
    BeqS => "beq.s", 1, ShortTarget, fixed(2, 0), CondBranch;
    Beq => "beq", 1, Target, fixed(2, 0), CondBranch;
    BgeS => "bge.s", 1, ShortTarget, fixed(2, 0), CondBranch;
    Bge => "bge", 1, Target, fixed(2, 0), CondBranch;
    BgtS => "bgt.s", 1, ShortTarget, fixed(2, 0), CondBranch;
    Bgt => "bgt", 1, Target, fixed(2, 0), CondBranch;
    BleS => "ble.s", 1, ShortTarget, fixed(2, 0), CondBranch;
    Ble => "ble", 1, Target, fixed(2, 0), CondBranch;
    BltS => "blt.s", 1, ShortTarget, fixed(2, 0), CondBranch;
    Blt => "blt", 1, Target, fixed(2, 0), CondBranch;
    BneUnS => "bne.un.s", 1, ShortTarget, fixed(2, 0), CondBranch;
    BneUn => "bne.un", 1, Target, fixed(2, 0), CondBranch;
    Switch => "switch", 1, Switch, fixed(1, 0), CondBranch;

    Add => "add", 1, None, fixed(2, 1), Next;
    Sub => "sub", 1, None, fixed(2, 1), Next;
    Mul => "mul", 1, None, fixed(2, 1), Next;
    Div => "div", 1, None, fixed(2, 1), Next;
    Rem => "rem", 1, None, fixed(2, 1), Next;
    And => "and", 1, None, fixed(2, 1), Next;
    Or => "or", 1, None, fixed(2, 1), Next;
    Xor => "xor", 1, None, fixed(2, 1), Next;
    Shl => "shl", 1, None, fixed(2, 1), Next;
    Shr => "shr", 1, None, fixed(2, 1), Next;
    Neg => "neg", 1, None, fixed(1, 1), Next;
    Not => "not", 1, None, fixed(1, 1), Next;
    Ceq => "ceq", 2, None, fixed(2, 1), Next;
    Cgt => "cgt", 2, None, fixed(2, 1), Next;
    Clt => "clt", 2, None, fixed(2, 1), Next;
    ConvI4 => "conv.i4", 1, None, fixed(1, 1), Next;
    ConvI8 => "conv.i8", 1, None, fixed(1, 1), Next;
    ConvR4 => "conv.r4", 1, None, fixed(1, 1), Next;
    ConvR8 => "conv.r8", 1, None, fixed(1, 1), Next;

    Ldfld => "ldfld", 1, Field, fixed(1, 1), Next;
    Ldflda => "ldflda", 1, Field, fixed(1, 1), Next;
    Stfld => "stfld", 1, Field, fixed(2, 0), Next;
    Ldsfld => "ldsfld", 1, Field, fixed(0, 1), Next;
    Stsfld => "stsfld", 1, Field, fixed(1, 0), Next;

    Newarr => "newarr", 1, Type, fixed(1, 1), Next;
    Ldlen => "ldlen", 1, None, fixed(1, 1), Next;
    LdelemI1 => "ldelem.i1", 1, None, fixed(2, 1), Next;
    LdelemU1 => "ldelem.u1", 1, None, fixed(2, 1), Next;
    LdelemI2 => "ldelem.i2", 1, None, fixed(2, 1), Next;
    LdelemU2 => "ldelem.u2", 1, None, fixed(2, 1), Next;
    LdelemI4 => "ldelem.i4", 1, None, fixed(2, 1), Next;
    LdelemU4 => "ldelem.u4", 1, None, fixed(2, 1), Next;
    LdelemI8 => "ldelem.i8", 1, None, fixed(2, 1), Next;
    LdelemR4 => "ldelem.r4", 1, None, fixed(2, 1), Next;
    LdelemR8 => "ldelem.r8", 1, None, fixed(2, 1), Next;
    LdelemRef => "ldelem.ref", 1, None, fixed(2, 1), Next;
    Ldelem => "ldelem", 1, Type, fixed(2, 1), Next;
    StelemI1 => "stelem.i1", 1, None, fixed(3, 0), Next;
    StelemI2 => "stelem.i2", 1, None, fixed(3, 0), Next;
    StelemI4 => "stelem.i4", 1, None, fixed(3, 0), Next;
    StelemI8 => "stelem.i8", 1, None, fixed(3, 0), Next;
    StelemR4 => "stelem.r4", 1, None, fixed(3, 0), Next;
    StelemR8 => "stelem.r8", 1, None, fixed(3, 0), Next;
    StelemRef => "stelem.ref", 1, None, fixed(3, 0), Next;
    Stelem => "stelem", 1, Type, fixed(3, 0), Next;

    Throw => "throw", 1, None, fixed(1, 0), Throw;
    LeaveS => "leave.s", 1, ShortTarget, StackBehaviour::PopAll, Branch;
    Leave => "leave", 1, Target, StackBehaviour::PopAll, Branch;
    Endfinally => "endfinally", 1, None, StackBehaviour::PopAll, Return;
}

impl Opcode {
    pub fn from_text(text: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.as_str() == text)
    }

    /// Slot index or constant encoded in the opcode itself.
    pub fn implicit_operand(self) -> Option<i32> {
        let imm = match self {
            Self::Ldarg0 | Self::Ldloc0 | Self::Stloc0 | Self::LdcI4_0 => 0,
            Self::Ldarg1 | Self::Ldloc1 | Self::Stloc1 | Self::LdcI4_1 => 1,
            Self::Ldarg2 | Self::Ldloc2 | Self::Stloc2 | Self::LdcI4_2 => 2,
            Self::Ldarg3 | Self::Ldloc3 | Self::Stloc3 | Self::LdcI4_3 => 3,
            Self::LdcI4_4 => 4,
            Self::LdcI4_5 => 5,
            Self::LdcI4_6 => 6,
            Self::LdcI4_7 => 7,
            Self::LdcI4_8 => 8,
            Self::LdcI4M1 => -1,
            _ => return None,
        };
        Some(imm)
    }

    /// Returns the canonical long form of a macro opcode, or `self` if the
    /// opcode has no shorter encoding.
    pub fn long_form(self) -> Self {
        match self {
            Self::Ldarg0 | Self::Ldarg1 | Self::Ldarg2 | Self::Ldarg3 | Self::LdargS => Self::Ldarg,
            Self::LdargaS => Self::Ldarga,
            Self::StargS => Self::Starg,
            Self::Ldloc0 | Self::Ldloc1 | Self::Ldloc2 | Self::Ldloc3 | Self::LdlocS => Self::Ldloc,
            Self::LdlocaS => Self::Ldloca,
            Self::Stloc0 | Self::Stloc1 | Self::Stloc2 | Self::Stloc3 | Self::StlocS => Self::Stloc,
            Self::LdcI4M1
            | Self::LdcI4_0
            | Self::LdcI4_1
            | Self::LdcI4_2
            | Self::LdcI4_3
            | Self::LdcI4_4
            | Self::LdcI4_5
            | Self::LdcI4_6
            | Self::LdcI4_7
            | Self::LdcI4_8
            | Self::LdcI4S => Self::LdcI4,
            Self::BrS => Self::Br,
            Self::BrfalseS => Self::Brfalse,
            Self::BrtrueS => Self::Brtrue,
            Self::BeqS => Self::Beq,
            Self::BgeS => Self::Bge,
            Self::BgtS => Self::Bgt,
            Self::BleS => Self::Ble,
            Self::BltS => Self::Blt,
            Self::BneUnS => Self::BneUn,
            Self::LeaveS => Self::Leave,
            _ => self,
        }
    }

    pub fn is_macro(self) -> bool {
        self.long_form() != self
    }

    /// Short encoding of a long branch.
    pub fn short_branch(self) -> Option<Self> {
        let short = match self {
            Self::Br => Self::BrS,
            Self::Brfalse => Self::BrfalseS,
            Self::Brtrue => Self::BrtrueS,
            Self::Beq => Self::BeqS,
            Self::Bge => Self::BgeS,
            Self::Bgt => Self::BgtS,
            Self::Ble => Self::BleS,
            Self::Blt => Self::BltS,
            Self::BneUn => Self::BneUnS,
            Self::Leave => Self::LeaveS,
            _ => return None,
        };
        Some(short)
    }

    pub fn is_call(self) -> bool {
        matches!(self, Self::Call | Self::Callvirt)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Immediate {
    I4(i32),
    I8(i64),
    R4(f32),
    R8(f64),
    Str(SmolStr),
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I4(v) => write!(f, "{v}"),
            Self::I8(v) => write!(f, "{v}"),
            Self::R4(v) => write!(f, "{v:?}"),
            Self::R8(v) => write!(f, "{v:?}"),
            Self::Str(s) => write!(f, "{:?}", s.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Imm(Immediate),
    Arg(ArgId),
    Local(LocalId),
    Field(FieldRef),
    Method(MethodRef),
    Type(Type),
    Target(InstId),
    Targets(SmallVec<[InstId; 4]>),
}

/// An argument or local slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Variable {
    Arg(ArgId),
    Local(LocalId),
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arg(arg) => write!(f, "arg{}", arg.index()),
            Self::Local(local) => write!(f, "loc{}", local.index()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstData {
    pub opcode: Opcode,
    pub operand: Operand,
}

impl InstData {
    pub fn new(opcode: Opcode, operand: Operand) -> Self {
        Self { opcode, operand }
    }

    pub fn simple(opcode: Opcode) -> Self {
        Self::new(opcode, Operand::None)
    }

    pub fn ldarg(arg: ArgId) -> Self {
        Self::new(Opcode::Ldarg, Operand::Arg(arg))
    }

    pub fn starg(arg: ArgId) -> Self {
        Self::new(Opcode::Starg, Operand::Arg(arg))
    }

    pub fn ldloc(local: LocalId) -> Self {
        Self::new(Opcode::Ldloc, Operand::Local(local))
    }

    pub fn stloc(local: LocalId) -> Self {
        Self::new(Opcode::Stloc, Operand::Local(local))
    }

    /// Loads the given variable.
    pub fn load(var: Variable) -> Self {
        match var {
            Variable::Arg(arg) => Self::ldarg(arg),
            Variable::Local(local) => Self::ldloc(local),
        }
    }

    pub fn ldc_i4(value: i32) -> Self {
        Self::new(Opcode::LdcI4, Operand::Imm(Immediate::I4(value)))
    }

    pub fn ldfld(field: FieldRef) -> Self {
        Self::new(Opcode::Ldfld, Operand::Field(field))
    }

    pub fn call(method: MethodRef) -> Self {
        Self::new(Opcode::Call, Operand::Method(method))
    }

    pub fn callvirt(method: MethodRef) -> Self {
        Self::new(Opcode::Callvirt, Operand::Method(method))
    }

    pub fn branch(opcode: Opcode, target: InstId) -> Self {
        debug_assert!(opcode.operand_kind().is_branch());
        Self::new(opcode, Operand::Target(target))
    }

    /// Element load specialized to `elem`.
    pub fn load_elem(elem: &Type) -> Self {
        let opcode = match elem {
            Type::Bool | Type::U8 => Opcode::LdelemU1,
            Type::I8 => Opcode::LdelemI1,
            Type::I16 => Opcode::LdelemI2,
            Type::U16 | Type::Char => Opcode::LdelemU2,
            Type::I32 => Opcode::LdelemI4,
            Type::U32 => Opcode::LdelemU4,
            Type::I64 | Type::U64 => Opcode::LdelemI8,
            Type::F32 => Opcode::LdelemR4,
            Type::F64 => Opcode::LdelemR8,
            Type::String | Type::Object | Type::Array(_) => Opcode::LdelemRef,
            _ => return Self::new(Opcode::Ldelem, Operand::Type(elem.clone())),
        };
        Self::simple(opcode)
    }

    /// Element store specialized to `elem`.
    pub fn store_elem(elem: &Type) -> Self {
        let opcode = match elem {
            Type::Bool | Type::I8 | Type::U8 => Opcode::StelemI1,
            Type::I16 | Type::U16 | Type::Char => Opcode::StelemI2,
            Type::I32 | Type::U32 => Opcode::StelemI4,
            Type::I64 | Type::U64 => Opcode::StelemI8,
            Type::F32 => Opcode::StelemR4,
            Type::F64 => Opcode::StelemR8,
            Type::String | Type::Object | Type::Array(_) => Opcode::StelemRef,
            _ => return Self::new(Opcode::Stelem, Operand::Type(elem.clone())),
        };
        Self::simple(opcode)
    }

    pub fn flow(&self) -> FlowControl {
        self.opcode.flow()
    }

    /// Slot index of an argument or local access in any encoding.
    fn slot(&self) -> Option<u32> {
        if let Some(idx) = self.opcode.implicit_operand() {
            return Some(idx as u32);
        }
        match self.operand {
            Operand::Arg(arg) => Some(arg.index() as u32),
            Operand::Local(local) => Some(local.index() as u32),
            _ => None,
        }
    }

    /// Returns the variable whose value this instruction pushes.
    pub fn loaded_var(&self) -> Option<Variable> {
        let slot = self.slot()? as usize;
        match self.opcode.long_form() {
            Opcode::Ldarg => Some(Variable::Arg(ArgId::new(slot))),
            Opcode::Ldloc => Some(Variable::Local(LocalId::new(slot))),
            _ => None,
        }
    }

    /// Returns the variable whose address this instruction pushes.
    pub fn addressed_var(&self) -> Option<Variable> {
        let slot = self.slot()? as usize;
        match self.opcode.long_form() {
            Opcode::Ldarga => Some(Variable::Arg(ArgId::new(slot))),
            Opcode::Ldloca => Some(Variable::Local(LocalId::new(slot))),
            _ => None,
        }
    }

    /// Returns the variable this instruction stores to.
    pub fn stored_var(&self) -> Option<Variable> {
        let slot = self.slot()? as usize;
        match self.opcode.long_form() {
            Opcode::Starg => Some(Variable::Arg(ArgId::new(slot))),
            Opcode::Stloc => Some(Variable::Local(LocalId::new(slot))),
            _ => None,
        }
    }

    /// Returns the `int32` constant this instruction pushes.
    pub fn i4(&self) -> Option<i32> {
        if self.opcode.long_form() != Opcode::LdcI4 {
            return None;
        }
        if let Some(imm) = self.opcode.implicit_operand() {
            return Some(imm);
        }
        match self.operand {
            Operand::Imm(Immediate::I4(value)) => Some(value),
            _ => None,
        }
    }

    pub fn method(&self) -> Option<MethodRef> {
        match self.operand {
            Operand::Method(method) => Some(method),
            _ => None,
        }
    }

    pub fn field(&self) -> Option<FieldRef> {
        match self.operand {
            Operand::Field(field) => Some(field),
            _ => None,
        }
    }

    pub fn branch_targets(&self) -> &[InstId] {
        match &self.operand {
            Operand::Target(target) => std::slice::from_ref(target),
            Operand::Targets(targets) => targets,
            _ => &[],
        }
    }

    pub fn branch_targets_mut(&mut self) -> &mut [InstId] {
        match &mut self.operand {
            Operand::Target(target) => std::slice::from_mut(target),
            Operand::Targets(targets) => targets,
            _ => &mut [],
        }
    }

    /// Number of values popped and pushed by this instruction. Returns `None`
    /// for instructions that empty the whole stack.
    pub fn stack_effect(&self, members: &MemberStore, ret_ty: &Type) -> Option<(u32, u32)> {
        match self.opcode.stack_behaviour() {
            StackBehaviour::Fixed { pop, push } => Some((pop as u32, push as u32)),
            StackBehaviour::Call => {
                let sig = members.method_data(self.method()?);
                let pop = sig.params.len() as u32 + sig.has_this as u32;
                Some((pop, !sig.ret_ty.is_void() as u32))
            }
            StackBehaviour::Newobj => {
                let sig = members.method_data(self.method()?);
                Some((sig.params.len() as u32, 1))
            }
            StackBehaviour::Ret => Some((!ret_ty.is_void() as u32, 0)),
            StackBehaviour::PopAll => None,
        }
    }

    /// Size of the instruction in its binary encoding.
    pub fn encoded_size(&self) -> u32 {
        let operand = match (&self.operand, self.opcode.operand_kind()) {
            (Operand::Targets(targets), OperandKind::Switch) => 4 + 4 * targets.len() as u32,
            (_, kind) => kind.size(),
        };
        self.opcode.size() + operand
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_formatting() {
        assert_eq!(InstId::new(3).to_string(), "inst3");
        assert_eq!(format!("{:?}", LocalId::new(1)), "loc1");
        assert_eq!(format!("{:?}", Variable::Arg(ArgId::new(0))), "Arg(arg0)");
    }

    #[test]
    fn decode_macro_forms() {
        let ldloc2 = InstData::simple(Opcode::Ldloc2);
        assert_eq!(ldloc2.loaded_var(), Some(Variable::Local(LocalId::new(2))));
        assert_eq!(ldloc2.stored_var(), None);

        let starg = InstData::new(Opcode::StargS, Operand::Arg(ArgId::new(5)));
        assert_eq!(starg.stored_var(), Some(Variable::Arg(ArgId::new(5))));

        let ldloca = InstData::new(Opcode::LdlocaS, Operand::Local(LocalId::new(1)));
        assert_eq!(ldloca.addressed_var(), Some(Variable::Local(LocalId::new(1))));
        assert_eq!(ldloca.loaded_var(), None);

        assert_eq!(InstData::simple(Opcode::LdcI4M1).i4(), Some(-1));
        assert_eq!(InstData::ldc_i4(300).i4(), Some(300));
    }

    #[test]
    fn encoded_sizes() {
        assert_eq!(InstData::simple(Opcode::Ldarg0).encoded_size(), 1);
        assert_eq!(InstData::ldarg(ArgId::new(4)).encoded_size(), 4);
        assert_eq!(InstData::ldc_i4(7).encoded_size(), 5);
        assert_eq!(InstData::simple(Opcode::Ceq).encoded_size(), 2);

        let targets = SmallVec::from_slice(&[InstId(0), InstId(1), InstId(2)]);
        let switch = InstData::new(Opcode::Switch, Operand::Targets(targets));
        assert_eq!(switch.encoded_size(), 1 + 4 + 12);
    }

    #[test]
    fn opcode_text_round_trip() {
        for &op in Opcode::ALL {
            assert_eq!(Opcode::from_text(op.as_str()), Some(op));
        }
    }

    #[test]
    fn elem_access() {
        assert_eq!(InstData::load_elem(&Type::F32).opcode, Opcode::LdelemR4);
        assert_eq!(InstData::store_elem(&Type::U8).opcode, Opcode::StelemI1);
        let named = Type::named(None, "Point");
        assert_eq!(
            InstData::load_elem(&named),
            InstData::new(Opcode::Ldelem, Operand::Type(named))
        );
    }
}
