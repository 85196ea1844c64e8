//! Normalization of instruction encodings.
//!
//! [`simplify_macros`] rewrites every macro opcode (`ldloc.0`, `ldarg.s`,
//! `ldc.i4.3`, `br.s`, ...) into its long form with an explicit operand, so
//! that passes only see one encoding per operation and inserted instructions
//! never put a short branch out of range. [`optimize_macros`] does the
//! reverse, picking the shortest encoding of every instruction.
//!
//! Both rewrite instructions in place, so instruction handles and branch
//! targets are preserved.
use cranelift_entity::EntityRef;

use crate::{
    body::LocalId,
    function::ArgId,
    inst::{Immediate, InstData, Opcode, Operand},
    Body,
};

pub fn simplify_macros(body: &mut Body) {
    let insts: Vec<_> = body.iter_inst().collect();
    for inst in insts {
        let data = &body.insts[inst];
        if !data.opcode.is_macro() {
            continue;
        }

        let simplified = expand(data);
        body.replace_inst(inst, simplified);
    }
}

fn expand(data: &InstData) -> InstData {
    let long = data.opcode.long_form();
    let operand = match (long, data.opcode.implicit_operand()) {
        (Opcode::Ldarg, Some(slot)) => Operand::Arg(ArgId::new(slot as usize)),
        (Opcode::Ldloc | Opcode::Stloc, Some(slot)) => Operand::Local(LocalId::new(slot as usize)),
        (Opcode::LdcI4, Some(imm)) => Operand::Imm(Immediate::I4(imm)),
        _ => data.operand.clone(),
    };
    InstData::new(long, operand)
}

pub fn optimize_macros(body: &mut Body) {
    let insts: Vec<_> = body.iter_inst().collect();

    for &inst in &insts {
        let data = &body.insts[inst];
        let data = if data.opcode.is_macro() {
            expand(data)
        } else {
            data.clone()
        };
        body.replace_inst(inst, shorten(data));
    }

    optimize_branches(body);
}

fn shorten(data: InstData) -> InstData {
    let InstData { opcode, operand } = data;

    let slot = match &operand {
        Operand::Arg(arg) => Some(arg.index()),
        Operand::Local(local) => Some(local.index()),
        _ => None,
    };

    let opcode = match (opcode, slot) {
        (Opcode::Ldarg, Some(0)) => return InstData::simple(Opcode::Ldarg0),
        (Opcode::Ldarg, Some(1)) => return InstData::simple(Opcode::Ldarg1),
        (Opcode::Ldarg, Some(2)) => return InstData::simple(Opcode::Ldarg2),
        (Opcode::Ldarg, Some(3)) => return InstData::simple(Opcode::Ldarg3),
        (Opcode::Ldloc, Some(0)) => return InstData::simple(Opcode::Ldloc0),
        (Opcode::Ldloc, Some(1)) => return InstData::simple(Opcode::Ldloc1),
        (Opcode::Ldloc, Some(2)) => return InstData::simple(Opcode::Ldloc2),
        (Opcode::Ldloc, Some(3)) => return InstData::simple(Opcode::Ldloc3),
        (Opcode::Stloc, Some(0)) => return InstData::simple(Opcode::Stloc0),
        (Opcode::Stloc, Some(1)) => return InstData::simple(Opcode::Stloc1),
        (Opcode::Stloc, Some(2)) => return InstData::simple(Opcode::Stloc2),
        (Opcode::Stloc, Some(3)) => return InstData::simple(Opcode::Stloc3),
        (Opcode::Ldarg, Some(slot)) if slot < 256 => Opcode::LdargS,
        (Opcode::Ldarga, Some(slot)) if slot < 256 => Opcode::LdargaS,
        (Opcode::Starg, Some(slot)) if slot < 256 => Opcode::StargS,
        (Opcode::Ldloc, Some(slot)) if slot < 256 => Opcode::LdlocS,
        (Opcode::Ldloca, Some(slot)) if slot < 256 => Opcode::LdlocaS,
        (Opcode::Stloc, Some(slot)) if slot < 256 => Opcode::StlocS,
        (Opcode::LdcI4, _) => match operand {
            Operand::Imm(Immediate::I4(value)) => return shorten_i4(value),
            _ => opcode,
        },
        _ => opcode,
    };

    InstData::new(opcode, operand)
}

fn shorten_i4(value: i32) -> InstData {
    let opcode = match value {
        -1 => Opcode::LdcI4M1,
        0 => Opcode::LdcI4_0,
        1 => Opcode::LdcI4_1,
        2 => Opcode::LdcI4_2,
        3 => Opcode::LdcI4_3,
        4 => Opcode::LdcI4_4,
        5 => Opcode::LdcI4_5,
        6 => Opcode::LdcI4_6,
        7 => Opcode::LdcI4_7,
        8 => Opcode::LdcI4_8,
        -128..=127 => {
            return InstData::new(Opcode::LdcI4S, Operand::Imm(Immediate::I4(value)));
        }
        _ => return InstData::ldc_i4(value),
    };
    InstData::simple(opcode)
}

/// Switches every branch whose displacement fits in a signed byte to its
/// short form. Displacements are measured with all branches in long form;
/// shortening a branch only moves instructions closer together, so a
/// displacement that fits stays in range.
fn optimize_branches(body: &mut Body) {
    let offsets = body.offsets();
    let insts: Vec<_> = body.iter_inst().collect();

    for inst in insts {
        let data = &body.insts[inst];
        let Some(short) = data.opcode.short_branch() else {
            continue;
        };
        let Operand::Target(target) = data.operand else {
            continue;
        };

        let end = offsets[inst] as i64 + data.encoded_size() as i64;
        let disp = offsets[target] as i64 - end;
        if (-128..=127).contains(&disp) {
            body.insts[inst].opcode = short;
        }
    }
}
