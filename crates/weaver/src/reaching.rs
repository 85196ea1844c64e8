//! Forward reaching analysis of shadow snapshots.
//!
//! A candidate "reaches" an instruction if some path from the candidate's
//! origin to the instruction does not store to the candidate's binding
//! again. A receiver load can only be rewritten to use a candidate's shadow
//! locals if that candidate is the only one of its binding reaching it.
use std::collections::BTreeSet;

use cranelift_entity::SecondaryMap;
use rustc_hash::{FxHashMap, FxHashSet};
use slicefold_ir::{Body, FlowControl, InstId, Opcode};

use crate::{Binding, Candidate, Origin};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reach {
    None,
    Unique(usize),
    Ambiguous,
}

#[derive(Debug, Default)]
pub struct ReachingSnapshots {
    /// Indices of the candidates reaching the entry of each instruction.
    reach_in: SecondaryMap<InstId, BTreeSet<usize>>,
    visited: FxHashSet<InstId>,
    work: Vec<InstId>,
}

impl ReachingSnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute(&mut self, body: &Body, candidates: &[Candidate]) {
        self.clear();
        let Some(entry) = body.layout.first_inst() else {
            return;
        };

        let stores: FxHashMap<InstId, usize> = candidates
            .iter()
            .enumerate()
            .filter_map(|(idx, candidate)| match candidate.origin {
                Origin::Store(inst) => Some((inst, idx)),
                Origin::Entry => None,
            })
            .collect();
        let entry_state = candidates
            .iter()
            .enumerate()
            .filter(|(_, candidate)| candidate.origin == Origin::Entry)
            .map(|(idx, _)| idx)
            .collect();
        let cfg = InstFlow::new(body);

        self.join(entry, &entry_state);
        while let Some(inst) = self.work.pop() {
            let state_in = self.reach_in[inst].clone();
            let mut state_out = state_in.clone();
            if let Some(&idx) = stores.get(&inst) {
                let binding = candidates[idx].binding;
                state_out.retain(|&other| candidates[other].binding != binding);
                state_out.insert(idx);
            }

            for succ in cfg.succs(body, inst) {
                self.join(succ, &state_out);
            }

            // An exception can leave the protected region before or after
            // any instruction in it.
            for &handler in cfg.handlers_covering(inst) {
                self.join(handler, &state_in);
                self.join(handler, &state_out);
            }
        }
    }

    /// Returns the candidate of `binding` reaching `inst`.
    pub fn reaching(&self, inst: InstId, binding: Binding, candidates: &[Candidate]) -> Reach {
        let mut found = self.reach_in[inst]
            .iter()
            .copied()
            .filter(|&idx| candidates[idx].binding == binding);
        match (found.next(), found.next()) {
            (None, _) => Reach::None,
            (Some(idx), None) => Reach::Unique(idx),
            (Some(_), Some(_)) => Reach::Ambiguous,
        }
    }

    pub fn clear(&mut self) {
        self.reach_in.clear();
        self.visited.clear();
        self.work.clear();
    }

    fn join(&mut self, inst: InstId, state: &BTreeSet<usize>) {
        let first_visit = self.visited.insert(inst);
        let current = &mut self.reach_in[inst];
        let before = current.len();
        current.extend(state.iter().copied());
        if first_visit || current.len() != before {
            self.work.push(inst);
        }
    }
}

/// Instruction level control flow of a body.
struct InstFlow {
    offsets: SecondaryMap<InstId, u32>,
    /// Protected regions as `[start, end)` offsets with the first instruction
    /// of their handler.
    regions: Vec<(u32, u32, InstId)>,
    /// Targets of every `leave`, the places an `endfinally` may continue at.
    leave_targets: Vec<InstId>,
}

impl InstFlow {
    fn new(body: &Body) -> Self {
        let offsets = body.offsets();
        let code_size = body.code_size();
        let regions = body
            .handlers
            .iter()
            .map(|handler| {
                let end = handler.try_end.map_or(code_size, |end| offsets[end]);
                (offsets[handler.try_start], end, handler.handler_start)
            })
            .collect();
        let leave_targets = body
            .iter_inst()
            .filter(|&inst| body.inst(inst).opcode.long_form() == Opcode::Leave)
            .flat_map(|inst| body.inst(inst).branch_targets().to_vec())
            .collect();

        Self {
            offsets,
            regions,
            leave_targets,
        }
    }

    fn succs(&self, body: &Body, inst: InstId) -> Vec<InstId> {
        let data = body.inst(inst);
        let mut succs = data.branch_targets().to_vec();
        match data.flow() {
            FlowControl::Next | FlowControl::CondBranch => {
                succs.extend(body.layout.next_inst_of(inst));
            }
            FlowControl::Return if data.opcode == Opcode::Endfinally => {
                succs.extend_from_slice(&self.leave_targets);
            }
            FlowControl::Branch | FlowControl::Return | FlowControl::Throw => {}
        }
        succs
    }

    fn handlers_covering(&self, inst: InstId) -> impl Iterator<Item = &InstId> {
        let at = self.offsets[inst];
        self.regions
            .iter()
            .filter(move |(start, end, _)| *start <= at && at < *end)
            .map(|(_, _, handler)| handler)
    }
}
