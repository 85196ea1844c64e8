//! This module contains the instruction order of a method body.
use cranelift_entity::SecondaryMap;

use super::InstId;

#[derive(Debug, Clone)]
pub struct Layout {
    insts: SecondaryMap<InstId, InstNode>,
    first_inst: Option<InstId>,
    last_inst: Option<InstId>,
}

impl Default for Layout {
    fn default() -> Self {
        Self::new()
    }
}

impl Layout {
    pub fn new() -> Self {
        Self {
            insts: SecondaryMap::new(),
            first_inst: None,
            last_inst: None,
        }
    }

    pub fn first_inst(&self) -> Option<InstId> {
        self.first_inst
    }

    pub fn last_inst(&self) -> Option<InstId> {
        self.last_inst
    }

    pub fn is_empty(&self) -> bool {
        self.first_inst.is_none()
    }

    pub fn is_first_inst(&self, inst: InstId) -> bool {
        self.first_inst == Some(inst)
    }

    pub fn prev_inst_of(&self, inst: InstId) -> Option<InstId> {
        debug_assert!(self.is_inst_inserted(inst));
        self.insts[inst].prev
    }

    pub fn next_inst_of(&self, inst: InstId) -> Option<InstId> {
        debug_assert!(self.is_inst_inserted(inst));
        self.insts[inst].next
    }

    pub fn is_inst_inserted(&self, inst: InstId) -> bool {
        self.insts[inst].inserted
    }

    pub fn iter_inst(&self) -> impl Iterator<Item = InstId> + '_ {
        InstIter {
            next: self.first_inst,
            insts: &self.insts,
        }
    }

    pub fn iter_inst_rev(&self) -> impl Iterator<Item = InstId> + '_ {
        RevInstIter {
            next: self.last_inst,
            insts: &self.insts,
        }
    }

    pub fn append_inst(&mut self, inst: InstId) {
        debug_assert!(!self.is_inst_inserted(inst));

        let mut inst_node = InstNode::inserted();

        if let Some(last_inst) = self.last_inst {
            inst_node.prev = Some(last_inst);
            self.insts[last_inst].next = Some(inst);
        } else {
            self.first_inst = Some(inst);
        }

        self.last_inst = Some(inst);
        self.insts[inst] = inst_node;
    }

    pub fn prepend_inst(&mut self, inst: InstId) {
        debug_assert!(!self.is_inst_inserted(inst));

        let mut inst_node = InstNode::inserted();

        if let Some(first_inst) = self.first_inst {
            inst_node.next = Some(first_inst);
            self.insts[first_inst].prev = Some(inst);
        } else {
            self.last_inst = Some(inst);
        }

        self.first_inst = Some(inst);
        self.insts[inst] = inst_node;
    }

    pub fn insert_inst_before(&mut self, inst: InstId, before: InstId) {
        debug_assert!(self.is_inst_inserted(before));
        debug_assert!(!self.is_inst_inserted(inst));

        let mut inst_node = InstNode::inserted();

        match self.insts[before].prev {
            Some(prev) => {
                inst_node.prev = Some(prev);
                self.insts[prev].next = Some(inst);
            }
            None => self.first_inst = Some(inst),
        }
        inst_node.next = Some(before);
        self.insts[before].prev = Some(inst);
        self.insts[inst] = inst_node;
    }

    pub fn insert_inst_after(&mut self, inst: InstId, after: InstId) {
        debug_assert!(self.is_inst_inserted(after));
        debug_assert!(!self.is_inst_inserted(inst));

        let mut inst_node = InstNode::inserted();

        match self.insts[after].next {
            Some(next) => {
                inst_node.next = Some(next);
                self.insts[next].prev = Some(inst);
            }
            None => self.last_inst = Some(inst),
        }
        inst_node.prev = Some(after);
        self.insts[after].next = Some(inst);
        self.insts[inst] = inst_node;
    }

    /// Remove instruction from the layout.
    pub fn remove_inst(&mut self, inst: InstId) {
        debug_assert!(self.is_inst_inserted(inst));

        let inst_node = &self.insts[inst];
        let prev_inst = inst_node.prev;
        let next_inst = inst_node.next;
        match (prev_inst, next_inst) {
            (Some(prev), Some(next)) => {
                self.insts[prev].next = Some(next);
                self.insts[next].prev = Some(prev);
            }
            (Some(prev), None) => {
                self.insts[prev].next = None;
                self.last_inst = Some(prev);
            }
            (None, Some(next)) => {
                self.insts[next].prev = None;
                self.first_inst = Some(next);
            }
            (None, None) => {
                self.first_inst = None;
                self.last_inst = None;
            }
        }

        self.insts[inst] = InstNode::default();
    }
}

struct InstIter<'a> {
    next: Option<InstId>,
    insts: &'a SecondaryMap<InstId, InstNode>,
}

impl Iterator for InstIter<'_> {
    type Item = InstId;

    fn next(&mut self) -> Option<InstId> {
        let next = self.next?;
        self.next = self.insts[next].next;
        Some(next)
    }
}

struct RevInstIter<'a> {
    next: Option<InstId>,
    insts: &'a SecondaryMap<InstId, InstNode>,
}

impl Iterator for RevInstIter<'_> {
    type Item = InstId;

    fn next(&mut self) -> Option<InstId> {
        let next = self.next?;
        self.next = self.insts[next].prev;
        Some(next)
    }
}

#[derive(Default, Debug, Clone, PartialEq, Eq)]
struct InstNode {
    inserted: bool,
    /// A previous instruction.
    prev: Option<InstId>,
    /// A next instruction.
    next: Option<InstId>,
}

impl InstNode {
    fn inserted() -> Self {
        Self {
            inserted: true,
            prev: None,
            next: None,
        }
    }
}
