//! Method body: instruction arena, instruction order, locals and exception
//! handler regions.
use cranelift_entity::{entity_impl, PrimaryMap, SecondaryMap};
use rustc_hash::FxHashSet;
use smol_str::SmolStr;

use crate::{
    inst::{InstData, InstId},
    Layout, Type,
};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub u32);
entity_impl!(LocalId, "loc");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalData {
    pub name: Option<SmolStr>,
    pub ty: Type,
}

impl LocalData {
    pub fn new(name: Option<SmolStr>, ty: Type) -> Self {
        Self { name, ty }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerKind {
    Catch(Type),
    Finally,
    Fault,
}

/// A protected region and its handler. `*_end` is the first instruction after
/// the region, `None` if the region runs to the end of the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub kind: HandlerKind,
    pub try_start: InstId,
    pub try_end: Option<InstId>,
    pub handler_start: InstId,
    pub handler_end: Option<InstId>,
}

impl ExceptionHandler {
    pub fn boundaries(&self) -> impl Iterator<Item = InstId> + '_ {
        [
            Some(self.try_start),
            self.try_end,
            Some(self.handler_start),
            self.handler_end,
        ]
        .into_iter()
        .flatten()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Body {
    pub insts: PrimaryMap<InstId, InstData>,
    pub layout: Layout,
    pub locals: PrimaryMap<LocalId, LocalData>,
    pub handlers: Vec<ExceptionHandler>,
    pub init_locals: bool,
}

impl Body {
    pub fn new() -> Self {
        Self {
            init_locals: true,
            ..Default::default()
        }
    }

    pub fn make_inst(&mut self, data: InstData) -> InstId {
        self.insts.push(data)
    }

    pub fn inst(&self, inst: InstId) -> &InstData {
        &self.insts[inst]
    }

    /// Replaces the data of `inst`, keeping its handle.
    pub fn replace_inst(&mut self, inst: InstId, data: InstData) {
        self.insts[inst] = data;
    }

    pub fn declare_local(&mut self, name: Option<SmolStr>, ty: Type) -> LocalId {
        self.locals.push(LocalData::new(name, ty))
    }

    pub fn iter_inst(&self) -> impl Iterator<Item = InstId> + '_ {
        self.layout.iter_inst()
    }

    pub fn inst_count(&self) -> usize {
        self.layout.iter_inst().count()
    }

    /// Instructions that control can reach from somewhere other than their
    /// predecessor: branch targets and exception region boundaries.
    pub fn jump_targets(&self) -> FxHashSet<InstId> {
        let mut targets = FxHashSet::default();
        for inst in self.layout.iter_inst() {
            targets.extend(self.insts[inst].branch_targets().iter().copied());
        }
        for handler in &self.handlers {
            targets.extend(handler.boundaries());
        }
        targets
    }

    /// Byte offset of each instruction under the current encoding.
    pub fn offsets(&self) -> SecondaryMap<InstId, u32> {
        let mut offsets = SecondaryMap::new();
        let mut offset = 0;
        for inst in self.layout.iter_inst() {
            offsets[inst] = offset;
            offset += self.insts[inst].encoded_size();
        }
        offsets
    }

    /// Total encoded size of the body.
    pub fn code_size(&self) -> u32 {
        self.layout
            .iter_inst()
            .map(|inst| self.insts[inst].encoded_size())
            .sum()
    }

    pub fn local_by_name(&self, name: &str) -> Option<LocalId> {
        self.locals
            .iter()
            .find(|(_, data)| data.name.as_deref() == Some(name))
            .map(|(local, _)| local)
    }
}
