use super::{Body, InstData, InstId};

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorLocation {
    At(InstId),
    Top,
    Bottom,
    #[default]
    NoWhere,
}

pub trait FuncCursor {
    fn at_location(loc: CursorLocation) -> Self;
    fn set_location(&mut self, loc: CursorLocation);
    fn loc(&self) -> CursorLocation;

    fn set_to_top(&mut self) {
        self.set_location(CursorLocation::Top);
    }

    /// Inserts `inst` after the cursor location.
    fn insert_inst(&mut self, body: &mut Body, inst: InstId) {
        match self.loc() {
            CursorLocation::At(at) => body.layout.insert_inst_after(inst, at),
            CursorLocation::Top => body.layout.prepend_inst(inst),
            CursorLocation::Bottom => body.layout.append_inst(inst),
            CursorLocation::NoWhere => panic!("cursor loc points to `NoWhere`"),
        }
    }

    fn insert_inst_data(&mut self, body: &mut Body, data: InstData) -> InstId {
        let inst = body.make_inst(data);
        self.insert_inst(body, inst);
        inst
    }

    fn append_inst_data(&mut self, body: &mut Body, data: InstData) -> InstId {
        let inst = body.make_inst(data);
        body.layout.append_inst(inst);
        inst
    }

    fn replace(&mut self, body: &mut Body, data: InstData) {
        let inst = self.expect_inst();
        body.replace_inst(inst, data);
    }

    fn inst(&self) -> Option<InstId> {
        if let CursorLocation::At(inst) = self.loc() {
            Some(inst)
        } else {
            None
        }
    }

    fn expect_inst(&self) -> InstId {
        self.inst()
            .expect("current cursor location doesn't point to inst")
    }

    fn next_loc(&self, body: &Body) -> CursorLocation {
        match self.loc() {
            CursorLocation::At(inst) => body
                .layout
                .next_inst_of(inst)
                .map_or(CursorLocation::Bottom, CursorLocation::At),
            CursorLocation::Top => body
                .layout
                .first_inst()
                .map_or(CursorLocation::Bottom, CursorLocation::At),
            CursorLocation::Bottom | CursorLocation::NoWhere => CursorLocation::NoWhere,
        }
    }

    fn prev_loc(&self, body: &Body) -> CursorLocation {
        match self.loc() {
            CursorLocation::At(inst) => body
                .layout
                .prev_inst_of(inst)
                .map_or(CursorLocation::Top, CursorLocation::At),
            CursorLocation::Bottom => body
                .layout
                .last_inst()
                .map_or(CursorLocation::Top, CursorLocation::At),
            CursorLocation::Top | CursorLocation::NoWhere => CursorLocation::NoWhere,
        }
    }

    fn proceed(&mut self, body: &Body) {
        self.set_location(self.next_loc(body));
    }

    fn back(&mut self, body: &Body) {
        self.set_location(self.prev_loc(body));
    }
}

/// A cursor that inserts instructions in sequence: every insertion moves the
/// cursor onto the inserted instruction.
#[derive(Debug, Default)]
pub struct InstInserter {
    loc: CursorLocation,
}

impl InstInserter {
    /// Inserts `seq` in order after the cursor location and returns the
    /// handles of the inserted instructions.
    pub fn insert_seq(
        &mut self,
        body: &mut Body,
        seq: impl IntoIterator<Item = InstData>,
    ) -> Vec<InstId> {
        seq.into_iter()
            .map(|data| self.insert_inst_data(body, data))
            .collect()
    }
}

impl FuncCursor for InstInserter {
    fn at_location(loc: CursorLocation) -> Self {
        Self { loc }
    }

    fn set_location(&mut self, loc: CursorLocation) {
        self.loc = loc;
    }

    fn loc(&self) -> CursorLocation {
        self.loc
    }

    fn insert_inst(&mut self, body: &mut Body, inst: InstId) {
        match self.loc {
            CursorLocation::At(at) => body.layout.insert_inst_after(inst, at),
            CursorLocation::Top => body.layout.prepend_inst(inst),
            CursorLocation::Bottom => body.layout.append_inst(inst),
            CursorLocation::NoWhere => panic!("cursor loc points to `NoWhere`"),
        }
        self.loc = CursorLocation::At(inst);
    }
}
