//! Backward stack simulation to find the instruction that produced an
//! operand of a call.
use rustc_hash::FxHashSet;
use slicefold_ir::{Body, FlowControl, InstId, MemberStore, Type};

pub struct StackTracer<'a> {
    body: &'a Body,
    members: &'a MemberStore,
    ret_ty: &'a Type,
    /// Instructions control can enter from elsewhere. The stack there is not
    /// determined by the preceding instruction.
    barriers: FxHashSet<InstId>,
}

impl<'a> StackTracer<'a> {
    pub fn new(body: &'a Body, members: &'a MemberStore, ret_ty: &'a Type) -> Self {
        Self {
            body,
            members,
            ret_ty,
            barriers: body.jump_targets(),
        }
    }

    /// Returns the instruction that pushed an operand of `call`. `depth` 0 is
    /// the first value the call pops (the receiver of an instance call),
    /// `-1` the next one and so on.
    ///
    /// Only an instruction that pops nothing and pushes exactly one value
    /// qualifies, and the walk from it to `call` must be straight-line code:
    /// no branch of any kind and no instruction reachable from elsewhere.
    /// Returns `None` otherwise.
    pub fn trace_back(&self, call: InstId, depth: i32) -> Option<InstId> {
        let (pop, _) = self.effect(call)?;
        let pos = depth.checked_neg().and_then(|pos| u32::try_from(pos).ok())?;
        if pos >= pop {
            return None;
        }

        // Number of values sitting above the one we are looking for.
        let mut above = pop - 1 - pos;
        let mut after = call;
        let mut cursor = self.body.layout.prev_inst_of(call);

        while let Some(inst) = cursor {
            if self.barriers.contains(&after) {
                return None;
            }
            // A value pushed before a branch is also live on the other path.
            if !matches!(self.body.inst(inst).flow(), FlowControl::Next) {
                return None;
            }

            let (pop, push) = self.effect(inst)?;
            if above < push {
                return (pop == 0 && push == 1).then_some(inst);
            }
            above = above - push + pop;
            after = inst;
            cursor = self.body.layout.prev_inst_of(inst);
        }

        None
    }

    fn effect(&self, inst: InstId) -> Option<(u32, u32)> {
        self.body
            .inst(inst)
            .stack_effect(self.members, self.ret_ty)
    }
}

#[cfg(test)]
mod tests {
    use slicefold_ir::{FuncRef, Module};
    use slicefold_parser::parse_module;

    use super::*;

    fn parse(methods: &str) -> Module {
        let src = format!(
            "module App

type App.Program {{
    method int32 Get(int32 i);

    method void Set(int32 i, int32 v);

{methods}}}
"
        );
        parse_module(&src).unwrap()
    }

    fn trace(module: &Module, name: &str, call_pos: usize, depth: i32) -> Option<usize> {
        let ty = module.type_by_name("App.Program").unwrap();
        let func: FuncRef = module.func_by_name(ty, name).unwrap();
        let func = &module.funcs[func];
        let body = func.body().unwrap();
        let insts: Vec<_> = body.iter_inst().collect();

        let tracer = StackTracer::new(body, &module.members, &func.ret_ty);
        tracer
            .trace_back(insts[call_pos], depth)
            .map(|inst| insts.iter().position(|&i| i == inst).unwrap())
    }

    #[test]
    fn receiver_and_arguments() {
        let module = parse(
            "    method void Run(int32 i) {
        ldarg.0
        ldarg.1
        ldc.i4.7
        ldc.i4.2
        mul
        callvirt instance void App.Program::Set(int32, int32)
        ret
    }
",
        );

        assert_eq!(trace(&module, "Run", 5, 0), Some(0));
        assert_eq!(trace(&module, "Run", 5, -1), Some(1));
        // The value is computed by `mul`, which pops its operands.
        assert_eq!(trace(&module, "Run", 5, -2), None);
        assert_eq!(trace(&module, "Run", 5, -3), None);
        assert_eq!(trace(&module, "Run", 5, 1), None);
    }

    #[test]
    fn multi_instruction_index() {
        let module = parse(
            "    method int32 Run(int32 i) {
        ldarg.0
        ldarg.1
        ldc.i4.1
        add
        callvirt instance int32 App.Program::Get(int32)
        ret
    }
",
        );

        assert_eq!(trace(&module, "Run", 4, 0), Some(0));
        assert_eq!(trace(&module, "Run", 4, -1), None);
    }

    #[test]
    fn nested_call_result() {
        let module = parse(
            "    method int32 Run(int32 i) {
        ldarg.0
        ldarg.0
        ldarg.1
        callvirt instance int32 App.Program::Get(int32)
        callvirt instance int32 App.Program::Get(int32)
        ret
    }
",
        );

        assert_eq!(trace(&module, "Run", 3, 0), Some(1));
        assert_eq!(trace(&module, "Run", 3, -1), Some(2));
        assert_eq!(trace(&module, "Run", 4, 0), Some(0));
        assert_eq!(trace(&module, "Run", 4, -1), None);
    }

    #[test]
    fn branch_target_is_a_barrier() {
        let module = parse(
            "    method int32 Run(int32 i) {
        ldarg.0
    L:  ldarg.1
        callvirt instance int32 App.Program::Get(int32)
        brtrue.s L
        ldc.i4.0
        ret
    }
",
        );

        assert_eq!(trace(&module, "Run", 2, -1), Some(1));
        assert_eq!(trace(&module, "Run", 2, 0), None);
    }

    #[test]
    fn stops_at_unconditional_flow() {
        let module = parse(
            "    method int32 Run(int32 i) {
        ldarg.0
        br.s L
        nop
    L:  ldarg.1
        callvirt instance int32 App.Program::Get(int32)
        ret
    }
",
        );

        assert_eq!(trace(&module, "Run", 4, -1), Some(3));
        assert_eq!(trace(&module, "Run", 4, 0), None);
    }

    #[test]
    fn stops_at_conditional_flow() {
        let module = parse(
            "    method int32 Run(int32 i, bool flag) {
        ldarg.0
        ldarg.2
        brtrue.s OTHER
        ldarg.1
        callvirt instance int32 App.Program::Get(int32)
        ret
    OTHER: pop
        ldc.i4.0
        ret
    }

    method int32 Shared(int32 i, bool flag) {
        ldarg.0
        ldc.i4.0
        ldarg.2
        brtrue.s OTHER
        callvirt instance int32 App.Program::Get(int32)
        ret
    OTHER: callvirt instance int32 App.Program::Get(int32)
        ret
    }

    method int32 Dispatch(int32 i) {
        ldarg.0
        ldarg.1
        ldarg.1
        switch (OUT)
        callvirt instance int32 App.Program::Get(int32)
        ret
    OUT: pop
        pop
        ldc.i4.0
        ret
    }
",
        );

        assert_eq!(trace(&module, "Run", 4, -1), Some(3));
        assert_eq!(trace(&module, "Run", 4, 0), None);

        // Both operands are shared with the call on the other path.
        assert_eq!(trace(&module, "Shared", 4, 0), None);
        assert_eq!(trace(&module, "Shared", 4, -1), None);
        assert_eq!(trace(&module, "Shared", 6, 0), None);
        assert_eq!(trace(&module, "Shared", 6, -1), None);

        assert_eq!(trace(&module, "Dispatch", 4, -1), None);
        assert_eq!(trace(&module, "Dispatch", 4, 0), None);
    }

    #[test]
    fn region_boundaries_are_barriers() {
        let module = parse(
            "    method int32 Run(int32 i) {
    TRY: ldarg.0
        ldarg.1
        callvirt instance int32 App.Program::Get(int32)
        pop
        leave.s DONE
    CATCH: ldarg.1
        callvirt instance int32 App.Program::Get(int32)
        pop
        leave.s DONE
    DONE: ldc.i4.0
        ret
        .try TRY to CATCH catch object handler CATCH to DONE
    }

    method int32 Entered(int32 i) {
        ldarg.0
    TRY: ldarg.1
        callvirt instance int32 App.Program::Get(int32)
        pop
        leave.s DONE
    CATCH: pop
        leave.s DONE
    DONE: ldc.i4.0
        ret
        .try TRY to CATCH catch object handler CATCH to DONE
    }
",
        );

        // Inside the protected region the window is straight-line code.
        assert_eq!(trace(&module, "Run", 2, 0), Some(0));
        assert_eq!(trace(&module, "Run", 2, -1), Some(1));

        // The handler receives the exception object from the runtime.
        assert_eq!(trace(&module, "Run", 6, -1), Some(5));
        assert_eq!(trace(&module, "Run", 6, 0), None);

        assert_eq!(trace(&module, "Entered", 2, -1), Some(1));
        assert_eq!(trace(&module, "Entered", 2, 0), None);
    }
}
