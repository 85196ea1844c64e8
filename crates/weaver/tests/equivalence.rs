//! Woven methods must behave exactly like the originals.
use slicefold_interpreter::{InterpretError, Machine, Value};
use slicefold_ir::{AnnotationHost, Module, ModuleSet, Opcode, Type};
use slicefold_parser::parse_module;
use slicefold_verifier::{verify_module, VerifierConfig};
use slicefold_weaver::{MethodOutcome, SkipReason, WeaveOutcome, WeaveReport, Weaver};

const LIBRARY: &str = include_str!("../test_lib/arrayslice.sfil");

const PROGRAM: &str = r#"module App
reference Corvalius.ArraySlice

type App.Program {
    method static int32 Sum([Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32> data, int32 n) {
        .locals (int32 acc, int32 i)
        ldc.i4.0
        stloc.0
        ldc.i4.0
        stloc.1
        br.s COND
  LOOP: ldloc.0
        ldarg.0
        ldloc.1
        callvirt instance !0 [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>::get_Item(int32)
        add
        stloc.0
        ldloc.1
        ldc.i4.1
        add
        stloc.1
  COND: ldloc.1
        ldarg.1
        blt.s LOOP
        ldloc.0
        ret
    }

    method static int32 SumAt(int32[] xs, int32 offset, int32 count) {
        ldarg.0
        ldarg.1
        ldarg.2
        newobj instance void [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>::.ctor(!0[], int32, int32)
        ldarg.2
        call int32 App.Program::Sum([Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>, int32)
        ret
    }

    method static int32 SumNull(int32 n) {
        ldnull
        ldarg.0
        call int32 App.Program::Sum([Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>, int32)
        ret
    }

    method static int32 Swap([Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32> data) {
        .locals (int32 t)
        ldarg.0
        ldc.i4.0
        callvirt instance !0 [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>::get_Item(int32)
        stloc.0
        ldarg.0
        ldc.i4.0
        ldarg.0
        ldc.i4.1
        callvirt instance !0 [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>::get_Item(int32)
        callvirt instance void [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>::set_Item(int32, !0)
        ldarg.0
        ldc.i4.1
        ldloc.0
        callvirt instance void [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>::set_Item(int32, !0)
        ldarg.0
        ldc.i4.0
        callvirt instance !0 [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>::get_Item(int32)
        ldc.i4.s 10
        mul
        ldarg.0
        ldc.i4.1
        callvirt instance !0 [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>::get_Item(int32)
        add
        ret
    }

    method static int32 SwapAt(int32[] xs, int32 offset) {
        ldarg.0
        ldarg.1
        ldc.i4.2
        newobj instance void [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>::.ctor(!0[], int32, int32)
        call int32 App.Program::Swap([Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>)
        ret
    }

    method static int32 Pick([Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32> a, [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32> b, bool first) {
        .locals ([Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32> s)
        ldarg.0
        stloc.0
        ldarg.2
        brtrue.s READ
        ldarg.1
        stloc.0
  READ: ldloc.0
        ldc.i4.0
        callvirt instance !0 [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>::get_Item(int32)
        ldarg.0
        ldc.i4.1
        ldc.i4.1
        add
        callvirt instance !0 [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>::get_Item(int32)
        add
        ret
    }

    method static int32 PickAt(int32[] xs, bool first) {
        ldarg.0
        ldc.i4.1
        ldc.i4.3
        newobj instance void [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>::.ctor(!0[], int32, int32)
        ldarg.0
        ldc.i4.2
        ldc.i4.3
        newobj instance void [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>::.ctor(!0[], int32, int32)
        ldarg.1
        call int32 App.Program::Pick([Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>, [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>, bool)
        ret
    }

    method static int32 Shared([Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32> data, bool other) {
        ldarg.0
        ldc.i4.0
        ldarg.1
        brtrue.s OTHER
        callvirt instance !0 [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>::get_Item(int32)
        ret
 OTHER: callvirt instance !0 [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>::get_Item(int32)
        ldc.i4.s 100
        add
        ret
    }

    method static int32 SharedAt(int32[] xs, int32 offset, bool other) {
        ldarg.0
        ldarg.1
        ldc.i4.3
        newobj instance void [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>::.ctor(!0[], int32, int32)
        ldarg.2
        call int32 App.Program::Shared([Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>, bool)
        ret
    }

    method static int32 Guarded([Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32> data, int32 i) {
        .locals ([Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32> s, int32 r)
   TRY: ldarg.0
        stloc.0
        ldloc.0
        ldarg.1
        callvirt instance !0 [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>::get_Item(int32)
        stloc.1
        leave.s DONE
 CATCH: pop
        ldarg.0
        ldc.i4.0
        callvirt instance !0 [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>::get_Item(int32)
        ldc.i4.s 100
        add
        stloc.1
        leave.s DONE
  DONE: ldloc.1
        ret
        .try TRY to CATCH catch object handler CATCH to DONE
    }

    method static int32 GuardedAt(int32[] xs, int32 offset, int32 i) {
        ldarg.0
        ldarg.1
        ldc.i4.3
        newobj instance void [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>::.ctor(!0[], int32, int32)
        ldarg.2
        call int32 App.Program::Guarded([Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>, int32)
        ret
    }

    @Corvalius.ArraySlice.ArraySliceDoNotOptimize
    method static int32 Head([Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32> data) {
        ldarg.0
        ldc.i4.0
        callvirt instance !0 [Corvalius.ArraySlice]Corvalius.ArraySlice.ArraySlice`1<int32>::get_Item(int32)
        ret
    }
}
"#;

fn library() -> Module {
    parse_module(LIBRARY).unwrap()
}

fn original() -> Module {
    parse_module(PROGRAM).unwrap()
}

fn woven() -> (Module, WeaveReport) {
    let mut module = original();
    let libs: ModuleSet = [library()].into_iter().collect();
    match Weaver::default().run(&mut module, &libs).unwrap() {
        WeaveOutcome::Woven(report) => (module, report),
        WeaveOutcome::NotApplicable(reason) => panic!("not woven: {reason}"),
    }
}

fn machine(module: Module) -> Machine {
    let mut machine = Machine::new(module);
    machine.add_module(library());
    machine
}

fn ints(values: &[i32]) -> Vec<Value> {
    values.iter().copied().map(Value::I4).collect()
}

/// Runs `method` of both modules with the same arguments and returns both
/// results along with the final contents of the first argument array.
fn run_both(
    method: &str,
    data: &[i32],
    rest: &[Value],
) -> [(Result<Option<Value>, InterpretError>, Vec<Value>); 2] {
    [original(), woven().0].map(|module| {
        let mut machine = machine(module);
        let func = machine.func_by_name("App.Program", method).unwrap();
        let xs = machine.alloc_array(Type::I32, ints(data));
        let mut args = vec![xs.clone()];
        args.extend_from_slice(rest);
        let result = machine.run(func, args);
        let elems = machine.array_elems(&xs).unwrap().to_vec();
        (result, elems)
    })
}

fn accessor_calls(module: &Module, method: &str) -> usize {
    let ty = module.type_by_name("App.Program").unwrap();
    let func = module.func_by_name(ty, method).unwrap();
    let body = module.funcs[func].body().unwrap();
    body.iter_inst()
        .filter(|&inst| {
            let data = body.inst(inst);
            data.opcode == Opcode::Callvirt
                && data.method().is_some_and(|callee| {
                    let name = &module.members.method_data(callee).name;
                    name == "get_Item" || name == "set_Item"
                })
        })
        .count()
}

#[test]
fn sum_matches_at_every_offset() {
    let data: Vec<i32> = (1..=10).map(|x| x * x).collect();
    for (offset, count) in [(0, 10), (3, 5), (3, 7), (9, 1), (4, 0)] {
        let [(before, _), (after, _)] =
            run_both("SumAt", &data, &[Value::I4(offset), Value::I4(count)]);
        let expected: i32 = data[offset as usize..(offset + count) as usize].iter().sum();
        assert_eq!(before, Ok(Some(Value::I4(expected))));
        assert_eq!(after, before, "offset {offset}, count {count}");
    }
}

#[test]
fn out_of_range_still_faults() {
    let [(before, _), (after, _)] =
        run_both("SumAt", &[1, 2, 3, 4], &[Value::I4(2), Value::I4(3)]);
    assert_eq!(
        before,
        Err(InterpretError::Unhandled(
            "System.IndexOutOfRangeException".into()
        ))
    );
    assert_eq!(after, before);
}

#[test]
fn null_slice_faults_at_the_access() {
    for n in [0, 2] {
        let results = [original(), woven().0].map(|module| {
            let mut machine = machine(module);
            let func = machine.func_by_name("App.Program", "SumNull").unwrap();
            machine.run(func, vec![Value::I4(n)])
        });
        let expected = if n == 0 {
            Ok(Some(Value::I4(0)))
        } else {
            Err(InterpretError::Unhandled(
                "System.NullReferenceException".into(),
            ))
        };
        assert_eq!(results[0], expected);
        assert_eq!(results[1], expected);
    }
}

#[test]
fn setter_writes_through_to_the_array() {
    let [(before, before_elems), (after, after_elems)] =
        run_both("SwapAt", &[9, 9, 1, 2, 9], &[Value::I4(2)]);
    assert_eq!(before, Ok(Some(Value::I4(21))));
    assert_eq!(after, before);
    assert_eq!(before_elems, ints(&[9, 9, 2, 1, 9]));
    assert_eq!(after_elems, before_elems);
}

#[test]
fn joined_bindings_keep_their_calls() {
    for first in [0, 1] {
        let [(before, _), (after, _)] =
            run_both("PickAt", &[5, 6, 7, 8, 9], &[Value::I4(first)]);
        let expected = if first == 1 { 6 + 8 } else { 7 + 8 };
        assert_eq!(before, Ok(Some(Value::I4(expected))));
        assert_eq!(after, before);
    }
}

#[test]
fn operands_shared_across_a_branch() {
    for (other, expected) in [(0, 12), (1, 112)] {
        let [(before, _), (after, _)] = run_both(
            "SharedAt",
            &[10, 11, 12, 13, 14],
            &[Value::I4(2), Value::I4(other)],
        );
        assert_eq!(before, Ok(Some(Value::I4(expected))));
        assert_eq!(after, before, "other {other}");
    }

    let (module, report) = woven();
    assert_eq!(accessor_calls(&module, "Shared"), 2);
    let outcome = &report.method("App.Program::Shared").unwrap().outcome;
    let MethodOutcome::Woven { rewrite, .. } = outcome else {
        panic!("Shared not woven: {outcome:?}");
    };
    assert_eq!(rewrite.rewritten(), 0);
    let reasons: Vec<_> = rewrite.skipped.iter().map(|(_, reason)| *reason).collect();
    assert_eq!(
        reasons,
        [SkipReason::UntracedReceiver, SkipReason::UntracedReceiver]
    );
}

#[test]
fn accesses_inside_exception_regions() {
    let data = [10, 11, 12, 13, 14];
    // An index past the backing array faults inside the protected region and
    // the handler reads element 0 instead.
    for (offset, i, expected) in [(1, 2, 13), (1, -1, 10), (1, 9, 111), (0, 0, 10)] {
        let [(before, _), (after, _)] =
            run_both("GuardedAt", &data, &[Value::I4(offset), Value::I4(i)]);
        assert_eq!(before, Ok(Some(Value::I4(expected))));
        assert_eq!(after, before, "offset {offset}, index {i}");
    }

    let (module, report) = woven();
    assert_eq!(accessor_calls(&module, "Guarded"), 0);
    let outcome = &report.method("App.Program::Guarded").unwrap().outcome;
    let MethodOutcome::Woven { rewrite, .. } = outcome else {
        panic!("Guarded not woven: {outcome:?}");
    };
    assert_eq!((rewrite.gets, rewrite.sets), (2, 0));
    assert!(rewrite.skipped.is_empty());
}

#[test]
fn direct_loads_are_all_rewritten() {
    let (module, report) = woven();
    assert_eq!(accessor_calls(&module, "Sum"), 0);
    assert_eq!(accessor_calls(&module, "Swap"), 0);

    let outcome = &report.method("App.Program::Swap").unwrap().outcome;
    let MethodOutcome::Woven { rewrite, .. } = outcome else {
        panic!("Swap not woven: {outcome:?}");
    };
    assert_eq!((rewrite.gets, rewrite.sets), (4, 2));
}

#[test]
fn one_shadow_pair_per_binding() {
    let (module, report) = woven();
    let ty = module.type_by_name("App.Program").unwrap();

    // Pick has two parameters and two stores to `s`.
    let pick = module.func_by_name(ty, "Pick").unwrap();
    let names: Vec<_> = module.funcs[pick]
        .body()
        .unwrap()
        .locals
        .values()
        .filter_map(|local| local.name.clone())
        .filter(|name| name.starts_with("__"))
        .collect();
    assert_eq!(names.len(), 8);
    let mut unique = names.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), names.len());

    let shadow_pairs: usize = report
        .methods
        .iter()
        .map(|method| match &method.outcome {
            MethodOutcome::Woven { shadow_pairs, .. } => *shadow_pairs,
            _ => 0,
        })
        .sum();
    // Sum: data. Swap: data. Pick: a, b and two stores to s. Shared: data.
    // Guarded: data and one store to s.
    assert_eq!(shadow_pairs, 9);
}

#[test]
fn complex_receivers_are_left_alone() {
    let (module, report) = woven();
    assert_eq!(accessor_calls(&module, "Pick"), 2);

    let outcome = &report.method("App.Program::Pick").unwrap().outcome;
    let MethodOutcome::Woven { rewrite, .. } = outcome else {
        panic!("Pick not woven: {outcome:?}");
    };
    let reasons: Vec<_> = rewrite.skipped.iter().map(|(_, reason)| *reason).collect();
    assert!(matches!(
        reasons[..],
        [SkipReason::AmbiguousSnapshot(_), SkipReason::UntracedIndex]
    ));

    let verified = verify_module(&module, &VerifierConfig::default());
    assert!(verified.is_ok(), "{verified}");
}

#[test]
fn opted_out_method_only_loses_its_marker() {
    let before = original();
    let (after, report) = woven();
    let ty = after.type_by_name("App.Program").unwrap();
    let head = after.func_by_name(ty, "Head").unwrap();

    assert_eq!(
        report.method("App.Program::Head").unwrap().outcome,
        MethodOutcome::OptedOut
    );
    assert!(before.funcs[head].has_marker("Corvalius.ArraySlice", "ArraySliceDoNotOptimize"));
    assert!(after.funcs[head].annotations.is_empty());
    assert_eq!(
        format!("{:?}", after.funcs[head].body),
        format!("{:?}", before.funcs[head].body)
    );
    assert_eq!(report.markers_removed, 1);
}

#[test]
fn woven_module_verifies() {
    let (module, _) = woven();
    let report = verify_module(&module, &VerifierConfig::default());
    assert!(report.is_ok(), "{report}");
}
