//! A reference interpreter for slicefold modules.
//!
//! The interpreter executes method bodies instruction by instruction on an
//! evaluation stack, following calls into any loaded module. It is used to
//! check that woven methods behave exactly like the originals.
pub mod error;
mod frame;
pub mod heap;
pub mod machine;
pub mod value;

pub use error::InterpretError;
pub use heap::{Heap, HeapObject, ObjRef};
pub use machine::{Machine, ModuleId, DEFAULT_STEP_LIMIT};
pub use value::Value;

#[cfg(test)]
mod tests {
    use slicefold_ir::Type;
    use slicefold_parser::parse_module;

    use super::*;

    fn machine(body: &str) -> Machine {
        let src = format!("module App\n\ntype App.Program {{\n{body}}}\n");
        Machine::new(parse_module(&src).unwrap())
    }

    #[test]
    fn arithmetic_and_branches() {
        let mut machine = machine(
            r#"    method static int32 Max(int32 a, int32 b) {
        ldarg.0
        ldarg.1
        bge.s A
        ldarg.1
        ret
    A:  ldarg.0
        ret
    }
"#,
        );
        let max = machine.func_by_name("App.Program", "Max").unwrap();
        let ret = machine.run(max, vec![Value::I4(3), Value::I4(9)]).unwrap();
        assert_eq!(ret, Some(Value::I4(9)));
        let ret = machine.run(max, vec![Value::I4(-3), Value::I4(-9)]).unwrap();
        assert_eq!(ret, Some(Value::I4(-3)));
    }

    #[test]
    fn array_element_width() {
        let mut machine = machine(
            r#"    method static int32 Bytes(uint8[] xs) {
        ldarg.0
        ldc.i4.0
        ldc.i4 300
        stelem.i1
        ldarg.0
        ldc.i4.0
        ldelem.u1
        ret
    }
"#,
        );
        let func = machine.func_by_name("App.Program", "Bytes").unwrap();
        let xs = machine.alloc_array(Type::U8, vec![Value::I4(0); 2]);
        let ret = machine.run(func, vec![xs]).unwrap();
        assert_eq!(ret, Some(Value::I4(300 & 0xff)));
    }

    #[test]
    fn unhandled_exception() {
        let mut machine = machine(
            r#"    method static int32 Oob(int32[] xs) {
        ldarg.0
        ldc.i4.5
        ldelem.i4
        ret
    }
"#,
        );
        let func = machine.func_by_name("App.Program", "Oob").unwrap();
        let xs = machine.alloc_array(Type::I32, vec![Value::I4(0); 2]);
        let err = machine.run(func, vec![xs]).unwrap_err();
        assert_eq!(
            err,
            InterpretError::Unhandled("System.IndexOutOfRangeException".into())
        );
    }

    #[test]
    fn object_handles() {
        let mut heap = Heap::default();
        let obj = heap.alloc_array(Type::I32, vec![Value::I4(1)]);
        assert_eq!(obj.to_string(), "obj0");
        assert_eq!(format!("{obj:?}"), "obj0");
        assert_eq!(heap.elems(obj), Some(&[Value::I4(1)][..]));
    }

    #[test]
    fn step_limit() {
        let mut machine = machine(
            r#"    method static void Spin() {
    L:  br.s L
    }
"#,
        )
        .with_step_limit(100);
        let func = machine.func_by_name("App.Program", "Spin").unwrap();
        assert_eq!(machine.run(func, vec![]), Err(InterpretError::OutOfFuel));
    }
}
