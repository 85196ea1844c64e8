use dir_test::{dir_test, Fixture};
use ir::ir_writer::ModuleWriter;
use slicefold_parser::parse_module;

#[dir_test(
    dir: "$CARGO_MANIFEST_DIR/test_files/ir",
    glob: "*.sfil"
)]
fn test_round_trip(fixture: Fixture<&str>) {
    let module = match parse_module(fixture.content()) {
        Ok(module) => module,
        Err(errs) => {
            for err in errs {
                eprintln!(
                    "{}",
                    err.print_to_string(fixture.path(), fixture.content(), false)
                );
            }
            panic!("failed to parse {}", fixture.path());
        }
    };

    let text = ModuleWriter::new(&module).dump_string().unwrap();
    assert_eq!(text, *fixture.content());
}
