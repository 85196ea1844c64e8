use std::io::Write;

use once_cell::sync::Lazy;
use regex::Regex;
use slicefold_interpreter::{InterpretError, Machine, Value};
use slicefold_ir::Module;

pub struct TestModule {
    pub module: Module,
    pub cases: Vec<TestCase>,
}

pub fn load(file_path: &str) -> TestModule {
    let content = std::fs::read_to_string(file_path).unwrap();

    let module = match slicefold_parser::parse_module(&content) {
        Ok(module) => module,
        Err(errs) => {
            let mut v: Vec<u8> = Vec::new();
            for err in errs {
                err.print(&mut v, file_path, &content, false).unwrap();
                writeln!(&mut v).unwrap();
            }
            let err_str = String::from_utf8(v).unwrap();

            panic!("{err_str}");
        }
    };

    let cases = match parse_test_cases(&content) {
        Ok(cases) => cases,
        Err(e) => panic!("{file_path}: {e}"),
    };

    TestModule { module, cases }
}

#[derive(Debug, PartialEq)]
pub enum Expected {
    Value(Option<Value>),
    Throws(String),
}

#[derive(Debug)]
pub struct TestCase {
    ty: String,
    method: String,
    args: Vec<Value>,
    expected: Expected,
    text: String,
}

impl TestCase {
    pub fn run(&self, machine: &mut Machine) -> Result<(), String> {
        let func_name = format!("{}::{}", self.ty, self.method);
        let Some(func) = machine.func_by_name(&self.ty, &self.method) else {
            return Err(format_error(&func_name, "method not found"));
        };

        let evaluated = match machine.run(func, self.args.clone()) {
            Ok(value) => Expected::Value(value),
            Err(InterpretError::Unhandled(name)) => Expected::Throws(name),
            Err(err) => return Err(format_error(&func_name, &err.to_string())),
        };
        machine.clear_state();

        if evaluated == self.expected {
            return Ok(());
        }

        let text = &self.text;
        let expected = &self.expected;
        let msg = format!(
            "Function: {func_name}\n\
            Description: {text}\n\
            Expected: {expected:?}\n\
            Evaluated: {evaluated:?}\n"
        );
        Err(format_error(&func_name, &msg))
    }

    fn parse(ty: &str, method: &str, comment: &str) -> Result<Self, String> {
        let func_name = format!("{ty}::{method}");
        let Some(caps) = PATTERN.captures(comment) else {
            return Err(format_error(
                &func_name,
                &format!(
                    "Parsing Error:\n\
                    Comment: `{comment}`\n\
                    Expected Format: `// [(args_list) -> ret]`."
                ),
            ));
        };

        let args = if !caps["args"].trim().is_empty() {
            caps["args"]
                .split(',')
                .map(|arg| parse_value(arg.trim()))
                .collect::<Result<_, _>>()
                .map_err(|e| format_error(&func_name, &e))?
        } else {
            vec![]
        };

        let expected = match caps.name("ret").map(|m| m.as_str()) {
            Some(ret) => match ret.strip_prefix('!') {
                Some(exception) => Expected::Throws(exception.to_string()),
                None => Expected::Value(Some(
                    parse_value(ret).map_err(|e| format_error(&func_name, &e))?,
                )),
            },
            None => Expected::Value(None),
        };

        Ok(Self {
            ty: ty.to_string(),
            method: method.to_string(),
            args,
            expected,
            text: comment.to_string(),
        })
    }
}

/// Collects the case comments written on the lines above each method.
pub fn parse_test_cases(content: &str) -> Result<Vec<TestCase>, String> {
    let mut cases = Vec::new();
    let mut ty = None;
    let mut pending = Vec::new();

    for line in content.lines() {
        if let Some(caps) = TYPE_LINE.captures(line) {
            ty = Some(caps["name"].to_string());
        } else if let Some(caps) = CASE_LINE.captures(line) {
            pending.push(caps["case"].to_string());
        } else if let Some(caps) = METHOD_LINE.captures(line) {
            let Some(ty) = &ty else {
                return Err(format!("method `{}` outside of a type", &caps["name"]));
            };
            for comment in pending.drain(..) {
                cases.push(TestCase::parse(ty, &caps["name"], &comment)?);
            }
        }
    }

    Ok(cases)
}

fn parse_value(input: &str) -> Result<Value, String> {
    let invalid = || format!("`{input}` is not a value");
    let value = if input == "null" {
        Value::Null
    } else if let Some(v) = input.strip_suffix('L') {
        Value::I8(v.parse().map_err(|_| invalid())?)
    } else if let Some(v) = input.strip_suffix('f') {
        Value::R4(v.parse().map_err(|_| invalid())?)
    } else if input.contains('.') {
        Value::R8(input.parse().map_err(|_| invalid())?)
    } else {
        Value::I4(input.parse().map_err(|_| invalid())?)
    };
    Ok(value)
}

static PATTERN: Lazy<Regex> = Lazy::new(|| {
    // [((args,)*) (-> ret)?]
    Regex::new(
        r"(?x)
        \[
        \((?P<args>[a-zA-Z0-9_.@*-]*(?:,\s*[a-zA-Z0-9_.@*-]+)*,?)\)
        (?:\s*->\s*(?P<ret>!?[a-zA-Z0-9_.@*-]+))?
        \]
    ",
    )
    .unwrap()
});

static CASE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*//\s*(?P<case>\[.*\])\s*$").unwrap());

static TYPE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*type\s+(?:value\s+)?(?P<name>[\w.`$]+)").unwrap());

static METHOD_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*method\s+(?:static\s+)?\S+\s+(?P<name>\.?[\w`$]+)\s*\(").unwrap()
});

fn format_error(func_name: &str, msg: &str) -> String {
    format!("[{func_name}]: {msg}")
}
