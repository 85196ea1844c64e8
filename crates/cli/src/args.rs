//! Command line spelling of interpreter values.
use anyhow::{bail, Context, Result};
use slicefold_interpreter::{Machine, Value};
use slicefold_ir::Type;

pub fn parse_value(machine: &mut Machine, arg: &str) -> Result<Value> {
    let arg = arg.trim();
    if arg == "null" {
        return Ok(Value::Null);
    }
    if let Some(text) = arg.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Ok(Value::Str(text.into()));
    }
    if let Some(list) = arg.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        let elems = list
            .split(',')
            .map(str::trim)
            .filter(|elem| !elem.is_empty())
            .map(|elem| {
                elem.parse()
                    .map(Value::I4)
                    .with_context(|| format!("invalid int32 array element `{elem}`"))
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(machine.alloc_array(Type::I32, elems));
    }
    scalar(arg)
}

fn scalar(arg: &str) -> Result<Value> {
    if let Some(long) = arg.strip_suffix('L') {
        return Ok(Value::I8(long.parse()?));
    }
    if let Some(single) = arg.strip_suffix('f') {
        return Ok(Value::R4(single.parse()?));
    }
    if arg.contains(['.', 'e', 'E']) {
        return Ok(Value::R8(arg.parse()?));
    }
    match arg.parse() {
        Ok(value) => Ok(Value::I4(value)),
        Err(_) => bail!("cannot parse argument `{arg}`"),
    }
}
