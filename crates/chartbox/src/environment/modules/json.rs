use std::io;

use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter};

use crate::environment::{Binding, ModuleTable};
use crate::runtime::Interpreter;
use crate::runtime::fault::{ExcKind, Fault};
use crate::runtime::value::{CallArgs, Value};

pub(super) fn table() -> ModuleTable {
    ModuleTable::new(
        "json",
        vec![
            ("JSONDecodeError", Binding::Exception(ExcKind::ValueError)),
            ("loads", Binding::Function(loads)),
            ("dumps", Binding::Function(dumps)),
        ],
    )
}

/// Compact output with the `", "` and `": "` separators Python uses
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}

fn loads(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("loads", 1, 1, &[])?;
    let Some(text) = args.positional[0].as_str() else {
        return Err(Fault::type_error(format!(
            "the JSON object must be str, not '{}'",
            args.positional[0].type_name()
        )));
    };
    interp.ensure_size(text.len() as u64)?;
    let json: serde_json::Value =
        serde_json::from_str(text).map_err(|err| Fault::value_error(err.to_string()))?;
    Ok(Value::from_json(&json))
}

fn dumps(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("dumps", 1, 1, &["indent", "sort_keys"])?;
    let mut json = args.positional[0].to_json()?;
    if args.keyword("sort_keys").is_some_and(Value::truthy) {
        sort_keys(&mut json);
    }

    let mut out = Vec::new();
    let written = match args.keyword("indent") {
        Some(Value::Int(width)) => {
            let indent = " ".repeat((*width).clamp(0, 16) as usize);
            let mut ser = serde_json::Serializer::with_formatter(
                &mut out,
                PrettyFormatter::with_indent(indent.as_bytes()),
            );
            json.serialize(&mut ser)
        }
        Some(Value::None) | None => {
            let mut ser = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter);
            json.serialize(&mut ser)
        }
        Some(other) => {
            return Err(Fault::type_error(format!(
                "indent must be an int, not '{}'",
                other.type_name()
            )));
        }
    };
    written.map_err(|err| Fault::value_error(err.to_string()))?;
    interp.ensure_size(out.len() as u64)?;
    Ok(Value::str(String::from_utf8_lossy(&out)))
}

fn sort_keys(json: &mut serde_json::Value) {
    match json {
        serde_json::Value::Object(map) => {
            map.sort_keys();
            map.values_mut().for_each(sort_keys);
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(sort_keys),
        _ => {}
    }
}
