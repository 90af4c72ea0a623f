//! `os.path`, restricted to string manipulation and the scratch directory
//!
//! Paths rooted at `output_dir` stay opaque [`Value::ScratchPath`] handles.
//! Existence checks only ever look inside the scratch directory; plain
//! strings never reach the host filesystem.

use std::path::PathBuf;

use crate::environment::{Binding, ModuleTable, required};
use crate::runtime::Interpreter;
use crate::runtime::fault::Fault;
use crate::runtime::value::{CallArgs, Value};

pub(super) fn table() -> ModuleTable {
    ModuleTable::new(
        "os.path",
        vec![
            ("join", Binding::Function(join)),
            ("basename", Binding::Function(basename)),
            ("dirname", Binding::Function(dirname)),
            ("splitext", Binding::Function(splitext)),
            ("exists", Binding::Function(exists)),
            ("isfile", Binding::Function(isfile)),
            ("isdir", Binding::Function(isdir)),
        ],
    )
}

fn text<'a>(value: &'a Value, func: &str) -> Result<&'a str, Fault> {
    match value {
        Value::Str(s) | Value::ScratchPath(s) => Ok(s),
        Value::Scratch => Ok(""),
        other => Err(Fault::type_error(format!(
            "{func}() argument must be str, not '{}'",
            other.type_name()
        ))),
    }
}

/// A relative path component list that cannot climb out of its root
fn confined(part: &str) -> Result<Vec<&str>, Fault> {
    if part.starts_with('/') || part.starts_with('\\') {
        return Err(Fault::value_error(format!(
            "absolute path '{part}' cannot be joined onto output_dir"
        )));
    }
    let components: Vec<&str> = part
        .split(['/', '\\'])
        .filter(|c| !c.is_empty() && *c != ".")
        .collect();
    if components.contains(&"..") {
        return Err(Fault::value_error(format!("path '{part}' escapes output_dir")));
    }
    Ok(components)
}

fn join(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("join", 1, usize::MAX, &[])?;
    let first = &args.positional[0];
    let rest = &args.positional[1..];

    match first {
        Value::Scratch | Value::ScratchPath(_) => {
            let mut components: Vec<String> = confined(text(first, "join")?)?
                .into_iter()
                .map(str::to_string)
                .collect();
            for part in rest {
                components.extend(confined(text(part, "join")?)?.into_iter().map(str::to_string));
            }
            if components.is_empty() {
                Ok(Value::Scratch)
            } else {
                Ok(Value::ScratchPath(components.join("/").into()))
            }
        }
        _ => {
            let mut joined = text(first, "join")?.to_string();
            for part in rest {
                let part = match part {
                    Value::Str(s) => s,
                    other => {
                        return Err(Fault::type_error(format!(
                            "join() argument must be str, not '{}'",
                            other.type_name()
                        )));
                    }
                };
                if part.starts_with('/') {
                    joined = part.to_string();
                } else if joined.is_empty() || joined.ends_with('/') {
                    joined.push_str(part);
                } else {
                    joined.push('/');
                    joined.push_str(part);
                }
            }
            Ok(Value::str(joined))
        }
    }
}

fn basename(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("basename", 1, 1, &[])?;
    let path = text(&args.positional[0], "basename")?;
    Ok(Value::str(path.rsplit('/').next().unwrap_or_default()))
}

fn dirname(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("dirname", 1, 1, &[])?;
    let value = &args.positional[0];
    let path = text(value, "dirname")?;
    let parent = path.rsplit_once('/').map(|(head, _)| head).unwrap_or_default();
    Ok(match value {
        Value::Scratch => Value::Scratch,
        Value::ScratchPath(_) if parent.is_empty() => Value::Scratch,
        Value::ScratchPath(_) => Value::ScratchPath(parent.into()),
        _ if parent.is_empty() && path.starts_with('/') => Value::str("/"),
        _ => Value::str(parent),
    })
}

fn splitext(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("splitext", 1, 1, &[])?;
    let path = text(&args.positional[0], "splitext")?;
    let name_start = path.rfind('/').map_or(0, |i| i + 1);
    let name = &path[name_start..];
    let (root, ext) = match name.rfind('.') {
        Some(dot) if name[..dot].chars().any(|c| c != '.') => {
            path.split_at(name_start + dot)
        }
        _ => (path, ""),
    };
    Ok(Value::tuple(vec![Value::str(root), Value::str(ext)]))
}

/// Host path for a scratch handle; `None` for anything else
fn scratch_path(interp: &Interpreter, value: &Value) -> Option<PathBuf> {
    match value {
        Value::Scratch => Some(interp.scratch_dir().to_path_buf()),
        Value::ScratchPath(rel) => Some(interp.scratch_dir().join(rel.as_ref())),
        _ => None,
    }
}

fn stat_check(
    interp: &Interpreter,
    args: &CallArgs,
    func: &str,
    check: fn(&std::fs::Metadata) -> bool,
) -> Result<Value, Fault> {
    args.expect(func, 1, 1, &[])?;
    let target = required(args, 0, "path", func)?;
    let found = scratch_path(interp, target)
        .and_then(|path| std::fs::symlink_metadata(path).ok())
        .is_some_and(|meta| check(&meta));
    Ok(Value::Bool(found))
}

fn exists(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    stat_check(interp, &args, "exists", |_| true)
}

fn isfile(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    stat_check(interp, &args, "isfile", std::fs::Metadata::is_file)
}

fn isdir(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    stat_check(interp, &args, "isdir", std::fs::Metadata::is_dir)
}
