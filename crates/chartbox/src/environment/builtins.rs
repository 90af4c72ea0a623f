//! The builtins table
//!
//! Every name listed here is all a snippet gets without an import. There
//! is deliberately no `open`, `eval`, `exec`, `__import__`, `getattr` or
//! `input`.

use crate::chart::{Figure, SeriesKind, render_svg};
use crate::environment::{Binding, artifact_name, number, required};
use crate::runtime::fault::{ExcKind, Fault};
use crate::runtime::ops::less_than;
use crate::runtime::value::{CallArgs, Dict, Value};
use crate::runtime::{Interpreter, make_range};

pub(super) fn table() -> Vec<(&'static str, Binding)> {
    let mut table: Vec<(&'static str, Binding)> = vec![
        ("print", Binding::Function(print)),
        ("len", Binding::Function(len)),
        ("range", Binding::Function(range)),
        ("abs", Binding::Function(abs)),
        ("min", Binding::Function(min)),
        ("max", Binding::Function(max)),
        ("sum", Binding::Function(sum)),
        ("round", Binding::Function(round)),
        ("sorted", Binding::Function(sorted)),
        ("reversed", Binding::Function(reversed)),
        ("enumerate", Binding::Function(enumerate)),
        ("zip", Binding::Function(zip)),
        ("map", Binding::Function(map)),
        ("filter", Binding::Function(filter)),
        ("any", Binding::Function(any)),
        ("all", Binding::Function(all)),
        ("str", Binding::Function(str_)),
        ("int", Binding::Function(int)),
        ("float", Binding::Function(float)),
        ("bool", Binding::Function(bool_)),
        ("list", Binding::Function(list)),
        ("dict", Binding::Function(dict)),
        ("tuple", Binding::Function(tuple)),
        ("repr", Binding::Function(repr)),
        ("isinstance", Binding::Function(isinstance)),
        ("format", Binding::Function(format)),
        ("write_chart", Binding::Function(write_chart)),
        ("output_dir", Binding::Scratch),
    ];
    table.extend(ExcKind::ALL.iter().map(|kind| (kind.name(), Binding::Exception(*kind))));
    table
}

fn print(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("print", 0, usize::MAX, &["sep", "end", "flush"])?;
    let text_of = |value: Option<&Value>, default: &str| match value {
        None | Some(Value::None) => Ok(default.to_string()),
        Some(Value::Str(s)) => Ok(s.to_string()),
        Some(other) => Err(Fault::type_error(format!(
            "sep and end must be None or a string, not {}",
            other.type_name()
        ))),
    };
    let sep = text_of(args.keyword("sep"), " ")?;
    let end = text_of(args.keyword("end"), "\n")?;

    let mut line = args
        .positional
        .iter()
        .map(Value::to_str)
        .collect::<Vec<_>>()
        .join(&sep);
    line.push_str(&end);
    interp.write_stdout(&line);
    Ok(Value::None)
}

fn len(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("len", 1, 1, &[])?;
    let n = match &args.positional[0] {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.borrow().len(),
        Value::Tuple(items) => items.len(),
        Value::Dict(dict) => dict.borrow().len(),
        Value::Range(range) => range.len(),
        other => {
            return Err(Fault::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )));
        }
    };
    Ok(Value::Int(n as i64))
}

fn range(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("range", 1, 3, &[])?;
    Ok(Value::Range(make_range(&args.positional)?))
}

fn abs(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("abs", 1, 1, &[])?;
    match &args.positional[0] {
        Value::Float(f) => Ok(Value::Float(f.abs())),
        Value::Int(i) => i.checked_abs().map(Value::Int).ok_or_else(Fault::overflow),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        other => Err(Fault::type_error(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

/// Shared body of `min` and `max`
fn extremum(interp: &mut Interpreter, args: CallArgs, name: &str, want_less: bool) -> Result<Value, Fault> {
    args.expect(name, 1, usize::MAX, &["key", "default"])?;
    let items = if args.len() == 1 {
        interp.collect(&args.positional[0])?
    } else {
        args.positional.clone()
    };
    let key = args.keyword("key").filter(|k| !matches!(k, Value::None)).cloned();

    let mut best: Option<(Value, Value)> = None;
    for item in items {
        let rank = match &key {
            Some(func) => interp.call_positional(func, vec![item.clone()])?,
            None => item.clone(),
        };
        let better = match &best {
            None => true,
            Some((best_rank, _)) if want_less => less_than(&rank, best_rank)?,
            Some((best_rank, _)) => less_than(best_rank, &rank)?,
        };
        if better {
            best = Some((rank, item));
        }
    }

    match (best, args.keyword("default")) {
        (Some((_, item)), _) => Ok(item),
        (None, Some(default)) => Ok(default.clone()),
        (None, None) => Err(Fault::value_error(format!("{name}() arg is an empty sequence"))),
    }
}

fn min(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    extremum(interp, args, "min", true)
}

fn max(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    extremum(interp, args, "max", false)
}

fn sum(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("sum", 1, 2, &["start"])?;
    let mut total = args.arg(1, "start").cloned().unwrap_or(Value::Int(0));
    if matches!(total, Value::Str(_)) {
        return Err(Fault::type_error("sum() can't sum strings [use ''.join(seq) instead]"));
    }
    for item in interp.iterate(&args.positional[0])? {
        interp.tick()?;
        total = interp.binary_op(crate::script::ast::BinOp::Add, total, item)?;
    }
    Ok(total)
}

fn round(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("round", 1, 2, &["ndigits"])?;
    let value = &args.positional[0];
    let digits = match args.arg(1, "ndigits") {
        None | Some(Value::None) => None,
        Some(d) => Some(d.as_i64().ok_or_else(|| {
            Fault::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                d.type_name()
            ))
        })?),
    };

    match (value, digits) {
        (Value::Int(_) | Value::Bool(_), None) => Ok(Value::Int(value.as_i64().unwrap_or_default())),
        (Value::Int(_) | Value::Bool(_), Some(d)) if d >= 0 => Ok(Value::Int(value.as_i64().unwrap_or_default())),
        (Value::Int(i), Some(d)) => {
            let factor = 10f64.powi(d.unsigned_abs().min(300) as i32);
            Ok(Value::Int(((*i as f64 / factor).round_ties_even() * factor) as i64))
        }
        (Value::Float(f), None) => {
            if !f.is_finite() {
                return Err(Fault::new(
                    if f.is_nan() { ExcKind::ValueError } else { ExcKind::OverflowError },
                    "cannot convert float to integer",
                ));
            }
            Ok(Value::Int(f.round_ties_even() as i64))
        }
        (Value::Float(f), Some(d)) => {
            let d = d.clamp(-300, 300) as i32;
            let factor = 10f64.powi(d);
            let rounded = (f * factor).round_ties_even() / factor;
            Ok(Value::Float(if rounded.is_finite() { rounded } else { *f }))
        }
        (other, _) => Err(Fault::type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

fn sorted(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("sorted", 1, 1, &["key", "reverse"])?;
    let mut items = interp.collect(&args.positional[0])?;
    let reverse = args.keyword("reverse").is_some_and(Value::truthy);
    interp.sort_values(&mut items, args.keyword("key"), reverse)?;
    Ok(Value::list(items))
}

fn reversed(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("reversed", 1, 1, &[])?;
    if matches!(args.positional[0], Value::Dict(_)) {
        return Err(Fault::type_error("'dict' object is not reversible"));
    }
    let mut items = interp.collect(&args.positional[0])?;
    items.reverse();
    Ok(Value::list(items))
}

fn enumerate(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("enumerate", 1, 2, &["start"])?;
    let start = match args.arg(1, "start") {
        Some(v) => v
            .as_i64()
            .ok_or_else(|| Fault::type_error("enumerate() start must be an integer"))?,
        None => 0,
    };
    let items = interp.collect(&args.positional[0])?;
    Ok(Value::list(
        items
            .into_iter()
            .zip(start..)
            .map(|(item, i)| Value::tuple(vec![Value::Int(i), item]))
            .collect(),
    ))
}

fn zip(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("zip", 0, usize::MAX, &[])?;
    let columns = args
        .positional
        .iter()
        .map(|v| interp.collect(v))
        .collect::<Result<Vec<_>, _>>()?;
    let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
    Ok(Value::list(
        (0..rows)
            .map(|row| Value::tuple(columns.iter().map(|c| c[row].clone()).collect()))
            .collect(),
    ))
}

fn map(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("map", 2, usize::MAX, &[])?;
    let func = args.positional[0].clone();
    let columns = args.positional[1..]
        .iter()
        .map(|v| interp.collect(v))
        .collect::<Result<Vec<_>, _>>()?;
    let rows = columns.iter().map(Vec::len).min().unwrap_or(0);

    interp.holding(|interp| {
        let out = interp.held_list();
        for row in 0..rows {
            let call_args = columns.iter().map(|c| c[row].clone()).collect();
            let value = interp.call_positional(&func, call_args)?;
            out.borrow_mut().push(value);
        }
        Ok(Value::List(out))
    })
}

fn filter(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("filter", 2, 2, &[])?;
    let func = args.positional[0].clone();
    let mut out = Vec::new();
    for item in interp.collect(&args.positional[1])? {
        let keep = match func {
            Value::None => item.truthy(),
            _ => interp.call_positional(&func, vec![item.clone()])?.truthy(),
        };
        if keep {
            out.push(item);
        }
    }
    Ok(Value::list(out))
}

fn any(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("any", 1, 1, &[])?;
    Ok(Value::Bool(interp.iterate(&args.positional[0])?.any(|v| v.truthy())))
}

fn all(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("all", 1, 1, &[])?;
    Ok(Value::Bool(interp.iterate(&args.positional[0])?.all(|v| v.truthy())))
}

fn str_(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("str", 0, 1, &[])?;
    Ok(Value::str(args.get(0).map(Value::to_str).unwrap_or_default()))
}

fn repr(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("repr", 1, 1, &[])?;
    Ok(Value::str(args.positional[0].repr()))
}

fn int(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("int", 0, 1, &[])?;
    match args.get(0) {
        None => Ok(Value::Int(0)),
        Some(Value::Int(i)) => Ok(Value::Int(*i)),
        Some(Value::Bool(b)) => Ok(Value::Int(*b as i64)),
        Some(Value::Float(f)) => {
            if f.is_nan() {
                return Err(Fault::value_error("cannot convert float NaN to integer"));
            }
            if f.is_infinite() || f.abs() >= 9.2e18 {
                return Err(Fault::new(
                    ExcKind::OverflowError,
                    "cannot convert float infinity to integer",
                ));
            }
            Ok(Value::Int(f.trunc() as i64))
        }
        Some(Value::Str(s)) => s
            .trim()
            .replace('_', "")
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| {
                Fault::value_error(format!("invalid literal for int() with base 10: {}", Value::str(s).repr()))
            }),
        Some(other) => Err(Fault::type_error(format!(
            "int() argument must be a string or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

fn float(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("float", 0, 1, &[])?;
    match args.get(0) {
        None => Ok(Value::Float(0.0)),
        Some(Value::Str(s)) => {
            let text = s.trim().to_ascii_lowercase();
            let parsed = match text.trim_start_matches(['+', '-']) {
                "inf" | "infinity" | "nan" => text.parse::<f64>().ok(),
                _ if text.chars().any(|c| c.is_ascii_alphabetic() && c != 'e') => None,
                _ => text.parse::<f64>().ok(),
            };
            parsed.map(Value::Float).ok_or_else(|| {
                Fault::value_error(format!(
                    "could not convert string to float: {}",
                    Value::str(s).repr()
                ))
            })
        }
        Some(other) => Ok(Value::Float(number(other, "float")?)),
    }
}

fn bool_(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("bool", 0, 1, &[])?;
    Ok(Value::Bool(args.get(0).is_some_and(Value::truthy)))
}

fn list(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("list", 0, 1, &[])?;
    match args.get(0) {
        Some(v) => Ok(Value::list(interp.collect(v)?)),
        None => Ok(Value::list(Vec::new())),
    }
}

fn tuple(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("tuple", 0, 1, &[])?;
    match args.get(0) {
        Some(v) => Ok(Value::tuple(interp.collect(v)?)),
        None => Ok(Value::tuple(Vec::new())),
    }
}

fn dict(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("dict", 0, 1, &[])?;
    let mut out = Dict::new();
    match args.get(0) {
        None => {}
        Some(Value::Dict(other)) => out = other.borrow().clone(),
        Some(pairs) => {
            for item in interp.collect(pairs)? {
                match interp.collect(&item)?.as_slice() {
                    [key, value] => out.insert(key.clone(), value.clone())?,
                    other => {
                        return Err(Fault::value_error(format!(
                            "dictionary update sequence element has length {}; 2 is required",
                            other.len()
                        )));
                    }
                }
            }
        }
    }
    for (key, value) in &args.keywords {
        out.insert_str(key, value.clone());
    }
    Ok(Value::dict(out))
}

fn isinstance(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("isinstance", 2, 2, &[])?;
    let value = &args.positional[0];
    let candidates: Vec<Value> = match &args.positional[1] {
        Value::Tuple(items) => items.as_ref().clone(),
        other => vec![other.clone()],
    };

    for candidate in &candidates {
        let matched = match candidate {
            Value::Native(native) => match native.name {
                "int" => matches!(value, Value::Int(_) | Value::Bool(_)),
                "float" => matches!(value, Value::Float(_)),
                "str" => matches!(value, Value::Str(_)),
                "bool" => matches!(value, Value::Bool(_)),
                "list" => matches!(value, Value::List(_)),
                "tuple" => matches!(value, Value::Tuple(_)),
                "dict" => matches!(value, Value::Dict(_)),
                _ => false,
            },
            Value::ExceptionType(kind) => {
                matches!(value, Value::Exception(exc) if kind.catches(exc.kind))
            }
            other => {
                return Err(Fault::type_error(format!(
                    "isinstance() arg 2 must be a type or tuple of types, not {}",
                    other.type_name()
                )));
            }
        };
        if matched {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn format(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("format", 1, 2, &[])?;
    let spec = match args.get(1) {
        Some(Value::Str(spec)) => spec.to_string(),
        Some(other) => {
            return Err(Fault::type_error(format!(
                "format() argument 2 must be str, not {}",
                other.type_name()
            )));
        }
        None => String::new(),
    };
    Ok(Value::str(crate::runtime::format::format_value(&args.positional[0], &spec)?))
}

/// `write_chart(label, value, filename="chart.svg")`: a one-call bar chart
fn write_chart(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("write_chart", 2, 3, &["label", "value", "filename"])?;
    let label = required(&args, 0, "label", "write_chart")?;
    let value = required(&args, 1, "value", "write_chart")?;
    let target = args
        .arg(2, "filename")
        .cloned()
        .unwrap_or_else(|| Value::str("chart.svg"));

    let (categories, heights) = match value {
        Value::List(_) | Value::Tuple(_) | Value::Range(_) => {
            let labels = match label {
                Value::List(_) | Value::Tuple(_) => interp
                    .collect(label)?
                    .iter()
                    .map(Value::to_str)
                    .collect(),
                _ => Vec::new(),
            };
            let heights = interp
                .collect(value)?
                .iter()
                .map(|v| number(v, "write_chart"))
                .collect::<Result<Vec<_>, _>>()?;
            let categories = (0..heights.len())
                .map(|i| labels.get(i).cloned().unwrap_or_else(|| i.to_string()))
                .collect();
            (categories, heights)
        }
        single => (vec![label.to_str()], vec![number(single, "write_chart")?]),
    };

    let mut figure = Figure::default();
    if !matches!(label, Value::List(_) | Value::Tuple(_)) {
        figure.title = Some(label.to_str());
    }
    figure.add(
        SeriesKind::Bar {
            categories,
            heights,
            horizontal: false,
        },
        None,
        None,
    );

    let (name, note) = artifact_name(&target)?;
    if let Some(note) = note {
        interp.write_stderr(&note);
    }
    interp.write_artifact(&name, render_svg(&figure).as_bytes())?;
    Ok(Value::str(name))
}

#[cfg(test)]
mod tests {
    use crate::runtime::testing::{fault, run, stdout};

    #[test]
    fn print_separators() {
        assert_eq!(stdout("print('a', 1, None, sep='-', end='!\\n')\nprint()"), "a-1-None!\n\n");
    }

    #[test]
    fn aggregates() {
        assert_eq!(stdout("xs = [3, 1, 2]\nprint(len(xs), min(xs), max(xs), sum(xs), sum([0.5, 0.25], 1))"), "3 1 3 6 1.75\n");
        assert_eq!(stdout("print(min(4, 2, 8), max(['aa', 'b'], key=len), max([], default=0))"), "2 aa 0\n");
        assert_eq!(fault("min([])"), "ValueError: min() arg is an empty sequence");
    }

    #[test]
    fn rounding_is_bankers() {
        assert_eq!(stdout("print(round(2.5), round(3.5), round(-0.5), round(2.675, 2), round(1234, -2))"), "2 4 0 2.67 1200\n");
    }

    #[test]
    fn iteration_helpers() {
        assert_eq!(stdout("print(list(enumerate('ab', 1)), list(zip([1, 2, 3], 'xy')))"), "[(1, 'a'), (2, 'b')] [(1, 'x'), (2, 'y')]\n");
        assert_eq!(stdout("print(list(map(lambda a, b: a * b, [1, 2], [3, 4])), list(filter(None, [0, 1, '', 'x'])))"), "[3, 8] [1, 'x']\n");
        assert_eq!(stdout("print(sorted({'b': 1, 'a': 2}), list(reversed(range(3))), any([]), all([]))"), "['a', 'b'] [2, 1, 0] False True\n");
        assert_eq!(stdout("print(sorted([3, 1, 2], reverse=True), sorted(['bb', 'a'], key=len))"), "[3, 2, 1] ['a', 'bb']\n");
    }

    #[test]
    fn conversions() {
        assert_eq!(stdout("print(int('42'), int(-3.9), float('1e3'), float(' inf '), str(1.0), bool([]))"), "42 -3 1000.0 inf 1.0 False\n");
        assert_eq!(stdout("print(dict([('a', 1)], b=2), tuple([1]), list('ab'))"), "{'a': 1, 'b': 2} (1,) ['a', 'b']\n");
        assert_eq!(fault("int('x1')"), "ValueError: invalid literal for int() with base 10: 'x1'");
        assert_eq!(fault("float('abc')"), "ValueError: could not convert string to float: 'abc'");
        assert_eq!(fault("len(5)"), "TypeError: object of type 'int' has no len()");
    }

    #[test]
    fn isinstance_checks() {
        assert_eq!(stdout("print(isinstance(1, int), isinstance(True, int), isinstance(1.0, (int, str)), isinstance('x', str))"), "True True False True\n");
    }

    #[test]
    fn write_chart_writes_one_svg() {
        let run = run("label='x'; value=5; write_chart(label, value)");
        assert!(run.result.is_ok());
        assert_eq!(run.files, vec!["chart.svg".to_string()]);
        assert!(run.stderr.is_empty());
    }

    #[test]
    fn write_chart_with_sequences_and_custom_name() {
        let run = run("write_chart(['a', 'b'], [1, 2.5], filename='../bars.png')");
        assert!(run.result.is_ok());
        assert_eq!(run.files, vec!["bars.svg".to_string()]);
        assert!(run.stderr.contains("'.png'"));
    }

    #[test]
    fn write_chart_rejects_non_numbers() {
        assert!(fault("write_chart('x', 'five')").starts_with("TypeError"));
    }

    #[test]
    fn scratch_handle_is_opaque() {
        assert_eq!(stdout("print(output_dir, str(output_dir))"), "<scratch> <scratch>\n");
    }
}
