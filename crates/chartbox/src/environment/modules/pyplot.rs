//! `matplotlib.pyplot` over the in-process [`Figure`] model
//!
//! Only the state-machine interface is provided. `subplots()` hands back the
//! module itself for both the figure and the axes, so `ax.plot(...)` and
//! `fig.savefig(...)` land on the same current figure.

use crate::chart::{DEFAULT_SIZE, Figure, SeriesKind, render_svg};
use crate::environment::{Binding, ModuleTable, artifact_name, number, required};
use crate::runtime::Interpreter;
use crate::runtime::fault::Fault;
use crate::runtime::value::{CallArgs, Value};

use super::numbers;

/// Pixels per inch of `figsize`
const DPI: f64 = 100.0;

pub(super) fn matplotlib() -> ModuleTable {
    ModuleTable::new("matplotlib", vec![("use", Binding::Function(use_backend))])
}

pub(super) fn table() -> ModuleTable {
    ModuleTable::new(
        "matplotlib.pyplot",
        vec![
            ("figure", Binding::Function(figure)),
            ("subplots", Binding::Function(subplots)),
            ("plot", Binding::Function(plot)),
            ("bar", Binding::Function(bar)),
            ("barh", Binding::Function(barh)),
            ("scatter", Binding::Function(scatter)),
            ("pie", Binding::Function(pie)),
            ("title", Binding::Function(title)),
            ("set_title", Binding::Function(title)),
            ("xlabel", Binding::Function(xlabel)),
            ("set_xlabel", Binding::Function(xlabel)),
            ("ylabel", Binding::Function(ylabel)),
            ("set_ylabel", Binding::Function(ylabel)),
            ("legend", Binding::Function(legend)),
            ("grid", Binding::Function(grid)),
            ("xticks", Binding::Function(xticks)),
            ("tight_layout", Binding::Function(no_op)),
            ("show", Binding::Function(no_op)),
            ("savefig", Binding::Function(savefig)),
            ("close", Binding::Function(close)),
        ],
    )
}

/// Rendering is always SVG; backend selection has nothing to switch
fn use_backend(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("use", 1, 1, &["force"])?;
    Ok(Value::None)
}

fn no_op(_: &mut Interpreter, _: CallArgs) -> Result<Value, Fault> {
    Ok(Value::None)
}

fn text(value: &Value) -> String {
    value.to_str()
}

/// `label=` and `color=`/`c=` keywords shared by every series call
fn style(args: &CallArgs) -> (Option<String>, Option<String>) {
    let label = args.keyword("label").map(text);
    let color = args
        .keyword("color")
        .or_else(|| args.keyword("c"))
        .and_then(Value::as_str)
        .map(str::to_string);
    (label, color)
}

fn figsize(args: &CallArgs) -> Result<(f64, f64), Fault> {
    match args.keyword("figsize") {
        Some(Value::Tuple(size)) if size.len() == 2 => Ok((
            number(&size[0], "figure")? * DPI,
            number(&size[1], "figure")? * DPI,
        )),
        Some(Value::List(size)) if size.borrow().len() == 2 => {
            let size = size.borrow();
            Ok((number(&size[0], "figure")? * DPI, number(&size[1], "figure")? * DPI))
        }
        Some(other) => Err(Fault::value_error(format!(
            "figsize must be a (width, height) pair, not {}",
            other.repr()
        ))),
        None => Ok(DEFAULT_SIZE),
    }
}

fn figure(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("figure", 0, 1, &["figsize", "dpi", "num"])?;
    let (width, height) = figsize(&args)?;
    interp.figures().open(width, height);
    Ok(Value::None)
}

fn subplots(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("subplots", 0, 2, &["figsize", "dpi"])?;
    if args.positional.iter().any(|n| n.as_i64() != Some(1)) {
        return Err(Fault::value_error("only a single subplot is supported"));
    }
    let (width, height) = figsize(&args)?;
    interp.figures().open(width, height);
    let pyplot = Value::Module(interp.module("matplotlib.pyplot")?);
    Ok(Value::tuple(vec![pyplot.clone(), pyplot]))
}

fn same_length(xs: &[f64], ys: &[f64]) -> Result<(), Fault> {
    if xs.len() != ys.len() {
        return Err(Fault::value_error(format!(
            "x and y must have same first dimension, but have shapes ({},) and ({},)",
            xs.len(),
            ys.len()
        )));
    }
    Ok(())
}

/// `plot(ys)`, `plot(xs, ys)` or either followed by a format string
fn plot(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("plot", 1, 3, &["label", "color", "c", "marker", "linestyle", "linewidth"])?;
    let mut positional = args.positional.clone();
    let fmt = match positional.last() {
        Some(Value::Str(fmt)) if positional.len() > 1 => {
            let fmt = fmt.to_string();
            positional.pop();
            fmt
        }
        _ => String::new(),
    };

    let (xs, ys) = match positional.as_slice() {
        [ys] => {
            let ys = numbers(interp, ys, "plot")?;
            ((0..ys.len()).map(|i| i as f64).collect(), ys)
        }
        [xs, ys] => (numbers(interp, xs, "plot")?, numbers(interp, ys, "plot")?),
        _ => return Err(Fault::type_error("plot() takes x and y data")),
    };
    same_length(&xs, &ys)?;
    interp.ensure_len(xs.len().saturating_mul(2))?;

    let marker = fmt.contains(['o', '.', 's', '^', '*', 'x'])
        || args.keyword("marker").is_some_and(|m| !matches!(m, Value::None));
    let dashed = fmt.contains("--")
        || args
            .keyword("linestyle")
            .and_then(Value::as_str)
            .is_some_and(|ls| matches!(ls, "--" | "dashed"));

    let (label, color) = style(&args);
    interp
        .figures()
        .current()
        .add(SeriesKind::Line { xs, ys, marker, dashed }, label, color);
    Ok(Value::None)
}

fn bars(interp: &mut Interpreter, args: &CallArgs, func: &str, horizontal: bool) -> Result<Value, Fault> {
    args.expect(func, 2, 2, &["label", "color", "width", "height", "align"])?;
    let categories: Vec<String> = interp
        .collect(&args.positional[0])?
        .iter()
        .map(text)
        .collect();
    let heights = numbers(interp, &args.positional[1], func)?;
    if categories.len() != heights.len() {
        return Err(Fault::value_error(format!(
            "shape mismatch: {} categories but {} values",
            categories.len(),
            heights.len()
        )));
    }
    interp.ensure_len(categories.len().saturating_mul(2))?;

    let (label, color) = style(args);
    interp.figures().current().add(
        SeriesKind::Bar { categories, heights, horizontal },
        label,
        color,
    );
    Ok(Value::None)
}

fn bar(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    bars(interp, &args, "bar", false)
}

fn barh(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    bars(interp, &args, "barh", true)
}

fn scatter(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("scatter", 2, 2, &["label", "color", "c", "s", "alpha", "marker"])?;
    let xs = numbers(interp, &args.positional[0], "scatter")?;
    let ys = numbers(interp, &args.positional[1], "scatter")?;
    same_length(&xs, &ys)?;
    interp.ensure_len(xs.len().saturating_mul(2))?;

    let (label, color) = style(&args);
    interp
        .figures()
        .current()
        .add(SeriesKind::Scatter { xs, ys }, label, color);
    Ok(Value::None)
}

fn pie(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("pie", 1, 1, &["labels", "autopct", "startangle"])?;
    let values = numbers(interp, &args.positional[0], "pie")?;
    if values.iter().any(|v| *v < 0.0) {
        return Err(Fault::value_error("wedge sizes must be non negative values"));
    }
    let labels = match args.keyword("labels") {
        Some(Value::None) | None => Vec::new(),
        Some(labels) => interp.collect(labels)?.iter().map(text).collect(),
    };
    interp
        .figures()
        .current()
        .add(SeriesKind::Pie { labels, values }, None, None);
    Ok(Value::None)
}

fn set_text(interp: &mut Interpreter, args: &CallArgs, func: &str, slot: fn(&mut Figure) -> &mut Option<String>) -> Result<Value, Fault> {
    args.expect(func, 1, 1, &["fontsize", "loc", "pad"])?;
    let value = text(required(args, 0, "label", func)?);
    *slot(interp.figures().current()) = Some(value);
    Ok(Value::None)
}

fn title(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    set_text(interp, &args, "title", |f| &mut f.title)
}

fn xlabel(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    set_text(interp, &args, "xlabel", |f| &mut f.xlabel)
}

fn ylabel(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    set_text(interp, &args, "ylabel", |f| &mut f.ylabel)
}

fn legend(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("legend", 0, 0, &["loc", "fontsize", "title"])?;
    interp.figures().current().legend = true;
    Ok(Value::None)
}

fn grid(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("grid", 0, 1, &["visible", "alpha", "linestyle", "axis"])?;
    let visible = args.arg(0, "visible").is_none_or(Value::truthy);
    interp.figures().current().grid = visible;
    Ok(Value::None)
}

fn xticks(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("xticks", 0, 2, &["labels", "rotation"])?;
    let Some(ticks) = args.get(0) else {
        return Ok(Value::None);
    };
    let positions = numbers(interp, ticks, "xticks")?;
    let labels: Vec<String> = match args.arg(1, "labels") {
        Some(labels) => interp.collect(labels)?.iter().map(text).collect(),
        None => positions.iter().map(|p| text(&Value::Float(*p))).collect(),
    };
    if labels.len() != positions.len() {
        return Err(Fault::value_error(format!(
            "the number of labels ({}) does not match the number of ticks ({})",
            labels.len(),
            positions.len()
        )));
    }
    interp.figures().current().xticks = Some((positions, labels));
    Ok(Value::None)
}

/// Render the current figure into the scratch directory
fn savefig(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect(
        "savefig",
        1,
        1,
        &["dpi", "bbox_inches", "format", "transparent", "facecolor"],
    )?;
    let (name, note) = artifact_name(required(&args, 0, "fname", "savefig")?)?;
    if let Some(note) = note {
        interp.write_stderr(&note);
    }
    let svg = render_svg(interp.figures().current());
    interp.write_artifact(&name, svg.as_bytes())?;
    Ok(Value::None)
}

fn close(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("close", 0, 1, &[])?;
    interp.figures().close();
    Ok(Value::None)
}
