use std::collections::HashMap;

use crate::environment::{Binding, ModuleTable, number};
use crate::runtime::Interpreter;
use crate::runtime::fault::{ExcKind, Fault};
use crate::runtime::value::{CallArgs, Value};

use super::numbers;

pub(super) fn table() -> ModuleTable {
    ModuleTable::new(
        "statistics",
        vec![
            ("StatisticsError", Binding::Exception(ExcKind::ValueError)),
            ("mean", Binding::Function(mean)),
            ("fmean", Binding::Function(fmean)),
            ("median", Binding::Function(median)),
            ("mode", Binding::Function(mode)),
            ("variance", Binding::Function(variance)),
            ("pvariance", Binding::Function(pvariance)),
            ("stdev", Binding::Function(stdev)),
            ("pstdev", Binding::Function(pstdev)),
        ],
    )
}

fn statistics_error(message: &str) -> Fault {
    Fault::value_error(message)
}

fn data(interp: &Interpreter, args: &CallArgs, func: &str) -> Result<Vec<f64>, Fault> {
    args.expect(func, 1, 1, &[])?;
    numbers(interp, &args.positional[0], func)
}

/// `mean` keeps ints when the average is exact
fn mean(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("mean", 1, 1, &[])?;
    let items = interp.collect(&args.positional[0])?;
    if items.is_empty() {
        return Err(statistics_error("mean requires at least one data point"));
    }
    let ints: Option<Vec<i64>> = items
        .iter()
        .map(|v| match v {
            Value::Int(i) => Some(*i),
            _ => None,
        })
        .collect();
    if let Some(ints) = ints
        && let Some(total) = ints.iter().try_fold(0i64, |acc, i| acc.checked_add(*i))
        && total % ints.len() as i64 == 0
    {
        return Ok(Value::Int(total / ints.len() as i64));
    }
    let values = numbers(interp, &args.positional[0], "mean")?;
    Ok(Value::Float(average(&values)))
}

fn fmean(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    let values = data(interp, &args, "fmean")?;
    if values.is_empty() {
        return Err(statistics_error("fmean requires at least one data point"));
    }
    Ok(Value::Float(average(&values)))
}

fn median(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("median", 1, 1, &[])?;
    let mut items = interp.collect(&args.positional[0])?;
    if items.is_empty() {
        return Err(statistics_error("no median for empty data"));
    }
    interp.sort_values(&mut items, None, false)?;
    let mid = items.len() / 2;
    if items.len() % 2 == 1 {
        return Ok(items[mid].clone());
    }
    let low = number(&items[mid - 1], "median")?;
    let high = number(&items[mid], "median")?;
    Ok(Value::Float((low + high) / 2.0))
}

/// Most common value; the first one seen wins ties
fn mode(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("mode", 1, 1, &[])?;
    let items = interp.collect(&args.positional[0])?;
    let mut counts = HashMap::new();
    let mut best: Option<(usize, usize)> = None;
    for (index, item) in items.iter().enumerate() {
        let entry = counts.entry(item.hash_key()?).or_insert((0usize, index));
        entry.0 += 1;
        let (count, first) = *entry;
        best = match best {
            Some((best_count, best_first))
                if best_count > count || (best_count == count && best_first < first) =>
            {
                Some((best_count, best_first))
            }
            _ => Some((count, first)),
        };
    }
    best.map(|(_, index)| items[index].clone())
        .ok_or_else(|| statistics_error("no mode for empty data"))
}

fn average(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sum of squared deviations from the mean
fn squared_deviations(values: &[f64]) -> f64 {
    let mu = average(values);
    values.iter().map(|x| (x - mu) * (x - mu)).sum()
}

fn variance(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    let values = data(interp, &args, "variance")?;
    if values.len() < 2 {
        return Err(statistics_error("variance requires at least two data points"));
    }
    Ok(Value::Float(squared_deviations(&values) / (values.len() - 1) as f64))
}

fn pvariance(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    let values = data(interp, &args, "pvariance")?;
    if values.is_empty() {
        return Err(statistics_error("pvariance requires at least one data point"));
    }
    Ok(Value::Float(squared_deviations(&values) / values.len() as f64))
}

fn stdev(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    let values = data(interp, &args, "stdev")?;
    if values.len() < 2 {
        return Err(statistics_error("stdev requires at least two data points"));
    }
    Ok(Value::Float((squared_deviations(&values) / (values.len() - 1) as f64).sqrt()))
}

fn pstdev(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    let values = data(interp, &args, "pstdev")?;
    if values.is_empty() {
        return Err(statistics_error("pstdev requires at least one data point"));
    }
    Ok(Value::Float((squared_deviations(&values) / values.len() as f64).sqrt()))
}
