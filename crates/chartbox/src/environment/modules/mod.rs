//! Library namespaces the host provides

mod json;
mod math;
mod path;
mod pyplot;
mod random;
mod statistics;

use crate::environment::{ModuleTable, number};
use crate::runtime::Interpreter;
use crate::runtime::fault::Fault;
use crate::runtime::value::Value;

/// Every library table, whether or not the active level exposes it
pub(super) fn libraries() -> Vec<ModuleTable> {
    vec![
        math::table(),
        random::table(),
        statistics::table(),
        json::table(),
        path::table(),
        pyplot::matplotlib(),
        pyplot::table(),
    ]
}

/// Materialize an iterable of numbers
pub(crate) fn numbers(interp: &Interpreter, value: &Value, func: &str) -> Result<Vec<f64>, Fault> {
    interp
        .collect(value)?
        .iter()
        .map(|v| number(v, func))
        .collect()
}
