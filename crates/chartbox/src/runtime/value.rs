//! Runtime values
//!
//! Values live only on the worker thread that runs a snippet, so shared
//! containers use `Rc<RefCell<_>>`. Anything that has to cross threads
//! (the environment, faults, results) is converted at the boundary.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::runtime::Interpreter;
use crate::runtime::fault::{ExcKind, Exception, Fault};
use crate::script::ast::FunctionDef;

/// Deepest container nesting that is printed, hashed or compared
pub const MAX_NESTING_DEPTH: usize = 1000;

/// Signature of every host-provided function
pub type NativeFn = fn(&mut Interpreter, CallArgs) -> Result<Value, Fault>;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<Vec<Value>>),
    Dict(Rc<RefCell<Dict>>),
    Range(Range),
    Function(Rc<Function>),
    Native(Native),
    Module(Rc<Module>),
    Method(Rc<Method>),
    ExceptionType(ExcKind),
    Exception(Rc<Exception>),
    /// Opaque handle for the scratch directory
    Scratch,
    /// Path inside the scratch directory, relative to it
    ScratchPath(Rc<str>),
}

/// User-defined function or lambda
pub struct Function {
    pub def: Arc<FunctionDef>,
    pub defaults: Vec<Option<Value>>,
    /// Enclosing function scope, for nested definitions
    pub closure: Option<Rc<Scope>>,
}

/// One function activation's variables
#[derive(Default)]
pub struct Scope {
    pub vars: RefCell<HashMap<String, Value>>,
    pub parent: Option<Rc<Scope>>,
}

impl Scope {
    pub fn child(parent: Option<Rc<Scope>>) -> Rc<Scope> {
        Rc::new(Scope {
            vars: RefCell::default(),
            parent,
        })
    }

    /// Look the name up here and in enclosing scopes
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.vars.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|p| p.lookup(name))
    }
}

#[derive(Clone, Copy)]
pub struct Native {
    pub name: &'static str,
    pub func: NativeFn,
}

pub struct Module {
    pub name: String,
    pub attrs: HashMap<String, Value>,
}

/// Method looked up on a builtin value, waiting to be called
pub struct Method {
    pub receiver: Value,
    pub name: Rc<str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl Range {
    pub fn len(&self) -> usize {
        let span = if self.step > 0 {
            (self.stop as i128) - (self.start as i128)
        } else {
            (self.start as i128) - (self.stop as i128)
        };
        if span <= 0 {
            return 0;
        }
        let step = (self.step as i128).abs();
        ((span + step - 1) / step) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<i64> {
        if index >= self.len() {
            return None;
        }
        Some(self.start.wrapping_add(self.step.wrapping_mul(index as i64)))
    }
}

/// Arguments passed to a native function
#[derive(Default)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn new(positional: Vec<Value>) -> Self {
        Self {
            positional,
            keywords: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }

    /// Check the positional count, and refuse keywords outside `allowed`
    pub fn expect(&self, name: &str, min: usize, max: usize, allowed: &[&str]) -> Result<(), Fault> {
        let count = self.positional.len();
        if count < min || count > max {
            let expected = if min == max {
                format!("exactly {min}")
            } else if count < min {
                format!("at least {min}")
            } else {
                format!("at most {max}")
            };
            return Err(Fault::type_error(format!(
                "{name}() takes {expected} positional argument{} ({count} given)",
                if min == max && min == 1 { "" } else { "s" },
            )));
        }
        if let Some((key, _)) = self.keywords.iter().find(|(k, _)| !allowed.contains(&k.as_str())) {
            return Err(Fault::type_error(format!(
                "{name}() got an unexpected keyword argument '{key}'"
            )));
        }
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keywords.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Positional argument `index`, or keyword `name`
    pub fn arg(&self, index: usize, name: &str) -> Option<&Value> {
        self.get(index).or_else(|| self.keyword(name))
    }
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(items))
    }

    pub fn dict(dict: Dict) -> Value {
        Value::Dict(Rc::new(RefCell::new(dict)))
    }

    pub fn native(name: &'static str, func: NativeFn) -> Value {
        Value::Native(Native { name, func })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Range(_) => "range",
            Value::Function(_) => "function",
            Value::Native(_) => "builtin_function_or_method",
            Value::Module(_) => "module",
            Value::Method(_) => "method",
            Value::ExceptionType(_) => "type",
            Value::Exception(exc) => exc.kind.name(),
            Value::Scratch => "scratch_dir",
            Value::ScratchPath(_) => "scratch_path",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(dict) => !dict.borrow().is_empty(),
            Value::Range(range) => !range.is_empty(),
            _ => true,
        }
    }

    /// Numeric view of ints, bools and floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer view of ints and bools
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// `str(value)`
    pub fn to_str(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            Value::Exception(exc) => exc.message.clone(),
            _ => self.repr(),
        }
    }

    /// `repr(value)`
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.repr_into(&mut out, &mut Vec::new());
        out
    }

    fn repr_into(&self, out: &mut String, seen: &mut Vec<usize>) {
        if seen.len() > MAX_NESTING_DEPTH
            && matches!(self, Value::List(_) | Value::Tuple(_) | Value::Dict(_))
        {
            out.push_str("...");
            return;
        }
        match self {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(i) => out.push_str(&i.to_string()),
            Value::Float(f) => out.push_str(&format_float(*f)),
            Value::Str(s) => out.push_str(&quote(s)),
            Value::List(items) => {
                let ptr = Rc::as_ptr(items) as usize;
                if seen.contains(&ptr) {
                    out.push_str("[...]");
                    return;
                }
                seen.push(ptr);
                out.push('[');
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.repr_into(out, seen);
                }
                out.push(']');
                seen.pop();
            }
            Value::Tuple(items) => {
                seen.push(Rc::as_ptr(items) as usize);
                out.push('(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.repr_into(out, seen);
                }
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
                seen.pop();
            }
            Value::Dict(dict) => {
                let ptr = Rc::as_ptr(dict) as usize;
                if seen.contains(&ptr) {
                    out.push_str("{...}");
                    return;
                }
                seen.push(ptr);
                out.push('{');
                for (i, (key, value)) in dict.borrow().entries().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    key.repr_into(out, seen);
                    out.push_str(": ");
                    value.repr_into(out, seen);
                }
                out.push('}');
                seen.pop();
            }
            Value::Range(r) => {
                if r.step == 1 {
                    out.push_str(&format!("range({}, {})", r.start, r.stop));
                } else {
                    out.push_str(&format!("range({}, {}, {})", r.start, r.stop, r.step));
                }
            }
            Value::Function(func) => out.push_str(&format!("<function {}>", func.def.name)),
            Value::Native(native) => {
                out.push_str(&format!("<built-in function {}>", native.name))
            }
            Value::Module(module) => out.push_str(&format!("<module '{}'>", module.name)),
            Value::Method(method) => out.push_str(&format!(
                "<built-in method {} of {} object>",
                method.name,
                method.receiver.type_name()
            )),
            Value::ExceptionType(kind) => out.push_str(&format!("<class '{kind}'>")),
            Value::Exception(exc) => {
                out.push_str(&format!("{}({})", exc.kind, quote(&exc.message)))
            }
            Value::Scratch => out.push_str("<scratch>"),
            Value::ScratchPath(rel) => {
                out.push_str("<scratch>/");
                out.push_str(rel);
            }
        }
    }

    /// Key used to index dicts
    pub fn hash_key(&self) -> Result<HashKey, Fault> {
        self.hash_key_at(0)
    }

    fn hash_key_at(&self, depth: usize) -> Result<HashKey, Fault> {
        match self {
            Value::None => Ok(HashKey::None),
            Value::Bool(b) => Ok(HashKey::Int(*b as i64)),
            Value::Int(i) => Ok(HashKey::Int(*i)),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 9.0e18 {
                    Ok(HashKey::Int(*f as i64))
                } else {
                    Ok(HashKey::Float(f.to_bits()))
                }
            }
            Value::Str(s) => Ok(HashKey::Str(s.clone())),
            Value::Tuple(items) => {
                if depth > MAX_NESTING_DEPTH {
                    return Err(Fault::new(
                        ExcKind::RecursionError,
                        "maximum recursion depth exceeded while hashing",
                    ));
                }
                items
                    .iter()
                    .map(|item| item.hash_key_at(depth + 1))
                    .collect::<Result<Vec<_>, _>>()
                    .map(HashKey::Tuple)
            }
            Value::ExceptionType(kind) => Ok(HashKey::Str(Rc::from(kind.name()))),
            other => Err(Fault::type_error(format!(
                "unhashable type: '{}'",
                other.type_name()
            ))),
        }
    }

    /// Convert a JSON value (context entries, `json.loads`)
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::str(s),
            serde_json::Value::Array(items) => {
                Value::list(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                let mut dict = Dict::new();
                for (key, value) in map {
                    dict.insert_str(key, Value::from_json(value));
                }
                Value::dict(dict)
            }
        }
    }

    /// Convert to JSON (`json.dumps`)
    pub fn to_json(&self) -> Result<serde_json::Value, Fault> {
        self.to_json_at(0)
    }

    fn to_json_at(&self, depth: usize) -> Result<serde_json::Value, Fault> {
        const MAX_DEPTH: usize = 100;
        if depth > MAX_DEPTH {
            return Err(Fault::value_error("Circular reference detected"));
        }

        Ok(match self {
            Value::None => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| Fault::value_error("Out of range float values are not JSON compliant"))?,
            Value::Str(s) => serde_json::Value::String(s.to_string()),
            Value::List(items) => serde_json::Value::Array(
                items
                    .borrow()
                    .iter()
                    .map(|item| item.to_json_at(depth + 1))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Tuple(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|item| item.to_json_at(depth + 1))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Dict(dict) => {
                let mut map = serde_json::Map::new();
                for (key, value) in dict.borrow().entries() {
                    let key = match key {
                        Value::Str(s) => s.to_string(),
                        Value::None => "null".to_string(),
                        Value::Bool(b) => b.to_string(),
                        Value::Int(_) | Value::Float(_) => key.repr(),
                        other => {
                            return Err(Fault::type_error(format!(
                                "keys must be str, int, float, bool or None, not {}",
                                other.type_name()
                            )));
                        }
                    };
                    map.insert(key, value.to_json_at(depth + 1)?);
                }
                serde_json::Value::Object(map)
            }
            other => {
                return Err(Fault::type_error(format!(
                    "Object of type {} is not JSON serializable",
                    other.type_name()
                )));
            }
        })
    }
}

/// Approximate memory held by a set of values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Footprint {
    pub bytes: u64,
    /// Deepest container nesting seen
    pub depth: usize,
}

impl Footprint {
    /// Measure `roots`, counting shared containers once
    ///
    /// Walks with an explicit stack so that deeply nested data cannot
    /// exhaust the thread's stack.
    pub fn measure<'a>(roots: impl IntoIterator<Item = &'a Value>) -> Footprint {
        let mut seen: HashSet<usize> = HashSet::new();
        let mut stack: Vec<(Value, usize)> = roots.into_iter().map(|v| (v.clone(), 1)).collect();
        let mut footprint = Footprint::default();

        while let Some((value, depth)) = stack.pop() {
            footprint.bytes += SLOT;
            match &value {
                Value::Str(s) | Value::ScratchPath(s) => footprint.bytes += s.len() as u64,
                Value::Exception(exc) => footprint.bytes += exc.message.len() as u64,
                Value::List(items) => {
                    if seen.insert(Rc::as_ptr(items) as usize) {
                        footprint.depth = footprint.depth.max(depth);
                        stack.extend(items.borrow().iter().map(|v| (v.clone(), depth + 1)));
                    }
                }
                Value::Tuple(items) => {
                    if seen.insert(Rc::as_ptr(items) as usize) {
                        footprint.depth = footprint.depth.max(depth);
                        stack.extend(items.iter().map(|v| (v.clone(), depth + 1)));
                    }
                }
                Value::Dict(dict) => {
                    if seen.insert(Rc::as_ptr(dict) as usize) {
                        footprint.depth = footprint.depth.max(depth);
                        for (key, value) in dict.borrow().entries() {
                            footprint.bytes += SLOT;
                            stack.push((key.clone(), depth + 1));
                            stack.push((value.clone(), depth + 1));
                        }
                    }
                }
                _ => {}
            }
        }
        footprint
    }

    /// Bytes of `value` that nothing else references yet
    ///
    /// Descends only into strings and containers held solely by their
    /// parent, so parts shared with live data are not counted again.
    pub fn fresh(value: &Value) -> u64 {
        if !is_unshared(value) {
            return 0;
        }

        let mut bytes = 0u64;
        let mut stack = vec![value.clone()];
        while let Some(value) = stack.pop() {
            bytes = bytes.saturating_add(own_bytes(&value));
            let mut visit = |child: &Value| {
                if is_unshared(child) {
                    stack.push(child.clone());
                }
            };
            match &value {
                Value::List(items) => items.borrow().iter().for_each(&mut visit),
                Value::Tuple(items) => items.iter().for_each(&mut visit),
                Value::Dict(dict) => {
                    for (key, value) in dict.borrow().entries() {
                        visit(key);
                        visit(value);
                    }
                }
                _ => {}
            }
        }
        bytes
    }
}

const SLOT: u64 = std::mem::size_of::<Value>() as u64;

/// Heap bytes a value owns directly, excluding its elements
fn own_bytes(value: &Value) -> u64 {
    match value {
        Value::Str(s) | Value::ScratchPath(s) => s.len() as u64,
        Value::List(items) => items.borrow().len() as u64 * SLOT,
        Value::Tuple(items) => items.len() as u64 * SLOT,
        Value::Dict(dict) => dict.borrow().len() as u64 * 2 * SLOT,
        _ => 0,
    }
}

fn is_unshared(value: &Value) -> bool {
    match value {
        Value::Str(s) => Rc::strong_count(s) == 1,
        Value::List(items) => Rc::strong_count(items) == 1,
        Value::Tuple(items) => Rc::strong_count(items) == 1,
        Value::Dict(dict) => Rc::strong_count(dict) == 1,
        _ => false,
    }
}

/// Empty every container and scope reachable from `roots`
///
/// Lists, dicts and closure scopes can refer back to themselves, and
/// reference counting never frees such cycles. Emptying them before the
/// roots are dropped releases everything a run built. The walk keeps an
/// explicit stack, so deep nesting cannot overflow the thread's stack.
pub(crate) fn dismantle(roots: Vec<Value>, scopes: Vec<Rc<Scope>>) {
    let mut stack = roots;
    let mut scopes = scopes;
    let mut seen: HashSet<usize> = HashSet::new();

    loop {
        if let Some(scope) = scopes.pop() {
            stack.extend(std::mem::take(&mut *scope.vars.borrow_mut()).into_values());
            if let Some(parent) = &scope.parent {
                scopes.push(parent.clone());
            }
            continue;
        }
        let Some(value) = stack.pop() else {
            break;
        };
        match value {
            Value::List(items) => stack.append(&mut *items.borrow_mut()),
            Value::Dict(dict) => {
                let dict = std::mem::take(&mut *dict.borrow_mut());
                for (key, value) in dict.entries {
                    stack.push(key);
                    stack.push(value);
                }
            }
            Value::Tuple(items) => {
                if seen.insert(Rc::as_ptr(&items) as usize) {
                    stack.extend(items.iter().cloned());
                }
            }
            Value::Function(function) => {
                if seen.insert(Rc::as_ptr(&function) as usize) {
                    stack.extend(function.defaults.iter().flatten().cloned());
                    scopes.extend(function.closure.clone());
                }
            }
            Value::Method(method) => {
                if seen.insert(Rc::as_ptr(&method) as usize) {
                    stack.push(method.receiver.clone());
                }
            }
            _ => {}
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

/// Hashable projection of a value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    None,
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Tuple(Vec<HashKey>),
}

/// Insertion-ordered dictionary
#[derive(Clone, Default)]
pub struct Dict {
    entries: Vec<(Value, Value)>,
    index: HashMap<HashKey, usize>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(Value, Value)] {
        &self.entries
    }

    pub fn get(&self, key: &Value) -> Result<Option<Value>, Fault> {
        let hash = key.hash_key()?;
        Ok(self.index.get(&hash).map(|&i| self.entries[i].1.clone()))
    }

    pub fn contains(&self, key: &Value) -> Result<bool, Fault> {
        Ok(self.index.contains_key(&key.hash_key()?))
    }

    pub fn insert(&mut self, key: Value, value: Value) -> Result<(), Fault> {
        let hash = key.hash_key()?;
        match self.index.get(&hash) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(hash, self.entries.len());
                self.entries.push((key, value));
            }
        }
        Ok(())
    }

    /// Insert with a string key (cannot fail)
    pub fn insert_str(&mut self, key: &str, value: Value) {
        let key: Rc<str> = Rc::from(key);
        match self.index.get(&HashKey::Str(key.clone())) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(HashKey::Str(key.clone()), self.entries.len());
                self.entries.push((Value::Str(key), value));
            }
        }
    }

    pub fn remove(&mut self, key: &Value) -> Result<Option<Value>, Fault> {
        let hash = key.hash_key()?;
        let Some(i) = self.index.remove(&hash) else {
            return Ok(None);
        };
        let (_, value) = self.entries.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Ok(Some(value))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }
}

/// Python-style float formatting (`1.0`, `0.1`, `1e+20`)
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let magnitude = f.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let formatted = format!("{f:e}");
        let (mantissa, exponent) = formatted.split_once('e').unwrap_or((&formatted, "0"));
        let (sign, digits) = match exponent.strip_prefix('-') {
            Some(digits) => ('-', digits),
            None => ('+', exponent),
        };
        return format!("{mantissa}e{sign}{digits:0>2}");
    }

    let formatted = format!("{f}");
    if formatted.contains('.') {
        formatted
    } else {
        format!("{formatted}.0")
    }
}

/// Quote a string the way `repr` does
fn quote(s: &str) -> String {
    let delimiter = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delimiter);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == delimiter => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(delimiter);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_formatting_matches_python() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(-2.5), "-2.5");
        assert_eq!(format_float(1e20), "1e+20");
        assert_eq!(format_float(1.5e-5), "1.5e-05");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(0.0), "0.0");
    }

    #[test]
    fn repr_of_containers() {
        let list = Value::list(vec![Value::Int(1), Value::str("a"), Value::None]);
        assert_eq!(list.repr(), "[1, 'a', None]");
        assert_eq!(Value::tuple(vec![Value::Int(1)]).repr(), "(1,)");
        assert_eq!(Value::str("it's").repr(), "\"it's\"");
        assert_eq!(Value::str("x").to_str(), "x");
    }

    #[test]
    fn self_referencing_list_repr_terminates() {
        let list = Value::list(vec![]);
        if let Value::List(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        assert_eq!(list.repr(), "[[...]]");
        assert!(Footprint::measure([&list]).bytes > 0);
        if let Value::List(items) = &list {
            items.borrow_mut().clear();
        }
    }

    #[test]
    fn dict_preserves_order_and_numeric_keys_unify() {
        let mut dict = Dict::new();
        dict.insert(Value::str("b"), Value::Int(1)).unwrap();
        dict.insert(Value::str("a"), Value::Int(2)).unwrap();
        dict.insert(Value::Int(1), Value::Int(3)).unwrap();
        dict.insert(Value::Float(1.0), Value::Int(4)).unwrap();
        assert_eq!(dict.len(), 3);
        assert_eq!(Value::dict(dict.clone()).repr(), "{'b': 1, 'a': 2, 1: 4}");

        assert_eq!(dict.remove(&Value::str("b")).unwrap().map(|v| v.repr()), Some("1".into()));
        assert_eq!(dict.get(&Value::Int(1)).unwrap().map(|v| v.repr()), Some("4".into()));
        assert_eq!(dict.get(&Value::str("a")).unwrap().map(|v| v.repr()), Some("2".into()));
    }

    #[test]
    fn footprint_counts_nesting_and_shared_values_once() {
        let inner = Value::list(vec![Value::str("abcd")]);
        let outer = Value::list(vec![inner.clone(), inner.clone()]);
        let single = Footprint::measure([&inner]);
        let both = Footprint::measure([&outer]);
        assert_eq!(single.depth, 1);
        assert_eq!(both.depth, 2);
        assert!(both.bytes < 2 * single.bytes + 3 * std::mem::size_of::<Value>() as u64);
    }

    #[test]
    fn deeply_nested_repr_is_cut_off() {
        let mut value = Value::list(vec![]);
        for _ in 0..(MAX_NESTING_DEPTH + 10) {
            value = Value::list(vec![value]);
        }
        assert!(value.repr().contains("..."));
    }

    #[test]
    fn lists_are_unhashable() {
        let err = Value::list(vec![]).hash_key().unwrap_err();
        assert_eq!(err.to_string(), "TypeError: unhashable type: 'list'");
    }

    #[test]
    fn range_length() {
        assert_eq!(Range { start: 0, stop: 10, step: 3 }.len(), 4);
        assert_eq!(Range { start: 10, stop: 0, step: -2 }.len(), 5);
        assert_eq!(Range { start: 5, stop: 5, step: 1 }.len(), 0);
        assert_eq!(Range { start: 0, stop: 10, step: 3 }.get(3), Some(9));
    }

    #[test]
    fn json_conversion() {
        let json: serde_json::Value = serde_json::from_str(r#"{"a": [1, 2.5, null], "b": true}"#).unwrap();
        let value = Value::from_json(&json);
        assert_eq!(value.repr(), "{'a': [1, 2.5, None], 'b': True}");
        assert_eq!(value.to_json().unwrap(), json);
    }

    #[test]
    fn nan_is_not_json() {
        assert!(Value::Float(f64::NAN).to_json().is_err());
        assert!(Value::Scratch.to_json().is_err());
    }
}
