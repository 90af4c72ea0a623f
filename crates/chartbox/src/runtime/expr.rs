//! Expression evaluation, calls and iteration

use std::cell::RefCell;
use std::rc::Rc;

use crate::runtime::fault::{ExcKind, Exception, Fault};
use crate::runtime::stmt::{Flow, normalize_index};
use crate::runtime::value::{CallArgs, Dict, Function, Range, Scope, Value};
use crate::runtime::{Interpreter, MAX_CALL_DEPTH, format, slots};
use crate::script::ast::*;

/// Iterator over a snapshot of an iterable value
pub(crate) enum ValueIter {
    Range { next: i64, remaining: usize, step: i64 },
    Items(std::vec::IntoIter<Value>),
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            ValueIter::Range {
                next,
                remaining,
                step,
            } => {
                if *remaining == 0 {
                    return None;
                }
                let value = *next;
                *remaining -= 1;
                *next = next.wrapping_add(*step);
                Some(Value::Int(value))
            }
            ValueIter::Items(items) => items.next(),
        }
    }
}

impl Interpreter {
    pub(crate) fn eval(&mut self, expr: &Expr) -> Result<Value, Fault> {
        match &expr.kind {
            ExprKind::Int(i) => Ok(Value::Int(*i)),
            ExprKind::Float(f) => Ok(Value::Float(*f)),
            ExprKind::Str(s) => {
                self.charge(s.len() as u64)?;
                Ok(Value::str(s))
            }
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::None => Ok(Value::None),
            ExprKind::FString(parts) => self.eval_fstring(parts),
            ExprKind::Name(name) => self.lookup(name),
            ExprKind::List(items) => {
                let items = self.holding(|this| this.eval_all(items))?;
                self.charge(slots(items.len()))?;
                Ok(Value::list(items))
            }
            ExprKind::Tuple(items) => {
                let items = self.holding(|this| this.eval_all(items))?;
                self.charge(slots(items.len()))?;
                Ok(Value::tuple(items))
            }
            ExprKind::Dict(entries) => self.holding(|this| {
                let dict = Rc::new(RefCell::new(Dict::new()));
                this.hold(&Value::Dict(dict.clone()));
                for (key, value) in entries {
                    let key = this.eval(key)?;
                    this.hold(&key);
                    let value = this.eval(value)?;
                    dict.borrow_mut().insert(key, value)?;
                    this.charge(slots(2))?;
                }
                Ok(Value::Dict(dict))
            }),
            ExprKind::Attribute { value, attr } => {
                let object = self.eval(value)?;
                self.get_attr(&object, attr)
            }
            ExprKind::Subscript { value, index } => {
                let container = self.eval(value)?;
                if let ExprKind::Slice { lower, upper, step } = &index.kind {
                    let lower = self.eval_opt(lower.as_deref())?;
                    let upper = self.eval_opt(upper.as_deref())?;
                    let step = self.eval_opt(step.as_deref())?;
                    let sliced = self.slice(&container, lower, upper, step)?;
                    self.charge_fresh(&sliced)?;
                    return Ok(sliced);
                }
                let index = self.eval(index)?;
                self.get_item(&container, &index)
            }
            ExprKind::Slice { .. } => Err(Fault::type_error("slice outside of a subscript")),
            ExprKind::Call {
                func,
                args,
                keywords,
            } => self.holding(|this| {
                let func = this.eval(func)?;
                this.hold(&func);
                let positional = this.eval_all(args)?;
                let keywords = keywords
                    .iter()
                    .map(|k| {
                        let value = this.eval(&k.value)?;
                        this.hold(&value);
                        Ok((k.name.clone(), value))
                    })
                    .collect::<Result<Vec<_>, Fault>>()?;
                this.call(
                    &func,
                    CallArgs {
                        positional,
                        keywords,
                    },
                )
            }),
            ExprKind::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                self.unary_op(*op, operand)
            }
            ExprKind::Binary { op, left, right } => {
                let result = self.holding(|this| {
                    let left = this.eval(left)?;
                    this.hold(&left);
                    let right = this.eval(right)?;
                    this.binary_op(*op, left, right)
                })?;
                self.charge_fresh(&result)?;
                Ok(result)
            }
            ExprKind::BoolOp { op, left, right } => {
                let left = self.eval(left)?;
                match (op, left.truthy()) {
                    (BoolOp::And, false) | (BoolOp::Or, true) => Ok(left),
                    _ => self.eval(right),
                }
            }
            ExprKind::Compare { left, ops } => self.holding(|this| {
                let mut left = this.eval(left)?;
                for (op, right) in ops {
                    this.hold(&left);
                    let right = this.eval(right)?;
                    if !this.compare_op(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }),
            ExprKind::IfExp { test, body, orelse } => {
                if self.eval(test)?.truthy() {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                }
            }
            ExprKind::Lambda(def) => self.make_function(def),
            ExprKind::ListComp {
                element,
                target,
                iter,
                conditions,
            } => self.holding(|this| {
                let iterable = this.eval(iter)?;
                this.hold(&iterable);
                let out = this.held_list();
                'items: for item in this.iterate(&iterable)? {
                    this.tick()?;
                    this.assign(target, item)?;
                    for condition in conditions {
                        if !this.eval(condition)?.truthy() {
                            continue 'items;
                        }
                    }
                    let value = this.eval(element)?;
                    let len = out.borrow().len();
                    out.borrow_mut().push(value);
                    this.grow(len, 1)?;
                }
                Ok(Value::List(out))
            }),
        }
    }

    /// Evaluate `exprs` in order, holding each result for memory sweeps
    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Value>, Fault> {
        self.ensure_len(exprs.len())?;
        exprs
            .iter()
            .map(|e| {
                let value = self.eval(e)?;
                self.hold(&value);
                Ok(value)
            })
            .collect()
    }

    fn eval_opt(&mut self, expr: Option<&Expr>) -> Result<Value, Fault> {
        match expr {
            Some(expr) => self.eval(expr),
            None => Ok(Value::None),
        }
    }

    fn eval_fstring(&mut self, parts: &[FStringPart]) -> Result<Value, Fault> {
        let mut out = String::new();
        for part in parts {
            match part {
                FStringPart::Literal(text) => out.push_str(text),
                FStringPart::Field { expr, spec } => {
                    let value = self.eval(expr)?;
                    match spec {
                        Some(spec) => out.push_str(&format::format_value(&value, spec)?),
                        None => out.push_str(&value.to_str()),
                    }
                }
            }
            self.ensure_size(out.len() as u64)?;
        }
        self.charge(out.len() as u64)?;
        Ok(Value::str(out))
    }

    // === Calls ===

    pub(crate) fn call(&mut self, func: &Value, args: CallArgs) -> Result<Value, Fault> {
        self.tick()?;

        match func {
            Value::Native(native) => {
                let result = (native.func)(self, args)?;
                self.charge_fresh(&result)?;
                Ok(result)
            }
            Value::Function(function) => self.call_function(function, args),
            Value::Method(method) => {
                let receiver = method.receiver.clone();
                let name = method.name.clone();
                let result = self.call_method(&receiver, &name, args)?;
                self.charge_fresh(&result)?;
                Ok(result)
            }
            Value::ExceptionType(kind) => {
                args.expect(kind.name(), 0, 1, &[])?;
                let message = args.get(0).map(Value::to_str).unwrap_or_default();
                Ok(Value::Exception(Rc::new(Exception {
                    kind: *kind,
                    message,
                })))
            }
            other => Err(Fault::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(&mut self, function: &Rc<Function>, args: CallArgs) -> Result<Value, Fault> {
        if self.call_stack.len() >= MAX_CALL_DEPTH {
            return Err(Fault::new(
                ExcKind::RecursionError,
                "maximum recursion depth exceeded",
            ));
        }

        let def = &function.def;
        let scope = Scope::child(function.closure.clone());
        {
            let mut vars = scope.vars.borrow_mut();
            if args.positional.len() > def.params.len() {
                return Err(Fault::type_error(format!(
                    "{}() takes {} positional arguments but {} were given",
                    def.name,
                    def.params.len(),
                    args.positional.len()
                )));
            }
            for (param, value) in def.params.iter().zip(args.positional) {
                vars.insert(param.name.clone(), value);
            }
            for (name, value) in args.keywords {
                if !def.params.iter().any(|p| p.name == name) {
                    return Err(Fault::type_error(format!(
                        "{}() got an unexpected keyword argument '{name}'",
                        def.name
                    )));
                }
                if vars.contains_key(&name) {
                    return Err(Fault::type_error(format!(
                        "{}() got multiple values for argument '{name}'",
                        def.name
                    )));
                }
                vars.insert(name, value);
            }
            for (param, default) in def.params.iter().zip(&function.defaults) {
                if vars.contains_key(&param.name) {
                    continue;
                }
                match default {
                    Some(value) => {
                        vars.insert(param.name.clone(), value.clone());
                    }
                    None => {
                        return Err(Fault::type_error(format!(
                            "{}() missing required argument: '{}'",
                            def.name, param.name
                        )));
                    }
                }
            }
        }

        let saved = self.scope.replace(scope.clone());
        self.call_stack.push(scope);
        let result = self.exec_block(&def.body);
        self.call_stack.pop();
        self.scope = saved;

        match result? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }

    /// Call with positional arguments only
    pub(crate) fn call_positional(&mut self, func: &Value, args: Vec<Value>) -> Result<Value, Fault> {
        self.call(func, CallArgs::new(args))
    }

    // === Iteration ===

    pub(crate) fn iterate(&self, value: &Value) -> Result<ValueIter, Fault> {
        let items = match value {
            Value::Range(range) => {
                return Ok(ValueIter::Range {
                    next: range.start,
                    remaining: range.len(),
                    step: range.step,
                });
            }
            Value::List(items) => items.borrow().clone(),
            Value::Tuple(items) => items.as_ref().clone(),
            Value::Dict(dict) => dict.borrow().keys(),
            Value::Str(s) => {
                self.ensure_len(s.len())?;
                s.chars().map(|c| Value::str(c.to_string())).collect()
            }
            other => {
                return Err(Fault::type_error(format!(
                    "'{}' object is not iterable",
                    other.type_name()
                )));
            }
        };
        Ok(ValueIter::Items(items.into_iter()))
    }

    /// Materialize an iterable, refusing ones too large to hold
    pub(crate) fn collect(&self, value: &Value) -> Result<Vec<Value>, Fault> {
        if let Value::Range(range) = value {
            self.ensure_len(range.len())?;
        }
        Ok(self.iterate(value)?.collect())
    }

    // === Subscripts ===

    pub(crate) fn get_item(&self, container: &Value, index: &Value) -> Result<Value, Fault> {
        match container {
            Value::List(items) => {
                let items = items.borrow();
                let i = normalize_index(index, items.len(), "list")?;
                Ok(items[i].clone())
            }
            Value::Tuple(items) => {
                let i = normalize_index(index, items.len(), "tuple")?;
                Ok(items[i].clone())
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let i = normalize_index(index, chars.len(), "string")?;
                Ok(Value::str(chars[i].to_string()))
            }
            Value::Range(range) => {
                let i = normalize_index(index, range.len(), "range object")?;
                Ok(Value::Int(range.get(i).unwrap_or(range.start)))
            }
            Value::Dict(dict) => dict
                .borrow()
                .get(index)?
                .ok_or_else(|| Fault::key_error(index.repr())),
            other => Err(Fault::type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    fn slice(&self, container: &Value, lower: Value, upper: Value, step: Value) -> Result<Value, Fault> {
        let step = match step {
            Value::None => 1,
            other => other
                .as_i64()
                .ok_or_else(|| Fault::type_error("slice indices must be integers or None"))?,
        };
        if step == 0 {
            return Err(Fault::value_error("slice step cannot be zero"));
        }

        let select = |len: usize| -> Result<Vec<usize>, Fault> {
            let (start, stop) = slice_bounds(&lower, &upper, step, len)?;
            let mut indices = Vec::new();
            let mut i = start;
            while (step > 0 && i < stop) || (step < 0 && i > stop) {
                indices.push(i as usize);
                i += step;
            }
            Ok(indices)
        };

        match container {
            Value::List(items) => {
                let items = items.borrow();
                let picked = select(items.len())?;
                Ok(Value::list(picked.into_iter().map(|i| items[i].clone()).collect()))
            }
            Value::Tuple(items) => {
                let picked = select(items.len())?;
                Ok(Value::tuple(picked.into_iter().map(|i| items[i].clone()).collect()))
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let picked = select(chars.len())?;
                Ok(Value::str(picked.into_iter().map(|i| chars[i]).collect::<String>()))
            }
            Value::Range(range) => {
                let picked = select(range.len())?;
                self.ensure_len(picked.len())?;
                Ok(Value::list(
                    picked
                        .into_iter()
                        .filter_map(|i| range.get(i).map(Value::Int))
                        .collect(),
                ))
            }
            other => Err(Fault::type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }
}

/// Clamp slice bounds the way Python does
fn slice_bounds(lower: &Value, upper: &Value, step: i64, len: usize) -> Result<(i64, i64), Fault> {
    let len = len as i64;
    let resolve = |bound: &Value, default: i64| -> Result<i64, Fault> {
        let Some(raw) = (match bound {
            Value::None => None,
            other => Some(
                other
                    .as_i64()
                    .ok_or_else(|| Fault::type_error("slice indices must be integers or None"))?,
            ),
        }) else {
            return Ok(default);
        };
        let adjusted = if raw < 0 { raw + len } else { raw };
        Ok(if step > 0 {
            adjusted.clamp(0, len)
        } else {
            adjusted.clamp(-1, len - 1)
        })
    };

    if step > 0 {
        Ok((resolve(lower, 0)?, resolve(upper, len)?))
    } else {
        Ok((resolve(lower, len - 1)?, resolve(upper, -1)?))
    }
}

/// `range(...)` arguments to a range value
pub(crate) fn make_range(args: &[Value]) -> Result<Range, Fault> {
    let ints = args
        .iter()
        .map(|v| {
            v.as_i64().ok_or_else(|| {
                Fault::type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    v.type_name()
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => {
            return Err(Fault::type_error(format!(
                "range expected 1 to 3 arguments, got {}",
                ints.len()
            )));
        }
    };
    if step == 0 {
        return Err(Fault::value_error("range() arg 3 must not be zero"));
    }
    Ok(Range { start, stop, step })
}
