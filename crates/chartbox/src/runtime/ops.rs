//! Operators with the snippet language's numeric and sequence semantics

use std::cmp::Ordering;
use std::rc::Rc;

use crate::runtime::fault::{ExcKind, Fault};
use crate::runtime::value::{MAX_NESTING_DEPTH, Value};
use crate::runtime::{Interpreter, format};
use crate::script::ast::{BinOp, CmpOp, UnaryOp};

/// Operands after numeric promotion
enum Numbers {
    Ints(i64, i64),
    Floats(f64, f64),
}

fn numbers(left: &Value, right: &Value) -> Option<Numbers> {
    match (left, right) {
        (Value::Float(_), _) | (_, Value::Float(_)) => {
            Some(Numbers::Floats(left.as_f64()?, right.as_f64()?))
        }
        _ => Some(Numbers::Ints(left.as_i64()?, right.as_i64()?)),
    }
}

fn unsupported(op: &str, left: &Value, right: &Value) -> Fault {
    Fault::type_error(format!(
        "unsupported operand type(s) for {op}: '{}' and '{}'",
        left.type_name(),
        right.type_name()
    ))
}

impl Interpreter {
    pub(crate) fn unary_op(&self, op: UnaryOp, operand: Value) -> Result<Value, Fault> {
        match (op, &operand) {
            (UnaryOp::Not, _) => Ok(Value::Bool(!operand.truthy())),
            (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
            (UnaryOp::Pos, Value::Float(_)) => Ok(operand),
            (UnaryOp::Neg, Value::Int(_) | Value::Bool(_)) => {
                let i = operand.as_i64().unwrap_or_default();
                i.checked_neg().map(Value::Int).ok_or_else(Fault::overflow)
            }
            (UnaryOp::Pos, Value::Int(_) | Value::Bool(_)) => {
                Ok(Value::Int(operand.as_i64().unwrap_or_default()))
            }
            (_, other) => Err(Fault::type_error(format!(
                "bad operand type for unary {}: '{}'",
                if op == UnaryOp::Neg { "-" } else { "+" },
                other.type_name()
            ))),
        }
    }

    pub(crate) fn binary_op(&self, op: BinOp, left: Value, right: Value) -> Result<Value, Fault> {
        match op {
            BinOp::Add => self.add(left, right),
            BinOp::Mul => self.mul(left, right),
            BinOp::Mod if matches!(left, Value::Str(_)) => {
                let text = left.as_str().unwrap_or_default();
                let formatted = format::percent_format(text, &right)?;
                self.ensure_size(formatted.len() as u64)?;
                Ok(Value::str(formatted))
            }
            _ => arithmetic(op, &left, &right),
        }
    }

    /// `target op= value`; lists extend in place
    pub(crate) fn augmented_op(&self, op: BinOp, current: Value, rhs: Value) -> Result<Value, Fault> {
        if op == BinOp::Add
            && let Value::List(items) = &current
        {
            let extra = self.collect(&rhs)?;
            let len = items.borrow().len();
            self.grow(len, extra.len())?;
            items.borrow_mut().extend(extra);
            return Ok(current);
        }
        self.binary_op(op, current, rhs)
    }

    fn add(&self, left: Value, right: Value) -> Result<Value, Fault> {
        match (&left, &right) {
            (Value::Str(a), Value::Str(b)) => {
                self.ensure_size((a.len() + b.len()) as u64)?;
                Ok(Value::str(format!("{a}{b}")))
            }
            (Value::List(a), Value::List(b)) => {
                self.ensure_len(a.borrow().len() + b.borrow().len())?;
                let mut items = a.borrow().clone();
                items.extend(b.borrow().iter().cloned());
                Ok(Value::list(items))
            }
            (Value::Tuple(a), Value::Tuple(b)) => {
                self.ensure_len(a.len() + b.len())?;
                Ok(Value::tuple(a.iter().chain(b.iter()).cloned().collect()))
            }
            _ => arithmetic(BinOp::Add, &left, &right),
        }
    }

    fn mul(&self, left: Value, right: Value) -> Result<Value, Fault> {
        let (sequence, count) = match (&left, &right) {
            (Value::Str(_) | Value::List(_) | Value::Tuple(_), Value::Int(_) | Value::Bool(_)) => {
                (&left, right.as_i64().unwrap_or_default())
            }
            (Value::Int(_) | Value::Bool(_), Value::Str(_) | Value::List(_) | Value::Tuple(_)) => {
                (&right, left.as_i64().unwrap_or_default())
            }
            _ => return arithmetic(BinOp::Mul, &left, &right),
        };
        let count = usize::try_from(count).unwrap_or(0);

        match sequence {
            Value::Str(s) => {
                self.ensure_size((s.len() as u64).saturating_mul(count as u64))?;
                Ok(Value::str(s.repeat(count)))
            }
            Value::List(items) => {
                let items = items.borrow();
                self.ensure_len(items.len().saturating_mul(count))?;
                Ok(Value::list(repeat(&items, count)))
            }
            Value::Tuple(items) => {
                self.ensure_len(items.len().saturating_mul(count))?;
                Ok(Value::tuple(repeat(items, count)))
            }
            _ => Err(unsupported("*", &left, &right)),
        }
    }

    pub(crate) fn compare_op(&self, op: CmpOp, left: &Value, right: &Value) -> Result<bool, Fault> {
        match op {
            CmpOp::Eq => equals(left, right),
            CmpOp::NotEq => Ok(!equals(left, right)?),
            CmpOp::Lt => Ok(order(left, right, "<")? == Some(Ordering::Less)),
            CmpOp::LtE => Ok(matches!(
                order(left, right, "<=")?,
                Some(Ordering::Less | Ordering::Equal)
            )),
            CmpOp::Gt => Ok(order(left, right, ">")? == Some(Ordering::Greater)),
            CmpOp::GtE => Ok(matches!(
                order(left, right, ">=")?,
                Some(Ordering::Greater | Ordering::Equal)
            )),
            CmpOp::In => contains(right, left),
            CmpOp::NotIn => Ok(!contains(right, left)?),
            CmpOp::Is => Ok(identical(left, right)),
            CmpOp::IsNot => Ok(!identical(left, right)),
        }
    }

    /// Stable in-place sort with an optional key function
    pub(crate) fn sort_values(
        &mut self,
        items: &mut Vec<Value>,
        key: Option<&Value>,
        reverse: bool,
    ) -> Result<(), Fault> {
        let keys = match key {
            Some(Value::None) | None => items.clone(),
            Some(func) => self.holding(|this| {
                let keys = this.held_list();
                for item in items.iter() {
                    let key = this.call_positional(func, vec![item.clone()])?;
                    keys.borrow_mut().push(key);
                }
                Ok(std::mem::take(&mut *keys.borrow_mut()))
            })?,
        };

        let mut error = None;
        let mut paired: Vec<(Value, Value)> = keys.into_iter().zip(items.drain(..)).collect();
        paired.sort_by(|(a, _), (b, _)| {
            if error.is_some() {
                return Ordering::Equal;
            }
            let (a, b) = if reverse { (b, a) } else { (a, b) };
            match order(a, b, "<") {
                Ok(ordering) => ordering.unwrap_or(Ordering::Equal),
                Err(fault) => {
                    error = Some(fault);
                    Ordering::Equal
                }
            }
        });
        items.extend(paired.into_iter().map(|(_, item)| item));

        match error {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }
}

fn repeat(items: &[Value], count: usize) -> Vec<Value> {
    let mut out = Vec::with_capacity(items.len() * count);
    for _ in 0..count {
        out.extend(items.iter().cloned());
    }
    out
}

/// Numeric operators shared by every operand pair that is not a sequence
fn arithmetic(op: BinOp, left: &Value, right: &Value) -> Result<Value, Fault> {
    let Some(operands) = numbers(left, right) else {
        return Err(unsupported(op.symbol(), left, right));
    };

    match operands {
        Numbers::Ints(a, b) => int_arithmetic(op, a, b),
        Numbers::Floats(a, b) => float_arithmetic(op, a, b).map(Value::Float),
    }
}

fn int_arithmetic(op: BinOp, a: i64, b: i64) -> Result<Value, Fault> {
    let checked = |result: Option<i64>| result.map(Value::Int).ok_or_else(Fault::overflow);

    match op {
        BinOp::Add => checked(a.checked_add(b)),
        BinOp::Sub => checked(a.checked_sub(b)),
        BinOp::Mul => checked(a.checked_mul(b)),
        BinOp::Div => float_arithmetic(op, a as f64, b as f64).map(Value::Float),
        BinOp::FloorDiv | BinOp::Mod if b == 0 => Err(Fault::zero_division(
            "integer division or modulo by zero",
        )),
        BinOp::FloorDiv => {
            let q = a.checked_div(b).ok_or_else(Fault::overflow)?;
            let adjust = a % b != 0 && ((a < 0) != (b < 0));
            checked(if adjust { q.checked_sub(1) } else { Some(q) })
        }
        BinOp::Mod => {
            let r = a.checked_rem(b).unwrap_or(0);
            Ok(Value::Int(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }))
        }
        BinOp::Pow => {
            if b < 0 {
                return float_arithmetic(op, a as f64, b as f64).map(Value::Float);
            }
            let exp = u32::try_from(b).map_err(|_| Fault::overflow())?;
            checked(a.checked_pow(exp))
        }
    }
}

fn float_arithmetic(op: BinOp, a: f64, b: f64) -> Result<f64, Fault> {
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(Fault::zero_division("division by zero"));
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(Fault::zero_division("float floor division by zero"));
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(Fault::zero_division("float modulo"));
            }
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) { r + b } else { r }
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(Fault::zero_division(
                    "0.0 cannot be raised to a negative power",
                ));
            }
            if a < 0.0 && b.fract() != 0.0 {
                return Err(Fault::value_error("math domain error"));
            }
            a.powf(b)
        }
    };
    if op == BinOp::Pow && result.is_infinite() && a.is_finite() && b.is_finite() {
        return Err(Fault::new(
            ExcKind::OverflowError,
            "numerical result out of range",
        ));
    }
    Ok(result)
}

/// `==`
pub fn equals(left: &Value, right: &Value) -> Result<bool, Fault> {
    equals_at(left, right, 0)
}

fn equals_at(left: &Value, right: &Value, depth: usize) -> Result<bool, Fault> {
    if depth > MAX_NESTING_DEPTH {
        return Err(Fault::new(
            ExcKind::RecursionError,
            "maximum recursion depth exceeded in comparison",
        ));
    }
    let sequences = |a: &[Value], b: &[Value]| -> Result<bool, Fault> {
        if a.len() != b.len() {
            return Ok(false);
        }
        for (x, y) in a.iter().zip(b) {
            if !equals_at(x, y, depth + 1)? {
                return Ok(false);
            }
        }
        Ok(true)
    };

    match (left, right) {
        (Value::None, Value::None) => Ok(true),
        (Value::Str(a), Value::Str(b)) => Ok(a == b),
        (Value::List(a), Value::List(b)) => {
            if Rc::ptr_eq(a, b) {
                return Ok(true);
            }
            sequences(&a.borrow(), &b.borrow())
        }
        (Value::Tuple(a), Value::Tuple(b)) => sequences(a, b),
        (Value::Dict(a), Value::Dict(b)) => {
            if Rc::ptr_eq(a, b) {
                return Ok(true);
            }
            let (a, b) = (a.borrow(), b.borrow());
            if a.len() != b.len() {
                return Ok(false);
            }
            for (key, value) in a.entries() {
                match b.get(key)? {
                    Some(other) if equals_at(value, &other, depth + 1)? => {}
                    _ => return Ok(false),
                }
            }
            Ok(true)
        }
        (Value::Range(a), Value::Range(b)) => Ok(a.len() == b.len()
            && (a.is_empty() || (a.start == b.start && (a.len() == 1 || a.step == b.step)))),
        (Value::ExceptionType(a), Value::ExceptionType(b)) => Ok(a == b),
        (Value::Scratch, Value::Scratch) => Ok(true),
        (Value::ScratchPath(a), Value::ScratchPath(b)) => Ok(a == b),
        _ => match numbers(left, right) {
            Some(Numbers::Ints(a, b)) => Ok(a == b),
            Some(Numbers::Floats(a, b)) => Ok(a == b),
            None => Ok(identical(left, right)),
        },
    }
}

/// Ordering for `<` and friends; `None` when unordered (NaN)
pub fn order(left: &Value, right: &Value, symbol: &str) -> Result<Option<Ordering>, Fault> {
    order_at(left, right, symbol, 0)
}

fn order_at(left: &Value, right: &Value, symbol: &str, depth: usize) -> Result<Option<Ordering>, Fault> {
    if depth > MAX_NESTING_DEPTH {
        return Err(Fault::new(
            ExcKind::RecursionError,
            "maximum recursion depth exceeded in comparison",
        ));
    }
    let sequences = |a: &[Value], b: &[Value]| -> Result<Option<Ordering>, Fault> {
        for (x, y) in a.iter().zip(b) {
            if !equals_at(x, y, depth + 1)? {
                return order_at(x, y, symbol, depth + 1);
            }
        }
        Ok(Some(a.len().cmp(&b.len())))
    };

    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::List(a), Value::List(b)) => sequences(&a.borrow(), &b.borrow()),
        (Value::Tuple(a), Value::Tuple(b)) => sequences(a, b),
        _ => match numbers(left, right) {
            Some(Numbers::Ints(a, b)) => Ok(Some(a.cmp(&b))),
            Some(Numbers::Floats(a, b)) => Ok(a.partial_cmp(&b)),
            None => Err(Fault::type_error(format!(
                "'{symbol}' not supported between instances of '{}' and '{}'",
                left.type_name(),
                right.type_name()
            ))),
        },
    }
}

/// `a < b`, for sorting and `min`/`max`
pub fn less_than(left: &Value, right: &Value) -> Result<bool, Fault> {
    Ok(order(left, right, "<")? == Some(Ordering::Less))
}

/// `item in container`
pub fn contains(container: &Value, item: &Value) -> Result<bool, Fault> {
    match container {
        Value::List(items) => any_equal(&items.borrow(), item),
        Value::Tuple(items) => any_equal(items, item),
        Value::Dict(dict) => dict.borrow().contains(item),
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(needle.as_ref())),
            other => Err(Fault::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::Range(range) => {
            let Some(i) = item.as_i64() else {
                return Ok(false);
            };
            let offset = i.wrapping_sub(range.start);
            let in_bounds = if range.step > 0 {
                i >= range.start && i < range.stop
            } else {
                i <= range.start && i > range.stop
            };
            Ok(in_bounds && offset % range.step == 0)
        }
        other => Err(Fault::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn any_equal(items: &[Value], item: &Value) -> Result<bool, Fault> {
    for candidate in items {
        if equals(candidate, item)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// `a is b`
pub fn identical(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::None, Value::None) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a == b,
        (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
        (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
        (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
        (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
        (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
        (Value::Native(a), Value::Native(b)) => a.name == b.name,
        (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
        (Value::ExceptionType(a), Value::ExceptionType(b)) => a == b,
        (Value::Scratch, Value::Scratch) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::{fault, stdout};

    #[test]
    fn python_division_semantics() {
        assert_eq!(stdout("print(-7 // 2, 7 // -2, -7 % 3, 7 % -3, -7.5 // 2, 5.5 % -2)"), "-4 -4 2 -2 -4.0 -0.5\n");
    }

    #[test]
    fn zero_division_messages() {
        assert_eq!(fault("1 / 0"), "ZeroDivisionError: division by zero");
        assert_eq!(fault("1 // 0"), "ZeroDivisionError: integer division or modulo by zero");
        assert_eq!(fault("1.0 % 0"), "ZeroDivisionError: float modulo");
    }

    #[test]
    fn integer_overflow_is_an_error() {
        assert!(fault("x = 2 ** 64").starts_with("OverflowError"));
        assert!(fault("x = 9223372036854775807 + 1").starts_with("OverflowError"));
    }

    #[test]
    fn mixed_numeric_operations() {
        assert_eq!(stdout("print(1 + 2.5, True + 1, 3 * 0.5, 2 ** 0.5 > 1.41)"), "3.5 2 1.5 True\n");
        assert_eq!(stdout("print(1 == 1.0, 0.1 + 0.2 == 0.3, 1 < 1.5)"), "True False True\n");
    }

    #[test]
    fn sequence_operators() {
        assert_eq!(stdout("print('ab' * 3, [0] * 3, (1,) + (2,), [1] + [2])"), "ababab [0, 0, 0] (1, 2) [1, 2]\n");
        assert_eq!(stdout("print('-' * -1 == '', [1, 2] < [1, 3], (1, 2) == (1, 2))"), "True True True\n");
    }

    #[test]
    fn in_place_list_extend_keeps_identity() {
        assert_eq!(stdout("a = [1]\nb = a\na += [2, 3]\nprint(b, a is b)"), "[1, 2, 3] True\n");
    }

    #[test]
    fn huge_repetition_is_refused() {
        assert!(fault("s = 'x' * (10 ** 12)").starts_with("MemoryError"));
    }

    #[test]
    fn mismatched_types() {
        assert_eq!(fault("1 + 'a'"), "TypeError: unsupported operand type(s) for +: 'int' and 'str'");
        assert!(fault("1 < 'a'").contains("'<' not supported"));
    }

    #[test]
    fn nan_compares_false() {
        let nan = Value::Float(f64::NAN);
        assert!(!less_than(&nan, &Value::Int(1)).unwrap());
        assert!(!less_than(&Value::Int(1), &nan).unwrap());
        assert!(!equals(&nan, &nan).unwrap());
    }

    #[test]
    fn membership() {
        assert!(contains(&Value::str("chart"), &Value::str("art")).unwrap());
        assert!(contains(&Value::list(vec![Value::Int(1), Value::Float(2.0)]), &Value::Int(2)).unwrap());
        assert!(contains(&Value::Range(crate::runtime::value::Range { start: 0, stop: 10, step: 3 }), &Value::Int(9)).unwrap());
        assert!(!contains(&Value::Range(crate::runtime::value::Range { start: 0, stop: 10, step: 3 }), &Value::Int(4)).unwrap());
    }

    #[test]
    fn deeply_nested_comparison_is_bounded() {
        let mut a = Value::list(vec![]);
        let mut b = Value::list(vec![]);
        for _ in 0..(MAX_NESTING_DEPTH + 10) {
            a = Value::list(vec![a]);
            b = Value::list(vec![b]);
        }
        let result = equals(&a, &b);
        assert!(matches!(result, Err(f) if f.kind() == Some(ExcKind::RecursionError)));
    }
}
