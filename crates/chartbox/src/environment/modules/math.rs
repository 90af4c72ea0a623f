use std::f64::consts;

use crate::environment::{Binding, ModuleTable, number};
use crate::runtime::Interpreter;
use crate::runtime::fault::{ExcKind, Fault};
use crate::runtime::value::{CallArgs, Value};
use crate::script::ast::BinOp;

use super::numbers;

pub(super) fn table() -> ModuleTable {
    ModuleTable::new(
        "math",
        vec![
            ("pi", Binding::Float(consts::PI)),
            ("e", Binding::Float(consts::E)),
            ("tau", Binding::Float(consts::TAU)),
            ("inf", Binding::Float(f64::INFINITY)),
            ("nan", Binding::Float(f64::NAN)),
            ("sqrt", Binding::Function(sqrt)),
            ("exp", Binding::Function(exp)),
            ("log", Binding::Function(log)),
            ("log10", Binding::Function(log10)),
            ("log2", Binding::Function(log2)),
            ("pow", Binding::Function(pow)),
            ("sin", Binding::Function(sin)),
            ("cos", Binding::Function(cos)),
            ("tan", Binding::Function(tan)),
            ("asin", Binding::Function(asin)),
            ("acos", Binding::Function(acos)),
            ("atan", Binding::Function(atan)),
            ("atan2", Binding::Function(atan2)),
            ("hypot", Binding::Function(hypot)),
            ("degrees", Binding::Function(degrees)),
            ("radians", Binding::Function(radians)),
            ("fabs", Binding::Function(fabs)),
            ("floor", Binding::Function(floor)),
            ("ceil", Binding::Function(ceil)),
            ("trunc", Binding::Function(trunc)),
            ("isnan", Binding::Function(isnan)),
            ("isinf", Binding::Function(isinf)),
            ("isfinite", Binding::Function(isfinite)),
            ("isclose", Binding::Function(isclose)),
            ("factorial", Binding::Function(factorial)),
            ("gcd", Binding::Function(gcd)),
            ("fsum", Binding::Function(fsum)),
            ("prod", Binding::Function(prod)),
        ],
    )
}

fn domain_error() -> Fault {
    Fault::value_error("math domain error")
}

/// One float in, one float out; `None` from `f` is a domain error
fn unary(args: &CallArgs, name: &str, f: impl Fn(f64) -> Option<f64>) -> Result<Value, Fault> {
    args.expect(name, 1, 1, &[])?;
    let x = number(&args.positional[0], name)?;
    let result = f(x).ok_or_else(domain_error)?;
    if result.is_infinite() && x.is_finite() {
        return Err(Fault::new(ExcKind::OverflowError, "math range error"));
    }
    Ok(Value::Float(result))
}

fn binary(args: &CallArgs, name: &str, f: impl Fn(f64, f64) -> f64) -> Result<Value, Fault> {
    args.expect(name, 2, 2, &[])?;
    let a = number(&args.positional[0], name)?;
    let b = number(&args.positional[1], name)?;
    Ok(Value::Float(f(a, b)))
}

fn sqrt(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    unary(&args, "sqrt", |x| (x >= 0.0).then(|| x.sqrt()))
}

fn exp(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    unary(&args, "exp", |x| Some(x.exp()))
}

fn log(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("log", 1, 2, &[])?;
    let x = number(&args.positional[0], "log")?;
    if x <= 0.0 {
        return Err(domain_error());
    }
    match args.get(1) {
        Some(base) => {
            let base = number(base, "log")?;
            if base <= 0.0 || base == 1.0 {
                return Err(domain_error());
            }
            Ok(Value::Float(x.ln() / base.ln()))
        }
        None => Ok(Value::Float(x.ln())),
    }
}

fn log10(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    unary(&args, "log10", |x| (x > 0.0).then(|| x.log10()))
}

fn log2(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    unary(&args, "log2", |x| (x > 0.0).then(|| x.log2()))
}

fn pow(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    binary(&args, "pow", f64::powf)
}

fn sin(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    unary(&args, "sin", |x| x.is_finite().then(|| x.sin()))
}

fn cos(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    unary(&args, "cos", |x| x.is_finite().then(|| x.cos()))
}

fn tan(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    unary(&args, "tan", |x| x.is_finite().then(|| x.tan()))
}

fn asin(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    unary(&args, "asin", |x| (-1.0..=1.0).contains(&x).then(|| x.asin()))
}

fn acos(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    unary(&args, "acos", |x| (-1.0..=1.0).contains(&x).then(|| x.acos()))
}

fn atan(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    unary(&args, "atan", |x| Some(x.atan()))
}

fn atan2(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    binary(&args, "atan2", f64::atan2)
}

fn hypot(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    binary(&args, "hypot", f64::hypot)
}

fn degrees(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    unary(&args, "degrees", |x| Some(x.to_degrees()))
}

fn radians(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    unary(&args, "radians", |x| Some(x.to_radians()))
}

fn fabs(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    unary(&args, "fabs", |x| Some(x.abs()))
}

/// `floor`/`ceil`/`trunc` return ints
fn to_int(args: &CallArgs, name: &str, f: fn(f64) -> f64) -> Result<Value, Fault> {
    args.expect(name, 1, 1, &[])?;
    if let Value::Int(i) = &args.positional[0] {
        return Ok(Value::Int(*i));
    }
    let x = f(number(&args.positional[0], name)?);
    if x.is_nan() {
        return Err(Fault::value_error("cannot convert float NaN to integer"));
    }
    if !x.is_finite() || x.abs() >= 9.2e18 {
        return Err(Fault::new(
            ExcKind::OverflowError,
            "cannot convert float infinity to integer",
        ));
    }
    Ok(Value::Int(x as i64))
}

fn floor(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    to_int(&args, "floor", f64::floor)
}

fn ceil(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    to_int(&args, "ceil", f64::ceil)
}

fn trunc(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    to_int(&args, "trunc", f64::trunc)
}

fn predicate(args: &CallArgs, name: &str, f: fn(f64) -> bool) -> Result<Value, Fault> {
    args.expect(name, 1, 1, &[])?;
    Ok(Value::Bool(f(number(&args.positional[0], name)?)))
}

fn isnan(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    predicate(&args, "isnan", f64::is_nan)
}

fn isinf(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    predicate(&args, "isinf", f64::is_infinite)
}

fn isfinite(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    predicate(&args, "isfinite", f64::is_finite)
}

fn isclose(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("isclose", 2, 2, &["rel_tol", "abs_tol"])?;
    let a = number(&args.positional[0], "isclose")?;
    let b = number(&args.positional[1], "isclose")?;
    let rel_tol = match args.keyword("rel_tol") {
        Some(v) => number(v, "isclose")?,
        None => 1e-9,
    };
    let abs_tol = match args.keyword("abs_tol") {
        Some(v) => number(v, "isclose")?,
        None => 0.0,
    };
    if a == b {
        return Ok(Value::Bool(true));
    }
    let diff = (a - b).abs();
    Ok(Value::Bool(
        diff <= (rel_tol * b.abs()).max(rel_tol * a.abs()) || diff <= abs_tol,
    ))
}

fn factorial(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("factorial", 1, 1, &[])?;
    let n = args.positional[0]
        .as_i64()
        .ok_or_else(|| Fault::type_error("factorial() only accepts integral values"))?;
    if n < 0 {
        return Err(Fault::value_error("factorial() not defined for negative values"));
    }
    let mut acc: i64 = 1;
    for i in 2..=n {
        interp.tick()?;
        acc = acc.checked_mul(i).ok_or_else(Fault::overflow)?;
    }
    Ok(Value::Int(acc))
}

fn gcd(_: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("gcd", 0, usize::MAX, &[])?;
    let mut acc: u64 = 0;
    for value in &args.positional {
        let mut b = value
            .as_i64()
            .ok_or_else(|| {
                Fault::type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    value.type_name()
                ))
            })?
            .unsigned_abs();
        let mut a = acc;
        while b != 0 {
            (a, b) = (b, a % b);
        }
        acc = a;
    }
    i64::try_from(acc).map(Value::Int).map_err(|_| Fault::overflow())
}

fn fsum(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("fsum", 1, 1, &[])?;
    // Neumaier summation
    let mut sum = 0.0;
    let mut compensation = 0.0;
    for x in numbers(interp, &args.positional[0], "fsum")? {
        let t = sum + x;
        if sum.abs() >= x.abs() {
            compensation += (sum - t) + x;
        } else {
            compensation += (x - t) + sum;
        }
        sum = t;
    }
    Ok(Value::Float(sum + compensation))
}

fn prod(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("prod", 1, 1, &["start"])?;
    let mut acc = args.keyword("start").cloned().unwrap_or(Value::Int(1));
    for item in interp.collect(&args.positional[0])? {
        acc = interp.binary_op(BinOp::Mul, acc, item)?;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use crate::runtime::testing::{fault, stdout};

    #[test]
    fn constants_and_functions() {
        assert_eq!(stdout("import math\nprint(math.pi, math.sqrt(16), math.floor(-2.5), math.ceil(2.1))"), "3.141592653589793 4.0 -3 3\n");
        assert_eq!(stdout("from math import log, isclose, factorial, gcd\nprint(log(8, 2), isclose(0.1 + 0.2, 0.3), factorial(5), gcd(12, 18))"), "3.0 True 120 6\n");
        assert_eq!(stdout("import math as m\nprint(m.fsum([0.5, 0.25, 0.125]), m.prod([2, 3, 4]))"), "0.875 24\n");
    }

    #[test]
    fn domain_errors() {
        assert_eq!(fault("import math\nmath.sqrt(-1)"), "ValueError: math domain error");
        assert_eq!(fault("import math\nmath.log(0)"), "ValueError: math domain error");
        assert!(fault("import math\nmath.exp(1000)").starts_with("OverflowError"));
        assert!(fault("import math\nmath.factorial(30)").starts_with("OverflowError"));
    }
}
