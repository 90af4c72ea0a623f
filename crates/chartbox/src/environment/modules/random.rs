use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::environment::{Binding, ModuleTable, number, required};
use crate::runtime::Interpreter;
use crate::runtime::fault::Fault;
use crate::runtime::value::{CallArgs, Value};

pub(super) fn table() -> ModuleTable {
    ModuleTable::new(
        "random",
        vec![
            ("random", Binding::Function(random)),
            ("uniform", Binding::Function(uniform)),
            ("randint", Binding::Function(randint)),
            ("randrange", Binding::Function(randrange)),
            ("choice", Binding::Function(choice)),
            ("choices", Binding::Function(choices)),
            ("shuffle", Binding::Function(shuffle)),
            ("sample", Binding::Function(sample)),
            ("gauss", Binding::Function(gauss)),
            ("normalvariate", Binding::Function(gauss)),
            ("seed", Binding::Function(seed)),
        ],
    )
}

fn integer(value: &Value, func: &str) -> Result<i64, Fault> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(Fault::type_error(format!(
            "{func}() expected an integer, not '{}'",
            other.type_name()
        ))),
    }
}

fn random(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("random", 0, 0, &[])?;
    Ok(Value::Float(interp.rng().r#gen::<f64>()))
}

fn uniform(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("uniform", 2, 2, &[])?;
    let a = number(&args.positional[0], "uniform")?;
    let b = number(&args.positional[1], "uniform")?;
    let t = interp.rng().r#gen::<f64>();
    Ok(Value::Float(a + (b - a) * t))
}

fn randint(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("randint", 2, 2, &[])?;
    let a = integer(&args.positional[0], "randint")?;
    let b = integer(&args.positional[1], "randint")?;
    if a > b {
        return Err(Fault::value_error(format!("empty range for randint({a}, {b})")));
    }
    Ok(Value::Int(interp.rng().gen_range(a..=b)))
}

fn randrange(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("randrange", 1, 3, &[])?;
    let bounds: Vec<i64> = args
        .positional
        .iter()
        .map(|v| integer(v, "randrange"))
        .collect::<Result<_, _>>()?;
    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(Fault::type_error("randrange() takes 1 to 3 arguments")),
    };
    if step == 0 {
        return Err(Fault::value_error("zero step for randrange()"));
    }
    let count = if step > 0 {
        (stop - start + step - 1) / step
    } else {
        (start - stop - step - 1) / -step
    };
    if count <= 0 {
        return Err(Fault::value_error(format!(
            "empty range for randrange({start}, {stop}, {step})"
        )));
    }
    let index = interp.rng().gen_range(0..count);
    Ok(Value::Int(start + index * step))
}

fn choice(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("choice", 1, 1, &[])?;
    let items = interp.collect(&args.positional[0])?;
    items
        .choose(interp.rng())
        .cloned()
        .ok_or_else(|| Fault::index_error("Cannot choose from an empty sequence"))
}

fn choices(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("choices", 1, 1, &["k"])?;
    let items = interp.collect(&args.positional[0])?;
    let k = match args.keyword("k") {
        Some(k) => integer(k, "choices")?.max(0) as usize,
        None => 1,
    };
    if items.is_empty() && k > 0 {
        return Err(Fault::index_error("Cannot choose from an empty sequence"));
    }
    interp.ensure_len(k)?;
    let mut picked = Vec::with_capacity(k);
    for _ in 0..k {
        interp.tick()?;
        let index = interp.rng().gen_range(0..items.len());
        picked.push(items[index].clone());
    }
    Ok(Value::list(picked))
}

fn shuffle(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("shuffle", 1, 1, &[])?;
    let Value::List(items) = &args.positional[0] else {
        return Err(Fault::type_error(format!(
            "shuffle() expected a list, not '{}'",
            args.positional[0].type_name()
        )));
    };
    items.borrow_mut().shuffle(interp.rng());
    Ok(Value::None)
}

fn sample(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("sample", 1, 2, &["k"])?;
    let population = interp.collect(&args.positional[0])?;
    let k = integer(required(&args, 1, "k", "sample")?, "sample")?;
    if k < 0 || k as usize > population.len() {
        return Err(Fault::value_error("Sample larger than population or is negative"));
    }
    let picked = rand::seq::index::sample(interp.rng(), population.len(), k as usize)
        .into_iter()
        .map(|i| population[i].clone())
        .collect();
    Ok(Value::list(picked))
}

/// Box-Muller transform over the run's generator
fn gauss(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("gauss", 0, 2, &["mu", "sigma"])?;
    let mu = match args.arg(0, "mu") {
        Some(v) => number(v, "gauss")?,
        None => 0.0,
    };
    let sigma = match args.arg(1, "sigma") {
        Some(v) => number(v, "gauss")?,
        None => 1.0,
    };
    let rng = interp.rng();
    let u1: f64 = 1.0 - rng.r#gen::<f64>();
    let u2: f64 = rng.r#gen();
    let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
    Ok(Value::Float(mu + sigma * z))
}

fn seed(interp: &mut Interpreter, args: CallArgs) -> Result<Value, Fault> {
    args.expect("seed", 0, 1, &[])?;
    let rng = match args.get(0) {
        None | Some(Value::None) => StdRng::from_entropy(),
        Some(Value::Int(n)) => StdRng::seed_from_u64(*n as u64),
        Some(Value::Str(s)) => {
            // FNV-1a, stable across runs
            let hash = s.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
                (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
            });
            StdRng::seed_from_u64(hash)
        }
        Some(other) => {
            return Err(Fault::type_error(format!(
                "seed() expected an int or str, not '{}'",
                other.type_name()
            )));
        }
    };
    *interp.rng() = rng;
    Ok(Value::None)
}
