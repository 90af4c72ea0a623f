//! String formatting: format specs, `%` interpolation and `str.format`

use crate::runtime::fault::Fault;
use crate::runtime::value::{CallArgs, Value, format_float};

/// Parsed `[[fill]align][sign][0][width][,][.precision][type]`
#[derive(Debug, Default, PartialEq)]
struct Spec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    zero: bool,
    width: usize,
    grouping: bool,
    precision: Option<usize>,
    kind: Option<char>,
}

fn parse_spec(spec: &str) -> Result<Spec, Fault> {
    let invalid = || Fault::value_error(format!("Invalid format specifier '{spec}'"));
    let chars: Vec<char> = spec.chars().collect();
    let mut out = Spec::default();
    let mut i = 0;

    let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');
    if chars.len() >= 2 && is_align(chars[1]) {
        out.fill = Some(chars[0]);
        out.align = Some(chars[1]);
        i = 2;
    } else if chars.first().is_some_and(|&c| is_align(c)) {
        out.align = Some(chars[0]);
        i = 1;
    }

    if let Some(&c) = chars.get(i)
        && matches!(c, '+' | '-' | ' ')
    {
        out.sign = Some(c);
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        out.zero = true;
        i += 1;
    }

    let start = i;
    while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        i += 1;
    }
    if i > start {
        out.width = chars[start..i]
            .iter()
            .collect::<String>()
            .parse()
            .map_err(|_| invalid())?;
    }

    if chars.get(i) == Some(&',') {
        out.grouping = true;
        i += 1;
    }

    if chars.get(i) == Some(&'.') {
        i += 1;
        let start = i;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
        if i == start {
            return Err(invalid());
        }
        out.precision = Some(
            chars[start..i]
                .iter()
                .collect::<String>()
                .parse()
                .map_err(|_| invalid())?,
        );
    }

    if let Some(&c) = chars.get(i) {
        if !"sdfFeEgGxXob%".contains(c) {
            return Err(invalid());
        }
        out.kind = Some(c);
        i += 1;
    }
    if i != chars.len() {
        return Err(invalid());
    }
    if out.width > 10_000 || out.precision.is_some_and(|p| p > 1_000) {
        return Err(Fault::value_error("Too many decimal digits in format string"));
    }
    Ok(out)
}

/// `format(value, spec)`
pub fn format_value(value: &Value, spec: &str) -> Result<String, Fault> {
    let spec = parse_spec(spec)?;
    let type_mismatch = || {
        Fault::value_error(format!(
            "Unknown format code '{}' for object of type '{}'",
            spec.kind.unwrap_or('s'),
            value.type_name()
        ))
    };

    let (sign, body, numeric) = match (spec.kind, value) {
        (None | Some('s'), Value::Str(s)) => {
            let text: String = match spec.precision {
                Some(p) => s.chars().take(p).collect(),
                None => s.to_string(),
            };
            (String::new(), text, false)
        }
        (Some('s'), _) => return Err(type_mismatch()),
        (None, Value::Bool(_)) if spec.width == 0 => (String::new(), value.to_str(), false),
        (None | Some('d'), Value::Int(_) | Value::Bool(_)) => {
            let i = value.as_i64().unwrap_or_default();
            let digits = i.unsigned_abs().to_string();
            let digits = if spec.grouping { group(&digits) } else { digits };
            (sign_of(i < 0, spec.sign), digits, true)
        }
        (Some('x' | 'X' | 'o' | 'b'), Value::Int(_) | Value::Bool(_)) => {
            let i = value.as_i64().unwrap_or_default();
            let magnitude = i.unsigned_abs();
            let digits = match spec.kind {
                Some('x') => format!("{magnitude:x}"),
                Some('X') => format!("{magnitude:X}"),
                Some('o') => format!("{magnitude:o}"),
                _ => format!("{magnitude:b}"),
            };
            (sign_of(i < 0, spec.sign), digits, true)
        }
        (Some('d' | 'x' | 'X' | 'o' | 'b'), _) => return Err(type_mismatch()),
        (_, Value::Int(_) | Value::Bool(_) | Value::Float(_)) => {
            let f = value.as_f64().unwrap_or_default();
            let body = float_body(f.abs(), &spec);
            (sign_of(f.is_sign_negative() && !f.is_nan(), spec.sign), body, true)
        }
        (None, _) => (String::new(), value.to_str(), false),
        _ => return Err(type_mismatch()),
    };

    Ok(pad(&sign, &body, &spec, numeric))
}

fn sign_of(negative: bool, sign: Option<char>) -> String {
    match (negative, sign) {
        (true, _) => "-".to_string(),
        (false, Some('+')) => "+".to_string(),
        (false, Some(' ')) => " ".to_string(),
        _ => String::new(),
    }
}

/// Digits of a non-negative float for a format type and precision
fn float_body(f: f64, spec: &Spec) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return "inf".to_string();
    }

    let body = match spec.kind {
        Some('f' | 'F') => format!("{:.*}", spec.precision.unwrap_or(6), f),
        Some('%') => format!("{:.*}%", spec.precision.unwrap_or(6), f * 100.0),
        Some('e' | 'E') => exponent(f, spec.precision.unwrap_or(6)),
        Some('g' | 'G') => general(f, spec.precision.unwrap_or(6)),
        _ => match spec.precision {
            Some(p) => general(f, p),
            None => format_float(f),
        },
    };
    let body = if spec.grouping { group_float(&body) } else { body };
    if matches!(spec.kind, Some('E' | 'G' | 'F')) {
        body.to_uppercase()
    } else {
        body
    }
}

/// `1.500000e+03` style
fn exponent(f: f64, precision: usize) -> String {
    let formatted = format!("{:.*e}", precision, f);
    let (mantissa, exp) = formatted.split_once('e').unwrap_or((&formatted, "0"));
    let (sign, digits) = match exp.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exp),
    };
    format!("{mantissa}e{sign}{digits:0>2}")
}

/// `g` formatting: significant digits, trailing zeros stripped
fn general(f: f64, precision: usize) -> String {
    let precision = precision.max(1);
    if f == 0.0 {
        return "0".to_string();
    }
    let exp = f.log10().floor() as i32;
    if exp < -4 || exp >= precision as i32 {
        let formatted = exponent(f, precision - 1);
        let (mantissa, rest) = formatted.split_once('e').unwrap_or((&formatted, ""));
        return format!("{}e{rest}", strip_zeros(mantissa));
    }
    let decimals = (precision as i32 - 1 - exp).max(0) as usize;
    strip_zeros(&format!("{f:.decimals$}"))
}

fn strip_zeros(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

/// Insert thousands separators into a run of digits
fn group(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn group_float(body: &str) -> String {
    let end = body
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(body.len());
    format!("{}{}", group(&body[..end]), &body[end..])
}

fn pad(sign: &str, body: &str, spec: &Spec, numeric: bool) -> String {
    let len = sign.chars().count() + body.chars().count();
    if len >= spec.width {
        return format!("{sign}{body}");
    }
    let missing = spec.width - len;

    if spec.zero && spec.align.is_none() && numeric {
        return format!("{sign}{}{body}", "0".repeat(missing));
    }

    let fill = spec.fill.unwrap_or(' ');
    let filler = |n: usize| fill.to_string().repeat(n);
    let default_align = if numeric { '>' } else { '<' };
    match spec.align.unwrap_or(default_align) {
        '<' => format!("{sign}{body}{}", filler(missing)),
        '^' => format!(
            "{}{sign}{body}{}",
            filler(missing / 2),
            filler(missing - missing / 2)
        ),
        '=' => format!("{sign}{}{body}", filler(missing)),
        _ => format!("{}{sign}{body}", filler(missing)),
    }
}

/// `template % args`
pub fn percent_format(template: &str, args: &Value) -> Result<String, Fault> {
    let mut values: Vec<Value> = match args {
        Value::Tuple(items) => items.iter().cloned().collect(),
        other => vec![other.clone()],
    };
    values.reverse();

    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut spec = String::new();
        let kind = loop {
            match chars.next() {
                Some(c) if "-+ 0123456789.".contains(c) => spec.push(c),
                Some(c) => break c,
                None => return Err(Fault::value_error("incomplete format")),
            }
        };
        if kind == '%' && spec.is_empty() {
            out.push('%');
            continue;
        }

        let value = values
            .pop()
            .ok_or_else(|| Fault::type_error("not enough arguments for format string"))?;
        let flags_end = spec
            .find(|c: char| !matches!(c, '-' | '+' | ' ' | '0'))
            .unwrap_or(spec.len());
        let (flags, rest) = spec.split_at(flags_end);
        let mut converted = String::new();
        if flags.contains('-') {
            converted.push('<');
        } else if matches!(kind, 's' | 'r') {
            converted.push('>');
        }
        if flags.contains('+') {
            converted.push('+');
        } else if flags.contains(' ') {
            converted.push(' ');
        }
        if flags.contains('0') && !flags.contains('-') {
            converted.push('0');
        }
        converted.push_str(rest);

        let piece = match kind {
            's' => format_value(&Value::str(value.to_str()), &converted)?,
            'r' => format_value(&Value::str(value.repr()), &converted)?,
            'd' | 'i' | 'u' => {
                let int = match &value {
                    Value::Float(f) => Value::Int(f.trunc() as i64),
                    other if other.as_i64().is_some() => other.clone(),
                    other => {
                        return Err(Fault::type_error(format!(
                            "%d format: a real number is required, not {}",
                            other.type_name()
                        )));
                    }
                };
                format_value(&int, &format!("{converted}d"))?
            }
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' | 'x' | 'X' | 'o' => {
                format_value(&value, &format!("{converted}{kind}"))?
            }
            other => {
                return Err(Fault::value_error(format!(
                    "unsupported format character '{other}'"
                )));
            }
        };
        out.push_str(&piece);
    }

    if !values.is_empty() {
        return Err(Fault::type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}

/// `template.format(*args, **kwargs)`
pub fn str_format(template: &str, args: &CallArgs) -> Result<String, Fault> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut next_auto = 0;

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(Fault::value_error("Single '}' encountered in format string")),
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => {
                            return Err(Fault::value_error(
                                "Single '{' encountered in format string",
                            ));
                        }
                    }
                }

                let (field, spec) = match field.split_once(':') {
                    Some((field, spec)) => (field.to_string(), Some(spec.to_string())),
                    None => (field, None),
                };
                let (name, conversion) = match field.split_once('!') {
                    Some((name, conversion)) => (name.to_string(), Some(conversion.to_string())),
                    None => (field, None),
                };

                let value = if name.is_empty() {
                    let value = args.get(next_auto).cloned();
                    next_auto += 1;
                    value.ok_or_else(|| {
                        Fault::index_error("Replacement index out of range for positional args tuple")
                    })?
                } else if let Ok(index) = name.parse::<usize>() {
                    args.get(index).cloned().ok_or_else(|| {
                        Fault::index_error(format!(
                            "Replacement index {index} out of range for positional args tuple"
                        ))
                    })?
                } else {
                    args.keyword(&name)
                        .cloned()
                        .ok_or_else(|| Fault::key_error(format!("'{name}'")))?
                };

                let value = match conversion.as_deref() {
                    None => value,
                    Some("r") | Some("a") => Value::str(value.repr()),
                    Some("s") => Value::str(value.to_str()),
                    Some(other) => {
                        return Err(Fault::value_error(format!(
                            "Unknown conversion specifier {other}"
                        )));
                    }
                };

                match spec {
                    Some(spec) => out.push_str(&format_value(&value, &spec)?),
                    None => out.push_str(&value.to_str()),
                }
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(value: Value, spec: &str) -> String {
        format_value(&value, spec).unwrap()
    }

    #[test]
    fn parses_full_spec() {
        assert_eq!(
            parse_spec("*^+010,.3f").unwrap(),
            Spec {
                fill: Some('*'),
                align: Some('^'),
                sign: Some('+'),
                zero: true,
                width: 10,
                grouping: true,
                precision: Some(3),
                kind: Some('f'),
            }
        );
        assert!(parse_spec("q").is_err());
        assert!(parse_spec(".f").is_err());
    }

    #[test]
    fn float_specs() {
        assert_eq!(fmt(Value::Float(3.14159), ".2f"), "3.14");
        assert_eq!(fmt(Value::Float(-2.5), "+.1f"), "-2.5");
        assert_eq!(fmt(Value::Float(1234.5), ",.1f"), "1,234.5");
        assert_eq!(fmt(Value::Float(0.256), ".1%"), "25.6%");
        assert_eq!(fmt(Value::Float(1500.0), ".2e"), "1.50e+03");
        assert_eq!(fmt(Value::Float(0.0001234), "g"), "0.0001234");
        assert_eq!(fmt(Value::Float(123456789.0), ".3g"), "1.23e+08");
        assert_eq!(fmt(Value::Int(3), ".1f"), "3.0");
    }

    #[test]
    fn integer_specs() {
        assert_eq!(fmt(Value::Int(1234567), ","), "1,234,567");
        assert_eq!(fmt(Value::Int(42), "05d"), "00042");
        assert_eq!(fmt(Value::Int(-42), "06"), "-00042");
        assert_eq!(fmt(Value::Int(255), "x"), "ff");
        assert_eq!(fmt(Value::Int(5), "b"), "101");
        assert!(format_value(&Value::Float(1.5), "d").is_err());
    }

    #[test]
    fn alignment() {
        assert_eq!(fmt(Value::str("ab"), "5"), "ab   ");
        assert_eq!(fmt(Value::str("ab"), ">5"), "   ab");
        assert_eq!(fmt(Value::str("ab"), "*^6"), "**ab**");
        assert_eq!(fmt(Value::Int(7), "4"), "   7");
        assert_eq!(fmt(Value::str("abcdef"), ".3"), "abc");
    }

    #[test]
    fn percent_interpolation() {
        let args = Value::tuple(vec![Value::str("x"), Value::Int(3), Value::Float(0.5)]);
        assert_eq!(percent_format("%s=%d (%.2f) 100%%", &args).unwrap(), "x=3 (0.50) 100%");
        assert_eq!(percent_format("%5s|%-4d|", &Value::tuple(vec![Value::str("a"), Value::Int(1)])).unwrap(), "    a|1   |");
        assert!(percent_format("%s %s", &Value::str("one")).is_err());
        assert!(percent_format("%s", &Value::tuple(vec![Value::Int(1), Value::Int(2)])).is_err());
    }

    #[test]
    fn format_method() {
        let mut args = CallArgs::new(vec![Value::Int(1), Value::str("two")]);
        args.keywords.push(("name".to_string(), Value::Float(2.5)));
        assert_eq!(
            str_format("{} {} {name:.2f} {0!r} {1!r} {{}}", &args).unwrap(),
            "1 two 2.50 1 'two' {}"
        );
        assert!(str_format("{5}", &args).is_err());
        assert!(str_format("{missing}", &args).is_err());
        assert!(str_format("oops }", &args).is_err());
    }
}
