//! Attribute access and methods of the built-in types

use std::rc::Rc;

use crate::runtime::fault::{ExcKind, Fault};
use crate::runtime::ops::equals;
use crate::runtime::stmt::normalize_index;
use crate::runtime::value::{CallArgs, Method, Value};
use crate::runtime::{Interpreter, format};

const STR_METHODS: &[&str] = &[
    "capitalize", "center", "count", "endswith", "find", "format", "isalpha", "isdigit",
    "join", "ljust", "lower", "lstrip", "replace", "rjust", "rstrip", "split", "splitlines",
    "startswith", "strip", "title", "upper", "zfill",
];

const LIST_METHODS: &[&str] = &[
    "append", "clear", "copy", "count", "extend", "index", "insert", "pop", "remove",
    "reverse", "sort",
];

const DICT_METHODS: &[&str] = &[
    "clear", "copy", "get", "items", "keys", "pop", "setdefault", "update", "values",
];

const FLOAT_METHODS: &[&str] = &["is_integer"];

fn str_arg<'a>(args: &'a CallArgs, index: usize, method: &str) -> Result<&'a str, Fault> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s),
        Some(other) => Err(Fault::type_error(format!(
            "{method}() argument must be str, not {}",
            other.type_name()
        ))),
        None => Err(Fault::type_error(format!("{method}() missing required argument"))),
    }
}

fn int_arg(args: &CallArgs, index: usize, method: &str) -> Result<i64, Fault> {
    let value = args
        .get(index)
        .ok_or_else(|| Fault::type_error(format!("{method}() missing required argument")))?;
    value.as_i64().ok_or_else(|| {
        Fault::type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            value.type_name()
        ))
    })
}

/// Byte offset to character offset
fn char_index(s: &str, byte: usize) -> i64 {
    s[..byte].chars().count() as i64
}

impl Interpreter {
    pub(crate) fn get_attr(&self, object: &Value, attr: &str) -> Result<Value, Fault> {
        let methods = match object {
            Value::Module(module) => {
                return module.attrs.get(attr).cloned().ok_or_else(|| {
                    Fault::new(
                        ExcKind::AttributeError,
                        format!("module '{}' has no attribute '{attr}'", module.name),
                    )
                });
            }
            Value::Exception(exc) if attr == "args" => {
                return Ok(Value::tuple(vec![Value::str(&exc.message)]));
            }
            Value::Str(_) => STR_METHODS,
            Value::List(_) => LIST_METHODS,
            Value::Dict(_) => DICT_METHODS,
            Value::Float(_) => FLOAT_METHODS,
            _ => &[],
        };

        if methods.contains(&attr) {
            return Ok(Value::Method(Rc::new(Method {
                receiver: object.clone(),
                name: Rc::from(attr),
            })));
        }
        Err(Fault::attribute_error(object.type_name(), attr))
    }

    pub(crate) fn call_method(&mut self, receiver: &Value, name: &str, args: CallArgs) -> Result<Value, Fault> {
        match receiver {
            Value::Str(s) => self.str_method(s, name, args),
            Value::List(_) => self.list_method(receiver, name, args),
            Value::Dict(_) => self.dict_method(receiver, name, args),
            Value::Float(f) if name == "is_integer" => {
                args.expect(name, 0, 0, &[])?;
                Ok(Value::Bool(f.is_finite() && f.fract() == 0.0))
            }
            other => Err(Fault::attribute_error(other.type_name(), name)),
        }
    }

    fn str_method(&mut self, s: &str, name: &str, args: CallArgs) -> Result<Value, Fault> {
        let strip_chars = |args: &CallArgs| -> Result<Option<Vec<char>>, Fault> {
            args.expect(name, 0, 1, &[])?;
            match args.get(0) {
                None | Some(Value::None) => Ok(None),
                Some(_) => Ok(Some(str_arg(args, 0, name)?.chars().collect())),
            }
        };

        let value = match name {
            "upper" => {
                args.expect(name, 0, 0, &[])?;
                Value::str(s.to_uppercase())
            }
            "lower" => {
                args.expect(name, 0, 0, &[])?;
                Value::str(s.to_lowercase())
            }
            "strip" => Value::str(match strip_chars(&args)? {
                Some(chars) => s.trim_matches(chars.as_slice()),
                None => s.trim(),
            }),
            "lstrip" => Value::str(match strip_chars(&args)? {
                Some(chars) => s.trim_start_matches(chars.as_slice()),
                None => s.trim_start(),
            }),
            "rstrip" => Value::str(match strip_chars(&args)? {
                Some(chars) => s.trim_end_matches(chars.as_slice()),
                None => s.trim_end(),
            }),
            "split" => {
                args.expect(name, 0, 2, &["sep", "maxsplit"])?;
                let maxsplit = match args.arg(1, "maxsplit") {
                    Some(v) => v.as_i64().unwrap_or(-1),
                    None => -1,
                };
                let limit = usize::try_from(maxsplit).ok();
                let parts: Vec<Value> = match args.arg(0, "sep") {
                    None | Some(Value::None) => split_whitespace(s, limit),
                    Some(Value::Str(sep)) if sep.is_empty() => {
                        return Err(Fault::value_error("empty separator"));
                    }
                    Some(Value::Str(sep)) => match limit {
                        Some(n) => s.splitn(n + 1, sep.as_ref()).map(Value::str).collect(),
                        None => s.split(sep.as_ref()).map(Value::str).collect(),
                    },
                    Some(other) => {
                        return Err(Fault::type_error(format!(
                            "must be str or None, not {}",
                            other.type_name()
                        )));
                    }
                };
                self.ensure_len(parts.len())?;
                Value::list(parts)
            }
            "splitlines" => {
                args.expect(name, 0, 0, &[])?;
                Value::list(s.lines().map(Value::str).collect())
            }
            "join" => {
                args.expect(name, 1, 1, &[])?;
                let items = self.collect(&args.positional[0])?;
                let mut pieces = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    match item {
                        Value::Str(piece) => pieces.push(piece.to_string()),
                        other => {
                            return Err(Fault::type_error(format!(
                                "sequence item {i}: expected str instance, {} found",
                                other.type_name()
                            )));
                        }
                    }
                }
                let joined = pieces.join(s);
                self.ensure_size(joined.len() as u64)?;
                Value::str(joined)
            }
            "replace" => {
                args.expect(name, 2, 3, &[])?;
                let old = str_arg(&args, 0, name)?;
                let new = str_arg(&args, 1, name)?;
                let estimate = s.len() as u64
                    + (s.matches(old).count() as u64 + 1).saturating_mul(new.len() as u64);
                self.ensure_size(estimate)?;
                match args.get(2).and_then(Value::as_i64) {
                    Some(count) if count >= 0 => Value::str(s.replacen(old, new, count as usize)),
                    _ => Value::str(s.replace(old, new)),
                }
            }
            "startswith" | "endswith" => {
                args.expect(name, 1, 1, &[])?;
                let candidates: Vec<Value> = match &args.positional[0] {
                    Value::Tuple(items) => items.as_ref().clone(),
                    other => vec![other.clone()],
                };
                let mut found = false;
                for candidate in &candidates {
                    let Value::Str(affix) = candidate else {
                        return Err(Fault::type_error(format!(
                            "{name} first arg must be str or a tuple of str, not {}",
                            candidate.type_name()
                        )));
                    };
                    found |= if name == "startswith" {
                        s.starts_with(affix.as_ref())
                    } else {
                        s.ends_with(affix.as_ref())
                    };
                }
                Value::Bool(found)
            }
            "find" => {
                args.expect(name, 1, 1, &[])?;
                let needle = str_arg(&args, 0, name)?;
                Value::Int(s.find(needle).map_or(-1, |byte| char_index(s, byte)))
            }
            "count" => {
                args.expect(name, 1, 1, &[])?;
                let needle = str_arg(&args, 0, name)?;
                let count = if needle.is_empty() {
                    s.chars().count() + 1
                } else {
                    s.matches(needle).count()
                };
                Value::Int(count as i64)
            }
            "title" => {
                args.expect(name, 0, 0, &[])?;
                let mut out = String::with_capacity(s.len());
                let mut previous_cased = false;
                for c in s.chars() {
                    if previous_cased {
                        out.extend(c.to_lowercase());
                    } else {
                        out.extend(c.to_uppercase());
                    }
                    previous_cased = c.is_alphabetic();
                }
                Value::str(out)
            }
            "capitalize" => {
                args.expect(name, 0, 0, &[])?;
                let mut chars = s.chars();
                let out: String = match chars.next() {
                    Some(first) => first
                        .to_uppercase()
                        .chain(chars.flat_map(char::to_lowercase))
                        .collect(),
                    None => String::new(),
                };
                Value::str(out)
            }
            "isdigit" => {
                args.expect(name, 0, 0, &[])?;
                Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
            }
            "isalpha" => {
                args.expect(name, 0, 0, &[])?;
                Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic))
            }
            "ljust" | "rjust" | "center" => {
                args.expect(name, 1, 2, &[])?;
                let width = int_arg(&args, 0, name)?.max(0) as usize;
                self.ensure_size(width as u64)?;
                let fill = match args.get(1) {
                    Some(_) => {
                        let fill = str_arg(&args, 1, name)?;
                        let mut chars = fill.chars();
                        match (chars.next(), chars.next()) {
                            (Some(c), None) => c,
                            _ => {
                                return Err(Fault::type_error(
                                    "The fill character must be exactly one character long",
                                ));
                            }
                        }
                    }
                    None => ' ',
                };
                let len = s.chars().count();
                let missing = width.saturating_sub(len);
                let filler = |n: usize| fill.to_string().repeat(n);
                Value::str(match name {
                    "ljust" => format!("{s}{}", filler(missing)),
                    "rjust" => format!("{}{s}", filler(missing)),
                    _ => {
                        let left = missing / 2 + (missing & width & 1);
                        format!("{}{s}{}", filler(left), filler(missing - left))
                    }
                })
            }
            "zfill" => {
                args.expect(name, 1, 1, &[])?;
                let width = int_arg(&args, 0, name)?.max(0) as usize;
                self.ensure_size(width as u64)?;
                let len = s.chars().count();
                if len >= width {
                    Value::str(s)
                } else {
                    let zeros = "0".repeat(width - len);
                    match s.strip_prefix(['-', '+']) {
                        Some(rest) => Value::str(format!("{}{zeros}{rest}", &s[..1])),
                        None => Value::str(format!("{zeros}{s}")),
                    }
                }
            }
            "format" => {
                let formatted = format::str_format(s, &args)?;
                self.ensure_size(formatted.len() as u64)?;
                Value::str(formatted)
            }
            _ => return Err(Fault::attribute_error("str", name)),
        };
        Ok(value)
    }

    fn list_method(&mut self, receiver: &Value, name: &str, args: CallArgs) -> Result<Value, Fault> {
        let Value::List(list) = receiver else {
            return Err(Fault::attribute_error(receiver.type_name(), name));
        };

        match name {
            "append" => {
                args.expect(name, 1, 1, &[])?;
                let len = list.borrow().len();
                self.grow(len, 1)?;
                list.borrow_mut().push(args.positional[0].clone());
                Ok(Value::None)
            }
            "extend" => {
                args.expect(name, 1, 1, &[])?;
                let extra = self.collect(&args.positional[0])?;
                let len = list.borrow().len();
                self.grow(len, extra.len())?;
                list.borrow_mut().extend(extra);
                Ok(Value::None)
            }
            "insert" => {
                args.expect(name, 2, 2, &[])?;
                let len = list.borrow().len() as i64;
                let index = int_arg(&args, 0, name)?;
                let index = if index < 0 { (index + len).max(0) } else { index.min(len) };
                self.grow(len as usize, 1)?;
                list.borrow_mut()
                    .insert(index as usize, args.positional[1].clone());
                Ok(Value::None)
            }
            "pop" => {
                args.expect(name, 0, 1, &[])?;
                let mut items = list.borrow_mut();
                if items.is_empty() {
                    return Err(Fault::index_error("pop from empty list"));
                }
                let index = match args.get(0) {
                    Some(index) => normalize_index(index, items.len(), "pop")?,
                    None => items.len() - 1,
                };
                Ok(items.remove(index))
            }
            "remove" => {
                args.expect(name, 1, 1, &[])?;
                let position = self.position(list, &args.positional[0])?;
                match position {
                    Some(i) => {
                        list.borrow_mut().remove(i);
                        Ok(Value::None)
                    }
                    None => Err(Fault::value_error("list.remove(x): x not in list")),
                }
            }
            "index" => {
                args.expect(name, 1, 1, &[])?;
                match self.position(list, &args.positional[0])? {
                    Some(i) => Ok(Value::Int(i as i64)),
                    None => Err(Fault::value_error(format!(
                        "{} is not in list",
                        args.positional[0].repr()
                    ))),
                }
            }
            "count" => {
                args.expect(name, 1, 1, &[])?;
                let items = list.borrow().clone();
                let mut count = 0;
                for item in &items {
                    if equals(item, &args.positional[0])? {
                        count += 1;
                    }
                }
                Ok(Value::Int(count))
            }
            "sort" => {
                args.expect(name, 0, 0, &["key", "reverse"])?;
                let reverse = args.keyword("reverse").is_some_and(Value::truthy);
                // Sorted on a copy so key calls still see the list
                let mut items = list.borrow().clone();
                let result = self.sort_values(&mut items, args.keyword("key"), reverse);
                *list.borrow_mut() = items;
                result.map(|()| Value::None)
            }
            "reverse" => {
                args.expect(name, 0, 0, &[])?;
                list.borrow_mut().reverse();
                Ok(Value::None)
            }
            "copy" => {
                args.expect(name, 0, 0, &[])?;
                Ok(Value::list(list.borrow().clone()))
            }
            "clear" => {
                args.expect(name, 0, 0, &[])?;
                list.borrow_mut().clear();
                Ok(Value::None)
            }
            _ => Err(Fault::attribute_error("list", name)),
        }
    }

    fn position(&self, list: &std::cell::RefCell<Vec<Value>>, needle: &Value) -> Result<Option<usize>, Fault> {
        let items = list.borrow().clone();
        for (i, item) in items.iter().enumerate() {
            if equals(item, needle)? {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    fn dict_method(&mut self, receiver: &Value, name: &str, args: CallArgs) -> Result<Value, Fault> {
        let Value::Dict(dict) = receiver else {
            return Err(Fault::attribute_error(receiver.type_name(), name));
        };

        match name {
            "get" => {
                args.expect(name, 1, 2, &[])?;
                let found = dict.borrow().get(&args.positional[0])?;
                Ok(found.unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
            }
            "keys" => {
                args.expect(name, 0, 0, &[])?;
                Ok(Value::list(dict.borrow().keys()))
            }
            "values" => {
                args.expect(name, 0, 0, &[])?;
                Ok(Value::list(dict.borrow().values()))
            }
            "items" => {
                args.expect(name, 0, 0, &[])?;
                let items = dict
                    .borrow()
                    .entries()
                    .iter()
                    .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
                    .collect();
                Ok(Value::list(items))
            }
            "update" => {
                args.expect(name, 0, 1, &[])?;
                let mut entries: Vec<(Value, Value)> = match args.get(0) {
                    None => Vec::new(),
                    Some(Value::Dict(other)) => other.borrow().entries().to_vec(),
                    Some(other) => {
                        let mut pairs = Vec::new();
                        for item in self.collect(other)? {
                            match self.collect(&item)?.as_slice() {
                                [key, value] => pairs.push((key.clone(), value.clone())),
                                _ => {
                                    return Err(Fault::value_error(
                                        "dictionary update sequence element has wrong length",
                                    ));
                                }
                            }
                        }
                        pairs
                    }
                };
                entries.extend(
                    args.keywords
                        .iter()
                        .map(|(k, v)| (Value::str(k), v.clone())),
                );
                let before = dict.borrow().len();
                for (key, value) in entries {
                    dict.borrow_mut().insert(key, value)?;
                }
                self.grow_entries(before, dict.borrow().len())?;
                Ok(Value::None)
            }
            "pop" => {
                args.expect(name, 1, 2, &[])?;
                let removed = dict.borrow_mut().remove(&args.positional[0])?;
                match (removed, args.get(1)) {
                    (Some(value), _) => Ok(value),
                    (None, Some(default)) => Ok(default.clone()),
                    (None, None) => Err(Fault::key_error(args.positional[0].repr())),
                }
            }
            "setdefault" => {
                args.expect(name, 1, 2, &[])?;
                let key = &args.positional[0];
                if let Some(existing) = dict.borrow().get(key)? {
                    return Ok(existing);
                }
                let default = args.get(1).cloned().unwrap_or(Value::None);
                let before = dict.borrow().len();
                dict.borrow_mut().insert(key.clone(), default.clone())?;
                self.grow_entries(before, before + 1)?;
                Ok(default)
            }
            "copy" => {
                args.expect(name, 0, 0, &[])?;
                Ok(Value::dict(dict.borrow().clone()))
            }
            "clear" => {
                args.expect(name, 0, 0, &[])?;
                dict.borrow_mut().clear();
                Ok(Value::None)
            }
            _ => Err(Fault::attribute_error("dict", name)),
        }
    }
}

fn split_whitespace(s: &str, limit: Option<usize>) -> Vec<Value> {
    let Some(limit) = limit else {
        return s.split_whitespace().map(Value::str).collect();
    };
    let mut parts = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if parts.len() == limit {
            parts.push(Value::str(rest));
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                parts.push(Value::str(&rest[..end]));
                rest = rest[end..].trim_start();
            }
            None => {
                parts.push(Value::str(rest));
                break;
            }
        }
    }
    parts
}

#[cfg(test)]
mod tests {
    use crate::runtime::testing::{fault, stdout};

    #[test]
    fn string_methods() {
        assert_eq!(stdout("print('  Hi There '.strip().lower().split())"), "['hi', 'there']\n");
        assert_eq!(stdout("print('a,b,,c'.split(','), 'a b c'.split(None, 1))"), "['a', 'b', '', 'c'] ['a', 'b c']\n");
        assert_eq!(stdout("print('-'.join(['x', 'y']), 'abcabc'.replace('b', 'B', 1))"), "x-y aBcabc\n");
        assert_eq!(stdout("print('hello world'.title(), 'hELLO'.capitalize(), 'x'.center(5, '*'))"), "Hello World Hello **x**\n");
        assert_eq!(stdout("print('42'.zfill(5), '-7'.zfill(4), 'report.png'.endswith(('.svg', '.png')))"), "00042 -007 True\n");
        assert_eq!(stdout("print('banana'.find('n'), 'banana'.count('a'), 'abc'.find('z'))"), "2 3 -1\n");
        assert_eq!(stdout("print('{} + {x} = {2}'.format(1, 2, 3, x=2))"), "1 + 2 = 3\n");
    }

    #[test]
    fn join_rejects_non_strings() {
        let msg = fault("','.join([1, 2])");
        assert_eq!(msg, "TypeError: sequence item 0: expected str instance, int found");
    }

    #[test]
    fn list_methods() {
        let source = "xs = [3, 1, 2]\nxs.append(5)\nxs.insert(0, 9)\nxs.remove(1)\n\
                      print(xs, xs.pop(), xs.index(2), xs.count(3))\n\
                      xs.sort()\nprint(xs)\nxs.sort(key=lambda v: -v)\nprint(xs)\n\
                      xs.sort(reverse=True)\nxs.extend(range(2))\nprint(xs)";
        assert_eq!(stdout(source), "[9, 3, 2] 5 2 1\n[2, 3, 9]\n[9, 3, 2]\n[9, 3, 2, 0, 1]\n");
    }

    #[test]
    fn list_method_errors() {
        assert_eq!(fault("[].pop()"), "IndexError: pop from empty list");
        assert_eq!(fault("[1].remove(2)"), "ValueError: list.remove(x): x not in list");
        assert!(fault("[1, 'a'].sort()").starts_with("TypeError"));
    }

    #[test]
    fn dict_methods() {
        let source = "d = {'a': 1}\nd.update({'b': 2}, c=3)\nd.setdefault('a', 100)\n\
                      print(d.get('z'), d.get('z', 0), d.pop('b'), sorted(d.keys()), d.items())";
        assert_eq!(stdout(source), "None 0 2 ['a', 'c'] [('a', 1), ('c', 3)]\n");
        assert_eq!(fault("{}.pop('k')"), "KeyError: 'k'");
    }

    #[test]
    fn unknown_attributes() {
        assert_eq!(fault("'x'.nope()"), "AttributeError: 'str' object has no attribute 'nope'");
        assert_eq!(fault("import math\nmath.nope"), "AttributeError: module 'math' has no attribute 'nope'");
        assert!(fault("(1).real").starts_with("AttributeError"));
    }

    #[test]
    fn exception_args() {
        assert_eq!(stdout("try:\n    raise ValueError('bad')\nexcept ValueError as e:\n    print(e.args)"), "('bad',)\n");
    }
}
