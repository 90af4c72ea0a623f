//! Statement execution

use std::rc::Rc;
use std::sync::Arc;

use crate::runtime::fault::{ExcKind, Exception, Fault};
use crate::runtime::value::{Function, Value};
use crate::runtime::Interpreter;
use crate::script::ast::*;

/// How a block finished
pub(crate) enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

impl Interpreter {
    pub(crate) fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Flow, Fault> {
        for stmt in stmts {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow, Fault> {
        self.tick()?;

        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
            }
            StmtKind::AugAssign { target, op, value } => {
                let current = self.eval(target)?;
                let rhs = self.eval(value)?;
                let result = self.augmented_op(*op, current, rhs)?;
                self.charge_fresh(&result)?;
                self.assign(target, result)?;
            }
            StmtKind::If { branches, orelse } => {
                for (test, body) in branches {
                    if self.eval(test)?.truthy() {
                        return self.exec_block(body);
                    }
                }
                return self.exec_block(orelse);
            }
            StmtKind::While { test, body } => {
                while self.eval(test)?.truthy() {
                    self.tick()?;
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
            }
            StmtKind::For { target, iter, body } => {
                let iterable = self.eval(iter)?;
                for item in self.iterate(&iterable)? {
                    self.tick()?;
                    self.assign(target, item)?;
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
            StmtKind::FunctionDef(def) => {
                let function = self.make_function(def)?;
                self.assign_name(&def.name, function);
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Import(names) => {
                for alias in names {
                    let module = self.import_module(&alias.name)?;
                    let bound = match &alias.alias {
                        Some(_) => Value::Module(module),
                        // `import a.b` binds `a`
                        None => {
                            let root = alias.bound_name();
                            Value::Module(self.module(root)?)
                        }
                    };
                    self.assign_name(alias.bound_name(), bound);
                }
            }
            StmtKind::ImportFrom { module, names } => {
                for alias in names {
                    let value = self.import_from(module, &alias.name)?;
                    self.assign_name(alias.bound_name(), value);
                }
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
            } => return self.exec_try(body, handlers, orelse),
            StmtKind::Raise(value) => return Err(self.raise(value.as_ref())?),
        }

        Ok(Flow::Normal)
    }

    fn exec_try(
        &mut self,
        body: &[Stmt],
        handlers: &[ExceptHandler],
        orelse: &[Stmt],
    ) -> Result<Flow, Fault> {
        let exception = match self.exec_block(body) {
            Ok(Flow::Normal) => return self.exec_block(orelse),
            Ok(flow) => return Ok(flow),
            Err(Fault::Raised(exception)) => exception,
            Err(fault) => return Err(fault),
        };

        for handler in handlers {
            if !self.handler_matches(handler, &exception)? {
                continue;
            }
            if let Some(binding) = &handler.binding {
                self.assign_name(binding, Value::Exception(Rc::new(exception.clone())));
            }
            self.handling.push(exception);
            let result = self.exec_block(&handler.body);
            self.handling.pop();
            return result;
        }

        Err(Fault::Raised(exception))
    }

    fn handler_matches(&self, handler: &ExceptHandler, exception: &Exception) -> Result<bool, Fault> {
        let Some(name) = &handler.kind else {
            return Ok(true);
        };
        match self.lookup(name)? {
            Value::ExceptionType(kind) => Ok(kind.catches(exception.kind)),
            other => Err(Fault::type_error(format!(
                "catching '{}' is not allowed; only exception classes can be caught",
                other.type_name()
            ))),
        }
    }

    /// Build the fault for a `raise` statement
    fn raise(&mut self, value: Option<&Expr>) -> Result<Fault, Fault> {
        let Some(expr) = value else {
            return Ok(match self.handling.last() {
                Some(exception) => Fault::Raised(exception.clone()),
                None => Fault::new(ExcKind::RuntimeError, "No active exception to reraise"),
            });
        };

        Ok(match self.eval(expr)? {
            Value::ExceptionType(kind) => Fault::new(kind, ""),
            Value::Exception(exception) => Fault::Raised((*exception).clone()),
            other => Fault::type_error(format!(
                "exceptions must derive from BaseException, not '{}'",
                other.type_name()
            )),
        })
    }

    pub(crate) fn make_function(&mut self, def: &Arc<FunctionDef>) -> Result<Value, Fault> {
        let defaults = def
            .params
            .iter()
            .map(|param| param.default.as_ref().map(|d| self.eval(d)).transpose())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Value::Function(Rc::new(Function {
            def: def.clone(),
            defaults,
            closure: self.scope.clone(),
        })))
    }

    /// Bind `value` to an assignment target
    pub(crate) fn assign(&mut self, target: &Expr, value: Value) -> Result<(), Fault> {
        match &target.kind {
            ExprKind::Name(name) => {
                self.assign_name(name, value);
                Ok(())
            }
            ExprKind::Subscript {
                value: container,
                index,
            } => {
                let container = self.eval(container)?;
                let index = self.eval(index)?;
                self.set_item(&container, index, value)
            }
            ExprKind::Attribute {
                value: object,
                attr,
            } => {
                let object = self.eval(object)?;
                Err(Fault::new(
                    ExcKind::AttributeError,
                    format!(
                        "'{}' object attribute '{attr}' is read-only",
                        object.type_name()
                    ),
                ))
            }
            ExprKind::Tuple(targets) | ExprKind::List(targets) => {
                let values = self.collect(&value)?;
                if values.len() < targets.len() {
                    return Err(Fault::value_error(format!(
                        "not enough values to unpack (expected {}, got {})",
                        targets.len(),
                        values.len()
                    )));
                }
                if values.len() > targets.len() {
                    return Err(Fault::value_error(format!(
                        "too many values to unpack (expected {})",
                        targets.len()
                    )));
                }
                for (target, value) in targets.iter().zip(values) {
                    self.assign(target, value)?;
                }
                Ok(())
            }
            _ => Err(Fault::type_error("cannot assign to expression")),
        }
    }

    fn set_item(&mut self, container: &Value, index: Value, value: Value) -> Result<(), Fault> {
        match container {
            Value::List(items) => {
                let mut items = items.borrow_mut();
                let i = normalize_index(&index, items.len(), "list assignment")?;
                items[i] = value;
                Ok(())
            }
            Value::Dict(dict) => {
                let before = dict.borrow().len();
                dict.borrow_mut().insert(index, value)?;
                self.grow_entries(before, dict.borrow().len())
            }
            other => Err(Fault::type_error(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ))),
        }
    }
}

/// Resolve a possibly negative index against `len`
pub(crate) fn normalize_index(index: &Value, len: usize, what: &str) -> Result<usize, Fault> {
    let Some(i) = index.as_i64() else {
        return Err(Fault::type_error(format!(
            "{what} indices must be integers, not {}",
            index.type_name()
        )));
    };
    let resolved = if i < 0 { i + len as i64 } else { i };
    if resolved < 0 || resolved >= len as i64 {
        return Err(Fault::index_error(format!("{what} index out of range")));
    }
    Ok(resolved as usize)
}

#[cfg(test)]
mod tests {
    use crate::runtime::testing::{fault, stdout};

    #[test]
    fn loops_and_control_flow() {
        let source = "total = 0\n\
                      for i in range(10):\n    \
                          if i == 7:\n        break\n    \
                          if i % 2:\n        continue\n    \
                          total += i\n\
                      print(total)\n";
        assert_eq!(stdout(source), "12\n");

        let source = "n = 0\nwhile n < 5:\n    n += 1\nprint(n)\n";
        assert_eq!(stdout(source), "5\n");
    }

    #[test]
    fn functions_defaults_and_closures() {
        let source = "def make_adder(n):\n    \
                          def add(x, step=1):\n        return x + n * step\n    \
                          return add\n\
                      add5 = make_adder(5)\n\
                      print(add5(1), add5(1, step=2))\n";
        assert_eq!(stdout(source), "6 11\n");
    }

    #[test]
    fn recursion() {
        let source = "def fib(n):\n    return n if n < 2 else fib(n - 1) + fib(n - 2)\nprint(fib(15))\n";
        assert_eq!(stdout(source), "610\n");
    }

    #[test]
    fn unbounded_recursion_is_a_recursion_error() {
        let msg = fault("def f(n):\n    return f(n + 1)\nf(0)\n");
        assert!(msg.starts_with("RecursionError"), "{msg}");
    }

    #[test]
    fn tuple_unpacking() {
        assert_eq!(stdout("a, b = 1, 2\na, b = b, a\nprint(a, b)\n"), "2 1\n");
        assert!(fault("a, b = [1, 2, 3]").starts_with("ValueError: too many values"));
        assert!(fault("a, b, c = (1, 2)").starts_with("ValueError: not enough values"));
    }

    #[test]
    fn subscript_assignment() {
        let source = "xs = [1, 2, 3]\nxs[-1] = 9\nd = {}\nd['k'] = xs\nd['k'][0] += 10\nprint(d)\n";
        assert_eq!(stdout(source), "{'k': [11, 2, 9]}\n");
        assert!(fault("t = (1, 2)\nt[0] = 5").starts_with("TypeError"));
    }

    #[test]
    fn try_except_else() {
        let source = "try:\n    x = 1 / 0\nexcept ZeroDivisionError as e:\n    print('caught', e)\nelse:\n    print('no error')\n";
        assert_eq!(stdout(source), "caught division by zero\n");

        let source = "try:\n    x = 1\nexcept Exception:\n    pass\nelse:\n    print('else ran')\n";
        assert_eq!(stdout(source), "else ran\n");
    }

    #[test]
    fn unmatched_handler_propagates() {
        let msg = fault("try:\n    [][1]\nexcept KeyError:\n    pass\n");
        assert!(msg.starts_with("IndexError"), "{msg}");
    }

    #[test]
    fn raise_and_reraise() {
        assert_eq!(fault("raise ValueError('bad input')"), "ValueError: bad input");
        let msg = fault("try:\n    raise KeyError('k')\nexcept KeyError:\n    raise\n");
        assert_eq!(msg, "KeyError: k");
        assert!(fault("raise 5").starts_with("TypeError"));
    }

    #[test]
    fn attribute_assignment_is_refused() {
        let msg = fault("import math\nmath.pi = 3\n");
        assert!(msg.starts_with("AttributeError"), "{msg}");
    }

    #[test]
    fn return_outside_function_ends_run() {
        assert_eq!(stdout("print(1)\nreturn\nprint(2)\n"), "1\n");
    }
}
