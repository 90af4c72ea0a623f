//! Syntax tree walk that stops at the first forbidden construct

use crate::script::ast::*;
use crate::types::SecurityLevel;
use crate::validator::policy;

/// Names that may not even be referenced, since holding one is only
/// useful for calling it later under another name
const DENIED_REFERENCES: &[&str] = &[
    "eval", "exec", "compile", "getattr", "setattr", "delattr", "globals", "locals", "vars",
];

pub struct Walker {
    level: SecurityLevel,
}

impl Walker {
    pub fn new(level: SecurityLevel) -> Self {
        Self { level }
    }

    /// Message describing the first violation, if any
    pub fn first_violation(&self, program: &Program) -> Option<String> {
        self.block(&program.body).err()
    }

    fn block(&self, stmts: &[Stmt]) -> Result<(), String> {
        stmts.iter().try_for_each(|stmt| self.stmt(stmt))
    }

    fn stmt(&self, stmt: &Stmt) -> Result<(), String> {
        match &stmt.kind {
            StmtKind::Expr(expr) => self.expr(expr),
            StmtKind::Assign { targets, value } => {
                targets.iter().try_for_each(|t| self.expr(t))?;
                self.expr(value)
            }
            StmtKind::AugAssign { target, value, .. } => {
                self.expr(target)?;
                self.expr(value)
            }
            StmtKind::If { branches, orelse } => {
                for (test, body) in branches {
                    self.expr(test)?;
                    self.block(body)?;
                }
                self.block(orelse)
            }
            StmtKind::While { test, body } => {
                self.expr(test)?;
                self.block(body)
            }
            StmtKind::For { target, iter, body } => {
                self.expr(target)?;
                self.expr(iter)?;
                self.block(body)
            }
            StmtKind::Break | StmtKind::Continue | StmtKind::Pass => Ok(()),
            StmtKind::FunctionDef(def) => self.function(def),
            StmtKind::Return(value) | StmtKind::Raise(value) => {
                value.iter().try_for_each(|v| self.expr(v))
            }
            StmtKind::Import(names) => names.iter().try_for_each(|alias| {
                if policy::module_allowed(&alias.name, self.level) {
                    Ok(())
                } else {
                    Err(self.import_violation(&alias.name))
                }
            }),
            StmtKind::ImportFrom { module, names } => names.iter().try_for_each(|alias| {
                if policy::from_import_allowed(module, &alias.name, self.level) {
                    Ok(())
                } else {
                    Err(self.import_violation(&format!("{module}.{}", alias.name)))
                }
            }),
            StmtKind::Try {
                body,
                handlers,
                orelse,
            } => {
                self.block(body)?;
                for handler in handlers {
                    if let Some(binding) = &handler.binding {
                        self.name(binding)?;
                    }
                    self.block(&handler.body)?;
                }
                self.block(orelse)
            }
        }
    }

    fn function(&self, def: &FunctionDef) -> Result<(), String> {
        self.name(&def.name)?;
        for param in &def.params {
            self.name(&param.name)?;
            if let Some(default) = &param.default {
                self.expr(default)?;
            }
        }
        self.block(&def.body)
    }

    fn expr(&self, expr: &Expr) -> Result<(), String> {
        match &expr.kind {
            ExprKind::Int(_)
            | ExprKind::Float(_)
            | ExprKind::Str(_)
            | ExprKind::Bool(_)
            | ExprKind::None => Ok(()),
            ExprKind::FString(parts) => parts.iter().try_for_each(|part| match part {
                FStringPart::Literal(_) => Ok(()),
                FStringPart::Field { expr, .. } => self.expr(expr),
            }),
            ExprKind::Name(name) => {
                self.name(name)?;
                if DENIED_REFERENCES.contains(&name.as_str()) {
                    return Err(format!("Reference to '{name}' is not allowed"));
                }
                Ok(())
            }
            ExprKind::List(items) | ExprKind::Tuple(items) => {
                items.iter().try_for_each(|item| self.expr(item))
            }
            ExprKind::Dict(entries) => entries.iter().try_for_each(|(k, v)| {
                self.expr(k)?;
                self.expr(v)
            }),
            ExprKind::Attribute { value, attr } => {
                self.attribute(expr, attr)?;
                self.expr(value)
            }
            ExprKind::Subscript { value, index } => {
                self.expr(value)?;
                self.expr(index)
            }
            ExprKind::Slice { lower, upper, step } => [lower, upper, step]
                .into_iter()
                .flatten()
                .try_for_each(|e| self.expr(e)),
            ExprKind::Call {
                func,
                args,
                keywords,
            } => {
                if let ExprKind::Name(name) = &func.kind
                    && policy::DENIED_CALLS.contains(&name.as_str())
                {
                    return Err(format!("Call to '{name}' is not allowed"));
                }
                self.expr(func)?;
                args.iter().try_for_each(|a| self.expr(a))?;
                keywords.iter().try_for_each(|k| self.expr(&k.value))
            }
            ExprKind::Unary { operand, .. } => self.expr(operand),
            ExprKind::Binary { left, right, .. } | ExprKind::BoolOp { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)
            }
            ExprKind::Compare { left, ops } => {
                self.expr(left)?;
                ops.iter().try_for_each(|(_, e)| self.expr(e))
            }
            ExprKind::IfExp { test, body, orelse } => {
                self.expr(test)?;
                self.expr(body)?;
                self.expr(orelse)
            }
            ExprKind::Lambda(def) => self.function(def),
            ExprKind::ListComp {
                element,
                target,
                iter,
                conditions,
            } => {
                self.expr(element)?;
                self.expr(target)?;
                self.expr(iter)?;
                conditions.iter().try_for_each(|c| self.expr(c))
            }
        }
    }

    fn attribute(&self, expr: &Expr, attr: &str) -> Result<(), String> {
        if policy::is_dunder(attr) {
            return Err(format!("Access to dunder attribute '{attr}' is not allowed"));
        }
        if policy::DENIED_ATTRIBUTES.contains(&attr) {
            return Err(format!("Access to attribute '{attr}' is not allowed"));
        }

        let Some(path) = expr.dotted_path() else {
            return Ok(());
        };
        let root = path.split('.').next().unwrap_or(&path);
        let denied_root = policy::is_denied_module(root) || policy::DENIED_CALLS.contains(&root);
        if denied_root && !policy::has_allowed_prefix(&path) {
            return Err(format!("Access to '{path}' is not allowed"));
        }
        Ok(())
    }

    fn name(&self, name: &str) -> Result<(), String> {
        if policy::is_dunder(name) {
            return Err(format!("Access to dunder name '{name}' is not allowed"));
        }
        Ok(())
    }

    fn import_violation(&self, module: &str) -> String {
        format!(
            "Import of module '{module}' is not allowed at {} security level",
            self.level
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parse;

    fn violation(source: &str, level: SecurityLevel) -> Option<String> {
        Walker::new(level).first_violation(&parse(source).unwrap())
    }

    fn strict(source: &str) -> Option<String> {
        violation(source, SecurityLevel::Strict)
    }

    #[test]
    fn allowed_imports_pass() {
        assert_eq!(strict("import math\nimport matplotlib.pyplot as plt"), None);
        assert_eq!(strict("from os.path import join"), None);
        assert_eq!(strict("from os import path"), None);
    }

    #[test]
    fn denied_imports_fail() {
        let msg = strict("import os").unwrap();
        assert!(msg.contains("'os'"), "{msg}");
        assert!(msg.contains("strict"), "{msg}");
        assert!(strict("from os import system").is_some());
        assert!(strict("import yaml").is_some());
        assert_eq!(violation("import yaml", SecurityLevel::Permissive), None);
    }

    #[test]
    fn denied_calls_fail() {
        assert_eq!(
            strict("x = eval('1 + 1')").as_deref(),
            Some("Call to 'eval' is not allowed")
        );
        assert!(strict("open('/etc/passwd')").is_some());
        assert!(strict("getattr(x, 'y')").is_some());
    }

    #[test]
    fn denied_references_fail() {
        assert!(strict("f = eval\nf('1')").is_some());
        assert!(strict("fns = [exec]").is_some());
    }

    #[test]
    fn attribute_rooted_at_denied_module() {
        assert!(strict("os.system('ls')").is_some());
        assert!(strict("subprocess.run(['ls'])").is_some());
        assert_eq!(strict("p = os.path.join('a', 'b')"), None);
    }

    #[test]
    fn dunder_access_fails() {
        assert!(strict("x = ().__class__").is_some());
        assert!(strict("b = __builtins__").is_some());
        assert!(strict("f = lambda: (1).__class__.__bases__").is_some());
    }

    #[test]
    fn denied_attribute_on_any_value() {
        assert!(strict("thing.popen('ls')").is_some());
    }

    #[test]
    fn violations_inside_nested_code_are_found() {
        let source = "def f(x):\n    if x:\n        return [eval(s) for s in x]\n    return 0\n";
        assert!(strict(source).is_some());

        let source = "try:\n    pass\nexcept Exception:\n    import socket\n";
        assert!(strict(source).is_some());

        assert!(strict("print(f'{os.system(1)}')").is_some());
    }

    #[test]
    fn ordinary_chart_code_passes() {
        let source = "import matplotlib.pyplot as plt\n\
                      xs = [1, 2, 3]\n\
                      ys = [x ** 2 for x in xs]\n\
                      plt.plot(xs, ys, label='squares')\n\
                      plt.title(f'{len(xs)} points')\n\
                      plt.savefig('out.svg')\n";
        assert_eq!(strict(source), None);
    }
}
