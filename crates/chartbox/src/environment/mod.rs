//! Capability environment builder
//!
//! An [`Environment`] is the complete set of names a snippet can reach:
//! the builtins table, the library namespaces the host provides, the
//! scratch handle and the caller's context values. It is built fresh for
//! every invocation and handed to the interpreter by value; nothing outside
//! it is reachable from snippet code.

mod builtins;
mod modules;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::runtime::fault::{ExcKind, Fault};
use crate::runtime::value::{CallArgs, NativeFn, Value};
use crate::types::SecurityLevel;
use crate::validator::policy;

/// What a name in the environment is bound to
#[derive(Clone, Copy)]
pub enum Binding {
    Function(NativeFn),
    Exception(ExcKind),
    Float(f64),
    /// The opaque scratch directory handle
    Scratch,
    /// A pre-registered module, by dotted name
    Module(&'static str),
}

/// Members of one library namespace
#[derive(Clone)]
pub struct ModuleTable {
    pub name: &'static str,
    pub members: Vec<(&'static str, Binding)>,
}

impl ModuleTable {
    pub fn new(name: &'static str, members: Vec<(&'static str, Binding)>) -> Self {
        Self { name, members }
    }

    pub fn member(&self, name: &str) -> Option<&Binding> {
        self.members.iter().find(|(n, _)| *n == name).map(|(_, b)| b)
    }
}

/// Capability table for one invocation
pub struct Environment {
    level: SecurityLevel,
    scratch: PathBuf,
    builtins: Vec<(&'static str, Binding)>,
    modules: HashMap<&'static str, ModuleTable>,
    context: Vec<(String, serde_json::Value)>,
    warnings: Vec<String>,
}

/// An environment taken apart for the interpreter
pub struct EnvironmentParts {
    pub level: SecurityLevel,
    pub scratch: PathBuf,
    pub builtins: Vec<(&'static str, Binding)>,
    pub modules: HashMap<&'static str, ModuleTable>,
    pub context: Vec<(String, serde_json::Value)>,
}

impl Environment {
    /// Build the capability table for `level`, scoped to `scratch`
    pub fn build(level: SecurityLevel, scratch: &Path) -> Self {
        let mut modules: HashMap<&'static str, ModuleTable> = HashMap::new();

        let mut libraries = modules::libraries();
        // Parents first; a package stub then never shadows a real table
        libraries.sort_by_key(|table| table.name.matches('.').count());
        for table in libraries {
            if policy::module_allowed(table.name, level) {
                register(&mut modules, table);
            } else {
                debug!(module = table.name, %level, "library not bound at this level");
            }
        }

        for name in policy::ALLOWED_MODULES {
            if !modules.contains_key(name) {
                debug!(module = name, "allow-listed module is not provided by this host");
            }
        }

        Self {
            level,
            scratch: scratch.to_path_buf(),
            builtins: builtins::table(),
            modules,
            context: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Bind caller context values as extra globals
    ///
    /// Keys that are not identifiers, are dunders, or collide with a
    /// builtin or module name are skipped with a warning.
    pub fn with_context(mut self, context: &serde_json::Map<String, serde_json::Value>) -> Self {
        for (key, value) in context {
            let reason = if !is_identifier(key) {
                Some("is not a valid identifier")
            } else if policy::is_dunder(key) {
                Some("is a reserved name")
            } else if self.builtins.iter().any(|(name, _)| *name == key.as_str()) {
                Some("collides with a builtin name")
            } else if self.modules.contains_key(key.as_str()) {
                Some("collides with a module name")
            } else {
                None
            };

            match reason {
                Some(reason) => {
                    warn!(key = %key, reason, "context key skipped");
                    self.warnings
                        .push(format!("context key '{key}' {reason} and was skipped"));
                }
                None => self.context.push((key.clone(), value.clone())),
            }
        }
        self
    }

    pub fn level(&self) -> SecurityLevel {
        self.level
    }

    pub fn scratch(&self) -> &Path {
        &self.scratch
    }

    /// Problems found while binding context values
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Whether `name` is reachable as a builtin
    #[cfg(test)]
    fn has_builtin(&self, name: &str) -> bool {
        self.builtins.iter().any(|(n, _)| *n == name)
    }

    /// Whether `name` can be imported
    #[cfg(test)]
    fn has_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn into_parts(self) -> EnvironmentParts {
        EnvironmentParts {
            level: self.level,
            scratch: self.scratch,
            builtins: self.builtins,
            modules: self.modules,
            context: self.context,
        }
    }
}

/// Insert a table and link it into its parent package
fn register(modules: &mut HashMap<&'static str, ModuleTable>, table: ModuleTable) {
    let name = table.name;
    match modules.entry(name) {
        Entry::Occupied(mut existing) => existing.get_mut().members.extend(table.members),
        Entry::Vacant(slot) => {
            slot.insert(table);
        }
    }

    if let Some((parent, child)) = name.rsplit_once('.') {
        let package = modules
            .entry(parent)
            .or_insert_with(|| ModuleTable::new(parent, Vec::new()));
        if package.member(child).is_none() {
            package.members.push((child, Binding::Module(name)));
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// === Helpers shared by native functions ===

/// Numeric argument as `f64`
pub(crate) fn number(value: &Value, func: &str) -> Result<f64, Fault> {
    value.as_f64().ok_or_else(|| {
        Fault::type_error(format!(
            "{func}() argument must be a real number, not '{}'",
            value.type_name()
        ))
    })
}

/// Required positional argument
pub(crate) fn required<'a>(
    args: &'a CallArgs,
    index: usize,
    name: &str,
    func: &str,
) -> Result<&'a Value, Fault> {
    args.arg(index, name).ok_or_else(|| {
        Fault::type_error(format!("{func}() missing required argument: '{name}'"))
    })
}

/// Plain artifact file name for a user-supplied target
///
/// Only the final path component is kept, characters outside
/// `[A-Za-z0-9._-]` become `_`, and the extension is forced to `.svg`.
/// Returns the name and, when the extension was rewritten, a note for the
/// snippet's stderr.
pub(crate) fn artifact_name(target: &Value) -> Result<(String, Option<String>), Fault> {
    let raw = match target {
        Value::Str(s) => s.to_string(),
        Value::ScratchPath(rel) => rel.to_string(),
        other => {
            return Err(Fault::type_error(format!(
                "expected a file name, not '{}'",
                other.type_name()
            )));
        }
    };

    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let sanitized: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.trim_start_matches('.');
    if sanitized.is_empty() {
        return Err(Fault::value_error(format!("invalid file name '{raw}'")));
    }

    let (stem, extension) = match sanitized.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (sanitized, None),
    };
    let mut stem = stem.to_string();
    stem.truncate(120);

    match extension {
        Some(ext) if ext.eq_ignore_ascii_case("svg") => Ok((format!("{stem}.svg"), None)),
        Some(ext) => {
            let name = format!("{stem}.svg");
            let note = format!("note: '.{ext}' output is not supported, saved as '{name}'\n");
            Ok((name, Some(note)))
        }
        None => Ok((format!("{stem}.svg"), None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(level: SecurityLevel) -> Environment {
        Environment::build(level, Path::new("/nonexistent/scratch"))
    }

    #[test]
    fn builtins_exclude_dangerous_names() {
        let env = env(SecurityLevel::Permissive);
        for name in ["print", "len", "range", "sorted", "write_chart", "output_dir", "ValueError"] {
            assert!(env.has_builtin(name), "{name} missing");
        }
        for name in ["open", "eval", "exec", "__import__", "getattr", "input", "compile", "globals"] {
            assert!(!env.has_builtin(name), "{name} must not be bound");
        }
    }

    #[test]
    fn libraries_are_prebound() {
        let env = env(SecurityLevel::Strict);
        for name in ["math", "random", "statistics", "json", "os.path", "matplotlib", "matplotlib.pyplot"] {
            assert!(env.has_module(name), "{name} missing");
        }
        // Allow-listed but not provided by this host
        for name in ["numpy", "pandas", "datetime", "collections", "re", "string"] {
            assert!(!env.has_module(name));
        }
    }

    #[test]
    fn packages_link_their_children() {
        let parts = env(SecurityLevel::Strict).into_parts();
        let os = &parts.modules["os"];
        assert!(matches!(os.member("path"), Some(Binding::Module("os.path"))));
        assert_eq!(os.members.len(), 1);

        let matplotlib = &parts.modules["matplotlib"];
        assert!(matches!(matplotlib.member("pyplot"), Some(Binding::Module("matplotlib.pyplot"))));
        assert!(matplotlib.member("use").is_some());
    }

    #[test]
    fn context_collisions_are_skipped() {
        let context = serde_json::json!({
            "label": "x",
            "print": 1,
            "math": 2,
            "__builtins__": {},
            "not an identifier": 3,
        });
        let env = env(SecurityLevel::Strict).with_context(context.as_object().unwrap());
        assert_eq!(env.warnings().len(), 4);
        assert!(env.warnings().iter().any(|w| w.contains("'print'")));

        let parts = env.into_parts();
        assert_eq!(parts.context.len(), 1);
        assert_eq!(parts.context[0].0, "label");
    }

    #[test]
    fn artifact_names_are_confined() {
        let name = |s: &str| artifact_name(&Value::str(s)).map(|(n, _)| n);
        assert_eq!(name("chart.svg").unwrap(), "chart.svg");
        assert_eq!(name("../../etc/passwd").unwrap(), "passwd.svg");
        assert_eq!(name("/tmp/a b.SVG").unwrap(), "a_b.svg");
        assert_eq!(name("..\\x.svg").unwrap(), "x.svg");
        assert!(name("..").is_err());
        assert!(name("").is_err());
        assert!(artifact_name(&Value::Int(1)).is_err());
    }

    #[test]
    fn other_extensions_become_svg_with_a_note() {
        let (name, note) = artifact_name(&Value::str("plot.png")).unwrap();
        assert_eq!(name, "plot.svg");
        assert!(note.unwrap().contains("'.png'"));
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(""));
    }
}
