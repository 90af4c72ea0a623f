//! Module and name policy shared by the validator and the runtime import
//! statement

use crate::types::SecurityLevel;

/// Modules a snippet may import at every level
pub const ALLOWED_MODULES: &[&str] = &[
    "matplotlib",
    "matplotlib.pyplot",
    "numpy",
    "pandas",
    "math",
    "random",
    "statistics",
    "datetime",
    "collections",
    "json",
    "re",
    "string",
    "os.path",
];

/// Modules refused at every level unless reached through an allow-listed
/// dotted entry such as `os.path`
pub const DENIED_MODULES: &[&str] = &[
    "os",
    "sys",
    "subprocess",
    "socket",
    "shutil",
    "pathlib",
    "ctypes",
    "importlib",
    "builtins",
    "pickle",
    "marshal",
    "multiprocessing",
    "threading",
    "signal",
    "urllib",
    "http",
    "requests",
    "ftplib",
    "telnetlib",
    "asyncio",
    "pty",
    "tempfile",
    "glob",
    "io",
    "code",
    "codeop",
    "inspect",
    "gc",
    "resource",
    "platform",
];

/// Bare call targets that are never allowed
pub const DENIED_CALLS: &[&str] = &[
    "eval",
    "exec",
    "compile",
    "open",
    "input",
    "__import__",
    "getattr",
    "setattr",
    "delattr",
    "globals",
    "locals",
    "vars",
    "dir",
    "breakpoint",
    "exit",
    "quit",
    "help",
    "memoryview",
    "type",
    "super",
];

/// Attribute names that are never allowed, whatever they hang off
pub const DENIED_ATTRIBUTES: &[&str] = &[
    "system",
    "popen",
    "fork",
    "kill",
    "unlink",
    "rmtree",
    "rmdir",
    "remove_dir",
    "makedirs",
    "chmod",
    "chown",
    "urlopen",
];

/// Whether `module` may be imported at `level`
pub fn module_allowed(module: &str, level: SecurityLevel) -> bool {
    if ALLOWED_MODULES.contains(&module) {
        return true;
    }

    match level {
        SecurityLevel::Strict => false,
        SecurityLevel::Moderate => has_allowed_ancestor(module),
        SecurityLevel::Permissive => has_allowed_ancestor(module) || !is_denied_module(module),
    }
}

/// Whether `from module import name` may bind `name`
///
/// An allowed module allows all of its names; otherwise the dotted path
/// `module.name` must be allowed on its own (`from os import path`).
pub fn from_import_allowed(module: &str, name: &str, level: SecurityLevel) -> bool {
    module_allowed(module, level) || ALLOWED_MODULES.contains(&format!("{module}.{name}").as_str())
}

/// Whether the first segment of `module` names a denied module
pub fn is_denied_module(module: &str) -> bool {
    let root = module.split('.').next().unwrap_or(module);
    DENIED_MODULES.contains(&root)
}

/// Whether a dotted path starts with an allow-listed module (`os.path.join`)
pub fn has_allowed_prefix(path: &str) -> bool {
    ALLOWED_MODULES.iter().any(|allowed| is_path_prefix(allowed, path))
}

fn has_allowed_ancestor(module: &str) -> bool {
    ALLOWED_MODULES
        .iter()
        .any(|allowed| module.len() > allowed.len() && is_path_prefix(allowed, module))
}

/// `prefix` equals `path` or is a whole-segment prefix of it
fn is_path_prefix(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.'),
        None => false,
    }
}

pub fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_accepts_only_exact_entries() {
        assert!(module_allowed("math", SecurityLevel::Strict));
        assert!(module_allowed("matplotlib.pyplot", SecurityLevel::Strict));
        assert!(module_allowed("os.path", SecurityLevel::Strict));
        assert!(!module_allowed("numpy.linalg", SecurityLevel::Strict));
        assert!(!module_allowed("os", SecurityLevel::Strict));
        assert!(!module_allowed("yaml", SecurityLevel::Strict));
    }

    #[test]
    fn moderate_accepts_submodules() {
        assert!(module_allowed("numpy.linalg", SecurityLevel::Moderate));
        assert!(module_allowed("matplotlib.colors", SecurityLevel::Moderate));
        assert!(!module_allowed("mathx", SecurityLevel::Moderate));
        assert!(!module_allowed("yaml", SecurityLevel::Moderate));
        assert!(!module_allowed("os", SecurityLevel::Moderate));
    }

    #[test]
    fn permissive_accepts_unknown_but_not_denied() {
        assert!(module_allowed("yaml", SecurityLevel::Permissive));
        assert!(module_allowed("os.path", SecurityLevel::Permissive));
        assert!(!module_allowed("os", SecurityLevel::Permissive));
        assert!(!module_allowed("subprocess", SecurityLevel::Permissive));
        assert!(!module_allowed("urllib.request", SecurityLevel::Permissive));
    }

    #[test]
    fn from_import_checks_dotted_name() {
        assert!(from_import_allowed("os", "path", SecurityLevel::Strict));
        assert!(!from_import_allowed("os", "system", SecurityLevel::Strict));
        assert!(from_import_allowed("math", "sqrt", SecurityLevel::Strict));
    }

    #[test]
    fn allowed_prefix_respects_segments() {
        assert!(has_allowed_prefix("os.path.join"));
        assert!(has_allowed_prefix("os.path"));
        assert!(!has_allowed_prefix("os.pathological"));
        assert!(!has_allowed_prefix("os.system"));
    }

    #[test]
    fn dunder_names() {
        assert!(is_dunder("__class__"));
        assert!(!is_dunder("____"));
        assert!(!is_dunder("_private"));
    }
}
