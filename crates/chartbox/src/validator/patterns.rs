//! Textual scan for dangerous patterns
//!
//! A second line of defence that runs over the raw source after the tree
//! walk has passed. It also sees text the tree walk does not look into,
//! such as string literals, so it errs on the side of rejecting.

use std::sync::OnceLock;

use regex::Regex;

/// (pattern, description) pairs; `[^\w.]` keeps method calls such as
/// `re.compile(` from matching the bare-call patterns
const PATTERNS: &[(&str, &str)] = &[
    (r"(?:^|[^\w.])eval\s*\(", "dynamic evaluation call 'eval('"),
    (r"(?:^|[^\w.])exec\s*\(", "dynamic execution call 'exec('"),
    (r"(?:^|[^\w.])compile\s*\(", "code compilation call 'compile('"),
    (r"__import__", "dynamic import '__import__'"),
    (r"__builtins__", "builtins namespace '__builtins__'"),
    (r"\bimportlib\b", "import machinery 'importlib'"),
    (r"\bsubprocess\b", "process spawning via 'subprocess'"),
    (
        r"\bos\s*\.\s*(?:system|popen|spawn\w*|exec\w*|fork|kill)\b",
        "process spawning via 'os'",
    ),
    (
        r"\b(?:os|shutil)\s*\.\s*(?:remove|unlink|rmdir|rmtree|rename|replace|makedirs|mkdir|chmod|chown)\b",
        "filesystem mutation",
    ),
    (r"(?:^|[^\w.])open\s*\(", "raw file access 'open('"),
    (r"(?:^|[^\w.])input\s*\(", "interactive input 'input('"),
    (r"\bsocket\s*\.", "network access via 'socket'"),
    (r"\burllib\b", "network access via 'urllib'"),
    (r"\brequests\s*\.\s*(?:get|post|put|delete|request)\b", "network access via 'requests'"),
    (r"(?:^|[^\w.])(?:globals|locals)\s*\(", "namespace introspection"),
];

fn compiled() -> &'static [(Regex, &'static str)] {
    static COMPILED: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        PATTERNS
            .iter()
            .map(|(pattern, description)| {
                let regex = Regex::new(&format!("(?m){pattern}"))
                    .expect("built-in validator pattern should compile");
                (regex, *description)
            })
            .collect()
    })
}

/// Every dangerous pattern found in `source`, as warnings
pub fn scan(source: &str) -> Vec<String> {
    compiled()
        .iter()
        .filter(|(regex, _)| regex.is_match(source))
        .map(|(_, description)| format!("Dangerous pattern detected: {description}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_patterns_compile() {
        assert_eq!(compiled().len(), PATTERNS.len());
    }

    #[test]
    fn detects_bare_calls() {
        assert_eq!(scan("x = eval('1')").len(), 1);
        assert_eq!(scan("exec (code)").len(), 1);
        assert_eq!(scan("f = open('x', 'w')").len(), 1);
        assert_eq!(scan("name = input()").len(), 1);
    }

    #[test]
    fn method_calls_do_not_match() {
        assert!(scan("pattern = re.compile('a+')").is_empty());
        assert!(scan("fig.open_file = 1").is_empty());
        assert!(scan("evaluate(3)").is_empty());
        assert!(scan("retrieval(3)").is_empty());
    }

    #[test]
    fn accumulates_every_match() {
        let warnings = scan("import subprocess\nos.system('ls')\n__import__('x')");
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn filesystem_mutation() {
        assert_eq!(scan("shutil.rmtree('/')").len(), 1);
        assert_eq!(scan("os . remove(p)").len(), 1);
        assert!(scan("os.path.join(a, b)").is_empty());
    }

    #[test]
    fn clean_plotting_code() {
        let source = "import matplotlib.pyplot as plt\nplt.plot([1, 2], [3, 4])\nplt.savefig('a.svg')\n";
        assert!(scan(source).is_empty());
    }
}
