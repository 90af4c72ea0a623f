//! Static validation of snippets
//!
//! A snippet is parsed, its syntax tree is walked for forbidden imports,
//! calls and attribute access, and the raw text is scanned for dangerous
//! patterns. Validation is pure: the same source and level always yield
//! the same finding.

mod patterns;
pub mod policy;
mod walker;

use tracing::debug;

use crate::script::{self, Program};
use crate::types::SecurityLevel;

use walker::Walker;

/// Outcome of validating one snippet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFinding {
    pub accepted: bool,
    pub warnings: Vec<String>,
    /// Rejected because the source did not parse
    pub syntax_error: bool,
}

impl ValidationFinding {
    fn accepted() -> Self {
        Self {
            accepted: true,
            warnings: Vec::new(),
            syntax_error: false,
        }
    }

    fn rejected(warnings: Vec<String>) -> Self {
        Self {
            accepted: false,
            warnings,
            syntax_error: false,
        }
    }
}

/// Validate `source` at `level`
pub fn validate(source: &str, level: SecurityLevel) -> ValidationFinding {
    check(source, level).0
}

/// Validate and hand back the parsed program when it was accepted
pub(crate) fn check(source: &str, level: SecurityLevel) -> (ValidationFinding, Option<Program>) {
    let program = match script::parse(source) {
        Ok(program) => program,
        Err(err) => {
            debug!(error = %err, "snippet failed to parse");
            let finding = ValidationFinding {
                accepted: false,
                warnings: vec![err.to_string()],
                syntax_error: true,
            };
            return (finding, None);
        }
    };

    if let Some(violation) = Walker::new(level).first_violation(&program) {
        debug!(%violation, "snippet rejected by tree walk");
        return (ValidationFinding::rejected(vec![violation]), None);
    }

    let warnings = patterns::scan(source);
    if !warnings.is_empty() {
        debug!(count = warnings.len(), "snippet rejected by pattern scan");
        return (ValidationFinding::rejected(warnings), None);
    }

    (ValidationFinding::accepted(), Some(program))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_simple_chart_snippet() {
        let finding = validate(
            "label='x'; value=5; write_chart(label, value)",
            SecurityLevel::Strict,
        );
        assert!(finding.accepted);
        assert!(finding.warnings.is_empty());
    }

    #[test]
    fn syntax_error_is_flagged() {
        let finding = validate("def broken(:\n", SecurityLevel::Strict);
        assert!(!finding.accepted);
        assert!(finding.syntax_error);
        assert!(finding.warnings[0].starts_with("syntax error at line 1"));
    }

    #[test]
    fn tree_walk_rejection_has_single_warning() {
        let finding = validate("import os\nimport sys\n", SecurityLevel::Strict);
        assert!(!finding.accepted);
        assert!(!finding.syntax_error);
        assert_eq!(finding.warnings.len(), 1);
    }

    #[test]
    fn pattern_scan_sees_string_contents() {
        let finding = validate("msg = 'call eval(x) later'", SecurityLevel::Permissive);
        assert!(!finding.accepted);
        assert!(finding.warnings[0].contains("eval"));
    }

    #[test]
    fn runtime_built_eval_is_rejected() {
        let source = "name = 'ev' + 'al'\nfn = __builtins__[name]\nfn('1 + 1')\n";
        let finding = validate(source, SecurityLevel::Permissive);
        assert!(!finding.accepted);
        assert!(!finding.syntax_error);
    }

    #[test]
    fn level_changes_import_outcome() {
        let source = "import yaml\n";
        assert!(!validate(source, SecurityLevel::Strict).accepted);
        assert!(!validate(source, SecurityLevel::Moderate).accepted);
        assert!(validate(source, SecurityLevel::Permissive).accepted);
    }

    #[test]
    fn check_returns_program_only_when_accepted() {
        assert!(check("x = 1", SecurityLevel::Strict).1.is_some());
        assert!(check("import os", SecurityLevel::Strict).1.is_none());
        assert!(check("x = (", SecurityLevel::Strict).1.is_none());
    }

    fn any_level() -> impl Strategy<Value = SecurityLevel> {
        prop_oneof![
            Just(SecurityLevel::Strict),
            Just(SecurityLevel::Moderate),
            Just(SecurityLevel::Permissive),
        ]
    }

    proptest! {
        #[test]
        fn validation_is_idempotent(source in "\\PC{0,120}", level in any_level()) {
            prop_assert_eq!(validate(&source, level), validate(&source, level));
        }

        #[test]
        fn validation_never_panics(
            source in "[a-z_ ().'=\\n:\\[\\]]{0,150}",
            level in any_level(),
        ) {
            let _ = validate(&source, level);
        }

        #[test]
        fn denied_calls_are_always_rejected(
            call in prop::sample::select(policy::DENIED_CALLS),
            level in any_level(),
        ) {
            let source = format!("result = {call}('payload')\n");
            prop_assert!(!validate(&source, level).accepted);
        }
    }
}
