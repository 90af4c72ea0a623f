use chartbox::validator::policy;
use chartbox::{ExecutionLimits, ExecutionStatus, SecurityLevel, execute_code, validate};
use proptest::prelude::*;

use super::fixture_snippet;

fn run(source: &str, level: SecurityLevel) -> chartbox::ExecutionResult {
    execute_code(source, level, &ExecutionLimits::default(), None).expect("limits are valid")
}

#[test]
fn test_concrete_write_chart_scenario() {
    let source = "label='x'; value=5; write_chart(label, value)";
    let result = run(source, SecurityLevel::Strict);

    assert_eq!(result.status, ExecutionStatus::Success);
    assert!(result.success);
    assert_eq!(result.generated_files.len(), 1);
    assert!(result.security_warnings.is_empty());
}

#[test]
fn test_runtime_built_eval_is_a_security_violation() {
    let result = run(&fixture_snippet("runtime_eval.py"), SecurityLevel::Permissive);

    assert_eq!(result.status, ExecutionStatus::SecurityViolation);
    assert!(result.stdout.is_empty());
    assert!(result.generated_files.is_empty());
    assert!(!result.security_warnings.is_empty());
}

#[test]
fn test_dangerous_calls_are_rejected() {
    let sources = [
        "import subprocess\nsubprocess.run(['ls'])",
        "import os\nos.system('ls')",
        "import socket\ns = socket.socket()",
        "f = open('/tmp/x', 'w')\nf.write('data')",
        "exec('print(1)')",
        "getattr(print, '__call__')",
        "x = ().__class__.__bases__",
    ];
    for source in sources {
        for level in [SecurityLevel::Strict, SecurityLevel::Moderate, SecurityLevel::Permissive] {
            assert!(!validate(source, level).accepted, "{source} accepted at {level}");
            let result = run(source, level);
            assert_eq!(result.status, ExecutionStatus::SecurityViolation, "{source}");
            assert!(result.stdout.is_empty());
        }
    }
}

#[test]
fn test_syntax_errors_are_validation_errors() {
    for source in ["def f(:\n    pass", "x = [1, 2", "if True\n    x = 1", "print('unterminated)"] {
        let result = run(source, SecurityLevel::Strict);
        assert_eq!(result.status, ExecutionStatus::ValidationError, "{source}");
        assert!(result.error.is_some());
    }
}

#[test]
fn test_level_decides_unknown_imports() {
    let source = "import yaml\nprint('loaded')";

    let strict = run(source, SecurityLevel::Strict);
    assert_eq!(strict.status, ExecutionStatus::SecurityViolation);

    // Reaches execution, where no such library is provided
    let permissive = run(source, SecurityLevel::Permissive);
    assert_eq!(permissive.status, ExecutionStatus::ImportError);
    assert_eq!(permissive.error.as_deref(), Some("ImportError: No module named 'yaml'"));
}

#[test]
fn test_submodules_need_moderate() {
    let source = "import matplotlib.colors";
    assert!(!validate(source, SecurityLevel::Strict).accepted);
    assert!(validate(source, SecurityLevel::Moderate).accepted);
}

#[test]
fn test_fixture_snippets_validate() {
    for name in ["bar_chart.py", "line_chart.py", "infinite_loop.py", "deep_recursion.py"] {
        let finding = validate(&fixture_snippet(name), SecurityLevel::Strict);
        assert!(finding.accepted, "{name}: {:?}", finding.warnings);
    }
}

proptest! {
    #[test]
    fn test_validation_is_idempotent(source in "\\PC{0,200}") {
        for level in [SecurityLevel::Strict, SecurityLevel::Moderate, SecurityLevel::Permissive] {
            prop_assert_eq!(validate(&source, level), validate(&source, level));
        }
    }

    #[test]
    fn test_denied_modules_never_pass_strict(
        module in prop::sample::select(policy::DENIED_MODULES),
    ) {
        let source = format!("import {module}\n");
        let result = run(&source, SecurityLevel::Strict);
        prop_assert_eq!(result.status, ExecutionStatus::SecurityViolation);
    }
}
