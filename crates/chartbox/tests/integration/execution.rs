use chartbox::{
    Context, ExecutionLimits, ExecutionStatus, LimitsOverride, Sandbox, SecurityLevel,
    execute_code,
};
use tempfile::TempDir;

use super::{fixture_snippet, leftover_entries, test_config};

fn strict(source: &str) -> chartbox::ExecutionResult {
    execute_code(source, SecurityLevel::Strict, &ExecutionLimits::default(), None)
        .expect("limits are valid")
}

#[test]
fn test_bar_chart_fixture() {
    let result = strict(&fixture_snippet("bar_chart.py"));

    assert_eq!(result.status, ExecutionStatus::Success, "{:?}", result.error);
    assert_eq!(result.stdout, "total: 446\n");
    assert_eq!(result.generated_files, vec!["sales.svg"]);
    assert!(result.error.is_none());
    assert!(result.execution_time >= 0.0);
}

#[test]
fn test_line_chart_fixture_forces_svg() {
    let result = strict(&fixture_snippet("line_chart.py"));

    assert_eq!(result.status, ExecutionStatus::Success, "{:?}", result.error);
    assert_eq!(result.generated_files, vec!["wave.svg"]);
    assert!(result.stderr.contains("'.png'"), "{}", result.stderr);
}

#[test]
fn test_deep_recursion_is_a_runtime_error() {
    let result = strict(&fixture_snippet("deep_recursion.py"));

    assert_eq!(result.status, ExecutionStatus::RuntimeError);
    assert!(!result.success);
    let error = result.error.unwrap();
    assert!(error.starts_with("RecursionError"), "{error}");
}

#[test]
fn test_runtime_faults_keep_partial_output() {
    let result = strict("print('before')\nvalues = [1, 2]\nprint(values[5])");

    assert_eq!(result.status, ExecutionStatus::RuntimeError);
    assert_eq!(result.stdout, "before\n");
    assert!(result.error.unwrap().starts_with("IndexError"));
}

#[test]
fn test_missing_library_is_an_import_error() {
    let result = strict("import numpy as np\nprint(np.arange(3))");

    assert_eq!(result.status, ExecutionStatus::ImportError);
    assert_eq!(result.error.as_deref(), Some("ImportError: No module named 'numpy'"));
}

#[test]
fn test_caught_exceptions_do_not_fail_the_run() {
    let source = "\
try:
    import numpy
except ImportError:
    print('fallback')
try:
    1 / 0
except ZeroDivisionError as err:
    print('caught', err)
";
    let result = strict(source);
    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.stdout, "fallback\ncaught division by zero\n");
}

#[test]
fn test_context_becomes_globals() {
    let context: Context = serde_json::from_str(
        r#"{"title": "Revenue", "values": [3, 1, 2], "meta": {"unit": "k$"}}"#,
    )
    .unwrap();
    let source = "print(title, sorted(values), meta['unit'])";

    let result = execute_code(
        source,
        SecurityLevel::Strict,
        &ExecutionLimits::default(),
        Some(&context),
    )
    .unwrap();
    assert_eq!(result.stdout, "Revenue [1, 2, 3] k$\n");
}

#[test]
fn test_output_is_truncated_with_warning() {
    let limits = ExecutionLimits::new().with_max_output_lines(3);
    let result = execute_code(
        "for i in range(10):\n    print(i)",
        SecurityLevel::Strict,
        &limits,
        None,
    )
    .unwrap();

    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.stdout.lines().count(), 3);
    assert_eq!(result.security_warnings.len(), 1);
}

#[test]
fn test_invalid_limits_are_rejected() {
    let limits = ExecutionLimits::new().with_max_memory_mb(0);
    assert!(execute_code("print(1)", SecurityLevel::Strict, &limits, None).is_err());

    let sandbox = Sandbox::with_defaults();
    let overrides = LimitsOverride {
        max_execution_time: Some(-1.0),
        ..Default::default()
    };
    let result = sandbox.execute_code_with("print(1)", SecurityLevel::Strict, Some(&overrides), None);
    assert!(result.is_err());
}

#[test]
fn test_unrepresentable_deadline_is_rejected() {
    let limits = ExecutionLimits::new().with_max_execution_time(1e20);
    let err = execute_code("print(1)", SecurityLevel::Strict, &limits, None).unwrap_err();
    assert!(err.to_string().contains("max_execution_time"), "{err}");
}

#[test]
fn test_large_allocation_hits_memory_limit() {
    let limits = ExecutionLimits::new().with_max_memory_mb(1);
    let result = execute_code(
        "blob = 'x' * (4 * 1024 * 1024)",
        SecurityLevel::Strict,
        &limits,
        None,
    )
    .unwrap();

    assert_eq!(result.status, ExecutionStatus::RuntimeError);
    assert!(result.error.unwrap().starts_with("MemoryError"));
}

fn one_megabyte(source: &str) -> chartbox::ExecutionResult {
    let limits = ExecutionLimits::new().with_max_memory_mb(1);
    execute_code(source, SecurityLevel::Strict, &limits, None).unwrap()
}

#[test]
fn test_many_medium_values_hit_memory_limit() {
    let result = one_megabyte("rows = []\nfor i in range(500):\n    rows.append([0] * 20000)\nprint('done')");

    assert_eq!(result.status, ExecutionStatus::RuntimeError);
    assert!(result.error.as_deref().unwrap_or_default().starts_with("MemoryError"), "{:?}", result.error);
    assert!(!result.stdout.contains("done"));
}

#[test]
fn test_nested_comprehension_hits_memory_limit() {
    let result = one_megabyte("grid = [[0] * 20000 for i in range(500)]\nprint(len(grid))");

    assert_eq!(result.status, ExecutionStatus::RuntimeError);
    assert!(result.error.as_deref().unwrap_or_default().starts_with("MemoryError"), "{:?}", result.error);
    assert!(result.stdout.is_empty());
}

#[test]
fn test_work_within_memory_limit_succeeds() {
    let result = one_megabyte("rows = [[i] * 100 for i in range(100)]\nprint(sum([len(r) for r in rows]))");

    assert_eq!(result.status, ExecutionStatus::Success, "{:?}", result.error);
    assert_eq!(result.stdout, "10000\n");
    assert!(result.memory_used <= 1024 * 1024);
}

#[test]
fn test_self_referencing_values_do_not_break_later_runs() {
    for _ in 0..5 {
        let result = strict("a = [0] * 100000\na.append(a)\nd = {'me': None}\nd['me'] = d\nprint(len(a))");

        assert_eq!(result.status, ExecutionStatus::Success, "{:?}", result.error);
        assert_eq!(result.stdout, "100001\n");
    }
}

#[test]
fn test_infinite_loop_times_out() {
    let root = TempDir::new().unwrap();
    let sandbox = Sandbox::new(test_config(root.path()));
    let overrides = LimitsOverride {
        max_execution_time: Some(0.3),
        ..Default::default()
    };

    let result = sandbox
        .execute_code_with(
            &fixture_snippet("infinite_loop.py"),
            SecurityLevel::Strict,
            Some(&overrides),
            None,
        )
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Timeout);
    assert_eq!(result.stdout, "working\n");
    assert!(result.error.unwrap().contains("time limit"));
    assert!(result.execution_time < 5.0);
    assert_eq!(leftover_entries(root.path()), 0);
}
