use std::sync::Arc;
use std::thread;

use chartbox::{ExecutionStatus, LimitsOverride, Sandbox, SecurityLevel};
use tempfile::TempDir;

use super::{leftover_entries, test_config};

#[test]
fn test_concurrent_runs_do_not_share_files() {
    let root = TempDir::new().unwrap();
    let sandbox = Arc::new(Sandbox::new(test_config(root.path())));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let sandbox = Arc::clone(&sandbox);
            thread::spawn(move || {
                let source = format!(
                    "import os.path\n\
                     print(os.path.exists(os.path.join(output_dir, 'chart.svg')))\n\
                     write_chart('run {i}', {i})\n"
                );
                sandbox.execute_code(&source, None).unwrap()
            })
        })
        .collect();

    for handle in handles {
        let result = handle.join().unwrap();
        assert_eq!(result.status, ExecutionStatus::Success, "{:?}", result.error);
        assert_eq!(result.stdout, "False\n");
        assert_eq!(result.generated_files, vec!["chart.svg"]);
    }
    assert_eq!(leftover_entries(root.path()), 0);
}

#[test]
fn test_state_does_not_leak_between_runs() {
    let sandbox = Sandbox::with_defaults();

    let first = sandbox.execute_code("leaked = 42\nprint(leaked)", None).unwrap();
    assert_eq!(first.stdout, "42\n");

    let second = sandbox.execute_code("print(leaked)", None).unwrap();
    assert_eq!(second.status, ExecutionStatus::RuntimeError);
    assert!(second.error.unwrap().starts_with("NameError"));
}

#[test]
fn test_rejected_snippets_leave_no_trace() {
    let root = TempDir::new().unwrap();
    let sandbox = Sandbox::new(test_config(root.path()));

    let result = sandbox
        .execute_code("import shutil\nshutil.rmtree('/')", None)
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::SecurityViolation);
    assert!(result.generated_files.is_empty());
    assert_eq!(leftover_entries(root.path()), 0);
}

#[test]
fn test_timed_out_runs_release_their_scratch_directory() {
    let root = TempDir::new().unwrap();
    let sandbox = Sandbox::new(test_config(root.path()));
    let overrides = LimitsOverride {
        max_execution_time: Some(0.2),
        ..Default::default()
    };
    let source = "\
write_chart('partial', 1)
while True:
    pass
";

    let result = sandbox
        .execute_code_with(source, SecurityLevel::Strict, Some(&overrides), None)
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Timeout);
    assert_eq!(leftover_entries(root.path()), 0);
}
