use chartbox::{ExecutionLimits, ExecutionStatus, LimitsOverride, Sandbox, SecurityLevel, execute_code};
use tempfile::TempDir;

use super::{leftover_entries, test_config};

#[test]
fn test_write_chart_produces_one_svg() {
    let result = execute_code(
        "label='x'; value=5; write_chart(label, value)",
        SecurityLevel::Strict,
        &ExecutionLimits::default(),
        None,
    )
    .unwrap();

    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.generated_files, vec!["chart.svg"]);
    assert!(result.security_warnings.is_empty());
}

#[test]
fn test_oversize_artifact_is_dropped_with_warning() {
    let limits = ExecutionLimits::new().with_max_file_size_kb(4);
    let source = "\
write_chart([str(i) for i in range(200)], list(range(200)), filename='big.svg')
write_chart('small', 1, filename='small.svg')
";
    let result = execute_code(source, SecurityLevel::Strict, &limits, None).unwrap();

    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.generated_files, vec!["small.svg"]);
    assert_eq!(result.security_warnings.len(), 1);
    assert!(result.security_warnings[0].starts_with("artifact 'big.svg'"));
    assert!(result.security_warnings[0].contains("4 KB limit"));
}

#[test]
fn test_files_are_listed_by_name_only() {
    let source = "\
import matplotlib.pyplot as plt
plt.plot([1, 2, 3])
plt.savefig('b_line.svg')
plt.close()
plt.scatter([1, 2], [2, 1])
plt.savefig('a_points.svg')
";
    let result = execute_code(source, SecurityLevel::Strict, &ExecutionLimits::default(), None)
        .unwrap();

    assert_eq!(result.generated_files, vec!["a_points.svg", "b_line.svg"]);
    for name in &result.generated_files {
        assert!(!name.contains('/'));
    }
}

#[test]
fn test_export_dir_receives_accepted_files() {
    let root = TempDir::new().unwrap();
    let exports = TempDir::new().unwrap();
    let mut config = test_config(root.path());
    config.export_dir = Some(exports.path().join("charts"));
    let sandbox = Sandbox::new(config);

    let overrides = LimitsOverride {
        max_file_size_kb: Some(4),
        ..Default::default()
    };
    let source = "\
write_chart('kept', 3, filename='kept.svg')
write_chart([str(i) for i in range(200)], list(range(200)), filename='dropped.svg')
";
    let result = sandbox
        .execute_code_with(source, SecurityLevel::Strict, Some(&overrides), None)
        .unwrap();

    assert_eq!(result.generated_files, vec!["kept.svg"]);
    let exported = std::fs::read_to_string(exports.path().join("charts").join("kept.svg")).unwrap();
    assert!(exported.starts_with("<svg"));
    assert!(!exports.path().join("charts").join("dropped.svg").exists());
    assert_eq!(leftover_entries(root.path()), 0);
}

#[test]
fn test_paths_cannot_leave_the_scratch_directory() {
    let root = TempDir::new().unwrap();
    let sandbox = Sandbox::new(test_config(root.path()));
    let source = "\
import matplotlib.pyplot as plt
plt.bar(['a'], [1])
plt.savefig('../../escape.svg')
";
    let result = sandbox.execute_code(source, None).unwrap();

    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.generated_files, vec!["escape.svg"]);
    assert!(!root.path().join("escape.svg").exists());
    assert_eq!(leftover_entries(root.path()), 0);
}
