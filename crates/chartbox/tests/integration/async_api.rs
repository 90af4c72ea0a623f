use chartbox::{Context, ExecutionStatus, Sandbox};

#[tokio::test]
async fn test_async_execution_matches_blocking() {
    let sandbox = Sandbox::with_defaults();
    let source = "print(sum(range(5)))";

    let blocking = sandbox.execute_code(source, None).unwrap();
    let result = sandbox.execute_code_async(source.to_string(), None).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.stdout, blocking.stdout);
    assert_eq!(result.stdout, "10\n");
}

#[tokio::test]
async fn test_async_runs_in_parallel() {
    let sandbox = Sandbox::with_defaults();
    let mut context = Context::new();
    context.insert("count".to_string(), serde_json::json!(3));

    let (a, b) = tokio::join!(
        sandbox.execute_code_async("write_chart('a', count)".to_string(), Some(context.clone())),
        sandbox.execute_code_async("print(count * 2)".to_string(), Some(context)),
    );

    let a = a.unwrap();
    let b = b.unwrap();
    assert_eq!(a.generated_files, vec!["chart.svg"]);
    assert_eq!(b.stdout, "6\n");
}

#[tokio::test]
async fn test_async_reports_violations() {
    let sandbox = Sandbox::with_defaults();
    let result = sandbox
        .execute_code_async("import subprocess".to_string(), None)
        .await
        .unwrap();
    assert_eq!(result.status, ExecutionStatus::SecurityViolation);
}
