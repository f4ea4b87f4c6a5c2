use std::time::{Duration, Instant};

use coderun::{ExecutionRequest, NO_OUTPUT};

use super::{fixture_source, scratch_is_empty, test_runner};
#[cfg(target_os = "linux")]
use super::{exits_soon, read_pid};

#[tokio::test]
async fn test_python_hello() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = test_runner(&tmp).await;

    let response = runner
        .execute(&ExecutionRequest::new("python", fixture_source("hello.py")))
        .await
        .expect("request accepted");

    assert!(response.is_success());
    assert_eq!(response.output, "Hello, World!\n");
    assert!(scratch_is_empty(&runner));
}

#[tokio::test]
async fn test_python_reads_input() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = test_runner(&tmp).await;

    let request = ExecutionRequest::new("python", fixture_source("sum.py")).with_input("5\n7\n");
    let response = runner.execute(&request).await.expect("request accepted");

    assert_eq!(response.output, "12\n");
    assert_eq!(response.error, None);
}

#[tokio::test]
async fn test_python_runtime_error() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = test_runner(&tmp).await;

    let response = runner
        .execute(&ExecutionRequest::new("python", fixture_source("divide_by_zero.py")))
        .await
        .expect("request accepted");

    assert_eq!(response.output, "before\n");
    let error = response.error.expect("runtime error reported");
    assert!(error.contains("ZeroDivisionError"), "{error}");
}

#[tokio::test]
async fn test_python_silent_program() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = test_runner(&tmp).await;

    let response = runner
        .execute(&ExecutionRequest::new("python", "x = 1\n"))
        .await
        .expect("request accepted");

    assert_eq!(response.output, NO_OUTPUT);
}

#[tokio::test]
async fn test_javascript_hello() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = test_runner(&tmp).await;

    let response = runner
        .execute(&ExecutionRequest::new("javascript", fixture_source("hello.js")))
        .await
        .expect("request accepted");

    assert_eq!(response.output, "Hello, World!\n");
}

#[tokio::test]
#[ignore = "requires ts-node"]
async fn test_typescript_hello() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = test_runner(&tmp).await;

    let response = runner
        .execute(&ExecutionRequest::new("typescript", fixture_source("hello.ts")))
        .await
        .expect("request accepted");

    assert_eq!(response.output, "Hello, World!\n");
}

#[tokio::test]
async fn test_c_hello() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = test_runner(&tmp).await;

    let response = runner
        .execute(&ExecutionRequest::new("c", fixture_source("hello.c")))
        .await
        .expect("request accepted");

    assert_eq!(response.output, "Hello, World!\n");
    assert!(scratch_is_empty(&runner));
}

#[tokio::test]
async fn test_c_compile_error() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = test_runner(&tmp).await;

    let response = runner
        .execute(&ExecutionRequest::new("c", fixture_source("compile_error.c")))
        .await
        .expect("request accepted");

    assert_eq!(response.output, "");
    let error = response.error.expect("compile error reported");
    assert!(error.contains("error"), "{error}");
    assert!(!error.contains("\n\n\n"), "{error}");
    assert!(scratch_is_empty(&runner));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_c_timeout_kills_forked_children() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = coderun::Config::default();
    config.scratch_dir = tmp.path().join("temp");
    config.default_limits.wall_time_limit = Some(3.0);
    let runner = coderun::Runner::prepare(config).await.unwrap();
    let pid_file = tmp.path().join("child.pid");

    let started = Instant::now();
    let request = ExecutionRequest::new("c", fixture_source("fork_sleep.c"))
        .with_input(format!("{}\n", pid_file.display()));
    let response = runner.execute(&request).await.expect("request accepted");

    assert!(started.elapsed() < Duration::from_secs(10));
    let error = response.error.expect("timeout reported");
    assert!(error.starts_with("Time limit exceeded"), "{error}");
    assert!(scratch_is_empty(&runner));

    let pid = read_pid(&pid_file).await;
    assert!(exits_soon(pid).await, "forked child {pid} outlived the timeout");
}

#[tokio::test]
async fn test_java_hello_with_input() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = test_runner(&tmp).await;

    let request = ExecutionRequest::new("java", fixture_source("Main.java")).with_input("Ada\n");
    let response = runner.execute(&request).await.expect("request accepted");

    assert_eq!(response.output, "Hello, Ada!\n");
    assert!(scratch_is_empty(&runner));
}

#[tokio::test]
async fn test_java_compile_error_is_compact() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = test_runner(&tmp).await;

    let response = runner
        .execute(&ExecutionRequest::new("java", fixture_source("CompileError.java")))
        .await
        .expect("request accepted");

    let error = response.error.expect("compile error reported");
    assert!(error.contains("CompileError.java"), "{error}");
    assert!(error.lines().all(|line| !line.trim().is_empty()), "{error}");
}

#[tokio::test]
async fn test_go_hello() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = test_runner(&tmp).await;

    let response = runner
        .execute(&ExecutionRequest::new("go", fixture_source("hello.go")))
        .await
        .expect("request accepted");

    assert_eq!(response.output, "Hello, World!\n");
}

#[tokio::test]
#[ignore = "requires mono"]
async fn test_csharp_hello() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = test_runner(&tmp).await;

    let response = runner
        .execute(&ExecutionRequest::new("csharp", fixture_source("hello.cs")))
        .await
        .expect("request accepted");

    assert_eq!(response.output, "Hello, World!\n");
    assert!(scratch_is_empty(&runner));
}

#[tokio::test]
async fn test_terminal_echo() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = test_runner(&tmp).await;

    let response = runner
        .execute(&ExecutionRequest::new("terminal", "echo hello from sh"))
        .await
        .expect("request accepted");

    assert_eq!(response.output, "hello from sh\n");
}
