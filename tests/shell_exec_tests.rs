use std::time::Instant;

use stratum::exec::{ExecResult, execute_shell};
use tempfile::TempDir;

fn setup_workspace() -> TempDir {
    tempfile::tempdir().expect("failed to create temp dir")
}

// ============================================================
// Normal execution
// ============================================================

#[tokio::test]
async fn captures_stdout_and_stderr_separately() {
    let ws = setup_workspace();
    let result = execute_shell("echo out && echo err >&2", ws.path(), 5)
        .await
        .unwrap();
    assert_eq!(result.stdout, "out\n");
    assert_eq!(result.stderr, "err\n");
    assert_eq!(result.exit_code, Some(0));
    assert!(!result.timed_out);
}

#[tokio::test]
async fn reports_nonzero_exit_codes() {
    let ws = setup_workspace();
    let result = execute_shell("exit 42", ws.path(), 5).await.unwrap();
    assert_eq!(result.exit_code, Some(42));
    assert!(result.render().ends_with("[exit code 42]"));
}

#[tokio::test]
async fn runs_inside_the_workspace() {
    let ws = setup_workspace();
    std::fs::write(ws.path().join("notes.txt"), "draft").unwrap();
    let result = execute_shell("cat notes.txt", ws.path(), 5).await.unwrap();
    assert_eq!(result.stdout, "draft");
}

// ============================================================
// Timeout behavior
// ============================================================

#[tokio::test]
async fn timeout_kills_the_process_group() {
    let ws = setup_workspace();
    let start = Instant::now();
    let result = execute_shell("sleep 60 & sleep 60 & wait", ws.path(), 1)
        .await
        .unwrap();

    assert!(result.timed_out, "should report timed_out");
    assert_eq!(result.exit_code, None);
    assert!(
        start.elapsed().as_secs() < 5,
        "background children must not keep the pipes open"
    );
    assert!(result.render().ends_with("[timed out]"));
}

// ============================================================
// Rendering
// ============================================================

#[test]
fn render_appends_stderr_after_stdout() {
    let result = ExecResult {
        stdout: "built".into(),
        stderr: "warning: unused".into(),
        exit_code: Some(0),
        timed_out: false,
    };
    assert_eq!(result.render(), "built\n[stderr]\nwarning: unused");
}

#[test]
fn exec_result_serializes() {
    let result = ExecResult {
        stdout: "output".into(),
        stderr: "".into(),
        exit_code: Some(0),
        timed_out: false,
    };
    let parsed = serde_json::to_value(&result).unwrap();
    assert_eq!(parsed["stdout"], "output");
    assert_eq!(parsed["exit_code"], 0);
    assert_eq!(parsed["timed_out"], false);
}
