use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use stratum::coordination::types::{ConfirmationStatus, HilStatus};
use stratum::coordination::watcher::{PendingItem, spawn_pending_watcher};
use stratum::coordination::{Coordination, GateDecision, HilOutcome};
use stratum::error::CoordinationError;
use stratum::frontend::ControlCommand;

fn coordination(auto: bool) -> Coordination {
    Coordination::new(auto, Duration::from_millis(10), Duration::from_secs(30))
}

// ============================================================
// HIL tasks
// ============================================================

#[tokio::test(start_paused = true)]
async fn hil_timeout_is_final() {
    let coordination = coordination(false);
    let (task, outcome) = coordination
        .hil
        .request("ws", None, "Upload the file", Duration::from_secs(5), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, HilOutcome::TimedOut);
    assert_eq!(coordination.hil.get_status(&task.hil_id).unwrap().status, HilStatus::Timeout);

    let err = coordination.hil.respond(&task.hil_id, "too late").unwrap_err();
    assert_eq!(
        err,
        CoordinationError::AlreadyResolved {
            id: task.hil_id.clone(),
            status: "timeout".to_string()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn hil_deadline_runs_from_creation_without_a_waiter() {
    let coordination = coordination(false);
    let task = coordination
        .hil
        .create("ws", None, "Upload the file", Duration::from_secs(5))
        .unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(coordination.hil.get_status(&task.hil_id).unwrap().status, HilStatus::Timeout);
    assert!(coordination.hil.first_waiting("ws").is_none());
    assert!(matches!(
        coordination.hil.respond(&task.hil_id, "too late"),
        Err(CoordinationError::AlreadyResolved { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn confirmation_deadline_runs_from_open() {
    let coordination = coordination(false);
    let confirmation = coordination.gate.open("ws", "file_write", &json!({})).unwrap();

    tokio::time::sleep(Duration::from_secs(31)).await;

    assert_eq!(
        coordination.gate.get(&confirmation.confirm_id).unwrap().status,
        ConfirmationStatus::Timeout
    );
    let decision = coordination
        .gate
        .wait(&confirmation.confirm_id, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(decision, GateDecision::TimedOut);
}

#[tokio::test]
async fn first_resolution_wins() {
    let coordination = coordination(false);
    let task = coordination
        .hil
        .create("ws", Some("hil-1".into()), "Pick a vendor", Duration::from_secs(60))
        .unwrap();

    coordination.hil.respond(&task.hil_id, "vendor A").unwrap();
    assert!(matches!(
        coordination.hil.cancel(&task.hil_id, "changed my mind"),
        Err(CoordinationError::AlreadyResolved { .. })
    ));

    let outcome = coordination
        .hil
        .wait(&task.hil_id, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, HilOutcome::Completed("vendor A".into()));
}

#[tokio::test]
async fn cancelling_the_run_withdraws_the_wait() {
    let coordination = coordination(false);
    let cancel = CancellationToken::new();
    let task = coordination
        .hil
        .create("ws", None, "Sign the form", Duration::from_secs(60))
        .unwrap();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let outcome = coordination.hil.wait(&task.hil_id, &cancel).await.unwrap();
    assert_eq!(outcome, HilOutcome::Aborted);
    assert_ne!(coordination.hil.get_status(&task.hil_id).unwrap().status, HilStatus::Waiting);
}

#[test]
fn tasks_are_listed_per_workspace() {
    let coordination = coordination(false);
    coordination.hil.create("ws-a", None, "one", Duration::from_secs(60)).unwrap();
    coordination.hil.create("ws-b", None, "two", Duration::from_secs(60)).unwrap();

    assert_eq!(coordination.hil.list("ws-a").len(), 1);
    assert_eq!(coordination.hil.list_all().len(), 2);
    assert_eq!(coordination.hil.first_waiting("ws-b").unwrap().instruction, "two");
}

// ============================================================
// Tool confirmations
// ============================================================

#[tokio::test]
async fn confirmation_answered_through_a_control_line() {
    let coordination = coordination(false);
    let confirmation = coordination
        .gate
        .open("ws", "file_write", &json!({"path": "out.txt"}))
        .unwrap();

    let line = format!(r#"{{"type":"confirm","confirm_id":"{}","approved":true}}"#, confirmation.confirm_id);
    ControlCommand::parse(&line).unwrap().apply(&coordination).unwrap();

    let decision = coordination
        .gate
        .wait(&confirmation.confirm_id, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(decision, GateDecision::Allowed);
    assert_eq!(
        coordination.gate.get(&confirmation.confirm_id).unwrap().status,
        ConfirmationStatus::Approved
    );
}

#[tokio::test]
async fn permission_mode_is_per_workspace() {
    let coordination = coordination(false);
    coordination.gate.set_task_permission("ws-auto", true);

    assert!(coordination.gate.is_auto("ws-auto"));
    assert!(!coordination.gate.is_auto("ws-manual"));

    let decision = coordination
        .gate
        .check("ws-auto", "shell_exec", &json!({"command": "rm -rf build"}), &CancellationToken::new())
        .await
        .unwrap();
    assert!(decision.is_allowed());
    assert!(coordination.gate.list("ws-auto").is_empty());
}

// ============================================================
// Pending watcher
// ============================================================

#[tokio::test]
async fn watcher_announces_each_entry_once() {
    let coordination = coordination(false);
    let cancel = CancellationToken::new();
    let mut rx = spawn_pending_watcher(coordination.clone(), "ws".into(), Duration::from_millis(10), cancel.clone());

    let task = coordination.hil.create("ws", None, "Approve", Duration::from_secs(60)).unwrap();
    coordination.hil.create("other", None, "Elsewhere", Duration::from_secs(60)).unwrap();

    let item = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(item, PendingItem::Hil(task.clone()));

    // Nothing else for this workspace shows up.
    assert!(tokio::time::timeout(Duration::from_millis(100), rx.recv()).await.is_err());
    cancel.cancel();
}
