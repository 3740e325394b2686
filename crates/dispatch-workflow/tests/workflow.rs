use dispatch_workflow::{run_workflow, Step, WorkflowError, WorkflowRuntime, WorkflowStatus};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

async fn runtime() -> WorkflowRuntime {
    WorkflowRuntime::connect("sqlite::memory:").await.expect("connects")
}

#[tokio::test]
async fn do_step_short_circuits_on_replay() {
    let rt = runtime().await;
    let calls = Arc::new(AtomicU32::new(0));

    let body = |step: Step, _: ()| {
        let calls = calls.clone();
        async move {
            let value: u32 = step
                .do_step("increment", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await?;
            Ok::<_, WorkflowError>(value)
        }
    };

    let first = run_workflow(&rt, "wf-1", "test", (), body).await.unwrap();
    assert_eq!(first, 42);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Replay: same instance id, same step name — body function runs
    // again but the step's closure must not execute a second time.
    let body2 = |step: Step, _: ()| {
        let calls = calls.clone();
        async move {
            let value: u32 = step
                .do_step("increment", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await?;
            Ok::<_, WorkflowError>(value)
        }
    };
    let second = run_workflow(&rt, "wf-1", "test", (), body2).await.unwrap();
    assert_eq!(second, 42);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "replay must not re-run a completed step");
}

#[tokio::test]
async fn duplicate_step_name_in_one_run_is_rejected() {
    let rt = runtime().await;
    let body = |step: Step, _: ()| async move {
        step.do_step::<i32, _, _>("same", || async { Ok(1) }).await?;
        let err = step.do_step::<i32, _, _>("same", || async { Ok(2) }).await;
        match err {
            Err(WorkflowError::DuplicateStep(name)) => {
                assert_eq!(name, "same");
                Ok::<_, WorkflowError>(())
            }
            other => panic!("expected DuplicateStep, got {other:?}"),
        }
    };
    run_workflow(&rt, "wf-dup", "test", (), body).await.unwrap();
}

#[tokio::test]
async fn wait_for_event_returns_delivered_payload() {
    let rt = runtime().await;
    rt.send_event("wf-event", "approved", serde_json::json!({"ok": true})).await.unwrap();

    let body = |step: Step, _: ()| async move {
        let payload = step.wait_for_event("approved", Duration::from_secs(5)).await?;
        Ok::<_, WorkflowError>(payload)
    };
    let result = run_workflow(&rt, "wf-event", "test", (), body).await.unwrap();
    assert_eq!(result, serde_json::json!({"ok": true}));
}

#[tokio::test]
async fn wait_for_event_times_out() {
    let rt = runtime().await;
    let body = |step: Step, _: ()| async move {
        step.wait_for_event("never-comes", Duration::from_millis(100)).await?;
        Ok::<_, WorkflowError>(())
    };
    let err = run_workflow(&rt, "wf-timeout", "test", (), body).await.unwrap_err();
    assert!(matches!(err, WorkflowError::EventTimeout { .. }));
}

#[tokio::test]
async fn sleep_returns_once_wakeup_has_passed() {
    let rt = runtime().await;
    let body = |step: Step, _: ()| async move {
        step.sleep("pause", Duration::from_millis(50)).await?;
        Ok::<_, WorkflowError>(())
    };
    let start = std::time::Instant::now();
    run_workflow(&rt, "wf-sleep", "test", (), body).await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(40));
}

#[tokio::test]
async fn terminate_interrupts_a_waiting_instance() {
    let rt = runtime().await;
    let rt_clone = rt.clone();
    let handle = tokio::spawn(async move {
        let body = |step: Step, _: ()| async move {
            step.wait_for_event("human-approval", Duration::from_secs(30)).await?;
            Ok::<_, WorkflowError>(())
        };
        run_workflow(&rt_clone, "wf-terminate", "test", (), body).await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    rt.terminate("wf-terminate").await.unwrap();

    let result = handle.await.unwrap();
    assert!(matches!(result, Err(WorkflowError::Terminated)));
    assert_eq!(rt.status("wf-terminate").await.unwrap(), Some(WorkflowStatus::Failed));
}
