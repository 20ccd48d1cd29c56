//! Unit tests for the single-flight action runtime.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use squadron::runtime::{Action, ActionContext, ActionRuntime};
use squadron::AppError;

fn long_action(label: &str) -> Action {
    Action::new(label, |ctx: ActionContext| async move {
        ctx.report(json!("working"));
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(json!("finished"))
    })
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn completed_action_returns_its_value() {
    let runtime = ActionRuntime::new("alpha");
    let outcome = runtime
        .run_action(Action::new("action:quick", |_ctx| async { Ok(json!(42)) }))
        .await;

    assert!(outcome.success);
    assert!(!outcome.interrupted);
    assert!(!outcome.timedout);
    assert_eq!(outcome.message, json!(42));
    assert!(runtime.is_idle());
    assert!(!runtime.is_executing());
}

#[tokio::test(start_paused = true)]
async fn failed_action_returns_error_text() {
    let runtime = ActionRuntime::new("alpha");
    let outcome = runtime
        .run_action(Action::new("action:broken", |_ctx| async {
            Err(AppError::Skill("no path".into()))
        }))
        .await;

    assert!(!outcome.success);
    assert!(!outcome.interrupted);
    assert_eq!(outcome.message, json!("skill: no path"));
}

/// A timeout reports interrupted and timed out, carrying the latest progress.
#[tokio::test(start_paused = true)]
async fn timeout_reports_latest_progress() {
    let runtime = ActionRuntime::new("alpha");
    let action = Action::new("action:slow", |ctx: ActionContext| async move {
        ctx.report(json!("halfway there"));
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(json!("done"))
    })
    .with_timeout(Some(Duration::from_secs(1)));

    let outcome = runtime.run_action(action).await;

    assert!(!outcome.success);
    assert!(outcome.interrupted);
    assert!(outcome.timedout);
    assert!(!outcome.is_silent_cancel());
    assert_eq!(outcome.message, json!("halfway there"));
}

#[test]
fn zero_timeout_disables_the_deadline() {
    let action = long_action("action:x").with_timeout(Some(Duration::ZERO));
    assert_eq!(action.timeout(), None);
    assert_eq!(action.label(), "action:x");
}

/// A newer request interrupts the running action, which returns silently.
#[tokio::test(start_paused = true)]
async fn newer_request_interrupts_running_action() {
    let runtime = Arc::new(ActionRuntime::new("alpha"));

    let first = {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move { runtime.run_action(long_action("action:first")).await })
    };
    settle().await;
    assert_eq!(runtime.current_label().as_deref(), Some("action:first"));

    let second = runtime
        .run_action(Action::new("action:second", |_ctx| async { Ok(json!("second")) }))
        .await;
    assert!(second.success);
    assert_eq!(second.message, json!("second"));

    let first = first.await.expect("join");
    assert!(first.interrupted);
    assert!(!first.timedout);
    assert!(first.is_silent_cancel());
    assert_eq!(first.message, json!("working"));
    assert!(runtime.is_idle());
}

/// When several requests queue up behind a running action only the newest runs.
#[tokio::test(start_paused = true)]
async fn only_the_newest_of_overlapping_requests_runs() {
    let runtime = Arc::new(ActionRuntime::new("alpha"));
    let runs = Arc::new(AtomicU32::new(0));

    let counting = |label: &'static str| {
        let runs = Arc::clone(&runs);
        Action::new(label, move |_ctx| {
            let runs = Arc::clone(&runs);
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(json!(label))
            }
        })
    };

    let blocker = {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move { runtime.run_action(long_action("action:blocker")).await })
    };
    settle().await;

    let (a, b, c) = tokio::join!(
        runtime.run_action(counting("action:a")),
        runtime.run_action(counting("action:b")),
        runtime.run_action(counting("action:c")),
    );

    assert!(a.interrupted && !a.timedout);
    assert!(b.interrupted && !b.timedout);
    assert!(c.success);
    assert_eq!(c.message, json!("action:c"));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(blocker.await.expect("join").interrupted);
}

#[tokio::test(start_paused = true)]
async fn stop_waits_for_the_running_action() {
    let runtime = Arc::new(ActionRuntime::new("alpha"));
    let running = {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move { runtime.run_action(long_action("action:long")).await })
    };
    settle().await;
    assert!(runtime.is_executing());

    runtime.stop().await;

    assert!(!runtime.is_executing());
    let outcome = running.await.expect("join");
    assert!(outcome.is_silent_cancel());
}

#[tokio::test(start_paused = true)]
async fn stop_without_running_action_returns_immediately() {
    let runtime = ActionRuntime::new("alpha");
    runtime.stop().await;
    assert!(runtime.is_idle());
}

#[tokio::test(start_paused = true)]
async fn checkpoint_bails_out_once_cancelled() {
    let runtime = Arc::new(ActionRuntime::new("alpha"));
    let action = Action::new("action:steps", |ctx: ActionContext| async move {
        while ctx.checkpoint().is_ok() {
            tokio::task::yield_now().await;
        }
        Err(AppError::Interrupted("stopped at checkpoint".into()))
    });
    let running = {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move { runtime.run_action(action).await })
    };
    settle().await;
    runtime.stop().await;
    assert!(running.await.expect("join").interrupted);
}

/// An interrupted resumable action stays the resume candidate and is restarted
/// by `try_resume` once nothing else is in flight.
#[tokio::test(start_paused = true)]
async fn interrupted_resumable_action_is_resumed() {
    let runtime = Arc::new(ActionRuntime::new("alpha"));
    let follow = long_action("action:followPlayer").resumable(true);

    let running = {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move { runtime.run_action(follow).await })
    };
    settle().await;
    assert!(!runtime.try_resume(), "nothing resumes while busy");

    let quick = runtime
        .run_action(Action::new("action:quick", |_ctx| async { Ok(json!("ok")) }))
        .await;
    assert!(quick.success);
    assert!(running.await.expect("join").interrupted);
    assert_eq!(runtime.resume_label().as_deref(), Some("action:followPlayer"));

    assert!(runtime.try_resume());
    settle().await;
    assert_eq!(runtime.current_label().as_deref(), Some("action:followPlayer"));

    runtime.cancel_resume();
    runtime.stop().await;
    settle().await;
    assert_eq!(runtime.resume_label(), None);
    assert!(!runtime.try_resume());
}

#[tokio::test(start_paused = true)]
async fn finished_resumable_action_is_forgotten() {
    let runtime = Arc::new(ActionRuntime::new("alpha"));
    let action = Action::new("action:followPlayer", |_ctx| async { Ok(json!("arrived")) }).resumable(true);

    assert!(runtime.run_action(action).await.success);
    assert_eq!(runtime.resume_label(), None);
    assert!(!runtime.try_resume());
}

#[tokio::test(start_paused = true)]
async fn timed_out_resumable_action_is_not_resumed() {
    let runtime = Arc::new(ActionRuntime::new("alpha"));
    let follow = long_action("action:followPlayer")
        .resumable(true)
        .with_timeout(Some(Duration::from_secs(5)));

    let outcome = runtime.run_action(follow).await;

    assert!(outcome.interrupted);
    assert!(outcome.timedout);
    assert_eq!(runtime.resume_label(), None);
    assert!(!runtime.try_resume());
    assert_eq!(runtime.current_label(), None);
}

#[tokio::test(start_paused = true)]
async fn failure_drops_the_resume_candidate() {
    let runtime = Arc::new(ActionRuntime::new("alpha"));
    let follow = long_action("action:followPlayer").resumable(true);
    let running = {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move { runtime.run_action(follow).await })
    };
    settle().await;

    let failed = runtime
        .run_action(Action::new("action:broken", |_ctx| async {
            Err(AppError::Skill("stuck".into()))
        }))
        .await;
    assert!(!failed.success);
    running.await.expect("join");
    assert_eq!(runtime.resume_label(), None);
}

#[test]
fn detached_context_is_never_interrupted() {
    let ctx = ActionContext::detached();
    assert!(!ctx.is_interrupted());
    assert!(ctx.checkpoint().is_ok());
    ctx.report("step 1");
    assert_eq!(ctx.latest(), json!("step 1"));
    ctx.token().cancel();
    assert!(matches!(ctx.checkpoint(), Err(AppError::Interrupted(_))));
}
