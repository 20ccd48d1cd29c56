use squadron::models::status::{StatusKind, WorkerStatus};
use squadron::worker::lifecycle::{LifecycleEvent, LifecycleState};

#[test]
fn happy_path_returns_to_ready() {
    let state = LifecycleState::Connecting
        .transition(LifecycleEvent::Connected)
        .expect("connected");
    assert_eq!(state, LifecycleState::Ready);

    let state = state.transition(LifecycleEvent::Dispatch).expect("dispatch");
    assert_eq!(state, LifecycleState::Executing);
    assert_eq!(state.status(), WorkerStatus::Executing);

    let state = state.transition(LifecycleEvent::Succeeded).expect("succeeded");
    assert_eq!(state, LifecycleState::Ready);
    assert_eq!(state.status(), WorkerStatus::Idle);
}

#[test]
fn failure_moves_to_error_which_still_accepts_commands() {
    let state = LifecycleState::Executing
        .transition(LifecycleEvent::Failed)
        .expect("failed");
    assert_eq!(state, LifecycleState::Error);
    assert_eq!(state.status(), WorkerStatus::Error);
    assert!(state.accepts_commands());
    assert_eq!(
        state.transition(LifecycleEvent::Dispatch).expect("dispatch"),
        LifecycleState::Executing
    );
}

#[test]
fn executing_rejects_a_second_dispatch() {
    let err = LifecycleState::Executing
        .transition(LifecycleEvent::Dispatch)
        .expect_err("busy");
    assert!(err.to_string().starts_with("invalid transition:"));
    assert!(!LifecycleState::Executing.accepts_commands());
}

#[test]
fn connecting_rejects_commands() {
    assert!(!LifecycleState::Connecting.accepts_commands());
    assert!(LifecycleState::Connecting
        .transition(LifecycleEvent::Dispatch)
        .is_err());
}

#[test]
fn death_returns_to_ready_from_any_live_state() {
    for state in [
        LifecycleState::Ready,
        LifecycleState::Executing,
        LifecycleState::Error,
    ] {
        assert_eq!(
            state.transition(LifecycleEvent::Died).expect("died"),
            LifecycleState::Ready
        );
    }
}

#[test]
fn connection_loss_then_shutdown_is_terminal() {
    let state = LifecycleState::Executing
        .transition(LifecycleEvent::ConnectionLost)
        .expect("lost");
    assert_eq!(state, LifecycleState::Disconnected);
    assert_eq!(state.status(), WorkerStatus::Shutdown);

    let state = state.transition(LifecycleEvent::Shutdown).expect("shutdown");
    assert_eq!(state, LifecycleState::Terminated);
    assert!(state.transition(LifecycleEvent::Shutdown).is_err());
    assert!(state.transition(LifecycleEvent::Connected).is_err());
}

#[test]
fn heartbeat_kind_mirrors_status() {
    assert_eq!(WorkerStatus::Idle.heartbeat_kind(), StatusKind::Ready);
    assert_eq!(WorkerStatus::Executing.heartbeat_kind(), StatusKind::Executing);
    assert_eq!(WorkerStatus::Error.heartbeat_kind(), StatusKind::Error);
    assert_eq!(WorkerStatus::Shutdown.heartbeat_kind(), StatusKind::Shutdown);
}
