use std::time::Duration;

use squadron::supervisor::policy::{decide, ExitDecision, ExitInfo, INTERRUPT_SIGNAL};

const FLOOR: Duration = Duration::from_secs(5);
const LONG_RUN: Duration = Duration::from_secs(60);

#[test]
fn crash_after_a_long_run_restarts() {
    let decision = decide(ExitInfo::exited(1), false, LONG_RUN, FLOOR);
    assert_eq!(decision, ExitDecision::Restart);
    assert!(decision.restarts());
}

#[test]
fn crash_within_the_floor_is_a_crash_loop() {
    let decision = decide(ExitInfo::exited(1), false, Duration::from_secs(2), FLOOR);
    assert_eq!(decision, ExitDecision::CrashLoop);
    assert!(!decision.restarts());
}

#[test]
fn the_floor_itself_is_not_a_crash_loop() {
    assert_eq!(
        decide(ExitInfo::exited(1), false, FLOOR, FLOOR),
        ExitDecision::Restart
    );
}

#[test]
fn clean_exit_is_not_restarted() {
    assert_eq!(
        decide(ExitInfo::exited(0), false, LONG_RUN, FLOOR),
        ExitDecision::Clean
    );
    assert_eq!(
        decide(ExitInfo::exited(0), false, Duration::ZERO, FLOOR),
        ExitDecision::Clean
    );
}

#[test]
fn codes_above_one_end_the_task() {
    for code in [2, 3, 127] {
        assert_eq!(
            decide(ExitInfo::exited(code), false, LONG_RUN, FLOOR),
            ExitDecision::TaskEnded
        );
    }
}

#[test]
fn task_end_wins_over_a_stop_request() {
    assert_eq!(
        decide(ExitInfo::exited(2), true, LONG_RUN, FLOOR),
        ExitDecision::TaskEnded
    );
}

#[test]
fn interrupt_signal_is_intentional() {
    let exit = ExitInfo::signalled(INTERRUPT_SIGNAL);
    assert!(exit.interrupted());
    assert_eq!(decide(exit, false, LONG_RUN, FLOOR), ExitDecision::Intentional);
}

#[test]
fn requested_stop_is_intentional_even_on_crash_code() {
    assert_eq!(
        decide(ExitInfo::exited(1), true, Duration::from_millis(10), FLOOR),
        ExitDecision::Intentional
    );
}

#[test]
fn other_signals_count_as_crashes() {
    let killed = ExitInfo::signalled(9);
    assert!(!killed.interrupted());
    assert_eq!(decide(killed, false, LONG_RUN, FLOOR), ExitDecision::Restart);
    assert_eq!(
        decide(killed, false, Duration::from_secs(1), FLOOR),
        ExitDecision::CrashLoop
    );
}

#[test]
fn exit_info_display() {
    assert_eq!(ExitInfo::exited(1).to_string(), "code 1");
    assert_eq!(ExitInfo::signalled(2).to_string(), "signal 2");
    assert_eq!(ExitInfo::default().to_string(), "unknown status");
}
