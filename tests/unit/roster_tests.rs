use std::time::Duration;

use squadron::leader::roster::Roster;
use squadron::models::status::{Position, StatusKind, StatusReport, Vitals};

fn report(worker: &str, kind: StatusKind, message: &str) -> StatusReport {
    let vitals = Vitals {
        position: Some(Position::floor(10.7, 64.0, -3.2)),
        health: 18.0,
        food: 15.0,
    };
    StatusReport::new(worker, "captain", kind, message, vitals)
}

#[tokio::test(start_paused = true)]
async fn latest_report_wins() {
    let roster = Roster::new(Duration::from_secs(15));
    roster.record(report("alpha", StatusKind::Executing, "Started: collectBlock"));
    roster.record(report("alpha", StatusKind::Completed, "Completed: collectBlock"));

    let latest = roster.latest("alpha").expect("known worker");
    assert_eq!(latest.status, StatusKind::Completed);

    let views = roster.views();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].name, "alpha");
    assert_eq!(views[0].message, "Completed: collectBlock");
    assert_eq!(views[0].position, Some(Position { x: 10, y: 64, z: -4 }));
    assert!(!views[0].stale);
}

#[tokio::test(start_paused = true)]
async fn silent_worker_turns_stale() {
    let roster = Roster::new(Duration::from_secs(15));
    roster.record(report("alpha", StatusKind::Ready, "Heartbeat"));
    roster.record(report("bravo", StatusKind::Ready, "Heartbeat"));

    tokio::time::advance(Duration::from_secs(10)).await;
    roster.record(report("bravo", StatusKind::Ready, "Heartbeat"));
    tokio::time::advance(Duration::from_secs(6)).await;

    assert_eq!(roster.stale_workers(), vec!["alpha"]);
    let alpha = roster
        .views()
        .into_iter()
        .find(|view| view.name == "alpha")
        .expect("alpha");
    assert!(alpha.last_seen_ms >= 16_000);
}

#[tokio::test(start_paused = true)]
async fn removed_worker_disappears() {
    let roster = Roster::new(Duration::from_secs(15));
    roster.record(report("alpha", StatusKind::Ready, "Ready!"));
    roster.remove("alpha");
    assert!(roster.latest("alpha").is_none());
    assert!(roster.views().is_empty());
}
