use std::time::Duration;

use serde_json::json;

use squadron::models::command::{Query, SkillCall};
use squadron::models::identity::AgentIdentity;
use squadron::runtime::ActionContext;
use squadron::skills::dry_run::{DryRunSkills, DryRunWorld};
use squadron::skills::{SkillLibrary, WorldConnector};
use squadron::AppError;

const STEP: Duration = Duration::from_millis(50);

fn collect(block_type: &str, num: u32) -> SkillCall {
    SkillCall::CollectBlock {
        block_type: block_type.into(),
        num,
    }
}

#[tokio::test(start_paused = true)]
async fn collected_blocks_land_in_the_inventory() {
    let skills = DryRunSkills::new(STEP);
    let ctx = ActionContext::detached();

    let result = skills.invoke(&collect("oak_log", 3), ctx.clone()).await.expect("collect");
    assert_eq!(result, json!("Collected 3 oak_log"));
    assert_eq!(ctx.latest(), json!({ "progress": 3, "of": 3 }));

    let inventory = skills.query(Query::Inventory).expect("inventory");
    assert_eq!(inventory, json!([{ "name": "oak_log", "count": 3 }]));
}

#[tokio::test(start_paused = true)]
async fn giving_more_than_held_fails() {
    let skills = DryRunSkills::new(STEP);
    let give = SkillCall::GiveToPlayer {
        item_name: "bread".into(),
        player_name: "steve".into(),
        num: 2,
    };

    let err = skills
        .invoke(&give, ActionContext::detached())
        .await
        .expect_err("empty inventory");
    assert!(matches!(err, AppError::Skill(_)));
    assert_eq!(err.to_string(), "skill: not enough bread: have 0, need 2");
}

#[tokio::test(start_paused = true)]
async fn cancelled_work_stops_at_a_safe_point() {
    let skills = DryRunSkills::new(STEP);
    let ctx = ActionContext::detached();
    ctx.token().cancel();

    let err = skills
        .invoke(&collect("dirt", 10), ctx)
        .await
        .expect_err("cancelled");
    assert!(matches!(err, AppError::Interrupted(_)));
    assert_eq!(skills.query(Query::Inventory).expect("inventory"), json!([]));
}

#[tokio::test(start_paused = true)]
async fn movement_updates_position() {
    let skills = DryRunSkills::new(STEP);
    let go = SkillCall::GoToPosition {
        x: 12.5,
        y: 70.0,
        z: -8.0,
        closeness: 2.0,
    };
    skills.invoke(&go, ActionContext::detached()).await.expect("move");

    assert_eq!(
        skills.query(Query::Position).expect("position"),
        json!({ "x": 12.5, "y": 70.0, "z": -8.0 })
    );
    let vitals = skills.vitals();
    let position = vitals.position.expect("spawned");
    assert_eq!((position.x, position.y, position.z), (12, 70, -8));
}

#[test]
fn fresh_avatar_is_healthy() {
    let skills = DryRunSkills::new(STEP);
    assert_eq!(
        skills.query(Query::Health).expect("health"),
        json!({ "health": 20.0, "food": 20.0 })
    );
}

#[tokio::test]
async fn world_hands_out_an_open_event_stream() {
    let world = DryRunWorld::new(STEP);
    let identity = AgentIdentity::worker("alpha", "captain").expect("identity");
    let mut session = world.connect(&identity).await.expect("connect");

    assert!(matches!(
        session.events.try_recv(),
        Err(tokio::sync::mpsc::error::TryRecvError::Empty)
    ));
}
