use squadron::models::disconnect::WorkerSettings;
use squadron::models::identity::{validate_name, AgentIdentity, Role};
use squadron::AppError;

#[test]
fn accepts_names_at_both_length_bounds() {
    assert!(validate_name("abc").is_ok());
    assert!(validate_name("a_very_long_name").is_ok());
    assert!(validate_name("Worker_01").is_ok());
}

#[test]
fn rejects_short_and_long_names() {
    assert!(validate_name("ab").is_err());
    assert!(validate_name("seventeen_chars_x").is_err());
}

#[test]
fn rejects_punctuation_and_spaces() {
    for name in ["has space", "dash-name", "dot.name", "émile"] {
        let err = validate_name(name).expect_err(name);
        assert!(matches!(err, AppError::Identity(_)));
        assert!(err.to_string().contains("3-16 characters"));
    }
}

#[test]
fn empty_name_has_its_own_message() {
    let err = validate_name("   ").expect_err("blank");
    assert_eq!(err.to_string(), "identity: name must not be empty");
}

#[test]
fn leader_identity_has_no_leader() {
    let identity = AgentIdentity::leader("captain").expect("valid");
    assert_eq!(identity.name(), "captain");
    assert_eq!(identity.leader_name(), None);
    assert_eq!(identity.role(), Role::Leader);
}

#[test]
fn worker_identity_records_its_leader() {
    let identity = AgentIdentity::worker("alpha", "captain").expect("valid");
    assert_eq!(identity.name(), "alpha");
    assert_eq!(identity.leader_name(), Some("captain"));
    assert_eq!(identity.role(), Role::Worker);
}

#[test]
fn worker_identity_validates_the_leader_name() {
    assert!(AgentIdentity::worker("alpha", "x").is_err());
    assert!(AgentIdentity::worker("a", "captain").is_err());
}

#[test]
fn identity_and_settings_serialize_with_field_names() {
    let identity = AgentIdentity::worker("alpha", "captain").expect("identity");
    assert_eq!(
        serde_json::to_value(&identity).expect("json"),
        serde_json::json!({ "name": "alpha", "leader": "captain", "role": "worker" })
    );

    let mut settings = WorkerSettings::new("alpha", "captain");
    settings.count_id = 2;
    assert_eq!(
        serde_json::to_value(&settings).expect("json"),
        serde_json::json!({
            "name": "alpha",
            "leader": "captain",
            "count_id": 2,
            "init_message": null,
        })
    );
}
