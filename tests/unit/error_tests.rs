use squadron::AppError;

#[test]
fn display_prefixes_each_kind() {
    let cases = [
        (AppError::Config("x".into()), "config: x"),
        (AppError::Identity("x".into()), "identity: x"),
        (AppError::Connection("x".into()), "connection: x"),
        (AppError::Transport("x".into()), "transport: x"),
        (AppError::Process("x".into()), "process: x"),
        (AppError::Skill("x".into()), "skill: x"),
        (AppError::InvalidArgs("x".into()), "invalid args: x"),
        (AppError::InvalidTransition("x".into()), "invalid transition: x"),
        (AppError::NotFound("x".into()), "not found: x"),
        (AppError::Interrupted("x".into()), "interrupted: x"),
        (AppError::Io("x".into()), "io: x"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn unknown_command_names_the_command() {
    let err = AppError::UnknownCommand("danceParty".into());
    assert_eq!(err.to_string(), "unknown command: danceParty");
}

#[test]
fn messages_have_no_trailing_period() {
    let err = AppError::Skill("not enough oak_log: have 1, need 3".into());
    assert!(!err.to_string().ends_with('.'));
}

#[test]
fn json_error_maps_to_transport() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").expect_err("must fail");
    let err = AppError::from(json_err);
    assert!(matches!(err, AppError::Transport(_)));
    assert!(err.to_string().starts_with("transport: malformed frame:"));
}

#[test]
fn io_error_maps_to_io() {
    let err = AppError::from(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe"));
    assert!(matches!(err, AppError::Io(_)));
    assert_eq!(err.to_string(), "io: pipe");
}

#[test]
fn implements_std_error() {
    fn takes_error(_: &dyn std::error::Error) {}
    takes_error(&AppError::NotFound("worker".into()));
}
