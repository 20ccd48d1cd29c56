use squadron::supervisor::ProcessRegistry;

#[test]
fn register_and_lookup() {
    let registry = ProcessRegistry::new();
    registry.register("bravo", Some(200));
    registry.register("alpha", Some(100));

    assert_eq!(registry.pid("alpha"), Some(100));
    assert!(registry.contains("bravo"));
    assert_eq!(registry.names(), vec!["alpha", "bravo"]);
}

#[test]
fn deregister_ignores_a_stale_pid() {
    let registry = ProcessRegistry::new();
    registry.register("alpha", Some(100));
    registry.register("alpha", Some(101));

    registry.deregister("alpha", Some(100));
    assert_eq!(registry.pid("alpha"), Some(101));

    registry.deregister("alpha", Some(101));
    assert!(!registry.contains("alpha"));
}

#[test]
fn unknown_pid_is_still_tracked() {
    let registry = ProcessRegistry::new();
    registry.register("alpha", None);
    assert!(registry.contains("alpha"));
    assert_eq!(registry.pid("alpha"), None);
    registry.deregister("alpha", None);
    assert!(registry.names().is_empty());
}
