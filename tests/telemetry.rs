use todolist_core::telemetry::init_tracing;

#[test]
fn test_subscriber_installs_once() {
    std::env::remove_var("RUST_LOG");

    assert!(init_tracing("todolist_core=debug").is_ok());
    // A global subscriber is already set
    assert!(init_tracing("todolist_core=debug").is_err());
}
