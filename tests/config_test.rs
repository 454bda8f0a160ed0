use laneq::config::{Config, DEFAULT_EVENT_CAPACITY};

// Both cases touch the same process-wide variable, so they run as one test.
#[test]
fn config_from_env_reads_event_capacity() {
    unsafe {
        std::env::remove_var("LANEQ_EVENT_CAPACITY");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
    assert!(!config.log_level.is_empty());

    unsafe {
        std::env::set_var("LANEQ_EVENT_CAPACITY", "16");
    }
    assert_eq!(Config::from_env().unwrap().event_capacity, 16);

    unsafe {
        std::env::set_var("LANEQ_EVENT_CAPACITY", "0");
    }
    assert!(Config::from_env().is_err());

    unsafe {
        std::env::set_var("LANEQ_EVENT_CAPACITY", "lots");
    }
    assert!(Config::from_env().is_err());

    // Clean up
    unsafe {
        std::env::remove_var("LANEQ_EVENT_CAPACITY");
    }
}

#[test]
fn default_config_matches_documented_defaults() {
    let config = Config::default();
    assert_eq!(config.log_level, "info");
    assert!(config.otel_endpoint.is_none());
    assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
}
