//! End-to-end engine tests
//!
//! Loads configuration from disk, starts background refresh against an
//! in-memory source and checks decisions as the table changes.

use brokerguard_authz::{
    AclEngine, AclRow, Action, AuthorizationResult, AuthzConfig, AuthzError, InMemoryAclSource,
    Operation, PatternType, ResourcePattern, ResourceType,
};
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

const CONFIG: &str = r#"
super_users = "admin; ops-bot ;"

[acl]
table = "kafka_acl"
sync_interval_secs = 1

[acl.columns]
user_pattern = "principal_pattern"
resource_type = "res_type"
resource_pattern = "res_pattern"
operation = "ops"
"#;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn topic(name: &str, op: Operation) -> Action {
    Action::literal(ResourceType::Topic, name, op)
}

async fn wait_for_generation(engine: &AclEngine, generation: u64) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while engine.current_rules().generation() < generation {
        assert!(Instant::now() < deadline, "rules never reached generation {}", generation);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_engine_from_config_file() {
    let file = write_config(CONFIG);
    let config = AuthzConfig::load(file.path()).unwrap();

    let source = Arc::new(InMemoryAclSource::with_rules(vec![
        AclRow::new("alice*", "TOPIC", "orders-*", "WRITE"),
        AclRow::new("*", "GROUP", "consumers-*", "READ"),
    ]));
    let engine = AclEngine::new(&config, source).unwrap();

    // nothing loaded before start
    assert_eq!(engine.decide("alice1", &topic("orders-1", Operation::Write)).unwrap(), AuthorizationResult::Denied);
    assert!(engine.decide("ops-bot", &topic("orders-1", Operation::Write)).unwrap().is_allowed());

    engine.start();
    assert!(engine.is_running());
    wait_for_generation(&engine, 1).await;

    assert!(engine.decide("alice1", &topic("orders-1", Operation::Write)).unwrap().is_allowed());
    assert!(engine
        .decide("anyone", &Action::literal(ResourceType::Group, "consumers-a", Operation::Describe))
        .unwrap()
        .is_allowed());

    engine.stop().await;
    assert!(!engine.is_running());
}

#[tokio::test]
async fn test_rule_changes_visible_after_refresh() {
    let config = AuthzConfig::from_toml_str(CONFIG).unwrap();
    let source = Arc::new(InMemoryAclSource::with_rules(vec![AclRow::new(
        "alice", "TOPIC", "t", "READ",
    )]));
    let engine = AclEngine::new(&config, source.clone()).unwrap();
    engine.start();
    wait_for_generation(&engine, 1).await;
    assert!(engine.decide("alice", &topic("t", Operation::Read)).unwrap().is_allowed());

    source.set_rules(vec![AclRow::new("bob", "TOPIC", "t", "READ")]);
    let generation = engine.refresh_rules().await.unwrap();
    assert!(generation >= 2);

    assert!(!engine.decide("alice", &topic("t", Operation::Read)).unwrap().is_allowed());
    assert!(engine.decide("bob", &topic("t", Operation::Read)).unwrap().is_allowed());

    engine.stop().await;
}

#[tokio::test]
async fn test_refresh_stats_track_cycles() {
    let config = AuthzConfig::from_toml_str(CONFIG).unwrap();
    let source = Arc::new(InMemoryAclSource::new());
    let engine = AclEngine::new(&config, source.clone()).unwrap();

    engine.refresh_rules().await.unwrap();
    source.fail_with("timeout");
    assert!(engine.refresh_rules().await.is_err());

    let stats = engine.refresh_stats();
    assert_eq!(stats.rules.succeeded, 1);
    assert_eq!(stats.rules.failed, 1);
    assert!(stats.rules.last_success.is_some());
    assert_eq!(stats.credentials.succeeded, 0);
}

// ============================================================================
// BATCH AUTHORIZATION
// ============================================================================

#[tokio::test]
async fn test_batch_results_follow_request_order() {
    let config = AuthzConfig::from_toml_str(CONFIG).unwrap();
    let source = Arc::new(InMemoryAclSource::with_rules(vec![AclRow::new(
        "alice", "TOPIC", "orders-*", "READ,WRITE",
    )]));
    let engine = AclEngine::new(&config, source).unwrap();
    engine.refresh_rules().await.unwrap();

    let actions = vec![
        topic("orders-1", Operation::Read),
        topic("payments", Operation::Read),
        Action::literal(ResourceType::Cluster, "kafka-cluster", Operation::Create),
        Action::literal(ResourceType::TransactionalId, "tx-1", Operation::Write),
        topic("orders-1", Operation::Describe),
    ];
    let results = engine.authorize("alice", &actions).unwrap();

    use AuthorizationResult::{Allowed, Denied};
    assert_eq!(results, vec![Allowed, Denied, Denied, Allowed, Allowed]);
    assert!(engine.authorize("alice", &[]).unwrap().is_empty());
}

#[tokio::test]
async fn test_batch_with_prefixed_pattern_fails() {
    let config = AuthzConfig::from_toml_str(CONFIG).unwrap();
    let engine = AclEngine::new(&config, Arc::new(InMemoryAclSource::new())).unwrap();

    let actions = vec![
        topic("orders-1", Operation::Read),
        Action::new(
            ResourcePattern {
                resource_type: ResourceType::Topic,
                name: "orders-".to_string(),
                pattern_type: PatternType::Prefixed,
            },
            Operation::Read,
        ),
    ];

    // rejected even for a super user
    let err = engine.authorize("admin", &actions).unwrap_err();
    assert!(matches!(err, AuthzError::UnsupportedPatternType(PatternType::Prefixed)));
    assert_eq!(err.to_string(), "Only literal resources are supported. Got: PREFIXED");
}

// ============================================================================
// CONFIGURATION ERRORS
// ============================================================================

#[test]
fn test_missing_acl_column_is_rejected() {
    let config = AuthzConfig::from_toml_str(
        r#"
        [acl]
        table = "kafka_acl"
        [acl.columns]
        user_pattern = "u"
        resource_type = "t"
        resource_pattern = "p"
        "#,
    )
    .unwrap();

    match AclEngine::new(&config, Arc::new(InMemoryAclSource::new())) {
        Err(AuthzError::Configuration(msg)) => assert!(msg.contains("acl.columns.operation")),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("engine built without an operation column"),
    }
}

#[test]
fn test_db_auth_requires_user_table() {
    let mut config = AuthzConfig::from_toml_str(CONFIG).unwrap();
    config.authentication.enable_db_auth = true;

    let result = AclEngine::new(&config, Arc::new(InMemoryAclSource::new()));
    assert!(matches!(result, Err(AuthzError::Configuration(ref m)) if m.contains("authentication.user_table")));
}

#[test]
fn test_unreadable_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = AuthzConfig::load(dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, AuthzError::Io(_)));
}

#[test]
fn test_malformed_config_file() {
    let file = write_config("[acl\ntable = ");
    let err = AuthzConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, AuthzError::Configuration(_)));
}

#[test]
fn test_super_users_parsed_from_file() {
    let file = write_config(CONFIG);
    let config = AuthzConfig::load(file.path()).unwrap();
    let super_users = config.super_user_set();

    assert_eq!(super_users.len(), 2);
    assert!(super_users.contains("admin"));
    assert!(super_users.contains("ops-bot"));
}
