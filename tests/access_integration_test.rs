// Access-layer integration tests
// End-to-end lifecycle scenarios with numbered test IDs

use std::fs;
use std::sync::Once;

use arbordb::{
    DatabaseConfiguration, DatabaseType, DbError, Environment, ResourceConfiguration, User,
};

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

fn fresh_env() -> Environment {
    init_tracing();
    Environment::new()
}

// ACCESS-001: Create + open + list
#[test]
fn access_001_create_open_list() {
    let env = fresh_env();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("demo");
    let config = DatabaseConfiguration::new(&db_path, DatabaseType::Xml);

    assert!(env.create_database(&config).unwrap());
    assert!(env.exists_database(&db_path));

    let db = env.open_database(&db_path, User::new("tester")).unwrap();
    assert_eq!(db.get_name(), "demo");
    assert!(db.is_open());
    assert!(db.list_resources().unwrap().is_empty());
    db.close().unwrap();
    println!("✓ ACCESS-001: Create + open + list - PASSED");
}

// ACCESS-002: create_database refuses an existing directory untouched
#[test]
fn access_002_create_refuses_existing_directory() {
    let env = fresh_env();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("demo");
    fs::create_dir_all(db_path.join("keep")).unwrap();
    fs::write(db_path.join("keep").join("marker"), b"untouched").unwrap();

    let config = DatabaseConfiguration::new(&db_path, DatabaseType::Json);
    assert!(!env.create_database(&config).unwrap());
    assert_eq!(
        fs::read(db_path.join("keep").join("marker")).unwrap(),
        b"untouched"
    );
    println!("✓ ACCESS-002: create refuses existing directory - PASSED");
}

// ACCESS-003: Resource lifecycle with monotonic IDs
#[test]
fn access_003_resource_lifecycle() {
    let env = fresh_env();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("demo");
    env.create_database(&DatabaseConfiguration::new(&db_path, DatabaseType::Xml))
        .unwrap();
    let db = env.open_database(&db_path, User::default()).unwrap();

    assert!(db.create_resource(ResourceConfiguration::new("doc1")).unwrap());
    assert!(db.exists_resource("doc1").unwrap());
    assert_eq!(db.get_resource_id("doc1").unwrap(), 0);
    assert_eq!(db.get_resource_name(0).unwrap(), "doc1");

    assert!(db.create_resource(ResourceConfiguration::new("doc2")).unwrap());
    assert_eq!(db.get_resource_id("doc2").unwrap(), 1);
    assert_eq!(db.list_resources().unwrap(), vec!["doc1", "doc2"]);

    // Creating an existing resource is refused without touching it.
    assert!(!db.create_resource(ResourceConfiguration::new("doc1")).unwrap());

    db.remove_resource("doc1").unwrap();
    assert!(!db.exists_resource("doc1").unwrap());
    assert_eq!(db.get_resource_id("doc2").unwrap(), 1);
    assert!(matches!(db.get_resource_id("doc1"), Err(DbError::Usage(_))));

    db.close().unwrap();
    println!("✓ ACCESS-003: Resource lifecycle - PASSED");
}

// ACCESS-004: IDs are never reused after removal
#[test]
fn access_004_ids_are_monotonic_across_recreate() {
    let env = fresh_env();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("demo");
    env.create_database(&DatabaseConfiguration::new(&db_path, DatabaseType::Json))
        .unwrap();
    let db = env.open_database(&db_path, User::default()).unwrap();

    assert!(db.create_resource(ResourceConfiguration::new("a")).unwrap());
    assert_eq!(db.get_resource_id("a").unwrap(), 0);
    db.remove_resource("a").unwrap();
    assert!(db.create_resource(ResourceConfiguration::new("a")).unwrap());
    assert_eq!(db.get_resource_id("a").unwrap(), 1);

    db.close().unwrap();
    println!("✓ ACCESS-004: Monotonic resource IDs - PASSED");
}

// ACCESS-005: Round trip close and re-open preserves the resource list
#[test]
fn access_005_reopen_preserves_resources() {
    let env = fresh_env();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("demo");
    env.create_database(&DatabaseConfiguration::new(&db_path, DatabaseType::Xml))
        .unwrap();

    {
        let db = env.open_database(&db_path, User::default()).unwrap();
        db.create_resource(ResourceConfiguration::new("books")).unwrap();
        db.create_resource(ResourceConfiguration::new("authors"))
            .unwrap();
        db.close().unwrap();
    }

    let db = env.open_database(&db_path, User::default()).unwrap();
    assert_eq!(db.list_resources().unwrap(), vec!["authors", "books"]);
    assert_eq!(db.get_resource_id("books").unwrap(), 0);
    assert_eq!(db.get_resource_name(1).unwrap(), "authors");
    db.close().unwrap();
    println!("✓ ACCESS-005: Re-open preserves resources - PASSED");
}

// ACCESS-006: close is idempotent and flips every operation to StateError
#[test]
fn access_006_close_idempotent_and_fail_fast() {
    let env = fresh_env();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("demo");
    env.create_database(&DatabaseConfiguration::new(&db_path, DatabaseType::Xml))
        .unwrap();
    let db = env.open_database(&db_path, User::default()).unwrap();

    db.close().unwrap();
    db.close().unwrap();
    assert!(!db.is_open());
    assert!(matches!(db.list_resources(), Err(DbError::State(_))));
    assert!(matches!(db.exists_resource("x"), Err(DbError::State(_))));
    assert!(matches!(
        db.create_resource(ResourceConfiguration::new("x")),
        Err(DbError::State(_))
    ));
    assert!(matches!(
        db.begin_resource_session("x"),
        Err(DbError::State(_))
    ));
    println!("✓ ACCESS-006: Idempotent close - PASSED");
}

// ACCESS-007: opening a missing database or resource is a usage error
#[test]
fn access_007_usage_errors_on_missing_targets() {
    let env = fresh_env();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nope");

    assert!(!env.exists_database(&db_path));
    assert!(matches!(
        env.open_database(&db_path, User::default()),
        Err(DbError::Usage(_))
    ));

    env.create_database(&DatabaseConfiguration::new(&db_path, DatabaseType::Xml))
        .unwrap();
    let db = env.open_database(&db_path, User::default()).unwrap();
    assert!(matches!(
        db.begin_resource_session("ghost"),
        Err(DbError::Usage(_))
    ));
    assert!(matches!(
        db.remove_resource("ghost"),
        Err(DbError::Usage(_))
    ));
    db.close().unwrap();
    println!("✓ ACCESS-007: Usage errors on missing targets - PASSED");
}

// ACCESS-008: lock file lifecycle across open and close
#[test]
fn access_008_lock_file_lifecycle() {
    let env = fresh_env();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("demo");
    env.create_database(&DatabaseConfiguration::new(&db_path, DatabaseType::Json))
        .unwrap();

    let lock_file = db_path.join("lock");
    assert!(!lock_file.exists());
    let db = env.open_database(&db_path, User::default()).unwrap();
    assert!(lock_file.exists());
    db.close().unwrap();
    assert!(!lock_file.exists());
    println!("✓ ACCESS-008: Lock file lifecycle - PASSED");
}

// ACCESS-009: truncate refuses while a handle is open, removes afterwards
#[test]
fn access_009_truncate_semantics() {
    let env = fresh_env();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("demo");
    env.create_database(&DatabaseConfiguration::new(&db_path, DatabaseType::Xml))
        .unwrap();
    let db = env.open_database(&db_path, User::default()).unwrap();

    assert!(!env.truncate_database(&db_path).unwrap());
    assert!(db_path.exists());

    db.close().unwrap();
    assert!(env.truncate_database(&db_path).unwrap());
    assert!(!db_path.exists());
    assert!(!env.truncate_database(&db_path).unwrap());
    println!("✓ ACCESS-009: Truncate semantics - PASSED");
}

// ACCESS-010: a second open returns the same shared handle
#[test]
fn access_010_second_open_returns_same_handle() {
    let env = fresh_env();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("demo");
    env.create_database(&DatabaseConfiguration::new(&db_path, DatabaseType::Xml))
        .unwrap();

    let first = env.open_database(&db_path, User::default()).unwrap();
    let second = env.open_database(&db_path, User::default()).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));

    first.close().unwrap();
    println!("✓ ACCESS-010: Second open shares the handle - PASSED");
}

// ACCESS-011: a foreign (or stale) lock file refuses the open
#[test]
fn access_011_foreign_lock_refusal() {
    let env = fresh_env();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("demo");
    env.create_database(&DatabaseConfiguration::new(&db_path, DatabaseType::Xml))
        .unwrap();

    {
        let db = env.open_database(&db_path, User::default()).unwrap();
        db.close().unwrap();
    }
    // Simulate a crashed prior run (or a foreign process).
    fs::write(db_path.join("lock"), b"").unwrap();

    let err = env.open_database(&db_path, User::default()).unwrap_err();
    assert!(matches!(err, DbError::Usage(_)));
    // The foreign lock is left in place for the operator.
    assert!(db_path.join("lock").exists());

    fs::remove_file(db_path.join("lock")).unwrap();
    let db = env.open_database(&db_path, User::default()).unwrap();
    db.close().unwrap();
    println!("✓ ACCESS-011: Foreign lock refusal - PASSED");
}

// ACCESS-012: crash-safe create cleans up the partial substructure
#[test]
fn access_012_crash_safe_create() {
    let env = fresh_env();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("demo");
    env.create_database(&DatabaseConfiguration::new(&db_path, DatabaseType::Xml))
        .unwrap();
    let db = env.open_database(&db_path, User::default()).unwrap();

    // An embedded NUL makes the inner mkdir fail after validation.
    let result = db.create_resource(ResourceConfiguration::new("doc\u{0}x"));
    assert!(result.is_err());
    assert!(db.list_resources().unwrap().is_empty());

    // The failure consumed nothing: the next resource still gets ID 0.
    assert!(db.create_resource(ResourceConfiguration::new("docX")).unwrap());
    assert_eq!(db.get_resource_id("docX").unwrap(), 0);

    db.close().unwrap();
    println!("✓ ACCESS-012: Crash-safe create - PASSED");
}

// ACCESS-013: database structure check rejects half-built directories
#[test]
fn access_013_exists_checks_canonical_structure() {
    let env = fresh_env();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("demo");

    fs::create_dir_all(&db_path).unwrap();
    assert!(!env.exists_database(&db_path));
    fs::create_dir(db_path.join("data")).unwrap();
    assert!(!env.exists_database(&db_path));
    fs::write(db_path.join("config.json"), b"{}").unwrap();
    assert!(env.exists_database(&db_path));
    println!("✓ ACCESS-013: Structure check - PASSED");
}

// ACCESS-014: resource directories carry the mandated layout
#[test]
fn access_014_resource_directory_layout() {
    let env = fresh_env();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("demo");
    env.create_database(&DatabaseConfiguration::new(&db_path, DatabaseType::Json))
        .unwrap();
    let db = env.open_database(&db_path, User::default()).unwrap();
    db.create_resource(ResourceConfiguration::new("orders"))
        .unwrap();

    let resource = db_path.join("data").join("orders");
    for entry in ["data", "log", "indexes", "path-summary"] {
        assert!(resource.join(entry).is_dir(), "missing directory {entry}");
    }
    assert!(resource.join("settings.json").is_file());
    // No encryption requested, so no key set is written.
    assert!(!resource.join("encryptionKey.json").exists());
    // The bootstrap commit has swung an uber file into place.
    assert!(resource.join("data").join("uber.bin").is_file());

    db.close().unwrap();
    println!("✓ ACCESS-014: Resource directory layout - PASSED");
}

// ACCESS-015: an encrypted resource persists its key set
#[test]
fn access_015_encrypted_resource_keyset() {
    let env = fresh_env();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("demo");
    env.create_database(&DatabaseConfiguration::new(&db_path, DatabaseType::Json))
        .unwrap();
    let db = env.open_database(&db_path, User::default()).unwrap();
    db.create_resource(ResourceConfiguration::new("secrets").with_encryption(true))
        .unwrap();

    let key_file = db_path
        .join("data")
        .join("secrets")
        .join("encryptionKey.json");
    assert!(key_file.is_file());

    // The encrypted resource stays readable through a fresh session.
    let session = db.begin_resource_session("secrets").unwrap();
    let trx = session.begin_most_recent_node_read_trx().unwrap();
    assert_eq!(trx.revision_number(), 0);
    assert!(trx.document_node().is_ok());
    drop(trx);

    db.close().unwrap();
    println!("✓ ACCESS-015: Encrypted resource keyset - PASSED");
}
