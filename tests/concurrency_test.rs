// Concurrency tests for the access layer
// Single-writer exclusion, racing first opens and registry coherence

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use arbordb::{
    DatabaseConfiguration, DatabaseType, Environment, NodeKind, ResourceConfiguration, Session,
    User,
};

fn setup(env: &Environment, dir: &std::path::Path) -> Arc<arbordb::Database> {
    let db_path = dir.join("demo");
    env.create_database(&DatabaseConfiguration::new(&db_path, DatabaseType::Json))
        .unwrap();
    let db = env.open_database(&db_path, User::default()).unwrap();
    db.create_resource(ResourceConfiguration::new("doc")).unwrap();
    db
}

// CONC-001: two opens in one handle yield the same session instance
#[test]
fn conc_001_same_session_instance() {
    let env = Environment::new();
    let dir = tempfile::tempdir().unwrap();
    let db = setup(&env, dir.path());

    let first = db.begin_resource_session("doc").unwrap();
    let second = db.begin_resource_session("doc").unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    db.close().unwrap();
    println!("✓ CONC-001: Same session instance - PASSED");
}

// CONC-002: N racing first opens create exactly one session
#[test]
fn conc_002_racing_first_opens() {
    let env = Environment::new();
    let dir = tempfile::tempdir().unwrap();
    let db = setup(&env, dir.path());

    const THREADS: usize = 8;
    let barrier = Arc::new(Barrier::new(THREADS));
    let sessions: Vec<_> = (0..THREADS)
        .map(|_| {
            let db = Arc::clone(&db);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                db.begin_resource_session("doc").unwrap()
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    for session in &sessions[1..] {
        assert!(Arc::ptr_eq(&sessions[0], session));
    }

    db.close().unwrap();
    println!("✓ CONC-002: Racing first opens - PASSED");
}

// CONC-003: the write lock admits one writer at a time across threads
#[test]
fn conc_003_single_writer_exclusion() {
    let env = Environment::new();
    let dir = tempfile::tempdir().unwrap();
    let db = setup(&env, dir.path());
    let session = db.begin_resource_session("doc").unwrap();

    let writer_active = Arc::new(AtomicBool::new(false));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let session = Arc::clone(&session);
            let writer_active = Arc::clone(&writer_active);
            let overlaps = Arc::clone(&overlaps);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut trx = session.begin_node_trx().unwrap();
                if writer_active.swap(true, Ordering::SeqCst) {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                trx.insert_child(0, NodeKind::Object, None).unwrap();
                thread::sleep(Duration::from_millis(50));
                writer_active.store(false, Ordering::SeqCst);
                trx.commit().unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(session.most_recent_revision_number(), 2);

    db.close().unwrap();
    println!("✓ CONC-003: Single-writer exclusion - PASSED");
}

// CONC-004: readers over an old revision run while a writer holds the lock
#[test]
fn conc_004_readers_do_not_block_on_the_writer() {
    let env = Environment::new();
    let dir = tempfile::tempdir().unwrap();
    let db = setup(&env, dir.path());
    let session = db.begin_resource_session("doc").unwrap();

    let mut trx = session.begin_node_trx().unwrap();
    let key = trx.insert_child(0, NodeKind::Object, None).unwrap();

    // Uncommitted writer state is invisible to a concurrent reader.
    let reader = session.begin_most_recent_node_read_trx().unwrap();
    assert_eq!(reader.revision_number(), 0);
    assert!(!reader.has_node(key).unwrap());
    drop(reader);

    let committed = trx.commit().unwrap();
    let reader = session.begin_node_read_trx(committed).unwrap();
    assert!(reader.has_node(key).unwrap());
    drop(reader);

    db.close().unwrap();
    println!("✓ CONC-004: Readers never block on the writer - PASSED");
}

// CONC-005: the resource-sessions pool mirrors open sessions exactly
#[test]
fn conc_005_session_pool_coherence() {
    let env = Environment::new();
    let dir = tempfile::tempdir().unwrap();
    let db = setup(&env, dir.path());
    let resource_path = db.resource_path("doc");

    assert!(!env.sessions().contains_any_entry(&resource_path));
    assert!(!db.has_open_resource_session("doc"));

    let session = db.begin_resource_session("doc").unwrap();
    assert!(env.sessions().contains_any_entry(&resource_path));
    assert!(db.has_open_resource_session("doc"));

    // Closing the session directly keeps the registry coherent.
    session.close().unwrap();
    assert!(!env.sessions().contains_any_entry(&resource_path));
    assert!(!db.has_open_resource_session("doc"));

    db.close().unwrap();
    println!("✓ CONC-005: Session pool coherence - PASSED");
}

// CONC-006: remove_resource drops the write-lock and buffer entries
#[test]
fn conc_006_remove_resource_drops_registry_entries() {
    let env = Environment::new();
    let dir = tempfile::tempdir().unwrap();
    let db = setup(&env, dir.path());
    let resource_path = db.resource_path("doc");

    let session = db.begin_resource_session("doc").unwrap();
    assert!(env.write_locks().has_write_lock(&resource_path));
    assert!(db.buffer_managers().has_buffer_manager(&resource_path));

    // Removal is refused while the session is open.
    assert!(db.remove_resource("doc").is_err());

    session.close().unwrap();
    db.remove_resource("doc").unwrap();
    assert!(!env.write_locks().has_write_lock(&resource_path));
    assert!(!db.buffer_managers().has_buffer_manager(&resource_path));

    db.close().unwrap();
    println!("✓ CONC-006: Removal drops registry entries - PASSED");
}

// CONC-007: closing the database deregisters it from the databases pool
#[test]
fn conc_007_database_pool_coherence() {
    let env = Environment::new();
    let dir = tempfile::tempdir().unwrap();
    let db = setup(&env, dir.path());
    let db_path = db.database_path().to_path_buf();

    assert!(env.databases().contains_any_entry(&db_path));
    db.close().unwrap();
    assert!(!env.databases().contains_any_entry(&db_path));
    println!("✓ CONC-007: Database pool coherence - PASSED");
}
