/// Orphan sweep tests
///
/// Crash recovery: registry records left behind by dead processes are
/// reclaimed by the next session construction, and sweep failures never
/// propagate.
/// Run with: cargo test --test orphan_sweep_tests
use std::fs;

use scratchdb::backend::memory::database_exists;
use scratchdb::{Memory, Registry, Session, sweep_orphans};
use tempfile::TempDir;

fn init_logging() {
    let _ = tracing_subscriber::fmt::try_init();
}

#[tokio::test]
async fn test_sweep_reclaims_crashed_session() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let server = "mem://sweep-crashed";

    let crashed = Session::<Memory>::builder(server)
        .key("crashed")
        .registry_dir(dir.path())
        .build()
        .await
        .unwrap();
    let orphan_database = crashed.database_name().to_string();
    let orphan_record = crashed.record_path().to_path_buf();

    // Simulate a crash: the process dies without running any teardown,
    // leaving the record file and the database behind.
    std::mem::forget(crashed);
    assert!(orphan_record.exists());
    assert!(database_exists(server, &orphan_database));

    // The next session with the same discriminator reclaims the orphan
    // while still provisioning its own database.
    let next = Session::<Memory>::builder(server)
        .key("next")
        .registry_dir(dir.path())
        .build()
        .await
        .unwrap();

    assert!(!orphan_record.exists());
    assert!(!database_exists(server, &orphan_database));
    assert!(database_exists(server, next.database_name()));

    let registry = Registry::with_dir(dir.path(), "memory");
    let records = registry.scan();
    assert_eq!(records.len(), 1);
    assert_eq!(
        Registry::load(&records[0]).unwrap().database(),
        next.database_name()
    );
}

#[tokio::test]
async fn test_sweep_drops_absent_database_as_success() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let server = "mem://sweep-absent";
    let registry = Registry::with_dir(dir.path(), "memory");

    // Record for a database that no longer exists on the server.
    let record = registry.register("DBgone_00000000").unwrap();

    let report = sweep_orphans::<Memory>(server, &registry).await;
    assert_eq!(report.swept, 1);
    assert_eq!(report.failed, 0);
    assert!(!record.path().exists());
}

#[tokio::test]
async fn test_sweep_skips_partial_and_foreign_records() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let server = "mem://sweep-skips";
    let registry = Registry::with_dir(dir.path(), "memory");

    let valid = registry.register("DBvalid_00000000").unwrap();

    // Partially written record: loads as absent, stays on disk.
    let partial = dir.path().join("sdbpartial.scratchdb-memory");
    fs::write(&partial, "DBhalf_11111111\n").unwrap();

    // Record of an unrelated backend: never touched by this sweep.
    let foreign = Registry::with_dir(dir.path(), "otherdb")
        .register("DBforeign_22222222")
        .unwrap();

    let report = sweep_orphans::<Memory>(server, &registry).await;
    assert_eq!(report.swept, 1);
    assert_eq!(report.failed, 0);

    assert!(!valid.path().exists());
    assert!(partial.exists());
    assert!(foreign.path().exists());
}

#[tokio::test]
async fn test_sweep_failure_leaves_records_for_retry() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let registry = Registry::with_dir(dir.path(), "memory");

    let a = registry.register("DBa_00000000").unwrap();
    let b = registry.register("DBb_11111111").unwrap();

    // Unreachable server: every record fails, none is deleted.
    let report = sweep_orphans::<Memory>("bogus://server", &registry).await;
    assert_eq!(report.swept, 0);
    assert_eq!(report.failed, 2);
    assert!(a.path().exists());
    assert!(b.path().exists());
}

#[tokio::test]
async fn test_sweep_failure_does_not_block_construction() {
    init_logging();
    let dir = TempDir::new().unwrap();

    // A poisoned registry (partial record) must not prevent a new
    // session from coming up.
    fs::write(dir.path().join("sdbbad.scratchdb-memory"), "").unwrap();

    let session = Session::<Memory>::builder("mem://sweep-poisoned")
        .registry_dir(dir.path())
        .build()
        .await
        .unwrap();
    assert!(session.record_path().exists());
}
