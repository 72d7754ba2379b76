mod support;

use showroom_orm::migrations::checksum;
use showroom_orm::{
    MigrationConfig, MigrationManager, MigrationRunner, MigrationStatus, OrmError, RunOptions,
};
use std::fs;
use std::path::Path;
use support::{write_migrations, MemoryBackend};

fn runner_for(dir: &Path, schema: &str, backend: MemoryBackend) -> MigrationRunner<MemoryBackend> {
    let manager = MigrationManager::with_config(MigrationConfig::new(dir, schema)).unwrap();
    MigrationRunner::new(manager, backend)
}

#[tokio::test]
async fn test_empty_directory_never_connects() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MemoryBackend::new();
    let runner = runner_for(dir.path(), "selection", backend.clone());

    let result = runner.run_migrations(RunOptions::default()).await.unwrap();

    assert!(result.nothing_to_apply());
    assert_eq!(result.applied_count(), 0);
    assert_eq!(backend.state().connections_opened, 0);
}

#[tokio::test]
async fn test_missing_directory_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MemoryBackend::new();
    let runner = runner_for(&dir.path().join("absent"), "selection", backend.clone());

    let result = runner.run_migrations(RunOptions::default()).await;

    assert!(matches!(result, Err(OrmError::Io(_))));
    assert_eq!(backend.state().connections_opened, 0);
}

#[tokio::test]
async fn test_applies_in_lexical_order() {
    let dir = tempfile::tempdir().unwrap();
    // Written out of order on purpose
    write_migrations(
        dir.path(),
        &[
            ("010_testimonials.sql", "-- 010"),
            ("002_leads.sql", "-- 002"),
            ("001_init.sql", "-- 001"),
        ],
    );
    let backend = MemoryBackend::new();
    let runner = runner_for(dir.path(), "selection", backend.clone());

    let result = runner.run_migrations(RunOptions::default()).await.unwrap();

    assert_eq!(
        result.applied_migrations,
        vec!["001_init.sql", "002_leads.sql", "010_testimonials.sql"]
    );
    let state = backend.state();
    assert_eq!(state.committed_batches, vec!["-- 001", "-- 002", "-- 010"]);
    let ledger: Vec<_> = state.ledger.iter().map(|m| m.filename.as_str()).collect();
    assert_eq!(ledger, vec!["001_init.sql", "002_leads.sql", "010_testimonials.sql"]);
}

#[tokio::test]
async fn test_second_run_executes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(
        dir.path(),
        &[("001_init.sql", "CREATE TABLE {{schema}}.vehicles (id bigserial);")],
    );
    let backend = MemoryBackend::new();
    let runner = runner_for(dir.path(), "selection", backend.clone());

    runner.run_migrations(RunOptions::default()).await.unwrap();
    let statements_after_first = backend.state().statements.len();

    let second = runner.run_migrations(RunOptions::default()).await.unwrap();

    assert!(second.up_to_date());
    assert_eq!(second.skipped_count, 1);

    let state = backend.state();
    assert_eq!(state.attempted_batches.len(), 1);
    // Lock, schema, table, checksum column, ledger read, unlock
    let second_run: Vec<_> = state.statements[statements_after_first..].to_vec();
    assert_eq!(second_run.len(), 6);
    assert!(second_run[0].contains("pg_advisory_lock("));
    assert!(second_run[1].starts_with("CREATE SCHEMA IF NOT EXISTS"));
    assert!(second_run[2].starts_with("CREATE TABLE IF NOT EXISTS"));
    assert!(second_run[3].starts_with("ALTER TABLE"));
    assert!(second_run[4].starts_with("SELECT filename"));
    assert!(second_run[5].contains("pg_advisory_unlock("));
}

#[tokio::test]
async fn test_only_unrecorded_files_run() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(
        dir.path(),
        &[
            ("001_init.sql", "CREATE TABLE selection.vehicles ();"),
            ("002_add_leads.sql", "CREATE TABLE selection.leads ();"),
        ],
    );
    let backend = MemoryBackend::new();
    backend.seed_applied("001_init.sql", None);
    let runner = runner_for(dir.path(), "selection", backend.clone());

    let result = runner.run_migrations(RunOptions::default()).await.unwrap();

    assert_eq!(result.applied_migrations, vec!["002_add_leads.sql"]);
    assert_eq!(result.skipped_count, 1);
    assert_eq!(
        backend.state().committed_batches,
        vec!["CREATE TABLE selection.leads ();"]
    );
    assert_eq!(
        backend.ledger_filenames(),
        vec!["001_init.sql", "002_add_leads.sql"]
    );
}

#[tokio::test]
async fn test_failure_rolls_back_and_stops() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(
        dir.path(),
        &[
            ("001_init.sql", "CREATE TABLE selection.vehicles ();"),
            ("002_images.sql", "CREATE TABLE selection.images ();"),
            ("003_x.sql", "CREATE TABLE selection.broken (; SELEC oops"),
            ("004_y.sql", "CREATE TABLE selection.later ();"),
        ],
    );
    let backend = MemoryBackend::new().failing_on("SELEC oops");
    let runner = runner_for(dir.path(), "selection", backend.clone());

    let result = runner.run_migrations(RunOptions::default()).await;

    match result {
        Err(OrmError::Migration(message)) => assert!(message.contains("003_x.sql")),
        other => panic!("Expected migration error, got {:?}", other),
    }

    let state = backend.state();
    let ledger: Vec<_> = state.ledger.iter().map(|m| m.filename.as_str()).collect();
    assert_eq!(ledger, vec!["001_init.sql", "002_images.sql"]);
    assert_eq!(state.rollbacks, 1);
    assert!(!state.attempted_batches.iter().any(|sql| sql.contains("later")));
    assert!(!state.lock_held);
    assert_eq!(state.connections_opened, 1);
    assert_eq!(state.connections_closed, 1);
}

#[tokio::test]
async fn test_duplicate_ledger_row_rolls_back_body() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(
        dir.path(),
        &[
            ("001_init.sql", "CREATE TABLE selection.vehicles ();"),
            ("002_leads.sql", "CREATE TABLE selection.leads ();"),
            ("003_images.sql", "CREATE TABLE selection.images ();"),
        ],
    );
    let backend = MemoryBackend::new().recorded_elsewhere("002_leads.sql");
    let runner = runner_for(dir.path(), "selection", backend.clone());

    let result = runner.run_migrations(RunOptions::default()).await;

    match result {
        Err(OrmError::Migration(message)) => {
            assert!(message.contains("Failed to record migration 002_leads.sql"))
        }
        other => panic!("Expected migration error, got {:?}", other),
    }

    let state = backend.state();
    assert_eq!(state.rollbacks, 1);
    assert_eq!(
        state.committed_batches,
        vec!["CREATE TABLE selection.vehicles ();"]
    );
    assert!(!state.attempted_batches.iter().any(|sql| sql.contains("images")));
    let recorded: Vec<_> = state.ledger.iter().map(|m| m.filename.as_str()).collect();
    assert_eq!(recorded, vec!["002_leads.sql", "001_init.sql"]);
    assert!(!state.lock_held);
    assert_eq!(state.connections_closed, 1);
}

#[tokio::test]
async fn test_rerun_after_fix_resumes_at_failed_file() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(
        dir.path(),
        &[
            ("001_init.sql", "CREATE TABLE selection.vehicles ();"),
            ("002_bad.sql", "SELEC oops"),
        ],
    );
    let backend = MemoryBackend::new().failing_on("SELEC oops");
    let runner = runner_for(dir.path(), "selection", backend.clone());
    assert!(runner.run_migrations(RunOptions::default()).await.is_err());

    fs::write(dir.path().join("002_bad.sql"), "SELECT 1;").unwrap();
    let result = runner.run_migrations(RunOptions::default()).await.unwrap();

    assert_eq!(result.applied_migrations, vec!["002_bad.sql"]);
    assert_eq!(backend.ledger_filenames(), vec!["001_init.sql", "002_bad.sql"]);
}

#[tokio::test]
async fn test_rewrites_for_target_schema() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(
        dir.path(),
        &[(
            "001_widgets.sql",
            "CREATE SCHEMA IF NOT EXISTS selection;\nINSERT INTO selection.widgets (name) VALUES ('a');",
        )],
    );
    let backend = MemoryBackend::new();
    let runner = runner_for(dir.path(), "tenant_a", backend.clone());

    runner.run_migrations(RunOptions::default()).await.unwrap();

    let state = backend.state();
    assert_eq!(
        state.committed_batches,
        vec!["CREATE SCHEMA IF NOT EXISTS tenant_a;\nINSERT INTO tenant_a.widgets (name) VALUES ('a');"]
    );
    assert!(state
        .statements
        .iter()
        .any(|sql| sql == "CREATE SCHEMA IF NOT EXISTS tenant_a"));
    assert!(state
        .statements
        .iter()
        .any(|sql| sql.contains("tenant_a.schema_migrations")));
}

#[tokio::test]
async fn test_modified_migration_is_fatal_by_default() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(
        dir.path(),
        &[
            ("001_init.sql", "CREATE TABLE selection.vehicles (id int);"),
            ("002_leads.sql", "CREATE TABLE selection.leads ();"),
        ],
    );
    let backend = MemoryBackend::new();
    backend.seed_applied("001_init.sql", Some(checksum("CREATE TABLE selection.vehicles ();")));
    let runner = runner_for(dir.path(), "selection", backend.clone());

    let result = runner.run_migrations(RunOptions::default()).await;

    match result {
        Err(OrmError::ChecksumMismatch { filename, .. }) => assert_eq!(filename, "001_init.sql"),
        other => panic!("Expected checksum mismatch, got {:?}", other),
    }
    let state = backend.state();
    assert!(state.attempted_batches.is_empty());
    assert!(!state.lock_held);
    assert_eq!(state.connections_closed, 1);
}

#[tokio::test]
async fn test_modified_migration_allowed_when_requested() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(
        dir.path(),
        &[
            ("001_init.sql", "CREATE TABLE selection.vehicles (id int);"),
            ("002_leads.sql", "CREATE TABLE selection.leads ();"),
        ],
    );
    let backend = MemoryBackend::new();
    backend.seed_applied("001_init.sql", Some(checksum("something else")));
    let runner = runner_for(dir.path(), "selection", backend.clone());

    let result = runner
        .run_migrations(RunOptions {
            allow_modified: true,
        })
        .await
        .unwrap();

    // The edited file is never re-run
    assert_eq!(result.applied_migrations, vec!["002_leads.sql"]);
}

#[tokio::test]
async fn test_rows_without_checksum_are_not_verified() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(dir.path(), &[("001_init.sql", "SELECT 1;")]);
    let backend = MemoryBackend::new();
    backend.seed_applied("001_init.sql", None);
    let runner = runner_for(dir.path(), "selection", backend.clone());

    let result = runner.run_migrations(RunOptions::default()).await.unwrap();
    assert!(result.up_to_date());
}

#[tokio::test]
async fn test_lock_taken_before_any_ddl() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(dir.path(), &[("001_init.sql", "SELECT 1;")]);
    let backend = MemoryBackend::new();
    let runner = runner_for(dir.path(), "selection", backend.clone());

    runner.run_migrations(RunOptions::default()).await.unwrap();

    let state = backend.state();
    assert!(state.statements[0].contains("pg_advisory_lock("));
    assert!(state.statements.last().unwrap().contains("pg_advisory_unlock("));
    assert_eq!(state.lock_acquisitions, 1);
    assert!(!state.lock_held);
}

#[tokio::test]
async fn test_connection_failure_propagates() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(dir.path(), &[("001_init.sql", "SELECT 1;")]);
    let runner = runner_for(
        dir.path(),
        "selection",
        MemoryBackend::new().refusing_connections(),
    );

    let result = runner.run_migrations(RunOptions::default()).await;
    assert!(matches!(result, Err(OrmError::Connection(_))));
}

#[tokio::test]
async fn test_status_reports_every_state() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(
        dir.path(),
        &[
            ("001_init.sql", "SELECT 1;"),
            ("002_edited.sql", "SELECT 2; -- edited"),
            ("003_new.sql", "SELECT 3;"),
        ],
    );
    let backend = MemoryBackend::new();
    backend.seed_applied("000_removed.sql", None);
    backend.seed_applied("001_init.sql", Some(checksum("SELECT 1;")));
    backend.seed_applied("002_edited.sql", Some(checksum("SELECT 2;")));
    let runner = runner_for(dir.path(), "selection", backend.clone());

    let entries = runner.migration_status().await.unwrap();

    let summary: Vec<_> = entries
        .iter()
        .map(|entry| {
            let state = match entry.status {
                MigrationStatus::Pending => "pending",
                MigrationStatus::Applied { .. } => "applied",
                MigrationStatus::Modified { .. } => "modified",
                MigrationStatus::Missing { .. } => "missing",
            };
            (entry.filename.as_str(), state)
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            ("001_init.sql", "applied"),
            ("002_edited.sql", "modified"),
            ("003_new.sql", "pending"),
            ("000_removed.sql", "missing"),
        ]
    );
    assert_eq!(backend.state().connections_closed, 1);
    assert!(backend.state().attempted_batches.is_empty());
}

#[tokio::test]
async fn test_status_without_ledger_lists_everything_pending() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(dir.path(), &[("001_init.sql", "SELECT 1;")]);
    let backend = MemoryBackend::new();
    let runner = runner_for(dir.path(), "selection", backend.clone());

    let entries = runner.migration_status().await.unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, MigrationStatus::Pending);
    // Status is read-only
    assert!(!backend.state().table_created);
}
