//! End-to-end runs of the migrator against recording and SQLite stores.

mod common;

use async_trait::async_trait;
use common::{write_migrations, Call, Recording};
use tabula_migrate::{MigrateError, MigrationOptions, Migrator, ParseError};
use tabula_store::{
    ActionKind, BatchAction, ContinuationToken, Entity, EntityPage, MemoryStore, SqliteStore,
    StoreError, TableStore, Value,
};
use tokio_util::sync::CancellationToken;

const HISTORY: &str = "MigrationHistories";

async fn seed(store: &MemoryStore, table: &str, partition_key: &str, count: usize) {
    store.ensure_table(table).await.unwrap();
    let actions: Vec<_> = (0..count)
        .map(|i| {
            BatchAction::new(
                ActionKind::Add,
                Entity::new(partition_key, format!("{i:04}")).with("status", "open"),
            )
        })
        .collect();
    for chunk in actions.chunks(100) {
        store.submit_batch(table, partition_key, chunk).await.unwrap();
    }
}

#[tokio::test]
async fn files_apply_in_lexical_order() {
    let dir = tempfile::tempdir().unwrap();
    // Created out of order on purpose; the seed depends on the init.
    write_migrations(
        dir.path(),
        &[
            ("0002_seed.mig", "UPDATEM orders eu o-1 status|paid|STRING\n"),
            ("0001_init.mig", "INSERT orders eu o-1 status|open|STRING\n"),
        ],
    );
    let store = MemoryStore::new();

    let summary = Migrator::new(&store, MigrationOptions::new(dir.path()))
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.applied, vec!["0001_init", "0002_seed"]);
    let rows = store.snapshot("orders").unwrap();
    assert_eq!(rows[0].get("status"), Some(&Value::from("paid")));
}

#[tokio::test]
async fn rerun_is_a_no_op_against_data_tables() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(
        dir.path(),
        &[
            (
                "0001_init.mig",
                "INSERT orders eu 1 total|10.5|NUMBER\nINSERT orders us 2 total|3|NUMBER\n",
            ),
            ("0002_flags.mig", "UPDATEA orders vip|TRUE|BOOL\n"),
        ],
    );
    let store = Recording::new(MemoryStore::new());
    let migrator = Migrator::new(&store, MigrationOptions::new(dir.path()));
    let cancel = CancellationToken::new();

    migrator.run(&cancel).await.unwrap();
    let after_first = store.inner.snapshot("orders").unwrap();
    store.clear();

    let summary = migrator.run(&cancel).await.unwrap();
    assert!(summary.applied.is_empty());
    assert_eq!(summary.skipped, vec!["0001_init", "0002_flags"]);

    // Only history lookups: no table creation, scans, or batches.
    assert!(store.data_calls(HISTORY).is_empty(), "{:?}", store.calls());
    assert!(store.batches().is_empty());
    assert_eq!(store.inner.snapshot("orders").unwrap(), after_first);
}

#[tokio::test]
async fn batches_hold_one_partition_and_at_most_a_hundred_actions() {
    let dir = tempfile::tempdir().unwrap();
    let mut content = String::new();
    for i in 0..250 {
        content.push_str(&format!("UPSERTM events a {i:04} n|{i}|NUMBER\n"));
        if i % 50 == 0 {
            content.push_str(&format!("UPSERTM events b {i:04}\n"));
        }
    }
    write_migrations(dir.path(), &[("0001_events.mig", content.as_str())]);
    let store = Recording::new(MemoryStore::new());

    Migrator::new(&store, MigrationOptions::new(dir.path()))
        .run(&CancellationToken::new())
        .await
        .unwrap();

    let shape: Vec<_> = store
        .batches()
        .into_iter()
        .filter(|(table, _, _)| table == "events")
        .map(|(_, pk, actions)| {
            assert!(actions.iter().all(|a| a.partition_key() == pk));
            (pk, actions.len())
        })
        .collect();
    assert_eq!(
        shape,
        vec![
            ("a".to_string(), 100),
            ("a".to_string(), 100),
            ("a".to_string(), 50),
            ("b".to_string(), 5),
        ]
    );
    assert_eq!(store.inner.row_count("events").unwrap(), Some(255));
}

#[tokio::test]
async fn delete_all_truncates_outside_any_batch() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(
        dir.path(),
        &[(
            "0001_reset.mig",
            "INSERT orders eu new\nDELETE orders *\nUPSERTM orders us kept\n",
        )],
    );
    let inner = MemoryStore::new();
    seed(&inner, "orders", "eu", 3).await;
    let store = Recording::new(inner);

    Migrator::new(&store, MigrationOptions::new(dir.path()))
        .run(&CancellationToken::new())
        .await
        .unwrap();

    let calls = store.data_calls(HISTORY);
    assert_eq!(calls[0], Call::EnsureTable("orders".into()));
    assert_eq!(calls[1], Call::DeleteTable("orders".into()));
    assert_eq!(calls[2], Call::EnsureTable("orders".into()));
    assert!(calls[3..].iter().all(|c| matches!(c, Call::Submit { .. })));

    let keys: Vec<_> = store
        .inner
        .snapshot("orders")
        .unwrap()
        .iter()
        .map(|e| (e.partition_key.clone(), e.row_key.clone()))
        .collect();
    assert_eq!(
        keys,
        vec![
            ("eu".to_string(), "new".to_string()),
            ("us".to_string(), "kept".to_string())
        ]
    );
}

#[tokio::test]
async fn update_all_streams_page_by_page() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(
        dir.path(),
        &[("0001_archive.mig", "UPDATEA orders status|archived|STRING\n")],
    );
    let inner = MemoryStore::new();
    seed(&inner, "orders", "eu", 250).await;
    let store = Recording::new(inner);

    Migrator::new(&store, MigrationOptions::new(dir.path()).page_size(100))
        .run(&CancellationToken::new())
        .await
        .unwrap();

    // Each page is written back before the next one is fetched.
    let pattern: Vec<_> = store
        .data_calls(HISTORY)
        .iter()
        .filter_map(|c| match c {
            Call::QueryPage(_) => Some('Q'),
            Call::Submit { actions, .. } => {
                assert!(actions.iter().all(|a| a.kind == ActionKind::UpdateMerge));
                Some('S')
            }
            _ => None,
        })
        .collect();
    assert_eq!(pattern.into_iter().collect::<String>(), "QSQSQS");

    let rows = store.inner.snapshot("orders").unwrap();
    assert_eq!(rows.len(), 250);
    assert!(rows
        .iter()
        .all(|e| e.get("status") == Some(&Value::from("archived"))));
}

#[tokio::test]
async fn parse_failure_stops_before_any_store_write() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(
        dir.path(),
        &[
            ("0001_ok.mig", "INSERT t p 1\n"),
            ("0002_bad.mig", "INSERT t p 2\nINSERT t p 3\nINSERT t p 4 n|x|NUMBER\n"),
            ("0003_next.mig", "INSERT t p 5\n"),
        ],
    );
    let store = Recording::new(MemoryStore::new());
    let migrator = Migrator::new(&store, MigrationOptions::new(dir.path()));

    let err = migrator.run(&CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.migration_id(), Some("0002_bad"));
    assert!(matches!(
        err.cause(),
        MigrateError::Parse {
            line: 3,
            source: ParseError::InvalidNumber { .. }
        }
    ));
    assert!(err.to_string().contains("0002_bad"));

    let data_batches = store.batches().into_iter().filter(|(t, _, _)| t == "t").count();
    assert_eq!(data_batches, 1);
    assert_eq!(store.inner.row_count("t").unwrap(), Some(1));
    let record = store
        .inner
        .get_entity(HISTORY, "migration", "0002_bad")
        .await
        .unwrap();
    assert!(record.is_none());
}

#[tokio::test]
async fn missing_directory_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let store = Recording::new(MemoryStore::new());

    let summary = Migrator::new(&store, MigrationOptions::new(dir.path().join("nope")))
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert!(summary.applied.is_empty());
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn custom_extension_filters_files() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(
        dir.path(),
        &[("0001.am", "INSERT t p 1\n"), ("0002.mig", "INSERT t p 2\n")],
    );
    let store = MemoryStore::new();

    let summary = Migrator::new(&store, MigrationOptions::new(dir.path()).extension("am"))
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.applied, vec!["0001"]);
    assert_eq!(store.row_count("t").unwrap(), Some(1));
}

/// Cancels the run as soon as the first batch has been committed.
struct CancelAfterFirstBatch {
    inner: MemoryStore,
    cancel: CancellationToken,
}

#[async_trait]
impl TableStore for CancelAfterFirstBatch {
    async fn ensure_table(&self, table: &str) -> Result<(), StoreError> {
        self.inner.ensure_table(table).await
    }

    async fn delete_table(&self, table: &str) -> Result<(), StoreError> {
        self.inner.delete_table(table).await
    }

    async fn get_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Entity>, StoreError> {
        self.inner.get_entity(table, partition_key, row_key).await
    }

    async fn submit_batch(
        &self,
        table: &str,
        partition_key: &str,
        actions: &[BatchAction],
    ) -> Result<(), StoreError> {
        self.inner.submit_batch(table, partition_key, actions).await?;
        self.cancel.cancel();
        Ok(())
    }

    async fn query_page(
        &self,
        table: &str,
        page_size: usize,
        continuation: Option<&ContinuationToken>,
    ) -> Result<EntityPage, StoreError> {
        self.inner.query_page(table, page_size, continuation).await
    }
}

#[tokio::test]
async fn cancellation_keeps_committed_batches_and_records_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(
        dir.path(),
        &[
            ("0001_two_partitions.mig", "INSERT t a 1\nINSERT t b 1\n"),
            ("0002_later.mig", "INSERT t c 1\n"),
        ],
    );
    let cancel = CancellationToken::new();
    let store = CancelAfterFirstBatch {
        inner: MemoryStore::new(),
        cancel: cancel.clone(),
    };

    let err = Migrator::new(&store, MigrationOptions::new(dir.path()))
        .run(&cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, MigrateError::Cancelled));
    let rows = store.inner.snapshot("t").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].key(), ("a", "1"));
    assert_eq!(store.inner.row_count(HISTORY).unwrap(), Some(0));
}

#[tokio::test]
async fn cancel_after_last_batch_still_records_the_file() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(
        dir.path(),
        &[
            ("0001_one_partition.mig", "INSERT t a 1\nINSERT t a 2\n"),
            ("0002_later.mig", "INSERT t c 1\n"),
        ],
    );
    let cancel = CancellationToken::new();
    let store = CancelAfterFirstBatch {
        inner: MemoryStore::new(),
        cancel: cancel.clone(),
    };
    let migrator = Migrator::new(&store, MigrationOptions::new(dir.path()));

    let err = migrator.run(&cancel).await.unwrap_err();
    assert!(matches!(err, MigrateError::Cancelled));

    // The committed file is recorded; the next one never started.
    let statuses = migrator.status().await.unwrap();
    let applied: Vec<_> = statuses.iter().map(|s| (s.id.as_str(), s.applied)).collect();
    assert_eq!(
        applied,
        vec![("0001_one_partition", true), ("0002_later", false)]
    );
    assert_eq!(store.inner.row_count("t").unwrap(), Some(2));
}

#[tokio::test]
async fn sqlite_backend_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let migrations = dir.path().join("migrations");
    std::fs::create_dir(&migrations).unwrap();
    write_migrations(
        &migrations,
        &[
            (
                "0001_init.mig",
                "INSERT customers eu c-1 name|Ada|STRING vip|false|BOOL\n\
                 INSERT customers eu c-2 name|Lin|STRING score|4.5|NUMBER\n",
            ),
            (
                "0002_promote.mig",
                "UPDATEA customers vip|TRUE|BOOL\nDELETE customers eu c-2\n",
            ),
        ],
    );
    let db = dir.path().join("tabula.db");
    let options = MigrationOptions::new(&migrations).table_prefix("app");

    {
        let store = SqliteStore::open(&db).unwrap();
        let summary = Migrator::new(&store, options.clone())
            .run(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.applied, vec!["0001_init", "0002_promote"]);
    }

    let store = SqliteStore::open(&db).unwrap();
    let migrator = Migrator::new(&store, options);
    let summary = migrator.run(&CancellationToken::new()).await.unwrap();
    assert_eq!(summary.skipped.len(), 2);

    let ada = store
        .get_entity("customers", "eu", "c-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ada.get("vip"), Some(&Value::Bool(true)));
    assert_eq!(ada.get("name"), Some(&Value::from("Ada")));
    assert!(store
        .get_entity("customers", "eu", "c-2")
        .await
        .unwrap()
        .is_none());

    let statuses = migrator.status().await.unwrap();
    assert!(statuses.iter().all(|s| s.applied));
    assert_eq!(store.row_count("appMigrationHistories").unwrap(), 2);
}
