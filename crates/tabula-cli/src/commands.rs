use std::path::Path;

use tabula_migrate::{parse_migration, MigrateError, Migrator, OperationMode};
use tabula_store::SqliteStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Settings;

type Result = std::result::Result<(), Box<dyn std::error::Error>>;

/// `tabula up`: Apply pending migrations. Ctrl-C stops before the next store call.
pub async fn up(settings: Settings) -> Result {
    let store = SqliteStore::open(&settings.database)?;
    info!(database = %settings.database.display(), "opened store");

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current store call");
            on_signal.cancel();
        }
    });

    let migrator = Migrator::new(&store, settings.options);
    let result = migrator.run(&cancel).await;
    signal_task.abort();

    let summary = match result {
        Ok(summary) => summary,
        Err(MigrateError::Cancelled) => return Err("migration run cancelled".into()),
        Err(e) => return Err(e.into()),
    };

    for id in &summary.applied {
        println!("  applied  {id}");
    }
    println!(
        "{} applied, {} already up to date",
        summary.applied.len(),
        summary.skipped.len()
    );
    Ok(())
}

/// `tabula status`: List migrations and whether each has been applied.
pub async fn status(settings: Settings) -> Result {
    let store = SqliteStore::open(&settings.database)?;
    let size = store.file_size()?;
    let journal = store.journal_mode()?;
    let history_table = settings.options.history_table();

    println!(
        "Database: {} (SQLite, {journal} mode, {})",
        settings.database.display(),
        format_bytes(size)
    );
    println!("Migrations: {}", settings.options.directory.display());
    println!();

    let migrator = Migrator::new(&store, settings.options);
    let statuses = migrator.status().await?;
    if statuses.is_empty() {
        println!("  (no migrations found)");
        return Ok(());
    }

    println!("  {:<40} {:>8}", "Migration", "State");
    println!("  {}", "-".repeat(49));
    for status in &statuses {
        let state = if status.applied { "applied" } else { "pending" };
        println!("  {:<40} {:>8}", status.id, state);
    }
    println!("  {}", "-".repeat(49));

    let pending = statuses.iter().filter(|s| !s.applied).count();
    println!(
        "  {} applied, {pending} pending ({history_table}: {} records)",
        statuses.len() - pending,
        store.row_count(&history_table)?
    );
    Ok(())
}

/// `tabula plan <file>`: Parse a migration file and print its operations.
pub fn plan(file: &Path, json: bool) -> Result {
    let content = std::fs::read_to_string(file)?;
    let operations = parse_migration(&content)
        .map_err(|(line, e)| format!("{}:{line}: {e}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&operations)?);
        return Ok(());
    }

    println!("Migration: {} ({} operations)", file.display(), operations.len());
    println!();
    for (i, op) in operations.iter().enumerate() {
        let note = match op.mode() {
            OperationMode::DeleteAll => "  (truncates outside any batch)",
            OperationMode::UpdateAll => "  (scans every row)",
            _ => "",
        };
        println!("  {:>4}  {op}{note}", i + 1);
    }
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
