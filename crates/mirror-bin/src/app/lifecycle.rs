//! `chain-mirror migrate` and `chain-mirror status`.

use mirror_database::{queries, schema_version, AsyncDatabase, CURRENT_VERSION};
use std::path::Path;
use tracing::info;

pub async fn run_migrate(db_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    // Opening runs any pending migrations.
    let db = AsyncDatabase::open(db_path).await?;
    let version = db.call(|conn| schema_version(conn)).await?;
    db.close().await?;

    info!(version, "Schema is current");
    println!("Schema at version {} ({})", version, db_path.display());
    Ok(())
}

pub async fn check_status(db_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !db_path.exists() {
        println!("No mirror database at {}", db_path.display());
        return Ok(());
    }

    let db = AsyncDatabase::open(db_path).await?;
    let (marker, counts) = db
        .call(|conn| Ok((queries::last_commit(conn)?, queries::table_counts(conn)?)))
        .await?;
    db.close().await?;

    println!("Mirror database: {}", db_path.display());
    println!("  Schema:  v{}", CURRENT_VERSION);
    match marker {
        Some(marker) => {
            println!("  Height:  {}", marker.height);
            println!("  At:      {}", marker.committed_at.to_rfc3339());
        }
        None => println!("  Height:  none (no block committed yet)"),
    }
    for (table, count) in counts {
        println!("  {:<22} {}", table, count);
    }
    Ok(())
}
