//! Database migrations.
//!
//! Migrations are run in order and tracked in the `migrations` table.
//! Column order in each `CREATE TABLE` must match the `TableSpec` in
//! `schema`.

use crate::DatabaseResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version >= CURRENT_VERSION {
        debug!(current_version, "Schema up to date");
        return Ok(());
    }

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_chain_entities(conn)?;
    }
    if current_version < 2 {
        migrate_v2_tracking(conn)?;
    }

    info!("Migrations complete");
    Ok(())
}

/// Highest applied migration version.
pub fn schema_version(conn: &Connection) -> DatabaseResult<i32> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: one table per chain entity.
fn migrate_v1_chain_entities(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v1: chain entities");

    // blocks and transactions
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS blocks (
            height INTEGER NOT NULL PRIMARY KEY,
            timestamp INTEGER,
            proposer TEXT,
            hash TEXT,
            inflation TEXT,
            supply TEXT
        );

        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hash TEXT,
            block_height INTEGER,
            "index" INTEGER,
            -- No declared type: uint64 amounts past i64 are bound as text
            -- and must not be coerced to REAL.
            gas_used,
            gas_limit,
            gas_fee TEXT,
            err_msg TEXT,
            success INTEGER,
            sender TEXT,
            memo TEXT,
            messages TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_transactions_block_height
            ON transactions(block_height);
        CREATE INDEX IF NOT EXISTS idx_transactions_hash
            ON transactions(hash);

        CREATE TABLE IF NOT EXISTS account_transactions (
            transaction_id INTEGER NOT NULL REFERENCES transactions(id),
            address TEXT NOT NULL,
            PRIMARY KEY (transaction_id, address)
        );

        CREATE INDEX IF NOT EXISTS idx_account_transactions_address
            ON account_transactions(address);

        CREATE TABLE IF NOT EXISTS accounts (
            address TEXT NOT NULL PRIMARY KEY,
            balance TEXT
        );
        "#,
    )?;

    // oracle catalog, requests, and reports
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS data_sources (
            id INTEGER NOT NULL PRIMARY KEY,
            name TEXT,
            description TEXT,
            owner TEXT,
            executable TEXT,
            fee TEXT,
            transaction_id INTEGER
        );

        CREATE TABLE IF NOT EXISTS oracle_scripts (
            id INTEGER NOT NULL PRIMARY KEY,
            name TEXT,
            description TEXT,
            owner TEXT,
            schema TEXT,
            codehash TEXT,
            source_code_url TEXT,
            transaction_id INTEGER
        );

        CREATE TABLE IF NOT EXISTS requests (
            id INTEGER NOT NULL PRIMARY KEY,
            oracle_script_id INTEGER,
            calldata TEXT,
            ask_count INTEGER,
            min_count INTEGER,
            sender TEXT,
            client_id TEXT,
            request_time INTEGER,
            resolve_status INTEGER,
            resolve_time INTEGER,
            result TEXT,
            transaction_id INTEGER
        );

        CREATE TABLE IF NOT EXISTS raw_requests (
            request_id INTEGER NOT NULL,
            external_id INTEGER NOT NULL,
            data_source_id INTEGER,
            calldata TEXT,
            PRIMARY KEY (request_id, external_id)
        );

        CREATE TABLE IF NOT EXISTS val_requests (
            request_id INTEGER NOT NULL,
            validator TEXT NOT NULL,
            PRIMARY KEY (request_id, validator)
        );

        CREATE TABLE IF NOT EXISTS reports (
            request_id INTEGER NOT NULL,
            validator TEXT NOT NULL,
            transaction_id INTEGER,
            reporter TEXT,
            PRIMARY KEY (request_id, validator)
        );

        CREATE TABLE IF NOT EXISTS raw_reports (
            request_id INTEGER NOT NULL,
            external_id INTEGER NOT NULL,
            validator TEXT,
            data TEXT,
            exit_code INTEGER,
            PRIMARY KEY (request_id, external_id)
        );
        "#,
    )?;

    // staking
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS validators (
            operator_address TEXT NOT NULL PRIMARY KEY,
            consensus_address TEXT,
            moniker TEXT,
            identity TEXT,
            website TEXT,
            details TEXT,
            commission_rate TEXT,
            commission_max_rate TEXT,
            commission_max_change TEXT,
            min_self_delegation TEXT,
            tokens INTEGER,
            jailed INTEGER,
            delegator_shares TEXT,
            current_reward TEXT,
            current_ratio TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_validators_consensus_address
            ON validators(consensus_address);

        CREATE TABLE IF NOT EXISTS delegations (
            delegator_address TEXT NOT NULL,
            validator_address TEXT NOT NULL,
            shares TEXT,
            last_ratio TEXT,
            PRIMARY KEY (delegator_address, validator_address)
        );

        CREATE TABLE IF NOT EXISTS validator_votes (
            block_height INTEGER NOT NULL,
            consensus_address TEXT NOT NULL,
            voted INTEGER NOT NULL,
            PRIMARY KEY (block_height, consensus_address, voted)
        );
        "#,
    )?;

    record_migration(conn, 1, "chain_entities")?;
    Ok(())
}

/// V2: flusher bookkeeping (last committed block).
fn migrate_v2_tracking(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v2: tracking");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS tracking (
            id INTEGER NOT NULL PRIMARY KEY CHECK (id = 1),
            last_commit_height INTEGER NOT NULL,
            committed_at TEXT NOT NULL
        );
        ",
    )?;

    record_migration(conn, 2, "tracking")?;
    Ok(())
}
