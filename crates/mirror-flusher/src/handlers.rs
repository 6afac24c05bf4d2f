//! Mutation handlers, one per write policy.
//!
//! A handler receives the borrowed connection of the caller's transaction
//! and the notification payload, runs its mutation, and returns the number
//! of rows it affected. Handlers never commit and never retry.

use crate::{FlushError, FlushResult, MessageKind};
use mirror_database::schema::{self, TableSpec};
use mirror_database::{mutations, Row};
use rusqlite::Connection;
use serde_json::Value;
use tracing::debug;

/// Payload field of `NEW_TRANSACTION` listing the related account
/// addresses. The spelling is the emitter's.
pub const RELATED_ACCOUNTS_FIELD: &str = "account_transcations";

/// Handler function type for message kinds.
pub type HandlerFn = Box<dyn Fn(&Connection, Row) -> FlushResult<usize> + Send + Sync>;

/// Append one row; a duplicate key surfaces as a unique violation.
pub fn insert(table: TableSpec) -> HandlerFn {
    Box::new(move |conn: &Connection, row: Row| -> FlushResult<usize> {
        Ok(mutations::insert_row(conn, &table, &row)?)
    })
}

/// Insert, or replace every non-key column of the existing row.
pub fn upsert(table: TableSpec) -> HandlerFn {
    Box::new(move |conn: &Connection, row: Row| -> FlushResult<usize> {
        Ok(mutations::upsert_row(conn, &table, &row)?)
    })
}

/// Overwrite the payload's columns on the row matching every key column.
pub fn update(table: TableSpec) -> HandlerFn {
    Box::new(move |conn: &Connection, row: Row| -> FlushResult<usize> {
        Ok(mutations::update_by_key(conn, &table, &row)?)
    })
}

/// Remove the row matching every key column.
pub fn delete(table: TableSpec) -> HandlerFn {
    Box::new(move |conn: &Connection, row: Row| -> FlushResult<usize> {
        Ok(mutations::delete_by_key(conn, &table, &row)?)
    })
}

/// Insert a transaction, then one linkage row per non-empty related
/// address, keyed by the id the store assigned.
pub fn insert_transaction() -> HandlerFn {
    Box::new(|conn: &Connection, row: Row| insert_transaction_with_accounts(conn, row))
}

fn insert_transaction_with_accounts(conn: &Connection, mut row: Row) -> FlushResult<usize> {
    let addresses = take_related_accounts(&mut row)?;

    let transaction_id = mutations::insert_row_returning_id(conn, &schema::TRANSACTIONS, &row)?;
    let mut affected = 1;

    for address in addresses.iter().filter(|address| !address.is_empty()) {
        let mut link = Row::new();
        link.insert("transaction_id".into(), Value::from(transaction_id));
        link.insert("address".into(), Value::from(address.as_str()));
        affected += mutations::insert_row(conn, &schema::ACCOUNT_TRANSACTIONS, &link)?;
    }

    debug!(
        transaction_id,
        linked = affected - 1,
        "Inserted transaction with account links"
    );
    Ok(affected)
}

fn take_related_accounts(row: &mut Row) -> FlushResult<Vec<String>> {
    let kind = MessageKind::NewTransaction.as_str();

    match row.shift_remove(RELATED_ACCOUNTS_FIELD) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(address) => Ok(address),
                other => Err(FlushError::malformed(
                    kind,
                    format!("'{RELATED_ACCOUNTS_FIELD}' entries must be strings, got {other}"),
                )),
            })
            .collect(),
        Some(other) => Err(FlushError::malformed(
            kind,
            format!("'{RELATED_ACCOUNTS_FIELD}' must be an array of addresses, got {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_database::queries::transaction_addresses;
    use mirror_database::Database;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_transaction_links_skip_empty_addresses() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();

        let handler = insert_transaction();
        let affected = handler(
            conn,
            row(json!({
                "hash": "AB12",
                "block_height": 100,
                "index": 1,
                "account_transcations": ["addrA", "", "addrB"],
            })),
        )
        .unwrap();

        assert_eq!(affected, 3);
        let tx_id: i64 = conn
            .query_row("SELECT id FROM transactions WHERE hash = 'AB12'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(transaction_addresses(conn, tx_id).unwrap(), vec!["addrA", "addrB"]);
    }

    #[test]
    fn test_transaction_without_related_accounts() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();

        let handler = insert_transaction();
        assert_eq!(handler(conn, row(json!({"hash": "A"}))).unwrap(), 1);
        assert_eq!(
            handler(conn, row(json!({"hash": "B", "account_transcations": null}))).unwrap(),
            1
        );

        let links: i64 = conn
            .query_row("SELECT COUNT(*) FROM account_transactions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(links, 0);
    }

    #[test]
    fn test_transaction_related_accounts_must_be_strings() {
        let db = Database::open_in_memory().unwrap();
        let handler = insert_transaction();

        let err = handler(
            db.connection(),
            row(json!({"hash": "A", "account_transcations": "addrA"})),
        )
        .unwrap_err();
        assert!(matches!(err, FlushError::MalformedPayload { .. }));

        let err = handler(
            db.connection(),
            row(json!({"hash": "A", "account_transcations": ["addrA", 5]})),
        )
        .unwrap_err();
        assert!(matches!(err, FlushError::MalformedPayload { .. }));
    }

    #[test]
    fn test_transaction_messages_stored_as_json_text() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();

        insert_transaction()(
            conn,
            row(json!({"hash": "A", "messages": [{"type": "send", "extra": {}}]})),
        )
        .unwrap();

        let messages: String = conn
            .query_row("SELECT messages FROM transactions", [], |r| r.get(0))
            .unwrap();
        let parsed: Value = serde_json::from_str(&messages).unwrap();
        assert_eq!(parsed[0]["type"], "send");
    }

    #[test]
    fn test_policy_handlers_route_to_primitives() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let validator = |tokens: i64| {
            row(json!({"operator_address": "bandvaloper1", "moniker": "node", "tokens": tokens}))
        };

        assert_eq!(upsert(schema::VALIDATORS)(conn, validator(10)).unwrap(), 1);
        assert_eq!(update(schema::VALIDATORS)(conn, validator(20)).unwrap(), 1);
        assert_eq!(
            delete(schema::DELEGATIONS)(
                conn,
                row(json!({"delegator_address": "d", "validator_address": "v"}))
            )
            .unwrap(),
            0
        );

        let err = insert(schema::VALIDATORS)(conn, validator(30)).unwrap_err();
        assert!(err.is_unique_violation());
    }
}
