//! Keyed mutation primitives.
//!
//! One function per write policy, each parameterized by a [`TableSpec`]:
//!
//! | Policy | Function | SQL |
//! |---|---|---|
//! | insert-only | [`insert_row`] | `INSERT` |
//! | upsert | [`upsert_row`] | `INSERT … ON CONFLICT (<key>) DO UPDATE` |
//! | conditional update | [`update_by_key`] | `UPDATE … WHERE k1 = ? AND k2 = ?` |
//! | conditional delete | [`delete_by_key`] | `DELETE … WHERE k1 = ? AND k2 = ?` |
//!
//! Rows are flat JSON objects whose keys are column names. Nothing is
//! validated beyond what is needed to build the statement: unknown columns,
//! missing NOT NULL columns, and duplicate keys are reported by SQLite and
//! propagate unchanged. Every function returns the affected-row count so
//! callers can detect zero-row updates and deletes themselves.

use crate::schema::TableSpec;
use crate::{DatabaseError, DatabaseResult};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::Value as JsonValue;
use tracing::debug;

/// A flat column-name → value mapping.
pub type Row = serde_json::Map<String, JsonValue>;

/// Insert one row. Fails with a uniqueness violation if the key exists.
pub fn insert_row(conn: &Connection, table: &TableSpec, row: &Row) -> DatabaseResult<usize> {
    let (columns, values) = split_row(table, row)?;
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table.name),
        column_list(&columns),
        placeholders(1, columns.len()),
    );

    let count = conn.prepare_cached(&sql)?.execute(params_from_iter(values))?;
    debug!(table = table.name, "Inserted row");
    Ok(count)
}

/// Insert one row and return the rowid the store assigned to it.
pub fn insert_row_returning_id(
    conn: &Connection,
    table: &TableSpec,
    row: &Row,
) -> DatabaseResult<i64> {
    insert_row(conn, table, row)?;
    Ok(conn.last_insert_rowid())
}

/// Insert one row, or overwrite every non-key column of the row that
/// already holds the same key.
pub fn upsert_row(conn: &Connection, table: &TableSpec, row: &Row) -> DatabaseResult<usize> {
    let (columns, values) = split_row(table, row)?;

    let updates: Vec<String> = columns
        .iter()
        .filter(|column| !table.is_key(column))
        .map(|column| {
            let column = quote_ident(column);
            format!("{column} = excluded.{column}")
        })
        .collect();

    let conflict_action = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
        quote_ident(table.name),
        column_list(&columns),
        placeholders(1, columns.len()),
        column_list(table.key_columns),
        conflict_action,
    );

    let count = conn.prepare_cached(&sql)?.execute(params_from_iter(values))?;
    debug!(table = table.name, "Upserted row");
    Ok(count)
}

/// Overwrite every column present in `row` on the row whose key columns
/// all equal the row's key values. Zero matches is not an error.
pub fn update_by_key(conn: &Connection, table: &TableSpec, row: &Row) -> DatabaseResult<usize> {
    let key_values = key_values(table, row)?;
    let (columns, mut values) = split_row(table, row)?;

    let assignments: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{} = ?{}", quote_ident(column), i + 1))
        .collect();

    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        quote_ident(table.name),
        assignments.join(", "),
        key_condition(table, columns.len() + 1),
    );

    values.extend(key_values);
    let count = conn.prepare_cached(&sql)?.execute(params_from_iter(values))?;
    debug!(table = table.name, rows = count, "Updated row by key");
    Ok(count)
}

/// Delete the row whose key columns all equal the row's key values.
/// Columns outside the key are ignored; zero matches is not an error.
pub fn delete_by_key(conn: &Connection, table: &TableSpec, row: &Row) -> DatabaseResult<usize> {
    let key_values = key_values(table, row)?;

    let sql = format!(
        "DELETE FROM {} WHERE {}",
        quote_ident(table.name),
        key_condition(table, 1),
    );

    let count = conn
        .prepare_cached(&sql)?
        .execute(params_from_iter(key_values))?;
    debug!(table = table.name, rows = count, "Deleted row by key");
    Ok(count)
}

/// Fetch the row whose key columns all equal the row's key values.
pub fn fetch_by_key(conn: &Connection, table: &TableSpec, key: &Row) -> DatabaseResult<Option<Row>> {
    let key_values = key_values(table, key)?;

    let sql = format!(
        "SELECT {} FROM {} WHERE {}",
        column_list(table.columns),
        quote_ident(table.name),
        key_condition(table, 1),
    );

    let mut stmt = conn.prepare_cached(&sql)?;
    let result = stmt.query_row(params_from_iter(key_values), |sql_row| {
        let mut row = Row::new();
        for (i, column) in table.columns.iter().enumerate() {
            row.insert(column.to_string(), from_sql_value(sql_row.get_ref(i)?));
        }
        Ok(row)
    });

    match result {
        Ok(row) => Ok(Some(row)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Count every row in a table.
pub fn count_rows(conn: &Connection, table: &TableSpec) -> DatabaseResult<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table.name));
    let count = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(count)
}

/// Convert a JSON payload value into the value bound to the statement.
///
/// Arrays and objects are stored as their JSON text. Integers above
/// `i64::MAX` (uint64 gas amounts) are stored as decimal text so they keep
/// every digit.
pub fn to_sql_value(value: &JsonValue) -> SqlValue {
    match value {
        JsonValue::Null => SqlValue::Null,
        JsonValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if n.is_u64() {
                SqlValue::Text(n.to_string())
            } else {
                n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null)
            }
        }
        JsonValue::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Convert a stored value back into JSON.
pub fn from_sql_value(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ValueRef::Text(bytes) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => JsonValue::from(bytes.to_vec()),
    }
}

fn split_row<'r>(table: &TableSpec, row: &'r Row) -> DatabaseResult<(Vec<&'r str>, Vec<SqlValue>)> {
    if row.is_empty() {
        return Err(DatabaseError::MalformedPayload(format!(
            "empty row for table '{}'",
            table.name
        )));
    }

    let columns = row.keys().map(String::as_str).collect();
    let values = row.values().map(to_sql_value).collect();
    Ok((columns, values))
}

fn key_values(table: &TableSpec, row: &Row) -> DatabaseResult<Vec<SqlValue>> {
    table
        .key_columns
        .iter()
        .map(|column| {
            row.get(*column)
                .map(to_sql_value)
                .ok_or_else(|| DatabaseError::MissingKeyColumn {
                    table: table.name.to_string(),
                    column: column.to_string(),
                })
        })
        .collect()
}

/// `"k1" = ?n AND "k2" = ?n+1 …` over every key column.
fn key_condition(table: &TableSpec, first_param: usize) -> String {
    table
        .key_columns
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{} = ?{}", quote_ident(column), first_param + i))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn column_list<S: AsRef<str>>(columns: &[S]) -> String {
    columns
        .iter()
        .map(|column| quote_ident(column.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders(first_param: usize, count: usize) -> String {
    (first_param..first_param + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ACCOUNTS, BLOCKS, DELEGATIONS, RAW_REQUESTS, REQUESTS, TRANSACTIONS};
    use crate::Database;
    use serde_json::json;

    fn row(value: JsonValue) -> Row {
        match value {
            JsonValue::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_insert_and_fetch() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();

        let count = insert_row(
            conn,
            &BLOCKS,
            &row(json!({"height": 100, "hash": "abc", "proposer": "val1"})),
        )
        .unwrap();
        assert_eq!(count, 1);

        let fetched = fetch_by_key(conn, &BLOCKS, &row(json!({"height": 100})))
            .unwrap()
            .unwrap();
        assert_eq!(fetched["hash"], "abc");
        assert_eq!(fetched["proposer"], "val1");
        assert_eq!(fetched["supply"], JsonValue::Null);
    }

    #[test]
    fn test_insert_duplicate_is_unique_violation() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let block = row(json!({"height": 7, "hash": "h7"}));

        insert_row(conn, &BLOCKS, &block).unwrap();
        let err = insert_row(conn, &BLOCKS, &block).unwrap_err();

        assert!(err.is_unique_violation(), "unexpected error: {err}");
        assert_eq!(count_rows(conn, &BLOCKS).unwrap(), 1);
    }

    #[test]
    fn test_insert_unknown_column_surfaces_store_error() {
        let db = Database::open_in_memory().unwrap();
        let err = insert_row(
            db.connection(),
            &BLOCKS,
            &row(json!({"height": 1, "no_such_column": 5})),
        )
        .unwrap_err();

        assert!(matches!(err, DatabaseError::Sqlite(_)));
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn test_insert_empty_row_rejected() {
        let db = Database::open_in_memory().unwrap();
        let err = insert_row(db.connection(), &BLOCKS, &Row::new()).unwrap_err();
        assert!(matches!(err, DatabaseError::MalformedPayload(_)));
    }

    #[test]
    fn test_insert_returning_id_is_sequential() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();

        let first =
            insert_row_returning_id(conn, &TRANSACTIONS, &row(json!({"hash": "t1"}))).unwrap();
        let second =
            insert_row_returning_id(conn, &TRANSACTIONS, &row(json!({"hash": "t2"}))).unwrap();

        assert_eq!(second, first + 1);
    }

    #[test]
    fn test_upsert_twice_keeps_one_row_with_second_values() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();

        upsert_row(conn, &ACCOUNTS, &row(json!({"address": "band1", "balance": "10uband"})))
            .unwrap();
        upsert_row(conn, &ACCOUNTS, &row(json!({"address": "band1", "balance": "25uband"})))
            .unwrap();

        assert_eq!(count_rows(conn, &ACCOUNTS).unwrap(), 1);
        let fetched = fetch_by_key(conn, &ACCOUNTS, &row(json!({"address": "band1"})))
            .unwrap()
            .unwrap();
        assert_eq!(fetched["balance"], "25uband");
    }

    #[test]
    fn test_upsert_key_only_row_is_noop_on_conflict() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();

        upsert_row(conn, &ACCOUNTS, &row(json!({"address": "band1", "balance": "10uband"})))
            .unwrap();
        upsert_row(conn, &ACCOUNTS, &row(json!({"address": "band1"}))).unwrap();

        let fetched = fetch_by_key(conn, &ACCOUNTS, &row(json!({"address": "band1"})))
            .unwrap()
            .unwrap();
        assert_eq!(fetched["balance"], "10uband");
    }

    #[test]
    fn test_update_missing_row_is_noop() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();

        let count =
            update_by_key(conn, &REQUESTS, &row(json!({"id": 42, "resolve_status": 1}))).unwrap();

        assert_eq!(count, 0);
        assert_eq!(count_rows(conn, &REQUESTS).unwrap(), 0);
    }

    #[test]
    fn test_update_overwrites_payload_columns_only() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();

        insert_row(
            conn,
            &REQUESTS,
            &row(json!({"id": 1, "oracle_script_id": 3, "calldata": "AAE=", "resolve_status": 0})),
        )
        .unwrap();

        let count = update_by_key(
            conn,
            &REQUESTS,
            &row(json!({"id": 1, "resolve_status": 1, "result": "AQI="})),
        )
        .unwrap();
        assert_eq!(count, 1);

        let fetched = fetch_by_key(conn, &REQUESTS, &row(json!({"id": 1})))
            .unwrap()
            .unwrap();
        assert_eq!(fetched["resolve_status"], 1);
        assert_eq!(fetched["result"], "AQI=");
        assert_eq!(fetched["oracle_script_id"], 3);
        assert_eq!(fetched["calldata"], "AAE=");
    }

    #[test]
    fn test_update_requires_every_key_column() {
        let db = Database::open_in_memory().unwrap();
        let err = update_by_key(
            db.connection(),
            &RAW_REQUESTS,
            &row(json!({"request_id": 1, "calldata": "x"})),
        )
        .unwrap_err();

        match err {
            DatabaseError::MissingKeyColumn { table, column } => {
                assert_eq!(table, "raw_requests");
                assert_eq!(column, "external_id");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_update_partial_key_match_does_not_touch_row() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();

        insert_row(
            conn,
            &RAW_REQUESTS,
            &row(json!({"request_id": 1, "external_id": 2, "calldata": "original"})),
        )
        .unwrap();

        let count = update_by_key(
            conn,
            &RAW_REQUESTS,
            &row(json!({"request_id": 1, "external_id": 3, "calldata": "changed"})),
        )
        .unwrap();
        assert_eq!(count, 0);

        let fetched = fetch_by_key(
            conn,
            &RAW_REQUESTS,
            &row(json!({"request_id": 1, "external_id": 2})),
        )
        .unwrap()
        .unwrap();
        assert_eq!(fetched["calldata"], "original");
    }

    #[test]
    fn test_delete_requires_full_key_match() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();

        upsert_row(
            conn,
            &DELEGATIONS,
            &row(json!({"delegator_address": "d1", "validator_address": "v1", "shares": "5"})),
        )
        .unwrap();

        let count = delete_by_key(
            conn,
            &DELEGATIONS,
            &row(json!({"delegator_address": "d1", "validator_address": "v2"})),
        )
        .unwrap();
        assert_eq!(count, 0);
        assert_eq!(count_rows(conn, &DELEGATIONS).unwrap(), 1);
    }

    #[test]
    fn test_delete_twice_second_is_noop() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let key = row(json!({"delegator_address": "d1", "validator_address": "v1", "shares": "0"}));

        upsert_row(conn, &DELEGATIONS, &key).unwrap();

        assert_eq!(delete_by_key(conn, &DELEGATIONS, &key).unwrap(), 1);
        assert_eq!(delete_by_key(conn, &DELEGATIONS, &key).unwrap(), 0);
        assert_eq!(count_rows(conn, &DELEGATIONS).unwrap(), 0);
    }

    #[test]
    fn test_value_conversion() {
        assert_eq!(to_sql_value(&json!(null)), SqlValue::Null);
        assert_eq!(to_sql_value(&json!(true)), SqlValue::Integer(1));
        assert_eq!(to_sql_value(&json!(false)), SqlValue::Integer(0));
        assert_eq!(to_sql_value(&json!(-5)), SqlValue::Integer(-5));
        assert_eq!(to_sql_value(&json!(0.5)), SqlValue::Real(0.5));
        assert_eq!(to_sql_value(&json!("band")), SqlValue::Text("band".to_string()));
        assert_eq!(
            to_sql_value(&json!([{"type": "send"}])),
            SqlValue::Text(r#"[{"type":"send"}]"#.to_string())
        );
    }

    #[test]
    fn test_u64_beyond_i64_kept_exact() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();

        assert_eq!(
            to_sql_value(&json!(u64::MAX)),
            SqlValue::Text("18446744073709551615".to_string())
        );

        let id = insert_row_returning_id(
            conn,
            &TRANSACTIONS,
            &row(json!({"hash": "big", "gas_limit": u64::MAX, "gas_used": 21000})),
        )
        .unwrap();

        let fetched = fetch_by_key(conn, &TRANSACTIONS, &row(json!({"id": id})))
            .unwrap()
            .unwrap();
        assert_eq!(fetched["gas_used"], 21000);
        let gas_limit: u64 = fetched["gas_limit"].as_str().unwrap().parse().unwrap();
        assert_eq!(gas_limit, u64::MAX);
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("index"), "\"index\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
