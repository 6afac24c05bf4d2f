//! Table descriptors for the mirror schema.
//!
//! Each entity table is described once here: its name, its columns, and the
//! ordered list of key columns that identify a row. The mutation primitives
//! only ever see a `TableSpec`, so the DDL in `migrations` and these
//! descriptors are the single place that knows the schema.

/// Name, columns, and key columns of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub key_columns: &'static [&'static str],
}

impl TableSpec {
    /// Whether `column` is part of this table's key.
    pub fn is_key(&self, column: &str) -> bool {
        self.key_columns.contains(&column)
    }

    /// Whether `column` exists on this table.
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(&column)
    }
}

pub const BLOCKS: TableSpec = TableSpec {
    name: "blocks",
    columns: &["height", "timestamp", "proposer", "hash", "inflation", "supply"],
    key_columns: &["height"],
};

pub const TRANSACTIONS: TableSpec = TableSpec {
    name: "transactions",
    columns: &[
        "id",
        "hash",
        "block_height",
        "index",
        "gas_used",
        "gas_limit",
        "gas_fee",
        "err_msg",
        "success",
        "sender",
        "memo",
        "messages",
    ],
    key_columns: &["id"],
};

pub const ACCOUNT_TRANSACTIONS: TableSpec = TableSpec {
    name: "account_transactions",
    columns: &["transaction_id", "address"],
    key_columns: &["transaction_id", "address"],
};

pub const ACCOUNTS: TableSpec = TableSpec {
    name: "accounts",
    columns: &["address", "balance"],
    key_columns: &["address"],
};

pub const DATA_SOURCES: TableSpec = TableSpec {
    name: "data_sources",
    columns: &[
        "id",
        "name",
        "description",
        "owner",
        "executable",
        "fee",
        "transaction_id",
    ],
    key_columns: &["id"],
};

pub const ORACLE_SCRIPTS: TableSpec = TableSpec {
    name: "oracle_scripts",
    columns: &[
        "id",
        "name",
        "description",
        "owner",
        "schema",
        "codehash",
        "source_code_url",
        "transaction_id",
    ],
    key_columns: &["id"],
};

pub const REQUESTS: TableSpec = TableSpec {
    name: "requests",
    columns: &[
        "id",
        "oracle_script_id",
        "calldata",
        "ask_count",
        "min_count",
        "sender",
        "client_id",
        "request_time",
        "resolve_status",
        "resolve_time",
        "result",
        "transaction_id",
    ],
    key_columns: &["id"],
};

pub const RAW_REQUESTS: TableSpec = TableSpec {
    name: "raw_requests",
    columns: &["request_id", "external_id", "data_source_id", "calldata"],
    key_columns: &["request_id", "external_id"],
};

pub const VAL_REQUESTS: TableSpec = TableSpec {
    name: "val_requests",
    columns: &["request_id", "validator"],
    key_columns: &["request_id", "validator"],
};

pub const REPORTS: TableSpec = TableSpec {
    name: "reports",
    columns: &["request_id", "validator", "transaction_id", "reporter"],
    key_columns: &["request_id", "validator"],
};

pub const RAW_REPORTS: TableSpec = TableSpec {
    name: "raw_reports",
    columns: &["request_id", "external_id", "validator", "data", "exit_code"],
    key_columns: &["request_id", "external_id"],
};

pub const VALIDATORS: TableSpec = TableSpec {
    name: "validators",
    columns: &[
        "operator_address",
        "consensus_address",
        "moniker",
        "identity",
        "website",
        "details",
        "commission_rate",
        "commission_max_rate",
        "commission_max_change",
        "min_self_delegation",
        "tokens",
        "jailed",
        "delegator_shares",
        "current_reward",
        "current_ratio",
    ],
    key_columns: &["operator_address"],
};

pub const DELEGATIONS: TableSpec = TableSpec {
    name: "delegations",
    columns: &["delegator_address", "validator_address", "shares", "last_ratio"],
    key_columns: &["delegator_address", "validator_address"],
};

pub const VALIDATOR_VOTES: TableSpec = TableSpec {
    name: "validator_votes",
    columns: &["block_height", "consensus_address", "voted"],
    key_columns: &["block_height", "consensus_address", "voted"],
};

/// Every entity table, in creation order.
pub const ALL_TABLES: &[TableSpec] = &[
    BLOCKS,
    TRANSACTIONS,
    ACCOUNT_TRANSACTIONS,
    ACCOUNTS,
    DATA_SOURCES,
    ORACLE_SCRIPTS,
    REQUESTS,
    RAW_REQUESTS,
    VAL_REQUESTS,
    REPORTS,
    RAW_REPORTS,
    VALIDATORS,
    DELEGATIONS,
    VALIDATOR_VOTES,
];
