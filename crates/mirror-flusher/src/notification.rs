//! Message kinds and the line format of the notification stream.
//!
//! Each line is one JSON object `{"key": "<KIND>", "value": {…}}`, the shape
//! the chain emitter publishes. `COMMIT` closes a block and is handled by
//! the driver; every other key names a [`MessageKind`].

use crate::{FlushError, FlushResult};
use mirror_database::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Stream key of the end-of-block marker.
pub const COMMIT_KEY: &str = "COMMIT";

/// Every state-change notification the emitter produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    // Blocks and transactions
    NewBlock,
    NewTransaction,
    SetAccount,

    // Oracle catalog
    NewDataSource,
    SetDataSource,
    NewOracleScript,
    SetOracleScript,

    // Requests and reports
    NewRequest,
    UpdateRequest,
    NewRawRequest,
    NewValRequest,
    NewReport,
    NewRawReport,

    // Staking
    SetValidator,
    UpdateValidator,
    SetDelegation,
    RemoveDelegation,
    NewValidatorVote,
}

impl MessageKind {
    pub const ALL: [MessageKind; 18] = [
        MessageKind::NewBlock,
        MessageKind::NewTransaction,
        MessageKind::SetAccount,
        MessageKind::NewDataSource,
        MessageKind::SetDataSource,
        MessageKind::NewOracleScript,
        MessageKind::SetOracleScript,
        MessageKind::NewRequest,
        MessageKind::UpdateRequest,
        MessageKind::NewRawRequest,
        MessageKind::NewValRequest,
        MessageKind::NewReport,
        MessageKind::NewRawReport,
        MessageKind::SetValidator,
        MessageKind::UpdateValidator,
        MessageKind::SetDelegation,
        MessageKind::RemoveDelegation,
        MessageKind::NewValidatorVote,
    ];

    /// The wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::NewBlock => "NEW_BLOCK",
            MessageKind::NewTransaction => "NEW_TRANSACTION",
            MessageKind::SetAccount => "SET_ACCOUNT",
            MessageKind::NewDataSource => "NEW_DATA_SOURCE",
            MessageKind::SetDataSource => "SET_DATA_SOURCE",
            MessageKind::NewOracleScript => "NEW_ORACLE_SCRIPT",
            MessageKind::SetOracleScript => "SET_ORACLE_SCRIPT",
            MessageKind::NewRequest => "NEW_REQUEST",
            MessageKind::UpdateRequest => "UPDATE_REQUEST",
            MessageKind::NewRawRequest => "NEW_RAW_REQUEST",
            MessageKind::NewValRequest => "NEW_VAL_REQUEST",
            MessageKind::NewReport => "NEW_REPORT",
            MessageKind::NewRawReport => "NEW_RAW_REPORT",
            MessageKind::SetValidator => "SET_VALIDATOR",
            MessageKind::UpdateValidator => "UPDATE_VALIDATOR",
            MessageKind::SetDelegation => "SET_DELEGATION",
            MessageKind::RemoveDelegation => "REMOVE_DELEGATION",
            MessageKind::NewValidatorVote => "NEW_VALIDATOR_VOTE",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = FlushError;

    /// Case-insensitive: `new_block` and `NEW_BLOCK` are the same kind.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| FlushError::UnknownKind(s.to_string()))
    }
}

/// One state-change notification: a kind tag plus a flat payload whose
/// keys are column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: MessageKind,
    pub payload: Row,
}

impl Notification {
    pub fn new(kind: MessageKind, payload: Row) -> Self {
        Self { kind, payload }
    }

    /// Build from a JSON value, which must be an object.
    pub fn from_value(kind: MessageKind, value: Value) -> FlushResult<Self> {
        match value {
            Value::Object(payload) => Ok(Self { kind, payload }),
            other => Err(FlushError::malformed(
                kind.as_str(),
                format!("payload must be a JSON object, got {}", json_type(&other)),
            )),
        }
    }

    /// The `height` field, as carried by `NEW_BLOCK`.
    pub fn height(&self) -> Option<i64> {
        self.payload.get("height").and_then(Value::as_i64)
    }
}

/// One decoded stream line.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A notification to dispatch.
    Notify(Notification),
    /// End of the block at `height`.
    Commit { height: i64 },
}

/// Wire shape of a stream line.
#[derive(Debug, Deserialize)]
struct RawMessage {
    key: String,
    #[serde(default)]
    value: Value,
}

/// Decode one stream line. `line` is 1-based and only used for errors.
///
/// Returns `None` for blank lines.
pub fn decode_line(line: usize, text: &str) -> FlushResult<Option<Message>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let raw: RawMessage =
        serde_json::from_str(text).map_err(|source| FlushError::Decode { line, source })?;

    if raw.key.eq_ignore_ascii_case(COMMIT_KEY) {
        let height = raw
            .value
            .get("height")
            .and_then(Value::as_i64)
            .ok_or_else(|| FlushError::malformed(COMMIT_KEY, "missing integer field 'height'"))?;
        return Ok(Some(Message::Commit { height }));
    }

    let kind: MessageKind = raw.key.parse()?;
    Notification::from_value(kind, raw.value).map(|n| Some(Message::Notify(n)))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
