//! Kind-keyed routing of notifications to mutation handlers.
//!
//! The handler table is built once from the [`CatalogPolicy`]; routing looks
//! only at the notification's kind, never at its payload.

use crate::handlers::{self, HandlerFn};
use crate::{FlushError, FlushResult, MessageKind, Notification};
use mirror_config_and_utils::CatalogPolicy;
use mirror_database::schema;
use rusqlite::Connection;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Outcome of one dispatched notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub kind: MessageKind,
    pub rows_affected: usize,
}

/// Message kind → handler table.
pub struct Dispatcher {
    handlers: HashMap<MessageKind, HandlerFn>,
    catalog_policy: CatalogPolicy,
}

impl Dispatcher {
    /// Register the handler of every kind the deployment accepts.
    pub fn new(catalog_policy: CatalogPolicy) -> Self {
        let mut dispatcher = Self {
            handlers: HashMap::new(),
            catalog_policy,
        };

        dispatcher.register(MessageKind::NewBlock, handlers::insert(schema::BLOCKS));
        dispatcher.register(MessageKind::NewTransaction, handlers::insert_transaction());
        dispatcher.register(MessageKind::SetAccount, handlers::upsert(schema::ACCOUNTS));

        match catalog_policy {
            CatalogPolicy::InsertOnly => {
                dispatcher.register(
                    MessageKind::NewDataSource,
                    handlers::insert(schema::DATA_SOURCES),
                );
                dispatcher.register(
                    MessageKind::NewOracleScript,
                    handlers::insert(schema::ORACLE_SCRIPTS),
                );
            }
            CatalogPolicy::Upsert => {
                dispatcher.register(
                    MessageKind::SetDataSource,
                    handlers::upsert(schema::DATA_SOURCES),
                );
                dispatcher.register(
                    MessageKind::SetOracleScript,
                    handlers::upsert(schema::ORACLE_SCRIPTS),
                );
            }
        }

        dispatcher.register(MessageKind::NewRequest, handlers::insert(schema::REQUESTS));
        dispatcher.register(MessageKind::UpdateRequest, handlers::update(schema::REQUESTS));
        dispatcher.register(MessageKind::NewRawRequest, handlers::insert(schema::RAW_REQUESTS));
        dispatcher.register(MessageKind::NewValRequest, handlers::insert(schema::VAL_REQUESTS));
        dispatcher.register(MessageKind::NewReport, handlers::insert(schema::REPORTS));
        dispatcher.register(MessageKind::NewRawReport, handlers::insert(schema::RAW_REPORTS));

        dispatcher.register(MessageKind::SetValidator, handlers::upsert(schema::VALIDATORS));
        dispatcher.register(MessageKind::UpdateValidator, handlers::update(schema::VALIDATORS));
        dispatcher.register(MessageKind::SetDelegation, handlers::upsert(schema::DELEGATIONS));
        dispatcher.register(MessageKind::RemoveDelegation, handlers::delete(schema::DELEGATIONS));
        dispatcher.register(
            MessageKind::NewValidatorVote,
            handlers::insert(schema::VALIDATOR_VOTES),
        );

        debug!(
            kinds = dispatcher.handlers.len(),
            catalog_policy = %catalog_policy,
            "Dispatcher ready"
        );
        dispatcher
    }

    /// Register a handler for a kind, replacing any earlier one.
    pub fn register(&mut self, kind: MessageKind, handler: HandlerFn) {
        self.handlers.insert(kind, handler);
    }

    /// Route a notification to its kind's handler.
    pub fn dispatch(&self, conn: &Connection, notification: Notification) -> FlushResult<Applied> {
        let kind = notification.kind;
        let handler = self.handlers.get(&kind).ok_or_else(|| {
            warn!(kind = %kind, catalog_policy = %self.catalog_policy, "No handler registered");
            FlushError::UnknownKind(kind.to_string())
        })?;

        let rows_affected = handler(conn, notification.payload)?;
        debug!(kind = %kind, rows_affected, "Applied notification");
        Ok(Applied {
            kind,
            rows_affected,
        })
    }

    /// Registered kinds, in declaration order.
    pub fn kinds(&self) -> Vec<MessageKind> {
        let mut kinds: Vec<MessageKind> = self.handlers.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn is_registered(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn catalog_policy(&self) -> CatalogPolicy {
        self.catalog_policy
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(CatalogPolicy::default())
    }
}
