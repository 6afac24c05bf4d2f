//! Write path of the chain mirror.
//!
//! Notifications arrive as `(kind, payload)` pairs. The [`Dispatcher`]
//! routes each one by kind to a handler that encodes its entity's write
//! policy, and the [`Flusher`] groups them into blocks, each applied in a
//! single SQL transaction.
//!
//! ```ignore
//! let flusher = Flusher::new(Dispatcher::new(config.catalog_policy));
//! let summary = flusher.run(db.connection_mut(), std::io::stdin().lock())?;
//! ```

mod dispatcher;
mod error;
mod flusher;
pub mod handlers;
pub mod notification;

pub use dispatcher::{Applied, Dispatcher};
pub use error::{FlushError, FlushResult};
pub use flusher::{Block, BlockAssembler, FlushSummary, Flusher, Step};
pub use notification::{decode_line, Message, MessageKind, Notification};
