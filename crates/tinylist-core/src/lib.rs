//! # tinylist-core
//!
//! The mailing-list engine behind tinylist.
//!
//! This crate provides:
//! - List definitions and subscriptions with bounce bookkeeping
//! - The [`ListStore`] registry with `SQLite`, `MySQL` and in-memory backends
//! - The exponential bounce backoff policy
//! - The [`Bot`]: classifies an inbound message as a command, a bounce or a
//!   list post and acts on it
//! - VERP delivery through a pluggable [`Transport`]

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod bot;
pub mod bounce;
pub mod config;
pub mod delivery;
mod error;
pub mod list;
pub mod store;

pub use bot::Bot;
pub use config::{BotConfig, Security, SmtpConfig};
pub use delivery::{
    DebugTransport, DeliveryError, SentMessage, SmtpTransport, Transport, TransportError,
};
pub use error::{Error, Result};
pub use list::{ArchivedMessage, Definition, List, Subscription};
pub use store::{ListStore, MemoryStore, MySqlStore, SqliteStore};
