//! # tinylist-smtp
//!
//! The outbound half of tinylist: a small SMTP submission client that hands
//! one message to one relay per transaction.
//!
//! ## Features
//!
//! - **Type-state connection management**: `MAIL FROM` can only follow a
//!   greeting, `DATA` can only follow a `RCPT TO`
//! - **TLS support**: implicit TLS (port 465) and STARTTLS, verified against
//!   the webpki root store
//! - **Authentication**: AUTH PLAIN
//! - **Extensions**: SIZE, 8BITMIME, STARTTLS, AUTH discovery from EHLO
//!
//! ## Quick Start
//!
//! ```ignore
//! use tinylist_smtp::{Address, Client};
//! use tinylist_smtp::connection::connect;
//!
//! #[tokio::main]
//! async fn main() -> tinylist_smtp::Result<()> {
//!     let stream = connect("smtp.example.com", 587).await?;
//!     let client = Client::from_stream(stream).await?;
//!     let client = client.ehlo("lists.example.com").await?;
//!     let client = client.starttls("smtp.example.com").await?;
//!
//!     let from = Address::new("bounces+dev=example.com@example.com")?;
//!     let to = Address::new("subscriber@example.org")?;
//!
//!     let client = client.mail_from(from, None).await?;
//!     let client = client.rcpt_to(to).await?;
//!     let client = client.data().await?;
//!     let client = client.send_message(b"Subject: hi\r\n\r\nHello\r\n").await?;
//!     client.quit().await
//! }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! ┌──────────────┐
//! │  Connected   │ ─── auth_plain() ───→ Authenticated
//! └──────────────┘                            │
//!        │                                    │
//!        └─── mail_from() ───→ MailTransaction ←┘
//!                                   │
//!                       rcpt_to() ──┴──→ RecipientAdded ─── data() ───→ Data
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use connection::{
    Authenticated, Client, Connected, Data, MailTransaction, RecipientAdded, ServerInfo,
    SmtpConnection,
};
pub use error::{Error, Result};
pub use types::{Address, AuthMechanism, Extension, Reply, ReplyCode};
