//! # tinylist-mime
//!
//! The message model of tinylist: parsing an inbound email, building the
//! reply a command gets and the copy a list redistributes.
//!
//! ## Quick Start
//!
//! ```ignore
//! use tinylist_mime::{ListIdentity, Message};
//!
//! let raw = b"From: alice@example.com\r\nTo: dev@example.com\r\nSubject: hi\r\n\r\nHello\r\n";
//! let message = Message::parse(raw)?;
//!
//! let copy = message.resend_as(&ListIdentity {
//!     name: "Developers".into(),
//!     address: "dev@example.com".into(),
//!     unsubscribe: Some("lists@example.com".into()),
//! });
//! let bytes = copy.serialize();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod error;
mod header;
mod message;

pub use address::{Mailbox, is_valid_address, parse_address_list};
pub use error::{Error, Result};
pub use header::Headers;
pub use message::{ListIdentity, Message};
