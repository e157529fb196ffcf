//! Message structure, reply and redistribution copies.

use crate::address::{Mailbox, parse_address_list};
use crate::error::{Error, Result};
use crate::header::{self, Headers};
use chrono::Local;

/// Headers that never survive redistribution.
const STRIPPED_ON_RESEND: &[&str] = &[
    "Received",
    "X-Original-To",
    "X-Received",
    "Delivered-To",
    "Return-Path",
    "Sender",
    "ARC-Authentication-Results",
    "ARC-Message-Signature",
    "ARC-Seal",
    "X-Spamd-Result",
];

/// Headers a redistribution copy writes itself.
const REPLACED_ON_RESEND: &[&str] = &["X-Mailing-List", "List-ID", "List-Unsubscribe"];

/// The list identity a message is redistributed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListIdentity {
    /// Human readable list name.
    pub name: String,
    /// List address.
    pub address: String,
    /// Address that accepts `unsubscribe` commands, when members may leave
    /// on their own.
    pub unsubscribe: Option<String>,
}

/// A parsed email message.
///
/// Well-known fields are held separately from the remaining headers. An
/// empty string means the field is absent. Header bytes that are not UTF-8
/// are held as private-use stand-in characters, which [`Message::serialize`]
/// writes back as the original bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Subject.
    pub subject: String,
    /// From header (raw address list).
    pub from: String,
    /// To header (raw address list).
    pub to: String,
    /// Cc header (raw address list).
    pub cc: String,
    /// Bcc header (raw address list).
    pub bcc: String,
    /// Date.
    pub date: String,
    /// Message-Id.
    pub message_id: String,
    /// In-Reply-To.
    pub in_reply_to: String,
    /// Content-Type.
    pub content_type: String,
    /// MIME-Version.
    pub mime_version: String,
    /// Precedence.
    pub precedence: String,
    /// List identification, written as X-Mailing-List, List-ID and Sender.
    pub list_id: String,
    /// List-Unsubscribe.
    pub list_unsubscribe: String,
    /// All other headers.
    pub headers: Headers,
    /// Raw body.
    pub body: Vec<u8>,
}

impl Message {
    /// Parses a raw RFC 5322 message.
    ///
    /// A leading mbox `From ` separator line, as some delivery agents prepend,
    /// is skipped. The body is kept byte for byte.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, has no headers or contains a
    /// malformed header line.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::Empty);
        }

        let raw = skip_mbox_separator(raw);
        let (head, body) = split_header_block(raw);
        let mut headers = Headers::parse_bytes(head)?;
        if headers.is_empty() {
            return Err(Error::MissingHeaders);
        }

        let mut take = |name: &str| headers.take(name).unwrap_or_default();
        Ok(Self {
            subject: take("Subject"),
            from: take("From"),
            to: take("To"),
            cc: take("Cc"),
            bcc: take("Bcc"),
            date: take("Date"),
            message_id: take("Message-Id"),
            in_reply_to: take("In-Reply-To"),
            content_type: take("Content-Type"),
            mime_version: take("MIME-Version"),
            precedence: take("Precedence"),
            list_id: String::new(),
            list_unsubscribe: String::new(),
            headers,
            body: body.to_vec(),
        })
    }

    /// Builds a reply to this message with an empty body.
    #[must_use]
    pub fn reply(&self) -> Self {
        Self {
            subject: format!("Re: {}", self.subject),
            to: self.from.clone(),
            in_reply_to: self.message_id.clone(),
            date: Local::now().to_rfc2822(),
            mime_version: "1.0".to_string(),
            content_type: "text/plain; charset=utf-8".to_string(),
            ..Self::default()
        }
    }

    /// Builds the copy of this message that is redistributed to a list.
    ///
    /// Subject, From and body are carried over byte for byte so that
    /// signatures stay valid. Transport trace headers are dropped. Every
    /// copied value, including Subject and From, is cut at the first CR or
    /// LF.
    #[must_use]
    pub fn resend_as(&self, list: &ListIdentity) -> Self {
        let identity = format!("{} <{}>", list.name, list.address);

        let bcc = parse_address_list(&self.bcc)
            .unwrap_or_default()
            .iter()
            .any(|m| m.address.eq_ignore_ascii_case(&list.address))
            .then(|| identity.clone())
            .unwrap_or_default();

        let list_unsubscribe = list
            .unsubscribe
            .as_ref()
            .map(|command| {
                format!(
                    "<mailto:{command}?subject=unsubscribe%20{}>",
                    list.address
                )
            })
            .unwrap_or_default();

        let mut headers = Headers::new();
        for (name, values) in self.headers.entries() {
            let dropped = STRIPPED_ON_RESEND
                .iter()
                .chain(REPLACED_ON_RESEND)
                .any(|h| h.eq_ignore_ascii_case(name));
            if dropped || !header::is_valid_name(name) {
                continue;
            }
            for value in values {
                headers.add(name, single_line(value));
            }
        }

        Self {
            subject: copied(&self.subject),
            from: copied(&self.from),
            body: self.body.clone(),
            to: copied(&self.to),
            cc: copied(&self.cc),
            bcc,
            date: copied(&self.date),
            message_id: copied(&self.message_id),
            in_reply_to: copied(&self.in_reply_to),
            mime_version: copied(&self.mime_version),
            content_type: copied(&self.content_type),
            precedence: "list".to_string(),
            list_id: identity,
            list_unsubscribe,
            headers,
        }
    }

    /// Serializes the message with a fixed header order and CRLF line endings.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 1024);
        let mut field = |name: &str, value: &str| {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            header::encode(value, &mut out);
            out.extend_from_slice(b"\r\n");
        };

        field("From", &self.from);
        field("To", &self.to);
        for (name, value) in [
            ("Cc", &self.cc),
            ("Bcc", &self.bcc),
            ("Date", &self.date),
            ("Message-Id", &self.message_id),
            ("In-Reply-To", &self.in_reply_to),
            ("Precedence", &self.precedence),
            ("X-Mailing-List", &self.list_id),
            ("List-ID", &self.list_id),
            ("Sender", &self.list_id),
            ("List-Unsubscribe", &self.list_unsubscribe),
        ] {
            if !value.is_empty() {
                field(name, value);
            }
        }
        for (name, value) in self.headers.iter() {
            field(name, value);
        }
        for (name, value) in [
            ("MIME-Version", &self.mime_version),
            ("Content-Type", &self.content_type),
        ] {
            if !value.is_empty() {
                field(name, value);
            }
        }
        field("Subject", &self.subject);
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }

    /// Returns the first mailbox of the From header.
    ///
    /// # Errors
    ///
    /// Returns an error if From is missing or malformed.
    pub fn sender(&self) -> Result<Mailbox> {
        Mailbox::parse(&self.from)
    }

    /// Returns every address in To, Cc and Bcc, in header order.
    ///
    /// A header that fails to parse contributes nothing.
    #[must_use]
    pub fn recipients(&self) -> Vec<String> {
        [&self.to, &self.cc, &self.bcc]
            .into_iter()
            .flat_map(|value| parse_address_list(value).unwrap_or_default())
            .map(|mailbox| mailbox.address)
            .collect()
    }
}

fn single_line(value: &str) -> &str {
    value
        .find(['\r', '\n'])
        .map_or(value, |end| &value[..end])
}

fn copied(value: &str) -> String {
    single_line(value).to_string()
}

fn skip_mbox_separator(raw: &[u8]) -> &[u8] {
    if raw.starts_with(b"From ") {
        let next = raw
            .iter()
            .position(|&b| b == b'\n')
            .map_or(raw.len(), |i| i + 1);
        &raw[next..]
    } else {
        raw
    }
}

/// Splits at the first empty line; a message without one is all headers.
fn split_header_block(raw: &[u8]) -> (&[u8], &[u8]) {
    let mut offset = 0;
    while offset < raw.len() {
        let end = raw[offset..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(raw.len(), |i| offset + i + 1);
        let line = &raw[offset..end];
        if line == b"\n" || line == b"\r\n" {
            return (&raw[..offset], &raw[end..]);
        }
        offset = end;
    }
    (raw, &[])
}
