//! Header collection.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

/// First of 256 private-use code points standing for header bytes that are
/// not UTF-8, so that decoded text encodes back to the exact input bytes.
const RAW_BYTE_BASE: u32 = 0x10_FF00;

fn raw_byte(byte: u8) -> char {
    char::from_u32(RAW_BYTE_BASE + u32::from(byte)).unwrap_or(char::REPLACEMENT_CHARACTER)
}

fn is_raw_byte(c: char) -> bool {
    (RAW_BYTE_BASE..=RAW_BYTE_BASE + 0xFF).contains(&u32::from(c))
}

/// Decodes header bytes. Bytes outside valid UTF-8, and UTF-8 sequences that
/// collide with the stand-in range, become one stand-in character each.
pub(crate) fn decode(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        for c in chunk.valid().chars() {
            if is_raw_byte(c) {
                let mut buf = [0; 4];
                text.extend(c.encode_utf8(&mut buf).bytes().map(raw_byte));
            } else {
                text.push(c);
            }
        }
        text.extend(chunk.invalid().iter().copied().map(raw_byte));
    }
    text
}

/// Appends `text` to `out`, writing stand-in characters as their original
/// bytes.
pub(crate) fn encode(text: &str, out: &mut Vec<u8>) {
    for c in text.chars() {
        if is_raw_byte(c) {
            out.push(u8::try_from(u32::from(c) - RAW_BYTE_BASE).unwrap_or(b'?'));
        } else {
            let mut buf = [0; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
    }
}

/// Checks that a header name has no whitespace, control characters or colon.
pub(crate) fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c == ':' || c.is_whitespace() || c.is_control())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    name: String,
    values: Vec<String>,
}

/// Collection of email headers.
///
/// Names are matched case-insensitively but keep the spelling they were
/// first added with. Iteration is ordered by lower-cased name, values of one
/// header keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    headers: BTreeMap<String, Entry>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers
            .entry(name.to_lowercase())
            .or_insert_with(|| Entry {
                name,
                values: Vec::new(),
            })
            .values
            .push(value.into());
    }

    /// Sets a header value, replacing any existing values.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.insert(
            name.to_lowercase(),
            Entry {
                name,
                values: vec![value.into()],
            },
        );
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .and_then(|entry| entry.values.first().map(String::as_str))
    }

    /// Gets all values for a header.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .get(&name.to_lowercase())
            .map(|entry| entry.values.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Checks whether a header is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.headers.contains_key(&name.to_lowercase())
    }

    /// Removes a header and returns its first value.
    pub fn take(&mut self, name: &str) -> Option<String> {
        self.headers
            .remove(&name.to_lowercase())
            .and_then(|entry| entry.values.into_iter().next())
    }

    /// Returns the number of distinct header names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Returns true if there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Returns an iterator over all header name/value pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.values().flat_map(|entry| {
            entry
                .values
                .iter()
                .map(move |v| (entry.name.as_str(), v.as_str()))
        })
    }

    /// Returns an iterator over each header name with all its values.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.headers
            .values()
            .map(|entry| (entry.name.as_str(), entry.values.as_slice()))
    }

    /// Parses a raw header section given as bytes.
    ///
    /// Values that are not UTF-8 are kept losslessly; see [`Self::parse`].
    /// Serializing a parsed message writes them back byte for byte.
    ///
    /// # Errors
    ///
    /// Same as [`Self::parse`].
    pub fn parse_bytes(raw: &[u8]) -> Result<Self> {
        Self::parse(&decode(raw))
    }

    /// Parses a raw header section.
    ///
    /// Folded lines are unfolded with a single space. Parsing stops at the
    /// first empty line.
    ///
    /// # Errors
    ///
    /// Returns an error for a line that is neither a `Name: value` field nor a
    /// continuation of one.
    pub fn parse(text: &str) -> Result<Self> {
        let mut headers = Self::new();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
            if line.is_empty() {
                break;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                let Some((_, value)) = current.as_mut() else {
                    return Err(Error::InvalidHeader(format!(
                        "continuation without a header: {line}"
                    )));
                };
                if !value.is_empty() {
                    value.push(' ');
                }
                value.push_str(line.trim());
                continue;
            }

            if let Some((name, value)) = current.take() {
                headers.add(name, value);
            }

            let Some((name, value)) = line.split_once(':') else {
                return Err(Error::InvalidHeader(line.to_string()));
            };
            let name = name.trim_end();
            if !is_valid_name(name) {
                return Err(Error::InvalidHeader(line.to_string()));
            }
            current = Some((name.to_string(), value.trim().to_string()));
        }

        if let Some((name, value)) = current {
            headers.add(name, value);
        }

        Ok(headers)
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter() {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_add_get() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert!(headers.contains("CONTENT-TYPE"));
    }

    #[test]
    fn test_headers_keep_first_spelling() {
        let mut headers = Headers::new();
        headers.add("DKIM-Signature", "a");
        headers.add("dkim-signature", "b");
        let pairs: Vec<_> = headers.iter().collect();
        assert_eq!(pairs, vec![("DKIM-Signature", "a"), ("DKIM-Signature", "b")]);
    }

    #[test]
    fn test_headers_set_and_take() {
        let mut headers = Headers::new();
        headers.add("To", "alice@example.com");
        headers.add("To", "bob@example.com");
        assert_eq!(headers.get_all("To").len(), 2);

        headers.set("To", "charlie@example.com");
        assert_eq!(headers.get_all("to"), vec!["charlie@example.com"]);

        assert_eq!(headers.take("TO").as_deref(), Some("charlie@example.com"));
        assert!(headers.is_empty());
        assert_eq!(headers.take("To"), None);
    }

    #[test]
    fn test_headers_parse() {
        let text = concat!(
            "From: sender@example.com\r\n",
            "Subject: Test Message\r\n",
            "Content-Type: text/plain;\r\n",
            "\tcharset=utf-8\r\n",
            "Received: from a\r\n",
            "Received: from b\r\n",
            "\r\n",
            "Ignored: body\r\n"
        );

        let headers = Headers::parse(text).unwrap();
        assert_eq!(headers.get("From"), Some("sender@example.com"));
        assert_eq!(
            headers.get("Content-Type"),
            Some("text/plain; charset=utf-8")
        );
        assert_eq!(headers.get_all("received"), vec!["from a", "from b"]);
        assert!(!headers.contains("Ignored"));
        assert_eq!(headers.len(), 4);
    }

    #[test]
    fn test_headers_parse_errors() {
        assert!(Headers::parse("not a header\r\n").is_err());
        assert!(Headers::parse(" folded first\r\n").is_err());
        assert!(Headers::parse(": no name\r\n").is_err());
        assert!(Headers::parse("Bad Name: x\r\n").is_err());
    }

    #[test]
    fn test_parse_bytes_is_lossless() {
        let mut raw = b"Subject: caf\xe9 ".to_vec();
        raw.extend_from_slice("caf\u{e9} \u{10ff41}\r\n".as_bytes());

        let headers = Headers::parse_bytes(&raw).unwrap();
        let value = headers.get("Subject").unwrap();
        assert!(value.starts_with("caf"));
        assert!(value.contains("caf\u{e9}"));

        let mut out = Vec::new();
        encode(value, &mut out);
        assert_eq!(out, &raw[b"Subject: ".len()..raw.len() - 2]);
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("X-Custom"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Bad Name"));
        assert!(!is_valid_name("Bad\tName"));
        assert!(!is_valid_name("Bad:Name"));
    }

    #[test]
    fn test_headers_display_sorted() {
        let mut headers = Headers::new();
        headers.add("X-Zeta", "1");
        headers.add("X-Alpha", "2");
        assert_eq!(headers.to_string(), "X-Alpha: 2\r\nX-Zeta: 1\r\n");
    }
}
