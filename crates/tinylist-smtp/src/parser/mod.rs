//! SMTP response parser.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Parses an SMTP reply from response lines.
///
/// SMTP replies can be single-line or multi-line:
/// - Single: `250 OK\r\n`
/// - Multi: `250-First line\r\n250-Second line\r\n250 Last line\r\n`
///
/// # Errors
///
/// Returns an error if the reply is malformed or the lines disagree on the code.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let Some(first) = lines.first() else {
        return Err(Error::Protocol("Empty reply".into()));
    };

    let code = parse_code(first)?;

    let mut message = Vec::with_capacity(lines.len());
    for line in lines {
        if parse_code(line)? != code {
            return Err(Error::Protocol(format!(
                "Reply code changed mid-reply: {line}"
            )));
        }
        match line.get(4..) {
            Some(text) => message.push(text.to_string()),
            None if line.len() == 3 => message.push(String::new()),
            None => return Err(Error::Protocol(format!("Malformed reply line: {line}"))),
        }
    }

    Ok(Reply::new(code, message))
}

fn parse_code(line: &str) -> Result<ReplyCode> {
    let code_str = line
        .get(0..3)
        .ok_or_else(|| Error::Protocol(format!("Reply too short: {line}")))?;
    code_str
        .parse::<u16>()
        .map(ReplyCode::new)
        .map_err(|_| Error::Protocol(format!("Invalid reply code: {code_str}")))
}

/// Checks if a line is the last line of a multi-line reply.
///
/// Multi-line replies use `-` separator for continuation and ` ` (or nothing)
/// for the last line.
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    line.len() == 3 || (line.len() >= 4 && line.as_bytes()[3] == b' ')
}
