use mailparse::{MailHeaderMap, ParsedMail};

use super::{MessageHandle, RawMessage};
use crate::error::MailboxError;

/// Decode a full RFC 822 message into sender, subject and plain-text body.
///
/// Only a structurally broken message is an error. Undecodable headers and
/// bodies degrade to their raw bytes.
pub fn parse_message(handle: MessageHandle, raw: &[u8]) -> Result<RawMessage, MailboxError> {
    let parsed = mailparse::parse_mail(raw).map_err(|e| MailboxError::Decode {
        handle,
        reason: e.to_string(),
    })?;

    Ok(RawMessage {
        sender: header_text(&parsed, "From"),
        subject: header_text(&parsed, "Subject"),
        body: extract_body(&parsed),
    })
}

fn header_text(parsed: &ParsedMail, key: &str) -> String {
    let Some(header) = parsed.headers.get_first_header(key) else {
        return String::new();
    };

    let decoded = header.get_value();
    if decoded.trim().is_empty() {
        String::from_utf8_lossy(header.get_value_raw())
            .trim()
            .to_string()
    } else {
        decoded.trim().to_string()
    }
}

fn extract_body(parsed: &ParsedMail) -> String {
    let mut plain = Vec::new();
    collect_plain_text(parsed, &mut plain);
    if !plain.is_empty() {
        return plain.concat();
    }

    if parsed.subparts.is_empty() {
        return part_body(parsed);
    }

    // No text/plain anywhere: take the first leaf that decodes to something.
    first_leaf_body(parsed).unwrap_or_default()
}

fn collect_plain_text(part: &ParsedMail, out: &mut Vec<String>) {
    if part.subparts.is_empty() {
        if part.ctype.mimetype == "text/plain" {
            out.push(part_body(part));
        }
        return;
    }

    for sub in &part.subparts {
        collect_plain_text(sub, out);
    }
}

fn first_leaf_body(part: &ParsedMail) -> Option<String> {
    if part.subparts.is_empty() {
        let body = part_body(part);
        return (!body.trim().is_empty()).then_some(body);
    }
    part.subparts.iter().find_map(first_leaf_body)
}

fn part_body(part: &ParsedMail) -> String {
    match part.get_body() {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!(
                mimetype = %part.ctype.mimetype,
                error = %e,
                "Falling back to raw body bytes"
            );
            part.get_body_raw()
                .map(|raw| String::from_utf8_lossy(&raw).into_owned())
                .unwrap_or_default()
        }
    }
}
