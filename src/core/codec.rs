//! # Reply Codec
//!
//! The wire message has a single free-text column, so reply metadata rides
//! inside the body as a bracketed prefix:
//!
//! ```text
//! [reply:<percent-encoded id>:<percent-encoded preview>] actual body
//! ```
//!
//! The model carries `Message::reply_to` as a real field; this codec is only
//! the translation layer at the wire boundary. Percent-encoding matches what
//! browser clients produce with `encodeURIComponent`, so messages written by
//! either client decode the same way.

use std::sync::LazyLock;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use regex::Regex;

use crate::core::model::ReplyReference;

/// Characters left unescaped by `encodeURIComponent`.
pub(crate) const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

static REPLY_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[reply:([^:\]]+):([^\]]*)\]\s*").expect("reply prefix pattern is valid"));

/// A wire body split into display text and optional reply pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBody {
    pub body: String,
    pub reply: Option<ReplyReference>,
}

/// Prefixes `body` with the reply token. Identity when `reply` is `None`
/// or either of its fields is empty.
///
/// Leading whitespace in `body` does not survive `decode`: the separator
/// after the token absorbs it.
pub fn encode(body: &str, reply: Option<&ReplyReference>) -> String {
    match reply {
        Some(r) if !r.target_id.is_empty() && !r.preview.is_empty() => format!(
            "[reply:{}:{}] {}",
            utf8_percent_encode(&r.target_id, URI_COMPONENT),
            utf8_percent_encode(&r.preview, URI_COMPONENT),
            body
        ),
        _ => body.to_string(),
    }
}

/// Strips a leading reply token, if any.
pub fn decode(raw: &str) -> DecodedBody {
    let Some(caps) = REPLY_PREFIX.captures(raw) else {
        return DecodedBody {
            body: raw.to_string(),
            reply: None,
        };
    };

    // Group 0 always exists on a match; 1 and 2 are non-optional in the pattern.
    let (Some(whole), Some(id), Some(preview)) = (caps.get(0), caps.get(1), caps.get(2)) else {
        return DecodedBody {
            body: raw.to_string(),
            reply: None,
        };
    };

    DecodedBody {
        body: raw[whole.end()..].to_string(),
        reply: Some(ReplyReference {
            target_id: decode_component(id.as_str()),
            preview: decode_component(preview.as_str()),
        }),
    }
}

/// Percent-decodes like `decodeURIComponent`. A malformed escape (a `%` not
/// followed by two hex digits) or invalid UTF-8 leaves the raw text.
fn decode_component(text: &str) -> String {
    let bytes = text.as_bytes();
    let well_formed = bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'%')
        .all(|(i, _)| bytes.get(i + 1..i + 3).is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit)));
    if !well_formed {
        return text.to_string();
    }
    percent_decode_str(text)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| text.to_string())
}
