//! Response charset resolution and body decoding.
//!
//! Resolution order: the transport-reported content encoding, then the
//! `charset=` parameter of `Content-Type`, then UTF-8. Unknown labels decode
//! as UTF-8 with a warning.

use encoding_rs::Encoding;
use log::warn;

pub const DEFAULT_CHARSET: &str = "UTF-8";

/// Pick the charset name for a response body.
pub fn resolve_charset(content_encoding: Option<&str>, content_type: Option<&str>) -> String {
    if let Some(encoding) = content_encoding.map(str::trim).filter(|e| !e.is_empty()) {
        return encoding.to_string();
    }
    content_type
        .and_then(charset_param)
        .unwrap_or(DEFAULT_CHARSET)
        .to_string()
}

// The parameter runs to the next `;` or the end of the header value.
fn charset_param(content_type: &str) -> Option<&str> {
    let lower = content_type.to_ascii_lowercase();
    let start = lower.find("charset=")? + "charset=".len();
    let rest = &content_type[start..];
    let value = rest.split(';').next().unwrap_or(rest).trim().trim_matches('"');
    (!value.is_empty()).then_some(value)
}

/// Look up an encoding by label, falling back to UTF-8.
pub fn encoding_for(charset: &str) -> &'static Encoding {
    Encoding::for_label(charset.trim().as_bytes()).unwrap_or_else(|| {
        warn!("unknown charset {charset:?}, decoding as {DEFAULT_CHARSET}");
        encoding_rs::UTF_8
    })
}

/// Decode `bytes` and rejoin its lines with `\r\n`.
pub fn decode_body(bytes: &[u8], charset: &str) -> String {
    let (text, _, _) = encoding_for(charset).decode(bytes);
    join_lines(&text)
}

/// Split on `\n`, `\r\n` or a lone `\r` and join with `\r\n`, with no
/// separator after the last line.
pub fn join_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut lines = text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l)).peekable();
    let mut first = true;
    while let Some(line) = lines.next() {
        if lines.peek().is_none() && line.is_empty() {
            break;
        }
        for (i, piece) in line.split('\r').enumerate() {
            if !first || i > 0 {
                out.push_str("\r\n");
            }
            out.push_str(piece);
        }
        first = false;
    }
    out
}
