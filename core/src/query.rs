//! Query-string encoding for GET arguments.
//!
//! Keys and values are percent-encoded independently as UTF-8. Only the
//! unreserved characters (`A-Z a-z 0-9 - _ . ~`) pass through; a space
//! becomes `%20`.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode a single key or value.
pub fn encode_component(input: &str) -> String {
    utf8_percent_encode(input, QUERY_COMPONENT).to_string()
}

/// Append `args` to `base` as a query string, preserving their order.
///
/// A base that is only `scheme://host[:port]` gets a `/` before the `?`.
/// A base that already carries a query is extended with `&`, and a fragment
/// stays at the end. An empty argument list returns `base` untouched.
pub fn append_query<K, V>(base: &str, args: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    if args.is_empty() {
        return base.to_string();
    }

    let (head, fragment) = match base.find('#') {
        Some(idx) => base.split_at(idx),
        None => (base, ""),
    };
    let (target, query) = match head.find('?') {
        Some(idx) => head.split_at(idx),
        None => (head, ""),
    };

    let mut url = String::with_capacity(base.len() + args.len() * 16 + 1);
    url.push_str(target);
    if lacks_path(target) {
        url.push('/');
    }
    url.push_str(query);
    let mut separator = match query {
        "" => Some('?'),
        q if q.ends_with(['?', '&']) => None,
        _ => Some('&'),
    };
    for (key, value) in args {
        url.extend(separator.replace('&'));
        url.push_str(&encode_component(key.as_ref()));
        url.push('=');
        url.push_str(&encode_component(value.as_ref()));
    }
    url.push_str(fragment);
    url
}

// `url` must already be cut before any query or fragment.
fn lacks_path(url: &str) -> bool {
    match url.find("://") {
        Some(idx) => !url[idx + 3..].contains('/'),
        None => false,
    }
}
