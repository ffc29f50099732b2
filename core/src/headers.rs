//! Request header composition.
//!
//! Headers are an ordered list of `(name, value)` pairs. Names compare
//! case-insensitively but keep the caller's spelling on the wire.

use crate::config::ClientConfig;

pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const COOKIE: &str = "Cookie";
pub const USER_AGENT: &str = "User-Agent";
pub const ACCEPT_LANGUAGE: &str = "Accept-Language";

/// Ordered header list with case-insensitive lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replace every entry named `name` with a single one, keeping the
    /// position of the first.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.0.iter().position(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(idx) => {
                self.0[idx].1 = value;
                let mut i = 0;
                self.0.retain(|(n, _)| {
                    let keep = i <= idx || !n.eq_ignore_ascii_case(name);
                    i += 1;
                    keep
                });
            }
            None => self.0.push((name.to_string(), value)),
        }
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<(String, String)> {
        self.0
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Headers(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// `a=1; b=2`, or `None` when there are no cookies.
pub fn cookie_header<K: AsRef<str>, V: AsRef<str>>(cookies: &[(K, V)]) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    let pairs: Vec<String> = cookies
        .iter()
        .map(|(k, v)| format!("{}={}", k.as_ref(), v.as_ref()))
        .collect();
    Some(pairs.join("; "))
}

/// Merge caller headers with the engine's own.
///
/// Caller headers come first, minus any `Content-Length`. The cookie and
/// multipart `Content-Type` headers replace caller values of the same name.
/// `User-Agent` and `Accept-Language` are added only when missing.
pub fn compose(
    caller: &Headers,
    cookies: Option<String>,
    content_type: Option<String>,
    config: &ClientConfig,
) -> Headers {
    let mut headers = caller.clone();
    headers.remove(CONTENT_LENGTH);
    if let Some(cookie) = cookies {
        headers.set(COOKIE, cookie);
    }
    if let Some(content_type) = content_type {
        headers.set(CONTENT_TYPE, content_type);
    }
    if !headers.contains(USER_AGENT) {
        headers.append(USER_AGENT, config.user_agent.clone());
    }
    if !headers.contains(ACCEPT_LANGUAGE) {
        headers.append(ACCEPT_LANGUAGE, config.accept_language.clone());
    }
    headers
}
