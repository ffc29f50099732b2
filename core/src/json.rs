//! JSON helpers layered over the string calls.

use serde::de::DeserializeOwned;

use crate::client::{Request, Response};
use crate::error::Error;
use crate::headers::Headers;
use crate::http::HttpMethod;
use crate::multipart::Form;

impl Response {
    /// Decode the body text as JSON.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, Error> {
        let text = self.text()?;
        serde_json::from_str(&text).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

impl Error {
    /// Re-wrap an [`Error::Http`] whose body is a JSON object as
    /// [`Error::HttpJson`]. Every other error, including an `Http` error with
    /// a non-JSON body, is returned unchanged.
    pub fn reinterpret_json(self) -> Error {
        match self {
            Error::Http { status, body } => match serde_json::from_str::<serde_json::Value>(&body) {
                Ok(json) if json.is_object() => Error::HttpJson { status, body: json },
                _ => Error::Http { status, body },
            },
            other => other,
        }
    }
}

fn send_json<T: DeserializeOwned>(request: Request) -> Result<T, Error> {
    request.send().map_err(Error::reinterpret_json)?.json()
}

fn with_args<K: AsRef<str>, V: AsRef<str>>(request: Request, headers: &Headers, args: &[(K, V)]) -> Request {
    args.iter()
        .fold(request.headers(headers), |req, (k, v)| req.query(k.as_ref(), v.as_ref()))
}

/// GET `url` and decode the JSON body. JSON error bodies surface as [`Error::HttpJson`].
pub fn get_json<T, K, V>(url: &str, headers: &Headers, args: &[(K, V)]) -> Result<T, Error>
where
    T: DeserializeOwned,
    K: AsRef<str>,
    V: AsRef<str>,
{
    send_json(with_args(Request::new(HttpMethod::Get, url), headers, args))
}

/// POST `form` and decode the JSON body. JSON error bodies surface as [`Error::HttpJson`].
pub fn post_json<T, K, V>(url: &str, headers: &Headers, args: &[(K, V)], form: Form) -> Result<T, Error>
where
    T: DeserializeOwned,
    K: AsRef<str>,
    V: AsRef<str>,
{
    send_json(with_args(Request::new(HttpMethod::Post, url), headers, args).form(form))
}
