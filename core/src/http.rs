//! Transport boundary.
//!
//! # Design
//! [`HttpRequest`] is a fully built request described as data: final URL,
//! composed headers, the multipart body with its precomputed length, and the
//! trust policy for secure connections. A [`Transport`] turns it into a
//! [`RawResponse`] and knows nothing about forms, charsets or status
//! interpretation. [`ReqwestTransport`] is the blocking implementation used
//! by default; tests can substitute their own.

use std::fmt;
use std::io::Read;
use std::time::Duration;

use log::debug;

use crate::error::Error;
use crate::headers::Headers;
use crate::multipart::MultipartBody;
use crate::trust::{self, FailureSlot, TrustPolicy};

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request ready to hand to a [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub body: Option<MultipartBody>,
    pub trust: TrustPolicy,
    pub connect_timeout: Duration,
}

impl HttpRequest {
    pub fn is_secure(&self) -> bool {
        self.url
            .get(..8)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("https://"))
    }
}

/// What came back from the server, body unread.
pub struct RawResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: Box<dyn Read + Send>,
}

impl fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Executes one request. Implementations must not retry.
pub trait Transport {
    fn execute(&self, request: HttpRequest) -> Result<RawResponse, Error>;
}

/// Blocking transport over reqwest and rustls. A new client, and therefore
/// a new connection, is built for every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestTransport;

impl Transport for ReqwestTransport {
    fn execute(&self, request: HttpRequest) -> Result<RawResponse, Error> {
        // Only connecting is bounded; the client's default total deadline is off.
        let mut builder = reqwest::blocking::Client::builder()
            .connect_timeout(request.connect_timeout)
            .timeout(None::<Duration>);
        let mut slot: Option<FailureSlot> = None;
        if request.is_secure() {
            let (tls, failures) = trust::client_config(&request.trust)?;
            builder = builder.use_preconfigured_tls(tls);
            slot = Some(failures);
        }
        let client = builder
            .build()
            .map_err(|e| Error::transport(error_chain(&e)))?;

        debug!("connecting to {}", request.url);
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        };
        let mut outgoing = client.request(method, &request.url);
        for (name, value) in request.headers.iter() {
            outgoing = outgoing.header(name, value);
        }
        match (request.method, request.body) {
            (HttpMethod::Post, Some(body)) => {
                let len = body.len();
                let reader = body.into_reader()?;
                debug!("streaming {len} byte multipart body");
                outgoing = outgoing.body(reqwest::blocking::Body::sized(reader, len));
            }
            (HttpMethod::Post, None) => outgoing = outgoing.body(Vec::<u8>::new()),
            (HttpMethod::Get, _) => {}
        }

        let response = outgoing.send().map_err(|e| classify(&e, slot.as_ref()))?;
        let status = response.status();
        let headers: Headers = response
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();
        Ok(RawResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body: Box::new(response),
        })
    }
}

// A rejected handshake shows up as a generic connect error; the verifier's
// slot says whether trust was the cause.
fn classify(err: &reqwest::Error, slot: Option<&FailureSlot>) -> Error {
    let failure = slot.and_then(|slot| slot.lock().ok().and_then(|mut last| last.take()));
    match failure {
        Some(failure) => Error::CertificateVerificationFailed(failure),
        None => Error::transport(error_chain(err)),
    }
}

/// The error's message followed by each of its sources.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: url.to_string(),
            headers: Headers::new(),
            body: None,
            trust: TrustPolicy::Unverified,
            connect_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn scheme_detection_is_case_insensitive() {
        assert!(request("https://example.com/").is_secure());
        assert!(request("HTTPS://example.com/").is_secure());
        assert!(!request("http://example.com/").is_secure());
        assert!(!request("htt").is_secure());
    }

    #[test]
    fn error_chain_includes_sources() {
        #[derive(Debug, thiserror::Error)]
        #[error("outer")]
        struct Outer(#[source] std::io::Error);

        let err = Outer(std::io::Error::other("inner"));
        assert_eq!(error_chain(&err), "outer: inner");
    }

    #[test]
    fn unreachable_host_is_a_transport_error() {
        // Port 9 on loopback: nothing listens there in a test environment.
        let err = ReqwestTransport.execute(request("http://127.0.0.1:9/")).unwrap_err();
        assert!(matches!(err, Error::Transport { .. }), "{err:?}");
    }
}
