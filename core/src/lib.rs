//! Blocking HTTP/HTTPS request engine with multipart forms and certificate pinning.
//!
//! # Overview
//! Builds GET and POST requests from a URL, headers, query arguments,
//! cookies and typed form fields, executes them over a possibly TLS-secured
//! connection, and returns the decoded body or a typed [`Error`].
//!
//! # Design
//! - Every call is self-contained: its own boundary, client and connection.
//!   Nothing is cached, so calls may run concurrently from any thread.
//! - Building ([`Request::prepare`]) is pure and produces an [`HttpRequest`]
//!   that a [`Transport`] executes; [`ReqwestTransport`] is the default.
//! - Multipart framing is enumerated once and consumed for both the
//!   `Content-Length` value and the body bytes.
//! - The same [`TrustPolicy`] judges server and client certificate chains.
//! - No retries. Callers wanting a total deadline wrap the call themselves.

pub mod charset;
pub mod client;
pub mod config;
pub mod error;
pub mod headers;
pub mod http;
pub mod json;
pub mod multipart;
pub mod query;
pub mod trust;

pub use client::{get_string, https_get_string, https_post_form_string, post_form_string, Request, Response};
pub use config::ClientConfig;
pub use error::{Error, Peer, TrustFailure, TrustFailureReason, TRANSPORT_ERROR_CODE};
pub use headers::Headers;
pub use http::{HttpMethod, HttpRequest, RawResponse, ReqwestTransport, Transport};
pub use json::{get_json, post_json};
pub use multipart::{Boundary, Form, FormField, MultipartBody, Numeric};
pub use trust::{SerialNumber, TrustCheck, TrustPolicy};
