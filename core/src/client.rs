//! Request building and execution.
//!
//! # Design
//! A call moves through building, connecting, sending and awaiting the
//! response. [`Request::prepare`] does all of the building without touching
//! the network: field validation happened when the form was filled, so here
//! the URL gets its query string, the headers are composed and the multipart
//! length is computed. [`Request::send_with`] hands the result to a
//! [`Transport`] and classifies what comes back: 200 is a [`Response`],
//! anything else is [`Error::Http`] with the error body read in full.
//!
//! Nothing is shared between calls. Every request gets its own boundary,
//! client and connection, and every stream is dropped on every exit path.

use std::io::{self, Read};

use log::{debug, info, warn};

use crate::charset::{decode_body, resolve_charset};
use crate::config::ClientConfig;
use crate::error::Error;
use crate::headers::{self, Headers, CONTENT_LENGTH};
use crate::http::{HttpMethod, HttpRequest, RawResponse, ReqwestTransport, Transport};
use crate::multipart::{Boundary, Form, FormField, MultipartBody};
use crate::query::append_query;
use crate::trust::TrustPolicy;

/// One GET or POST call, configured with builder methods.
#[derive(Debug, Clone)]
pub struct Request {
    method: HttpMethod,
    url: String,
    headers: Headers,
    query: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    form: Form,
    trust: TrustPolicy,
    config: ClientConfig,
}

impl Request {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            query: Vec::new(),
            cookies: Vec::new(),
            form: Form::new(),
            trust: TrustPolicy::default(),
            config: ClientConfig::default(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn headers(mut self, headers: &Headers) -> Self {
        for (name, value) in headers.iter() {
            self.headers.append(name, value);
        }
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    /// Fields are only sent with POST; a GET drops them.
    pub fn form(mut self, form: Form) -> Self {
        self.form = form;
        self
    }

    pub fn field(mut self, name: impl Into<String>, field: impl Into<FormField>) -> Self {
        self.form.insert(name, field);
        self
    }

    /// Policy for `https` URLs. Ignored for plain `http`.
    pub fn trust(mut self, trust: TrustPolicy) -> Self {
        self.trust = trust;
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the request without performing any I/O.
    pub fn prepare(self) -> Result<HttpRequest, Error> {
        debug!("building {} {}", self.method, self.url);
        let url = append_query(&self.url, &self.query);

        let body = match self.method {
            HttpMethod::Post if !self.form.is_empty() => {
                Some(MultipartBody::new(self.form, Boundary::generate()))
            }
            HttpMethod::Get if !self.form.is_empty() => {
                warn!("dropping {} form fields from GET {url}", self.form.len());
                None
            }
            _ => None,
        };

        let mut headers = headers::compose(
            &self.headers,
            headers::cookie_header(&self.cookies),
            body.as_ref().map(MultipartBody::content_type),
            &self.config,
        );
        if self.method == HttpMethod::Post {
            let length = body.as_ref().map_or(0, MultipartBody::len);
            headers.set(CONTENT_LENGTH, length.to_string());
        }

        Ok(HttpRequest {
            method: self.method,
            url,
            headers,
            body,
            trust: self.trust,
            connect_timeout: self.config.connect_timeout,
        })
    }

    /// Execute over the default reqwest transport.
    pub fn send(self) -> Result<Response, Error> {
        self.send_with(&ReqwestTransport)
    }

    pub fn send_with<T: Transport + ?Sized>(self, transport: &T) -> Result<Response, Error> {
        let request = self.prepare()?;
        let (method, url) = (request.method, request.url.clone());
        let raw = transport.execute(request)?;
        info!("{method} {url} -> {}", raw.status);
        classify(raw)
    }
}

/// Turn a raw response into a [`Response`] or an [`Error::Http`].
pub fn classify(raw: RawResponse) -> Result<Response, Error> {
    let charset = resolve_charset(
        raw.headers.get("Content-Encoding"),
        raw.headers.get("Content-Type"),
    );
    if raw.status == 200 {
        return Ok(Response {
            status: raw.status,
            charset,
            headers: raw.headers,
            body: raw.body,
        });
    }

    let mut body = raw.body;
    let mut bytes = Vec::new();
    body.read_to_end(&mut bytes)?;
    let text = decode_body(&bytes, &charset);
    Err(Error::Http {
        status: raw.status,
        body: if text.is_empty() { raw.reason } else { text },
    })
}

/// A 200 response with its body still unread.
pub struct Response {
    status: u16,
    charset: String,
    headers: Headers,
    body: Box<dyn Read + Send>,
}

impl Response {
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Charset the body will be decoded with.
    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn into_reader(self) -> Box<dyn Read + Send> {
        self.body
    }

    pub fn bytes(mut self) -> Result<Vec<u8>, Error> {
        let mut bytes = Vec::new();
        self.body.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// The decoded body with its lines joined by `\r\n`.
    pub fn text(self) -> Result<String, Error> {
        let charset = self.charset.clone();
        let bytes = self.bytes()?;
        Ok(decode_body(&bytes, &charset))
    }
}

impl Read for Response {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.read(buf)
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("charset", &self.charset)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

fn build<K, V>(method: HttpMethod, url: &str, headers: &Headers, args: &[(K, V)]) -> Request
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    args.iter().fold(
        Request::new(method, url).headers(headers),
        |req, (k, v)| req.query(k.as_ref(), v.as_ref()),
    )
}

/// GET `url` with `args` as its query string and return the body text.
pub fn get_string<K, V>(url: &str, headers: &Headers, args: &[(K, V)]) -> Result<String, Error>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    build(HttpMethod::Get, url, headers, args).send()?.text()
}

/// POST `form` as multipart/form-data and return the body text.
pub fn post_form_string<K, V>(url: &str, headers: &Headers, args: &[(K, V)], form: Form) -> Result<String, Error>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    build(HttpMethod::Post, url, headers, args).form(form).send()?.text()
}

/// [`get_string`] with an explicit trust policy for the TLS handshake.
pub fn https_get_string<K, V>(
    url: &str,
    headers: &Headers,
    args: &[(K, V)],
    trust: TrustPolicy,
) -> Result<String, Error>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    build(HttpMethod::Get, url, headers, args).trust(trust).send()?.text()
}

/// [`post_form_string`] with an explicit trust policy for the TLS handshake.
pub fn https_post_form_string<K, V>(
    url: &str,
    headers: &Headers,
    args: &[(K, V)],
    form: Form,
    trust: TrustPolicy,
) -> Result<String, Error>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    build(HttpMethod::Post, url, headers, args)
        .form(form)
        .trust(trust)
        .send()?
        .text()
}
