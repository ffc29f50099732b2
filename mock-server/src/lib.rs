use axum::{
    body::Bytes,
    extract::{Path, RawQuery},
    http::{header, HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// What `/echo` saw of the incoming request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body_len: usize,
    pub body: String,
}

impl Echo {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// "你好" in GBK.
pub const GBK_NIHAO: &[u8] = &[0xC4, 0xE3, 0xBA, 0xC3];

/// "café" in ISO-8859-1.
pub const LATIN1_CAFE: &[u8] = &[0x63, 0x61, 0x66, 0xE9];

pub fn app() -> Router {
    Router::new()
        .route("/echo", any(echo))
        .route("/upload", any(echo))
        .route("/search", get(echo))
        .route("/status/{code}", any(status))
        .route("/gbk", get(gbk))
        .route("/latin1-encoded", get(latin1_encoded))
        .route("/lines", get(lines))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("mock server listening on {addr}");
    }
    axum::serve(listener, app()).await
}

async fn echo(method: Method, RawQuery(query): RawQuery, headers: HeaderMap, body: Bytes) -> Json<Echo> {
    log::debug!("{method} echo, {} byte body", body.len());
    Json(Echo {
        method: method.to_string(),
        query,
        headers: headers
            .iter()
            .map(|(n, v)| (n.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect(),
        body_len: body.len(),
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

// `/status/404?{"error":"not found"}` answers 404 with the raw query as body.
async fn status(Path(code): Path<u16>, RawQuery(query): RawQuery) -> Result<impl IntoResponse, StatusCode> {
    let code = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    let body = query.map(|q| percent_decode_str(&q).collect::<Vec<u8>>()).unwrap_or_default();
    Ok((code, [(header::CONTENT_TYPE, "application/json")], body))
}

async fn gbk() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain; charset=GBK")], GBK_NIHAO)
}

// Content-Encoding names the charset; it must win over Content-Type.
async fn latin1_encoded() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=GBK"),
            (header::CONTENT_ENCODING, "ISO-8859-1"),
        ],
        LATIN1_CAFE,
    )
}

async fn lines() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain")], "first\nsecond\r\nthird\n")
}
