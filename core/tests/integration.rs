//! End-to-end calls against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives the real reqwest
//! transport through every request shape: query strings, multipart uploads,
//! error statuses and charset handling. The server echoes what it received,
//! so the assertions check the bytes that actually crossed the wire.

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::time::Duration;

use mock_server::Echo;
use slardar_http::{get_json, get_string, post_form_string, post_json, Error, Form, FormField, Headers, Request};

fn start_server() -> SocketAddr {
    let _ = env_logger::builder().is_test(true).try_init();

    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    addr
}

fn echo(response: slardar_http::Response) -> Echo {
    response.json().unwrap()
}

#[test]
fn get_sends_encoded_query() {
    let addr = start_server();
    let seen = echo(Request::get(format!("http://{addr}/search")).query("q", "a b").send().unwrap());
    assert_eq!(seen.method, "GET");
    assert_eq!(seen.query.as_deref(), Some("q=a%20b"));
    assert_eq!(seen.body_len, 0);
}

#[test]
fn post_upload_length_matches_body() {
    let addr = start_server();
    let mut file = tempfile::Builder::new().suffix(".bin").tempfile().unwrap();
    file.write_all(b"0123456789").unwrap();

    let form = Form::new()
        .with("name", "bob")
        .with("file", FormField::file(file.path()).unwrap());
    let seen = echo(Request::post(format!("http://{addr}/upload")).form(form).send().unwrap());

    assert_eq!(seen.method, "POST");
    let length: usize = seen.header("content-length").unwrap().parse().unwrap();
    assert_eq!(length, seen.body_len);

    let content_type = seen.header("content-type").unwrap();
    let boundary = content_type
        .strip_prefix("multipart/form-data; boundary=")
        .unwrap();
    let closing = format!("--{boundary}--");
    assert_eq!(seen.body.matches(&closing).count(), 1);
    assert!(seen.body.ends_with(&format!("{closing}\r\n")));
    assert!(seen.body.contains("name=\"name\"\r\n"));
    assert!(seen.body.contains("\r\n\r\n0123456789\r\n"));
    assert!(seen.body.contains("Content-Type: application/octet-stream\r\n"));
}

#[test]
fn post_without_fields_sends_zero_length() {
    let addr = start_server();
    let seen = echo(
        Request::post(format!("http://{addr}/echo"))
            .header("Content-Length", "99")
            .send()
            .unwrap(),
    );
    assert_eq!(seen.header("content-length"), Some("0"));
    assert_eq!(seen.body_len, 0);
    assert!(seen.header("content-type").is_none());
}

#[test]
fn default_and_caller_headers_reach_the_server() {
    let addr = start_server();
    let seen = echo(Request::get(format!("http://{addr}/echo")).send().unwrap());
    assert_eq!(seen.header("user-agent"), Some("Mozilla/5.0 Slardar HTTP Requester"));
    assert!(seen.header("accept-language").is_some());

    let seen = echo(
        Request::get(format!("http://{addr}/echo"))
            .header("User-Agent", "custom/1.0")
            .header("Accept-Language", "zh-CN")
            .cookie("sid", "abc")
            .cookie("theme", "dark")
            .send()
            .unwrap(),
    );
    assert_eq!(seen.header("user-agent"), Some("custom/1.0"));
    assert_eq!(seen.header("accept-language"), Some("zh-CN"));
    assert_eq!(seen.header("cookie"), Some("sid=abc; theme=dark"));
}

#[test]
fn not_found_carries_status_and_body() {
    let addr = start_server();
    let url = format!("http://{addr}/status/404?%7B%22error%22%3A%22not%20found%22%7D");
    let err = Request::get(url.clone()).send().unwrap_err();
    match err {
        Error::Http { status, body } => {
            assert_eq!(status, 404);
            assert_eq!(body, r#"{"error":"not found"}"#);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let err = get_json::<serde_json::Value, &str, &str>(&url, &Headers::new(), &[]).unwrap_err();
    match err {
        Error::HttpJson { status, body } => {
            assert_eq!(status, 404);
            assert_eq!(body["error"], "not found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn empty_error_body_uses_status_message() {
    let addr = start_server();
    let err = Request::get(format!("http://{addr}/status/503")).send().unwrap_err();
    assert!(matches!(&err, Error::Http { status: 503, body } if body == "Service Unavailable"));
    assert_eq!(err.code(), 503);
}

#[test]
fn charset_from_content_type_is_applied() {
    let addr = start_server();
    let response = Request::get(format!("http://{addr}/gbk")).send().unwrap();
    assert_eq!(response.charset(), "GBK");
    assert_eq!(response.text().unwrap(), "你好");
}

#[test]
fn content_encoding_wins_over_content_type() {
    let addr = start_server();
    let response = Request::get(format!("http://{addr}/latin1-encoded")).send().unwrap();
    assert_eq!(response.charset(), "ISO-8859-1");
    assert_eq!(response.text().unwrap(), "café");
}

#[test]
fn line_endings_are_normalized() {
    let addr = start_server();
    let text = get_string::<&str, &str>(&format!("http://{addr}/lines"), &Headers::new(), &[]).unwrap();
    assert_eq!(text, "first\r\nsecond\r\nthird");
}

#[test]
fn convenience_calls_cover_get_args_and_forms() {
    let addr = start_server();
    let headers: Headers = [("X-Test", "1")].into_iter().collect();

    let text = post_form_string(
        &format!("http://{addr}/upload"),
        &headers,
        &[("page", "2")],
        Form::new().with("count", 3).with("raw", vec![1u8, 2, 3]),
    )
    .unwrap();
    let seen: Echo = serde_json::from_str(&text).unwrap();
    assert_eq!(seen.query.as_deref(), Some("page=2"));
    assert_eq!(seen.header("x-test"), Some("1"));
    assert!(seen.body.contains("\r\n\r\n3\r\n"));

    let seen: Echo = post_json(&format!("http://{addr}/echo"), &headers, &[("k", "v w")], Form::new()).unwrap();
    assert_eq!(seen.method, "POST");
    assert_eq!(seen.query.as_deref(), Some("k=v%20w"));
}

#[test]
fn unsupported_field_fails_before_any_io() {
    let mut form = Form::new();
    let err = form
        .insert_json("flag", serde_json::json!({"nested": true}))
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedFieldType { ref type_name, .. } if type_name == "object"));
}

#[test]
fn refused_connection_is_a_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = Request::get(format!("http://{addr}/")).send().unwrap_err();
    assert!(matches!(err, Error::Transport { .. }), "{err:?}");
    assert_eq!(err.code(), slardar_http::TRANSPORT_ERROR_CODE);
}

// Answers one request after `delay`, longer than reqwest's default total timeout.
fn start_slow_server(delay: Duration) -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else { return };
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(n) => head.extend_from_slice(&buf[..n]),
            }
        }
        std::thread::sleep(delay);
        let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok");
    });
    addr
}

#[test]
fn slow_response_is_not_cut_off() {
    let addr = start_slow_server(Duration::from_secs(32));
    let response = Request::get(format!("http://{addr}/")).send().unwrap();
    assert_eq!(response.text().unwrap(), "ok");
}
