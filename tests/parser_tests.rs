use liso::parser::{parse_header_line, parse_request_line, split_uri};
use liso::prelude::{
    HTTP_BAD_REQUEST, HTTP_METHOD_NOT_ALLOWED, HTTP_VERSION_NOT_SUPPORTED, MAX_URI_LEN,
};
use liso::request::{Method, Request};

#[test]
fn test_simple_request_line() {
    let req = parse_request_line("GET /index.html HTTP/1.1").unwrap();
    assert_eq!(req.method, Method::Get);
    assert_eq!(req.uri, "/index.html");
    assert_eq!(req.query, "");
    assert!(!req.is_cgi);
}

#[test]
fn test_method_and_version_are_case_insensitive() {
    let req = parse_request_line("get / http/1.1").unwrap();
    assert_eq!(req.method, Method::Get);

    let req = parse_request_line("hEaD / HTTP/1.1").unwrap();
    assert_eq!(req.method, Method::Head);
}

#[test]
fn test_wrong_token_count() {
    assert_eq!(parse_request_line("HELLO").unwrap_err(), HTTP_BAD_REQUEST);
    assert_eq!(parse_request_line("GET /").unwrap_err(), HTTP_BAD_REQUEST);
    assert_eq!(
        parse_request_line("GET / HTTP/1.1 extra").unwrap_err(),
        HTTP_BAD_REQUEST
    );
}

#[test]
fn test_unknown_method() {
    assert_eq!(
        parse_request_line("PUT /x HTTP/1.1").unwrap_err(),
        HTTP_METHOD_NOT_ALLOWED
    );
    assert_eq!(
        parse_request_line("DELETE /x HTTP/1.1").unwrap_err(),
        HTTP_METHOD_NOT_ALLOWED
    );
}

#[test]
fn test_unsupported_version() {
    assert_eq!(
        parse_request_line("GET / HTTP/1.0").unwrap_err(),
        HTTP_VERSION_NOT_SUPPORTED
    );
    assert_eq!(
        parse_request_line("GET / SPDY/3").unwrap_err(),
        HTTP_VERSION_NOT_SUPPORTED
    );
}

#[test]
fn test_uri_too_long() {
    let uri = "/".repeat(MAX_URI_LEN + 1);
    let line = format!("GET {} HTTP/1.1", uri);
    assert_eq!(parse_request_line(&line).unwrap_err(), HTTP_BAD_REQUEST);
}

#[test]
fn test_query_split() {
    let mut req = Request::new(Method::Get);
    split_uri(&mut req, "/search?q=liso&n=10");
    assert_eq!(req.uri, "/search");
    assert_eq!(req.query, "q=liso&n=10");
    assert!(!req.is_cgi);
}

#[test]
fn test_cgi_uri_decomposition() {
    let mut req = Request::new(Method::Post);
    split_uri(&mut req, "/cgi/echo/extra/path?k=v");
    assert!(req.is_cgi);
    assert_eq!(req.uri, "/cgi/echo/extra/path");
    assert_eq!(req.script_name, "/echo");
    assert_eq!(req.path_info, "/extra/path");
    assert_eq!(req.query, "k=v");
}

#[test]
fn test_cgi_uri_without_path_info() {
    let mut req = Request::new(Method::Post);
    split_uri(&mut req, "/cgi/echo");
    assert!(req.is_cgi);
    assert_eq!(req.script_name, "/echo");
    assert_eq!(req.path_info, "");
}

#[test]
fn test_header_line_basics() {
    assert_eq!(
        parse_header_line("Host: localhost"),
        Some(("Host".to_string(), "localhost".to_string()))
    );
    assert_eq!(
        parse_header_line("  Accept  :  text/html  "),
        Some(("Accept".to_string(), "text/html".to_string()))
    );
    // The first colon splits; the rest belongs to the value.
    assert_eq!(
        parse_header_line("Referer: http://example.com/"),
        Some(("Referer".to_string(), "http://example.com/".to_string()))
    );
}

#[test]
fn test_header_line_rejects_bad_shapes() {
    assert_eq!(parse_header_line("no colon here"), None);
    assert_eq!(parse_header_line(": starts with colon"), None);
    assert_eq!(parse_header_line("ends with colon:"), None);
    assert_eq!(parse_header_line("key:   "), None);
    assert_eq!(parse_header_line("   : value"), None);
}

#[test]
fn test_header_lookup_is_case_insensitive() {
    let mut req = Request::new(Method::Post);
    req.headers
        .push(("Content-Length".to_string(), "42".to_string()));

    assert_eq!(req.header("Content-Length"), Some("42"));
    assert_eq!(req.header("content-length"), Some("42"));
    assert_eq!(req.header("CONTENT-LENGTH"), Some("42"));
    assert_eq!(req.header("Content-Type"), None);
}

#[test]
fn test_connection_close_detection() {
    let mut req = Request::new(Method::Get);
    assert!(!req.wants_close());

    req.headers
        .push(("Connection".to_string(), "keep-alive".to_string()));
    assert!(!req.wants_close());

    let mut req = Request::new(Method::Get);
    req.headers
        .push(("connection".to_string(), "Close".to_string()));
    assert!(req.wants_close());
}
