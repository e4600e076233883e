use std::io::{Read, Write};
use std::net::TcpStream;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use liso::config::Config;
use liso::server::Server;
use tempfile::TempDir;

const KEY_PEM: &str = include_str!("fixtures/liso_test_key.pem");
const CERT_PEM: &str = include_str!("fixtures/liso_test_cert.pem");

/// stdin-to-stdout echo script framing its own response, as a CGI target.
const CGI_ECHO: &str = "#!/bin/sh\n\
printf 'HTTP/1.1 200 OK\\r\\n'\n\
printf 'Content-Length: %s\\r\\n' \"${CONTENT_LENGTH:-0}\"\n\
printf '\\r\\n'\n\
cat\n";

struct TestServer {
    port: u16,
    terminate: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    _root: TempDir,
}

impl TestServer {
    /// Boot a server on ephemeral ports over a scratch document tree.
    fn start(files: &[(&str, &str)]) -> TestServer {
        let root = TempDir::new().unwrap();

        let www = root.path().join("www");
        std::fs::create_dir(&www).unwrap();
        for (name, contents) in files {
            std::fs::write(www.join(name), contents).unwrap();
        }

        let key = root.path().join("key.pem");
        let cert = root.path().join("cert.pem");
        std::fs::write(&key, KEY_PEM).unwrap();
        std::fs::write(&cert, CERT_PEM).unwrap();

        let cgi = root.path().join("echo.sh");
        std::fs::write(&cgi, CGI_ECHO).unwrap();
        let mut perm = std::fs::metadata(&cgi).unwrap().permissions();
        perm.set_mode(0o755);
        std::fs::set_permissions(&cgi, perm).unwrap();

        let config = Config {
            http_port: 0,
            https_port: 0,
            log_file: root.path().join("liso.log"),
            lock_file: root.path().join("liso.lock"),
            www_folder: www,
            cgi_path: cgi,
            private_key_file: key,
            certificate_file: cert,
        };
        let _ = liso_log::set_log_file(&config.log_file);

        let terminate = Arc::new(AtomicBool::new(false));
        let mut server = Server::new(config, Arc::clone(&terminate)).unwrap();
        let port = server.http_port();
        let handle = thread::spawn(move || {
            let _ = server.run();
        });

        TestServer {
            port,
            terminate,
            handle: Some(handle),
            _root: root,
        }
    }

    fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(("127.0.0.1", self.port)).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.terminate.store(true, Ordering::Relaxed);
        // Poke the listener so the blocked wait wakes up.
        let _ = TcpStream::connect(("127.0.0.1", self.port));
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Read one full response: headers, then Content-Length worth of body.
fn read_response(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0, "connection closed before headers completed");
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (key, val) = line.split_once(':')?;
            if key.eq_ignore_ascii_case("Content-Length") {
                val.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0, "connection closed mid-body");
        body.extend_from_slice(&chunk[..n]);
    }
    (head, body)
}

/// Like `read_response`, but for pipelined requests where a single socket
/// read can return bytes belonging to the next response. Any bytes beyond
/// the current response's body are kept in `carry` for the next call.
fn read_response_pipelined(stream: &mut TcpStream, carry: &mut Vec<u8>) -> (String, Vec<u8>) {
    let mut buf = std::mem::take(carry);
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0, "connection closed before headers completed");
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (key, val) = line.split_once(':')?;
            if key.eq_ignore_ascii_case("Content-Length") {
                val.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    let mut rest = buf[header_end..].to_vec();
    while rest.len() < content_length {
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0, "connection closed mid-body");
        rest.extend_from_slice(&chunk[..n]);
    }
    let body = rest[..content_length].to_vec();
    *carry = rest[content_length..].to_vec();
    (head, body)
}

fn assert_closed(stream: &mut TcpStream) {
    let mut chunk = [0u8; 16];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => return,
            Ok(_) => {}
            Err(e) => panic!("expected close, got error: {}", e),
        }
    }
}

#[test]
fn test_simple_get() {
    let server = TestServer::start(&[("hello.txt", "Hi!\n")]);
    let mut stream = server.connect();

    stream
        .write_all(b"GET /hello.txt HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();

    let (head, body) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "head: {}", head);
    assert!(head.contains("Content-Length: 4\r\n"));
    assert!(head.contains("Content-Type: application/octet-stream\r\n"));
    assert!(head.contains("Server: Liso/1.0\r\n"));
    assert!(head.contains("Date: "));
    assert!(head.contains("Last-Modified: "));
    assert_eq!(body, b"Hi!\n");
}

#[test]
fn test_index_resolution_and_close() {
    let server = TestServer::start(&[("index.html", "<h>")]);
    let mut stream = server.connect();

    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .unwrap();

    let (head, body) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("Content-Type: text/html\r\n"));
    assert!(head.contains("Content-Length: 3\r\n"));
    assert!(head.contains("Connection: close\r\n"));
    assert_eq!(body, b"<h>");

    assert_closed(&mut stream);
}

#[test]
fn test_persistent_connection_two_requests() {
    let server = TestServer::start(&[("a.txt", "first"), ("b.txt", "second!")]);
    let mut stream = server.connect();

    stream
        .write_all(b"GET /a.txt HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let (head, body) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, b"first");

    stream
        .write_all(b"GET /b.txt HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let (head, body) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, b"second!");
}

#[test]
fn test_pipelined_requests() {
    let server = TestServer::start(&[("a.txt", "first"), ("b.txt", "second!")]);
    let mut stream = server.connect();

    stream
        .write_all(
            b"GET /a.txt HTTP/1.1\r\nHost: x\r\n\r\nGET /b.txt HTTP/1.1\r\nHost: x\r\n\r\n",
        )
        .unwrap();

    let mut carry = Vec::new();
    let (_, body) = read_response_pipelined(&mut stream, &mut carry);
    assert_eq!(body, b"first");
    let (_, body) = read_response_pipelined(&mut stream, &mut carry);
    assert_eq!(body, b"second!");
}

#[test]
fn test_head_has_length_but_no_body() {
    let server = TestServer::start(&[("hello.txt", "Hi!\n"), ("next.txt", "after")]);
    let mut stream = server.connect();

    stream
        .write_all(b"HEAD /hello.txt HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();

    // Read headers only, then prove the connection is still usable and no
    // body bytes were interleaved.
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    while find(&buf, b"\r\n\r\n").is_none() {
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0);
        buf.extend_from_slice(&chunk[..n]);
    }
    let head = String::from_utf8_lossy(&buf).to_string();
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("Content-Length: 4\r\n"));
    assert!(head.ends_with("\r\n\r\n"), "body bytes after HEAD: {}", head);

    stream
        .write_all(b"GET /next.txt HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let (head, body) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, b"after");
}

#[test]
fn test_missing_file_is_404() {
    let server = TestServer::start(&[]);
    let mut stream = server.connect();

    stream
        .write_all(b"GET /nope.html HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let (head, body) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(body.is_empty());
}

#[test]
fn test_bad_request_line_closes_connection() {
    let server = TestServer::start(&[]);
    let mut stream = server.connect();

    stream.write_all(b"HELLO\r\n\r\n").unwrap();
    let (head, _) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(head.contains("Connection: close\r\n"));

    assert_closed(&mut stream);
}

#[test]
fn test_put_is_405_and_keeps_alive() {
    let server = TestServer::start(&[("x", "ok")]);
    let mut stream = server.connect();

    stream
        .write_all(b"PUT /x HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let (head, _) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));

    // Connection survives the request-level error.
    stream
        .write_all(b"GET /x HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let (head, body) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, b"ok");
}

#[test]
fn test_post_without_length_is_411() {
    let server = TestServer::start(&[]);
    let mut stream = server.connect();

    stream
        .write_all(b"POST /cgi/echo HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let (head, _) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 411 Length Required\r\n"));
}

#[test]
fn test_post_to_static_uri_is_503() {
    let server = TestServer::start(&[]);
    let mut stream = server.connect();

    stream
        .write_all(b"POST /form HTTP/1.1\r\nHost: x\r\nContent-Length: 2\r\n\r\nhi")
        .unwrap();
    let (head, _) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 503 Service Unavailable\r\n"));
}

#[test]
fn test_cgi_echo_round_trip() {
    let server = TestServer::start(&[]);
    let mut stream = server.connect();

    stream
        .write_all(b"POST /cgi/echo HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhello")
        .unwrap();

    let (head, body) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "head: {}", head);
    assert!(head.contains("Content-Length: 5\r\n"));
    assert_eq!(body, b"hello");
}

#[test]
fn test_slow_loris_single_byte_writes() {
    let server = TestServer::start(&[("hello.txt", "Hi!\n")]);
    let mut stream = server.connect();

    stream.write_all(b"GET /hello.txt HTTP/1.1\r\n").unwrap();
    thread::sleep(Duration::from_millis(50));

    for byte in b"Host: x\r\n\r\n" {
        stream.write_all(&[*byte]).unwrap();
        thread::sleep(Duration::from_millis(2));
    }

    let (head, body) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, b"Hi!\n");
}
