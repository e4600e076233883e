use crate::handlers::{handle_get, handle_head, handle_post};
use crate::prelude::*;
use crate::server::DispatchCtx;
use std::mem;

/// Drive the request state machine over whatever is sitting in the input
/// buffer: request line, then headers until the blank line, then an
/// optional body, then the method handler.
///
/// Returns 0 to wait for the next ready event, -1 when the connection must
/// be torn down after its output has been flushed.
pub fn parse(conn: &mut Connection, ctx: &mut DispatchCtx<'_>) -> i32 {
    if conn.state.is_idle() {
        let line = match conn.readline() {
            Line::NeedMore => return 0,
            Line::TooLong => {
                errors!("{}: request line too long", conn.peer_ip);
                return conn.end_request(HTTP_BAD_REQUEST, false);
            }
            Line::Got(line) => line,
        };
        if line.is_empty() {
            // Stray blank line between requests; swallow it.
            return 0;
        }

        debug!("{}: {}", conn.peer_ip, line);
        match parse_request_line(&line) {
            Ok(req) => conn.state = ConnState::ReadingHeaders(req),
            Err(code) if code == HTTP_BAD_REQUEST => {
                errors!("{}: bad request line: {}", conn.peer_ip, line);
                return conn.end_request(code, false);
            }
            Err(code) => {
                // Request-level rejection (405, 505): the response waits
                // until the doomed request's header section has been
                // drained, otherwise its headers would read as the next
                // request line.
                errors!("{}: rejected request line ({}): {}", conn.peer_ip, code, line);
                let mut req = Request::new(Method::Get);
                req.reject = Some(code);
                conn.state = ConnState::ReadingHeaders(req);
            }
        }
    }

    while matches!(conn.state, ConnState::ReadingHeaders(_)) {
        let line = match conn.readline() {
            Line::NeedMore => return 0,
            Line::TooLong => {
                let close = current_request_close(conn);
                errors!("{}: header line too long", conn.peer_ip);
                return conn.end_request(HTTP_BAD_REQUEST, close);
            }
            Line::Got(line) => line,
        };

        if !line.is_empty() {
            match parse_header_line(&line) {
                Some((key, val)) => {
                    if let ConnState::ReadingHeaders(req) = &mut conn.state {
                        req.headers.push((key, val));
                    }
                }
                None => {
                    let close = current_request_close(conn);
                    errors!("{}: bad header format: {}", conn.peer_ip, line);
                    return conn.end_request(HTTP_BAD_REQUEST, close);
                }
            }
            continue;
        }

        // Blank line terminates the header section; dispatch by method.
        let ConnState::ReadingHeaders(mut req) = mem::replace(&mut conn.state, ConnState::Idle)
        else {
            unreachable!()
        };

        if let Some(code) = req.reject {
            return conn.end_request(code, req.wants_close());
        }

        match req.method {
            Method::Get => {
                let code = handle_get(conn, &req, ctx);
                return finish(conn, &req, code);
            }
            Method::Head => {
                let code = handle_head(conn, &req, ctx);
                return finish(conn, &req, code);
            }
            Method::Post => {
                let Some(raw) = req.header("Content-Length") else {
                    return conn.end_request(HTTP_LENGTH_REQUIRED, req.wants_close());
                };
                if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
                    return conn.end_request(HTTP_BAD_REQUEST, req.wants_close());
                }
                let Ok(length) = raw.parse::<usize>() else {
                    return conn.end_request(HTTP_BAD_REQUEST, req.wants_close());
                };
                req.content_length = length;
                conn.state = ConnState::ReadingBody(req);
            }
        }
    }

    if let ConnState::ReadingBody(req) = &conn.state {
        if conn.inbuf.unread() < req.content_length {
            // Body not complete yet; next time then.
            return 0;
        }
        let ConnState::ReadingBody(mut req) = mem::replace(&mut conn.state, ConnState::Idle)
        else {
            unreachable!()
        };
        req.body = conn.inbuf.readable()[..req.content_length].to_vec();
        conn.inbuf.consume(req.content_length);
        let code = handle_post(conn, &req, ctx);
        return finish(conn, &req, code);
    }

    0
}

/// A handler returned: 0 means the response (and possibly a relay) is
/// already in place, anything else is a status code to send whole.
fn finish(conn: &mut Connection, req: &Request, code: u16) -> i32 {
    if code != 0 {
        return conn.end_request(code, req.wants_close());
    }
    if req.wants_close() {
        conn.alive = false;
    }
    0
}

fn current_request_close(conn: &Connection) -> bool {
    match &conn.state {
        ConnState::ReadingHeaders(req) | ConnState::ReadingBody(req) => req.wants_close(),
        _ => false,
    }
}

/// Parse `METHOD URI VERSION`. Exactly three tokens; URI capped at
/// MAX_URI_LEN; method must be GET/HEAD/POST (else 405); version must be
/// HTTP/1.1 (else 505).
pub fn parse_request_line(line: &str) -> std::result::Result<Request, u16> {
    let mut tokens = line.split_whitespace();
    let (Some(method), Some(uri), Some(version)) = (tokens.next(), tokens.next(), tokens.next())
    else {
        return Err(HTTP_BAD_REQUEST);
    };
    if tokens.next().is_some() {
        return Err(HTTP_BAD_REQUEST);
    }

    if uri.len() > MAX_URI_LEN {
        return Err(HTTP_BAD_REQUEST);
    }

    let Some(method) = Method::from_token(method) else {
        return Err(HTTP_METHOD_NOT_ALLOWED);
    };

    if !version.eq_ignore_ascii_case(HTTP_VERSION) {
        return Err(HTTP_VERSION_NOT_SUPPORTED);
    }

    let mut req = Request::new(method);
    split_uri(&mut req, uri);
    Ok(req)
}

/// Split off `?query`, then decompose `/cgi/…` URIs into script name and
/// path info at the next `/`.
pub fn split_uri(req: &mut Request, raw: &str) {
    let (path, query) = match raw.find('?') {
        Some(i) => (&raw[..i], &raw[i + 1..]),
        None => (raw, ""),
    };
    req.uri = path.to_string();
    req.query = query.to_string();

    if let Some(rest) = path.strip_prefix("/cgi/") {
        req.is_cgi = true;
        match rest.find('/') {
            Some(i) => {
                req.script_name = format!("/{}", &rest[..i]);
                req.path_info = rest[i..].to_string();
            }
            None => {
                req.script_name = format!("/{}", rest);
                req.path_info = String::new();
            }
        }
    }
}

/// Parse `key ':' val`. The first `:` splits; it may be neither the first
/// nor the last character, and both sides must survive space-trimming.
pub fn parse_header_line(line: &str) -> Option<(String, String)> {
    let idx = line.find(':')?;
    if idx == 0 || idx == line.len() - 1 {
        return None;
    }
    let key = line[..idx].trim_matches(' ');
    let val = line[idx + 1..].trim_matches(' ');
    if key.is_empty() || val.is_empty() {
        return None;
    }
    Some((key.to_string(), val.to_string()))
}
