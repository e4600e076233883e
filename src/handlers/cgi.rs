use crate::prelude::*;
use crate::server::DispatchCtx;
use std::os::fd::{FromRawFd, IntoRawFd};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::process::{Command, Stdio};

/// Consecutive would-block attempts on the child's stdin before the body
/// write is declared failed and the child is killed.
const MAX_STDIN_STALLS: u32 = 1024;

pub fn handle_post(conn: &mut Connection, req: &Request, ctx: &mut DispatchCtx<'_>) -> u16 {
    info!("{}: POST {}", conn.peer_ip, req.uri);
    if !req.is_cgi {
        // Only the CGI gateway accepts POST.
        return HTTP_SERVICE_UNAVAILABLE;
    }
    dispatch_cgi(conn, req, ctx)
}

/// Spawn the configured CGI executable with its stdin/stdout wired to
/// socketpairs, feed it the request body, and install a relay that pipes
/// its stdout verbatim to the client.
///
/// Ownership of the four socketpair ends: the child gets the read end of
/// the stdin pair and the write end of the stdout pair (via `Stdio`); the
/// parent keeps the stdin write end (written then dropped, which is the
/// child's EOF) and hands the stdout read end to the relay, which closes
/// it at EOF or on error.
pub fn dispatch_cgi(conn: &mut Connection, req: &Request, ctx: &mut DispatchCtx<'_>) -> u16 {
    let script = match ctx.config.cgi_path.canonicalize() {
        Ok(path) => path,
        Err(_) => {
            errors!("cgi: {} does not resolve", ctx.config.cgi_path.display());
            return HTTP_NOT_FOUND;
        }
    };
    let Ok(meta) = fs::metadata(&script) else {
        return HTTP_NOT_FOUND;
    };
    if meta.permissions().mode() & 0o111 == 0 {
        errors!("cgi: {} is not executable", script.display());
        return HTTP_INTERNAL_SERVER_ERROR;
    }

    let Ok((parent_out, child_out)) = StdUnixStream::pair() else {
        return HTTP_INTERNAL_SERVER_ERROR;
    };
    let Ok((parent_in, child_in)) = StdUnixStream::pair() else {
        return HTTP_INTERNAL_SERVER_ERROR;
    };
    if parent_out.set_nonblocking(true).is_err() || parent_in.set_nonblocking(true).is_err() {
        return HTTP_INTERNAL_SERVER_ERROR;
    }

    let child_stdout = unsafe { File::from_raw_fd(child_out.into_raw_fd()) };
    let child_stdin = unsafe { File::from_raw_fd(child_in.into_raw_fd()) };

    let mut cmd = Command::new(&script);
    cmd.env_clear()
        .envs(build_cgi_env(conn, req, &script))
        .stdin(Stdio::from(child_stdin))
        .stdout(Stdio::from(child_stdout))
        .stderr(Stdio::null());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            errors!("cgi: spawn {} failed: {}", script.display(), e);
            return HTTP_INTERNAL_SERVER_ERROR;
        }
    };
    trace!("cgi: spawned {} (pid {})", script.display(), child.id());

    if req.method == Method::Post && !req.body.is_empty() {
        if let Err(e) = write_body(&parent_in, &req.body) {
            errors!("cgi: body write failed: {}", e);
            let _ = child.kill();
            let _ = child.wait();
            return HTTP_INTERNAL_SERVER_ERROR;
        }
    }
    // Dropping the write end is the child's EOF on stdin.
    drop(parent_in);

    let mut stdout = mio::net::UnixStream::from_std(parent_out);
    let token = ctx.alloc_token();
    if ctx.readiness.register_read(&mut stdout, token).is_err() {
        let _ = child.kill();
        let _ = child.wait();
        return HTTP_INTERNAL_SERVER_ERROR;
    }

    conn.state = ConnState::Piping(PipeRelay::from_child(stdout, token, child));
    0
}

/// Non-blocking body write with partial-write iteration. A bounded run of
/// consecutive would-block stalls counts as failure so the event loop is
/// never parked on a child that stopped reading.
fn write_body(mut pipe: &StdUnixStream, body: &[u8]) -> io::Result<()> {
    let mut written = 0;
    let mut stalls = 0;
    while written < body.len() {
        match pipe.write(&body[written..]) {
            Ok(0) => return Err(io::Error::new(ErrorKind::WriteZero, "stdin closed")),
            Ok(n) => {
                written += n;
                stalls = 0;
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                stalls += 1;
                if stalls > MAX_STDIN_STALLS {
                    return Err(io::Error::new(ErrorKind::TimedOut, "stdin stalled"));
                }
                std::thread::yield_now();
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// RFC 3875 environment subset plus `HTTP_*` for every request header.
fn build_cgi_env(conn: &Connection, req: &Request, script: &Path) -> Vec<(String, String)> {
    let content_length = if req.method == Method::Post {
        req.content_length.to_string()
    } else {
        String::new()
    };

    let mut env: Vec<(String, String)> = vec![
        ("AUTH_TYPE".into(), String::new()),
        ("CONTENT_LENGTH".into(), content_length),
        (
            "CONTENT_TYPE".into(),
            req.header("Content-Type").unwrap_or("").to_string(),
        ),
        ("GATEWAY_INTERFACE".into(), "CGI/1.1".into()),
        ("PATH_INFO".into(), req.path_info.clone()),
        (
            "PATH_TRANSLATED".into(),
            format!("{}{}", script.display(), req.path_info),
        ),
        ("QUERY_STRING".into(), req.query.clone()),
        ("REMOTE_ADDR".into(), conn.peer_ip.clone()),
        ("REMOTE_HOST".into(), conn.peer_ip.clone()),
        ("REMOTE_IDENT".into(), String::new()),
        ("REMOTE_USER".into(), String::new()),
        ("REQUEST_METHOD".into(), req.method.to_string()),
        ("SCRIPT_NAME".into(), req.script_name.clone()),
        ("SERVER_NAME".into(), SERVER_ID.into()),
        ("SERVER_PORT".into(), conn.local_port.to_string()),
        ("SERVER_PROTOCOL".into(), HTTP_VERSION.into()),
        ("SERVER_SOFTWARE".into(), SERVER_ID.into()),
    ];

    for (key, val) in &req.headers {
        let name = format!("HTTP_{}", key.to_ascii_uppercase().replace('-', "_"));
        env.push((name, val.clone()));
    }

    env
}
