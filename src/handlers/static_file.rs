use crate::handlers::cgi::dispatch_cgi;
use crate::prelude::*;
use crate::server::DispatchCtx;
use std::io::{Seek, SeekFrom};

pub fn handle_get(conn: &mut Connection, req: &Request, ctx: &mut DispatchCtx<'_>) -> u16 {
    info!("{}: GET {}", conn.peer_ip, req.uri);
    if req.is_cgi {
        return dispatch_cgi(conn, req, ctx);
    }
    serve_file(conn, req, &ctx.config.www_folder, true)
}

pub fn handle_head(conn: &mut Connection, req: &Request, ctx: &mut DispatchCtx<'_>) -> u16 {
    info!("{}: HEAD {}", conn.peer_ip, req.uri);
    if req.is_cgi {
        return dispatch_cgi(conn, req, ctx);
    }
    serve_file(conn, req, &ctx.config.www_folder, false)
}

/// Emit the status line and header block for the resolved file, then for
/// GET install a relay that streams the body out; HEAD stops after the
/// headers and the file is closed immediately.
fn serve_file(conn: &mut Connection, req: &Request, root: &Path, include_body: bool) -> u16 {
    let (file, size, mtime, mime) = match open_resource(root, &req.uri) {
        Ok(parts) => parts,
        Err(code) => return code,
    };

    conn.send_status_line(HTTP_OK);
    conn.send_header("Content-Type", mime);
    conn.send_header("Content-Length", &size.to_string());
    conn.send_header("Date", &httpdate::fmt_http_date(SystemTime::now()));
    conn.send_header("Last-Modified", &httpdate::fmt_http_date(mtime));
    conn.send_header("Server", SERVER_ID);
    conn.send_header(
        "Connection",
        if req.wants_close() { "close" } else { "keep-alive" },
    );
    conn.write_str("\r\n");

    if include_body {
        conn.state = ConnState::Piping(PipeRelay::from_file(file));
    }
    0
}

/// Resolve the request path under the document root: canonicalize the
/// root, append the URI bytes as-is, fall back to `index.html` for
/// directories, and size the file with a seek round trip.
fn open_resource(
    root: &Path,
    uri: &str,
) -> std::result::Result<(File, u64, SystemTime, &'static str), u16> {
    let root = root.canonicalize().map_err(|_| HTTP_INTERNAL_SERVER_ERROR)?;
    let mut path = root.join(uri.trim_start_matches('/'));

    let mut meta = fs::metadata(&path).map_err(|_| HTTP_NOT_FOUND)?;
    if meta.is_dir() {
        path.push("index.html");
        meta = fs::metadata(&path).map_err(|_| HTTP_NOT_FOUND)?;
    }

    let mut file = File::open(&path).map_err(|_| HTTP_INTERNAL_SERVER_ERROR)?;
    let size = file
        .seek(SeekFrom::End(0))
        .map_err(|_| HTTP_INTERNAL_SERVER_ERROR)?;
    file.seek(SeekFrom::Start(0))
        .map_err(|_| HTTP_INTERNAL_SERVER_ERROR)?;
    let mtime = meta.modified().map_err(|_| HTTP_INTERNAL_SERVER_ERROR)?;

    Ok((file, size, mtime, mime_for(&path)))
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("html") => "text/html",
        Some("css") => "text/css",
        Some("png") => "image/png",
        Some("jpg") => "image/jpg",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}
