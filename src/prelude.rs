pub use crate::config::Config;
pub use crate::error::Result;

pub use crate::buffer::{Buffer, Line};
pub use crate::connection::{ConnState, Connection};
pub use crate::readiness::Readiness;
pub use crate::relay::{PipeRelay, RelaySource, RelayStatus};
pub use crate::request::{Method, Request};
pub use crate::transport::{TlsContext, Transport};

pub use liso_log::{debug, errors, info, trace, warn};

pub use mio::{
    Interest, Token,
    net::{TcpListener, TcpStream},
};

pub use std::collections::HashMap;
pub use std::fs::{self, File};
pub use std::io::{self, ErrorKind, Read, Write};
pub use std::net::SocketAddr;
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;
pub use std::time::SystemTime;

/// Initial capacity of every dynamic buffer and the relay staging size.
pub const BUFSIZE: usize = 1024;
/// Upper bound on a single request or header line.
pub const MAXBUF: usize = 8192;
/// Upper bound on a request URI.
pub const MAX_URI_LEN: usize = 8192;

pub const HTTP_VERSION: &str = "HTTP/1.1";
pub const SERVER_ID: &str = "Liso/1.0";

pub const HTTP_OK: u16 = 200;
pub const HTTP_BAD_REQUEST: u16 = 400;
pub const HTTP_NOT_FOUND: u16 = 404;
pub const HTTP_METHOD_NOT_ALLOWED: u16 = 405;
pub const HTTP_LENGTH_REQUIRED: u16 = 411;
pub const HTTP_INTERNAL_SERVER_ERROR: u16 = 500;
pub const HTTP_NOT_IMPLEMENTED: u16 = 501;
pub const HTTP_SERVICE_UNAVAILABLE: u16 = 503;
pub const HTTP_VERSION_NOT_SUPPORTED: u16 = 505;
