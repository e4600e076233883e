use crate::prelude::*;

/// What the connection is doing right now. Each state carries exactly the
/// data that is valid in it: no request record while idle, a request while
/// its headers or body are being read, a relay while a response body is
/// being streamed out.
pub enum ConnState {
    Idle,
    ReadingHeaders(Request),
    ReadingBody(Request),
    Piping(PipeRelay),
}

impl ConnState {
    pub fn is_idle(&self) -> bool {
        matches!(self, ConnState::Idle)
    }

    pub fn is_piping(&self) -> bool {
        matches!(self, ConnState::Piping(_))
    }
}

/// Per-client state: the accepted socket, its transport, dynamic in/out
/// buffers, and the request state machine position.
pub struct Connection {
    pub token: Token,
    pub stream: TcpStream,
    pub peer_ip: String,
    pub local_port: u16,
    pub transport: Transport,
    pub state: ConnState,
    pub alive: bool,
    pub inbuf: Buffer,
    pub outbuf: Buffer,
    /// Interest currently registered with the poll, re-armed when it
    /// diverges from `desired_interest`.
    pub interest: Interest,
}

pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        HTTP_OK => "OK",
        HTTP_BAD_REQUEST => "Bad Request",
        HTTP_NOT_FOUND => "Not Found",
        HTTP_METHOD_NOT_ALLOWED => "Method Not Allowed",
        HTTP_LENGTH_REQUIRED => "Length Required",
        HTTP_NOT_IMPLEMENTED => "Not Implemented",
        HTTP_SERVICE_UNAVAILABLE => "Service Unavailable",
        HTTP_VERSION_NOT_SUPPORTED => "HTTP Version Not Supported",
        _ => "Internal Server Error",
    }
}

fn is_fatal(code: u16) -> bool {
    code == HTTP_BAD_REQUEST || code == HTTP_INTERNAL_SERVER_ERROR
}

impl Connection {
    pub fn new(token: Token, stream: TcpStream, peer: SocketAddr, transport: Transport) -> Self {
        let local_port = stream.local_addr().map(|a| a.port()).unwrap_or(0);
        Connection {
            token,
            stream,
            peer_ip: peer.ip().to_string(),
            local_port,
            transport,
            state: ConnState::Idle,
            alive: true,
            inbuf: Buffer::new(),
            outbuf: Buffer::new(),
            interest: Interest::READABLE,
        }
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.outbuf.append(bytes);
    }

    pub fn write_str(&mut self, s: &str) {
        self.outbuf.append(s.as_bytes());
    }

    pub fn readline(&mut self) -> Line {
        self.inbuf.readline()
    }

    /// Drain the socket into the input buffer until it would block.
    ///
    /// Returns Ok(true) when the peer closed its end.
    pub fn read_input(&mut self) -> io::Result<bool> {
        loop {
            if self.inbuf.writable().is_empty() {
                self.inbuf.grow();
            }
            let Connection {
                inbuf,
                stream,
                transport,
                ..
            } = self;
            match transport.read(stream, inbuf.writable()) {
                Ok(0) => return Ok(true),
                Ok(n) => inbuf.commit_write(n),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Push unsent output at the socket until it would block or the buffer
    /// drains, then flush any ciphertext the TLS session is holding.
    pub fn flush_output(&mut self) -> io::Result<()> {
        loop {
            let Connection {
                outbuf,
                stream,
                transport,
                ..
            } = self;
            if outbuf.is_drained() {
                break;
            }
            match transport.write(stream, outbuf.readable()) {
                Ok(0) => break,
                Ok(n) => outbuf.consume(n),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        let Connection {
            stream, transport, ..
        } = self;
        transport.flush(stream)?;

        if self.outbuf.should_compact() {
            self.outbuf.compact();
        }
        Ok(())
    }

    pub fn has_unsent(&self) -> bool {
        !self.outbuf.is_drained() || self.transport.wants_write()
    }

    /// WRITABLE is armed only while something still needs the socket:
    /// unsent output, pending TLS records, or an active relay.
    pub fn desired_interest(&self) -> Interest {
        if self.has_unsent() || self.state.is_piping() {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        }
    }

    pub fn send_status_line(&mut self, code: u16) {
        let line = format!("{} {} {}\r\n", HTTP_VERSION, code, reason_phrase(code));
        self.write_str(&line);
    }

    pub fn send_header(&mut self, key: &str, val: &str) {
        let line = format!("{}: {}\r\n", key, val);
        self.write_str(&line);
    }

    /// Respond to the current request with a bare status line and return
    /// to idle. 400 and 500 additionally announce `Connection: close` and
    /// doom the connection; `request_close` carries the request's own
    /// `Connection: close` directive.
    ///
    /// Returns -1 when the connection must die once output drains.
    pub fn end_request(&mut self, code: u16, request_close: bool) -> i32 {
        self.state = ConnState::Idle;
        self.send_status_line(code);

        if request_close {
            self.alive = false;
        }

        if is_fatal(code) {
            self.send_header("Connection", "close");
            self.write_str("\r\n");
            self.alive = false;
            return -1;
        }

        self.write_str("\r\n");
        0
    }
}
