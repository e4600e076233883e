use crate::prelude::*;
use std::process::Child;

/// Where a relay draws its bytes from.
///
/// Regular files cannot be polled, so a `File` source counts as always
/// read-ready and is drained as fast as the client socket accepts bytes.
/// A `Child` source is the server end of the socketpair wired to a CGI
/// process's stdout, registered with the readiness registry under its own
/// token.
pub enum RelaySource {
    File(File),
    Child {
        stream: mio::net::UnixStream,
        token: Token,
    },
}

/// Result of one relay step.
#[derive(Debug, PartialEq, Eq)]
pub enum RelayStatus {
    /// Progress was made; stepping again may move more bytes.
    Continue,
    /// Neither side can move right now; wait for the next ready event.
    Blocked,
    /// Source reached EOF and the staging buffer is fully flushed.
    Done,
    /// Source or client failed; the connection must die.
    Fatal,
}

/// Streams bytes from a source descriptor through a small staging buffer
/// to the client transport, one read and one write per step. The relay
/// owns the source (closed on drop) and, for CGI, the child process.
pub struct PipeRelay {
    source: RelaySource,
    staging: [u8; BUFSIZE],
    offset: usize,
    size: usize,
    child: Option<Child>,
}

impl PipeRelay {
    pub fn from_file(file: File) -> Self {
        PipeRelay {
            source: RelaySource::File(file),
            staging: [0u8; BUFSIZE],
            offset: 0,
            size: 0,
            child: None,
        }
    }

    pub fn from_child(stream: mio::net::UnixStream, token: Token, child: Child) -> Self {
        PipeRelay {
            source: RelaySource::Child { stream, token },
            staging: [0u8; BUFSIZE],
            offset: 0,
            size: 0,
            child: Some(child),
        }
    }

    pub fn source_token(&self) -> Option<Token> {
        match &self.source {
            RelaySource::File(_) => None,
            RelaySource::Child { token, .. } => Some(*token),
        }
    }

    pub fn take_child(&mut self) -> Option<Child> {
        self.child.take()
    }

    pub fn has_staged(&self) -> bool {
        self.offset < self.size
    }

    /// Deregister a child-source stream from the poll before the relay is
    /// dropped. File sources were never registered.
    pub fn unregister(&mut self, readiness: &Readiness) {
        if let RelaySource::Child { stream, .. } = &mut self.source {
            let _ = readiness.deregister(stream);
        }
    }

    /// Refill the staging buffer with one source read when it is empty,
    /// then push it at the client with one transport write.
    pub fn step(&mut self, stream: &mut TcpStream, transport: &mut Transport) -> RelayStatus {
        if self.offset >= self.size {
            let read = match &mut self.source {
                RelaySource::File(f) => f.read(&mut self.staging),
                RelaySource::Child { stream: src, .. } => src.read(&mut self.staging),
            };
            match read {
                Ok(0) => return RelayStatus::Done,
                Ok(n) => {
                    self.offset = 0;
                    self.size = n;
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => return RelayStatus::Blocked,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => return RelayStatus::Continue,
                Err(_) => return RelayStatus::Fatal,
            }
        }

        match transport.write(stream, &self.staging[self.offset..self.size]) {
            Ok(0) => RelayStatus::Blocked,
            Ok(n) => {
                self.offset += n;
                RelayStatus::Continue
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => RelayStatus::Blocked,
            Err(ref e) if e.kind() == ErrorKind::Interrupted => RelayStatus::Continue,
            Err(_) => RelayStatus::Fatal,
        }
    }
}
