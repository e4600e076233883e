use crate::prelude::*;
use rustls::{ServerConfig, ServerConnection};
use std::io::BufReader;

/// Process-wide TLS configuration, built once at startup from the PEM
/// private key and certificate chain named in the config record.
pub struct TlsContext {
    config: Arc<ServerConfig>,
}

impl TlsContext {
    pub fn new(key_file: &Path, cert_file: &Path) -> Result<Self> {
        let mut cert_reader = BufReader::new(File::open(cert_file)?);
        let certs = rustls_pemfile::certs(&mut cert_reader)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if certs.is_empty() {
            return Err(format!("no certificate found in {}", cert_file.display()).into());
        }

        let mut key_reader = BufReader::new(File::open(key_file)?);
        let key = rustls_pemfile::private_key(&mut key_reader)?
            .ok_or_else(|| format!("no private key found in {}", key_file.display()))?;

        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;

        Ok(TlsContext {
            config: Arc::new(config),
        })
    }

    pub fn new_session(&self) -> Result<ServerConnection> {
        Ok(ServerConnection::new(Arc::clone(&self.config))?)
    }
}

/// Uniform byte transport over an accepted socket.
///
/// Both variants share one contract: `read` returns `Ok(0)` only on clean
/// peer close, `WouldBlock` means try again on the next ready event, any
/// other error is fatal to the connection. `write` may make partial
/// progress; the remainder is retried when the socket is next writable.
pub enum Transport {
    Plain,
    Tls(Box<ServerConnection>),
}

impl Transport {
    pub fn is_tls(&self) -> bool {
        matches!(self, Transport::Tls(_))
    }

    /// Ciphertext is queued inside the session (handshake records, alerts,
    /// or encrypted application data) and still needs a writable socket.
    pub fn wants_write(&self) -> bool {
        match self {
            Transport::Plain => false,
            Transport::Tls(tls) => tls.wants_write(),
        }
    }

    pub fn read(&mut self, stream: &mut TcpStream, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Plain => stream.read(buf),
            Transport::Tls(tls) => loop {
                // Flush whatever the session wants on the wire first; during
                // the handshake this is what moves the state machine.
                while tls.wants_write() {
                    match tls.write_tls(stream) {
                        Ok(_) => {}
                        Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                        Err(e) => return Err(e),
                    }
                }

                match tls.reader().read(buf) {
                    Ok(n) => return Ok(n), // 0 is a clean close_notify
                    Err(ref e) if e.kind() == ErrorKind::WouldBlock => {}
                    Err(e) => return Err(e),
                }

                match tls.read_tls(stream) {
                    Ok(0) => return Ok(0),
                    Ok(_) => {
                        if let Err(e) = tls.process_new_packets() {
                            // Best effort to put the fatal alert on the wire.
                            let _ = tls.write_tls(stream);
                            return Err(io::Error::new(ErrorKind::InvalidData, e));
                        }
                    }
                    Err(e) => return Err(e),
                }
            },
        }
    }

    pub fn write(&mut self, stream: &mut TcpStream, bytes: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Plain => stream.write(bytes),
            Transport::Tls(tls) => {
                let n = tls.writer().write(bytes)?;
                while tls.wants_write() {
                    match tls.write_tls(stream) {
                        Ok(_) => {}
                        Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                        Err(e) => return Err(e),
                    }
                }
                Ok(n)
            }
        }
    }

    /// Drain queued ciphertext onto the socket until it would block.
    pub fn flush(&mut self, stream: &mut TcpStream) -> io::Result<()> {
        if let Transport::Tls(tls) = self {
            while tls.wants_write() {
                match tls.write_tls(stream) {
                    Ok(_) => {}
                    Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }
}
