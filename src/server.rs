use crate::parser::parse;
use crate::prelude::*;
use signal_hook::consts::{SIGCHLD, SIGPIPE};
use std::mem;
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};

const HTTP_LISTENER: Token = Token(0);
const HTTPS_LISTENER: Token = Token(1);
const FIRST_CLIENT_TOKEN: usize = 2;

/// The slice of server state handed down to the parser and handlers:
/// configuration, the registry (for wiring up CGI stdout), and the token
/// counter.
pub struct DispatchCtx<'a> {
    pub config: &'a Config,
    pub readiness: &'a Readiness,
    pub next_token: &'a mut usize,
}

impl DispatchCtx<'_> {
    pub fn alloc_token(&mut self) -> Token {
        let token = Token(*self.next_token);
        *self.next_token += 1;
        token
    }
}

/// The multiplexing engine: two listeners, the TLS context, and every live
/// connection keyed by its poll token. One blocking wait per iteration;
/// everything else is non-blocking.
pub struct Server {
    config: Config,
    readiness: Readiness,
    http_listener: TcpListener,
    https_listener: TcpListener,
    tls: TlsContext,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    /// Killed-but-unreaped CGI children, retried every turn.
    zombie_purgatory: Vec<Child>,
    terminate: Arc<AtomicBool>,
    child_exited: Arc<AtomicBool>,
}

impl Server {
    pub fn new(config: Config, terminate: Arc<AtomicBool>) -> Result<Self> {
        let readiness = Readiness::new()?;

        let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
        let https_addr: SocketAddr = format!("0.0.0.0:{}", config.https_port).parse()?;
        let mut http_listener = TcpListener::bind(http_addr)?;
        let mut https_listener = TcpListener::bind(https_addr)?;
        readiness.register_read(&mut http_listener, HTTP_LISTENER)?;
        readiness.register_read(&mut https_listener, HTTPS_LISTENER)?;

        let tls = TlsContext::new(&config.private_key_file, &config.certificate_file)?;

        // A peer that vanishes mid-write must surface as an error on the
        // socket, not take the process down.
        signal_hook::flag::register(SIGPIPE, Arc::new(AtomicBool::new(false)))?;
        let child_exited = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGCHLD, Arc::clone(&child_exited))?;

        Ok(Server {
            config,
            readiness,
            http_listener,
            https_listener,
            tls,
            connections: HashMap::new(),
            next_token: FIRST_CLIENT_TOKEN,
            zombie_purgatory: Vec::new(),
            terminate,
            child_exited,
        })
    }

    pub fn http_port(&self) -> u16 {
        self.http_listener
            .local_addr()
            .map(|a| a.port())
            .unwrap_or(0)
    }

    pub fn https_port(&self) -> u16 {
        self.https_listener
            .local_addr()
            .map(|a| a.port())
            .unwrap_or(0)
    }

    pub fn run(&mut self) -> Result<()> {
        info!(
            "listening on {} (http) and {} (https), serving {}",
            self.http_port(),
            self.https_port(),
            self.config.www_folder.display()
        );

        while !self.terminate.load(Ordering::Relaxed) {
            match self.readiness.wait() {
                Ok(_) => {}
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            if self.readiness.read_ready(HTTP_LISTENER) {
                self.accept_connections(false);
            }
            if self.readiness.read_ready(HTTPS_LISTENER) {
                self.accept_connections(true);
            }

            self.service_connections();

            if self.child_exited.swap(false, Ordering::Relaxed)
                || !self.zombie_purgatory.is_empty()
            {
                self.reap_children();
            }
        }

        self.shutdown();
        Ok(())
    }

    fn accept_connections(&mut self, secure: bool) {
        loop {
            let listener = if secure {
                &self.https_listener
            } else {
                &self.http_listener
            };
            match listener.accept() {
                Ok((stream, peer)) => {
                    let transport = if secure {
                        match self.tls.new_session() {
                            Ok(session) => Transport::Tls(Box::new(session)),
                            Err(e) => {
                                errors!("{}: tls session setup failed: {}", peer, e);
                                continue;
                            }
                        }
                    } else {
                        Transport::Plain
                    };
                    self.add_connection(stream, peer, transport);
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    errors!("accept failed: {}", e);
                    break;
                }
            }
        }
    }

    fn add_connection(&mut self, mut stream: TcpStream, peer: SocketAddr, transport: Transport) {
        let token = Token(self.next_token);
        self.next_token += 1;

        // Both interests up front: a TLS session has handshake records to
        // push as soon as the ClientHello lands.
        let interest = Interest::READABLE | Interest::WRITABLE;
        if let Err(e) = self.readiness.register(&mut stream, token, interest) {
            errors!("{}: register failed: {}", peer, e);
            return;
        }

        let mut conn = Connection::new(token, stream, peer, transport);
        conn.interest = interest;
        info!(
            "accepted {} connection from {}",
            if conn.transport.is_tls() { "https" } else { "http" },
            conn.peer_ip
        );
        self.connections.insert(token, conn);
    }

    /// One service turn over every connection, in token order: pull bytes,
    /// run the parser to quiescence, flush output, step the relay, then
    /// tear down anything dead.
    fn service_connections(&mut self) {
        let mut tokens: Vec<Token> = self.connections.keys().copied().collect();
        tokens.sort();

        for token in tokens {
            let mut bad = false;

            let Some(conn) = self.connections.get_mut(&token) else {
                continue;
            };

            // New data arrived!
            if conn.alive && self.readiness.read_ready(token) {
                match conn.read_input() {
                    Ok(false) => {}
                    Ok(true) => {
                        // Peer closed its end. Anything already buffered is
                        // still parsed and answered; the connection goes
                        // once it is idle and drained.
                        conn.alive = false;
                        if conn.inbuf.is_drained() {
                            bad = true;
                        }
                    }
                    Err(e) => {
                        debug!("{}: recv failed: {}", conn.peer_ip, e);
                        bad = true;
                    }
                }
            }

            // Parse, flush, and pump the relay in rounds: once a relay
            // finishes, a request pipelined behind the piped response may
            // already be buffered and would otherwise never see another
            // read event.
            loop {
                // Parse until quiescent.
                if !bad && !conn.state.is_piping() {
                    let mut ctx = DispatchCtx {
                        config: &self.config,
                        readiness: &self.readiness,
                        next_token: &mut self.next_token,
                    };
                    loop {
                        let before = conn.inbuf.pos();
                        if parse(conn, &mut ctx) == -1 {
                            // Best-effort error response, then the axe.
                            let _ = conn.flush_output();
                            bad = true;
                            break;
                        }
                        if conn.state.is_piping() || conn.inbuf.pos() == before {
                            break;
                        }
                    }
                    if !bad && conn.inbuf.should_compact() {
                        conn.inbuf.compact();
                    }
                }

                // Send data to client.
                if !bad && conn.has_unsent() && conn.flush_output().is_err() {
                    bad = true;
                }

                // With the output buffer drained, move relay bytes.
                let mut relay_finished = false;
                if !bad && !conn.has_unsent() && conn.state.is_piping() {
                    let mut done = false;
                    let mut fatal = false;
                    {
                        let Connection {
                            stream,
                            transport,
                            state,
                            ..
                        } = &mut *conn;
                        if let ConnState::Piping(relay) = state {
                            loop {
                                match relay.step(stream, transport) {
                                    RelayStatus::Continue => continue,
                                    RelayStatus::Blocked => break,
                                    RelayStatus::Done => {
                                        done = true;
                                        break;
                                    }
                                    RelayStatus::Fatal => {
                                        fatal = true;
                                        break;
                                    }
                                }
                            }
                        }
                    }
                    if done || fatal {
                        if let ConnState::Piping(mut relay) =
                            mem::replace(&mut conn.state, ConnState::Idle)
                        {
                            relay.unregister(&self.readiness);
                            if let Some(mut child) = relay.take_child() {
                                if fatal {
                                    let _ = child.kill();
                                }
                                match child.try_wait() {
                                    Ok(Some(_)) => {}
                                    _ => self.zombie_purgatory.push(child),
                                }
                            }
                        }
                        bad = bad || fatal;
                        relay_finished = !fatal;
                    }
                }

                if relay_finished && !bad && !conn.inbuf.is_drained() {
                    continue;
                }
                break;
            }

            let dead = bad || (!conn.alive && conn.state.is_idle() && !conn.has_unsent());
            if dead {
                self.destroy_connection(token);
            } else {
                let desired = conn.desired_interest();
                if desired != conn.interest
                    && self
                        .readiness
                        .reregister(&mut conn.stream, token, desired)
                        .is_ok()
                {
                    conn.interest = desired;
                }
            }
        }
    }

    fn destroy_connection(&mut self, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            info!("closing connection from {}", conn.peer_ip);
            let _ = self.readiness.deregister(&mut conn.stream);
            if let ConnState::Piping(mut relay) = mem::replace(&mut conn.state, ConnState::Idle) {
                relay.unregister(&self.readiness);
                if let Some(mut child) = relay.take_child() {
                    let _ = child.kill();
                    match child.try_wait() {
                        Ok(Some(_)) => {}
                        _ => self.zombie_purgatory.push(child),
                    }
                }
            }
        }
    }

    fn reap_children(&mut self) {
        self.zombie_purgatory.retain_mut(|child| match child.try_wait() {
            Ok(Some(status)) => {
                trace!("reaped cgi child: {}", status);
                false
            }
            Ok(None) => true,
            Err(_) => false,
        });
    }

    fn shutdown(&mut self) {
        info!("terminating, dropping {} connection(s)", self.connections.len());
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            self.destroy_connection(token);
        }
        for mut child in self.zombie_purgatory.drain(..) {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
