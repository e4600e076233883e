use crate::prelude::*;
use mio::Events;
use mio::event::Source;
use std::collections::HashSet;

/// One-stop wrapper around the poll instance: registration plus a single
/// blocking wait per loop iteration whose results are snapshotted into
/// ready-sets that the rest of the iteration queries.
pub struct Readiness {
    poll: mio::Poll,
    events: Events,
    read_ready: HashSet<Token>,
    write_ready: HashSet<Token>,
}

impl Readiness {
    pub fn new() -> Result<Self> {
        Ok(Readiness {
            poll: mio::Poll::new()?,
            events: Events::with_capacity(1024),
            read_ready: HashSet::new(),
            write_ready: HashSet::new(),
        })
    }

    pub fn register_read<S: Source>(&self, src: &mut S, token: Token) -> io::Result<()> {
        self.poll.registry().register(src, token, Interest::READABLE)
    }

    pub fn register<S: Source>(
        &self,
        src: &mut S,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        self.poll.registry().register(src, token, interest)
    }

    pub fn reregister<S: Source>(
        &self,
        src: &mut S,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        self.poll.registry().reregister(src, token, interest)
    }

    pub fn deregister<S: Source>(&self, src: &mut S) -> io::Result<()> {
        self.poll.registry().deregister(src)
    }

    /// Block until at least one registered descriptor is ready, then
    /// snapshot the ready tokens for this iteration. An interrupted wait
    /// surfaces as `ErrorKind::Interrupted`; the caller retries.
    pub fn wait(&mut self) -> io::Result<usize> {
        self.read_ready.clear();
        self.write_ready.clear();
        self.poll.poll(&mut self.events, None)?;

        let mut count = 0;
        for event in self.events.iter() {
            count += 1;
            if event.is_readable() || event.is_read_closed() {
                self.read_ready.insert(event.token());
            }
            if event.is_writable() {
                self.write_ready.insert(event.token());
            }
        }
        Ok(count)
    }

    pub fn read_ready(&self, token: Token) -> bool {
        self.read_ready.contains(&token)
    }

    pub fn write_ready(&self, token: Token) -> bool {
        self.write_ready.contains(&token)
    }
}
