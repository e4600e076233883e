use crate::prelude::*;

/// Growable FIFO used for per-connection input and output.
///
/// `storage[pos..size]` holds live bytes; `storage[..pos]` has already been
/// consumed and is reclaimed by `compact`. The backing allocation grows by
/// half its size whenever the free tail shrinks below `BUFSIZE / 2` and is
/// shrunk again once more than `BUFSIZE` bytes of it sit unused.
pub struct Buffer {
    storage: Vec<u8>, // len == capacity
    size: usize,
    pos: usize,
}

/// Outcome of scanning the input buffer for one line.
#[derive(Debug, PartialEq, Eq)]
pub enum Line {
    Got(String),
    NeedMore,
    TooLong,
}

impl Buffer {
    pub fn new() -> Self {
        Buffer {
            storage: vec![0u8; BUFSIZE],
            size: 0,
            pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Bytes appended but not yet consumed.
    pub fn unread(&self) -> usize {
        self.size - self.pos
    }

    pub fn is_drained(&self) -> bool {
        self.pos >= self.size
    }

    pub fn readable(&self) -> &[u8] {
        &self.storage[self.pos..self.size]
    }

    /// Free tail the caller may write into; commit with `commit_write`.
    pub fn writable(&mut self) -> &mut [u8] {
        let cap = self.storage.len();
        &mut self.storage[self.size..cap]
    }

    pub fn commit_write(&mut self, n: usize) {
        debug_assert!(self.size + n <= self.capacity());
        self.size += n;
        if self.is_full() {
            self.grow();
        }
    }

    /// Copy `bytes` onto the tail, reallocating if the tail is too small.
    /// An extra BUFSIZE of headroom keeps reallocation infrequent.
    pub fn append(&mut self, bytes: &[u8]) {
        if self.size + bytes.len() > self.capacity() {
            let cap = self.size + bytes.len() + BUFSIZE;
            self.storage.resize(cap, 0);
        }
        self.storage[self.size..self.size + bytes.len()].copy_from_slice(bytes);
        self.size += bytes.len();
    }

    pub fn consume(&mut self, n: usize) {
        debug_assert!(self.pos + n <= self.size);
        self.pos += n;
    }

    pub fn is_full(&self) -> bool {
        self.size + BUFSIZE / 2 > self.capacity()
    }

    /// More than BUFSIZE bytes of the allocation are unused.
    pub fn should_compact(&self) -> bool {
        self.capacity() - self.size + self.pos > BUFSIZE
    }

    pub fn grow(&mut self) {
        let cap = self.capacity() + self.capacity() / 2;
        self.storage.resize(cap, 0);
    }

    /// Move the live span to the front and give back half the free space.
    pub fn compact(&mut self) {
        let free = self.capacity() - self.size + self.pos;
        self.storage.copy_within(self.pos..self.size, 0);
        self.size -= self.pos;
        self.pos = 0;
        let cap = (self.capacity() - free / 2).max(BUFSIZE);
        self.storage.truncate(cap);
        self.storage.shrink_to_fit();
    }

    /// Scan the live span for the next `\n`-terminated line.
    ///
    /// A trailing `\r` is stripped, so CRLF and bare LF both terminate a
    /// line. A span exceeding MAXBUF before any `\n` is `TooLong`. On
    /// success the cursor advances past the `\n`.
    pub fn readline(&mut self) -> Line {
        let mut end = self.pos;
        while end < self.size {
            if end - self.pos >= MAXBUF {
                return Line::TooLong;
            }
            if self.storage[end] == b'\n' {
                let mut n = end - self.pos;
                if n > 0 && self.storage[end - 1] == b'\r' {
                    n -= 1;
                }
                let line = String::from_utf8_lossy(&self.storage[self.pos..self.pos + n]).into_owned();
                self.pos = end + 1;
                return Line::Got(line);
            }
            end += 1;
        }
        Line::NeedMore
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}
