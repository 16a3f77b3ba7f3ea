//! Look-ahead support for byte streams.
//!
//! Negotiation needs to inspect what follows an acknowledgment line without
//! consuming it, since the next bytes may already belong to the packfile.

use std::io::{self, BufRead, Read};

const DEFAULT_CAPACITY: usize = 8 * 1024;

/// A byte stream that can show upcoming bytes without moving its cursor.
pub trait Peek: Read {
    /// Returns up to `n` upcoming bytes without consuming them.
    ///
    /// Fewer than `n` bytes are returned only when the stream ends first.
    fn peek(&mut self, n: usize) -> io::Result<&[u8]>;
}

impl<P: Peek + ?Sized> Peek for &mut P {
    fn peek(&mut self, n: usize) -> io::Result<&[u8]> {
        (**self).peek(n)
    }
}

impl Peek for &[u8] {
    fn peek(&mut self, n: usize) -> io::Result<&[u8]> {
        let end = n.min(self.len());
        Ok(&self[..end])
    }
}

impl<T: AsRef<[u8]>> Peek for io::Cursor<T> {
    fn peek(&mut self, n: usize) -> io::Result<&[u8]> {
        let position = usize::try_from(self.position()).unwrap_or(usize::MAX);
        let data = self.get_ref().as_ref();
        let start = position.min(data.len());
        let end = start.saturating_add(n).min(data.len());
        Ok(&data[start..end])
    }
}

/// Buffered reader whose buffer grows on demand to satisfy [`Peek::peek`].
pub struct PeekReader<R> {
    inner: R,
    buf: Vec<u8>,
    pos: usize,
}

impl<R: Read> PeekReader<R> {
    /// Wraps a reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(DEFAULT_CAPACITY),
            pos: 0,
        }
    }

    /// Returns the bytes buffered but not yet consumed.
    pub fn buffer(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    /// Returns a reference to the inner reader.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Returns a mutable reference to the inner reader.
    ///
    /// Reading from it directly skips whatever is buffered.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consumes the wrapper and returns the inner reader. Buffered bytes are lost.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn available(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Reads from the inner stream until `n` bytes are buffered or it ends.
    fn fill_to(&mut self, n: usize) -> io::Result<()> {
        while self.available() < n {
            if self.pos > 0 {
                self.buf.drain(..self.pos);
                self.pos = 0;
            }

            let start = self.buf.len();
            let want = DEFAULT_CAPACITY.max(n - start);
            self.buf.resize(start + want, 0);
            match self.inner.read(&mut self.buf[start..]) {
                Ok(0) => {
                    self.buf.truncate(start);
                    break;
                }
                Ok(read) => self.buf.truncate(start + read),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => self.buf.truncate(start),
                Err(e) => {
                    self.buf.truncate(start);
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

impl<R: Read> Read for PeekReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.available() == 0 && out.len() >= DEFAULT_CAPACITY {
            return self.inner.read(out);
        }
        let read = {
            let available = self.fill_buf()?;
            let read = available.len().min(out.len());
            out[..read].copy_from_slice(&available[..read]);
            read
        };
        self.consume(read);
        Ok(read)
    }
}

impl<R: Read> BufRead for PeekReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.available() == 0 {
            self.fill_to(1)?;
        }
        Ok(self.buffer())
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.buf.len());
        if self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        }
    }
}

impl<R: Read> Peek for PeekReader<R> {
    fn peek(&mut self, n: usize) -> io::Result<&[u8]> {
        self.fill_to(n)?;
        let end = n.min(self.available());
        Ok(&self.buf[self.pos..self.pos + end])
    }
}
