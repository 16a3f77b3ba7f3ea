//! Side-band multiplexing of pack data, progress and errors.
//!
//! When `side-band` or `side-band-64k` is agreed, every pkt-line after the
//! negotiation starts with a channel byte: 1 carries pack data, 2 carries
//! progress text for the user, 3 carries a fatal error message.

use crate::capability::{Capability, CapabilityList};
use crate::ProtocolError;
use gitwire_pktline::{PktLine, PktLineReader, PktLineWriter, MAX_PAYLOAD_SIZE};
use std::io::{self, Read, Write};

/// Largest payload, channel byte included, with `side-band`.
pub const MAX_SIDE_BAND_SIZE: usize = 1000 - 4;

/// Largest payload, channel byte included, with `side-band-64k`.
pub const MAX_SIDE_BAND_64K_SIZE: usize = MAX_PAYLOAD_SIZE;

/// A side-band channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Channel {
    /// Pack data.
    PackData = 1,
    /// Progress messages.
    Progress = 2,
    /// Fatal error.
    Error = 3,
}

/// Which side-band flavour is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideBandKind {
    /// `side-band`: 1000-byte frames.
    SideBand,
    /// `side-band-64k`: 65520-byte frames.
    SideBand64k,
}

impl SideBandKind {
    /// Picks the side-band flavour from agreed capabilities, preferring 64k.
    pub fn from_capabilities(caps: &CapabilityList) -> Option<Self> {
        if caps.supports(&Capability::SideBand64k) {
            Some(Self::SideBand64k)
        } else if caps.supports(&Capability::SideBand) {
            Some(Self::SideBand)
        } else {
            None
        }
    }

    /// Largest data chunk per frame, excluding the channel byte.
    pub fn max_data_len(&self) -> usize {
        match self {
            Self::SideBand => MAX_SIDE_BAND_SIZE - 1,
            Self::SideBand64k => MAX_SIDE_BAND_64K_SIZE - 1,
        }
    }
}

/// Reads pack data out of a side-band stream.
///
/// Progress is forwarded to the progress writer when one is set, and logged
/// otherwise. An error frame ends the stream with a [`ProtocolError::RemoteError`].
pub struct Demuxer<R> {
    reader: PktLineReader<R>,
    progress: Option<Box<dyn Write + Send>>,
    pending: Vec<u8>,
    pos: usize,
    done: bool,
}

impl<R: Read> Demuxer<R> {
    /// Creates a demuxer over a pkt-line stream.
    pub fn new(reader: R) -> Self {
        Self {
            reader: PktLineReader::new(reader),
            progress: None,
            pending: Vec::new(),
            pos: 0,
            done: false,
        }
    }

    /// Sends progress messages to `progress` instead of the log.
    pub fn with_progress(mut self, progress: Box<dyn Write + Send>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Returns the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }

    /// Loads the next pack-data frame. Returns false at the end of the stream.
    fn next_frame(&mut self) -> io::Result<bool> {
        loop {
            let line = match self.reader.read().map_err(into_io)? {
                Some(PktLine::Data(line)) => line,
                Some(PktLine::Flush) | None => return Ok(false),
            };
            let Some((&channel, payload)) = line.split_first() else {
                continue;
            };
            match channel {
                1 => {
                    self.pending = payload.to_vec();
                    self.pos = 0;
                    return Ok(true);
                }
                2 => self.progress(payload)?,
                3 => {
                    let msg = String::from_utf8_lossy(payload).trim_end().to_string();
                    return Err(into_io(ProtocolError::RemoteError(msg)));
                }
                other => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("unknown side-band channel {other}"),
                    ))
                }
            }
        }
    }

    fn progress(&mut self, payload: &[u8]) -> io::Result<()> {
        match self.progress.as_mut() {
            Some(w) => w.write_all(payload),
            None => {
                let msg = String::from_utf8_lossy(payload);
                let msg = msg.trim_end();
                if !msg.is_empty() {
                    tracing::info!(remote = %msg, "progress");
                }
                Ok(())
            }
        }
    }
}

impl<R: Read> Read for Demuxer<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.pending.len() {
            if self.done || !self.next_frame()? {
                self.done = true;
                return Ok(0);
            }
        }
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Writes data into side-band frames on one channel.
pub struct Muxer<W: Write> {
    writer: PktLineWriter<W>,
    max_data_len: usize,
}

impl<W: Write> Muxer<W> {
    /// Creates a muxer for the given side-band flavour.
    pub fn new(kind: SideBandKind, writer: W) -> Self {
        Self {
            writer: PktLineWriter::new(writer),
            max_data_len: kind.max_data_len(),
        }
    }

    /// Writes `data` on `channel`, split into as many frames as needed.
    pub fn write_channel(&mut self, channel: Channel, data: &[u8]) -> io::Result<()> {
        for chunk in data.chunks(self.max_data_len) {
            let mut frame = Vec::with_capacity(chunk.len() + 1);
            frame.push(channel as u8);
            frame.extend_from_slice(chunk);
            self.writer.write_data(&frame).map_err(into_io)?;
        }
        Ok(())
    }

    /// Writes the closing flush-pkt.
    pub fn finish(&mut self) -> io::Result<()> {
        self.writer.flush_pkt().map_err(into_io)?;
        self.writer.flush().map_err(into_io)
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write> Write for Muxer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_channel(Channel::PackData, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush().map_err(into_io)
    }
}

fn into_io<E: Into<ProtocolError>>(err: E) -> io::Error {
    match err.into() {
        ProtocolError::Io(e) => e,
        ProtocolError::PktLine(gitwire_pktline::PktLineError::Io(e)) => e,
        other => io::Error::new(io::ErrorKind::Other, other),
    }
}
