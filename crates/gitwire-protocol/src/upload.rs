//! Upload-pack requests: the client's wants and haves.
//!
//! A fetch request is sent in two parts. The first section lists wanted
//! objects (capabilities ride on the first `want`), shallow commits and the
//! deepen instruction, and ends with a flush. Then come rounds of `have`
//! lines, each closed by a flush, and finally `done`.

use crate::advrefs::{check_err_line, strip_line, utf8};
use crate::capability::CapabilityList;
use crate::{ObjectId, ProtocolError, Result};
use gitwire_pktline::{PktLine, PktLineReader, PktLineWriter};
use std::io::{Read, Write};

/// How far back history should be truncated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Depth {
    /// `deepen <n>`: at most n commits from each want.
    Commits(u32),
    /// `deepen-since <timestamp>`.
    Since(i64),
    /// `deepen-not <ref>`.
    Reference(String),
}

/// The first section of an upload-pack request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadRequest {
    /// Capabilities requested by the client.
    pub capabilities: CapabilityList,
    /// Wanted objects.
    pub wants: Vec<ObjectId>,
    /// Commits the client only has shallowly.
    pub shallows: Vec<ObjectId>,
    /// History truncation, if any.
    pub depth: Option<Depth>,
}

impl UploadRequest {
    /// Creates an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes the wants section, including its flush.
    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        let (first, rest) = self
            .wants
            .split_first()
            .ok_or_else(|| ProtocolError::Malformed("upload request has no wants".to_string()))?;

        let mut pkt_writer = PktLineWriter::new(writer);
        if self.capabilities.is_empty() {
            writeln!(pkt_writer, "want {first}")?;
        } else {
            writeln!(pkt_writer, "want {first} {}", self.capabilities)?;
        }
        for want in rest {
            writeln!(pkt_writer, "want {want}")?;
        }
        for shallow in &self.shallows {
            writeln!(pkt_writer, "shallow {shallow}")?;
        }
        match &self.depth {
            Some(Depth::Commits(n)) if *n > 0 => writeln!(pkt_writer, "deepen {n}")?,
            Some(Depth::Since(ts)) => writeln!(pkt_writer, "deepen-since {ts}")?,
            Some(Depth::Reference(name)) => writeln!(pkt_writer, "deepen-not {name}")?,
            _ => {}
        }
        pkt_writer.flush_pkt()?;
        Ok(())
    }

    /// Decodes the wants section, consuming its flush.
    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let mut req = Self::new();
        let mut pkt_reader = PktLineReader::new(reader);

        loop {
            let line = match pkt_reader.read()? {
                Some(PktLine::Data(line)) => line,
                Some(PktLine::Flush) | None => break,
            };
            check_err_line(&line)?;
            let line = utf8(strip_line(&line))?;

            if let Some(rest) = line.strip_prefix("want ") {
                let (hex, caps) = rest.split_once(' ').unwrap_or((rest, ""));
                req.wants.push(ObjectId::from_hex(hex)?);
                if req.wants.len() == 1 && !caps.is_empty() {
                    req.capabilities = CapabilityList::decode(caps.as_bytes())?;
                }
            } else if let Some(hex) = line.strip_prefix("shallow ") {
                req.shallows.push(ObjectId::from_hex(hex)?);
            } else if let Some(n) = line.strip_prefix("deepen ") {
                req.depth = Some(Depth::Commits(parse_number(line, n)?));
            } else if let Some(ts) = line.strip_prefix("deepen-since ") {
                req.depth = Some(Depth::Since(parse_number(line, ts)?));
            } else if let Some(name) = line.strip_prefix("deepen-not ") {
                req.depth = Some(Depth::Reference(name.to_string()));
            } else {
                return Err(ProtocolError::UnexpectedContent(line.to_string()));
            }
        }

        if req.wants.is_empty() {
            return Err(ProtocolError::Malformed("upload request has no wants".to_string()));
        }
        Ok(req)
    }
}

fn parse_number<T: std::str::FromStr>(line: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| ProtocolError::UnexpectedContent(line.to_string()))
}

/// One round of `have` lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadHaves {
    /// Objects the client already has.
    pub haves: Vec<ObjectId>,
}

impl UploadHaves {
    /// Encodes the haves. With `flush`, a non-empty round is closed by a flush.
    pub fn encode<W: Write>(&self, writer: &mut W, flush: bool) -> Result<()> {
        let mut pkt_writer = PktLineWriter::new(writer);
        for have in &self.haves {
            writeln!(pkt_writer, "have {have}")?;
        }
        if flush && !self.haves.is_empty() {
            pkt_writer.flush_pkt()?;
        }
        Ok(())
    }

    /// Writes the final `done` line.
    pub fn encode_done<W: Write>(writer: &mut W) -> Result<()> {
        PktLineWriter::new(writer).write_line("done")?;
        Ok(())
    }

    /// Decodes one round of haves.
    ///
    /// Returns the round and whether it ended with `done` rather than a flush.
    pub fn decode<R: Read>(reader: &mut R) -> Result<(Self, bool)> {
        let mut round = Self::default();
        let mut pkt_reader = PktLineReader::new(reader);

        loop {
            let line = match pkt_reader.read()? {
                Some(PktLine::Data(line)) => line,
                Some(PktLine::Flush) | None => return Ok((round, false)),
            };
            let line = utf8(strip_line(&line))?;
            if line == "done" {
                return Ok((round, true));
            }
            match line.strip_prefix("have ") {
                Some(hex) => round.haves.push(ObjectId::from_hex(hex)?),
                None => return Err(ProtocolError::UnexpectedContent(line.to_string())),
            }
        }
    }
}

/// A complete fetch request: wants plus the client's haves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadPackRequest {
    /// Wants section.
    pub request: UploadRequest,
    /// Haves sent in a single round.
    pub haves: UploadHaves,
}

impl UploadPackRequest {
    /// Creates an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if nothing is wanted.
    pub fn is_empty(&self) -> bool {
        self.request.wants.is_empty()
    }

    /// Encodes wants, haves and `done`, as a stateful client sends them.
    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.request.encode(writer)?;
        self.haves.encode(writer, true)?;
        UploadHaves::encode_done(writer)
    }
}
