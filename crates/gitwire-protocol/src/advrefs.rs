//! Reference advertisement.
//!
//! The first thing a server says on either service: every ref it has, the
//! capabilities it offers (on the first line, after a NUL) and any shallow
//! boundaries, terminated by a flush-pkt. Smart HTTP prefixes this with a
//! `# service=<name>` section.
//! See: https://git-scm.com/docs/pack-protocol#_reference_discovery

use crate::capability::{Capability, CapabilityList};
use crate::{ObjectId, ProtocolError, Result};
use gitwire_pktline::{PktLine, PktLineReader, PktLineWriter};
use std::collections::BTreeMap;
use std::io::{Read, Write};

const HEAD: &str = "HEAD";
const NO_REFS: &str = "capabilities^{}";
const PEELED_SUFFIX: &str = "^{}";
const SERVICE_PREFIX: &str = "# service=";

/// References and capabilities advertised by a server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvRefs {
    /// Smart HTTP service announced before the refs, if any.
    pub service: Option<String>,
    /// What HEAD points to, if advertised.
    pub head: Option<ObjectId>,
    /// Advertised references, by name.
    pub references: BTreeMap<String, ObjectId>,
    /// Peeled targets of annotated tags, by tag name (without `^{}`).
    pub peeled: BTreeMap<String, ObjectId>,
    /// Shallow boundary commits.
    pub shallows: Vec<ObjectId>,
    /// Capabilities offered by the server.
    pub capabilities: CapabilityList,
}

impl AdvRefs {
    /// Creates an empty advertisement.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the server advertised no references at all.
    pub fn is_empty(&self) -> bool {
        self.head.is_none() && self.references.is_empty()
    }

    /// Returns the ref HEAD points to, from the `symref` capability.
    pub fn head_target(&self) -> Option<&str> {
        self.capabilities
            .get(&Capability::SymRef)?
            .iter()
            .find_map(|value| value.strip_prefix("HEAD:"))
    }

    /// Decodes an advertisement, up to and including its terminating flush.
    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let mut adv = Self::new();
        let mut pkt_reader = PktLineReader::new(reader);

        let mut first = match pkt_reader.read()? {
            Some(PktLine::Data(line)) => line,
            Some(PktLine::Flush) | None => return Ok(adv),
        };

        let service = strip_line(&first)
            .strip_prefix(SERVICE_PREFIX.as_bytes())
            .map(|name| utf8(name).map(str::to_string))
            .transpose()?;
        if let Some(service) = service {
            adv.service = Some(service);
            // The service section is closed by its own flush.
            pkt_reader.read_until_flush()?;
            first = match pkt_reader.read()? {
                Some(PktLine::Data(line)) => line,
                Some(PktLine::Flush) | None => return Ok(adv),
            };
        }

        adv.decode_first_line(&first)?;

        while let Some(pkt) = pkt_reader.read()? {
            match pkt {
                PktLine::Flush => break,
                PktLine::Data(line) => adv.decode_line(&line)?,
            }
        }

        tracing::debug!(
            refs = adv.references.len(),
            capabilities = adv.capabilities.len(),
            "decoded ref advertisement"
        );
        Ok(adv)
    }

    fn decode_first_line(&mut self, line: &[u8]) -> Result<()> {
        check_err_line(line)?;
        let line = strip_line(line);
        let (ref_part, caps) = match line.iter().position(|&b| b == 0) {
            Some(nul) => (&line[..nul], &line[nul + 1..]),
            None => (line, &[][..]),
        };
        self.capabilities = CapabilityList::decode(caps)?;

        let (id, name) = split_ref(ref_part)?;
        if name == NO_REFS {
            return Ok(());
        }
        self.add_ref(id, name);
        Ok(())
    }

    fn decode_line(&mut self, line: &[u8]) -> Result<()> {
        check_err_line(line)?;
        let line = strip_line(line);
        if let Some(hex) = line.strip_prefix(b"shallow ") {
            self.shallows.push(ObjectId::from_hex_bytes(hex)?);
            return Ok(());
        }
        let (id, name) = split_ref(line)?;
        self.add_ref(id, name);
        Ok(())
    }

    fn add_ref(&mut self, id: ObjectId, name: &str) {
        if name == HEAD {
            self.head = Some(id);
        } else if let Some(tag) = name.strip_suffix(PEELED_SUFFIX) {
            self.peeled.insert(tag.to_string(), id);
        } else {
            self.references.insert(name.to_string(), id);
        }
    }

    /// Encodes the advertisement, including the terminating flush.
    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut pkt_writer = PktLineWriter::new(writer);

        if let Some(service) = &self.service {
            pkt_writer.write_line(&format!("{SERVICE_PREFIX}{service}"))?;
            pkt_writer.flush_pkt()?;
        }

        // First line carries the capabilities.
        let mut refs = self.references.iter();
        if let Some(head_id) = self.head {
            writeln!(pkt_writer, "{head_id} {HEAD}\0{}", self.capabilities)?;
        } else if let Some((name, id)) = refs.next() {
            writeln!(pkt_writer, "{id} {name}\0{}", self.capabilities)?;
            self.write_peeled(&mut pkt_writer, name)?;
        } else {
            writeln!(pkt_writer, "{} {NO_REFS}\0{}", ObjectId::ZERO, self.capabilities)?;
        }

        for (name, id) in refs {
            writeln!(pkt_writer, "{id} {name}")?;
            self.write_peeled(&mut pkt_writer, name)?;
        }

        for shallow in &self.shallows {
            writeln!(pkt_writer, "shallow {shallow}")?;
        }

        pkt_writer.flush_pkt()?;
        pkt_writer.flush()?;
        Ok(())
    }

    fn write_peeled<W: Write>(&self, pkt_writer: &mut PktLineWriter<W>, name: &str) -> Result<()> {
        if let Some(peeled) = self.peeled.get(name) {
            writeln!(pkt_writer, "{peeled} {name}{PEELED_SUFFIX}")?;
        }
        Ok(())
    }
}

/// Strips one trailing newline.
pub(crate) fn strip_line(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\n").unwrap_or(line)
}

pub(crate) fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|_| ProtocolError::unexpected(bytes))
}

/// Turns an `ERR <message>` line into a remote error.
pub(crate) fn check_err_line(line: &[u8]) -> Result<()> {
    match line.strip_prefix(b"ERR ") {
        Some(msg) => Err(ProtocolError::RemoteError(
            String::from_utf8_lossy(strip_line(msg)).into_owned(),
        )),
        None => Ok(()),
    }
}

/// Splits `<oid> SP <name>`.
fn split_ref(line: &[u8]) -> Result<(ObjectId, &str)> {
    let sp = line
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| ProtocolError::unexpected(line))?;
    let id = ObjectId::from_hex_bytes(&line[..sp])?;
    let name = utf8(&line[sp + 1..])?;
    if name.is_empty() {
        return Err(ProtocolError::unexpected(line));
    }
    Ok((id, name))
}
