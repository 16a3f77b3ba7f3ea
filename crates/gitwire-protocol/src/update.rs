//! Reference update requests sent to receive-pack.

use crate::advrefs::{check_err_line, strip_line, utf8};
use crate::capability::CapabilityList;
use crate::{ObjectId, ProtocolError, Result};
use gitwire_pktline::{PktLine, PktLineReader, PktLineWriter};
use std::fmt;
use std::io::{Read, Write};

/// What a command does to its reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// The reference does not exist yet.
    Create,
    /// The reference moves from one object to another.
    Update,
    /// The reference is removed.
    Delete,
    /// Both ids are zero.
    Invalid,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Invalid => "invalid",
        })
    }
}

/// A single ref update: `<old> <new> <name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Reference name.
    pub name: String,
    /// Old object ID (zero for create).
    pub old: ObjectId,
    /// New object ID (zero for delete).
    pub new: ObjectId,
}

impl Command {
    /// Creates a command.
    pub fn new(name: impl Into<String>, old: ObjectId, new: ObjectId) -> Self {
        Self {
            name: name.into(),
            old,
            new,
        }
    }

    /// Checks if this is a create command.
    pub fn is_create(&self) -> bool {
        self.old.is_zero() && !self.new.is_zero()
    }

    /// Checks if this is a delete command.
    pub fn is_delete(&self) -> bool {
        self.new.is_zero() && !self.old.is_zero()
    }

    /// Classifies the command.
    pub fn action(&self) -> Action {
        match (self.old.is_zero(), self.new.is_zero()) {
            (true, true) => Action::Invalid,
            (true, false) => Action::Create,
            (false, true) => Action::Delete,
            (false, false) => Action::Update,
        }
    }

    fn parse(line: &str) -> Result<Self> {
        let mut parts = line.splitn(3, ' ');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(old), Some(new), Some(name)) if !name.is_empty() => Ok(Self {
                old: ObjectId::from_hex(old)?,
                new: ObjectId::from_hex(new)?,
                name: name.to_string(),
            }),
            _ => Err(ProtocolError::UnexpectedContent(line.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.old, self.new, self.name)
    }
}

/// The command section of a push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceUpdateRequest {
    /// Capabilities, sent after a NUL on the first command.
    pub capabilities: CapabilityList,
    /// Ref updates in the order they are sent.
    pub commands: Vec<Command>,
    /// Commits the client only has shallowly.
    pub shallows: Vec<ObjectId>,
}

impl ReferenceUpdateRequest {
    /// Creates an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if every command deletes a ref, so no pack is needed.
    pub fn is_delete_only(&self) -> bool {
        self.commands.iter().all(Command::is_delete)
    }

    /// Encodes shallows, commands and the closing flush.
    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        if self.commands.is_empty() {
            return Err(ProtocolError::Malformed(
                "update request has no commands".to_string(),
            ));
        }

        let mut pkt_writer = PktLineWriter::new(writer);
        for shallow in &self.shallows {
            writeln!(pkt_writer, "shallow {shallow}")?;
        }
        for (i, cmd) in self.commands.iter().enumerate() {
            if i == 0 && !self.capabilities.is_empty() {
                writeln!(pkt_writer, "{cmd}\0{}", self.capabilities)?;
            } else {
                writeln!(pkt_writer, "{cmd}")?;
            }
        }
        pkt_writer.flush_pkt()?;
        Ok(())
    }

    /// Decodes the command section, consuming its flush.
    ///
    /// The pack, if any, follows on the same stream.
    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let mut req = Self::new();
        let mut pkt_reader = PktLineReader::new(reader);

        loop {
            let data = match pkt_reader.read()? {
                Some(PktLine::Data(data)) => data,
                Some(PktLine::Flush) | None => break,
            };
            check_err_line(&data)?;
            let line = strip_line(&data);

            if let Some(hex) = line.strip_prefix(b"shallow ") {
                req.shallows.push(ObjectId::from_hex_bytes(hex)?);
                continue;
            }

            let (cmd, caps) = match line.iter().position(|&b| b == 0) {
                Some(nul) => (&line[..nul], Some(&line[nul + 1..])),
                None => (line, None),
            };
            if let Some(caps) = caps {
                if !req.commands.is_empty() {
                    return Err(ProtocolError::unexpected(line));
                }
                req.capabilities = CapabilityList::decode(caps)?;
            }
            req.commands.push(Command::parse(utf8(cmd)?)?);
        }

        if req.commands.is_empty() {
            return Err(ProtocolError::Malformed(
                "update request has no commands".to_string(),
            ));
        }
        Ok(req)
    }
}
