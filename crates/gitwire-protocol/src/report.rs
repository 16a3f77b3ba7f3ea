//! Report status: receive-pack's answer to a push.

use crate::advrefs::{check_err_line, strip_line, utf8};
use crate::{ProtocolError, Result};
use gitwire_pktline::{PktLine, PktLineReader, PktLineWriter};
use std::io::{Read, Write};

const UNPACK_OK: &str = "ok";

/// The outcome of one ref update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStatus {
    /// Reference name.
    pub reference: String,
    /// `ok`, or the reason the ref was rejected.
    pub status: String,
}

impl CommandStatus {
    /// A successful update.
    pub fn ok(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            status: UNPACK_OK.to_string(),
        }
    }

    /// A rejected update.
    pub fn rejected(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            status: reason.into(),
        }
    }

    /// Returns true if the update succeeded.
    pub fn is_ok(&self) -> bool {
        self.status == UNPACK_OK
    }
}

/// The full status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportStatus {
    /// `ok`, or the error the server hit while unpacking.
    pub unpack_status: String,
    /// Per-ref results, in the order the server sent them.
    pub commands: Vec<CommandStatus>,
}

impl Default for ReportStatus {
    fn default() -> Self {
        Self {
            unpack_status: UNPACK_OK.to_string(),
            commands: Vec::new(),
        }
    }
}

impl ReportStatus {
    /// Creates a report with a successful unpack and no commands.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the first failure as a remote error.
    pub fn error(&self) -> Result<()> {
        if self.unpack_status != UNPACK_OK {
            return Err(ProtocolError::RemoteError(format!(
                "unpack error: {}",
                self.unpack_status
            )));
        }
        match self.commands.iter().find(|c| !c.is_ok()) {
            Some(cmd) => Err(ProtocolError::RemoteError(format!(
                "failed to update ref {:?}: {}",
                cmd.reference, cmd.status
            ))),
            None => Ok(()),
        }
    }

    /// Encodes the report followed by a flush.
    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut pkt_writer = PktLineWriter::new(writer);
        writeln!(pkt_writer, "unpack {}", self.unpack_status)?;
        for cmd in &self.commands {
            if cmd.is_ok() {
                writeln!(pkt_writer, "ok {}", cmd.reference)?;
            } else {
                writeln!(pkt_writer, "ng {} {}", cmd.reference, cmd.status)?;
            }
        }
        pkt_writer.flush_pkt()?;
        Ok(())
    }

    /// Decodes a report, consuming its flush.
    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let mut pkt_reader = PktLineReader::new(reader);

        let first = match pkt_reader.read()? {
            Some(PktLine::Data(line)) => line,
            Some(PktLine::Flush) => return Err(ProtocolError::UnexpectedFlush),
            None => {
                return Err(ProtocolError::Malformed(
                    "missing unpack status".to_string(),
                ))
            }
        };
        check_err_line(&first)?;
        let first = utf8(strip_line(&first))?;
        let unpack_status = first
            .strip_prefix("unpack ")
            .ok_or_else(|| ProtocolError::UnexpectedContent(first.to_string()))?;

        let mut report = Self {
            unpack_status: unpack_status.to_string(),
            commands: Vec::new(),
        };

        loop {
            let line = match pkt_reader.read()? {
                Some(PktLine::Data(line)) => line,
                Some(PktLine::Flush) => break,
                None => {
                    return Err(ProtocolError::Malformed(
                        "report status not terminated by flush".to_string(),
                    ))
                }
            };
            let line = utf8(strip_line(&line))?;
            report.commands.push(decode_command_status(line)?);
        }

        Ok(report)
    }
}

fn decode_command_status(line: &str) -> Result<CommandStatus> {
    if let Some(reference) = line.strip_prefix("ok ") {
        return Ok(CommandStatus::ok(reference));
    }
    if let Some(rest) = line.strip_prefix("ng ") {
        if let Some((reference, reason)) = rest.split_once(' ') {
            return Ok(CommandStatus::rejected(reference, reason));
        }
    }
    Err(ProtocolError::UnexpectedContent(line.to_string()))
}
