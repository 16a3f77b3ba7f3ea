//! Upload-pack server response: the ACK/NAK lines of object negotiation.
//!
//! The server answers each round of `have` lines with acknowledgments whose
//! shape depends on the negotiation mode agreed through capabilities. Once
//! negotiation ends the packfile follows on the same stream, without a
//! separating flush, so the decoder must stop exactly at the last ACK/NAK.
//! See: https://git-scm.com/docs/pack-protocol#_packfile_negotiation

use crate::capability::{Capability, CapabilityList};
use crate::{ObjectId, ProtocolError, Result};
use gitwire_pktline::{Peek, PktLine, PktLineReader, PktLineWriter};
use std::io::Write;

const ACK: &[u8; 3] = b"ACK";
const NAK: &[u8; 3] = b"NAK";

/// Minimum length of an `ACK <hash>` line: "ACK " plus 40 hex digits.
const ACK_LINE_LEN: usize = 44;

/// How many bytes to look ahead when deciding whether another ACK/NAK follows.
const LOOKAHEAD: usize = 7;

/// Acknowledgment verbosity agreed for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationMode {
    /// At most one ACK, no status words.
    SingleAck,
    /// `multi_ack`: `ACK <hash> continue` for every common object.
    MultiAck,
    /// `multi_ack_detailed`: `ACK <hash> common` and `ACK <hash> ready`.
    MultiAckDetailed,
}

impl NegotiationMode {
    /// Selects the mode from agreed capabilities.
    ///
    /// `multi_ack` wins when both multi-ack tokens are present.
    pub fn from_capabilities(caps: &CapabilityList) -> Self {
        if caps.supports(&Capability::MultiAck) {
            Self::MultiAck
        } else if caps.supports(&Capability::MultiAckDetailed) {
            Self::MultiAckDetailed
        } else {
            Self::SingleAck
        }
    }

    /// Returns true for either multi-ack variant.
    pub fn is_multi_ack(&self) -> bool {
        !matches!(self, Self::SingleAck)
    }
}

/// The server's view of one candidate commit in a negotiation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckRecord {
    /// The candidate commit.
    pub hash: ObjectId,
    /// The server has this object.
    pub is_common: bool,
    /// The server has enough to build a pack and negotiation may stop.
    pub is_ready: bool,
}

impl AckRecord {
    /// A record the server does not have.
    pub fn unknown(hash: ObjectId) -> Self {
        Self {
            hash,
            is_common: false,
            is_ready: false,
        }
    }

    /// A record the server has in common with the client.
    pub fn common(hash: ObjectId) -> Self {
        Self {
            hash,
            is_common: true,
            is_ready: false,
        }
    }

    /// A common record after which the server is ready to send a pack.
    pub fn ready(hash: ObjectId) -> Self {
        Self {
            hash,
            is_common: true,
            is_ready: true,
        }
    }
}

/// One round of negotiation as judged by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadPackCommand {
    /// Acknowledgment state per `have`, in the order the client sent them.
    pub acks: Vec<AckRecord>,
    /// The client sent `done` in this round.
    pub done: bool,
}

/// Acknowledgments decoded from an upload-pack response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerResponse {
    /// Acknowledged hashes, in order of appearance.
    pub acks: Vec<ObjectId>,
}

impl ServerResponse {
    /// Decodes ACK/NAK lines until the stream ends or something other than an
    /// acknowledgment is about to be read.
    ///
    /// `is_multi_ack` should be true when the request was made with either
    /// multi-ack capability. Decoding is the same in both cases: status words
    /// are accepted but not interpreted.
    pub fn decode<R: Peek>(reader: &mut R, is_multi_ack: bool) -> Result<Self> {
        let mut response = Self::default();
        let mut pkt_reader = PktLineReader::new(reader);

        while let Some(pkt) = pkt_reader.read()? {
            response.decode_line(&pkt)?;

            // Some servers send a duplicate ACK right before the packfile even
            // without multi_ack, so the end of the response cannot be inferred
            // from the mode; look at what comes next instead.
            if Self::stop_reading(pkt_reader.inner_mut())? {
                break;
            }
        }

        tracing::debug!(
            acks = response.acks.len(),
            multi_ack = is_multi_ack,
            "decoded server response"
        );
        Ok(response)
    }

    /// Returns true unless the upcoming bytes look like another ACK/NAK line.
    fn stop_reading<R: Peek>(reader: &mut R) -> Result<bool> {
        let ahead = reader.peek(LOOKAHEAD)?;
        if ahead.is_empty() {
            return Ok(true);
        }
        if ahead.len() > 4 && is_ack_or_nak(&ahead[0..3]) {
            return Ok(false);
        }
        if ahead.len() == LOOKAHEAD && is_ack_or_nak(&ahead[4..7]) {
            return Ok(false);
        }
        Ok(true)
    }

    fn decode_line(&mut self, pkt: &PktLine) -> Result<()> {
        let line = match pkt {
            PktLine::Flush => return Err(ProtocolError::UnexpectedFlush),
            PktLine::Data(line) => line.as_slice(),
        };

        if line.starts_with(ACK) {
            return self.decode_ack_line(line);
        }
        if line.starts_with(NAK) {
            return Ok(());
        }
        Err(ProtocolError::unexpected(line))
    }

    fn decode_ack_line(&mut self, line: &[u8]) -> Result<()> {
        let malformed = || ProtocolError::MalformedAck(String::from_utf8_lossy(line).into_owned());

        if line.len() < ACK_LINE_LEN {
            return Err(malformed());
        }
        let sp = line.iter().position(|&b| b == b' ').ok_or_else(malformed)?;
        if sp + 41 > line.len() {
            return Err(malformed());
        }

        // TODO: surface the continue/common/ready status word once the fetch
        // side tracks multi_ack state.
        let hash = ObjectId::from_hex_bytes(&line[sp + 1..sp + 41]).map_err(|_| malformed())?;
        self.acks.push(hash);
        Ok(())
    }
}

fn is_ack_or_nak(bytes: &[u8]) -> bool {
    bytes == ACK || bytes == NAK
}

/// Writes the acknowledgments a server sends for the given negotiation rounds.
///
/// No flush is written; the packfile or the next round follows directly.
pub fn write_server_response<W: Write>(
    writer: &mut W,
    mode: NegotiationMode,
    commands: &[UploadPackCommand],
) -> Result<()> {
    let mut pkt_writer = PktLineWriter::new(writer);
    let mut ready_hash: Option<ObjectId> = None;
    let mut final_hash: Option<ObjectId> = None;

    for cmd in commands {
        match mode {
            NegotiationMode::MultiAck => {
                for record in &cmd.acks {
                    if record.is_ready && ready_hash.is_none() {
                        ready_hash = Some(record.hash);
                    }
                    if record.is_common || ready_hash.is_some() {
                        final_hash = Some(record.hash);
                        writeln!(pkt_writer, "ACK {} continue", record.hash)?;
                    }
                }
                if !cmd.done {
                    pkt_writer.write_line("NAK")?;
                }
            }
            NegotiationMode::MultiAckDetailed => {
                for record in &cmd.acks {
                    if record.is_ready {
                        ready_hash = Some(record.hash);
                        final_hash = Some(record.hash);
                        writeln!(pkt_writer, "ACK {} ready", record.hash)?;
                    } else if record.is_common {
                        final_hash = Some(record.hash);
                        writeln!(pkt_writer, "ACK {} common", record.hash)?;
                    }
                }
                if !cmd.done {
                    pkt_writer.write_line("NAK")?;
                }
            }
            NegotiationMode::SingleAck => {
                if final_hash.is_none() {
                    if let Some(record) = cmd.acks.iter().find(|r| r.is_common) {
                        final_hash = Some(record.hash);
                        writeln!(pkt_writer, "ACK {}", record.hash)?;
                    }
                }
                if !cmd.done && final_hash.is_none() {
                    pkt_writer.write_line("NAK")?;
                }
            }
        }
    }

    match final_hash {
        Some(hash) if mode.is_multi_ack() => writeln!(pkt_writer, "ACK {hash}")?,
        Some(_) => {}
        None => pkt_writer.write_line("NAK")?,
    }

    tracing::debug!(
        ?mode,
        rounds = commands.len(),
        ready = ready_hash.is_some(),
        common = final_hash.is_some(),
        "wrote server response"
    );
    Ok(())
}
