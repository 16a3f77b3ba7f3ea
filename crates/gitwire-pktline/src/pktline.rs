//! Git pkt-line format implementation.
//!
//! Each line is prefixed with a 4-character hex length that counts the prefix
//! itself, or is the bare "0000" flush marker. Payloads are binary-safe.
//! See: https://git-scm.com/docs/protocol-common#_pkt_line_format

use crate::{PktLineError, Result, FLUSH, LEN_HEADER_SIZE, MAX_ENCODED_LEN};
use std::fmt;
use std::io::{self, Read, Write};

/// A pkt-line packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    /// Data line with content. The content may be empty.
    Data(Vec<u8>),
    /// Flush packet (0000), the end of a section.
    Flush,
}

impl PktLine {
    /// Creates a data packet from a string slice.
    pub fn from_string(s: &str) -> Self {
        Self::Data(s.as_bytes().to_vec())
    }

    /// Creates a data packet from bytes.
    pub fn from_bytes(b: impl Into<Vec<u8>>) -> Self {
        Self::Data(b.into())
    }

    /// Encodes the packet to bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            Self::Data(data) => {
                let len = data.len() + LEN_HEADER_SIZE;
                if len > MAX_ENCODED_LEN {
                    return Err(PktLineError::PayloadTooLong(data.len()));
                }
                let mut result = Vec::with_capacity(len);
                result.extend_from_slice(format!("{len:04x}").as_bytes());
                result.extend_from_slice(data);
                Ok(result)
            }
            Self::Flush => Ok(FLUSH.to_vec()),
        }
    }

    /// Returns true if this is a flush packet.
    pub fn is_flush(&self) -> bool {
        matches!(self, Self::Flush)
    }

    /// Returns the payload. A flush has an empty payload.
    pub fn payload(&self) -> &[u8] {
        match self {
            Self::Data(data) => data,
            Self::Flush => &[],
        }
    }

    /// Returns the data content, or None for a flush.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Data(data) => Some(data),
            Self::Flush => None,
        }
    }

    /// Returns the data as a string, trimming any trailing newline.
    pub fn as_str(&self) -> Option<&str> {
        self.data()
            .and_then(|d| std::str::from_utf8(d).ok())
            .map(|s| s.trim_end_matches('\n'))
    }
}

/// Decodes a 4-byte length header.
///
/// Only ASCII hex digits are accepted, so forms like "+fff" or " 5a" that a
/// generic integer parser would let through are rejected.
fn parse_len(header: &[u8; LEN_HEADER_SIZE]) -> Result<usize> {
    let mut len = 0usize;
    for &byte in header {
        let digit = match byte {
            b'0'..=b'9' => byte - b'0',
            b'a'..=b'f' => byte - b'a' + 10,
            b'A'..=b'F' => byte - b'A' + 10,
            _ => return Err(invalid_length(header)),
        };
        len = (len << 4) | usize::from(digit);
    }

    // 1, 2 and 3 are shorter than the header that carries them.
    if (1..LEN_HEADER_SIZE).contains(&len) {
        return Err(invalid_length(header));
    }
    Ok(len)
}

fn invalid_length(header: &[u8]) -> PktLineError {
    PktLineError::InvalidLength(String::from_utf8_lossy(header).into_owned())
}

/// Reads into `buf` until it is full or the stream ends, returning the count.
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Reader for pkt-line format.
pub struct PktLineReader<R> {
    reader: R,
}

impl<R: Read> PktLineReader<R> {
    /// Creates a new pkt-line reader.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads the next packet.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly before a new header.
    /// A stream that ends inside a header or a payload is an error.
    pub fn read(&mut self) -> Result<Option<PktLine>> {
        let mut len_buf = [0u8; LEN_HEADER_SIZE];
        match read_full(&mut self.reader, &mut len_buf)? {
            0 => return Ok(None),
            LEN_HEADER_SIZE => {}
            n => return Err(invalid_length(&len_buf[..n])),
        }

        let len = parse_len(&len_buf)?;
        if len == 0 {
            return Ok(Some(PktLine::Flush));
        }

        let data_len = len - LEN_HEADER_SIZE;
        let mut data = vec![0u8; data_len];
        let read = read_full(&mut self.reader, &mut data)?;
        if read < data_len {
            return Err(PktLineError::UnexpectedEof {
                expected: data_len,
                read,
            });
        }

        Ok(Some(PktLine::Data(data)))
    }

    /// Reads all packets until a flush packet or the end of the stream.
    pub fn read_until_flush(&mut self) -> Result<Vec<PktLine>> {
        let mut packets = Vec::new();
        loop {
            match self.read()? {
                Some(PktLine::Flush) | None => break,
                Some(pkt) => packets.push(pkt),
            }
        }
        Ok(packets)
    }

    /// Returns a mutable reference to the inner reader.
    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Consumes the reader and returns the inner reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Writer for pkt-line format.
pub struct PktLineWriter<W> {
    writer: W,
}

impl<W: Write> PktLineWriter<W> {
    /// Creates a new pkt-line writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a packet.
    pub fn write(&mut self, pkt: &PktLine) -> Result<()> {
        self.writer.write_all(&pkt.encode()?)?;
        Ok(())
    }

    /// Writes a data line.
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
        let len = data.len() + LEN_HEADER_SIZE;
        if len > MAX_ENCODED_LEN {
            return Err(PktLineError::PayloadTooLong(data.len()));
        }
        self.writer.write_all(format!("{len:04x}").as_bytes())?;
        self.writer.write_all(data)?;
        Ok(())
    }

    /// Writes each payload as its own data line.
    pub fn write_all_lines<P: AsRef<[u8]>>(&mut self, payloads: &[P]) -> Result<()> {
        for payload in payloads {
            self.write_data(payload.as_ref())?;
        }
        Ok(())
    }

    /// Writes a string line (with newline).
    pub fn write_line(&mut self, s: &str) -> Result<()> {
        let mut data = s.as_bytes().to_vec();
        if !s.ends_with('\n') {
            data.push(b'\n');
        }
        self.write_data(&data)
    }

    /// Formats a payload and writes it as one data line.
    ///
    /// This makes `write!(pkt_writer, "want {}\n", id)` frame the formatted text.
    pub fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        match args.as_str() {
            Some(s) => self.write_data(s.as_bytes()),
            None => self.write_data(args.to_string().as_bytes()),
        }
    }

    /// Writes a flush packet.
    pub fn flush_pkt(&mut self) -> Result<()> {
        self.writer.write_all(FLUSH)?;
        Ok(())
    }

    /// Flushes the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Returns a mutable reference to the inner writer.
    pub fn inner_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Returns the inner writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_PAYLOAD_SIZE;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn scan_one(input: &[u8]) -> Result<Option<PktLine>> {
        PktLineReader::new(Cursor::new(input.to_vec())).read()
    }

    #[test]
    fn test_pktline_encode() {
        assert_eq!(PktLine::from_string("hello\n").encode().unwrap(), b"000ahello\n");
        assert_eq!(PktLine::Flush.encode().unwrap(), b"0000");
    }

    #[test]
    fn test_pktline_roundtrip() {
        let packets = vec![
            PktLine::from_string("hello\n"),
            PktLine::from_string("world\n"),
            PktLine::Flush,
        ];

        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            for pkt in &packets {
                writer.write(pkt).unwrap();
            }
        }

        let mut reader = PktLineReader::new(Cursor::new(buf));
        assert_eq!(reader.read().unwrap(), Some(packets[0].clone()));
        assert_eq!(reader.read().unwrap(), Some(packets[1].clone()));
        assert_eq!(reader.read().unwrap(), Some(PktLine::Flush));
        assert_eq!(reader.read().unwrap(), None);
    }

    #[test]
    fn test_invalid_headers() {
        for input in [
            &b"0001"[..],
            b"0002",
            b"0003",
            b"0001asdfsadf",
            b"gorka",
            b"0",
            b"003",
            b"\n",
            b"   5a",
            b"5   a",
            b"5   \n",
            b"-001",
            b"-000",
            b"+fff",
        ] {
            let err = scan_one(input).unwrap_err();
            assert!(
                err.is_invalid_length(),
                "input {:?} gave {err:?}",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn test_valid_sizes_either_case() {
        for (header, len) in [("01fe", 0x01fe), ("01FE", 0x01fe), ("00b5", 0xb5), ("00B5", 0xb5)] {
            let mut input = header.as_bytes().to_vec();
            input.extend(std::iter::repeat(b'a').take(len - 4));
            let pkt = scan_one(&input).unwrap().unwrap();
            assert_eq!(pkt.payload(), &input[4..]);
        }
    }

    #[test]
    fn test_oversize_lines_tolerated() {
        for len in 0xfff1usize..=0xfff4 {
            let mut input = format!("{len:04x}").into_bytes();
            input.extend(std::iter::repeat(b'a').take(len - 4));
            let pkt = scan_one(&input).unwrap().unwrap();
            assert_eq!(pkt.payload().len(), len - 4);
        }
    }

    #[test]
    fn test_empty_data_line_is_not_flush() {
        let pkt = scan_one(b"0004").unwrap().unwrap();
        assert_eq!(pkt, PktLine::Data(Vec::new()));
        assert!(!pkt.is_flush());
    }

    #[test]
    fn test_truncated_payload() {
        let err = scan_one(b"010cfoobar").unwrap_err();
        assert!(matches!(
            err,
            PktLineError::UnexpectedEof {
                expected: 0x108,
                read: 6
            }
        ));
    }

    #[test]
    fn test_flush_distinct_from_eof() {
        let mut reader = PktLineReader::new(Cursor::new(b"0000".to_vec()));
        let pkt = reader.read().unwrap().unwrap();
        assert!(pkt.is_flush());
        assert!(pkt.payload().is_empty());
        assert_eq!(reader.read().unwrap(), None);
    }

    #[test]
    fn test_pktline_read_eof_on_empty() {
        let mut reader = PktLineReader::new(Cursor::new(Vec::<u8>::new()));
        assert!(reader.read().unwrap().is_none());
    }

    #[test]
    fn test_internal_read_error_propagates() {
        struct Failing;
        impl Read for Failing {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "foo"))
            }
        }

        let err = PktLineReader::new(Failing).read().unwrap_err();
        match err {
            PktLineError::Io(e) => {
                assert_eq!(e.kind(), io::ErrorKind::ConnectionReset);
                assert_eq!(e.to_string(), "foo");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_scan_and_payload() {
        let cases: Vec<Vec<u8>> = vec![
            b"a".to_vec(),
            b"a\n".to_vec(),
            vec![b'a'; 100],
            vec![0u8; 100],
            [vec![0u8; 100], b"\n".to_vec()].concat(),
            vec![b'a'; MAX_PAYLOAD_SIZE],
        ];
        for case in cases {
            let mut buf = Vec::new();
            PktLineWriter::new(&mut buf).write_data(&case).unwrap();
            let pkt = scan_one(&buf).unwrap().unwrap();
            assert_eq!(pkt.payload(), case.as_slice());
        }
    }

    #[test]
    fn test_skip() {
        for (n, expected) in [(1, &b"second"[..]), (2, b"third")] {
            let mut buf = Vec::new();
            PktLineWriter::new(&mut buf)
                .write_all_lines(&["first", "second", "third"])
                .unwrap();

            let mut reader = PktLineReader::new(Cursor::new(buf));
            for _ in 0..n {
                assert!(reader.read().unwrap().is_some());
            }
            assert_eq!(reader.read().unwrap().unwrap().payload(), expected);
        }
    }

    #[test]
    fn test_read_some_sections() {
        let (sections, lines) = (2, 4);
        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            for section in 0..sections {
                for line in 0..lines {
                    writer.write_line(&format!(" {section}.{line}")).unwrap();
                }
                writer.flush_pkt().unwrap();
            }
        }

        let mut reader = PktLineReader::new(Cursor::new(buf));
        let (mut section_count, mut line_count) = (0, 0);
        while let Some(pkt) = reader.read().unwrap() {
            if pkt.payload().is_empty() {
                section_count += 1;
            }
            line_count += 1;
        }
        assert_eq!(section_count, sections);
        assert_eq!(line_count, (1 + lines) * sections);
    }

    #[test]
    fn test_pktline_read_until_flush() {
        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            writer.write_line("line1").unwrap();
            writer.write_line("line2").unwrap();
            writer.flush_pkt().unwrap();
            writer.write_line("line3").unwrap();
        }

        let mut reader = PktLineReader::new(Cursor::new(buf));
        let packets = reader.read_until_flush().unwrap();
        assert_eq!(packets.len(), 2);
        let rest = reader.read_until_flush().unwrap();
        assert_eq!(rest, vec![PktLine::from_string("line3\n")]);
    }

    #[test]
    fn test_pktline_writer_write_line() {
        let mut buf = Vec::new();
        PktLineWriter::new(&mut buf).write_line("test").unwrap();
        assert_eq!(buf, b"0009test\n");

        let mut buf = Vec::new();
        PktLineWriter::new(&mut buf).write_line("test\n").unwrap();
        assert_eq!(buf, b"0009test\n");
    }

    #[test]
    fn test_pktline_writer_write_fmt() {
        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            write!(writer, "ACK {} continue\n", "1".repeat(40)).unwrap();
            write!(writer, "NAK\n").unwrap();
        }
        let expected = format!("003aACK {} continue\n0008NAK\n", "1".repeat(40));
        assert_eq!(String::from_utf8(buf).unwrap(), expected);
    }

    #[test]
    fn test_payload_too_long() {
        let data = vec![0u8; MAX_ENCODED_LEN - 3];
        let mut buf = Vec::new();
        let err = PktLineWriter::new(&mut buf).write_data(&data).unwrap_err();
        assert!(matches!(err, PktLineError::PayloadTooLong(n) if n == data.len()));
        assert!(buf.is_empty());

        let fits = vec![0u8; MAX_ENCODED_LEN - 4];
        assert!(PktLine::Data(fits).encode().is_ok());
    }

    #[test]
    fn test_pktline_as_str() {
        assert_eq!(PktLine::from_string("hello\n").as_str(), Some("hello"));
        assert_eq!(PktLine::from_string("no newline").as_str(), Some("no newline"));
        assert!(PktLine::from_bytes(vec![0xff, 0xfe]).as_str().is_none());
        assert!(PktLine::Flush.as_str().is_none());
    }

    proptest! {
        #[test]
        fn prop_roundtrip(payload in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let mut buf = Vec::new();
            PktLineWriter::new(&mut buf).write_data(&payload).unwrap();
            let pkt = scan_one(&buf).unwrap().unwrap();
            prop_assert_eq!(pkt, PktLine::Data(payload));
        }

        #[test]
        fn prop_any_valid_header(len in 4usize..=0xffff) {
            let mut input = format!("{len:04x}").into_bytes();
            input.extend(std::iter::repeat(b'x').take(len - 4));
            let pkt = scan_one(&input).unwrap().unwrap();
            prop_assert_eq!(pkt.payload().len(), len - 4);

            input.pop();
            let truncated = matches!(
                scan_one(&input),
                Err(PktLineError::UnexpectedEof { .. })
            );
            prop_assert!(len == 4 || truncated);
        }
    }
}
