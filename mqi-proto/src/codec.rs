//! Length-prefixed frame codec over any `Read`/`Write` stream.
//!
//! Each frame is: `<decimal length>.\n<payload>`, where the payload is a
//! term terminated by `.` (requests) or a JSON term (replies). Whether the
//! length counts characters or encoded bytes depends on the negotiated
//! protocol version (see [`LengthUnit`]).

use std::io::{self, Read, Write};

/// Maximum allowed frame payload (256 MiB).
const MAX_FRAME: usize = 256 * 1024 * 1024;

/// Longest decimal length header accepted before the `.` separator.
const MAX_HEADER_DIGITS: usize = 10;

/// What the decimal length header counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum LengthUnit {
    /// Unicode scalar values (protocol major version 0).
    Chars,
    /// UTF-8 encoded bytes (protocol major version 1 and later).
    #[default]
    Bytes,
}

impl LengthUnit {
    /// Measures `message` in this unit.
    pub fn measure(self, message: &str) -> usize {
        match self {
            Self::Chars => message.chars().count(),
            Self::Bytes => message.len(),
        }
    }
}

/// Normalizes an outgoing payload to exactly one trailing `.\n` terminator.
///
/// Surrounding whitespace and a single trailing `.` are removed first, so
/// `"foo"`, `"foo."` and `" foo.\n"` all become `"foo.\n"`.
pub fn terminate(payload: &str) -> String {
    let trimmed = payload.trim();
    let body = trimmed.strip_suffix('.').unwrap_or(trimmed).trim_end();
    format!("{body}.\n")
}

/// Terminates `payload` and writes it to `w` as one frame.
///
/// The header and the body go out as two separate writes.
pub fn encode<W: Write>(w: &mut W, payload: &str, unit: LengthUnit) -> io::Result<()> {
    let message = terminate(payload);
    let len = unit.measure(&message);
    w.write_all(format!("{len}.\n").as_bytes())?;
    w.write_all(message.as_bytes())?;
    w.flush()
}

/// Reads one frame from `r` and returns its payload without the terminator.
///
/// Blocks until the declared length has been read in full; a stream that
/// ends mid-frame yields [`io::ErrorKind::UnexpectedEof`].
pub fn decode<R: Read>(r: &mut R, unit: LengthUnit) -> io::Result<String> {
    let len = read_header(r)?;
    if len > MAX_FRAME {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "frame exceeds 256 MiB limit",
        ));
    }
    let body = match unit {
        LengthUnit::Bytes => {
            let mut payload = vec![0u8; len];
            r.read_exact(&mut payload)?;
            payload
        }
        LengthUnit::Chars => read_chars(r, len)?,
    };
    let text = String::from_utf8(body).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(strip_terminator(&text).to_owned())
}

/// Removes trailing whitespace and one trailing `.` from a received payload.
fn strip_terminator(text: &str) -> &str {
    let trimmed = text.trim_end();
    trimmed.strip_suffix('.').unwrap_or(trimmed)
}

/// Reads the `<digits>.\n` header and returns the declared length.
fn read_header<R: Read>(r: &mut R) -> io::Result<usize> {
    let mut digits = String::new();
    loop {
        match read_byte(r)? {
            b'.' if !digits.is_empty() => break,
            b @ b'0'..=b'9' if digits.len() < MAX_HEADER_DIGITS => digits.push(char::from(b)),
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "malformed frame header",
                ));
            }
        }
    }
    if read_byte(r)? != b'\n' {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "frame header not followed by newline",
        ));
    }
    digits
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Reads exactly `count` UTF-8 encoded characters.
fn read_chars<R: Read>(r: &mut R, count: usize) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let lead = read_byte(r)?;
        let width = match lead.leading_ones() {
            0 => 1,
            n @ 2..=4 => n as usize,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "invalid UTF-8 lead byte in frame",
                ));
            }
        };
        out.push(lead);
        for _ in 1..width {
            out.push(read_byte(r)?);
        }
    }
    Ok(out)
}

/// Reads a single byte, mapping end of stream to `UnexpectedEof`.
fn read_byte<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}
