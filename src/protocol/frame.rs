// RESP frame codec
//
// Decoding runs in two phases. A structure-only scanner first measures
// the frame at the front of the read buffer; once the whole frame is
// present, its bytes are detached from the buffer and decoded, with
// every bulk payload taken as a `Bytes` slice of the detached storage
// rather than a copy. Encoding is the inverse surface: wire forms for
// reply values plus the array-of-bulk-strings shape used for commands.

use super::{RespError, RespValue, Result};
use bytes::{BufMut, Bytes, BytesMut};

const CRLF: &[u8] = b"\r\n";
const NULL_BULK: &[u8] = b"$-1\r\n";
const NULL_ARRAY: &[u8] = b"*-1\r\n";

/// Split one complete frame off the front of `buf` and decode it.
///
/// Returns `Ok(None)` when the buffer does not yet hold a whole frame;
/// the buffer is left untouched so the caller can read more bytes and
/// retry. Pipelined frames stay in the buffer for the next call.
pub fn next_frame(buf: &mut BytesMut) -> Result<Option<RespValue>> {
    let len = match frame_len(buf)? {
        Some(len) => len,
        None => return Ok(None),
    };
    let frame = buf.split_to(len).freeze();
    decode(frame).map(Some)
}

/// Decode a buffer holding exactly one frame.
pub fn decode(frame: Bytes) -> Result<RespValue> {
    let mut decoder = Decoder { frame, pos: 0 };
    let value = decoder.value()?;
    if decoder.pos != decoder.frame.len() {
        return Err(RespError::TrailingData);
    }
    Ok(value)
}

/// Measure the frame at the start of `buf` without decoding it.
///
/// This is the framing fast path: it walks the structure counting
/// bytes and allocates nothing. `Ok(None)` means the frame is still
/// arriving.
pub fn frame_len(buf: &[u8]) -> Result<Option<usize>> {
    let mut pos = 0;
    match skip_value(buf, &mut pos) {
        Ok(()) => Ok(Some(pos)),
        Err(RespError::Incomplete) => Ok(None),
        Err(e) => Err(e),
    }
}

fn skip_value(buf: &[u8], pos: &mut usize) -> Result<()> {
    let marker = *buf.get(*pos).ok_or(RespError::Incomplete)?;
    *pos += 1;

    match marker {
        b'+' | b'-' | b':' => {
            let cr = line_end(buf, *pos)?;
            *pos = cr + 2;
            Ok(())
        }
        b'$' => match length_at(buf, pos)? {
            -1 => Ok(()),
            n if n >= 0 => {
                let payload_end = *pos + n as usize;
                if payload_end + 2 > buf.len() {
                    return Err(RespError::Incomplete);
                }
                if &buf[payload_end..payload_end + 2] != CRLF {
                    return Err(RespError::MissingTerminator);
                }
                *pos = payload_end + 2;
                Ok(())
            }
            _ => Err(RespError::BadLength),
        },
        b'*' => match length_at(buf, pos)? {
            -1 => Ok(()),
            n if n >= 0 => {
                for _ in 0..n {
                    skip_value(buf, pos)?;
                }
                Ok(())
            }
            _ => Err(RespError::BadLength),
        },
        other => Err(RespError::UnknownType(other)),
    }
}

/// Read a length line at `pos`, advancing past its terminator.
fn length_at(buf: &[u8], pos: &mut usize) -> Result<i64> {
    let cr = line_end(buf, *pos)?;
    let len = parse_decimal(&buf[*pos..cr]).ok_or(RespError::BadLength)?;
    *pos = cr + 2;
    Ok(len)
}

/// Index of the CR closing the line that starts at `from`.
fn line_end(buf: &[u8], from: usize) -> Result<usize> {
    let Some(i) = buf[from..].iter().position(|&b| b == b'\r') else {
        return Err(RespError::Incomplete);
    };
    let cr = from + i;
    match buf.get(cr + 1) {
        Some(b'\n') => Ok(cr),
        Some(_) => Err(RespError::MissingTerminator),
        None => Err(RespError::Incomplete),
    }
}

fn parse_decimal(digits: &[u8]) -> Option<i64> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Walks a detached frame, slicing bulk payloads out of its storage.
struct Decoder {
    frame: Bytes,
    pos: usize,
}

impl Decoder {
    fn value(&mut self) -> Result<RespValue> {
        let marker = *self.frame.get(self.pos).ok_or(RespError::Incomplete)?;
        self.pos += 1;

        match marker {
            b'+' => Ok(RespValue::SimpleString(self.status_line()?)),
            b'-' => Ok(RespValue::Error(self.status_line()?)),
            b':' => {
                let line = self.line()?;
                parse_decimal(&line)
                    .map(RespValue::Integer)
                    .ok_or(RespError::BadInteger)
            }
            b'$' => self.bulk(),
            b'*' => self.array(),
            other => Err(RespError::UnknownType(other)),
        }
    }

    /// The line starting at the cursor, as a slice of the frame.
    fn line(&mut self) -> Result<Bytes> {
        let cr = line_end(&self.frame, self.pos)?;
        let line = self.frame.slice(self.pos..cr);
        self.pos = cr + 2;
        Ok(line)
    }

    fn status_line(&mut self) -> Result<String> {
        let line = self.line()?;
        std::str::from_utf8(&line)
            .map(str::to_owned)
            .map_err(|_| RespError::BadStatusLine)
    }

    fn length(&mut self) -> Result<i64> {
        let line = self.line()?;
        parse_decimal(&line).ok_or(RespError::BadLength)
    }

    fn bulk(&mut self) -> Result<RespValue> {
        match self.length()? {
            -1 => Ok(RespValue::BulkString(None)),
            n if n >= 0 => {
                let end = self.pos + n as usize;
                if end + 2 > self.frame.len() {
                    return Err(RespError::Incomplete);
                }
                if &self.frame[end..end + 2] != CRLF {
                    return Err(RespError::MissingTerminator);
                }
                // The payload aliases the frame storage, no copy.
                let payload = self.frame.slice(self.pos..end);
                self.pos = end + 2;
                Ok(RespValue::BulkString(Some(payload)))
            }
            _ => Err(RespError::BadLength),
        }
    }

    fn array(&mut self) -> Result<RespValue> {
        match self.length()? {
            -1 => Ok(RespValue::Array(None)),
            n if n >= 0 => {
                let mut items = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    items.push(self.value()?);
                }
                Ok(RespValue::Array(Some(items)))
            }
            _ => Err(RespError::BadLength),
        }
    }
}

impl RespValue {
    /// Append this value's wire form to `out`.
    pub fn encode(&self, out: &mut BytesMut) {
        match self {
            RespValue::SimpleString(s) => put_line(out, b'+', s.as_bytes()),
            RespValue::Error(msg) => put_line(out, b'-', msg.as_bytes()),
            RespValue::Integer(n) => put_line(out, b':', n.to_string().as_bytes()),
            RespValue::BulkString(None) => out.put_slice(NULL_BULK),
            RespValue::BulkString(Some(payload)) => put_bulk(out, payload),
            RespValue::Array(None) => out.put_slice(NULL_ARRAY),
            RespValue::Array(Some(items)) => {
                put_line(out, b'*', items.len().to_string().as_bytes());
                for item in items {
                    item.encode(out);
                }
            }
        }
    }

    /// This value's wire form as a standalone buffer.
    pub fn to_wire(&self) -> Bytes {
        let mut out = BytesMut::new();
        self.encode(&mut out);
        out.freeze()
    }
}

/// Append an argument vector as an array of bulk strings: the frame
/// shape of every client command, AOF record and replication entry.
pub fn encode_command_into(out: &mut BytesMut, argv: &[Bytes]) {
    put_line(out, b'*', argv.len().to_string().as_bytes());
    for arg in argv {
        put_bulk(out, arg);
    }
}

/// One command frame as a standalone buffer.
pub fn encode_command(argv: &[Bytes]) -> Bytes {
    let mut out = BytesMut::new();
    encode_command_into(&mut out, argv);
    out.freeze()
}

fn put_line(out: &mut BytesMut, marker: u8, body: &[u8]) {
    out.put_u8(marker);
    out.put_slice(body);
    out.put_slice(CRLF);
}

fn put_bulk(out: &mut BytesMut, payload: &[u8]) {
    put_line(out, b'$', payload.len().to_string().as_bytes());
    out.put_slice(payload);
    out.put_slice(CRLF);
}
