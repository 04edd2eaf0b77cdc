// Protocol module - RESP value model and frame codec

pub mod frame;

pub use frame::{decode, encode_command, encode_command_into, frame_len, next_frame};

use bytes::Bytes;
use thiserror::Error;

/// RESP (REdis Serialization Protocol) value types
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Simple string: +OK\r\n
    SimpleString(String),
    /// Error: -ERR unknown command\r\n
    Error(String),
    /// Integer: :1000\r\n
    Integer(i64),
    /// Bulk string: $6\r\nfoobar\r\n (None for null bulk string)
    BulkString(Option<Bytes>),
    /// Array: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n (None for null array)
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// The shared `+OK` status reply.
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// Build an error reply from a message.
    pub fn error(msg: impl Into<String>) -> Self {
        RespValue::Error(msg.into())
    }

    /// Build a bulk string reply from bytes.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(Some(data.into()))
    }

    /// The null array used to report a cancelled transaction.
    pub fn null_array() -> Self {
        RespValue::Array(None)
    }

    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::BulkString(None) | RespValue::Array(None))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }
}

/// Decoding failures. `Incomplete` is not fatal: it means the buffer
/// ends before the frame does, so the caller should read more bytes and
/// retry.
#[derive(Error, Debug)]
pub enum RespError {
    #[error("incomplete frame")]
    Incomplete,

    #[error("unexpected type byte 0x{0:02x}")]
    UnknownType(u8),

    #[error("malformed length prefix")]
    BadLength,

    #[error("line is missing its CRLF terminator")]
    MissingTerminator,

    #[error("malformed integer payload")]
    BadInteger,

    #[error("status line is not valid UTF-8")]
    BadStatusLine,

    #[error("trailing bytes after frame")]
    TrailingData,
}

pub type Result<T> = std::result::Result<T, RespError>;
