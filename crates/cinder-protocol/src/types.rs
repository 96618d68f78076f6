//! RESP frame types.
//!
//! The [`Frame`] enum represents a single parsed RESP value. Bulk strings
//! use `Bytes` for reference-counted storage that avoids copies when
//! moving data between the parser, the keyspace, and the AOF pipeline.

use bytes::Bytes;

/// A parsed command line: the verb followed by its arguments, each a
/// binary-safe token.
pub type CmdLine = Vec<Bytes>;

/// A single RESP protocol frame.
///
/// Covers the reply types the server emits and the request shape it
/// accepts (arrays of bulk strings). Null is the RESP2 null bulk
/// (`$-1\r\n`); NullArray is the RESP2 null multi-bulk (`*-1\r\n`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Simple status reply, e.g. `+OK\r\n`.
    Simple(String),

    /// Error reply, e.g. `-ERR unknown command\r\n`.
    Error(String),

    /// 64-bit signed integer, e.g. `:42\r\n`.
    Integer(i64),

    /// Bulk (binary-safe) string, e.g. `$5\r\nhello\r\n`.
    Bulk(Bytes),

    /// Ordered array of frames, e.g. `*2\r\n+a\r\n+b\r\n`.
    Array(Vec<Frame>),

    /// Null bulk string, `$-1\r\n`.
    Null,

    /// Null array, `*-1\r\n`.
    NullArray,
}

impl Frame {
    /// The `+OK` status reply.
    pub fn ok() -> Frame {
        Frame::Simple("OK".into())
    }

    /// The `+PONG` status reply.
    pub fn pong() -> Frame {
        Frame::Simple("PONG".into())
    }

    /// The `+QUEUED` status reply sent for commands buffered in MULTI.
    pub fn queued() -> Frame {
        Frame::Simple("QUEUED".into())
    }

    /// An error reply with the given message.
    pub fn err(msg: impl Into<String>) -> Frame {
        Frame::Error(msg.into())
    }

    /// The standard arity error for a command name.
    pub fn arg_num_err(cmd: &str) -> Frame {
        Frame::Error(format!("ERR wrong number of arguments for '{cmd}' command"))
    }

    /// The standard wrong-type error.
    pub fn wrong_type() -> Frame {
        Frame::Error("WRONGTYPE Operation against a key holding the wrong kind of value".into())
    }

    /// The standard not-an-integer error.
    pub fn not_an_integer() -> Frame {
        Frame::Error("ERR value is not an integer or out of range".into())
    }

    /// The standard not-a-float error.
    pub fn not_a_float() -> Frame {
        Frame::Error("ERR value is not a valid float".into())
    }

    /// The standard syntax error.
    pub fn syntax_err() -> Frame {
        Frame::Error("ERR syntax error".into())
    }

    /// An empty multi-bulk reply, `*0\r\n`.
    pub fn empty_array() -> Frame {
        Frame::Array(Vec::new())
    }

    /// Wraps a command line in its wire representation: an array of bulks.
    pub fn from_cmdline(line: &[Bytes]) -> Frame {
        Frame::Array(line.iter().cloned().map(Frame::Bulk).collect())
    }

    /// Extracts a command line from an array-of-bulks frame.
    /// Returns `None` for any other shape (including empty arrays).
    pub fn into_cmdline(self) -> Option<CmdLine> {
        let Frame::Array(items) = self else {
            return None;
        };
        if items.is_empty() {
            return None;
        }
        items
            .into_iter()
            .map(|f| match f {
                Frame::Bulk(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    /// Returns `true` if this frame is an error reply.
    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error(_))
    }

    /// Returns `true` if this frame is the null bulk.
    pub fn is_null(&self) -> bool {
        matches!(self, Frame::Null)
    }
}
