//! Command implementations, grouped by key type.
//!
//! Executors receive the argument tokens (verb excluded) and return a
//! reply frame plus the persistence context the dispatcher uses for AOF
//! emission. Stripe locks are already held when an executor runs.

pub mod hash;
pub mod keys;
pub mod list;
pub mod set;
pub mod string;
pub mod zset;

use bytes::Bytes;
use cinder_protocol::Frame;

/// Decodes an argument token as a (lossy) UTF-8 string.
pub(crate) fn arg_str(raw: &Bytes) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// Parses an integer argument, mapping failure to the standard error.
pub(crate) fn parse_i64(raw: &Bytes) -> Result<i64, Frame> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(Frame::not_an_integer)
}

/// Parses a float argument, mapping failure (and NaN) to the standard
/// error.
pub(crate) fn parse_f64(raw: &Bytes) -> Result<f64, Frame> {
    let value: f64 = std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(Frame::not_a_float)?;
    if value.is_nan() {
        return Err(Frame::not_a_float());
    }
    Ok(value)
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::Arc;

    use bytes::Bytes;
    use cinder_protocol::{CmdLine, Frame};

    use crate::db::Db;

    pub fn db() -> Arc<Db> {
        Arc::new(Db::new(0, false))
    }

    pub fn cmd(parts: &[&str]) -> CmdLine {
        parts
            .iter()
            .map(|p| Bytes::copy_from_slice(p.as_bytes()))
            .collect()
    }

    pub fn run(db: &Arc<Db>, parts: &[&str]) -> Frame {
        db.exec_normal(&cmd(parts))
    }

    /// Serialized reply bytes, for golden-byte assertions.
    pub fn wire(frame: &Frame) -> Vec<u8> {
        frame.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_i64_rejects_garbage() {
        assert_eq!(parse_i64(&Bytes::from_static(b"42")), Ok(42));
        assert_eq!(parse_i64(&Bytes::from_static(b"-7")), Ok(-7));
        assert!(parse_i64(&Bytes::from_static(b"4.2")).is_err());
        assert!(parse_i64(&Bytes::from_static(b"abc")).is_err());
    }

    #[test]
    fn parse_f64_rejects_nan() {
        assert_eq!(parse_f64(&Bytes::from_static(b"1.5")), Ok(1.5));
        assert_eq!(parse_f64(&Bytes::from_static(b"-inf")), Ok(f64::NEG_INFINITY));
        assert!(parse_f64(&Bytes::from_static(b"nan")).is_err());
        assert!(parse_f64(&Bytes::from_static(b"x")).is_err());
    }
}
