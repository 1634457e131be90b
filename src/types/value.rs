//! Host values exchanged with the engine.

use super::LobKind;
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use std::fmt;
use std::io::Read;

/// A single host-side value: one parameter in, or one column out.
///
/// Date, time and timestamp values travel as their SQL literal text forms;
/// the `From` impls for the `chrono` naive types produce them.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Integral value (SMALLINT, INTEGER, BIGINT).
    Int(i64),
    /// Floating value (REAL, FLOAT, DOUBLE, and decimals read as text).
    Float(f64),
    /// Character value, including date/time literal text.
    Str(String),
    /// Binary value.
    Bytes(Vec<u8>),
    /// Large object fetched as a locator; the payload stays in the engine
    /// until read through the cursor.
    Lob { kind: LobKind, locator: i32 },
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_lob(&self) -> Option<(LobKind, i32)> {
        match self {
            Value::Lob { kind, locator } => Some((*kind, *locator)),
            _ => None,
        }
    }

    /// Local calendar date for a seconds-since-epoch tick count, as a date
    /// literal. `None` when the tick count has no local representation.
    pub fn date_from_ticks(ticks: i64) -> Option<Value> {
        let at = Local.timestamp_opt(ticks, 0).single()?;
        Some(Value::from(at.date_naive()))
    }

    /// Local wall-clock time for a tick count, as a time literal.
    pub fn time_from_ticks(ticks: i64) -> Option<Value> {
        let at = Local.timestamp_opt(ticks, 0).single()?;
        Some(Value::from(at.time()))
    }

    /// Local timestamp for a tick count, as a timestamp literal.
    pub fn timestamp_from_ticks(ticks: i64) -> Option<Value> {
        let at = Local.timestamp_opt(ticks, 0).single()?;
        Some(Value::from(at.naive_local()))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Lob { kind, locator } => write!(f, "<{:?} locator {}>", kind, locator),
        }
    }
}

impl From<i16> for Value {
    fn from(n: i16) -> Self {
        Value::Int(n as i64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::Float(x as f64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Str(d.format("%Y-%m-%d").to_string())
    }
}

impl From<NaiveTime> for Value {
    fn from(t: NaiveTime) -> Self {
        Value::Str(t.format("%H:%M:%S").to_string())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(ts: NaiveDateTime) -> Self {
        Value::Str(ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string())
    }
}

/// One statement parameter: a plain value, or a reader streamed to the
/// engine through the need-data protocol.
pub enum Param {
    Value(Value),
    Stream(Box<dyn Read>),
}

impl Param {
    /// Stream `reader` at execution time instead of materializing it.
    pub fn stream(reader: impl Read + 'static) -> Self {
        Param::Stream(Box::new(reader))
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Param::Stream(_))
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Param::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Value> for Param {
    fn from(v: Value) -> Self {
        Param::Value(v)
    }
}

impl From<i16> for Param {
    fn from(n: i16) -> Self {
        Param::Value(Value::from(n))
    }
}

impl From<i32> for Param {
    fn from(n: i32) -> Self {
        Param::Value(Value::from(n))
    }
}

impl From<i64> for Param {
    fn from(n: i64) -> Self {
        Param::Value(Value::from(n))
    }
}

impl From<f64> for Param {
    fn from(x: f64) -> Self {
        Param::Value(Value::from(x))
    }
}

impl From<&str> for Param {
    fn from(s: &str) -> Self {
        Param::Value(Value::from(s))
    }
}

impl From<String> for Param {
    fn from(s: String) -> Self {
        Param::Value(Value::from(s))
    }
}

impl From<Vec<u8>> for Param {
    fn from(b: Vec<u8>) -> Self {
        Param::Value(Value::from(b))
    }
}
