//! Parameter description, encoding and binding.
//!
//! One [`ParamBinding`] per marker position owns the native buffer and the
//! indicator cell for that parameter. Encoding follows the described SQL
//! type: text-shaped types travel as narrow character data, small integers
//! as fixed-width native values, big integers and decimals as decimal text,
//! large objects either materialized up front or deferred to the need-data
//! protocol. Kind mismatches are raised before the position is bound.
//!
//! Buffers and indicator cells live on the heap, so moving a binding (or
//! growing the binding list) never moves the memory the engine was given.

use std::io::Read;

use tracing::trace;

use crate::cli::constants::*;
use crate::cli::structs::ParamDesc;
use crate::cli::{Cli, ParamDirection, SqlResult, StmtHandle};
use crate::error::{Error, Result};
use crate::types::{Param, SqlType, Value};

/// Query native metadata for every marker position. A describe failure
/// aborts the whole call.
pub(crate) fn describe_parameters(
    cli: &dyn Cli,
    stmt: StmtHandle,
    count: u16,
) -> Result<Vec<ParamDesc>> {
    let mut descs = Vec::with_capacity(count as usize);
    for position in 1..=count {
        match cli.describe_param(stmt, position) {
            r if r.is_success() => {
                if let Some(desc) = r.ok() {
                    trace!(
                        position,
                        sql_type = desc.sql_type,
                        column_size = desc.column_size,
                        "described parameter"
                    );
                    descs.push(desc);
                }
            }
            _ => return Err(Error::from_handle(cli, stmt.into())),
        }
    }
    Ok(descs)
}

/// One encoded parameter, ready to bind.
pub(crate) struct ParamBinding {
    position: u16,
    direction: ParamDirection,
    sql_type: SqlType,
    type_code: i16,
    c_type: i16,
    column_size: u32,
    decimal_digits: i16,
    buf: Vec<u8>,
    /// Buffer length as reported to the engine; for materialized large
    /// objects this is the payload length, not the allocation size.
    bind_len: SqlLen,
    indicator: Box<SqlLen>,
    stream: Option<Box<dyn Read>>,
    /// Clone of the supplied value, echoed back for input-only positions
    /// of a procedure call. Streams cannot be echoed.
    original: Option<Value>,
}

fn type_error(position: u16, sql_type: SqlType, expected: &'static str) -> Error {
    Error::ParamType {
        position: position as usize,
        sql_type: sql_type.name(),
        expected,
    }
}

impl ParamBinding {
    /// Encode `value` for the described SQL type at a 1-based position.
    pub(crate) fn encode(
        position: u16,
        desc: &ParamDesc,
        direction: ParamDirection,
        value: Param,
    ) -> Result<Self> {
        let sql_type = SqlType::from_code(desc.sql_type);
        let col_size = desc.column_size as usize;
        let scale = desc.decimal_digits.max(0) as usize;

        let mut binding = ParamBinding {
            position,
            direction,
            sql_type,
            type_code: desc.sql_type,
            c_type: SQL_C_CHAR,
            column_size: desc.column_size,
            decimal_digits: desc.decimal_digits,
            buf: Vec::new(),
            bind_len: 0,
            indicator: Box::new(0),
            stream: None,
            original: match &value {
                Param::Value(v) => Some(v.clone()),
                Param::Stream(_) => None,
            },
        };

        match sql_type {
            SqlType::Char
            | SqlType::Varchar
            | SqlType::LongVarchar
            | SqlType::Binary
            | SqlType::VarBinary
            | SqlType::LongVarBinary
            | SqlType::Datalink
            | SqlType::Date
            | SqlType::Time
            | SqlType::Timestamp => match value {
                Param::Value(Value::Str(s)) => binding.set_text(s.as_bytes(), col_size),
                Param::Value(Value::Bytes(b)) => binding.set_text(&b, col_size),
                Param::Value(Value::Null) => binding.set_null(col_size + 1),
                _ => return Err(type_error(position, sql_type, "str")),
            },

            SqlType::Clob | SqlType::Blob | SqlType::DbClob => match value {
                Param::Stream(reader) => {
                    binding.c_type = SQL_C_BINARY;
                    // The registered buffer holds the token the engine
                    // hands back through the need-data protocol.
                    binding.buf = (position as usize).to_ne_bytes().to_vec();
                    binding.bind_len = binding.buf.len() as SqlLen;
                    *binding.indicator = SQL_DATA_AT_EXEC;
                    binding.stream = Some(reader);
                }
                Param::Value(Value::Str(s)) => binding.set_lob_payload(s.into_bytes()),
                Param::Value(Value::Bytes(b)) => binding.set_lob_payload(b),
                Param::Value(Value::Null) => {
                    binding.c_type = SQL_C_BINARY;
                    binding.set_null(col_size + 1);
                }
                _ => return Err(type_error(position, sql_type, "stream | str")),
            },

            SqlType::SmallInt => match value {
                Param::Value(Value::Int(n)) => {
                    binding.c_type = SQL_C_SHORT;
                    binding.set_fixed(&(n as i16).to_ne_bytes());
                }
                Param::Value(Value::Null) => {
                    binding.c_type = SQL_C_SHORT;
                    binding.buf = vec![0; 2];
                    binding.bind_len = 2;
                    *binding.indicator = SQL_NULL_DATA;
                }
                _ => return Err(type_error(position, sql_type, "int")),
            },

            SqlType::Integer => match value {
                Param::Value(Value::Int(n)) => {
                    binding.c_type = SQL_C_LONG;
                    binding.set_fixed(&(n as i32).to_ne_bytes());
                }
                Param::Value(Value::Null) => {
                    binding.c_type = SQL_C_LONG;
                    binding.buf = vec![0; 4];
                    binding.bind_len = 4;
                    *binding.indicator = SQL_NULL_DATA;
                }
                _ => return Err(type_error(position, sql_type, "int")),
            },

            SqlType::BigInt => match value {
                Param::Value(Value::Int(n)) => {
                    let text = n.to_string();
                    binding.set_lob_payload(text.into_bytes());
                }
                Param::Value(Value::Null) => binding.set_null(col_size + scale + 1),
                _ => return Err(type_error(position, sql_type, "int")),
            },

            SqlType::Real | SqlType::Float | SqlType::Double => match value {
                Param::Value(Value::Float(x)) => {
                    binding.c_type = SQL_C_DOUBLE;
                    binding.set_fixed(&x.to_ne_bytes());
                }
                Param::Value(Value::Int(n)) => {
                    binding.c_type = SQL_C_DOUBLE;
                    binding.set_fixed(&(n as f64).to_ne_bytes());
                }
                Param::Value(Value::Null) => {
                    binding.c_type = SQL_C_DOUBLE;
                    binding.buf = vec![0; 8];
                    binding.bind_len = 8;
                    *binding.indicator = SQL_NULL_DATA;
                }
                _ => return Err(type_error(position, sql_type, "float")),
            },

            // Decimal, numeric, graphic and every unrecognized type travel
            // as the value's text rendering.
            _ => {
                let planned = col_size + scale + DECIMAL_TEXT_SLACK as usize;
                match value {
                    Param::Value(Value::Null) => binding.set_null(planned),
                    Param::Value(Value::Str(s)) => binding.set_text(s.as_bytes(), planned.saturating_sub(1)),
                    Param::Value(Value::Int(n)) => {
                        binding.set_text(n.to_string().as_bytes(), planned.saturating_sub(1))
                    }
                    Param::Value(Value::Float(x)) => {
                        binding.set_text(x.to_string().as_bytes(), planned.saturating_sub(1))
                    }
                    Param::Value(Value::Bytes(b)) => binding.set_text(&b, planned.saturating_sub(1)),
                    _ => return Err(type_error(position, sql_type, "str | int | float")),
                }
            }
        }

        Ok(binding)
    }

    /// NUL-terminated text sized to whichever is larger, the declared
    /// column width or the payload.
    fn set_text(&mut self, data: &[u8], col_size: usize) {
        let len = (col_size + 1).max(data.len() + 1);
        let mut buf = vec![0u8; len];
        buf[..data.len()].copy_from_slice(data);
        self.buf = buf;
        self.bind_len = len as SqlLen;
        *self.indicator = data.len() as SqlLen;
    }

    /// Materialized large-object payload: length reported exactly, with a
    /// trailing NUL in the allocation only.
    fn set_lob_payload(&mut self, data: Vec<u8>) {
        let len = data.len();
        let mut buf = data;
        buf.push(0);
        self.buf = buf;
        self.bind_len = len as SqlLen;
        *self.indicator = len as SqlLen;
    }

    fn set_fixed(&mut self, data: &[u8]) {
        self.buf = data.to_vec();
        self.bind_len = data.len() as SqlLen;
        *self.indicator = data.len() as SqlLen;
    }

    fn set_null(&mut self, alloc: usize) {
        self.buf = vec![0u8; alloc.max(1)];
        self.bind_len = self.buf.len() as SqlLen;
        *self.indicator = SQL_NULL_DATA;
    }

    /// Register the buffer and indicator with the engine.
    ///
    /// # Safety
    ///
    /// The binding must stay alive and unmodified until the statement's
    /// parameter bindings are reset.
    pub(crate) unsafe fn bind(&mut self, cli: &dyn Cli, stmt: StmtHandle) -> Result<()> {
        let rc = cli.bind_parameter(
            stmt,
            self.position,
            self.direction,
            self.c_type,
            self.type_code,
            self.column_size,
            self.decimal_digits,
            self.buf.as_mut_ptr(),
            self.bind_len,
            self.indicator.as_mut() as *mut SqlLen,
        );
        match rc {
            SqlResult::Success(()) => Ok(()),
            _ => Err(Error::from_handle(cli, stmt.into())),
        }
    }

    pub(crate) fn position(&self) -> u16 {
        self.position
    }

    pub(crate) fn indicator(&self) -> SqlLen {
        *self.indicator
    }

    /// Detach the streaming source for the need-data loop.
    pub(crate) fn take_stream(&mut self) -> Option<Box<dyn Read>> {
        self.stream.take()
    }

    /// Decode the native buffer back into a host value after execution.
    fn decode_output(&self) -> Result<Value> {
        let ind = *self.indicator;
        if ind == SQL_NULL_DATA {
            return Ok(Value::Null);
        }
        // A consumed stream leaves nothing to decode.
        if ind == SQL_DATA_AT_EXEC {
            return Ok(Value::Null);
        }
        let len = (ind.max(0) as usize).min(self.buf.len());
        let raw = &self.buf[..len];

        match self.sql_type {
            SqlType::Blob => Ok(Value::Bytes(raw.to_vec())),
            SqlType::Clob | SqlType::DbClob => {
                Ok(Value::Str(String::from_utf8_lossy(raw).into_owned()))
            }
            SqlType::BigInt => {
                let text = String::from_utf8_lossy(raw);
                let text = text.trim_end_matches('\0');
                text.parse::<i64>().map(Value::Int).map_err(|_| {
                    Error::data_conversion(format!("invalid BIGINT output: {:?}", text))
                })
            }
            SqlType::SmallInt => {
                let bytes: [u8; 2] = self
                    .buf
                    .get(..2)
                    .and_then(|s| s.try_into().ok())
                    .ok_or_else(|| Error::data_conversion("short SMALLINT output buffer"))?;
                Ok(Value::Int(i16::from_ne_bytes(bytes) as i64))
            }
            SqlType::Integer => {
                let bytes: [u8; 4] = self
                    .buf
                    .get(..4)
                    .and_then(|s| s.try_into().ok())
                    .ok_or_else(|| Error::data_conversion("short INTEGER output buffer"))?;
                Ok(Value::Int(i32::from_ne_bytes(bytes) as i64))
            }
            SqlType::Decimal | SqlType::Numeric => {
                let text = String::from_utf8_lossy(raw);
                let text = text.trim_end_matches('\0');
                text.parse::<f64>().map(Value::Float).map_err(|_| {
                    Error::data_conversion(format!("invalid DECIMAL output: {:?}", text))
                })
            }
            SqlType::Real | SqlType::Float | SqlType::Double => {
                let bytes: [u8; 8] = self
                    .buf
                    .get(..8)
                    .and_then(|s| s.try_into().ok())
                    .ok_or_else(|| Error::data_conversion("short DOUBLE output buffer"))?;
                Ok(Value::Float(f64::from_ne_bytes(bytes)))
            }
            _ => Ok(Value::Str(String::from_utf8_lossy(raw).into_owned())),
        }
    }
}

impl std::fmt::Debug for ParamBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamBinding")
            .field("position", &self.position)
            .field("direction", &self.direction)
            .field("sql_type", &self.sql_type)
            .field("type_code", &self.type_code)
            .field("c_type", &self.c_type)
            .field("column_size", &self.column_size)
            .field("decimal_digits", &self.decimal_digits)
            .field("buf", &self.buf)
            .field("bind_len", &self.bind_len)
            .field("indicator", &self.indicator)
            .field("streamed", &self.stream.is_some())
            .field("original", &self.original)
            .finish()
    }
}

/// Build a procedure call's positional result tuple: input-only positions
/// echo the supplied value, every other direction decodes the buffer the
/// engine wrote back.
pub(crate) fn collect_outputs(bindings: &[ParamBinding]) -> Result<Vec<Value>> {
    bindings
        .iter()
        .map(|b| {
            if b.direction.is_input() {
                Ok(b.original.clone().unwrap_or(Value::Null))
            } else {
                b.decode_output()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn desc(sql_type: i16, column_size: u32, decimal_digits: i16) -> ParamDesc {
        ParamDesc {
            sql_type,
            column_size,
            decimal_digits,
            nullable: SQL_NULLABLE,
        }
    }

    fn encode(d: &ParamDesc, value: Param) -> ParamBinding {
        ParamBinding::encode(1, d, ParamDirection::Input, value).unwrap()
    }

    #[test]
    fn test_varchar_text_sized_to_column() {
        let b = encode(&desc(SQL_VARCHAR, 10, 0), Param::from("abc"));
        assert_eq!(b.c_type, SQL_C_CHAR);
        assert_eq!(b.buf.len(), 11);
        assert_eq!(&b.buf[..4], b"abc\0");
        assert_eq!(b.bind_len, 11);
        assert_eq!(b.indicator(), 3);
    }

    #[test]
    fn test_varchar_text_grows_past_column_size() {
        let b = encode(&desc(SQL_VARCHAR, 4, 0), Param::from("0123456789"));
        assert_eq!(b.buf.len(), 11);
        assert_eq!(b.indicator(), 10);
    }

    #[test]
    fn test_null_never_raises_type_error() {
        for ty in [SQL_VARCHAR, SQL_SMALLINT, SQL_INTEGER, SQL_BIGINT, SQL_DOUBLE, SQL_DECIMAL, SQL_CLOB] {
            let b = encode(&desc(ty, 8, 2), Param::from(Value::Null));
            assert_eq!(b.indicator(), SQL_NULL_DATA, "type code {}", ty);
        }
    }

    #[test]
    fn test_wrong_kind_is_typed_error() {
        let err = ParamBinding::encode(
            2,
            &desc(SQL_VARCHAR, 10, 0),
            ParamDirection::Input,
            Param::from(5i32),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Param #2 <VARCHAR> SHOULD be of type <str>");

        let err = ParamBinding::encode(
            1,
            &desc(SQL_INTEGER, 10, 0),
            ParamDirection::Input,
            Param::from("five"),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Param #1 <INTEGER> SHOULD be of type <int>");
    }

    #[test]
    fn test_smallint_uses_native_short() {
        let b = encode(&desc(SQL_SMALLINT, 5, 0), Param::from(-7i32));
        assert_eq!(b.c_type, SQL_C_SHORT);
        assert_eq!(b.buf.len(), 2);
        assert_eq!(i16::from_ne_bytes([b.buf[0], b.buf[1]]), -7);
        assert_eq!(b.indicator(), 2);
    }

    #[test]
    fn test_integer_truncates_like_a_cast() {
        let b = encode(&desc(SQL_INTEGER, 10, 0), Param::from(i64::MAX));
        let raw: [u8; 4] = b.buf[..4].try_into().unwrap();
        assert_eq!(i32::from_ne_bytes(raw), i64::MAX as i32);
    }

    #[test]
    fn test_bigint_travels_as_text() {
        let b = encode(&desc(SQL_BIGINT, 19, 0), Param::from(i64::MAX));
        assert_eq!(b.c_type, SQL_C_CHAR);
        assert_eq!(&b.buf[..19], b"9223372036854775807");
        assert_eq!(b.bind_len, 19);
        assert_eq!(b.indicator(), 19);
    }

    #[test]
    fn test_double_accepts_int_input() {
        let b = encode(&desc(SQL_DOUBLE, 8, 0), Param::from(3i64));
        assert_eq!(b.c_type, SQL_C_DOUBLE);
        let raw: [u8; 8] = b.buf[..8].try_into().unwrap();
        assert_eq!(f64::from_ne_bytes(raw), 3.0);
    }

    #[test]
    fn test_decimal_text_with_slack() {
        let b = encode(&desc(SQL_DECIMAL, 8, 2), Param::from(1234.56f64));
        assert_eq!(b.c_type, SQL_C_CHAR);
        // column size + scale + slack
        assert_eq!(b.buf.len(), 12);
        assert_eq!(&b.buf[..7], b"1234.56");
        assert_eq!(b.indicator(), 7);
    }

    #[test]
    fn test_decimal_overflowing_text_grows() {
        let b = encode(&desc(SQL_DECIMAL, 2, 0), Param::from("123456.789"));
        assert!(b.buf.len() >= 11);
        assert_eq!(b.indicator(), 10);
    }

    #[test]
    fn test_lob_stream_defers_to_need_data() {
        let d = desc(SQL_BLOB, 100, 0);
        let mut b = ParamBinding::encode(
            3,
            &d,
            ParamDirection::Input,
            Param::stream(std::io::Cursor::new(vec![1u8, 2, 3])),
        )
        .unwrap();
        assert_eq!(b.c_type, SQL_C_BINARY);
        assert_eq!(b.indicator(), SQL_DATA_AT_EXEC);
        let token = usize::from_ne_bytes(b.buf[..].try_into().unwrap());
        assert_eq!(token, 3);
        assert!(b.take_stream().is_some());
        assert!(b.take_stream().is_none());
    }

    #[test]
    fn test_lob_text_materialized() {
        let b = encode(&desc(SQL_CLOB, 100, 0), Param::from("inline"));
        assert_eq!(b.c_type, SQL_C_CHAR);
        assert_eq!(b.bind_len, 6);
        assert_eq!(b.indicator(), 6);
        assert_eq!(&b.buf[..7], b"inline\0");
    }

    #[test]
    fn test_collect_outputs_echoes_input_positions() {
        let b_in = encode(&desc(SQL_VARCHAR, 10, 0), Param::from("kept"));
        let mut b_out = ParamBinding::encode(
            2,
            &desc(SQL_INTEGER, 10, 0),
            ParamDirection::Output,
            Param::from(0i32),
        )
        .unwrap();
        // Engine wrote 41 into the output buffer.
        b_out.buf = 41i32.to_ne_bytes().to_vec();
        *b_out.indicator = 4;

        let out = collect_outputs(&[b_in, b_out]).unwrap();
        assert_eq!(out, vec![Value::Str("kept".into()), Value::Int(41)]);
    }

    #[test]
    fn test_collect_outputs_null_and_decimal() {
        let mut b_null = ParamBinding::encode(
            1,
            &desc(SQL_VARCHAR, 10, 0),
            ParamDirection::InputOutput,
            Param::from("x"),
        )
        .unwrap();
        *b_null.indicator = SQL_NULL_DATA;

        let mut b_dec = ParamBinding::encode(
            2,
            &desc(SQL_DECIMAL, 8, 2),
            ParamDirection::Output,
            Param::from(Value::Null),
        )
        .unwrap();
        let text = b"12.50";
        b_dec.buf[..text.len()].copy_from_slice(text);
        *b_dec.indicator = text.len() as SqlLen;

        let out = collect_outputs(&[b_null, b_dec]).unwrap();
        assert_eq!(out, vec![Value::Null, Value::Float(12.5)]);
    }

    #[test]
    fn test_collect_outputs_double_reads_native_buffer() {
        let mut b = ParamBinding::encode(
            1,
            &desc(SQL_DOUBLE, 8, 0),
            ParamDirection::Output,
            Param::from(Value::Null),
        )
        .unwrap();
        b.buf = 2.75f64.to_ne_bytes().to_vec();
        *b.indicator = 8;
        let out = collect_outputs(&[b]).unwrap();
        assert_eq!(out, vec![Value::Float(2.75)]);
    }

    #[test]
    fn test_consumed_stream_output_is_null() {
        let b = ParamBinding::encode(
            1,
            &desc(SQL_BLOB, 10, 0),
            ParamDirection::InputOutput,
            Param::stream(std::io::Cursor::new(Vec::new())),
        )
        .unwrap();
        let out = collect_outputs(&[b]).unwrap();
        assert_eq!(out, vec![Value::Null]);
    }
}
