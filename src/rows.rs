//! Result column description, batch binding and row decoding.
//!
//! Columns are bound once per batch shape: one owned buffer per column
//! holding `slot × batch` bytes plus a per-row indicator array. The
//! native C type and slot size come from a fixed mapping over the
//! described SQL type. Large-object columns are described as locators and
//! fetched as 4-byte ids; the payload is read later through the cursor.
//!
//! Bindings are torn down and rebuilt whenever the batch shape changes,
//! never resized in place.

use bytes::BytesMut;
use tracing::trace;

use crate::cli::constants::*;
use crate::cli::structs::{ColumnDesc, DateStruct, TimeStruct, TimestampStruct};
use crate::cli::{Cli, StmtHandle};
use crate::error::{Error, Result};
use crate::types::{ColumnDescriptor, Description, LobKind, SqlType, Value};

/// Describe every result column. Large-object types are recorded as their
/// locator counterparts; streamed reads are the retrieval strategy for
/// those columns.
pub(crate) fn describe_columns(cli: &dyn Cli, stmt: StmtHandle) -> Result<Description> {
    let count = match cli.num_result_cols(stmt) {
        r if r.is_success() => r.ok().unwrap_or(0),
        _ => return Err(Error::from_handle(cli, stmt.into())),
    };
    if count == 0 {
        return Ok(Description::default());
    }

    let mut columns = Vec::with_capacity(count as usize);
    for position in 1..=count {
        let mut desc = ColumnDesc::default();
        match cli.describe_col(stmt, position, &mut desc) {
            r if r.is_success() => {}
            _ => return Err(Error::from_handle(cli, stmt.into())),
        }

        if desc.sql_type == SQL_BLOB {
            desc.sql_type = SQL_BLOB_LOCATOR;
        } else if desc.sql_type == SQL_CLOB {
            desc.sql_type = SQL_CLOB_LOCATOR;
        }

        let display_size = match cli.col_attribute(stmt, position, SQL_DESC_DISPLAY_SIZE) {
            r if r.is_success() => r.ok().unwrap_or(0),
            _ => return Err(Error::from_handle(cli, stmt.into())),
        };
        let internal_size = match cli.col_attribute(stmt, position, SQL_DESC_LENGTH) {
            r if r.is_success() => r.ok().unwrap_or(0),
            _ => return Err(Error::from_handle(cli, stmt.into())),
        };

        trace!(
            position,
            name = %desc.name,
            sql_type = desc.sql_type,
            "described column"
        );
        columns.push(ColumnDescriptor::from_describe(
            &desc,
            display_size,
            internal_size,
        ));
    }
    Ok(Description::new(columns))
}

/// How a fetched slot turns back into a host value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeKind {
    Text,
    DecimalText,
    BigIntText,
    Short,
    Long,
    Float,
    Double,
    Date,
    Time,
    Timestamp,
    Locator(LobKind),
    DbChar,
}

/// Native C type, per-row slot size and decode rule for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BindPlan {
    c_type: i16,
    slot_len: usize,
    decode: DecodeKind,
}

fn plan_binding(col: &ColumnDescriptor) -> Result<BindPlan> {
    let col_size = col.precision as usize;
    let scale = col.scale.max(0) as usize;

    let plan = match col.sql_type {
        SqlType::Char
        | SqlType::Varchar
        | SqlType::VarBinary
        | SqlType::LongVarchar
        | SqlType::LongVarBinary
        | SqlType::Binary
        | SqlType::Datalink => BindPlan {
            c_type: SQL_C_CHAR,
            slot_len: col_size + 1,
            decode: DecodeKind::Text,
        },
        SqlType::Decimal | SqlType::Numeric => BindPlan {
            c_type: SQL_C_CHAR,
            slot_len: col_size + scale + DECIMAL_TEXT_SLACK as usize,
            decode: DecodeKind::DecimalText,
        },
        SqlType::SmallInt => BindPlan {
            c_type: SQL_C_SHORT,
            slot_len: 2,
            decode: DecodeKind::Short,
        },
        SqlType::BigInt => BindPlan {
            c_type: SQL_C_CHAR,
            slot_len: BIGINT_TEXT_LEN,
            decode: DecodeKind::BigIntText,
        },
        SqlType::Real => BindPlan {
            c_type: SQL_C_FLOAT,
            slot_len: 4,
            decode: DecodeKind::Float,
        },
        SqlType::Integer => BindPlan {
            c_type: SQL_C_LONG,
            slot_len: 4,
            decode: DecodeKind::Long,
        },
        SqlType::Double | SqlType::Float => BindPlan {
            c_type: SQL_C_DOUBLE,
            slot_len: 8,
            decode: DecodeKind::Double,
        },
        SqlType::Date => BindPlan {
            c_type: SQL_C_TYPE_DATE,
            slot_len: SQL_DATE_STRUCT_LEN,
            decode: DecodeKind::Date,
        },
        SqlType::Time => BindPlan {
            c_type: SQL_C_TYPE_TIME,
            slot_len: SQL_TIME_STRUCT_LEN,
            decode: DecodeKind::Time,
        },
        SqlType::Timestamp => BindPlan {
            c_type: SQL_C_TYPE_TIMESTAMP,
            slot_len: SQL_TIMESTAMP_STRUCT_LEN,
            decode: DecodeKind::Timestamp,
        },
        SqlType::BlobLocator => BindPlan {
            c_type: SQL_C_BLOB_LOCATOR,
            slot_len: 4,
            decode: DecodeKind::Locator(LobKind::Blob),
        },
        SqlType::ClobLocator => BindPlan {
            c_type: SQL_C_CLOB_LOCATOR,
            slot_len: 4,
            decode: DecodeKind::Locator(LobKind::Clob),
        },
        SqlType::DbClobLocator => BindPlan {
            c_type: SQL_C_DBCLOB_LOCATOR,
            slot_len: 4,
            decode: DecodeKind::Locator(LobKind::DbClob),
        },
        SqlType::DbClob | SqlType::Graphic | SqlType::VarGraphic | SqlType::LongVarGraphic => {
            BindPlan {
                c_type: SQL_C_DBCHAR,
                slot_len: 2 * (col_size + 1),
                decode: DecodeKind::DbChar,
            }
        }
        SqlType::Blob | SqlType::Clob => {
            return Err(Error::not_supported(format!(
                "inline {} column binding; fetch through its locator instead",
                col.sql_type
            )))
        }
        _ => BindPlan {
            c_type: SQL_C_CHAR,
            slot_len: col_size + 1,
            decode: DecodeKind::Text,
        },
    };
    Ok(plan)
}

/// One bound result column: the batch buffer and per-row indicators the
/// engine writes during fetch.
pub(crate) struct ColumnBinding {
    plan: BindPlan,
    buf: BytesMut,
    indicators: Vec<SqlLen>,
}

impl ColumnBinding {
    fn allocate(plan: BindPlan, batch: usize) -> Self {
        let mut buf = BytesMut::with_capacity(plan.slot_len * batch);
        buf.resize(plan.slot_len * batch, 0);
        ColumnBinding {
            plan,
            buf,
            indicators: vec![0; batch],
        }
    }

    /// Register the batch buffer with the engine.
    ///
    /// # Safety
    ///
    /// The binding must stay alive and unmoved until the statement's
    /// column bindings are unbound.
    unsafe fn bind(&mut self, cli: &dyn Cli, stmt: StmtHandle, position: u16) -> Result<()> {
        let rc = cli.bind_col(
            stmt,
            position,
            self.plan.c_type,
            self.buf.as_mut_ptr(),
            self.plan.slot_len as SqlLen,
            self.indicators.as_mut_ptr(),
        );
        if rc.is_success() {
            Ok(())
        } else {
            Err(Error::from_handle(cli, stmt.into()))
        }
    }

    fn slot(&self, idx: usize) -> &[u8] {
        &self.buf[idx * self.plan.slot_len..(idx + 1) * self.plan.slot_len]
    }

    /// Decode the value fetched into batch row `idx`.
    pub(crate) fn decode(&self, idx: usize) -> Result<Value> {
        let ind = self.indicators[idx];
        if ind == SQL_NULL_DATA {
            return Ok(Value::Null);
        }
        let slot = self.slot(idx);

        match self.plan.decode {
            DecodeKind::Text => Ok(Value::Str(
                String::from_utf8_lossy(nul_cut(slot)).into_owned(),
            )),
            DecodeKind::DecimalText => {
                let text = String::from_utf8_lossy(nul_cut(slot)).into_owned();
                text.parse::<f64>().map(Value::Float).map_err(|_| {
                    Error::data_conversion(format!("invalid decimal text: {:?}", text))
                })
            }
            DecodeKind::BigIntText => {
                let text = String::from_utf8_lossy(nul_cut(slot)).into_owned();
                text.parse::<i64>().map(Value::Int).map_err(|_| {
                    Error::data_conversion(format!("invalid BIGINT text: {:?}", text))
                })
            }
            DecodeKind::Short => {
                let raw: [u8; 2] = slot[..2]
                    .try_into()
                    .map_err(|_| Error::data_conversion("short SMALLINT slot"))?;
                Ok(Value::Int(i16::from_ne_bytes(raw) as i64))
            }
            DecodeKind::Long => {
                let raw: [u8; 4] = slot[..4]
                    .try_into()
                    .map_err(|_| Error::data_conversion("short INTEGER slot"))?;
                Ok(Value::Int(i32::from_ne_bytes(raw) as i64))
            }
            DecodeKind::Float => {
                let raw: [u8; 4] = slot[..4]
                    .try_into()
                    .map_err(|_| Error::data_conversion("short REAL slot"))?;
                Ok(Value::Float(f32::from_ne_bytes(raw) as f64))
            }
            DecodeKind::Double => {
                let raw: [u8; 8] = slot[..8]
                    .try_into()
                    .map_err(|_| Error::data_conversion("short DOUBLE slot"))?;
                Ok(Value::Float(f64::from_ne_bytes(raw)))
            }
            DecodeKind::Date => Ok(Value::Str(DateStruct::from_bytes(slot)?.to_text())),
            DecodeKind::Time => Ok(Value::Str(TimeStruct::from_bytes(slot)?.to_text())),
            DecodeKind::Timestamp => Ok(Value::Str(TimestampStruct::from_bytes(slot)?.to_text())),
            DecodeKind::Locator(kind) => {
                let raw: [u8; 4] = slot[..4]
                    .try_into()
                    .map_err(|_| Error::data_conversion("short locator slot"))?;
                Ok(Value::Lob {
                    kind,
                    locator: i32::from_ne_bytes(raw),
                })
            }
            DecodeKind::DbChar => {
                // The indicator reports code units; each unit is two bytes.
                let byte_len = (ind.max(0) as usize).saturating_mul(2).min(slot.len());
                let units: Vec<u16> = slot[..byte_len]
                    .chunks_exact(2)
                    .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
                    .take_while(|&unit| unit != 0)
                    .collect();
                Ok(Value::Str(String::from_utf16_lossy(&units)))
            }
        }
    }
}

fn nul_cut(slot: &[u8]) -> &[u8] {
    match slot.iter().position(|&b| b == 0) {
        Some(end) => &slot[..end],
        None => slot,
    }
}

/// Allocate and register one binding per described column for a batch of
/// `batch` rows. The previous binding set must already be unbound and
/// dropped.
pub(crate) fn bind_for_fetch(
    cli: &dyn Cli,
    stmt: StmtHandle,
    description: &Description,
    batch: usize,
) -> Result<Vec<ColumnBinding>> {
    let mut bindings = Vec::with_capacity(description.len());
    for (i, col) in description.columns.iter().enumerate() {
        let plan = plan_binding(col)?;
        let mut binding = ColumnBinding::allocate(plan, batch);
        unsafe {
            binding.bind(cli, stmt, (i + 1) as u16)?;
        }
        bindings.push(binding);
    }
    trace!(columns = bindings.len(), batch, "bound result columns");
    Ok(bindings)
}

/// Decode one fetched batch row across all bound columns.
pub(crate) fn decode_row(bindings: &[ColumnBinding], idx: usize) -> Result<Vec<Value>> {
    bindings.iter().map(|b| b.decode(idx)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn descriptor(sql_type: SqlType, precision: u32, scale: i16) -> ColumnDescriptor {
        ColumnDescriptor {
            name: "C".to_string(),
            sql_type,
            display_size: precision as i64,
            internal_size: precision as i64 + 1,
            precision,
            scale,
            nullable: true,
        }
    }

    fn binding_for(sql_type: SqlType, precision: u32, scale: i16, batch: usize) -> ColumnBinding {
        let plan = plan_binding(&descriptor(sql_type, precision, scale)).unwrap();
        ColumnBinding::allocate(plan, batch)
    }

    #[test]
    fn test_plan_table() {
        let cases = [
            (SqlType::Varchar, 30, 0, SQL_C_CHAR, 31),
            (SqlType::Char, 10, 0, SQL_C_CHAR, 11),
            (SqlType::Decimal, 8, 2, SQL_C_CHAR, 12),
            (SqlType::SmallInt, 5, 0, SQL_C_SHORT, 2),
            (SqlType::Integer, 10, 0, SQL_C_LONG, 4),
            (SqlType::BigInt, 19, 0, SQL_C_CHAR, 21),
            (SqlType::Real, 7, 0, SQL_C_FLOAT, 4),
            (SqlType::Double, 15, 0, SQL_C_DOUBLE, 8),
            (SqlType::Date, 10, 0, SQL_C_TYPE_DATE, 6),
            (SqlType::Time, 8, 0, SQL_C_TYPE_TIME, 6),
            (SqlType::Timestamp, 26, 6, SQL_C_TYPE_TIMESTAMP, 16),
            (SqlType::BlobLocator, 0, 0, SQL_C_BLOB_LOCATOR, 4),
            (SqlType::ClobLocator, 0, 0, SQL_C_CLOB_LOCATOR, 4),
            (SqlType::Graphic, 10, 0, SQL_C_DBCHAR, 22),
            (SqlType::DbClob, 50, 0, SQL_C_DBCHAR, 102),
            (SqlType::Other(-777), 12, 0, SQL_C_CHAR, 13),
        ];
        for (ty, precision, scale, c_type, slot_len) in cases {
            let plan = plan_binding(&descriptor(ty, precision, scale)).unwrap();
            assert_eq!(plan.c_type, c_type, "{:?}", ty);
            assert_eq!(plan.slot_len, slot_len, "{:?}", ty);
        }
    }

    #[test]
    fn test_inline_lob_binding_rejected() {
        assert!(plan_binding(&descriptor(SqlType::Blob, 100, 0)).is_err());
        assert!(plan_binding(&descriptor(SqlType::Clob, 100, 0)).is_err());
    }

    #[test]
    fn test_null_indicator_decodes_to_null() {
        let mut b = binding_for(SqlType::Integer, 10, 0, 1);
        b.indicators[0] = SQL_NULL_DATA;
        assert_eq!(b.decode(0).unwrap(), Value::Null);
    }

    #[test]
    fn test_text_cut_at_terminator() {
        let mut b = binding_for(SqlType::Varchar, 10, 0, 1);
        b.buf[..6].copy_from_slice(b"hi\0xxx");
        b.indicators[0] = 2;
        assert_eq!(b.decode(0).unwrap(), Value::Str("hi".into()));
    }

    #[test]
    fn test_decimal_text_decodes_to_float() {
        let mut b = binding_for(SqlType::Decimal, 8, 2, 1);
        b.buf[..7].copy_from_slice(b"-201.50");
        b.indicators[0] = 7;
        assert_eq!(b.decode(0).unwrap(), Value::Float(-201.5));
    }

    #[test]
    fn test_decimal_garbage_is_data_error() {
        let mut b = binding_for(SqlType::Decimal, 8, 2, 1);
        b.buf[..3].copy_from_slice(b"abc");
        b.indicators[0] = 3;
        assert!(matches!(b.decode(0), Err(Error::Data { .. })));
    }

    #[test]
    fn test_bigint_text_round_trip() {
        let mut b = binding_for(SqlType::BigInt, 19, 0, 1);
        let text = i64::MAX.to_string();
        b.buf[..text.len()].copy_from_slice(text.as_bytes());
        b.indicators[0] = text.len() as SqlLen;
        assert_eq!(b.decode(0).unwrap(), Value::Int(i64::MAX));
    }

    #[test]
    fn test_fixed_width_decodes() {
        let mut b = binding_for(SqlType::SmallInt, 5, 0, 1);
        b.buf[..2].copy_from_slice(&(-12i16).to_ne_bytes());
        b.indicators[0] = 2;
        assert_eq!(b.decode(0).unwrap(), Value::Int(-12));

        let mut b = binding_for(SqlType::Real, 7, 0, 1);
        b.buf[..4].copy_from_slice(&1.5f32.to_ne_bytes());
        b.indicators[0] = 4;
        assert_eq!(b.decode(0).unwrap(), Value::Float(1.5));

        let mut b = binding_for(SqlType::Double, 15, 0, 1);
        b.buf[..8].copy_from_slice(&(-0.25f64).to_ne_bytes());
        b.indicators[0] = 8;
        assert_eq!(b.decode(0).unwrap(), Value::Float(-0.25));
    }

    #[test]
    fn test_datetime_slots_decode_to_literals() {
        let mut b = binding_for(SqlType::Date, 10, 0, 1);
        let date = DateStruct {
            year: 2024,
            month: 3,
            day: 7,
        };
        b.buf[..6].copy_from_slice(&date.to_bytes());
        b.indicators[0] = 6;
        assert_eq!(b.decode(0).unwrap(), Value::Str("2024-03-07".into()));

        let mut b = binding_for(SqlType::Timestamp, 26, 6, 1);
        let ts = TimestampStruct {
            year: 2024,
            month: 3,
            day: 7,
            hour: 8,
            minute: 4,
            second: 59,
            fraction: 123_456_789,
        };
        b.buf[..16].copy_from_slice(&ts.to_bytes());
        b.indicators[0] = 16;
        assert_eq!(
            b.decode(0).unwrap(),
            Value::Str("2024-03-07-08.04.59.123456".into())
        );
    }

    #[test]
    fn test_locator_decodes_to_lob_value() {
        let mut b = binding_for(SqlType::ClobLocator, 0, 0, 1);
        b.buf[..4].copy_from_slice(&88i32.to_ne_bytes());
        b.indicators[0] = 4;
        assert_eq!(
            b.decode(0).unwrap(),
            Value::Lob {
                kind: LobKind::Clob,
                locator: 88
            }
        );
    }

    #[test]
    fn test_dbchar_decodes_utf16_units() {
        let mut b = binding_for(SqlType::Graphic, 4, 0, 1);
        let units: Vec<u8> = ['д', 'б', '2']
            .iter()
            .flat_map(|c| (*c as u16).to_ne_bytes())
            .collect();
        b.buf[..units.len()].copy_from_slice(&units);
        b.indicators[0] = 3;
        assert_eq!(b.decode(0).unwrap(), Value::Str("дб2".into()));
    }

    #[test]
    fn test_batch_slots_are_independent() {
        let mut b = binding_for(SqlType::Varchar, 3, 0, 3);
        assert_eq!(b.buf.len(), 12);
        b.buf[0..3].copy_from_slice(b"aa\0");
        b.buf[4..7].copy_from_slice(b"bb\0");
        b.buf[8..11].copy_from_slice(b"cc\0");
        b.indicators[0] = 2;
        b.indicators[1] = 2;
        b.indicators[2] = SQL_NULL_DATA;
        assert_eq!(b.decode(0).unwrap(), Value::Str("aa".into()));
        assert_eq!(b.decode(1).unwrap(), Value::Str("bb".into()));
        assert_eq!(b.decode(2).unwrap(), Value::Null);
    }
}
