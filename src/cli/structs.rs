//! Native CLI data layouts.
//!
//! Date/time values cross the boundary as fixed C structs, bound by value
//! size (native byte order, no padding):
//! - DATE (6 bytes): year `i16`, month `u16`, day `u16`
//! - TIME (6 bytes): hour `u16`, minute `u16`, second `u16`
//! - TIMESTAMP (16 bytes): the date and time fields followed by a `u32`
//!   fraction in nanoseconds
//!
//! Describe-style calls fill the plain metadata records defined here.

use crate::cli::constants::*;
use crate::error::{Error, Result};

/// Bound DATE buffer contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateStruct {
    pub year: i16,
    pub month: u16,
    pub day: u16,
}

impl DateStruct {
    pub fn to_bytes(self) -> [u8; SQL_DATE_STRUCT_LEN] {
        let mut out = [0u8; SQL_DATE_STRUCT_LEN];
        out[0..2].copy_from_slice(&self.year.to_ne_bytes());
        out[2..4].copy_from_slice(&self.month.to_ne_bytes());
        out[4..6].copy_from_slice(&self.day.to_ne_bytes());
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < SQL_DATE_STRUCT_LEN {
            return Err(Error::data_conversion(format!(
                "DATE buffer must be {} bytes, got {}",
                SQL_DATE_STRUCT_LEN,
                data.len()
            )));
        }
        Ok(Self {
            year: i16::from_ne_bytes([data[0], data[1]]),
            month: u16::from_ne_bytes([data[2], data[3]]),
            day: u16::from_ne_bytes([data[4], data[5]]),
        })
    }

    /// Text form `YYYY-MM-DD`.
    pub fn to_text(self) -> String {
        format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Bound TIME buffer contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeStruct {
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
}

impl TimeStruct {
    pub fn to_bytes(self) -> [u8; SQL_TIME_STRUCT_LEN] {
        let mut out = [0u8; SQL_TIME_STRUCT_LEN];
        out[0..2].copy_from_slice(&self.hour.to_ne_bytes());
        out[2..4].copy_from_slice(&self.minute.to_ne_bytes());
        out[4..6].copy_from_slice(&self.second.to_ne_bytes());
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < SQL_TIME_STRUCT_LEN {
            return Err(Error::data_conversion(format!(
                "TIME buffer must be {} bytes, got {}",
                SQL_TIME_STRUCT_LEN,
                data.len()
            )));
        }
        Ok(Self {
            hour: u16::from_ne_bytes([data[0], data[1]]),
            minute: u16::from_ne_bytes([data[2], data[3]]),
            second: u16::from_ne_bytes([data[4], data[5]]),
        })
    }

    /// Text form `HH:MM:SS`.
    pub fn to_text(self) -> String {
        format!("{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

/// Bound TIMESTAMP buffer contents. The fraction field is nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampStruct {
    pub year: i16,
    pub month: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    pub fraction: u32,
}

impl TimestampStruct {
    pub fn to_bytes(self) -> [u8; SQL_TIMESTAMP_STRUCT_LEN] {
        let mut out = [0u8; SQL_TIMESTAMP_STRUCT_LEN];
        out[0..2].copy_from_slice(&self.year.to_ne_bytes());
        out[2..4].copy_from_slice(&self.month.to_ne_bytes());
        out[4..6].copy_from_slice(&self.day.to_ne_bytes());
        out[6..8].copy_from_slice(&self.hour.to_ne_bytes());
        out[8..10].copy_from_slice(&self.minute.to_ne_bytes());
        out[10..12].copy_from_slice(&self.second.to_ne_bytes());
        out[12..16].copy_from_slice(&self.fraction.to_ne_bytes());
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < SQL_TIMESTAMP_STRUCT_LEN {
            return Err(Error::data_conversion(format!(
                "TIMESTAMP buffer must be {} bytes, got {}",
                SQL_TIMESTAMP_STRUCT_LEN,
                data.len()
            )));
        }
        Ok(Self {
            year: i16::from_ne_bytes([data[0], data[1]]),
            month: u16::from_ne_bytes([data[2], data[3]]),
            day: u16::from_ne_bytes([data[4], data[5]]),
            hour: u16::from_ne_bytes([data[6], data[7]]),
            minute: u16::from_ne_bytes([data[8], data[9]]),
            second: u16::from_ne_bytes([data[10], data[11]]),
            fraction: u32::from_ne_bytes([data[12], data[13], data[14], data[15]]),
        })
    }

    /// Text form `YYYY-MM-DD-HH.MM.SS.ffffff`.
    ///
    /// The native fraction is nine decimal digits of nanoseconds; the text
    /// keeps exactly the first six (truncation, not rounding).
    pub fn to_text(self) -> String {
        let nanos = format!("{:09}", self.fraction);
        format!(
            "{:04}-{:02}-{:02}-{:02}.{:02}.{:02}.{}",
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            &nanos[..6]
        )
    }
}

/// Result of describing one result-set column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnDesc {
    pub name: String,
    pub sql_type: i16,
    pub column_size: u32,
    pub decimal_digits: i16,
    pub nullable: i16,
}

impl ColumnDesc {
    pub fn is_nullable(&self) -> bool {
        self.nullable == SQL_NULLABLE
    }
}

/// Result of describing one statement parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamDesc {
    pub sql_type: i16,
    pub column_size: u32,
    pub decimal_digits: i16,
    pub nullable: i16,
}

/// One row of the procedure-columns catalog result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcColumnDesc {
    pub name: String,
    /// Raw direction code (`SQL_PARAM_INPUT` etc.).
    pub direction: i16,
    pub sql_type: i16,
    pub column_size: u32,
    pub decimal_digits: i16,
    pub nullable: i16,
    pub ordinal: i32,
}
