//! Engine SQL data types.
//!
//! Bidirectional mapping between the numeric type codes reported by the
//! engine and symbolic names. Unrecognized codes round-trip through
//! [`SqlType::Other`] so a describe never fails on a type the driver has
//! no special handling for; unsupported types are rejected later, at bind
//! time.

use crate::cli::constants::*;
use std::fmt;

/// SQL data type of a column or parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Char,
    Varchar,
    LongVarchar,
    Numeric,
    Decimal,
    Integer,
    SmallInt,
    Float,
    Real,
    Double,
    Date,
    Time,
    Timestamp,
    Binary,
    VarBinary,
    LongVarBinary,
    BigInt,
    Graphic,
    VarGraphic,
    LongVarGraphic,
    Blob,
    Clob,
    DbClob,
    Datalink,
    BlobLocator,
    ClobLocator,
    DbClobLocator,
    /// Type code without a symbolic mapping, kept raw.
    Other(i16),
}

impl SqlType {
    /// Map an engine type code.
    pub fn from_code(code: i16) -> Self {
        match code {
            SQL_CHAR => SqlType::Char,
            SQL_VARCHAR => SqlType::Varchar,
            SQL_LONGVARCHAR => SqlType::LongVarchar,
            SQL_NUMERIC => SqlType::Numeric,
            SQL_DECIMAL => SqlType::Decimal,
            SQL_INTEGER => SqlType::Integer,
            SQL_SMALLINT => SqlType::SmallInt,
            SQL_FLOAT => SqlType::Float,
            SQL_REAL => SqlType::Real,
            SQL_DOUBLE => SqlType::Double,
            SQL_TYPE_DATE => SqlType::Date,
            SQL_TYPE_TIME => SqlType::Time,
            SQL_TYPE_TIMESTAMP => SqlType::Timestamp,
            SQL_BINARY => SqlType::Binary,
            SQL_VARBINARY => SqlType::VarBinary,
            SQL_LONGVARBINARY => SqlType::LongVarBinary,
            SQL_BIGINT => SqlType::BigInt,
            SQL_GRAPHIC => SqlType::Graphic,
            SQL_VARGRAPHIC => SqlType::VarGraphic,
            SQL_LONGVARGRAPHIC => SqlType::LongVarGraphic,
            SQL_BLOB => SqlType::Blob,
            SQL_CLOB => SqlType::Clob,
            SQL_DBCLOB => SqlType::DbClob,
            SQL_DATALINK => SqlType::Datalink,
            SQL_BLOB_LOCATOR => SqlType::BlobLocator,
            SQL_CLOB_LOCATOR => SqlType::ClobLocator,
            SQL_DBCLOB_LOCATOR => SqlType::DbClobLocator,
            other => SqlType::Other(other),
        }
    }

    /// The engine type code.
    pub fn code(self) -> i16 {
        match self {
            SqlType::Char => SQL_CHAR,
            SqlType::Varchar => SQL_VARCHAR,
            SqlType::LongVarchar => SQL_LONGVARCHAR,
            SqlType::Numeric => SQL_NUMERIC,
            SqlType::Decimal => SQL_DECIMAL,
            SqlType::Integer => SQL_INTEGER,
            SqlType::SmallInt => SQL_SMALLINT,
            SqlType::Float => SQL_FLOAT,
            SqlType::Real => SQL_REAL,
            SqlType::Double => SQL_DOUBLE,
            SqlType::Date => SQL_TYPE_DATE,
            SqlType::Time => SQL_TYPE_TIME,
            SqlType::Timestamp => SQL_TYPE_TIMESTAMP,
            SqlType::Binary => SQL_BINARY,
            SqlType::VarBinary => SQL_VARBINARY,
            SqlType::LongVarBinary => SQL_LONGVARBINARY,
            SqlType::BigInt => SQL_BIGINT,
            SqlType::Graphic => SQL_GRAPHIC,
            SqlType::VarGraphic => SQL_VARGRAPHIC,
            SqlType::LongVarGraphic => SQL_LONGVARGRAPHIC,
            SqlType::Blob => SQL_BLOB,
            SqlType::Clob => SQL_CLOB,
            SqlType::DbClob => SQL_DBCLOB,
            SqlType::Datalink => SQL_DATALINK,
            SqlType::BlobLocator => SQL_BLOB_LOCATOR,
            SqlType::ClobLocator => SQL_CLOB_LOCATOR,
            SqlType::DbClobLocator => SQL_DBCLOB_LOCATOR,
            SqlType::Other(code) => code,
        }
    }

    /// Symbolic name as the engine spells it.
    pub fn name(self) -> &'static str {
        match self {
            SqlType::Char => "CHAR",
            SqlType::Varchar => "VARCHAR",
            SqlType::LongVarchar => "LONGVARCHAR",
            SqlType::Numeric => "NUMERIC",
            SqlType::Decimal => "DECIMAL",
            SqlType::Integer => "INTEGER",
            SqlType::SmallInt => "SMALLINT",
            SqlType::Float => "FLOAT",
            SqlType::Real => "REAL",
            SqlType::Double => "DOUBLE",
            SqlType::Date => "DATE",
            SqlType::Time => "TIME",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::Binary => "BINARY",
            SqlType::VarBinary => "VARBINARY",
            SqlType::LongVarBinary => "LONGVARBINARY",
            SqlType::BigInt => "BIGINT",
            SqlType::Graphic => "GRAPHIC",
            SqlType::VarGraphic => "VARGRAPHIC",
            SqlType::LongVarGraphic => "LONGVARGRAPHIC",
            SqlType::Blob => "BLOB",
            SqlType::Clob => "CLOB",
            SqlType::DbClob => "DBCLOB",
            SqlType::Datalink => "DATALINK",
            SqlType::BlobLocator => "BLOB LOCATOR",
            SqlType::ClobLocator => "CLOB LOCATOR",
            SqlType::DbClobLocator => "DBCLOB LOCATOR",
            SqlType::Other(_) => "UNKNOWN",
        }
    }

    /// Single-byte character types, exchanged as NUL-terminated text.
    pub fn is_char_family(self) -> bool {
        matches!(self, SqlType::Char | SqlType::Varchar | SqlType::LongVarchar)
    }

    /// Double-byte character types, exchanged as UTF-16 code units.
    pub fn is_graphic_family(self) -> bool {
        matches!(
            self,
            SqlType::Graphic | SqlType::VarGraphic | SqlType::LongVarGraphic
        )
    }

    /// Large-object types fetched through locators.
    pub fn is_lob(self) -> bool {
        matches!(self, SqlType::Blob | SqlType::Clob | SqlType::DbClob)
    }

    pub fn is_locator(self) -> bool {
        matches!(
            self,
            SqlType::BlobLocator | SqlType::ClobLocator | SqlType::DbClobLocator
        )
    }

    /// The locator type a large-object column is rebound to for fetching.
    pub fn locator(self) -> Option<SqlType> {
        match self {
            SqlType::Blob => Some(SqlType::BlobLocator),
            SqlType::Clob => Some(SqlType::ClobLocator),
            SqlType::DbClob => Some(SqlType::DbClobLocator),
            _ => None,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Other(code) => write!(f, "UNKNOWN({})", code),
            other => f.write_str(other.name()),
        }
    }
}

/// Large-object kind, paired with a locator in [`crate::types::Value::Lob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LobKind {
    Blob,
    Clob,
    DbClob,
}

impl LobKind {
    /// Map a locator or large-object type to its kind.
    pub fn from_sql_type(ty: SqlType) -> Option<Self> {
        match ty {
            SqlType::Blob | SqlType::BlobLocator => Some(LobKind::Blob),
            SqlType::Clob | SqlType::ClobLocator => Some(LobKind::Clob),
            SqlType::DbClob | SqlType::DbClobLocator => Some(LobKind::DbClob),
            _ => None,
        }
    }

    /// Locator type code, identical for the SQL and C sides.
    pub fn locator_type(self) -> i16 {
        match self {
            LobKind::Blob => SQL_BLOB_LOCATOR,
            LobKind::Clob => SQL_CLOB_LOCATOR,
            LobKind::DbClob => SQL_DBCLOB_LOCATOR,
        }
    }

    /// Whether substring reads come back as character data.
    pub fn is_character(self) -> bool {
        matches!(self, LobKind::Clob | LobKind::DbClob)
    }
}
