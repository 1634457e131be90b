//! CLI constants.
//!
//! Numeric codes of the ODBC-family Call Level Interface: return codes,
//! handle kinds, SQL and C data types, statement/connection attributes and
//! the sentinel values the driver exchanges with the native library. Values
//! match the native headers; they cross the boundary unchanged.

/// Indicator/length cell type (64-bit `SQLLEN`).
pub type SqlLen = i64;

// Return codes
pub const SQL_SUCCESS: i16 = 0;
pub const SQL_SUCCESS_WITH_INFO: i16 = 1;
pub const SQL_STILL_EXECUTING: i16 = 2;
pub const SQL_NEED_DATA: i16 = 99;
pub const SQL_NO_DATA: i16 = 100;
pub const SQL_ERROR: i16 = -1;
pub const SQL_INVALID_HANDLE: i16 = -2;

// Handle kinds
pub const SQL_HANDLE_ENV: i16 = 1;
pub const SQL_HANDLE_DBC: i16 = 2;
pub const SQL_HANDLE_STMT: i16 = 3;

// SQL data types
pub const SQL_CHAR: i16 = 1;
pub const SQL_NUMERIC: i16 = 2;
pub const SQL_DECIMAL: i16 = 3;
pub const SQL_INTEGER: i16 = 4;
pub const SQL_SMALLINT: i16 = 5;
pub const SQL_FLOAT: i16 = 6;
pub const SQL_REAL: i16 = 7;
pub const SQL_DOUBLE: i16 = 8;
pub const SQL_VARCHAR: i16 = 12;
pub const SQL_TYPE_DATE: i16 = 91;
pub const SQL_TYPE_TIME: i16 = 92;
pub const SQL_TYPE_TIMESTAMP: i16 = 93;
pub const SQL_LONGVARCHAR: i16 = -1;
pub const SQL_BINARY: i16 = -2;
pub const SQL_VARBINARY: i16 = -3;
pub const SQL_LONGVARBINARY: i16 = -4;
pub const SQL_BIGINT: i16 = -5;

// Database-specific SQL types
pub const SQL_GRAPHIC: i16 = -95;
pub const SQL_VARGRAPHIC: i16 = -96;
pub const SQL_LONGVARGRAPHIC: i16 = -97;
pub const SQL_BLOB: i16 = -98;
pub const SQL_CLOB: i16 = -99;
pub const SQL_DBCLOB: i16 = -350;
pub const SQL_DATALINK: i16 = -400;

// Locator types (SQL and C codes coincide)
pub const SQL_BLOB_LOCATOR: i16 = 31;
pub const SQL_CLOB_LOCATOR: i16 = 41;
pub const SQL_DBCLOB_LOCATOR: i16 = 57;

// C buffer types
pub const SQL_C_CHAR: i16 = 1;
pub const SQL_C_LONG: i16 = 4;
pub const SQL_C_SHORT: i16 = 5;
pub const SQL_C_FLOAT: i16 = 7;
pub const SQL_C_DOUBLE: i16 = 8;
pub const SQL_C_TYPE_DATE: i16 = 91;
pub const SQL_C_TYPE_TIME: i16 = 92;
pub const SQL_C_TYPE_TIMESTAMP: i16 = 93;
pub const SQL_C_BINARY: i16 = -2;
pub const SQL_C_DBCHAR: i16 = SQL_DBCLOB;
pub const SQL_C_BLOB_LOCATOR: i16 = SQL_BLOB_LOCATOR;
pub const SQL_C_CLOB_LOCATOR: i16 = SQL_CLOB_LOCATOR;
pub const SQL_C_DBCLOB_LOCATOR: i16 = SQL_DBCLOB_LOCATOR;

// Length/indicator sentinels
pub const SQL_NULL_DATA: SqlLen = -1;
pub const SQL_DATA_AT_EXEC: SqlLen = -2;
pub const SQL_NTS: SqlLen = -3;
pub const SQL_NO_TOTAL: SqlLen = -4;

// Connection attributes
pub const SQL_ATTR_AUTOCOMMIT: i32 = 102;
pub const SQL_AUTOCOMMIT_OFF: i32 = 0;
pub const SQL_AUTOCOMMIT_ON: i32 = 1;

// Statement attributes
pub const SQL_ATTR_QUERY_TIMEOUT: i32 = 0;
pub const SQL_ATTR_CURSOR_SCROLLABLE: i32 = -1;
pub const SQL_ATTR_ROW_BIND_TYPE: i32 = 5;
pub const SQL_ATTR_ROW_STATUS_PTR: i32 = 25;
pub const SQL_ATTR_ROWS_FETCHED_PTR: i32 = 26;
pub const SQL_ATTR_ROW_ARRAY_SIZE: i32 = 27;
pub const SQL_NONSCROLLABLE: i32 = 0;
pub const SQL_SCROLLABLE: i32 = 1;
pub const SQL_BIND_BY_COLUMN: i32 = 0;

// Column attributes
pub const SQL_DESC_DISPLAY_SIZE: u16 = 6;
pub const SQL_DESC_LENGTH: u16 = 1003;

// Fetch orientations
pub const SQL_FETCH_NEXT: i16 = 1;
pub const SQL_FETCH_FIRST: i16 = 2;
pub const SQL_FETCH_LAST: i16 = 3;
pub const SQL_FETCH_PRIOR: i16 = 4;
pub const SQL_FETCH_ABSOLUTE: i16 = 5;
pub const SQL_FETCH_RELATIVE: i16 = 6;

// Per-row fetch statuses
pub const SQL_ROW_SUCCESS: u16 = 0;
pub const SQL_ROW_DELETED: u16 = 1;
pub const SQL_ROW_UPDATED: u16 = 2;
pub const SQL_ROW_NOROW: u16 = 3;
pub const SQL_ROW_ADDED: u16 = 4;
pub const SQL_ROW_ERROR: u16 = 5;
pub const SQL_ROW_SUCCESS_WITH_INFO: u16 = 6;

// Statement reset options
pub const SQL_CLOSE: u16 = 0;
pub const SQL_UNBIND: u16 = 2;
pub const SQL_RESET_PARAMS: u16 = 3;

// Transaction completion
pub const SQL_COMMIT: i16 = 0;
pub const SQL_ROLLBACK: i16 = 1;

// Parameter directions
pub const SQL_PARAM_TYPE_UNKNOWN: i16 = 0;
pub const SQL_PARAM_INPUT: i16 = 1;
pub const SQL_PARAM_INPUT_OUTPUT: i16 = 2;
pub const SQL_RESULT_COL: i16 = 3;
pub const SQL_PARAM_OUTPUT: i16 = 4;
pub const SQL_RETURN_VALUE: i16 = 5;

// Nullability
pub const SQL_NO_NULLS: i16 = 0;
pub const SQL_NULLABLE: i16 = 1;
pub const SQL_NULLABLE_UNKNOWN: i16 = 2;

// Introspection
pub const SQL_DRIVER_NAME: u16 = 6;
pub const SQL_DRIVER_VER: u16 = 7;
pub const SQL_SERVER_NAME: u16 = 13;
pub const SQL_DBMS_NAME: u16 = 17;
pub const SQL_DBMS_VER: u16 = 18;
pub const SQL_API_SQLGETINFO: u16 = 45;

// Diagnostics
pub const SQL_MAX_MESSAGE_LENGTH: usize = 512;
pub const SQL_SQLSTATE_SIZE: usize = 5;

// Native struct sizes for bound date/time buffers
pub const SQL_DATE_STRUCT_LEN: usize = 6;
pub const SQL_TIME_STRUCT_LEN: usize = 6;
pub const SQL_TIMESTAMP_STRUCT_LEN: usize = 16;

/// Chunk size for need-data streaming transfers.
pub const PUT_DATA_CHUNK: usize = 1024;

/// Text buffer length for BIGINT columns: 19 digits, sign, terminator.
pub const BIGINT_TEXT_LEN: usize = 21;

/// Extra bytes added to decimal/numeric text buffers beyond
/// `column_size + scale` (sign and separator headroom).
pub const DECIMAL_TEXT_SLACK: u32 = 2;

/// Success-with-info return codes count as success; the diagnostic still
/// lands in the cursor message list.
pub const TREAT_INFO_AS_SUCCESS: bool = true;
