//! Native CLI boundary.
//!
//! The database connectivity library is a black box behind the [`Cli`]
//! trait: an ODBC-family Call Level Interface handled through opaque
//! environment/connection/statement ids. Trait methods map one-for-one to
//! the native entry points the driver uses; return codes come back as
//! [`SqlResult`] so callers can branch on the full native disposition
//! (success, success-with-info, need-data, no-data, error, invalid handle).
//!
//! Methods that hand the native library a long-lived buffer pointer
//! ([`Cli::bind_parameter`], [`Cli::bind_col`], the fetched-rows and
//! row-status attribute setters) and the methods that make the library
//! dereference those pointers ([`Cli::execute`], [`Cli::fetch_scroll`]) are
//! `unsafe`: the caller guarantees every bound buffer outlives its binding
//! and is released only after a native unbind or statement reset.
//!
//! `connect`, `execute`, `put_data`, `fetch_scroll`, `end_tran`,
//! `lob_length` and `lob_read` may block on a network round-trip.
//! Implementations must not require any process-wide lock around them, and
//! the adapter itself takes none.

pub mod constants;
pub mod mock;
pub mod structs;

use crate::error::DiagRecord;
use constants::*;
use structs::{ColumnDesc, ParamDesc, ProcColumnDesc};

/// Opaque native environment handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvHandle(usize);

/// Opaque native connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnHandle(usize);

/// Opaque native statement handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtHandle(usize);

macro_rules! impl_handle {
    ($name:ident) => {
        impl $name {
            pub fn from_raw(raw: usize) -> Self {
                Self(raw)
            }

            pub fn as_raw(self) -> usize {
                self.0
            }
        }
    };
}

impl_handle!(EnvHandle);
impl_handle!(ConnHandle);
impl_handle!(StmtHandle);

/// A handle of any kind, for diagnostic retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnyHandle {
    Env(EnvHandle),
    Conn(ConnHandle),
    Stmt(StmtHandle),
}

impl AnyHandle {
    /// Native handle-kind code (`SQL_HANDLE_ENV` / `_DBC` / `_STMT`).
    pub fn kind_code(self) -> i16 {
        match self {
            AnyHandle::Env(_) => SQL_HANDLE_ENV,
            AnyHandle::Conn(_) => SQL_HANDLE_DBC,
            AnyHandle::Stmt(_) => SQL_HANDLE_STMT,
        }
    }
}

impl From<EnvHandle> for AnyHandle {
    fn from(h: EnvHandle) -> Self {
        AnyHandle::Env(h)
    }
}

impl From<ConnHandle> for AnyHandle {
    fn from(h: ConnHandle) -> Self {
        AnyHandle::Conn(h)
    }
}

impl From<StmtHandle> for AnyHandle {
    fn from(h: StmtHandle) -> Self {
        AnyHandle::Stmt(h)
    }
}

/// Native return disposition, carrying the call's output on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum SqlResult<T> {
    Success(T),
    SuccessWithInfo(T),
    StillExecuting,
    NeedData,
    NoData,
    Error,
    InvalidHandle,
}

impl<T> SqlResult<T> {
    /// True for `Success`, and for `SuccessWithInfo` under the
    /// [`TREAT_INFO_AS_SUCCESS`] policy.
    pub fn is_success(&self) -> bool {
        match self {
            SqlResult::Success(_) => true,
            SqlResult::SuccessWithInfo(_) => TREAT_INFO_AS_SUCCESS,
            _ => false,
        }
    }

    /// True only for `SuccessWithInfo`.
    pub fn has_info(&self) -> bool {
        matches!(self, SqlResult::SuccessWithInfo(_))
    }

    /// The carried value, if the call succeeded.
    pub fn ok(self) -> Option<T> {
        match self {
            SqlResult::Success(v) | SqlResult::SuccessWithInfo(v) => Some(v),
            _ => None,
        }
    }

    /// The raw native return code.
    pub fn return_code(&self) -> i16 {
        match self {
            SqlResult::Success(_) => SQL_SUCCESS,
            SqlResult::SuccessWithInfo(_) => SQL_SUCCESS_WITH_INFO,
            SqlResult::StillExecuting => SQL_STILL_EXECUTING,
            SqlResult::NeedData => SQL_NEED_DATA,
            SqlResult::NoData => SQL_NO_DATA,
            SqlResult::Error => SQL_ERROR,
            SqlResult::InvalidHandle => SQL_INVALID_HANDLE,
        }
    }

    /// Map the carried value, preserving the disposition.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SqlResult<U> {
        match self {
            SqlResult::Success(v) => SqlResult::Success(f(v)),
            SqlResult::SuccessWithInfo(v) => SqlResult::SuccessWithInfo(f(v)),
            SqlResult::StillExecuting => SqlResult::StillExecuting,
            SqlResult::NeedData => SqlResult::NeedData,
            SqlResult::NoData => SqlResult::NoData,
            SqlResult::Error => SqlResult::Error,
            SqlResult::InvalidHandle => SqlResult::InvalidHandle,
        }
    }
}

/// Fetch direction for scrolling fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOrientation {
    Next,
    First,
    Last,
    Prior,
    Absolute,
    Relative,
}

impl FetchOrientation {
    /// Map a caller-supplied orientation code; unrecognized codes fall back
    /// to `Next`.
    pub fn from_code(code: i16) -> Self {
        match code {
            SQL_FETCH_FIRST => FetchOrientation::First,
            SQL_FETCH_LAST => FetchOrientation::Last,
            SQL_FETCH_PRIOR => FetchOrientation::Prior,
            SQL_FETCH_ABSOLUTE => FetchOrientation::Absolute,
            SQL_FETCH_RELATIVE => FetchOrientation::Relative,
            _ => FetchOrientation::Next,
        }
    }

    pub fn code(self) -> i16 {
        match self {
            FetchOrientation::Next => SQL_FETCH_NEXT,
            FetchOrientation::First => SQL_FETCH_FIRST,
            FetchOrientation::Last => SQL_FETCH_LAST,
            FetchOrientation::Prior => SQL_FETCH_PRIOR,
            FetchOrientation::Absolute => SQL_FETCH_ABSOLUTE,
            FetchOrientation::Relative => SQL_FETCH_RELATIVE,
        }
    }
}

/// Transaction completion kind for `end_tran`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Commit,
    Rollback,
}

impl Completion {
    pub fn code(self) -> i16 {
        match self {
            Completion::Commit => SQL_COMMIT,
            Completion::Rollback => SQL_ROLLBACK,
        }
    }
}

/// Statement reset option for `free_stmt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeStmtOption {
    /// Close the open cursor, if any.
    Close,
    /// Release all column bindings.
    Unbind,
    /// Release all parameter bindings.
    ResetParams,
}

impl FreeStmtOption {
    pub fn code(self) -> u16 {
        match self {
            FreeStmtOption::Close => SQL_CLOSE,
            FreeStmtOption::Unbind => SQL_UNBIND,
            FreeStmtOption::ResetParams => SQL_RESET_PARAMS,
        }
    }
}

/// Parameter direction as described by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDirection {
    Input,
    InputOutput,
    Output,
    /// Unrecognized direction code, kept raw.
    Other(i16),
}

impl ParamDirection {
    pub fn from_code(code: i16) -> Self {
        match code {
            SQL_PARAM_INPUT => ParamDirection::Input,
            SQL_PARAM_INPUT_OUTPUT => ParamDirection::InputOutput,
            SQL_PARAM_OUTPUT => ParamDirection::Output,
            other => ParamDirection::Other(other),
        }
    }

    pub fn code(self) -> i16 {
        match self {
            ParamDirection::Input => SQL_PARAM_INPUT,
            ParamDirection::InputOutput => SQL_PARAM_INPUT_OUTPUT,
            ParamDirection::Output => SQL_PARAM_OUTPUT,
            ParamDirection::Other(code) => code,
        }
    }

    /// Only strictly-input positions keep their original value in a
    /// procedure-call output tuple.
    pub fn is_input(self) -> bool {
        matches!(self, ParamDirection::Input)
    }
}

/// Introspection string kinds for `get_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoType {
    ServerName,
    DbmsName,
    DbmsVer,
    DriverName,
    DriverVer,
}

impl InfoType {
    pub fn code(self) -> u16 {
        match self {
            InfoType::ServerName => SQL_SERVER_NAME,
            InfoType::DbmsName => SQL_DBMS_NAME,
            InfoType::DbmsVer => SQL_DBMS_VER,
            InfoType::DriverName => SQL_DRIVER_NAME,
            InfoType::DriverVer => SQL_DRIVER_VER,
        }
    }
}

/// The native Call Level Interface.
///
/// Implementations wrap the real connectivity library; the in-crate
/// [`mock::MockCli`] provides a scripted backend for tests.
pub trait Cli {
    // Handle management.

    fn alloc_env(&self) -> SqlResult<EnvHandle>;

    fn alloc_connection(&self, env: EnvHandle) -> SqlResult<ConnHandle>;

    fn alloc_statement(&self, dbc: ConnHandle) -> SqlResult<StmtHandle>;

    fn free_env(&self, env: EnvHandle) -> SqlResult<()>;

    fn free_connection(&self, dbc: ConnHandle) -> SqlResult<()>;

    /// Free the statement handle itself.
    fn free_statement(&self, stmt: StmtHandle) -> SqlResult<()>;

    /// Reset part of a statement's state without freeing the handle.
    ///
    /// After `Unbind`/`ResetParams` return, the native library holds no
    /// pointers previously registered through `bind_col`/`bind_parameter`.
    fn free_stmt(&self, stmt: StmtHandle, option: FreeStmtOption) -> SqlResult<()>;

    // Connection.

    /// Establish the connection. May block on the network.
    fn connect(&self, dbc: ConnHandle, dsn: &str, uid: &str, pwd: &str) -> SqlResult<()>;

    fn disconnect(&self, dbc: ConnHandle) -> SqlResult<()>;

    fn set_autocommit(&self, dbc: ConnHandle, on: bool) -> SqlResult<()>;

    /// Commit or roll back the current unit of work. May block.
    fn end_tran(&self, dbc: ConnHandle, completion: Completion) -> SqlResult<()>;

    /// Whether the implementation supports `get_info` at all.
    fn supports_get_info(&self, dbc: ConnHandle) -> bool;

    /// Read one introspection string into `value`.
    fn get_info(&self, dbc: ConnHandle, info: InfoType, value: &mut String) -> SqlResult<()>;

    // Statement preparation and parameters.

    fn prepare(&self, stmt: StmtHandle, sql: &str) -> SqlResult<()>;

    /// Number of parameter markers in the prepared statement.
    fn num_params(&self, stmt: StmtHandle) -> SqlResult<u16>;

    /// Describe one parameter marker (1-based position).
    fn describe_param(&self, stmt: StmtHandle, position: u16) -> SqlResult<ParamDesc>;

    /// Register a parameter buffer with the engine (1-based position).
    ///
    /// # Safety
    ///
    /// `buffer` (`buffer_len` bytes) and the `indicator` cell stay
    /// registered until the next `free_stmt(ResetParams)` on this handle;
    /// both must remain valid and unmoved until then. The engine reads the
    /// buffer during `execute` and writes output parameters back after it.
    #[allow(clippy::too_many_arguments)]
    unsafe fn bind_parameter(
        &self,
        stmt: StmtHandle,
        position: u16,
        direction: ParamDirection,
        c_type: i16,
        sql_type: i16,
        column_size: u32,
        decimal_digits: i16,
        buffer: *mut u8,
        buffer_len: SqlLen,
        indicator: *mut SqlLen,
    ) -> SqlResult<()>;

    /// Execute the prepared statement. May block.
    ///
    /// Returns `NeedData` when a data-at-execution parameter awaits its
    /// payload (see `param_data`/`put_data`).
    ///
    /// # Safety
    ///
    /// Dereferences every pointer registered through `bind_parameter`.
    unsafe fn execute(&self, stmt: StmtHandle) -> SqlResult<()>;

    /// Advance the need-data protocol. On `NeedData` the token of the next
    /// awaiting parameter is written to `token`; `Success` means execution
    /// finished.
    fn param_data(&self, stmt: StmtHandle, token: &mut usize) -> SqlResult<()>;

    /// Supply one chunk of a data-at-execution parameter. May block.
    fn put_data(&self, stmt: StmtHandle, chunk: &[u8]) -> SqlResult<()>;

    // Results.

    fn num_result_cols(&self, stmt: StmtHandle) -> SqlResult<u16>;

    /// Describe one result column (1-based) into `desc`.
    fn describe_col(&self, stmt: StmtHandle, column: u16, desc: &mut ColumnDesc) -> SqlResult<()>;

    /// Numeric column attribute (`SQL_DESC_DISPLAY_SIZE`, `SQL_DESC_LENGTH`).
    fn col_attribute(&self, stmt: StmtHandle, column: u16, attr: u16) -> SqlResult<i64>;

    /// Register a column's batch buffer (1-based position).
    ///
    /// # Safety
    ///
    /// `buffer` holds `buffer_len × row-array-size` bytes and `indicators`
    /// one cell per batch row; both stay registered until the next
    /// `free_stmt(Unbind)` and must remain valid and unmoved until then.
    unsafe fn bind_col(
        &self,
        stmt: StmtHandle,
        column: u16,
        c_type: i16,
        buffer: *mut u8,
        buffer_len: SqlLen,
        indicators: *mut SqlLen,
    ) -> SqlResult<()>;

    /// Rows fetched per native fetch call.
    fn set_row_array_size(&self, stmt: StmtHandle, rows: usize) -> SqlResult<()>;

    /// Row binding layout; 0 selects column-wise binding.
    fn set_row_bind_type(&self, stmt: StmtHandle, row_size: usize) -> SqlResult<()>;

    /// Cell receiving the per-fetch row count.
    ///
    /// # Safety
    ///
    /// `ptr` is written during every subsequent `fetch_scroll` and must stay
    /// valid until replaced or the statement is reset.
    unsafe fn set_rows_fetched_ptr(&self, stmt: StmtHandle, ptr: *mut u64) -> SqlResult<()>;

    /// Per-row status array, one cell per batch row.
    ///
    /// # Safety
    ///
    /// `ptr` must cover the current row-array size for every subsequent
    /// `fetch_scroll` and stay valid until replaced or the statement is
    /// reset.
    unsafe fn set_row_status_ptr(&self, stmt: StmtHandle, ptr: *mut u16) -> SqlResult<()>;

    fn set_scrollable(&self, stmt: StmtHandle, scrollable: bool) -> SqlResult<()>;

    /// Query timeout in seconds; 0 disables it.
    fn set_query_timeout(&self, stmt: StmtHandle, seconds: u32) -> SqlResult<()>;

    /// Fetch the next rowset. May block.
    ///
    /// # Safety
    ///
    /// Writes through every pointer registered via `bind_col`,
    /// `set_rows_fetched_ptr` and `set_row_status_ptr`.
    unsafe fn fetch_scroll(
        &self,
        stmt: StmtHandle,
        orientation: FetchOrientation,
        offset: i64,
    ) -> SqlResult<()>;

    /// Affected-row count of the last execution (−1 when not meaningful).
    fn row_count(&self, stmt: StmtHandle) -> SqlResult<i64>;

    // Catalog and large objects.

    /// Run the procedure-columns catalog query for `procedure` and collect
    /// its rows into `out`.
    fn procedure_columns(
        &self,
        stmt: StmtHandle,
        procedure: &str,
        out: &mut Vec<ProcColumnDesc>,
    ) -> SqlResult<()>;

    /// Total length in bytes of the large object behind `locator`.
    /// May block.
    fn lob_length(&self, stmt: StmtHandle, locator_type: i16, locator: i32) -> SqlResult<i64>;

    /// Read a substring of the large object behind `locator` into `target`,
    /// starting at 1-based byte position `start`. Returns the byte count
    /// written. May block.
    fn lob_read(
        &self,
        stmt: StmtHandle,
        locator_type: i16,
        locator: i32,
        start: i64,
        target: &mut [u8],
    ) -> SqlResult<i64>;

    // Diagnostics.

    /// First diagnostic record associated with `handle`.
    fn diag_rec(&self, handle: AnyHandle) -> SqlResult<DiagRecord>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_codes_roundtrip() {
        for code in 1..=6 {
            assert_eq!(FetchOrientation::from_code(code).code(), code);
        }
    }

    #[test]
    fn test_unknown_orientation_falls_back_to_next() {
        assert_eq!(FetchOrientation::from_code(0), FetchOrientation::Next);
        assert_eq!(FetchOrientation::from_code(7), FetchOrientation::Next);
        assert_eq!(FetchOrientation::from_code(-3), FetchOrientation::Next);
    }

    #[test]
    fn test_sql_result_success_policy() {
        assert!(SqlResult::Success(()).is_success());
        assert!(SqlResult::SuccessWithInfo(()).is_success());
        assert!(SqlResult::SuccessWithInfo(()).has_info());
        assert!(!SqlResult::<()>::Error.is_success());
        assert!(!SqlResult::<()>::NoData.is_success());
    }

    #[test]
    fn test_sql_result_return_codes() {
        assert_eq!(SqlResult::Success(()).return_code(), SQL_SUCCESS);
        assert_eq!(SqlResult::<()>::NeedData.return_code(), SQL_NEED_DATA);
        assert_eq!(SqlResult::<()>::NoData.return_code(), SQL_NO_DATA);
        assert_eq!(SqlResult::<()>::InvalidHandle.return_code(), SQL_INVALID_HANDLE);
    }

    #[test]
    fn test_param_direction_codes() {
        assert_eq!(ParamDirection::from_code(1), ParamDirection::Input);
        assert_eq!(ParamDirection::from_code(2), ParamDirection::InputOutput);
        assert_eq!(ParamDirection::from_code(4), ParamDirection::Output);
        assert_eq!(ParamDirection::from_code(0), ParamDirection::Other(0));
        assert!(ParamDirection::Input.is_input());
        assert!(!ParamDirection::Other(0).is_input());
    }

    #[test]
    fn test_handle_kind_codes() {
        let env = EnvHandle::from_raw(1);
        let dbc = ConnHandle::from_raw(2);
        let stmt = StmtHandle::from_raw(3);
        assert_eq!(AnyHandle::from(env).kind_code(), SQL_HANDLE_ENV);
        assert_eq!(AnyHandle::from(dbc).kind_code(), SQL_HANDLE_DBC);
        assert_eq!(AnyHandle::from(stmt).kind_code(), SQL_HANDLE_STMT);
    }
}
