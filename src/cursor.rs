//! Statement-level cursor.
//!
//! A [`Cursor`] owns one native statement handle and drives the whole
//! prepare / bind / execute / fetch protocol on it. Parameter encoding
//! lives in [`crate::params`], result-column buffering and decoding in
//! [`crate::rows`]; this module sequences the native calls and keeps the
//! registered buffers alive for exactly as long as the engine may touch
//! them.

use std::io::Read;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::cli::constants::{PUT_DATA_CHUNK, SQL_ROW_ERROR, SQL_ROW_NOROW};
use crate::cli::structs::{ParamDesc, ProcColumnDesc};
use crate::cli::{
    Cli, ConnHandle, FetchOrientation, FreeStmtOption, ParamDirection, SqlResult, StmtHandle,
};
use crate::error::{fetch_diag, Error, Result, Warning};
use crate::params::{collect_outputs, describe_parameters, ParamBinding};
use crate::rows::{bind_for_fetch, decode_row, describe_columns, ColumnBinding};
use crate::types::{Description, LobKind, Param, Row, Value};

/// Synchronous cursor over one native statement handle.
///
/// Created through [`crate::Connection::cursor`]. A cursor may be reused
/// for any number of statements; re-executing the same SQL text skips the
/// native prepare. Only `execute`, `callproc`, the fetch family, `skip`
/// and `read_lob` perform blocking native calls.
pub struct Cursor {
    cli: Arc<dyn Cli>,
    dbc: ConnHandle,
    /// Live statement handle; `None` once the cursor is closed.
    stmt: Option<StmtHandle>,
    /// Text of the last successful prepare, reused to skip re-preparing
    /// identical SQL.
    last_statement: Option<String>,
    /// Marker count cached alongside `last_statement`.
    param_count: u16,
    description: Arc<Description>,
    /// Parameter buffers registered with the engine; must outlive every
    /// native call up to the next parameter reset.
    params: Vec<ParamBinding>,
    /// Column buffers registered with the engine; must outlive every
    /// native fetch up to the next unbind.
    columns: Vec<ColumnBinding>,
    scrollable: bool,
    timeout: u32,
    auto_read_lobs: bool,
    /// Column buffers must be rebuilt before the next fetch.
    needs_rebind: bool,
    /// Batch size the current column buffers were built for.
    last_batch: usize,
    /// Cell the engine writes the per-fetch row count into. Boxed so the
    /// registered address survives moves of the cursor itself.
    fetched_rows: Box<u64>,
    /// Per-row status array for the current batch size.
    row_status: Vec<u16>,
    row_count: i64,
    messages: Vec<Warning>,
}

impl Cursor {
    pub(crate) fn new(cli: Arc<dyn Cli>, dbc: ConnHandle) -> Result<Self> {
        let stmt = match cli.alloc_statement(dbc) {
            SqlResult::Success(h) | SqlResult::SuccessWithInfo(h) => h,
            _ => return Err(Error::from_handle(cli.as_ref(), dbc.into())),
        };
        debug!(handle = stmt.as_raw(), "allocated statement handle");
        // Fresh handles start with the stored (disabled) query timeout.
        let _ = cli.set_query_timeout(stmt, 0);
        Ok(Cursor {
            cli,
            dbc,
            stmt: Some(stmt),
            last_statement: None,
            param_count: 0,
            description: Arc::new(Description::default()),
            params: Vec::new(),
            columns: Vec::new(),
            scrollable: false,
            timeout: 0,
            auto_read_lobs: false,
            needs_rebind: true,
            last_batch: 0,
            fetched_rows: Box::new(0),
            row_status: Vec::new(),
            row_count: -1,
            messages: Vec::new(),
        })
    }

    /// Prepare and execute `sql` with positional parameters.
    ///
    /// Returns `None` when the statement produced a result set (the native
    /// row count is −1), otherwise the affected-row count.
    ///
    /// A statement with N parameter markers requires exactly N values; a
    /// statement without markers ignores any values passed.
    pub fn execute(&mut self, sql: &str, params: Vec<Param>) -> Result<Option<i64>> {
        let stmt = self.stmt()?;
        self.messages.clear();
        self.reset_cursor(stmt)?;
        self.params.clear();

        if self.last_statement.as_deref() != Some(sql) {
            if !matches!(self.cli.prepare(stmt, sql), SqlResult::Success(())) {
                return Err(Error::from_handle(self.cli.as_ref(), stmt.into()));
            }
            self.param_count = match self.cli.num_params(stmt) {
                SqlResult::Success(n) => n,
                _ => return Err(Error::from_handle(self.cli.as_ref(), stmt.into())),
            };
            self.last_statement = Some(sql.to_string());
            debug!(markers = self.param_count, sql, "prepared statement");
        }

        if self.param_count > 0 {
            if params.len() != self.param_count as usize {
                return Err(Error::wrong_param_count());
            }
            let descs = describe_parameters(self.cli.as_ref(), stmt, self.param_count)?;
            let mut bindings = Vec::with_capacity(descs.len());
            for (i, (desc, value)) in descs.iter().zip(params).enumerate() {
                let mut binding =
                    ParamBinding::encode((i + 1) as u16, desc, ParamDirection::Input, value)?;
                unsafe {
                    binding.bind(self.cli.as_ref(), stmt)?;
                }
                bindings.push(binding);
            }
            self.params = bindings;
        }

        self.run_execution(stmt)?;
        self.finish_execution(stmt)
    }

    /// Execute `sql` once per parameter set, discarding intermediate
    /// results. The prepare-skip cache makes the statement text go through
    /// the native prepare only once.
    pub fn execute_many(&mut self, sql: &str, param_sets: Vec<Vec<Param>>) -> Result<()> {
        for params in param_sets {
            self.execute(sql, params)?;
        }
        Ok(())
    }

    /// Call the stored procedure `procedure`.
    ///
    /// The formal parameter list is discovered through the
    /// procedure-columns catalog, so the caller supplies plain values even
    /// for OUT positions. Returns one value per parameter: inputs echoed
    /// back unchanged, OUT and INOUT positions replaced by what the
    /// procedure wrote. A result set, if any, stays fetchable afterwards.
    pub fn callproc(&mut self, procedure: &str, params: Vec<Param>) -> Result<Vec<Value>> {
        let stmt = self.stmt()?;
        self.messages.clear();
        self.reset_cursor(stmt)?;
        self.params.clear();

        let formals = self.procedure_formals(procedure)?;
        if params.len() != formals.len() {
            return Err(Error::wrong_param_count());
        }

        let call = build_call_text(procedure, formals.len());
        debug!(statement = %call, "prepared procedure call");
        if !self.cli.prepare(stmt, &call).is_success() {
            return Err(Error::from_handle(self.cli.as_ref(), stmt.into()));
        }
        // The handle now holds the CALL text, not whatever was cached.
        self.last_statement = None;
        self.param_count = 0;

        let mut bindings = Vec::with_capacity(formals.len());
        for (i, (formal, value)) in formals.iter().zip(params).enumerate() {
            let desc = ParamDesc {
                sql_type: formal.sql_type,
                column_size: formal.column_size,
                decimal_digits: formal.decimal_digits,
                nullable: formal.nullable,
            };
            let direction = ParamDirection::from_code(formal.direction);
            let mut binding = ParamBinding::encode((i + 1) as u16, &desc, direction, value)?;
            unsafe {
                binding.bind(self.cli.as_ref(), stmt)?;
            }
            bindings.push(binding);
        }
        self.params = bindings;

        self.run_execution(stmt)?;
        self.finish_execution(stmt)?;
        collect_outputs(&self.params)
    }

    /// Fetch the next row, or `None` past the end of the result set.
    pub fn fetch_one(&mut self) -> Result<Option<Row>> {
        self.fetch_single(FetchOrientation::Next, 1)
    }

    /// Fetch up to `count` rows in one native block fetch.
    pub fn fetch_many(&mut self, count: usize) -> Result<Vec<Row>> {
        self.fetch_block(count, FetchOrientation::Next, 1)
    }

    /// Fetch up to `count` rows from an explicit position.
    ///
    /// The orientation is honored only on scrollable cursors; otherwise
    /// every fetch advances forward. `offset` applies to the absolute and
    /// relative orientations.
    pub fn fetch_scroll(
        &mut self,
        count: usize,
        orientation: FetchOrientation,
        offset: i64,
    ) -> Result<Vec<Row>> {
        self.fetch_block(count, orientation, offset)
    }

    /// Fetch every remaining row.
    pub fn fetch_all(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetch_one()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Advance past up to `count` rows without decoding them.
    ///
    /// Returns the number of rows actually skipped, or −1 when the
    /// statement produced no result set.
    pub fn skip(&mut self, count: usize) -> Result<i64> {
        let stmt = self.stmt()?;
        let cols = match self.cli.num_result_cols(stmt) {
            SqlResult::Success(n) | SqlResult::SuccessWithInfo(n) => n,
            _ => return Err(Error::from_handle(self.cli.as_ref(), stmt.into())),
        };
        if cols == 0 {
            return Ok(-1);
        }
        let mut skipped = 0i64;
        for _ in 0..count {
            match unsafe { self.cli.fetch_scroll(stmt, FetchOrientation::Next, 1) } {
                r if r.is_success() => skipped += 1,
                SqlResult::NoData => break,
                _ => return Err(Error::from_handle(self.cli.as_ref(), stmt.into())),
            }
        }
        trace!(skipped, "skipped rows");
        Ok(skipped)
    }

    /// Materialize the large object behind `locator`.
    ///
    /// Reads length and payload through a temporary statement handle on
    /// the same connection. BLOBs come back as [`Value::Bytes`], CLOBs and
    /// DBCLOBs as [`Value::Str`].
    pub fn read_lob(&self, kind: LobKind, locator: i32) -> Result<Value> {
        let stmt = match self.cli.alloc_statement(self.dbc) {
            SqlResult::Success(h) | SqlResult::SuccessWithInfo(h) => h,
            _ => return Err(Error::from_handle(self.cli.as_ref(), self.dbc.into())),
        };
        let result = self.read_lob_on(stmt, kind, locator);
        let _ = self.cli.free_statement(stmt);
        result
    }

    /// Close the cursor, releasing the statement handle and every owned
    /// buffer. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        let mut outcome = Ok(());
        if let Some(stmt) = self.stmt.take() {
            debug!(handle = stmt.as_raw(), "closing cursor");
            outcome = self.reset_cursor(stmt);
            if !self.cli.free_statement(stmt).is_success() && outcome.is_ok() {
                outcome = Err(Error::from_handle(self.cli.as_ref(), stmt.into()));
            }
        }
        self.params.clear();
        self.columns.clear();
        self.last_statement = None;
        self.param_count = 0;
        outcome
    }

    // Attributes.

    /// Column descriptors of the current result set; empty when the last
    /// statement produced none.
    pub fn description(&self) -> &Description {
        &self.description
    }

    /// Affected-row count of the last execution; −1 before any execution
    /// and for statements where the count is not meaningful.
    pub fn rowcount(&self) -> i64 {
        self.row_count
    }

    /// Warnings accumulated since the last `execute`/`callproc`.
    pub fn messages(&self) -> &[Warning] {
        &self.messages
    }

    pub fn is_closed(&self) -> bool {
        self.stmt.is_none()
    }

    /// Apply a query timeout in seconds (0 disables it) and return the
    /// effective value. A timeout the engine rejects leaves the previous
    /// value in place; this call never fails.
    pub fn set_timeout(&mut self, seconds: u32) -> u32 {
        if let Some(stmt) = self.stmt {
            if self.cli.set_query_timeout(stmt, seconds).is_success() {
                self.timeout = seconds;
            }
        }
        self.timeout
    }

    pub fn timeout(&self) -> u32 {
        self.timeout
    }

    /// Request a scrollable or forward-only cursor. Takes effect at the
    /// next execution.
    pub fn set_scrollable(&mut self, scrollable: bool) -> bool {
        self.scrollable = scrollable;
        self.scrollable
    }

    pub fn scrollable(&self) -> bool {
        self.scrollable
    }

    /// When on, fetched locator values are resolved through
    /// [`Cursor::read_lob`] and replaced by their payloads.
    pub fn set_auto_read_lobs(&mut self, on: bool) -> bool {
        self.auto_read_lobs = on;
        self.auto_read_lobs
    }

    pub fn auto_read_lobs(&self) -> bool {
        self.auto_read_lobs
    }

    // Execution internals.

    fn stmt(&self) -> Result<StmtHandle> {
        self.stmt
            .ok_or_else(|| Error::interface("cursor is closed"))
    }

    /// Reset statement state before a new execution: drop parameter and
    /// column registrations, close any open cursor, re-apply the
    /// scrollability choice. Only an invalid handle is fatal here.
    fn reset_cursor(&mut self, stmt: StmtHandle) -> Result<()> {
        if matches!(
            self.cli.free_stmt(stmt, FreeStmtOption::ResetParams),
            SqlResult::InvalidHandle
        ) {
            return Err(Error::from_handle(self.cli.as_ref(), stmt.into()));
        }
        let _ = self.cli.free_stmt(stmt, FreeStmtOption::Unbind);
        let _ = self.cli.free_stmt(stmt, FreeStmtOption::Close);
        let _ = self.cli.set_scrollable(stmt, self.scrollable);
        Ok(())
    }

    /// Run the native execute, feeding data-at-execution parameters until
    /// the engine stops asking.
    fn run_execution(&mut self, stmt: StmtHandle) -> Result<()> {
        let mut rc = unsafe { self.cli.execute(stmt) };
        trace!(rc = rc.return_code(), "executed statement");
        if matches!(rc, SqlResult::NeedData) {
            rc = self.pump_streams(stmt)?;
        }
        match rc {
            SqlResult::Success(()) => Ok(()),
            SqlResult::SuccessWithInfo(()) | SqlResult::NoData => {
                self.push_message(stmt);
                Ok(())
            }
            _ => Err(Error::from_handle(self.cli.as_ref(), stmt.into())),
        }
    }

    /// The need-data loop: ask the engine which parameter it wants next,
    /// stream that source in fixed-size chunks, repeat until completion.
    fn pump_streams(&mut self, stmt: StmtHandle) -> Result<SqlResult<()>> {
        loop {
            let mut token = 0usize;
            match self.cli.param_data(stmt, &mut token) {
                SqlResult::Success(()) => return Ok(SqlResult::Success(())),
                SqlResult::NeedData => self.send_stream(stmt, token)?,
                SqlResult::SuccessWithInfo(()) => self.push_message(stmt),
                _ => return Err(Error::from_handle(self.cli.as_ref(), stmt.into())),
            }
        }
    }

    fn send_stream(&mut self, stmt: StmtHandle, token: usize) -> Result<()> {
        let binding = self
            .params
            .iter_mut()
            .find(|b| b.position() as usize == token)
            .ok_or_else(|| {
                Error::internal(format!("need-data token {token} matches no bound parameter"))
            })?;
        let mut source = binding
            .take_stream()
            .ok_or_else(|| Error::internal(format!("parameter #{token} has no streaming source")))?;
        let mut chunk = [0u8; PUT_DATA_CHUNK];
        let mut total = 0usize;
        loop {
            let n = source
                .read(&mut chunk)
                .map_err(|e| Error::interface(format!("LOB stream read failed: {e}")))?;
            if n == 0 {
                break;
            }
            if !self.cli.put_data(stmt, &chunk[..n]).is_success() {
                return Err(Error::from_handle(self.cli.as_ref(), stmt.into()));
            }
            total += n;
        }
        trace!(parameter = token, bytes = total, "streamed parameter payload");
        Ok(())
    }

    /// Post-execution bookkeeping shared by `execute` and `callproc`:
    /// record the row count, invalidate fetch buffers, describe the result
    /// columns.
    fn finish_execution(&mut self, stmt: StmtHandle) -> Result<Option<i64>> {
        self.row_count = match self.cli.row_count(stmt) {
            SqlResult::Success(n) | SqlResult::SuccessWithInfo(n) => n,
            _ => return Err(Error::from_handle(self.cli.as_ref(), stmt.into())),
        };
        self.needs_rebind = true;
        self.description = Arc::new(describe_columns(self.cli.as_ref(), stmt)?);
        trace!(
            row_count = self.row_count,
            columns = self.description.len(),
            "execution finished"
        );
        if self.row_count == -1 {
            Ok(None)
        } else {
            Ok(Some(self.row_count))
        }
    }

    fn effective_orientation(&self, orientation: FetchOrientation) -> FetchOrientation {
        if self.scrollable {
            orientation
        } else {
            FetchOrientation::Next
        }
    }

    /// Rebuild column buffers when the shape or batch size changed, then
    /// re-apply the four array-fetch attributes. The attributes are
    /// re-applied before every native fetch because rebinding invalidates
    /// them.
    fn prepare_rowset(&mut self, stmt: StmtHandle, batch: usize) -> Result<()> {
        if self.needs_rebind || self.last_batch != batch {
            // Release the native registrations before the buffers they
            // point into are dropped.
            let _ = self.cli.free_stmt(stmt, FreeStmtOption::Unbind);
            self.columns.clear();
            self.columns = bind_for_fetch(self.cli.as_ref(), stmt, &self.description, batch)?;
            self.row_status = vec![0u16; batch];
            self.needs_rebind = false;
            self.last_batch = batch;
        }
        self.check(stmt, self.cli.set_row_array_size(stmt, batch))?;
        self.check(stmt, self.cli.set_row_bind_type(stmt, 0))?;
        let fetched_ptr: *mut u64 = &mut *self.fetched_rows;
        self.check(stmt, unsafe {
            self.cli.set_rows_fetched_ptr(stmt, fetched_ptr)
        })?;
        let status_ptr = self.row_status.as_mut_ptr();
        self.check(stmt, unsafe { self.cli.set_row_status_ptr(stmt, status_ptr) })?;
        Ok(())
    }

    /// Single-row fetch: decodes slot 0 directly, without consulting the
    /// row-status array.
    fn fetch_single(&mut self, orientation: FetchOrientation, offset: i64) -> Result<Option<Row>> {
        let stmt = self.stmt()?;
        let orientation = self.effective_orientation(orientation);
        self.prepare_rowset(stmt, 1)?;
        match unsafe { self.cli.fetch_scroll(stmt, orientation, offset) } {
            r if r.is_success() => {
                let mut values = decode_row(&self.columns, 0)?;
                self.resolve_lobs(&mut values)?;
                Ok(Some(Row::new(values, Arc::clone(&self.description))))
            }
            SqlResult::NoData => Ok(None),
            _ => Err(Error::from_handle(self.cli.as_ref(), stmt.into())),
        }
    }

    fn fetch_block(
        &mut self,
        count: usize,
        orientation: FetchOrientation,
        offset: i64,
    ) -> Result<Vec<Row>> {
        let stmt = self.stmt()?;
        let batch = count.max(1);
        let orientation = self.effective_orientation(orientation);
        self.prepare_rowset(stmt, batch)?;
        match unsafe { self.cli.fetch_scroll(stmt, orientation, offset) } {
            r if r.is_success() => self.collect_rowset(),
            SqlResult::NoData => Ok(Vec::new()),
            _ => Err(Error::from_handle(self.cli.as_ref(), stmt.into())),
        }
    }

    /// Decode every row the engine reported fetched, skipping "no row"
    /// slots and failing on per-row error statuses.
    fn collect_rowset(&mut self) -> Result<Vec<Row>> {
        let fetched = (*self.fetched_rows as usize).min(self.row_status.len());
        let mut rows = Vec::with_capacity(fetched);
        for i in 0..fetched {
            match self.row_status[i] {
                SQL_ROW_ERROR => {
                    return Err(Error::internal(format!(
                        "row {} of the fetched block reported an error status",
                        i + 1
                    )))
                }
                SQL_ROW_NOROW => continue,
                _ => {}
            }
            let mut values = decode_row(&self.columns, i)?;
            self.resolve_lobs(&mut values)?;
            rows.push(Row::new(values, Arc::clone(&self.description)));
        }
        Ok(rows)
    }

    fn resolve_lobs(&self, values: &mut [Value]) -> Result<()> {
        if !self.auto_read_lobs {
            return Ok(());
        }
        for value in values.iter_mut() {
            if let Value::Lob { kind, locator } = *value {
                *value = self.read_lob(kind, locator)?;
            }
        }
        Ok(())
    }

    /// Discover a procedure's formal parameters through the catalog, on a
    /// temporary statement handle.
    fn procedure_formals(&self, procedure: &str) -> Result<Vec<ProcColumnDesc>> {
        let stmt = match self.cli.alloc_statement(self.dbc) {
            SqlResult::Success(h) | SqlResult::SuccessWithInfo(h) => h,
            _ => return Err(Error::from_handle(self.cli.as_ref(), self.dbc.into())),
        };
        let mut formals = Vec::new();
        let outcome = if self
            .cli
            .procedure_columns(stmt, procedure, &mut formals)
            .is_success()
        {
            Ok(())
        } else {
            Err(Error::from_handle(self.cli.as_ref(), stmt.into()))
        };
        let _ = self.cli.free_statement(stmt);
        outcome?;
        formals.sort_by_key(|f| f.ordinal);
        debug!(procedure, formals = formals.len(), "described procedure");
        Ok(formals)
    }

    fn read_lob_on(&self, stmt: StmtHandle, kind: LobKind, locator: i32) -> Result<Value> {
        let locator_type = kind.locator_type();
        let length = match self.cli.lob_length(stmt, locator_type, locator) {
            SqlResult::Success(n) | SqlResult::SuccessWithInfo(n) => n.max(0) as usize,
            _ => return Err(Error::from_handle(self.cli.as_ref(), stmt.into())),
        };
        let mut payload = vec![0u8; length];
        if length > 0 {
            let read = match self.cli.lob_read(stmt, locator_type, locator, 1, &mut payload) {
                SqlResult::Success(n) | SqlResult::SuccessWithInfo(n) => n.max(0) as usize,
                _ => return Err(Error::from_handle(self.cli.as_ref(), stmt.into())),
            };
            payload.truncate(read.min(length));
        }
        trace!(locator, bytes = payload.len(), "materialized large object");
        Ok(match kind {
            LobKind::Blob => Value::Bytes(payload),
            LobKind::Clob => Value::Str(String::from_utf8_lossy(&payload).into_owned()),
            LobKind::DbClob => {
                let units: Vec<u16> = payload
                    .chunks_exact(2)
                    .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
                    .collect();
                Value::Str(String::from_utf16_lossy(&units))
            }
        })
    }

    fn push_message(&mut self, stmt: StmtHandle) {
        let diag = fetch_diag(self.cli.as_ref(), stmt.into());
        trace!(state = %diag.state, native_code = diag.native_code, "statement warning");
        self.messages.push(Warning::new(diag));
    }

    fn check(&self, stmt: StmtHandle, rc: SqlResult<()>) -> Result<()> {
        if rc.is_success() {
            Ok(())
        } else {
            Err(Error::from_handle(self.cli.as_ref(), stmt.into()))
        }
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Synthesize the `CALL` text for a procedure with `count` parameters.
fn build_call_text(procedure: &str, count: usize) -> String {
    if count == 0 {
        return format!("CALL {procedure} ()");
    }
    let markers = vec!["?"; count].join(",");
    format!("CALL {procedure} ( {markers})")
}
