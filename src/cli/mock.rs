//! Scripted in-memory CLI backend.
//!
//! `MockCli` plays the native library for tests: statements are keyed by
//! their SQL text and answer from a [`StatementScript`]. The mock honors
//! the same buffer contract as the real library, reading parameter buffers
//! and writing column buffers through the registered raw pointers, so the
//! binder layers are exercised end to end. Every native call is recorded
//! as a [`CliCall`] for ordering assertions.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use super::constants::{
    SqlLen, SQL_DATA_AT_EXEC, SQL_DESC_DISPLAY_SIZE, SQL_DESC_LENGTH, SQL_NULLABLE,
    SQL_NULL_DATA, SQL_ROW_SUCCESS,
};
use super::structs::{
    ColumnDesc, DateStruct, ParamDesc, ProcColumnDesc, TimeStruct, TimestampStruct,
};
use super::{
    AnyHandle, Cli, Completion, ConnHandle, EnvHandle, FetchOrientation, FreeStmtOption,
    InfoType, ParamDirection, SqlResult, StmtHandle,
};
use crate::error::DiagRecord;

/// One recorded native call, in invocation order.
#[derive(Debug, Clone, PartialEq)]
pub enum CliCall {
    AllocEnv,
    AllocConnection,
    AllocStatement,
    FreeEnv,
    FreeConnection,
    FreeStatement,
    FreeStmt(FreeStmtOption),
    Connect { dsn: String, uid: String },
    Disconnect,
    SetAutocommit(bool),
    EndTran(Completion),
    Prepare(String),
    NumParams,
    DescribeParam(u16),
    BindParameter { position: u16, c_type: i16, sql_type: i16 },
    Execute,
    ParamData,
    PutData(usize),
    NumResultCols,
    DescribeCol(u16),
    ColAttribute { column: u16, attr: u16 },
    BindCol { column: u16, c_type: i16 },
    SetRowArraySize(usize),
    SetRowBindType(usize),
    SetRowsFetchedPtr,
    SetRowStatusPtr,
    SetScrollable(bool),
    SetQueryTimeout(u32),
    FetchScroll { orientation: FetchOrientation, offset: i64 },
    RowCount,
    ProcedureColumns(String),
    LobLength { locator: i32 },
    LobRead { locator: i32, start: i64 },
}

/// Raw cell content a scripted row places into a bound column buffer.
#[derive(Debug, Clone)]
pub struct MockCell {
    pub bytes: Vec<u8>,
    pub indicator: SqlLen,
}

impl MockCell {
    pub fn null() -> Self {
        Self { bytes: Vec::new(), indicator: SQL_NULL_DATA }
    }

    pub fn text(s: &str) -> Self {
        Self { bytes: s.as_bytes().to_vec(), indicator: s.len() as SqlLen }
    }

    /// Double-byte text, one 16-bit unit per character. The indicator
    /// carries the unit count, the way the engine reports graphic data.
    pub fn dbtext(s: &str) -> Self {
        let units: Vec<u16> = s.encode_utf16().collect();
        let bytes: Vec<u8> = units.iter().flat_map(|u| u.to_ne_bytes()).collect();
        Self { bytes, indicator: units.len() as SqlLen }
    }

    pub fn binary(data: &[u8]) -> Self {
        Self { bytes: data.to_vec(), indicator: data.len() as SqlLen }
    }

    pub fn small(n: i16) -> Self {
        Self { bytes: n.to_ne_bytes().to_vec(), indicator: 2 }
    }

    pub fn int(n: i32) -> Self {
        Self { bytes: n.to_ne_bytes().to_vec(), indicator: 4 }
    }

    /// BIGINT columns travel as text.
    pub fn big(n: i64) -> Self {
        Self::text(&n.to_string())
    }

    pub fn real(x: f32) -> Self {
        Self { bytes: x.to_ne_bytes().to_vec(), indicator: 4 }
    }

    pub fn double(x: f64) -> Self {
        Self { bytes: x.to_ne_bytes().to_vec(), indicator: 8 }
    }

    pub fn date(year: i16, month: u16, day: u16) -> Self {
        let s = DateStruct { year, month, day };
        Self { bytes: s.to_bytes().to_vec(), indicator: 6 }
    }

    pub fn time(hour: u16, minute: u16, second: u16) -> Self {
        let s = TimeStruct { hour, minute, second };
        Self { bytes: s.to_bytes().to_vec(), indicator: 6 }
    }

    pub fn timestamp(
        year: i16,
        month: u16,
        day: u16,
        hour: u16,
        minute: u16,
        second: u16,
        fraction: u32,
    ) -> Self {
        let s = TimestampStruct { year, month, day, hour, minute, second, fraction };
        Self { bytes: s.to_bytes().to_vec(), indicator: 16 }
    }

    pub fn locator(locator: i32) -> Self {
        Self { bytes: locator.to_ne_bytes().to_vec(), indicator: 4 }
    }
}

/// One scripted result row.
#[derive(Debug, Clone)]
pub struct MockRow {
    pub cells: Vec<MockCell>,
    pub status: u16,
}

impl MockRow {
    pub fn new(cells: Vec<MockCell>) -> Self {
        Self { cells, status: SQL_ROW_SUCCESS }
    }

    pub fn with_status(cells: Vec<MockCell>, status: u16) -> Self {
        Self { cells, status }
    }
}

/// One scripted result column.
#[derive(Debug, Clone)]
pub struct MockColumn {
    pub desc: ColumnDesc,
    pub display_size: i64,
    pub internal_size: i64,
}

impl MockColumn {
    pub fn new(name: &str, sql_type: i16, column_size: u32, decimal_digits: i16) -> Self {
        Self {
            desc: ColumnDesc {
                name: name.to_string(),
                sql_type,
                column_size,
                decimal_digits,
                nullable: SQL_NULLABLE,
            },
            display_size: column_size as i64,
            internal_size: column_size as i64,
        }
    }

    pub fn with_nullable(mut self, nullable: i16) -> Self {
        self.desc.nullable = nullable;
        self
    }

    pub fn with_sizes(mut self, display_size: i64, internal_size: i64) -> Self {
        self.display_size = display_size;
        self.internal_size = internal_size;
        self
    }
}

/// How a scripted execute resolves.
#[derive(Debug, Clone, Default)]
pub enum MockOutcome {
    #[default]
    Success,
    /// Success-with-info carrying the given diagnostic.
    WithInfo(DiagRecord),
    /// No-data completion (e.g. an update that matched nothing).
    NoData(DiagRecord),
    Fail(DiagRecord),
}

/// Everything the mock knows about one statement text.
#[derive(Debug, Clone)]
pub struct StatementScript {
    /// Parameter-marker descriptions, in positional order.
    pub params: Vec<ParamDesc>,
    pub columns: Vec<MockColumn>,
    pub rows: Vec<MockRow>,
    /// Native row count after execution; −1 marks a result-set statement.
    pub row_count: i64,
    /// Values written back into OUT / INOUT parameter buffers.
    pub outputs: Vec<(u16, MockCell)>,
    pub execute: MockOutcome,
    /// Diagnostic surfaced once as success-with-info during the need-data
    /// loop, after the first stream completes.
    pub pump_info: Option<DiagRecord>,
}

impl Default for StatementScript {
    fn default() -> Self {
        Self {
            params: Vec::new(),
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: -1,
            outputs: Vec::new(),
            execute: MockOutcome::Success,
            pump_info: None,
        }
    }
}

/// Snapshot of one bound parameter taken when an execution finishes.
#[derive(Debug, Clone)]
pub struct CapturedParam {
    pub position: u16,
    pub direction: ParamDirection,
    pub c_type: i16,
    pub sql_type: i16,
    /// Input buffer contents, or the re-assembled streamed payload.
    pub bytes: Vec<u8>,
    pub indicator: SqlLen,
    pub streamed: bool,
}

/// Convenience constructor for a procedure formal parameter.
pub fn formal(
    name: &str,
    direction: i16,
    sql_type: i16,
    column_size: u32,
    decimal_digits: i16,
    ordinal: i32,
) -> ProcColumnDesc {
    ProcColumnDesc {
        name: name.to_string(),
        direction,
        sql_type,
        column_size,
        decimal_digits,
        nullable: SQL_NULLABLE,
        ordinal,
    }
}

struct ParamSlot {
    position: u16,
    direction: ParamDirection,
    c_type: i16,
    sql_type: i16,
    buffer: usize,
    buffer_len: SqlLen,
    indicator: usize,
}

struct ColSlot {
    column: u16,
    buffer: usize,
    buffer_len: SqlLen,
    indicators: usize,
}

#[derive(Default)]
struct StmtState {
    dbc: usize,
    script: Option<String>,
    params: Vec<ParamSlot>,
    cols: Vec<ColSlot>,
    /// Index of the next unread scripted row.
    pos: usize,
    /// Start of the most recently fetched rowset.
    rowset_start: Option<usize>,
    array_size: usize,
    fetched_ptr: Option<usize>,
    status_ptr: Option<usize>,
    pending: VecDeque<u16>,
    current_stream: Option<u16>,
    stream_chunks: Vec<u8>,
    streamed: HashMap<u16, Vec<u8>>,
    pump_info_delivered: bool,
}

#[derive(Default)]
struct State {
    next_handle: usize,
    envs: Vec<usize>,
    dbcs: HashMap<usize, usize>,
    stmts: HashMap<usize, StmtState>,
    scripts: HashMap<String, StatementScript>,
    procedures: HashMap<String, Vec<ProcColumnDesc>>,
    lobs: HashMap<i32, Vec<u8>>,
    info: HashMap<u16, String>,
    supports_info: bool,
    fail_connect: Option<DiagRecord>,
    fail_end_tran: Option<DiagRecord>,
    reject_timeout: bool,
    calls: Vec<CliCall>,
    diags: HashMap<(i16, usize), DiagRecord>,
    captured: Vec<CapturedParam>,
}

/// The scripted backend. Interior-mutable; not thread-safe, like a real
/// connection handle.
pub struct MockCli {
    state: RefCell<State>,
}

impl Default for MockCli {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCli {
    pub fn new() -> Self {
        let state = State {
            next_handle: 1,
            supports_info: true,
            ..State::default()
        };
        MockCli { state: RefCell::new(state) }
    }

    // Scripting surface.

    pub fn add_script(&self, sql: &str, script: StatementScript) {
        self.state
            .borrow_mut()
            .scripts
            .insert(sql.to_string(), script);
    }

    pub fn add_procedure(&self, name: &str, formals: Vec<ProcColumnDesc>) {
        self.state
            .borrow_mut()
            .procedures
            .insert(name.to_string(), formals);
    }

    pub fn add_lob(&self, locator: i32, payload: Vec<u8>) {
        self.state.borrow_mut().lobs.insert(locator, payload);
    }

    pub fn set_info_string(&self, info: InfoType, value: &str) {
        self.state
            .borrow_mut()
            .info
            .insert(info.code(), value.to_string());
    }

    pub fn set_supports_get_info(&self, supported: bool) {
        self.state.borrow_mut().supports_info = supported;
    }

    pub fn fail_next_connect(&self, diag: DiagRecord) {
        self.state.borrow_mut().fail_connect = Some(diag);
    }

    pub fn fail_next_end_tran(&self, diag: DiagRecord) {
        self.state.borrow_mut().fail_end_tran = Some(diag);
    }

    pub fn reject_query_timeout(&self, reject: bool) {
        self.state.borrow_mut().reject_timeout = reject;
    }

    // Inspection surface.

    pub fn calls(&self) -> Vec<CliCall> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Parameter snapshots from the most recently finished execution.
    pub fn captured_params(&self) -> Vec<CapturedParam> {
        self.state.borrow().captured.clone()
    }

    // Internals.

    fn record(&self, call: CliCall) {
        self.state.borrow_mut().calls.push(call);
    }

    fn stash(&self, handle: (i16, usize), diag: DiagRecord) {
        self.state.borrow_mut().diags.insert(handle, diag);
    }

    /// Take the captured value of every bound parameter and resolve the
    /// scripted outcome. Runs when an execution completes, either directly
    /// or at the end of the need-data loop.
    fn finalize_execution(&self, stmt: StmtHandle) -> SqlResult<()> {
        let (outcome, diag) = {
            let mut state = self.state.borrow_mut();
            let raw = stmt.as_raw();
            let script = {
                let Some(st) = state.stmts.get(&raw) else {
                    return SqlResult::InvalidHandle;
                };
                st.script
                    .as_ref()
                    .and_then(|key| state.scripts.get(key).cloned())
                    .unwrap_or_default()
            };
            let Some(st) = state.stmts.get_mut(&raw) else {
                return SqlResult::InvalidHandle;
            };

            let mut captured = Vec::with_capacity(st.params.len());
            for slot in &st.params {
                let indicator = unsafe { read_indicator(slot) };
                let (bytes, streamed) = if let Some(payload) = st.streamed.get(&slot.position) {
                    (payload.clone(), true)
                } else if indicator == SQL_NULL_DATA {
                    (Vec::new(), false)
                } else {
                    (unsafe { read_buffer(slot, indicator.max(0) as usize) }, false)
                };
                captured.push(CapturedParam {
                    position: slot.position,
                    direction: slot.direction,
                    c_type: slot.c_type,
                    sql_type: slot.sql_type,
                    bytes,
                    indicator,
                    streamed,
                });
            }

            for (position, cell) in &script.outputs {
                if let Some(slot) = st.params.iter().find(|s| s.position == *position) {
                    unsafe { write_output(slot, cell) };
                }
            }

            st.pos = 0;
            st.rowset_start = None;
            state.captured = captured;

            match script.execute {
                MockOutcome::Success => (SqlResult::Success(()), None),
                MockOutcome::WithInfo(d) => (SqlResult::SuccessWithInfo(()), Some(d)),
                MockOutcome::NoData(d) => (SqlResult::NoData, Some(d)),
                MockOutcome::Fail(d) => (SqlResult::Error, Some(d)),
            }
        };
        if let Some(d) = diag {
            self.stash(stmt_key(stmt), d);
        }
        outcome
    }
}

fn handle_key(handle: AnyHandle) -> (i16, usize) {
    let raw = match handle {
        AnyHandle::Env(h) => h.as_raw(),
        AnyHandle::Conn(h) => h.as_raw(),
        AnyHandle::Stmt(h) => h.as_raw(),
    };
    (handle.kind_code(), raw)
}

fn stmt_key(stmt: StmtHandle) -> (i16, usize) {
    handle_key(AnyHandle::Stmt(stmt))
}

/// Copy `cell` into slot `idx` of a bound column buffer.
unsafe fn write_cell(slot: &ColSlot, idx: usize, cell: &MockCell) {
    let len = slot.buffer_len.max(0) as usize;
    let dst = (slot.buffer as *mut u8).add(idx * len);
    std::ptr::write_bytes(dst, 0, len);
    let n = cell.bytes.len().min(len);
    std::ptr::copy_nonoverlapping(cell.bytes.as_ptr(), dst, n);
    let ind = (slot.indicators as *mut SqlLen).add(idx);
    *ind = cell.indicator;
}

/// Copy an output `cell` back into a bound parameter buffer.
unsafe fn write_output(slot: &ParamSlot, cell: &MockCell) {
    let len = slot.buffer_len.max(0) as usize;
    if len > 0 {
        let dst = slot.buffer as *mut u8;
        std::ptr::write_bytes(dst, 0, len);
        let n = cell.bytes.len().min(len);
        std::ptr::copy_nonoverlapping(cell.bytes.as_ptr(), dst, n);
    }
    *(slot.indicator as *mut SqlLen) = cell.indicator;
}

unsafe fn read_indicator(slot: &ParamSlot) -> SqlLen {
    *(slot.indicator as *const SqlLen)
}

unsafe fn read_buffer(slot: &ParamSlot, len: usize) -> Vec<u8> {
    let capped = len.min(slot.buffer_len.max(0) as usize);
    std::slice::from_raw_parts(slot.buffer as *const u8, capped).to_vec()
}

/// The data-at-execution token stored in a streamed parameter's buffer.
/// The buffer is plain bytes, so the read must not assume alignment.
unsafe fn read_token(slot: &ParamSlot) -> usize {
    std::ptr::read_unaligned(slot.buffer as *const usize)
}

impl Cli for MockCli {
    fn alloc_env(&self) -> SqlResult<EnvHandle> {
        self.record(CliCall::AllocEnv);
        let mut state = self.state.borrow_mut();
        let raw = state.next_handle;
        state.next_handle += 1;
        state.envs.push(raw);
        SqlResult::Success(EnvHandle::from_raw(raw))
    }

    fn alloc_connection(&self, env: EnvHandle) -> SqlResult<ConnHandle> {
        self.record(CliCall::AllocConnection);
        let mut state = self.state.borrow_mut();
        if !state.envs.contains(&env.as_raw()) {
            return SqlResult::InvalidHandle;
        }
        let raw = state.next_handle;
        state.next_handle += 1;
        state.dbcs.insert(raw, env.as_raw());
        SqlResult::Success(ConnHandle::from_raw(raw))
    }

    fn alloc_statement(&self, dbc: ConnHandle) -> SqlResult<StmtHandle> {
        self.record(CliCall::AllocStatement);
        let mut state = self.state.borrow_mut();
        if !state.dbcs.contains_key(&dbc.as_raw()) {
            return SqlResult::InvalidHandle;
        }
        let raw = state.next_handle;
        state.next_handle += 1;
        state.stmts.insert(
            raw,
            StmtState {
                dbc: dbc.as_raw(),
                array_size: 1,
                ..StmtState::default()
            },
        );
        SqlResult::Success(StmtHandle::from_raw(raw))
    }

    fn free_env(&self, env: EnvHandle) -> SqlResult<()> {
        self.record(CliCall::FreeEnv);
        let live_dbc = {
            let state = self.state.borrow();
            if !state.envs.contains(&env.as_raw()) {
                return SqlResult::InvalidHandle;
            }
            state.dbcs.values().any(|&e| e == env.as_raw())
        };
        if live_dbc {
            self.stash(
                handle_key(env.into()),
                DiagRecord::new("HY010", -99999, "Function sequence error"),
            );
            return SqlResult::Error;
        }
        self.state.borrow_mut().envs.retain(|&e| e != env.as_raw());
        SqlResult::Success(())
    }

    fn free_connection(&self, dbc: ConnHandle) -> SqlResult<()> {
        self.record(CliCall::FreeConnection);
        let live_stmt = {
            let state = self.state.borrow();
            if !state.dbcs.contains_key(&dbc.as_raw()) {
                return SqlResult::InvalidHandle;
            }
            state.stmts.values().any(|s| s.dbc == dbc.as_raw())
        };
        if live_stmt {
            self.stash(
                handle_key(dbc.into()),
                DiagRecord::new("HY010", -99999, "Function sequence error"),
            );
            return SqlResult::Error;
        }
        self.state.borrow_mut().dbcs.remove(&dbc.as_raw());
        SqlResult::Success(())
    }

    fn free_statement(&self, stmt: StmtHandle) -> SqlResult<()> {
        self.record(CliCall::FreeStatement);
        let mut state = self.state.borrow_mut();
        if state.stmts.remove(&stmt.as_raw()).is_none() {
            return SqlResult::InvalidHandle;
        }
        SqlResult::Success(())
    }

    fn free_stmt(&self, stmt: StmtHandle, option: FreeStmtOption) -> SqlResult<()> {
        self.record(CliCall::FreeStmt(option));
        let mut state = self.state.borrow_mut();
        let Some(st) = state.stmts.get_mut(&stmt.as_raw()) else {
            return SqlResult::InvalidHandle;
        };
        match option {
            FreeStmtOption::Close => {
                st.pos = 0;
                st.rowset_start = None;
            }
            FreeStmtOption::Unbind => st.cols.clear(),
            FreeStmtOption::ResetParams => {
                st.params.clear();
                st.pending.clear();
                st.current_stream = None;
                st.stream_chunks.clear();
                st.streamed.clear();
            }
        }
        SqlResult::Success(())
    }

    fn connect(&self, dbc: ConnHandle, dsn: &str, uid: &str, _pwd: &str) -> SqlResult<()> {
        self.record(CliCall::Connect {
            dsn: dsn.to_string(),
            uid: uid.to_string(),
        });
        let diag = self.state.borrow_mut().fail_connect.take();
        if let Some(diag) = diag {
            self.stash(handle_key(dbc.into()), diag);
            return SqlResult::Error;
        }
        SqlResult::Success(())
    }

    fn disconnect(&self, _dbc: ConnHandle) -> SqlResult<()> {
        self.record(CliCall::Disconnect);
        SqlResult::Success(())
    }

    fn set_autocommit(&self, _dbc: ConnHandle, on: bool) -> SqlResult<()> {
        self.record(CliCall::SetAutocommit(on));
        SqlResult::Success(())
    }

    fn end_tran(&self, dbc: ConnHandle, completion: Completion) -> SqlResult<()> {
        self.record(CliCall::EndTran(completion));
        let diag = self.state.borrow_mut().fail_end_tran.take();
        if let Some(diag) = diag {
            self.stash(handle_key(dbc.into()), diag);
            return SqlResult::Error;
        }
        SqlResult::Success(())
    }

    fn supports_get_info(&self, _dbc: ConnHandle) -> bool {
        self.state.borrow().supports_info
    }

    fn get_info(&self, _dbc: ConnHandle, info: InfoType, value: &mut String) -> SqlResult<()> {
        let state = self.state.borrow();
        match state.info.get(&info.code()) {
            Some(s) => {
                *value = s.clone();
                SqlResult::Success(())
            }
            None => SqlResult::NoData,
        }
    }

    fn prepare(&self, stmt: StmtHandle, sql: &str) -> SqlResult<()> {
        self.record(CliCall::Prepare(sql.to_string()));
        let known = self.state.borrow().scripts.contains_key(sql);
        if !known {
            self.stash(
                stmt_key(stmt),
                DiagRecord::new("42601", -104, "unexpected statement text"),
            );
            return SqlResult::Error;
        }
        let mut state = self.state.borrow_mut();
        let Some(st) = state.stmts.get_mut(&stmt.as_raw()) else {
            return SqlResult::InvalidHandle;
        };
        st.script = Some(sql.to_string());
        st.pos = 0;
        st.rowset_start = None;
        st.pending.clear();
        st.current_stream = None;
        st.stream_chunks.clear();
        st.streamed.clear();
        st.pump_info_delivered = false;
        SqlResult::Success(())
    }

    fn num_params(&self, stmt: StmtHandle) -> SqlResult<u16> {
        self.record(CliCall::NumParams);
        let state = self.state.borrow();
        let Some(st) = state.stmts.get(&stmt.as_raw()) else {
            return SqlResult::InvalidHandle;
        };
        let count = st
            .script
            .as_ref()
            .and_then(|key| state.scripts.get(key))
            .map(|s| s.params.len())
            .unwrap_or(0);
        SqlResult::Success(count as u16)
    }

    fn describe_param(&self, stmt: StmtHandle, position: u16) -> SqlResult<ParamDesc> {
        self.record(CliCall::DescribeParam(position));
        let desc = {
            let state = self.state.borrow();
            state
                .stmts
                .get(&stmt.as_raw())
                .and_then(|st| st.script.as_ref())
                .and_then(|key| state.scripts.get(key))
                .and_then(|s| s.params.get(position as usize - 1))
                .copied()
        };
        match desc {
            Some(desc) => SqlResult::Success(desc),
            None => {
                self.stash(
                    stmt_key(stmt),
                    DiagRecord::new("07009", -99999, "Invalid descriptor index"),
                );
                SqlResult::Error
            }
        }
    }

    unsafe fn bind_parameter(
        &self,
        stmt: StmtHandle,
        position: u16,
        direction: ParamDirection,
        c_type: i16,
        sql_type: i16,
        _column_size: u32,
        _decimal_digits: i16,
        buffer: *mut u8,
        buffer_len: SqlLen,
        indicator: *mut SqlLen,
    ) -> SqlResult<()> {
        self.record(CliCall::BindParameter { position, c_type, sql_type });
        let mut state = self.state.borrow_mut();
        let Some(st) = state.stmts.get_mut(&stmt.as_raw()) else {
            return SqlResult::InvalidHandle;
        };
        st.params.retain(|s| s.position != position);
        st.params.push(ParamSlot {
            position,
            direction,
            c_type,
            sql_type,
            buffer: buffer as usize,
            buffer_len,
            indicator: indicator as usize,
        });
        st.params.sort_by_key(|s| s.position);
        SqlResult::Success(())
    }

    unsafe fn execute(&self, stmt: StmtHandle) -> SqlResult<()> {
        self.record(CliCall::Execute);
        let prepared = {
            let state = self.state.borrow();
            match state.stmts.get(&stmt.as_raw()) {
                None => return SqlResult::InvalidHandle,
                Some(st) => st.script.is_some(),
            }
        };
        if !prepared {
            self.stash(
                stmt_key(stmt),
                DiagRecord::new("HY010", -99999, "Function sequence error"),
            );
            return SqlResult::Error;
        }
        let need_data = {
            let mut state = self.state.borrow_mut();
            let Some(st) = state.stmts.get_mut(&stmt.as_raw()) else {
                return SqlResult::InvalidHandle;
            };
            st.streamed.clear();
            st.current_stream = None;
            st.stream_chunks.clear();
            st.pump_info_delivered = false;
            let mut queue = VecDeque::new();
            for slot in &st.params {
                if unsafe { read_indicator(slot) } == SQL_DATA_AT_EXEC {
                    queue.push_back(slot.position);
                }
            }
            st.pending = queue;
            !st.pending.is_empty()
        };
        if need_data {
            SqlResult::NeedData
        } else {
            self.finalize_execution(stmt)
        }
    }

    fn param_data(&self, stmt: StmtHandle, token: &mut usize) -> SqlResult<()> {
        self.record(CliCall::ParamData);
        enum Step {
            Next(usize),
            Info(DiagRecord),
            Done,
            Unbound,
        }
        let step = {
            let mut state = self.state.borrow_mut();
            let raw = stmt.as_raw();
            let pump_info = {
                let Some(st) = state.stmts.get(&raw) else {
                    return SqlResult::InvalidHandle;
                };
                st.script
                    .as_ref()
                    .and_then(|key| state.scripts.get(key))
                    .and_then(|s| s.pump_info.clone())
            };
            let Some(st) = state.stmts.get_mut(&raw) else {
                return SqlResult::InvalidHandle;
            };
            let finished = match st.current_stream.take() {
                Some(position) => {
                    let payload = std::mem::take(&mut st.stream_chunks);
                    st.streamed.insert(position, payload);
                    true
                }
                None => false,
            };
            match (finished && !st.pump_info_delivered, pump_info) {
                (true, Some(diag)) => {
                    st.pump_info_delivered = true;
                    Step::Info(diag)
                }
                _ => match st.pending.pop_front() {
                    Some(next) => {
                        st.current_stream = Some(next);
                        match st.params.iter().find(|s| s.position == next) {
                            Some(slot) => Step::Next(unsafe { read_token(slot) }),
                            None => Step::Unbound,
                        }
                    }
                    None => Step::Done,
                },
            }
        };
        match step {
            Step::Next(t) => {
                *token = t;
                SqlResult::NeedData
            }
            Step::Info(diag) => {
                self.stash(stmt_key(stmt), diag);
                SqlResult::SuccessWithInfo(())
            }
            Step::Done => self.finalize_execution(stmt),
            Step::Unbound => SqlResult::Error,
        }
    }

    fn put_data(&self, stmt: StmtHandle, chunk: &[u8]) -> SqlResult<()> {
        self.record(CliCall::PutData(chunk.len()));
        let mut state = self.state.borrow_mut();
        let Some(st) = state.stmts.get_mut(&stmt.as_raw()) else {
            return SqlResult::InvalidHandle;
        };
        if st.current_stream.is_none() {
            return SqlResult::Error;
        }
        st.stream_chunks.extend_from_slice(chunk);
        SqlResult::Success(())
    }

    fn num_result_cols(&self, stmt: StmtHandle) -> SqlResult<u16> {
        self.record(CliCall::NumResultCols);
        let state = self.state.borrow();
        let Some(st) = state.stmts.get(&stmt.as_raw()) else {
            return SqlResult::InvalidHandle;
        };
        let count = st
            .script
            .as_ref()
            .and_then(|key| state.scripts.get(key))
            .map(|s| s.columns.len())
            .unwrap_or(0);
        SqlResult::Success(count as u16)
    }

    fn describe_col(&self, stmt: StmtHandle, column: u16, desc: &mut ColumnDesc) -> SqlResult<()> {
        self.record(CliCall::DescribeCol(column));
        let state = self.state.borrow();
        let col = state
            .stmts
            .get(&stmt.as_raw())
            .and_then(|st| st.script.as_ref())
            .and_then(|key| state.scripts.get(key))
            .and_then(|s| s.columns.get(column as usize - 1));
        match col {
            Some(col) => {
                *desc = col.desc.clone();
                SqlResult::Success(())
            }
            None => SqlResult::Error,
        }
    }

    fn col_attribute(&self, stmt: StmtHandle, column: u16, attr: u16) -> SqlResult<i64> {
        self.record(CliCall::ColAttribute { column, attr });
        let state = self.state.borrow();
        let col = state
            .stmts
            .get(&stmt.as_raw())
            .and_then(|st| st.script.as_ref())
            .and_then(|key| state.scripts.get(key))
            .and_then(|s| s.columns.get(column as usize - 1));
        match col {
            Some(col) if attr == SQL_DESC_DISPLAY_SIZE => SqlResult::Success(col.display_size),
            Some(col) if attr == SQL_DESC_LENGTH => SqlResult::Success(col.internal_size),
            Some(_) => SqlResult::Success(0),
            None => SqlResult::Error,
        }
    }

    unsafe fn bind_col(
        &self,
        stmt: StmtHandle,
        column: u16,
        c_type: i16,
        buffer: *mut u8,
        buffer_len: SqlLen,
        indicators: *mut SqlLen,
    ) -> SqlResult<()> {
        self.record(CliCall::BindCol { column, c_type });
        let mut state = self.state.borrow_mut();
        let Some(st) = state.stmts.get_mut(&stmt.as_raw()) else {
            return SqlResult::InvalidHandle;
        };
        st.cols.retain(|s| s.column != column);
        st.cols.push(ColSlot {
            column,
            buffer: buffer as usize,
            buffer_len,
            indicators: indicators as usize,
        });
        st.cols.sort_by_key(|s| s.column);
        SqlResult::Success(())
    }

    fn set_row_array_size(&self, stmt: StmtHandle, rows: usize) -> SqlResult<()> {
        self.record(CliCall::SetRowArraySize(rows));
        let mut state = self.state.borrow_mut();
        let Some(st) = state.stmts.get_mut(&stmt.as_raw()) else {
            return SqlResult::InvalidHandle;
        };
        st.array_size = rows.max(1);
        SqlResult::Success(())
    }

    fn set_row_bind_type(&self, stmt: StmtHandle, row_size: usize) -> SqlResult<()> {
        self.record(CliCall::SetRowBindType(row_size));
        if self.state.borrow().stmts.contains_key(&stmt.as_raw()) {
            SqlResult::Success(())
        } else {
            SqlResult::InvalidHandle
        }
    }

    unsafe fn set_rows_fetched_ptr(&self, stmt: StmtHandle, ptr: *mut u64) -> SqlResult<()> {
        self.record(CliCall::SetRowsFetchedPtr);
        let mut state = self.state.borrow_mut();
        let Some(st) = state.stmts.get_mut(&stmt.as_raw()) else {
            return SqlResult::InvalidHandle;
        };
        st.fetched_ptr = Some(ptr as usize);
        SqlResult::Success(())
    }

    unsafe fn set_row_status_ptr(&self, stmt: StmtHandle, ptr: *mut u16) -> SqlResult<()> {
        self.record(CliCall::SetRowStatusPtr);
        let mut state = self.state.borrow_mut();
        let Some(st) = state.stmts.get_mut(&stmt.as_raw()) else {
            return SqlResult::InvalidHandle;
        };
        st.status_ptr = Some(ptr as usize);
        SqlResult::Success(())
    }

    fn set_scrollable(&self, stmt: StmtHandle, scrollable: bool) -> SqlResult<()> {
        self.record(CliCall::SetScrollable(scrollable));
        if self.state.borrow().stmts.contains_key(&stmt.as_raw()) {
            SqlResult::Success(())
        } else {
            SqlResult::InvalidHandle
        }
    }

    fn set_query_timeout(&self, stmt: StmtHandle, seconds: u32) -> SqlResult<()> {
        self.record(CliCall::SetQueryTimeout(seconds));
        let reject = self.state.borrow().reject_timeout;
        if reject {
            self.stash(
                stmt_key(stmt),
                DiagRecord::new("HYC00", -99999, "Driver not capable"),
            );
            return SqlResult::Error;
        }
        SqlResult::Success(())
    }

    unsafe fn fetch_scroll(
        &self,
        stmt: StmtHandle,
        orientation: FetchOrientation,
        offset: i64,
    ) -> SqlResult<()> {
        self.record(CliCall::FetchScroll { orientation, offset });
        let mut state = self.state.borrow_mut();
        let script = {
            let Some(st) = state.stmts.get(&stmt.as_raw()) else {
                return SqlResult::InvalidHandle;
            };
            st.script
                .as_ref()
                .and_then(|key| state.scripts.get(key).cloned())
        };
        let Some(script) = script.filter(|s| !s.columns.is_empty()) else {
            drop(state);
            self.stash(
                stmt_key(stmt),
                DiagRecord::new("24000", -99999, "Invalid cursor state"),
            );
            return SqlResult::Error;
        };

        let Some(st) = state.stmts.get_mut(&stmt.as_raw()) else {
            return SqlResult::InvalidHandle;
        };
        let total = script.rows.len();
        let batch = st.array_size;
        let start = match orientation {
            FetchOrientation::Next => st.pos as i64,
            FetchOrientation::First => 0,
            FetchOrientation::Last => total.saturating_sub(batch) as i64,
            FetchOrientation::Prior => st
                .rowset_start
                .map(|s| s as i64 - batch as i64)
                .unwrap_or(-1),
            FetchOrientation::Absolute => offset - 1,
            FetchOrientation::Relative => {
                st.rowset_start.map(|s| s as i64).unwrap_or(0) + offset
            }
        };
        if start < 0 || start as usize >= total {
            if let Some(ptr) = st.fetched_ptr {
                unsafe { *(ptr as *mut u64) = 0 };
            }
            return SqlResult::NoData;
        }
        let start = start as usize;
        let n = batch.min(total - start);
        for (i, row) in script.rows[start..start + n].iter().enumerate() {
            if let Some(ptr) = st.status_ptr {
                unsafe { *(ptr as *mut u16).add(i) = row.status };
            }
            for slot in &st.cols {
                let cell = row
                    .cells
                    .get(slot.column as usize - 1)
                    .cloned()
                    .unwrap_or_else(MockCell::null);
                unsafe { write_cell(slot, i, &cell) };
            }
        }
        if let Some(ptr) = st.fetched_ptr {
            unsafe { *(ptr as *mut u64) = n as u64 };
        }
        st.rowset_start = Some(start);
        st.pos = start + n;
        SqlResult::Success(())
    }

    fn row_count(&self, stmt: StmtHandle) -> SqlResult<i64> {
        self.record(CliCall::RowCount);
        let state = self.state.borrow();
        let Some(st) = state.stmts.get(&stmt.as_raw()) else {
            return SqlResult::InvalidHandle;
        };
        let count = st
            .script
            .as_ref()
            .and_then(|key| state.scripts.get(key))
            .map(|s| s.row_count)
            .unwrap_or(-1);
        SqlResult::Success(count)
    }

    fn procedure_columns(
        &self,
        stmt: StmtHandle,
        procedure: &str,
        out: &mut Vec<ProcColumnDesc>,
    ) -> SqlResult<()> {
        self.record(CliCall::ProcedureColumns(procedure.to_string()));
        let state = self.state.borrow();
        if !state.stmts.contains_key(&stmt.as_raw()) {
            return SqlResult::InvalidHandle;
        }
        if let Some(formals) = state.procedures.get(procedure) {
            out.extend(formals.iter().cloned());
        }
        SqlResult::Success(())
    }

    fn lob_length(&self, stmt: StmtHandle, _locator_type: i16, locator: i32) -> SqlResult<i64> {
        self.record(CliCall::LobLength { locator });
        let len = self.state.borrow().lobs.get(&locator).map(|p| p.len());
        match len {
            Some(len) => SqlResult::Success(len as i64),
            None => {
                self.stash(
                    stmt_key(stmt),
                    DiagRecord::new("0F001", -423, "Invalid LOB locator"),
                );
                SqlResult::Error
            }
        }
    }

    fn lob_read(
        &self,
        stmt: StmtHandle,
        _locator_type: i16,
        locator: i32,
        start: i64,
        target: &mut [u8],
    ) -> SqlResult<i64> {
        self.record(CliCall::LobRead { locator, start });
        let payload = self.state.borrow().lobs.get(&locator).cloned();
        let Some(payload) = payload else {
            self.stash(
                stmt_key(stmt),
                DiagRecord::new("0F001", -423, "Invalid LOB locator"),
            );
            return SqlResult::Error;
        };
        let from = (start.max(1) - 1) as usize;
        if from >= payload.len() {
            return SqlResult::Success(0);
        }
        let n = target.len().min(payload.len() - from);
        target[..n].copy_from_slice(&payload[from..from + n]);
        SqlResult::Success(n as i64)
    }

    fn diag_rec(&self, handle: AnyHandle) -> SqlResult<DiagRecord> {
        let state = self.state.borrow();
        match state.diags.get(&handle_key(handle)) {
            Some(diag) => SqlResult::Success(diag.clone()),
            None => SqlResult::NoData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::constants::{SQL_INTEGER, SQL_VARCHAR};

    #[test]
    fn test_handles_allocate_in_sequence_and_track_liveness() {
        let cli = MockCli::new();
        let env = cli.alloc_env().ok().unwrap();
        let dbc = cli.alloc_connection(env).ok().unwrap();
        let stmt = cli.alloc_statement(dbc).ok().unwrap();

        // Freeing out of order trips the function-sequence guard.
        assert!(matches!(cli.free_connection(dbc), SqlResult::Error));
        let diag = cli.diag_rec(dbc.into()).ok().unwrap();
        assert_eq!(diag.state, "HY010");

        assert!(cli.free_statement(stmt).is_success());
        assert!(cli.free_connection(dbc).is_success());
        assert!(cli.free_env(env).is_success());
    }

    #[test]
    fn test_prepare_requires_a_script() {
        let cli = MockCli::new();
        let env = cli.alloc_env().ok().unwrap();
        let dbc = cli.alloc_connection(env).ok().unwrap();
        let stmt = cli.alloc_statement(dbc).ok().unwrap();

        assert!(matches!(
            cli.prepare(stmt, "SELECT 1 FROM NOWHERE"),
            SqlResult::Error
        ));
        let diag = cli.diag_rec(stmt.into()).ok().unwrap();
        assert_eq!(diag.state, "42601");

        cli.add_script("VALUES 1", StatementScript::default());
        assert!(cli.prepare(stmt, "VALUES 1").is_success());
    }

    #[test]
    fn test_scripted_columns_answer_describe_and_attributes() {
        let cli = MockCli::new();
        let env = cli.alloc_env().ok().unwrap();
        let dbc = cli.alloc_connection(env).ok().unwrap();
        let stmt = cli.alloc_statement(dbc).ok().unwrap();

        let script = StatementScript {
            columns: vec![
                MockColumn::new("ID", SQL_INTEGER, 10, 0).with_sizes(11, 4),
                MockColumn::new("NAME", SQL_VARCHAR, 32, 0),
            ],
            ..StatementScript::default()
        };
        cli.add_script("SELECT ID, NAME FROM T", script);
        assert!(cli.prepare(stmt, "SELECT ID, NAME FROM T").is_success());

        assert_eq!(cli.num_result_cols(stmt).ok(), Some(2));
        let mut desc = ColumnDesc::default();
        assert!(cli.describe_col(stmt, 1, &mut desc).is_success());
        assert_eq!(desc.name, "ID");
        assert_eq!(desc.sql_type, SQL_INTEGER);
        assert_eq!(cli.col_attribute(stmt, 1, SQL_DESC_DISPLAY_SIZE).ok(), Some(11));
        assert_eq!(cli.col_attribute(stmt, 2, SQL_DESC_LENGTH).ok(), Some(32));
    }

    #[test]
    fn test_lob_read_is_byte_bounded() {
        let cli = MockCli::new();
        let env = cli.alloc_env().ok().unwrap();
        let dbc = cli.alloc_connection(env).ok().unwrap();
        let stmt = cli.alloc_statement(dbc).ok().unwrap();
        cli.add_lob(7, b"hello world".to_vec());

        assert_eq!(cli.lob_length(stmt, 0, 7).ok(), Some(11));
        let mut buf = [0u8; 5];
        assert_eq!(cli.lob_read(stmt, 0, 7, 7, &mut buf).ok(), Some(5));
        assert_eq!(&buf, b"world");
    }
}
