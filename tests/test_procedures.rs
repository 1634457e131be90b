//! Procedure calls, data-at-execution streaming and large-object reads,
//! driven against the scripted mock backend. No database is required:
//!
//!     cargo test --test test_procedures

use std::sync::Arc;

use db2_cli_rs::cli::constants::{
    SQL_BLOB, SQL_CLOB, SQL_DOUBLE, SQL_INTEGER, SQL_NULLABLE, SQL_PARAM_INPUT,
    SQL_PARAM_INPUT_OUTPUT, SQL_PARAM_OUTPUT, SQL_VARCHAR,
};
use db2_cli_rs::cli::mock::{
    formal, CliCall, MockCell, MockCli, MockColumn, MockRow, StatementScript,
};
use db2_cli_rs::cli::structs::ParamDesc;
use db2_cli_rs::cli::ParamDirection;
use db2_cli_rs::{
    ConnectParams, Connection, DiagRecord, Error, LobKind, Param, SqlType, Value,
};

const INSERT_DOC_SQL: &str = "INSERT INTO DOCS (BODY) VALUES (?)";

fn connect(cli: &Arc<MockCli>) -> Connection {
    Connection::connect(cli.clone(), ConnectParams::default())
        .expect("scripted connect never fails")
}

fn blob_param() -> ParamDesc {
    ParamDesc {
        sql_type: SQL_BLOB,
        column_size: 1_048_576,
        decimal_digits: 0,
        nullable: SQL_NULLABLE,
    }
}

fn doc_insert_script() -> StatementScript {
    StatementScript {
        params: vec![blob_param()],
        row_count: 1,
        ..StatementScript::default()
    }
}

#[test]
fn test_callproc_discovers_formals_and_returns_outputs() {
    let procedure = "DB2INST1.BUMP_SALARY";
    let cli = Arc::new(MockCli::new());
    cli.add_procedure(
        procedure,
        vec![
            formal("EMPNO", SQL_PARAM_INPUT, SQL_INTEGER, 10, 0, 1),
            formal("PCT", SQL_PARAM_INPUT_OUTPUT, SQL_DOUBLE, 15, 0, 2),
            formal("STATUS", SQL_PARAM_OUTPUT, SQL_VARCHAR, 20, 0, 3),
        ],
    );
    cli.add_script(
        "CALL DB2INST1.BUMP_SALARY ( ?,?,?)",
        StatementScript {
            row_count: 0,
            outputs: vec![
                (2, MockCell::double(7.5)),
                (3, MockCell::text("RAISED")),
            ],
            ..StatementScript::default()
        },
    );
    let conn = connect(&cli);
    let mut cursor = conn.cursor().expect("cursor");

    let outputs = cursor
        .callproc(
            procedure,
            vec![Param::from(7i32), Param::from(2.5f64), Param::from(Value::Null)],
        )
        .expect("callproc");

    // Inputs echo back, OUT and INOUT positions carry what the engine wrote.
    assert_eq!(outputs, vec![Value::Int(7), Value::Float(7.5), Value::Str("RAISED".into())]);

    let calls = cli.calls();
    assert!(calls.contains(&CliCall::ProcedureColumns(procedure.to_string())));
    assert!(calls.contains(&CliCall::Prepare("CALL DB2INST1.BUMP_SALARY ( ?,?,?)".to_string())));

    let directions: Vec<ParamDirection> =
        cli.captured_params().iter().map(|p| p.direction).collect();
    assert_eq!(
        directions,
        vec![
            ParamDirection::Input,
            ParamDirection::InputOutput,
            ParamDirection::Output,
        ]
    );
}

#[test]
fn test_callproc_checks_the_arity() {
    let procedure = "DB2INST1.BUMP_SALARY";
    let cli = Arc::new(MockCli::new());
    cli.add_procedure(
        procedure,
        vec![
            formal("EMPNO", SQL_PARAM_INPUT, SQL_INTEGER, 10, 0, 1),
            formal("PCT", SQL_PARAM_INPUT_OUTPUT, SQL_DOUBLE, 15, 0, 2),
        ],
    );
    let conn = connect(&cli);
    let mut cursor = conn.cursor().expect("cursor");
    cli.clear_calls();

    let err = cursor.callproc(procedure, vec![Param::from(7i32)]).unwrap_err();
    match err {
        Error::Programming { diag } => assert_eq!(diag.message, "Wrong number of parameters"),
        other => panic!("expected a programming error, got {:?}", other),
    }
    let calls = cli.calls();
    assert!(calls.contains(&CliCall::ProcedureColumns(procedure.to_string())));
    assert!(
        !calls.iter().any(|c| matches!(c, CliCall::Prepare(_))),
        "arity is checked before the call text is prepared"
    );
}

#[test]
fn test_callproc_without_parameters() {
    let procedure = "DB2INST1.NIGHTLY_ROLLUP";
    let cli = Arc::new(MockCli::new());
    cli.add_procedure(procedure, Vec::new());
    cli.add_script(
        "CALL DB2INST1.NIGHTLY_ROLLUP ()",
        StatementScript {
            row_count: 0,
            ..StatementScript::default()
        },
    );
    let conn = connect(&cli);
    let mut cursor = conn.cursor().expect("cursor");

    let outputs = cursor.callproc(procedure, Vec::new()).expect("callproc");
    assert!(outputs.is_empty());
}

#[test]
fn test_callproc_result_set_stays_fetchable() {
    let procedure = "DB2INST1.TOP_EARNERS";
    let cli = Arc::new(MockCli::new());
    cli.add_procedure(
        procedure,
        vec![formal("LIMITN", SQL_PARAM_INPUT, SQL_INTEGER, 10, 0, 1)],
    );
    cli.add_script(
        "CALL DB2INST1.TOP_EARNERS ( ?)",
        StatementScript {
            columns: vec![MockColumn::new("NAME", SQL_VARCHAR, 9, 0)],
            rows: vec![
                MockRow::new(vec![MockCell::text("Graham")]),
                MockRow::new(vec![MockCell::text("Jones")]),
            ],
            ..StatementScript::default()
        },
    );
    let conn = connect(&cli);
    let mut cursor = conn.cursor().expect("cursor");

    let outputs = cursor.callproc(procedure, vec![Param::from(2i32)]).expect("callproc");
    assert_eq!(outputs, vec![Value::Int(2)]);

    let row = cursor.fetch_one().expect("fetch").expect("row");
    assert_eq!(row.get_by_name("NAME"), Some(&Value::Str("Graham".into())));
    let rest = cursor.fetch_all().expect("fetch_all");
    assert_eq!(rest.len(), 1);
}

#[test]
fn test_streamed_parameter_is_pumped_in_chunks() {
    let cli = Arc::new(MockCli::new());
    cli.add_script(INSERT_DOC_SQL, doc_insert_script());
    let conn = connect(&cli);
    let mut cursor = conn.cursor().expect("cursor");

    let payload: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
    let affected = cursor
        .execute(
            INSERT_DOC_SQL,
            vec![Param::stream(std::io::Cursor::new(payload.clone()))],
        )
        .expect("execute");
    assert_eq!(affected, Some(1));

    // One need-data round per stream, payload split into fixed chunks.
    let calls = cli.calls();
    let at = calls
        .iter()
        .position(|c| *c == CliCall::Execute)
        .expect("execute recorded");
    assert_eq!(
        calls[at + 1..=at + 5].to_vec(),
        vec![
            CliCall::ParamData,
            CliCall::PutData(1024),
            CliCall::PutData(1024),
            CliCall::PutData(452),
            CliCall::ParamData,
        ]
    );

    let captured = cli.captured_params();
    assert!(captured[0].streamed);
    assert_eq!(captured[0].bytes, payload);
}

#[test]
fn test_two_streams_feed_in_marker_order() {
    let sql = "INSERT INTO DOCS (BODY, SUMMARY) VALUES (?, ?)";
    let cli = Arc::new(MockCli::new());
    cli.add_script(
        sql,
        StatementScript {
            params: vec![
                blob_param(),
                ParamDesc {
                    sql_type: SQL_CLOB,
                    column_size: 8192,
                    decimal_digits: 0,
                    nullable: SQL_NULLABLE,
                },
            ],
            row_count: 1,
            ..StatementScript::default()
        },
    );
    let conn = connect(&cli);
    let mut cursor = conn.cursor().expect("cursor");

    let body: Vec<u8> = vec![0xAB; 100];
    let summary = b"short abstract".to_vec();
    cursor
        .execute(
            sql,
            vec![
                Param::stream(std::io::Cursor::new(body.clone())),
                Param::stream(std::io::Cursor::new(summary.clone())),
            ],
        )
        .expect("execute");

    let captured = cli.captured_params();
    assert!(captured[0].streamed && captured[1].streamed);
    assert_eq!(captured[0].bytes, body);
    assert_eq!(captured[1].bytes, summary);
}

#[test]
fn test_stream_warning_is_surfaced_once() {
    let cli = Arc::new(MockCli::new());
    cli.add_script(
        INSERT_DOC_SQL,
        StatementScript {
            pump_info: Some(DiagRecord::new("01004", 0, "String data, right truncated")),
            ..doc_insert_script()
        },
    );
    let conn = connect(&cli);
    let mut cursor = conn.cursor().expect("cursor");

    let affected = cursor
        .execute(
            INSERT_DOC_SQL,
            vec![Param::stream(std::io::Cursor::new(vec![1u8; 10]))],
        )
        .expect("a warning does not fail the pump");
    assert_eq!(affected, Some(1));

    assert_eq!(cursor.messages().len(), 1);
    assert_eq!(cursor.messages()[0].diag.state, "01004");

    let rounds = cli
        .calls()
        .iter()
        .filter(|c| **c == CliCall::ParamData)
        .count();
    assert_eq!(rounds, 3, "stream, warning, completion");
}

#[test]
fn test_materialized_lob_parameter_binds_inline() {
    let cli = Arc::new(MockCli::new());
    cli.add_script(INSERT_DOC_SQL, doc_insert_script());
    let conn = connect(&cli);
    let mut cursor = conn.cursor().expect("cursor");

    cursor
        .execute(INSERT_DOC_SQL, vec![Param::from("inline text")])
        .expect("execute");

    let calls = cli.calls();
    assert!(!calls.contains(&CliCall::ParamData), "no need-data round");
    assert!(!calls.iter().any(|c| matches!(c, CliCall::PutData(_))));

    let captured = cli.captured_params();
    assert!(!captured[0].streamed);
    assert_eq!(captured[0].bytes, b"inline text".to_vec());
}

#[test]
fn test_blob_column_fetches_as_locator() {
    let sql = "SELECT DOC FROM DOCS WHERE ID = 1";
    let cli = Arc::new(MockCli::new());
    cli.add_script(
        sql,
        StatementScript {
            columns: vec![MockColumn::new("DOC", SQL_BLOB, 1_048_576, 0)],
            rows: vec![MockRow::new(vec![MockCell::locator(501)])],
            ..StatementScript::default()
        },
    );
    let payload = b"%PDF-1.7 payload".to_vec();
    cli.add_lob(501, payload.clone());
    let conn = connect(&cli);
    let mut cursor = conn.cursor().expect("cursor");
    cursor.execute(sql, Vec::new()).expect("execute");

    assert_eq!(
        cursor.description().get(0).map(|c| c.sql_type),
        Some(SqlType::BlobLocator),
        "large-object columns are rebound to locators"
    );

    let row = cursor.fetch_one().expect("fetch").expect("row");
    let (kind, locator) = match row.get(0) {
        Some(Value::Lob { kind, locator }) => (*kind, *locator),
        other => panic!("expected a locator value, got {:?}", other),
    };
    assert_eq!(kind, LobKind::Blob);
    assert_eq!(locator, 501);

    // Materialize through a temporary statement on the same connection.
    cli.clear_calls();
    let value = cursor.read_lob(kind, locator).expect("read_lob");
    assert_eq!(value, Value::Bytes(payload));
    assert_eq!(
        cli.calls(),
        vec![
            CliCall::AllocStatement,
            CliCall::LobLength { locator: 501 },
            CliCall::LobRead { locator: 501, start: 1 },
            CliCall::FreeStatement,
        ]
    );
}

#[test]
fn test_clob_locator_reads_text() {
    let sql = "SELECT RESUME FROM EMP_RESUME WHERE EMPNO = '000130'";
    let cli = Arc::new(MockCli::new());
    cli.add_script(
        sql,
        StatementScript {
            columns: vec![MockColumn::new("RESUME", SQL_CLOB, 5120, 0)],
            rows: vec![MockRow::new(vec![MockCell::locator(77)])],
            ..StatementScript::default()
        },
    );
    cli.add_lob(77, "façade of a résumé".as_bytes().to_vec());
    let conn = connect(&cli);
    let mut cursor = conn.cursor().expect("cursor");
    cursor.execute(sql, Vec::new()).expect("execute");

    assert_eq!(
        cursor.description().get(0).map(|c| c.sql_type),
        Some(SqlType::ClobLocator)
    );
    let row = cursor.fetch_one().expect("fetch").expect("row");
    assert!(matches!(row.get(0), Some(Value::Lob { kind: LobKind::Clob, .. })));

    let value = cursor.read_lob(LobKind::Clob, 77).expect("read_lob");
    assert_eq!(value, Value::Str("façade of a résumé".into()));
}

#[test]
fn test_auto_read_lobs_inlines_payloads() {
    let sql = "SELECT DOC FROM DOCS WHERE ID = 2";
    let cli = Arc::new(MockCli::new());
    cli.add_script(
        sql,
        StatementScript {
            columns: vec![MockColumn::new("DOC", SQL_BLOB, 1_048_576, 0)],
            rows: vec![MockRow::new(vec![MockCell::locator(9)])],
            ..StatementScript::default()
        },
    );
    cli.add_lob(9, vec![0xDE, 0xAD, 0xBE, 0xEF]);
    let conn = connect(&cli);
    let mut cursor = conn.cursor().expect("cursor");
    assert!(cursor.set_auto_read_lobs(true));
    cursor.execute(sql, Vec::new()).expect("execute");

    let row = cursor.fetch_one().expect("fetch").expect("row");
    assert_eq!(row.get(0), Some(&Value::Bytes(vec![0xDE, 0xAD, 0xBE, 0xEF])));
}

#[test]
fn test_invalid_locator_is_reported() {
    let cli = Arc::new(MockCli::new());
    let conn = connect(&cli);
    let cursor = conn.cursor().expect("cursor");

    let err = cursor.read_lob(LobKind::Blob, 999).unwrap_err();
    match err {
        Error::General { diag } => {
            assert_eq!(diag.state, "0F001");
            assert_eq!(diag.native_code, -423);
        }
        other => panic!("expected a general error, got {:?}", other),
    }
}
