//! DB2 Call Level Interface driver adapter
//!
//! A Rust driver layer over the DB2 Call Level Interface: connections and
//! cursors with prepared-statement reuse, typed parameter binding, batched
//! fetching, stored procedure calls and large-object streaming. The native
//! library sits behind the [`cli::Cli`] trait; the scripted
//! [`cli::mock::MockCli`] backend drives the same code paths in tests.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use db2_cli_rs::cli::mock::MockCli;
//! use db2_cli_rs::{ConnectParams, Connection, Result};
//!
//! fn main() -> Result<()> {
//!     // The scripted backend stands in for a native CLI binding here.
//!     let cli = Arc::new(MockCli::new());
//!     let mut conn = Connection::connect(
//!         cli,
//!         ConnectParams::new("sample", "db2inst1", "ibmdb2"),
//!     )?;
//!
//!     let mut cursor = conn.cursor()?;
//!     cursor.execute("SELECT ID, NAME FROM STAFF", Vec::new())?;
//!     while let Some(row) = cursor.fetch_one()? {
//!         println!("{:?}", row.get(0));
//!     }
//!
//!     conn.close()?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod connection;
pub mod cursor;
pub mod error;
mod params;
mod rows;
pub mod types;

// Re-export main types
pub use cli::{Cli, Completion, FetchOrientation};
pub use connection::{ConnectParams, Connection, ServerInfo};
pub use cursor::Cursor;
pub use error::{DiagRecord, Error, Result, Warning};
pub use types::{ColumnDescriptor, Description, LobKind, Param, Row, SqlType, Value};

use std::sync::Once;

static LOG_INIT: Once = Once::new();

/// Install the stderr logging subscriber, once per process.
///
/// Verbosity comes from the `DB2_CLI_DEBUG` environment variable, read on
/// the first connect: unset or `0` keeps logging off, `1` selects debug
/// level, anything higher selects trace level.
pub fn init_debug_logging() {
    LOG_INIT.call_once(|| {
        let level = std::env::var("DB2_CLI_DEBUG")
            .ok()
            .and_then(|v| v.parse::<u8>().ok())
            .unwrap_or(0);
        if level == 0 {
            return;
        }
        let filter = if level == 1 {
            "db2_cli_rs=debug"
        } else {
            "db2_cli_rs=trace"
        };
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
            .with_writer(std::io::stderr)
            .try_init();
    });
}
