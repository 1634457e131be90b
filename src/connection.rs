//! High-level connection API.

use std::sync::Arc;

use tracing::debug;

use crate::cli::{Cli, Completion, ConnHandle, EnvHandle, InfoType, SqlResult};
use crate::cursor::Cursor;
use crate::error::{Error, Result};

/// Connection settings.
///
/// The defaults name the engine's conventional sample database and
/// instance owner, so a bare `ConnectParams::default()` works against a
/// stock local install.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    /// Data source name.
    pub dsn: String,
    /// User id.
    pub uid: String,
    /// Password.
    pub pwd: String,
    /// Commit each statement as it executes.
    pub autocommit: bool,
    /// Unit-of-work scope selector. Accepted and recorded, but not
    /// forwarded natively; connections are always type 1 (single database
    /// per unit of work).
    pub connect_type: i32,
}

impl Default for ConnectParams {
    fn default() -> Self {
        Self {
            dsn: "sample".to_string(),
            uid: "db2inst1".to_string(),
            pwd: "ibmdb2".to_string(),
            autocommit: false,
            connect_type: 1,
        }
    }
}

impl ConnectParams {
    pub fn new(dsn: impl Into<String>, uid: impl Into<String>, pwd: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            uid: uid.into(),
            pwd: pwd.into(),
            ..Self::default()
        }
    }

    pub fn with_autocommit(mut self, autocommit: bool) -> Self {
        self.autocommit = autocommit;
        self
    }

    pub fn with_connect_type(mut self, connect_type: i32) -> Self {
        self.connect_type = connect_type;
        self
    }
}

/// Introspection strings read once at connect time. Fields stay empty
/// when the engine does not expose the get-info API.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    pub server_name: String,
    pub dbms_name: String,
    pub dbms_ver: String,
    pub driver_name: String,
    pub driver_ver: String,
}

/// A database connection.
///
/// Owns the environment and connection handles for its whole lifetime.
/// Statements run through [`Cursor`]s created by [`Connection::cursor`];
/// any number of cursors may coexist on one connection, but concurrent
/// use must be serialized by the caller.
pub struct Connection {
    cli: Arc<dyn Cli>,
    env: EnvHandle,
    dbc: ConnHandle,
    connected: bool,
    autocommit: bool,
    info: ServerInfo,
}

impl Connection {
    /// Connect to the data source named by `params` through `cli`.
    ///
    /// On any failure both freshly allocated handles are released; no
    /// partially-open connection escapes.
    pub fn connect(cli: Arc<dyn Cli>, params: ConnectParams) -> Result<Self> {
        crate::init_debug_logging();

        let env = match cli.alloc_env() {
            SqlResult::Success(h) | SqlResult::SuccessWithInfo(h) => h,
            _ => return Err(Error::interface("environment handle allocation failed")),
        };
        let dbc = match cli.alloc_connection(env) {
            SqlResult::Success(h) | SqlResult::SuccessWithInfo(h) => h,
            _ => {
                let err = Error::from_handle(cli.as_ref(), env.into());
                let _ = cli.free_env(env);
                return Err(err);
            }
        };

        if !cli.set_autocommit(dbc, params.autocommit).is_success() {
            let err = Error::from_handle(cli.as_ref(), dbc.into());
            let _ = cli.free_connection(dbc);
            let _ = cli.free_env(env);
            return Err(err);
        }

        if !cli
            .connect(dbc, &params.dsn, &params.uid, &params.pwd)
            .is_success()
        {
            let err = Error::database_from_handle(cli.as_ref(), dbc.into());
            let _ = cli.free_connection(dbc);
            let _ = cli.free_env(env);
            return Err(err);
        }

        let info = read_server_info(cli.as_ref(), dbc);
        debug!(
            dsn = %params.dsn,
            uid = %params.uid,
            autocommit = params.autocommit,
            server = %info.server_name,
            "connected"
        );

        Ok(Connection {
            cli,
            env,
            dbc,
            connected: true,
            autocommit: params.autocommit,
            info,
        })
    }

    /// Open a new cursor on this connection.
    pub fn cursor(&self) -> Result<Cursor> {
        if !self.connected {
            return Err(Error::Disconnected);
        }
        Cursor::new(Arc::clone(&self.cli), self.dbc)
    }

    /// Commit the current unit of work.
    pub fn commit(&self) -> Result<()> {
        self.end_tran(Completion::Commit)
    }

    /// Roll back the current unit of work.
    pub fn rollback(&self) -> Result<()> {
        self.end_tran(Completion::Rollback)
    }

    /// Close the connection, rolling back any open unit of work first.
    ///
    /// The connection is unusable afterwards; further operations fail
    /// with [`Error::Disconnected`]. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if !self.connected {
            return Ok(());
        }
        if !self.autocommit {
            // An open unit of work makes the native disconnect fail.
            self.rollback()?;
        }
        if !self.cli.disconnect(self.dbc).is_success() {
            return Err(Error::from_handle(self.cli.as_ref(), self.dbc.into()));
        }
        self.connected = false;
        if !self.cli.free_connection(self.dbc).is_success() {
            return Err(Error::from_handle(self.cli.as_ref(), self.dbc.into()));
        }
        if !self.cli.free_env(self.env).is_success() {
            return Err(Error::from_handle(self.cli.as_ref(), self.env.into()));
        }
        debug!("connection closed");
        Ok(())
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn autocommit(&self) -> bool {
        self.autocommit
    }

    pub fn server_name(&self) -> &str {
        &self.info.server_name
    }

    pub fn dbms_name(&self) -> &str {
        &self.info.dbms_name
    }

    pub fn dbms_ver(&self) -> &str {
        &self.info.dbms_ver
    }

    pub fn driver_name(&self) -> &str {
        &self.info.driver_name
    }

    pub fn driver_ver(&self) -> &str {
        &self.info.driver_ver
    }

    fn end_tran(&self, completion: Completion) -> Result<()> {
        if !self.connected {
            return Err(Error::Disconnected);
        }
        if !self.cli.end_tran(self.dbc, completion).is_success() {
            return Err(Error::from_handle(self.cli.as_ref(), self.dbc.into()));
        }
        debug!(completion = ?completion, "ended transaction");
        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("env", &self.env)
            .field("dbc", &self.dbc)
            .field("connected", &self.connected)
            .field("autocommit", &self.autocommit)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Best-effort server/driver introspection; absence of the get-info API
/// is not an error.
fn read_server_info(cli: &dyn Cli, dbc: ConnHandle) -> ServerInfo {
    let mut info = ServerInfo::default();
    if !cli.supports_get_info(dbc) {
        return info;
    }
    for (kind, slot) in [
        (InfoType::DbmsName, &mut info.dbms_name),
        (InfoType::DbmsVer, &mut info.dbms_ver),
        (InfoType::DriverName, &mut info.driver_name),
        (InfoType::DriverVer, &mut info.driver_ver),
        (InfoType::ServerName, &mut info.server_name),
    ] {
        let _ = cli.get_info(dbc, kind, slot);
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_params_default_to_the_sample_database() {
        let params = ConnectParams::default();
        assert_eq!(params.dsn, "sample");
        assert_eq!(params.uid, "db2inst1");
        assert_eq!(params.pwd, "ibmdb2");
        assert!(!params.autocommit);
        assert_eq!(params.connect_type, 1);
    }

    #[test]
    fn test_params_builders_override_defaults() {
        let params = ConnectParams::new("testdb", "tester", "secret")
            .with_autocommit(true)
            .with_connect_type(2);
        assert_eq!(params.dsn, "testdb");
        assert!(params.autocommit);
        assert_eq!(params.connect_type, 2);
    }

    #[test]
    fn test_server_info_starts_empty() {
        let info = ServerInfo::default();
        assert_eq!(info.server_name, "");
        assert_eq!(info.dbms_name, "");
    }
}
