//! Error types for the CLI driver adapter.
//!
//! Native failures carry the first diagnostic record of the failing handle
//! (SQLSTATE, native error code, message text) and are classified into the
//! standard driver taxonomy by a fixed SQLSTATE table. Local misuse is
//! reported without touching the native library.

use std::fmt;

use thiserror::Error;

use crate::cli::{AnyHandle, Cli, SqlResult};

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// One native diagnostic record: SQLSTATE, native error code, message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagRecord {
    pub state: String,
    pub native_code: i32,
    pub message: String,
}

impl DiagRecord {
    pub fn new(state: impl Into<String>, native_code: i32, message: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            native_code,
            message: message.into(),
        }
    }

    /// Sentinel for a call made with an invalid native handle.
    pub fn invalid_handle() -> Self {
        Self::new("I", -1, "Invalid Handle")
    }

    /// Sentinel for a diagnostic request that itself returned an error.
    pub fn retrieval_error() -> Self {
        Self::new("E", -1, "Error")
    }

    /// Sentinel for an unavailable diagnostic (nothing to fetch).
    pub fn unavailable() -> Self {
        Self::new("?", -1, "SQLGetDiagRec() failed")
    }

    /// Synthetic record for errors raised by this layer itself.
    pub fn local(message: impl Into<String>) -> Self {
        Self::new("", -1, message)
    }
}

impl fmt::Display for DiagRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (native code {})",
            self.state, self.message, self.native_code
        )
    }
}

/// A non-fatal diagnostic accumulated in the cursor message list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("warning: {diag}")]
pub struct Warning {
    pub diag: DiagRecord,
}

impl Warning {
    pub fn new(diag: DiagRecord) -> Self {
        Self { diag }
    }
}

/// Error type for driver operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Misuse of this layer, e.g. operating on a closed cursor.
    #[error("interface error: {diag}")]
    Interface { diag: DiagRecord },

    /// Database-level failure not classified further (connect failures).
    #[error("database error: {diag}")]
    Database { diag: DiagRecord },

    /// Invalid data conversion.
    #[error("data error: {diag}")]
    Data { diag: DiagRecord },

    /// Connection/transaction-state failure, deadlock, resource exhaustion.
    #[error("operational error: {diag}")]
    Operational { diag: DiagRecord },

    /// Constraint violation.
    #[error("integrity error: {diag}")]
    Integrity { diag: DiagRecord },

    /// Failure internal to the driver or engine (bad row status).
    #[error("internal error: {diag}")]
    Internal { diag: DiagRecord },

    /// Function-sequence, parameter-count, cursor-state or literal error.
    #[error("programming error: {diag}")]
    Programming { diag: DiagRecord },

    /// Requested operation has no native support.
    #[error("not supported: {diag}")]
    NotSupported { diag: DiagRecord },

    /// Catch-all classified error.
    #[error("error: {diag}")]
    General { diag: DiagRecord },

    /// Operation requires an open connection.
    #[error("Disconnected")]
    Disconnected,

    /// A supplied parameter value does not fit the described SQL type.
    #[error("Param #{position} <{sql_type}> SHOULD be of type <{expected}>")]
    ParamType {
        /// 1-based parameter position.
        position: usize,
        /// SQL type name from the describe step.
        sql_type: &'static str,
        /// Expected host value kind.
        expected: &'static str,
    },
}

// SQLSTATE classification. Ordered, first match wins, default `General`.
const DATA_ERROR_STATES: &[&str] = &["07006"];
const OPERATIONAL_ERROR_STATES: &[&str] =
    &["25000", "25501", "40003", "08S01", "40001", "57011"];
const PROGRAMMING_ERROR_STATES: &[&str] =
    &["HY010", "07001", "22007", "22001", "24000", "01504"];

#[derive(Clone, Copy)]
enum Category {
    Data,
    Operational,
    Programming,
}

const CLASSES: &[(Category, &[&str])] = &[
    (Category::Data, DATA_ERROR_STATES),
    (Category::Operational, OPERATIONAL_ERROR_STATES),
    (Category::Programming, PROGRAMMING_ERROR_STATES),
];

impl Error {
    /// Classify a diagnostic record by its SQLSTATE.
    pub fn classified(diag: DiagRecord) -> Self {
        for (category, states) in CLASSES {
            if states.contains(&diag.state.as_str()) {
                return match category {
                    Category::Data => Error::Data { diag },
                    Category::Operational => Error::Operational { diag },
                    Category::Programming => Error::Programming { diag },
                };
            }
        }
        Error::General { diag }
    }

    /// Retrieve the failing handle's first diagnostic and classify it.
    pub fn from_handle(cli: &dyn Cli, handle: AnyHandle) -> Self {
        Self::classified(fetch_diag(cli, handle))
    }

    /// Retrieve the diagnostic but force the database-error family
    /// (used for connect failures).
    pub fn database_from_handle(cli: &dyn Cli, handle: AnyHandle) -> Self {
        Error::Database {
            diag: fetch_diag(cli, handle),
        }
    }

    /// Create an interface error with a synthetic diagnostic.
    pub fn interface(message: impl Into<String>) -> Self {
        Error::Interface {
            diag: DiagRecord::local(message),
        }
    }

    /// Create a data error for a failed conversion.
    pub fn data_conversion(message: impl Into<String>) -> Self {
        Error::Data {
            diag: DiagRecord::new("07006", -1, message),
        }
    }

    /// Create an internal error with a synthetic diagnostic.
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            diag: DiagRecord::local(message),
        }
    }

    /// Create a not-supported error with a synthetic diagnostic.
    pub fn not_supported(message: impl Into<String>) -> Self {
        Error::NotSupported {
            diag: DiagRecord::local(message),
        }
    }

    /// The parameter-count mismatch error raised before any native call.
    pub fn wrong_param_count() -> Self {
        Error::Programming {
            diag: DiagRecord::local("Wrong number of parameters"),
        }
    }

    /// The diagnostic record carried by this error, if any.
    pub fn diag(&self) -> Option<&DiagRecord> {
        match self {
            Error::Interface { diag }
            | Error::Database { diag }
            | Error::Data { diag }
            | Error::Operational { diag }
            | Error::Integrity { diag }
            | Error::Internal { diag }
            | Error::Programming { diag }
            | Error::NotSupported { diag }
            | Error::General { diag } => Some(diag),
            Error::Disconnected | Error::ParamType { .. } => None,
        }
    }
}

/// Fetch the first diagnostic record for a handle, degrading to sentinel
/// records when retrieval is impossible.
pub fn fetch_diag(cli: &dyn Cli, handle: AnyHandle) -> DiagRecord {
    match cli.diag_rec(handle) {
        SqlResult::Success(diag) | SqlResult::SuccessWithInfo(diag) => diag,
        SqlResult::InvalidHandle => DiagRecord::invalid_handle(),
        SqlResult::Error => DiagRecord::retrieval_error(),
        _ => DiagRecord::unavailable(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diag(state: &str) -> DiagRecord {
        DiagRecord::new(state, -99, "boom")
    }

    #[test]
    fn test_classify_data_error() {
        assert!(matches!(
            Error::classified(diag("07006")),
            Error::Data { .. }
        ));
    }

    #[test]
    fn test_classify_operational_errors() {
        for state in ["25000", "25501", "40003", "08S01", "40001", "57011"] {
            assert!(matches!(
                Error::classified(diag(state)),
                Error::Operational { .. }
            ));
        }
    }

    #[test]
    fn test_classify_programming_errors() {
        for state in ["HY010", "07001", "22007", "22001", "24000", "01504"] {
            assert!(matches!(
                Error::classified(diag(state)),
                Error::Programming { .. }
            ));
        }
    }

    #[test]
    fn test_classify_unknown_state_is_general() {
        assert!(matches!(
            Error::classified(diag("42704")),
            Error::General { .. }
        ));
        assert!(matches!(Error::classified(diag("")), Error::General { .. }));
    }

    #[test]
    fn test_sentinel_records() {
        assert_eq!(
            DiagRecord::invalid_handle(),
            DiagRecord::new("I", -1, "Invalid Handle")
        );
        assert_eq!(DiagRecord::retrieval_error().state, "E");
        assert_eq!(DiagRecord::unavailable().state, "?");
        assert_eq!(DiagRecord::unavailable().native_code, -1);
    }

    #[test]
    fn test_wrong_param_count_message() {
        let err = Error::wrong_param_count();
        let diag = err.diag().unwrap();
        assert_eq!(diag.message, "Wrong number of parameters");
        assert_eq!(diag.native_code, -1);
        assert!(matches!(err, Error::Programming { .. }));
    }

    #[test]
    fn test_param_type_error_text() {
        let err = Error::ParamType {
            position: 3,
            sql_type: "INTEGER",
            expected: "int",
        };
        assert_eq!(err.to_string(), "Param #3 <INTEGER> SHOULD be of type <int>");
    }

    #[test]
    fn test_data_conversion_state() {
        let err = Error::data_conversion("bad digits");
        assert_eq!(err.diag().unwrap().state, "07006");
    }
}
