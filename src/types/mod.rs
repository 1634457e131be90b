//! Host-side data types for statements and results.

mod descriptor;
mod row;
mod sql_type;
mod value;

pub use descriptor::{ColumnDescriptor, Description};
pub use row::Row;
pub use sql_type::{LobKind, SqlType};
pub use value::{Param, Value};
