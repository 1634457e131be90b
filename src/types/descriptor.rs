//! Result-set description, shared by every row of a result.

use crate::cli::structs::ColumnDesc;
use super::sql_type::SqlType;

/// One described result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Column name as reported by the engine.
    pub name: String,
    /// Mapped SQL data type.
    pub sql_type: SqlType,
    /// Display width in characters.
    pub display_size: i64,
    /// Transfer length in bytes.
    pub internal_size: i64,
    /// Precision (column size).
    pub precision: u32,
    /// Scale (decimal digits).
    pub scale: i16,
    /// Whether the column accepts NULL.
    pub nullable: bool,
}

impl ColumnDescriptor {
    /// Combine the describe record with the two numeric attributes read
    /// alongside it.
    pub fn from_describe(desc: &ColumnDesc, display_size: i64, internal_size: i64) -> Self {
        Self {
            name: desc.name.clone(),
            sql_type: SqlType::from_code(desc.sql_type),
            display_size,
            internal_size,
            precision: desc.column_size,
            scale: desc.decimal_digits,
            nullable: desc.is_nullable(),
        }
    }
}

/// Description of an open result set. Rows hold it behind an `Arc`, so one
/// describe pass serves the whole result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Description {
    pub columns: Vec<ColumnDescriptor>,
}

impl Description {
    pub fn new(columns: Vec<ColumnDescriptor>) -> Self {
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ColumnDescriptor> {
        self.columns.get(index)
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Find a column index by name (case-insensitive).
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        let name_upper = name.to_uppercase();
        self.columns
            .iter()
            .position(|c| c.name.to_uppercase() == name_upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::constants::{SQL_NULLABLE, SQL_NO_NULLS, SQL_VARCHAR};

    fn make_descriptor(name: &str, nullable: i16) -> ColumnDescriptor {
        let desc = ColumnDesc {
            name: name.to_string(),
            sql_type: SQL_VARCHAR,
            column_size: 30,
            decimal_digits: 0,
            nullable,
        };
        ColumnDescriptor::from_describe(&desc, 30, 31)
    }

    #[test]
    fn test_descriptor_from_describe() {
        let col = make_descriptor("NAME", SQL_NULLABLE);
        assert_eq!(col.name, "NAME");
        assert_eq!(col.sql_type, SqlType::Varchar);
        assert_eq!(col.display_size, 30);
        assert_eq!(col.internal_size, 31);
        assert_eq!(col.precision, 30);
        assert!(col.nullable);

        let col = make_descriptor("ID", SQL_NO_NULLS);
        assert!(!col.nullable);
    }

    #[test]
    fn test_find_by_name_case_insensitive() {
        let desc = Description::new(vec![
            make_descriptor("ID", SQL_NO_NULLS),
            make_descriptor("NAME", SQL_NULLABLE),
        ]);
        assert_eq!(desc.len(), 2);
        assert_eq!(desc.names(), vec!["ID", "NAME"]);
        assert_eq!(desc.find_by_name("name"), Some(1));
        assert_eq!(desc.find_by_name("Id"), Some(0));
        assert_eq!(desc.find_by_name("MISSING"), None);
    }
}
