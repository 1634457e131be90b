//! A fetched result row.

use super::descriptor::Description;
use super::value::Value;
use std::sync::Arc;

/// One row of a result set. The description is shared across all rows
/// fetched from the same statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Value>,
    description: Arc<Description>,
}

impl Row {
    pub fn new(values: Vec<Value>, description: Arc<Description>) -> Self {
        Self {
            values,
            description,
        }
    }

    /// Value by 0-based column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value by column name (case-insensitive).
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.description
            .find_by_name(name)
            .and_then(|i| self.values.get(i))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn description(&self) -> &Arc<Description> {
        &self.description
    }
}

impl IntoIterator for Row {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::constants::{SQL_INTEGER, SQL_NO_NULLS, SQL_NULLABLE, SQL_VARCHAR};
    use crate::cli::structs::ColumnDesc;
    use crate::types::descriptor::ColumnDescriptor;

    fn make_row() -> Row {
        let columns = vec![
            ColumnDescriptor::from_describe(
                &ColumnDesc {
                    name: "ID".to_string(),
                    sql_type: SQL_INTEGER,
                    column_size: 10,
                    decimal_digits: 0,
                    nullable: SQL_NO_NULLS,
                },
                11,
                4,
            ),
            ColumnDescriptor::from_describe(
                &ColumnDesc {
                    name: "NAME".to_string(),
                    sql_type: SQL_VARCHAR,
                    column_size: 30,
                    decimal_digits: 0,
                    nullable: SQL_NULLABLE,
                },
                30,
                31,
            ),
        ];
        Row::new(
            vec![Value::Int(7), Value::Str("seven".to_string())],
            Arc::new(Description::new(columns)),
        )
    }

    #[test]
    fn test_get_by_index_and_name() {
        let row = make_row();
        assert_eq!(row.len(), 2);
        assert_eq!(row.get(0), Some(&Value::Int(7)));
        assert_eq!(row.get(2), None);
        assert_eq!(row.get_by_name("name"), Some(&Value::Str("seven".into())));
        assert_eq!(row.get_by_name("ID"), Some(&Value::Int(7)));
        assert_eq!(row.get_by_name("missing"), None);
    }

    #[test]
    fn test_iteration() {
        let row = make_row();
        let borrowed: Vec<&Value> = (&row).into_iter().collect();
        assert_eq!(borrowed.len(), 2);
        let owned: Vec<Value> = row.into_iter().collect();
        assert_eq!(owned[1], Value::Str("seven".into()));
    }
}
