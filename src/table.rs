use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::TableError;
use crate::schema::{ColumnType, Schema};
use crate::value::Value;

pub type ColumnName = String;

/// A JSON record: one row keyed by column name, in column order.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// A concrete table: named columns and positional rows.
///
/// Columns are ordered and uniquely named; every row holds exactly one value
/// per column. Row order is insertion order. On the wire a table is an array
/// of records.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Record>", into = "Vec<Record>")]
pub struct Table {
    columns: Vec<ColumnName>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<ColumnName>, rows: Vec<Vec<Value>>) -> Result<Self, TableError> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column) {
                return Err(TableError::DuplicateColumn(column.clone()));
            }
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(TableError::RowWidth {
                    row: i,
                    expected: columns.len(),
                    found: row.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    /// Builds a table from records. The column set is the union of the
    /// records' keys in first-appearance order; missing keys become `null`.
    pub fn from_records(records: &[Record]) -> Result<Self, TableError> {
        let mut columns: Vec<ColumnName> = vec![];
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for record in records {
            for key in record.keys() {
                if !positions.contains_key(key.as_str()) {
                    positions.insert(key.as_str(), columns.len());
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                let mut row = vec![Value::Null; columns.len()];
                for (key, value) in record {
                    row[positions[key.as_str()]] =
                        Value::try_from(value).map_err(|reason| TableError::BadValue {
                            column: key.clone(),
                            reason,
                        })?;
                }
                Ok(row)
            })
            .collect::<Result<Vec<_>, TableError>>()?;

        Ok(Self { columns, rows })
    }

    pub fn to_records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().map(serde_json::Value::from))
                    .collect()
            })
            .collect()
    }

    pub fn columns(&self) -> &[ColumnName] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// The values of one column, top to bottom.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |row| &row[index])
    }

    /// Number of distinct values in each column.
    pub fn cardinalities(&self) -> Vec<usize> {
        (0..self.width())
            .map(|i| self.column_values(i).collect::<HashSet<_>>().len())
            .collect()
    }

    /// Infers the column types from the data: a column whose non-null values
    /// are all numbers is `number`, all booleans is `boolean`, anything else
    /// (mixed, strings, or only nulls) is `string`.
    pub fn schema(&self) -> Schema {
        (0..self.width())
            .map(|i| {
                let mut types = self.column_values(i).filter_map(Value::column_type);
                match types.next() {
                    Some(first) if types.all(|ty| ty == first) => first,
                    _ => ColumnType::String,
                }
            })
            .collect()
    }

    /// Keeps only the rows at `indices`, in the given order.
    pub fn take_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Renames columns through `mapping`; columns without an entry keep their
    /// name.
    pub fn rename_columns(&self, mapping: &HashMap<ColumnName, ColumnName>) -> Result<Self, TableError> {
        let columns = self
            .columns
            .iter()
            .map(|c| mapping.get(c).unwrap_or(c).clone())
            .collect();
        Self::new(columns, self.rows.clone())
    }

    pub(crate) fn from_parts(columns: Vec<ColumnName>, rows: Vec<Vec<Value>>) -> Self {
        debug_assert!(rows.iter().all(|row| row.len() == columns.len()));
        Self { columns, rows }
    }
}

impl TryFrom<Vec<Record>> for Table {
    type Error = TableError;

    fn try_from(records: Vec<Record>) -> Result<Self, Self::Error> {
        Self::from_records(&records)
    }
}

impl From<Table> for Vec<Record> {
    fn from(table: Table) -> Self {
        table.to_records()
    }
}

/// Produces `n` column names of the form `COL_<i>` that are not in `used`.
pub(crate) fn fresh_columns(used: &[ColumnName], n: usize) -> Vec<ColumnName> {
    (0..)
        .map(|i| format!("COL_{}", i))
        .filter(|name| !used.contains(name))
        .take(n)
        .collect()
}
