use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Number,
    Boolean,
    /// A derived column whose type is only known at evaluation time.
    Unknown,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::String => "string",
            ColumnType::Number => "number",
            ColumnType::Boolean => "boolean",
            ColumnType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Column types in column order. Column-index arguments index into this.
pub type Schema = Vec<ColumnType>;

/// The statically inferred shape of a program's output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputSchema {
    Known(Schema),
    /// The column set depends on runtime values (downstream of `spread`).
    Unresolved,
}

impl OutputSchema {
    pub fn known(&self) -> Option<&Schema> {
        match self {
            OutputSchema::Known(schema) => Some(schema),
            OutputSchema::Unresolved => None,
        }
    }
}

impl fmt::Display for OutputSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputSchema::Known(schema) => {
                f.write_str("[")?;
                for (i, ty) in schema.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", ty)?;
                }
                f.write_str("]")
            }
            OutputSchema::Unresolved => f.write_str("<unresolved>"),
        }
    }
}
