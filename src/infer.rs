use itertools::Itertools;

use crate::ast::{Arg, ColumnIndex, Node, Operator};
use crate::error::EvalError;
use crate::eval::AggrFunc;
use crate::schema::{ColumnType, OutputSchema, Schema};

fn needed<T>(op: Operator, position: usize, arg: &Arg<T>) -> Result<&T, EvalError> {
    arg.resolved().ok_or(EvalError::Hole { op, position })
}

fn in_range(op: Operator, schema: &Schema, index: ColumnIndex) -> Result<ColumnIndex, EvalError> {
    if index < schema.len() {
        Ok(index)
    } else {
        Err(EvalError::ColumnOutOfRange {
            op,
            index,
            width: schema.len(),
        })
    }
}

/// Range-checks a column argument only if it has been resolved.
fn in_range_if_set(op: Operator, schema: &Schema, arg: &Arg<ColumnIndex>) -> Result<(), EvalError> {
    if let Some(&index) = arg.resolved() {
        in_range(op, schema, index)?;
    }
    Ok(())
}

fn require(op: Operator, schema: &Schema, index: ColumnIndex, expected: ColumnType) -> Result<ColumnIndex, EvalError> {
    let found = schema[in_range(op, schema, index)?];
    if found == expected {
        Ok(index)
    } else {
        Err(EvalError::SchemaViolation {
            op,
            index,
            expected,
            found,
        })
    }
}

fn column_set(op: Operator, schema: &Schema, indices: &[ColumnIndex]) -> Result<Vec<ColumnIndex>, EvalError> {
    indices
        .iter()
        .copied()
        .sorted()
        .dedup()
        .map(|i| in_range(op, schema, i))
        .collect()
}

fn pick(schema: &Schema, indices: impl IntoIterator<Item = ColumnIndex>) -> Schema {
    indices.into_iter().map(|i| schema[i]).collect()
}

fn without(schema: &Schema, dropped: &[ColumnIndex]) -> Schema {
    pick(schema, (0..schema.len()).filter(|i| !dropped.contains(i)))
}

impl Node {
    /// Infers the output column types from the input schemas alone.
    ///
    /// Partial programs are inferred up to the first hole whose value the
    /// output schema depends on. Anything downstream of `spread` is
    /// [`OutputSchema::Unresolved`].
    pub fn infer_output_schema(&self, inputs: &[Schema]) -> Result<OutputSchema, EvalError> {
        let op = self.operator();

        let schema = match self.child() {
            None => Schema::new(),
            Some(q) => match q.infer_output_schema(inputs)? {
                OutputSchema::Known(schema) => schema,
                OutputSchema::Unresolved => return Ok(OutputSchema::Unresolved),
            },
        };

        let out = match self {
            Node::TableRef { table } => {
                let id = *needed(op, 1, table)?;
                inputs.get(id).cloned().ok_or(EvalError::UnknownTable(id))?
            }

            Node::Select { columns, .. } => {
                let keep = column_set(op, &schema, needed(op, 1, columns)?)?;
                pick(&schema, keep)
            }

            Node::Unite { col1, col2, .. } => {
                let c1 = require(op, &schema, *needed(op, 1, col1)?, ColumnType::String)?;
                let c2 = require(op, &schema, *needed(op, 2, col2)?, ColumnType::String)?;
                let mut out = without(&schema, &[c1, c2]);
                out.push(ColumnType::String);
                out
            }

            Node::Filter { column, .. } => {
                in_range_if_set(op, &schema, column)?;
                schema
            }

            Node::Separate { column, .. } => {
                let c = require(op, &schema, *needed(op, 1, column)?, ColumnType::String)?;
                let mut out = without(&schema, &[c]);
                out.extend([ColumnType::String, ColumnType::String]);
                out
            }

            Node::Spread { key, value, .. } => {
                in_range_if_set(op, &schema, key)?;
                in_range_if_set(op, &schema, value)?;
                return Ok(OutputSchema::Unresolved);
            }

            Node::Gather { value_columns, .. } => {
                let melted = column_set(op, &schema, needed(op, 1, value_columns)?)?;
                let mut out = without(&schema, &melted);
                out.extend([ColumnType::String, ColumnType::Unknown]);
                out
            }

            Node::GatherNeg { key_columns, .. } => {
                let ids = column_set(op, &schema, needed(op, 1, key_columns)?)?;
                let mut out = pick(&schema, ids);
                out.extend([ColumnType::String, ColumnType::Unknown]);
                out
            }

            Node::GroupSum {
                group_columns,
                aggr_column,
                aggr_func,
                ..
            } => {
                let groups = column_set(op, &schema, needed(op, 1, group_columns)?)?;
                let target = in_range(op, &schema, *needed(op, 2, aggr_column)?)?;
                if groups.contains(&target) {
                    return Err(EvalError::AggregateInGroup { index: target });
                }
                let func = AggrFunc::parse(needed(op, 3, aggr_func)?)?;
                if func.is_numeric() {
                    require(op, &schema, target, ColumnType::Number)?;
                }
                let aggregated = match func {
                    AggrFunc::Count => ColumnType::Number,
                    _ => schema[target],
                };
                let mut out = pick(&schema, groups);
                out.push(aggregated);
                out
            }

            Node::CumSum { column, .. } => {
                require(op, &schema, *needed(op, 1, column)?, ColumnType::Number)?;
                let mut out = schema;
                out.push(ColumnType::Number);
                out
            }

            Node::Mutate { col1, col2, .. } => {
                require(op, &schema, *needed(op, 1, col1)?, ColumnType::Number)?;
                require(op, &schema, *needed(op, 3, col2)?, ColumnType::Number)?;
                let mut out = schema;
                out.push(ColumnType::Number);
                out
            }

            Node::MutateCustom { column, .. } => {
                require(op, &schema, *needed(op, 1, column)?, ColumnType::Number)?;
                let mut out = schema;
                out.push(ColumnType::Boolean);
                out
            }
        };

        Ok(OutputSchema::Known(out))
    }
}
