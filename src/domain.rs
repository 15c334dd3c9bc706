use itertools::Itertools;

use crate::ast::{ArgKind, Literal, Node, Operator};
use crate::config::SearchConfig;
use crate::error::DomainError;
use crate::schema::{ColumnType, Schema};

/// What a column argument accepts.
enum Columns {
    Any,
    Typed(ColumnType),
    /// Column sets with a size range derived from the child's width `n`.
    Sets(fn(usize) -> (usize, usize)),
}

fn single(schema: &Schema, filter: Option<ColumnType>) -> Vec<Literal> {
    schema
        .iter()
        .enumerate()
        .filter(|(_, &ty)| filter.map_or(true, |wanted| ty == wanted))
        .map(|(i, _)| Literal::Index(i))
        .collect()
}

/// All combinations of `0..n` with sizes in `min..=max`, smaller sizes first.
fn combinations(n: usize, min: usize, max: usize) -> Vec<Literal> {
    (min.max(1)..=max.min(n))
        .flat_map(|size| (0..n).combinations(size))
        .map(Literal::IndexList)
        .collect()
}

fn symbols(symbols: &[String]) -> Vec<Literal> {
    symbols.iter().cloned().map(Literal::Symbol).collect()
}

impl Node {
    /// Candidate values for the argument at 1-based `position`, given the
    /// input schemas and the search config. Position 0 is the child program
    /// and is never inferred.
    ///
    /// Only the child's schema is consulted; the node's own arguments may be
    /// holes. When the child's schema is unresolved, column arguments have no
    /// candidates.
    pub fn domain(&self, position: usize, inputs: &[Schema], config: &SearchConfig) -> Result<Vec<Literal>, DomainError> {
        let op = self.operator();
        let no_such = DomainError::NoSuchArgument { op, position };

        let kind = match position.checked_sub(1).and_then(|i| op.arg_kinds().get(i)) {
            Some(&kind) if !op.is_leaf() => kind,
            _ => return Err(no_such),
        };

        let columns = match kind {
            ArgKind::BinOp => {
                return Ok(match op {
                    Operator::Filter => symbols(&config.filter_op),
                    _ => symbols(&config.mutate_op),
                })
            }
            ArgKind::AggrFunc => return Ok(symbols(&config.aggr_func)),
            ArgKind::Constant => return Ok(config.constants.iter().cloned().map(Literal::Constant).collect()),
            ArgKind::TableId => return Err(no_such),
            ArgKind::ColIndex | ArgKind::ColIndexList => match (op, position) {
                (Operator::Select, _) => Columns::Sets(|n| (1, n)),
                (Operator::Gather, _) => Columns::Sets(|n| (2, n.saturating_sub(1))),
                (Operator::GatherNeg, _) => Columns::Sets(|n| (1, n.saturating_sub(2))),
                (Operator::GroupSum, 1) => Columns::Sets(|n| (1, n.saturating_sub(1))),
                (Operator::GroupSum, _) => Columns::Typed(ColumnType::Number),
                (Operator::Unite | Operator::Separate, _) => Columns::Typed(ColumnType::String),
                (Operator::CumSum | Operator::Mutate | Operator::MutateCustom, _) => {
                    Columns::Typed(ColumnType::Number)
                }
                (Operator::Filter | Operator::Spread | Operator::TableRef, _) => Columns::Any,
            },
        };

        let child = self.child().ok_or(no_such)?;
        let schema = match child.infer_output_schema(inputs)?.known() {
            Some(schema) => schema.clone(),
            None => return Ok(vec![]),
        };

        Ok(match columns {
            Columns::Any => single(&schema, None),
            Columns::Typed(ty) => single(&schema, Some(ty)),
            Columns::Sets(range) => {
                let (min, max) = range(schema.len());
                combinations(schema.len(), min, max)
            }
        })
    }
}
