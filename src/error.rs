use thiserror::Error;

use crate::ast::{ArgKind, Operator, TableId};
use crate::schema::ColumnType;

/// Failures raised while evaluating a program or inferring its schema.
///
/// Any of these makes the program being evaluated invalid; callers that
/// enumerate candidates discard the program and move on.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum EvalError {
    #[error("unknown input table {0}")]
    UnknownTable(TableId),

    #[error("{op}: column index {index} out of range for a {width}-column table")]
    ColumnOutOfRange {
        op: Operator,
        index: usize,
        width: usize,
    },

    #[error("{op}: column {index} has type {found}, expected {expected}")]
    SchemaViolation {
        op: Operator,
        index: usize,
        expected: ColumnType,
        found: ColumnType,
    },

    #[error("{op}: unsupported operator symbol {symbol:?}")]
    UnsupportedSymbol { op: Operator, symbol: String },

    #[error("{op}: value {value:?} has no separator to split on")]
    Unsplittable { op: Operator, value: String },

    #[error("spread: more than one value for key {key:?} in the same index group")]
    AmbiguousSpread { key: String },

    #[error("group_sum: aggregate column {index} is also a group column")]
    AggregateInGroup { index: usize },

    #[error("{op}: output column {name:?} would appear twice")]
    DuplicateColumn { op: Operator, name: String },

    #[error("{op}: argument {position} is an unresolved hole")]
    Hole { op: Operator, position: usize },

    #[error("cannot evaluate a partial program")]
    PartialProgram,
}

/// Structural problems in a serialized or hand-built program.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum AstError {
    #[error("unknown operator {0:?}")]
    UnknownOperator(String),

    #[error("malformed node: {0}")]
    MalformedNode(String),

    #[error("{op}: expected {expected} arguments, found {found}")]
    ArgCount {
        op: Operator,
        expected: usize,
        found: usize,
    },

    #[error("{op}: argument {position} should be a {expected} literal, found {found}")]
    ArgKind {
        op: Operator,
        position: usize,
        expected: ArgKind,
        found: String,
    },

    #[error("malformed {kind} literal: {reason}")]
    BadLiteral { kind: ArgKind, reason: String },
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum DomainError {
    #[error("{op} has no inferable argument at position {position}")]
    NoSuchArgument { op: Operator, position: usize },

    #[error(transparent)]
    Schema(#[from] EvalError),
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum TableError {
    #[error("duplicate column name {0:?}")]
    DuplicateColumn(String),

    #[error("row {row} has {found} values, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("column {column:?}: {reason}")]
    BadValue { column: String, reason: String },
}
