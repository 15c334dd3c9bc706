use std::fmt;

use itertools::Itertools;

use crate::error::AstError;
use crate::value::{quote, Value};

pub type TableId = usize;
pub type ColumnIndex = usize;
pub type Symbol = String;

/// A literal argument slot: either a resolved value or a hole awaiting
/// synthesis.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Arg<T> {
    Resolved(T),
    Hole,
}

impl<T> Arg<T> {
    pub fn is_hole(&self) -> bool {
        matches!(self, Arg::Hole)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Arg<U> {
        match self {
            Arg::Resolved(v) => Arg::Resolved(f(v)),
            Arg::Hole => Arg::Hole,
        }
    }

    pub fn resolved(&self) -> Option<&T> {
        match self {
            Arg::Resolved(v) => Some(v),
            Arg::Hole => None,
        }
    }
}

impl<T> From<T> for Arg<T> {
    fn from(v: T) -> Self {
        Arg::Resolved(v)
    }
}

/// The kind of a literal argument. The serialized name doubles as the `type`
/// tag in the AST format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArgKind {
    TableId,
    ColIndex,
    ColIndexList,
    BinOp,
    AggrFunc,
    Constant,
}

impl ArgKind {
    pub fn name(self) -> &'static str {
        match self {
            ArgKind::TableId => "table_id",
            ArgKind::ColIndex => "col_index",
            ArgKind::ColIndexList => "col_index_list",
            ArgKind::BinOp => "binop",
            ArgKind::AggrFunc => "aggr_func",
            ArgKind::Constant => "constant",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "table_id" => ArgKind::TableId,
            "col_index" => ArgKind::ColIndex,
            "col_index_list" => ArgKind::ColIndexList,
            "binop" => ArgKind::BinOp,
            "aggr_func" => ArgKind::AggrFunc,
            "constant" => ArgKind::Constant,
            _ => return None,
        })
    }
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A literal argument value detached from its node, as produced by domain
/// inference and consumed by [`Node::with_arg`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Literal {
    Index(usize),
    IndexList(Vec<usize>),
    Symbol(Symbol),
    Constant(Value),
}

impl Literal {
    fn describe(&self) -> &'static str {
        match self {
            Literal::Index(_) => "index",
            Literal::IndexList(_) => "index list",
            Literal::Symbol(_) => "symbol",
            Literal::Constant(_) => "constant",
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Index(i) => write!(f, "{}", i),
            Literal::IndexList(list) => write!(f, "[{}]", list.iter().join(", ")),
            Literal::Symbol(s) => f.write_str(&quote(s)),
            Literal::Constant(v) => f.write_str(&v.to_literal_string()),
        }
    }
}

impl fmt::Display for Arg<Literal> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Resolved(literal) => write!(f, "{}", literal),
            Arg::Hole => f.write_str("?"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    TableRef,
    Select,
    Unite,
    Filter,
    Separate,
    Spread,
    Gather,
    GatherNeg,
    GroupSum,
    CumSum,
    Mutate,
    MutateCustom,
}

impl Operator {
    pub const ALL: [Operator; 12] = [
        Operator::TableRef,
        Operator::Select,
        Operator::Unite,
        Operator::Filter,
        Operator::Separate,
        Operator::Spread,
        Operator::Gather,
        Operator::GatherNeg,
        Operator::GroupSum,
        Operator::CumSum,
        Operator::Mutate,
        Operator::MutateCustom,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Operator::TableRef => "table_ref",
            Operator::Select => "select",
            Operator::Unite => "unite",
            Operator::Filter => "filter",
            Operator::Separate => "separate",
            Operator::Spread => "spread",
            Operator::Gather => "gather",
            Operator::GatherNeg => "gather_neg",
            Operator::GroupSum => "group_sum",
            Operator::CumSum => "cumsum",
            Operator::Mutate => "mutate",
            Operator::MutateCustom => "mutate_custom",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }

    /// Kinds of the literal arguments, in position order (position 1 first).
    /// The child program is not listed.
    pub fn arg_kinds(self) -> &'static [ArgKind] {
        use ArgKind::*;
        match self {
            Operator::TableRef => &[TableId],
            Operator::Select => &[ColIndexList],
            Operator::Unite => &[ColIndex, ColIndex],
            Operator::Filter => &[ColIndex, BinOp, Constant],
            Operator::Separate => &[ColIndex],
            Operator::Spread => &[ColIndex, ColIndex],
            Operator::Gather => &[ColIndexList],
            Operator::GatherNeg => &[ColIndexList],
            Operator::GroupSum => &[ColIndexList, ColIndex, AggrFunc],
            Operator::CumSum => &[ColIndex],
            Operator::Mutate => &[ColIndex, BinOp, ColIndex],
            Operator::MutateCustom => &[ColIndex, BinOp, Constant],
        }
    }

    pub fn is_leaf(self) -> bool {
        self == Operator::TableRef
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A program in the table transformation language.
///
/// Every node except `TableRef` owns exactly one child program `q`; column
/// indices always refer to positions in `q`'s output. Nodes are immutable:
/// [`Node::with_arg`] builds a new tree instead of editing in place.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    TableRef {
        table: Arg<TableId>,
    },
    Select {
        q: Box<Node>,
        columns: Arg<Vec<ColumnIndex>>,
    },
    Unite {
        q: Box<Node>,
        col1: Arg<ColumnIndex>,
        col2: Arg<ColumnIndex>,
    },
    Filter {
        q: Box<Node>,
        column: Arg<ColumnIndex>,
        op: Arg<Symbol>,
        constant: Arg<Value>,
    },
    Separate {
        q: Box<Node>,
        column: Arg<ColumnIndex>,
    },
    Spread {
        q: Box<Node>,
        key: Arg<ColumnIndex>,
        value: Arg<ColumnIndex>,
    },
    Gather {
        q: Box<Node>,
        value_columns: Arg<Vec<ColumnIndex>>,
    },
    GatherNeg {
        q: Box<Node>,
        key_columns: Arg<Vec<ColumnIndex>>,
    },
    GroupSum {
        q: Box<Node>,
        group_columns: Arg<Vec<ColumnIndex>>,
        aggr_column: Arg<ColumnIndex>,
        aggr_func: Arg<Symbol>,
    },
    CumSum {
        q: Box<Node>,
        column: Arg<ColumnIndex>,
    },
    Mutate {
        q: Box<Node>,
        col1: Arg<ColumnIndex>,
        op: Arg<Symbol>,
        col2: Arg<ColumnIndex>,
    },
    MutateCustom {
        q: Box<Node>,
        column: Arg<ColumnIndex>,
        op: Arg<Symbol>,
        constant: Arg<Value>,
    },
}

impl Node {
    pub fn table_ref(table: TableId) -> Self {
        Node::TableRef { table: table.into() }
    }

    pub fn select(q: Node, columns: Vec<ColumnIndex>) -> Self {
        Node::Select {
            q: Box::new(q),
            columns: columns.into(),
        }
    }

    pub fn unite(q: Node, col1: ColumnIndex, col2: ColumnIndex) -> Self {
        Node::Unite {
            q: Box::new(q),
            col1: col1.into(),
            col2: col2.into(),
        }
    }

    pub fn filter(q: Node, column: ColumnIndex, op: &str, constant: impl Into<Value>) -> Self {
        Node::Filter {
            q: Box::new(q),
            column: column.into(),
            op: op.to_owned().into(),
            constant: Arg::Resolved(constant.into()),
        }
    }

    pub fn separate(q: Node, column: ColumnIndex) -> Self {
        Node::Separate {
            q: Box::new(q),
            column: column.into(),
        }
    }

    pub fn spread(q: Node, key: ColumnIndex, value: ColumnIndex) -> Self {
        Node::Spread {
            q: Box::new(q),
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn gather(q: Node, value_columns: Vec<ColumnIndex>) -> Self {
        Node::Gather {
            q: Box::new(q),
            value_columns: value_columns.into(),
        }
    }

    pub fn gather_neg(q: Node, key_columns: Vec<ColumnIndex>) -> Self {
        Node::GatherNeg {
            q: Box::new(q),
            key_columns: key_columns.into(),
        }
    }

    pub fn group_sum(q: Node, group_columns: Vec<ColumnIndex>, aggr_column: ColumnIndex, aggr_func: &str) -> Self {
        Node::GroupSum {
            q: Box::new(q),
            group_columns: group_columns.into(),
            aggr_column: aggr_column.into(),
            aggr_func: aggr_func.to_owned().into(),
        }
    }

    pub fn cumsum(q: Node, column: ColumnIndex) -> Self {
        Node::CumSum {
            q: Box::new(q),
            column: column.into(),
        }
    }

    pub fn mutate(q: Node, col1: ColumnIndex, op: &str, col2: ColumnIndex) -> Self {
        Node::Mutate {
            q: Box::new(q),
            col1: col1.into(),
            op: op.to_owned().into(),
            col2: col2.into(),
        }
    }

    pub fn mutate_custom(q: Node, column: ColumnIndex, op: &str, constant: impl Into<Value>) -> Self {
        Node::MutateCustom {
            q: Box::new(q),
            column: column.into(),
            op: op.to_owned().into(),
            constant: Arg::Resolved(constant.into()),
        }
    }

    /// Builds a node with only holes as literal arguments.
    pub fn skeleton(op: Operator, child: Option<Node>) -> Result<Self, AstError> {
        let holes = vec![Arg::Hole; op.arg_kinds().len()];
        Self::from_parts(op, child, holes)
    }

    pub fn operator(&self) -> Operator {
        match self {
            Node::TableRef { .. } => Operator::TableRef,
            Node::Select { .. } => Operator::Select,
            Node::Unite { .. } => Operator::Unite,
            Node::Filter { .. } => Operator::Filter,
            Node::Separate { .. } => Operator::Separate,
            Node::Spread { .. } => Operator::Spread,
            Node::Gather { .. } => Operator::Gather,
            Node::GatherNeg { .. } => Operator::GatherNeg,
            Node::GroupSum { .. } => Operator::GroupSum,
            Node::CumSum { .. } => Operator::CumSum,
            Node::Mutate { .. } => Operator::Mutate,
            Node::MutateCustom { .. } => Operator::MutateCustom,
        }
    }

    pub fn child(&self) -> Option<&Node> {
        match self {
            Node::TableRef { .. } => None,
            Node::Select { q, .. }
            | Node::Unite { q, .. }
            | Node::Filter { q, .. }
            | Node::Separate { q, .. }
            | Node::Spread { q, .. }
            | Node::Gather { q, .. }
            | Node::GatherNeg { q, .. }
            | Node::GroupSum { q, .. }
            | Node::CumSum { q, .. }
            | Node::Mutate { q, .. }
            | Node::MutateCustom { q, .. } => Some(q),
        }
    }

    /// The literal arguments in position order, position 1 first.
    pub fn args(&self) -> Vec<Arg<Literal>> {
        fn index(a: &Arg<usize>) -> Arg<Literal> {
            a.clone().map(Literal::Index)
        }
        fn list(a: &Arg<Vec<usize>>) -> Arg<Literal> {
            a.clone().map(Literal::IndexList)
        }
        fn symbol(a: &Arg<Symbol>) -> Arg<Literal> {
            a.clone().map(Literal::Symbol)
        }
        fn constant_arg(a: &Arg<Value>) -> Arg<Literal> {
            a.clone().map(Literal::Constant)
        }

        match self {
            Node::TableRef { table } => vec![index(table)],
            Node::Select { columns, .. } => vec![list(columns)],
            Node::Unite { col1, col2, .. } => vec![index(col1), index(col2)],
            Node::Filter {
                column, op, constant, ..
            } => vec![index(column), symbol(op), constant_arg(constant)],
            Node::Separate { column, .. } => vec![index(column)],
            Node::Spread { key, value, .. } => vec![index(key), index(value)],
            Node::Gather { value_columns, .. } => vec![list(value_columns)],
            Node::GatherNeg { key_columns, .. } => vec![list(key_columns)],
            Node::GroupSum {
                group_columns,
                aggr_column,
                aggr_func,
                ..
            } => vec![list(group_columns), index(aggr_column), symbol(aggr_func)],
            Node::CumSum { column, .. } => vec![index(column)],
            Node::Mutate { col1, op, col2, .. } => vec![index(col1), symbol(op), index(col2)],
            Node::MutateCustom {
                column, op, constant, ..
            } => vec![index(column), symbol(op), constant_arg(constant)],
        }
    }

    /// Reassembles a node from its operator, child and literal arguments,
    /// checking that the argument count and literal kinds match the operator.
    pub fn from_parts(op: Operator, child: Option<Node>, args: Vec<Arg<Literal>>) -> Result<Self, AstError> {
        let kinds = op.arg_kinds();
        if args.len() != kinds.len() {
            return Err(AstError::ArgCount {
                op,
                expected: kinds.len(),
                found: args.len(),
            });
        }

        let mut args = ArgReader {
            op,
            args: args.into_iter(),
            position: 0,
        };
        if op.is_leaf() {
            if child.is_some() {
                return Err(AstError::MalformedNode(format!("{} takes no child program", op)));
            }
            return Ok(Node::TableRef { table: args.index()? });
        }
        let q = Box::new(
            child.ok_or_else(|| AstError::MalformedNode(format!("{} requires a child program", op)))?,
        );

        let node = match op {
            Operator::TableRef => unreachable!("leaf operators are handled above"),
            Operator::Select => Node::Select {
                q,
                columns: args.list()?,
            },
            Operator::Unite => Node::Unite {
                q,
                col1: args.index()?,
                col2: args.index()?,
            },
            Operator::Filter => Node::Filter {
                q,
                column: args.index()?,
                op: args.symbol()?,
                constant: args.constant()?,
            },
            Operator::Separate => Node::Separate {
                q,
                column: args.index()?,
            },
            Operator::Spread => Node::Spread {
                q,
                key: args.index()?,
                value: args.index()?,
            },
            Operator::Gather => Node::Gather {
                q,
                value_columns: args.list()?,
            },
            Operator::GatherNeg => Node::GatherNeg {
                q,
                key_columns: args.list()?,
            },
            Operator::GroupSum => Node::GroupSum {
                q,
                group_columns: args.list()?,
                aggr_column: args.index()?,
                aggr_func: args.symbol()?,
            },
            Operator::CumSum => Node::CumSum {
                q,
                column: args.index()?,
            },
            Operator::Mutate => Node::Mutate {
                q,
                col1: args.index()?,
                op: args.symbol()?,
                col2: args.index()?,
            },
            Operator::MutateCustom => Node::MutateCustom {
                q,
                column: args.index()?,
                op: args.symbol()?,
                constant: args.constant()?,
            },
        };
        Ok(node)
    }

    /// Returns a copy of this node with the argument at 1-based `position`
    /// replaced by `literal`. This is how a hole is filled with a domain
    /// candidate.
    pub fn with_arg(&self, position: usize, literal: Literal) -> Result<Self, AstError> {
        let op = self.operator();
        let mut args = self.args();
        let slot = position
            .checked_sub(1)
            .and_then(|i| args.get_mut(i))
            .ok_or_else(|| AstError::MalformedNode(format!("{} has no argument at position {}", op, position)))?;
        *slot = Arg::Resolved(literal);
        Self::from_parts(op, self.child().cloned(), args)
    }

    /// True iff any literal argument in the subtree is a hole.
    pub fn is_partial(&self) -> bool {
        self.args().iter().any(Arg::is_hole) || self.child().map_or(false, Node::is_partial)
    }

    /// Number of nodes in the tree.
    pub fn size(&self) -> usize {
        1 + self.child().map_or(0, Node::size)
    }
}

/// Pulls typed arguments off a literal list while tracking the position for
/// error reporting.
struct ArgReader {
    op: Operator,
    args: std::vec::IntoIter<Arg<Literal>>,
    position: usize,
}

impl ArgReader {
    fn next(&mut self) -> Option<Arg<Literal>> {
        self.position += 1;
        self.args.next()
    }

    fn mismatch(&self, literal: &Literal) -> AstError {
        AstError::ArgKind {
            op: self.op,
            position: self.position,
            expected: self.op.arg_kinds()[self.position - 1],
            found: literal.describe().to_owned(),
        }
    }

    fn take<T>(&mut self, f: impl FnOnce(Literal) -> Result<T, Literal>) -> Result<Arg<T>, AstError> {
        match self.next() {
            Some(Arg::Resolved(literal)) => f(literal).map(Arg::Resolved).map_err(|l| self.mismatch(&l)),
            Some(Arg::Hole) | None => Ok(Arg::Hole),
        }
    }

    fn index(&mut self) -> Result<Arg<usize>, AstError> {
        self.take(|l| match l {
            Literal::Index(i) => Ok(i),
            other => Err(other),
        })
    }

    fn list(&mut self) -> Result<Arg<Vec<usize>>, AstError> {
        self.take(|l| match l {
            Literal::IndexList(list) => Ok(list),
            other => Err(other),
        })
    }

    fn symbol(&mut self) -> Result<Arg<Symbol>, AstError> {
        self.take(|l| match l {
            Literal::Symbol(s) => Ok(s),
            other => Err(other),
        })
    }

    fn constant(&mut self) -> Result<Arg<Value>, AstError> {
        self.take(|l| match l {
            Literal::Constant(v) => Ok(v),
            other => Err(other),
        })
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.operator())?;
        let mut first = true;
        if let Some(child) = self.child() {
            write!(f, "{}", child)?;
            first = false;
        }
        for arg in self.args() {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{}", arg)?;
            first = false;
        }
        f.write_str(")")
    }
}
