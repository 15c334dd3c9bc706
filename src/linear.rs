use std::fmt;

use itertools::Itertools;
use serde_json::{json, Value as Json};

use crate::ast::{Arg, ArgKind, Literal, Node, Operator};
use crate::serialize::literal_to_json;

/// One argument of a statement: a reference to an earlier temporary, or a
/// literal of the given kind.
#[derive(Clone, Debug, PartialEq)]
pub enum StatementArg {
    Var(String),
    Literal(ArgKind, Arg<Literal>),
}

/// `result <- op(args...)`
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub result: String,
    pub op: Operator,
    pub args: Vec<StatementArg>,
}

impl Statement {
    /// The record form, with subtree slots written as
    /// `{"type": "variable", "value": <temp>}`.
    pub fn to_json(&self) -> Json {
        let children = self
            .args
            .iter()
            .map(|arg| match arg {
                StatementArg::Var(var) => json!({"type": "variable", "value": var}),
                StatementArg::Literal(kind, literal) => literal_to_json(*kind, literal),
            })
            .collect_vec();
        json!({
            "type": "node",
            "op": self.op.name(),
            "children": children,
            "return_as": self.result,
        })
    }
}

impl fmt::Display for StatementArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementArg::Var(var) => f.write_str(var),
            StatementArg::Literal(_, literal) => write!(f, "{}", literal),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- {}({})", self.result, self.op, self.args.iter().join(", "))
    }
}

fn fresh_temp(used: &[Statement]) -> String {
    (0..)
        .map(|i| format!("t{}", i))
        .find(|name| used.iter().all(|stmt| &stmt.result != name))
        .unwrap_or_default()
}

fn linearize_into(node: &Node, out: &mut Vec<Statement>) -> String {
    let mut args = vec![];
    if let Some(child) = node.child() {
        args.push(StatementArg::Var(linearize_into(child, out)));
    }
    let op = node.operator();
    args.extend(
        op.arg_kinds()
            .iter()
            .zip(node.args())
            .map(|(&kind, arg)| StatementArg::Literal(kind, arg)),
    );

    let result = fresh_temp(out);
    out.push(Statement {
        result: result.clone(),
        op,
        args,
    });
    result
}

impl Node {
    /// Flattens the tree into single-assignment statements in post-order:
    /// every temporary is defined before it is referenced, and the last
    /// statement computes the whole program.
    pub fn linearize(&self) -> Vec<Statement> {
        let mut out = vec![];
        linearize_into(self, &mut out);
        out
    }

    /// `t0 <- table_ref(0); t1 <- select(t0, [0, 2])`
    pub fn stmt_string(&self) -> String {
        self.linearize().iter().join("; ")
    }
}
