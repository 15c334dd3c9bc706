use std::borrow::BorrowMut;
use std::collections::HashMap;

use anyhow::{anyhow, bail, Context, Result};
use pest::Parser as _;
use pest_derive::Parser;

use crate::ast::{Arg, ArgKind, Literal, Node, Operator};
use crate::value::Value;

#[derive(Parser)]
#[grammar = "tablang.pest"]
struct Parser;

type Pair<'a> = pest::iterators::Pair<'a, Rule>;
type Pairs<'a> = pest::iterators::Pairs<'a, Rule>;

/// Temporaries bound by earlier statements.
type Scope = HashMap<String, Node>;

/// Parses a program written as nested calls, e.g.
/// `filter(table_ref(0), 0, "==", "A")`. `?` stands for a hole.
pub fn parse_program(code: &str) -> Result<Node> {
    let program = Parser::parse(Rule::program, code)
        .context("Failed to parse program")?
        .next()
        .unwrap();

    let call = expect_next_rule(program.into_inner(), Rule::call);
    convert_call(call, None)
}

/// Parses the statement form printed by [`Node::stmt_string`], e.g.
/// `t0 <- table_ref(0); t1 <- select(t0, [0, 2])`, and rebuilds the tree
/// computed by the last statement.
pub fn parse_statements(code: &str) -> Result<Node> {
    let statements = Parser::parse(Rule::statements, code)
        .context("Failed to parse statements")?
        .next()
        .unwrap();

    let mut scope = Scope::new();
    let mut last = None;
    for pair in statements
        .into_inner()
        .take_while(|pair| pair.as_rule() != Rule::EOI)
    {
        let mut pairs = pair.into_inner();
        let name = expect_identifier(&mut pairs);
        let node = convert_call(expect_next_rule(&mut pairs, Rule::call), Some(&scope))?;
        scope.insert(name, node.clone());
        last = Some(node);
    }

    last.ok_or_else(|| anyhow!("No statements"))
}

/// Parses either form: statements if the text contains `<-`, a nested call
/// otherwise.
pub fn parse_any(code: &str) -> Result<Node> {
    if code.contains("<-") {
        parse_statements(code)
    } else {
        parse_program(code)
    }
}

fn expect_next_rule<'a, P: BorrowMut<Pairs<'a>>>(mut pairs: P, rule: Rule) -> Pair<'a> {
    let pair = pairs.borrow_mut().next().expect("missing pair");
    assert_eq!(pair.as_rule(), rule);
    pair
}

fn expect_identifier<'a, P: BorrowMut<Pairs<'a>>>(pairs: P) -> String {
    expect_next_rule(pairs, Rule::identifier).as_str().to_string()
}

/// An argument as written, before it is checked against the operator's
/// expected literal kind.
enum RawArg {
    Node(Node),
    Hole,
    Number(String),
    List(Vec<String>),
    Str(String),
    Bool(bool),
    Null,
}

impl RawArg {
    fn describe(&self) -> &'static str {
        match self {
            RawArg::Node(_) => "a program",
            RawArg::Hole => "a hole",
            RawArg::Number(_) => "a number",
            RawArg::List(_) => "a list",
            RawArg::Str(_) => "a string",
            RawArg::Bool(_) => "a boolean",
            RawArg::Null => "null",
        }
    }

    fn into_arg(self, op: Operator, kind: ArgKind) -> Result<Arg<Literal>> {
        let index = |s: &str| {
            s.parse::<usize>()
                .with_context(|| format!("{}: {:?} is not a valid {}", op, s, kind))
        };

        let literal = match (kind, self) {
            (_, RawArg::Hole) => return Ok(Arg::Hole),
            (ArgKind::TableId | ArgKind::ColIndex, RawArg::Number(s)) => Literal::Index(index(s.as_str())?),
            (ArgKind::ColIndexList, RawArg::List(items)) => {
                Literal::IndexList(items.iter().map(|s| index(s.as_str())).collect::<Result<_>>()?)
            }
            (ArgKind::BinOp | ArgKind::AggrFunc, RawArg::Str(s)) => Literal::Symbol(s),
            (ArgKind::Constant, RawArg::Str(s)) => Literal::Constant(Value::String(s)),
            (ArgKind::Constant, RawArg::Number(s)) => {
                let x = s
                    .parse::<f64>()
                    .with_context(|| format!("{}: invalid number {:?}", op, s))?;
                Literal::Constant(Value::Number(x))
            }
            (ArgKind::Constant, RawArg::Bool(b)) => Literal::Constant(Value::Bool(b)),
            (ArgKind::Constant, RawArg::Null) => Literal::Constant(Value::Null),
            (kind, other) => bail!("{}: expected a {} literal, found {}", op, kind, other.describe()),
        };
        Ok(Arg::Resolved(literal))
    }
}

fn convert_call(pair: Pair, scope: Option<&Scope>) -> Result<Node> {
    assert_eq!(pair.as_rule(), Rule::call);
    let mut pairs = pair.into_inner();
    let name = expect_identifier(&mut pairs);
    let op = Operator::from_name(&name).ok_or_else(|| anyhow!("Unknown operator {:?}", name))?;

    let mut raw = pairs
        .map(|arg| convert_arg(arg, scope))
        .collect::<Result<Vec<_>>>()?;

    let child = if op.is_leaf() {
        None
    } else if raw.is_empty() {
        bail!("{} requires a child program", op);
    } else {
        match raw.remove(0) {
            RawArg::Node(node) => Some(node),
            other => bail!("{}: first argument must be a program, found {}", op, other.describe()),
        }
    };

    let kinds = op.arg_kinds();
    if raw.len() != kinds.len() {
        bail!("{}: expected {} arguments, found {}", op, kinds.len(), raw.len());
    }

    let args = raw
        .into_iter()
        .zip(kinds)
        .map(|(arg, &kind)| arg.into_arg(op, kind))
        .collect::<Result<Vec<_>>>()?;

    Ok(Node::from_parts(op, child, args)?)
}

fn convert_arg(pair: Pair, scope: Option<&Scope>) -> Result<RawArg> {
    assert_eq!(pair.as_rule(), Rule::arg);
    let pair = pair.into_inner().next().unwrap();

    let arg = match pair.as_rule() {
        Rule::call => RawArg::Node(convert_call(pair, scope)?),

        Rule::variable => {
            let name = expect_identifier(pair.into_inner());
            let node = scope
                .and_then(|scope| scope.get(&name))
                .ok_or_else(|| anyhow!("Unknown variable {:?}", name))?;
            RawArg::Node(node.clone())
        }

        Rule::hole => RawArg::Hole,

        Rule::list => RawArg::List(pair.into_inner().map(|p| p.as_str().to_owned()).collect()),

        Rule::string_literal => {
            let interior = expect_next_rule(pair.into_inner(), Rule::string_interior);
            RawArg::Str(unescape(interior.as_str()))
        }

        Rule::number => RawArg::Number(pair.as_str().to_owned()),

        Rule::boolean => RawArg::Bool(pair.as_str() == "true"),

        Rule::null => RawArg::Null,

        _ => unreachable!(),
    };
    Ok(arg)
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}
