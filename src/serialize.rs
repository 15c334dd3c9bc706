//! The tagged-record AST interchange format.
//!
//! ```json
//! {"type": "node", "op": "select", "children": [
//!     {"type": "node", "op": "table_ref", "children": [{"type": "table_id", "value": 0}]},
//!     {"type": "col_index_list", "value": [0, 2]}
//! ]}
//! ```
//!
//! A hole is written `{"type": <kind>, "hole": true}` with no value.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value as Json};

use crate::ast::{Arg, ArgKind, Literal, Node, Operator};
use crate::error::AstError;
use crate::value::Value;

pub(crate) fn literal_to_json(kind: ArgKind, arg: &Arg<Literal>) -> Json {
    match arg {
        Arg::Hole => json!({"type": kind.name(), "hole": true}),
        Arg::Resolved(literal) => {
            let value = match literal {
                Literal::Index(i) => json!(i),
                Literal::IndexList(list) => json!(list),
                Literal::Symbol(s) => json!(s),
                Literal::Constant(v) => Json::from(v),
            };
            json!({"type": kind.name(), "value": value})
        }
    }
}

fn bad(kind: ArgKind, reason: impl Into<String>) -> AstError {
    AstError::BadLiteral {
        kind,
        reason: reason.into(),
    }
}

fn index_from_json(kind: ArgKind, value: &Json) -> Result<usize, AstError> {
    value
        .as_u64()
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| bad(kind, format!("expected a non-negative integer, found {}", value)))
}

fn literal_from_json(kind: ArgKind, record: &Map<String, Json>) -> Result<Arg<Literal>, AstError> {
    if record.get("hole").and_then(Json::as_bool).unwrap_or(false) {
        return Ok(Arg::Hole);
    }

    // A constant may legitimately be null, so a missing value only matters
    // for the other kinds.
    let value = record.get("value").cloned().unwrap_or(Json::Null);
    let value = &value;
    let literal = match kind {
        ArgKind::TableId | ArgKind::ColIndex => Literal::Index(index_from_json(kind, value)?),
        ArgKind::ColIndexList => {
            let items = value
                .as_array()
                .ok_or_else(|| bad(kind, format!("expected an array, found {}", value)))?;
            Literal::IndexList(
                items
                    .iter()
                    .map(|item| index_from_json(kind, item))
                    .collect::<Result<_, _>>()?,
            )
        }
        ArgKind::BinOp | ArgKind::AggrFunc => Literal::Symbol(
            value
                .as_str()
                .ok_or_else(|| bad(kind, format!("expected a string, found {}", value)))?
                .to_owned(),
        ),
        ArgKind::Constant => Literal::Constant(Value::try_from(value).map_err(|reason| bad(kind, reason))?),
    };
    Ok(Arg::Resolved(literal))
}

fn is_node(record: &Map<String, Json>) -> bool {
    match record.get("type") {
        Some(Json::String(tag)) => tag == "node",
        None => record.contains_key("op"),
        _ => false,
    }
}

impl Node {
    pub fn to_ast(&self) -> Json {
        let op = self.operator();
        let mut children = vec![];
        if let Some(child) = self.child() {
            children.push(child.to_ast());
        }
        children.extend(
            op.arg_kinds()
                .iter()
                .zip(self.args())
                .map(|(&kind, arg)| literal_to_json(kind, &arg)),
        );
        json!({"type": "node", "op": op.name(), "children": children})
    }

    pub fn from_ast(ast: &Json) -> Result<Self, AstError> {
        let record = ast
            .as_object()
            .ok_or_else(|| AstError::MalformedNode(format!("expected an object, found {}", ast)))?;
        if !is_node(record) {
            return Err(AstError::MalformedNode(format!("not a node: {}", ast)));
        }

        let name = record
            .get("op")
            .and_then(Json::as_str)
            .ok_or_else(|| AstError::MalformedNode("missing \"op\"".to_owned()))?;
        let op = Operator::from_name(name).ok_or_else(|| AstError::UnknownOperator(name.to_owned()))?;

        let children = record
            .get("children")
            .and_then(Json::as_array)
            .ok_or_else(|| AstError::MalformedNode(format!("{}: missing \"children\" array", op)))?;

        let mut slots = children.iter();
        let child = if op.is_leaf() {
            None
        } else {
            let slot = slots
                .next()
                .ok_or_else(|| AstError::MalformedNode(format!("{} requires a child program", op)))?;
            match slot.as_object() {
                Some(child) if is_node(child) => Some(Self::from_ast(slot)?),
                _ => {
                    return Err(AstError::MalformedNode(format!(
                        "{}: first child must be a node, found {}",
                        op, slot
                    )))
                }
            }
        };

        let kinds = op.arg_kinds();
        let remaining = slots.len();
        if remaining != kinds.len() {
            return Err(AstError::ArgCount {
                op,
                expected: kinds.len(),
                found: remaining,
            });
        }

        let args = slots
            .zip(kinds)
            .enumerate()
            .map(|(i, (slot, &kind))| {
                let record = slot
                    .as_object()
                    .ok_or_else(|| AstError::MalformedNode(format!("{}: child {} is not a record", op, i + 1)))?;
                if is_node(record) {
                    return Err(AstError::MalformedNode(format!(
                        "{}: argument {} must be a literal, found a node",
                        op,
                        i + 1
                    )));
                }
                match record.get("type").and_then(Json::as_str) {
                    Some(tag) if tag == kind.name() => literal_from_json(kind, record),
                    found => Err(AstError::ArgKind {
                        op,
                        position: i + 1,
                        expected: kind,
                        found: found.unwrap_or("untagged record").to_owned(),
                    }),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_parts(op, child, args)
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_ast().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let ast = Json::deserialize(deserializer)?;
        Self::from_ast(&ast).map_err(serde::de::Error::custom)
    }
}
