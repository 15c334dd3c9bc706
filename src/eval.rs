use std::collections::{BTreeMap, BTreeSet, HashMap};

use itertools::Itertools;

use crate::ast::{Arg, ColumnIndex, Node, Operator};
use crate::error::EvalError;
use crate::schema::ColumnType;
use crate::table::{fresh_columns, ColumnName, Table};
use crate::value::Value;

pub const KEY_COLUMN: &str = "KEY";
pub const VALUE_COLUMN: &str = "VALUE";
pub const CUMSUM_COLUMN: &str = "cumsum";

pub const FILTER_OPS: [&str; 2] = ["==", "!="];
pub const MUTATE_OPS: [&str; 2] = ["+", "-"];
pub const MUTATE_CUSTOM_OPS: [&str; 1] = ["=="];
pub const AGGR_FUNCS: [&str; 5] = ["count", "sum", "min", "max", "mean"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Comparator {
    Eq,
    Ne,
}

impl Comparator {
    fn parse(op: Operator, symbol: &str) -> Result<Self, EvalError> {
        match symbol {
            "==" => Ok(Comparator::Eq),
            "!=" => Ok(Comparator::Ne),
            _ => Err(unsupported(op, symbol)),
        }
    }

    fn holds(self, lhs: &Value, rhs: &Value) -> bool {
        match self {
            Comparator::Eq => lhs == rhs,
            Comparator::Ne => lhs != rhs,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
}

impl BinOp {
    fn parse(op: Operator, symbol: &str) -> Result<Self, EvalError> {
        match symbol {
            "+" => Ok(BinOp::Add),
            "-" => Ok(BinOp::Sub),
            _ => Err(unsupported(op, symbol)),
        }
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AggrFunc {
    Count,
    Sum,
    Min,
    Max,
    Mean,
}

impl AggrFunc {
    pub(crate) fn parse(symbol: &str) -> Result<Self, EvalError> {
        match symbol {
            "count" => Ok(AggrFunc::Count),
            "sum" => Ok(AggrFunc::Sum),
            "min" => Ok(AggrFunc::Min),
            "max" => Ok(AggrFunc::Max),
            "mean" => Ok(AggrFunc::Mean),
            _ => Err(unsupported(Operator::GroupSum, symbol)),
        }
    }

    pub(crate) fn is_numeric(self) -> bool {
        matches!(self, AggrFunc::Sum | AggrFunc::Mean)
    }

    fn reduce(self, column: ColumnIndex, values: &[Value]) -> Result<Value, EvalError> {
        let present = values.iter().filter(|v| !v.is_null());
        let value = match self {
            AggrFunc::Count => Value::Number(present.count() as f64),
            AggrFunc::Min => present.min().cloned().unwrap_or(Value::Null),
            AggrFunc::Max => present.max().cloned().unwrap_or(Value::Null),
            AggrFunc::Sum | AggrFunc::Mean => {
                let numbers = present
                    .map(|v| number(Operator::GroupSum, column, v))
                    .collect::<Result<Vec<f64>, _>>()?;
                let total: f64 = numbers.iter().sum();
                match self {
                    AggrFunc::Sum => Value::Number(total),
                    _ if numbers.is_empty() => Value::Null,
                    _ => Value::Number(total / numbers.len() as f64),
                }
            }
        };
        Ok(value)
    }
}

fn unsupported(op: Operator, symbol: &str) -> EvalError {
    EvalError::UnsupportedSymbol {
        op,
        symbol: symbol.to_owned(),
    }
}

fn number(op: Operator, index: ColumnIndex, value: &Value) -> Result<f64, EvalError> {
    value.as_number().ok_or_else(|| mismatch(op, index, ColumnType::Number, value))
}

fn mismatch(op: Operator, index: ColumnIndex, expected: ColumnType, value: &Value) -> EvalError {
    EvalError::SchemaViolation {
        op,
        index,
        expected,
        found: value.column_type().unwrap_or(ColumnType::Unknown),
    }
}

/// Unwraps an argument of a program already known to be concrete.
fn arg<T>(op: Operator, position: usize, arg: &Arg<T>) -> Result<&T, EvalError> {
    arg.resolved().ok_or(EvalError::Hole { op, position })
}

fn check_column(op: Operator, table: &Table, index: ColumnIndex) -> Result<ColumnIndex, EvalError> {
    if index < table.width() {
        Ok(index)
    } else {
        Err(EvalError::ColumnOutOfRange {
            op,
            index,
            width: table.width(),
        })
    }
}

/// Sorted, de-duplicated and range-checked column set.
fn check_columns(op: Operator, table: &Table, indices: &[ColumnIndex]) -> Result<Vec<ColumnIndex>, EvalError> {
    indices
        .iter()
        .copied()
        .sorted()
        .dedup()
        .map(|i| check_column(op, table, i))
        .collect()
}

fn build(op: Operator, columns: Vec<ColumnName>, rows: Vec<Vec<Value>>) -> Result<Table, EvalError> {
    if let Some(name) = columns.iter().duplicates().next() {
        return Err(EvalError::DuplicateColumn {
            op,
            name: name.clone(),
        });
    }
    Ok(Table::from_parts(columns, rows))
}

impl Node {
    /// Evaluates a concrete program against `env`, where `env[i]` is the
    /// input table with id `i`.
    pub fn evaluate(&self, env: &[Table]) -> Result<Table, EvalError> {
        if self.is_partial() {
            return Err(EvalError::PartialProgram);
        }
        self.eval(env)
    }

    fn eval(&self, env: &[Table]) -> Result<Table, EvalError> {
        let op = self.operator();
        let input = match self.child() {
            Some(q) => q.eval(env)?,
            None => Table::default(),
        };

        match self {
            Node::TableRef { table } => {
                let id = *arg(op, 1, table)?;
                env.get(id).cloned().ok_or(EvalError::UnknownTable(id))
            }

            Node::Select { columns, .. } => {
                let keep = check_columns(op, &input, arg(op, 1, columns)?)?;
                let names = keep.iter().map(|&i| input.columns()[i].clone()).collect();
                let rows = input
                    .rows()
                    .iter()
                    .map(|row| keep.iter().map(|&i| row[i].clone()).collect())
                    .collect();
                build(op, names, rows)
            }

            Node::Unite { col1, col2, .. } => {
                let c1 = check_column(op, &input, *arg(op, 1, col1)?)?;
                let c2 = check_column(op, &input, *arg(op, 2, col2)?)?;
                let rest = (0..input.width()).filter(|&i| i != c1 && i != c2).collect_vec();

                let mut names = rest.iter().map(|&i| input.columns()[i].clone()).collect_vec();
                names.extend(fresh_columns(input.columns(), 1));

                let rows = input
                    .rows()
                    .iter()
                    .map(|row| {
                        let united = match (&row[c1], &row[c2]) {
                            (Value::String(a), Value::String(b)) => Value::String(format!("{}_{}", a, b)),
                            (Value::Null, _) | (_, Value::Null) => Value::Null,
                            (Value::String(_), other) => return Err(mismatch(op, c2, ColumnType::String, other)),
                            (other, _) => return Err(mismatch(op, c1, ColumnType::String, other)),
                        };
                        let mut out = rest.iter().map(|&i| row[i].clone()).collect_vec();
                        out.push(united);
                        Ok(out)
                    })
                    .collect::<Result<_, _>>()?;
                build(op, names, rows)
            }

            Node::Filter {
                column, op: cmp, constant, ..
            } => {
                let c = check_column(op, &input, *arg(op, 1, column)?)?;
                let cmp = Comparator::parse(op, arg(op, 2, cmp)?)?;
                let constant = arg(op, 3, constant)?;
                let rows = input
                    .rows()
                    .iter()
                    .filter(|row| cmp.holds(&row[c], constant))
                    .cloned()
                    .collect();
                build(op, input.columns().to_vec(), rows)
            }

            Node::Separate { column, .. } => {
                let c = check_column(op, &input, *arg(op, 1, column)?)?;
                let rest = (0..input.width()).filter(|&i| i != c).collect_vec();

                let mut names = rest.iter().map(|&i| input.columns()[i].clone()).collect_vec();
                names.extend(fresh_columns(input.columns(), 2));

                let rows = input
                    .rows()
                    .iter()
                    .map(|row| {
                        let (left, right) = match &row[c] {
                            Value::String(s) => {
                                let (l, r) = split_once_run(s).ok_or_else(|| EvalError::Unsplittable {
                                    op,
                                    value: s.clone(),
                                })?;
                                (Value::from(l), Value::from(r))
                            }
                            Value::Null => (Value::Null, Value::Null),
                            other => return Err(mismatch(op, c, ColumnType::String, other)),
                        };
                        let mut out = rest.iter().map(|&i| row[i].clone()).collect_vec();
                        out.push(left);
                        out.push(right);
                        Ok(out)
                    })
                    .collect::<Result<_, _>>()?;
                build(op, names, rows)
            }

            Node::Spread { key, value, .. } => {
                let k = check_column(op, &input, *arg(op, 1, key)?)?;
                let v = check_column(op, &input, *arg(op, 2, value)?)?;
                spread(&input, k, v)
            }

            Node::Gather { value_columns, .. } => {
                let melted = check_columns(op, &input, arg(op, 1, value_columns)?)?;
                let ids = (0..input.width()).filter(|i| !melted.contains(i)).collect_vec();
                melt(op, &input, &ids, &melted)
            }

            Node::GatherNeg { key_columns, .. } => {
                let ids = check_columns(op, &input, arg(op, 1, key_columns)?)?;
                let melted = (0..input.width()).filter(|i| !ids.contains(i)).collect_vec();
                melt(op, &input, &ids, &melted)
            }

            Node::GroupSum {
                group_columns,
                aggr_column,
                aggr_func,
                ..
            } => {
                let groups = check_columns(op, &input, arg(op, 1, group_columns)?)?;
                let target = check_column(op, &input, *arg(op, 2, aggr_column)?)?;
                if groups.contains(&target) {
                    return Err(EvalError::AggregateInGroup { index: target });
                }
                let func = AggrFunc::parse(arg(op, 3, aggr_func)?)?;

                // Groups come out in key order.
                let mut grouped: BTreeMap<Vec<Value>, Vec<Value>> = BTreeMap::new();
                for row in input.rows() {
                    let key = groups.iter().map(|&i| row[i].clone()).collect();
                    grouped.entry(key).or_default().push(row[target].clone());
                }

                let mut names = groups.iter().map(|&i| input.columns()[i].clone()).collect_vec();
                names.push(input.columns()[target].clone());

                let rows = grouped
                    .into_iter()
                    .map(|(mut key, values)| {
                        key.push(func.reduce(target, &values)?);
                        Ok(key)
                    })
                    .collect::<Result<_, EvalError>>()?;
                build(op, names, rows)
            }

            Node::CumSum { column, .. } => {
                let c = check_column(op, &input, *arg(op, 1, column)?)?;
                let name = if input.column_index(CUMSUM_COLUMN).is_none() {
                    CUMSUM_COLUMN.to_owned()
                } else {
                    fresh_columns(input.columns(), 1).remove(0)
                };

                let mut total = 0.0;
                let rows = input
                    .rows()
                    .iter()
                    .map(|row| {
                        let running = match &row[c] {
                            Value::Null => Value::Null,
                            other => {
                                total += number(op, c, other)?;
                                Value::Number(total)
                            }
                        };
                        let mut out = row.clone();
                        out.push(running);
                        Ok(out)
                    })
                    .collect::<Result<_, EvalError>>()?;

                let mut names = input.columns().to_vec();
                names.push(name);
                build(op, names, rows)
            }

            Node::Mutate {
                col1, op: binop, col2, ..
            } => {
                let c1 = check_column(op, &input, *arg(op, 1, col1)?)?;
                let binop = BinOp::parse(op, arg(op, 2, binop)?)?;
                let c2 = check_column(op, &input, *arg(op, 3, col2)?)?;

                let rows = input
                    .rows()
                    .iter()
                    .map(|row| {
                        let derived = match (&row[c1], &row[c2]) {
                            (Value::Null, _) | (_, Value::Null) => Value::Null,
                            (a, b) => Value::Number(binop.apply(number(op, c1, a)?, number(op, c2, b)?)),
                        };
                        let mut out = row.clone();
                        out.push(derived);
                        Ok(out)
                    })
                    .collect::<Result<_, EvalError>>()?;

                let mut names = input.columns().to_vec();
                names.extend(fresh_columns(input.columns(), 1));
                build(op, names, rows)
            }

            Node::MutateCustom {
                column,
                op: cmp,
                constant,
                ..
            } => {
                let c = check_column(op, &input, *arg(op, 1, column)?)?;
                let cmp = arg(op, 2, cmp)?;
                if !MUTATE_CUSTOM_OPS.contains(&cmp.as_str()) {
                    return Err(unsupported(op, cmp));
                }
                let constant = arg(op, 3, constant)?;

                let rows = input
                    .rows()
                    .iter()
                    .map(|row| {
                        let cell = &row[c];
                        if !cell.is_null() {
                            number(op, c, cell)?;
                        }
                        let mut out = row.clone();
                        out.push(Value::Bool(cell == constant));
                        Ok(out)
                    })
                    .collect::<Result<_, EvalError>>()?;

                let mut names = input.columns().to_vec();
                names.extend(fresh_columns(input.columns(), 1));
                build(op, names, rows)
            }
        }
    }
}

/// Splits at the first run of whitespace or `_`, dropping the run.
fn split_once_run(s: &str) -> Option<(&str, &str)> {
    let is_sep = |c: char| c.is_whitespace() || c == '_';
    let start = s.find(is_sep)?;
    let rest = &s[start..];
    let end = rest.find(|c: char| !is_sep(c)).unwrap_or(rest.len());
    Some((&s[..start], &rest[end..]))
}

/// Long-to-wide pivot. The columns other than `key` and `value` form the
/// row identity, in first-seen order. Each distinct key becomes a column named
/// by its Display form, in key order after the identity columns.
fn spread(input: &Table, key: ColumnIndex, value: ColumnIndex) -> Result<Table, EvalError> {
    let op = Operator::Spread;
    let index_cols = (0..input.width()).filter(|&i| i != key && i != value).collect_vec();

    let mut keys: BTreeSet<Value> = BTreeSet::new();
    let mut groups: Vec<Vec<Value>> = vec![];
    let mut group_positions: HashMap<Vec<Value>, usize> = HashMap::new();
    let mut cells: HashMap<(usize, Value), Value> = HashMap::new();

    for row in input.rows() {
        let group = index_cols.iter().map(|&i| row[i].clone()).collect_vec();
        let g = match group_positions.get(&group) {
            Some(&g) => g,
            None => {
                groups.push(group.clone());
                group_positions.insert(group, groups.len() - 1);
                groups.len() - 1
            }
        };

        keys.insert(row[key].clone());
        if cells.insert((g, row[key].clone()), row[value].clone()).is_some() {
            return Err(EvalError::AmbiguousSpread {
                key: row[key].to_string(),
            });
        }
    }

    // Distinct keys that render alike, such as 1 and "1", collide here.
    let mut names = index_cols.iter().map(|&i| input.columns()[i].clone()).collect_vec();
    names.extend(keys.iter().map(Value::to_string));

    let rows = groups
        .into_iter()
        .enumerate()
        .map(|(g, mut row)| {
            row.extend(
                keys.iter()
                    .map(|k| cells.remove(&(g, k.clone())).unwrap_or(Value::Null)),
            );
            row
        })
        .collect();
    build(op, names, rows)
}

/// Wide-to-long melt: `ids` are kept on every output row, each column in
/// `melted` contributes one row per input row with its name under `KEY` and
/// its cell under `VALUE`.
fn melt(op: Operator, input: &Table, ids: &[ColumnIndex], melted: &[ColumnIndex]) -> Result<Table, EvalError> {
    let mut names = ids.iter().map(|&i| input.columns()[i].clone()).collect_vec();
    names.push(KEY_COLUMN.to_owned());
    names.push(VALUE_COLUMN.to_owned());

    let rows = melted
        .iter()
        .flat_map(|&m| {
            input.rows().iter().map(move |row| {
                let mut out = ids.iter().map(|&i| row[i].clone()).collect_vec();
                out.push(Value::String(input.columns()[m].clone()));
                out.push(row[m].clone());
                out
            })
        })
        .collect();
    build(op, names, rows)
}
