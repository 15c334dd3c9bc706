pub mod assemble;
pub mod ast;
pub mod config;
mod domain;
pub mod error;
pub mod eval;
mod infer;
pub mod linear;
pub mod parser;
pub mod sample;
pub mod schema;
mod serialize;
pub mod table;
pub mod value;

pub use assemble::{Aligner, Candidate, Design, FieldMapping, Oracle, Synthesizer, Target};
pub use ast::{Arg, ArgKind, Literal, Node, Operator};
pub use config::{SearchConfig, SynthesisOptions};
pub use error::{AstError, DomainError, EvalError, TableError};
pub use parser::{parse_any, parse_program, parse_statements};
pub use schema::{ColumnType, OutputSchema, Schema};
pub use table::Table;
pub use value::Value;
