use std::collections::HashMap;

use anyhow::Result;
use itertools::Itertools;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde_json::Value as Json;
use tracing::{debug, info};

use crate::ast::Node;
use crate::config::SynthesisOptions;
use crate::sample::sample_table;
use crate::table::{ColumnName, Table};

/// Maps produced column names to the target's field names.
pub type FieldMapping = HashMap<ColumnName, ColumnName>;

/// The external program search.
pub trait Oracle {
    /// Returns candidate programs in the serialized AST form, best first. An
    /// empty list means no solution was found.
    ///
    /// `sample` drives the search; `full` is only for final verification.
    fn search(&mut self, inputs: &[Table], sample: &Table, full: &Table) -> Result<Vec<Json>>;
}

/// The external schema alignment between a synthesized output and a target.
pub trait Aligner {
    /// `None` means no consistent mapping exists.
    fn align(&self, expected: &Table, produced: &Table) -> Option<FieldMapping>;
}

#[derive(Clone, Debug, PartialEq)]
pub enum Target {
    Single(Table),
    /// One table per visualization layer.
    Layered(Vec<Table>),
}

impl Target {
    pub fn layers(&self) -> &[Table] {
        match self {
            Target::Single(table) => std::slice::from_ref(table),
            Target::Layered(tables) => tables,
        }
    }

    /// Total number of example rows; cheaper designs are tried first.
    pub fn complexity(&self) -> usize {
        self.layers().iter().map(Table::len).sum()
    }
}

/// An abstract design from inverse semantics: the data the chart needs and
/// the chart itself, which is passed through untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct Design<C> {
    pub target: Target,
    pub chart: C,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayerResult {
    pub program: Node,
    /// The program's output with columns renamed to the target's fields.
    pub output: Table,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Candidate<C> {
    pub chart: C,
    /// One entry per layer; a single entry for non-layered designs.
    pub layers: Vec<LayerResult>,
}

pub struct Synthesizer<O, A> {
    oracle: O,
    aligner: A,
    options: SynthesisOptions,
}

impl<O: Oracle, A: Aligner> Synthesizer<O, A> {
    pub fn new(oracle: O, aligner: A, options: SynthesisOptions) -> Self {
        Self {
            oracle,
            aligner,
            options,
        }
    }

    pub fn into_parts(self) -> (O, A) {
        (self.oracle, self.aligner)
    }

    /// Synthesizes programs for each design, cheapest design first, and
    /// returns at most `top_k` candidates.
    ///
    /// Candidates that fail to deserialize, contain holes, fail evaluation or
    /// cannot be aligned are dropped; only oracle failures are returned as
    /// errors.
    pub fn synthesize<C: Clone>(&mut self, inputs: &[Table], mut designs: Vec<Design<C>>) -> Result<Vec<Candidate<C>>> {
        let top_k = self.options.top_k;
        let mut rng = SmallRng::seed_from_u64(self.options.seed);
        let mut candidates = vec![];

        designs.sort_by_key(|design| design.target.complexity());
        info!(designs = designs.len(), top_k, "synthesizing");

        for design in &designs {
            if candidates.len() >= top_k {
                break;
            }
            let budget = top_k - candidates.len();
            let found = match &design.target {
                Target::Single(full) => self.synthesize_single(inputs, full, budget, &mut rng)?,
                Target::Layered(layers) => self.synthesize_layered(inputs, layers, budget, &mut rng)?,
            };
            info!(
                complexity = design.target.complexity(),
                found = found.len(),
                "design done"
            );
            candidates.extend(found.into_iter().map(|layers| Candidate {
                chart: design.chart.clone(),
                layers,
            }));
        }

        Ok(candidates)
    }

    fn synthesize_single(
        &mut self,
        inputs: &[Table],
        full: &Table,
        budget: usize,
        rng: &mut SmallRng,
    ) -> Result<Vec<Vec<LayerResult>>> {
        let mut found = vec![];
        for program in self.search(inputs, full, rng)? {
            if found.len() >= budget {
                break;
            }
            if let Some(result) = self.run(inputs, full, program) {
                found.push(vec![result]);
            }
        }
        Ok(found)
    }

    fn synthesize_layered(
        &mut self,
        inputs: &[Table],
        layers: &[Table],
        budget: usize,
        rng: &mut SmallRng,
    ) -> Result<Vec<Vec<LayerResult>>> {
        if layers.is_empty() {
            return Ok(vec![]);
        }

        let per_layer = layers
            .iter()
            .map(|full| self.search(inputs, full, rng))
            .collect::<Result<Vec<_>>>()?;

        // Each program is evaluated and aligned once; the product below only
        // combines the survivors.
        let per_layer: Vec<Vec<LayerResult>> = per_layer
            .into_iter()
            .zip(layers)
            .map(|(programs, full)| {
                programs
                    .into_iter()
                    .filter_map(|program| self.run(inputs, full, program))
                    .collect()
            })
            .collect();
        debug!(
            survivors = ?per_layer.iter().map(Vec::len).collect_vec(),
            "layer candidates"
        );

        Ok(per_layer
            .iter()
            .map(|results| results.iter())
            .multi_cartesian_product()
            .take(budget)
            .map(|combination| combination.into_iter().cloned().collect())
            .collect())
    }

    /// Samples `full` and asks the oracle for programs, dropping the ones
    /// that are malformed or still partial.
    fn search(&mut self, inputs: &[Table], full: &Table, rng: &mut SmallRng) -> Result<Vec<Node>> {
        let sample = sample_table(full, self.options.num_samples, self.options.strategy, rng);
        let programs = self.oracle.search(inputs, &sample, full)?;
        debug!(candidates = programs.len(), sample_rows = sample.len(), "oracle returned");

        Ok(programs
            .iter()
            .filter_map(|ast| match Node::from_ast(ast) {
                Ok(program) if program.is_partial() => {
                    debug!(%program, "discarding partial program");
                    None
                }
                Ok(program) => Some(program),
                Err(err) => {
                    debug!(%err, "discarding malformed program");
                    None
                }
            })
            .collect())
    }

    /// Evaluates one program and aligns its output with the target.
    fn run(&self, inputs: &[Table], full: &Table, program: Node) -> Option<LayerResult> {
        let output = match program.evaluate(inputs) {
            Ok(output) => output,
            Err(err) => {
                debug!(%program, %err, "discarding program that failed to evaluate");
                return None;
            }
        };

        let Some(mapping) = self.aligner.align(full, &output) else {
            debug!(%program, "discarding program whose output does not align");
            return None;
        };

        match output.rename_columns(&mapping) {
            Ok(output) => Some(LayerResult { program, output }),
            Err(err) => {
                debug!(%program, %err, "discarding program with a conflicting alignment");
                None
            }
        }
    }
}
