use std::collections::HashSet;

use rand::seq::{index, SliceRandom};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::table::Table;
use crate::value::Value;

/// Upper bound on how many unchosen rows are scored per greedy step.
pub const CANDIDATE_POOL_SIZE: usize = 20;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleStrategy {
    Uniform,
    #[default]
    Diversity,
}

/// Reduces `table` to at most `size` rows (clipped to the table's length).
/// The rows keep their original relative order.
pub fn sample_table<R: Rng + ?Sized>(table: &Table, size: usize, strategy: SampleStrategy, rng: &mut R) -> Table {
    let size = size.min(table.len());
    let mut chosen = match strategy {
        SampleStrategy::Uniform => index::sample(rng, table.len(), size).into_vec(),
        SampleStrategy::Diversity => diversity_sample_indices(table, size, rng),
    };
    chosen.sort_unstable();
    table.take_rows(&chosen)
}

/// Greedy diversity sampling. Returns the chosen row indices in the order
/// they were picked.
///
/// Each step draws a pool of up to [`CANDIDATE_POOL_SIZE`] unchosen rows and
/// keeps the best-scoring one; ties go to the earliest in the pool. A
/// candidate earns one point per column, except a column whose full table has
/// more than one distinct value and where the chosen rows plus the candidate
/// still show only one.
pub fn diversity_sample_indices<R: Rng + ?Sized>(table: &Table, size: usize, rng: &mut R) -> Vec<usize> {
    let size = size.min(table.len());
    let full_cardinality = table.cardinalities();

    let mut chosen: Vec<usize> = Vec::with_capacity(size);
    let mut remaining: Vec<usize> = (0..table.len()).collect();
    // Distinct values of each column among the chosen rows.
    let mut seen: Vec<HashSet<&Value>> = vec![HashSet::new(); table.width()];

    for _ in 0..size {
        let pool_size = CANDIDATE_POOL_SIZE.min(remaining.len());
        let pool: Vec<usize> = remaining.choose_multiple(rng, pool_size).copied().collect();

        let mut best = pool[0];
        let mut best_score = None;
        for &candidate in &pool {
            let score = score_candidate(table, candidate, &seen, &full_cardinality);
            if best_score.map_or(true, |top| score > top) {
                best = candidate;
                best_score = Some(score);
            }
        }

        for (column, values) in seen.iter_mut().enumerate() {
            values.insert(&table.rows()[best][column]);
        }
        remaining.retain(|&i| i != best);
        chosen.push(best);
    }

    chosen
}

fn score_candidate(table: &Table, candidate: usize, seen: &[HashSet<&Value>], full_cardinality: &[usize]) -> usize {
    let row = &table.rows()[candidate];
    seen.iter()
        .zip(full_cardinality)
        .zip(row)
        .filter(|((values, &full), value)| {
            let trial = values.len() + usize::from(!values.contains(value));
            !(trial == 1 && full > 1)
        })
        .count()
}
