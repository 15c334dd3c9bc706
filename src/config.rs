use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::eval::{AGGR_FUNCS, FILTER_OPS, MUTATE_OPS};
use crate::sample::SampleStrategy;
use crate::value::Value;

/// Symbols and constants the search may try for symbol and constant
/// arguments. A missing key is an empty domain.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub filter_op: Vec<String>,
    pub mutate_op: Vec<String>,
    pub aggr_func: Vec<String>,
    pub constants: Vec<Value>,
}

impl SearchConfig {
    /// Every symbol the evaluator understands, with an empty constant pool.
    pub fn supported() -> Self {
        let owned = |symbols: &[&str]| symbols.iter().map(|s| s.to_string()).collect();
        Self {
            filter_op: owned(&FILTER_OPS),
            mutate_op: owned(&MUTATE_OPS),
            aggr_func: owned(&AGGR_FUNCS),
            constants: vec![],
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse search config")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&json)
    }
}

/// Knobs for [`crate::assemble::Synthesizer`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisOptions {
    /// Rows handed to the oracle per target table.
    pub num_samples: usize,
    /// Maximum number of candidates returned.
    pub top_k: usize,
    /// Seed for the sampler's random source.
    pub seed: u64,
    pub strategy: SampleStrategy,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            num_samples: 2,
            top_k: 1,
            seed: 2019,
            strategy: SampleStrategy::Diversity,
        }
    }
}
