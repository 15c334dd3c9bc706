use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use itertools::Itertools;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rustyline::{error::ReadlineError, Editor};
use structopt::StructOpt;
use tracing::Level;

use tablang::sample::{sample_table, SampleStrategy};
use tablang::{parse_any, SearchConfig, Table};

#[derive(Debug, StructOpt)]
#[structopt(name = "tablang", about = "Evaluate and inspect table transformation programs")]
struct Opt {
    /// JSON array of input tables, each an array of records
    #[structopt(long, parse(from_os_str))]
    inputs: Option<PathBuf>,

    /// JSON search config used by `:domain`
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Seed for `:sample`
    #[structopt(long, default_value = "2019")]
    seed: u64,

    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,
}

struct Session {
    inputs: Vec<Table>,
    config: SearchConfig,
    rng: SmallRng,
}

impl Session {
    fn evaluate(&self, code: &str) -> Result<String> {
        let program = parse_any(code)?;
        let output = program.evaluate(&self.inputs)?;
        let records = serde_json::to_string_pretty(&output)?;
        Ok(format!("{}\n{}", program.stmt_string(), records))
    }

    fn schema(&self, code: &str) -> Result<String> {
        let program = parse_any(code)?;
        let schemas = self.inputs.iter().map(Table::schema).collect_vec();
        Ok(program.infer_output_schema(&schemas)?.to_string())
    }

    fn domain(&self, rest: &str) -> Result<String> {
        let (position, code) = rest
            .split_once(char::is_whitespace)
            .ok_or_else(|| anyhow!("usage: :domain <position> <program>"))?;
        let position = position.parse::<usize>().context("Invalid argument position")?;
        let program = parse_any(code)?;
        let schemas = self.inputs.iter().map(Table::schema).collect_vec();
        let domain = program.domain(position, &schemas, &self.config)?;
        Ok(domain.iter().join("\n"))
    }

    fn ast(&self, code: &str) -> Result<String> {
        let program = parse_any(code)?;
        Ok(serde_json::to_string_pretty(&program.to_ast())?)
    }

    fn sample(&mut self, rest: &str) -> Result<String> {
        let (size, table) = rest
            .split_whitespace()
            .collect_tuple()
            .ok_or_else(|| anyhow!("usage: :sample <rows> <table id>"))?;
        let size = size.parse::<usize>().context("Invalid sample size")?;
        let id = table.parse::<usize>().context("Invalid table id")?;
        let table = self
            .inputs
            .get(id)
            .ok_or_else(|| anyhow!("No input table {}", id))?;
        let sample = sample_table(table, size, SampleStrategy::Diversity, &mut self.rng);
        Ok(serde_json::to_string_pretty(&sample)?)
    }
}

fn handle_input(session: &mut Session, line: &str) -> Result<String> {
    let line = line.trim();
    let Some(command) = line.strip_prefix(':') else {
        return session.evaluate(line);
    };

    let (name, rest) = command.split_once(char::is_whitespace).unwrap_or((command, ""));
    let rest = rest.trim();
    match name {
        "schema" => session.schema(rest),
        "domain" => session.domain(rest),
        "ast" => session.ast(rest),
        "sample" => session.sample(rest),
        _ => bail!("Unknown command :{}", name),
    }
}

fn load_inputs(opt: &Opt) -> Result<Vec<Table>> {
    let Some(path) = &opt.inputs else {
        return Ok(vec![]);
    };
    let json = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse input tables in {}", path.display()))
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    let level = match opt.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = match &opt.config {
        Some(path) => SearchConfig::load(path)?,
        None => SearchConfig::supported(),
    };
    let mut session = Session {
        inputs: load_inputs(&opt)?,
        config,
        rng: SmallRng::seed_from_u64(opt.seed),
    };
    tracing::info!(inputs = session.inputs.len(), "loaded input tables");

    let mut editor = Editor::<()>::new();
    loop {
        let readline = editor.readline("> ");
        match readline {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                editor.add_history_entry(line.as_str());

                match handle_input(&mut session, &line) {
                    Ok(output) => {
                        println!("{}", output);
                    }
                    Err(e) => {
                        println!("Error: {:#}", e);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {}", err);
                break;
            }
        }
    }

    Ok(())
}
