//! Rule-Exchange CLI.
//!
//! Commands:
//! - inspect: load and print the grouped/filtered curriculum
//! - assign: sample receive-phase assignments for a session
//! - simulate: run scripted sessions and save study results

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use rule_exchange_experiment::assignment::AssignmentBook;
use rule_exchange_experiment::curriculum::{
    Curriculum, CurriculumFilter, Polarity, RawResponseRow,
};
use rule_exchange_experiment::fixtures;
use rule_exchange_experiment::simulation::{self, SimulationConfig};

/// Generate a timestamped output path from the given path.
/// e.g., "results.json" -> "results-20260108-010530.json"
fn timestamped_path(path: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d-%H%M%S");
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("results");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("json");
    let parent = path.parent().unwrap_or(Path::new("."));
    parent.join(format!("{}-{}.{}", stem, timestamp, ext))
}

#[derive(Parser)]
#[command(name = "rule-exchange")]
#[command(version)]
#[command(about = "Crowdsourced rule-learning study tooling")]
struct Cli {
    /// Response-table JSON (defaults to the built-in pilot table)
    #[arg(long, env = "RULE_EXCHANGE_CURRICULA")]
    curricula: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the grouped and filtered curriculum
    Inspect,

    /// Sample receive-phase assignments for one session
    Assign {
        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Server-supplied sequence numbers, as rule=index pairs
        /// (comma-separated); unlisted rules randomize on the client
        #[arg(long, value_delimiter = ',')]
        server: Vec<String>,
    },

    /// Run scripted sessions and save study results
    Simulate {
        /// Number of simulated participants
        #[arg(long, default_value = "8")]
        participants: usize,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Probability of the simulated receiver choosing the correct gloss
        #[arg(long, default_value = "0.8")]
        accuracy: f64,

        /// Examples authored per send-phase rule
        #[arg(long, default_value = "4")]
        examples: usize,

        /// Skip the receive phase (observed production sequencing)
        #[arg(long)]
        no_receive: bool,

        /// Output file for results
        #[arg(long, default_value = "study.json")]
        output: PathBuf,
    },
}

fn load_rows(path: Option<&Path>) -> Result<Vec<RawResponseRow>> {
    match path {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("reading response table {}", path.display()))?;
            let rows = serde_json::from_str(&json)
                .with_context(|| format!("parsing response table {}", path.display()))?;
            Ok(rows)
        }
        None => Ok(fixtures::pilot_rows()),
    }
}

fn parse_server_pairs(pairs: &[String]) -> Result<Vec<(String, usize)>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((rule, index)) => {
                let index: usize = index
                    .parse()
                    .with_context(|| format!("bad sequence number in '{pair}'"))?;
                Ok((rule.to_string(), index))
            }
            None => bail!("expected rule=index, got '{pair}'"),
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();

    let rows = load_rows(cli.curricula.as_deref())?;

    match cli.command {
        Commands::Inspect => {
            let curriculum = Curriculum::from_rows(&rows, &CurriculumFilter::pilot());

            println!("=== Curriculum ===");
            println!("Rules in play: {}", curriculum.len());
            for rule in curriculum.rule_ids() {
                println!("\n{rule}");
                for entry in curriculum.entries_for_rule(rule) {
                    let positives = entry
                        .examples
                        .iter()
                        .filter(|e| e.polarity == Polarity::Positive)
                        .count();
                    println!(
                        "  {}: {} examples ({} positive)",
                        entry.teacher_id,
                        entry.examples.len(),
                        positives
                    );
                }
            }
        }

        Commands::Assign { seed, server } => {
            let curriculum = Curriculum::from_rows(&rows, &CurriculumFilter::pilot());
            let questions = fixtures::generalization_questions();
            let rng = match seed {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::from_rng(&mut rand::rng()),
            };

            let mut book = AssignmentBook::new(&curriculum, &questions, rng);
            for (rule, index) in parse_server_pairs(&server)? {
                book.set_randomize(&rule, Some(index));
            }
            book.assign_remaining();

            println!("=== Receive-phase assignment ===");
            for sampled in book.into_inputs() {
                println!(
                    "{}: sequence from {} ({} examples, {:?} randomization)",
                    sampled.id,
                    sampled.seq_id,
                    sampled.examples.len(),
                    sampled.randomization
                );
            }
        }

        Commands::Simulate {
            participants,
            seed,
            accuracy,
            examples,
            no_receive,
            output,
        } => {
            info!(participants, accuracy, "starting scripted study");

            let curriculum = Curriculum::from_rows(&rows, &CurriculumFilter::pilot());
            if curriculum.is_empty() {
                bail!("response table produced an empty curriculum");
            }

            let sim = SimulationConfig {
                participants,
                seed,
                gloss_accuracy: accuracy,
                examples_per_rule: examples,
                include_receive: !no_receive,
            };

            let results = simulation::run_study(&rows, &sim).await?;
            let output_path = timestamped_path(&output);
            results.save(&output_path)?;

            println!("\n=== Scripted study complete ===");
            println!("Sessions: {}", results.sessions.len());
            println!("Results saved to: {}", output_path.display());
            if !results.summary.is_empty() {
                println!("\nGloss accuracy by rule:");
                for (rule, summary) in &results.summary {
                    println!(
                        "  {}: {}/{} ({:.1}%)",
                        rule,
                        summary.correct,
                        summary.trials,
                        summary.accuracy * 100.0
                    );
                }
            }

            let delivered = results
                .sessions
                .iter()
                .map(|s| s.payload.send.len())
                .sum::<usize>();
            println!("\nSend results delivered: {delivered}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamped_path_keeps_stem_and_extension() {
        let path = timestamped_path(Path::new("out/study.json"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("study-"));
        assert!(name.ends_with(".json"));
        assert_eq!(path.parent(), Some(Path::new("out")));
    }

    #[test]
    fn test_parse_server_pairs() {
        let pairs = vec!["zip-code=2".to_string(), "3a=0".to_string()];
        let parsed = parse_server_pairs(&pairs).unwrap();
        assert_eq!(parsed[0], ("zip-code".to_string(), 2));
        assert_eq!(parsed[1], ("3a".to_string(), 0));

        assert!(parse_server_pairs(&["nope".to_string()]).is_err());
        assert!(parse_server_pairs(&["zip-code=x".to_string()]).is_err());
    }

    #[test]
    fn test_load_rows_defaults_to_pilot_table() {
        let rows = load_rows(None).unwrap();
        assert!(!rows.is_empty());
        assert!(rows.iter().any(|r| r.rule_id == "delimiters"));
    }
}
