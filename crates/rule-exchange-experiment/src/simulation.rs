//! Scripted sessions: drive the full flow headlessly with a simulated
//! participant, and aggregate the resulting payloads into a results file.
//!
//! The simulated sender labels candidate strings with each rule family's
//! true predicate; the simulated receiver reveals everything and picks the
//! correct gloss at a configurable rate. This exercises every phase of the
//! state machine end to end without a browser.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand::seq::{IndexedRandom, SliceRandom};
use rand_chacha::ChaCha8Rng;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::RunConfig;
use crate::curriculum::{Polarity, RawResponseRow};
use crate::fingerprint::{ClientEnv, StaticLookup, spawn_lookups};
use crate::fixtures;
use crate::flow::{ExperimentFlow, FlowDeps, PhaseId, ReceiveRecord};
use crate::submission::{
    DeliveryOptions, MemoryChannel, PrimaryWindow, SubmissionPayload, deliver,
};

/// Knobs for a simulated study.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub participants: usize,
    pub seed: Option<u64>,
    /// Probability the simulated receiver picks the designated-correct
    /// gloss.
    pub gloss_accuracy: f64,
    /// Examples authored per send-phase rule.
    pub examples_per_rule: usize,
    pub include_receive: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            participants: 8,
            seed: None,
            gloss_accuracy: 0.8,
            examples_per_rule: 4,
            include_receive: true,
        }
    }
}

/// Everything one scripted session produced.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub seed: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub payload: SubmissionPayload,
    pub receive: Vec<ReceiveRecord>,
}

/// Gloss accuracy for one rule across the study.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleSummary {
    pub trials: usize,
    pub correct: usize,
    pub accuracy: f64,
}

/// All sessions plus per-rule summaries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StudyResults {
    pub sessions: Vec<SessionReport>,
    pub summary: BTreeMap<String, RuleSummary>,
}

impl StudyResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, session: SessionReport) {
        self.sessions.push(session);
    }

    /// Recompute per-rule gloss accuracy from the collected sessions.
    pub fn compute_summary(&mut self) {
        let mut summary: BTreeMap<String, RuleSummary> = BTreeMap::new();
        for session in &self.sessions {
            for record in &session.receive {
                let entry = summary.entry(record.input.id.clone()).or_default();
                entry.trials += 1;
                if record.choice.correct {
                    entry.correct += 1;
                }
            }
        }
        for entry in summary.values_mut() {
            entry.accuracy = if entry.trials > 0 {
                entry.correct as f64 / entry.trials as f64
            } else {
                0.0
            };
        }
        self.summary = summary;
    }

    /// Save results to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)
            .with_context(|| format!("writing results to {}", path.as_ref().display()))?;
        Ok(())
    }
}

/// The rule family a descriptor id belongs to (`zip-code-1` -> `zip-code`).
fn family_of(rule_id: &str) -> &str {
    match rule_id.rsplit_once('-') {
        Some((head, tail)) if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) => head,
        _ => rule_id,
    }
}

/// The true predicate for a rule family.
fn family_predicate(family: &str) -> Option<Regex> {
    let pattern = match family {
        "3a" => r"^a{3,}$",
        "zip-code" => r"^[0-9]{5}$",
        "suffix-s" => r"s$",
        "delimiters" => r"^\[.*\]$",
        _ => return None,
    };
    Regex::new(pattern).ok()
}

/// Candidate strings the simulated sender draws from: the family's held-out
/// pool plus a few guaranteed in-rule strings.
fn candidate_strings(family: &str) -> Vec<String> {
    let mut pool = fixtures::generalization_questions()
        .remove(family)
        .unwrap_or_default();
    let extras: &[&str] = match family {
        "3a" => &["aaaaa", "aaaaaa"],
        "zip-code" => &["10001", "94110"],
        "suffix-s" => &["lions", "maps", "mess"],
        "delimiters" => &["[ab12]", "[_x_]"],
        _ => &[],
    };
    pool.extend(extras.iter().map(|s| s.to_string()));
    pool
}

/// Label candidates with the family predicate and pick a balanced set.
fn author_examples(
    family: &str,
    count: usize,
    rng: &mut ChaCha8Rng,
) -> Vec<(String, Polarity)> {
    let Some(predicate) = family_predicate(family) else {
        return Vec::new();
    };

    let mut positives = Vec::new();
    let mut negatives = Vec::new();
    for string in candidate_strings(family) {
        if predicate.is_match(&string) {
            positives.push(string);
        } else {
            negatives.push(string);
        }
    }
    positives.shuffle(rng);
    negatives.shuffle(rng);

    let half = count.div_ceil(2);
    let mut authored: Vec<(String, Polarity)> = positives
        .into_iter()
        .take(half)
        .map(|s| (s, Polarity::Positive))
        .chain(
            negatives
                .into_iter()
                .take(count.saturating_sub(half))
                .map(|s| (s, Polarity::Negative)),
        )
        .collect();
    authored.shuffle(rng);
    authored
}

fn simulated_env() -> ClientEnv {
    ClientEnv {
        user_agent: "rule-exchange-sim/0.2".to_string(),
        screen_width: 1440,
        screen_height: 900,
        color_depth: 24,
        timezone_offset_min: 0,
        plugins: Vec::new(),
    }
}

/// Run one scripted session end to end and return its report.
pub async fn run_session(
    mut config: RunConfig,
    sim: &SimulationConfig,
    seed: u64,
) -> Result<SessionReport> {
    let started_at = Utc::now();
    // no point sleeping through the real settle delays headlessly
    config.submit_settle = std::time::Duration::ZERO;
    config.window_close_delay = std::time::Duration::ZERO;
    config.include_receive = sim.include_receive;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let deps = FlowDeps::headless(&config, simulated_env());
    let mut flow = ExperimentFlow::new(config, deps);

    // scripted runs await the lookup chain up front so reports are
    // deterministic; a real host leaves it in flight
    let lookup = std::sync::Arc::new(StaticLookup::with_ip("203.0.113.10"));
    let _ = spawn_lookups(flow.fingerprint(), lookup.clone(), lookup).await;

    flow.start()?;

    // send phase: author a balanced example set per rule
    while flow.phase() == Some(PhaseId::Send) {
        let Some(trial) = flow.presentation_mut() else {
            bail!("send phase with no live trial");
        };
        let family = family_of(&trial.rule().id).to_string();
        for (string, polarity) in author_examples(&family, sim.examples_per_rule, &mut rng) {
            trial.add_example(string, polarity);
        }
        if rng.random_bool(0.5) {
            trial.set_reveal_rule("wrote strings that fit, then changed one character");
        }
        if !flow.submit_presentation()? {
            bail!("send trial refused submission");
        }
    }

    // receive phase: reveal everything, then choose a gloss
    let accuracy = sim.gloss_accuracy.clamp(0.0, 1.0);
    while flow.phase() == Some(PhaseId::Receive) {
        let accurate = rng.random_bool(accuracy);
        let Some(trial) = flow.inference_mut() else {
            bail!("receive phase with no live trial");
        };
        while trial.reveal_next() {}
        if !trial.advance_to_gloss() {
            bail!("reveal stage refused to advance");
        }

        let items = trial.gloss().items().to_vec();
        let choice = if accurate {
            items.iter().find(|i| i.correct)
        } else {
            let wrong: Vec<_> = items.iter().filter(|i| !i.correct).collect();
            wrong.choose(&mut rng).copied()
        };
        let Some(choice) = choice else {
            bail!("gloss fixture missing options");
        };
        trial.select_gloss(&choice.gloss_id);
        if !flow.finish_inference()? {
            bail!("receive trial refused to finish");
        }
    }

    // questionnaire
    let answers = [
        ("q_age", "29"),
        ("q_language", "English"),
        ("q_strategy", "looked for what the examples had in common"),
    ];
    for (field, value) in answers {
        flow.set_questionnaire_field(field, value);
    }
    if !flow.submit_questionnaire()? {
        bail!("questionnaire refused submission");
    }

    let receive = flow.receive_records().to_vec();
    let Some(payload) = flow.take_payload() else {
        bail!("finished session without payload");
    };

    let mut channel = MemoryChannel::new();
    let mut window = PrimaryWindow;
    let options = DeliveryOptions {
        settle: std::time::Duration::ZERO,
        close_delay: std::time::Duration::ZERO,
    };
    deliver(payload.clone(), &mut channel, &mut window, options).await?;
    debug!(seed, "scripted session delivered");

    Ok(SessionReport {
        session_id: Uuid::new_v4(),
        seed,
        started_at,
        ended_at: Utc::now(),
        payload,
        receive,
    })
}

/// Run a full scripted study over the given response table: one session
/// per participant, summarized.
pub async fn run_study(rows: &[RawResponseRow], sim: &SimulationConfig) -> Result<StudyResults> {
    let mut master = match sim.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_rng(&mut rand::rng()),
    };

    let mut results = StudyResults::new();
    for participant in 0..sim.participants {
        let session_seed: u64 = master.random();
        let config = RunConfig::from_rows(rows, Some(session_seed));
        let report = run_session(config, sim, session_seed).await?;
        info!(
            participant,
            correct = report.receive.iter().filter(|r| r.choice.correct).count(),
            rules = report.receive.len(),
            "session complete"
        );
        results.add(report);
    }
    results.compute_summary();
    Ok(results)
}
