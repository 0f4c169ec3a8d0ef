//! Receive-phase assignment: one sampled example sequence per rule.
//!
//! Each rule in the curriculum gets exactly one contributor's sequence for
//! the session. The sequence index may come from a server counter (for
//! balanced assignment across participants) or, failing that, from a
//! client-side draw. Repeat assignment attempts for a rule are ignored.

use std::collections::BTreeMap;

use rand::seq::{IndexedRandom, SliceRandom};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, warn};

use crate::curriculum::{Curriculum, Example};

/// How a rule's sequence was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Randomization {
    Server,
    Client,
}

/// A receive-phase trial input: one contributor's sequence for one rule,
/// with the gloss/generalization context the trial needs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampledRule {
    pub id: String,
    /// Contributor whose sequence was drawn.
    pub seq_id: String,
    pub examples: Vec<Example>,
    /// Generalization strings, shuffled per assignment.
    pub questions: Vec<String>,
    pub randomization: Randomization,
}

/// Collects one assignment per rule until the book is complete.
pub struct AssignmentBook<'a> {
    curriculum: &'a Curriculum,
    questions: &'a BTreeMap<String, Vec<String>>,
    rng: ChaCha8Rng,
    sampled: Vec<SampledRule>,
}

impl<'a> AssignmentBook<'a> {
    pub fn new(
        curriculum: &'a Curriculum,
        questions: &'a BTreeMap<String, Vec<String>>,
        rng: ChaCha8Rng,
    ) -> Self {
        Self {
            curriculum,
            questions,
            rng,
            sampled: Vec::new(),
        }
    }

    /// Record the sampled sequence for one rule.
    ///
    /// `Some(n)` is a server-supplied counter: the contributor at
    /// `n % count` in stable order is chosen. `None` draws uniformly on the
    /// client. A second call for the same rule id is ignored, whatever its
    /// arguments.
    pub fn set_randomize(&mut self, rule_id: &str, seq_number: Option<usize>) -> bool {
        if self.sampled.iter().any(|s| s.id == rule_id) {
            debug!(rule = rule_id, "ignored second randomization attempt");
            return false;
        }

        let teachers = self.curriculum.teachers(rule_id);
        if teachers.is_empty() {
            warn!(rule = rule_id, "no sequences available for rule");
            return false;
        }

        let (randomization, seq_id) = match seq_number {
            Some(n) => (Randomization::Server, teachers[n % teachers.len()]),
            None => {
                let Some(chosen) = teachers.choose(&mut self.rng).copied() else {
                    return false;
                };
                (Randomization::Client, chosen)
            }
        };

        let Some(entry) = self.curriculum.entry(rule_id, seq_id) else {
            return false;
        };

        let mut questions = self.questions.get(rule_id).cloned().unwrap_or_default();
        questions.shuffle(&mut self.rng);

        debug!(rule = rule_id, seq = seq_id, ?randomization, "sequence assigned");
        self.sampled.push(SampledRule {
            id: rule_id.to_string(),
            seq_id: seq_id.to_string(),
            examples: entry.examples.clone(),
            questions,
            randomization,
        });
        true
    }

    /// Client-randomize every rule that has no assignment yet.
    pub fn assign_remaining(&mut self) {
        let pending: Vec<String> = self
            .curriculum
            .rule_ids()
            .into_iter()
            .filter(|rule| !self.sampled.iter().any(|s| &s.id == rule))
            .map(String::from)
            .collect();
        for rule in pending {
            self.set_randomize(&rule, None);
        }
    }

    /// One assignment exists for every rule in the curriculum.
    pub fn is_complete(&self) -> bool {
        self.sampled.len() == self.curriculum.len()
    }

    pub fn sampled(&self) -> &[SampledRule] {
        &self.sampled
    }

    /// Shuffle the completed assignments into receive-phase trial order.
    pub fn into_inputs(mut self) -> Vec<SampledRule> {
        self.sampled.shuffle(&mut self.rng);
        self.sampled
    }
}
