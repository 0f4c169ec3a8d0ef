//! Run configuration: everything a session needs, constructed once and
//! passed by reference. There is no ambient global state.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::curriculum::{Curriculum, CurriculumFilter, RawResponseRow};
use crate::fixtures::{self, GlossItem, RuleDescriptor};

/// Configuration for one participant session.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Example sequences available for the receive phase.
    pub curriculum: Curriculum,
    /// Rules (distractor descriptions) the sender authors examples for,
    /// already sampled and shuffled into trial order.
    pub sending_rules: Vec<RuleDescriptor>,
    /// Forced-choice gloss options per rule.
    pub gloss_items: BTreeMap<String, Vec<GlossItem>>,
    /// Held-out strings per rule for the generalization sub-stage.
    pub generalization_questions: BTreeMap<String, Vec<String>>,
    /// Field names the questionnaire requires before submission.
    pub required_fields: Vec<String>,
    /// Whether the receive phase runs between send and questionnaire.
    pub include_receive: bool,
    /// Delay before handing the payload to the submission channel.
    pub submit_settle: Duration,
    /// Delay before closing a secondary window after submission.
    pub window_close_delay: Duration,
    /// Seed for sampling and shuffling; random when absent.
    pub seed: Option<u64>,
}

impl RunConfig {
    /// The pilot configuration: built-in response table, pilot filter, and
    /// the observed production sequencing (send, then questionnaire).
    pub fn pilot(seed: Option<u64>) -> Self {
        Self::from_rows(&fixtures::pilot_rows(), seed)
    }

    /// Build a configuration from an externally supplied response table.
    pub fn from_rows(rows: &[RawResponseRow], seed: Option<u64>) -> Self {
        let curriculum = Curriculum::from_rows(rows, &CurriculumFilter::pilot());
        let mut rng = rng_for(seed);
        let sending_rules = fixtures::sample_sending_rules(&mut rng);

        Self {
            curriculum,
            sending_rules,
            gloss_items: fixtures::afc_gloss_items(),
            generalization_questions: fixtures::generalization_questions(),
            required_fields: default_required_fields(),
            include_receive: false,
            submit_settle: Duration::from_millis(2000),
            window_close_delay: Duration::from_millis(250),
            seed,
        }
    }

    /// A seeded rng for this run's sampling decisions.
    pub fn rng(&self) -> ChaCha8Rng {
        rng_for(self.seed)
    }
}

fn rng_for(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_rng(&mut rand::rng()),
    }
}

fn default_required_fields() -> Vec<String> {
    ["q_age", "q_language", "q_strategy"]
        .map(String::from)
        .to_vec()
}
