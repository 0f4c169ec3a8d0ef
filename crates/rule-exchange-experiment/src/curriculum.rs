//! Curriculum store: raw response rows grouped by rule and by contributing
//! participant.
//!
//! The curriculum source is an externally supplied table of response rows.
//! Rows are grouped into per-(rule, contributor) example sequences, then
//! narrowed by an explicit filter. The narrowing is experiment design, not
//! data cleaning: a run deliberately restricts attention to an allow-list
//! of contributors per rule.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Whether a sequence fits the rule it was authored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
}

/// One labeled sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub string: String,
    pub polarity: Polarity,
}

impl Example {
    pub fn new(string: impl Into<String>, polarity: Polarity) -> Self {
        Self {
            string: string.into(),
            polarity,
        }
    }
}

/// One row of the response table. Field names follow the source data's
/// column names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawResponseRow {
    #[serde(rename = "example.num")]
    pub example_num: usize,
    pub polarity: Polarity,
    #[serde(rename = "rule.id")]
    pub rule_id: String,
    pub string: String,
    #[serde(rename = "trial.num")]
    pub trial_num: usize,
    #[serde(rename = "teacher.id")]
    pub teacher_id: String,
}

/// The examples one contributor authored for one rule, in authoring order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEntry {
    pub rule_id: String,
    pub teacher_id: String,
    pub examples: Vec<Example>,
}

/// Which parts of the response table are in play for a run.
#[derive(Debug, Clone, Default)]
pub struct CurriculumFilter {
    /// Rules dropped entirely.
    pub excluded_rules: Vec<String>,
    /// Contributors kept per rule; rules absent from this map keep every
    /// contributor.
    pub allowed_teachers: BTreeMap<String, Vec<String>>,
}

impl CurriculumFilter {
    /// The pilot restriction: no `delimiters` rule, three contributors per
    /// remaining rule.
    pub fn pilot() -> Self {
        let mut allowed = BTreeMap::new();
        allowed.insert(
            "suffix-s".to_string(),
            vec!["51be3ed".into(), "13ab615".into(), "66584c1".into()],
        );
        allowed.insert(
            "zip-code".to_string(),
            vec!["ecba21d".into(), "51be3ed".into(), "ec8b199".into()],
        );
        allowed.insert(
            "3a".to_string(),
            vec!["6f2ca8f".into(), "f29e6ff".into(), "db12c41".into()],
        );
        Self {
            excluded_rules: vec!["delimiters".to_string()],
            allowed_teachers: allowed,
        }
    }

    fn keeps_rule(&self, rule_id: &str) -> bool {
        !self.excluded_rules.iter().any(|r| r == rule_id)
    }

    fn keeps_teacher(&self, rule_id: &str, teacher_id: &str) -> bool {
        match self.allowed_teachers.get(rule_id) {
            Some(allowed) => allowed.iter().any(|t| t == teacher_id),
            None => true,
        }
    }
}

/// Nested example collections: rule id -> contributor id -> entry.
///
/// Maps are ordered so that server-supplied sequence numbers index into a
/// stable contributor order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Curriculum {
    entries: BTreeMap<String, BTreeMap<String, RuleEntry>>,
}

impl Curriculum {
    /// Group and filter raw rows. Row order is preserved within each
    /// (rule, contributor) sequence.
    pub fn from_rows(rows: &[RawResponseRow], filter: &CurriculumFilter) -> Self {
        let mut entries: BTreeMap<String, BTreeMap<String, RuleEntry>> = BTreeMap::new();

        for row in rows {
            if !filter.keeps_rule(&row.rule_id) {
                continue;
            }
            if !filter.keeps_teacher(&row.rule_id, &row.teacher_id) {
                continue;
            }

            entries
                .entry(row.rule_id.clone())
                .or_default()
                .entry(row.teacher_id.clone())
                .or_insert_with(|| RuleEntry {
                    rule_id: row.rule_id.clone(),
                    teacher_id: row.teacher_id.clone(),
                    examples: Vec::new(),
                })
                .examples
                .push(Example::new(row.string.clone(), row.polarity));
        }

        debug!(rules = entries.len(), "curriculum built");
        Self { entries }
    }

    /// Number of rules in play.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn rule_ids(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Contributor ids for a rule, in stable (sorted) order.
    pub fn teachers(&self, rule_id: &str) -> Vec<&str> {
        self.entries
            .get(rule_id)
            .map(|by_teacher| by_teacher.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn entry(&self, rule_id: &str, teacher_id: &str) -> Option<&RuleEntry> {
        self.entries.get(rule_id)?.get(teacher_id)
    }

    /// Every entry for a rule, in contributor order.
    pub fn entries_for_rule(&self, rule_id: &str) -> Vec<&RuleEntry> {
        self.entries
            .get(rule_id)
            .map(|by_teacher| by_teacher.values().collect())
            .unwrap_or_default()
    }
}
