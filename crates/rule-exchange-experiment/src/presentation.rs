//! Send-phase trial: one participant authors labeled examples for one
//! assigned rule description.

use serde::Serialize;

use crate::curriculum::{Example, Polarity};
use crate::fixtures::RuleDescriptor;

/// What a sender produced for one rule. Reveal metadata (how they went
/// about constructing the examples) rides along during collection and is
/// stripped by the submission assembler.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthoredResponse {
    pub examples: Vec<Example>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reveal_rule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reveal_interface: Option<String>,
}

/// State machine for one send-phase trial.
///
/// The participant edits the example list freely until submission; after
/// submission the trial is finalized and every mutation is a no-op.
#[derive(Debug, Clone)]
pub struct PresentationTrial {
    rule: RuleDescriptor,
    examples: Vec<Example>,
    reveal_rule: Option<String>,
    reveal_interface: Option<String>,
    submitted: bool,
}

impl PresentationTrial {
    pub fn new(rule: RuleDescriptor) -> Self {
        Self {
            rule,
            examples: Vec::new(),
            reveal_rule: None,
            reveal_interface: None,
            submitted: false,
        }
    }

    pub fn rule(&self) -> &RuleDescriptor {
        &self.rule
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    /// Append an authored example. Returns false once the trial is
    /// finalized.
    pub fn add_example(&mut self, string: impl Into<String>, polarity: Polarity) -> bool {
        if self.submitted {
            return false;
        }
        self.examples.push(Example::new(string, polarity));
        true
    }

    /// Remove an authored example by position. Returns false for an
    /// out-of-range index or a finalized trial.
    pub fn remove_example(&mut self, index: usize) -> bool {
        if self.submitted || index >= self.examples.len() {
            return false;
        }
        self.examples.remove(index);
        true
    }

    pub fn set_reveal_rule(&mut self, note: impl Into<String>) {
        if !self.submitted {
            self.reveal_rule = Some(note.into());
        }
    }

    pub fn set_reveal_interface(&mut self, note: impl Into<String>) {
        if !self.submitted {
            self.reveal_interface = Some(note.into());
        }
    }

    /// The submit control is available only once at least one example has
    /// been authored.
    pub fn can_submit(&self) -> bool {
        !self.submitted && !self.examples.is_empty()
    }

    /// Finalize the trial and emit the authored response. Idempotent: a
    /// second call (or a call with nothing authored) yields nothing.
    pub fn submit(&mut self) -> Option<AuthoredResponse> {
        if !self.can_submit() {
            return None;
        }
        self.submitted = true;
        Some(AuthoredResponse {
            examples: self.examples.clone(),
            reveal_rule: self.reveal_rule.clone(),
            reveal_interface: self.reveal_interface.clone(),
        })
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial() -> PresentationTrial {
        PresentationTrial::new(RuleDescriptor::new(
            "zip-code-1",
            "The sequence is exactly 5 characters long",
        ))
    }

    #[test]
    fn test_submit_blocked_until_example_authored() {
        let mut t = trial();
        assert!(!t.can_submit());
        assert!(t.submit().is_none());

        t.add_example("90210", Polarity::Positive);
        assert!(t.can_submit());
        let out = t.submit().unwrap();
        assert_eq!(out.examples.len(), 1);
    }

    #[test]
    fn test_submit_is_idempotent() {
        let mut t = trial();
        t.add_example("90210", Polarity::Positive);
        assert!(t.submit().is_some());
        assert!(t.submit().is_none());
    }

    #[test]
    fn test_no_edits_after_submit() {
        let mut t = trial();
        t.add_example("90210", Polarity::Positive);
        t.submit();

        assert!(!t.add_example("123", Polarity::Negative));
        assert!(!t.remove_example(0));
        t.set_reveal_rule("late note");
        assert_eq!(t.examples().len(), 1);
    }

    #[test]
    fn test_reveal_metadata_rides_along() {
        let mut t = trial();
        t.add_example("12345", Polarity::Positive);
        t.add_example("123", Polarity::Negative);
        t.set_reveal_rule("wrote a valid code, then shortened it");
        t.set_reveal_interface("typed directly");

        let out = t.submit().unwrap();
        assert_eq!(
            out.reveal_rule.as_deref(),
            Some("wrote a valid code, then shortened it")
        );
        assert_eq!(out.reveal_interface.as_deref(), Some("typed directly"));
        assert_eq!(out.examples[1].polarity, Polarity::Negative);
    }

    #[test]
    fn test_remove_example_edits_in_place() {
        let mut t = trial();
        t.add_example("a", Polarity::Positive);
        t.add_example("b", Polarity::Negative);
        assert!(t.remove_example(0));
        assert!(!t.remove_example(5));
        assert_eq!(t.examples()[0].string, "b");
    }
}
