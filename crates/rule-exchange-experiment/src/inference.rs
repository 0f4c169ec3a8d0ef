//! Receive-phase trial: study revealed examples one at a time, then pick
//! the gloss that best describes the hidden rule.
//!
//! Every transition is participant-initiated and monotonic: no
//! un-revealing, no changing a finalized selection, no auto-advance.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::curriculum::{Example, Polarity};
use crate::fixtures::GlossItem;

/// Visibility of one example in the reveal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealState {
    Hidden,
    /// Next in line: its reveal control is active.
    OnDeck,
    Revealed,
}

/// Stage 1: examples are revealed strictly in input order.
#[derive(Debug, Clone)]
pub struct RevealStage {
    examples: Vec<Example>,
    num_revealed: usize,
    next_used: bool,
}

impl RevealStage {
    fn new(examples: Vec<Example>) -> Self {
        Self {
            examples,
            num_revealed: 0,
            next_used: false,
        }
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    pub fn num_revealed(&self) -> usize {
        self.num_revealed
    }

    pub fn reveal_state(&self, index: usize) -> RevealState {
        if index < self.num_revealed {
            RevealState::Revealed
        } else if index == self.num_revealed {
            RevealState::OnDeck
        } else {
            RevealState::Hidden
        }
    }

    /// Reveal the on-deck example. Returns false once everything is
    /// revealed.
    pub fn reveal_next(&mut self) -> bool {
        if self.num_revealed == self.examples.len() {
            return false;
        }
        self.num_revealed += 1;
        true
    }

    pub fn all_revealed(&self) -> bool {
        self.num_revealed == self.examples.len()
    }

    /// The stage's Next control: enabled exactly once every example is
    /// revealed, and never again after first use.
    pub fn next_enabled(&self) -> bool {
        self.all_revealed() && !self.next_used
    }
}

/// Stage 2 output: which gloss the participant settled on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlossChoice {
    pub gloss_id: String,
    pub gloss: String,
    pub correct: bool,
}

/// Stage 2: single-select over the fixed gloss options for this rule.
#[derive(Debug, Clone)]
pub struct GlossStage {
    items: Vec<GlossItem>,
    selected: Option<usize>,
    finished: bool,
}

impl GlossStage {
    fn new(items: Vec<GlossItem>) -> Self {
        Self {
            items,
            selected: None,
            finished: false,
        }
    }

    pub fn items(&self) -> &[GlossItem] {
        &self.items
    }

    /// Record a selection. The selection may change until the stage is
    /// finalized; an unknown id is ignored.
    pub fn select(&mut self, gloss_id: &str) -> bool {
        if self.finished {
            return false;
        }
        match self.items.iter().position(|i| i.gloss_id == gloss_id) {
            Some(index) => {
                self.selected = Some(index);
                true
            }
            None => false,
        }
    }

    pub fn selection(&self) -> Option<&GlossItem> {
        self.selected.map(|i| &self.items[i])
    }

    /// The stage's Next control: available once a selection exists, gone
    /// after first use.
    pub fn next_enabled(&self) -> bool {
        self.selected.is_some() && !self.finished
    }
}

/// Where a receive trial stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceStage {
    Revealing,
    ChoosingGloss,
    Done,
}

/// One receive-phase trial: reveal stage, then gloss selection.
#[derive(Debug, Clone)]
pub struct InferenceTrial {
    reveal: RevealStage,
    gloss: GlossStage,
    stage: InferenceStage,
}

impl InferenceTrial {
    pub fn new(examples: Vec<Example>, gloss_items: Vec<GlossItem>) -> Self {
        Self {
            reveal: RevealStage::new(examples),
            gloss: GlossStage::new(gloss_items),
            stage: InferenceStage::Revealing,
        }
    }

    pub fn stage(&self) -> InferenceStage {
        self.stage
    }

    pub fn reveal(&self) -> &RevealStage {
        &self.reveal
    }

    pub fn gloss(&self) -> &GlossStage {
        &self.gloss
    }

    /// Reveal the next example (reveal-stage click).
    pub fn reveal_next(&mut self) -> bool {
        if self.stage != InferenceStage::Revealing {
            return false;
        }
        self.reveal.reveal_next()
    }

    /// The reveal stage's Next control. Activates the gloss stage;
    /// permanently disabled after first use.
    pub fn advance_to_gloss(&mut self) -> bool {
        if self.stage != InferenceStage::Revealing || !self.reveal.next_enabled() {
            return false;
        }
        self.reveal.next_used = true;
        self.stage = InferenceStage::ChoosingGloss;
        true
    }

    /// Record a gloss selection (may change until finalized).
    pub fn select_gloss(&mut self, gloss_id: &str) -> bool {
        if self.stage != InferenceStage::ChoosingGloss {
            return false;
        }
        self.gloss.select(gloss_id)
    }

    /// The gloss stage's Next control: finalize the trial and emit the
    /// recorded choice. Idempotent.
    pub fn finish(&mut self) -> Option<GlossChoice> {
        if self.stage != InferenceStage::ChoosingGloss || !self.gloss.next_enabled() {
            return None;
        }
        let item = self.gloss.selection()?.clone();
        self.gloss.finished = true;
        self.stage = InferenceStage::Done;
        Some(GlossChoice {
            gloss_id: item.gloss_id,
            gloss: item.gloss,
            correct: item.correct,
        })
    }
}

/// A single answer in the generalization sub-stage's action history.
#[derive(Debug, Clone, Serialize)]
pub struct GeneralizationAction {
    pub at: DateTime<Utc>,
    pub string: String,
    pub polarity: Polarity,
}

/// Held-out strings classified positive/negative by the participant.
///
/// Present in the component model but not wired into the active trial
/// flow; hosts may run it between the reveal and gloss stages.
#[derive(Debug, Clone, Default)]
pub struct GeneralizationStage {
    questions: Vec<String>,
    /// Newest first; the latest answer for a string wins.
    actions: Vec<GeneralizationAction>,
    next_used: bool,
}

impl GeneralizationStage {
    pub fn new(questions: Vec<String>) -> Self {
        Self {
            questions,
            actions: Vec::new(),
            next_used: false,
        }
    }

    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    /// Answer one question. Unknown strings and finished stages are
    /// ignored.
    pub fn answer(&mut self, string: &str, polarity: Polarity) -> bool {
        if self.next_used || !self.questions.iter().any(|q| q == string) {
            return false;
        }
        self.actions.insert(
            0,
            GeneralizationAction {
                at: Utc::now(),
                string: string.to_string(),
                polarity,
            },
        );
        true
    }

    /// Current response per question; the latest answer wins.
    pub fn responses(&self) -> Vec<Option<Polarity>> {
        self.questions
            .iter()
            .map(|q| {
                self.actions
                    .iter()
                    .find(|a| &a.string == q)
                    .map(|a| a.polarity)
            })
            .collect()
    }

    pub fn all_answered(&self) -> bool {
        self.responses().iter().all(Option::is_some)
    }

    /// The sub-stage's Next control: unlocked only when every question has
    /// an answer, gone after first use.
    pub fn next_enabled(&self) -> bool {
        self.all_answered() && !self.next_used
    }

    /// Finalize the sub-stage. Idempotent.
    pub fn finish(&mut self) -> bool {
        if !self.next_enabled() {
            return false;
        }
        self.next_used = true;
        true
    }

    /// Every recorded answer, newest first.
    pub fn history(&self) -> &[GeneralizationAction] {
        &self.actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn examples() -> Vec<Example> {
        vec![
            Example::new("31708", Polarity::Positive),
            Example::new("236778", Polarity::Negative),
        ]
    }

    fn gloss_items() -> Vec<GlossItem> {
        fixtures::afc_gloss_items().remove("zip-code").unwrap()
    }

    #[test]
    fn test_examples_reveal_in_strict_order() {
        let mut trial = InferenceTrial::new(examples(), gloss_items());

        assert_eq!(trial.reveal().reveal_state(0), RevealState::OnDeck);
        assert_eq!(trial.reveal().reveal_state(1), RevealState::Hidden);

        assert!(trial.reveal_next());
        assert_eq!(trial.reveal().reveal_state(0), RevealState::Revealed);
        assert_eq!(trial.reveal().reveal_state(1), RevealState::OnDeck);

        assert!(trial.reveal_next());
        assert!(trial.reveal().all_revealed());
        // nothing left to reveal
        assert!(!trial.reveal_next());
    }

    #[test]
    fn test_next_enabled_exactly_when_all_revealed() {
        let mut trial = InferenceTrial::new(examples(), gloss_items());

        assert!(!trial.reveal().next_enabled());
        trial.reveal_next();
        assert!(!trial.reveal().next_enabled());
        trial.reveal_next();
        assert!(trial.reveal().next_enabled());
    }

    #[test]
    fn test_reveal_next_control_is_single_use() {
        let mut trial = InferenceTrial::new(examples(), gloss_items());
        trial.reveal_next();
        trial.reveal_next();

        assert!(trial.advance_to_gloss());
        assert_eq!(trial.stage(), InferenceStage::ChoosingGloss);
        // permanently disabled after first use
        assert!(!trial.advance_to_gloss());
        assert!(!trial.reveal().next_enabled());
    }

    #[test]
    fn test_gloss_stage_unreachable_before_reveal_complete() {
        let mut trial = InferenceTrial::new(examples(), gloss_items());
        trial.reveal_next();

        assert!(!trial.advance_to_gloss());
        assert!(!trial.select_gloss("\\d{5}"));
        assert!(trial.finish().is_none());
    }

    #[test]
    fn test_correct_flag_tracks_fixture_data() {
        let mut trial = InferenceTrial::new(examples(), gloss_items());
        trial.reveal_next();
        trial.reveal_next();
        trial.advance_to_gloss();

        // changing the selection before finalizing is allowed
        assert!(trial.select_gloss("\\d+"));
        assert!(trial.select_gloss("\\d{5}"));

        let choice = trial.finish().unwrap();
        assert_eq!(choice.gloss_id, "\\d{5}");
        assert!(choice.correct);
    }

    #[test]
    fn test_incorrect_selection_recorded_as_incorrect() {
        let mut trial = InferenceTrial::new(examples(), gloss_items());
        trial.reveal_next();
        trial.reveal_next();
        trial.advance_to_gloss();
        trial.select_gloss(".{5}");

        let choice = trial.finish().unwrap();
        assert!(!choice.correct);
    }

    #[test]
    fn test_finish_requires_selection_and_is_idempotent() {
        let mut trial = InferenceTrial::new(examples(), gloss_items());
        trial.reveal_next();
        trial.reveal_next();
        trial.advance_to_gloss();

        assert!(trial.finish().is_none());

        trial.select_gloss("\\d{5}");
        assert!(trial.finish().is_some());
        assert!(trial.finish().is_none());
        // a finalized selection cannot change
        assert!(!trial.select_gloss("\\d+"));
        assert_eq!(trial.stage(), InferenceStage::Done);
    }

    #[test]
    fn test_unknown_gloss_id_ignored() {
        let mut trial = InferenceTrial::new(examples(), gloss_items());
        trial.reveal_next();
        trial.reveal_next();
        trial.advance_to_gloss();

        assert!(!trial.select_gloss("no-such-gloss"));
        assert!(trial.gloss().selection().is_none());
    }

    #[test]
    fn test_generalization_next_unlocks_when_all_answered() {
        let mut stage = GeneralizationStage::new(vec!["aaa".into(), "bbb".into()]);

        assert!(!stage.next_enabled());
        stage.answer("aaa", Polarity::Positive);
        assert!(!stage.next_enabled());
        stage.answer("bbb", Polarity::Negative);
        assert!(stage.next_enabled());

        assert!(stage.finish());
        assert!(!stage.finish());
    }

    #[test]
    fn test_generalization_latest_answer_wins() {
        let mut stage = GeneralizationStage::new(vec!["aaa".into()]);
        stage.answer("aaa", Polarity::Positive);
        stage.answer("aaa", Polarity::Negative);

        assert_eq!(stage.responses(), vec![Some(Polarity::Negative)]);
        // both answers stay in the history
        assert_eq!(stage.history().len(), 2);
    }

    #[test]
    fn test_generalization_ignores_unknown_string() {
        let mut stage = GeneralizationStage::new(vec!["aaa".into()]);
        assert!(!stage.answer("zzz", Polarity::Positive));
        assert!(stage.history().is_empty());
    }
}
