//! The experiment state machine: phase sequencing, trial advancement, and
//! payload handoff.
//!
//! The flow owns one run configuration (constructed once, no ambient
//! globals), the two sequencer instances, the live trial, and the shared
//! fingerprint. Phases form a closed set; completing one starts the next.
//! Everything is participant-paced: the flow only moves when one of its
//! interaction methods is called.

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, info};
use trial_kernel::{Advance, NullSurface, Sequencer, TrialSurface};

use crate::assignment::{AssignmentBook, SampledRule};
use crate::config::RunConfig;
use crate::fingerprint::{ClientEnv, SharedFingerprint, shared};
use crate::fixtures::RuleDescriptor;
use crate::inference::{GlossChoice, InferenceTrial};
use crate::presentation::{AuthoredResponse, PresentationTrial};
use crate::questionnaire::{FormValidator, Questionnaire, RequiredFields};
use crate::submission::{SubmissionPayload, assemble_payload};

/// The closed set of experiment phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseId {
    Send,
    Receive,
    Questionnaire,
}

impl PhaseId {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Receive => "receive",
            Self::Questionnaire => "questionnaire",
        }
    }
}

#[cfg(feature = "debug-nav")]
impl std::str::FromStr for PhaseId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "send" => Ok(Self::Send),
            "receive" => Ok(Self::Receive),
            "questionnaire" => Ok(Self::Questionnaire),
            other => bail!("unknown phase: {other}"),
        }
    }
}

/// A receive-phase record: the sampled input merged with the participant's
/// gloss choice.
#[derive(Debug, Clone, Serialize)]
pub struct ReceiveRecord {
    #[serde(flatten)]
    pub input: SampledRule,
    #[serde(flatten)]
    pub choice: GlossChoice,
}

/// Host-supplied collaborators for a session.
pub struct FlowDeps {
    pub client_env: ClientEnv,
    pub send_surface: Box<dyn TrialSurface<RuleDescriptor>>,
    pub receive_surface: Box<dyn TrialSurface<SampledRule>>,
    pub validator: Box<dyn FormValidator>,
}

impl FlowDeps {
    /// Null surfaces and the configured required-field validator. For
    /// headless runs and tests.
    pub fn headless(config: &RunConfig, client_env: ClientEnv) -> Self {
        Self {
            client_env,
            send_surface: Box::new(NullSurface),
            receive_surface: Box::new(NullSurface),
            validator: Box::new(RequiredFields::new(config.required_fields.clone())),
        }
    }
}

/// The experiment flow for one participant session.
pub struct ExperimentFlow {
    config: RunConfig,
    fingerprint: SharedFingerprint,
    rng: ChaCha8Rng,

    send: Sequencer<RuleDescriptor, AuthoredResponse>,
    receive: Option<Sequencer<SampledRule, ReceiveRecord>>,
    server_assignments: BTreeMap<String, usize>,
    questionnaire: Questionnaire,

    live_presentation: Option<PresentationTrial>,
    live_inference: Option<InferenceTrial>,

    send_surface: Box<dyn TrialSurface<RuleDescriptor>>,
    receive_surface: Box<dyn TrialSurface<SampledRule>>,
    validator: Box<dyn FormValidator>,

    phase: Option<PhaseId>,
    payload: Option<SubmissionPayload>,
}

impl ExperimentFlow {
    pub fn new(config: RunConfig, deps: FlowDeps) -> Self {
        let fingerprint = shared(&deps.client_env);
        let rng = config.rng();
        let send = Sequencer::new(config.sending_rules.clone());

        Self {
            config,
            fingerprint,
            rng,
            send,
            receive: None,
            server_assignments: BTreeMap::new(),
            questionnaire: Questionnaire::new(),
            live_presentation: None,
            live_inference: None,
            send_surface: deps.send_surface,
            receive_surface: deps.receive_surface,
            validator: deps.validator,
            phase: None,
            payload: None,
        }
    }

    /// Begin the session at the send phase.
    pub fn start(&mut self) -> Result<()> {
        info!(
            sending_rules = self.send.inputs().len(),
            include_receive = self.config.include_receive,
            "session starting"
        );
        self.start_send()
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn phase(&self) -> Option<PhaseId> {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.payload.is_some()
    }

    /// The shared fingerprint, for spawning lookup tasks against.
    pub fn fingerprint(&self) -> SharedFingerprint {
        self.fingerprint.clone()
    }

    // --- send phase -------------------------------------------------------

    fn start_send(&mut self) -> Result<()> {
        self.phase = Some(PhaseId::Send);
        match self.send.start(self.send_surface.as_mut()) {
            Advance::Mounted(index) => {
                let rule = self.send.inputs()[index].clone();
                self.live_presentation = Some(PresentationTrial::new(rule));
                Ok(())
            }
            Advance::Complete => self.after_send(),
        }
    }

    /// The live send trial, if the send phase is running.
    pub fn presentation_mut(&mut self) -> Option<&mut PresentationTrial> {
        self.live_presentation.as_mut()
    }

    /// Submit the live send trial. Advances to the next trial or, when the
    /// phase completes, starts the next phase. Returns false when there is
    /// nothing to submit (no live trial, nothing authored, or a repeat).
    pub fn submit_presentation(&mut self) -> Result<bool> {
        let Some(trial) = self.live_presentation.as_mut() else {
            return Ok(false);
        };
        let Some(output) = trial.submit() else {
            return Ok(false);
        };
        self.live_presentation = None;

        match self.send.record_and_advance(output, self.send_surface.as_mut()) {
            Advance::Mounted(index) => {
                let rule = self.send.inputs()[index].clone();
                self.live_presentation = Some(PresentationTrial::new(rule));
                Ok(true)
            }
            Advance::Complete => {
                debug!("send phase complete");
                self.after_send()?;
                Ok(true)
            }
        }
    }

    fn after_send(&mut self) -> Result<()> {
        if self.config.include_receive {
            self.start_receive()
        } else {
            self.start_questionnaire()
        }
    }

    // --- receive phase ----------------------------------------------------

    /// Record a server-supplied sequence number for a rule, ahead of the
    /// receive phase. First write per rule wins; anything arriving after
    /// the phase has started is ignored.
    pub fn set_server_assignment(&mut self, rule_id: impl Into<String>, seq_number: usize) {
        if self.receive.is_some() {
            debug!("server assignment after receive start ignored");
            return;
        }
        self.server_assignments.entry(rule_id.into()).or_insert(seq_number);
    }

    fn start_receive(&mut self) -> Result<()> {
        self.phase = Some(PhaseId::Receive);

        if self.receive.is_none() {
            let book_rng = ChaCha8Rng::seed_from_u64(self.rng.random());
            let mut book = AssignmentBook::new(
                &self.config.curriculum,
                &self.config.generalization_questions,
                book_rng,
            );
            for (rule, seq) in &self.server_assignments {
                book.set_randomize(rule, Some(*seq));
            }
            book.assign_remaining();
            let inputs = book.into_inputs();
            info!(rules = inputs.len(), "receive phase assigned");
            self.receive = Some(Sequencer::new(inputs));
        }

        let Some(sequencer) = self.receive.as_mut() else {
            bail!("receive sequencer missing");
        };
        match sequencer.start(self.receive_surface.as_mut()) {
            Advance::Mounted(index) => {
                let input = sequencer.inputs()[index].clone();
                self.live_inference = Some(Self::build_inference(&self.config, &input)?);
                Ok(())
            }
            Advance::Complete => self.start_questionnaire(),
        }
    }

    fn build_inference(config: &RunConfig, input: &SampledRule) -> Result<InferenceTrial> {
        let Some(items) = config.gloss_items.get(&input.id) else {
            bail!("no gloss options for rule {}", input.id);
        };
        Ok(InferenceTrial::new(input.examples.clone(), items.clone()))
    }

    /// The live receive trial, if the receive phase is running.
    pub fn inference_mut(&mut self) -> Option<&mut InferenceTrial> {
        self.live_inference.as_mut()
    }

    /// Finalize the live receive trial (its gloss-stage Next). Advances to
    /// the next trial or on to the questionnaire.
    pub fn finish_inference(&mut self) -> Result<bool> {
        let Some(trial) = self.live_inference.as_mut() else {
            return Ok(false);
        };
        let Some(choice) = trial.finish() else {
            return Ok(false);
        };
        self.live_inference = None;

        let Some(sequencer) = self.receive.as_mut() else {
            bail!("receive sequencer missing");
        };
        let Some(index) = sequencer.live() else {
            bail!("no live receive trial to record");
        };
        let record = ReceiveRecord {
            input: sequencer.inputs()[index].clone(),
            choice,
        };

        match sequencer.record_and_advance(record, self.receive_surface.as_mut()) {
            Advance::Mounted(next) => {
                let input = sequencer.inputs()[next].clone();
                self.live_inference = Some(Self::build_inference(&self.config, &input)?);
                Ok(true)
            }
            Advance::Complete => {
                debug!("receive phase complete");
                self.start_questionnaire()?;
                Ok(true)
            }
        }
    }

    /// Records collected by the receive phase so far.
    pub fn receive_records(&self) -> &[ReceiveRecord] {
        self.receive.as_ref().map(|s| s.outputs()).unwrap_or_default()
    }

    // --- questionnaire and handoff ---------------------------------------

    fn start_questionnaire(&mut self) -> Result<()> {
        self.phase = Some(PhaseId::Questionnaire);
        Ok(())
    }

    pub fn set_questionnaire_field(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> bool {
        if self.phase != Some(PhaseId::Questionnaire) {
            return false;
        }
        self.questionnaire.set_field(name, value)
    }

    /// Submit the questionnaire. Blocked by the validation collaborator
    /// until every required field is filled; on success the submission
    /// payload is assembled and the session is finished.
    pub fn submit_questionnaire(&mut self) -> Result<bool> {
        if self.phase != Some(PhaseId::Questionnaire) {
            return Ok(false);
        }
        if !self.questionnaire.submit(self.validator.as_ref()) {
            return Ok(false);
        }

        self.payload = Some(assemble_payload(
            &self.fingerprint,
            &self.questionnaire,
            self.send.inputs(),
            self.send.outputs(),
        ));
        self.phase = None;
        info!("session finished; payload assembled");
        Ok(true)
    }

    pub fn payload(&self) -> Option<&SubmissionPayload> {
        self.payload.as_ref()
    }

    pub fn take_payload(&mut self) -> Option<SubmissionPayload> {
        self.payload.take()
    }

    /// Progress of the phase that is currently running trials.
    pub fn progress(&self) -> Option<trial_kernel::Progress> {
        match self.phase? {
            PhaseId::Send => Some(self.send.progress()),
            PhaseId::Receive => self.receive.as_ref().map(|s| s.progress()),
            PhaseId::Questionnaire => None,
        }
    }

    /// Jump straight to a named phase's start, bypassing normal
    /// sequencing. Operator tooling only.
    #[cfg(feature = "debug-nav")]
    pub fn start_phase(&mut self, phase: PhaseId) -> Result<()> {
        match phase {
            PhaseId::Send => self.start_send(),
            PhaseId::Receive => self.start_receive(),
            PhaseId::Questionnaire => self.start_questionnaire(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curriculum::Polarity;

    fn flow(include_receive: bool) -> ExperimentFlow {
        let mut config = RunConfig::pilot(Some(11));
        config.include_receive = include_receive;
        let deps = FlowDeps::headless(&config, ClientEnv::default());
        ExperimentFlow::new(config, deps)
    }

    fn complete_send_phase(flow: &mut ExperimentFlow) {
        while flow.phase() == Some(PhaseId::Send) {
            let trial = flow.presentation_mut().expect("live send trial");
            trial.add_example("example", Polarity::Positive);
            flow.submit_presentation().unwrap();
        }
    }

    #[test]
    fn test_default_flow_skips_receive() {
        let mut flow = flow(false);
        flow.start().unwrap();
        assert_eq!(flow.phase(), Some(PhaseId::Send));

        complete_send_phase(&mut flow);
        assert_eq!(flow.phase(), Some(PhaseId::Questionnaire));
    }

    #[test]
    fn test_receive_phase_runs_when_configured() {
        let mut flow = flow(true);
        flow.start().unwrap();
        complete_send_phase(&mut flow);

        assert_eq!(flow.phase(), Some(PhaseId::Receive));
        let total = flow.progress().unwrap().total;
        assert_eq!(total, 3);

        while flow.phase() == Some(PhaseId::Receive) {
            let trial = flow.inference_mut().expect("live receive trial");
            while trial.reveal_next() {}
            assert!(trial.advance_to_gloss());
            let id = trial.gloss().items()[0].gloss_id.clone();
            assert!(trial.select_gloss(&id));
            assert!(flow.finish_inference().unwrap());
        }

        assert_eq!(flow.phase(), Some(PhaseId::Questionnaire));
        assert_eq!(flow.receive_records().len(), 3);
    }

    #[test]
    fn test_submit_presentation_requires_authored_example() {
        let mut flow = flow(false);
        flow.start().unwrap();

        // nothing authored: the advance control stays unavailable
        assert!(!flow.submit_presentation().unwrap());
        assert_eq!(flow.progress().unwrap().completed, 0);
    }

    #[test]
    fn test_questionnaire_gates_payload() {
        let mut flow = flow(false);
        flow.start().unwrap();
        complete_send_phase(&mut flow);

        assert!(!flow.submit_questionnaire().unwrap());
        assert!(flow.payload().is_none());

        for field in flow.config().required_fields.clone() {
            flow.set_questionnaire_field(field, "answer");
        }
        assert!(flow.submit_questionnaire().unwrap());
        assert!(flow.is_finished());

        let payload = flow.payload().unwrap();
        assert_eq!(payload.send.len(), 4);
        assert_eq!(
            payload.questionnaire.outputs.get("age").map(String::as_str),
            Some("answer")
        );
    }

    #[test]
    fn test_server_assignment_first_write_wins() {
        let mut flow = flow(true);
        flow.set_server_assignment("zip-code", 1);
        flow.set_server_assignment("zip-code", 2);

        flow.start().unwrap();
        complete_send_phase(&mut flow);

        let sequencer = flow.receive.as_ref().unwrap();
        let sampled = sequencer
            .inputs()
            .iter()
            .find(|s| s.id == "zip-code")
            .unwrap();
        let teachers = flow.config.curriculum.teachers("zip-code");
        assert_eq!(sampled.seq_id, teachers[1 % teachers.len()]);
        assert_eq!(sampled.randomization, crate::assignment::Randomization::Server);
    }

    #[test]
    fn test_questionnaire_fields_rejected_outside_phase() {
        let mut flow = flow(false);
        flow.start().unwrap();
        assert!(!flow.set_questionnaire_field("q_age", "29"));
    }

    #[cfg(feature = "debug-nav")]
    #[test]
    fn test_debug_nav_jumps_to_named_phase() {
        let mut flow = flow(false);
        flow.start_phase(PhaseId::Questionnaire).unwrap();
        assert_eq!(flow.phase(), Some(PhaseId::Questionnaire));

        let parsed: PhaseId = "receive".parse().unwrap();
        assert_eq!(parsed, PhaseId::Receive);
    }
}
