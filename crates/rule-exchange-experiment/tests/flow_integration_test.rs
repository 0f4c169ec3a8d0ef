//! Integration tests for the full session flow: one rule, one contributor,
//! send -> receive -> questionnaire -> payload.

use std::time::Duration;

use rule_exchange_experiment::config::RunConfig;
use rule_exchange_experiment::curriculum::{
    Curriculum, CurriculumFilter, Polarity, RawResponseRow,
};
use rule_exchange_experiment::fingerprint::ClientEnv;
use rule_exchange_experiment::fixtures::{self, RuleDescriptor};
use rule_exchange_experiment::flow::{ExperimentFlow, FlowDeps, PhaseId};
use rule_exchange_experiment::submission::{
    DeliveryOptions, MemoryChannel, PrimaryWindow, deliver,
};

fn row(string: &str, polarity: Polarity, num: usize) -> RawResponseRow {
    RawResponseRow {
        example_num: num,
        polarity,
        rule_id: "zip-code".to_string(),
        string: string.to_string(),
        trial_num: 0,
        teacher_id: "ecba21d".to_string(),
    }
}

/// One rule, one contributor, two examples.
fn tiny_config() -> RunConfig {
    let rows = vec![
        row("90210", Polarity::Positive, 0),
        row("123", Polarity::Negative, 1),
    ];
    let mut config = RunConfig::from_rows(&rows, Some(42));
    config.curriculum = Curriculum::from_rows(&rows, &CurriculumFilter::default());
    config.sending_rules = vec![RuleDescriptor::new(
        "zip-code-1",
        "The sequence is exactly 5 characters long",
    )];
    config.include_receive = true;
    config.submit_settle = Duration::ZERO;
    config.window_close_delay = Duration::ZERO;
    config
}

fn new_flow() -> ExperimentFlow {
    let config = tiny_config();
    let deps = FlowDeps::headless(&config, ClientEnv::default());
    ExperimentFlow::new(config, deps)
}

fn correct_gloss_id() -> String {
    fixtures::afc_gloss_items()["zip-code"]
        .iter()
        .find(|i| i.correct)
        .map(|i| i.gloss_id.clone())
        .expect("fixture has a correct gloss")
}

#[test]
fn test_end_to_end_reveal_then_gloss_then_questionnaire() {
    let mut flow = new_flow();
    flow.start().unwrap();

    // send phase: author and submit for the single distractor rule
    assert_eq!(flow.phase(), Some(PhaseId::Send));
    {
        let trial = flow.presentation_mut().unwrap();
        assert_eq!(trial.rule().id, "zip-code-1");
        trial.add_example("55555", Polarity::Positive);
        trial.add_example("12", Polarity::Negative);
        trial.set_reveal_rule("typed five digits, then deleted some");
        trial.set_reveal_interface("keyboard");
    }
    assert!(flow.submit_presentation().unwrap());

    // receive phase: the lone contributor's sequence is assigned
    assert_eq!(flow.phase(), Some(PhaseId::Receive));
    let trial = flow.inference_mut().unwrap();
    assert_eq!(trial.reveal().examples().len(), 2);

    // reveal example 0: Next still disabled
    assert!(trial.reveal_next());
    assert!(!trial.reveal().next_enabled());
    assert!(!trial.advance_to_gloss());

    // reveal example 1: Next enabled, advance to the gloss stage
    assert!(trial.reveal_next());
    assert!(trial.reveal().next_enabled());
    assert!(trial.advance_to_gloss());

    // select the designated-correct gloss and finish
    let correct_id = correct_gloss_id();
    assert!(trial.select_gloss(&correct_id));
    assert!(flow.finish_inference().unwrap());

    let records = flow.receive_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].choice.gloss_id, correct_id);
    assert!(records[0].choice.correct);
    assert_eq!(records[0].input.seq_id, "ecba21d");

    // questionnaire is the terminal phase
    assert_eq!(flow.phase(), Some(PhaseId::Questionnaire));
}

#[test]
fn test_payload_round_trip_strips_reveal_fields() {
    let mut flow = new_flow();
    flow.start().unwrap();

    {
        let trial = flow.presentation_mut().unwrap();
        trial.add_example("55555", Polarity::Positive);
        trial.set_reveal_rule("counted characters");
        trial.set_reveal_interface("mouse");
    }
    flow.submit_presentation().unwrap();

    // walk the receive phase without ceremony
    while flow.phase() == Some(PhaseId::Receive) {
        let trial = flow.inference_mut().unwrap();
        while trial.reveal_next() {}
        trial.advance_to_gloss();
        let id = trial.gloss().items()[0].gloss_id.clone();
        trial.select_gloss(&id);
        flow.finish_inference().unwrap();
    }

    for field in flow.config().required_fields.clone() {
        flow.set_questionnaire_field(field, "answered");
    }
    assert!(flow.submit_questionnaire().unwrap());

    let payload = flow.payload().unwrap();
    assert_eq!(payload.send.len(), 1);
    assert_eq!(payload.send[0].id, "zip-code-1");
    assert_eq!(
        payload.send[0].description,
        "The sequence is exactly 5 characters long"
    );
    assert_eq!(payload.send[0].examples.len(), 1);

    let json = serde_json::to_value(payload).unwrap();
    let send = &json["send"][0];
    assert!(send.get("revealRule").is_none());
    assert!(send.get("revealInterface").is_none());
    assert_eq!(send["examples"][0]["string"], "55555");
}

#[tokio::test]
async fn test_finished_session_delivers_through_channel() {
    let mut flow = new_flow();
    flow.start().unwrap();

    {
        let trial = flow.presentation_mut().unwrap();
        trial.add_example("90210", Polarity::Positive);
    }
    flow.submit_presentation().unwrap();

    while flow.phase() == Some(PhaseId::Receive) {
        let trial = flow.inference_mut().unwrap();
        while trial.reveal_next() {}
        trial.advance_to_gloss();
        let id = trial.gloss().items()[1].gloss_id.clone();
        trial.select_gloss(&id);
        flow.finish_inference().unwrap();
    }

    for field in flow.config().required_fields.clone() {
        flow.set_questionnaire_field(field, "done");
    }
    flow.submit_questionnaire().unwrap();

    let options = DeliveryOptions::from(flow.config());
    let payload = flow.take_payload().unwrap();
    let mut channel = MemoryChannel::new();
    let mut window = PrimaryWindow;

    deliver(payload, &mut channel, &mut window, options)
        .await
        .unwrap();

    assert_eq!(channel.submissions.len(), 1);
    let (delivered, ack) = &channel.submissions[0];
    assert!(*ack);
    assert_eq!(delivered.send.len(), 1);
}

#[test]
fn test_trials_advance_in_input_order() {
    let mut config = tiny_config();
    config.include_receive = false;
    config.sending_rules = vec![
        RuleDescriptor::new("3a-1", "first"),
        RuleDescriptor::new("suffix-s-1", "second"),
    ];
    let deps = FlowDeps::headless(&config, ClientEnv::default());
    let mut flow = ExperimentFlow::new(config, deps);
    flow.start().unwrap();

    let first = flow.presentation_mut().unwrap().rule().id.clone();
    assert_eq!(first, "3a-1");
    flow.presentation_mut()
        .unwrap()
        .add_example("aaa", Polarity::Positive);
    flow.submit_presentation().unwrap();

    let second = flow.presentation_mut().unwrap().rule().id.clone();
    assert_eq!(second, "suffix-s-1");
    assert_eq!(flow.progress().unwrap().completed, 1);
}
