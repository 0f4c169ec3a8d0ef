//! Submission assembly and delivery.
//!
//! Assembly is a pure reshaping step: send-phase outputs are merged with
//! their rule descriptors, reveal-only fields are dropped, and the result
//! is bundled with the fingerprint and questionnaire outputs. Delivery
//! hands the payload to the host's submission channel after a short settle
//! delay, and closes a secondary window once the submission is on its way.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::RunConfig;
use crate::curriculum::Example;
use crate::fingerprint::{Fingerprint, SharedFingerprint, snapshot};
use crate::fixtures::RuleDescriptor;
use crate::presentation::AuthoredResponse;
use crate::questionnaire::Questionnaire;

/// One reshaped send-phase result: the rule descriptor's fields merged with
/// the authored examples. Reveal metadata does not survive assembly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendResult {
    pub id: String,
    pub description: String,
    pub examples: Vec<Example>,
}

/// Questionnaire section of the payload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QuestionnaireSection {
    pub outputs: BTreeMap<String, String>,
}

/// The final payload handed to the submission channel.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionPayload {
    pub fingerprint: Fingerprint,
    pub questionnaire: QuestionnaireSection,
    pub send: Vec<SendResult>,
}

/// Merge send inputs with their outputs, stripping reveal-only fields and
/// flattening each output's example set into a plain ordered sequence.
pub fn assemble_send_results(
    inputs: &[RuleDescriptor],
    outputs: &[AuthoredResponse],
) -> Vec<SendResult> {
    inputs
        .iter()
        .zip(outputs)
        .map(|(rule, authored)| SendResult {
            id: rule.id.clone(),
            description: rule.description.clone(),
            examples: authored.examples.clone(),
        })
        .collect()
}

/// Build the full payload from everything the session collected. The
/// fingerprint ships as-is: whatever the lookups resolved by now.
pub fn assemble_payload(
    fingerprint: &SharedFingerprint,
    questionnaire: &Questionnaire,
    send_inputs: &[RuleDescriptor],
    send_outputs: &[AuthoredResponse],
) -> SubmissionPayload {
    SubmissionPayload {
        fingerprint: snapshot(fingerprint),
        questionnaire: QuestionnaireSection {
            outputs: questionnaire.outputs().cloned().unwrap_or_default(),
        },
        send: assemble_send_results(send_inputs, send_outputs),
    }
}

/// Which window the session runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowContext {
    Primary,
    /// Opened by another window; closed shortly after submission.
    Secondary,
}

/// The host's submission channel (e.g. the crowdsourcing platform bridge).
pub trait SubmissionChannel: Send {
    fn submit(&mut self, payload: &SubmissionPayload, needs_ack: bool) -> Result<()>;
}

/// The window the session lives in.
pub trait HostWindow: Send {
    fn context(&self) -> WindowContext;
    fn close(&mut self);
}

/// A primary window that nothing ever closes.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrimaryWindow;

impl HostWindow for PrimaryWindow {
    fn context(&self) -> WindowContext {
        WindowContext::Primary
    }

    fn close(&mut self) {}
}

/// Channel that records every submission. For tests and simulation.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    pub submissions: Vec<(SubmissionPayload, bool)>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SubmissionChannel for MemoryChannel {
    fn submit(&mut self, payload: &SubmissionPayload, needs_ack: bool) -> Result<()> {
        self.submissions.push((payload.clone(), needs_ack));
        Ok(())
    }
}

/// Channel that writes each payload to a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileChannel {
    path: PathBuf,
}

impl JsonFileChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SubmissionChannel for JsonFileChannel {
    fn submit(&mut self, payload: &SubmissionPayload, _needs_ack: bool) -> Result<()> {
        let json = serde_json::to_string_pretty(payload)?;
        fs::write(&self.path, json)
            .with_context(|| format!("writing payload to {}", self.path.display()))?;
        Ok(())
    }
}

/// Delivery timing, taken from the run configuration.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryOptions {
    pub settle: std::time::Duration,
    pub close_delay: std::time::Duration,
}

impl From<&RunConfig> for DeliveryOptions {
    fn from(config: &RunConfig) -> Self {
        Self {
            settle: config.submit_settle,
            close_delay: config.window_close_delay,
        }
    }
}

/// Hand the payload to the submission channel.
///
/// Waits for the settle delay first (lets the last UI paint land), submits
/// with an acknowledgment required, and in a secondary-window context
/// schedules the window's closure after the close delay.
pub async fn deliver(
    payload: SubmissionPayload,
    channel: &mut dyn SubmissionChannel,
    window: &mut dyn HostWindow,
    options: DeliveryOptions,
) -> Result<()> {
    sleep(options.settle).await;
    channel.submit(&payload, true)?;
    info!(send_results = payload.send.len(), "submission delivered");

    if window.context() == WindowContext::Secondary {
        sleep(options.close_delay).await;
        debug!("closing secondary window");
        window.close();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curriculum::Polarity;
    use std::time::Duration;

    fn authored() -> AuthoredResponse {
        AuthoredResponse {
            examples: vec![
                Example::new("90210", Polarity::Positive),
                Example::new("123", Polarity::Negative),
            ],
            reveal_rule: Some("counted digits".to_string()),
            reveal_interface: Some("typed".to_string()),
        }
    }

    #[test]
    fn test_reshape_merges_descriptor_and_strips_reveal_fields() {
        let inputs = vec![RuleDescriptor::new(
            "zip-code-1",
            "The sequence is exactly 5 characters long",
        )];
        let outputs = vec![authored()];

        let results = assemble_send_results(&inputs, &outputs);
        assert_eq!(
            results,
            vec![SendResult {
                id: "zip-code-1".to_string(),
                description: "The sequence is exactly 5 characters long".to_string(),
                examples: outputs[0].examples.clone(),
            }]
        );

        let json = serde_json::to_value(&results[0]).unwrap();
        assert!(json.get("revealRule").is_none());
        assert!(json.get("revealInterface").is_none());
        assert_eq!(json["id"], "zip-code-1");
    }

    #[test]
    fn test_payload_shape() {
        use crate::fingerprint::{ClientEnv, shared};
        use crate::questionnaire::RequiredFields;

        let fingerprint = shared(&ClientEnv::default());
        let mut questionnaire = Questionnaire::new();
        questionnaire.set_field("q_age", "31");
        assert!(questionnaire.submit(&RequiredFields::new(vec!["q_age".into()])));

        let inputs = vec![RuleDescriptor::new("3a-1", "at least 6 a's")];
        let outputs = vec![authored()];
        let payload = assemble_payload(&fingerprint, &questionnaire, &inputs, &outputs);

        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("fingerprint").is_some());
        assert_eq!(json["questionnaire"]["outputs"]["age"], "31");
        assert_eq!(json["send"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deliver_submits_with_ack_required() {
        let mut channel = MemoryChannel::new();
        let mut window = PrimaryWindow;
        let payload = SubmissionPayload {
            fingerprint: Fingerprint::default(),
            questionnaire: QuestionnaireSection::default(),
            send: Vec::new(),
        };
        let options = DeliveryOptions {
            settle: Duration::ZERO,
            close_delay: Duration::ZERO,
        };

        deliver(payload, &mut channel, &mut window, options)
            .await
            .unwrap();

        assert_eq!(channel.submissions.len(), 1);
        assert!(channel.submissions[0].1, "acknowledgment must be required");
    }

    #[tokio::test]
    async fn test_deliver_closes_secondary_window() {
        struct SecondaryWindow {
            closed: bool,
        }
        impl HostWindow for SecondaryWindow {
            fn context(&self) -> WindowContext {
                WindowContext::Secondary
            }
            fn close(&mut self) {
                self.closed = true;
            }
        }

        let mut channel = MemoryChannel::new();
        let mut window = SecondaryWindow { closed: false };
        let payload = SubmissionPayload {
            fingerprint: Fingerprint::default(),
            questionnaire: QuestionnaireSection::default(),
            send: Vec::new(),
        };
        let options = DeliveryOptions {
            settle: Duration::ZERO,
            close_delay: Duration::ZERO,
        };

        deliver(payload, &mut channel, &mut window, options)
            .await
            .unwrap();

        assert!(window.closed);
    }
}
