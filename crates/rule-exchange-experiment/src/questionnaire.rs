//! Terminal survey phase: named free-text/choice fields gated by an
//! external validation collaborator.

use std::collections::BTreeMap;

use tracing::debug;

/// External form-validation collaborator. The core only consumes the
/// "submit attempted & valid" signal.
pub trait FormValidator {
    fn is_valid(&self, fields: &BTreeMap<String, String>) -> bool;
}

/// Validator requiring a non-blank value for each named field.
#[derive(Debug, Clone)]
pub struct RequiredFields {
    required: Vec<String>,
}

impl RequiredFields {
    pub fn new(required: Vec<String>) -> Self {
        Self { required }
    }
}

impl FormValidator for RequiredFields {
    fn is_valid(&self, fields: &BTreeMap<String, String>) -> bool {
        self.required
            .iter()
            .all(|name| fields.get(name).is_some_and(|v| !v.trim().is_empty()))
    }
}

/// The questionnaire phase. Field values accumulate until a valid submit
/// extracts them into the output mapping; the phase never auto-skips.
#[derive(Debug, Clone, Default)]
pub struct Questionnaire {
    fields: BTreeMap<String, String>,
    outputs: Option<BTreeMap<String, String>>,
}

impl Questionnaire {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a field value. No-op after submission.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        if self.outputs.is_some() {
            return false;
        }
        self.fields.insert(name.into(), value.into());
        true
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Attempt submission. Blocked by the validator until every required
    /// field is filled; once through, all named field values are extracted
    /// into a key -> value mapping with the form's `q_` name prefix
    /// stripped. Idempotent.
    pub fn submit(&mut self, validator: &dyn FormValidator) -> bool {
        if self.outputs.is_some() {
            return true;
        }
        if !validator.is_valid(&self.fields) {
            debug!("questionnaire submit blocked by validation");
            return false;
        }
        let outputs = self
            .fields
            .iter()
            .map(|(name, value)| {
                let key = name.strip_prefix("q_").unwrap_or(name);
                (key.to_string(), value.clone())
            })
            .collect();
        self.outputs = Some(outputs);
        true
    }

    pub fn is_submitted(&self) -> bool {
        self.outputs.is_some()
    }

    pub fn outputs(&self) -> Option<&BTreeMap<String, String>> {
        self.outputs.as_ref()
    }
}
