//! Rule-Exchange Experiment: a crowdsourced rule-learning study.
//!
//! One group of participants (senders) is shown sequence-classification
//! rules and authors labeled example strings; a second group (receivers)
//! studies those examples and must infer the rule. This crate implements
//! the experiment core: the curriculum store, the two trial state machines,
//! the questionnaire, fingerprinting, and submission assembly. Rendering,
//! form validation, and network lookups are collaborators behind traits.

pub mod assignment;
pub mod config;
pub mod curriculum;
pub mod fingerprint;
pub mod fixtures;
pub mod flow;
pub mod inference;
pub mod presentation;
pub mod questionnaire;
pub mod simulation;
pub mod submission;
