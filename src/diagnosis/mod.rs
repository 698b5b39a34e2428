//! Diagnosis dialogue — a scored questionnaire delivered over chat.
//!
//! A pass walks the user through a list of multiple-choice statements, then
//! a list of open questions whose free-text answers are rated by an LLM
//! classifier. The combined score is normalized into a 1..=10 tier and
//! reported back. The engine is transport-neutral: it consumes
//! `InboundEvent`s and yields `Outbound` messages plus a session update.

pub mod catalog;
pub mod engine;
pub mod messages;
pub mod scoring;
pub mod state;

pub use catalog::{Question, QuestionCatalog, QuestionKind};
pub use engine::{DiagnosisEngine, SessionUpdate, Turn};
pub use messages::Messages;
pub use scoring::{Classification, Classifier, LlmClassifier};
pub use state::{Phase, Session};
