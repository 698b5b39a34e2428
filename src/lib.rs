//! Diagnosis bot — a LINE counselor that runs a scored self-assessment.

pub mod app;
pub mod channels;
pub mod config;
pub mod diagnosis;
pub mod error;
pub mod llm;
pub mod store;
pub mod webhook;
