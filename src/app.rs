//! Startup wiring — configuration in, ready-to-serve router out.

use std::sync::Arc;

use axum::Router;
use tracing::info;

use crate::channels::LineClient;
use crate::config::BotConfig;
use crate::diagnosis::{DiagnosisEngine, LlmClassifier, QuestionCatalog};
use crate::error::Result;
use crate::llm::create_provider;
use crate::store::InMemorySessionStore;
use crate::webhook::{Dispatcher, WebhookState, webhook_routes};

/// A fully wired bot.
pub struct App {
    pub config: BotConfig,
    pub router: Router,
}

impl App {
    /// Read the environment and wire everything up.
    pub fn from_env() -> Result<Self> {
        Self::from_config(BotConfig::from_env()?)
    }

    pub fn from_config(config: BotConfig) -> Result<Self> {
        let catalog = match &config.catalog_path {
            Some(path) => QuestionCatalog::from_json_file(path)?,
            None => QuestionCatalog::builtin(),
        };
        info!(
            choice = catalog.choice().len(),
            free_text = catalog.free_text().len(),
            max_score = catalog.max_score(),
            "Question catalog loaded"
        );

        let llm = create_provider(&config.llm)?;
        let classifier = LlmClassifier::new(llm).with_timeout(config.classifier_timeout);
        let engine = Arc::new(DiagnosisEngine::new(
            Arc::new(catalog),
            Arc::new(classifier),
            config.diagnosis.clone(),
        ));

        let channel = Arc::new(LineClient::new(&config.line));
        let store = Arc::new(InMemorySessionStore::new());
        let dispatcher = Arc::new(Dispatcher::new(engine, store, channel));

        let router = webhook_routes(WebhookState {
            dispatcher,
            channel_secret: config.line.channel_secret.clone(),
        });

        Ok(Self { config, router })
    }
}
