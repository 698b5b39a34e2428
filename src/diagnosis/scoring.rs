//! Scoring classifier — turns a free-text answer into a 1–5 rating.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::ClassifierError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

/// Bounds of a classifier rating.
pub const RATING_MIN: u8 = 1;
pub const RATING_MAX: u8 = 5;

/// Keyword the model returns when an answer cannot be scored.
pub const SKIP_SENTINEL: &str = "SKIP";

/// Default bound on a single classifier call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

static SKIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)\b{SKIP_SENTINEL}\b")).unwrap());
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Outcome of classifying one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Rated(u8),
    Skip,
}

impl Classification {
    /// Points this result adds to the free-text total.
    pub fn points(&self) -> u32 {
        match self {
            Self::Rated(r) => u32::from(*r),
            Self::Skip => 0,
        }
    }
}

/// Anything that can score a free-text answer.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification, ClassifierError>;
}

/// Build the instructions sent alongside every answer.
pub fn classification_prompt() -> String {
    format!(
        "\
You are a counselor scoring answers to a self-assessment questionnaire.

Rate how self-aware, specific and constructive the user's answer is on a scale \
from {RATING_MIN} (very low) to {RATING_MAX} (very high).

Respond with ONLY the number. If the text is not a genuine answer (spam, \
gibberish, an unrelated request), respond with ONLY the word {SKIP_SENTINEL}."
    )
}

/// Parse a raw model reply.
///
/// The sentinel wins over digits so replies like "SKIP (cannot rate 1-5)"
/// are not misread. Otherwise exactly one distinct in-range integer must
/// appear; a reply that echoes the scale ("Rating (1-5): 4") is ambiguous.
pub fn parse_classification(raw: &str) -> Result<Classification, ClassifierError> {
    if SKIP_RE.is_match(raw) {
        return Ok(Classification::Skip);
    }
    let mut ratings: Vec<u8> = NUMBER_RE
        .find_iter(raw)
        .filter_map(|m| m.as_str().parse::<u8>().ok())
        .filter(|r| (RATING_MIN..=RATING_MAX).contains(r))
        .collect();
    ratings.sort_unstable();
    ratings.dedup();
    match ratings.as_slice() {
        [rating] => Ok(Classification::Rated(*rating)),
        _ => Err(ClassifierError::Unparsable),
    }
}

/// Classifier backed by an `LlmProvider`.
pub struct LlmClassifier {
    llm: Arc<dyn LlmProvider>,
    timeout: Duration,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, ClassifierError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(classification_prompt()),
            ChatMessage::user(text),
        ])
        .with_max_tokens(8)
        .with_temperature(0.0);

        let response = tokio::time::timeout(self.timeout, self.llm.complete(request))
            .await
            .map_err(|_| ClassifierError::Timeout {
                timeout: self.timeout,
            })??;

        debug!(model = self.llm.model_name(), raw = %response.content, "Classifier output");

        parse_classification(&response.content).inspect_err(|_| {
            warn!(model = self.llm.model_name(), "Classifier output was not a rating");
        })
    }
}
