//! DiagnosisEngine — decides the next messages and session state for one
//! inbound event.
//!
//! The engine never touches storage. It receives the current session (or
//! `None` for an unknown user) and returns a `Turn`: the outbound messages
//! plus what should happen to the stored session. Callers persist the update
//! only after the turn has been fully computed.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::channels::{Content, EventKind, InboundEvent, Outbound};
use crate::config::{DiagnosisConfig, FollowPolicy, RetakePolicy};

use super::catalog::QuestionCatalog;
use super::messages::{choice_prompt, free_text_prompt};
use super::scoring::Classifier;
use super::state::{Phase, Session};

/// What to do with the stored session after a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// Leave the stored session exactly as it was.
    Keep,
    /// Replace the stored session.
    Put(Session),
    /// Remove the stored session.
    Delete,
}

/// Result of handling one inbound event.
#[derive(Debug, Clone)]
pub struct Turn {
    /// Messages to deliver, in order. At most one `Reply`.
    pub outbound: Vec<Outbound>,
    pub update: SessionUpdate,
}

impl Turn {
    fn keep(outbound: Vec<Outbound>) -> Self {
        Self {
            outbound,
            update: SessionUpdate::Keep,
        }
    }

    fn reply_and_keep(text: String) -> Self {
        Self::keep(vec![Outbound::Reply(Content::Text(text))])
    }
}

/// The diagnosis state machine.
pub struct DiagnosisEngine {
    catalog: Arc<QuestionCatalog>,
    classifier: Arc<dyn Classifier>,
    config: DiagnosisConfig,
}

impl DiagnosisEngine {
    pub fn new(
        catalog: Arc<QuestionCatalog>,
        classifier: Arc<dyn Classifier>,
        config: DiagnosisConfig,
    ) -> Self {
        Self {
            catalog,
            classifier,
            config,
        }
    }

    /// Whether `text` is one of the in-band restart commands.
    pub fn is_restart(&self, text: &str) -> bool {
        let text = text.trim().to_lowercase();
        self.config
            .restart_keywords
            .iter()
            .any(|k| k.to_lowercase() == text)
    }

    /// Handle one inbound event against the user's current session.
    pub async fn handle(&self, session: Option<Session>, event: &InboundEvent) -> Turn {
        match &event.kind {
            EventKind::Follow => self.on_follow(session),
            EventKind::Message { text } => self.on_message(session, text).await,
            EventKind::Other => {
                debug!(user_id = %event.user_id, "Ignoring non-text event");
                Turn::keep(Vec::new())
            }
        }
    }

    fn on_follow(&self, session: Option<Session>) -> Turn {
        let greeting = self.config.messages.greeting.clone();
        let finished_single_pass = session.as_ref().is_some_and(|s| s.completed);
        match self.config.follow_policy {
            FollowPolicy::GreetAndStart if !finished_single_pass => self.start(greeting),
            _ => Turn::reply_and_keep(greeting),
        }
    }

    async fn on_message(&self, session: Option<Session>, text: &str) -> Turn {
        let Some(session) = session else {
            return self.start(self.config.messages.introduction.clone());
        };

        if session.completed {
            return Turn::reply_and_keep(self.config.messages.already_completed.clone());
        }

        if self.is_restart(text) {
            info!(phase = %session.phase, "Restarting diagnosis");
            return self.start(self.config.messages.introduction.clone());
        }

        match session.phase {
            Phase::Choice { step } => self.answer_choice(session, step, text),
            Phase::FreeText { step } => self.answer_free_text(session, step, text).await,
            Phase::Done { tier } => {
                let keyword = self
                    .config
                    .restart_keywords
                    .first()
                    .map(String::as_str)
                    .unwrap_or_default();
                Turn::reply_and_keep(self.config.messages.finished_hint(tier, keyword))
            }
        }
    }

    /// Open a fresh session: reply with `intro`, push the first question.
    fn start(&self, intro: String) -> Turn {
        let phase = if self.catalog.choice().is_empty() {
            Phase::FreeText { step: 0 }
        } else {
            Phase::Choice { step: 0 }
        };
        let session = Session::new(phase);
        let mut outbound = vec![Outbound::Reply(Content::Text(intro))];
        if let Some(prompt) = self.prompt_for(phase) {
            outbound.push(Outbound::Push(prompt));
        }
        info!(%phase, "Diagnosis started");
        Turn {
            outbound,
            update: SessionUpdate::Put(session),
        }
    }

    fn prompt_for(&self, phase: Phase) -> Option<Content> {
        match phase {
            Phase::Choice { step } => {
                let list = self.catalog.choice();
                list.get(step).map(|q| choice_prompt(q, step, list.len()))
            }
            Phase::FreeText { step } => {
                let list = self.catalog.free_text();
                list.get(step).map(|q| free_text_prompt(q, step, list.len()))
            }
            Phase::Done { .. } => None,
        }
    }

    /// Record a multiple-choice answer. Unrecognised answers still advance.
    fn answer_choice(&self, mut session: Session, step: usize, text: &str) -> Turn {
        match self
            .catalog
            .choice()
            .get(step)
            .and_then(|q| q.match_choice(text))
        {
            Some(option) => {
                session.choice_score = session.choice_score.saturating_add(option.value);
                debug!(step, value = option.value, total = session.choice_score, "Choice answer");
            }
            None => debug!(step, "Choice answer not recognised, skipping"),
        }
        self.enter(session, Phase::Choice { step: step + 1 })
    }

    /// Gate, classify and record a free-text answer.
    async fn answer_free_text(&self, mut session: Session, step: usize, text: &str) -> Turn {
        let answer = text.trim();
        let len = answer.chars().count();
        if len < self.config.min_answer_chars {
            debug!(step, len, "Free-text answer too short");
            return Turn::reply_and_keep(
                self.config.messages.elaborate(self.config.min_answer_chars, len),
            );
        }

        match self.classifier.classify(answer).await {
            Ok(classification) => {
                session.free_text_score = session
                    .free_text_score
                    .saturating_add(classification.points());
                debug!(
                    step,
                    ?classification,
                    total = session.free_text_score,
                    "Free-text answer scored"
                );
                self.enter(session, Phase::FreeText { step: step + 1 })
            }
            Err(e) => {
                warn!(step, error = %e, "Classifier failed; asking the user to retry");
                Turn::reply_and_keep(self.config.messages.classifier_unavailable.clone())
            }
        }
    }

    /// Move the session into `phase`, rolling over exhausted lists, and
    /// reply with the next prompt or the result.
    fn enter(&self, mut session: Session, mut phase: Phase) -> Turn {
        session.touch();
        if let Phase::Choice { step } = phase {
            if step >= self.catalog.choice().len() {
                phase = Phase::FreeText { step: 0 };
            }
        }
        if let Phase::FreeText { step } = phase {
            if step >= self.catalog.free_text().len() {
                return self.finish(session);
            }
        }

        session.phase = phase;
        let outbound = self
            .prompt_for(phase)
            .map(Outbound::Reply)
            .into_iter()
            .collect();
        Turn {
            outbound,
            update: SessionUpdate::Put(session),
        }
    }

    fn finish(&self, mut session: Session) -> Turn {
        let total = session.total_score();
        let max = self.catalog.max_score();
        let tier = self.catalog.tier(total);
        session.phase = Phase::Done { tier };

        info!(
            choice_score = session.choice_score,
            free_text_score = session.free_text_score,
            total,
            tier,
            "Diagnosis finished"
        );

        let reply = Outbound::Reply(Content::Text(self.config.messages.result(total, max, tier)));
        let update = match self.config.retake_policy {
            RetakePolicy::Unlimited => SessionUpdate::Put(session),
            RetakePolicy::SinglePass => {
                session.completed = true;
                SessionUpdate::Put(session)
            }
            RetakePolicy::DeleteOnDone => SessionUpdate::Delete,
        };
        Turn {
            outbound: vec![reply],
            update,
        }
    }
}
