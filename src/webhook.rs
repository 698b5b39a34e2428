//! Webhook surface — verifies and parses LINE callbacks, then drives each
//! event through the diagnosis engine.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use futures::future::join_all;
use secrecy::{ExposeSecret, SecretString};
use tower_http::trace::TraceLayer;
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use crate::channels::line::{SIGNATURE_HEADER, parse_events, verify_signature};
use crate::channels::{Content, InboundEvent, Outbound, OutboundChannel};
use crate::diagnosis::{DiagnosisEngine, SessionUpdate};
use crate::error::ChannelError;
use crate::store::{SessionStore, UserLocks};

/// Runs inbound events through load → engine → deliver → persist.
pub struct Dispatcher {
    engine: Arc<DiagnosisEngine>,
    store: Arc<dyn SessionStore>,
    channel: Arc<dyn OutboundChannel>,
    locks: UserLocks,
}

impl Dispatcher {
    pub fn new(
        engine: Arc<DiagnosisEngine>,
        store: Arc<dyn SessionStore>,
        channel: Arc<dyn OutboundChannel>,
    ) -> Self {
        Self {
            engine,
            store,
            channel,
            locks: UserLocks::new(),
        }
    }

    /// Process one webhook batch. Events of the same user are handled in
    /// delivery order; different users proceed concurrently.
    pub async fn dispatch(&self, events: Vec<InboundEvent>) {
        let mut by_user: Vec<(String, Vec<InboundEvent>)> = Vec::new();
        for event in events {
            match by_user.iter_mut().find(|(user, _)| *user == event.user_id) {
                Some((_, queue)) => queue.push(event),
                None => by_user.push((event.user_id.clone(), vec![event])),
            }
        }

        join_all(by_user.into_iter().map(|(_, queue)| async move {
            for event in &queue {
                let span = info_span!(
                    "event",
                    event_id = %Uuid::new_v4(),
                    user_id = %event.user_id,
                );
                if let Err(e) = self.process(event).instrument(span).await {
                    warn!(user_id = %event.user_id, error = %e, "Event not applied");
                }
            }
        }))
        .await;
    }

    /// Handle a single event while holding the user's lock.
    ///
    /// The session is persisted only after the reply was delivered, so a
    /// failed reply leaves the stored state as it was.
    pub async fn process(&self, event: &InboundEvent) -> Result<(), ChannelError> {
        let _guard = self.locks.acquire(&event.user_id).await;

        let session = self.store.get(&event.user_id).await;
        let turn = self.engine.handle(session, event).await;
        self.deliver(event, &turn.outbound).await?;

        match turn.update {
            SessionUpdate::Keep => {}
            SessionUpdate::Put(session) => {
                debug!(phase = %session.phase, "Session stored");
                self.store.put(&event.user_id, session).await;
            }
            SessionUpdate::Delete => {
                debug!("Session deleted");
                self.store.delete(&event.user_id).await;
            }
        }
        Ok(())
    }

    async fn deliver(&self, event: &InboundEvent, outbound: &[Outbound]) -> Result<(), ChannelError> {
        let mut replies: Vec<Content> = Vec::new();
        let mut pushes: Vec<Content> = Vec::new();
        for message in outbound {
            match message {
                Outbound::Reply(content) => replies.push(content.clone()),
                Outbound::Push(content) => pushes.push(content.clone()),
            }
        }

        if !replies.is_empty() {
            match &event.reply_token {
                Some(token) => self.channel.reply(token, &replies).await?,
                None => self.channel.push(&event.user_id, &replies).await?,
            }
        }

        if !pushes.is_empty() {
            if let Err(e) = self.channel.push(&event.user_id, &pushes).await {
                warn!(
                    channel = self.channel.name(),
                    error = %e,
                    "Push failed; continuing"
                );
            }
        }
        Ok(())
    }
}

/// Shared state for the webhook route.
#[derive(Clone)]
pub struct WebhookState {
    pub dispatcher: Arc<Dispatcher>,
    pub channel_secret: SecretString,
}

/// POST /webhook
///
/// Rejects unsigned or mis-signed bodies with 401, otherwise processes the
/// batch and answers `OK`.
async fn handle_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !verify_signature(state.channel_secret.expose_secret(), &body, signature) {
        warn!("Rejected webhook with invalid signature");
        return (StatusCode::UNAUTHORIZED, "invalid signature").into_response();
    }

    let events = match parse_events(&body) {
        Ok(events) => events,
        Err(e) => {
            warn!(error = %e, "Rejected malformed webhook body");
            return (StatusCode::BAD_REQUEST, "invalid body").into_response();
        }
    };
    debug!(count = events.len(), "Webhook batch received");

    state.dispatcher.dispatch(events).await;
    (StatusCode::OK, "OK").into_response()
}

/// Build the webhook router.
pub fn webhook_routes(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::config::DiagnosisConfig;
    use crate::diagnosis::scoring::{Classification, Classifier};
    use crate::diagnosis::{Phase, QuestionCatalog};
    use crate::error::ClassifierError;
    use crate::store::InMemorySessionStore;

    struct FixedClassifier;

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn classify(&self, _text: &str) -> Result<Classification, ClassifierError> {
            Ok(Classification::Rated(3))
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Reply(String, Vec<Content>),
        Push(String, Vec<Content>),
    }

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<Sent>>,
        fail_replies: bool,
        fail_pushes: bool,
    }

    #[async_trait]
    impl OutboundChannel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn reply(&self, token: &str, messages: &[Content]) -> Result<(), ChannelError> {
            if self.fail_replies {
                return Err(ChannelError::Http("reply down".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Reply(token.to_string(), messages.to_vec()));
            Ok(())
        }

        async fn push(&self, user_id: &str, messages: &[Content]) -> Result<(), ChannelError> {
            if self.fail_pushes {
                return Err(ChannelError::Http("push down".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Push(user_id.to_string(), messages.to_vec()));
            Ok(())
        }
    }

    fn dispatcher(
        channel: Arc<RecordingChannel>,
    ) -> (Dispatcher, Arc<InMemorySessionStore>) {
        let engine = Arc::new(DiagnosisEngine::new(
            Arc::new(QuestionCatalog::builtin()),
            Arc::new(FixedClassifier),
            DiagnosisConfig::default(),
        ));
        let store = Arc::new(InMemorySessionStore::new());
        let dispatcher = Dispatcher::new(engine, store.clone(), channel);
        (dispatcher, store)
    }

    #[tokio::test]
    async fn first_message_replies_pushes_and_stores() {
        let channel = Arc::new(RecordingChannel::default());
        let (dispatcher, store) = dispatcher(channel.clone());

        dispatcher
            .dispatch(vec![InboundEvent::text("U1", "hi").with_reply_token("r1")])
            .await;

        let sent = channel.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert!(matches!(&sent[0], Sent::Reply(token, _) if token == "r1"));
        assert!(matches!(&sent[1], Sent::Push(user, msgs)
            if user == "U1" && matches!(msgs[0], Content::Choice(_))));
        assert_eq!(
            store.get("U1").await.unwrap().phase,
            Phase::Choice { step: 0 }
        );
    }

    #[tokio::test]
    async fn reply_without_token_falls_back_to_push() {
        let channel = Arc::new(RecordingChannel::default());
        let (dispatcher, _store) = dispatcher(channel.clone());

        dispatcher.dispatch(vec![InboundEvent::text("U1", "hi")]).await;

        let sent = channel.sent.lock().unwrap().clone();
        assert!(sent.iter().all(|s| matches!(s, Sent::Push(..))));
        assert_eq!(sent.len(), 2);
    }

    #[tokio::test]
    async fn failed_reply_leaves_session_untouched() {
        let channel = Arc::new(RecordingChannel {
            fail_replies: true,
            ..Default::default()
        });
        let (dispatcher, store) = dispatcher(channel);

        let event = InboundEvent::text("U1", "hi").with_reply_token("r1");
        assert!(dispatcher.process(&event).await.is_err());
        assert!(store.get("U1").await.is_none());
    }

    #[tokio::test]
    async fn failed_push_still_persists() {
        let channel = Arc::new(RecordingChannel {
            fail_pushes: true,
            ..Default::default()
        });
        let (dispatcher, store) = dispatcher(channel);

        let event = InboundEvent::text("U1", "hi").with_reply_token("r1");
        dispatcher.process(&event).await.unwrap();
        assert!(store.get("U1").await.is_some());
    }

    #[tokio::test]
    async fn same_user_events_apply_in_order() {
        let channel = Arc::new(RecordingChannel::default());
        let (dispatcher, store) = dispatcher(channel);

        dispatcher
            .dispatch(vec![
                InboundEvent::text("U1", "hi").with_reply_token("r1"),
                InboundEvent::text("U2", "hi").with_reply_token("r2"),
                InboundEvent::text("U1", "5").with_reply_token("r3"),
                InboundEvent::text("U1", "4").with_reply_token("r4"),
            ])
            .await;

        let u1 = store.get("U1").await.unwrap();
        assert_eq!(u1.phase, Phase::Choice { step: 2 });
        assert_eq!(u1.choice_score, 9);
        assert_eq!(
            store.get("U2").await.unwrap().phase,
            Phase::Choice { step: 0 }
        );
    }

    #[tokio::test]
    async fn non_text_events_change_nothing() {
        let channel = Arc::new(RecordingChannel::default());
        let (dispatcher, store) = dispatcher(channel.clone());

        let sticker = InboundEvent {
            user_id: "U1".into(),
            reply_token: Some("r1".into()),
            kind: crate::channels::EventKind::Other,
        };
        dispatcher.dispatch(vec![sticker]).await;
        assert!(channel.sent.lock().unwrap().is_empty());
        assert!(store.get("U1").await.is_none());
    }
}
