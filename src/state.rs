//! Shared application state.

use std::sync::Arc;

use crate::auth::SessionKeys;
use crate::config::AppConfig;
use crate::domain::events::DomainEvent;
use crate::store::Store;

/// Cheap to clone; everything lives behind one `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    config: AppConfig,
    store: Arc<dyn Store>,
    sessions: SessionKeys,
    nats: Option<async_nats::Client>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn Store>, nats: Option<async_nats::Client>) -> Self {
        let sessions = SessionKeys::new(&config.session_secret);
        Self { inner: Arc::new(Inner { config, store, sessions, nats }) }
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    pub fn sessions(&self) -> &SessionKeys {
        &self.inner.sessions
    }

    /// Hand domain events to downstream consumers.
    ///
    /// Events are always logged. With NATS configured they are also published
    /// as JSON on the event's subject. A failed publish is logged and never
    /// fails the request that raised the event.
    pub async fn publish(&self, events: Vec<DomainEvent>) {
        for event in events {
            let subject = event.subject();
            tracing::debug!(%subject, ?event, "Domain event");

            let Some(nats) = &self.inner.nats else { continue };
            let payload = match serde_json::to_vec(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(%subject, error = %e, "Failed to serialize event");
                    continue;
                }
            };
            if let Err(e) = nats.publish(subject.clone(), payload.into()).await {
                tracing::warn!(%subject, error = %e, "Failed to publish event");
            }
        }
    }
}
