use async_trait::async_trait;
use lodge_rsvp::forms::{
    DeliveryReceipt, Document, DocumentId, DocumentStore, EmailDispatcher, EmailRequest,
    NotificationError, StoreError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Process-local document store keyed by collection name.
#[derive(Default, Clone)]
pub(crate) struct InMemoryDocumentStore {
    collections: Arc<Mutex<HashMap<String, Vec<Document>>>>,
    next_id: Arc<AtomicU64>,
}

impl InMemoryDocumentStore {
    pub(crate) fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .lock()
            .map(|guard| guard.get(collection).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn query_equals(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError> {
        let guard = self.collections.lock().map_err(|_| poisoned())?;
        Ok(guard
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|document| document.get(field) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(&self, collection: &str, document: Document) -> Result<DocumentId, StoreError> {
        let mut guard = self.collections.lock().map_err(|_| poisoned())?;
        guard
            .entry(collection.to_string())
            .or_default()
            .push(document);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(DocumentId(format!("rsvp-{id:06}")))
    }
}

/// Email dispatcher that logs each confirmation instead of contacting a provider.
#[derive(Default, Clone)]
pub(crate) struct LoggingEmailDispatcher {
    sent: Arc<Mutex<Vec<EmailRequest>>>,
    failure: Option<String>,
}

impl LoggingEmailDispatcher {
    /// Dispatcher whose provider rejects every message with `reason`.
    pub(crate) fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }

    pub(crate) fn sent(&self) -> Vec<EmailRequest> {
        self.sent
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EmailDispatcher for LoggingEmailDispatcher {
    async fn send(&self, request: EmailRequest) -> Result<DeliveryReceipt, NotificationError> {
        if let Some(reason) = &self.failure {
            warn!(template = %request.template_id, %reason, "email provider rejected message");
            return Err(NotificationError::Rejected(reason.clone()));
        }

        let mut guard = self
            .sent
            .lock()
            .map_err(|_| NotificationError::Transport("outbox lock poisoned".to_string()))?;
        guard.push(request.clone());
        let message_id = format!("local-{}", guard.len());
        info!(
            service = %request.service_id,
            template = %request.template_id,
            to = request.params.get("to_email").map(String::as_str).unwrap_or_default(),
            %message_id,
            "confirmation email queued"
        );
        Ok(DeliveryReceipt { message_id })
    }
}
