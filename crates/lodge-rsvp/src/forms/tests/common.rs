use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::forms::catalog::EMAIL_PATTERN;
use crate::forms::descriptor::{
    EmailTemplate, FieldDescriptor, FieldKind, FieldPattern, FormDefinition, ValidationRules,
};
use crate::forms::repository::{
    DeliveryReceipt, Document, DocumentId, DocumentStore, EmailDispatcher, EmailRequest,
    NotificationError, StoreError,
};
use crate::forms::service::RsvpSubmissionService;
use crate::forms::state::FormSession;

pub(super) fn dinner_form() -> Arc<FormDefinition> {
    let fields = vec![
        FieldDescriptor::new("name", "Name", FieldKind::Text)
            .required()
            .rules(ValidationRules::default().with_error_message("Name is required")),
        FieldDescriptor::new("email", "Email", FieldKind::Email)
            .required()
            .rules(
                ValidationRules::default()
                    .with_pattern(FieldPattern::new(EMAIL_PATTERN).expect("pattern compiles"))
                    .with_error_message("Valid email is required"),
            ),
        FieldDescriptor::new("guests", "Guests", FieldKind::Number)
            .default_value(0_i64)
            .rules(ValidationRules::default().with_min(0)),
        FieldDescriptor::new("notes", "Notes", FieldKind::Textarea)
            .rules(ValidationRules::default().with_max_length(200)),
    ];
    let form = FormDefinition::new("steak-dinner", "Steak Dinner", "Steak-Dinner", fields)
        .expect("valid form")
        .with_email(EmailTemplate {
            service_id: "service_test".to_string(),
            template_id: "template_test".to_string(),
            public_key: "public_test".to_string(),
        });
    Arc::new(form)
}

pub(super) fn filled_session(form: Arc<FormDefinition>, name: &str, email: &str) -> FormSession {
    let session = FormSession::new(form);
    session.set_value("name", name).expect("name field");
    session.set_value("email", email).expect("email field");
    session.set_value("guests", "2").expect("guests field");
    session
}

pub(super) type TestService = RsvpSubmissionService<MemoryStore, MemoryMailer>;

pub(super) fn service(store: &Arc<MemoryStore>, mailer: &Arc<MemoryMailer>) -> TestService {
    RsvpSubmissionService::new(store.clone(), mailer.clone())
}

type InsertHook = Box<dyn Fn() + Send + Sync>;

/// Document store fake recording every call.
#[derive(Default)]
pub(super) struct MemoryStore {
    documents: Mutex<Vec<(String, Document)>>,
    queries: Mutex<Vec<(String, String, Value)>>,
    insert_calls: Mutex<usize>,
    query_error: Mutex<Option<StoreError>>,
    insert_error: Mutex<Option<StoreError>>,
    stall_insert: AtomicBool,
    panic_on_query: AtomicBool,
    on_insert: Mutex<Option<InsertHook>>,
}

impl MemoryStore {
    pub(super) fn seed(&self, collection: &str, document: Document) {
        self.documents
            .lock()
            .expect("store mutex poisoned")
            .push((collection.to_string(), document));
    }

    pub(super) fn fail_queries(&self, err: StoreError) {
        *self.query_error.lock().expect("store mutex poisoned") = Some(err);
    }

    pub(super) fn fail_inserts(&self, err: StoreError) {
        *self.insert_error.lock().expect("store mutex poisoned") = Some(err);
    }

    pub(super) fn stall_inserts(&self) {
        self.stall_insert.store(true, Ordering::SeqCst);
    }

    pub(super) fn panic_on_query(&self) {
        self.panic_on_query.store(true, Ordering::SeqCst);
    }

    pub(super) fn on_insert(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_insert.lock().expect("store mutex poisoned") = Some(Box::new(hook));
    }

    pub(super) fn documents(&self, collection: &str) -> Vec<Document> {
        self.documents
            .lock()
            .expect("store mutex poisoned")
            .iter()
            .filter(|(name, _)| name == collection)
            .map(|(_, document)| document.clone())
            .collect()
    }

    pub(super) fn queries(&self) -> Vec<(String, String, Value)> {
        self.queries.lock().expect("store mutex poisoned").clone()
    }

    pub(super) fn insert_calls(&self) -> usize {
        *self.insert_calls.lock().expect("store mutex poisoned")
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn query_equals(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError> {
        if self.panic_on_query.load(Ordering::SeqCst) {
            panic!("store client crashed");
        }
        self.queries.lock().expect("store mutex poisoned").push((
            collection.to_string(),
            field.to_string(),
            value.clone(),
        ));
        if let Some(err) = self.query_error.lock().expect("store mutex poisoned").clone() {
            return Err(err);
        }
        Ok(self
            .documents(collection)
            .into_iter()
            .filter(|document| document.get(field) == Some(value))
            .collect())
    }

    async fn insert(&self, collection: &str, document: Document) -> Result<DocumentId, StoreError> {
        *self.insert_calls.lock().expect("store mutex poisoned") += 1;
        {
            let hook = self.on_insert.lock().expect("store mutex poisoned");
            if let Some(hook) = hook.as_ref() {
                hook();
            }
        }
        if self.stall_insert.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(err) = self.insert_error.lock().expect("store mutex poisoned").clone() {
            return Err(err);
        }
        let mut documents = self.documents.lock().expect("store mutex poisoned");
        documents.push((collection.to_string(), document));
        Ok(DocumentId(format!("doc-{:04}", documents.len())))
    }
}

/// Email dispatcher fake recording every request.
#[derive(Default)]
pub(super) struct MemoryMailer {
    sent: Mutex<Vec<EmailRequest>>,
    error: Mutex<Option<NotificationError>>,
    stall: AtomicBool,
}

impl MemoryMailer {
    pub(super) fn fail_with(&self, err: NotificationError) {
        *self.error.lock().expect("mailer mutex poisoned") = Some(err);
    }

    pub(super) fn stall(&self) {
        self.stall.store(true, Ordering::SeqCst);
    }

    pub(super) fn sent(&self) -> Vec<EmailRequest> {
        self.sent.lock().expect("mailer mutex poisoned").clone()
    }
}

#[async_trait]
impl EmailDispatcher for MemoryMailer {
    async fn send(&self, request: EmailRequest) -> Result<DeliveryReceipt, NotificationError> {
        self.sent.lock().expect("mailer mutex poisoned").push(request);
        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(err) = self.error.lock().expect("mailer mutex poisoned").clone() {
            return Err(err);
        }
        Ok(DeliveryReceipt {
            message_id: "msg-1".to_string(),
        })
    }
}
