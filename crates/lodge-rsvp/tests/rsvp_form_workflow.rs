//! End-to-end behavior of the RSVP form engine through its public API: validation ordering,
//! input-time guards, and the submission workflow against recording collaborators.

mod common {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::Value;

    use lodge_rsvp::forms::{
        DeliveryReceipt, Document, DocumentId, DocumentStore, EmailDispatcher, EmailRequest,
        EmailTemplate, FieldDescriptor, FieldKind, FieldPattern, FormDefinition,
        NotificationError, StoreError, ValidationRules,
    };

    pub(super) fn rsvp_form() -> Arc<FormDefinition> {
        let fields = vec![
            FieldDescriptor::new("name", "Name", FieldKind::Text).required(),
            FieldDescriptor::new("email", "Email", FieldKind::Email)
                .required()
                .rules(
                    ValidationRules::default()
                        .with_pattern(FieldPattern::new(r"\S+@\S+\.\S+").expect("pattern"))
                        .with_error_message("Valid email is required"),
                ),
            FieldDescriptor::new("guests", "Guests", FieldKind::Number)
                .default_value(0_i64)
                .rules(ValidationRules::default().with_min(0)),
            FieldDescriptor::new("notes", "Notes", FieldKind::Textarea)
                .rules(ValidationRules::default().with_max_length(200)),
        ];
        Arc::new(
            FormDefinition::new("steak-dinner", "Steak Dinner", "Steak-Dinner", fields)
                .expect("valid form")
                .with_email(EmailTemplate {
                    service_id: "service_lodge".to_string(),
                    template_id: "template_rsvp".to_string(),
                    public_key: "public".to_string(),
                }),
        )
    }

    #[derive(Default)]
    pub(super) struct RecordingStore {
        pub(super) existing: Mutex<Vec<Document>>,
        pub(super) inserted: Mutex<Vec<Document>>,
        pub(super) insert_error: Mutex<Option<StoreError>>,
        pub(super) query_error: Mutex<Option<StoreError>>,
    }

    impl RecordingStore {
        pub(super) fn inserted(&self) -> usize {
            self.inserted.lock().expect("store mutex").len()
        }
    }

    #[async_trait]
    impl DocumentStore for RecordingStore {
        async fn query_equals(
            &self,
            _collection: &str,
            field: &str,
            value: &Value,
        ) -> Result<Vec<Document>, StoreError> {
            if let Some(err) = self.query_error.lock().expect("store mutex").clone() {
                return Err(err);
            }
            Ok(self
                .existing
                .lock()
                .expect("store mutex")
                .iter()
                .filter(|document| document.get(field) == Some(value))
                .cloned()
                .collect())
        }

        async fn insert(
            &self,
            _collection: &str,
            document: Document,
        ) -> Result<DocumentId, StoreError> {
            if let Some(err) = self.insert_error.lock().expect("store mutex").clone() {
                return Err(err);
            }
            let mut inserted = self.inserted.lock().expect("store mutex");
            inserted.push(document);
            Ok(DocumentId(format!("rsvp-{}", inserted.len())))
        }
    }

    #[derive(Default)]
    pub(super) struct RecordingMailer {
        pub(super) sent: Mutex<Vec<EmailRequest>>,
        pub(super) error: Mutex<Option<NotificationError>>,
    }

    impl RecordingMailer {
        pub(super) fn sent(&self) -> usize {
            self.sent.lock().expect("mailer mutex").len()
        }
    }

    #[async_trait]
    impl EmailDispatcher for RecordingMailer {
        async fn send(&self, request: EmailRequest) -> Result<DeliveryReceipt, NotificationError> {
            self.sent.lock().expect("mailer mutex").push(request);
            match self.error.lock().expect("mailer mutex").clone() {
                Some(err) => Err(err),
                None => Ok(DeliveryReceipt {
                    message_id: "delivered".to_string(),
                }),
            }
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use common::{rsvp_form, RecordingMailer, RecordingStore};
use lodge_rsvp::forms::{
    validate, Document, FieldDescriptor, FieldKind, FieldPattern, FieldValue, FieldValues,
    FormDefinition, FormSession, FormState, NotificationError, NotificationStatus,
    RsvpSubmissionService, StoreError, SubmissionError, ValidationRules, ValueUpdate,
    LOWERCASE_EMAIL_FIELD,
};
use serde_json::Value;

fn values(pairs: &[(&str, FieldValue)]) -> FieldValues {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn jane(form: Arc<FormDefinition>) -> FormSession {
    let session = FormSession::new(form);
    session.set_value("name", "Jane").expect("name");
    session.set_value("email", "jane@example.com").expect("email");
    session
}

fn collaborators() -> (Arc<RecordingStore>, Arc<RecordingMailer>) {
    (
        Arc::new(RecordingStore::default()),
        Arc::new(RecordingMailer::default()),
    )
}

#[test]
fn scenario_a_reports_required_and_pattern_failures() {
    let form = rsvp_form();
    let errors = validate(
        &form.fields,
        &values(&[("name", FieldValue::from("")), ("email", FieldValue::from("bad"))]),
    );
    assert_eq!(errors.len(), 2);
    assert_eq!(errors["name"], "Name is required");
    assert_eq!(errors["email"], "Valid email is required");
}

#[test]
fn validation_is_deterministic() {
    let form = rsvp_form();
    let input = values(&[
        ("name", FieldValue::from("")),
        ("email", FieldValue::from("jane@example")),
        ("guests", FieldValue::Number(-1)),
        ("notes", FieldValue::from("x".repeat(250))),
    ]);
    let first = validate(&form.fields, &input);
    let second = validate(&form.fields, &input);
    assert_eq!(first, second);
    assert_eq!(first.len(), 4);
}

#[test]
fn first_failing_rule_wins() {
    let email = FieldDescriptor::new("email", "Email", FieldKind::Email)
        .required()
        .rules(
            ValidationRules::default()
                .with_pattern(FieldPattern::new(r"\S+@\S+\.\S+").expect("pattern"))
                .with_max_length(5),
        );
    let fields = vec![email];

    let empty = validate(&fields, &values(&[("email", FieldValue::from(""))]));
    assert_eq!(empty["email"], "Email is required");

    let malformed_and_long = validate(&fields, &values(&[("email", FieldValue::from("bad-address"))]));
    assert_eq!(malformed_and_long["email"], "Invalid format");

    let long_but_valid = validate(&fields, &values(&[("email", FieldValue::from("a@b.cd"))]));
    assert_eq!(long_but_valid["email"], "Max length is 5");
}

#[test]
fn scenario_d_clamps_negative_guest_count() {
    let mut state = FormState::new(rsvp_form());
    assert_eq!(
        state.set_value("guests", "-5").expect("guests"),
        ValueUpdate::Clamped
    );
    assert_eq!(state.value("guests"), Some(&FieldValue::Number(0)));
}

#[test]
fn scenario_e_rejects_over_long_notes() {
    let mut state = FormState::new(rsvp_form());
    state.set_value("notes", "Medium rare").expect("notes");
    let too_long = "n".repeat(201);
    assert_eq!(
        state.set_value("notes", &too_long).expect("notes"),
        ValueUpdate::Rejected
    );
    assert_eq!(state.value("notes"), Some(&FieldValue::from("Medium rare")));
}

#[tokio::test]
async fn scenario_b_duplicate_email_is_not_written() {
    let (store, mailer) = collaborators();
    let mut existing = Document::new();
    existing.insert(
        LOWERCASE_EMAIL_FIELD.to_string(),
        Value::from("jane@example.com"),
    );
    store.existing.lock().expect("store mutex").push(existing);
    let service = RsvpSubmissionService::new(store.clone(), mailer.clone());
    let session = jane(rsvp_form());

    let err = service.submit(&session).await.expect_err("duplicate");

    assert!(matches!(err, SubmissionError::Duplicate { .. }));
    let state = session.snapshot();
    assert_eq!(state.errors().len(), 1);
    assert_eq!(
        state.errors()["email"],
        "This email has already been submitted."
    );
    assert!(!state.is_submitting());
    assert_eq!(store.inserted(), 0);
    assert_eq!(mailer.sent(), 0);
}

#[tokio::test]
async fn scenario_c_notification_failure_still_succeeds() {
    let (store, mailer) = collaborators();
    *mailer.error.lock().expect("mailer mutex") = Some(NotificationError::Timeout(
        Duration::from_secs(12),
    ));
    let service = RsvpSubmissionService::new(store.clone(), mailer.clone());
    let session = jane(rsvp_form());

    let receipt = service.submit(&session).await.expect("record saved");

    assert!(matches!(
        receipt.notification,
        NotificationStatus::Failed { .. }
    ));
    let state = session.snapshot();
    assert!(state.succeeded());
    assert!(state.errors().is_empty());
    assert!(!state.is_submitting());
    assert_eq!(store.inserted(), 1);
    assert_eq!(mailer.sent(), 1);
}

#[tokio::test]
async fn persistence_failure_never_notifies() {
    let (store, mailer) = collaborators();
    *store.insert_error.lock().expect("store mutex") =
        Some(StoreError::Unavailable("quota exceeded".to_string()));
    let service = RsvpSubmissionService::new(store.clone(), mailer.clone());
    let session = jane(rsvp_form());

    let err = service.submit(&session).await.expect_err("insert fails");

    assert!(matches!(err, SubmissionError::Persistence { .. }));
    assert_eq!(mailer.sent(), 0);
    let state = session.snapshot();
    assert!(!state.is_submitting());
    assert!(!state.succeeded());
    assert_eq!(state.value("name"), Some(&FieldValue::from("Jane")));
}

#[tokio::test]
async fn submitting_flag_resets_on_every_exit() {
    let form = rsvp_form();

    let (store, mailer) = collaborators();
    let service = RsvpSubmissionService::new(store.clone(), mailer.clone());
    let invalid = FormSession::new(form.clone());
    assert!(service.submit(&invalid).await.is_err());
    assert!(!invalid.snapshot().is_submitting());

    *store.query_error.lock().expect("store mutex") =
        Some(StoreError::Unavailable("network down".to_string()));
    let unreachable = jane(form.clone());
    assert!(matches!(
        service.submit(&unreachable).await,
        Err(SubmissionError::DuplicateCheck { .. })
    ));
    assert!(!unreachable.snapshot().is_submitting());

    *store.query_error.lock().expect("store mutex") = None;
    let accepted = jane(form);
    assert!(service.submit(&accepted).await.is_ok());
    assert!(!accepted.snapshot().is_submitting());
}

#[tokio::test]
async fn resubmitting_after_success_hits_duplicate_check() {
    let (store, mailer) = collaborators();
    let service = RsvpSubmissionService::new(store.clone(), mailer.clone());
    let form = rsvp_form();

    let first = jane(form.clone());
    let receipt = service.submit(&first).await.expect("first RSVP");
    store
        .existing
        .lock()
        .expect("store mutex")
        .extend(store.inserted.lock().expect("store mutex").iter().cloned());
    assert_eq!(receipt.record.lowercase_email.as_deref(), Some("jane@example.com"));

    let second = FormSession::new(form);
    second.set_value("name", "Jane Again").expect("name");
    second.set_value("email", "JANE@EXAMPLE.COM").expect("email");
    assert!(matches!(
        service.submit(&second).await,
        Err(SubmissionError::Duplicate { .. })
    ));
    assert_eq!(store.inserted(), 1);
}
