use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn, Instrument};

use super::descriptor::{EmailTemplate, FormDefinition};
use super::repository::{
    DocumentId, DocumentStore, EmailDispatcher, EmailRequest, NotificationError, RsvpRecord,
    StoreError, LOWERCASE_EMAIL_FIELD,
};
use super::state::{FormSession, SubmittingGuard};
use super::validation::{validate, FieldErrors};
use crate::config::DEFAULT_NETWORK_TIMEOUT_SECS;

/// Error key used for failures that are not tied to a field.
pub const FORM_ERROR_KEY: &str = "form";

/// Position in the submission state machine, reported in logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStage {
    Idle,
    Validating,
    CheckingDuplicate,
    Persisting,
    Notifying,
    Succeeded,
    Failed,
}

impl SubmissionStage {
    pub const fn label(self) -> &'static str {
        match self {
            SubmissionStage::Idle => "idle",
            SubmissionStage::Validating => "validating",
            SubmissionStage::CheckingDuplicate => "checking_duplicate",
            SubmissionStage::Persisting => "persisting",
            SubmissionStage::Notifying => "notifying",
            SubmissionStage::Succeeded => "succeeded",
            SubmissionStage::Failed => "failed",
        }
    }
}

/// What happened to the confirmation email. Never affects the submission result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationStatus {
    Sent { message_id: String },
    Failed { reason: String },
    Skipped,
}

/// Successful submission: the stored record and the notification result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionReceipt {
    pub document_id: DocumentId,
    pub record: RsvpRecord,
    pub notification: NotificationStatus,
}

/// Why a submission attempt ended without a stored record.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("a submission is already in flight for this form")]
    InFlight,
    #[error("{} field(s) failed validation", .errors.len())]
    Validation { errors: FieldErrors },
    #[error("email '{email}' has already been submitted")]
    Duplicate { email: String, errors: FieldErrors },
    #[error("duplicate check failed: {source}")]
    DuplicateCheck {
        errors: FieldErrors,
        #[source]
        source: StoreError,
    },
    #[error("failed to persist RSVP: {source}")]
    Persistence {
        errors: FieldErrors,
        #[source]
        source: StoreError,
    },
}

impl SubmissionError {
    /// Field messages surfaced to the user, or `None` for a rejected re-entrant call.
    pub fn errors(&self) -> Option<&FieldErrors> {
        match self {
            SubmissionError::InFlight => None,
            SubmissionError::Validation { errors }
            | SubmissionError::Duplicate { errors, .. }
            | SubmissionError::DuplicateCheck { errors, .. }
            | SubmissionError::Persistence { errors, .. } => Some(errors),
        }
    }

    pub fn stage(&self) -> SubmissionStage {
        match self {
            SubmissionError::InFlight => SubmissionStage::Idle,
            SubmissionError::Validation { .. } => SubmissionStage::Validating,
            SubmissionError::Duplicate { .. } | SubmissionError::DuplicateCheck { .. } => {
                SubmissionStage::CheckingDuplicate
            }
            SubmissionError::Persistence { .. } => SubmissionStage::Persisting,
        }
    }
}

/// Orchestrates validation, duplicate check, persistence and confirmation for one form session.
pub struct RsvpSubmissionService<S, E> {
    store: Arc<S>,
    mailer: Arc<E>,
    timeout: Duration,
}

impl<S, E> RsvpSubmissionService<S, E>
where
    S: DocumentStore + 'static,
    E: EmailDispatcher + 'static,
{
    pub fn new(store: Arc<S>, mailer: Arc<E>) -> Self {
        Self {
            store,
            mailer,
            timeout: Duration::from_secs(DEFAULT_NETWORK_TIMEOUT_SECS),
        }
    }

    /// Bound applied to each collaborator call; an expired call fails its step.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Submit the session's current values.
    ///
    /// `is_submitting` is cleared on every exit, including when the returned future is dropped.
    pub async fn submit(
        &self,
        session: &FormSession,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let definition = session.definition();
        let span = tracing::info_span!(
            "rsvp_submit",
            form = %definition.slug,
            collection = %definition.collection
        );
        self.run(session, &definition).instrument(span).await
    }

    async fn run(
        &self,
        session: &FormSession,
        definition: &FormDefinition,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        debug!(stage = SubmissionStage::Validating.label(), "validating submission");
        let values = {
            let mut state = session.lock();
            if state.is_submitting() {
                warn!("rejecting re-entrant submission");
                return Err(SubmissionError::InFlight);
            }

            let errors = validate(&definition.fields, state.values());
            if !errors.is_empty() {
                if session.is_attached() {
                    state.set_errors(errors.clone());
                }
                debug!(invalid_fields = errors.len(), "submission rejected by validation");
                return Err(SubmissionError::Validation { errors });
            }

            state.set_submitting(true);
            state.values().clone()
        };
        let _submitting = SubmittingGuard::armed(session);

        // A blank optional email has no lookup key.
        let email = definition.email_field().and_then(|field| {
            values
                .get(&field.name)
                .filter(|value| !value.is_blank())
                .map(|value| (field, value.to_string()))
        });
        if let Some((email_field, email)) = email {
            debug!(
                stage = SubmissionStage::CheckingDuplicate.label(),
                "checking for an existing RSVP"
            );
            let lookup = Value::from(email.to_lowercase());

            let existing = self
                .bounded(
                    self.store
                        .query_equals(&definition.collection, LOWERCASE_EMAIL_FIELD, &lookup),
                    StoreError::Timeout,
                )
                .await;

            match existing {
                Ok(matches) if !matches.is_empty() => {
                    warn!(existing = matches.len(), "email already has an RSVP");
                    let errors = FieldErrors::from([(
                        email_field.name.clone(),
                        definition.messages.duplicate_email.clone(),
                    )]);
                    return Err(fail(session, SubmissionError::Duplicate { email, errors }));
                }
                Ok(_) => {}
                Err(source) => {
                    error!(error = %source, "duplicate check unavailable");
                    let errors = save_failure_errors(definition);
                    return Err(fail(
                        session,
                        SubmissionError::DuplicateCheck { errors, source },
                    ));
                }
            }
        }

        debug!(stage = SubmissionStage::Persisting.label(), "persisting RSVP");
        let record = RsvpRecord::new(definition, values, Utc::now());
        let persisted = match record.clone().into_document() {
            Ok(document) => {
                self.bounded(
                    self.store.insert(&definition.collection, document),
                    StoreError::Timeout,
                )
                .await
            }
            Err(err) => Err(err),
        };
        let document_id = match persisted {
            Ok(id) => id,
            Err(source) => {
                error!(error = %source, "failed to persist RSVP");
                let errors = save_failure_errors(definition);
                return Err(fail(session, SubmissionError::Persistence { errors, source }));
            }
        };
        info!(document_id = %document_id.0, "rsvp persisted");

        let notification = match &definition.email {
            Some(template) if session.is_attached() => {
                debug!(stage = SubmissionStage::Notifying.label(), "sending confirmation");
                self.notify(definition, template, &record).await
            }
            Some(_) => {
                debug!("form detached before confirmation; skipping email");
                NotificationStatus::Skipped
            }
            None => NotificationStatus::Skipped,
        };

        session.update(|state| {
            state.reset();
            state.set_succeeded(true);
        });
        debug!(stage = SubmissionStage::Succeeded.label(), "submission complete");

        Ok(SubmissionReceipt {
            document_id,
            record,
            notification,
        })
    }

    async fn notify(
        &self,
        definition: &FormDefinition,
        template: &EmailTemplate,
        record: &RsvpRecord,
    ) -> NotificationStatus {
        let request = EmailRequest {
            service_id: template.service_id.clone(),
            template_id: template.template_id.clone(),
            params: template_params(definition, record),
            public_key: template.public_key.clone(),
        };

        match self
            .bounded(self.mailer.send(request), NotificationError::Timeout)
            .await
        {
            Ok(receipt) => NotificationStatus::Sent {
                message_id: receipt.message_id,
            },
            Err(err) => {
                warn!(error = %err, "confirmation email failed; RSVP is already saved");
                NotificationStatus::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn bounded<T, F>(
        &self,
        call: impl Future<Output = Result<T, F>>,
        on_timeout: impl FnOnce(Duration) -> F,
    ) -> Result<T, F> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout(self.timeout)),
        }
    }
}

/// Template parameters: every field value as a string plus the `to_name` and `to_email` aliases.
pub fn template_params(definition: &FormDefinition, record: &RsvpRecord) -> BTreeMap<String, String> {
    let mut params: BTreeMap<String, String> = record
        .values
        .iter()
        .map(|(name, value)| (name.clone(), value.to_string()))
        .collect();

    let alias = |field: Option<&str>| {
        field
            .and_then(|name| record.values.get(name))
            .map(ToString::to_string)
            .unwrap_or_default()
    };
    let to_name = alias(definition.name_field().map(|field| field.name.as_str()));
    let to_email = alias(definition.email_field().map(|field| field.name.as_str()));
    params.insert("to_name".to_string(), to_name);
    params.insert("to_email".to_string(), to_email);
    params
}

fn save_failure_errors(definition: &FormDefinition) -> FieldErrors {
    let key = definition
        .email_field()
        .map(|field| field.name.clone())
        .unwrap_or_else(|| FORM_ERROR_KEY.to_string());
    FieldErrors::from([(key, definition.messages.save_failure.clone())])
}

fn fail(session: &FormSession, err: SubmissionError) -> SubmissionError {
    debug!(
        stage = SubmissionStage::Failed.label(),
        failed_at = err.stage().label(),
        "submission attempt failed"
    );
    if let Some(errors) = err.errors() {
        session.update(|state| state.set_errors(errors.clone()));
    }
    err
}
