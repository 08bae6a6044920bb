use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::catalog::FormCatalog;
use super::descriptor::{FieldDescriptor, FieldValue, FieldValues, FormMessages};
use super::repository::{DocumentStore, EmailDispatcher};
use super::service::{RsvpSubmissionService, SubmissionError};
use super::state::{FormSession, StateError, ValueUpdate};
use super::validation::{validate, FieldErrors};

/// Shared handles for the form endpoints.
pub struct FormsState<S, E> {
    pub service: Arc<RsvpSubmissionService<S, E>>,
    pub catalog: Arc<FormCatalog>,
}

impl<S, E> Clone for FormsState<S, E> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            catalog: Arc::clone(&self.catalog),
        }
    }
}

/// Raw values as they arrive from the page, one entry per edited field.
#[derive(Debug, Deserialize)]
pub struct RsvpRequest {
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct FormSummary {
    pub slug: String,
    pub title: String,
    pub subtitle: String,
    pub field_count: usize,
}

#[derive(Debug, Serialize)]
pub struct FormView<'a> {
    pub slug: &'a str,
    pub title: &'a str,
    pub subtitle: &'a str,
    pub fields: &'a [FieldDescriptor],
    pub messages: &'a FormMessages,
    pub sends_confirmation: bool,
}

/// Router builder exposing the form catalog and RSVP intake.
pub fn forms_router<S, E>(state: FormsState<S, E>) -> Router
where
    S: DocumentStore + 'static,
    E: EmailDispatcher + 'static,
{
    Router::new()
        .route("/api/v1/forms", get(list_handler::<S, E>))
        .route("/api/v1/forms/:slug", get(form_handler::<S, E>))
        .route("/api/v1/forms/:slug/rsvps", post(submit_handler::<S, E>))
        .with_state(state)
}

pub(crate) async fn list_handler<S, E>(State(state): State<FormsState<S, E>>) -> Response
where
    S: DocumentStore + 'static,
    E: EmailDispatcher + 'static,
{
    let forms: Vec<FormSummary> = state
        .catalog
        .forms()
        .map(|form| FormSummary {
            slug: form.slug.clone(),
            title: form.title.clone(),
            subtitle: form.subtitle.clone(),
            field_count: form.fields.len(),
        })
        .collect();
    (StatusCode::OK, Json(json!({ "forms": forms }))).into_response()
}

pub(crate) async fn form_handler<S, E>(
    State(state): State<FormsState<S, E>>,
    Path(slug): Path<String>,
) -> Response
where
    S: DocumentStore + 'static,
    E: EmailDispatcher + 'static,
{
    let Some(form) = state.catalog.get(&slug) else {
        return unknown_form(&slug);
    };
    let view = FormView {
        slug: &form.slug,
        title: &form.title,
        subtitle: &form.subtitle,
        fields: &form.fields,
        messages: &form.messages,
        sends_confirmation: form.email.is_some(),
    };
    (StatusCode::OK, Json(view)).into_response()
}

pub(crate) async fn submit_handler<S, E>(
    State(state): State<FormsState<S, E>>,
    Path(slug): Path<String>,
    Json(request): Json<RsvpRequest>,
) -> Response
where
    S: DocumentStore + 'static,
    E: EmailDispatcher + 'static,
{
    let Some(form) = state.catalog.get(&slug) else {
        return unknown_form(&slug);
    };

    let session = FormSession::new(form.clone());
    let mut rejected = FieldErrors::new();
    for (name, value) in &request.values {
        let raw = raw_input(value);
        match session.set_value(name, &raw) {
            Ok(ValueUpdate::Rejected) => {
                // The guard kept the previous value; report what the posted one breaks.
                if let Some(field) = form.field(name) {
                    let posted = FieldValues::from([(name.clone(), FieldValue::Text(raw))]);
                    rejected.extend(validate(std::slice::from_ref(field), &posted));
                }
            }
            Ok(_) => {}
            Err(err) => {
                let field = match &err {
                    StateError::UnknownField(field) => field.clone(),
                    StateError::Detached => name.clone(),
                };
                let payload = json!({ "errors": { field: err.to_string() } });
                return (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response();
            }
        }
    }
    if !rejected.is_empty() {
        let payload = json!({ "errors": rejected });
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response();
    }

    match state.service.submit(&session).await {
        Ok(receipt) => {
            let payload = json!({
                "document_id": receipt.document_id.0,
                "message": form.messages.success,
                "notification": receipt.notification,
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(err) => {
            let status = match &err {
                SubmissionError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                SubmissionError::Duplicate { .. } | SubmissionError::InFlight => {
                    StatusCode::CONFLICT
                }
                SubmissionError::DuplicateCheck { .. } | SubmissionError::Persistence { .. } => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            };
            let payload = match err.errors() {
                Some(errors) => json!({ "errors": errors }),
                None => json!({ "error": err.to_string() }),
            };
            (status, Json(payload)).into_response()
        }
    }
}

fn unknown_form(slug: &str) -> Response {
    let payload = json!({ "error": format!("unknown form '{slug}'") });
    (StatusCode::NOT_FOUND, Json(payload)).into_response()
}

/// Text the page's input element would have delivered for this JSON value.
fn raw_input(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
