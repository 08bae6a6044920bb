use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::descriptor::{FieldValues, FormDefinition};

/// Field on persisted records used for the duplicate lookup.
pub const LOWERCASE_EMAIL_FIELD: &str = "lowercaseEmail";

/// Schemaless document as held by the store.
pub type Document = Map<String, Value>;

/// Identifier assigned by the document store on insert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

/// The persisted RSVP: every field value, the lookup key and the submission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RsvpRecord {
    #[serde(flatten)]
    pub values: FieldValues,
    #[serde(
        rename = "lowercaseEmail",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub lowercase_email: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl RsvpRecord {
    pub fn new(definition: &FormDefinition, values: FieldValues, timestamp: DateTime<Utc>) -> Self {
        let lowercase_email = definition
            .email_field()
            .and_then(|field| values.get(&field.name))
            .filter(|email| !email.is_blank())
            .map(|email| email.to_string().to_lowercase());

        Self {
            values,
            lowercase_email,
            timestamp,
        }
    }

    pub fn into_document(self) -> Result<Document, StoreError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(document)) => Ok(document),
            Ok(_) => Err(StoreError::Encoding(
                "record did not encode as an object".to_string(),
            )),
            Err(err) => Err(StoreError::Encoding(err.to_string())),
        }
    }
}

/// Remote document store holding RSVP records.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Documents in `collection` whose `field` equals `value`.
    async fn query_equals(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError>;

    async fn insert(&self, collection: &str, document: Document) -> Result<DocumentId, StoreError>;
}

/// Document store failure (transport, quota, permission, or a timed out call).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),
    #[error("permission denied for collection '{0}'")]
    PermissionDenied(String),
    #[error("document store call timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("record could not be encoded: {0}")]
    Encoding(String),
}

/// Templated message handed to the email dispatch service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRequest {
    pub service_id: String,
    pub template_id: String,
    pub params: BTreeMap<String, String>,
    pub public_key: String,
}

/// Acknowledgement returned by the dispatch service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub message_id: String,
}

/// Outbound transactional email hook.
#[async_trait]
pub trait EmailDispatcher: Send + Sync {
    async fn send(&self, request: EmailRequest) -> Result<DeliveryReceipt, NotificationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("email transport unavailable: {0}")]
    Transport(String),
    #[error("email rejected by provider: {0}")]
    Rejected(String),
    #[error("email dispatch timed out after {0:?}")]
    Timeout(std::time::Duration),
}
