//! Config-driven RSVP forms: declarative field descriptors, uniform validation,
//! per-session form state and the submission workflow.
//!
//! The document store and email dispatcher are injected through the traits in
//! [`repository`], so the workflow can run against hosted services or in-memory fakes.

pub mod catalog;
pub mod descriptor;
pub mod repository;
pub mod router;
pub mod service;
pub mod state;
pub mod validation;

#[cfg(test)]
mod tests;

pub use catalog::{CatalogError, FormCatalog};
pub use descriptor::{
    DescriptorError, EmailTemplate, FieldDescriptor, FieldKind, FieldPattern, FieldValue,
    FieldValues, FormDefinition, FormMessages, ValidationRules,
};
pub use repository::{
    DeliveryReceipt, Document, DocumentId, DocumentStore, EmailDispatcher, EmailRequest,
    NotificationError, RsvpRecord, StoreError, LOWERCASE_EMAIL_FIELD,
};
pub use router::{forms_router, FormsState};
pub use service::{
    NotificationStatus, RsvpSubmissionService, SubmissionError, SubmissionReceipt,
    SubmissionStage, FORM_ERROR_KEY,
};
pub use state::{FormSession, FormState, StateError, ValueUpdate};
pub use validation::{validate, FieldErrors};
