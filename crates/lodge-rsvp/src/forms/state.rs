use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use super::descriptor::{FieldDescriptor, FieldKind, FieldValue, FieldValues, FormDefinition};
use super::validation::FieldErrors;

/// Result of applying one input event to the form state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueUpdate {
    Stored,
    /// Numeric input below the configured floor was raised to it.
    Clamped,
    /// Text input longer than `maxLength`; the previous value was kept.
    Rejected,
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("form session is no longer attached")]
    Detached,
}

/// Mutable data for one in-progress submission.
#[derive(Debug, Clone, Serialize)]
pub struct FormState {
    #[serde(skip)]
    definition: Arc<FormDefinition>,
    values: FieldValues,
    errors: FieldErrors,
    is_submitting: bool,
    succeeded: bool,
}

impl FormState {
    pub fn new(definition: Arc<FormDefinition>) -> Self {
        let values = definition.initial_values();
        Self {
            definition,
            values,
            errors: FieldErrors::new(),
            is_submitting: false,
            succeeded: false,
        }
    }

    pub fn definition(&self) -> &FormDefinition {
        &self.definition
    }

    pub fn values(&self) -> &FieldValues {
        &self.values
    }

    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn is_submitting(&self) -> bool {
        self.is_submitting
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    /// Apply a raw input event, enforcing the input-time guards for the field's kind.
    pub fn set_value(&mut self, name: &str, raw: &str) -> Result<ValueUpdate, StateError> {
        let field = self
            .definition
            .field(name)
            .ok_or_else(|| StateError::UnknownField(name.to_string()))?;

        let (value, update) = match field.kind {
            FieldKind::Number => coerce_number(field, raw),
            FieldKind::Text | FieldKind::Email | FieldKind::Textarea => {
                match field.max_length() {
                    Some(max) if raw.chars().count() > max => return Ok(ValueUpdate::Rejected),
                    _ => (FieldValue::from(raw), ValueUpdate::Stored),
                }
            }
        };

        self.values.insert(field.name.clone(), value);
        Ok(update)
    }

    /// Restore descriptor defaults and clear errors and the success flag.
    pub fn reset(&mut self) {
        self.values = self.definition.initial_values();
        self.errors.clear();
        self.succeeded = false;
    }

    pub fn set_submitting(&mut self, submitting: bool) {
        self.is_submitting = submitting;
    }

    /// Replace the error map. Any reported error clears an earlier success.
    pub fn set_errors(&mut self, errors: FieldErrors) {
        if !errors.is_empty() {
            self.succeeded = false;
        }
        self.errors = errors;
    }

    pub fn set_succeeded(&mut self, succeeded: bool) {
        self.succeeded = succeeded;
    }
}

fn coerce_number(field: &FieldDescriptor, raw: &str) -> (FieldValue, ValueUpdate) {
    let parsed = parse_leading_integer(raw).unwrap_or(0);
    match field.min() {
        Some(min) if parsed < min => (FieldValue::Number(min), ValueUpdate::Clamped),
        _ => (FieldValue::Number(parsed), ValueUpdate::Stored),
    }
}

/// Integer prefix of the input: `" 12 guests"` is 12, `"3.5"` is 3, `"abc"` is `None`.
fn parse_leading_integer(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let sign_len = usize::from(trimmed.starts_with(['-', '+']));
    let digits = trimmed[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 {
        return None;
    }
    trimmed[..sign_len + digits].parse().ok()
}

/// One form instance: the state plus a liveness flag cleared when the form is torn down.
#[derive(Debug)]
pub struct FormSession {
    state: Mutex<FormState>,
    attached: AtomicBool,
}

impl FormSession {
    pub fn new(definition: Arc<FormDefinition>) -> Self {
        Self {
            state: Mutex::new(FormState::new(definition)),
            attached: AtomicBool::new(true),
        }
    }

    pub fn definition(&self) -> Arc<FormDefinition> {
        self.lock().definition.clone()
    }

    pub fn set_value(&self, name: &str, raw: &str) -> Result<ValueUpdate, StateError> {
        if !self.is_attached() {
            return Err(StateError::Detached);
        }
        self.lock().set_value(name, raw)
    }

    pub fn reset(&self) {
        self.update(FormState::reset);
    }

    pub fn snapshot(&self) -> FormState {
        self.lock().clone()
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Mark the form as torn down. Pending submissions stop writing values, errors or success.
    pub fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }

    /// Run `apply` only while the session is attached.
    pub(crate) fn update<R>(&self, apply: impl FnOnce(&mut FormState) -> R) -> Option<R> {
        if !self.is_attached() {
            return None;
        }
        Some(apply(&mut self.lock()))
    }

    // Never held across an await point.
    pub(crate) fn lock(&self) -> MutexGuard<'_, FormState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears `is_submitting` when dropped, whichever way the submission exits.
pub(crate) struct SubmittingGuard<'a> {
    session: &'a FormSession,
}

impl<'a> SubmittingGuard<'a> {
    /// The caller must already have set `is_submitting` under the session lock.
    pub(crate) fn armed(session: &'a FormSession) -> Self {
        Self { session }
    }
}

impl Drop for SubmittingGuard<'_> {
    fn drop(&mut self) {
        self.session.lock().set_submitting(false);
    }
}
