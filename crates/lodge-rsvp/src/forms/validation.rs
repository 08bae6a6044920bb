//! Uniform, descriptor-driven field validation.
//!
//! Each field is checked against a fixed rule sequence (required, pattern, numeric bounds,
//! maximum length) and only the first failing rule reports. An empty [`FieldErrors`] is the
//! sole validity signal.

use std::collections::BTreeMap;

use super::descriptor::{FieldDescriptor, FieldValue, FieldValues};

/// Per-field error messages. A missing key means the field is valid.
pub type FieldErrors = BTreeMap<String, String>;

/// Validate every descriptor against the current values, in descriptor order.
pub fn validate(fields: &[FieldDescriptor], values: &FieldValues) -> FieldErrors {
    fields
        .iter()
        .filter_map(|field| {
            check_field(field, values.get(&field.name)).map(|message| (field.name.clone(), message))
        })
        .collect()
}

pub fn is_valid(fields: &[FieldDescriptor], values: &FieldValues) -> bool {
    validate(fields, values).is_empty()
}

fn check_field(field: &FieldDescriptor, value: Option<&FieldValue>) -> Option<String> {
    let blank = value.map_or(true, FieldValue::is_blank);
    let message = |default: String| {
        field
            .error_override()
            .map(str::to_string)
            .unwrap_or(default)
    };

    if field.required && blank {
        return Some(message(format!("{} is required", field.label)));
    }

    let value = value?;
    let rules = field.validation.as_ref()?;

    if let (Some(pattern), Some(text)) = (&rules.pattern, value.as_text()) {
        if !text.is_empty() && !pattern.is_match(text) {
            return Some(message("Invalid format".to_string()));
        }
    }

    if field.kind.is_numeric() {
        if let Some(number) = value.as_number() {
            if let Some(min) = rules.min.filter(|min| number < *min) {
                return Some(message(format!("Value must be at least {min}")));
            }
            if let Some(max) = rules.max.filter(|max| number > *max) {
                return Some(message(format!("Value must be at most {max}")));
            }
        }
    }

    if let (Some(max_length), Some(text)) = (rules.max_length, value.as_text()) {
        if text.chars().count() > max_length {
            return Some(message(format!("Max length is {max_length}")));
        }
    }

    None
}
