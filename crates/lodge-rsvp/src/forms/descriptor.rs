use std::collections::{BTreeMap, HashSet};
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Keys the persisted record adds next to the field values.
const RESERVED_FIELD_NAMES: [&str; 2] = ["lowercaseEmail", "timestamp"];

/// Current values of a form keyed by field name.
pub type FieldValues = BTreeMap<String, FieldValue>;

/// Input control a field renders as; also selects which validation rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Email,
    Number,
    Textarea,
}

impl FieldKind {
    pub const fn label(self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Email => "email",
            FieldKind::Number => "number",
            FieldKind::Textarea => "textarea",
        }
    }

    pub const fn is_numeric(self) -> bool {
        matches!(self, FieldKind::Number)
    }
}

/// A single field value. Serialized untagged so documents carry plain strings and numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(i64),
    Text(String),
}

impl FieldValue {
    pub fn empty() -> Self {
        FieldValue::Text(String::new())
    }

    /// Missing-equivalent for the required check; surrounding whitespace does not count.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Text(text) => text.trim().is_empty(),
            FieldValue::Number(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            FieldValue::Number(number) => Some(*number),
            FieldValue::Text(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(number) => write!(f, "{number}"),
            FieldValue::Text(text) => f.write_str(text),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value)
    }
}

/// Compiled regular expression attached to a field. Compiled once, when the form is configured.
#[derive(Clone)]
pub struct FieldPattern(Regex);

impl FieldPattern {
    pub fn new(source: &str) -> Result<Self, DescriptorError> {
        Regex::new(source)
            .map(Self)
            .map_err(|source_err| DescriptorError::InvalidPattern {
                pattern: source.to_string(),
                source: source_err,
            })
    }

    /// Unanchored search, so `\S+@\S+\.\S+` accepts any string containing an address.
    pub fn is_match(&self, value: &str) -> bool {
        self.0.is_match(value)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for FieldPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FieldPattern").field(&self.as_str()).finish()
    }
}

impl PartialEq for FieldPattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Serialize for FieldPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        FieldPattern::new(&raw).map_err(serde::de::Error::custom)
    }
}

/// Optional rule set evaluated by the validation engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<FieldPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Replaces the default message of every rule on this field, including `required`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ValidationRules {
    pub fn with_pattern(mut self, pattern: FieldPattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn with_min(mut self, min: i64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn with_max(mut self, max: i64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Declarative description of one form field. Sequence order is display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub placeholder: String,
    #[serde(default)]
    pub description: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationRules>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            placeholder: String::new(),
            description: String::new(),
            kind,
            required: false,
            default_value: None,
            validation: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn default_value(mut self, value: impl Into<FieldValue>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn rules(mut self, rules: ValidationRules) -> Self {
        self.validation = Some(rules);
        self
    }

    /// Value the form state starts from and returns to on reset.
    pub fn initial_value(&self) -> FieldValue {
        self.default_value.clone().unwrap_or_else(FieldValue::empty)
    }

    pub fn error_override(&self) -> Option<&str> {
        self.validation
            .as_ref()
            .and_then(|rules| rules.error_message.as_deref())
    }

    pub fn min(&self) -> Option<i64> {
        self.validation.as_ref().and_then(|rules| rules.min)
    }

    pub fn max_length(&self) -> Option<usize> {
        self.validation.as_ref().and_then(|rules| rules.max_length)
    }
}

/// Confirmation email template triple for the dispatch service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailTemplate {
    pub service_id: String,
    pub template_id: String,
    pub public_key: String,
}

/// User-facing strings that are not tied to a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormMessages {
    pub duplicate_email: String,
    pub save_failure: String,
    pub success: String,
    pub submit_button: String,
    pub submitting_button: String,
}

impl Default for FormMessages {
    fn default() -> Self {
        Self {
            duplicate_email: "This email has already been submitted.".to_string(),
            save_failure: "Failed to save RSVP. Please try again.".to_string(),
            success: "Thank you for your RSVP! We look forward to seeing you.".to_string(),
            submit_button: "Submit RSVP".to_string(),
            submitting_button: "Submitting...".to_string(),
        }
    }
}

/// One configured form: its descriptors plus the collection and notification wiring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDefinition {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailTemplate>,
    #[serde(default)]
    pub messages: FormMessages,
    pub fields: Vec<FieldDescriptor>,
}

impl FormDefinition {
    pub fn new(
        slug: impl Into<String>,
        title: impl Into<String>,
        collection: impl Into<String>,
        fields: Vec<FieldDescriptor>,
    ) -> Result<Self, DescriptorError> {
        let definition = Self {
            slug: slug.into(),
            title: title.into(),
            subtitle: String::new(),
            collection: collection.into(),
            email: None,
            messages: FormMessages::default(),
            fields,
        };
        definition.validate()?;
        Ok(definition)
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = subtitle.into();
        self
    }

    pub fn with_email(mut self, template: EmailTemplate) -> Self {
        self.email = Some(template);
        self
    }

    pub fn with_messages(mut self, messages: FormMessages) -> Self {
        self.messages = messages;
        self
    }

    /// Structural check run once at configuration time. Any error here is a startup failure.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.slug.trim().is_empty() {
            return Err(DescriptorError::EmptySlug);
        }
        if self.collection.trim().is_empty() {
            return Err(DescriptorError::MissingCollection {
                slug: self.slug.clone(),
            });
        }

        let mut seen = HashSet::new();
        let mut email_field: Option<&str> = None;

        for (index, field) in self.fields.iter().enumerate() {
            if field.name.trim().is_empty() {
                return Err(DescriptorError::EmptyName { index });
            }
            if RESERVED_FIELD_NAMES.contains(&field.name.as_str()) {
                return Err(DescriptorError::ReservedName {
                    name: field.name.clone(),
                });
            }
            if !seen.insert(field.name.as_str()) {
                return Err(DescriptorError::DuplicateName {
                    name: field.name.clone(),
                });
            }

            match (&field.default_value, field.kind.is_numeric()) {
                (Some(FieldValue::Text(_)), true) | (Some(FieldValue::Number(_)), false) => {
                    return Err(DescriptorError::DefaultKindMismatch {
                        field: field.name.clone(),
                        kind: field.kind,
                    });
                }
                _ => {}
            }

            if let Some(rules) = &field.validation {
                if let (Some(min), Some(max)) = (rules.min, rules.max) {
                    if min > max {
                        return Err(DescriptorError::InvertedBounds {
                            field: field.name.clone(),
                            min,
                            max,
                        });
                    }
                }
            }

            if field.kind == FieldKind::Email {
                if let Some(first) = email_field {
                    return Err(DescriptorError::MultipleEmailFields {
                        first: first.to_string(),
                        second: field.name.clone(),
                    });
                }
                email_field = Some(field.name.as_str());
            }
        }

        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// The field used for duplicate detection and the `to_email` alias.
    pub fn email_field(&self) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|field| field.kind == FieldKind::Email)
    }

    /// The field used for the `to_name` alias: `name` if declared, else the first text field.
    pub fn name_field(&self) -> Option<&FieldDescriptor> {
        self.field("name").or_else(|| {
            self.fields
                .iter()
                .find(|field| field.kind == FieldKind::Text)
        })
    }

    pub fn initial_values(&self) -> FieldValues {
        self.fields
            .iter()
            .map(|field| (field.name.clone(), field.initial_value()))
            .collect()
    }
}

/// Configuration error in a form definition.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("form slug must not be empty")]
    EmptySlug,
    #[error("form '{slug}' has no collection name")]
    MissingCollection { slug: String },
    #[error("field at position {index} has an empty name")]
    EmptyName { index: usize },
    #[error("field name '{name}' is reserved for record metadata")]
    ReservedName { name: String },
    #[error("field name '{name}' is declared more than once")]
    DuplicateName { name: String },
    #[error("default value of field '{field}' does not match kind {}", .kind.label())]
    DefaultKindMismatch { field: String, kind: FieldKind },
    #[error("field '{field}' has min {min} greater than max {max}")]
    InvertedBounds { field: String, min: i64, max: i64 },
    #[error("only one email field is supported, found '{first}' and '{second}'")]
    MultipleEmailFields { first: String, second: String },
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
