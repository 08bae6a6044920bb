use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::descriptor::{
    DescriptorError, EmailTemplate, FieldDescriptor, FieldKind, FieldPattern, FormDefinition,
    FormMessages, ValidationRules,
};

/// Pattern the lodge pages use for email addresses.
pub const EMAIL_PATTERN: &str = r"\S+@\S+\.\S+";

/// Immutable set of configured forms, looked up by slug.
#[derive(Debug, Clone)]
pub struct FormCatalog {
    forms: Vec<Arc<FormDefinition>>,
}

impl FormCatalog {
    pub fn new(forms: Vec<FormDefinition>) -> Result<Self, CatalogError> {
        if forms.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut slugs = HashSet::new();
        for form in &forms {
            form.validate().map_err(|source| CatalogError::Descriptor {
                slug: form.slug.clone(),
                source,
            })?;
            if !slugs.insert(form.slug.clone()) {
                return Err(CatalogError::DuplicateSlug(form.slug.clone()));
            }
        }

        Ok(Self {
            forms: forms.into_iter().map(Arc::new).collect(),
        })
    }

    /// Event presets shipped with the service.
    pub fn builtin() -> Result<Self, CatalogError> {
        let forms = vec![
            steak_dinner(),
            bowling_night(),
            officer_installation(),
            feedback_survey(),
        ]
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| CatalogError::Descriptor {
            slug: "builtin".to_string(),
            source,
        })?;
        Self::new(forms)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let forms: Vec<FormDefinition> = serde_json::from_str(raw).map_err(CatalogError::Parse)?;
        Self::new(forms)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Load from `path` when configured, otherwise fall back to the presets.
    pub fn load(path: Option<&Path>) -> Result<Self, CatalogError> {
        match path {
            Some(path) => Self::from_json_file(path),
            None => Self::builtin(),
        }
    }

    pub fn get(&self, slug: &str) -> Option<Arc<FormDefinition>> {
        self.forms.iter().find(|form| form.slug == slug).cloned()
    }

    pub fn forms(&self) -> impl Iterator<Item = &Arc<FormDefinition>> {
        self.forms.iter()
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("unable to read form catalog {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("form catalog is not valid JSON: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("form '{slug}' is misconfigured: {source}")]
    Descriptor {
        slug: String,
        #[source]
        source: DescriptorError,
    },
    #[error("form slug '{0}' is configured twice")]
    DuplicateSlug(String),
    #[error("form catalog contains no forms")]
    Empty,
}

fn name_field() -> FieldDescriptor {
    FieldDescriptor::new("name", "Full Name *", FieldKind::Text)
        .placeholder("Enter your full name")
        .required()
        .rules(
            ValidationRules::default()
                .with_max_length(200)
                .with_error_message("Please enter your name (200 characters max)"),
        )
}

fn email_field() -> Result<FieldDescriptor, DescriptorError> {
    Ok(FieldDescriptor::new("email", "Email Address *", FieldKind::Email)
        .placeholder("Enter your email address")
        .required()
        .rules(
            ValidationRules::default()
                .with_pattern(FieldPattern::new(EMAIL_PATTERN)?)
                .with_max_length(200)
                .with_error_message("Valid email is required"),
        ))
}

fn guests_field(max: Option<i64>) -> FieldDescriptor {
    let mut rules = ValidationRules::default()
        .with_min(0)
        .with_error_message("Number of guests cannot be negative");
    if let Some(max) = max {
        rules = rules
            .with_max(max)
            .with_error_message(format!("Number of guests must be between 0 and {max}"));
    }
    FieldDescriptor::new("guests", "Number of Guests", FieldKind::Number)
        .description("Enter 0 if attending alone")
        .default_value(0_i64)
        .rules(rules)
}

fn notes_field(description: &str) -> FieldDescriptor {
    FieldDescriptor::new("notes", "Special Notes (Optional)", FieldKind::Textarea)
        .placeholder("Any special dietary requirements or notes...")
        .description(description)
        .rules(
            ValidationRules::default()
                .with_max_length(200)
                .with_error_message("Notes cannot exceed 200 characters"),
        )
}

fn steak_dinner() -> Result<FormDefinition, DescriptorError> {
    let fields = vec![
        name_field(),
        email_field()?,
        guests_field(None),
        notes_field("Optional: dietary restrictions, accessibility needs, etc."),
    ];
    Ok(FormDefinition::new(
        "steak-dinner",
        "Waukesha Lodge No. 37 – RSVP",
        "Steak-Dinner",
        fields,
    )?
    .with_subtitle("Steak Dinner Event • $15 at the door")
    .with_email(EmailTemplate {
        service_id: "service_lodge37".to_string(),
        template_id: "template_steak_dinner".to_string(),
        public_key: "lodge37-public-key".to_string(),
    }))
}

fn bowling_night() -> Result<FormDefinition, DescriptorError> {
    let fields = vec![
        name_field(),
        email_field()?,
        guests_field(Some(8)),
        notes_field("Optional: shoe sizes, lane preferences, etc."),
    ];
    let messages = FormMessages {
        success: "Thanks for signing up! Lane assignments go out the week of the event."
            .to_string(),
        ..FormMessages::default()
    };
    Ok(FormDefinition::new(
        "bowling-night",
        "Waukesha Lodge No. 37 – Bowling Night",
        "Bowling-Night",
        fields,
    )?
    .with_subtitle("Shoes included • Bring a friend")
    .with_messages(messages)
    .with_email(EmailTemplate {
        service_id: "service_lodge37".to_string(),
        template_id: "template_bowling_night".to_string(),
        public_key: "lodge37-public-key".to_string(),
    }))
}

fn officer_installation() -> Result<FormDefinition, DescriptorError> {
    let fields = vec![
        name_field(),
        email_field()?,
        guests_field(None),
        notes_field("Optional: seating or accessibility requests."),
    ];
    Ok(FormDefinition::new(
        "officer-installation",
        "Waukesha Lodge No. 37 – Installation of Officers",
        "Officer-Installation",
        fields,
    )?
    .with_subtitle("Open installation • Family and friends welcome")
    .with_email(EmailTemplate {
        service_id: "service_lodge37".to_string(),
        template_id: "template_installation".to_string(),
        public_key: "lodge37-public-key".to_string(),
    }))
}

fn feedback_survey() -> Result<FormDefinition, DescriptorError> {
    let fields = vec![
        FieldDescriptor::new("name", "Name (Optional)", FieldKind::Text)
            .placeholder("Leave blank to stay anonymous")
            .rules(ValidationRules::default().with_max_length(200)),
        email_field()?,
        FieldDescriptor::new("rating", "Overall Rating", FieldKind::Number)
            .description("1 = poor, 5 = excellent")
            .default_value(5_i64)
            .rules(
                ValidationRules::default()
                    .with_min(1)
                    .with_max(5)
                    .with_error_message("Rating must be between 1 and 5"),
            ),
        FieldDescriptor::new("comments", "Comments", FieldKind::Textarea)
            .placeholder("What should we keep or change?")
            .rules(
                ValidationRules::default()
                    .with_max_length(500)
                    .with_error_message("Comments cannot exceed 500 characters"),
            ),
    ];
    let messages = FormMessages {
        duplicate_email: "Feedback from this email has already been received.".to_string(),
        save_failure: "Failed to save feedback. Please try again.".to_string(),
        success: "Thank you for your feedback!".to_string(),
        submit_button: "Send Feedback".to_string(),
        submitting_button: "Sending...".to_string(),
    };
    Ok(FormDefinition::new(
        "feedback-survey",
        "Waukesha Lodge No. 37 – Event Feedback",
        "Feedback-Survey",
        fields,
    )?
    .with_subtitle("Tell us how the last event went")
    .with_messages(messages))
}
