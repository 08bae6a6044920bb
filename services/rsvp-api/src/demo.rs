use crate::infra::{InMemoryDocumentStore, LoggingEmailDispatcher};
use chrono::Local;
use clap::Args;
use lodge_rsvp::config::AppConfig;
use lodge_rsvp::error::AppError;
use lodge_rsvp::forms::{
    FieldKind, FormCatalog, FormDefinition, FormSession, NotificationStatus,
    RsvpSubmissionService, SubmissionError,
};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Slug of the form to walk through
    #[arg(long, default_value = "steak-dinner")]
    pub(crate) form: String,
    /// Make the email provider reject confirmations to show that RSVPs still save
    #[arg(long)]
    pub(crate) fail_email: bool,
}

fn configured_catalog() -> Result<FormCatalog, AppError> {
    let config = AppConfig::load()?;
    Ok(FormCatalog::load(config.rsvp.forms_path.as_deref())?)
}

pub(crate) fn print_forms() -> Result<(), AppError> {
    let catalog = configured_catalog()?;
    println!("Configured forms ({}):", catalog.len());
    for form in catalog.forms() {
        render_form(form);
    }
    Ok(())
}

fn render_form(form: &FormDefinition) {
    println!("\n{} [{}]", form.title, form.slug);
    if !form.subtitle.is_empty() {
        println!("  {}", form.subtitle);
    }
    println!("  Collection: {}", form.collection);
    match &form.email {
        Some(template) => println!("  Confirmation template: {}", template.template_id),
        None => println!("  Confirmation template: none"),
    }
    for field in &form.fields {
        let mut notes = Vec::new();
        if field.required {
            notes.push("required".to_string());
        }
        if let Some(min) = field.min() {
            notes.push(format!("min {min}"));
        }
        if let Some(max) = field.validation.as_ref().and_then(|rules| rules.max) {
            notes.push(format!("max {max}"));
        }
        if let Some(limit) = field.max_length() {
            notes.push(format!("up to {limit} chars"));
        }
        let notes = if notes.is_empty() {
            String::new()
        } else {
            format!(" ({})", notes.join(", "))
        };
        println!(
            "    - {} <{}> {}{}",
            field.name,
            field.kind.label(),
            field.label,
            notes
        );
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let catalog = configured_catalog()?;
    let Some(form) = catalog.get(&args.form) else {
        let known: Vec<&str> = catalog.forms().map(|form| form.slug.as_str()).collect();
        println!("Unknown form '{}'. Available: {}", args.form, known.join(", "));
        return Ok(());
    };

    let store = Arc::new(InMemoryDocumentStore::default());
    let mailer = Arc::new(if args.fail_email {
        LoggingEmailDispatcher::failing("demo provider rejected the message")
    } else {
        LoggingEmailDispatcher::default()
    });
    let service = RsvpSubmissionService::new(store.clone(), mailer.clone());

    println!("=== RSVP demo: {} ===", form.title);
    println!("Run at {}", Local::now().format("%Y-%m-%d %H:%M"));

    println!("\n1. Submitting an empty form");
    let empty = FormSession::new(form.clone());
    report(service.submit(&empty).await.map(|_| ()), &empty);

    if let Some(field) = form
        .fields
        .iter()
        .find(|field| field.kind == FieldKind::Number && field.min().is_some())
    {
        let min = field.min().unwrap_or_default();
        let raw = below_minimum(min).to_string();
        let update = empty
            .set_value(&field.name, &raw)
            .map(|update| format!("{update:?}"))
            .unwrap_or_else(|err| err.to_string());
        let stored = empty
            .snapshot()
            .value(&field.name)
            .map(ToString::to_string)
            .unwrap_or_default();
        println!("\n2. Typing {raw} into '{}': {update}, field now holds {stored}", field.name);
    }

    println!("\n3. Submitting a complete RSVP");
    let session = sample_session(form.clone(), "Jane.Doe@Example.com");
    match service.submit(&session).await {
        Ok(receipt) => {
            println!("  Stored as {}", receipt.document_id.0);
            match &receipt.notification {
                NotificationStatus::Sent { message_id } => {
                    println!("  Confirmation sent ({message_id})")
                }
                NotificationStatus::Failed { reason } => {
                    println!("  Confirmation failed, RSVP kept: {reason}")
                }
                NotificationStatus::Skipped => println!("  No confirmation configured"),
            }
            println!("  Page shows: {}", form.messages.success);
            match serde_json::to_string_pretty(&receipt.record) {
                Ok(json) => println!("  Stored record:\n{json}"),
                Err(err) => println!("  Stored record unavailable: {err}"),
            }
        }
        Err(err) => report(Err(err), &session),
    }

    println!("\n4. Submitting again with the same email in a different case");
    let repeat = sample_session(form.clone(), "jane.doe@example.com");
    report(service.submit(&repeat).await.map(|_| ()), &repeat);

    println!(
        "\nDocuments in '{}': {}, confirmations queued: {}",
        form.collection,
        store.documents(&form.collection).len(),
        mailer.sent().len()
    );
    Ok(())
}

/// A value the clamp will visibly raise, saturating for catalogs with extreme bounds.
fn below_minimum(min: i64) -> i64 {
    min.saturating_sub(5)
}

fn sample_session(form: Arc<FormDefinition>, email: &str) -> FormSession {
    let session = FormSession::new(form.clone());
    for field in &form.fields {
        let raw = match field.kind {
            FieldKind::Email => email.to_string(),
            FieldKind::Text => "Jane Doe".to_string(),
            FieldKind::Textarea => continue,
            FieldKind::Number => match field.initial_value().as_number() {
                Some(_) => continue,
                None => field.min().unwrap_or(1).to_string(),
            },
        };
        if let Err(err) = session.set_value(&field.name, &raw) {
            println!("  Could not fill '{}': {}", field.name, err);
        }
    }
    session
}

fn report(outcome: Result<(), SubmissionError>, session: &FormSession) {
    match outcome {
        Ok(()) => println!("  Accepted"),
        Err(err) => {
            println!("  Rejected: {err}");
            for (field, message) in session.snapshot().errors() {
                println!("    - {field}: {message}");
            }
        }
    }
}
