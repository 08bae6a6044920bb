use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryDocumentStore, LoggingEmailDispatcher};
use crate::routes::with_form_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use lodge_rsvp::config::AppConfig;
use lodge_rsvp::error::AppError;
use lodge_rsvp::forms::{FormCatalog, RsvpSubmissionService};
use lodge_rsvp::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(path) = args.forms.take() {
        config.rsvp.forms_path = Some(path);
    }

    telemetry::init(&config.telemetry)?;

    let catalog = Arc::new(FormCatalog::load(config.rsvp.forms_path.as_deref())?);
    info!(forms = catalog.len(), "form catalog loaded");

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryDocumentStore::default());
    let mailer = Arc::new(LoggingEmailDispatcher::default());
    let service = Arc::new(
        RsvpSubmissionService::new(store, mailer).with_timeout(config.rsvp.network_timeout),
    );

    let app = with_form_routes(service, catalog)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "lodge rsvp service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
