use anyhow::Context;
use quiztest_api::{
    config::{Config, StoreBackend},
    create_router,
    repositories::{memory::Fixtures, MemoryStore},
    services::AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize OpenTelemetry tracer (optional, can be disabled)
    let _tracer = init_telemetry()?;

    let json_logs = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quiztest_api=debug,tower_http=debug".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer()))
        .with(tracing_opentelemetry::layer())
        .init();

    tracing::info!("Starting quiz test API");

    let config = Config::load().context("Failed to load configuration")?;
    tracing::info!(
        "Configuration loaded for environment: {:?}, store backend: {:?}",
        std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string()),
        config.store_backend
    );

    let bind_addr = config.bind_addr.clone();
    let app_state = match config.store_backend {
        StoreBackend::Mongo => {
            let mongo_client = mongodb::Client::with_uri_str(&config.mongo_uri)
                .await
                .context("Failed to connect to MongoDB")?;
            tracing::info!("MongoDB connected");
            AppState::new(config, mongo_client)
                .await
                .context("Failed to initialize application state")?
        }
        StoreBackend::Memory => {
            let store = match &config.fixtures_path {
                Some(path) => {
                    let raw = tokio::fs::read_to_string(path)
                        .await
                        .with_context(|| format!("Failed to read fixtures from {}", path))?;
                    let fixtures: Fixtures = serde_json::from_str(&raw)
                        .with_context(|| format!("Failed to parse fixtures from {}", path))?;
                    tracing::info!(
                        "Loaded {} question sets and {} question groups from {}",
                        fixtures.canonical_sets.len(),
                        fixtures.question_groups.len(),
                        path
                    );
                    MemoryStore::with_fixtures(fixtures).await
                }
                None => MemoryStore::new(),
            };
            AppState::in_memory(config, store)
        }
    };

    let app = create_router(Arc::new(app_state));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    shutdown_telemetry();
    Ok(())
}

fn init_telemetry() -> anyhow::Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::SdkTracerProvider;
    use opentelemetry_sdk::Resource;

    let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4318".to_string());

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(otlp_endpoint)
        .build()
        .context("Failed to create OTLP exporter")?;

    let resource = Resource::builder_empty()
        .with_service_name("quiztest-api")
        .with_attributes(vec![KeyValue::new(
            "service.version",
            env!("CARGO_PKG_VERSION"),
        )])
        .build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();

    let tracer = provider.tracer("quiztest-api");

    opentelemetry::global::set_tracer_provider(provider);

    Ok(tracer)
}

fn shutdown_telemetry() {
    tracing::info!("Shutting down OpenTelemetry");
}
