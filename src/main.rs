use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use zufen::config::{LoggingSettings, Settings, StoreBackend};
use zufen::core::MatchingEngine;
use zufen::routes::{self, AppState};
use zufen::services::runtime_config::seed_defaults;
use zufen::services::{
    ConfigProvider, InMemoryConfig, InMemoryStore, ParticipantStore, PostgresClient, RqrrDecoder,
    SubmissionGateway,
};

fn init_tracing(logging: &LoggingSettings) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if logging.format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

fn io_error(err: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
}

async fn serve<S: ParticipantStore>(
    settings: Settings,
    store: Arc<S>,
    config: Arc<dyn ConfigProvider>,
) -> std::io::Result<()> {
    seed_defaults(config.as_ref(), &settings.runtime_defaults())
        .await
        .map_err(|e| {
            error!("Failed to seed runtime configuration: {}", e);
            io_error(e)
        })?;

    let engine = MatchingEngine::new(store, config.clone());
    let gateway = Arc::new(SubmissionGateway::new(
        engine.clone(),
        config.clone(),
        Arc::new(RqrrDecoder),
        settings.intake.max_image_bytes,
    ));

    let app_state = AppState {
        engine,
        gateway,
        config,
    };

    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);
    let upload_dir = settings.intake.upload_dir.clone();
    let max_image_bytes = settings.intake.max_image_bytes;

    std::fs::create_dir_all(&upload_dir)?;

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(routes::json_config(max_image_bytes))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes::<S>)
            .service(actix_files::Files::new("/uploads", &upload_dir))
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return Err(io_error(e));
        }
    };

    init_tracing(&settings.logging);

    info!("Starting Zufen pairing service...");

    match settings.store.backend {
        StoreBackend::Postgres => {
            let client = Arc::new(PostgresClient::from_settings(&settings.database).await.map_err(|e| {
                error!("Failed to connect to PostgreSQL: {}", e);
                io_error(e)
            })?);

            info!(
                "PostgreSQL client initialized (max: {} connections)",
                settings.database.max_connections.unwrap_or(10)
            );

            let config: Arc<dyn ConfigProvider> = client.clone();
            serve(settings, client, config).await
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory store, participants are lost on restart");
            let config: Arc<dyn ConfigProvider> = Arc::new(InMemoryConfig::new());
            serve(settings, Arc::new(InMemoryStore::new()), config).await
        }
    }
}
