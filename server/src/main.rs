mod routes;

use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::middleware::Logger;
use actix_web::web::{self, Data};
use actix_web::{App, HttpServer};
use anyhow::{Context, Result, anyhow};
use log::{LevelFilter, info, warn};
use std::sync::Arc;
use vanish_core::Cipher;
use vanish_srv::db::get_connection;
use vanish_srv::{BackendKind, MemoryBackend, SecretBackend, SecretStore, ServerConfig, StoreSettings};

use crate::routes::UploadLimits;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    pretty_env_logger::formatted_timed_builder()
        .format_timestamp_millis()
        .filter_level(LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();

    let config = ServerConfig::from_env().context("Failed to load configuration")?;
    info!("Starting with {config:?}");

    let cipher = Cipher::from_encoded_key(&config.secret_key).context("SECRET_KEY is invalid")?;

    let backend: Arc<dyn SecretBackend> = match config.backend {
        BackendKind::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set")?;
            Arc::new(
                get_connection(url, config.backend_timeout)
                    .await
                    .context("Failed to connect to the database")?,
            )
        }
        BackendKind::Memory => {
            warn!("Using the in-memory backend, secrets will not survive a restart");
            Arc::new(MemoryBackend::new())
        }
    };

    let store = SecretStore::new(
        backend,
        Arc::new(cipher),
        StoreSettings {
            max_ttl: config.max_ttl,
            backend_timeout: config.backend_timeout,
        },
    );

    let limits = UploadLimits {
        max_size: config.max_size,
    };

    let per_minute = config.rate_limit_per_minute;
    let create_limit = GovernorConfigBuilder::default()
        .milliseconds_per_request(60_000 / u64::from(per_minute))
        .burst_size(per_minute)
        .finish()
        .ok_or_else(|| anyhow!("Invalid rate limit of {per_minute} per minute"))?;

    let frontend_origin = config.frontend_origin.clone();

    info!("Listening on {}:{}", config.address, config.port);

    HttpServer::new(move || {
        let cors = match &frontend_origin {
            Some(origin) => Cors::default()
                .allowed_origin(origin)
                .allow_any_method()
                .allow_any_header()
                .supports_credentials(),
            None => Cors::default(),
        };

        App::new()
            .wrap(cors)
            .wrap(
                Logger::new(r#"%a "%{method}xi %{path}xi" %s %b %T"#)
                    .custom_request_replace("method", |req| req.method().to_string())
                    .custom_request_replace("path", routes::access_log_path),
            )
            .app_data(Data::new(store.clone()))
            .app_data(Data::new(limits))
            .service(
                web::resource(["/api/secrets", "/api/secrets/"])
                    .wrap(Governor::new(&create_limit))
                    .route(web::post().to(routes::create_secret)),
            )
            .configure(routes::configure)
    })
    .bind((config.address.as_str(), config.port))
    .with_context(|| format!("Failed to bind {}:{}", config.address, config.port))?
    .run()
    .await
    .context("Server terminated with an error")
}
