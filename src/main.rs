use std::sync::Arc;

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::middleware::{Logger, NormalizePath};
use actix_web::web::{self, Data};
use actix_web::{App, HttpServer};

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod errors;
mod lifecycle;
mod model;
mod models;
mod routes;
mod store;
mod utils;

use config::Config;
use db::{init_store, seed_admin};
use errors::AppError;
use routes::Limiters;
use store::RecordStore;

use crate::docs::ApiDoc;
use crate::utils::email_cache::{self, EmailCache};
use crate::utils::email_filter::{self, EmailFilter};
use tracing::{error, info};
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

/// Everything a worker needs; cloned into each `App`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub config: Config,
    pub filter: Data<EmailFilter>,
    pub cache: Data<EmailCache>,
    pub limiters: Limiters,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, config: Config) -> anyhow::Result<Self> {
        let limiters = Limiters::from_config(&config)?;
        Ok(Self {
            store,
            config,
            filter: Data::new(EmailFilter::new()),
            cache: Data::new(EmailCache::new()),
            limiters,
        })
    }
}

pub fn build_app(
    state: AppState,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    // malformed bodies and query strings answer with the usual { "error": .. } shape
    let json_config = web::JsonConfig::default()
        .error_handler(|err, _req| AppError::validation(err.to_string()).into());
    let query_config = web::QueryConfig::default()
        .error_handler(|err, _req| AppError::validation(err.to_string()).into());

    App::new()
        .wrap(Logger::default())
        .wrap(NormalizePath::trim())
        .service(
            SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                .url("/api-doc/openapi.json", ApiDoc::openapi()),
        )
        .app_data(json_config)
        .app_data(query_config)
        .app_data(Data::from(state.store.clone()))
        .app_data(Data::new(state.config.clone()))
        .app_data(state.filter.clone())
        .app_data(state.cache.clone())
        // Configure auth + protected routes with rate limiting
        .configure(|cfg| routes::configure(cfg, &state.config, &state.limiters))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let store = init_store(&config).await?;
    let state = AppState::new(store, config.clone())?;

    seed_admin(state.store.as_ref(), &state.filter, &config).await?;

    let filter_warmup = state.clone();
    actix_web::rt::spawn(async move {
        if let Err(e) = email_filter::warmup_email_filter(
            &filter_warmup.filter,
            filter_warmup.store.as_ref(),
            100,
        )
        .await
        {
            error!(error = ?e, "Failed to warm up email filter");
        }
    });

    let cache_warmup = state.clone();
    actix_web::rt::spawn(async move {
        // Warm up last 30 days of recent logins in batches of 250
        if let Err(e) = email_cache::warmup_email_cache(
            &cache_warmup.cache,
            cache_warmup.store.as_ref(),
            30,
            250,
        )
        .await
        {
            error!(error = ?e, "Failed to warm up email cache");
        }
    });

    let server_addr = config.server_addr.clone();
    info!(addr = %server_addr, "Listening");

    HttpServer::new(move || build_app(state.clone()))
        .bind(server_addr)?
        .run()
        .await?;
    Ok(())
}
