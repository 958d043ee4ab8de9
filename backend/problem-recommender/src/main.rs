use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use problem_recommender::handlers::{self, AppState};
use problem_recommender::services::{CodeforcesClient, FileStore, Recommender};
use problem_recommender::Config;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info,problem_recommender=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate()?;

    info!(
        "Starting problem-recommender v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!(
        data_dir = %config.data_dir.display(),
        api = %config.codeforces_api_url,
        cache_ttl_seconds = config.cache_ttl_seconds,
        "Configuration loaded"
    );

    let source = CodeforcesClient::new(&config.codeforces_api_url, config.request_timeout())
        .context("Failed to build Codeforces client")?;
    let store = FileStore::new(config.data_dir.clone());

    let recommender = Arc::new(Recommender::new(
        Arc::new(source),
        Arc::new(store),
        config.recommender(),
    ));
    recommender.initialize().await;

    let status = recommender.status().await;
    info!(
        problems = status.problems,
        feature_dimension = ?status.feature_dimension,
        user_profiles = status.user_profiles,
        "Recommender initialized"
    );

    let state = web::Data::new(AppState {
        recommender,
        default_count: config.default_recommendation_count,
    });

    info!("HTTP server listening on {}:{}", config.http_host, config.http_port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .configure(handlers::configure)
    })
    .bind((config.http_host.as_str(), config.http_port))
    .context("Failed to bind HTTP server")?
    .run()
    .await
    .context("HTTP server error")?;

    info!("problem-recommender shutting down");
    Ok(())
}
