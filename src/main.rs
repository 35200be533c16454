mod collaborators;
mod config;
mod decode;
mod encode;
mod error;
mod handlers;
mod models;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use collaborators::{load_labels, AppState, OnnxCamGenerator, OnnxPredictor};
use config::Config;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("cam_analysis_backend=info".parse()?))
        .init();

    let config = Config::parse();

    // Models are loaded once and shared read-only by every worker.
    let labels = config.labels.as_deref().map(load_labels).transpose()?;
    let predictor = OnnxPredictor::load(&config.model, labels)?;
    let cam_generator = OnnxCamGenerator::load(&config.cam_model)?;
    info!(model = %config.model.display(), cam_model = %config.cam_model.display(), "models loaded");

    let state = web::Data::new(
        AppState::new(Arc::new(predictor), Arc::new(cam_generator)).with_jpeg_quality(config.jpeg_quality),
    );

    info!("Server running at http://{}:{}", config.host, config.port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .configure(handlers::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
