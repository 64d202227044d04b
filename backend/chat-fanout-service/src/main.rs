use actix_web::{web, App, HttpServer};
use chat_fanout_service::{
    config, db, error, logging,
    middleware::JwtVerifier,
    repository::{ChatRepository, MemoryRepository, PgRepository},
    routes,
    services::LocalMediaStorage,
    state::AppState,
};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = config::Config::from_env()?;

    let repo: Arc<dyn ChatRepository> = match &cfg.database_url {
        Some(url) => {
            let pool = db::init_pool(url)
                .await
                .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;
            tracing::info!("using PostgreSQL repository");
            Arc::new(PgRepository::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, state is kept in memory only");
            Arc::new(MemoryRepository::new())
        }
    };

    let verifier = Arc::new(JwtVerifier::from_config(&cfg.jwt)?);
    let media = Arc::new(LocalMediaStorage::new(&cfg.media));
    let bind_addr = format!("0.0.0.0:{}", cfg.port);

    let state = AppState::new(cfg, repo, verifier, media);
    let registry = state.registry.clone();

    tracing::info!(%bind_addr, "starting chat-fanout-service");

    let server_state = state.clone();
    HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .app_data(web::Data::new(server_state.clone()))
            .configure(routes::configure)
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind REST: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(format!("REST server: {e}")))?;

    registry.shutdown().await;
    tracing::info!("chat-fanout-service stopped");
    Ok(())
}
