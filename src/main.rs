use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use feedrank::config::AppConfig;
use feedrank::openapi::ApiDoc;
use feedrank::{config, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds; deployments set the environment themselves.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = AppConfig::from_env()?;
    info!("Bootstrapping feed server");
    info!("Frontend URL: {}", cfg.frontend_url);

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo = {
        info!("Using in-memory repository backend");
        feedrank::repo::inmem::InMemRepo::in_dir(cfg.data_dir.as_deref())
    };

    #[cfg(feature = "postgres-store")]
    let repo = {
        use anyhow::Context;
        use sqlx::postgres::PgPoolOptions;
        let db_url = cfg.database_url.as_deref().context("DATABASE_URL must be set for postgres-store")?;
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .context("connecting to Postgres")?;
        let repo = feedrank::repo::pg::PgRepo::new(pool);
        repo.migrate().await.context("running migrations")?;
        info!("Using Postgres repository backend");
        repo
    };

    let openapi = ApiDoc::openapi();
    let state = web::Data::new(AppState { repo: Arc::new(repo) });
    let frontend_url = cfg.frontend_url.clone();

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_url)
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(cors)
            .app_data(state.clone())
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind((cfg.host.as_str(), cfg.port))?;

    info!("Listening on http://{}:{}", cfg.host, cfg.port);
    server.run().await?;
    Ok(())
}
