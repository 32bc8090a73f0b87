use anyhow::Context;
use db::DBService;
use server::{config::ServerConfig, init_tracing, routes};
use services::services::users;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env()?;
    let db = DBService::connect(&config.database_url)
        .await
        .with_context(|| format!("failed to open database {}", config.database_url))?;

    if let Some(email) = &config.bootstrap_admin_email {
        users::ensure_bootstrap_admin(&db, email).await?;
    }

    let listener = tokio::net::TcpListener::bind(config.addr())
        .await
        .with_context(|| format!("failed to bind {}", config.addr()))?;
    tracing::info!("Server running on http://{}", listener.local_addr()?);

    axum::serve(listener, routes::router(db)).await?;
    Ok(())
}
