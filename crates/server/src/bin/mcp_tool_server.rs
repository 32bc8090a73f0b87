use anyhow::Context;
use db::DBService;
use rmcp::{ServiceExt, transport::stdio};
use server::{
    config::ServerConfig,
    init_tracing,
    mcp::tool_server::{ProjectToolServer, agent_actor},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env()?;
    let db = DBService::connect(&config.database_url)
        .await
        .with_context(|| format!("failed to open database {}", config.database_url))?;
    let email = std::env::var("AGENT_USER_EMAIL").ok();
    let actor = agent_actor(&db, email.as_deref()).await?;

    tracing::debug!("Starting MCP tool server on stdio");
    let service = ProjectToolServer::new(db, actor)
        .serve(stdio())
        .await
        .inspect_err(|e| tracing::error!("serving error: {:?}", e))?;
    service.waiting().await?;
    Ok(())
}
