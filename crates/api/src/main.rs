use anyhow::Context;

use stockbook_infra::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("invalid configuration")?;
    stockbook_observability::init(&config.log);

    if config.jwt_secret_defaulted {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
    }

    let services = stockbook_api::app::services::build_services(&config)
        .await
        .context("failed to initialise inventory store")?;
    let app = stockbook_api::app::build_app(config.jwt_secret.clone(), services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        policy = config.ledger.policy.as_str(),
        "listening"
    );

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
