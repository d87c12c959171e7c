use anyhow::Context;

use stockroom_api::app::{build_app, AppServices};
use stockroom_auth::Hs256JwtValidator;
use stockroom_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockroom_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let services = AppServices::from_config(&config)
        .await
        .context("failed to initialise storage")?;

    let jwt = Hs256JwtValidator::new(config.jwt_secret.as_bytes())
        .with_max_lifetime(chrono::Duration::days(config.token_ttl_days));
    let app = build_app(services, jwt);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
