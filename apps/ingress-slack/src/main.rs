use anyhow::Result;
use seb_ingress_slack::{build_state, config::IngressConfig, router};
use seb_telemetry::{TelemetryConfig, init_telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env("seb-ingress-slack", env!("CARGO_PKG_VERSION"));
    init_telemetry(&telemetry)?;

    let cfg = IngressConfig::from_env()?;
    let state = build_state(&cfg)?;
    let app = router(state);

    tracing::info!("ingress-slack listening on {}", cfg.bind);
    let listener = tokio::net::TcpListener::bind(cfg.bind).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
