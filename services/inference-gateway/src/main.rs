use anyhow::Result;
use inference_gateway::config::GatewayConfig;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = GatewayConfig::load()?;
    defectron_core::init_tracing(&cfg.service_name, &cfg.log_level)?;
    info!(target: "inference-gateway", config = ?cfg, "Starting inference-gateway service");
    inference_gateway::run(cfg).await
}
