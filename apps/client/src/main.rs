use anyhow::Context;
use vocab_client::{init_tracing, AppState, ClientConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ClientConfig::from_env()?;
    init_tracing();

    let state = AppState::open(config.clone())?;
    let sync = state
        .sync
        .clone()
        .context("VOCAB_SYNC_URL must be set to run the sync daemon")?;

    if !sync.check_connectivity().await.unwrap_or(false) {
        tracing::warn!("backend health check failed, will keep retrying");
    }
    if sync.token().is_err() {
        let device = sync
            .register_device(config.device_name.clone(), config.account_id.clone())
            .await?;
        tracing::info!("Registered as device {} on account {}", device.device_id, device.account_id);
        state.lookup.set_token(Some(device.token));
    }

    if let Err(err) = state.lookup.ensure_index().await {
        tracing::warn!("full-text index unavailable: {}", err);
    }

    sync.start_live(config.sync_interval).await;
    tokio::signal::ctrl_c().await?;
    sync.stop_live().await;

    Ok(())
}
