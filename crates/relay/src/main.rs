use std::sync::Arc;

use relay_anthropic::{AnthropicClient, AnthropicConfig};
use relay_core::{config::Config, relay::Relay};

#[tokio::main]
async fn main() -> Result<(), relay_core::Error> {
    relay_core::logging::init("relay")?;

    let cfg = Arc::new(Config::load()?);

    let backend = Arc::new(AnthropicClient::new(AnthropicConfig::from_config(&cfg))?);
    let relay = Arc::new(Relay::from_config(cfg.clone(), backend));

    relay_telegram::router::run_polling(cfg, relay)
        .await
        .map_err(|e| relay_core::Error::External(format!("telegram bot failed: {e}")))?;

    tracing::info!("relay bot stopped");
    Ok(())
}
