use dotenv::dotenv;
use std::sync::Arc;
use telegram_relay_bot::config::RuntimeEnv;
use telegram_relay_bot::keep_alive::keep_alive;
use telegram_relay_bot::transport::TelegramTransport;
use telegram_relay_bot::{ConfigStore, RelayClient, RelayStatus};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let runtime = RuntimeEnv::from_env()?;

    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&runtime.log_level)
        .init();
    log::info!("Starting the Telegram relay bot...");

    let store = Arc::new(ConfigStore::load(&runtime.config_file));
    let status = Arc::new(RelayStatus::new());
    let transport = Arc::new(TelegramTransport::from_token(runtime.bot_token.clone()));

    keep_alive(status.clone(), runtime.port);

    let client = RelayClient::new(transport, store, status).with_strict_config(runtime.strict_config);
    client.start().await?;

    let outcome = client.run_until_disconnected().await;
    client.shutdown(true).await?;
    outcome?;

    log::info!("Relay bot stopped");
    Ok(())
}
