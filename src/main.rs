use positionbot::bridge::RedisBridge;
use positionbot::broker::AlpacaClient;
use positionbot::feed::AlpacaQuoteFeed;
use positionbot::Result;
use positionbot::{Engine, EngineSettings};
use tokio::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    tracing::info!("🚀 PositionBot starting");

    let settings = EngineSettings::from_env();
    let key_id = std::env::var("APCA_API_KEY_ID")
        .map_err(|_| "APCA_API_KEY_ID not found in environment")?;
    let secret_key = std::env::var("APCA_API_SECRET_KEY")
        .map_err(|_| "APCA_API_SECRET_KEY not found in environment")?;

    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Symbol: {}", settings.symbol);
    tracing::info!("  Entry threshold: ${:.2}", settings.entry_threshold);
    tracing::info!("  Profit target: {}%", settings.profit_target_pct);
    tracing::info!("  Stop loss: {}%", settings.stop_loss_pct);
    tracing::info!("  Sizing divisor: {}", settings.sizing_divisor);
    tracing::info!("  Quote poll: every {}s", settings.feed_poll_secs);

    let broker = AlpacaClient::new(&key_id, &secret_key);
    let feed = AlpacaQuoteFeed::new(
        &key_id,
        &secret_key,
        Duration::from_secs(settings.feed_poll_secs),
    );

    let redis_url = settings.redis_url.clone();
    let engine = Engine::new(settings, broker, feed);
    let handle = engine.handle();

    // The operator bridge is optional; without Redis the engine still runs,
    // it just has no out-of-process observers
    let bridge_tasks = match redis_url {
        Some(url) => match RedisBridge::new(&url).await {
            Ok(bridge) => Some(bridge.spawn(handle.clone())),
            Err(e) => {
                tracing::warn!(
                    "Failed to connect to Redis ({}), continuing without operator bridge",
                    e
                );
                None
            }
        },
        None => None,
    };

    let engine_task = tokio::spawn(engine.run());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
            handle.stop();
        }
        _ = handle.stopped() => {}
    }

    // Cooperative stop: let in-flight work finish before exiting
    match engine_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("Engine exited with error: {}", e),
        Err(e) => tracing::error!("Engine task failed: {}", e),
    }

    if let Some((mirror, listener)) = bridge_tasks {
        let _ = mirror.await;
        let _ = listener.await;
    }

    tracing::info!("👋 PositionBot stopped");
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "positionbot=info".into()),
        )
        .init();
}
