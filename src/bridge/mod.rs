use crate::engine::EngineHandle;
use crate::Result;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, Duration, MissedTickBehavior};

const STATE_KEY: &str = "bot:state";
const STATE_CHANNEL: &str = "bot:state";
const CONFIG_CHANNEL: &str = "bot:config";
const COMMAND_CHANNEL: &str = "bot:command";

const PUBLISH_INTERVAL: Duration = Duration::from_secs(2);
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

/// Operator payload on the config channel
#[derive(Debug, Deserialize)]
struct ConfigUpdate {
    entry_threshold: f64,
}

/// Redis bridge between the engine and an out-of-process operator interface
///
/// Mirrors the latest snapshot into `bot:state` (key + notify channel) and
/// applies operator messages from `bot:config` / `bot:command` to the engine
/// handle. The engine runs fine without it; the bridge only widens the
/// operator surface across process boundaries.
pub struct RedisBridge {
    client: Client,
    conn: ConnectionManager,
}

impl RedisBridge {
    /// Connect to Redis with a 5 second timeout
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client.clone()))
            .await
            .map_err(|_| "Redis connection timeout after 5 seconds")??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self { client, conn })
    }

    /// Spawn the mirror and listener tasks; both exit when the engine stops
    pub fn spawn(self, handle: EngineHandle) -> (JoinHandle<()>, JoinHandle<()>) {
        let mirror = tokio::spawn(Self::mirror_loop(self.conn, handle.clone()));
        let listener = tokio::spawn(Self::listen_loop(self.client, handle));
        (mirror, listener)
    }

    /// Periodically mirror the snapshot, plus once more after the stop so
    /// observers see the terminal status
    async fn mirror_loop(mut conn: ConnectionManager, handle: EngineHandle) {
        let mut ticker = interval(PUBLISH_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = handle.stopped() => break,
                _ = ticker.tick() => {
                    if let Err(e) = Self::publish_state(&mut conn, &handle).await {
                        tracing::warn!("Failed to mirror state to Redis: {}", e);
                    }
                }
            }
        }

        if let Err(e) = Self::publish_state(&mut conn, &handle).await {
            tracing::warn!("Failed to mirror final state to Redis: {}", e);
        }
        tracing::debug!("Redis mirror exited");
    }

    async fn publish_state(conn: &mut ConnectionManager, handle: &EngineHandle) -> Result<()> {
        let json = serde_json::to_string(&handle.snapshot())?;
        conn.set::<_, _, ()>(STATE_KEY, &json).await?;
        conn.publish::<_, _, ()>(STATE_CHANNEL, &json).await?;
        Ok(())
    }

    /// Consume operator messages until the engine stops, resubscribing if
    /// the pub/sub connection drops
    async fn listen_loop(client: Client, handle: EngineHandle) {
        loop {
            if handle.is_stopped() {
                break;
            }

            match client.get_async_pubsub().await {
                Ok(mut pubsub) => {
                    if let Err(e) = Self::subscribe_channels(&mut pubsub).await {
                        tracing::warn!("Failed to subscribe to operator channels: {}", e);
                    } else {
                        tracing::info!("Listening for operator messages on Redis");
                        let mut messages = pubsub.on_message();
                        loop {
                            tokio::select! {
                                _ = handle.stopped() => return,
                                msg = messages.next() => match msg {
                                    Some(msg) => {
                                        let channel = msg.get_channel_name().to_string();
                                        match msg.get_payload::<String>() {
                                            Ok(payload) => {
                                                apply_operator_message(&channel, &payload, &handle)
                                            }
                                            Err(e) => tracing::warn!(
                                                "Unreadable payload on {}: {}", channel, e
                                            ),
                                        }
                                    }
                                    None => break,
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Redis pub/sub connection failed: {}", e);
                }
            }

            tokio::select! {
                _ = handle.stopped() => break,
                _ = sleep(RESUBSCRIBE_DELAY) => {}
            }
        }

        tracing::debug!("Redis listener exited");
    }

    async fn subscribe_channels(pubsub: &mut redis::aio::PubSub) -> redis::RedisResult<()> {
        pubsub.subscribe(CONFIG_CHANNEL).await?;
        pubsub.subscribe(COMMAND_CHANNEL).await
    }
}

/// Apply one operator message; invalid input is rejected here and never
/// touches engine state
fn apply_operator_message(channel: &str, payload: &str, handle: &EngineHandle) {
    match channel {
        CONFIG_CHANNEL => match serde_json::from_str::<ConfigUpdate>(payload) {
            Ok(update) => {
                if let Err(e) = handle.set_entry_threshold(update.entry_threshold) {
                    tracing::warn!("Rejected config update: {}", e);
                }
            }
            Err(e) => {
                tracing::warn!("Ignoring malformed config payload {:?}: {}", payload, e);
            }
        },
        COMMAND_CHANNEL => match payload {
            "execute_trade" => {
                handle.request_execute_trade();
            }
            "stop" => handle.stop(),
            other => {
                tracing::warn!("Ignoring unknown command {:?}", other);
            }
        },
        other => {
            tracing::debug!("Ignoring message on unexpected channel {}", other);
        }
    }
}
