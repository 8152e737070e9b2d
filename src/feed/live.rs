//! # feed::live
//!
//! **LiveFeed** — adapter for an external real-time market stream
//! (Finnhub-style WebSocket: `wss://ws.finnhub.io?token=<key>`).
//!
//! ## Behaviour
//! - No `MARKET_API_KEY` → permanently empty stream.  `subscribe` never calls
//!   back and `stop` is still safe.
//! - Connect / auth / stream failures are logged and retried with capped
//!   backoff; the consumer just sees no ticks meanwhile.
//! - Each trade message may batch several prints; only the newest one is
//!   delivered (latest wins).  Anything unparsable is dropped.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::config::env_opt;
use crate::engine::regime::round_price;
use crate::error::FeedError;
use crate::feed::{lock, DeliverySlot, MarketFeed, TickHandler};
use crate::models::Tick;

/// Connect attempts give up after this long.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Maximum reconnection delay.
const MAX_RECONNECT_DELAY_SECS: u64 = 60;

// ─── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LiveFeedConfig {
    /// External-market credential.  `None` → empty stream.
    pub api_key: Option<String>,
    pub ws_url: String,
    pub symbol: String,
    /// Base delay between reconnect attempts (multiplied by the attempt count).
    pub reconnect_delay: Duration,
}

impl LiveFeedConfig {
    pub fn from_env() -> Self {
        Self {
            api_key:         std::env::var("MARKET_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            ws_url:          std::env::var("MARKET_WS_URL").unwrap_or_else(|_| "wss://ws.finnhub.io".to_string()),
            symbol:          std::env::var("MARKET_SYMBOL").unwrap_or_else(|_| "OANDA:EUR_USD".to_string()),
            reconnect_delay: Duration::from_secs(env_opt("MARKET_RECONNECT_SECS").unwrap_or(2)),
        }
    }
}

// ─── Wire format ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Vec<TradePrint>,
}

#[derive(Debug, Deserialize)]
struct TradePrint {
    /// Price.
    p: f64,
    /// Symbol.
    #[serde(default)]
    s: Option<String>,
    /// Unix time in milliseconds.
    t: i64,
}

/// Newest valid print of a trade message for `symbol`, as a [`Tick`].
fn parse_message(text: &str, symbol: &str) -> Option<Tick> {
    let msg: StreamMessage = serde_json::from_str(text).ok()?;
    if msg.kind != "trade" {
        return None;
    }
    msg.data
        .into_iter()
        .filter(|p| p.p.is_finite() && p.p > 0.0)
        .filter(|p| p.s.as_deref().map_or(true, |s| s == symbol))
        .max_by_key(|p| p.t)
        .map(|p| Tick::new(p.t.div_euclid(1000), round_price(p.p)))
}

// ─── LiveFeed ─────────────────────────────────────────────────────────────────

struct LiveShared {
    config: LiveFeedConfig,
    slot: DeliverySlot,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct LiveFeed {
    shared: Arc<LiveShared>,
}

impl LiveFeed {
    pub fn new(config: LiveFeedConfig) -> Self {
        Self {
            shared: Arc::new(LiveShared {
                config,
                slot: DeliverySlot::new(),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn has_credential(&self) -> bool {
        self.shared.config.api_key.is_some()
    }
}

impl MarketFeed for LiveFeed {
    fn subscribe(&self, on_tick: TickHandler) {
        if !self.shared.slot.install(self.name(), on_tick) {
            return;
        }
        if !self.has_credential() {
            info!("MARKET_API_KEY not set, live feed stays empty");
            return;
        }

        let mut task = lock(&self.shared.task);
        if task.is_some() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => *task = Some(runtime.spawn(run_stream(Arc::clone(&self.shared)))),
            Err(_) => warn!("no tokio runtime, live feed stays idle"),
        }
    }

    fn stop(&self) {
        if self.shared.slot.close() {
            info!("🛑 Live feed stopped");
        }
        if let Some(task) = lock(&self.shared.task).take() {
            task.abort();
        }
    }

    fn name(&self) -> &'static str {
        "live"
    }
}

// ─── Stream loop ──────────────────────────────────────────────────────────────

async fn run_stream(shared: Arc<LiveShared>) {
    let mut attempt: u32 = 0;
    let max_delay = Duration::from_secs(MAX_RECONNECT_DELAY_SECS);

    info!(symbol = %shared.config.symbol, "Starting live market stream");

    loop {
        match connect_and_stream(&shared).await {
            Ok(()) => {
                info!("Live market stream closed");
                attempt = 0;
            }
            Err(e) => {
                attempt += 1;
                warn!(attempt, error = %e, "Live market stream failed, no ticks until reconnect");
            }
        }

        if shared.slot.is_stopped() {
            break;
        }

        let delay = (shared.config.reconnect_delay * attempt.clamp(1, 10)).min(max_delay);
        info!(?delay, "Reconnecting live market stream");
        tokio::time::sleep(delay).await;
    }
}

async fn connect_and_stream(shared: &LiveShared) -> Result<(), FeedError> {
    let key = shared
        .config
        .api_key
        .as_deref()
        .ok_or_else(|| FeedError::Config("missing credential".into()))?;
    let url = format!("{}?token={}", shared.config.ws_url, key);

    let (ws_stream, _) = tokio::time::timeout(
        Duration::from_secs(CONNECT_TIMEOUT_SECS),
        connect_async(url),
    )
    .await
    .map_err(|_| FeedError::Transport("connect timeout".into()))??;

    info!(url = %shared.config.ws_url, "Connected to live market stream");

    let (mut write, mut read) = ws_stream.split();
    let subscribe = serde_json::json!({ "type": "subscribe", "symbol": shared.config.symbol });
    write.send(Message::Text(subscribe.to_string())).await?;

    while let Some(msg) = read.next().await {
        match msg? {
            Message::Text(text) => match parse_message(&text, &shared.config.symbol) {
                Some(tick) => {
                    if !shared.slot.deliver(tick) {
                        return Ok(());
                    }
                }
                None => debug!(
                    "Dropped market message: {}",
                    text.chars().take(100).collect::<String>()
                ),
            },
            Message::Ping(data) => write.send(Message::Pong(data)).await?,
            Message::Close(_) => break,
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(api_key: Option<&str>) -> LiveFeedConfig {
        LiveFeedConfig {
            api_key:         api_key.map(str::to_string),
            ws_url:          "wss://ws.finnhub.io".to_string(),
            symbol:          "OANDA:EUR_USD".to_string(),
            reconnect_delay: Duration::from_secs(1),
        }
    }

    #[test]
    fn parses_newest_trade_print() {
        let text = r#"{"type":"trade","data":[
            {"p":1.081234,"s":"OANDA:EUR_USD","t":1700000001500,"v":0},
            {"p":1.0813,"s":"OANDA:EUR_USD","t":1700000002000,"v":0}
        ]}"#;
        let tick = parse_message(text, "OANDA:EUR_USD").unwrap();
        assert_eq!(tick, Tick::new(1_700_000_002, 1.0813));
    }

    #[test]
    fn rounds_to_five_digits() {
        let text = r#"{"type":"trade","data":[{"p":1.0812349,"t":1000}]}"#;
        assert_eq!(parse_message(text, "X").unwrap().price, 1.08123);
    }

    #[test]
    fn drops_other_and_malformed_messages() {
        assert!(parse_message(r#"{"type":"ping"}"#, "X").is_none());
        assert!(parse_message("not json", "X").is_none());
        assert!(parse_message(r#"{"type":"trade","data":[]}"#, "X").is_none());
        assert!(parse_message(r#"{"type":"trade","data":[{"p":"bad","t":1}]}"#, "X").is_none());
        assert!(parse_message(r#"{"type":"trade","data":[{"p":-1.0,"t":1}]}"#, "X").is_none());
        let other = r#"{"type":"trade","data":[{"p":1.2,"s":"OANDA:GBP_USD","t":1}]}"#;
        assert!(parse_message(other, "OANDA:EUR_USD").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn without_credential_delivers_nothing() {
        let feed = LiveFeed::new(config(None));
        assert!(!feed.has_credential());

        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        feed.subscribe(Box::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
        feed.stop();
        feed.stop();
    }

    #[test]
    fn stop_without_subscribe_is_safe() {
        let feed = LiveFeed::new(config(Some("key")));
        feed.stop();
        assert!(feed.has_credential());
    }
}
