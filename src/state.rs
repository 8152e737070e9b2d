//! # state
//!
//! AppState: the feed handle, the chart's bar book, open positions and the
//! WebSocket broadcast channel, shared by every Axum handler.
//!
//! ## Locking
//! * The bar book sits behind a `std::sync::Mutex`: it is only touched from
//!   the synchronous tick callback and short handler reads, never across an
//!   `.await`.
//! * Positions sit behind a `tokio::sync::RwLock`.  Each
//!   [`PositionRiskManager`] is the single owner of its levels; the lock
//!   serialises mutations per process.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, FeedSource};
use crate::engine::candle_builder::BarAggregator;
use crate::engine::history::{generate_bars, seed_history};
use crate::engine::random::SeededUniform;
use crate::error::RiskRejection;
use crate::events::WsEvent;
use crate::feed::{lock, LiveFeed, MarketFeed, TickGenerator};
use crate::models::{bucket_of, Bar, Position, Tick};
use crate::risk::{DraftPosition, LevelChange, PositionRiskManager, PreviewConfig};

/// Closed bars kept for new chart clients, at minimum.
const MIN_BAR_CAPACITY: usize = 288;

// ─── BarBook ──────────────────────────────────────────────────────────────────

/// Closed bars (bounded, oldest first) plus the in-progress one.
#[derive(Debug)]
pub struct BarBook {
    aggregator: BarAggregator,
    closed: VecDeque<Bar>,
    capacity: usize,
    last_tick: Option<Tick>,
}

impl BarBook {
    pub fn new(seeded: Vec<Bar>, capacity: usize, last_tick: Option<Tick>) -> Self {
        let capacity = capacity.max(1);
        let mut closed: VecDeque<Bar> = seeded.into();
        while closed.len() > capacity {
            closed.pop_front();
        }
        Self { aggregator: BarAggregator::new(), closed, capacity, last_tick }
    }

    /// Folds `tick` into the book.  `None` when the tick belongs to a bucket
    /// that is already closed.
    pub fn apply(&mut self, tick: Tick) -> Option<WsEvent> {
        let previous = self.aggregator.current();
        if previous.is_none() && self.closed.back().is_some_and(|b| tick.bucket() <= b.time) {
            return None;
        }

        let bar = self.aggregator.apply_tick(tick);
        self.last_tick = Some(tick);
        match previous {
            Some(prev) if prev.time == bar.time => Some(WsEvent::BarUpdated { bar }),
            Some(prev) => {
                self.push_closed(prev);
                Some(WsEvent::BarAppended { bar })
            }
            None => Some(WsEvent::BarAppended { bar }),
        }
    }

    fn push_closed(&mut self, bar: Bar) {
        if self.closed.len() == self.capacity {
            self.closed.pop_front();
        }
        self.closed.push_back(bar);
    }

    /// Every bar, oldest first, the in-progress one last.
    pub fn bars(&self) -> Vec<Bar> {
        self.closed.iter().copied().chain(self.aggregator.current()).collect()
    }

    pub fn last_tick(&self) -> Option<Tick> {
        self.last_tick
    }
}

// ─── AppState ─────────────────────────────────────────────────────────────────

/// Result of a risk mutation on one position.
#[derive(Debug, Clone)]
pub struct Mutation {
    /// Position after the call (unchanged on rejection).
    pub position: Position,
    pub result: Result<LevelChange, RiskRejection>,
}

#[derive(Clone)]
pub struct AppState {
    // ── Market ────────────────────────────────────────────────────────────────
    pub feed: Arc<dyn MarketFeed>,
    pub book: Arc<Mutex<BarBook>>,
    pub tick_count: Arc<AtomicU64>,

    // ── Positions ─────────────────────────────────────────────────────────────
    pub positions: Arc<RwLock<HashMap<Uuid, PositionRiskManager>>>,
    pub preview: PreviewConfig,

    // ── Monitor / WebSocket ───────────────────────────────────────────────────
    /// Pre-serialized [`WsEvent`] JSON.
    pub broadcast_tx: broadcast::Sender<String>,

    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(feed: Arc<dyn MarketFeed>, book: BarBook, preview: PreviewConfig) -> Self {
        let (broadcast_tx, _) = broadcast::channel(256);
        Self {
            feed,
            book:       Arc::new(Mutex::new(book)),
            tick_count: Arc::new(AtomicU64::new(0)),
            positions:  Arc::new(RwLock::new(HashMap::new())),
            preview,
            broadcast_tx,
            started_at: Utc::now(),
        }
    }

    /// No receivers is not an error.
    pub fn broadcast(&self, event: &WsEvent) {
        let _ = self.broadcast_tx.send(event.to_json());
    }

    // ── Tick pipeline ─────────────────────────────────────────────────────────

    /// Feed callback: aggregate, then fan the tick and bar events out.
    pub fn on_tick(&self, tick: Tick) {
        self.tick_count.fetch_add(1, Ordering::Relaxed);
        let bar_event = lock(&self.book).apply(tick);
        self.broadcast(&WsEvent::Tick { tick });
        match bar_event {
            Some(event) => self.broadcast(&event),
            None => warn!(time = tick.time, "tick for a closed bucket dropped"),
        }
    }

    pub fn bars(&self) -> Vec<Bar> {
        lock(&self.book).bars()
    }

    pub fn last_tick(&self) -> Option<Tick> {
        lock(&self.book).last_tick()
    }

    // ── Positions ─────────────────────────────────────────────────────────────

    /// Places `draft` at the latest market price.
    pub async fn place(&self, draft: &DraftPosition) -> Result<(Position, Vec<RiskRejection>), RiskRejection> {
        let Some(tick) = self.last_tick() else {
            return Err(RiskRejection::NoOp("no market price yet".into()));
        };
        let (manager, skipped) = draft.place(tick.price)?;
        let position = manager.position().clone();
        self.positions.write().await.insert(manager.id(), manager);

        self.broadcast(&WsEvent::PositionOpened { position: Box::new(position.clone()) });
        Ok((position, skipped))
    }

    pub async fn position(&self, id: Uuid) -> Option<Position> {
        self.positions.read().await.get(&id).map(|m| m.position().clone())
    }

    /// Open positions, oldest first.
    pub async fn list_positions(&self) -> Vec<Position> {
        let mut list: Vec<Position> =
            self.positions.read().await.values().map(|m| m.position().clone()).collect();
        list.sort_by_key(|p| p.opened_at);
        list
    }

    pub async fn close_position(&self, id: Uuid) -> Option<Position> {
        let manager = self.positions.write().await.remove(&id)?;
        info!(position = %id, "Position closed");
        self.broadcast(&WsEvent::PositionClosed { position_id: id });
        Some(manager.into_position())
    }

    /// Runs one risk operation on position `id`.  `None` if it is not open.
    pub async fn mutate<F>(&self, id: Uuid, op: F) -> Option<Mutation>
    where
        F: FnOnce(&mut PositionRiskManager) -> Result<LevelChange, RiskRejection>,
    {
        let mut positions = self.positions.write().await;
        let manager = positions.get_mut(&id)?;
        let result = op(manager);
        let position = manager.position().clone();
        drop(positions);

        if let Ok(change) = &result {
            self.broadcast(&WsEvent::LevelsChanged {
                position: Box::new(position.clone()),
                change:   change.clone(),
            });
        }
        Some(Mutation { position, result })
    }
}

/// Convenience type alias
pub type SharedState = Arc<AppState>;

/// Seeds the chart history, builds the configured feed and wraps it all up.
/// The feed stays idle until [`start_feed`].
pub fn build_state(config: &AppConfig) -> SharedState {
    let now = Utc::now().timestamp();
    let mut source = SeededUniform::from_optional_seed(config.feed.seed);

    // The synthetic feed continues the seeded path; a live feed only needs the bars.
    let (feed, bars, last_tick): (Arc<dyn MarketFeed>, Vec<Bar>, Option<Tick>) = match config.feed_source {
        FeedSource::Synthetic => {
            let seeded = seed_history(config.history_bars, &config.feed, now, &mut source);
            let last_tick = Tick::new(seeded.resume.time, seeded.resume.price);
            let feed = TickGenerator::new(config.feed.clone(), seeded.resume, Box::new(source));
            (Arc::new(feed), seeded.bars, Some(last_tick))
        }
        FeedSource::Live => {
            let bars = generate_bars(config.history_bars, &config.feed, now, &mut source);
            let last_tick = bars.last().map(|b| Tick::new(bucket_of(now) - 1, b.close));
            (Arc::new(LiveFeed::new(config.live.clone())), bars, last_tick)
        }
    };
    info!(feed = feed.name(), bars = bars.len(), "Market state seeded");

    let capacity = config.history_bars.max(MIN_BAR_CAPACITY);
    let book = BarBook::new(bars, capacity, last_tick);
    Arc::new(AppState::new(feed, book, config.preview.clone()))
}

/// Subscribes the tick pipeline to the feed.
pub fn start_feed(state: &SharedState) {
    let pipeline = Arc::clone(state);
    state.feed.subscribe(Box::new(move |tick| pipeline.on_tick(tick)));
}
