//! # routes::monitor
//!
//! **Chart stream** — `GET /ws/market`.
//!
//! On connect the client gets a `SNAPSHOT` (bars, positions, last tick), then
//! every broadcast [`WsEvent`].  Text frames from the client drive this
//! connection's preview draft and drags:
//!
//! ```json
//! {"type":"PREVIEW","side":"BUY","lots":0.5}
//! {"type":"DRAG_START","price":1.0812}
//! {"type":"DRAG_START","target":{"scope":"placed","trade_id":"…","kind":"stop_loss","level_id":"…"}}
//! {"type":"DRAG_MOVE","price":1.0807}
//! {"type":"DRAG_END"}
//! {"type":"DRAG_CANCEL"}
//! {"type":"PLACE"}
//! ```
//!
//! Prices are already resolved by the renderer; no pixels reach the server.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::{
    error::RiskRejection,
    events::WsEvent,
    models::Side,
    risk::{DragRelease, DragResolver, DragTarget, DraftPosition},
    state::SharedState,
};

/// Hit-test radius when DRAG_START gives only a price (5 pips).
const DEFAULT_HIT_TOLERANCE: f64 = 0.0005;

// ─── Client protocol ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum ClientMessage {
    Preview {
        side: Side,
        lots: Option<f64>,
        sl_slider: Option<f64>,
        tp_slider: Option<f64>,
    },
    DragStart {
        target: Option<DragTarget>,
        price: Option<f64>,
        tolerance: Option<f64>,
    },
    DragMove {
        price: f64,
    },
    DragEnd,
    DragCancel,
    Place,
}

/// Per-connection interaction state.
#[derive(Debug, Default)]
struct Session {
    draft: Option<DraftPosition>,
    drag: DragResolver,
}

fn rejected(rejection: &RiskRejection) -> WsEvent {
    WsEvent::Rejected { outcome: rejection.label(), reason: rejection.reason().to_string() }
}

fn draft_updated(draft: &DraftPosition) -> WsEvent {
    WsEvent::DraftUpdated { draft: Box::new(draft.clone()) }
}

/// Applies one client message; returns the replies for this client only.
async fn handle_client_message(state: &SharedState, session: &mut Session, text: &str) -> Vec<WsEvent> {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            return vec![WsEvent::Rejected { outcome: "BAD_REQUEST", reason: e.to_string() }];
        }
    };
    debug!(?msg, "client message");

    match msg {
        ClientMessage::Preview { side, lots, sl_slider, tp_slider } => {
            let Some(tick) = state.last_tick() else {
                return vec![rejected(&RiskRejection::NoOp("no market price yet".into()))];
            };
            let lots = lots.unwrap_or(state.preview.default_lots);
            let draft = match (sl_slider, tp_slider) {
                (Some(sl), Some(tp)) => DraftPosition::from_sliders(side, lots, tick.price, sl, tp),
                _ => DraftPosition::around(side, lots, tick.price, &state.preview),
            };
            // A new draft invalidates indices held by a preview drag.
            if let Some(DragTarget::Preview { .. }) = session.drag.active() {
                session.drag.cancel(None);
            }
            let reply = draft_updated(&draft);
            session.draft = Some(draft);
            vec![reply]
        }

        ClientMessage::DragStart { target, price, tolerance } => {
            let positions = state.positions.read().await;
            let target = target.or_else(|| {
                let price = price?;
                DragResolver::hit_test(
                    session.draft.as_ref(),
                    &positions,
                    price,
                    tolerance.unwrap_or(DEFAULT_HIT_TOLERANCE),
                )
            });
            let Some(target) = target else {
                return vec![rejected(&RiskRejection::NoOp("nothing draggable there".into()))];
            };
            match session.drag.begin(target, session.draft.as_ref(), &positions) {
                Ok(frame) => vec![WsEvent::DragPreview { frame }],
                Err(rejection) => vec![rejected(&rejection)],
            }
        }

        ClientMessage::DragMove { price } => match session.drag.move_to(price, session.draft.as_mut()) {
            Some(frame) => vec![WsEvent::DragPreview { frame }],
            None => Vec::new(),
        },

        ClientMessage::DragEnd => {
            let mut positions = state.positions.write().await;
            let Some(release) = session.drag.end(session.draft.as_mut(), &mut positions) else {
                return Vec::new();
            };
            match release {
                DragRelease::Preview(frame) => {
                    let mut replies = vec![WsEvent::DragPreview { frame }];
                    replies.extend(session.draft.as_ref().map(draft_updated));
                    replies
                }
                DragRelease::Committed { frame, change } => {
                    if let DragTarget::Placed { trade_id, .. } = frame.target {
                        if let Some(manager) = positions.get(&trade_id) {
                            state.broadcast(&WsEvent::LevelsChanged {
                                position: Box::new(manager.position().clone()),
                                change,
                            });
                        }
                    }
                    vec![WsEvent::DragPreview { frame }]
                }
                DragRelease::Reverted { frame, rejection } => {
                    vec![WsEvent::DragPreview { frame }, rejected(&rejection)]
                }
            }
        }

        ClientMessage::DragCancel => match session.drag.cancel(session.draft.as_mut()) {
            Some(frame) => {
                let mut replies = vec![WsEvent::DragPreview { frame }];
                if matches!(frame.target, DragTarget::Preview { .. }) {
                    replies.extend(session.draft.as_ref().map(draft_updated));
                }
                replies
            }
            None => Vec::new(),
        },

        ClientMessage::Place => {
            let Some(draft) = session.draft.take() else {
                return vec![rejected(&RiskRejection::NoOp("no preview to place".into()))];
            };
            session.drag.cancel(None);
            match state.place(&draft).await {
                Ok((_, skipped)) => skipped.iter().map(rejected).collect(),
                Err(rejection) => {
                    session.draft = Some(draft);
                    vec![rejected(&rejection)]
                }
            }
        }
    }
}

// ─── WebSocket Handler ────────────────────────────────────────────────────────

pub async fn ws_market(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let mut rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();
    let mut session = Session::default();

    info!("🔌 WebSocket client connected");

    let snapshot = json!({
        "event":     "SNAPSHOT",
        "feed":      state.feed.name(),
        "bars":      state.bars(),
        "last_tick": state.last_tick(),
        "positions": state.list_positions().await,
    })
    .to_string();

    if sender.send(Message::Text(snapshot)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(json_str) => {
                        if sender.send(Message::Text(json_str)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        debug!("WS client lagged, skipped {n} events");
                    }
                    Err(_) => break,
                }
            }

            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        let replies = handle_client_message(&state, &mut session, &text).await;
                        if !send_replies(&mut sender, replies).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("🔌 WebSocket client disconnected");
}

/// Sends `replies` in order.  `false` as soon as the client is gone.
async fn send_replies<S>(sender: &mut S, replies: Vec<WsEvent>) -> bool
where
    S: Sink<Message> + Unpin,
{
    for reply in replies {
        if sender.send(Message::Text(reply.to_json())).await.is_err() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::FeedConfig;
    use crate::engine::random::SeededUniform;
    use crate::engine::regime::{PricePath, RegimeProcess};
    use crate::feed::TickGenerator;
    use crate::models::{LevelKind, Tick};
    use crate::risk::PreviewConfig;
    use crate::state::{AppState, BarBook};

    fn state() -> SharedState {
        let cfg = FeedConfig::default();
        let mut src = SeededUniform::from_seed(9);
        let path = PricePath::new(0, cfg.base_price, RegimeProcess::new(&mut src));
        let feed = Arc::new(TickGenerator::new(cfg, path, Box::new(src)));
        let state = Arc::new(AppState::new(feed, BarBook::new(Vec::new(), 10, None), PreviewConfig::default()));
        state.on_tick(Tick::new(600, 1.1000));
        state
    }

    fn names(events: &[WsEvent]) -> Vec<String> {
        events
            .iter()
            .map(|e| {
                let v: serde_json::Value = serde_json::from_str(&e.to_json()).unwrap();
                v["event"].as_str().unwrap().to_string()
            })
            .collect()
    }

    #[tokio::test]
    async fn replies_stop_at_first_failed_send() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let attempts = Arc::new(AtomicUsize::new(0));
        let a = Arc::clone(&attempts);
        let mut dead = std::pin::pin!(futures_util::sink::unfold((), move |(), _: Message| {
            a.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), &str>("connection reset") }
        }));
        let replies = vec![
            WsEvent::Rejected { outcome: "NO_OP", reason: "first".into() },
            WsEvent::Rejected { outcome: "NO_OP", reason: "second".into() },
        ];
        assert!(!send_replies(&mut dead, replies).await);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        let mut alive = futures_util::sink::drain::<Message>();
        let replies = vec![WsEvent::Rejected { outcome: "NO_OP", reason: "only".into() }];
        assert!(send_replies(&mut alive, replies).await);
    }

    #[tokio::test]
    async fn preview_drag_then_place() {
        let s = state();
        let mut session = Session::default();

        let r = handle_client_message(&s, &mut session, r#"{"type":"PREVIEW","side":"BUY"}"#).await;
        assert_eq!(names(&r), ["DRAFT_UPDATED"]);
        assert_eq!(session.draft.as_ref().unwrap().stop_loss[0].price, 1.098);

        let r = handle_client_message(&s, &mut session, r#"{"type":"DRAG_START","price":1.0981}"#).await;
        assert_eq!(names(&r), ["DRAG_PREVIEW"]);
        handle_client_message(&s, &mut session, r#"{"type":"DRAG_MOVE","price":1.0950}"#).await;
        let r = handle_client_message(&s, &mut session, r#"{"type":"DRAG_END"}"#).await;
        assert_eq!(names(&r), ["DRAG_PREVIEW", "DRAFT_UPDATED"]);

        let r = handle_client_message(&s, &mut session, r#"{"type":"PLACE"}"#).await;
        assert!(r.is_empty());
        assert!(session.draft.is_none());

        let positions = s.list_positions().await;
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].stop_loss.levels[0].price, 1.095);
    }

    #[tokio::test]
    async fn placed_drag_commits_or_reverts() {
        let s = state();
        let draft = DraftPosition::around(Side::Buy, 1.0, 1.1, &s.preview);
        let (position, _) = s.place(&draft).await.unwrap();
        let level_id = position.take_profit.levels[0].id;
        let mut session = Session::default();
        let mut rx = s.broadcast_tx.subscribe();

        let start = json!({
            "type": "DRAG_START",
            "target": { "scope": "placed", "trade_id": position.id, "kind": "take_profit", "level_id": level_id },
        })
        .to_string();

        handle_client_message(&s, &mut session, &start).await;
        handle_client_message(&s, &mut session, r#"{"type":"DRAG_MOVE","price":1.0900}"#).await;
        let r = handle_client_message(&s, &mut session, r#"{"type":"DRAG_END"}"#).await;
        assert_eq!(names(&r), ["DRAG_PREVIEW", "REJECTED"]);
        assert_eq!(s.position(position.id).await.unwrap().take_profit.levels[0].price, 1.104);
        assert!(rx.try_recv().is_err());

        handle_client_message(&s, &mut session, &start).await;
        handle_client_message(&s, &mut session, r#"{"type":"DRAG_MOVE","price":1.1060}"#).await;
        let r = handle_client_message(&s, &mut session, r#"{"type":"DRAG_END"}"#).await;
        assert_eq!(names(&r), ["DRAG_PREVIEW"]);
        assert_eq!(s.position(position.id).await.unwrap().take_profit.levels[0].price, 1.106);
        assert!(rx.try_recv().unwrap().contains("LEVELS_CHANGED"));

        s.mutate(position.id, |m| m.toggle_lock(LevelKind::TakeProfit, level_id)).await;
        let r = handle_client_message(&s, &mut session, &start).await;
        assert_eq!(names(&r), ["REJECTED"]);
    }

    #[tokio::test]
    async fn bad_messages_are_answered_not_fatal() {
        let s = state();
        let mut session = Session::default();
        let r = handle_client_message(&s, &mut session, "{nope").await;
        assert_eq!(names(&r), ["REJECTED"]);
        let r = handle_client_message(&s, &mut session, r#"{"type":"PLACE"}"#).await;
        assert_eq!(names(&r), ["REJECTED"]);
        assert!(handle_client_message(&s, &mut session, r#"{"type":"DRAG_MOVE","price":1.0}"#).await.is_empty());
    }
}
