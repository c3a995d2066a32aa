//! WebSocket stream of crash round events
//!
//! One connection follows one account: every multiplier update and the
//! resolution of that account's rounds, in the order the engine published them.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::handlers::AppState;
use crate::crash::RoundView;
use crate::ledger::AccountId;

/// Frames sent to the client besides the engine's own events
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamFrame {
    /// Current round, sent once on connect
    Snapshot { account: AccountId, round: Option<RoundView> },
    /// The client fell behind and `skipped` events were dropped
    Lagged { skipped: u64 },
}

/// GET /crash/ws/:account
pub async fn crash_ws_handler(
    ws: WebSocketUpgrade,
    Path(account): Path<AccountId>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, account, state))
}

async fn handle_connection(socket: WebSocket, account: AccountId, state: Arc<AppState>) {
    // Subscribe before the snapshot so nothing published in between is lost
    let mut events = state.casino.subscribe_crash();
    let metrics = state.casino.metrics().clone();
    metrics.websocket_opened();
    info!(account, "crash stream connected");

    let (mut sender, mut receiver) = socket.split();

    let snapshot = StreamFrame::Snapshot { account, round: state.casino.crash_round(account) };
    if send_frame(&mut sender, &snapshot).await.is_err() {
        metrics.websocket_closed();
        return;
    }

    let mut send_task = tokio::spawn(async move {
        loop {
            let frame = match events.recv().await {
                Ok(event) if event.account() == account => {
                    send_frame(&mut sender, &event).await
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(account, skipped, "crash stream lagging");
                    send_frame(&mut sender, &StreamFrame::Lagged { skipped }).await
                }
                Err(RecvError::Closed) => break,
            };
            if frame.is_err() {
                debug!(account, "crash stream client went away");
                break;
            }
        }
    });

    let mut receive_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(account, error = %e, "crash stream receive error");
                    break;
                }
            }
        }
    });

    // Whichever side finishes first ends the connection
    tokio::select! {
        _ = &mut send_task => receive_task.abort(),
        _ = &mut receive_task => send_task.abort(),
    }

    metrics.websocket_closed();
    info!(account, "crash stream disconnected");
}

async fn send_frame<S, T>(sender: &mut S, frame: &T) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
    T: Serialize,
{
    let text = serde_json::to_string(frame).map_err(|e| warn!(error = %e, "failed to encode crash frame"))?;
    sender.send(Message::Text(text)).await.map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crash::RoundState;

    #[test]
    fn frames_are_tagged() {
        let json = serde_json::to_value(StreamFrame::Lagged { skipped: 4 }).unwrap();
        assert_eq!(json["type"], "lagged");
        assert_eq!(json["skipped"], 4);

        let round = RoundView {
            round_id: 1,
            account: 3,
            stake: 100,
            multiplier: 1.0,
            auto_cashout: None,
            state: RoundState::Flying,
            resolution: None,
        };
        let json = serde_json::to_value(StreamFrame::Snapshot { account: 3, round: Some(round) }).unwrap();
        assert_eq!(json["type"], "snapshot");
        assert_eq!(json["round"]["state"], "flying");
    }
}
