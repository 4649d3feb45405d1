// SPDX-License-Identifier: MIT OR Apache-2.0
//! `/ws/metrics`: a subscribe-model broadcast socket built on
//! `tokio::sync::broadcast`, the same primitive as the teacher's
//! `EventBus`, feeding one task per connected client.

use crate::routes::metrics;
use crate::state::{AppState, MetricsFrame};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Subscribe { payload: SubscribePayload },
}

#[derive(Debug, Deserialize)]
struct SubscribePayload {
    channels: Vec<String>,
}

/// Upgrade the connection and hand it to [`handle_socket`].
pub async fn metrics_ws(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut subscriptions: HashSet<String> = HashSet::new();
    let mut rx = state.metrics_tx.subscribe();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(ClientFrame::Subscribe { payload }) = serde_json::from_str(&text) {
                            subscriptions = payload.channels.into_iter().collect();
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::debug!(target: "aegis.gateway", error = %err, "ws client read error");
                        break;
                    }
                }
            }
            broadcast_result = rx.recv() => {
                match broadcast_result {
                    Ok(frame) if subscriptions.contains(&frame.channel) => {
                        let body = serde_json::json!({
                            "type": "update",
                            "channel": frame.channel,
                            "payload": frame.payload,
                            "timestamp": chrono::Utc::now().timestamp_millis(),
                            "sequence": frame.sequence,
                        });
                        if let Ok(text) = serde_json::to_string(&body) {
                            if socket.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

/// Publish a metrics snapshot to every subscriber of `channel`. Per-client
/// send errors are swallowed at the connection-task level and never take
/// down the broadcaster.
pub fn broadcast(state: &AppState, channel: &str, payload: serde_json::Value) {
    let frame = MetricsFrame {
        channel: channel.to_string(),
        payload,
        sequence: state.next_sequence(),
    };
    // No subscribers is not an error: tokio::sync::broadcast::send returns
    // Err only when every receiver has been dropped.
    let _ = state.metrics_tx.send(frame);
}

/// Periodically broadcast the same snapshot `GET /api/v1/metrics` reports to
/// `metrics` channel subscribers, at least once per `interval`.
pub fn spawn_metrics_ticker(state: Arc<AppState>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let payload = metrics::snapshot(&state).await;
            broadcast(&state, "metrics", payload);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_audit::InMemoryAuditStorage;
    use aegis_auth::AuthService;
    use aegis_executor::{Executor, ExecutorConfig};
    use aegis_ratelimit::RateLimiter;
    use aegis_rbac::Rbac;
    use std::sync::Arc;

    fn state() -> Arc<AppState> {
        let rbac = Arc::new(Rbac::new());
        let rate_limiter = Arc::new(RateLimiter::default());
        let audit = Arc::new(aegis_audit::AuditChain::new(
            Arc::new(InMemoryAuditStorage::new()),
            b"ws-test-signing-key-long-enough!".to_vec(),
        ));
        let auth = Arc::new(AuthService::new(
            aegis_crypto::sha256_hex(b"admin"),
            "ws-test-token-signing-secret-32b".to_string(),
            Arc::clone(&rate_limiter),
            Arc::clone(&audit),
        ));
        let executor = Executor::new(ExecutorConfig::default(), Arc::clone(&rbac), Arc::clone(&rate_limiter), Arc::clone(&audit));
        Arc::new(AppState::new(rbac, auth, rate_limiter, audit, executor, vec![]))
    }

    #[test]
    fn sequence_numbers_are_strictly_monotonic_per_channel() {
        let state = state();
        let a = state.next_sequence();
        let b = state.next_sequence();
        let c = state.next_sequence();
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn broadcast_with_no_subscribers_does_not_panic() {
        let state = state();
        broadcast(&state, "metrics", serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn metrics_ticker_broadcasts_at_least_once_per_interval() {
        let state = state();
        let mut rx = state.metrics_tx.subscribe();
        let ticker = spawn_metrics_ticker(Arc::clone(&state), Duration::from_millis(10));

        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("ticker did not broadcast in time")
            .expect("channel closed unexpectedly");

        ticker.abort();
        assert_eq!(frame.channel, "metrics");
        assert!(frame.payload.get("executor").is_some());
    }
}
