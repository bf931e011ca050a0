//! Live delivery channel over WebSocket.
//!
//! One background task owns the socket:
//!   1. Connects (with the bearer token in the handshake, if configured)
//!   2. Joins the per-user room
//!   3. Decodes `new-notification` frames and fans them out to subscribers
//!   4. Reconnects with exponential backoff and re-joins when the socket drops
//!
//! Subscribers hold a `LiveSubscription`; dropping it detaches the listener.

use std::sync::Mutex;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        handshake::client::Request,
        http::{header::AUTHORIZATION, HeaderValue},
        Message,
    },
};
use tracing::{debug, info, warn};
use url::Url;

use super::types::{decode, Frame, Inbound, LiveEvent};
use crate::config::Config;
use crate::errors::{ClientError, Result};

const EVENT_BUFFER: usize = 256;

/// Everything the socket task needs to (re)connect.
#[derive(Debug, Clone)]
struct Target {
    url: Url,
    user_id: String,
    auth_token: Option<String>,
    reconnect_base: Duration,
    reconnect_max: Duration,
}

impl Target {
    fn request(&self) -> Result<Request> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(token) = &self.auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ClientError::Config(format!("invalid auth token: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Ok(request)
    }
}

/// Handle to the live connection task.
pub struct LiveConnection {
    /// Taken on close so subscribers see the channel end.
    events: Mutex<Option<broadcast::Sender<LiveEvent>>>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LiveConnection {
    /// Start the connection task for `user_id`. Fails with
    /// `UnsupportedEnvironment` when no websocket endpoint is configured.
    pub fn connect(config: &Config, user_id: &str) -> Result<Self> {
        let url = config.ws_url.clone().ok_or_else(|| {
            ClientError::UnsupportedEnvironment("no live channel endpoint configured".into())
        })?;
        if user_id.is_empty() {
            return Err(ClientError::Config("live channel requires a user id".into()));
        }

        let target = Target {
            url,
            user_id: user_id.to_string(),
            auth_token: config.auth_token.clone(),
            reconnect_base: config.reconnect_base,
            reconnect_max: config.reconnect_max,
        };
        // Fail fast on a token that can't be put in a header.
        target.request()?;

        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(target, events.clone(), shutdown_rx));

        Ok(Self {
            events: Mutex::new(Some(events)),
            shutdown,
            task: Mutex::new(Some(task)),
        })
    }

    /// Register a listener. Events emitted before this call are not replayed.
    pub fn subscribe(&self) -> LiveSubscription {
        let sender = self.events.lock().ok().and_then(|guard| guard.clone());
        let rx = match sender {
            Some(tx) => tx.subscribe(),
            None => broadcast::channel(1).1,
        };
        LiveSubscription { rx }
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Stop the task, closing the socket. No events are emitted afterwards.
    pub async fn close(&self) {
        let _ = self.shutdown.send(true);
        if let Ok(mut guard) = self.events.lock() {
            guard.take();
        }
        let handle = self.task.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "live channel task ended abnormally");
            }
        }
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Receiving end handed to one consumer.
pub struct LiveSubscription {
    rx: broadcast::Receiver<LiveEvent>,
}

impl LiveSubscription {
    /// Next event, or `None` once the connection is closed. A subscriber that
    /// falls behind gets `LiveEvent::Lagged` in place of the dropped events.
    pub async fn recv(&mut self) -> Option<LiveEvent> {
        match self.rx.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "live subscriber lagged, events dropped");
                Some(LiveEvent::Lagged { skipped })
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

// ── Connection task ───────────────────────────────────────────

enum SessionEnd {
    Shutdown,
    ConnectFailed(ClientError),
    /// The socket was up and then went away.
    Dropped(Option<ClientError>),
}

async fn run(
    target: Target,
    events: broadcast::Sender<LiveEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;
    let mut joined_before = false;

    loop {
        if *shutdown.borrow() {
            break;
        }

        match run_session(&target, &events, &mut shutdown, joined_before).await {
            SessionEnd::Shutdown => break,
            SessionEnd::ConnectFailed(e) => {
                attempt = attempt.saturating_add(1);
                warn!(url = %target.url, attempt, error = %e, "live channel connect failed");
            }
            SessionEnd::Dropped(err) => {
                joined_before = true;
                attempt = 0;
                let _ = events.send(LiveEvent::Disconnected);
                match err {
                    Some(e) => warn!(url = %target.url, error = %e, "live channel dropped"),
                    None => info!(url = %target.url, "live channel closed by server"),
                }
            }
        }

        let delay = backoff_delay(target.reconnect_base, target.reconnect_max, attempt);
        debug!(delay_ms = delay.as_millis() as u64, "live channel reconnecting");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    debug!(url = %target.url, "live channel task stopped");
}

async fn run_session(
    target: &Target,
    events: &broadcast::Sender<LiveEvent>,
    shutdown: &mut watch::Receiver<bool>,
    reconnect: bool,
) -> SessionEnd {
    let request = match target.request() {
        Ok(r) => r,
        Err(e) => return SessionEnd::ConnectFailed(e),
    };

    let ws = tokio::select! {
        res = connect_async(request) => match res {
            Ok((ws, _resp)) => ws,
            Err(e) => return SessionEnd::ConnectFailed(e.into()),
        },
        _ = shutdown.changed() => return SessionEnd::Shutdown,
    };

    let (mut sink, mut stream) = ws.split();

    let join = match serde_json::to_string(&Frame::join(&target.user_id)) {
        Ok(j) => j,
        Err(e) => return SessionEnd::ConnectFailed(ClientError::Internal(e.into())),
    };
    if let Err(e) = sink.send(Message::Text(join)).await {
        return SessionEnd::ConnectFailed(e.into());
    }

    info!(url = %target.url, user_id = %target.user_id, reconnect, "live channel joined");
    let _ = events.send(LiveEvent::Connected { reconnect });

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
                return SessionEnd::Shutdown;
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => forward(&text, events),
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(e) = sink.send(Message::Pong(payload)).await {
                        return SessionEnd::Dropped(Some(e.into()));
                    }
                }
                Some(Ok(Message::Close(_))) | None => return SessionEnd::Dropped(None),
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Dropped(Some(e.into())),
            }
        }
    }
}

fn forward(text: &str, events: &broadcast::Sender<LiveEvent>) {
    match decode(text) {
        Ok(Inbound::Notification(n)) => {
            debug!(notification_id = %n.id, "live notification received");
            let _ = events.send(LiveEvent::Notification(n));
        }
        Ok(Inbound::Ignored(event)) => debug!(event = %event, "ignoring live event"),
        Err(e) => warn!(error = %e, "rejected live payload"),
    }
}

/// `base * 2^attempt`, capped at `max`, plus up to `base / 2` of jitter.
fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let base_ms = base.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    let raw = base_ms.saturating_mul(1u64 << attempt.min(16));
    let capped = raw.min(max_ms);
    let jitter = rand::thread_rng().gen_range(0..=base_ms / 2);
    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let base = Duration::from_millis(100);
        let max = Duration::from_millis(1_000);
        let d0 = backoff_delay(base, max, 0);
        assert!(d0 >= Duration::from_millis(100) && d0 <= Duration::from_millis(150));
        let d3 = backoff_delay(base, max, 3);
        assert!(d3 >= Duration::from_millis(800) && d3 <= Duration::from_millis(850));
        let d10 = backoff_delay(base, max, 10);
        assert!(d10 >= max && d10 <= Duration::from_millis(1_050));
    }

    #[test]
    fn test_backoff_zero_base() {
        assert_eq!(
            backoff_delay(Duration::ZERO, Duration::from_secs(1), 5),
            Duration::ZERO
        );
    }

    #[tokio::test]
    async fn test_slow_subscriber_is_told_it_lagged() {
        let (tx, rx) = broadcast::channel(2);
        let mut sub = LiveSubscription { rx };
        for _ in 0..4 {
            tx.send(LiveEvent::Disconnected).unwrap();
        }
        assert_eq!(sub.recv().await, Some(LiveEvent::Lagged { skipped: 2 }));
        assert_eq!(sub.recv().await, Some(LiveEvent::Disconnected));
        assert_eq!(sub.recv().await, Some(LiveEvent::Disconnected));
        drop(tx);
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_connect_without_ws_url_is_unsupported() {
        let cfg = Config::new("http://localhost:3000", "u1").unwrap();
        let err = LiveConnection::connect(&cfg, "u1").err().unwrap();
        assert!(matches!(err, ClientError::UnsupportedEnvironment(_)));
    }

    #[tokio::test]
    async fn test_connect_requires_user_id() {
        let cfg = Config::new("http://localhost:3000", "")
            .unwrap()
            .with_ws_url("ws://127.0.0.1:9/socket")
            .unwrap();
        let err = LiveConnection::connect(&cfg, "").err().unwrap();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_request_carries_bearer_token() {
        let target = Target {
            url: Url::parse("ws://127.0.0.1:9/socket").unwrap(),
            user_id: "u1".into(),
            auth_token: Some("tok".into()),
            reconnect_base: Duration::from_millis(10),
            reconnect_max: Duration::from_millis(10),
        };
        let req = target.request().unwrap();
        assert_eq!(req.headers().get(AUTHORIZATION).unwrap(), "Bearer tok");
    }
}
