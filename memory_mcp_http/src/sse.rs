//! SSE fan-out for sessions.
//!
//! Each `GET /mcp` (or `GET /sse/`) connection becomes a [`Subscription`]: a
//! bounded channel whose sender lives in the session's connection set and
//! whose receiver backs the HTTP event stream. Delivery is best-effort. A
//! send that finds the receiver gone drops that connection without telling
//! anyone, and a send to a full channel drops the frame.
//!
//! Every subscription owns a heartbeat task that pushes a `ping` frame on a
//! fixed period. The task is cancelled when the connection is unsubscribed,
//! either because the client went away (the stream was dropped) or because
//! the session was force-closed.

use crate::session::{ConnectionId, Session, SessionRegistry};
use chrono::{SecondsFormat, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Frames buffered per connection before new frames are dropped.
pub const DEFAULT_CONNECTION_BUFFER: usize = 100;

pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A push frame: a JSON object tagged with a `type` discriminator.
///
/// ```
/// use memory_mcp_http::sse::SseEvent;
///
/// let event = SseEvent::new("progress").with("percent", 40);
/// assert_eq!(event.to_json(), r#"{"type":"progress","percent":40}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SseEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl SseEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            fields: Map::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// First frame on every new connection.
    pub fn connection(session_id: &str) -> Self {
        Self::new("connection")
            .with("sessionId", session_id)
            .with("timestamp", timestamp_now())
    }

    pub fn ping() -> Self {
        Self::new("ping").with("timestamp", timestamp_now())
    }

    /// Telemetry emitted after a `POST /mcp` on the session.
    pub fn request(method: Option<&str>, session_id: &str) -> Self {
        Self::new("request")
            .with("method", method.map(str::to_string))
            .with("sessionId", session_id)
            .with("timestamp", timestamp_now())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Sender half of a connection, stored in the session's connection set.
pub(crate) struct Subscriber {
    sender: mpsc::Sender<SseEvent>,
    heartbeat: CancellationToken,
}

/// Receiving end of one SSE connection.
///
/// Dropping the subscription unsubscribes it, so an HTTP stream built from
/// [`Subscription::into_stream`] cleans up as soon as the client disconnects.
pub struct Subscription {
    connection_id: ConnectionId,
    session: Arc<Session>,
    receiver: mpsc::Receiver<SseEvent>,
}

impl Subscription {
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    /// Next frame, or `None` once the connection has been closed.
    pub async fn recv(&mut self) -> Option<SseEvent> {
        self.receiver.recv().await
    }

    pub fn into_stream(self) -> impl Stream<Item = SseEvent> + Send + 'static {
        futures::stream::unfold(self, |mut subscription| async move {
            let event = subscription.receiver.recv().await?;
            Some((event, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if SseBroadcaster::detach(&self.session, self.connection_id) {
            info!(
                session_id = %self.session.id,
                connection_id = %self.connection_id,
                "SSE connection closed by client"
            );
        }
    }
}

/// Manages the push connections of every session.
pub struct SseBroadcaster {
    registry: Arc<SessionRegistry>,
    heartbeat_interval: Duration,
    connection_buffer: usize,
}

impl SseBroadcaster {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self::with_heartbeat(registry, DEFAULT_HEARTBEAT_INTERVAL)
    }

    pub fn with_heartbeat(registry: Arc<SessionRegistry>, heartbeat_interval: Duration) -> Self {
        Self {
            registry,
            heartbeat_interval,
            connection_buffer: DEFAULT_CONNECTION_BUFFER,
        }
    }

    /// Open a new connection on `session`.
    ///
    /// The `connection` frame is queued before this returns and the heartbeat
    /// task starts immediately. Subscribing to a session that has already been
    /// removed yields a subscription that ends after its first frame.
    pub fn subscribe(&self, session: &Arc<Session>) -> Subscription {
        let connection_id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(self.connection_buffer.max(1));
        let heartbeat = CancellationToken::new();

        // The channel is empty, so this cannot be full.
        let _ = sender.try_send(SseEvent::connection(&session.id));

        self.spawn_heartbeat(
            Arc::downgrade(session),
            connection_id,
            sender.downgrade(),
            heartbeat.clone(),
        );
        session
            .connections
            .insert(connection_id, Subscriber { sender, heartbeat });

        if session.is_closed() {
            // Lost the race with expiry.
            Self::detach(session, connection_id);
        } else {
            info!(
                session_id = %session.id,
                connection_id = %connection_id,
                connections = session.connection_count(),
                "SSE connection opened"
            );
        }

        Subscription {
            connection_id,
            session: Arc::clone(session),
            receiver,
        }
    }

    /// Remove one connection and stop its heartbeat. Returns false if the
    /// session or connection is unknown.
    pub fn unsubscribe(&self, session_id: &str, connection_id: ConnectionId) -> bool {
        match self.registry.get(session_id) {
            Some(session) => Self::detach(&session, connection_id),
            None => false,
        }
    }

    /// Deliver `event` to every connection of `session_id`. Returns how many
    /// connections accepted it.
    pub fn broadcast(&self, session_id: &str, event: SseEvent) -> usize {
        match self.registry.get(session_id) {
            Some(session) => self.broadcast_to(&session, event),
            None => 0,
        }
    }

    pub fn broadcast_to(&self, session: &Session, event: SseEvent) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();

        for entry in session.connections.iter() {
            match entry.value().sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        session_id = %session.id,
                        connection_id = %entry.key(),
                        event_type = %event.event_type,
                        "SSE connection buffer full, dropping frame"
                    );
                }
                Err(TrySendError::Closed(_)) => dead.push(*entry.key()),
            }
        }

        // Detach after the iterator has released its shard locks.
        for connection_id in dead {
            if Self::detach(session, connection_id) {
                debug!(
                    session_id = %session.id,
                    connection_id = %connection_id,
                    "Dropped dead SSE connection"
                );
            }
        }

        delivered
    }

    /// Force-close every connection of `session_id`.
    pub fn close_all(&self, session_id: &str) -> usize {
        match self.registry.get(session_id) {
            Some(session) => self.close_session(&session),
            None => 0,
        }
    }

    /// Force-close every connection of `session`. Each HTTP stream ends once
    /// its already-queued frames are drained.
    pub fn close_session(&self, session: &Session) -> usize {
        let ids: Vec<ConnectionId> = session.connections.iter().map(|e| *e.key()).collect();
        let closed = ids
            .into_iter()
            .filter(|id| Self::detach(session, *id))
            .count();
        if closed > 0 {
            info!(session_id = %session.id, closed = closed, "Closed SSE connections");
        }
        closed
    }

    pub(crate) fn detach(session: &Session, connection_id: ConnectionId) -> bool {
        match session.connections.remove(&connection_id) {
            Some((_, subscriber)) => {
                subscriber.heartbeat.cancel();
                true
            }
            None => false,
        }
    }

    fn spawn_heartbeat(
        &self,
        session: Weak<Session>,
        connection_id: ConnectionId,
        sender: mpsc::WeakSender<SseEvent>,
        cancel: CancellationToken,
    ) {
        let period = self.heartbeat_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(sender) = sender.upgrade() else { break };
                        match sender.try_send(SseEvent::ping()) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                debug!(connection_id = %connection_id, "Skipping heartbeat, buffer full");
                            }
                            Err(TrySendError::Closed(_)) => {
                                drop(sender);
                                if let Some(session) = session.upgrade() {
                                    SseBroadcaster::detach(&session, connection_id);
                                }
                                break;
                            }
                        }
                    }
                }
            }
            debug!(connection_id = %connection_id, "Heartbeat stopped");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn setup(heartbeat: Duration) -> (Arc<SessionRegistry>, SseBroadcaster) {
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = SseBroadcaster::with_heartbeat(Arc::clone(&registry), heartbeat);
        (registry, broadcaster)
    }

    async fn next(sub: &mut Subscription) -> SseEvent {
        tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("subscription closed")
    }

    #[test]
    fn event_serializes_type_first_with_fields() {
        let event = SseEvent::request(Some("tools/list"), "abc");
        let value: Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(value["type"], "request");
        assert_eq!(value["method"], "tools/list");
        assert_eq!(value["sessionId"], "abc");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn request_event_without_method_is_null() {
        let event = SseEvent::request(None, "abc");
        assert_eq!(event.get("method"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn subscribe_sends_connection_frame_first() {
        let (registry, broadcaster) = setup(DEFAULT_HEARTBEAT_INTERVAL);
        let session = registry.get_or_create(None);

        let mut sub = broadcaster.subscribe(&session);
        let frame = next(&mut sub).await;

        assert_eq!(frame.event_type, "connection");
        assert_eq!(frame.get("sessionId").and_then(Value::as_str), Some(session.id.as_str()));
        assert_eq!(session.connection_count(), 1);
        assert_eq!(sub.session_id(), session.id);
    }

    #[tokio::test]
    async fn broadcast_reaches_only_the_target_session() {
        let (registry, broadcaster) = setup(DEFAULT_HEARTBEAT_INTERVAL);
        let a = registry.get_or_create(None);
        let b = registry.get_or_create(None);

        let mut a1 = broadcaster.subscribe(&a);
        let mut a2 = broadcaster.subscribe(&a);
        let mut b1 = broadcaster.subscribe(&b);
        for sub in [&mut a1, &mut a2, &mut b1] {
            assert_eq!(next(sub).await.event_type, "connection");
        }

        let delivered = broadcaster.broadcast(&a.id, SseEvent::new("note").with("n", 1));
        assert_eq!(delivered, 2);

        assert_eq!(next(&mut a1).await.event_type, "note");
        assert_eq!(next(&mut a2).await.event_type, "note");
        assert!(
            tokio::time::timeout(Duration::from_millis(100), b1.recv())
                .await
                .is_err(),
            "other session must not receive the event"
        );
    }

    #[tokio::test]
    async fn broadcast_to_unknown_session_delivers_nothing() {
        let (_registry, broadcaster) = setup(DEFAULT_HEARTBEAT_INTERVAL);
        assert_eq!(broadcaster.broadcast("ghost", SseEvent::new("x")), 0);
    }

    #[tokio::test]
    async fn dropped_subscription_is_removed() {
        let (registry, broadcaster) = setup(DEFAULT_HEARTBEAT_INTERVAL);
        let session = registry.get_or_create(None);

        let sub = broadcaster.subscribe(&session);
        assert_eq!(session.connection_count(), 1);
        drop(sub);
        assert_eq!(session.connection_count(), 0);
    }

    #[tokio::test]
    async fn dead_connection_is_pruned_on_broadcast() {
        let (registry, broadcaster) = setup(DEFAULT_HEARTBEAT_INTERVAL);
        let session = registry.get_or_create(None);

        let mut live = broadcaster.subscribe(&session);
        assert_eq!(next(&mut live).await.event_type, "connection");

        // A subscriber whose transport is gone but was never unsubscribed.
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);
        session.connections.insert(
            Uuid::new_v4(),
            Subscriber {
                sender,
                heartbeat: CancellationToken::new(),
            },
        );
        assert_eq!(session.connection_count(), 2);

        assert_eq!(broadcaster.broadcast(&session.id, SseEvent::new("x")), 1);
        assert_eq!(session.connection_count(), 1);
        assert_eq!(next(&mut live).await.event_type, "x");
    }

    #[tokio::test]
    async fn unsubscribe_removes_connection() {
        let (registry, broadcaster) = setup(DEFAULT_HEARTBEAT_INTERVAL);
        let session = registry.get_or_create(None);

        let sub = broadcaster.subscribe(&session);
        assert!(broadcaster.unsubscribe(&session.id, sub.connection_id()));
        assert!(!broadcaster.unsubscribe(&session.id, sub.connection_id()));
        assert_eq!(session.connection_count(), 0);
    }

    #[tokio::test]
    async fn close_all_ends_every_stream() {
        let (registry, broadcaster) = setup(DEFAULT_HEARTBEAT_INTERVAL);
        let session = registry.get_or_create(None);

        let first = broadcaster.subscribe(&session).into_stream();
        let second = broadcaster.subscribe(&session).into_stream();
        assert_eq!(broadcaster.close_all(&session.id), 2);
        assert_eq!(session.connection_count(), 0);

        for stream in [first.boxed(), second.boxed()] {
            let frames: Vec<SseEvent> = tokio::time::timeout(Duration::from_secs(2), stream.collect())
                .await
                .expect("stream should end after close");
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0].event_type, "connection");
        }
    }

    #[tokio::test]
    async fn heartbeat_pings_until_unsubscribed() {
        let (registry, broadcaster) = setup(Duration::from_millis(20));
        let session = registry.get_or_create(None);

        let mut sub = broadcaster.subscribe(&session);
        assert_eq!(next(&mut sub).await.event_type, "connection");
        let ping = next(&mut sub).await;
        assert_eq!(ping.event_type, "ping");
        assert!(ping.get("timestamp").is_some());

        broadcaster.close_session(&session);
        // Drain whatever was queued before the close; the stream must then end.
        let drained = tokio::time::timeout(Duration::from_secs(2), async {
            while sub.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok(), "heartbeat kept the stream alive after close");
    }

    #[tokio::test]
    async fn subscribe_to_removed_session_ends_immediately() {
        let (registry, broadcaster) = setup(DEFAULT_HEARTBEAT_INTERVAL);
        let session = registry.get_or_create(None);
        let removed = registry.remove(&session.id).unwrap();

        let stream = broadcaster.subscribe(&removed).into_stream();
        let frames: Vec<SseEvent> = tokio::time::timeout(Duration::from_secs(2), stream.collect())
            .await
            .expect("stream should end");
        assert_eq!(frames.len(), 1);
        assert_eq!(removed.connection_count(), 0);
    }
}
