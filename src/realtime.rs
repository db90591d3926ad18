//! Realtime change feed over the backend's Phoenix-channel websocket.
//!
//! One socket per subscription:
//! 1. Connect and send `phx_join` for `realtime:<channel>` with the
//!    `postgres_changes` filter
//! 2. `phx_reply` ok → Subscribed, error → ChannelError
//! 3. Forward `postgres_changes` frames as change events
//! 4. Heartbeat on the `phoenix` topic
//! 5. Stop on the first error status, join timeout, close frame or release

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::backend::{
    ChangeEvent, ChangeFeed, ChangeKind, FeedEvent, Subscription, SubscriptionStatus, TableFilter,
};
use crate::config::{StoreConfig, SyncConfig};
use crate::error::StoreResult;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENT_BUFFER: usize = 64;
const JOIN_REF: &str = "1";

/// A Phoenix channel frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhoenixFrame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixFrame {
    pub fn join(topic: &str, filter: &TableFilter, access_token: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event: "phx_join".to_string(),
            payload: json!({
                "config": {
                    "broadcast": { "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [filter],
                },
                "access_token": access_token,
            }),
            reference: Some(JOIN_REF.to_string()),
            join_ref: Some(JOIN_REF.to_string()),
        }
    }

    pub fn leave(topic: &str, reference: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: "phx_leave".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
            join_ref: Some(JOIN_REF.to_string()),
        }
    }

    pub fn heartbeat(reference: u64) -> Self {
        Self {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
            join_ref: None,
        }
    }

    fn to_message(&self) -> StoreResult<Message> {
        Ok(Message::Text(serde_json::to_string(self)?.into()))
    }
}

/// Map an incoming frame for `topic` onto a feed event. Frames for other
/// topics, heartbeat replies and informational system messages yield `None`.
pub fn interpret_frame(frame: &PhoenixFrame, topic: &str) -> Option<FeedEvent> {
    if frame.topic != topic {
        return None;
    }
    match frame.event.as_str() {
        "phx_reply" if frame.reference.as_deref() == Some(JOIN_REF) => {
            match frame.payload.get("status").and_then(Value::as_str) {
                Some("ok") => Some(FeedEvent::Status(SubscriptionStatus::Subscribed)),
                _ => Some(FeedEvent::Status(SubscriptionStatus::ChannelError)),
            }
        }
        "phx_error" => Some(FeedEvent::Status(SubscriptionStatus::ChannelError)),
        "phx_close" => Some(FeedEvent::Status(SubscriptionStatus::Closed)),
        "system" => match frame.payload.get("status").and_then(Value::as_str) {
            Some("error") => Some(FeedEvent::Status(SubscriptionStatus::ChannelError)),
            _ => None,
        },
        "postgres_changes" => {
            let data = frame.payload.get("data")?;
            let kind = ChangeKind::parse(data.get("type")?.as_str()?)?;
            let table = data
                .get("table")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let record_id = ["record", "old_record"]
                .iter()
                .filter_map(|key| data.get(*key)?.get("id"))
                .find_map(|id| match id {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                });
            Some(FeedEvent::Change(ChangeEvent {
                kind,
                table,
                record_id,
            }))
        }
        _ => None,
    }
}

/// [`ChangeFeed`] backed by the realtime websocket service.
pub struct RealtimeFeed {
    url: String,
    api_key: String,
    join_timeout: Duration,
    heartbeat_interval: Duration,
}

impl RealtimeFeed {
    pub fn new(config: &StoreConfig, sync: &SyncConfig) -> Self {
        Self::with_url(config.realtime_url(), &config.api_key, sync)
    }

    /// Connect to an explicit websocket endpoint instead of the one derived
    /// from the store URL.
    pub fn with_url(url: impl Into<String>, api_key: &str, sync: &SyncConfig) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.to_string(),
            join_timeout: sync.join_timeout,
            heartbeat_interval: sync.heartbeat_interval,
        }
    }
}

#[async_trait]
impl ChangeFeed for RealtimeFeed {
    async fn subscribe(&self, channel: &str, filter: &TableFilter) -> StoreResult<Subscription> {
        let (ws, _) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
        let topic = format!("realtime:{}", channel);
        let join = PhoenixFrame::join(&topic, filter, &self.api_key);

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let release = CancellationToken::new();
        let session = ChannelSession {
            topic,
            join_timeout: self.join_timeout,
            heartbeat_interval: self.heartbeat_interval,
            events: tx,
            release: release.clone(),
        };
        tracing::debug!(channel, "opening realtime channel");
        tokio::spawn(session.run(ws, join));

        Ok(Subscription::new(channel, rx).on_release(move || release.cancel()))
    }
}

struct ChannelSession {
    topic: String,
    join_timeout: Duration,
    heartbeat_interval: Duration,
    events: mpsc::Sender<FeedEvent>,
    release: CancellationToken,
}

impl ChannelSession {
    async fn run(self, ws: WsStream, join: PhoenixFrame) {
        let (mut sink, mut stream) = ws.split();

        let sent = match join.to_message() {
            Ok(msg) => sink.send(msg).await.is_ok(),
            Err(e) => {
                tracing::warn!("failed to encode join frame: {e}");
                false
            }
        };
        if !sent {
            let _ = self
                .events
                .send(FeedEvent::Status(SubscriptionStatus::ChannelError))
                .await;
            return;
        }

        let mut next_ref: u64 = 2;
        let mut joined = false;
        let join_deadline = Instant::now() + self.join_timeout;
        let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
        heartbeat.tick().await; // skip immediate tick

        loop {
            let step = tokio::select! {
                _ = self.release.cancelled() => {
                    if let Ok(msg) = PhoenixFrame::leave(&self.topic, next_ref).to_message() {
                        let _ = sink.send(msg).await;
                    }
                    let _ = sink.close().await;
                    tracing::debug!(topic = %self.topic, "realtime channel released");
                    return;
                }

                _ = tokio::time::sleep_until(join_deadline), if !joined => {
                    Step::Fail(SubscriptionStatus::TimedOut)
                }

                _ = heartbeat.tick() => {
                    let sent = match PhoenixFrame::heartbeat(next_ref).to_message() {
                        Ok(msg) => sink.send(msg).await.is_ok(),
                        Err(_) => false,
                    };
                    if sent {
                        next_ref += 1;
                        Step::Continue
                    } else {
                        tracing::warn!("realtime heartbeat failed");
                        Step::Fail(SubscriptionStatus::ChannelError)
                    }
                }

                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.on_text(text.as_str(), &mut joined).await,
                    Some(Ok(Message::Close(_))) | None => Step::Fail(SubscriptionStatus::Closed),
                    Some(Err(e)) => {
                        tracing::warn!("realtime socket error: {e}");
                        Step::Fail(SubscriptionStatus::ChannelError)
                    }
                    _ => Step::Continue,
                },
            };

            match step {
                Step::Continue => {}
                Step::Stop => break,
                Step::Fail(status) => {
                    let _ = self.events.send(FeedEvent::Status(status)).await;
                    break;
                }
            }
        }
        let _ = sink.close().await;
    }

    /// Forward a text frame. Any status other than `Subscribed` ends the session.
    async fn on_text(&self, text: &str, joined: &mut bool) -> Step {
        let frame = match serde_json::from_str::<PhoenixFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("ignoring malformed realtime frame: {e}");
                return Step::Continue;
            }
        };
        let Some(event) = interpret_frame(&frame, &self.topic) else {
            return Step::Continue;
        };
        let terminal = match event {
            FeedEvent::Status(SubscriptionStatus::Subscribed) => {
                *joined = true;
                false
            }
            FeedEvent::Status(_) => true,
            FeedEvent::Change(_) => false,
        };
        if self.events.send(event).await.is_err() || terminal {
            return Step::Stop;
        }
        Step::Continue
    }
}

enum Step {
    Continue,
    /// Subscriber gone or terminal status already forwarded
    Stop,
    /// Forward this status, then end the session
    Fail(SubscriptionStatus),
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPIC: &str = "realtime:orders_changes_1700000000000";

    fn frame(event: &str, payload: Value, reference: Option<&str>) -> PhoenixFrame {
        PhoenixFrame {
            topic: TOPIC.to_string(),
            event: event.to_string(),
            payload,
            reference: reference.map(String::from),
            join_ref: None,
        }
    }

    #[test]
    fn test_join_frame_carries_filter() {
        let join = PhoenixFrame::join(TOPIC, &TableFilter::all_events("orders"), "anon");
        let encoded = serde_json::to_value(&join).unwrap();
        assert_eq!(encoded["event"], "phx_join");
        assert_eq!(encoded["ref"], "1");
        assert_eq!(
            encoded["payload"]["config"]["postgres_changes"][0],
            json!({"event": "*", "schema": "public", "table": "orders"})
        );
        assert_eq!(encoded["payload"]["access_token"], "anon");
    }

    #[test]
    fn test_join_reply_statuses() {
        let ok = frame("phx_reply", json!({"status": "ok", "response": {}}), Some("1"));
        assert_eq!(
            interpret_frame(&ok, TOPIC),
            Some(FeedEvent::Status(SubscriptionStatus::Subscribed))
        );

        let err = frame("phx_reply", json!({"status": "error"}), Some("1"));
        assert_eq!(
            interpret_frame(&err, TOPIC),
            Some(FeedEvent::Status(SubscriptionStatus::ChannelError))
        );

        // replies to heartbeats and leaves are not join replies
        let other = frame("phx_reply", json!({"status": "ok"}), Some("7"));
        assert_eq!(interpret_frame(&other, TOPIC), None);
    }

    #[test]
    fn test_close_and_system_errors() {
        assert_eq!(
            interpret_frame(&frame("phx_close", json!({}), None), TOPIC),
            Some(FeedEvent::Status(SubscriptionStatus::Closed))
        );
        assert_eq!(
            interpret_frame(
                &frame("system", json!({"status": "error", "extension": "postgres_changes"}), None),
                TOPIC
            ),
            Some(FeedEvent::Status(SubscriptionStatus::ChannelError))
        );
        assert_eq!(
            interpret_frame(&frame("system", json!({"status": "ok"}), None), TOPIC),
            None
        );
    }

    #[test]
    fn test_postgres_change_frames() {
        let insert = frame(
            "postgres_changes",
            json!({"data": {"type": "INSERT", "table": "orders", "record": {"id": "abc"}}}),
            None,
        );
        assert_eq!(
            interpret_frame(&insert, TOPIC),
            Some(FeedEvent::Change(ChangeEvent {
                kind: ChangeKind::Insert,
                table: "orders".into(),
                record_id: Some("abc".into()),
            }))
        );

        let delete = frame(
            "postgres_changes",
            json!({"data": {"type": "DELETE", "table": "orders", "record": {}, "old_record": {"id": 9}}}),
            None,
        );
        match interpret_frame(&delete, TOPIC) {
            Some(FeedEvent::Change(change)) => {
                assert_eq!(change.kind, ChangeKind::Delete);
                assert_eq!(change.record_id.as_deref(), Some("9"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_other_topics_ignored() {
        let mut foreign = frame("phx_close", json!({}), None);
        foreign.topic = "realtime:something_else".into();
        assert_eq!(interpret_frame(&foreign, TOPIC), None);
    }

    // Session tests run a websocket server on a loopback port.

    const CHANNEL: &str = "orders_changes_1";
    const CHANNEL_TOPIC: &str = "realtime:orders_changes_1";

    type ServerSocket = WebSocketStream<TcpStream>;

    async fn open_session(config: SyncConfig) -> (Subscription, ServerSocket, PhoenixFrame) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio_tungstenite::accept_async(stream).await.unwrap()
        });

        let feed = RealtimeFeed::with_url(url, "anon", &config);
        let subscription = feed
            .subscribe(CHANNEL, &TableFilter::all_events("orders"))
            .await
            .unwrap();
        let mut ws = server.await.unwrap();
        let join = read_frame(&mut ws).await;
        (subscription, ws, join)
    }

    async fn read_frame(ws: &mut ServerSocket) -> PhoenixFrame {
        let read = async {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => {
                        return serde_json::from_str::<PhoenixFrame>(text.as_str()).unwrap()
                    }
                    Some(Ok(_)) => continue,
                    other => panic!("socket ended before a frame arrived: {:?}", other),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), read).await.unwrap()
    }

    async fn send_frame(ws: &mut ServerSocket, frame: PhoenixFrame) {
        ws.send(frame.to_message().unwrap()).await.unwrap();
    }

    async fn next_event(subscription: &mut Subscription) -> Option<FeedEvent> {
        tokio::time::timeout(Duration::from_secs(5), subscription.next())
            .await
            .unwrap()
    }

    fn join_ok() -> PhoenixFrame {
        PhoenixFrame {
            topic: CHANNEL_TOPIC.to_string(),
            event: "phx_reply".to_string(),
            payload: json!({"status": "ok", "response": {"postgres_changes": []}}),
            reference: Some("1".to_string()),
            join_ref: Some("1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_session_times_out_without_join_reply() {
        let config = SyncConfig::default().with_join_timeout(Duration::from_millis(100));
        let (mut subscription, _ws, join) = open_session(config).await;

        assert_eq!(join.event, "phx_join");
        assert_eq!(join.topic, CHANNEL_TOPIC);
        assert_eq!(
            next_event(&mut subscription).await,
            Some(FeedEvent::Status(SubscriptionStatus::TimedOut))
        );
        // session is over once the status is reported
        assert_eq!(next_event(&mut subscription).await, None);
    }

    #[tokio::test]
    async fn test_session_forwards_changes_until_close() {
        let (mut subscription, mut ws, _) = open_session(SyncConfig::default()).await;

        send_frame(&mut ws, join_ok()).await;
        assert_eq!(
            next_event(&mut subscription).await,
            Some(FeedEvent::Status(SubscriptionStatus::Subscribed))
        );

        send_frame(
            &mut ws,
            PhoenixFrame {
                topic: CHANNEL_TOPIC.to_string(),
                event: "postgres_changes".to_string(),
                payload: json!({"data": {"type": "UPDATE", "table": "orders", "record": {"id": "42"}}}),
                reference: None,
                join_ref: None,
            },
        )
        .await;
        assert_eq!(
            next_event(&mut subscription).await,
            Some(FeedEvent::Change(ChangeEvent {
                kind: ChangeKind::Update,
                table: "orders".into(),
                record_id: Some("42".into()),
            }))
        );

        ws.close(None).await.unwrap();
        assert_eq!(
            next_event(&mut subscription).await,
            Some(FeedEvent::Status(SubscriptionStatus::Closed))
        );
    }

    #[tokio::test]
    async fn test_join_rejection_is_channel_error() {
        let (mut subscription, mut ws, _) = open_session(SyncConfig::default()).await;

        let mut rejected = join_ok();
        rejected.payload = json!({"status": "error", "response": {"reason": "unauthorized"}});
        send_frame(&mut ws, rejected).await;

        assert_eq!(
            next_event(&mut subscription).await,
            Some(FeedEvent::Status(SubscriptionStatus::ChannelError))
        );
    }

    #[tokio::test]
    async fn test_release_sends_leave() {
        let (mut subscription, mut ws, _) = open_session(SyncConfig::default()).await;
        send_frame(&mut ws, join_ok()).await;
        assert_eq!(
            next_event(&mut subscription).await,
            Some(FeedEvent::Status(SubscriptionStatus::Subscribed))
        );

        subscription.unsubscribe();

        let leave = read_frame(&mut ws).await;
        assert_eq!(leave.event, "phx_leave");
        assert_eq!(leave.topic, CHANNEL_TOPIC);
        assert_eq!(leave.join_ref.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_heartbeats_use_phoenix_topic() {
        let config = SyncConfig::default().with_heartbeat_interval(Duration::from_millis(50));
        let (mut subscription, mut ws, _) = open_session(config).await;
        send_frame(&mut ws, join_ok()).await;
        assert_eq!(
            next_event(&mut subscription).await,
            Some(FeedEvent::Status(SubscriptionStatus::Subscribed))
        );

        let first = read_frame(&mut ws).await;
        assert_eq!(first.topic, "phoenix");
        assert_eq!(first.event, "heartbeat");
        assert_eq!(first.reference.as_deref(), Some("2"));

        let second = read_frame(&mut ws).await;
        assert_eq!(second.reference.as_deref(), Some("3"));
    }
}
