//! Contracts the synchronization core needs from the hosted backend.
//!
//! [`OrderBackend`] is the query side (list, lookup, insert, update) and
//! [`ChangeFeed`] is the push side (row-level change notifications). The
//! REST and realtime clients implement them; tests substitute in-memory fakes.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::StoreResult;
use crate::models::{NewOrder, Order, OrderStatus};

pub const ORDERS_TABLE: &str = "orders";

#[async_trait]
pub trait OrderBackend: Send + Sync {
    /// All orders, newest `created_at` first.
    async fn list_orders(&self) -> StoreResult<Vec<Order>>;

    /// `Ok(None)` when no row has this id.
    async fn get_order(&self, id: &str) -> StoreResult<Option<Order>>;

    /// Insert and return the stored row.
    async fn insert_order(&self, order: &NewOrder<'_>) -> StoreResult<Order>;

    async fn update_order_status(&self, id: &str, status: OrderStatus) -> StoreResult<()>;
}

/// Which row events to listen for. `event` is `*`, `INSERT`, `UPDATE` or `DELETE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableFilter {
    pub event: String,
    pub schema: String,
    pub table: String,
}

impl TableFilter {
    /// Every event on `public.<table>`.
    pub fn all_events(table: &str) -> Self {
        Self {
            event: "*".to_string(),
            schema: "public".to_string(),
            table: table.to_string(),
        }
    }
}

/// Channel health as reported by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Subscribed,
    ChannelError,
    TimedOut,
    Closed,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Subscribed => "SUBSCRIBED",
            SubscriptionStatus::ChannelError => "CHANNEL_ERROR",
            SubscriptionStatus::TimedOut => "TIMED_OUT",
            SubscriptionStatus::Closed => "CLOSED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub table: String,
    /// Id of the affected row, when the payload carries one
    pub record_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Status(SubscriptionStatus),
    Change(ChangeEvent),
}

/// A live channel. Events arrive on `events`; dropping the subscription or
/// calling [`Subscription::unsubscribe`] releases the underlying channel.
pub struct Subscription {
    pub channel: String,
    events: mpsc::Receiver<FeedEvent>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(channel: impl Into<String>, events: mpsc::Receiver<FeedEvent>) -> Self {
        Self {
            channel: channel.into(),
            events,
            release: None,
        }
    }

    /// Attach a hook run exactly once when the subscription is released.
    pub fn on_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    /// Next event, or `None` once the feed side has gone away.
    pub async fn next(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        self.events.close();
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .finish()
    }
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open `channel` and start listening for `filter` events. The returned
    /// subscription reports its status (`Subscribed`, then possibly an error
    /// status) and change events in arrival order.
    async fn subscribe(&self, channel: &str, filter: &TableFilter) -> StoreResult<Subscription>;
}
