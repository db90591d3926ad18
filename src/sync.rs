//! Order synchronization
//!
//! [`OrderSync`] keeps an advisory, newest-first copy of the order table and
//! refreshes it through two independent channels once started:
//!
//! - a polling backstop that silently refetches on a fixed cadence, whatever
//!   the state of the change feed, and
//! - a change-feed subscription whose events each schedule a silent refetch
//!   after a short delay. Failed, timed-out or closed channels are released
//!   and re-opened under a fresh name after the reconnect delay.
//!
//! Refreshes are not serialized. When a poll and a change-triggered refresh
//! overlap, whichever response lands last is what the snapshot shows.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::{
    ChangeFeed, FeedEvent, OrderBackend, Subscription, SubscriptionStatus, TableFilter,
    ORDERS_TABLE,
};
use crate::config::SyncConfig;
use crate::error::StoreResult;
use crate::models::{sort_newest_first, CreateOrderData, NewOrder, Order, OrderStatus};
use crate::utils::channel_name;

pub const CHANNEL_PREFIX: &str = "orders_changes";

/// What presentation code renders.
#[derive(Debug, Clone, PartialEq)]
pub struct OrdersSnapshot {
    /// Newest first
    pub orders: Vec<Order>,
    /// True only while a non-silent fetch is in flight (and before the first one)
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for OrdersSnapshot {
    fn default() -> Self {
        Self {
            orders: Vec::new(),
            loading: true,
            error: None,
        }
    }
}

impl OrdersSnapshot {
    pub fn find(&self, id: &str) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == id)
    }
}

/// Change-feed subscription lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started
    Idle,
    Connecting,
    Subscribed,
    /// Waiting out the reconnect delay after the channel reported `cause`
    Reconnecting { cause: SubscriptionStatus },
    Stopped,
}

#[derive(Clone)]
pub struct OrderSync {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Arc<dyn OrderBackend>,
    config: SyncConfig,
    snapshot: watch::Sender<OrdersSnapshot>,
    connection: watch::Sender<ConnectionState>,
}

impl OrderSync {
    pub fn new(backend: Arc<dyn OrderBackend>, config: SyncConfig) -> Self {
        let (snapshot, _) = watch::channel(OrdersSnapshot::default());
        let (connection, _) = watch::channel(ConnectionState::Idle);
        Self {
            inner: Arc::new(Inner {
                backend,
                config,
                snapshot,
                connection,
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn snapshot(&self) -> OrdersSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Receiver notified on every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<OrdersSnapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.connection.borrow()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.subscribe()
    }

    fn set_connection(&self, state: ConnectionState) {
        self.inner.connection.send_replace(state);
    }

    /// Refetch every order. On failure the previous list is kept and the
    /// error message recorded. With `show_loading` the loading flag is raised
    /// for the duration of the request.
    pub async fn fetch_orders(&self, show_loading: bool) {
        if show_loading {
            self.inner.snapshot.send_modify(|s| s.loading = true);
        }

        match self.inner.backend.list_orders().await {
            Ok(mut orders) => {
                sort_newest_first(&mut orders);
                tracing::debug!(count = orders.len(), "orders refreshed");
                self.inner.snapshot.send_modify(|s| {
                    s.orders = orders;
                    s.error = None;
                    if show_loading {
                        s.loading = false;
                    }
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "error fetching orders");
                self.inner.snapshot.send_modify(|s| {
                    s.error = Some(e.to_string());
                    if show_loading {
                        s.loading = false;
                    }
                });
            }
        }
    }

    /// Point lookup. Failures are logged and reported as `None`, the same as
    /// a missing row.
    pub async fn fetch_order_by_id(&self, id: &str) -> Option<Order> {
        match self.inner.backend.get_order(id).await {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(order_id = id, error = %e, "error fetching order");
                None
            }
        }
    }

    /// Submit a new order as `pending`, then silently refresh the list.
    /// Returns the row from the insert response. Failures are returned.
    pub async fn create_order(&self, data: &CreateOrderData) -> StoreResult<Order> {
        let order = match self.inner.backend.insert_order(&NewOrder::from(data)).await {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(error = %e, "error creating order");
                return Err(e);
            }
        };
        tracing::info!(order_id = %order.id, total = order.total_price, "order created");

        self.fetch_orders(false).await;
        Ok(order)
    }

    /// Overwrite an order's status. Any status may replace any other.
    /// Returns false (after logging) when the update fails.
    pub async fn update_order_status(&self, id: &str, status: OrderStatus) -> bool {
        if let Err(e) = self.inner.backend.update_order_status(id, status).await {
            tracing::error!(order_id = id, %status, error = %e, "error updating order status");
            return false;
        }
        tracing::info!(order_id = id, %status, "order status updated");

        self.fetch_orders(false).await;
        true
    }

    /// Run the initial fetch and start polling and the change feed. Everything
    /// stops when the returned handle is shut down or dropped.
    pub fn start(&self, feed: Arc<dyn ChangeFeed>) -> SyncHandle {
        let shutdown = CancellationToken::new();

        let initial = {
            let sync = self.clone();
            tokio::spawn(async move { sync.fetch_orders(true).await })
        };
        let poller = tokio::spawn(self.clone().run_polling(shutdown.clone()));
        let listener = tokio::spawn(self.clone().run_subscription(feed, shutdown.clone()));

        SyncHandle {
            sync: self.clone(),
            shutdown,
            tasks: vec![initial, poller, listener],
        }
    }

    async fn run_polling(self, shutdown: CancellationToken) {
        let period = self.inner.config.poll_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    tracing::debug!("polling for new orders");
                    self.fetch_orders(false).await;
                }
            }
        }
    }

    async fn run_subscription(self, feed: Arc<dyn ChangeFeed>, shutdown: CancellationToken) {
        let filter = TableFilter::all_events(ORDERS_TABLE);

        loop {
            let channel = channel_name(CHANNEL_PREFIX);
            self.set_connection(ConnectionState::Connecting);

            let opened = tokio::select! {
                _ = shutdown.cancelled() => break,
                opened = feed.subscribe(&channel, &filter) => opened,
            };

            let cause = match opened {
                Ok(subscription) => match self.listen(subscription, &shutdown).await {
                    Some(cause) => cause,
                    None => break,
                },
                Err(e) => {
                    tracing::error!(channel = %channel, error = %e, "failed to open order change channel");
                    SubscriptionStatus::ChannelError
                }
            };

            match cause {
                SubscriptionStatus::ChannelError => tracing::error!(
                    delay_secs = self.inner.config.reconnect_delay.as_secs(),
                    "order change channel error, polling continues; reconnecting"
                ),
                _ => tracing::warn!(
                    status = cause.as_str(),
                    delay_secs = self.inner.config.reconnect_delay.as_secs(),
                    "order change channel lost, polling continues; reconnecting"
                ),
            }
            self.set_connection(ConnectionState::Reconnecting { cause });

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.inner.config.reconnect_delay) => {}
            }
        }

        self.set_connection(ConnectionState::Stopped);
    }

    /// Pump one subscription until it is disrupted (returning the cause) or
    /// shutdown is requested (returning `None`). The subscription is released
    /// either way.
    async fn listen(
        &self,
        mut subscription: Subscription,
        shutdown: &CancellationToken,
    ) -> Option<SubscriptionStatus> {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(channel = %subscription.channel, "unsubscribing from order changes");
                    subscription.unsubscribe();
                    return None;
                }
                event = subscription.next() => event,
            };

            match event {
                Some(FeedEvent::Status(SubscriptionStatus::Subscribed)) => {
                    tracing::info!(channel = %subscription.channel, "subscribed to order changes");
                    self.set_connection(ConnectionState::Subscribed);
                }
                Some(FeedEvent::Status(status)) => return Some(status),
                Some(FeedEvent::Change(change)) => {
                    tracing::info!(
                        kind = ?change.kind,
                        order_id = change.record_id.as_deref().unwrap_or("-"),
                        "order change detected"
                    );
                    self.defer_refresh(shutdown.clone());
                }
                None => return Some(SubscriptionStatus::Closed),
            }
        }
    }

    /// Silent refresh after the change delay. Each event gets its own timer.
    fn defer_refresh(&self, shutdown: CancellationToken) {
        let sync = self.clone();
        let delay = self.inner.config.change_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => sync.fetch_orders(false).await,
            }
        });
    }
}

/// Owns the background tasks started by [`OrderSync::start`].
pub struct SyncHandle {
    sync: OrderSync,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncHandle {
    pub fn sync(&self) -> &OrderSync {
        &self.sync
    }

    /// Stop polling, cancel pending reconnects and deferred refreshes, release
    /// the subscription and wait for the tasks to finish. Requests already in
    /// flight are allowed to complete.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
