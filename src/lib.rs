//! # storefront-orders
//!
//! Client library for the ordering side of a small food/beverage storefront
//! whose data lives in a hosted Postgres backend (REST query API + realtime
//! change feed).
//!
//! ## Components
//!
//! | Module | Role |
//! |--------|------|
//! | [`models`] | Orders, cart/menu items, site settings |
//! | [`backend`] | `OrderBackend` / `ChangeFeed` contracts |
//! | [`rest`] | REST implementation of `OrderBackend` |
//! | [`realtime`] | Websocket implementation of `ChangeFeed` |
//! | [`sync`] | `OrderSync`: live, eventually-consistent order list |
//! | [`support`] | Floating support button placement and link |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use storefront_orders::{OrderSync, RealtimeFeed, RestApi, StoreConfig, SyncConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StoreConfig::from_env()?;
//!     let sync_config = SyncConfig::default();
//!
//!     let sync = OrderSync::new(Arc::new(RestApi::new(&config)?), sync_config.clone());
//!     let handle = sync.start(Arc::new(RealtimeFeed::new(&config, &sync_config)));
//!
//!     let mut updates = sync.subscribe();
//!     while updates.changed().await.is_ok() {
//!         let snapshot = updates.borrow().clone();
//!         println!("{} orders (loading: {})", snapshot.orders.len(), snapshot.loading);
//!     }
//!
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod realtime;
pub mod rest;
pub mod support;
pub mod sync;
pub mod utils;

pub use backend::{ChangeFeed, FeedEvent, OrderBackend, Subscription, SubscriptionStatus, TableFilter};
pub use cache::{load_from_file, save_to_file, OrdersExport};
pub use config::{StoreConfig, SyncConfig};
pub use error::{StoreError, StoreResult};
pub use models::{CartItem, CreateOrderData, MenuItem, Order, OrderStatus, SiteSettings};
pub use realtime::RealtimeFeed;
pub use rest::RestApi;
pub use sync::{ConnectionState, OrderSync, OrdersSnapshot, SyncHandle};
