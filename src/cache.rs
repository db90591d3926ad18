use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::models::Order;

/// Point-in-time dump of the order list, as written by `list --export`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrdersExport {
    pub exported_at: DateTime<Utc>,
    pub count: usize,
    pub orders: Vec<Order>,
}

impl OrdersExport {
    pub fn new(orders: Vec<Order>) -> Self {
        Self {
            exported_at: Utc::now(),
            count: orders.len(),
            orders,
        }
    }
}

/// Save a serializable object to a pretty-printed JSON file.
pub fn save_to_file<T: Serialize>(data: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create snapshot file {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), data)
        .with_context(|| format!("Failed to write snapshot to {}", path.display()))?;
    Ok(())
}

/// Load a deserializable object from a JSON file.
pub fn load_from_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))
}
