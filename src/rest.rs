use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::backend::{OrderBackend, ORDERS_TABLE};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::models::{NewOrder, Order, OrderStatus, SiteSetting, SiteSettings};

const SITE_SETTINGS_TABLE: &str = "site_settings";

/// Client for the backend's REST query API (PostgREST dialect).
pub struct RestApi {
    rest_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl RestApi {
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout))
            .build()?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: &StoreConfig, client: reqwest::Client) -> Self {
        Self {
            rest_url: config.rest_url(),
            api_key: config.api_key.clone(),
            client,
        }
    }

    pub fn rest_url(&self) -> &str {
        &self.rest_url
    }

    fn auth_headers(&self) -> StoreResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|e| StoreError::Config(format!("invalid API key: {}", e)))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| StoreError::Config(format!("invalid API key: {}", e)))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        Ok(headers)
    }

    fn build_table_url(&self, table: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}/{}", self.rest_url, table)
        } else {
            format!("{}/{}?{}", self.rest_url, table, query)
        }
    }

    fn build_id_filter(id: &str) -> String {
        format!("id=eq.{}", urlencoding::encode(id))
    }

    async fn send(&self, request: RequestBuilder) -> StoreResult<Response> {
        let response = request.headers(self.auth_headers()?).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(api_error(status.as_u16(), &body))
    }

    async fn fetch_rows<T: DeserializeOwned>(&self, table: &str, query: &str) -> StoreResult<Vec<T>> {
        let url = self.build_table_url(table, query);
        let response = self.send(self.client.get(&url)).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Site-wide settings. Read once per session, so transient failures are
    /// retried a few times before giving up.
    pub async fn site_settings(&self) -> StoreResult<SiteSettings> {
        let rows: Vec<SiteSetting> = crate::utils::retry(3, 500, || {
            self.fetch_rows(SITE_SETTINGS_TABLE, "select=*&order=id.asc")
        })
        .await?;
        tracing::debug!(rows = rows.len(), "loaded site settings");
        Ok(SiteSettings::from_rows(&rows))
    }
}

#[async_trait]
impl OrderBackend for RestApi {
    async fn list_orders(&self) -> StoreResult<Vec<Order>> {
        self.fetch_rows(ORDERS_TABLE, "select=*&order=created_at.desc").await
    }

    async fn get_order(&self, id: &str) -> StoreResult<Option<Order>> {
        let query = format!("select=*&{}&limit=1", Self::build_id_filter(id));
        let mut rows: Vec<Order> = self.fetch_rows(ORDERS_TABLE, &query).await?;
        Ok(if rows.is_empty() { None } else { Some(rows.swap_remove(0)) })
    }

    async fn insert_order(&self, order: &NewOrder<'_>) -> StoreResult<Order> {
        let url = self.build_table_url(ORDERS_TABLE, "select=*");
        let request = self
            .client
            .post(&url)
            .header("Prefer", "return=representation")
            .json(order);
        let body = self.send(request).await?.text().await?;
        // return=representation yields an array with the inserted row
        let mut rows: Vec<Order> = serde_json::from_str(&body)?;
        if rows.is_empty() {
            return Err(StoreError::NotFound("inserted order was not returned".to_string()));
        }
        Ok(rows.swap_remove(0))
    }

    async fn update_order_status(&self, id: &str, status: OrderStatus) -> StoreResult<()> {
        let url = self.build_table_url(ORDERS_TABLE, &Self::build_id_filter(id));
        let request = self
            .client
            .patch(&url)
            .header("Prefer", "return=minimal")
            .json(&serde_json::json!({ "status": status }));
        self.send(request).await?;
        Ok(())
    }
}

/// Turn an error response into [`StoreError::Api`], preferring the JSON
/// `message` field over the raw body.
fn api_error(status: u16, body: &str) -> StoreError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                "empty response body".to_string()
            } else {
                body.trim().to_string()
            }
        });
    StoreError::Api { status, message }
}
