//! Lazada Open Platform connector.
//!
//! # Design Decisions
//! - System parameters `app_key`, `timestamp` (ms), `sign_method=sha256` and
//!   `access_token` ride in the query next to business parameters
//! - `sign` is the uppercase hex HMAC-SHA256 of the API path followed by
//!   every other parameter as `key + value`, sorted by key
//! - Any `code` other than `"0"` is an error, whatever the HTTP status
//! - Order listing is offset-paginated; items come from a second call

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::connectors::context::ConnectorContext;
use crate::connectors::order::{decimal_to_minor, float_to_minor, Order, OrderItem, OrderStatus};
use crate::connectors::transport::OutboundRequest;
use crate::connectors::{auth_outcome, PlatformConnector};
use crate::error::GatewayResult;
use crate::platform::Platform;
use crate::security::vault::Credentials;
use crate::security::webhook::hmac_sha256;

const SELLER_PATH: &str = "/seller/get";
const ORDERS_PATH: &str = "/orders/get";
const ORDERS_ITEMS_PATH: &str = "/orders/items/get";
const ORDER_ITEMS_PATH: &str = "/order/items/get";
const READY_TO_SHIP_PATH: &str = "/order/rts";
const CANCEL_PATH: &str = "/order/cancel";

/// Orders per item lookup.
const ITEMS_BATCH: usize = 50;
/// Default first-sync window.
const DEFAULT_LOOKBACK_DAYS: i64 = 7;
/// Cancellation reason "out of stock".
const CANCEL_REASON_ID: &str = "15";

const AUTH_CODES: &[&str] = &[
    "IllegalAccessToken",
    "MissingAccessToken",
    "InvalidAccessToken",
    "IncompleteSignature",
    "InvalidSignature",
    "AppKeyNotExist",
    "AppWhiteIpLimit",
];

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct OrdersPage {
    #[serde(default, rename = "countTotal")]
    count_total: u64,
    #[serde(default)]
    orders: Vec<LazadaOrder>,
}

#[derive(Debug, Deserialize)]
struct LazadaOrder {
    order_id: Value,
    #[serde(default)]
    order_number: Value,
    #[serde(default)]
    statuses: Vec<String>,
    #[serde(default)]
    price: Value,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    updated_at: String,
    #[serde(default)]
    customer_first_name: String,
    #[serde(default)]
    customer_last_name: String,
}

#[derive(Debug, Deserialize)]
struct OrderItems {
    order_id: Value,
    #[serde(default)]
    order_items: Vec<LazadaItem>,
}

#[derive(Debug, Deserialize)]
struct LazadaItem {
    #[serde(default)]
    order_item_id: Value,
    #[serde(default)]
    sku: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    item_price: Value,
    #[serde(default)]
    currency: String,
}

fn map_status(raw: &str) -> OrderStatus {
    match raw {
        "unpaid" | "pending" => OrderStatus::Pending,
        "packed" | "ready_to_ship" | "ready_to_ship_pending" | "repacked" => OrderStatus::Processing,
        "shipped" => OrderStatus::Shipped,
        "delivered" | "confirmed" => OrderStatus::Delivered,
        "canceled" | "cancelled" => OrderStatus::Cancelled,
        "returned" | "shipped_back" | "shipped_back_success" => OrderStatus::Returned,
        _ => OrderStatus::Unknown,
    }
}

/// Lazada sends ids as numbers or strings.
fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Amounts arrive as `"1,234.00"` strings or plain numbers.
fn amount_minor(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => decimal_to_minor(s),
        Value::Number(n) => n.as_f64().map(float_to_minor),
        _ => None,
    }
}

/// Timestamps look like `2024-01-05 10:15:00 +0800`.
fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S %z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|t| t.with_timezone(&Utc))
        .ok()
}

/// Uppercase hex HMAC-SHA256 of `path + k1v1k2v2...` over sorted params.
fn sign_request(app_secret: &str, path: &str, params: &BTreeMap<String, String>) -> GatewayResult<String> {
    let mut payload = String::from(path);
    for (key, value) in params {
        payload.push_str(key);
        payload.push_str(value);
    }
    let digest = hmac_sha256(app_secret.as_bytes(), &[payload.as_bytes()])?;
    Ok(hex::encode_upper(digest))
}

pub struct LazadaConnector {
    ctx: ConnectorContext,
}

impl LazadaConnector {
    pub fn new(ctx: ConnectorContext) -> Self {
        Self { ctx }
    }

    fn signed_url(
        &self,
        creds: &Credentials,
        path: &str,
        params: &[(&str, String)],
    ) -> GatewayResult<Url> {
        let app_secret = creds.require("app_secret")?;
        let mut all: BTreeMap<String, String> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        all.insert("app_key".into(), creds.require("app_key")?.to_string());
        all.insert("access_token".into(), creds.require("access_token")?.to_string());
        all.insert("timestamp".into(), Utc::now().timestamp_millis().to_string());
        all.insert("sign_method".into(), "sha256".into());
        let sign = sign_request(app_secret, path, &all)?;

        let mut url = self.ctx.endpoint(path)?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in &all {
                query.append_pair(key, value);
            }
            query.append_pair("sign", &sign);
        }
        Ok(url)
    }

    async fn call<T: DeserializeOwned>(&self, request: OutboundRequest) -> GatewayResult<Option<T>> {
        let response = self.ctx.send(request).await?;
        let envelope: Envelope<T> = self.ctx.decode(&response)?;
        if envelope.code == "0" {
            return Ok(envelope.data);
        }
        if AUTH_CODES.contains(&envelope.code.as_str()) {
            return Err(self.ctx.auth_error(envelope.code));
        }
        Err(self.ctx.api_error(envelope.code, envelope.message))
    }

    async fn call_data<T: DeserializeOwned>(&self, request: OutboundRequest) -> GatewayResult<T> {
        self.call(request)
            .await?
            .ok_or_else(|| self.ctx.decode_error("missing data object"))
    }

    async fn list_orders(
        &self,
        creds: &Credentials,
        since: DateTime<Utc>,
    ) -> GatewayResult<Vec<LazadaOrder>> {
        let limit = self.ctx.config().page_size.clamp(1, 100);
        let update_after = since.to_rfc3339_opts(SecondsFormat::Secs, false);
        let mut offset: u64 = 0;
        let mut orders = Vec::new();
        loop {
            let url = self.signed_url(
                creds,
                ORDERS_PATH,
                &[
                    ("update_after", update_after.clone()),
                    ("offset", offset.to_string()),
                    ("limit", limit.to_string()),
                    ("sort_by", "updated_at".to_string()),
                    ("sort_direction", "ASC".to_string()),
                ],
            )?;
            let page: OrdersPage = self.call_data(OutboundRequest::get(url)).await?;
            let received = page.orders.len() as u64;
            orders.extend(page.orders);
            offset += received;
            if received < u64::from(limit) || offset >= page.count_total {
                break;
            }
        }
        Ok(orders)
    }

    async fn items_by_order(
        &self,
        creds: &Credentials,
        order_ids: &[String],
    ) -> GatewayResult<HashMap<String, Vec<LazadaItem>>> {
        let mut items = HashMap::new();
        for batch in order_ids.chunks(ITEMS_BATCH) {
            let url = self.signed_url(
                creds,
                ORDERS_ITEMS_PATH,
                &[("order_ids", format!("[{}]", batch.join(",")))],
            )?;
            let groups: Vec<OrderItems> = self.call_data(OutboundRequest::get(url)).await?;
            for group in groups {
                items.insert(id_string(&group.order_id), group.order_items);
            }
        }
        Ok(items)
    }

    fn normalize(&self, order: LazadaOrder, items: Vec<LazadaItem>) -> GatewayResult<Order> {
        let external_id = id_string(&order.order_id);
        let amount = |field: &str, value: &Value| {
            amount_minor(value).ok_or_else(|| self.ctx.invalid_field(&external_id, field, value))
        };
        let time = |field: &str, raw: &str| {
            parse_time(raw).ok_or_else(|| self.ctx.invalid_field(&external_id, field, raw))
        };
        let total_minor = amount("price", &order.price)?;
        let created_at = time("created_at", &order.created_at)?;
        let updated_at = time("updated_at", &order.updated_at)?;
        // One row per unit.
        let rows = items
            .iter()
            .map(|item| {
                Ok(OrderItem {
                    sku: item.sku.clone(),
                    name: item.name.clone(),
                    quantity: 1,
                    unit_price_minor: amount("item_price", &item.item_price)?,
                })
            })
            .collect::<GatewayResult<Vec<_>>>()?;

        let platform_status = order.statuses.first().cloned().unwrap_or_default();
        let currency = items
            .iter()
            .map(|i| i.currency.clone())
            .find(|c| !c.is_empty())
            .unwrap_or_default();
        let buyer = format!("{} {}", order.customer_first_name, order.customer_last_name)
            .trim()
            .to_string();
        let order_number = match id_string(&order.order_number) {
            n if n.is_empty() => external_id.clone(),
            n => n,
        };
        Ok(Order {
            platform: Platform::Lazada,
            external_id,
            order_number,
            status: map_status(&platform_status),
            platform_status,
            currency,
            total_minor,
            created_at,
            updated_at,
            buyer_name: (!buyer.is_empty()).then_some(buyer),
            items: rows,
        })
    }
}

#[async_trait]
impl PlatformConnector for LazadaConnector {
    fn context(&self) -> &ConnectorContext {
        &self.ctx
    }

    async fn authenticate(&self, credentials: &Credentials) -> GatewayResult<bool> {
        if !self.validate_credentials(credentials) {
            tracing::warn!(platform = "lazada", "Credentials failed schema validation");
            return Ok(false);
        }
        let url = self.signed_url(credentials, SELLER_PATH, &[])?;
        auth_outcome(self.call::<Value>(OutboundRequest::get(url)).await.map(|_| ()))
    }

    async fn fetch_orders(&self, since: Option<DateTime<Utc>>) -> GatewayResult<Vec<Order>> {
        let creds = self.ctx.credentials()?;
        let since = since.unwrap_or_else(|| Utc::now() - chrono::Duration::days(DEFAULT_LOOKBACK_DAYS));

        let listed = self.list_orders(&creds, since).await?;
        let ids: Vec<String> = listed.iter().map(|o| id_string(&o.order_id)).collect();
        let mut items = self.items_by_order(&creds, &ids).await?;

        let orders = listed
            .into_iter()
            .map(|order| {
                let order_items = items.remove(&id_string(&order.order_id)).unwrap_or_default();
                self.normalize(order, order_items)
            })
            .collect::<GatewayResult<Vec<Order>>>()?;
        tracing::debug!(platform = "lazada", count = orders.len(), "Fetched orders");
        Ok(orders)
    }

    async fn update_order_status(&self, order_id: &str, status: OrderStatus) -> GatewayResult<bool> {
        if !matches!(status, OrderStatus::Shipped | OrderStatus::Cancelled) {
            return Ok(false);
        }
        let creds = self.ctx.credentials()?;
        let url = self.signed_url(&creds, ORDER_ITEMS_PATH, &[("order_id", order_id.to_string())])?;
        let items: Vec<LazadaItem> = self.call_data(OutboundRequest::get(url)).await?;
        let item_ids: Vec<String> = items.iter().map(|i| id_string(&i.order_item_id)).collect();
        if item_ids.is_empty() {
            return Err(self.ctx.api_error("no_items", format!("order {order_id} has no items")));
        }

        match status {
            OrderStatus::Shipped => {
                let url = self.signed_url(
                    &creds,
                    READY_TO_SHIP_PATH,
                    &[
                        ("order_item_ids", format!("[{}]", item_ids.join(","))),
                        ("delivery_type", "dropship".to_string()),
                    ],
                )?;
                self.call::<Value>(OutboundRequest::get(url).with_method(Method::POST))
                    .await?;
            }
            _ => {
                for item_id in &item_ids {
                    let url = self.signed_url(
                        &creds,
                        CANCEL_PATH,
                        &[
                            ("order_item_id", item_id.clone()),
                            ("reason_id", CANCEL_REASON_ID.to_string()),
                        ],
                    )?;
                    self.call::<Value>(OutboundRequest::get(url).with_method(Method::POST))
                        .await?;
                }
            }
        }
        tracing::info!(platform = "lazada", order_id = %order_id, status = %status, "Order status updated");
        Ok(true)
    }

    fn webhook_secret_field(&self) -> &'static str {
        "app_secret"
    }
}
