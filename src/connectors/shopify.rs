//! Shopify Admin REST connector.
//!
//! # Design Decisions
//! - The API base is derived from the stored shop domain; the
//!   `*.myshopify.com` allow-list keeps it from pointing anywhere else
//! - Requests authenticate with the `X-Shopify-Access-Token` header
//! - Pagination follows `Link: <...>; rel="next"`; every next URL goes
//!   through SSRF validation like any other target
//! - Webhook signatures are accepted hex or base64 encoded

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::connectors::context::ConnectorContext;
use crate::connectors::order::{Order, OrderItem, OrderStatus};
use crate::connectors::transport::OutboundRequest;
use crate::connectors::{auth_outcome, PlatformConnector};
use crate::error::{GatewayError, GatewayResult};
use crate::platform::Platform;
use crate::security::vault::Credentials;
use crate::security::webhook::{verify_signature, verify_signature_base64};

const ACCESS_TOKEN_HEADER: &str = "x-shopify-access-token";
const DEFAULT_LOOKBACK_DAYS: i64 = 7;

#[derive(Debug, Deserialize)]
struct OrdersPage {
    #[serde(default)]
    orders: Vec<ShopifyOrder>,
}

#[derive(Debug, Deserialize)]
struct ShopifyOrder {
    id: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    financial_status: Option<String>,
    #[serde(default)]
    fulfillment_status: Option<String>,
    #[serde(default)]
    cancelled_at: Option<String>,
    #[serde(default)]
    currency: String,
    #[serde(default)]
    total_price: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    customer: Option<Customer>,
    #[serde(default)]
    line_items: Vec<LineItem>,
}

#[derive(Debug, Deserialize)]
struct Customer {
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LineItem {
    #[serde(default)]
    sku: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    quantity: u32,
    #[serde(default)]
    price: String,
}

fn map_status(order: &ShopifyOrder) -> OrderStatus {
    if order.cancelled_at.is_some() {
        return OrderStatus::Cancelled;
    }
    let financial = order.financial_status.as_deref().unwrap_or_default();
    if matches!(financial, "refunded" | "partially_refunded") {
        return OrderStatus::Returned;
    }
    match order.fulfillment_status.as_deref() {
        Some("fulfilled") => OrderStatus::Shipped,
        Some("partial") => OrderStatus::Processing,
        _ if matches!(financial, "pending" | "authorized") => OrderStatus::Pending,
        _ if financial == "paid" => OrderStatus::Processing,
        _ => OrderStatus::Unknown,
    }
}

/// `financial/fulfillment` as reported, e.g. `paid/unfulfilled`.
fn platform_status(order: &ShopifyOrder) -> String {
    if order.cancelled_at.is_some() {
        return "cancelled".to_string();
    }
    format!(
        "{}/{}",
        order.financial_status.as_deref().unwrap_or("unknown"),
        order.fulfillment_status.as_deref().unwrap_or("unfulfilled")
    )
}

/// Extract the `rel="next"` target from a `Link` header.
fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|p| p.trim().eq_ignore_ascii_case("rel=\"next\""));
        if !is_next {
            return None;
        }
        let target = target.trim();
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

pub struct ShopifyConnector {
    ctx: ConnectorContext,
}

impl ShopifyConnector {
    pub fn new(ctx: ConnectorContext) -> Self {
        Self { ctx }
    }

    fn api_url(&self, creds: &Credentials, path: &str) -> GatewayResult<Url> {
        let domain = creds.require("shop_domain")?.trim().trim_end_matches('/');
        let version = &self.ctx.config().api_version;
        self.ctx
            .validate_target(&format!("https://{domain}/admin/api/{version}{path}"))
    }

    fn authorized(&self, creds: &Credentials, request: OutboundRequest) -> GatewayResult<OutboundRequest> {
        Ok(request
            .header(ACCESS_TOKEN_HEADER, creds.require("access_token")?)
            .header("accept", "application/json"))
    }

    fn normalize(&self, order: ShopifyOrder) -> GatewayResult<Order> {
        let external_id = order.id.to_string();
        let total_minor = self.ctx.minor_amount(&external_id, "total_price", &order.total_price)?;
        let items = order
            .line_items
            .iter()
            .map(|item| {
                Ok(OrderItem {
                    sku: item.sku.clone().unwrap_or_default(),
                    name: item.title.clone(),
                    quantity: item.quantity,
                    unit_price_minor: self.ctx.minor_amount(&external_id, "line_items.price", &item.price)?,
                })
            })
            .collect::<GatewayResult<Vec<_>>>()?;
        let status = map_status(&order);
        let platform_status = platform_status(&order);
        let buyer_name = order.customer.as_ref().and_then(|c| {
            let name = format!(
                "{} {}",
                c.first_name.as_deref().unwrap_or_default(),
                c.last_name.as_deref().unwrap_or_default()
            );
            let name = name.trim();
            (!name.is_empty()).then(|| name.to_string())
        });
        Ok(Order {
            platform: Platform::Shopify,
            external_id,
            order_number: order.name,
            status,
            platform_status,
            currency: order.currency,
            total_minor,
            created_at: order.created_at,
            updated_at: order.updated_at,
            buyer_name,
            items,
        })
    }
}

#[async_trait]
impl PlatformConnector for ShopifyConnector {
    fn context(&self) -> &ConnectorContext {
        &self.ctx
    }

    async fn authenticate(&self, credentials: &Credentials) -> GatewayResult<bool> {
        if !self.validate_credentials(credentials) {
            tracing::warn!(platform = "shopify", "Credentials failed schema validation");
            return Ok(false);
        }
        let url = self.api_url(credentials, "/shop.json")?;
        let request = self.authorized(credentials, OutboundRequest::get(url))?;
        auth_outcome(self.ctx.send(request).await.map(|_| ()))
    }

    async fn fetch_orders(&self, since: Option<DateTime<Utc>>) -> GatewayResult<Vec<Order>> {
        let creds = self.ctx.credentials()?;
        let since = since.unwrap_or_else(|| Utc::now() - chrono::Duration::days(DEFAULT_LOOKBACK_DAYS));
        let limit = self.ctx.config().page_size.clamp(1, 250);

        let mut url = self.api_url(&creds, "/orders.json")?;
        url.query_pairs_mut()
            .append_pair("status", "any")
            .append_pair("limit", &limit.to_string())
            .append_pair(
                "updated_at_min",
                &since.to_rfc3339_opts(SecondsFormat::Secs, true),
            );

        let mut orders = Vec::new();
        loop {
            let request = self.authorized(&creds, OutboundRequest::get(url.clone()))?;
            let response = self.ctx.send(request).await?;
            let page: OrdersPage = self.ctx.decode(&response)?;
            for order in page.orders {
                orders.push(self.normalize(order)?);
            }

            let Some(next) = response.header("link").and_then(next_link) else {
                break;
            };
            let next = self.ctx.validate_target(&next)?;
            if next == url {
                break;
            }
            url = next;
        }

        tracing::debug!(platform = "shopify", count = orders.len(), "Fetched orders");
        Ok(orders)
    }

    async fn update_order_status(&self, order_id: &str, status: OrderStatus) -> GatewayResult<bool> {
        let action = match status {
            OrderStatus::Cancelled => "cancel",
            OrderStatus::Delivered => "close",
            _ => return Ok(false),
        };
        if order_id.is_empty() || !order_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(GatewayError::InvalidTarget(format!(
                "order id must be numeric: {order_id}"
            )));
        }
        let creds = self.ctx.credentials()?;
        let url = self.api_url(&creds, &format!("/orders/{order_id}/{action}.json"))?;
        let request = self.authorized(&creds, OutboundRequest::post_json(url, json!({}).to_string()))?;
        self.ctx.send(request).await?;
        tracing::info!(platform = "shopify", order_id = %order_id, status = %status, "Order status updated");
        Ok(true)
    }

    fn webhook_signature_header(&self) -> &'static str {
        "x-shopify-hmac-sha256"
    }

    fn webhook_secret_field(&self) -> &'static str {
        "api_secret"
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str, secret: &str) -> bool {
        verify_signature(payload, signature, secret)
            || verify_signature_base64(payload, signature, secret)
    }
}
