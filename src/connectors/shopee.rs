//! Shopee Open Platform (v2) connector.
//!
//! # Design Decisions
//! - Every call carries `partner_id`, `timestamp`, `shop_id` and `sign`
//!   query parameters; `sign` is the hex HMAC-SHA256 of
//!   `partner_id + path + timestamp + shop_id` under the partner key
//! - Business errors come back with HTTP 200 in the body `error` field
//! - Order listing returns only order numbers; details are fetched in
//!   batches of 50
//! - The order list window is capped at 15 days

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::connectors::context::ConnectorContext;
use crate::connectors::order::{micro_to_minor, Order, OrderItem, OrderStatus};
use crate::connectors::transport::OutboundRequest;
use crate::connectors::{auth_outcome, PlatformConnector};
use crate::error::GatewayResult;
use crate::platform::Platform;
use crate::security::vault::Credentials;
use crate::security::webhook::hmac_sha256;

const SHOP_INFO_PATH: &str = "/api/v2/shop/get_shop_info";
const ORDER_LIST_PATH: &str = "/api/v2/order/get_order_list";
const ORDER_DETAIL_PATH: &str = "/api/v2/order/get_order_detail";
const SHIP_ORDER_PATH: &str = "/api/v2/logistics/ship_order";
const CANCEL_ORDER_PATH: &str = "/api/v2/order/cancel_order";

const DETAIL_BATCH: usize = 50;
const MAX_WINDOW_DAYS: i64 = 15;
const DETAIL_FIELDS: &str = "buyer_username,item_list,total_amount,currency";

/// Body `error` values that mean the credentials were rejected.
const AUTH_ERRORS: &[&str] = &[
    "error_auth",
    "error_sign",
    "error_permission",
    "error_invalid_partner",
    "invalid_access_token",
];

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
    response: Option<T>,
}

#[derive(Debug, Deserialize)]
struct OrderListPage {
    #[serde(default)]
    more: bool,
    #[serde(default)]
    next_cursor: String,
    #[serde(default)]
    order_list: Vec<OrderRef>,
}

#[derive(Debug, Deserialize)]
struct OrderRef {
    order_sn: String,
}

#[derive(Debug, Deserialize)]
struct OrderDetailPage {
    #[serde(default)]
    order_list: Vec<ShopeeOrder>,
}

#[derive(Debug, Deserialize)]
struct ShopeeOrder {
    order_sn: String,
    order_status: String,
    #[serde(default)]
    currency: String,
    /// Micro-units.
    total_amount: i64,
    create_time: i64,
    update_time: i64,
    #[serde(default)]
    buyer_username: Option<String>,
    #[serde(default)]
    item_list: Vec<ShopeeItem>,
}

#[derive(Debug, Deserialize)]
struct ShopeeItem {
    #[serde(default)]
    item_sku: String,
    #[serde(default)]
    model_sku: String,
    #[serde(default)]
    item_name: String,
    #[serde(default)]
    model_quantity_purchased: u32,
    /// Micro-units.
    model_discounted_price: i64,
}

fn map_status(raw: &str) -> OrderStatus {
    match raw {
        "UNPAID" => OrderStatus::Pending,
        "READY_TO_SHIP" | "PROCESSED" | "RETRY_SHIP" => OrderStatus::Processing,
        "SHIPPED" | "TO_CONFIRM_RECEIVE" => OrderStatus::Shipped,
        "COMPLETED" => OrderStatus::Delivered,
        "IN_CANCEL" | "CANCELLED" => OrderStatus::Cancelled,
        "TO_RETURN" => OrderStatus::Returned,
        _ => OrderStatus::Unknown,
    }
}

/// Hex HMAC-SHA256 of `partner_id + path + timestamp + shop_id`.
fn sign_request(
    partner_key: &str,
    partner_id: &str,
    path: &str,
    timestamp: &str,
    shop_id: &str,
) -> GatewayResult<String> {
    let digest = hmac_sha256(
        partner_key.as_bytes(),
        &[
            partner_id.as_bytes(),
            path.as_bytes(),
            timestamp.as_bytes(),
            shop_id.as_bytes(),
        ],
    )?;
    Ok(hex::encode(digest))
}

pub struct ShopeeConnector {
    ctx: ConnectorContext,
}

impl ShopeeConnector {
    pub fn new(ctx: ConnectorContext) -> Self {
        Self { ctx }
    }

    fn signed_url(
        &self,
        creds: &Credentials,
        path: &str,
        params: &[(&str, String)],
    ) -> GatewayResult<Url> {
        let partner_id = creds.require("partner_id")?;
        let partner_key = creds.require("partner_key")?;
        let shop_id = creds.require("shop_id")?;
        let timestamp = Utc::now().timestamp().to_string();
        let sign = sign_request(partner_key, partner_id, path, &timestamp, shop_id)?;

        let mut url = self.ctx.endpoint(path)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("partner_id", partner_id)
                .append_pair("timestamp", &timestamp)
                .append_pair("shop_id", shop_id)
                .append_pair("sign", &sign);
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn call<T: DeserializeOwned>(&self, request: OutboundRequest) -> GatewayResult<Envelope<T>> {
        let response = self.ctx.send(request).await?;
        let envelope: Envelope<T> = self.ctx.decode(&response)?;
        if envelope.error.is_empty() {
            return Ok(envelope);
        }
        if AUTH_ERRORS.contains(&envelope.error.as_str()) {
            return Err(self.ctx.auth_error(envelope.error));
        }
        Err(self.ctx.api_error(envelope.error, envelope.message))
    }

    async fn call_response<T: DeserializeOwned>(&self, request: OutboundRequest) -> GatewayResult<T> {
        self.call(request)
            .await?
            .response
            .ok_or_else(|| self.ctx.decode_error("missing response object"))
    }

    async fn list_order_numbers(
        &self,
        creds: &Credentials,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> GatewayResult<Vec<String>> {
        let page_size = self.ctx.config().page_size.clamp(1, 100).to_string();
        let mut cursor = String::new();
        let mut numbers = Vec::new();
        loop {
            let url = self.signed_url(
                creds,
                ORDER_LIST_PATH,
                &[
                    ("time_range_field", "update_time".to_string()),
                    ("time_from", from.timestamp().to_string()),
                    ("time_to", to.timestamp().to_string()),
                    ("page_size", page_size.clone()),
                    ("cursor", cursor.clone()),
                ],
            )?;
            let page: OrderListPage = self.call_response(OutboundRequest::get(url)).await?;
            numbers.extend(page.order_list.into_iter().map(|o| o.order_sn));
            if !page.more || page.next_cursor.is_empty() || page.next_cursor == cursor {
                break;
            }
            cursor = page.next_cursor;
        }
        Ok(numbers)
    }

    fn normalize(&self, order: ShopeeOrder) -> GatewayResult<Order> {
        let created_at = self.ctx.timestamp(&order.order_sn, "create_time", order.create_time)?;
        let updated_at = self.ctx.timestamp(&order.order_sn, "update_time", order.update_time)?;
        let items = order
            .item_list
            .into_iter()
            .map(|item| OrderItem {
                sku: if item.model_sku.is_empty() { item.item_sku } else { item.model_sku },
                name: item.item_name,
                quantity: item.model_quantity_purchased,
                unit_price_minor: micro_to_minor(item.model_discounted_price),
            })
            .collect();
        Ok(Order {
            platform: Platform::Shopee,
            external_id: order.order_sn.clone(),
            order_number: order.order_sn,
            status: map_status(&order.order_status),
            platform_status: order.order_status,
            currency: order.currency,
            total_minor: micro_to_minor(order.total_amount),
            created_at,
            updated_at,
            buyer_name: order.buyer_username.filter(|name| !name.is_empty()),
            items,
        })
    }
}

#[async_trait]
impl PlatformConnector for ShopeeConnector {
    fn context(&self) -> &ConnectorContext {
        &self.ctx
    }

    async fn authenticate(&self, credentials: &Credentials) -> GatewayResult<bool> {
        if !self.validate_credentials(credentials) {
            tracing::warn!(platform = "shopee", "Credentials failed schema validation");
            return Ok(false);
        }
        let url = self.signed_url(credentials, SHOP_INFO_PATH, &[])?;
        let result = self
            .call::<Value>(OutboundRequest::get(url))
            .await
            .map(|_| ());
        auth_outcome(result)
    }

    async fn fetch_orders(&self, since: Option<DateTime<Utc>>) -> GatewayResult<Vec<Order>> {
        let creds = self.ctx.credentials()?;
        let now = Utc::now();
        let floor = now - Duration::days(MAX_WINDOW_DAYS);
        let from = since.map_or(floor, |s| s.max(floor));

        let numbers = self.list_order_numbers(&creds, from, now).await?;
        let mut orders = Vec::with_capacity(numbers.len());
        for batch in numbers.chunks(DETAIL_BATCH) {
            let url = self.signed_url(
                &creds,
                ORDER_DETAIL_PATH,
                &[
                    ("order_sn_list", batch.join(",")),
                    ("response_optional_fields", DETAIL_FIELDS.to_string()),
                ],
            )?;
            let page: OrderDetailPage = self.call_response(OutboundRequest::get(url)).await?;
            for order in page.order_list {
                orders.push(self.normalize(order)?);
            }
        }

        tracing::debug!(platform = "shopee", count = orders.len(), "Fetched orders");
        Ok(orders)
    }

    async fn update_order_status(&self, order_id: &str, status: OrderStatus) -> GatewayResult<bool> {
        let (path, body) = match status {
            OrderStatus::Shipped => (SHIP_ORDER_PATH, json!({ "order_sn": order_id })),
            OrderStatus::Cancelled => (
                CANCEL_ORDER_PATH,
                json!({ "order_sn": order_id, "cancel_reason": "OUT_OF_STOCK" }),
            ),
            _ => return Ok(false),
        };
        let creds = self.ctx.credentials()?;
        let url = self.signed_url(&creds, path, &[])?;
        self.call::<Value>(OutboundRequest::post_json(url, body.to_string()))
            .await?;
        tracing::info!(platform = "shopee", order_id = %order_id, status = %status, "Order status updated");
        Ok(true)
    }

    fn webhook_secret_field(&self) -> &'static str {
        "partner_key"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::testing::{context, fields, query, ScriptedTransport};
    use crate::error::GatewayError;

    const KEY: &str = "shpk0123456789abcdef0123456789abcdef";

    fn creds() -> [(&'static str, &'static str); 3] {
        [("partner_id", "2001"), ("partner_key", KEY), ("shop_id", "778899")]
    }

    fn order(sn: &str, status: &str) -> Value {
        json!({
            "order_sn": sn,
            "order_status": status,
            "currency": "MYR",
            "total_amount": 12_345_000,
            "create_time": 1_700_000_000,
            "update_time": 1_700_000_600,
            "buyer_username": "buyer01",
            "item_list": [{
                "item_sku": "SKU-1",
                "model_sku": "",
                "item_name": "Mug",
                "model_quantity_purchased": 2,
                "model_discounted_price": 6_172_500
            }]
        })
    }

    #[tokio::test]
    async fn test_fetch_orders_paginates_and_normalizes() {
        let transport = ScriptedTransport::json(&[
            json!({"error": "", "response": {"more": true, "next_cursor": "c1",
                "order_list": [{"order_sn": "A1"}, {"order_sn": "A2"}]}}),
            json!({"error": "", "response": {"more": false, "next_cursor": "",
                "order_list": [{"order_sn": "A3"}]}}),
            json!({"error": "", "response": {"order_list": [
                order("A1", "READY_TO_SHIP"), order("A2", "COMPLETED"), order("A3", "IN_CANCEL")
            ]}}),
        ]);
        let connector = ShopeeConnector::new(context(Platform::Shopee, &creds(), transport.clone()));

        let orders = connector.fetch_orders(None).await.unwrap();
        assert_eq!(orders.len(), 3);
        assert_eq!(orders[0].status, OrderStatus::Processing);
        assert_eq!(orders[1].status, OrderStatus::Delivered);
        assert_eq!(orders[2].status, OrderStatus::Cancelled);
        assert_eq!(orders[0].platform_status, "READY_TO_SHIP");
        assert_eq!(orders[0].total_minor, 12_345);
        assert_eq!(orders[0].items[0].unit_price_minor, 6_173);
        assert_eq!(orders[0].items[0].sku, "SKU-1");

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(query(&requests[1])["cursor"], "c1");
        assert_eq!(query(&requests[2])["order_sn_list"], "A1,A2,A3");
    }

    #[tokio::test]
    async fn test_malformed_order_fields_fail_decode() {
        let mut text_amount = order("A1", "READY_TO_SHIP");
        text_amount["total_amount"] = json!("123.45");
        let mut missing_price = order("A2", "READY_TO_SHIP");
        missing_price["item_list"][0]
            .as_object_mut()
            .unwrap()
            .remove("model_discounted_price");
        let mut zero_time = order("A3", "READY_TO_SHIP");
        zero_time["create_time"] = json!(0);

        for bad in [text_amount, missing_price, zero_time] {
            let transport = ScriptedTransport::json(&[
                json!({"error": "", "response": {"more": false, "order_list": [{"order_sn": "A1"}]}}),
                json!({"error": "", "response": {"order_list": [bad]}}),
            ]);
            let connector = ShopeeConnector::new(context(Platform::Shopee, &creds(), transport));
            let err = connector.fetch_orders(None).await.unwrap_err();
            assert_eq!(err.reason_code(), "decode_error");
        }
    }

    #[tokio::test]
    async fn test_requests_are_signed() {
        let transport = ScriptedTransport::json(&[json!({"error": "", "shop_name": "demo"})]);
        let connector = ShopeeConnector::new(context(Platform::Shopee, &creds(), transport.clone()));
        let credentials = Credentials::new(fields(&creds()));
        assert!(connector.authenticate(&credentials).await.unwrap());

        let request = &transport.requests()[0];
        let params = query(request);
        let expected = sign_request(
            KEY,
            "2001",
            SHOP_INFO_PATH,
            &params["timestamp"],
            "778899",
        )
        .unwrap();
        assert_eq!(params["sign"], expected);
        assert_eq!(request.url.path(), SHOP_INFO_PATH);
    }

    #[tokio::test]
    async fn test_in_body_auth_error_is_rejection() {
        let transport = ScriptedTransport::json(&[json!({
            "error": "error_auth",
            "message": "Invalid partner_id"
        })]);
        let ctx = context(Platform::Shopee, &creds(), transport);
        let monitor = ctx.services().monitor.clone();
        let connector = ShopeeConnector::new(ctx);

        assert!(!connector.test_connection().await);
        assert_eq!(monitor.get_security_metrics(Platform::Shopee).total_auth_failures, 1);
    }

    #[tokio::test]
    async fn test_business_error_surfaces_code() {
        let transport = ScriptedTransport::json(&[json!({
            "error": "error_param",
            "message": "time range too large"
        })]);
        let connector = ShopeeConnector::new(context(Platform::Shopee, &creds(), transport));
        let err = connector.fetch_orders(None).await.unwrap_err();
        assert!(matches!(err, GatewayError::Api { ref code, .. } if code == "error_param"));
    }

    #[tokio::test]
    async fn test_unmapped_status_update_is_noop() {
        let transport = ScriptedTransport::new(Vec::new());
        let connector = ShopeeConnector::new(context(Platform::Shopee, &creds(), transport.clone()));
        assert!(!connector
            .update_order_status("A1", OrderStatus::Delivered)
            .await
            .unwrap());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_posts_order_sn() {
        let transport = ScriptedTransport::json(&[json!({"error": "", "response": {}})]);
        let connector = ShopeeConnector::new(context(Platform::Shopee, &creds(), transport.clone()));
        assert!(connector
            .update_order_status("A9", OrderStatus::Cancelled)
            .await
            .unwrap());
        let request = &transport.requests()[0];
        assert_eq!(request.url.path(), CANCEL_ORDER_PATH);
        assert!(request.body.as_deref().unwrap().contains("\"A9\""));
    }

    #[test]
    fn test_short_partner_key_fails_validation() {
        let transport = ScriptedTransport::new(Vec::new());
        let connector = ShopeeConnector::new(context(Platform::Shopee, &[], transport));
        let short = Credentials::new(fields(&[
            ("partner_id", "2001"),
            ("partner_key", "short"),
            ("shop_id", "1"),
        ]));
        assert!(!connector.validate_credentials(&short));
        assert!(connector.validate_credentials(&Credentials::new(fields(&creds()))));
    }
}
