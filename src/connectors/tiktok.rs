//! TikTok Shop Open API connector.
//!
//! # Design Decisions
//! - Query carries `app_key`, `timestamp`, `shop_id` and `sign`; the access
//!   token travels in the `x-tts-access-token` header
//! - `sign` is the hex HMAC-SHA256 of
//!   `secret + path + sorted(key + value) + body + secret` under the app
//!   secret, so the body is serialized once and signed as sent
//! - A non-zero `code` in the body is an error even with HTTP 200
//! - Search results page with `next_page_token`

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::connectors::context::ConnectorContext;
use crate::connectors::order::{Order, OrderItem, OrderStatus};
use crate::connectors::transport::OutboundRequest;
use crate::connectors::{auth_outcome, PlatformConnector};
use crate::error::GatewayResult;
use crate::platform::Platform;
use crate::security::vault::Credentials;
use crate::security::webhook::hmac_sha256;

const ACCESS_TOKEN_HEADER: &str = "x-tts-access-token";
const DEFAULT_LOOKBACK_DAYS: i64 = 7;

/// Codes meaning the signature, app key or token was rejected.
const AUTH_CODES: &[i64] = &[105000, 105001, 105002, 105003, 105004, 105005, 106001];

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    next_page_token: String,
    #[serde(default)]
    orders: Vec<TiktokOrder>,
}

#[derive(Debug, Deserialize)]
struct TiktokOrder {
    id: String,
    status: String,
    #[serde(default)]
    payment: Payment,
    #[serde(default)]
    create_time: i64,
    #[serde(default)]
    update_time: i64,
    #[serde(default)]
    recipient_address: Option<Recipient>,
    #[serde(default)]
    line_items: Vec<LineItem>,
}

#[derive(Debug, Default, Deserialize)]
struct Payment {
    #[serde(default)]
    currency: String,
    #[serde(default)]
    total_amount: String,
}

#[derive(Debug, Deserialize)]
struct Recipient {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct LineItem {
    #[serde(default)]
    seller_sku: String,
    #[serde(default)]
    product_name: String,
    #[serde(default)]
    sale_price: String,
}

fn map_status(raw: &str) -> OrderStatus {
    match raw {
        "UNPAID" | "ON_HOLD" => OrderStatus::Pending,
        "AWAITING_SHIPMENT" | "PARTIALLY_SHIPPING" | "AWAITING_COLLECTION" => OrderStatus::Processing,
        "IN_TRANSIT" => OrderStatus::Shipped,
        "DELIVERED" | "COMPLETED" => OrderStatus::Delivered,
        "CANCELLED" => OrderStatus::Cancelled,
        _ => OrderStatus::Unknown,
    }
}

/// Hex HMAC-SHA256 of `secret + path + k1v1k2v2... + body + secret`.
fn sign_request(
    app_secret: &str,
    path: &str,
    params: &BTreeMap<String, String>,
    body: &str,
) -> GatewayResult<String> {
    let mut payload = String::with_capacity(app_secret.len() * 2 + path.len() + body.len());
    payload.push_str(app_secret);
    payload.push_str(path);
    for (key, value) in params {
        if key == "sign" || key == "access_token" {
            continue;
        }
        payload.push_str(key);
        payload.push_str(value);
    }
    payload.push_str(body);
    payload.push_str(app_secret);
    let digest = hmac_sha256(app_secret.as_bytes(), &[payload.as_bytes()])?;
    Ok(hex::encode(digest))
}

pub struct TiktokConnector {
    ctx: ConnectorContext,
}

impl TiktokConnector {
    pub fn new(ctx: ConnectorContext) -> Self {
        Self { ctx }
    }

    fn path(&self, template: &str) -> String {
        template.replace("{version}", &self.ctx.config().api_version)
    }

    fn signed_request(
        &self,
        creds: &Credentials,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<Value>,
    ) -> GatewayResult<OutboundRequest> {
        let app_secret = creds.require("app_secret")?;
        let mut all: BTreeMap<String, String> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        all.insert("app_key".into(), creds.require("app_key")?.to_string());
        all.insert("shop_id".into(), creds.require("shop_id")?.to_string());
        all.insert("timestamp".into(), Utc::now().timestamp().to_string());

        let body = body.map(|b| b.to_string());
        let sign = sign_request(app_secret, path, &all, body.as_deref().unwrap_or_default())?;

        let mut url = self.ctx.endpoint(path)?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in &all {
                query.append_pair(key, value);
            }
            query.append_pair("sign", &sign);
        }
        let request = match body {
            Some(body) => OutboundRequest::post_json(url, body).with_method(method),
            None => OutboundRequest::get(url).with_method(method),
        };
        Ok(request.header(ACCESS_TOKEN_HEADER, creds.require("access_token")?))
    }

    async fn call<T: DeserializeOwned>(&self, request: OutboundRequest) -> GatewayResult<Option<T>> {
        let response = self.ctx.send(request).await?;
        let envelope: Envelope<T> = self.ctx.decode(&response)?;
        match envelope.code {
            0 => Ok(envelope.data),
            code if AUTH_CODES.contains(&code) => {
                Err(self.ctx.auth_error(format!("code {code}: {}", envelope.message)))
            }
            code => Err(self.ctx.api_error(code.to_string(), envelope.message)),
        }
    }

    fn normalize(&self, order: TiktokOrder) -> GatewayResult<Order> {
        let id = order.id.as_str();
        let total_minor = self
            .ctx
            .minor_amount(id, "payment.total_amount", &order.payment.total_amount)?;
        let created_at = self.ctx.timestamp(id, "create_time", order.create_time)?;
        let updated_at = self.ctx.timestamp(id, "update_time", order.update_time)?;
        // One line per unit.
        let items = order
            .line_items
            .iter()
            .map(|item| {
                Ok(OrderItem {
                    sku: item.seller_sku.clone(),
                    name: item.product_name.clone(),
                    quantity: 1,
                    unit_price_minor: self.ctx.minor_amount(id, "line_items.sale_price", &item.sale_price)?,
                })
            })
            .collect::<GatewayResult<Vec<_>>>()?;

        Ok(Order {
            platform: Platform::Tiktok,
            external_id: order.id.clone(),
            order_number: order.id,
            status: map_status(&order.status),
            platform_status: order.status,
            currency: order.payment.currency,
            total_minor,
            created_at,
            updated_at,
            buyer_name: order
                .recipient_address
                .map(|r| r.name)
                .filter(|name| !name.is_empty()),
            items,
        })
    }
}

#[async_trait]
impl PlatformConnector for TiktokConnector {
    fn context(&self) -> &ConnectorContext {
        &self.ctx
    }

    async fn authenticate(&self, credentials: &Credentials) -> GatewayResult<bool> {
        if !self.validate_credentials(credentials) {
            tracing::warn!(platform = "tiktok", "Credentials failed schema validation");
            return Ok(false);
        }
        let path = self.path("/authorization/{version}/shops");
        let request = self.signed_request(credentials, Method::GET, &path, &[], None)?;
        auth_outcome(self.call::<Value>(request).await.map(|_| ()))
    }

    async fn fetch_orders(&self, since: Option<DateTime<Utc>>) -> GatewayResult<Vec<Order>> {
        let creds = self.ctx.credentials()?;
        let since = since.unwrap_or_else(|| Utc::now() - chrono::Duration::days(DEFAULT_LOOKBACK_DAYS));
        let path = self.path("/order/{version}/orders/search");
        let page_size = self.ctx.config().page_size.clamp(1, 100).to_string();

        let mut token = String::new();
        let mut orders = Vec::new();
        loop {
            let mut params = vec![
                ("page_size", page_size.clone()),
                ("sort_field", "update_time".to_string()),
                ("sort_order", "ASC".to_string()),
            ];
            if !token.is_empty() {
                params.push(("page_token", token.clone()));
            }
            let request = self.signed_request(
                &creds,
                Method::POST,
                &path,
                &params,
                Some(json!({ "update_time_ge": since.timestamp() })),
            )?;
            let page: SearchPage = self
                .call(request)
                .await?
                .ok_or_else(|| self.ctx.decode_error("missing data object"))?;
            for order in page.orders {
                orders.push(self.normalize(order)?);
            }
            if page.next_page_token.is_empty() || page.next_page_token == token {
                break;
            }
            token = page.next_page_token;
        }

        tracing::debug!(platform = "tiktok", count = orders.len(), "Fetched orders");
        Ok(orders)
    }

    async fn update_order_status(&self, order_id: &str, status: OrderStatus) -> GatewayResult<bool> {
        if status != OrderStatus::Cancelled {
            return Ok(false);
        }
        let creds = self.ctx.credentials()?;
        let path = self.path("/return_refund/{version}/cancellations");
        let request = self.signed_request(
            &creds,
            Method::POST,
            &path,
            &[],
            Some(json!({ "order_id": order_id, "cancel_reason": "seller_cancel_out_of_stock" })),
        )?;
        self.call::<Value>(request).await?;
        tracing::info!(platform = "tiktok", order_id = %order_id, status = %status, "Order status updated");
        Ok(true)
    }

    fn webhook_secret_field(&self) -> &'static str {
        "app_secret"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::testing::{context, fields, query, ScriptedTransport};

    fn creds() -> [(&'static str, &'static str); 4] {
        [
            ("app_key", "6abc123"),
            ("app_secret", "tts-secret"),
            ("access_token", "ROW_token_value"),
            ("shop_id", "7495"),
        ]
    }

    fn order(id: &str, status: &str) -> Value {
        json!({
            "id": id,
            "status": status,
            "payment": {"currency": "GBP", "total_amount": "18.00"},
            "create_time": 1_700_000_000,
            "update_time": 1_700_000_100,
            "recipient_address": {"name": "Kit"},
            "line_items": [
                {"seller_sku": "CAP", "product_name": "Cap", "sale_price": "9.00"},
                {"seller_sku": "CAP", "product_name": "Cap", "sale_price": "9.00"}
            ]
        })
    }

    #[test]
    fn test_signature_wraps_secret_and_body() {
        let mut params = BTreeMap::new();
        params.insert("timestamp".to_string(), "1700000000".to_string());
        params.insert("app_key".to_string(), "k".to_string());
        params.insert("access_token".to_string(), "ignored".to_string());
        let sign = sign_request("s", "/p", &params, "{}").unwrap();

        let expected = hex::encode(
            hmac_sha256(b"s", &[b"s/papp_keyktimestamp1700000000{}s".as_slice()]).unwrap(),
        );
        assert_eq!(sign, expected);
    }

    #[tokio::test]
    async fn test_search_pages_with_token() {
        let transport = ScriptedTransport::json(&[
            json!({"code": 0, "message": "Success", "data": {
                "next_page_token": "t2", "orders": [order("5761", "AWAITING_SHIPMENT")]}}),
            json!({"code": 0, "message": "Success", "data": {
                "next_page_token": "", "orders": [order("5762", "DELIVERED")]}}),
        ]);
        let connector = TiktokConnector::new(context(Platform::Tiktok, &creds(), transport.clone()));

        let orders = connector.fetch_orders(None).await.unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].status, OrderStatus::Processing);
        assert_eq!(orders[0].total_minor, 1800);
        assert_eq!(orders[0].items.len(), 2);
        assert_eq!(orders[0].buyer_name.as_deref(), Some("Kit"));
        assert_eq!(orders[1].status, OrderStatus::Delivered);

        let requests = transport.requests();
        assert_eq!(requests[0].url.path(), "/order/202309/orders/search");
        assert_eq!(requests[0].header_value(ACCESS_TOKEN_HEADER), Some("ROW_token_value"));
        assert!(!query(&requests[0]).contains_key("page_token"));
        assert_eq!(query(&requests[1])["page_token"], "t2");
        assert!(!query(&requests[0]).contains_key("access_token"));
    }

    #[tokio::test]
    async fn test_malformed_order_fields_fail_decode() {
        let mut bad_total = order("5761", "AWAITING_SHIPMENT");
        bad_total["payment"]["total_amount"] = json!("18 GBP");
        let mut bad_line = order("5762", "AWAITING_SHIPMENT");
        bad_line["line_items"][1]["sale_price"] = json!("");
        let mut missing_time = order("5763", "AWAITING_SHIPMENT");
        missing_time.as_object_mut().unwrap().remove("create_time");
        let mut negative_time = order("5764", "AWAITING_SHIPMENT");
        negative_time["update_time"] = json!(-1);

        for bad in [bad_total, bad_line, missing_time, negative_time] {
            let transport = ScriptedTransport::json(&[json!({"code": 0, "data": {
                "next_page_token": "", "orders": [bad]}})]);
            let connector = TiktokConnector::new(context(Platform::Tiktok, &creds(), transport));
            let err = connector.fetch_orders(None).await.unwrap_err();
            assert_eq!(err.reason_code(), "decode_error");
        }
    }

    #[tokio::test]
    async fn test_signature_matches_sent_request() {
        let transport = ScriptedTransport::json(&[json!({"code": 0, "data": {"shops": []}})]);
        let connector = TiktokConnector::new(context(Platform::Tiktok, &creds(), transport.clone()));
        assert!(connector
            .authenticate(&Credentials::new(fields(&creds())))
            .await
            .unwrap());

        let request = &transport.requests()[0];
        let mut params: BTreeMap<String, String> = query(request);
        let sent = params.remove("sign").unwrap();
        let expected = sign_request("tts-secret", request.url.path(), &params, "").unwrap();
        assert_eq!(sent, expected);
    }

    #[tokio::test]
    async fn test_auth_code_is_rejection() {
        let transport = ScriptedTransport::json(&[json!({
            "code": 105002,
            "message": "Expired credentials"
        })]);
        let ctx = context(Platform::Tiktok, &creds(), transport);
        let monitor = ctx.services().monitor.clone();
        let connector = TiktokConnector::new(ctx);
        assert!(!connector.test_connection().await);
        assert_eq!(monitor.get_security_metrics(Platform::Tiktok).total_auth_failures, 1);
    }

    #[tokio::test]
    async fn test_other_code_is_platform_error() {
        let transport = ScriptedTransport::json(&[json!({"code": 36009003, "message": "Bad param"})]);
        let connector = TiktokConnector::new(context(Platform::Tiktok, &creds(), transport));
        let err = connector.fetch_orders(None).await.unwrap_err();
        assert_eq!(err.reason_code(), "platform_error");
    }

    #[tokio::test]
    async fn test_ship_has_no_action() {
        let transport = ScriptedTransport::new(Vec::new());
        let connector = TiktokConnector::new(context(Platform::Tiktok, &creds(), transport));
        assert!(!connector.update_order_status("5761", OrderStatus::Shipped).await.unwrap());
    }
}
