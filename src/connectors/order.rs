//! Canonical order representation and amount normalization.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::platform::Platform;

/// Platform-independent order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Returned,
    Unknown,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Returned => "returned",
            OrderStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub sku: String,
    pub name: String,
    pub quantity: u32,
    /// Unit price in minor currency units.
    pub unit_price_minor: i64,
}

/// An order normalized from any platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub platform: Platform,
    pub external_id: String,
    pub order_number: String,
    pub status: OrderStatus,
    /// Status string exactly as the platform reported it.
    pub platform_status: String,
    pub currency: String,
    /// Order total in minor currency units.
    pub total_minor: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub buyer_name: Option<String>,
    pub items: Vec<OrderItem>,
}

/// Parse a decimal amount such as `"1,234.50"` into minor units (cents).
///
/// Thousands separators are ignored; digits past the second decimal place
/// are rounded half up.
pub fn decimal_to_minor(raw: &str) -> Option<i64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',' && *c != '_').collect();
    if cleaned.is_empty() {
        return None;
    }
    let (negative, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut frac_digits = frac.bytes().map(|b| i64::from(b - b'0'));
    let tens = frac_digits.next().unwrap_or(0);
    let units = frac_digits.next().unwrap_or(0);
    let round_up = frac_digits.next().unwrap_or(0) >= 5;

    let minor = whole
        .checked_mul(100)?
        .checked_add(tens * 10 + units + i64::from(round_up))?;
    Some(if negative { -minor } else { minor })
}

/// Convert a micro-unit amount (value × 100000) into minor units, rounding
/// half up.
pub fn micro_to_minor(micro: i64) -> i64 {
    let quotient = micro / 1000;
    let remainder = micro % 1000;
    if remainder >= 500 {
        quotient + 1
    } else if remainder <= -500 {
        quotient - 1
    } else {
        quotient
    }
}

/// Convert a floating amount into minor units.
pub fn float_to_minor(value: f64) -> i64 {
    (value * 100.0).round() as i64
}

/// Unix seconds to UTC. Zero, negative and out-of-range values are
/// rejected; platforms send zero for a missing timestamp.
pub fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return None;
    }
    DateTime::from_timestamp(secs, 0)
}
