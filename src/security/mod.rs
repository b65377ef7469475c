//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call:
//!     → vault.rs (decrypt credentials)
//!     → ssrf.rs (validate target against the platform allow-list)
//!     → monitor.rs (count request, flag anomalies, optional enforcement)
//!     → [transport] → monitor.rs (audit record, auth failure events)
//!
//! Inbound webhook:
//!     → webhook.rs (HMAC-SHA256, constant-time compare)
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - Secrets are encrypted at rest and masked or redacted everywhere else
//! - No trust in stored input: values are sanitized before persistence

pub mod cipher;
pub mod monitor;
pub mod rate_limit;
pub mod sanitize;
pub mod ssrf;
pub mod vault;
pub mod webhook;

pub use cipher::CredentialCipher;
pub use monitor::{ApiInteraction, SecurityEventKind, SecurityMonitor};
pub use ssrf::{DomainAllowList, SsrfGuard};
pub use vault::{CredentialStore, CredentialVault, Credentials};
pub use webhook::WebhookVerifier;
