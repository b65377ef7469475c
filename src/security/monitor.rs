//! Per-platform request accounting and security event monitoring.
//!
//! # Responsibilities
//! - Count requests per platform in per-minute and burst windows
//! - Count authentication failures within a sliding policy window
//! - Flag suspicious activity when any limit is exceeded
//! - Write sanitized audit records for every platform interaction
//! - Aggregate metrics and advisories into a security report
//!
//! # Design Decisions
//! - One mutex per platform; platforms never contend with each other
//! - Observe-only unless `monitoring.enforce_rate_limits` is set
//! - Event payloads are redacted before they are stored

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::config::{AdvisoryConfig, MonitoringConfig, PlatformsConfig, RateLimitConfig};
use crate::observability::logging::AUDIT_TARGET;
use crate::observability::metrics;
use crate::platform::Platform;
use crate::security::rate_limit::RateWindow;
use crate::security::sanitize::sanitize_log_data;

const MINUTE: Duration = Duration::from_secs(60);

/// Retained suspicious-activity markers per platform.
const SUSPICIOUS_RETENTION: usize = 100;

/// Kind of recorded security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    Request,
    AuthFailure,
    Suspicious,
}

impl SecurityEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventKind::Request => "request",
            SecurityEventKind::AuthFailure => "auth_failure",
            SecurityEventKind::Suspicious => "suspicious",
        }
    }
}

/// A recorded event with a redacted payload.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub platform: Platform,
    pub kind: SecurityEventKind,
    pub timestamp: DateTime<Utc>,
    pub details: Value,
}

/// Which limit a suspicious-activity marker refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspicionReason {
    RateLimitExceeded,
    BurstLimitExceeded,
    AuthFailureThreshold,
}

/// Marker appended when a platform crosses a limit.
#[derive(Debug, Clone, Serialize)]
pub struct SuspiciousActivity {
    pub timestamp: DateTime<Utc>,
    pub reason: SuspicionReason,
    pub count: u32,
    pub limit: u32,
}

/// Outcome of recording one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateStatus {
    pub requests_last_minute: u32,
    pub burst_count: u32,
    pub exceeded: Vec<SuspicionReason>,
    /// Time until the tightest exceeded request window rolls over.
    pub retry_after: Option<Duration>,
}

impl RateStatus {
    /// Whether a request-volume limit (not auth failures) was exceeded.
    pub fn over_request_limit(&self) -> bool {
        self.exceeded.iter().any(|r| {
            matches!(
                r,
                SuspicionReason::RateLimitExceeded | SuspicionReason::BurstLimitExceeded
            )
        })
    }
}

/// Snapshot of one platform's counters.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityMetrics {
    pub platform: Platform,
    pub total_requests: u64,
    pub requests_last_minute: u32,
    pub total_auth_failures: u64,
    pub auth_failures_in_window: u32,
    pub suspicious_activity: Vec<SuspiciousActivity>,
    pub last_activity: Option<DateTime<Utc>>,
    pub limits: RateLimitConfig,
}

/// One audited platform interaction.
#[derive(Debug, Clone)]
pub struct ApiInteraction {
    pub method: String,
    /// Path only; query strings carry signatures and tokens.
    pub endpoint: String,
    pub status_code: Option<u16>,
    pub duration_ms: u64,
    pub details: Value,
}

/// Aggregated report across platforms.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityReport {
    pub generated_at: DateTime<Utc>,
    pub platforms: BTreeMap<Platform, SecurityMetrics>,
    pub vulnerabilities: Vec<AdvisoryConfig>,
    pub summary: ReportSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub total_platforms: usize,
    pub platforms_with_issues: usize,
    pub total_vulnerabilities: usize,
}

struct PlatformState {
    minute: RateWindow,
    burst: RateWindow,
    auth_failures: RateWindow,
    total_requests: u64,
    total_auth_failures: u64,
    events: VecDeque<SecurityEvent>,
    suspicious: VecDeque<SuspiciousActivity>,
    last_activity: Option<DateTime<Utc>>,
}

impl PlatformState {
    fn new(limits: &RateLimitConfig, auth_window: Duration, now: Instant) -> Self {
        Self {
            minute: RateWindow::new(MINUTE, now),
            burst: RateWindow::new(Duration::from_secs(limits.burst_window_secs), now),
            auth_failures: RateWindow::new(auth_window, now),
            total_requests: 0,
            total_auth_failures: 0,
            events: VecDeque::new(),
            suspicious: VecDeque::new(),
            last_activity: None,
        }
    }

    fn push_event(&mut self, event: SecurityEvent, retention: usize) {
        if self.events.len() >= retention {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    fn flag(&mut self, reason: SuspicionReason, count: u32, limit: u32) {
        if self.suspicious.len() >= SUSPICIOUS_RETENTION {
            self.suspicious.pop_front();
        }
        self.suspicious.push_back(SuspiciousActivity {
            timestamp: Utc::now(),
            reason,
            count,
            limit,
        });
    }
}

/// Tracks request volume and anomalies per platform.
pub struct SecurityMonitor {
    limits: BTreeMap<Platform, RateLimitConfig>,
    auth_failure_threshold: u32,
    auth_failure_window: Duration,
    retention: usize,
    enforce: bool,
    advisories: Vec<AdvisoryConfig>,
    states: DashMap<Platform, Mutex<PlatformState>>,
}

impl SecurityMonitor {
    pub fn new(monitoring: &MonitoringConfig, platforms: &PlatformsConfig) -> Self {
        Self {
            limits: Platform::ALL
                .iter()
                .map(|p| (*p, platforms.get(*p).rate_limit))
                .collect(),
            auth_failure_threshold: monitoring.auth_failure_threshold,
            auth_failure_window: Duration::from_secs(monitoring.auth_failure_window_secs),
            retention: monitoring.event_retention.max(1),
            enforce: monitoring.enforce_rate_limits,
            advisories: monitoring.advisories.clone(),
            states: DashMap::new(),
        }
    }

    /// Whether over-limit calls are rejected rather than only flagged.
    pub fn enforces_rate_limits(&self) -> bool {
        self.enforce
    }

    pub fn limits(&self, platform: Platform) -> RateLimitConfig {
        self.limits.get(&platform).copied().unwrap_or_default()
    }

    fn with_state<R>(&self, platform: Platform, f: impl FnOnce(&mut PlatformState) -> R) -> R {
        let limits = self.limits(platform);
        let entry = self.states.entry(platform).or_insert_with(|| {
            Mutex::new(PlatformState::new(&limits, self.auth_failure_window, Instant::now()))
        });
        let mut state: MutexGuard<'_, PlatformState> =
            entry.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Record an event and flag the platform when a limit is crossed.
    pub fn monitor_suspicious_activity(
        &self,
        platform: Platform,
        kind: SecurityEventKind,
        details: &Value,
    ) -> RateStatus {
        let limits = self.limits(platform);
        let threshold = self.auth_failure_threshold;
        let retention = self.retention;
        let now = Instant::now();

        let status = self.with_state(platform, |state| {
            let mut status = RateStatus::default();
            state.last_activity = Some(Utc::now());
            state.push_event(
                SecurityEvent {
                    id: Uuid::new_v4(),
                    platform,
                    kind,
                    timestamp: Utc::now(),
                    details: sanitize_log_data(details),
                },
                retention,
            );

            match kind {
                SecurityEventKind::Request => {
                    state.total_requests += 1;
                    status.requests_last_minute = state.minute.hit(now);
                    status.burst_count = state.burst.hit(now);

                    if status.requests_last_minute > limits.requests_per_minute {
                        state.flag(
                            SuspicionReason::RateLimitExceeded,
                            status.requests_last_minute,
                            limits.requests_per_minute,
                        );
                        status.exceeded.push(SuspicionReason::RateLimitExceeded);
                        status.retry_after = Some(state.minute.remaining(now));
                    }
                    if status.burst_count > limits.burst_limit {
                        state.flag(
                            SuspicionReason::BurstLimitExceeded,
                            status.burst_count,
                            limits.burst_limit,
                        );
                        status.exceeded.push(SuspicionReason::BurstLimitExceeded);
                        let burst_wait = state.burst.remaining(now);
                        status.retry_after = Some(
                            status
                                .retry_after
                                .map_or(burst_wait, |minute_wait| minute_wait.max(burst_wait)),
                        );
                    }
                }
                SecurityEventKind::AuthFailure => {
                    state.total_auth_failures += 1;
                    let failures = state.auth_failures.hit(now);
                    status.requests_last_minute = state.minute.current(now);
                    if failures > threshold {
                        state.flag(SuspicionReason::AuthFailureThreshold, failures, threshold);
                        status.exceeded.push(SuspicionReason::AuthFailureThreshold);
                    }
                }
                SecurityEventKind::Suspicious => {
                    status.requests_last_minute = state.minute.current(now);
                }
            }
            status
        });

        metrics::record_security_event(platform.as_str(), kind.as_str());
        for reason in &status.exceeded {
            metrics::record_rate_limited(platform.as_str());
            tracing::warn!(
                platform = %platform,
                reason = ?reason,
                requests_last_minute = status.requests_last_minute,
                burst_count = status.burst_count,
                "Suspicious activity detected"
            );
        }
        status
    }

    /// Write a sanitized record of one interaction to the audit channel.
    pub fn log_api_interaction(&self, platform: Platform, interaction: &ApiInteraction) {
        let details = sanitize_log_data(&interaction.details);
        tracing::info!(
            target: AUDIT_TARGET,
            platform = %platform,
            method = %interaction.method,
            endpoint = %interaction.endpoint,
            status_code = interaction.status_code,
            duration_ms = interaction.duration_ms,
            timestamp = %Utc::now().to_rfc3339(),
            details = %details,
            "platform api interaction"
        );
    }

    pub fn get_security_metrics(&self, platform: Platform) -> SecurityMetrics {
        let limits = self.limits(platform);
        let now = Instant::now();
        self.with_state(platform, |state| SecurityMetrics {
            platform,
            total_requests: state.total_requests,
            requests_last_minute: state.minute.current(now),
            total_auth_failures: state.total_auth_failures,
            auth_failures_in_window: state.auth_failures.current(now),
            suspicious_activity: state.suspicious.iter().cloned().collect(),
            last_activity: state.last_activity,
            limits,
        })
    }

    /// Most recent events for a platform, newest last.
    pub fn recent_events(&self, platform: Platform, limit: usize) -> Vec<SecurityEvent> {
        self.with_state(platform, |state| {
            let skip = state.events.len().saturating_sub(limit);
            state.events.iter().skip(skip).cloned().collect()
        })
    }

    pub fn generate_security_report(&self) -> SecurityReport {
        let platforms: BTreeMap<Platform, SecurityMetrics> = Platform::ALL
            .iter()
            .map(|p| (*p, self.get_security_metrics(*p)))
            .collect();
        let platforms_with_issues = platforms
            .values()
            .filter(|m| !m.suspicious_activity.is_empty())
            .count();

        SecurityReport {
            generated_at: Utc::now(),
            summary: ReportSummary {
                total_platforms: platforms.len(),
                platforms_with_issues,
                total_vulnerabilities: self.advisories.len(),
            },
            platforms,
            vulnerabilities: self.advisories.clone(),
        }
    }
}
