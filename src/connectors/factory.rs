//! Connector factory.
//!
//! # Responsibilities
//! - Resolve platform identifiers to connector instances
//! - Cache one connector per platform
//! - Build each connector's transport with that platform's allow-list
//! - Report platform metadata and statistics for the admin layer

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use crate::config::{PlatformsConfig, RateLimitConfig};
use crate::connectors::context::{ConnectorContext, GatewayServices};
use crate::connectors::lazada::LazadaConnector;
use crate::connectors::shopee::ShopeeConnector;
use crate::connectors::shopify::ShopifyConnector;
use crate::connectors::tiktok::TiktokConnector;
use crate::connectors::transport::{HttpTransport, ReqwestTransport};
use crate::connectors::{schema_map, PlatformConnector};
use crate::error::GatewayResult;
use crate::platform::{AuthScheme, FieldSpec, Platform};
use crate::security::ssrf::DomainAllowList;

/// Platform metadata for listings.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformInfo {
    pub platform: Platform,
    pub name: &'static str,
    pub enabled: bool,
    pub sandbox: bool,
    pub auth_scheme: AuthScheme,
    pub rate_limits: RateLimitConfig,
    pub has_credentials: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FactoryStatistics {
    pub total_platforms: usize,
    pub enabled_platforms: usize,
    pub cached_connectors: usize,
    pub platforms_with_credentials: usize,
    pub open_circuits: usize,
}

pub struct ConnectorFactory {
    platforms: PlatformsConfig,
    services: GatewayServices,
    /// Shared transport used instead of per-platform clients when set.
    transport: Option<Arc<dyn HttpTransport>>,
    cache: DashMap<Platform, Arc<dyn PlatformConnector>>,
}

impl ConnectorFactory {
    pub fn new(platforms: PlatformsConfig, services: GatewayServices) -> Self {
        Self {
            platforms,
            services,
            transport: None,
            cache: DashMap::new(),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn services(&self) -> &GatewayServices {
        &self.services
    }

    /// Connector for a platform identifier such as `"shopee"`.
    pub fn create(&self, id: &str) -> GatewayResult<Arc<dyn PlatformConnector>> {
        self.connector(id.parse()?)
    }

    pub fn connector(&self, platform: Platform) -> GatewayResult<Arc<dyn PlatformConnector>> {
        if let Some(cached) = self.cache.get(&platform) {
            return Ok(Arc::clone(cached.value()));
        }
        let built = self.build(platform)?;
        let entry = self.cache.entry(platform).or_insert(built);
        Ok(Arc::clone(entry.value()))
    }

    fn build(&self, platform: Platform) -> GatewayResult<Arc<dyn PlatformConnector>> {
        let config = self.platforms.get(platform).clone();
        let transport: Arc<dyn HttpTransport> = match &self.transport {
            Some(shared) => Arc::clone(shared),
            None => Arc::new(ReqwestTransport::new(
                &self.services.http,
                &self.services.guard,
                Some(DomainAllowList::new(&config.allowed_domains)),
            )?),
        };
        let ctx = ConnectorContext::new(platform, config, self.services.clone(), transport);
        let connector: Arc<dyn PlatformConnector> = match platform {
            Platform::Shopee => Arc::new(ShopeeConnector::new(ctx)),
            Platform::Lazada => Arc::new(LazadaConnector::new(ctx)),
            Platform::Shopify => Arc::new(ShopifyConnector::new(ctx)),
            Platform::Tiktok => Arc::new(TiktokConnector::new(ctx)),
        };
        tracing::info!(platform = %platform, "Connector created");
        Ok(connector)
    }

    pub fn available_platforms(&self) -> Vec<PlatformInfo> {
        Platform::ALL
            .into_iter()
            .map(|platform| {
                let config = self.platforms.get(platform);
                PlatformInfo {
                    platform,
                    name: platform.display_name(),
                    enabled: config.enabled,
                    sandbox: config.sandbox,
                    auth_scheme: platform.auth_scheme(),
                    rate_limits: config.rate_limit,
                    has_credentials: self.services.vault.has_credentials(platform),
                }
            })
            .collect()
    }

    pub fn configuration_schema(&self, id: &str) -> GatewayResult<BTreeMap<String, FieldSpec>> {
        Ok(schema_map(id.parse()?))
    }

    pub fn statistics(&self) -> FactoryStatistics {
        FactoryStatistics {
            total_platforms: Platform::ALL.len(),
            enabled_platforms: self.platforms.enabled().len(),
            cached_connectors: self.cache.len(),
            platforms_with_credentials: Platform::ALL
                .into_iter()
                .filter(|p| self.services.vault.has_credentials(*p))
                .count(),
            open_circuits: self.services.circuits.open_circuits(),
        }
    }

    /// Connectors for every enabled platform; build failures are logged
    /// and skipped.
    pub fn enabled_connectors(&self) -> Vec<Arc<dyn PlatformConnector>> {
        self.platforms
            .enabled()
            .into_iter()
            .filter_map(|platform| match self.connector(platform) {
                Ok(connector) => Some(connector),
                Err(e) => {
                    tracing::error!(platform = %platform, error = %e, "Failed to build connector");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::testing::{fields, services, ScriptedTransport};

    fn factory() -> ConnectorFactory {
        let mut platforms = PlatformsConfig::default();
        platforms.shopee.enabled = true;
        platforms.tiktok.enabled = true;
        ConnectorFactory::new(platforms, services()).with_transport(ScriptedTransport::new(Vec::new()))
    }

    #[test]
    fn test_create_caches_per_platform() {
        let factory = factory();
        let first = factory.create("shopee").unwrap();
        let second = factory.create("SHOPEE").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.platform(), Platform::Shopee);
        assert_eq!(factory.statistics().cached_connectors, 1);
    }

    #[test]
    fn test_unknown_platform() {
        let err = factory().create("amazon").err().unwrap();
        assert_eq!(err.reason_code(), "unsupported_platform");
        assert!(factory().configuration_schema("ebay").is_err());
    }

    #[test]
    fn test_each_platform_builds_its_variant() {
        let factory = factory();
        for platform in Platform::ALL {
            let connector = factory.connector(platform).unwrap();
            assert_eq!(connector.platform(), platform);
            assert_eq!(
                connector.configuration_schema().len(),
                platform.credential_schema().len()
            );
        }
    }

    #[test]
    fn test_builds_real_transport_without_override() {
        let factory = ConnectorFactory::new(PlatformsConfig::default(), services());
        assert!(factory.create("lazada").is_ok());
    }

    #[test]
    fn test_statistics_and_listing() {
        let factory = factory();
        factory
            .services()
            .vault
            .store_credentials(
                Platform::Tiktok,
                fields(&[
                    ("app_key", "k"),
                    ("app_secret", "s"),
                    ("access_token", "t"),
                    ("shop_id", "1"),
                ]),
            )
            .unwrap();

        let stats = factory.statistics();
        assert_eq!(stats.total_platforms, 4);
        assert_eq!(stats.enabled_platforms, 2);
        assert_eq!(stats.platforms_with_credentials, 1);
        assert_eq!(stats.open_circuits, 0);

        let listing = factory.available_platforms();
        assert_eq!(listing.len(), 4);
        assert!(listing.iter().any(|p| p.platform == Platform::Tiktok && p.has_credentials));
        assert_eq!(factory.enabled_connectors().len(), 2);
    }
}
