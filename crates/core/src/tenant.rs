use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::clock::Clock;
use crate::domain::tenant::{TenantConfig, TenantId};
use crate::errors::ApplicationError;

#[async_trait]
pub trait TenantConfigSource: Send + Sync {
    /// `Ok(None)` when the tenant has no stored configuration.
    async fn load(&self, tenant_id: &TenantId) -> Result<Option<TenantConfig>, ApplicationError>;
}

#[derive(Clone, Debug)]
struct CachedConfig {
    config: Arc<TenantConfig>,
    loaded_at: DateTime<Utc>,
}

/// Read-through TTL cache over a [`TenantConfigSource`]. Resolved configs are shared
/// immutably by every session of the tenant until they expire or are invalidated.
pub struct TenantConfigResolver {
    source: Arc<dyn TenantConfigSource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    cache: RwLock<HashMap<TenantId, CachedConfig>>,
}

impl TenantConfigResolver {
    pub fn new(source: Arc<dyn TenantConfigSource>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { source, clock, ttl, cache: RwLock::new(HashMap::new()) }
    }

    pub async fn resolve(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Arc<TenantConfig>, ApplicationError> {
        let now = self.clock.now();
        let stale = {
            let cache = self.cache.read().await;
            match cache.get(tenant_id) {
                Some(entry) if now - entry.loaded_at < self.ttl => {
                    return Ok(Arc::clone(&entry.config));
                }
                Some(entry) => Some(Arc::clone(&entry.config)),
                None => None,
            }
        };

        let loaded = match self.source.load(tenant_id).await {
            Ok(loaded) => loaded,
            Err(error) => {
                if let Some(config) = stale {
                    tracing::warn!(
                        event_name = "tenant.refresh_failed",
                        tenant_id = %tenant_id,
                        error = %error,
                        "serving expired tenant config after refresh failure"
                    );
                    return Ok(config);
                }
                return Err(error);
            }
        };

        let config = Arc::new(match loaded {
            Some(config) => config,
            None => {
                tracing::warn!(
                    event_name = "tenant.config_missing",
                    tenant_id = %tenant_id,
                    "no stored tenant config; using fallback"
                );
                TenantConfig::fallback(tenant_id.clone())
            }
        });

        let entry = CachedConfig { config: Arc::clone(&config), loaded_at: now };
        self.cache.write().await.insert(tenant_id.clone(), entry);
        Ok(config)
    }

    pub async fn invalidate(&self, tenant_id: &TenantId) -> bool {
        let removed = self.cache.write().await.remove(tenant_id).is_some();
        tracing::info!(
            event_name = "tenant.cache_invalidated",
            tenant_id = %tenant_id,
            removed,
            "tenant config cache invalidated"
        );
        removed
    }

    pub async fn invalidate_all(&self) {
        self.cache.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};

    use super::{TenantConfigResolver, TenantConfigSource};
    use crate::clock::FixedClock;
    use crate::domain::tenant::{TenantConfig, TenantId};
    use crate::errors::ApplicationError;

    #[derive(Default)]
    struct CountingSource {
        loads: AtomicUsize,
        failing: AtomicBool,
        missing: AtomicBool,
    }

    #[async_trait]
    impl TenantConfigSource for CountingSource {
        async fn load(
            &self,
            tenant_id: &TenantId,
        ) -> Result<Option<TenantConfig>, ApplicationError> {
            let count = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failing.load(Ordering::SeqCst) {
                return Err(ApplicationError::Persistence("database offline".to_string()));
            }
            if self.missing.load(Ordering::SeqCst) {
                return Ok(None);
            }
            let mut config = TenantConfig::fallback(tenant_id.clone());
            config.business_name = format!("Escola v{count}");
            Ok(Some(config))
        }
    }

    fn fixture() -> (TenantConfigResolver, Arc<CountingSource>, FixedClock, TenantId) {
        let source = Arc::new(CountingSource::default());
        let clock = FixedClock::new(
            Utc.with_ymd_and_hms(2026, 4, 6, 13, 0, 0).single().expect("valid instant"),
        );
        let resolver = TenantConfigResolver::new(
            source.clone(),
            Arc::new(clock.clone()),
            Duration::seconds(300),
        );
        (resolver, source, clock, TenantId("escola".to_string()))
    }

    #[tokio::test]
    async fn cached_until_ttl_expires() {
        let (resolver, source, clock, tenant) = fixture();

        let first = resolver.resolve(&tenant).await.expect("first resolve");
        clock.advance(Duration::seconds(299));
        let cached = resolver.resolve(&tenant).await.expect("cached resolve");
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        assert_eq!(first.business_name, cached.business_name);

        clock.advance(Duration::seconds(1));
        let refreshed = resolver.resolve(&tenant).await.expect("refreshed resolve");
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
        assert_eq!(refreshed.business_name, "Escola v2");
    }

    #[tokio::test]
    async fn invalidate_forces_reload() {
        let (resolver, source, _clock, tenant) = fixture();

        resolver.resolve(&tenant).await.expect("resolve");
        assert!(resolver.invalidate(&tenant).await);
        assert!(!resolver.invalidate(&tenant).await);
        resolver.resolve(&tenant).await.expect("resolve after invalidate");

        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_config_resolves_to_fallback() {
        let (resolver, source, _clock, tenant) = fixture();
        source.missing.store(true, Ordering::SeqCst);

        let config = resolver.resolve(&tenant).await.expect("fallback");
        assert_eq!(config.business_name, "escola");
        assert!(!config.menu.is_empty());
    }

    #[tokio::test]
    async fn refresh_failure_serves_stale_entry_but_cold_failure_propagates() {
        let (resolver, source, clock, tenant) = fixture();
        source.failing.store(true, Ordering::SeqCst);
        assert!(resolver.resolve(&tenant).await.is_err());

        source.failing.store(false, Ordering::SeqCst);
        resolver.resolve(&tenant).await.expect("warm cache");

        source.failing.store(true, Ordering::SeqCst);
        clock.advance(Duration::seconds(600));
        let stale = resolver.resolve(&tenant).await.expect("stale entry");
        assert_eq!(stale.business_name, "Escola v2");
    }
}
