//! Application context
//!
//! Everything a process needs (graph store, cache, query service, extraction
//! rules) is built once from a [`KgraphConfig`] and shared through `Arc`s.
//! There is no global client: callers hold an [`App`] and call
//! [`App::shutdown`] when they are done.

use crate::cache::{CacheStore, MemoryCache, SideCache, SqliteCache, SqliteCacheConfig};
use crate::config::{validate_config_result, CacheBackend, KgraphConfig};
use crate::ingest::IngestPipeline;
use crate::service::{QuerySettings, QueryService};
use crate::store::{GraphStore, SqliteGraphStore};
use crate::Result;
use kgraph_extract::RuleExtractor;
use std::sync::Arc;

/// Wired-up kgraph components
pub struct App {
    config: KgraphConfig,
    store: Arc<dyn GraphStore>,
    service: Arc<QueryService>,
    extractor: RuleExtractor,
}

impl App {
    /// Validate `config` and open every backend it names
    pub async fn open(config: KgraphConfig) -> Result<Self> {
        validate_config_result(&config)?;

        let store: Arc<dyn GraphStore> =
            Arc::new(SqliteGraphStore::open(config.graph.pool_config()).await?);

        let cache_store: Arc<dyn CacheStore> = match config.cache.backend {
            CacheBackend::Memory => Arc::new(MemoryCache::new(config.cache.max_entries)),
            CacheBackend::Sqlite => Arc::new(SqliteCache::new(SqliteCacheConfig {
                path: config.cache.path.clone(),
                wal_mode: true,
            })?),
        };
        let mut cache =
            SideCache::new(cache_store, config.cache.ttl()).with_timeout(config.cache.timeout());
        if let Some(namespace) = &config.cache.namespace {
            cache = cache.with_namespace(namespace.clone());
        }

        let service = Arc::new(QueryService::new(
            Arc::clone(&store),
            cache,
            QuerySettings {
                label_scan_limit: config.query.label_scan_limit,
                operation_timeout: config.graph.operation_timeout(),
            },
        ));

        let extractor = match &config.ingest.rules {
            Some(path) => RuleExtractor::from_path(path)?,
            None => RuleExtractor::with_default_rules(),
        };

        tracing::info!(
            graph = %config.graph.path.display(),
            cache_backend = ?config.cache.backend,
            ttl_secs = config.cache.ttl_secs,
            "kgraph ready"
        );

        Ok(Self {
            config,
            store,
            service,
            extractor,
        })
    }

    pub fn config(&self) -> &KgraphConfig {
        &self.config
    }

    pub fn service(&self) -> Arc<QueryService> {
        Arc::clone(&self.service)
    }

    /// Ingestion pipeline using the configured rules and id policy
    pub fn pipeline(&self) -> IngestPipeline {
        IngestPipeline::new(self.service(), Box::new(self.extractor.clone()))
            .with_policy(self.config.ingest.endpoint_id_policy)
    }

    /// Close the graph store; later operations fail with `BackendUnavailable`
    pub async fn shutdown(&self) {
        self.store.close().await;
        tracing::info!("kgraph shut down");
    }
}
