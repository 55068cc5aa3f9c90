//! Integration tests for kgraph
//!
//! These tests drive the full stack (SQLite graph store, cache, query service,
//! ingestion, HTTP router) the way a deployment would.

use kgraph::cache::{CacheStore, SideCache, SqliteCache, SqliteCacheConfig};
use kgraph::config::{CacheBackend, KgraphConfig};
use kgraph::graph::{Label, NodeId, NodeRef, Properties, RelType};
use kgraph::ingest::{EndpointIdPolicy, RawRecord, ENDPOINT_LABEL};
use kgraph::service::{QuerySettings, QueryService, MESSAGE_FOUND, MESSAGE_NOT_FOUND};
use kgraph::store::{GraphStore, PoolConfig, SqliteGraphStore};
use kgraph::{App, KgraphError};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Service over SQLite store and SQLite cache, plus direct handles to both
struct Harness {
    service: QueryService,
    store: Arc<SqliteGraphStore>,
    cache: Arc<SqliteCache>,
    _dir: TempDir,
}

async fn harness() -> Harness {
    harness_with_pool(8).await
}

async fn harness_with_pool(size: usize) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(
        SqliteGraphStore::open(PoolConfig {
            size,
            ..PoolConfig::new(dir.path().join("graph.db"))
        })
        .await
        .unwrap(),
    );
    let cache = Arc::new(
        SqliteCache::new(SqliteCacheConfig {
            path: dir.path().join("cache.db"),
            wal_mode: true,
        })
        .unwrap(),
    );
    let service = QueryService::new(
        store.clone(),
        SideCache::new(cache.clone(), Duration::from_secs(60)),
        QuerySettings::default(),
    );

    Harness {
        service,
        store,
        cache,
        _dir: dir,
    }
}

fn props(value: Value) -> Properties {
    value.as_object().cloned().unwrap()
}

fn label(s: &str) -> Label {
    Label::new(s).unwrap()
}

fn id(s: &str) -> NodeId {
    NodeId::new(s).unwrap()
}

mod scenario_tests {
    use super::*;

    #[tokio::test]
    async fn test_scenario_a_upsert_then_get() {
        let h = harness().await;
        h.service
            .upsert_node(&label("Person"), props(json!({"id": "p1", "name": "Alice"})))
            .await
            .unwrap();

        let node = h
            .service
            .get_node(&label("Person"), &id("p1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(Value::Object(node.properties), json!({"id": "p1", "name": "Alice"}));
    }

    #[tokio::test]
    async fn test_scenario_b_second_upsert_overwrites() {
        let h = harness().await;
        let person = label("Person");
        h.service
            .upsert_node(&person, props(json!({"id": "p1", "name": "Alice"})))
            .await
            .unwrap();
        h.service
            .upsert_node(&person, props(json!({"id": "p1", "name": "Alice B."})))
            .await
            .unwrap();

        let node = h.service.get_node(&person, &id("p1")).await.unwrap().unwrap();
        assert_eq!(node.name(), Some("Alice B."));
        assert_eq!(h.store.count_nodes(&person).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_scenario_c_missing_node_is_not_an_error() {
        let h = harness().await;
        let response = h
            .service
            .query_node(&label("City"), Some(&id("nonexistent")))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.message, MESSAGE_NOT_FOUND);
        assert!(response.data.is_empty());
    }

    #[tokio::test]
    async fn test_scenario_d_endpoint_missing() {
        let h = harness().await;
        let p1 = props(json!({"id": "p1"}));
        h.service.upsert_node(&label("Person"), p1.clone()).await.unwrap();

        let err = h
            .service
            .upsert_relationship(
                &label("Person"),
                &p1,
                &label("Company"),
                &props(json!({"id": "c1"})),
                &RelType::new("WORKS_AT").unwrap(),
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, KgraphError::EndpointMissing { .. }));
        assert!(!err.is_server_error());
        assert_eq!(h.store.count_relationships().await.unwrap(), 0);
        assert_eq!(h.store.count_nodes(&label("Company")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scenario_e_delete_clears_cache() {
        let h = harness().await;
        let person = label("Person");
        h.service
            .upsert_node(&person, props(json!({"id": "p1", "name": "Alice"})))
            .await
            .unwrap();
        h.service.get_node(&person, &id("p1")).await.unwrap();
        assert!(h.cache.get("Person:p1").await.unwrap().is_some());

        assert!(h.service.delete_node(&person, &id("p1")).await.unwrap());

        assert!(h.service.get_node(&person, &id("p1")).await.unwrap().is_none());
        assert_eq!(h.cache.get("Person:p1").await.unwrap(), None);
    }
}

mod merge_tests {
    use super::*;

    #[tokio::test]
    async fn test_repeated_upserts_are_idempotent() {
        let h = harness().await;
        let person = label("Person");
        let input = props(json!({"id": "p1", "name": "Alice", "age": 30}));

        let first = h.service.upsert_node(&person, input.clone()).await.unwrap();
        for _ in 0..5 {
            let again = h.service.upsert_node(&person, input.clone()).await.unwrap();
            assert_eq!(again.properties, first.properties);
        }
        assert_eq!(h.store.count_nodes(&person).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cached_read_matches_store_read() {
        let h = harness().await;
        let person = label("Person");
        h.service
            .upsert_node(&person, props(json!({"id": "p1", "name": "Alice", "tags": ["a", "b"]})))
            .await
            .unwrap();

        let direct = h.store.get_node(&person, &id("p1")).await.unwrap().unwrap();
        let cached_raw = h.cache.get("Person:p1").await.unwrap().unwrap();
        assert_eq!(cached_raw, serde_json::to_string(&direct.properties).unwrap());

        let via_cache = h.service.get_node(&person, &id("p1")).await.unwrap().unwrap();
        assert_eq!(via_cache, direct);
    }

    #[tokio::test]
    async fn test_relationship_upsert_and_cascade() {
        let h = harness().await;
        let p1 = props(json!({"id": "p1"}));
        let c1 = props(json!({"id": "c1"}));
        h.service.upsert_node(&label("Person"), p1.clone()).await.unwrap();
        h.service.upsert_node(&label("Company"), c1.clone()).await.unwrap();

        let works_at = RelType::new("WORKS_AT").unwrap();
        for _ in 0..3 {
            h.service
                .upsert_relationship(
                    &label("Person"),
                    &p1,
                    &label("Company"),
                    &c1,
                    &works_at,
                    Some(props(json!({"since": 2020}))),
                )
                .await
                .unwrap();
        }
        assert_eq!(h.store.count_relationships().await.unwrap(), 1);

        let start = NodeRef::new(label("Person"), id("p1"));
        let end = NodeRef::new(label("Company"), id("c1"));
        let rel = h
            .service
            .get_relationship(&start, &end, &works_at)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rel.properties["since"], json!(2020));

        h.service.delete_node(&label("Company"), &id("c1")).await.unwrap();
        assert_eq!(h.store.count_relationships().await.unwrap(), 0);
        assert!(h
            .service
            .get_relationship(&start, &end, &works_at)
            .await
            .unwrap()
            .is_none());
    }
}

mod concurrency_tests {
    use super::*;
    use futures::future::join_all;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_upserts_leave_one_node() {
        let h = Arc::new(harness().await);
        let person = label("Person");

        let writes = (0..40).map(|i| {
            let h = Arc::clone(&h);
            let person = person.clone();
            tokio::spawn(async move {
                let mut properties = props(json!({"id": "p1", "name": format!("writer-{}", i)}));
                properties.insert(format!("k{}", i % 5), json!(i));
                h.service.upsert_node(&person, properties).await
            })
        });
        for result in join_all(writes).await {
            result.unwrap().unwrap();
        }

        assert_eq!(h.store.count_nodes(&person).await.unwrap(), 1);
        let node = h.store.get_node(&person, &id("p1")).await.unwrap().unwrap();
        // Union across keys: every distinct key some writer set survives
        for k in 0..5 {
            assert!(node.properties.contains_key(&format!("k{}", k)));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_small_pool_applies_backpressure() {
        let h = Arc::new(harness_with_pool(2).await);
        let city = label("City");

        let writes = (0..20).map(|i| {
            let h = Arc::clone(&h);
            let city = city.clone();
            tokio::spawn(async move {
                h.service
                    .upsert_node(&city, props(json!({"id": format!("c{}", i)})))
                    .await
            })
        });
        for result in join_all(writes).await {
            result.unwrap().unwrap();
        }

        assert_eq!(h.store.count_nodes(&city).await.unwrap(), 20);
        assert_eq!(h.store.pool().available(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_relationship_upserts_merge() {
        let h = Arc::new(harness().await);
        let p1 = props(json!({"id": "p1"}));
        let c1 = props(json!({"id": "c1"}));
        h.service.upsert_node(&label("Person"), p1.clone()).await.unwrap();
        h.service.upsert_node(&label("Company"), c1.clone()).await.unwrap();
        let works_at = RelType::new("WORKS_AT").unwrap();

        let writes = (0..30).map(|i| {
            let h = Arc::clone(&h);
            let (p1, c1, works_at) = (p1.clone(), c1.clone(), works_at.clone());
            tokio::spawn(async move {
                let mut rel_props = props(json!({"writer": i}));
                rel_props.insert(format!("k{}", i % 5), json!(i));
                h.service
                    .upsert_relationship(
                        &label("Person"),
                        &p1,
                        &label("Company"),
                        &c1,
                        &works_at,
                        Some(rel_props),
                    )
                    .await
            })
        });
        for result in join_all(writes).await {
            result.unwrap().unwrap();
        }

        assert_eq!(h.store.count_relationships().await.unwrap(), 1);
        let rel = h
            .store
            .get_relationship(
                &NodeRef::new(label("Person"), id("p1")),
                &NodeRef::new(label("Company"), id("c1")),
                &works_at,
            )
            .await
            .unwrap()
            .unwrap();
        assert!(rel.properties.contains_key("writer"));
        for k in 0..5 {
            assert!(rel.properties.contains_key(&format!("k{}", k)));
        }
    }
}

mod timeout_tests {
    use super::*;
    use kgraph::graph::Node;
    use std::path::PathBuf;
    use tokio::task::JoinHandle;

    /// Take SQLite's write lock on another connection and keep it for `hold`
    async fn hold_write_lock(path: PathBuf, hold: Duration) -> JoinHandle<()> {
        let (locked_tx, locked_rx) = tokio::sync::oneshot::channel();
        let holder = tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute_batch("BEGIN IMMEDIATE").unwrap();
            locked_tx.send(()).unwrap();
            std::thread::sleep(hold);
            conn.execute_batch("COMMIT").unwrap();
        });
        locked_rx.await.unwrap();
        holder
    }

    /// Service over the harness backends with a short operation deadline
    fn impatient_service(h: &Harness) -> QueryService {
        QueryService::new(
            h.store.clone(),
            SideCache::new(h.cache.clone(), Duration::from_secs(60)),
            QuerySettings {
                operation_timeout: Duration::from_millis(200),
                ..QuerySettings::default()
            },
        )
    }

    /// Poll the store until the late write has committed
    async fn wait_for_store<F>(h: &Harness, done: F)
    where
        F: Fn(Option<Node>) -> bool,
    {
        for _ in 0..100 {
            let node = h.store.get_node(&label("Person"), &id("p1")).await.unwrap();
            if done(node) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("write never committed");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_timed_out_delete_does_not_leave_cached_node() {
        let h = harness().await;
        let service = impatient_service(&h);
        let person = label("Person");
        service
            .upsert_node(&person, props(json!({"id": "p1", "name": "Alice"})))
            .await
            .unwrap();
        service.get_node(&person, &id("p1")).await.unwrap();
        service.query_node(&person, None).await.unwrap();

        let holder = hold_write_lock(h._dir.path().join("graph.db"), Duration::from_millis(600)).await;
        let err = service.delete_node(&person, &id("p1")).await.unwrap_err();
        assert!(matches!(err, KgraphError::BackendUnavailable(_)));
        holder.await.unwrap();

        // The abandoned delete still commits once the lock is released
        wait_for_store(&h, |node| node.is_none()).await;
        assert!(service.get_node(&person, &id("p1")).await.unwrap().is_none());
        assert!(!service.query_node(&person, None).await.unwrap().is_found());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_timed_out_upsert_drops_stale_payload() {
        let h = harness().await;
        let service = impatient_service(&h);
        let person = label("Person");
        service
            .upsert_node(&person, props(json!({"id": "p1", "name": "Alice"})))
            .await
            .unwrap();
        assert!(h.cache.get("Person:p1").await.unwrap().is_some());

        let holder = hold_write_lock(h._dir.path().join("graph.db"), Duration::from_millis(600)).await;
        assert!(service
            .upsert_node(&person, props(json!({"id": "p1", "name": "Bob"})))
            .await
            .is_err());
        assert_eq!(h.cache.get("Person:p1").await.unwrap(), None);
        holder.await.unwrap();

        wait_for_store(&h, |node| node.and_then(|n| n.name().map(str::to_string)) == Some("Bob".to_string())).await;
        let node = service.get_node(&person, &id("p1")).await.unwrap().unwrap();
        assert_eq!(node.name(), Some("Bob"));
    }
}

mod ingest_tests {
    use super::*;

    fn app_config(dir: &TempDir) -> KgraphConfig {
        let mut config = KgraphConfig::new();
        config.graph.path = dir.path().join("graph.db");
        config.graph.pool_size = 4;
        config.cache.backend = CacheBackend::Sqlite;
        config.cache.path = dir.path().join("cache.db");
        config
    }

    #[tokio::test]
    async fn test_ingest_role_sentences() {
        let dir = TempDir::new().unwrap();
        let app = App::open(app_config(&dir)).await.unwrap();
        let pipeline = app.pipeline();

        let records = vec![
            RawRecord::new("马云是阿里巴巴的创始人，也是CEO。"),
            RawRecord::new("马云创办了阿里巴巴的淘宝"),
        ];
        let report = pipeline.ingest_records(&records).await.unwrap();
        assert_eq!(report.texts, 2);
        assert_eq!(report.relationships_upserted, 2);

        // Endpoints are shared by name across texts
        let service = app.service();
        let entity = label(ENDPOINT_LABEL);
        let ma = service.find_node_by_name(&entity, "马云").await.unwrap().unwrap();
        let listed = service.query_node(&entity, None).await.unwrap();
        assert_eq!(listed.message, MESSAGE_FOUND);
        assert_eq!(
            listed
                .data
                .iter()
                .filter(|p| p["name"] == json!("马云"))
                .count(),
            1
        );
        assert!(ma.id().is_some());

        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_ingest_file_twice_does_not_duplicate() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input.json");
        std::fs::write(
            &input,
            serde_json::to_string(&json!([
                {"raw_text": "马云是阿里巴巴的创办人"},
                {"raw_text": "!!!"}
            ]))
            .unwrap(),
        )
        .unwrap();

        let app = App::open(app_config(&dir)).await.unwrap();
        let first = app.pipeline().ingest_file(&input).await.unwrap();
        let second = app.pipeline().ingest_file(&input).await.unwrap();

        assert_eq!(first.texts, 2);
        assert_eq!(second.endpoints_reused, 2);

        let store = app.service();
        let entity = label(ENDPOINT_LABEL);
        assert_eq!(store.store().count_nodes(&entity).await.unwrap(), 2);
        assert_eq!(store.store().count_relationships().await.unwrap(), 1);

        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_fresh_policy_from_config() {
        let dir = TempDir::new().unwrap();
        let mut config = app_config(&dir);
        config.ingest.endpoint_id_policy = EndpointIdPolicy::Fresh;

        let app = App::open(config).await.unwrap();
        let records = vec![RawRecord::new("马云是阿里巴巴的创办人")];
        app.pipeline().ingest_records(&records).await.unwrap();
        app.pipeline().ingest_records(&records).await.unwrap();

        let entity = label(ENDPOINT_LABEL);
        assert_eq!(app.service().store().count_nodes(&entity).await.unwrap(), 4);

        app.shutdown().await;
    }
}

mod http_tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use kgraph::server::QueryServer;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_query_node_over_http_uses_cache() {
        let dir = TempDir::new().unwrap();
        let mut config = KgraphConfig::new();
        config.graph.path = dir.path().join("graph.db");
        config.cache.namespace = Some("kg".to_string());

        let app = App::open(config).await.unwrap();
        app.service()
            .upsert_node(&label("Person"), props(json!({"id": "p1", "name": "Alice"})))
            .await
            .unwrap();

        let server = QueryServer::new(app.service());
        for _ in 0..2 {
            let response = server
                .router()
                .oneshot(
                    Request::builder()
                        .uri("/query_node?label=Person&node_id=p1")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let body: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body["message"], json!("succeed"));
            assert_eq!(body["data"][0]["name"], json!("Alice"));
        }

        let key = kgraph::cache::CacheKey::query_node(&label("Person"), Some(&id("p1")));
        assert_eq!(app.service().cache().storage_key(&key), "kg:query_node:Person:p1");
        assert!(app.service().cache().get(&key).await.is_some());

        app.shutdown().await;
    }
}

mod config_tests {
    use super::*;

    #[test]
    fn test_config_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = KgraphConfig::new();
        config.graph.path = dir.path().join("graph.db");
        config.cache.ttl_secs = 3600;
        config.save(&path).unwrap();

        let loaded = KgraphConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(kgraph::config::validate_config(&loaded).is_ok());
    }

    #[tokio::test]
    async fn test_app_rejects_out_of_range_ttl() {
        let dir = TempDir::new().unwrap();
        let mut config = KgraphConfig::new();
        config.graph.path = dir.path().join("graph.db");
        config.cache.ttl_secs = 7200;

        let err = App::open(config).await.err().unwrap();
        assert!(err.to_string().contains("cache.ttl_secs"));
    }
}
