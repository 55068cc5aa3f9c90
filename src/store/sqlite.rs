//! SQLite graph store
//!
//! Nodes and relationships live in two tables whose primary keys are the merge
//! keys, so the database itself refuses duplicates. Every write runs in a
//! `BEGIN IMMEDIATE` transaction: the read-merge-write of one upsert cannot
//! interleave with another writer, and concurrent upserts of the same node
//! serialize with last-writer-wins per property.
//!
//! Labels and relation types are bound as parameters like every other value;
//! no caller text is ever spliced into SQL.

use super::pool::{ConnectionPool, PoolConfig};
use super::GraphStore;
use crate::graph::{
    merge_properties, require_id, Label, Node, NodeId, NodeRef, Properties, RelType, Relationship,
};
use crate::{KgraphError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

/// Pooled SQLite-backed graph store
pub struct SqliteGraphStore {
    pool: ConnectionPool,
}

fn parse_properties(raw: &str) -> Result<Properties> {
    Ok(serde_json::from_str(raw)?)
}

fn name_of(properties: &Properties) -> Option<String> {
    properties
        .get("name")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn node_exists(conn: &Connection, label: &str, id: &str) -> Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM nodes WHERE label = ?1 AND id = ?2",
            params![label, id],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

fn rows_to_nodes(label: &Label, rows: Vec<String>) -> Result<Vec<Node>> {
    rows.iter()
        .map(|raw| Ok(Node::new(label.clone(), parse_properties(raw)?)))
        .collect()
}

impl SqliteGraphStore {
    /// Open (or create) a store and initialize the schema
    pub async fn open(config: PoolConfig) -> Result<Self> {
        let store = Self {
            pool: ConnectionPool::new(config)?,
        };
        store.pool.run(Self::init_schema).await?;
        Ok(store)
    }

    /// Initialize database schema
    fn init_schema(conn: &mut Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                label TEXT NOT NULL,
                id TEXT NOT NULL,
                name TEXT,
                properties TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (label, id)
            );

            CREATE TABLE IF NOT EXISTS relationships (
                start_label TEXT NOT NULL,
                start_id TEXT NOT NULL,
                end_label TEXT NOT NULL,
                end_id TEXT NOT NULL,
                rel_type TEXT NOT NULL,
                properties TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (start_label, start_id, end_label, end_id, rel_type),
                FOREIGN KEY (start_label, start_id) REFERENCES nodes(label, id) ON DELETE CASCADE,
                FOREIGN KEY (end_label, end_id) REFERENCES nodes(label, id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_label_name ON nodes(label, name);
            CREATE INDEX IF NOT EXISTS idx_relationships_end ON relationships(end_label, end_id);
            "#,
        )?;

        Ok(())
    }

    /// Access the underlying pool (sizing, shutdown)
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn upsert_node(&self, label: &Label, properties: Properties) -> Result<Node> {
        let id = require_id(&properties)?;
        let label = label.clone();

        self.pool
            .run(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let existing: Option<String> = tx
                    .query_row(
                        "SELECT properties FROM nodes WHERE label = ?1 AND id = ?2",
                        params![label.as_str(), id.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?;

                let merged = match existing {
                    Some(raw) => {
                        let mut current = parse_properties(&raw)?;
                        merge_properties(&mut current, &properties);
                        current
                    }
                    None => properties,
                };

                let now = Utc::now().to_rfc3339();
                tx.execute(
                    r#"
                    INSERT INTO nodes (label, id, name, properties, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                    ON CONFLICT(label, id) DO UPDATE SET
                        name = excluded.name,
                        properties = excluded.properties,
                        updated_at = excluded.updated_at
                    "#,
                    params![
                        label.as_str(),
                        id.as_str(),
                        name_of(&merged),
                        serde_json::to_string(&merged)?,
                        now,
                    ],
                )?;
                tx.commit()?;

                tracing::debug!(label = %label, id = %id, "Node merged");
                Ok(Node::new(label, merged))
            })
            .await
    }

    async fn upsert_relationship(
        &self,
        start_label: &Label,
        start_props: &Properties,
        end_label: &Label,
        end_props: &Properties,
        rel_type: &RelType,
        rel_props: Option<Properties>,
    ) -> Result<Relationship> {
        let start = NodeRef::new(start_label.clone(), require_id(start_props)?);
        let end = NodeRef::new(end_label.clone(), require_id(end_props)?);
        let rel_type = rel_type.clone();
        let rel_props = rel_props.unwrap_or_default();

        self.pool
            .run(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let missing: Vec<String> = [&start, &end]
                    .into_iter()
                    .filter_map(|r| {
                        match node_exists(&tx, r.label.as_str(), r.id.as_str()) {
                            Ok(true) => None,
                            Ok(false) => Some(Ok(r.to_string())),
                            Err(e) => Some(Err(e)),
                        }
                    })
                    .collect::<Result<_>>()?;
                if !missing.is_empty() {
                    // Dropping the transaction rolls back; nothing was written
                    return Err(KgraphError::EndpointMissing { missing });
                }

                let existing: Option<String> = tx
                    .query_row(
                        r#"
                        SELECT properties FROM relationships
                        WHERE start_label = ?1 AND start_id = ?2
                          AND end_label = ?3 AND end_id = ?4 AND rel_type = ?5
                        "#,
                        params![
                            start.label.as_str(),
                            start.id.as_str(),
                            end.label.as_str(),
                            end.id.as_str(),
                            rel_type.as_str(),
                        ],
                        |row| row.get(0),
                    )
                    .optional()?;

                let merged = match existing {
                    Some(raw) => {
                        let mut current = parse_properties(&raw)?;
                        merge_properties(&mut current, &rel_props);
                        current
                    }
                    None => rel_props,
                };

                let now = Utc::now().to_rfc3339();
                tx.execute(
                    r#"
                    INSERT INTO relationships (
                        start_label, start_id, end_label, end_id, rel_type,
                        properties, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                    ON CONFLICT(start_label, start_id, end_label, end_id, rel_type) DO UPDATE SET
                        properties = excluded.properties,
                        updated_at = excluded.updated_at
                    "#,
                    params![
                        start.label.as_str(),
                        start.id.as_str(),
                        end.label.as_str(),
                        end.id.as_str(),
                        rel_type.as_str(),
                        serde_json::to_string(&merged)?,
                        now,
                    ],
                )?;
                tx.commit()?;

                tracing::debug!(start = %start, end = %end, rel_type = %rel_type, "Relationship merged");
                Ok(Relationship {
                    start,
                    end,
                    rel_type,
                    properties: merged,
                })
            })
            .await
    }

    async fn get_node(&self, label: &Label, id: &NodeId) -> Result<Option<Node>> {
        let label = label.clone();
        let id = id.clone();

        self.pool
            .run(move |conn| {
                let raw: Option<String> = conn
                    .query_row(
                        "SELECT properties FROM nodes WHERE label = ?1 AND id = ?2",
                        params![label.as_str(), id.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?;

                raw.map(|raw| Ok(Node::new(label, parse_properties(&raw)?)))
                    .transpose()
            })
            .await
    }

    async fn delete_node(&self, label: &Label, id: &NodeId) -> Result<bool> {
        let label = label.clone();
        let id = id.clone();

        self.pool
            .run(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let detached = tx.execute(
                    r#"
                    DELETE FROM relationships
                    WHERE (start_label = ?1 AND start_id = ?2)
                       OR (end_label = ?1 AND end_id = ?2)
                    "#,
                    params![label.as_str(), id.as_str()],
                )?;
                let deleted = tx.execute(
                    "DELETE FROM nodes WHERE label = ?1 AND id = ?2",
                    params![label.as_str(), id.as_str()],
                )?;
                tx.commit()?;

                if deleted > 0 {
                    tracing::info!(label = %label, id = %id, detached, "Deleted node");
                }
                Ok(deleted > 0)
            })
            .await
    }

    async fn nodes_by_label(&self, label: &Label, limit: usize) -> Result<Vec<Node>> {
        let label = label.clone();

        self.pool
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT properties FROM nodes WHERE label = ?1 ORDER BY id LIMIT ?2",
                )?;
                // A negative LIMIT means unlimited to SQLite
                let limit = i64::try_from(limit).unwrap_or(i64::MAX);
                let rows = stmt
                    .query_map(params![label.as_str(), limit], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;

                rows_to_nodes(&label, rows)
            })
            .await
    }

    async fn find_node_by_name(&self, label: &Label, name: &str) -> Result<Option<Node>> {
        let label = label.clone();
        let name = name.to_string();

        self.pool
            .run(move |conn| {
                let raw: Option<String> = conn
                    .query_row(
                        "SELECT properties FROM nodes WHERE label = ?1 AND name = ?2 ORDER BY id LIMIT 1",
                        params![label.as_str(), name],
                        |row| row.get(0),
                    )
                    .optional()?;

                raw.map(|raw| Ok(Node::new(label, parse_properties(&raw)?)))
                    .transpose()
            })
            .await
    }

    async fn get_relationship(
        &self,
        start: &NodeRef,
        end: &NodeRef,
        rel_type: &RelType,
    ) -> Result<Option<Relationship>> {
        let start = start.clone();
        let end = end.clone();
        let rel_type = rel_type.clone();

        self.pool
            .run(move |conn| {
                let raw: Option<String> = conn
                    .query_row(
                        r#"
                        SELECT properties FROM relationships
                        WHERE start_label = ?1 AND start_id = ?2
                          AND end_label = ?3 AND end_id = ?4 AND rel_type = ?5
                        "#,
                        params![
                            start.label.as_str(),
                            start.id.as_str(),
                            end.label.as_str(),
                            end.id.as_str(),
                            rel_type.as_str(),
                        ],
                        |row| row.get(0),
                    )
                    .optional()?;

                raw.map(|raw| {
                    Ok(Relationship {
                        start,
                        end,
                        rel_type,
                        properties: parse_properties(&raw)?,
                    })
                })
                .transpose()
            })
            .await
    }

    async fn count_nodes(&self, label: &Label) -> Result<usize> {
        let label = label.clone();
        self.pool
            .run(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM nodes WHERE label = ?1",
                    params![label.as_str()],
                    |row| row.get(0),
                )?;
                Ok(count as usize)
            })
            .await
    }

    async fn count_relationships(&self) -> Result<usize> {
        self.pool
            .run(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM relationships", [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
    }

    async fn close(&self) {
        self.pool.close();
    }
}
