//! Ingestion pipeline
//!
//! Raw text is cleaned, handed to an [`Extractor`], and the resulting entities
//! and relations are merged into the graph through the query service (so the
//! cache stays coherent with every write).
//!
//! A relation endpoint named like an entity extracted from the same text is
//! that entity's node; any other endpoint is an `Entity` node. The adapter
//! never creates placeholder endpoints, so both endpoint nodes are upserted
//! before their relationship.

use crate::graph::{Label, NodeId, Properties, RelType};
use crate::metrics;
use crate::service::QueryService;
use crate::Result;
use kgraph_extract::{clean_text, Extraction, Extractor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Label given to relation endpoints
pub const ENDPOINT_LABEL: &str = "Entity";

/// How ingestion picks ids for extracted entities and relation endpoints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointIdPolicy {
    /// Reuse the id of an existing node with the same `(label, name)`
    #[default]
    ReuseByName,

    /// Generate a new id for every entity and endpoint
    Fresh,
}

/// One input record, as found in ingestion files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub raw_text: String,
}

impl RawRecord {
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
        }
    }
}

/// Counters describing one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Texts processed
    pub texts: usize,
    pub nodes_upserted: usize,
    pub relationships_upserted: usize,
    /// Entities or relations dropped because their label or type was invalid
    pub skipped: usize,
    /// Ids taken over from existing nodes instead of generated
    pub endpoints_reused: usize,
}

impl IngestReport {
    fn absorb(&mut self, other: IngestReport) {
        self.texts += other.texts;
        self.nodes_upserted += other.nodes_upserted;
        self.relationships_upserted += other.relationships_upserted;
        self.skipped += other.skipped;
        self.endpoints_reused += other.endpoints_reused;
    }
}

/// Load a JSON array of `{"raw_text": ...}` records
pub fn load_records(path: &Path) -> Result<Vec<RawRecord>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Text -> extraction -> graph upserts
pub struct IngestPipeline {
    service: Arc<QueryService>,
    extractor: Box<dyn Extractor>,
    policy: EndpointIdPolicy,
}

impl IngestPipeline {
    pub fn new(service: Arc<QueryService>, extractor: Box<dyn Extractor>) -> Self {
        Self {
            service,
            extractor,
            policy: EndpointIdPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: EndpointIdPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> EndpointIdPolicy {
        self.policy
    }

    /// Ingest one piece of raw text
    pub async fn ingest_text(&self, text: &str) -> Result<IngestReport> {
        let mut report = IngestReport {
            texts: 1,
            ..Default::default()
        };

        let cleaned = clean_text(text);
        if cleaned.is_empty() {
            debug!("Skipping empty text");
            return Ok(report);
        }

        let extraction = self.extractor.extract(&cleaned)?;
        debug!(
            entities = extraction.entities.len(),
            relations = extraction.relations.len(),
            "Extracted candidates"
        );

        // Names resolved within this text, per label
        let mut resolved: HashMap<(Label, String), NodeId> = HashMap::new();

        let entities = self
            .write_entities(&extraction, &mut resolved, &mut report)
            .await?;
        self.write_relations(&extraction, &entities, &mut resolved, &mut report)
            .await?;

        Ok(report)
    }

    /// Ingest records in order, stopping at the first failure
    pub async fn ingest_records(&self, records: &[RawRecord]) -> Result<IngestReport> {
        let mut total = IngestReport::default();
        for record in records {
            total.absorb(self.ingest_text(&record.raw_text).await?);
        }

        info!(
            texts = total.texts,
            nodes = total.nodes_upserted,
            relationships = total.relationships_upserted,
            skipped = total.skipped,
            reused = total.endpoints_reused,
            "Ingestion complete"
        );
        Ok(total)
    }

    /// Ingest a JSON file of `{"raw_text": ...}` records
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        let records = load_records(path)?;
        info!(path = %path.display(), records = records.len(), "Ingesting file");
        self.ingest_records(&records).await
    }

    /// Upsert extracted entities, returning each written node by name
    async fn write_entities(
        &self,
        extraction: &Extraction,
        resolved: &mut HashMap<(Label, String), NodeId>,
        report: &mut IngestReport,
    ) -> Result<HashMap<String, (Label, Properties)>> {
        let mut written = HashMap::new();
        for (name, label) in &extraction.entities {
            let label = match Label::new(label.as_str()) {
                Ok(label) => label,
                Err(e) => {
                    warn!(entity = %name, error = %e, "Skipping entity with invalid label");
                    report.skipped += 1;
                    metrics::record_ingest("skipped");
                    continue;
                }
            };

            let properties = self.upsert_named(&label, name, resolved, report).await?;
            written.insert(name.clone(), (label, properties));
        }
        Ok(written)
    }

    async fn write_relations(
        &self,
        extraction: &Extraction,
        entities: &HashMap<String, (Label, Properties)>,
        resolved: &mut HashMap<(Label, String), NodeId>,
        report: &mut IngestReport,
    ) -> Result<()> {
        let endpoint_label = Label::new(ENDPOINT_LABEL)?;

        for triple in &extraction.relations {
            let rel_type = match RelType::new(triple.relation.as_str()) {
                Ok(rel_type) => rel_type,
                Err(e) => {
                    warn!(relation = %triple.relation, error = %e, "Skipping relation with invalid type");
                    report.skipped += 1;
                    metrics::record_ingest("skipped");
                    continue;
                }
            };

            let (start_label, start) = self
                .endpoint(&endpoint_label, &triple.subject, entities, resolved, report)
                .await?;
            let (end_label, end) = self
                .endpoint(&endpoint_label, &triple.object, entities, resolved, report)
                .await?;

            self.service
                .upsert_relationship(&start_label, &start, &end_label, &end, &rel_type, None)
                .await?;
            report.relationships_upserted += 1;
            metrics::record_ingest("relationship");
        }
        Ok(())
    }

    /// Node a relation endpoint refers to, upserting an `Entity` when needed
    ///
    /// Under `ReuseByName` an endpoint named like an entity of the same text
    /// is that entity, whatever its label.
    async fn endpoint(
        &self,
        endpoint_label: &Label,
        name: &str,
        entities: &HashMap<String, (Label, Properties)>,
        resolved: &mut HashMap<(Label, String), NodeId>,
        report: &mut IngestReport,
    ) -> Result<(Label, Properties)> {
        if self.policy == EndpointIdPolicy::ReuseByName {
            if let Some((label, properties)) = entities.get(name) {
                return Ok((label.clone(), properties.clone()));
            }
        }

        let properties = self
            .upsert_named(endpoint_label, name, resolved, report)
            .await?;
        Ok((endpoint_label.clone(), properties))
    }

    /// Upsert `{id, name}` under `label`, returning the written properties
    async fn upsert_named(
        &self,
        label: &Label,
        name: &str,
        resolved: &mut HashMap<(Label, String), NodeId>,
        report: &mut IngestReport,
    ) -> Result<Properties> {
        let id = self.resolve_id(label, name, resolved, report).await?;

        let mut properties = Properties::new();
        properties.insert("id".to_string(), Value::String(id.to_string()));
        properties.insert("name".to_string(), Value::String(name.to_string()));

        let node = self.service.upsert_node(label, properties).await?;
        report.nodes_upserted += 1;
        metrics::record_ingest("node");
        Ok(node.properties)
    }

    async fn resolve_id(
        &self,
        label: &Label,
        name: &str,
        resolved: &mut HashMap<(Label, String), NodeId>,
        report: &mut IngestReport,
    ) -> Result<NodeId> {
        if self.policy == EndpointIdPolicy::Fresh {
            return Ok(NodeId::generate());
        }

        let key = (label.clone(), name.to_string());
        if let Some(id) = resolved.get(&key) {
            return Ok(id.clone());
        }

        let existing = self
            .service
            .find_node_by_name(label, name)
            .await?
            .and_then(|node| node.id().map(str::to_string));

        let id = match existing {
            Some(id) => {
                report.endpoints_reused += 1;
                NodeId::new(id)?
            }
            None => NodeId::generate(),
        };

        resolved.insert(key, id.clone());
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, SideCache};
    use crate::service::QuerySettings;
    use crate::graph::NodeRef;
    use crate::store::{GraphStore, MemoryGraphStore};
    use kgraph_extract::{RelationRule, RuleExtractor, Triple};
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn service() -> Arc<QueryService> {
        Arc::new(QueryService::new(
            Arc::new(MemoryGraphStore::new()),
            SideCache::new(Arc::new(MemoryCache::default()), Duration::from_secs(60)),
            QuerySettings::default(),
        ))
    }

    fn extractor() -> Box<dyn Extractor> {
        Box::new(
            RuleExtractor::new()
                .with_entity("Alice", "PERSON")
                .with_entity("Acme", "ORG")
                .with_rule(RelationRule::new("WORKS_AT", ["works at"], ["works at"])),
        )
    }

    fn entity() -> Label {
        Label::new(ENDPOINT_LABEL).unwrap()
    }

    #[tokio::test]
    async fn test_ingest_text_writes_entities_and_relation() {
        let service = service();
        let pipeline = IngestPipeline::new(service.clone(), extractor());

        let report = pipeline.ingest_text("Alice works at Acme!").await.unwrap();
        assert_eq!(report.texts, 1);
        assert_eq!(report.nodes_upserted, 2);
        assert_eq!(report.relationships_upserted, 1);

        // Endpoints are the extracted entities, not extra Entity nodes
        let store = service.store();
        let person = Label::new("PERSON").unwrap();
        let org = Label::new("ORG").unwrap();
        assert_eq!(store.count_nodes(&person).await.unwrap(), 1);
        assert_eq!(store.count_nodes(&entity()).await.unwrap(), 0);
        assert_eq!(store.count_relationships().await.unwrap(), 1);

        let alice = store.find_node_by_name(&person, "Alice").await.unwrap().unwrap();
        let acme = store.find_node_by_name(&org, "Acme").await.unwrap().unwrap();
        let rel = store
            .get_relationship(
                &NodeRef::new(person, NodeId::new(alice.id().unwrap()).unwrap()),
                &NodeRef::new(org, NodeId::new(acme.id().unwrap()).unwrap()),
                &RelType::new("WORKS_AT").unwrap(),
            )
            .await
            .unwrap();
        assert!(rel.is_some());
    }

    #[tokio::test]
    async fn test_endpoint_without_entity_becomes_entity_node() {
        let service = service();
        let extractor = RuleExtractor::new()
            .with_entity("Alice", "PERSON")
            .with_rule(RelationRule::new("WORKS_AT", ["works at"], ["works at"]));
        let pipeline = IngestPipeline::new(service.clone(), Box::new(extractor));

        pipeline.ingest_text("Alice works at Initech").await.unwrap();

        let store = service.store();
        assert_eq!(store.count_nodes(&Label::new("PERSON").unwrap()).await.unwrap(), 1);
        assert_eq!(store.count_nodes(&entity()).await.unwrap(), 1);
        assert!(store.find_node_by_name(&entity(), "Alice").await.unwrap().is_none());
        assert!(store.find_node_by_name(&entity(), "Initech").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reuse_by_name_is_stable_across_runs() {
        let service = service();
        let pipeline = IngestPipeline::new(service.clone(), extractor());

        pipeline.ingest_text("Alice works at Acme").await.unwrap();
        let second = pipeline.ingest_text("Alice works at Acme").await.unwrap();

        assert_eq!(second.endpoints_reused, 2);
        let store = service.store();
        assert_eq!(store.count_nodes(&Label::new("PERSON").unwrap()).await.unwrap(), 1);
        assert_eq!(store.count_nodes(&Label::new("ORG").unwrap()).await.unwrap(), 1);
        assert_eq!(store.count_nodes(&entity()).await.unwrap(), 0);
        assert_eq!(store.count_relationships().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fresh_policy_duplicates_endpoints() {
        let service = service();
        let pipeline =
            IngestPipeline::new(service.clone(), extractor()).with_policy(EndpointIdPolicy::Fresh);

        pipeline.ingest_text("Alice works at Acme").await.unwrap();
        pipeline.ingest_text("Alice works at Acme").await.unwrap();

        let store = service.store();
        assert_eq!(store.count_nodes(&entity()).await.unwrap(), 4);
        assert_eq!(store.count_relationships().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_invalid_labels_are_skipped() {
        let service = service();
        let bad = |_: &str| -> kgraph_extract::Result<Extraction> {
            Ok(Extraction {
                entities: [("Alice".to_string(), "not a label".to_string())]
                    .into_iter()
                    .collect(),
                relations: vec![Triple::new("Alice", "RELATES TO", "Bob")],
            })
        };
        let pipeline = IngestPipeline::new(service.clone(), Box::new(bad));

        let report = pipeline.ingest_text("Alice and Bob").await.unwrap();
        assert_eq!(report.skipped, 2);
        assert_eq!(report.nodes_upserted, 0);
        assert_eq!(service.store().count_relationships().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_role_rule_relation_type_is_accepted() {
        let service = service();
        let pipeline = IngestPipeline::new(service.clone(), Box::new(RuleExtractor::with_default_rules()));

        let report = pipeline.ingest_text("马云是阿里巴巴的创办人 CEO").await.unwrap();
        assert_eq!(report.relationships_upserted, 1);
        assert_eq!(report.skipped, 0);
    }

    #[tokio::test]
    async fn test_ingest_file() {
        let service = service();
        let pipeline = IngestPipeline::new(service.clone(), extractor());

        let file = NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r#"[{"raw_text": "Alice works at Acme"}, {"raw_text": "   "}]"#,
        )
        .unwrap();

        let report = pipeline.ingest_file(file.path()).await.unwrap();
        assert_eq!(report.texts, 2);
        assert_eq!(report.relationships_upserted, 1);
    }

    #[tokio::test]
    async fn test_extractor_failure_propagates() {
        let failing = |_: &str| -> kgraph_extract::Result<Extraction> {
            Err(kgraph_extract::Error::Failed("model not loaded".to_string()))
        };
        let pipeline = IngestPipeline::new(service(), Box::new(failing));
        assert!(pipeline.ingest_text("anything").await.is_err());
    }
}
