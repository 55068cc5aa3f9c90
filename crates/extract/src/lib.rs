//! Entity and relation extraction for kgraph ingestion
//!
//! Turns cleaned text into an [`Extraction`]: a mapping of entity text to entity
//! label plus a list of `(subject, relation, object)` triples. Extraction is a
//! pluggable collaborator; anything implementing [`Extractor`] (including a plain
//! closure) can drive the ingestion pipeline.
//!
//! # Example
//!
//! ```
//! use kgraph_extract::{clean_text, Extractor, RelationRule, RuleExtractor};
//!
//! let extractor = RuleExtractor::new()
//!     .with_entity("Alice", "PERSON")
//!     .with_rule(RelationRule::new("WORKS_AT", ["works at"], ["works at"]));
//!
//! let text = clean_text("Alice   works at Acme!");
//! let extraction = extractor.extract(&text)?;
//!
//! assert_eq!(extraction.entities.get("Alice").map(String::as_str), Some("PERSON"));
//! assert_eq!(extraction.relations[0].object, "Acme");
//! # Ok::<(), kgraph_extract::Error>(())
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during extraction
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid extraction rule: {0}")]
    InvalidRule(String),

    #[error("Extractor failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for extraction operations
pub type Result<T> = std::result::Result<T, Error>;

/// A `(subject, relation, object)` candidate produced by an extractor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub relation: String,
    pub object: String,
}

impl Triple {
    pub fn new(
        subject: impl Into<String>,
        relation: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            relation: relation.into(),
            object: object.into(),
        }
    }
}

/// Output of a single extraction run
///
/// Entities are keyed by their surface text, so a text mentioning the same
/// entity twice yields one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    /// Entity text -> entity label (e.g. "Alice" -> "PERSON")
    #[serde(default)]
    pub entities: BTreeMap<String, String>,

    #[serde(default)]
    pub relations: Vec<Triple>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty()
    }
}

/// A collaborator that turns cleaned text into entity and relation candidates
pub trait Extractor: Send + Sync {
    fn extract(&self, text: &str) -> Result<Extraction>;
}

impl<F> Extractor for F
where
    F: Fn(&str) -> Result<Extraction> + Send + Sync,
{
    fn extract(&self, text: &str) -> Result<Extraction> {
        self(text)
    }
}

/// Basic text normalization applied before extraction
///
/// Keeps word characters, whitespace, middle dots and hyphens; drops all other
/// punctuation and collapses whitespace runs into a single space.
pub fn clean_text(text: &str) -> String {
    let kept: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '_' | '·' | '-'))
        .collect();

    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A keyword-triggered relation rule
///
/// When any trigger occurs in the text, the text is split on the first
/// separator it contains. The segment before the split is the subject and the
/// next segment, cut at the optional terminator, is the object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRule {
    /// Relation type emitted for matches
    pub relation: String,

    /// Any of these substrings activates the rule
    pub triggers: Vec<String>,

    /// Separators tried in order; the first one present splits the text
    pub separators: Vec<String>,

    /// Object text is cut at the first occurrence of this marker
    #[serde(default)]
    pub object_terminator: Option<String>,
}

impl RelationRule {
    pub fn new<T, S>(relation: impl Into<String>, triggers: T, separators: S) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        Self {
            relation: relation.into(),
            triggers: triggers.into_iter().map(Into::into).collect(),
            separators: separators.into_iter().map(Into::into).collect(),
            object_terminator: None,
        }
    }

    pub fn with_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.object_terminator = Some(terminator.into());
        self
    }

    /// Role rule for sentences such as "X是Y的CEO" or "X创办了Y"
    pub fn role() -> Self {
        Self::new("担任", ["CEO", "创办", "创立"], ["是", "创办了"]).with_terminator("的")
    }

    /// Check the rule is usable
    pub fn validate(&self) -> Result<()> {
        if self.relation.trim().is_empty() {
            return Err(Error::InvalidRule("relation cannot be empty".to_string()));
        }
        if self.triggers.iter().all(|t| t.is_empty()) {
            return Err(Error::InvalidRule(format!(
                "rule '{}' needs at least one non-empty trigger",
                self.relation
            )));
        }
        if self.separators.iter().all(|s| s.is_empty()) {
            return Err(Error::InvalidRule(format!(
                "rule '{}' needs at least one non-empty separator",
                self.relation
            )));
        }
        Ok(())
    }

    /// Apply the rule to a text, returning a triple on match
    pub fn apply(&self, text: &str) -> Option<Triple> {
        if !self
            .triggers
            .iter()
            .any(|t| !t.is_empty() && text.contains(t.as_str()))
        {
            return None;
        }

        let separator = self
            .separators
            .iter()
            .find(|s| !s.is_empty() && text.contains(s.as_str()))?;

        let mut parts = text.split(separator.as_str());
        let subject = parts.next()?.trim();
        let rest = parts.next()?;

        let object = match &self.object_terminator {
            Some(term) if !term.is_empty() => rest.split(term.as_str()).next().unwrap_or(rest),
            _ => rest,
        }
        .trim();

        if subject.is_empty() || object.is_empty() {
            return None;
        }

        Some(Triple::new(subject, self.relation.clone(), object))
    }
}

/// Gazetteer + keyword rule extractor
///
/// Entities are found by exact substring match against a configured gazetteer
/// of `surface text -> label`. Relations come from [`RelationRule`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleExtractor {
    #[serde(default)]
    pub gazetteer: BTreeMap<String, String>,

    #[serde(default)]
    pub rules: Vec<RelationRule>,
}

impl RuleExtractor {
    /// Create an empty extractor (no entities, no rules)
    pub fn new() -> Self {
        Self::default()
    }

    /// Extractor with the built-in role rule and an empty gazetteer
    pub fn with_default_rules() -> Self {
        Self::new().with_rule(RelationRule::role())
    }

    /// Load an extractor definition from a JSON file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let extractor: Self = serde_json::from_str(&content)?;
        extractor.validate()?;
        Ok(extractor)
    }

    pub fn with_entity(mut self, text: impl Into<String>, label: impl Into<String>) -> Self {
        self.gazetteer.insert(text.into(), label.into());
        self
    }

    pub fn with_rule(mut self, rule: RelationRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (text, label) in &self.gazetteer {
            if text.trim().is_empty() || label.trim().is_empty() {
                return Err(Error::InvalidRule(format!(
                    "gazetteer entry '{}' -> '{}' has an empty side",
                    text, label
                )));
            }
        }
        self.rules.iter().try_for_each(RelationRule::validate)
    }
}

impl Extractor for RuleExtractor {
    fn extract(&self, text: &str) -> Result<Extraction> {
        let entities = self
            .gazetteer
            .iter()
            .filter(|(surface, _)| text.contains(surface.as_str()))
            .map(|(surface, label)| (surface.clone(), label.clone()))
            .collect();

        let relations = self.rules.iter().filter_map(|r| r.apply(text)).collect();

        Ok(Extraction {
            entities,
            relations,
        })
    }
}
