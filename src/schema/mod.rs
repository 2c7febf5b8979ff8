//! 自演化的图谱schema：类型定义、版本记录、质量评分与基于实例数据的演化

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::Path;
use thiserror::Error;

use crate::graph::GraphDocument;

pub mod analysis;

pub use analysis::{
    EntityTypeProposal, PropertyAnalysis, PropertyStats, RelationshipProposal,
    SchemaRecommendations, analyze_property, infer_property_type,
};

/// 覆盖度评分的基准：完整的保险schema大约包含的类型数量
const EXPECTED_ENTITY_TYPES: f64 = 15.0;
const EXPECTED_RELATIONSHIP_TYPES: f64 = 25.0;

const NODE_SAMPLE_LIMIT: usize = 10;
const EDGE_SAMPLE_LIMIT: usize = 5;

#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("entity type '{0}' already exists in schema")]
    DuplicateEntityType(String),
    #[error("entity type '{0}' does not exist in schema")]
    UnknownEntityType(String),
    #[error("relationship type '{name}' already exists between '{from}' and '{to}'")]
    DuplicateRelationshipType { name: String, from: String, to: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    #[serde(rename = "type")]
    pub property_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl PropertyDef {
    pub fn new(property_type: &str) -> Self {
        Self {
            property_type: property_type.to_string(),
            required: false,
            enum_values: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_enum(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }
}

pub type PropertyDefs = BTreeMap<String, PropertyDef>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityTypeDef {
    #[serde(default)]
    pub properties: PropertyDefs,
    #[serde(default)]
    pub constraints: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipTypeDef {
    pub name: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub properties: PropertyDefs,
    #[serde(default)]
    pub constraints: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub version: usize,
    pub timestamp: String,
    pub description: String,
    pub entity_count: usize,
    pub relationship_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityScores {
    pub coverage: f64,
    pub consistency: f64,
    pub connectivity: f64,
    pub overall: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedEntityType {
    pub name: String,
    pub properties: PropertyDefs,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedProperty {
    pub definition: PropertyDef,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedRelationshipType {
    pub name: String,
    pub source: String,
    pub target: String,
    pub properties: PropertyDefs,
    pub confidence: f64,
}

/// `evolve` 实际应用的变更
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaChanges {
    pub new_entity_types: Vec<AppliedEntityType>,
    pub new_property_types: BTreeMap<String, BTreeMap<String, AppliedProperty>>,
    pub new_relationship_types: Vec<AppliedRelationshipType>,
}

impl SchemaChanges {
    pub fn total(&self) -> usize {
        self.new_entity_types.len()
            + self
                .new_property_types
                .values()
                .map(BTreeMap::len)
                .sum::<usize>()
            + self.new_relationship_types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// schema文件格式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(default)]
    pub entity_types: Vec<EntityTypeRecord>,
    #[serde(default)]
    pub relationship_types: Vec<RelationshipTypeDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SchemaMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTypeRecord {
    pub name: String,
    #[serde(flatten)]
    pub definition: EntityTypeDef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaMetadata {
    pub version: usize,
    pub timestamp: String,
    pub quality_scores: QualityScores,
}

#[derive(Debug, Clone, Default)]
pub struct GraphSchema {
    entity_types: BTreeMap<String, EntityTypeDef>,
    relationship_types: Vec<RelationshipTypeDef>,
    versions: Vec<SchemaVersion>,
    quality: QualityScores,
}

fn cardinality(value: &str) -> Map<String, Value> {
    let mut constraints = Map::new();
    constraints.insert("cardinality".to_string(), json!(value));
    constraints
}

fn props(entries: Vec<(&str, PropertyDef)>) -> PropertyDefs {
    entries
        .into_iter()
        .map(|(name, def)| (name.to_string(), def))
        .collect()
}

impl GraphSchema {
    /// 有可用的基础schema文件时从文件加载，否则使用默认保险schema
    pub fn new(base_schema_path: Option<&Path>) -> Self {
        let mut schema = match base_schema_path.filter(|p| p.exists()) {
            Some(path) => match Self::read_document(path) {
                Ok(document) => {
                    let mut schema = Self::default();
                    schema.apply_document(document);
                    tracing::info!(
                        path = %path.display(),
                        entity_types = schema.entity_types.len(),
                        relationship_types = schema.relationship_types.len(),
                        "loaded base schema"
                    );
                    schema
                }
                Err(e) => {
                    tracing::warn!("Error loading base schema, falling back to default: {:#}", e);
                    Self::with_defaults()
                }
            },
            None => Self::with_defaults(),
        };
        schema.record_version("Initial schema creation");
        schema
    }

    fn with_defaults() -> Self {
        let mut schema = Self::default();
        let entity_types = [
            (
                "Policy",
                props(vec![
                    ("policy_number", PropertyDef::new("string").required()),
                    ("effective_date", PropertyDef::new("date").required()),
                    ("expiration_date", PropertyDef::new("date").required()),
                    (
                        "status",
                        PropertyDef::new("string").with_enum(&["active", "expired", "cancelled"]),
                    ),
                ]),
            ),
            (
                "Insured",
                props(vec![
                    ("name", PropertyDef::new("string").required()),
                    ("id_number", PropertyDef::new("string").required()),
                    ("date_of_birth", PropertyDef::new("date")),
                    ("contact_info", PropertyDef::new("object")),
                ]),
            ),
            (
                "Coverage",
                props(vec![
                    ("type", PropertyDef::new("string").required()),
                    ("limit", PropertyDef::new("number")),
                    ("deductible", PropertyDef::new("number")),
                ]),
            ),
            (
                "Claim",
                props(vec![
                    ("claim_number", PropertyDef::new("string").required()),
                    ("date_of_loss", PropertyDef::new("date").required()),
                    (
                        "status",
                        PropertyDef::new("string").with_enum(&[
                            "open",
                            "under_review",
                            "approved",
                            "denied",
                            "closed",
                        ]),
                    ),
                    ("amount", PropertyDef::new("number")),
                ]),
            ),
            (
                "Premium",
                props(vec![
                    ("amount", PropertyDef::new("number").required()),
                    (
                        "payment_frequency",
                        PropertyDef::new("string").with_enum(&["monthly", "quarterly", "annually"]),
                    ),
                    ("due_date", PropertyDef::new("date")),
                ]),
            ),
            (
                "Definition",
                props(vec![
                    ("term", PropertyDef::new("string").required()),
                    ("meaning", PropertyDef::new("string").required()),
                    ("aliases", PropertyDef::new("array")),
                ]),
            ),
        ];
        for (name, properties) in entity_types {
            // 默认类型互不重复
            let _ = schema.add_entity_type(name, properties, Map::new());
        }

        let relationship_types = [
            ("HAS_COVERAGE", "Policy", "Coverage", props(vec![("added_date", PropertyDef::new("date"))]), "one_to_many"),
            ("INSURES", "Policy", "Insured", PropertyDefs::new(), "many_to_many"),
            ("HAS_PREMIUM", "Policy", "Premium", PropertyDefs::new(), "one_to_one"),
            ("FILES_CLAIM", "Insured", "Claim", props(vec![("filing_date", PropertyDef::new("date"))]), "one_to_many"),
            ("RELATED_TO", "Claim", "Coverage", PropertyDefs::new(), "many_to_many"),
        ];
        for (name, source, target, properties, card) in relationship_types {
            let _ = schema.add_relationship_type(name, source, target, properties, cardinality(card));
        }

        tracing::info!(
            entity_types = schema.entity_types.len(),
            relationship_types = schema.relationship_types.len(),
            "initialized default insurance schema"
        );
        schema
    }

    fn read_document(path: &Path) -> Result<SchemaDocument> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read schema file: {:?}", path))?;
        serde_json::from_str(&content).context(format!("Failed to parse schema file: {:?}", path))
    }

    fn apply_document(&mut self, document: SchemaDocument) {
        for record in document.entity_types {
            if let Err(e) = self.add_entity_type(
                &record.name,
                record.definition.properties,
                record.definition.constraints,
            ) {
                tracing::warn!("skipping entity type from schema file: {}", e);
            }
        }
        for rel in document.relationship_types {
            if let Err(e) = self.add_relationship_type(
                &rel.name,
                &rel.source,
                &rel.target,
                rel.properties,
                rel.constraints,
            ) {
                tracing::warn!("skipping relationship type from schema file: {}", e);
            }
        }
    }

    /// 从导出的schema文件加载，文件不可读时返回错误
    pub fn load(path: &Path) -> Result<Self> {
        let document = Self::read_document(path)?;
        let mut schema = Self::default();
        schema.apply_document(document);
        schema.record_version(&format!("Loaded schema from {}", path.display()));
        Ok(schema)
    }

    pub fn add_entity_type(
        &mut self,
        name: &str,
        properties: PropertyDefs,
        constraints: Map<String, Value>,
    ) -> Result<(), SchemaError> {
        if self.entity_types.contains_key(name) {
            return Err(SchemaError::DuplicateEntityType(name.to_string()));
        }
        self.entity_types.insert(
            name.to_string(),
            EntityTypeDef {
                properties,
                constraints,
            },
        );
        self.recalculate_quality();
        self.record_version(&format!("Added entity type: {}", name));
        Ok(())
    }

    pub fn add_relationship_type(
        &mut self,
        name: &str,
        source: &str,
        target: &str,
        properties: PropertyDefs,
        constraints: Map<String, Value>,
    ) -> Result<(), SchemaError> {
        for endpoint in [source, target] {
            if !self.entity_types.contains_key(endpoint) {
                return Err(SchemaError::UnknownEntityType(endpoint.to_string()));
            }
        }
        if self.has_relationship_type(name, source, target) {
            return Err(SchemaError::DuplicateRelationshipType {
                name: name.to_string(),
                from: source.to_string(),
                to: target.to_string(),
            });
        }
        self.relationship_types.push(RelationshipTypeDef {
            name: name.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            properties,
            constraints,
        });
        self.recalculate_quality();
        self.record_version(&format!(
            "Added relationship type: {} ({} -> {})",
            name, source, target
        ));
        Ok(())
    }

    pub fn has_relationship_type(&self, name: &str, source: &str, target: &str) -> bool {
        self.relationship_types
            .iter()
            .any(|r| r.name == name && r.source == source && r.target == target)
    }

    pub fn entity_types(&self) -> &BTreeMap<String, EntityTypeDef> {
        &self.entity_types
    }

    pub fn entity_type(&self, name: &str) -> Option<&EntityTypeDef> {
        self.entity_types.get(name)
    }

    pub fn relationship_types(&self) -> &[RelationshipTypeDef] {
        &self.relationship_types
    }

    pub fn versions(&self) -> &[SchemaVersion] {
        &self.versions
    }

    pub fn quality(&self) -> QualityScores {
        self.quality
    }

    /// 按关系名统计关系类型数量
    pub fn relationship_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for rel in &self.relationship_types {
            *counts.entry(rel.name.clone()).or_insert(0) += 1;
        }
        counts
    }

    fn record_version(&mut self, description: &str) {
        self.versions.push(SchemaVersion {
            version: self.versions.len() + 1,
            timestamp: Utc::now().to_rfc3339(),
            description: description.to_string(),
            entity_count: self.entity_types.len(),
            relationship_count: self.relationship_types.len(),
        });
    }

    fn recalculate_quality(&mut self) {
        let entity_count = self.entity_types.len() as f64;
        let relationship_count = self.relationship_types.len() as f64;

        let coverage = ((entity_count / EXPECTED_ENTITY_TYPES
            + relationship_count / EXPECTED_RELATIONSHIP_TYPES)
            / 2.0)
            .min(1.0);

        let connectivity = if entity_count < 2.0 {
            0.0
        } else {
            (relationship_count / (entity_count * (entity_count - 1.0))).min(1.0)
        };

        let completeness: Vec<f64> = self
            .entity_types
            .values()
            .map(|def| {
                if def.properties.is_empty() {
                    0.0
                } else {
                    let required = def.properties.values().filter(|p| p.required).count();
                    required as f64 / def.properties.len() as f64
                }
            })
            .collect();
        let consistency = completeness.iter().sum::<f64>() / completeness.len().max(1) as f64;

        self.quality = QualityScores {
            coverage,
            consistency,
            connectivity,
            overall: (coverage + consistency + connectivity) / 3.0,
        };
    }

    /// 分析实例数据，给出新实体类型、新关系类型与已有类型上的新属性
    pub fn analyze_instance_data(&self, document: &GraphDocument) -> SchemaRecommendations {
        let mut recommendations = SchemaRecommendations::default();

        let mut label_counts: BTreeMap<&str, usize> = BTreeMap::new();
        let mut property_sets: BTreeMap<&str, BTreeMap<&str, PropertyStats>> = BTreeMap::new();
        for node in &document.nodes {
            for label in &node.labels {
                *label_counts.entry(label).or_insert(0) += 1;
                let stats = property_sets.entry(label).or_default();
                for (name, value) in &node.properties {
                    stats
                        .entry(name)
                        .or_default()
                        .observe(value, NODE_SAMPLE_LIMIT);
                }
            }
        }

        for (&label, &count) in &label_counts {
            if self.entity_types.contains_key(label) {
                continue;
            }
            let proposed_properties = property_sets
                .get(label)
                .into_iter()
                .flatten()
                .filter(|(_, stats)| stats.count >= 3)
                .map(|(name, stats)| (name.to_string(), analyze_property(name, stats)))
                .collect();
            recommendations.new_entity_types.push(EntityTypeProposal {
                name: label.to_string(),
                frequency: count,
                proposed_properties,
            });
            recommendations
                .confidence_scores
                .insert(format!("entity_type:{}", label), (count as f64 / 10.0).min(1.0));
        }

        let primary_labels: HashMap<&str, &str> = document
            .nodes
            .iter()
            .filter_map(|n| n.primary_label().map(|label| (n.id.as_str(), label)))
            .collect();
        let mut patterns: BTreeMap<(String, String, String), (usize, BTreeMap<&str, PropertyStats>)> =
            BTreeMap::new();
        for edge in &document.edges {
            let (Some(&source), Some(&target)) = (
                primary_labels.get(edge.source.as_str()),
                primary_labels.get(edge.target.as_str()),
            ) else {
                continue;
            };
            if edge.relation_type.is_empty() {
                continue;
            }
            let entry = patterns
                .entry((edge.relation_type.clone(), source.to_string(), target.to_string()))
                .or_default();
            entry.0 += 1;
            for (name, value) in &edge.properties {
                entry.1.entry(name).or_default().observe(value, EDGE_SAMPLE_LIMIT);
            }
        }

        for ((name, source, target), (count, stats)) in patterns {
            if self.has_relationship_type(&name, &source, &target) {
                continue;
            }
            let proposed_properties = stats
                .iter()
                .filter(|(_, s)| s.count >= 2)
                .map(|(prop, s)| (prop.to_string(), analyze_property(prop, s)))
                .collect();
            recommendations.confidence_scores.insert(
                format!("relationship_type:{}:{}:{}", name, source, target),
                (count as f64 / 5.0).min(1.0),
            );
            recommendations.new_relationship_types.push(RelationshipProposal {
                name,
                source,
                target,
                frequency: count,
                proposed_properties,
            });
        }

        for (entity_type, definition) in &self.entity_types {
            let Some(stats) = property_sets.get(entity_type.as_str()) else {
                continue;
            };
            let mut new_props = BTreeMap::new();
            for (&name, prop_stats) in stats {
                if definition.properties.contains_key(name) || prop_stats.count < 3 {
                    continue;
                }
                new_props.insert(name.to_string(), analyze_property(name, prop_stats));
                recommendations.confidence_scores.insert(
                    format!("property:{}.{}", entity_type, name),
                    (prop_stats.count as f64 / 10.0).min(1.0),
                );
            }
            if !new_props.is_empty() {
                recommendations
                    .new_property_types
                    .insert(entity_type.clone(), new_props);
            }
        }

        recommendations
    }

    /// 根据实例数据自动演化schema，只应用置信度达到阈值的变更
    pub fn evolve(&mut self, document: &GraphDocument, threshold: f64) -> SchemaChanges {
        let recommendations = self.analyze_instance_data(document);
        let mut changes = SchemaChanges::default();

        for proposal in &recommendations.new_entity_types {
            let confidence = recommendations.confidence(&format!("entity_type:{}", proposal.name));
            if confidence < threshold {
                continue;
            }
            let properties: PropertyDefs = proposal
                .proposed_properties
                .iter()
                .map(|(name, analysis)| (name.clone(), analysis.to_definition()))
                .collect();
            if self
                .add_entity_type(&proposal.name, properties.clone(), Map::new())
                .is_ok()
            {
                changes.new_entity_types.push(AppliedEntityType {
                    name: proposal.name.clone(),
                    properties,
                    confidence,
                });
            }
        }

        for (entity_type, new_props) in &recommendations.new_property_types {
            let mut applied = BTreeMap::new();
            for (name, analysis) in new_props {
                let confidence =
                    recommendations.confidence(&format!("property:{}.{}", entity_type, name));
                if confidence < threshold {
                    continue;
                }
                let Some(definition) = self.entity_types.get_mut(entity_type) else {
                    continue;
                };
                let property = analysis.to_definition();
                definition.properties.insert(name.clone(), property.clone());
                applied.insert(
                    name.clone(),
                    AppliedProperty {
                        definition: property,
                        confidence,
                    },
                );
            }
            if !applied.is_empty() {
                let names: Vec<&str> = applied.keys().map(String::as_str).collect();
                self.recalculate_quality();
                self.record_version(&format!(
                    "Added new properties to {}: {}",
                    entity_type,
                    names.join(", ")
                ));
                changes
                    .new_property_types
                    .insert(entity_type.clone(), applied);
            }
        }

        for proposal in &recommendations.new_relationship_types {
            let confidence = recommendations.confidence(&format!(
                "relationship_type:{}:{}:{}",
                proposal.name, proposal.source, proposal.target
            ));
            if confidence < threshold {
                continue;
            }
            let properties: PropertyDefs = proposal
                .proposed_properties
                .iter()
                .map(|(name, analysis)| (name.clone(), analysis.to_definition()))
                .collect();
            match self.add_relationship_type(
                &proposal.name,
                &proposal.source,
                &proposal.target,
                properties.clone(),
                Map::new(),
            ) {
                Ok(()) => changes.new_relationship_types.push(AppliedRelationshipType {
                    name: proposal.name.clone(),
                    source: proposal.source.clone(),
                    target: proposal.target.clone(),
                    properties,
                    confidence,
                }),
                Err(e) => tracing::debug!("relationship proposal not applied: {}", e),
            }
        }

        self.recalculate_quality();
        tracing::info!(applied = changes.total(), threshold, "schema evolution finished");
        changes
    }

    pub fn to_document(&self) -> SchemaDocument {
        SchemaDocument {
            entity_types: self
                .entity_types
                .iter()
                .map(|(name, definition)| EntityTypeRecord {
                    name: name.clone(),
                    definition: definition.clone(),
                })
                .collect(),
            relationship_types: self.relationship_types.clone(),
            metadata: Some(SchemaMetadata {
                version: self.versions.len(),
                timestamp: Utc::now().to_rfc3339(),
                quality_scores: self.quality,
            }),
        }
    }

    pub fn export(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.to_document())?;
        std::fs::write(path, content).context(format!("Failed to write schema: {:?}", path))?;
        tracing::info!(
            entity_types = self.entity_types.len(),
            relationship_types = self.relationship_types.len(),
            path = %path.display(),
            "exported schema"
        );
        Ok(())
    }

    /// Graphviz DOT格式的schema图
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("digraph insurance_schema {\n");
        dot.push_str("  rankdir=LR;\n");
        dot.push_str("  node [shape=box, style=filled, fillcolor=lightblue];\n");
        for (name, definition) in &self.entity_types {
            let _ = writeln!(
                dot,
                "  \"{}\" [label=\"{}\\n({} props)\"];",
                name,
                name,
                definition.properties.len()
            );
        }
        for rel in &self.relationship_types {
            let _ = writeln!(
                dot,
                "  \"{}\" -> \"{}\" [label=\"{}\"];",
                rel.source, rel.target, rel.name
            );
        }
        dot.push_str("}\n");
        dot
    }

    pub fn save_dot(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_dot())
            .context(format!("Failed to write schema visualization: {:?}", path))
    }
}
