//! 内存知识图谱：有向多重图 + 导入导出格式

use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

pub mod query;

pub use query::{Binding, Direction, Filter, GraphQuery, NodePattern, PathStep, QueryResult};

pub type Properties = Map<String, Value>;

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("node '{0}' not found")]
    UnknownNode(String),
    #[error("relationship '{relation}' references missing node '{node}'")]
    MissingEndpoint { relation: String, node: String },
}

/// 抽取阶段的实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Entity {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Definition实体没有name，使用attributes中的term
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub attributes: Properties,
}

impl Entity {
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            name: Some(name.into()),
            attributes: Properties::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// 可读标识：name，其次term
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| self.attribute_str("term"))
    }

    pub fn to_node(&self) -> GraphNode {
        let mut properties = Properties::new();
        properties.insert(
            "name".to_string(),
            Value::String(self.display_name().unwrap_or(&self.id).to_string()),
        );
        for (key, value) in &self.attributes {
            properties.insert(key.clone(), value.clone());
        }
        GraphNode {
            id: self.id.clone(),
            labels: vec![self.entity_type.clone()],
            properties,
        }
    }
}

/// 抽取阶段的关系
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub relation_type: String,
    #[serde(default)]
    pub properties: Properties,
}

impl Relationship {
    pub fn new(source: impl Into<String>, target: impl Into<String>, relation_type: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation_type: relation_type.into(),
            properties: Properties::new(),
        }
    }

    pub fn to_edge(&self) -> GraphEdge {
        GraphEdge {
            source: self.source.clone(),
            target: self.target.clone(),
            relation_type: self.relation_type.clone(),
            properties: self.properties.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: Properties,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            labels: vec![label.into()],
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn primary_label(&self) -> Option<&str> {
        self.labels.first().map(String::as_str)
    }

    /// 读取属性；`name` 缺失时回退到节点id
    pub fn property(&self, key: &str) -> Option<Value> {
        match self.properties.get(key) {
            Some(value) => Some(value.clone()),
            None if key == "name" => Some(Value::String(self.id.clone())),
            None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub relation_type: String,
    #[serde(default)]
    pub properties: Properties,
}

/// 图的JSON导入导出格式
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

/// 有向多重图，节点按id索引，维护出入邻接表
#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    nodes: Vec<GraphNode>,
    index: HashMap<String, usize>,
    edges: Vec<GraphEdge>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新增节点；id已存在时合并标签与属性
    pub fn add_node(&mut self, node: GraphNode) {
        if let Some(&idx) = self.index.get(&node.id) {
            let existing = &mut self.nodes[idx];
            for label in node.labels {
                if !existing.labels.contains(&label) {
                    existing.labels.push(label);
                }
            }
            existing.properties.extend(node.properties);
            return;
        }
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
    }

    /// 新增边；允许同一对节点之间存在多条同类型的平行边
    pub fn add_edge(&mut self, edge: GraphEdge) -> Result<(), GraphError> {
        let source = self.require_index(&edge.source, &edge.relation_type)?;
        let target = self.require_index(&edge.target, &edge.relation_type)?;

        let edge_idx = self.edges.len();
        self.edges.push(edge);
        self.outgoing[source].push(edge_idx);
        self.incoming[target].push(edge_idx);
        Ok(())
    }

    fn require_index(&self, id: &str, relation: &str) -> Result<usize, GraphError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::MissingEndpoint {
                relation: relation.to_string(),
                node: id.to_string(),
            })
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.index.get(id).map(|&idx| &self.nodes[idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter()
    }

    pub fn nodes_with_label<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a GraphNode> + 'a {
        self.nodes.iter().filter(move |n| n.has_label(label))
    }

    /// 沿指定方向（可选关系类型）的相邻节点，按边的插入顺序返回
    pub fn neighbors(
        &self,
        id: &str,
        direction: Direction,
        relation: Option<&str>,
    ) -> Result<Vec<&GraphNode>, GraphError> {
        let idx = self
            .index
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::UnknownNode(id.to_string()))?;

        let matches_relation =
            |edge: &GraphEdge| relation.is_none_or(|r| edge.relation_type == r);

        let mut result = Vec::new();
        if matches!(direction, Direction::Outgoing | Direction::Both) {
            for &e in &self.outgoing[idx] {
                let edge = &self.edges[e];
                if matches_relation(edge)
                    && let Some(node) = self.node(&edge.target)
                {
                    result.push(node);
                }
            }
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            for &e in &self.incoming[idx] {
                let edge = &self.edges[e];
                if matches_relation(edge)
                    && let Some(node) = self.node(&edge.source)
                {
                    result.push(node);
                }
            }
        }
        Ok(result)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 各标签的节点数
    pub fn label_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for node in &self.nodes {
            for label in &node.labels {
                *counts.entry(label.clone()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// 各关系类型的边数
    pub fn relation_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for edge in &self.edges {
            *counts.entry(edge.relation_type.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn to_document(&self) -> GraphDocument {
        GraphDocument {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }

    /// 由导出文档构建图，端点缺失的边被忽略
    pub fn from_document(document: GraphDocument) -> Self {
        let mut graph = Self::new();
        for node in document.nodes {
            if !node.id.is_empty() {
                graph.add_node(node);
            }
        }
        let mut skipped = 0usize;
        for edge in document.edges {
            if graph.add_edge(edge).is_err() {
                skipped += 1;
            }
        }
        if skipped > 0 {
            tracing::warn!(skipped, "edges with missing endpoints were ignored");
        }
        graph
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.to_document())?;
        std::fs::write(path, content)
            .context(format!("Failed to write knowledge graph: {:?}", path))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read knowledge graph: {:?}", path))?;
        let document: GraphDocument = serde_json::from_str(&content)
            .context(format!("Failed to parse knowledge graph: {:?}", path))?;
        let graph = Self::from_document(document);
        tracing::info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "knowledge graph loaded"
        );
        Ok(graph)
    }

    pub fn execute(&self, query: &GraphQuery) -> QueryResult {
        query::execute(self, query)
    }
}

#[cfg(test)]
mod tests;
