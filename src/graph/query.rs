//! 图查询模型与执行器

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use super::{GraphNode, KnowledgeGraph};
use crate::utils::text::parse_amount;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePattern {
    pub label: String,
    pub alias: String,
}

impl NodePattern {
    pub fn new(label: &str, alias: &str) -> Self {
        Self {
            label: label.to_string(),
            alias: alias.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// 从已绑定的别名出发扩展一步
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    pub direction: Direction,
    pub to: NodePattern,
}

/// 过滤条件，`property` 形如 `alias.prop`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    Eq { property: String, value: Value },
    NotEq { property: String, value: Value },
    Gt { property: String, value: Value },
    Lt { property: String, value: Value },
    Contains { property: String, value: Value },
    Any { conditions: Vec<Filter> },
}

/// 拆分 `alias.prop`；没有点号时别名为空
pub fn split_property(key: &str) -> (&str, &str) {
    key.split_once('.').unwrap_or(("", key))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(a), Value::String(b)) => a.to_lowercase() == b.to_lowercase(),
        _ => match (as_number(actual), as_number(expected)) {
            (Some(a), Some(b)) => a == b,
            _ => actual == expected,
        },
    }
}

fn value_contains(actual: &Value, needle: &Value) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        Value::String(haystack) => {
            let needle = match needle {
                Value::String(s) => s.to_lowercase(),
                other => other.to_string(),
            };
            haystack.to_lowercase().contains(&needle)
        }
        _ => false,
    }
}

impl Filter {
    pub fn eq(property: &str, value: impl Into<Value>) -> Self {
        Filter::Eq {
            property: property.to_string(),
            value: value.into(),
        }
    }

    pub fn not_eq(property: &str, value: impl Into<Value>) -> Self {
        Filter::NotEq {
            property: property.to_string(),
            value: value.into(),
        }
    }

    pub fn gt(property: &str, value: impl Into<Value>) -> Self {
        Filter::Gt {
            property: property.to_string(),
            value: value.into(),
        }
    }

    pub fn lt(property: &str, value: impl Into<Value>) -> Self {
        Filter::Lt {
            property: property.to_string(),
            value: value.into(),
        }
    }

    pub fn contains(property: &str, value: impl Into<Value>) -> Self {
        Filter::Contains {
            property: property.to_string(),
            value: value.into(),
        }
    }

    pub fn any(conditions: Vec<Filter>) -> Self {
        Filter::Any { conditions }
    }

    /// 条件中引用到的全部别名
    pub fn aliases(&self) -> BTreeSet<&str> {
        match self {
            Filter::Any { conditions } => conditions.iter().flat_map(|c| c.aliases()).collect(),
            Filter::Eq { property, .. }
            | Filter::NotEq { property, .. }
            | Filter::Gt { property, .. }
            | Filter::Lt { property, .. }
            | Filter::Contains { property, .. } => {
                BTreeSet::from([split_property(property).0])
            }
        }
    }

    fn matches(&self, graph: &KnowledgeGraph, binding: &BTreeMap<String, String>) -> bool {
        let lookup = |property: &str| -> Option<Value> {
            let (alias, prop) = split_property(property);
            binding
                .get(alias)
                .and_then(|id| graph.node(id))
                .and_then(|node| node.property(prop))
        };

        match self {
            Filter::Any { conditions } => conditions.iter().any(|c| c.matches(graph, binding)),
            Filter::Eq { property, value } => {
                lookup(property).is_some_and(|actual| values_equal(&actual, value))
            }
            Filter::NotEq { property, value } => {
                lookup(property).is_some_and(|actual| !values_equal(&actual, value))
            }
            Filter::Gt { property, value } => lookup(property).is_some_and(|actual| {
                matches!((as_number(&actual), as_number(value)), (Some(a), Some(b)) if a > b)
            }),
            Filter::Lt { property, value } => lookup(property).is_some_and(|actual| {
                matches!((as_number(&actual), as_number(value)), (Some(a), Some(b)) if a < b)
            }),
            Filter::Contains { property, value } => {
                lookup(property).is_some_and(|actual| value_contains(&actual, value))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQuery {
    pub start: NodePattern,
    #[serde(default)]
    pub paths: Vec<PathStep>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub return_properties: Vec<String>,
}

impl GraphQuery {
    pub fn new(label: &str, alias: &str) -> Self {
        Self {
            start: NodePattern::new(label, alias),
            paths: Vec::new(),
            filters: Vec::new(),
            return_properties: Vec::new(),
        }
    }

    pub fn path(
        mut self,
        from: &str,
        relation: Option<&str>,
        direction: Direction,
        to_label: &str,
        to_alias: &str,
    ) -> Self {
        self.paths.push(PathStep {
            from: from.to_string(),
            relation: relation.map(str::to_string),
            direction,
            to: NodePattern::new(to_label, to_alias),
        });
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn returning(mut self, properties: &[&str]) -> Self {
        self.return_properties
            .extend(properties.iter().map(|p| p.to_string()));
        self
    }

    /// 多于一步路径扩展的查询视为复杂查询
    pub fn is_complex(&self) -> bool {
        self.paths.len() > 1
    }

    /// 路径、过滤条件或返回属性中引用了但从未声明的别名
    pub fn unbound_aliases(&self) -> BTreeSet<String> {
        let mut declared: BTreeSet<&str> = BTreeSet::from([self.start.alias.as_str()]);
        let mut unbound = BTreeSet::new();
        for step in &self.paths {
            if !declared.contains(step.from.as_str()) {
                unbound.insert(step.from.clone());
            }
            declared.insert(step.to.alias.as_str());
        }
        let referenced = self
            .filters
            .iter()
            .flat_map(|f| f.aliases())
            .chain(self.return_properties.iter().map(|p| split_property(p).0));
        for alias in referenced {
            if !declared.contains(alias) {
                unbound.insert(alias.to_string());
            }
        }
        unbound
    }
}

/// 一条完整匹配：别名 -> 节点id，以及该匹配上的返回属性
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub nodes: BTreeMap<String, String>,
    pub properties: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub bindings: Vec<Binding>,
    /// `alias.prop` -> 按首次出现顺序去重的取值
    pub properties: BTreeMap<String, Vec<Value>>,
    pub count: usize,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn first(&self, key: &str) -> Option<&Value> {
        self.properties.get(key).and_then(|values| values.first())
    }
}

fn retain_matching(
    graph: &KnowledgeGraph,
    filters: &[&Filter],
    bindings: Vec<BTreeMap<String, String>>,
) -> Vec<BTreeMap<String, String>> {
    bindings
        .into_iter()
        .filter(|binding| filters.iter().all(|f| f.matches(graph, binding)))
        .collect()
}

/// 选出恰好在 `alias` 绑定时变为可判定的过滤条件
fn filters_ready<'q>(
    filters: &'q [Filter],
    bound: &BTreeSet<&str>,
    alias: &str,
) -> Vec<&'q Filter> {
    filters
        .iter()
        .filter(|f| {
            let aliases = f.aliases();
            aliases.contains(alias) && aliases.iter().all(|a| bound.contains(a))
        })
        .collect()
}

pub(super) fn execute(graph: &KnowledgeGraph, query: &GraphQuery) -> QueryResult {
    let unbound = query.unbound_aliases();
    if !unbound.is_empty() {
        tracing::warn!(?unbound, "graph query references undeclared aliases");
        return QueryResult::default();
    }

    let start_alias = query.start.alias.as_str();
    let mut bound: BTreeSet<&str> = BTreeSet::from([start_alias]);

    let mut bindings: Vec<BTreeMap<String, String>> = graph
        .nodes_with_label(&query.start.label)
        .map(|node| BTreeMap::from([(start_alias.to_string(), node.id.clone())]))
        .collect();
    bindings = retain_matching(
        graph,
        &filters_ready(&query.filters, &bound, start_alias),
        bindings,
    );

    for step in &query.paths {
        let to_alias = step.to.alias.as_str();
        let mut next = Vec::new();

        for binding in &bindings {
            let Some(from_id) = binding.get(&step.from) else {
                continue;
            };
            let Ok(neighbors) = graph.neighbors(from_id, step.direction, step.relation.as_deref())
            else {
                continue;
            };
            let mut seen = BTreeSet::new();
            for node in neighbors
                .into_iter()
                .filter(|n: &&GraphNode| n.has_label(&step.to.label))
            {
                if !seen.insert(node.id.as_str()) {
                    continue;
                }
                match binding.get(to_alias) {
                    Some(already) if already != &node.id => continue,
                    _ => {}
                }
                let mut extended = binding.clone();
                extended.insert(to_alias.to_string(), node.id.clone());
                next.push(extended);
            }
        }

        bound.insert(to_alias);
        bindings = retain_matching(graph, &filters_ready(&query.filters, &bound, to_alias), next);
    }

    let mut result = QueryResult::default();
    for nodes in bindings {
        let mut properties = BTreeMap::new();
        for key in &query.return_properties {
            let (alias, prop) = split_property(key);
            if let Some(value) = nodes
                .get(alias)
                .and_then(|id| graph.node(id))
                .and_then(|node| node.property(prop))
            {
                let aggregated = result.properties.entry(key.clone()).or_default();
                if !aggregated.contains(&value) {
                    aggregated.push(value.clone());
                }
                properties.insert(key.clone(), value);
            }
        }
        result.bindings.push(Binding { nodes, properties });
    }
    result.count = result.bindings.len();

    tracing::debug!(
        start = %query.start.label,
        steps = query.paths.len(),
        count = result.count,
        "graph query executed"
    );
    result
}
