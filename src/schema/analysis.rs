//! 实例数据统计：属性类型推断与schema变更建议

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use super::PropertyDef;

static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d{4}-\d{2}-\d{2}|\d{2}/\d{2}/\d{4}|\d{2}-\d{2}-\d{4}|\d{2}\.\d{2}\.\d{4})$")
        .expect("date pattern is valid")
});

/// 推断属性值的数据类型
pub fn infer_property_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::Object(_) => "object",
        Value::Array(_) => "array",
        Value::String(s) if DATE_PATTERN.is_match(s) => "date",
        Value::String(_) => "string",
    }
}

/// 单个属性在实例数据中的出现统计
#[derive(Debug, Clone, Default)]
pub struct PropertyStats {
    pub count: usize,
    pub types: BTreeSet<String>,
    pub values: BTreeSet<String>,
}

impl PropertyStats {
    pub fn observe(&mut self, value: &Value, sample_limit: usize) {
        self.count += 1;
        self.types.insert(infer_property_type(value).to_string());
        if self.values.len() < sample_limit {
            let sample = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            self.values.insert(sample);
        }
    }
}

/// 属性分析结论
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyAnalysis {
    #[serde(rename = "type")]
    pub property_type: String,
    pub required: bool,
    pub sample_values: Vec<String>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl PropertyAnalysis {
    pub fn to_definition(&self) -> PropertyDef {
        PropertyDef {
            property_type: self.property_type.clone(),
            required: self.required,
            enum_values: self.enum_values.clone(),
        }
    }
}

/// 根据统计结果确定属性类型与约束
pub fn analyze_property(name: &str, stats: &PropertyStats) -> PropertyAnalysis {
    let types = &stats.types;
    let mut property_type = if types.len() == 1 {
        types.iter().next().cloned().unwrap_or_default()
    } else if types.contains("string") {
        "string".to_string()
    } else if types.contains("number") && types.contains("integer") {
        "number".to_string()
    } else {
        types.iter().next().cloned().unwrap_or_else(|| "string".to_string())
    };

    let lower_name = name.to_lowercase();
    if lower_name.contains("date") && property_type == "string" {
        property_type = "date".to_string();
    }
    let required =
        stats.count > 5 || lower_name.contains("id") || lower_name.contains("number");

    let enum_values = (stats.values.len() <= 5 && stats.count >= 5)
        .then(|| stats.values.iter().cloned().collect());

    PropertyAnalysis {
        property_type,
        required,
        sample_values: stats.values.iter().cloned().collect(),
        enum_values,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTypeProposal {
    pub name: String,
    pub frequency: usize,
    pub proposed_properties: BTreeMap<String, PropertyAnalysis>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipProposal {
    pub name: String,
    pub source: String,
    pub target: String,
    pub frequency: usize,
    pub proposed_properties: BTreeMap<String, PropertyAnalysis>,
}

/// `analyze_instance_data` 的输出，置信度按 `entity_type:X`、`relationship_type:R:S:T`、`property:X.p` 索引
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaRecommendations {
    pub new_entity_types: Vec<EntityTypeProposal>,
    pub new_property_types: BTreeMap<String, BTreeMap<String, PropertyAnalysis>>,
    pub new_relationship_types: Vec<RelationshipProposal>,
    pub confidence_scores: BTreeMap<String, f64>,
}

impl SchemaRecommendations {
    pub fn confidence(&self, key: &str) -> f64 {
        self.confidence_scores.get(key).copied().unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.new_entity_types.is_empty()
            && self.new_property_types.is_empty()
            && self.new_relationship_types.is_empty()
    }
}
