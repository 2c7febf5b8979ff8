//! 抽取结果的去重、关系重映射与关系推断

use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::graph::{Entity, Relationship};

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// 去重键：Definition按term，其他按name
fn dedup_key(entity: &mut Entity) -> Option<String> {
    if entity.entity_type == "Definition"
        && let Some(term) = entity.attribute_str("term").map(str::to_string)
    {
        if entity.name.is_none() {
            entity.name = Some(term.clone());
        }
        return Some(format!("Definition:{}", term.to_lowercase()));
    }
    let name = entity.name.as_deref()?;
    Some(format!(
        "{}:{}",
        entity.entity_type,
        name.trim().to_lowercase()
    ))
}

fn merge_attributes(existing: &mut Entity, incoming: &Entity) {
    for (key, value) in &incoming.attributes {
        let current_truthy = existing.attributes.get(key).is_some_and(is_truthy);
        if !current_truthy {
            if is_truthy(value) {
                existing.attributes.insert(key.clone(), value.clone());
            }
            continue;
        }
        // 两边都是列表时取并集
        if let (Some(Value::Array(current_items)), Value::Array(new_items)) =
            (existing.attributes.get_mut(key), value)
        {
            for item in new_items {
                if !current_items.contains(item) {
                    current_items.push(item.clone());
                }
            }
        }
    }
}

/// 合并同类型同名实体
///
/// 返回去重后的实体，以及被合并掉的旧id到保留id的映射。
pub fn deduplicate_entities(entities: Vec<Entity>) -> (Vec<Entity>, HashMap<String, String>) {
    let mut unique: Vec<Entity> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();
    let mut absorbed: Vec<(String, usize)> = Vec::new();

    for mut entity in entities {
        let Some(key) = dedup_key(&mut entity) else {
            tracing::debug!(id = %entity.id, "entity without name skipped during dedup");
            continue;
        };
        match by_key.get(&key) {
            None => {
                by_key.insert(key, unique.len());
                unique.push(entity);
            }
            Some(&idx) => {
                let existing = &mut unique[idx];
                merge_attributes(existing, &entity);
                if entity.id.len() > existing.id.len() {
                    let previous = std::mem::replace(&mut existing.id, entity.id);
                    absorbed.push((previous, idx));
                } else {
                    absorbed.push((entity.id, idx));
                }
            }
        }
    }

    let id_map = absorbed
        .into_iter()
        .filter(|(old, idx)| old != &unique[*idx].id)
        .map(|(old, idx)| (old, unique[idx].id.clone()))
        .collect();
    (unique, id_map)
}

fn resolve_id(id: &str, known: &HashSet<&str>, id_map: &HashMap<String, String>, entities: &[Entity]) -> Option<String> {
    if known.contains(id) {
        return Some(id.to_string());
    }
    if let Some(mapped) = id_map.get(id) {
        return Some(mapped.clone());
    }
    // 唯一前缀匹配修复
    let mut candidates = entities.iter().filter(|e| e.id.starts_with(id));
    match (candidates.next(), candidates.next()) {
        (Some(only), None) if !id.is_empty() => Some(only.id.clone()),
        _ => None,
    }
}

/// 把关系端点映射到去重后的实体id，无法解析的关系被丢弃
pub fn remap_relationships(
    relationships: Vec<Relationship>,
    entities: &[Entity],
    id_map: &HashMap<String, String>,
) -> Vec<Relationship> {
    let known: HashSet<&str> = entities.iter().map(|e| e.id.as_str()).collect();
    relationships
        .into_iter()
        .filter_map(|mut rel| {
            let source = resolve_id(&rel.source, &known, id_map, entities);
            let target = resolve_id(&rel.target, &known, id_map, entities);
            match (source, target) {
                (Some(source), Some(target)) => {
                    rel.source = source;
                    rel.target = target;
                    Some(rel)
                }
                _ => {
                    tracing::debug!(
                        source = %rel.source,
                        target = %rel.target,
                        relation = %rel.relation_type,
                        "dropping relationship with unresolved endpoints"
                    );
                    None
                }
            }
        })
        .collect()
}

fn attributes_text(entity: &Entity) -> String {
    serde_json::to_string(&entity.attributes)
        .unwrap_or_default()
        .to_lowercase()
}

/// 基于领域知识推断关系：定义被保障引用、除外责任排除保障
pub fn infer_relationships(entities: &[Entity]) -> Vec<Relationship> {
    let of_type = |t: &'static str| entities.iter().filter(move |e| e.entity_type == t);
    let mut inferred = Vec::new();

    for coverage in of_type("Coverage") {
        let text = attributes_text(coverage);
        for definition in of_type("Definition") {
            if let Some(term) = definition.attribute_str("term")
                && !term.is_empty()
                && text.contains(&term.to_lowercase())
            {
                inferred.push(Relationship::new(&definition.id, &coverage.id, "referenced_by"));
            }
        }
    }

    for exclusion in of_type("Exclusion") {
        let text = attributes_text(exclusion);
        for coverage in of_type("Coverage") {
            if let Some(name) = coverage.name.as_deref()
                && !name.trim().is_empty()
                && text.contains(&name.to_lowercase())
            {
                inferred.push(Relationship::new(&exclusion.id, &coverage.id, "excludes"));
            }
        }
    }

    inferred
}

/// 按 (source, target, type) 去重，保留首次出现
pub fn deduplicate_relationships(relationships: Vec<Relationship>) -> Vec<Relationship> {
    let mut seen = HashSet::new();
    relationships
        .into_iter()
        .filter(|rel| {
            seen.insert((
                rel.source.clone(),
                rel.target.clone(),
                rel.relation_type.clone(),
            ))
        })
        .collect()
}
