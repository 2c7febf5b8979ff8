//! 保险文档处理：抓取、分类、分节、LLM抽取、去重与导出

use anyhow::{Context, Result};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use walkdir::WalkDir;

use crate::cache::CacheManager;
use crate::config::DocumentConfig;
use crate::graph::{Entity, GraphDocument, KnowledgeGraph, Relationship};
use crate::llm::LanguageModel;
use crate::llm::client::utils::estimate_token_usage;
use crate::prompts::{PromptTemplate, builtin};
use crate::utils::text::{chunk_chars, extract_json_object, slugify, truncate_chars};
use crate::utils::threads::do_parallel_with_limit;

pub mod merge;

pub const INSURANCE_KEYWORDS: &[&str] = &[
    "policy",
    "insurance",
    "coverage",
    "claim",
    "premium",
    "deductible",
    "insured",
    "underwriting",
    "risk",
    "peril",
];

pub const ENTITY_TYPES: &[&str] = &[
    "Policy",
    "Claim",
    "Coverage",
    "Exclusion",
    "Premium",
    "Deductible",
    "Insured",
    "Insurer",
    "Beneficiary",
    "Term",
    "Endorsement",
    "Rider",
    "Underwriting",
    "Risk",
    "Peril",
    "Definition",
    "Limit",
    "Condition",
    "Property",
    "Liability",
    "Additional_Coverage",
];

pub const RELATIONSHIP_TYPES: &[&str] = &["covers", "excludes", "has", "applies_to", "pays_to"];

const CACHE_CATEGORY: &str = "extraction";
const FULL_DOCUMENT: &str = "full_document";
const DEFAULT_SYSTEM_PROMPT: &str = "You extract structured information from insurance documents and answer with JSON only.";

static SECTION_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("definitions", "DEFINITIONS"),
        ("section_i_coverages", r"SECTION I PROPERTY COVERAGES"),
        ("section_i_exclusions", r"SECTION I EXCLUSIONS"),
        ("section_ii_coverages", r"SECTION II LIABILITY COVERAGES"),
        ("section_ii_exclusions", r"SECTION II EXCLUSIONS"),
        ("perils", r"PERILS INSURED AGAINST"),
        ("conditions", "CONDITIONS"),
    ]
    .into_iter()
    .map(|(name, heading)| {
        let pattern = format!(r"(?is){}\s*(.*?)(?:SECTION|\z)", heading);
        (name, Regex::new(&pattern).expect("section pattern is valid"))
    })
    .collect()
});

static MEANS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([^"]+)"\s+means:\s*([^.]+)."#).expect("definition pattern is valid")
});

static DEFINED_AS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\w+)\s+is defined as\s+([^.]+).").expect("definition pattern is valid")
});

/// LLM需要返回的JSON结构
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionPayload {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

/// 单个文档（或文本块）的抽取结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentExtraction {
    pub source: String,
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

/// 文本中通过正则匹配到的定义
#[derive(Debug, Clone, PartialEq)]
pub struct PatternDefinition {
    pub term: String,
    pub meaning: String,
    pub extraction_type: &'static str,
}

/// 批处理结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub documents_processed: usize,
    pub failed_documents: Vec<String>,
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

impl BatchResult {
    pub fn to_document(&self) -> GraphDocument {
        GraphDocument {
            nodes: self.entities.iter().map(Entity::to_node).collect(),
            edges: self.relationships.iter().map(Relationship::to_edge).collect(),
        }
    }
}

/// 已处理文档的存档
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub file_path: PathBuf,
    pub extraction: DocumentExtraction,
    pub extracted_at: chrono::DateTime<chrono::Utc>,
}

/// 读取文本前 `sample_chars` 个字符，命中的关键词数超过 `min_keyword_hits` 即视为保险文档
pub fn classify_text(sample: &str, min_keyword_hits: usize) -> bool {
    let lower = sample.to_lowercase();
    let hits = INSURANCE_KEYWORDS
        .iter()
        .filter(|k| lower.contains(*k))
        .count();
    hits > min_keyword_hits
}

/// 按章节标题切分，只保留非空章节，并总是附带全文
pub fn extract_sections(text: &str) -> Vec<(String, String)> {
    let mut sections: Vec<(String, String)> = SECTION_PATTERNS
        .iter()
        .filter_map(|(name, pattern)| {
            let body = pattern.captures(text)?.get(1)?.as_str().trim();
            (!body.is_empty()).then(|| (name.to_string(), body.to_string()))
        })
        .collect();
    sections.push((FULL_DOCUMENT.to_string(), text.to_string()));
    sections
}

pub fn extract_definitions(text: &str) -> Vec<PatternDefinition> {
    let mut definitions = Vec::new();
    for (pattern, extraction_type) in [
        (&*MEANS_PATTERN, "direct_match"),
        (&*DEFINED_AS_PATTERN, "is_defined_as"),
    ] {
        for caps in pattern.captures_iter(text) {
            definitions.push(PatternDefinition {
                term: caps[1].to_string(),
                meaning: caps[2].trim().to_string(),
                extraction_type,
            });
        }
    }
    definitions
}

/// 解析LLM回复：整体JSON，或回复中第一个 `{...}` 块
pub fn parse_extraction_response(raw: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(raw.trim())
        && value.is_object()
    {
        return Some(value);
    }
    extract_json_object(raw).and_then(|block| serde_json::from_str::<Value>(block).ok())
}

/// 校验并规整实体；Definition缺少term/meaning时尝试由name/description转换
pub fn validate_entity(mut entity: Entity) -> Option<Entity> {
    if entity.id.trim().is_empty() || !ENTITY_TYPES.contains(&entity.entity_type.as_str()) {
        tracing::debug!(id = %entity.id, entity_type = %entity.entity_type, "invalid entity");
        return None;
    }

    if entity.entity_type == "Definition" {
        let complete = entity.attributes.contains_key("term")
            && entity.attributes.contains_key("meaning");
        if !complete {
            let description = entity.attributes.get("description").cloned();
            match (entity.name.clone(), description) {
                (Some(name), Some(description)) => {
                    entity.attributes.insert("term".to_string(), Value::String(name));
                    entity.attributes.insert("meaning".to_string(), description);
                    entity.attributes.remove("description");
                }
                _ => {
                    tracing::debug!(id = %entity.id, "definition missing term or meaning");
                    return None;
                }
            }
        }
    } else if entity.name.is_none() {
        tracing::debug!(id = %entity.id, "entity missing name");
        return None;
    }

    Some(entity)
}

pub fn validate_relationship(relationship: &Relationship, entities: &[Entity]) -> bool {
    RELATIONSHIP_TYPES.contains(&relationship.relation_type.as_str())
        && entities.iter().any(|e| e.id == relationship.source)
        && entities.iter().any(|e| e.id == relationship.target)
}

/// 对解析后的JSON逐项校验，单个坏项不影响其他项
pub fn validate_payload(value: &Value) -> ExtractionPayload {
    let entities: Vec<Entity> = value
        .get("entities")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<Entity>(item.clone()).ok())
                .filter_map(validate_entity)
                .collect()
        })
        .unwrap_or_default();

    let relationships = value
        .get("relationships")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<Relationship>(item.clone()).ok())
                .filter(|rel| validate_relationship(rel, &entities))
                .collect()
        })
        .unwrap_or_default();

    ExtractionPayload {
        entities,
        relationships,
    }
}

pub struct InsuranceDocumentProcessor {
    config: DocumentConfig,
    model: Arc<dyn LanguageModel>,
    cache: Arc<CacheManager>,
    template: PromptTemplate,
    output_schema: String,
    used_ids: HashSet<String>,
    document_store: BTreeMap<String, StoredDocument>,
    current: Option<BatchResult>,
}

impl InsuranceDocumentProcessor {
    pub fn new(config: DocumentConfig, model: Arc<dyn LanguageModel>, cache: Arc<CacheManager>) -> Self {
        let output_schema =
            serde_json::to_string_pretty(&schemars::schema_for!(ExtractionPayload))
                .unwrap_or_default();
        Self {
            config,
            model,
            cache,
            template: builtin::entity_extraction(),
            output_schema,
            used_ids: HashSet::new(),
            document_store: BTreeMap::new(),
            current: None,
        }
    }

    /// 使用注册表中（可能被用户修改过的）抽取模板
    pub fn with_extraction_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn current(&self) -> Option<&BatchResult> {
        self.current.as_ref()
    }

    pub fn document_store(&self) -> &BTreeMap<String, StoredDocument> {
        &self.document_store
    }

    /// 抓取文档：目录递归扫描，单个文件直接保留，http(s)来源暂不支持
    pub fn crawl(&self, sources: &[PathBuf]) -> Vec<PathBuf> {
        let mut discovered = Vec::new();

        for source in sources {
            let source_str = source.to_string_lossy();
            if source_str.starts_with("http://") || source_str.starts_with("https://") {
                tracing::warn!(source = %source_str, "web sources are not supported, skipping");
                continue;
            }
            if source.is_file() {
                discovered.push(source.clone());
                continue;
            }
            if !source.is_dir() {
                tracing::warn!(source = %source_str, "unsupported source type");
                continue;
            }

            for entry in WalkDir::new(source)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let path = entry.path();
                if self.has_supported_extension(path) && self.is_insurance_document(path) {
                    discovered.push(path.to_path_buf());
                }
            }
        }

        tracing::info!(count = discovered.len(), "insurance documents discovered");
        discovered
    }

    fn has_supported_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.config
                    .extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
    }

    pub fn is_insurance_document(&self, path: &Path) -> bool {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let sample = truncate_chars(&text, self.config.sample_chars);
                let result = classify_text(sample, self.config.min_keyword_hits);
                tracing::debug!(path = %path.display(), is_insurance = result, "document classified");
                result
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read document sample");
                false
            }
        }
    }

    fn build_prompt(&self, section: &str, chunk: &str) -> String {
        let vars = BTreeMap::from([
            ("section_name".to_string(), section.to_string()),
            ("entity_types".to_string(), ENTITY_TYPES.join(", ")),
            ("relationship_types".to_string(), RELATIONSHIP_TYPES.join(", ")),
            ("output_schema".to_string(), self.output_schema.clone()),
            ("document_text".to_string(), chunk.to_string()),
        ]);
        self.template.format(&vars)
    }

    /// 抽取单个文本块；LLM失败或回复无法解析时返回空结果
    async fn extract_chunk(&self, section: &str, chunk: &str) -> ExtractionPayload {
        let system_prompt = self
            .template
            .metadata
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);
        let prompt = self.build_prompt(section, chunk);
        let cache_key = format!("{}\n{}", system_prompt, prompt);

        if let Ok(Some(cached)) = self.cache.get::<Value>(CACHE_CATEGORY, &cache_key).await {
            return validate_payload(&cached);
        }

        let raw = match self.model.complete(system_prompt, &prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(section, error = %e, "extraction request failed");
                return ExtractionPayload::default();
            }
        };

        let Some(parsed) = parse_extraction_response(&raw) else {
            tracing::warn!(section, "extraction response is not valid JSON, using empty result");
            return ExtractionPayload::default();
        };

        if let Err(e) = self
            .cache
            .set_with_tokens(
                CACHE_CATEGORY,
                &cache_key,
                &parsed,
                estimate_token_usage(&prompt, &raw),
                &self.model.model_name(),
            )
            .await
        {
            tracing::warn!(error = %e, "failed to cache extraction");
        }

        validate_payload(&parsed)
    }

    fn claim_id(&mut self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut counter = 1;
        while self.used_ids.contains(&candidate) {
            candidate = format!("{}_{}", base, counter);
            counter += 1;
        }
        self.used_ids.insert(candidate.clone());
        candidate
    }

    /// 为文本块内的实体生成全局唯一id，并重映射关系端点
    pub fn ensure_unique_ids(
        &mut self,
        payload: ExtractionPayload,
        section: &str,
        chunk_index: usize,
    ) -> ExtractionPayload {
        let section_prefix: String = section.chars().take(3).collect();
        let mut id_mapping = BTreeMap::new();
        let mut entities = Vec::with_capacity(payload.entities.len());

        for mut entity in payload.entities {
            let entity_type = entity.entity_type.to_lowercase().replace(' ', "_");
            let preferred = if entity.entity_type == "Definition" {
                entity
                    .attribute_str("term")
                    .filter(|t| !t.is_empty())
                    .or(entity.name.as_deref())
            } else {
                entity.name.as_deref()
            };
            let identifier = preferred
                .filter(|i| !i.is_empty())
                .unwrap_or(entity.id.as_str());
            let identifier = slugify(&truncate_chars(identifier, 10).to_lowercase());

            let base = format!("{}_{}_{}_{}", entity_type, section_prefix, chunk_index, identifier);
            let unique = self.claim_id(&base);
            id_mapping.insert(entity.id.clone(), unique.clone());
            entity.id = unique;
            entities.push(entity);
        }

        let relationships = payload
            .relationships
            .into_iter()
            .filter_map(|mut rel| {
                rel.source = id_mapping.get(&rel.source)?.clone();
                rel.target = id_mapping.get(&rel.target)?.clone();
                Some(rel)
            })
            .collect();

        ExtractionPayload {
            entities,
            relationships,
        }
    }

    /// 处理单个文档
    pub async fn process_document(&mut self, path: &Path) -> Result<DocumentExtraction> {
        let text = tokio::fs::read_to_string(path)
            .await
            .context(format!("Failed to read document: {:?}", path))?;

        println!("   📄 处理文档: {}", path.display());

        let sections = extract_sections(&text);
        let mut jobs: Vec<(String, usize, String)> = Vec::new();
        for (section, body) in &sections {
            for (index, chunk) in chunk_chars(body, self.config.chunk_size)
                .into_iter()
                .enumerate()
            {
                jobs.push((section.clone(), index, chunk));
            }
        }
        tracing::info!(
            path = %path.display(),
            sections = sections.len(),
            chunks = jobs.len(),
            "document split into chunks"
        );

        let payloads = {
            let futures: Vec<_> = jobs
                .iter()
                .map(|(section, _, chunk)| self.extract_chunk(section, chunk))
                .collect();
            do_parallel_with_limit(futures, self.config.max_parallels).await
        };

        let mut entities = Vec::new();
        let mut relationships = Vec::new();
        for ((section, index, _), payload) in jobs.iter().zip(payloads) {
            let unique = self.ensure_unique_ids(payload, section, *index);
            entities.extend(unique.entities);
            relationships.extend(unique.relationships);
        }

        for (i, definition) in extract_definitions(&text).into_iter().enumerate() {
            let duplicate = entities.iter().any(|e| {
                e.entity_type == "Definition"
                    && e.display_name()
                        .is_some_and(|n| n.eq_ignore_ascii_case(&definition.term))
            });
            if duplicate {
                continue;
            }
            let id = self.claim_id(&format!("def_pattern_{}", i + 1));
            entities.push(
                Entity::new(id, "Definition", definition.term.clone())
                    .with_attribute("term", definition.term)
                    .with_attribute("meaning", definition.meaning)
                    .with_attribute("extraction_type", definition.extraction_type)
                    .with_attribute("source", "pattern_matching"),
            );
        }

        let (entities, id_map) = merge::deduplicate_entities(entities);
        let mut relationships = merge::remap_relationships(relationships, &entities, &id_map);
        relationships.extend(merge::infer_relationships(&entities));
        let relationships = merge::deduplicate_relationships(relationships);

        let extraction = DocumentExtraction {
            source: path.display().to_string(),
            entities,
            relationships,
        };

        let doc_id = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| extraction.source.clone());
        self.document_store.insert(
            doc_id,
            StoredDocument {
                file_path: path.to_path_buf(),
                extraction: extraction.clone(),
                extracted_at: chrono::Utc::now(),
            },
        );

        println!(
            "   ✅ 抽取完成: {} 个实体, {} 条关系",
            extraction.entities.len(),
            extraction.relationships.len()
        );
        Ok(extraction)
    }

    /// 批量处理文档并合并结果，作为处理器的当前状态
    pub async fn process_batch(&mut self, paths: &[PathBuf]) -> BatchResult {
        let mut all_entities = Vec::new();
        let mut all_relationships = Vec::new();
        let mut processed = 0;
        let mut failed = Vec::new();

        for path in paths {
            match self.process_document(path).await {
                Ok(extraction) => {
                    processed += 1;
                    all_entities.extend(extraction.entities);
                    all_relationships.extend(extraction.relationships);
                }
                Err(e) => {
                    eprintln!("❌ 文档处理失败: {} ({})", path.display(), e);
                    failed.push(path.display().to_string());
                }
            }
        }

        let (entities, id_map) = merge::deduplicate_entities(all_entities);
        let mut relationships = merge::remap_relationships(all_relationships, &entities, &id_map);
        relationships.extend(merge::infer_relationships(&entities));
        let relationships = merge::deduplicate_relationships(relationships);

        let result = BatchResult {
            documents_processed: processed,
            failed_documents: failed,
            entities,
            relationships,
        };
        tracing::info!(
            documents = result.documents_processed,
            entities = result.entities.len(),
            relationships = result.relationships.len(),
            "document batch processed"
        );
        self.current = Some(result.clone());
        result
    }

    pub fn to_graph(&self) -> KnowledgeGraph {
        self.current
            .as_ref()
            .map(|batch| KnowledgeGraph::from_document(batch.to_document()))
            .unwrap_or_default()
    }

    /// 导出当前结果为图文档
    pub fn export(&self, path: &Path) -> Result<KnowledgeGraph> {
        let graph = self.to_graph();
        graph.save(path)?;
        println!(
            "💾 导出知识图谱: {} 个节点, {} 条边 -> {}",
            graph.node_count(),
            graph.edge_count(),
            path.display()
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests;
