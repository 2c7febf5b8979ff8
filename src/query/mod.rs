//! Graph RAG查询处理：意图识别 -> 参数抽取 -> 图查询 -> 模板化回答

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;
use std::time::Instant;
use uuid::Uuid;

use crate::graph::{Direction, Filter, GraphQuery, KnowledgeGraph, QueryResult};
use crate::schema::GraphSchema;
use crate::utils::text::{content_words, jaccard_similarity};

pub mod intent;
pub mod params;
pub mod response;

pub use intent::{IntentAnalysis, IntentMethod, KNOWN_INTENTS, UNKNOWN};
pub use params::{QueryParameters, UserContext};
pub use response::{GeneratedResponse, ResponseTemplate, Slots};

use intent::{
    CLAIM_STATUS, COVERAGE_INQUIRY, DEFINITION_INQUIRY, FILING_CLAIM, POLICY_DETAILS,
    PREMIUM_INFORMATION,
};

pub const CLAIM_REQUIRED_INFO: &str =
    "policy information, date and details of incident, photos if applicable";
pub const CLAIMS_CONTACT: &str = "1-800-555-CLAIM or claims@example-insurance.com";

const MAX_HISTORY: usize = 10;
/// 自动优化时加入示例所需的最低置信度
const HIGH_CONFIDENCE: f64 = 0.9;
const SLOW_RESPONSE_MS: f64 = 500.0;
const DEFINITION_MATCH_CUTOFF: f64 = 0.5;

/// 流程类问题的固定答复数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProceduralInfo {
    pub steps: Vec<String>,
    pub required_info: String,
    pub contact: String,
}

impl ProceduralInfo {
    pub fn filing_claim() -> Self {
        Self {
            steps: vec![
                "Report the incident immediately".to_string(),
                "Gather all relevant information".to_string(),
                "Contact our claims department".to_string(),
            ],
            required_info: CLAIM_REQUIRED_INFO.to_string(),
            contact: CLAIMS_CONTACT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryPlan {
    Graph(GraphQuery),
    Procedural(ProceduralInfo),
    Definition { term: String },
    Unsupported,
}

impl QueryPlan {
    pub fn is_complex(&self) -> bool {
        matches!(self, QueryPlan::Graph(query) if query.is_complex())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionMatch {
    pub term: String,
    pub meaning: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryResults {
    Graph(QueryResult),
    Procedural(ProceduralInfo),
    Definition(Option<DefinitionMatch>),
    Empty,
}

impl QueryResults {
    pub fn count(&self) -> usize {
        match self {
            QueryResults::Graph(result) => result.count,
            QueryResults::Procedural(_) => 1,
            QueryResults::Definition(found) => usize::from(found.is_some()),
            QueryResults::Empty => 0,
        }
    }
}

/// 按意图与参数构造图查询
pub fn build_graph_query(intent: &str, params: &QueryParameters) -> QueryPlan {
    let policy_filter = |query: GraphQuery| match &params.policy_number {
        Some(number) => query.filter(Filter::eq("p.policy_number", number.as_str())),
        None => query,
    };
    let insured_filter = |query: GraphQuery, from: &str| match &params.user_id {
        Some(user_id) => query
            .path(from, Some("INSURES"), Direction::Outgoing, "Insured", "i")
            .filter(Filter::eq("i.id_number", user_id.as_str())),
        None => query,
    };

    match intent {
        POLICY_DETAILS => {
            let mut query = GraphQuery::new("Policy", "p").returning(&[
                "p.policy_number",
                "p.effective_date",
                "p.expiration_date",
                "p.status",
                "p.type",
            ]);
            query = policy_filter(query);
            if let Some(policy_type) = &params.policy_type {
                query = query.filter(Filter::eq("p.type", policy_type.as_str()));
            }
            if params.user_id.is_some() {
                query = insured_filter(query, "p").returning(&["i.name"]);
            }
            QueryPlan::Graph(query)
        }
        COVERAGE_INQUIRY => {
            let mut query = GraphQuery::new("Policy", "p")
                .path("p", Some("HAS_COVERAGE"), Direction::Outgoing, "Coverage", "c")
                .returning(&["p.policy_number", "c.type", "c.limit", "c.deductible"]);
            query = policy_filter(query);
            if !params.coverage_types.is_empty() {
                let conditions = params
                    .coverage_types
                    .iter()
                    .map(|kind| Filter::eq("c.type", kind.as_str()))
                    .collect();
                query = query.filter(Filter::any(conditions));
            }
            QueryPlan::Graph(query)
        }
        CLAIM_STATUS => {
            let returning = ["c.claim_number", "c.date_of_loss", "c.status", "c.amount"];
            let mut query = match &params.user_id {
                Some(user_id) => GraphQuery::new("Insured", "i")
                    .path("i", Some("FILES_CLAIM"), Direction::Outgoing, "Claim", "c")
                    .filter(Filter::eq("i.id_number", user_id.as_str())),
                None => GraphQuery::new("Claim", "c"),
            }
            .returning(&returning);
            if let Some(number) = &params.claim_number {
                query = query.filter(Filter::eq("c.claim_number", number.as_str()));
            }
            QueryPlan::Graph(query)
        }
        PREMIUM_INFORMATION => {
            let mut query = GraphQuery::new("Policy", "p")
                .path("p", Some("HAS_PREMIUM"), Direction::Outgoing, "Premium", "pr")
                .returning(&[
                    "p.policy_number",
                    "pr.amount",
                    "pr.payment_frequency",
                    "pr.due_date",
                ]);
            query = policy_filter(query);
            query = insured_filter(query, "p");
            QueryPlan::Graph(query)
        }
        FILING_CLAIM => QueryPlan::Procedural(ProceduralInfo::filing_claim()),
        DEFINITION_INQUIRY => match &params.term {
            Some(term) => QueryPlan::Definition { term: term.clone() },
            None => QueryPlan::Unsupported,
        },
        _ => QueryPlan::Unsupported,
    }
}

/// 术语相似度：互相包含记0.8，否则按词集合Jaccard
pub fn term_similarity(a: &str, b: &str) -> f64 {
    if a.contains(b) || b.contains(a) {
        0.8
    } else {
        jaccard_similarity(a, b)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query_id: String,
    pub query: String,
    pub intent: String,
    pub confidence: f64,
    pub method: IntentMethod,
    pub parameters: QueryParameters,
    pub answer: String,
    pub success: bool,
    pub follow_up_questions: Vec<String>,
    pub elapsed_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub query_id: String,
    pub query: String,
    pub intent: String,
    pub confidence: f64,
    pub parameters: QueryParameters,
    pub answer: String,
    pub success: bool,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryMetrics {
    pub total_queries: usize,
    pub successful_queries: usize,
    pub avg_response_time_ms: f64,
    pub intent_distribution: BTreeMap<String, usize>,
    pub complex_query_count: usize,
    /// 各意图的平均响应时间
    #[serde(default)]
    pub intent_response_ms: BTreeMap<String, f64>,
}

impl QueryMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.total_queries == 0 {
            0.0
        } else {
            self.successful_queries as f64 / self.total_queries as f64
        }
    }
}

/// 用户对一次回答的反馈
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFeedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub query_id: String,
    pub feedback: QueryFeedback,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackUpdate {
    pub intents_improved: usize,
    pub examples_added: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredIntent {
    pub intent_name: String,
    pub description: String,
    pub examples: Vec<String>,
    pub common_words: Vec<String>,
    pub cluster_size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub changes_made: Vec<String>,
    pub examples_added: usize,
    pub slow_intents: Vec<String>,
    pub discovered_intents: Vec<DiscoveredIntent>,
}

pub struct QueryProcessor {
    graph: KnowledgeGraph,
    schema: Option<GraphSchema>,
    intent_examples: BTreeMap<String, Vec<String>>,
    response_templates: BTreeMap<String, Vec<ResponseTemplate>>,
    history: VecDeque<HistoryEntry>,
    metrics: QueryMetrics,
    feedback: Vec<FeedbackEntry>,
    discovered_clusters: BTreeSet<String>,
}

impl Default for QueryProcessor {
    fn default() -> Self {
        Self::new(KnowledgeGraph::new())
    }
}

impl QueryProcessor {
    pub fn new(graph: KnowledgeGraph) -> Self {
        Self {
            graph,
            schema: None,
            intent_examples: intent::default_examples(),
            response_templates: response::default_templates(),
            history: VecDeque::new(),
            metrics: QueryMetrics::default(),
            feedback: Vec::new(),
            discovered_clusters: BTreeSet::new(),
        }
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut KnowledgeGraph {
        &mut self.graph
    }

    pub fn set_graph(&mut self, graph: KnowledgeGraph) {
        self.graph = graph;
    }

    pub fn schema(&self) -> Option<&GraphSchema> {
        self.schema.as_ref()
    }

    pub fn set_schema(&mut self, schema: GraphSchema) {
        self.schema = Some(schema);
    }

    pub fn load_schema(&mut self, path: &Path) -> Result<()> {
        self.schema = Some(GraphSchema::load(path)?);
        Ok(())
    }

    pub fn metrics(&self) -> &QueryMetrics {
        &self.metrics
    }

    pub fn restore_metrics(&mut self, metrics: QueryMetrics) {
        self.metrics = metrics;
    }

    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    pub fn intent_examples(&self) -> &BTreeMap<String, Vec<String>> {
        &self.intent_examples
    }

    pub fn response_templates(&self) -> &BTreeMap<String, Vec<ResponseTemplate>> {
        &self.response_templates
    }

    pub fn pending_feedback(&self) -> &[FeedbackEntry] {
        &self.feedback
    }

    pub fn analyze_intent(&self, text: &str) -> IntentAnalysis {
        intent::analyze_intent(text, &self.intent_examples)
    }

    pub fn extract_parameters(&self, text: &str, intent: &str, context: Option<&UserContext>) -> QueryParameters {
        params::extract_parameters(text, intent, context)
    }

    pub fn execute(&self, plan: &QueryPlan) -> QueryResults {
        match plan {
            QueryPlan::Graph(query) => {
                tracing::debug!(?query, "executing graph query");
                let result = self.graph.execute(query);
                tracing::debug!(count = result.count, "graph query finished");
                QueryResults::Graph(result)
            }
            QueryPlan::Procedural(info) => QueryResults::Procedural(info.clone()),
            QueryPlan::Definition { term } => QueryResults::Definition(self.lookup_definition(term)),
            QueryPlan::Unsupported => QueryResults::Empty,
        }
    }

    /// 先在Definition节点上精确/包含匹配，找不到时对全图做术语相似度检索
    pub fn lookup_definition(&self, term: &str) -> Option<DefinitionMatch> {
        let wanted = term.to_lowercase();
        let query = GraphQuery::new("Definition", "d")
            .filter(Filter::any(vec![
                Filter::eq("d.term", term),
                Filter::contains("d.term", term),
                Filter::contains("d.aliases", term),
            ]))
            .returning(&["d.term", "d.meaning"]);
        let result = self.graph.execute(&query);
        for binding in &result.bindings {
            let (Some(found), Some(meaning)) = (
                binding.properties.get("d.term").and_then(|v| v.as_str()),
                binding.properties.get("d.meaning").and_then(|v| v.as_str()),
            ) else {
                continue;
            };
            let found_lower = found.to_lowercase();
            if found_lower.contains(&wanted) || wanted.contains(&found_lower) {
                return Some(DefinitionMatch {
                    term: found.to_string(),
                    meaning: meaning.to_string(),
                    score: if found_lower == wanted { 1.0 } else { 0.8 },
                });
            }
        }

        let mut best: Option<DefinitionMatch> = None;
        for node in self.graph.nodes() {
            let label = node
                .properties
                .get("term")
                .or_else(|| node.properties.get("name"))
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            if label.trim().is_empty() {
                continue;
            }
            let score = term_similarity(&wanted, &label.to_lowercase());
            if score <= DEFINITION_MATCH_CUTOFF || best.as_ref().is_some_and(|b| b.score >= score) {
                continue;
            }
            let meaning = node
                .properties
                .get("meaning")
                .or_else(|| node.properties.get("description"))
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            best = Some(DefinitionMatch {
                term: label.to_string(),
                meaning: meaning.to_string(),
                score,
            });
        }
        best
    }

    pub fn generate_response(&self, intent: &str, results: &QueryResults, params: &QueryParameters) -> GeneratedResponse {
        response::generate_response(intent, results, params, &self.response_templates)
    }

    /// 直接用给定槽位渲染回答，跳过图查询
    pub fn render_slots(&self, intent: &str, slots: Slots) -> GeneratedResponse {
        response::render_slots(intent, slots, &self.response_templates)
    }

    /// 端到端处理一条查询
    pub fn process_query(&mut self, text: &str, context: Option<&UserContext>) -> QueryResponse {
        let started = Instant::now();
        let analysis = self.analyze_intent(text);
        let params = self.extract_parameters(text, &analysis.intent, context);
        let plan = build_graph_query(&analysis.intent, &params);
        let results = self.execute(&plan);
        let generated = self.generate_response(&analysis.intent, &results, &params);
        let follow_ups = response::follow_up_questions(&analysis.intent, &params, &results);
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let query_id = Uuid::new_v4().to_string();
        self.record(&analysis.intent, elapsed_ms, generated.success, plan.is_complex());
        self.history.push_back(HistoryEntry {
            query_id: query_id.clone(),
            query: text.to_string(),
            intent: analysis.intent.clone(),
            confidence: analysis.confidence,
            parameters: params.clone(),
            answer: generated.answer.clone(),
            success: generated.success,
            timestamp: Utc::now().to_rfc3339(),
        });
        while self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }

        tracing::debug!(
            intent = %analysis.intent,
            confidence = analysis.confidence,
            success = generated.success,
            elapsed_ms,
            "query processed"
        );

        QueryResponse {
            query_id,
            query: text.to_string(),
            intent: analysis.intent,
            confidence: analysis.confidence,
            method: analysis.method,
            parameters: params,
            answer: generated.answer,
            success: generated.success,
            follow_up_questions: follow_ups,
            elapsed_ms,
        }
    }

    fn record(&mut self, intent: &str, elapsed_ms: f64, success: bool, complex: bool) {
        let metrics = &mut self.metrics;
        metrics.total_queries += 1;
        if success {
            metrics.successful_queries += 1;
        }
        if complex {
            metrics.complex_query_count += 1;
        }
        let total = metrics.total_queries as f64;
        metrics.avg_response_time_ms += (elapsed_ms - metrics.avg_response_time_ms) / total;

        let seen = metrics.intent_distribution.entry(intent.to_string()).or_insert(0);
        *seen += 1;
        let count = *seen as f64;
        let avg = metrics.intent_response_ms.entry(intent.to_string()).or_insert(0.0);
        *avg += (elapsed_ms - *avg) / count;
    }

    pub fn collect_feedback(&mut self, query_id: &str, feedback: QueryFeedback) {
        self.feedback.push(FeedbackEntry {
            query_id: query_id.to_string(),
            feedback,
            timestamp: Utc::now().to_rfc3339(),
        });
    }

    /// 把纠正过意图的查询加入对应意图的示例
    pub fn update_from_feedback(&mut self) -> FeedbackUpdate {
        let mut update = FeedbackUpdate::default();
        for entry in std::mem::take(&mut self.feedback) {
            let Some(intent) = entry.feedback.correct_intent.as_deref() else {
                continue;
            };
            let query = entry.feedback.query.clone().or_else(|| {
                self.history
                    .iter()
                    .find(|h| h.query_id == entry.query_id)
                    .map(|h| h.query.clone())
            });
            let Some(query) = query else {
                continue;
            };
            if !self.intent_examples.contains_key(intent) {
                tracing::debug!(intent, "feedback names an intent without examples");
                continue;
            }
            if self.add_intent_example(intent, &query) {
                update.intents_improved += 1;
                update
                    .examples_added
                    .push(format!("Added example for {}: '{}'", intent, query));
            }
        }
        update
    }

    /// 新增意图示例，重复示例返回false
    pub fn add_intent_example(&mut self, intent: &str, example: &str) -> bool {
        let examples = self.intent_examples.entry(intent.to_string()).or_default();
        if examples.iter().any(|e| e.eq_ignore_ascii_case(example)) {
            return false;
        }
        examples.push(example.to_string());
        true
    }

    pub fn add_response_template(&mut self, intent: &str, template: ResponseTemplate) {
        self.response_templates
            .entry(intent.to_string())
            .or_default()
            .push(template);
    }

    /// 按共享内容词对unknown查询聚类，发现候选新意图
    pub fn discover_new_intents(&mut self, min_cluster_size: usize) -> Vec<DiscoveredIntent> {
        let min_cluster_size = min_cluster_size.max(1);
        let unknown: Vec<(String, BTreeSet<String>)> = self
            .history
            .iter()
            .filter(|h| h.intent == UNKNOWN)
            .map(|h| (h.query.clone(), content_words(&h.query).into_iter().collect()))
            .collect();
        if unknown.len() < min_cluster_size {
            return Vec::new();
        }

        let mut document_frequency: BTreeMap<&str, usize> = BTreeMap::new();
        for (_, words) in &unknown {
            for word in words {
                *document_frequency.entry(word.as_str()).or_insert(0) += 1;
            }
        }
        let mut seeds: Vec<(&str, usize)> = document_frequency
            .into_iter()
            .filter(|(_, df)| *df >= min_cluster_size)
            .collect();
        seeds.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

        let mut assigned = vec![false; unknown.len()];
        let mut clusters: Vec<Vec<usize>> = Vec::new();
        for (word, _) in seeds {
            let members: Vec<usize> = unknown
                .iter()
                .enumerate()
                .filter(|(i, (_, words))| !assigned[*i] && words.contains(word))
                .map(|(i, _)| i)
                .collect();
            if members.len() < min_cluster_size {
                continue;
            }
            for &i in &members {
                assigned[i] = true;
            }
            clusters.push(members);
        }

        let mut discovered = Vec::new();
        for members in clusters {
            let texts: Vec<String> = members.iter().map(|&i| unknown[i].0.clone()).collect();
            let mut sorted = texts.clone();
            sorted.sort();
            if !self.discovered_clusters.insert(sorted.join("|")) {
                continue;
            }

            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            for text in &texts {
                for word in content_words(text) {
                    *counts.entry(word).or_insert(0) += 1;
                }
            }
            let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            let common_words: Vec<String> = ranked.into_iter().take(10).map(|(w, _)| w).collect();

            discovered.push(DiscoveredIntent {
                intent_name: format!("discovered_intent_{}", self.discovered_clusters.len()),
                description: format!(
                    "Queries related to: {}",
                    common_words.iter().take(5).cloned().collect::<Vec<_>>().join(", ")
                ),
                examples: texts.iter().take(5).cloned().collect(),
                common_words,
                cluster_size: members.len(),
            });
        }
        discovered
    }

    /// 高置信度的历史查询加入示例、报告慢意图、尝试发现新意图
    pub fn auto_optimize_performance(&mut self) -> OptimizationReport {
        let mut report = OptimizationReport::default();

        let confident: Vec<(String, String)> = self
            .history
            .iter()
            .filter(|h| h.success && h.confidence >= HIGH_CONFIDENCE && h.intent != UNKNOWN)
            .map(|h| (h.intent.clone(), h.query.clone()))
            .collect();
        for (intent, query) in confident {
            if self.intent_examples.contains_key(&intent) && self.add_intent_example(&intent, &query) {
                report.examples_added += 1;
                report
                    .changes_made
                    .push(format!("Added example for '{}': '{}'", intent, query));
            }
        }

        for (intent, avg) in &self.metrics.intent_response_ms {
            if *avg > SLOW_RESPONSE_MS {
                report.slow_intents.push(intent.clone());
                report.changes_made.push(format!(
                    "Intent '{}' averages {:.0}ms per query",
                    intent, avg
                ));
            }
        }

        report.discovered_intents = self.discover_new_intents(3);
        for discovered in &report.discovered_intents {
            report
                .changes_made
                .push(format!("Discovered new intent pattern: {}", discovered.description));
        }
        report
    }
}

#[cfg(test)]
mod tests;
