//! 系统编排：文档处理 -> schema演化 -> 查询 -> QA与自动决策

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::automation::{AutomatedResponse, AutomationManager, AutomationMetrics};
use crate::cache::CacheManager;
use crate::config::Config;
use crate::documents::InsuranceDocumentProcessor;
use crate::graph::KnowledgeGraph;
use crate::llm::LanguageModel;
use crate::prompts::{PromptRegistry, builtin};
use crate::qa::{QaSystem, TestSummary, synthetic_graph};
use crate::query::{QueryMetrics, QueryProcessor, QueryResponse, UserContext};
use crate::schema::{GraphSchema, QualityScores};

mod timing;

pub use timing::PhaseTimer;

/// 图谱中没有保单时使用的演示数据种子
const SYNTHETIC_SEED: u64 = 42;
const MIN_DOCUMENTS: usize = 10;
const MIN_SCHEMA_COVERAGE: f64 = 0.7;
const MIN_QA_PASS_RATE: f64 = 0.8;
const MIN_AUTONOMY_RATE: f64 = 0.7;
const EXIT_WORDS: [&str; 3] = ["exit", "quit", "bye"];
const APOLOGY: &str = "I'm sorry, there was an error processing your query. Please try again.";

/// 演示用户：U5001，持有P1001/P1002，理赔CL4001
pub fn demo_user_context() -> UserContext {
    UserContext {
        user_id: Some("U5001".to_string()),
        known_policies: vec!["P1001".to_string(), "P1002".to_string()],
        known_claims: vec!["CL4001".to_string()],
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub documents_processed: usize,
    pub schema_updates: usize,
    pub queries_processed: usize,
    pub tests_executed: usize,
    pub autonomous_decisions: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitializationResult {
    pub success: bool,
    pub documents_processed: usize,
    pub schema_updated: bool,
    pub knowledge_graph_created: bool,
    pub elapsed_secs: f64,
    #[serde(default)]
    pub phase_secs: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 一次查询的结果：自动决策、直接处理，或系统错误
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SystemAnswer {
    Automated(AutomatedResponse),
    Direct(QueryResponse),
    Failed {
        answer: String,
        success: bool,
        error: String,
    },
}

impl SystemAnswer {
    pub fn answer(&self) -> &str {
        match self {
            SystemAnswer::Automated(response) => response.user_answer(),
            SystemAnswer::Direct(response) => &response.answer,
            SystemAnswer::Failed { answer, .. } => answer,
        }
    }

    pub fn success(&self) -> bool {
        match self {
            SystemAnswer::Automated(response) => response.response.success,
            SystemAnswer::Direct(response) => response.success,
            SystemAnswer::Failed { .. } => false,
        }
    }

    pub fn query_response(&self) -> Option<&QueryResponse> {
        match self {
            SystemAnswer::Automated(response) => Some(&response.response),
            SystemAnswer::Direct(response) => Some(response),
            SystemAnswer::Failed { .. } => None,
        }
    }

    pub fn intent(&self) -> &str {
        self.query_response()
            .map(|r| r.intent.as_str())
            .unwrap_or(crate::query::UNKNOWN)
    }

    pub fn confidence(&self) -> f64 {
        self.query_response().map(|r| r.confidence).unwrap_or(0.0)
    }

    pub fn follow_up_questions(&self) -> &[String] {
        self.query_response()
            .map(|r| r.follow_up_questions.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementResults {
    pub initial_tests: TestSummary,
    pub post_fix_tests: TestSummary,
    pub improvement: f64,
    pub fixes_applied: usize,
    pub automation_improvement: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecommendation {
    pub component: String,
    pub recommendation: String,
}

impl ComponentRecommendation {
    fn new(component: &str, recommendation: &str) -> Self {
        Self {
            component: component.to_string(),
            recommendation: recommendation.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaComponent {
    pub updates: usize,
    pub entity_types: usize,
    pub relationship_types: usize,
    pub quality_scores: QualityScores,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryComponent {
    pub queries_processed: usize,
    pub avg_response_time_ms: f64,
    pub intent_distribution: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaComponent {
    pub tests_executed: usize,
    pub last_pass_rate: f64,
    pub error_patterns: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationComponent {
    pub autonomous_decisions: usize,
    pub autonomy_rate: f64,
    pub escalations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentReports {
    pub documents_processed: usize,
    pub schema: SchemaComponent,
    pub query: QueryComponent,
    pub qa: QaComponent,
    pub automation: AutomationComponent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemReport {
    pub timestamp: String,
    pub system_metrics: SystemMetrics,
    pub components: ComponentReports,
    pub recommendations: Vec<ComponentRecommendation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaState {
    pub quality_scores: QualityScores,
    pub entity_count: usize,
    pub relationship_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentStates {
    pub schema: SchemaState,
    pub query_metrics: QueryMetrics,
    pub qa_error_patterns: BTreeMap<String, usize>,
    pub automation_metrics: AutomationMetrics,
    pub confidence_thresholds: BTreeMap<String, f64>,
}

/// 持久化的系统状态。不包含配置，避免把API key写入磁盘
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemState {
    pub timestamp: String,
    pub system_metrics: SystemMetrics,
    pub is_initialized: bool,
    pub component_states: ComponentStates,
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content).context(format!("Failed to write {:?}", path))
}

pub struct InsuranceGraphRag {
    config: Config,
    documents: InsuranceDocumentProcessor,
    schema: GraphSchema,
    automation: AutomationManager,
    qa: QaSystem,
    metrics: SystemMetrics,
    is_initialized: bool,
}

impl InsuranceGraphRag {
    pub fn new(config: Config, model: Arc<dyn LanguageModel>) -> Result<Self> {
        let cache = Arc::new(CacheManager::new(config.cache.clone()));
        let registry = PromptRegistry::open(&config.prompts.registry_dir)?;
        let mut documents =
            InsuranceDocumentProcessor::new(config.documents.clone(), model, cache);
        if let Some(template) = registry.get_template(builtin::ENTITY_EXTRACTION) {
            documents = documents.with_extraction_template(template.clone());
        }

        let schema = GraphSchema::new(config.schema.base_schema_path.as_deref());
        let processor = Self::build_query_processor(&config);
        let automation = AutomationManager::new(processor, config.automation.default_threshold);

        tracing::info!(
            data_dir = %config.data_dir.display(),
            output_dir = %config.output_dir.display(),
            "insurance graph rag system created"
        );

        Ok(Self {
            config,
            documents,
            schema,
            automation,
            qa: QaSystem::new(),
            metrics: SystemMetrics::default(),
            is_initialized: false,
        })
    }

    /// 替换QA系统，例如使用固定种子
    pub fn with_qa(mut self, qa: QaSystem) -> Self {
        self.qa = qa;
        self
    }

    /// 已导出的图谱与schema存在时直接加载，否则使用演示数据
    fn build_query_processor(config: &Config) -> QueryProcessor {
        let graph = Self::load_query_graph(&config.knowledge_graph_path());
        let mut processor = QueryProcessor::new(graph);
        let schema_path = config.schema_path();
        if schema_path.exists()
            && let Err(e) = processor.load_schema(&schema_path)
        {
            tracing::warn!(error = %e, "failed to load exported schema");
        }
        processor
    }

    fn load_query_graph(path: &Path) -> KnowledgeGraph {
        let loaded = if path.exists() {
            match KnowledgeGraph::load(path) {
                Ok(graph) => Some(graph),
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.display(), "failed to load knowledge graph");
                    None
                }
            }
        } else {
            None
        };

        match loaded {
            Some(graph) if graph.nodes_with_label("Policy").next().is_some() => graph,
            _ => {
                tracing::info!("no policy nodes available, using synthetic demo graph");
                synthetic_graph(SYNTHETIC_SEED)
            }
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &SystemMetrics {
        &self.metrics
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    pub fn schema(&self) -> &GraphSchema {
        &self.schema
    }

    pub fn automation(&self) -> &AutomationManager {
        &self.automation
    }

    pub fn qa(&self) -> &QaSystem {
        &self.qa
    }

    /// 抓取文档、构建知识图谱、演化schema并执行首轮测试。错误记录在结果中
    pub async fn initialize(&mut self, sources: &[PathBuf]) -> InitializationResult {
        println!("🔄 正在初始化系统...");
        let mut timer = PhaseTimer::new();
        let mut result = InitializationResult::default();

        match self.run_initialization(sources, &mut timer, &mut result).await {
            Ok(()) => {
                self.is_initialized = true;
                result.success = true;
            }
            Err(e) => {
                tracing::error!(error = %e, "system initialization failed");
                eprintln!("❌ 系统初始化失败: {:#}", e);
                result.error = Some(format!("{:#}", e));
            }
        }

        result.elapsed_secs = timer.total().as_secs_f64();
        result.phase_secs = timer.phase_secs();
        if result.success {
            println!("✅ 系统初始化完成，耗时 {:.2}秒", result.elapsed_secs);
        }
        result
    }

    async fn run_initialization(
        &mut self,
        sources: &[PathBuf],
        timer: &mut PhaseTimer,
        result: &mut InitializationResult,
    ) -> Result<()> {
        self.config.ensure_directories()?;
        let sources = if sources.is_empty() {
            vec![self.config.data_dir.clone()]
        } else {
            sources.to_vec()
        };
        let kg_path = self.config.knowledge_graph_path();

        timer.start_phase(PhaseTimer::DOCUMENTS);
        let paths = self.documents.crawl(&sources);
        if paths.is_empty() {
            tracing::warn!(?sources, "no insurance documents found");
            println!("⚠️ 未找到保险文档");
        } else {
            let batch = self.documents.process_batch(&paths).await;
            result.documents_processed = batch.documents_processed;
            self.metrics.documents_processed = batch.documents_processed;
            self.documents.export(&kg_path)?;
            result.knowledge_graph_created = true;
        }
        timer.end_phase(PhaseTimer::DOCUMENTS);

        timer.start_phase(PhaseTimer::SCHEMA);
        result.schema_updated = self.evolve_schema(&kg_path)?;
        timer.end_phase(PhaseTimer::SCHEMA);

        timer.start_phase(PhaseTimer::QUERY_PROCESSOR);
        let processor = self.automation.processor_mut();
        processor.set_graph(Self::load_query_graph(&kg_path));
        processor.set_schema(self.schema.clone());
        timer.end_phase(PhaseTimer::QUERY_PROCESSOR);

        timer.start_phase(PhaseTimer::QA);
        let test_results = self.qa.run_test_suite(
            &mut self.automation,
            None,
            Some(self.config.qa.test_count),
        );
        write_json(
            &self.config.output_dir.join("initial_test_results.json"),
            &test_results,
        )?;
        let summary = test_results.summary;
        self.metrics.tests_executed += summary.total_tests;
        println!(
            "📊 首轮测试: {} 通过, {} 失败, {} 错误, 共 {}",
            summary.passed, summary.failed, summary.errors, summary.total_tests
        );
        timer.end_phase(PhaseTimer::QA);

        Ok(())
    }

    /// 从导出的图谱演化schema；图谱文件不存在时跳过
    fn evolve_schema(&mut self, kg_path: &Path) -> Result<bool> {
        if !kg_path.exists() {
            tracing::warn!(path = %kg_path.display(), "knowledge graph not found, schema unchanged");
            return Ok(false);
        }

        let document = KnowledgeGraph::load(kg_path)?.to_document();
        let changes = self
            .schema
            .evolve(&document, self.config.schema.evolution_threshold);
        self.schema.export(&self.config.schema_path())?;
        self.schema
            .save_dot(&self.config.output_dir.join("schema_visualization.dot"))?;
        self.metrics.schema_updates += 1;

        tracing::info!(changes = changes.total(), "schema evolved");
        Ok(true)
    }

    /// 处理单条问题；未初始化时先初始化
    pub async fn process_query(
        &mut self,
        query: &str,
        context: Option<&UserContext>,
        autonomous: bool,
    ) -> SystemAnswer {
        if !self.is_initialized {
            tracing::warn!("system not initialized, initializing with default sources");
            let init = self.initialize(&[]).await;
            if let Some(error) = init.error {
                return SystemAnswer::Failed {
                    answer: APOLOGY.to_string(),
                    success: false,
                    error,
                };
            }
        }

        tracing::info!(query, autonomous, "processing query");
        let answer = if autonomous {
            let response = self.automation.process(query, context);
            self.metrics.autonomous_decisions += 1;
            SystemAnswer::Automated(response)
        } else {
            SystemAnswer::Direct(self.automation.processor_mut().process_query(query, context))
        };
        self.metrics.queries_processed += 1;
        answer
    }

    /// 测试 -> 诊断 -> 修复 -> 自动化改进 -> 复测，并写出报告
    pub async fn run_improvement_cycle(&mut self) -> Result<ImprovementResults> {
        if !self.is_initialized {
            let init = self.initialize(&[]).await;
            if let Some(error) = init.error {
                anyhow::bail!("initialization failed: {}", error);
            }
        }

        println!("🔄 Step 1: 运行QA测试...");
        let initial = self.qa.run_test_suite(&mut self.automation, None, None);

        println!("🔄 Step 2: 诊断失败用例...");
        let diagnostics = self.qa.diagnose_failures(&initial);

        println!("🔄 Step 3: 应用修复...");
        let fixes = self.qa.fix_common_issues(&mut self.automation, &diagnostics);

        println!("🔄 Step 4: 改进自动决策...");
        let automation_results = self.automation.run_continuous_improvement_cycle(1);

        println!("🔄 Step 5: 复测...");
        let post_fix = self.qa.run_test_suite(&mut self.automation, None, None);

        let improvement = post_fix.summary.pass_rate() - initial.summary.pass_rate();

        let qa_report = self.qa.performance_report(&mut self.automation);
        let automation_report = self.automation.self_improvement_report();
        let reports_dir = self.config.reports_dir();
        write_json(&reports_dir.join("qa_report.json"), &qa_report)?;
        write_json(&reports_dir.join("automation_report.json"), &automation_report)?;
        write_json(&reports_dir.join("post_fix_test_results.json"), &post_fix)?;

        self.metrics.tests_executed += initial.summary.total_tests + post_fix.summary.total_tests;

        println!(
            "✅ 改进循环完成，通过率变化 {:+.1}%",
            improvement * 100.0
        );

        Ok(ImprovementResults {
            initial_tests: initial.summary,
            post_fix_tests: post_fix.summary,
            improvement,
            fixes_applied: fixes.fixed_issues.len(),
            automation_improvement: automation_results.overall_improvement.improvement,
        })
    }

    fn qa_error_patterns(&self) -> BTreeMap<String, usize> {
        self.qa
            .error_patterns()
            .iter()
            .map(|(category, count)| (category.key().to_string(), *count))
            .collect()
    }

    pub fn system_report(&self) -> SystemReport {
        let quality = self.schema.quality();
        let query_metrics = self.automation.processor().metrics();
        let automation_metrics = self.automation.metrics();
        let last_pass_rate = self
            .qa
            .history()
            .last()
            .map(|run| run.summary.pass_rate())
            .unwrap_or(0.0);

        let mut recommendations = Vec::new();
        if self.metrics.documents_processed < MIN_DOCUMENTS {
            recommendations.push(ComponentRecommendation::new(
                "Document Processing",
                "Process more documents to improve knowledge graph coverage",
            ));
        }
        if quality.coverage < MIN_SCHEMA_COVERAGE {
            recommendations.push(ComponentRecommendation::new(
                "Schema Manager",
                "Expand schema coverage with more entity and relationship types",
            ));
        }
        if last_pass_rate < MIN_QA_PASS_RATE {
            recommendations.push(ComponentRecommendation::new(
                "QA System",
                "Improve system performance to increase test pass rate",
            ));
        }
        if automation_metrics.autonomous_success_rate < MIN_AUTONOMY_RATE {
            recommendations.push(ComponentRecommendation::new(
                "Automation Manager",
                "Enhance exception handling to reduce human intervention",
            ));
        }

        SystemReport {
            timestamp: Utc::now().to_rfc3339(),
            system_metrics: self.metrics,
            components: ComponentReports {
                documents_processed: self.metrics.documents_processed,
                schema: SchemaComponent {
                    updates: self.metrics.schema_updates,
                    entity_types: self.schema.entity_types().len(),
                    relationship_types: self.schema.relationship_types().len(),
                    quality_scores: quality,
                },
                query: QueryComponent {
                    queries_processed: self.metrics.queries_processed,
                    avg_response_time_ms: query_metrics.avg_response_time_ms,
                    intent_distribution: query_metrics.intent_distribution.clone(),
                },
                qa: QaComponent {
                    tests_executed: self.metrics.tests_executed,
                    last_pass_rate,
                    error_patterns: self.qa_error_patterns(),
                },
                automation: AutomationComponent {
                    autonomous_decisions: self.metrics.autonomous_decisions,
                    autonomy_rate: automation_metrics.autonomous_success_rate,
                    escalations: automation_metrics.escalations,
                },
            },
            recommendations,
        }
    }

    /// 保存系统状态，未指定路径时写到 output_dir/system_state_<时间戳>.json
    pub fn save_state(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => self.config.output_dir.join(format!(
                "system_state_{}.json",
                Local::now().format("%Y%m%d_%H%M%S")
            )),
        };

        let state = SystemState {
            timestamp: Utc::now().to_rfc3339(),
            system_metrics: self.metrics,
            is_initialized: self.is_initialized,
            component_states: ComponentStates {
                schema: SchemaState {
                    quality_scores: self.schema.quality(),
                    entity_count: self.schema.entity_types().len(),
                    relationship_count: self.schema.relationship_types().len(),
                },
                query_metrics: self.automation.processor().metrics().clone(),
                qa_error_patterns: self.qa_error_patterns(),
                automation_metrics: self.automation.metrics().clone(),
                confidence_thresholds: self.automation.thresholds().clone(),
            },
        };
        write_json(&path, &state)?;
        tracing::info!(path = %path.display(), "system state saved");
        Ok(path)
    }

    /// 恢复系统指标、初始化标记、置信度阈值与查询统计
    pub fn load_state(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)
            .context(format!("State file not found or unreadable: {:?}", path))?;
        let state: SystemState = serde_json::from_str(&content)
            .context(format!("Failed to parse state file: {:?}", path))?;

        self.metrics = state.system_metrics;
        self.is_initialized = state.is_initialized;
        self.automation
            .set_thresholds(state.component_states.confidence_thresholds);
        self.automation
            .processor_mut()
            .restore_metrics(state.component_states.query_metrics);

        tracing::info!(path = %path.display(), "system state loaded");
        Ok(())
    }

    /// 交互式问答，读到 exit/quit/bye 或输入结束时退出
    pub async fn run_interactive_demo<R: BufRead, W: Write>(
        &mut self,
        input: R,
        output: &mut W,
    ) -> Result<()> {
        writeln!(output, "{}", "=".repeat(80))?;
        writeln!(output, "   Insurance Graph RAG System - Interactive Demo")?;
        writeln!(output, "{}", "=".repeat(80))?;

        if !self.is_initialized {
            let init = self.initialize(&[]).await;
            if !init.success {
                writeln!(
                    output,
                    "System initialization failed: {}",
                    init.error.as_deref().unwrap_or("Unknown error")
                )?;
                return Ok(());
            }
            writeln!(output, "System initialized successfully!")?;
            writeln!(output, "- Documents processed: {}", init.documents_processed)?;
            writeln!(output, "- Schema updated: {}", init.schema_updated)?;
            writeln!(output, "- Knowledge graph created: {}", init.knowledge_graph_created)?;
            writeln!(output, "- Elapsed time: {:.2} seconds", init.elapsed_secs)?;
        }

        let context = demo_user_context();
        writeln!(output, "\nDemo User Context:")?;
        writeln!(output, "- User ID: {}", context.user_id.as_deref().unwrap_or_default())?;
        writeln!(output, "- Policies: {}", context.known_policies.join(", "))?;
        writeln!(output, "- Claims: {}", context.known_claims.join(", "))?;
        writeln!(output, "\nType your insurance-related questions (or 'exit' to quit):")?;

        for line in input.lines() {
            let query = line?;
            let query = query.trim();
            if EXIT_WORDS.contains(&query.to_lowercase().as_str()) {
                break;
            }
            if query.is_empty() {
                continue;
            }

            let started = Instant::now();
            let answer = self.process_query(query, Some(&context), true).await;
            let elapsed = started.elapsed().as_secs_f64();

            writeln!(output, "\nAnswer: {}", answer.answer())?;
            writeln!(
                output,
                "Intent: {} (confidence: {:.2})",
                answer.intent(),
                answer.confidence()
            )?;
            writeln!(output, "Response time: {:.2}s", elapsed)?;
            if let SystemAnswer::Automated(response) = &answer {
                if response.autonomous {
                    writeln!(output, "Decision: Autonomous")?;
                } else {
                    writeln!(
                        output,
                        "Decision: Escalated - {}",
                        response.review_reason.as_deref().unwrap_or("Unknown reason")
                    )?;
                }
            }
            let follow_ups = answer.follow_up_questions();
            if !follow_ups.is_empty() {
                writeln!(output, "\nYou might also want to ask:")?;
                for (i, question) in follow_ups.iter().enumerate() {
                    writeln!(output, "  {}. {}", i + 1, question)?;
                }
            }
        }

        writeln!(output, "\nThank you for using the Insurance Graph RAG System!")?;
        Ok(())
    }
}
