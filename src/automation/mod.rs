//! 自动化管理：尽量减少人工介入，必要时升级给人工复核

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};

use crate::query::intent::{
    CLAIM_STATUS, COVERAGE_INQUIRY, FILING_CLAIM, POLICY_DETAILS, PREMIUM_INFORMATION,
};
use crate::query::{QueryProcessor, QueryResponse, UserContext};
use crate::utils::text::{STOPWORDS, tokenize};

pub mod handlers;

pub use handlers::{ExceptionHandler, ExceptionKind, check_compliance, contains_sensitive_terms};

pub const DEFAULT_THRESHOLD_KEY: &str = "default";

const MIN_DECISIONS_FOR_ADJUSTMENT: usize = 5;
const MIN_ESCALATIONS_FOR_LEARNING: usize = 5;
const MIN_PATTERN_SIZE: usize = 3;
const THRESHOLD_FLOOR: f64 = 0.6;
const THRESHOLD_CAP: f64 = 0.95;

const ESCALATION_NOTICE: &str = "I've passed your question to one of our insurance specialists, who will review it and get back to you shortly.";

/// 学习升级模式时用来猜测意图的关键词
const INTENT_KEYWORDS: [(&str, &[&str]); 5] = [
    (POLICY_DETAILS, &["policy", "details", "information", "document"]),
    (COVERAGE_INQUIRY, &["cover", "coverage", "protect", "protection"]),
    (CLAIM_STATUS, &["claim", "status", "progress", "filed"]),
    (PREMIUM_INFORMATION, &["premium", "payment", "cost", "price", "pay"]),
    (FILING_CLAIM, &["file", "report", "submit", "start", "initiate"]),
];

pub fn default_thresholds(default_threshold: f64) -> BTreeMap<String, f64> {
    BTreeMap::from([
        (POLICY_DETAILS.to_string(), 0.8),
        (COVERAGE_INQUIRY.to_string(), 0.75),
        (CLAIM_STATUS.to_string(), 0.9),
        (PREMIUM_INFORMATION.to_string(), 0.85),
        (FILING_CLAIM.to_string(), 0.7),
        (DEFAULT_THRESHOLD_KEY.to_string(), default_threshold),
    ])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomatedResponse {
    #[serde(flatten)]
    pub response: QueryResponse,
    pub autonomous: bool,
    pub exception_handled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_type: Option<String>,
    pub requires_human_review: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_reason: Option<String>,
    /// 升级时给用户的提示，草拟的回答保留给复核人员
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_notice: Option<String>,
}

impl AutomatedResponse {
    /// 展示给用户的文本
    pub fn user_answer(&self) -> &str {
        self.escalation_notice
            .as_deref()
            .unwrap_or(&self.response.answer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionFeedback {
    pub was_correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub query_id: String,
    pub timestamp: String,
    pub query: String,
    pub intent: String,
    pub confidence: f64,
    pub answer: String,
    pub exception_handled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<DecisionFeedback>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub query_id: String,
    pub timestamp: String,
    pub query: String,
    pub intent: String,
    pub confidence: f64,
    pub answer: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_context: Option<UserContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedExample {
    pub query: String,
    pub answer: String,
    pub positive: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutomationMetrics {
    pub total_decisions: usize,
    pub autonomous_decisions: usize,
    pub escalations: usize,
    pub autonomous_success_rate: f64,
    pub avg_confidence: f64,
    pub exception_counts: BTreeMap<String, usize>,
}

impl AutomationMetrics {
    pub fn escalation_rate(&self) -> f64 {
        self.escalations as f64 / self.total_decisions.max(1) as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionEvent {
    pub timestamp: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub details: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdAdjustmentDetail {
    pub previous: f64,
    pub new: f64,
    pub change: f64,
    pub accuracy: f64,
    pub decisions: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdAdjustment {
    pub previous_thresholds: BTreeMap<String, f64>,
    pub new_thresholds: BTreeMap<String, f64>,
    pub adjustments: BTreeMap<String, ThresholdAdjustmentDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandlerExtension {
    pub new_handlers: Vec<String>,
    pub updated_handlers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationPattern {
    pub reason: String,
    pub common_terms: Vec<String>,
    pub frequency: usize,
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Improvement {
    AdjustThreshold {
        intent: String,
        current_threshold: f64,
        new_threshold: f64,
        reason: String,
    },
    AddExceptionHandler {
        handler: ExceptionHandler,
        reason: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningResults {
    pub patterns_identified: Vec<EscalationPattern>,
    pub improvements: Vec<Improvement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: String,
    pub area: String,
    pub recommendation: String,
}

impl Recommendation {
    pub fn new(priority: &str, area: &str, recommendation: impl Into<String>) -> Self {
        Self {
            priority: priority.to_string(),
            area: area.to_string(),
            recommendation: recommendation.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AutonomySnapshot {
    pub autonomy_rate: f64,
    pub avg_confidence: f64,
    pub escalation_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvolutionSummary {
    pub threshold_adjustments: Vec<EvolutionEvent>,
    pub exception_handler_changes: Vec<EvolutionEvent>,
    pub other_improvements: Vec<EvolutionEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerSummary {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfImprovementReport {
    pub timestamp: String,
    pub autonomy_metrics: AutonomySnapshot,
    pub total_decisions: usize,
    pub evolution_history: EvolutionSummary,
    pub confidence_thresholds: BTreeMap<String, f64>,
    pub exception_handlers: Vec<HandlerSummary>,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleResult {
    pub cycle: usize,
    pub threshold_adjustments: ThresholdAdjustment,
    pub handler_extensions: HandlerExtension,
    pub learning_results: LearningResults,
    pub metrics: AutonomySnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdChange {
    pub initial: f64,
    #[serde(rename = "final")]
    pub final_value: f64,
    pub change: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallImprovement {
    pub initial: AutonomySnapshot,
    #[serde(rename = "final")]
    pub final_snapshot: AutonomySnapshot,
    pub improvement: f64,
    pub threshold_changes: BTreeMap<String, ThresholdChange>,
    pub handlers_added: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousImprovementResults {
    pub cycles: Vec<CycleResult>,
    pub overall_improvement: OverallImprovement,
    pub final_report: SelfImprovementReport,
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

pub struct AutomationManager {
    processor: QueryProcessor,
    thresholds: BTreeMap<String, f64>,
    exception_handlers: Vec<ExceptionHandler>,
    decision_history: Vec<DecisionRecord>,
    escalation_history: Vec<EscalationRecord>,
    learned_patterns: BTreeMap<String, Vec<LearnedExample>>,
    evolution_history: Vec<EvolutionEvent>,
    metrics: AutomationMetrics,
}

impl AutomationManager {
    pub fn new(processor: QueryProcessor, default_threshold: f64) -> Self {
        Self {
            processor,
            thresholds: default_thresholds(default_threshold),
            exception_handlers: ExceptionHandler::defaults(),
            decision_history: Vec::new(),
            escalation_history: Vec::new(),
            learned_patterns: BTreeMap::new(),
            evolution_history: Vec::new(),
            metrics: AutomationMetrics::default(),
        }
    }

    pub fn processor(&self) -> &QueryProcessor {
        &self.processor
    }

    pub fn processor_mut(&mut self) -> &mut QueryProcessor {
        &mut self.processor
    }

    pub fn thresholds(&self) -> &BTreeMap<String, f64> {
        &self.thresholds
    }

    pub fn set_thresholds(&mut self, thresholds: BTreeMap<String, f64>) {
        self.thresholds.extend(thresholds);
    }

    pub fn threshold_for(&self, intent: &str) -> f64 {
        self.thresholds
            .get(intent)
            .or_else(|| self.thresholds.get(DEFAULT_THRESHOLD_KEY))
            .copied()
            .unwrap_or(0.8)
    }

    pub fn metrics(&self) -> &AutomationMetrics {
        &self.metrics
    }

    pub fn exception_handlers(&self) -> &[ExceptionHandler] {
        &self.exception_handlers
    }

    pub fn decision_history(&self) -> &[DecisionRecord] {
        &self.decision_history
    }

    pub fn escalation_history(&self) -> &[EscalationRecord] {
        &self.escalation_history
    }

    pub fn learned_patterns(&self) -> &BTreeMap<String, Vec<LearnedExample>> {
        &self.learned_patterns
    }

    pub fn evolution_history(&self) -> &[EvolutionEvent] {
        &self.evolution_history
    }

    pub fn snapshot(&self) -> AutonomySnapshot {
        AutonomySnapshot {
            autonomy_rate: self.metrics.autonomous_success_rate,
            avg_confidence: self.metrics.avg_confidence,
            escalation_rate: self.metrics.escalation_rate(),
        }
    }

    /// 判断回答是否需要人工复核，返回原因
    pub fn review_reason(&self, query: &str, response: &QueryResponse) -> Option<String> {
        if !response.success {
            return Some("Processing failed".to_string());
        }
        let threshold = self.threshold_for(&response.intent);
        if response.confidence < threshold {
            return Some(format!(
                "Confidence {:.2} below threshold {:.2}",
                response.confidence, threshold
            ));
        }
        if handlers::SENSITIVE_INTENTS.contains(&response.intent.as_str()) {
            return Some(format!("Sensitive intent: {}", response.intent));
        }
        if contains_sensitive_terms(query) {
            return Some("Contains sensitive terms".to_string());
        }
        let issues = check_compliance(query, &response.answer);
        if !issues.is_empty() {
            return Some(format!("Compliance issue: {}", issues.join("; ")));
        }
        None
    }

    /// 自动处理一条查询：必要时先尝试异常处理器，仍无法处理则升级
    pub fn process(&mut self, query: &str, context: Option<&UserContext>) -> AutomatedResponse {
        let mut response = self.processor.process_query(query, context);
        self.metrics.total_decisions += 1;

        let review_reason = self.review_reason(query, &response);
        let mut exception_type = None;
        let mut exception_handled = false;

        if review_reason.is_some() {
            let Self {
                exception_handlers,
                processor,
                ..
            } = self;
            for handler in exception_handlers.iter() {
                if !handler.matches(query, &response) {
                    continue;
                }
                exception_type = Some(handler.name.clone());
                if let Some(handled) = handler.handle(processor, query, &response, context) {
                    tracing::debug!(handler = %handler.name, "exception handled autonomously");
                    response = handled;
                    exception_handled = true;
                    break;
                }
            }
        }

        let reason = review_reason.filter(|_| !exception_handled);
        match reason {
            Some(reason) => {
                tracing::info!(query, %reason, "escalating query for human review");
                self.metrics.escalations += 1;
                if let Some(kind) = &exception_type {
                    *self.metrics.exception_counts.entry(kind.clone()).or_insert(0) += 1;
                }
                self.escalation_history.push(EscalationRecord {
                    query_id: response.query_id.clone(),
                    timestamp: now(),
                    query: query.to_string(),
                    intent: response.intent.clone(),
                    confidence: response.confidence,
                    answer: response.answer.clone(),
                    reason: reason.clone(),
                    exception_type: exception_type.clone(),
                    user_context: context.cloned(),
                });
                self.refresh_rate();
                AutomatedResponse {
                    response,
                    autonomous: false,
                    exception_handled: false,
                    exception_type,
                    requires_human_review: true,
                    review_reason: Some(reason),
                    escalation_notice: Some(ESCALATION_NOTICE.to_string()),
                }
            }
            None => {
                self.metrics.autonomous_decisions += 1;
                let n = self.metrics.autonomous_decisions as f64;
                self.metrics.avg_confidence += (response.confidence - self.metrics.avg_confidence) / n;
                let exception_type = exception_type.filter(|_| exception_handled);
                self.decision_history.push(DecisionRecord {
                    query_id: response.query_id.clone(),
                    timestamp: now(),
                    query: query.to_string(),
                    intent: response.intent.clone(),
                    confidence: response.confidence,
                    answer: response.answer.clone(),
                    exception_handled,
                    exception_type: exception_type.clone(),
                    feedback: None,
                });
                self.refresh_rate();
                AutomatedResponse {
                    response,
                    autonomous: true,
                    exception_handled,
                    exception_type,
                    requires_human_review: false,
                    review_reason: None,
                    escalation_notice: None,
                }
            }
        }
    }

    fn refresh_rate(&mut self) {
        if self.metrics.total_decisions > 0 {
            self.metrics.autonomous_success_rate =
                self.metrics.autonomous_decisions as f64 / self.metrics.total_decisions as f64;
        }
    }

    /// 记录人工对自动决策的反馈，找不到决策时返回false
    pub fn record_feedback(&mut self, query_id: &str, was_correct: bool, note: Option<&str>) -> bool {
        let Some(decision) = self
            .decision_history
            .iter_mut()
            .find(|d| d.query_id == query_id)
        else {
            tracing::warn!(query_id, "feedback for unknown decision");
            return false;
        };
        decision.feedback = Some(DecisionFeedback {
            was_correct,
            note: note.map(str::to_string),
            timestamp: now(),
        });
        self.learned_patterns
            .entry(decision.intent.clone())
            .or_default()
            .push(LearnedExample {
                query: decision.query.clone(),
                answer: decision.answer.clone(),
                positive: was_correct,
            });
        true
    }

    fn record_event(&mut self, event_type: &str, details: Value) {
        self.evolution_history.push(EvolutionEvent {
            timestamp: now(),
            event_type: event_type.to_string(),
            details,
        });
    }

    /// 按带反馈决策的准确率调整各意图阈值
    pub fn adjust_confidence_thresholds(&mut self) -> ThresholdAdjustment {
        let mut result = ThresholdAdjustment {
            previous_thresholds: self.thresholds.clone(),
            ..Default::default()
        };

        let mut performance: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for decision in &self.decision_history {
            let Some(feedback) = &decision.feedback else {
                continue;
            };
            let entry = performance.entry(decision.intent.as_str()).or_insert((0, 0));
            entry.1 += 1;
            if feedback.was_correct {
                entry.0 += 1;
            }
        }

        let mut updates = Vec::new();
        for (intent, (correct, total)) in performance {
            if total < MIN_DECISIONS_FOR_ADJUSTMENT {
                continue;
            }
            let current = self.threshold_for(intent);
            let accuracy = correct as f64 / total as f64;
            let new = if accuracy > 0.9 {
                (current - 0.05).max(THRESHOLD_FLOOR)
            } else if accuracy < 0.7 {
                (current + 0.1).min(THRESHOLD_CAP)
            } else {
                current
            };
            if (new - current).abs() > f64::EPSILON {
                updates.push((
                    intent.to_string(),
                    ThresholdAdjustmentDetail {
                        previous: current,
                        new,
                        change: new - current,
                        accuracy,
                        decisions: total,
                    },
                ));
            }
        }

        for (intent, detail) in updates {
            self.thresholds.insert(intent.clone(), detail.new);
            result.adjustments.insert(intent, detail);
        }
        result.new_thresholds = self.thresholds.clone();
        let details = serde_json::to_value(&result.adjustments).unwrap_or(Value::Null);
        self.record_event("threshold_adjustment", details);
        result
    }

    /// 增加支付方式问题的处理器
    pub fn extend_exception_handlers(&mut self) -> HandlerExtension {
        let mut extension = HandlerExtension::default();
        let handler = ExceptionHandler::payment_question();
        if self.exception_handlers.iter().any(|h| h.name == handler.name) {
            return extension;
        }
        self.record_event(
            "exception_handler_addition",
            json!({"handler": handler.name, "description": handler.description}),
        );
        extension.new_handlers.push(handler.name.clone());
        self.exception_handlers.push(handler);
        extension
    }

    /// 按升级原因分组，找出共同词并提出改进
    pub fn learn_from_escalations(&mut self) -> LearningResults {
        let mut results = LearningResults::default();
        if self.escalation_history.len() < MIN_ESCALATIONS_FOR_LEARNING {
            return results;
        }

        let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for escalation in &self.escalation_history {
            groups
                .entry(escalation.reason.as_str())
                .or_default()
                .push(escalation.query.as_str());
        }

        for (reason, queries) in groups {
            if queries.len() < MIN_PATTERN_SIZE {
                continue;
            }
            let common_terms = common_terms(&queries);
            if common_terms.is_empty() {
                continue;
            }
            let pattern = EscalationPattern {
                reason: reason.to_string(),
                common_terms,
                frequency: queries.len(),
                examples: queries.iter().take(3).map(|q| q.to_string()).collect(),
            };
            if let Some(improvement) = self.propose_improvement(&pattern) {
                results.improvements.push(improvement);
            }
            results.patterns_identified.push(pattern);
        }

        for improvement in &results.improvements {
            match improvement {
                Improvement::AdjustThreshold {
                    intent,
                    current_threshold,
                    new_threshold,
                    reason,
                } => {
                    self.thresholds.insert(intent.clone(), *new_threshold);
                    self.record_event(
                        "learned_threshold_adjustment",
                        json!({
                            "intent": intent,
                            "previous": current_threshold,
                            "new": new_threshold,
                            "based_on_reason": reason,
                        }),
                    );
                }
                Improvement::AddExceptionHandler { handler, reason } => {
                    if self.exception_handlers.iter().any(|h| h.name == handler.name) {
                        continue;
                    }
                    self.record_event(
                        "learned_exception_handler",
                        json!({
                            "handler": handler.name,
                            "description": handler.description,
                            "based_on_reason": reason,
                        }),
                    );
                    self.exception_handlers.push(handler.clone());
                }
            }
        }
        results
    }

    fn propose_improvement(&self, pattern: &EscalationPattern) -> Option<Improvement> {
        let terms = &pattern.common_terms;
        if pattern.reason.starts_with("Confidence") && pattern.reason.contains("below threshold") {
            let candidates: Vec<&str> = INTENT_KEYWORDS
                .iter()
                .filter(|(_, keywords)| keywords.iter().any(|k| terms.iter().any(|t| t == k)))
                .map(|(intent, _)| *intent)
                .collect();
            let [intent] = candidates.as_slice() else {
                return None;
            };
            let current = self.threshold_for(intent);
            return Some(Improvement::AdjustThreshold {
                intent: intent.to_string(),
                current_threshold: current,
                new_threshold: (current - 0.05).max(THRESHOLD_FLOOR),
                reason: pattern.reason.clone(),
            });
        }

        if pattern.reason == "Contains sensitive terms" {
            let has = |word: &str| terms.iter().any(|t| t == word);
            let claim_denial = has("claim") && (has("denied") || has("denial"));
            let name = format!(
                "learned_sensitive_terms_{}",
                terms.iter().take(2).cloned().collect::<Vec<_>>().join("_")
            );
            let description = if claim_denial {
                "Non-sensitive claim denial inquiries".to_string()
            } else {
                format!("Learned pattern for terms: {}", terms.join(", "))
            };
            return Some(Improvement::AddExceptionHandler {
                handler: ExceptionHandler {
                    name,
                    description,
                    kind: ExceptionKind::LearnedTerms {
                        terms: terms.clone(),
                        claim_denial,
                    },
                },
                reason: pattern.reason.clone(),
            });
        }
        None
    }

    pub fn self_improvement_report(&self) -> SelfImprovementReport {
        let mut history = EvolutionSummary::default();
        for event in &self.evolution_history {
            if event.event_type.contains("threshold") {
                history.threshold_adjustments.push(event.clone());
            } else if event.event_type.contains("handler") || event.event_type.contains("exception") {
                history.exception_handler_changes.push(event.clone());
            } else {
                history.other_improvements.push(event.clone());
            }
        }

        let snapshot = self.snapshot();
        let mut recommendations = Vec::new();
        if snapshot.escalation_rate > 0.3 {
            recommendations.push(Recommendation::new(
                "high",
                "Exception Handling",
                "Add more exception handlers to reduce escalation rate",
            ));
        }
        if snapshot.avg_confidence < 0.7 {
            recommendations.push(Recommendation::new(
                "medium",
                "Intent Recognition",
                "Improve intent recognition to increase confidence scores",
            ));
        }
        let mut reason_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for escalation in &self.escalation_history {
            *reason_counts.entry(escalation.reason.as_str()).or_insert(0) += 1;
        }
        if let Some((reason, count)) = reason_counts.into_iter().max_by_key(|(_, count)| *count)
            && count > 5
        {
            recommendations.push(Recommendation::new(
                "high",
                "Escalation Pattern",
                format!("Address common escalation reason: '{}'", reason),
            ));
        }

        SelfImprovementReport {
            timestamp: now(),
            autonomy_metrics: snapshot,
            total_decisions: self.metrics.total_decisions,
            evolution_history: history,
            confidence_thresholds: self.thresholds.clone(),
            exception_handlers: self
                .exception_handlers
                .iter()
                .map(|h| HandlerSummary {
                    name: h.name.clone(),
                    description: h.description.clone(),
                })
                .collect(),
            recommendations,
        }
    }

    /// 多轮执行阈值调整、处理器扩展与升级学习，报告实测的前后差异
    pub fn run_continuous_improvement_cycle(&mut self, cycles: usize) -> ContinuousImprovementResults {
        let initial = self.snapshot();
        let initial_thresholds = self.thresholds.clone();
        let initial_handlers: BTreeSet<String> =
            self.exception_handlers.iter().map(|h| h.name.clone()).collect();

        let mut cycle_results = Vec::new();
        for cycle in 1..=cycles {
            println!("🔄 Running improvement cycle {}/{}...", cycle, cycles);
            let threshold_adjustments = self.adjust_confidence_thresholds();
            let handler_extensions = self.extend_exception_handlers();
            let learning_results = self.learn_from_escalations();
            cycle_results.push(CycleResult {
                cycle,
                threshold_adjustments,
                handler_extensions,
                learning_results,
                metrics: self.snapshot(),
            });
        }

        let final_snapshot = self.snapshot();
        let threshold_changes = initial_thresholds
            .iter()
            .filter_map(|(intent, initial)| {
                let current = self.thresholds.get(intent).copied().unwrap_or(*initial);
                ((current - initial).abs() > f64::EPSILON).then(|| {
                    (
                        intent.clone(),
                        ThresholdChange {
                            initial: *initial,
                            final_value: current,
                            change: current - initial,
                        },
                    )
                })
            })
            .collect();
        let handlers_added = self
            .exception_handlers
            .iter()
            .filter(|h| !initial_handlers.contains(&h.name))
            .map(|h| h.name.clone())
            .collect();

        ContinuousImprovementResults {
            cycles: cycle_results,
            overall_improvement: OverallImprovement {
                initial,
                final_snapshot,
                improvement: final_snapshot.autonomy_rate - initial.autonomy_rate,
                threshold_changes,
                handlers_added,
            },
            final_report: self.self_improvement_report(),
        }
    }
}

/// 一组查询中出现至少两次的高频词（最多取前5个再过滤停用词）
fn common_terms(queries: &[&str]) -> Vec<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for query in queries {
        for word in tokenize(query) {
            let seen = counts.iter().position(|(w, _)| *w == word);
            match seen {
                Some(i) => counts[i].1 += 1,
                None => counts.push((word, 1)),
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(5)
        .filter(|(word, count)| *count >= 2 && !STOPWORDS.contains(&word.as_str()))
        .map(|(word, _)| word)
        .collect()
}

#[cfg(test)]
mod tests;
