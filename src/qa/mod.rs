//! 自动化质量保证：运行测试集、诊断失败、自动修复并生成性能报告

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

use crate::automation::{AutomationManager, Recommendation};
use crate::graph::GraphQuery;
use crate::query::intent::{POLICY_DETAILS, UNKNOWN};
use crate::query::{QueryParameters, ResponseTemplate, Slots, UserContext};

pub mod compliance;
pub mod suites;
pub mod synthetic;

pub use compliance::ComplianceRule;
pub use suites::{Expectation, ExpectedParams, Suite, TestCase, TestKind, Turn};
pub use synthetic::synthetic_graph;

pub const MISSING_DATA: &str = "Missing Data";
pub const TEMPLATE_ISSUES: &str = "Template Issues";

const FAILURE_CAUSE_SHARE: f64 = 0.3;
const TREND_MARGIN: f64 = 0.05;
const TARGET_PASS_RATE: f64 = 0.8;
const SLOW_RESPONSE_MS: f64 = 500.0;
const FREQUENT_ERROR_COUNT: usize = 10;
const MIN_EXAMPLE_CONFIDENCE: f64 = 0.9;
const MIN_EXAMPLE_CHARS: usize = 10;

const COMPREHENSIVE_POLICY_TEMPLATE: &str = "Your {policy_type} policy {policy_number} is {status} with coverage from {effective_date} to {expiration_date}. It includes {coverage_list} coverage with a total limit of {total_limit}.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    Error,
}

/// 失败原因的分类，诊断与修复都按这个分类进行
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    IntentRecognition,
    ParameterExtraction,
    GraphQuery,
    ResponseGeneration,
    Compliance,
    Other,
}

impl ErrorCategory {
    pub fn key(&self) -> &'static str {
        match self {
            ErrorCategory::IntentRecognition => "intent_recognition_errors",
            ErrorCategory::ParameterExtraction => "parameter_extraction_errors",
            ErrorCategory::GraphQuery => "graph_query_errors",
            ErrorCategory::ResponseGeneration => "response_generation_errors",
            ErrorCategory::Compliance => "compliance_errors",
            ErrorCategory::Other => "other_errors",
        }
    }

    pub fn component(&self) -> &'static str {
        match self {
            ErrorCategory::IntentRecognition => "Intent Recognition",
            ErrorCategory::ParameterExtraction => "Parameter Extraction",
            ErrorCategory::GraphQuery => "Graph Querying",
            ErrorCategory::ResponseGeneration => "Response Generation",
            ErrorCategory::Compliance => "Compliance",
            ErrorCategory::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestError {
    pub category: ErrorCategory,
    pub message: String,
}

impl TestError {
    fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub status: TestStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<TestError>,
    pub actual: Value,
    /// 合规测试中未通过与通过的规则
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violated_rules: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub passed_rules: Vec<String>,
}

impl TestResult {
    fn checked(name: &str, errors: Vec<TestError>, actual: Value) -> Self {
        let status = if errors.is_empty() {
            TestStatus::Passed
        } else {
            TestStatus::Failed
        };
        Self {
            name: name.to_string(),
            status,
            errors,
            actual,
            violated_rules: Vec::new(),
            passed_rules: Vec::new(),
        }
    }

    fn error(name: &str, error: TestError) -> Self {
        Self {
            name: name.to_string(),
            status: TestStatus::Error,
            errors: vec![error],
            actual: Value::Null,
            violated_rules: Vec::new(),
            passed_rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    pub total_tests: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
}

impl TestSummary {
    pub fn pass_rate(&self) -> f64 {
        if self.total_tests == 0 {
            0.0
        } else {
            self.passed as f64 / self.total_tests as f64
        }
    }

    fn record(&mut self, status: TestStatus) {
        self.total_tests += 1;
        match status {
            TestStatus::Passed => self.passed += 1,
            TestStatus::Failed => self.failed += 1,
            TestStatus::Error => self.errors += 1,
        }
    }

    fn absorb(&mut self, other: &TestSummary) {
        self.total_tests += other.total_tests;
        self.passed += other.passed;
        self.failed += other.failed;
        self.errors += other.errors;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuiteResults {
    pub summary: TestSummary,
    pub tests: Vec<TestResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRunResults {
    pub timestamp: String,
    pub summary: TestSummary,
    pub suites: BTreeMap<Suite, SuiteResults>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPattern {
    pub count: usize,
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedComponent {
    pub component: Suite,
    pub failure_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticRecommendation {
    pub category: ErrorCategory,
    pub component: String,
    pub issue: String,
    pub recommendation: String,
}

impl DiagnosticRecommendation {
    fn new(category: ErrorCategory, issue: &str, recommendation: &str) -> Self {
        Self {
            category,
            component: category.component().to_string(),
            issue: issue.to_string(),
            recommendation: recommendation.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureCause {
    pub cause: String,
    pub description: String,
    pub affected_tests: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub error_patterns: BTreeMap<String, ErrorPattern>,
    pub common_failure_causes: Vec<FailureCause>,
    pub most_affected_components: Vec<AffectedComponent>,
    pub recommendations: Vec<DiagnosticRecommendation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedIssue {
    pub component: String,
    pub issue: String,
    pub fixed: bool,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixResults {
    pub fixed_issues: Vec<FixedIssue>,
    pub actions_taken: Vec<String>,
}

impl FixResults {
    fn push(&mut self, component: &str, issue: &str, actions: Vec<String>) {
        if actions.is_empty() {
            return;
        }
        self.actions_taken.extend(actions.iter().cloned());
        self.fixed_issues.push(FixedIssue {
            component: component.to_string(),
            issue: issue.to_string(),
            fixed: true,
            actions,
        });
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub total_queries: usize,
    pub successful_queries: usize,
    pub avg_response_time_ms: f64,
    pub intent_distribution: BTreeMap<String, usize>,
    pub error_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestMetrics {
    pub total_tests_run: usize,
    pub pass_rate: f64,
    pub failure_rate: f64,
    pub error_rate: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorTrends {
    pub most_common_error_type: String,
    pub most_common_error_count: usize,
    pub error_types: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceIssue {
    pub rule_id: String,
    pub description: String,
    pub test: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceStatus {
    pub compliant: bool,
    pub issues: Vec<ComplianceIssue>,
    pub passed_rules: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub timestamp: String,
    pub system_metrics: SystemMetrics,
    pub test_metrics: TestMetrics,
    pub error_trends: ErrorTrends,
    pub compliance_status: ComplianceStatus,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaImprovementResults {
    pub initial_tests: TestSummary,
    pub diagnostics: Diagnostics,
    pub fixes: FixResults,
    pub post_fix_tests: TestSummary,
    pub improvement: f64,
    pub performance_report: PerformanceReport,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn check_intent(expected: &Expectation, intent: &str, confidence: Option<f64>, errors: &mut Vec<TestError>) {
    if let Some(wanted) = &expected.intent
        && wanted != intent
    {
        errors.push(TestError::new(
            ErrorCategory::IntentRecognition,
            format!("Intent mismatch: expected '{}', got '{}'", wanted, intent),
        ));
    }
    if let Some(unwanted) = &expected.not_intent
        && unwanted == intent
    {
        errors.push(TestError::new(
            ErrorCategory::IntentRecognition,
            format!("Intent should not be '{}'", unwanted),
        ));
    }
    if let (Some(min), Some(confidence)) = (expected.confidence_min, confidence)
        && confidence < min
    {
        errors.push(TestError::new(
            ErrorCategory::IntentRecognition,
            format!("Confidence too low: expected >={}, got {:.2}", min, confidence),
        ));
    }
}

fn check_answer(expected: &Expectation, answer: &str, success: bool, errors: &mut Vec<TestError>) {
    if let Some(wanted) = expected.success
        && wanted != success
    {
        errors.push(TestError::new(
            ErrorCategory::Other,
            format!("Success flag mismatch: expected {}, got {}", wanted, success),
        ));
    }
    for text in &expected.contains {
        if !contains_ci(answer, text) {
            errors.push(TestError::new(
                ErrorCategory::ResponseGeneration,
                format!("Response does not contain: '{}'", text),
            ));
        }
    }
    for text in &expected.not_contains {
        if contains_ci(answer, text) {
            errors.push(TestError::new(
                ErrorCategory::Other,
                format!("Response should not contain: '{}'", text),
            ));
        }
    }
}

fn check_value(name: &str, expected: &Option<String>, actual: &Option<String>, errors: &mut Vec<TestError>) {
    let Some(expected) = expected else {
        return;
    };
    match actual {
        None => errors.push(TestError::new(
            ErrorCategory::ParameterExtraction,
            format!("Missing parameter: '{}'", name),
        )),
        Some(actual) if actual != expected => errors.push(TestError::new(
            ErrorCategory::ParameterExtraction,
            format!(
                "Parameter value mismatch for '{}': expected '{}', got '{}'",
                name, expected, actual
            ),
        )),
        Some(_) => {}
    }
}

fn check_parameters(expected: &ExpectedParams, actual: &QueryParameters) -> Vec<TestError> {
    let mut errors = Vec::new();
    check_value("policy_number", &expected.policy_number, &actual.policy_number, &mut errors);
    check_value("claim_number", &expected.claim_number, &actual.claim_number, &mut errors);
    check_value("policy_type", &expected.policy_type, &actual.policy_type, &mut errors);
    check_value("date_reference", &expected.date_reference, &actual.date_reference, &mut errors);

    let missing: Vec<&str> = expected
        .coverage_types
        .iter()
        .filter(|c| !actual.coverage_types.contains(c))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        errors.push(TestError::new(
            ErrorCategory::ParameterExtraction,
            format!("List parameter 'coverage_types' missing items: {:?}", missing),
        ));
    }
    errors
}

pub struct QaSystem {
    rng: StdRng,
    rules: Vec<ComplianceRule>,
    history: Vec<TestRunResults>,
    error_patterns: BTreeMap<ErrorCategory, usize>,
    test_count: Option<usize>,
}

impl Default for QaSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl QaSystem {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// 固定随机种子，生成的测试可复现
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            rules: ComplianceRule::defaults(),
            history: Vec::new(),
            error_patterns: BTreeMap::new(),
            test_count: None,
        }
    }

    /// 自我改进循环中每个测试集运行的用例数
    pub fn with_test_count(mut self, count: usize) -> Self {
        self.test_count = Some(count);
        self
    }

    pub fn rules(&self) -> &[ComplianceRule] {
        &self.rules
    }

    pub fn history(&self) -> &[TestRunResults] {
        &self.history
    }

    pub fn error_patterns(&self) -> &BTreeMap<ErrorCategory, usize> {
        &self.error_patterns
    }

    /// 运行指定测试集（缺省为全部）并记入历史。`count` 大于固定用例数时随机补足，否则截断
    pub fn run_test_suite(
        &mut self,
        automation: &mut AutomationManager,
        suite: Option<Suite>,
        count: Option<usize>,
    ) -> TestRunResults {
        let results = self.execute_suites(automation, suite, count);
        self.history.push(results.clone());
        results
    }

    /// 只执行不记历史，供报告内部的检查使用
    fn execute_suites(
        &mut self,
        automation: &mut AutomationManager,
        suite: Option<Suite>,
        count: Option<usize>,
    ) -> TestRunResults {
        let selected: Vec<Suite> = match suite {
            Some(suite) => vec![suite],
            None => Suite::ALL.to_vec(),
        };

        let mut results = TestRunResults {
            timestamp: Utc::now().to_rfc3339(),
            summary: TestSummary::default(),
            suites: BTreeMap::new(),
        };

        for suite in selected {
            let mut cases = suites::fixed_cases(suite);
            if let Some(count) = count {
                if count > cases.len() {
                    let extra = count - cases.len();
                    cases.extend(suites::generate_cases(suite, &mut self.rng, extra));
                }
                cases.truncate(count);
            }

            let mut suite_results = SuiteResults::default();
            for case in &cases {
                let result = self.run_case(automation, case);
                suite_results.summary.record(result.status);
                suite_results.tests.push(result);
            }
            tracing::info!(
                suite = %suite,
                total = suite_results.summary.total_tests,
                passed = suite_results.summary.passed,
                "test suite finished"
            );
            results.summary.absorb(&suite_results.summary);
            results.suites.insert(suite, suite_results);
        }

        results
    }

    fn run_case(&self, automation: &mut AutomationManager, case: &TestCase) -> TestResult {
        let name = case.name.as_str();
        match &case.kind {
            TestKind::Intent { query, expected } => {
                let analysis = automation.processor().analyze_intent(query);
                let mut errors = Vec::new();
                check_intent(expected, &analysis.intent, Some(analysis.confidence), &mut errors);
                let actual = serde_json::to_value(&analysis).unwrap_or(Value::Null);
                TestResult::checked(name, errors, actual)
            }
            TestKind::Parameters {
                query,
                intent,
                expected,
            } => {
                let params = automation.processor().extract_parameters(query, intent, None);
                let errors = check_parameters(expected, &params);
                let actual = serde_json::to_value(&params).unwrap_or(Value::Null);
                TestResult::checked(name, errors, actual)
            }
            TestKind::Graph {
                query,
                count_min,
                count_max,
                property_exists,
            } => self.run_graph_case(automation, name, query, *count_min, *count_max, property_exists.as_deref()),
            TestKind::Response {
                intent,
                template_data,
                expected,
            } => self.run_response_case(automation, name, intent, template_data, expected),
            TestKind::Query {
                query,
                user_context,
                expected,
            } => {
                let result = automation.process(query, user_context.as_ref());
                let response = &result.response;
                let mut errors = Vec::new();
                check_intent(expected, &response.intent, None, &mut errors);
                check_answer(expected, &response.answer, response.success, &mut errors);
                let actual = json!({
                    "intent": response.intent,
                    "answer": response.answer,
                    "success": response.success,
                    "requires_human_review": result.requires_human_review,
                    "exception_handled": result.exception_handled,
                });
                TestResult::checked(name, errors, actual)
            }
            TestKind::Conversation {
                persona,
                user_context,
                turns,
            } => Self::run_conversation(automation, name, persona, user_context.as_ref(), turns),
            TestKind::Compliance {
                query,
                user_context,
                expected,
            } => self.run_compliance_case(automation, name, query, user_context.as_ref(), expected),
        }
    }

    fn run_graph_case(
        &self,
        automation: &AutomationManager,
        name: &str,
        query: &GraphQuery,
        count_min: Option<usize>,
        count_max: Option<usize>,
        property_exists: Option<&str>,
    ) -> TestResult {
        let unbound = query.unbound_aliases();
        if !unbound.is_empty() {
            let aliases: Vec<String> = unbound.into_iter().collect();
            return TestResult::error(
                name,
                TestError::new(
                    ErrorCategory::GraphQuery,
                    format!("Graph query references unbound aliases: {}", aliases.join(", ")),
                ),
            );
        }

        let result = automation.processor().graph().execute(query);
        let mut errors = Vec::new();
        if let Some(min) = count_min
            && result.count < min
        {
            errors.push(TestError::new(
                ErrorCategory::GraphQuery,
                format!("Result count too low: expected >={}, got {}", min, result.count),
            ));
        }
        if let Some(max) = count_max
            && result.count > max
        {
            errors.push(TestError::new(
                ErrorCategory::GraphQuery,
                format!("Result count too high: expected <={}, got {}", max, result.count),
            ));
        }
        if let Some(property) = property_exists
            && !result.properties.contains_key(property)
        {
            errors.push(TestError::new(
                ErrorCategory::GraphQuery,
                format!("Property not found in results: '{}'", property),
            ));
        }
        let actual = json!({
            "count": result.count,
            "properties": result.properties.keys().collect::<Vec<_>>(),
        });
        TestResult::checked(name, errors, actual)
    }

    fn run_response_case(
        &self,
        automation: &AutomationManager,
        name: &str,
        intent: &str,
        template_data: &Slots,
        expected: &Expectation,
    ) -> TestResult {
        let processor = automation.processor();
        if !processor.response_templates().contains_key(intent) {
            return TestResult::error(
                name,
                TestError::new(
                    ErrorCategory::ResponseGeneration,
                    format!("No response templates registered for intent '{}'", intent),
                ),
            );
        }
        let generated = processor.render_slots(intent, template_data.clone());
        let mut errors = Vec::new();
        check_answer(expected, &generated.answer, generated.success, &mut errors);
        let actual = json!({ "answer": generated.answer, "success": generated.success });
        TestResult::checked(name, errors, actual)
    }

    fn run_conversation(
        automation: &mut AutomationManager,
        name: &str,
        persona: &str,
        user_context: Option<&UserContext>,
        turns: &[Turn],
    ) -> TestResult {
        let mut errors = Vec::new();
        let mut conversation = Vec::with_capacity(turns.len());
        for (i, turn) in turns.iter().enumerate() {
            let result = automation.process(&turn.query, user_context);
            let response = &result.response;
            let mut turn_errors = Vec::new();
            check_intent(&turn.expected, &response.intent, None, &mut turn_errors);
            check_answer(&turn.expected, &response.answer, response.success, &mut turn_errors);
            conversation.push(json!({
                "turn": i + 1,
                "query": turn.query,
                "response": response.answer,
                "passed": turn_errors.is_empty(),
            }));
            errors.extend(turn_errors.into_iter().map(|e| TestError {
                message: format!("Turn {}: {}", i + 1, e.message),
                ..e
            }));
        }
        let actual = json!({ "persona": persona, "conversation": conversation });
        TestResult::checked(name, errors, actual)
    }

    fn run_compliance_case(
        &self,
        automation: &mut AutomationManager,
        name: &str,
        query: &str,
        user_context: Option<&UserContext>,
        expected: &Expectation,
    ) -> TestResult {
        let result = automation.process(query, user_context);
        let answer = result.response.answer.as_str();

        let mut errors = Vec::new();
        let mut violated_rules = Vec::new();
        let mut passed_rules = Vec::new();
        for rule in &self.rules {
            if rule.check(query, answer) {
                passed_rules.push(rule.id().to_string());
            } else {
                violated_rules.push(rule.id().to_string());
                errors.push(TestError::new(
                    ErrorCategory::Compliance,
                    format!("Compliance rule '{}' failed: {}", rule.id(), rule.description()),
                ));
            }
        }
        for text in &expected.contains {
            if !contains_ci(answer, text) {
                errors.push(TestError::new(
                    ErrorCategory::ResponseGeneration,
                    format!("Response does not contain required information: '{}'", text),
                ));
            }
        }
        for text in &expected.not_contains {
            if contains_ci(answer, text) {
                errors.push(TestError::new(
                    ErrorCategory::Compliance,
                    format!("Response contains prohibited information: '{}'", text),
                ));
            }
        }

        let mut test = TestResult::checked(name, errors, json!({ "answer": answer }));
        test.violated_rules = violated_rules;
        test.passed_rules = passed_rules;
        test
    }

    /// 归类失败测试中的错误，给出受影响组件、建议与主要失败原因
    pub fn diagnose_failures(&mut self, results: &TestRunResults) -> Diagnostics {
        let mut diagnostics = Diagnostics::default();
        let mut by_category: BTreeMap<ErrorCategory, Vec<&TestError>> = BTreeMap::new();
        let mut affected: Vec<AffectedComponent> = Vec::new();
        let mut total_errors = 0usize;

        for (suite, suite_results) in &results.suites {
            let failed: Vec<&TestResult> = suite_results
                .tests
                .iter()
                .filter(|t| t.status == TestStatus::Failed)
                .collect();
            if !failed.is_empty() {
                affected.push(AffectedComponent {
                    component: *suite,
                    failure_count: failed.len(),
                });
            }
            for error in failed.iter().flat_map(|t| &t.errors) {
                by_category.entry(error.category).or_default().push(error);
                *self.error_patterns.entry(error.category).or_insert(0) += 1;
                total_errors += 1;
            }
        }

        affected.sort_by(|a, b| b.failure_count.cmp(&a.failure_count));
        diagnostics.most_affected_components = affected;
        diagnostics.error_patterns = by_category
            .iter()
            .map(|(category, errors)| {
                let pattern = ErrorPattern {
                    count: errors.len(),
                    examples: errors.iter().take(3).map(|e| e.message.clone()).collect(),
                };
                (category.key().to_string(), pattern)
            })
            .collect();

        let count = |category: ErrorCategory| by_category.get(&category).map_or(0, Vec::len);
        let thresholds = [
            (
                ErrorCategory::IntentRecognition,
                2,
                "Multiple intent recognition failures detected",
                "Improve intent examples and patterns, especially for ambiguous queries",
            ),
            (
                ErrorCategory::ParameterExtraction,
                2,
                "Parameter extraction failures detected",
                "Enhance regex patterns and extraction logic for entity recognition",
            ),
            (
                ErrorCategory::GraphQuery,
                2,
                "Graph query execution issues detected",
                "Validate graph structure and improve query construction logic",
            ),
            (
                ErrorCategory::ResponseGeneration,
                2,
                "Response content issues detected",
                "Enhance response templates and slot filling logic",
            ),
            (
                ErrorCategory::Compliance,
                0,
                "Regulatory compliance issues detected",
                "Review and update compliance rules and response filtering",
            ),
        ];
        for (category, above, issue, recommendation) in thresholds {
            if count(category) > above {
                diagnostics
                    .recommendations
                    .push(DiagnosticRecommendation::new(category, issue, recommendation));
            }
        }

        if total_errors > 0 {
            let share = total_errors as f64 * FAILURE_CAUSE_SHARE;
            let missing = by_category
                .values()
                .flatten()
                .filter(|e| e.message.to_lowercase().contains("missing"))
                .count();
            if missing as f64 > share {
                diagnostics.common_failure_causes.push(FailureCause {
                    cause: MISSING_DATA.to_string(),
                    description: "Many tests are failing due to missing data in the knowledge graph".to_string(),
                    affected_tests: missing,
                });
            }
            let template = count(ErrorCategory::ResponseGeneration);
            if template as f64 > share {
                diagnostics.common_failure_causes.push(FailureCause {
                    cause: TEMPLATE_ISSUES.to_string(),
                    description: "Response templates are not properly incorporating required information".to_string(),
                    affected_tests: template,
                });
            }
        }

        tracing::debug!(
            errors = total_errors,
            recommendations = diagnostics.recommendations.len(),
            "failures diagnosed"
        );
        diagnostics
    }

    /// 针对诊断结果执行能自动完成的修复
    pub fn fix_common_issues(&mut self, automation: &mut AutomationManager, diagnostics: &Diagnostics) -> FixResults {
        let mut fixes = FixResults::default();

        for recommendation in &diagnostics.recommendations {
            let actions = match recommendation.category {
                ErrorCategory::IntentRecognition => Self::improve_intent_recognition(automation),
                ErrorCategory::ResponseGeneration => Self::improve_response_templates(automation),
                ErrorCategory::Compliance => self.improve_compliance_handling(),
                other => {
                    tracing::debug!(category = ?other, "no automatic fix available");
                    Vec::new()
                }
            };
            fixes.push(&recommendation.component, &recommendation.issue, actions);
        }

        for cause in &diagnostics.common_failure_causes {
            if cause.cause == MISSING_DATA {
                let actions = synthetic::add_missing_data(automation.processor_mut().graph_mut(), &mut self.rng);
                fixes.push("Knowledge Graph", "Missing data in knowledge graph", actions);
            }
        }

        tracing::info!(fixed = fixes.fixed_issues.len(), "common issues fixed");
        fixes
    }

    /// 把近期高置信度的查询加入意图示例
    fn improve_intent_recognition(automation: &mut AutomationManager) -> Vec<String> {
        let candidates: Vec<(String, String)> = automation
            .processor()
            .history()
            .filter(|entry| {
                entry.confidence > MIN_EXAMPLE_CONFIDENCE
                    && entry.intent != UNKNOWN
                    && entry.query.chars().count() > MIN_EXAMPLE_CHARS
            })
            .map(|entry| (entry.intent.clone(), entry.query.clone()))
            .collect();

        let processor = automation.processor_mut();
        candidates
            .into_iter()
            .filter(|(intent, query)| processor.add_intent_example(intent, query))
            .map(|(intent, query)| format!("Added new example for intent '{}': '{}'", intent, query))
            .collect()
    }

    fn improve_response_templates(automation: &mut AutomationManager) -> Vec<String> {
        let processor = automation.processor_mut();
        let exists = processor
            .response_templates()
            .get(POLICY_DETAILS)
            .is_some_and(|list| list.iter().any(|t| t.template == COMPREHENSIVE_POLICY_TEMPLATE));
        if exists {
            return Vec::new();
        }
        processor.add_response_template(
            POLICY_DETAILS,
            ResponseTemplate::new(COMPREHENSIVE_POLICY_TEMPLATE, &["policy_type", "policy_number", "status"])
                .optional(&["effective_date", "expiration_date", "coverage_list", "total_limit"]),
        );
        vec!["Added more comprehensive policy details template".to_string()]
    }

    fn improve_compliance_handling(&mut self) -> Vec<String> {
        let rule = ComplianceRule::PolicyCancellationNotice;
        if self.rules.contains(&rule) {
            return Vec::new();
        }
        self.rules.push(rule);
        vec![format!("Added new compliance rule: {}", rule.id())]
    }

    fn system_metrics(automation: &AutomationManager) -> SystemMetrics {
        let metrics = automation.processor().metrics();
        let error_rate = if metrics.total_queries > 0 {
            1.0 - metrics.success_rate()
        } else {
            0.0
        };
        SystemMetrics {
            total_queries: metrics.total_queries,
            successful_queries: metrics.successful_queries,
            avg_response_time_ms: metrics.avg_response_time_ms,
            intent_distribution: metrics.intent_distribution.clone(),
            error_rate,
        }
    }

    fn test_metrics(&self) -> TestMetrics {
        let Some(latest) = self.history.last() else {
            return TestMetrics {
                total_tests_run: 0,
                pass_rate: 0.0,
                failure_rate: 0.0,
                error_rate: 0.0,
                trend: Trend::InsufficientData,
            };
        };
        let summary = latest.summary;
        let total = summary.total_tests.max(1) as f64;
        let pass_rate = summary.pass_rate();

        let trend = match self.history.len().checked_sub(2).map(|i| &self.history[i]) {
            Some(previous) => {
                let previous_rate = previous.summary.pass_rate();
                if pass_rate > previous_rate + TREND_MARGIN {
                    Trend::Improving
                } else if pass_rate < previous_rate - TREND_MARGIN {
                    Trend::Declining
                } else {
                    Trend::Stable
                }
            }
            None => Trend::Stable,
        };

        TestMetrics {
            total_tests_run: summary.total_tests,
            pass_rate,
            failure_rate: summary.failed as f64 / total,
            error_rate: summary.errors as f64 / total,
            trend,
        }
    }

    fn error_trends(&self) -> ErrorTrends {
        let error_types = self
            .error_patterns
            .iter()
            .map(|(category, count)| (category.key().to_string(), *count))
            .collect();
        // 计数相同时取分类顺序靠前的
        let most_common = self
            .error_patterns
            .iter()
            .fold(None::<(ErrorCategory, usize)>, |best, (category, count)| match best {
                Some((_, best_count)) if best_count >= *count => best,
                _ => Some((*category, *count)),
            });
        match most_common {
            Some((category, count)) => ErrorTrends {
                most_common_error_type: category.key().to_string(),
                most_common_error_count: count,
                error_types,
            },
            None => ErrorTrends {
                most_common_error_type: "none".to_string(),
                most_common_error_count: 0,
                error_types,
            },
        }
    }

    /// 运行合规测试集并汇总违规情况
    fn compliance_status(&mut self, automation: &mut AutomationManager) -> ComplianceStatus {
        let results = self.execute_suites(automation, Some(Suite::Compliance), None);
        let mut status = ComplianceStatus {
            compliant: true,
            issues: Vec::new(),
            passed_rules: Vec::new(),
        };
        let tests = results
            .suites
            .get(&Suite::Compliance)
            .map(|s| s.tests.as_slice())
            .unwrap_or_default();
        for test in tests {
            if test.status == TestStatus::Failed {
                status.compliant = false;
                for rule_id in &test.violated_rules {
                    if let Some(rule) = self.rules.iter().find(|r| r.id() == rule_id) {
                        status.issues.push(ComplianceIssue {
                            rule_id: rule_id.clone(),
                            description: rule.description().to_string(),
                            test: test.name.clone(),
                        });
                    }
                }
            } else {
                status.passed_rules.extend(test.passed_rules.iter().cloned());
            }
        }
        status
    }

    pub fn performance_report(&mut self, automation: &mut AutomationManager) -> PerformanceReport {
        let system_metrics = Self::system_metrics(automation);
        let test_metrics = self.test_metrics();
        let error_trends = self.error_trends();
        let compliance_status = self.compliance_status(automation);

        let mut recommendations = Vec::new();
        if test_metrics.pass_rate < TARGET_PASS_RATE {
            recommendations.push(Recommendation::new(
                "high",
                "Test Coverage",
                "Improve test pass rate by addressing common failure patterns",
            ));
        }
        if system_metrics.avg_response_time_ms > SLOW_RESPONSE_MS {
            recommendations.push(Recommendation::new(
                "medium",
                "Performance",
                "Optimize query processing to reduce response time",
            ));
        }
        if error_trends.most_common_error_count > FREQUENT_ERROR_COUNT
            && let Some((category, _)) = self
                .error_patterns
                .iter()
                .find(|(c, _)| c.key() == error_trends.most_common_error_type)
        {
            recommendations.push(Recommendation::new(
                "high",
                category.component(),
                format!(
                    "Address {} which is the most frequent error pattern",
                    error_trends.most_common_error_type
                ),
            ));
        }
        for issue in &compliance_status.issues {
            recommendations.push(Recommendation::new(
                "critical",
                "Compliance",
                format!("Fix compliance issue: {}", issue.description),
            ));
        }

        PerformanceReport {
            timestamp: Utc::now().to_rfc3339(),
            system_metrics,
            test_metrics,
            error_trends,
            compliance_status,
            recommendations,
        }
    }

    /// 测试 -> 诊断 -> 修复 -> 复测，最后生成性能报告
    pub fn run_self_improvement_cycle(&mut self, automation: &mut AutomationManager) -> QaImprovementResults {
        println!("🔄 Running initial tests...");
        let initial = self.run_test_suite(automation, None, self.test_count);

        println!("🔄 Diagnosing failures...");
        let diagnostics = self.diagnose_failures(&initial);

        println!("🔄 Applying fixes...");
        let fixes = self.fix_common_issues(automation, &diagnostics);

        println!("🔄 Running tests after fixes...");
        let post_fix = self.run_test_suite(automation, None, self.test_count);
        let improvement = post_fix.summary.pass_rate() - initial.summary.pass_rate();

        println!("🔄 Generating performance report...");
        let performance_report = self.performance_report(automation);

        println!(
            "✅ QA improvement cycle finished: pass rate {:.1}% -> {:.1}%",
            initial.summary.pass_rate() * 100.0,
            post_fix.summary.pass_rate() * 100.0
        );

        QaImprovementResults {
            initial_tests: initial.summary,
            diagnostics,
            fixes,
            post_fix_tests: post_fix.summary,
            improvement,
            performance_report,
        }
    }
}

#[cfg(test)]
mod tests;
