//! 测试用例模型、固定测试集与随机生成的测试

use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::synthetic::{claim_id, date_offset, policy_id};
use crate::graph::{Direction, Filter, GraphQuery};
use crate::query::intent::{
    CLAIM_STATUS, COVERAGE_INQUIRY, FILING_CLAIM, POLICY_DETAILS, PREMIUM_INFORMATION, UNKNOWN,
};
use crate::query::{Slots, UserContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Suite {
    IntentRecognition,
    ParameterExtraction,
    GraphQuerying,
    ResponseGeneration,
    EndToEnd,
    EdgeCases,
    Compliance,
}

impl Suite {
    pub const ALL: [Suite; 7] = [
        Suite::IntentRecognition,
        Suite::ParameterExtraction,
        Suite::GraphQuerying,
        Suite::ResponseGeneration,
        Suite::EndToEnd,
        Suite::EdgeCases,
        Suite::Compliance,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Suite::IntentRecognition => "intent_recognition",
            Suite::ParameterExtraction => "parameter_extraction",
            Suite::GraphQuerying => "graph_querying",
            Suite::ResponseGeneration => "response_generation",
            Suite::EndToEnd => "end_to_end",
            Suite::EdgeCases => "edge_cases",
            Suite::Compliance => "compliance",
        }
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Suite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Suite::ALL
            .into_iter()
            .find(|suite| suite.name() == s)
            .ok_or_else(|| format!("Unknown test suite: {}", s))
    }
}

/// 对一次回答的期望
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expectation {
    pub intent: Option<String>,
    pub not_intent: Option<String>,
    pub confidence_min: Option<f64>,
    pub success: Option<bool>,
    pub contains: Vec<String>,
    pub not_contains: Vec<String>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Expectation {
    pub fn intent(mut self, intent: &str) -> Self {
        self.intent = Some(intent.to_string());
        self
    }

    pub fn not_intent(mut self, intent: &str) -> Self {
        self.not_intent = Some(intent.to_string());
        self
    }

    pub fn confidence_min(mut self, min: f64) -> Self {
        self.confidence_min = Some(min);
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    pub fn contains(mut self, texts: &[&str]) -> Self {
        self.contains = owned(texts);
        self
    }

    pub fn not_contains(mut self, texts: &[&str]) -> Self {
        self.not_contains = owned(texts);
        self
    }
}

/// 参数抽取的期望值，未设置的字段不检查
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpectedParams {
    pub policy_number: Option<String>,
    pub claim_number: Option<String>,
    pub policy_type: Option<String>,
    pub date_reference: Option<String>,
    pub coverage_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub query: String,
    pub expected: Expectation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TestKind {
    Intent {
        query: String,
        expected: Expectation,
    },
    Parameters {
        query: String,
        intent: String,
        expected: ExpectedParams,
    },
    Graph {
        query: GraphQuery,
        count_min: Option<usize>,
        count_max: Option<usize>,
        property_exists: Option<String>,
    },
    Response {
        intent: String,
        template_data: Slots,
        expected: Expectation,
    },
    Query {
        query: String,
        user_context: Option<UserContext>,
        expected: Expectation,
    },
    Conversation {
        persona: String,
        user_context: Option<UserContext>,
        turns: Vec<Turn>,
    },
    Compliance {
        query: String,
        user_context: Option<UserContext>,
        expected: Expectation,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub name: String,
    pub kind: TestKind,
}

impl TestCase {
    fn new(name: impl Into<String>, kind: TestKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    fn intent(name: &str, query: &str, expected: Expectation) -> Self {
        Self::new(
            name,
            TestKind::Intent {
                query: query.to_string(),
                expected,
            },
        )
    }

    fn query(name: &str, query: &str, user_context: Option<UserContext>, expected: Expectation) -> Self {
        Self::new(
            name,
            TestKind::Query {
                query: query.to_string(),
                user_context,
                expected,
            },
        )
    }

    fn compliance(name: &str, query: &str, user_context: Option<UserContext>, expected: Expectation) -> Self {
        Self::new(
            name,
            TestKind::Compliance {
                query: query.to_string(),
                user_context,
                expected,
            },
        )
    }
}

fn slots(pairs: &[(&str, &str)]) -> Slots {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn policy_lookup(policy: &str) -> GraphQuery {
    GraphQuery::new("Policy", "p")
        .filter(Filter::eq("p.policy_number", policy))
        .returning(&["p.policy_number"])
}

fn policy_coverages(policy: &str) -> GraphQuery {
    GraphQuery::new("Policy", "p")
        .path("p", Some("HAS_COVERAGE"), Direction::Outgoing, "Coverage", "c")
        .filter(Filter::eq("p.policy_number", policy))
        .returning(&["p.policy_number", "c.type"])
}

fn claims_by_coverage() -> GraphQuery {
    GraphQuery::new("Insured", "i")
        .path("i", Some("FILES_CLAIM"), Direction::Outgoing, "Claim", "c")
        .path("c", Some("RELATED_TO"), Direction::Outgoing, "Coverage", "cov")
        .returning(&["i.name", "c.claim_number", "cov.type"])
}

/// 每个测试集的固定用例
pub fn fixed_cases(suite: Suite) -> Vec<TestCase> {
    match suite {
        Suite::IntentRecognition => vec![
            TestCase::intent(
                "policy_details_standard",
                "What are the details of my policy P1001?",
                Expectation::default().intent(POLICY_DETAILS).confidence_min(0.7),
            ),
            TestCase::intent(
                "coverage_inquiry_standard",
                "What does my policy cover?",
                Expectation::default().intent(COVERAGE_INQUIRY).confidence_min(0.7),
            ),
            TestCase::intent(
                "claim_status_standard",
                "What is the status of claim CL4001?",
                Expectation::default().intent(CLAIM_STATUS).confidence_min(0.7),
            ),
            TestCase::intent(
                "premium_information_standard",
                "How much is my premium for policy P1002?",
                Expectation::default().intent(PREMIUM_INFORMATION).confidence_min(0.7),
            ),
            TestCase::intent(
                "filing_claim_standard",
                "How do I file a claim for water damage?",
                Expectation::default().intent(FILING_CLAIM).confidence_min(0.7),
            ),
            TestCase::intent(
                "ambiguous_intent_handling",
                "I need information about my insurance",
                Expectation::default().not_intent(UNKNOWN).confidence_min(0.5),
            ),
            TestCase::intent(
                "out_of_domain_intent_handling",
                "What is the weather forecast for tomorrow?",
                Expectation::default().intent(UNKNOWN),
            ),
        ],
        Suite::ParameterExtraction => {
            let case = |name: &str, query: &str, intent: &str, expected: ExpectedParams| {
                TestCase::new(
                    name,
                    TestKind::Parameters {
                        query: query.to_string(),
                        intent: intent.to_string(),
                        expected,
                    },
                )
            };
            vec![
                case(
                    "policy_number_extraction",
                    "Tell me about policy P1234",
                    POLICY_DETAILS,
                    ExpectedParams {
                        policy_number: Some("P1234".to_string()),
                        ..Default::default()
                    },
                ),
                case(
                    "claim_number_extraction",
                    "What is the status of claim number CL5678?",
                    CLAIM_STATUS,
                    ExpectedParams {
                        claim_number: Some("CL5678".to_string()),
                        ..Default::default()
                    },
                ),
                case(
                    "policy_type_extraction",
                    "Tell me about my auto insurance policy",
                    POLICY_DETAILS,
                    ExpectedParams {
                        policy_type: Some("auto".to_string()),
                        ..Default::default()
                    },
                ),
                case(
                    "coverage_type_extraction",
                    "Am I covered for flood damage?",
                    COVERAGE_INQUIRY,
                    ExpectedParams {
                        coverage_types: vec!["flood".to_string()],
                        ..Default::default()
                    },
                ),
                case(
                    "multiple_parameter_extraction",
                    "What is the deductible for collision coverage on my policy P1005?",
                    COVERAGE_INQUIRY,
                    ExpectedParams {
                        policy_number: Some("P1005".to_string()),
                        coverage_types: vec!["collision".to_string()],
                        ..Default::default()
                    },
                ),
                case(
                    "date_extraction",
                    "What claims did I file since 01/15/2024?",
                    CLAIM_STATUS,
                    ExpectedParams {
                        date_reference: Some("01/15/2024".to_string()),
                        ..Default::default()
                    },
                ),
            ]
        }
        Suite::GraphQuerying => {
            let case = |name: &str, query: GraphQuery, property_exists: Option<&str>| {
                TestCase::new(
                    name,
                    TestKind::Graph {
                        query,
                        count_min: Some(1),
                        count_max: None,
                        property_exists: property_exists.map(str::to_string),
                    },
                )
            };
            vec![
                case("policy_lookup_by_number", policy_lookup("P1001"), None),
                case("policy_coverage_relationship", policy_coverages("P1001"), Some("c.type")),
                case(
                    "insured_claims_relationship",
                    GraphQuery::new("Insured", "i")
                        .path("i", Some("FILES_CLAIM"), Direction::Outgoing, "Claim", "c")
                        .returning(&["i.id_number", "c.claim_number"]),
                    None,
                ),
                case("complex_multi_hop_query", claims_by_coverage(), None),
            ]
        }
        Suite::ResponseGeneration => {
            let case = |name: &str, intent: &str, data: &[(&str, &str)], expected: Expectation| {
                TestCase::new(
                    name,
                    TestKind::Response {
                        intent: intent.to_string(),
                        template_data: slots(data),
                        expected,
                    },
                )
            };
            vec![
                case(
                    "policy_details_response",
                    POLICY_DETAILS,
                    &[
                        ("policy_number", "P1001"),
                        ("policy_type", "auto"),
                        ("effective_date", "2023-01-15"),
                        ("expiration_date", "2024-01-15"),
                        ("status", "active"),
                    ],
                    Expectation::default().contains(&["P1001", "auto", "2024-01-15"]),
                ),
                case(
                    "coverage_response",
                    COVERAGE_INQUIRY,
                    &[
                        ("coverage_list", "liability, collision, comprehensive"),
                        ("limit_info", "The total coverage limit is $750,000."),
                    ],
                    Expectation::default().contains(&["liability", "collision", "comprehensive", "$750,000"]),
                ),
                case(
                    "claim_status_response",
                    CLAIM_STATUS,
                    &[
                        ("claim_number", "CL4001"),
                        ("status", "approved"),
                        ("date_filed", "2023-11-30"),
                    ],
                    Expectation::default().contains(&["CL4001", "approved"]),
                ),
                case(
                    "premium_response",
                    PREMIUM_INFORMATION,
                    &[
                        ("amount", "$1,200"),
                        ("frequency", "monthly"),
                        ("due_date", "2023-12-15"),
                    ],
                    Expectation::default().contains(&["$1,200", "monthly", "2023-12-15"]),
                ),
                case(
                    "filing_claim_response",
                    FILING_CLAIM,
                    &[
                        ("required_info", "policy information, date and details of incident"),
                        ("contact_info", "1-800-555-CLAIM"),
                    ],
                    Expectation::default().contains(&["policy information", "1-800-555-CLAIM"]),
                ),
                case(
                    "missing_data_handling",
                    POLICY_DETAILS,
                    &[("policy_number", "P1001")],
                    Expectation::default().success(false).contains(&["policy details"]),
                ),
            ]
        }
        Suite::EndToEnd => vec![
            TestCase::query(
                "policy_details_end_to_end",
                "What are the details of my policy P1001?",
                Some(UserContext::new("U5001")),
                Expectation::default()
                    .intent(POLICY_DETAILS)
                    .success(true)
                    .contains(&["P1001"]),
            ),
            TestCase::query(
                "coverage_inquiry_end_to_end",
                "What does my auto policy cover?",
                Some(UserContext::new("U5002").with_policies(&["P1002"])),
                Expectation::default()
                    .intent(COVERAGE_INQUIRY)
                    .success(true)
                    .contains(&["cover"]),
            ),
            TestCase::query(
                "claim_status_end_to_end",
                "What is the status of my claim CL4001?",
                Some(UserContext::new("U5001")),
                Expectation::default()
                    .intent(CLAIM_STATUS)
                    .success(true)
                    .contains(&["CL4001"]),
            ),
            TestCase::query(
                "premium_information_end_to_end",
                "How much is my premium for policy P1001?",
                Some(UserContext::new("U5001")),
                Expectation::default()
                    .intent(PREMIUM_INFORMATION)
                    .success(true)
                    .contains(&["premium"]),
            ),
            TestCase::query(
                "filing_claim_end_to_end",
                "How do I file a claim for water damage?",
                Some(UserContext::new("U5005")),
                Expectation::default()
                    .intent(FILING_CLAIM)
                    .success(true)
                    .contains(&["file", "claim"]),
            ),
            TestCase::new(
                "multi_turn_conversation",
                TestKind::Conversation {
                    persona: "existing_customer".to_string(),
                    user_context: Some(UserContext::new("U5001").with_policies(&["P1001"])),
                    turns: vec![
                        Turn {
                            query: "Tell me about my policy".to_string(),
                            expected: Expectation::default().success(true).contains(&["policy"]),
                        },
                        Turn {
                            query: "What does my policy cover?".to_string(),
                            expected: Expectation::default()
                                .intent(COVERAGE_INQUIRY)
                                .success(true)
                                .contains(&["cover"]),
                        },
                    ],
                },
            ),
        ],
        Suite::EdgeCases => vec![
            TestCase::query(
                "nonexistent_policy",
                "Tell me about policy NONEXISTENT1",
                None,
                Expectation::default()
                    .success(false)
                    .contains(&["couldn't find", "policy"]),
            ),
            TestCase::query(
                "ambiguous_query",
                "Tell me more",
                None,
                Expectation::default().contains(&["more specific", "details"]),
            ),
            TestCase::query(
                "unrelated_query",
                "What is the capital of France?",
                None,
                Expectation::default().intent(UNKNOWN),
            ),
            TestCase::query(
                "incomplete_information",
                "What is my deductible?",
                None,
                Expectation::default().contains(&["which policy", "more information"]),
            ),
            TestCase::query(
                "malformed_input",
                "!@#$%^&*()",
                None,
                Expectation::default().success(false),
            ),
        ],
        Suite::Compliance => vec![
            TestCase::compliance(
                "privacy_sensitive_info",
                "Show me all of my personal information",
                Some(UserContext::new("U5001")),
                Expectation::default().not_contains(&["credit card", "social security", "password"]),
            ),
            TestCase::compliance(
                "disclosure_requirements",
                "What does my policy P1001 cover?",
                Some(UserContext::new("U5001")),
                Expectation::default().contains(&["coverage", "limit"]),
            ),
            TestCase::compliance(
                "claim_denial_explanation",
                "Why was my claim denied?",
                Some(UserContext::new("U5001").with_claims(&["CL4001"])),
                Expectation::default().contains(&["reason", "denied"]),
            ),
        ],
    }
}

static POLICY_TYPES: [&str; 5] = ["auto", "home", "life", "health", "liability"];
static PERILS: [&str; 6] = ["water", "fire", "theft", "collision", "liability", "medical"];
static COVERAGE_WORDS: [&str; 5] = ["liability", "collision", "comprehensive", "flood", "theft"];

fn pick<'a>(rng: &mut StdRng, items: &'a [&'a str]) -> &'a str {
    items.choose(rng).copied().unwrap_or_default()
}

fn random_policy(rng: &mut StdRng) -> String {
    policy_id(rng.random_range(0..10))
}

fn random_claim(rng: &mut StdRng) -> String {
    claim_id(rng.random_range(0..10))
}

/// 填充 `{policy_number}` 等占位符，返回查询与填入的值
struct Filled {
    query: String,
    policy_number: Option<String>,
    claim_number: Option<String>,
    policy_type: Option<String>,
    coverage_type: Option<String>,
}

fn fill(template: &str, rng: &mut StdRng, coverage_words: &[&str]) -> Filled {
    let mut filled = Filled {
        query: template.to_string(),
        policy_number: None,
        claim_number: None,
        policy_type: None,
        coverage_type: None,
    };
    if filled.query.contains("{policy_number}") {
        let value = random_policy(rng);
        filled.query = filled.query.replace("{policy_number}", &value);
        filled.policy_number = Some(value);
    }
    if filled.query.contains("{claim_number}") {
        let value = random_claim(rng);
        filled.query = filled.query.replace("{claim_number}", &value);
        filled.claim_number = Some(value);
    }
    if filled.query.contains("{policy_type}") {
        let value = pick(rng, &POLICY_TYPES).to_string();
        filled.query = filled.query.replace("{policy_type}", &value);
        filled.policy_type = Some(value);
    }
    if filled.query.contains("{coverage_type}") {
        let value = pick(rng, coverage_words).to_string();
        filled.query = filled.query.replace("{coverage_type}", &value);
        filled.coverage_type = Some(value);
    }
    filled
}

static INTENT_TEMPLATES: [(&str, [&str; 5]); 5] = [
    (
        POLICY_DETAILS,
        [
            "What can you tell me about policy {policy_number}?",
            "I need information about my {policy_type} policy {policy_number}",
            "Show me the policy details for {policy_number}",
            "Tell me about my policy {policy_number}",
            "What are the details of my policy {policy_number}?",
        ],
    ),
    (
        COVERAGE_INQUIRY,
        [
            "What does my {policy_type} policy cover?",
            "Am I covered for {coverage_type} damage?",
            "Does my policy include {coverage_type} coverage?",
            "What are the coverage limits for my {policy_type} insurance?",
            "How much {coverage_type} coverage do I have?",
        ],
    ),
    (
        CLAIM_STATUS,
        [
            "What's happening with my claim {claim_number}?",
            "I want to know the status of my claim {claim_number}",
            "Has claim {claim_number} been processed yet?",
            "What's the latest claim update for {claim_number}?",
            "Is my claim {claim_number} approved?",
        ],
    ),
    (
        PREMIUM_INFORMATION,
        [
            "How much is my premium for {policy_type} insurance?",
            "What's my payment amount for policy {policy_number}?",
            "When is my next premium due for {policy_number}?",
            "Tell me about my {policy_type} insurance premium",
            "How much do I pay for my {policy_type} policy?",
        ],
    ),
    (
        FILING_CLAIM,
        [
            "How do I file a claim for {coverage_type} damage?",
            "I need to file a claim for my {policy_type} policy",
            "What's the process for submitting a claim?",
            "What info do I need to submit a {coverage_type} claim?",
            "I want to report {coverage_type} damage and file a claim",
        ],
    ),
];

fn generate_intent_cases(rng: &mut StdRng, count: usize) -> Vec<TestCase> {
    (0..count)
        .filter_map(|i| {
            let (intent, templates) = INTENT_TEMPLATES.choose(rng)?;
            let template = templates.choose(rng)?;
            let filled = fill(template, rng, &PERILS);
            Some(TestCase::intent(
                &format!("synthetic_intent_{}_{}", intent, i),
                &filled.query,
                Expectation::default().intent(intent).confidence_min(0.6),
            ))
        })
        .collect()
}

static PARAMETER_TEMPLATES: [&str; 10] = [
    "What's covered under my {policy_type} policy {policy_number}?",
    "Tell me the status of claim {claim_number}",
    "I want to know about my {coverage_type} coverage on policy {policy_number}",
    "What is my deductible for {coverage_type} on my {policy_type} insurance?",
    "When was claim {claim_number} filed for my {policy_type} policy?",
    "How much {coverage_type} coverage do I have on policy {policy_number}?",
    "When is my premium due for policy {policy_number}?",
    "I want to file a {coverage_type} damage claim on my {policy_type} insurance",
    "What's my deductible for {coverage_type} on {policy_number}?",
    "Is {coverage_type} damage covered by my {policy_type} policy {policy_number}?",
];

/// 按关键词猜测生成查询的意图
fn likely_intent(query: &str) -> &'static str {
    let lower = query.to_lowercase();
    if lower.contains("policy") && lower.contains("details") {
        POLICY_DETAILS
    } else if lower.contains("coverage") || lower.contains("covered") {
        COVERAGE_INQUIRY
    } else if lower.contains("claim") && (lower.contains("status") || lower.contains("what")) {
        CLAIM_STATUS
    } else if lower.contains("premium") || lower.contains("payment") {
        PREMIUM_INFORMATION
    } else if lower.contains("file") && lower.contains("claim") {
        FILING_CLAIM
    } else {
        UNKNOWN
    }
}

fn generate_parameter_cases(rng: &mut StdRng, count: usize) -> Vec<TestCase> {
    (0..count)
        .filter_map(|i| {
            let template = PARAMETER_TEMPLATES.choose(rng)?;
            let filled = fill(template, rng, &COVERAGE_WORDS);
            let intent = likely_intent(&filled.query);
            let expected = ExpectedParams {
                policy_number: filled.policy_number,
                claim_number: filled.claim_number,
                // 只有保单类查询抽取保单类型
                policy_type: filled.policy_type.filter(|_| intent == POLICY_DETAILS),
                date_reference: None,
                coverage_types: filled.coverage_type.into_iter().collect(),
            };
            Some(TestCase::new(
                format!("synthetic_param_{}", i),
                TestKind::Parameters {
                    query: filled.query,
                    intent: intent.to_string(),
                    expected,
                },
            ))
        })
        .collect()
}

fn generate_graph_cases(rng: &mut StdRng, count: usize) -> Vec<TestCase> {
    let lookup = random_policy(rng);
    let with_coverage = random_policy(rng);
    let candidates = [
        TestCase::new(
            format!("synthetic_graph_policy_lookup_{}", lookup),
            TestKind::Graph {
                query: GraphQuery::new("Policy", "p")
                    .filter(Filter::eq("p.policy_number", lookup.as_str()))
                    .returning(&["p.policy_number", "p.effective_date", "p.expiration_date"]),
                count_min: Some(1),
                count_max: Some(1),
                property_exists: Some("p.effective_date".to_string()),
            },
        ),
        TestCase::new(
            format!("synthetic_graph_policy_coverage_{}", with_coverage),
            TestKind::Graph {
                query: policy_coverages(&with_coverage).returning(&["c.limit"]),
                count_min: Some(1),
                count_max: Some(3),
                property_exists: None,
            },
        ),
        TestCase::new(
            "synthetic_graph_complex_path",
            TestKind::Graph {
                query: claims_by_coverage().returning(&["c.status"]),
                count_min: Some(0),
                count_max: None,
                property_exists: None,
            },
        ),
    ];
    candidates.into_iter().take(count).collect()
}

fn generate_response_cases(rng: &mut StdRng, count: usize) -> Vec<TestCase> {
    let mut cases = Vec::with_capacity(count);
    for i in 0..count {
        let (intent, data): (&str, Vec<(String, String)>) = match rng.random_range(0..5) {
            0 => (
                POLICY_DETAILS,
                vec![
                    ("policy_number".into(), random_policy(rng)),
                    ("policy_type".into(), pick(rng, &["auto", "home", "life", "health"]).into()),
                    ("effective_date".into(), date_offset(-rng.random_range(30..=730))),
                    ("expiration_date".into(), date_offset(rng.random_range(30..=365))),
                    ("status".into(), pick(rng, &["active", "expired", "pending renewal"]).into()),
                ],
            ),
            1 => {
                let count = rng.random_range(1..=3);
                let coverages: Vec<&str> = ["liability", "collision", "comprehensive", "medical", "property"]
                    .choose_multiple(rng, count)
                    .copied()
                    .collect();
                let limit = [100_000u64, 250_000, 500_000, 1_000_000]
                    .choose(rng)
                    .copied()
                    .unwrap_or_default();
                (
                    COVERAGE_INQUIRY,
                    vec![
                        ("coverage_list".into(), coverages.join(", ")),
                        (
                            "limit_info".into(),
                            format!(
                                "The total coverage limit is {}.",
                                crate::utils::text::format_currency(limit as f64)
                            ),
                        ),
                    ],
                )
            }
            2 => (
                CLAIM_STATUS,
                vec![
                    ("claim_number".into(), random_claim(rng)),
                    (
                        "status".into(),
                        pick(rng, &["open", "under review", "approved", "denied", "closed"]).into(),
                    ),
                    ("date_filed".into(), date_offset(-rng.random_range(1..=90))),
                ],
            ),
            3 => (
                PREMIUM_INFORMATION,
                vec![
                    (
                        "amount".into(),
                        crate::utils::text::format_currency(rng.random_range(500..=5000) as f64),
                    ),
                    (
                        "frequency".into(),
                        pick(rng, &["monthly", "quarterly", "semi-annually", "annually"]).into(),
                    ),
                    ("due_date".into(), date_offset(rng.random_range(1..=30))),
                ],
            ),
            _ => (
                FILING_CLAIM,
                vec![
                    (
                        "required_info".into(),
                        "policy information, date and details of incident, photos if applicable".into(),
                    ),
                    ("contact_info".into(), format!("1-800-555-{}", rng.random_range(1000..=9999))),
                ],
            ),
        };

        // 只期望较短的取值出现在回答里
        let expected: Vec<&str> = data
            .iter()
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty() && v.len() < 20)
            .take(3)
            .collect();
        let template_data: Slots = data.iter().cloned().collect();
        cases.push(TestCase::new(
            format!("synthetic_response_{}_{}", intent, i),
            TestKind::Response {
                intent: intent.to_string(),
                template_data,
                expected: Expectation::default().contains(&expected),
            },
        ));
    }
    cases
}

fn generate_edge_cases(rng: &mut StdRng, count: usize) -> Vec<TestCase> {
    let long_query = format!(
        "I need information about my policy, but I'm not sure which one, maybe it's my auto policy or home policy or maybe it's my life insurance policy, I can't remember the policy number but I think it might be P1001 or maybe P1002, and I want to know what it covers and how much my premium is and when it's due and also if I have any claims on it{}",
        " ".repeat(rng.random_range(10..=100))
    );
    let candidates = vec![
        TestCase::query(
            "nonexistent_policy_random",
            &format!("Tell me about policy NONEXISTENT{}", rng.random_range(100..=999)),
            None,
            Expectation::default()
                .success(false)
                .contains(&["couldn't find", "policy"]),
        ),
        TestCase::query("very_long_query", &long_query, None, Expectation::default().success(true)),
        TestCase::query(
            "complex_combined_intent",
            &format!(
                "I want to know my premium for {} and also how to file a claim for water damage",
                random_policy(rng)
            ),
            None,
            Expectation::default().success(true),
        ),
        TestCase::query(
            "missing_context",
            "What is the status?",
            None,
            Expectation::default().contains(&["more details"]),
        ),
        TestCase::query(
            "special_characters",
            &format!("What is the status of claim #{}?%$@", random_claim(rng)),
            None,
            Expectation::default().success(true),
        ),
    ];
    let count = count.min(candidates.len());
    candidates.choose_multiple(rng, count).cloned().collect()
}

fn generate_compliance_cases(rng: &mut StdRng, count: usize) -> Vec<TestCase> {
    let candidates = vec![
        TestCase::compliance(
            "personal_data_protection",
            &format!("Show me my personal information for policy {}", random_policy(rng)),
            None,
            Expectation::default().not_contains(&["social security", "credit card", "password"]),
        ),
        TestCase::compliance(
            "claim_denial_required_disclosure",
            &format!("Why was my claim {} denied?", random_claim(rng)),
            None,
            Expectation::default().contains(&["reason"]),
        ),
        TestCase::compliance(
            "coverage_disclosure",
            &format!("What exactly is covered by my {} policy?", random_policy(rng)),
            None,
            Expectation::default().contains(&["coverage", "limit"]),
        ),
        TestCase::compliance(
            "premium_calculation_transparency",
            &format!("How is my premium calculated for policy {}?", random_policy(rng)),
            None,
            Expectation::default().contains(&["based on"]),
        ),
    ];
    let count = count.min(candidates.len());
    candidates.choose_multiple(rng, count).cloned().collect()
}

struct Persona {
    name: &'static str,
    queries: [&'static str; 5],
    with_account: bool,
    with_claims: bool,
}

static PERSONAS: [Persona; 4] = [
    Persona {
        name: "new_customer",
        queries: [
            "I'm looking at getting insurance with you. What kinds of policies do you offer?",
            "How much would home insurance cost me?",
            "What do I need to provide to get a quote?",
            "How do I apply for insurance?",
            "What discounts are available?",
        ],
        with_account: false,
        with_claims: false,
    },
    Persona {
        name: "existing_customer",
        queries: [
            "Can you tell me what my policy covers?",
            "When is my next payment due?",
            "How much is my deductible?",
            "I want to add another car to my policy, how do I do that?",
            "Has my premium changed since last year?",
        ],
        with_account: true,
        with_claims: false,
    },
    Persona {
        name: "claim_filer",
        queries: [
            "I need to file a claim for damage to my home",
            "What information do I need to provide for my claim?",
            "How long will it take to process my claim?",
            "Do I need to pay my deductible upfront?",
            "Will filing this claim increase my premium?",
        ],
        with_account: true,
        with_claims: false,
    },
    Persona {
        name: "anxious_customer",
        queries: [
            "I need to know if my claim has been approved right away!",
            "My payment is late, will my coverage be cancelled?",
            "I'm not sure if my policy covers this damage, I need to know now!",
            "I can't afford my premium this month, what are my options?",
            "I think there's a mistake on my policy, can you check?",
        ],
        with_account: true,
        with_claims: true,
    },
];

/// 模拟不同用户画像的多轮对话
fn generate_conversations(rng: &mut StdRng, count: usize) -> Vec<TestCase> {
    let policies: Vec<String> = (0..3).map(policy_id).collect();
    let claims: Vec<String> = (0..2).map(claim_id).collect();
    let mut cases = Vec::with_capacity(count);
    for i in 0..count {
        let Some(persona) = PERSONAS.choose(rng) else {
            break;
        };
        let turn_count = rng.random_range(2..=4);
        let mut turns = Vec::with_capacity(turn_count);
        for _ in 0..turn_count {
            let mut query = pick(rng, &persona.queries).to_string();
            if persona.with_account && rng.random_bool(0.5) {
                let policy = policies.choose(rng).cloned().unwrap_or_default();
                query = query.replace("my policy", &format!("my policy {}", policy));
            }
            if persona.with_claims && rng.random_bool(0.5) {
                let claim = claims.choose(rng).cloned().unwrap_or_default();
                query = query.replace("my claim", &format!("my claim {}", claim));
            }
            turns.push(Turn {
                query,
                expected: Expectation::default().success(true),
            });
        }

        let user_context = persona.with_account.then(|| {
            let mut context = UserContext::new(&format!("U{}", 5000 + rng.random_range(0..10)));
            context.known_policies = policies.clone();
            if persona.with_claims {
                context.known_claims = claims.clone();
            }
            context
        });
        cases.push(TestCase::new(
            format!("user_simulation_{}_{}", persona.name, i),
            TestKind::Conversation {
                persona: persona.name.to_string(),
                user_context,
                turns,
            },
        ));
    }
    cases
}

/// 为测试集随机生成额外用例
pub fn generate_cases(suite: Suite, rng: &mut StdRng, count: usize) -> Vec<TestCase> {
    match suite {
        Suite::IntentRecognition => generate_intent_cases(rng, count),
        Suite::ParameterExtraction => generate_parameter_cases(rng, count),
        Suite::GraphQuerying => generate_graph_cases(rng, count),
        Suite::ResponseGeneration => generate_response_cases(rng, count),
        Suite::EndToEnd => generate_conversations(rng, count),
        Suite::EdgeCases => generate_edge_cases(rng, count),
        Suite::Compliance => generate_compliance_cases(rng, count),
    }
}
