//! 需要人工复核时尝试的自动异常处理器

use serde::{Deserialize, Serialize};

use crate::graph::{Direction, Filter, GraphQuery};
use crate::query::intent::{
    CLAIM_STATUS, COVERAGE_INQUIRY, FILING_CLAIM, POLICY_DETAILS, PREMIUM_INFORMATION, UNKNOWN,
};
use crate::query::response::display_value;
use crate::query::{QueryProcessor, QueryResponse, UserContext};
use crate::utils::text::tokenize;

pub const SENSITIVE_INTENTS: [&str; 3] = ["policy_cancellation", "claim_dispute", "coverage_denial"];

pub const SENSITIVE_TERMS: [&str; 8] = [
    "sue",
    "lawsuit",
    "legal",
    "attorney",
    "lawyer",
    "compensation",
    "dispute",
    "complaint",
];

const PRIVACY_TERMS: [&str; 5] = ["ssn", "social security", "credit card", "password", "bank account"];
const GUARANTEE_TERMS: [&str; 5] = ["guarantee", "promise", "always", "never", "certainly"];
/// 学到的处理器遇到这些词时仍然交给人工
const LITIGATION_TERMS: [&str; 4] = ["lawsuit", "legal action", "attorney", "sue"];

/// 未知意图按关键词重新归类，按顺序取第一个命中
const RECLASSIFY_KEYWORDS: [(&str, &str); 8] = [
    ("policy", POLICY_DETAILS),
    ("coverage", COVERAGE_INQUIRY),
    ("cover", COVERAGE_INQUIRY),
    ("claim", CLAIM_STATUS),
    ("premium", PREMIUM_INFORMATION),
    ("payment", PREMIUM_INFORMATION),
    ("file", FILING_CLAIM),
    ("report", FILING_CLAIM),
];

pub const PAYMENT_INFORMATION: &str = "payment_information";

const CLAIM_DENIAL_ANSWER: &str = "I understand you're asking about a denied claim. Claims may be denied for various reasons including policy exclusions, coverage limitations, or incomplete documentation. For specific details about your claim denial, please refer to your denial letter which includes the specific reason and your appeal rights.";
const PRIVACY_ANSWER: &str = "For security and privacy reasons, I can only provide limited personal information through this channel. I can confirm basic policy information, but for detailed personal data, please log in to your secure account portal or contact our customer service.";
const PAYMENT_METHODS_ANSWER: &str = "You can make payments through our website, mobile app, by phone, or by mail. For more details on each method, please visit our payments page or contact customer service.";
const LEARNED_DENIAL_ANSWER: &str = "I understand you're asking about a claim denial. While I can provide general information about our claims process and common reasons for denials, I'd need to review the specific details of your claim. For your specific case, please refer to your denial letter which includes the precise reason and your appeal rights.";

/// 查询是否包含某个敏感词（整词匹配）
pub fn contains_sensitive_terms(query: &str) -> bool {
    tokenize(query)
        .iter()
        .any(|word| SENSITIVE_TERMS.contains(&word.as_str()))
}

/// 检查回答中的合规问题，返回问题描述列表
pub fn check_compliance(query: &str, answer: &str) -> Vec<String> {
    let answer = answer.to_lowercase();
    let query = query.to_lowercase();
    let mut issues = Vec::new();

    if PRIVACY_TERMS.iter().any(|term| answer.contains(term)) {
        issues.push("Potential privacy violation".to_string());
    }
    if answer.contains("denied") && query.contains("claim") && !answer.contains("reason") {
        issues.push("Missing claim denial reason".to_string());
    }
    if GUARANTEE_TERMS.iter().any(|term| answer.contains(term)) {
        issues.push("Contains unsupported guarantees".to_string());
    }
    issues
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExceptionKind {
    MissingPolicyNumber,
    MissingClaimNumber,
    AmbiguousCoverageQuestion,
    UnknownIntent,
    ComplianceIssue,
    PaymentQuestion,
    /// 从升级记录中学到的词，非诉讼语境下可以自动回答
    LearnedTerms { terms: Vec<String>, claim_denial: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionHandler {
    pub name: String,
    pub description: String,
    #[serde(flatten)]
    pub kind: ExceptionKind,
}

impl ExceptionHandler {
    pub fn new(name: &str, description: &str, kind: ExceptionKind) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind,
        }
    }

    pub fn defaults() -> Vec<ExceptionHandler> {
        vec![
            ExceptionHandler::new(
                "missing_policy_number",
                "User query about policy without specifying policy number",
                ExceptionKind::MissingPolicyNumber,
            ),
            ExceptionHandler::new(
                "missing_claim_number",
                "User query about claim without specifying claim number",
                ExceptionKind::MissingClaimNumber,
            ),
            ExceptionHandler::new(
                "ambiguous_coverage_question",
                "Ambiguous question about coverage without specifying type",
                ExceptionKind::AmbiguousCoverageQuestion,
            ),
            ExceptionHandler::new(
                "unknown_intent",
                "Query with unknown intent",
                ExceptionKind::UnknownIntent,
            ),
            ExceptionHandler::new(
                "compliance_issue",
                "Response blocked due to compliance rules",
                ExceptionKind::ComplianceIssue,
            ),
        ]
    }

    pub fn payment_question() -> Self {
        ExceptionHandler::new(
            "payment_question",
            "Questions about payment methods",
            ExceptionKind::PaymentQuestion,
        )
    }

    pub fn matches(&self, query: &str, response: &QueryResponse) -> bool {
        let lower = query.to_lowercase();
        let params = &response.parameters;
        match &self.kind {
            ExceptionKind::MissingPolicyNumber => {
                lower.contains("policy") && !lower.contains("number") && params.policy_number.is_none()
            }
            ExceptionKind::MissingClaimNumber => {
                lower.contains("claim")
                    && !lower.contains("number")
                    && response.intent == CLAIM_STATUS
                    && params.claim_number.is_none()
            }
            ExceptionKind::AmbiguousCoverageQuestion => {
                lower.contains("cover")
                    && response.intent == COVERAGE_INQUIRY
                    && params.coverage_types.is_empty()
            }
            ExceptionKind::UnknownIntent => response.intent == UNKNOWN,
            ExceptionKind::ComplianceIssue => !check_compliance(query, &response.answer).is_empty(),
            ExceptionKind::PaymentQuestion => lower.contains("payment") && lower.contains("method"),
            ExceptionKind::LearnedTerms { terms, .. } => {
                let words = tokenize(query);
                let litigious = LITIGATION_TERMS.iter().any(|t| {
                    if t.contains(' ') {
                        lower.contains(t)
                    } else {
                        words.iter().any(|w| w == t)
                    }
                });
                terms.iter().any(|t| words.contains(t)) && !litigious
            }
        }
    }

    /// 尝试自动处理，无法处理时返回None
    pub fn handle(
        &self,
        processor: &mut QueryProcessor,
        query: &str,
        response: &QueryResponse,
        context: Option<&UserContext>,
    ) -> Option<QueryResponse> {
        match &self.kind {
            ExceptionKind::MissingPolicyNumber => {
                let policy = single(context.map(|c| c.known_policies.as_slice()))?;
                let retried = processor.process_query(&format!("{} for policy {}", query, policy), context);
                retried.success.then_some(retried)
            }
            ExceptionKind::MissingClaimNumber => {
                let claim = single(context.map(|c| c.known_claims.as_slice()))?;
                let retried = processor.process_query(&format!("{} for claim {}", query, claim), context);
                retried.success.then_some(retried)
            }
            ExceptionKind::AmbiguousCoverageQuestion => {
                let policy = response.parameters.policy_number.as_deref()?;
                let coverages = coverage_types_of(processor, policy);
                let answer = if coverages.is_empty() {
                    format!(
                        "Your policy {} typically includes standard coverages such as liability, collision, and comprehensive. Each coverage has its own limit and deductible. Would you like to know about a specific type of coverage?",
                        policy
                    )
                } else {
                    format!(
                        "Your policy {} includes the following coverages: {}. Each coverage has its own limit and deductible. Would you like to know about a specific type of coverage?",
                        policy,
                        coverages.join(", ")
                    )
                };
                Some(rewrite(response, answer, Some(0.85), None))
            }
            ExceptionKind::UnknownIntent => {
                let lower = query.to_lowercase();
                let (_, intent) = RECLASSIFY_KEYWORDS
                    .iter()
                    .find(|(keyword, _)| lower.contains(keyword))?;
                let answer = match *intent {
                    POLICY_DETAILS => "I understand you're asking about your policy details. Could you please specify which policy you're inquiring about?",
                    COVERAGE_INQUIRY => "I understand you're asking about coverage. Could you please specify which type of coverage or which policy you're inquiring about?",
                    CLAIM_STATUS => "I understand you're asking about a claim. Could you please provide the claim number or more details about your claim?",
                    PREMIUM_INFORMATION => "I understand you're asking about your premium or payment. Could you please specify which policy this is regarding?",
                    _ => "I understand you want to file a claim. To assist you with this process, I'll need some information about the incident and your policy.",
                };
                Some(rewrite(response, answer.to_string(), Some(0.7), Some(*intent)))
            }
            ExceptionKind::ComplianceIssue => {
                let lower = query.to_lowercase();
                if lower.contains("claim") && lower.contains("denied") {
                    Some(rewrite(response, CLAIM_DENIAL_ANSWER.to_string(), None, None))
                } else if ["personal", "information", "details"]
                    .iter()
                    .any(|term| lower.contains(term))
                {
                    Some(rewrite(response, PRIVACY_ANSWER.to_string(), None, None))
                } else {
                    None
                }
            }
            ExceptionKind::PaymentQuestion => Some(rewrite(
                response,
                PAYMENT_METHODS_ANSWER.to_string(),
                Some(0.85),
                Some(PAYMENT_INFORMATION),
            )),
            ExceptionKind::LearnedTerms { claim_denial, .. } => claim_denial.then(|| {
                rewrite(
                    response,
                    LEARNED_DENIAL_ANSWER.to_string(),
                    Some(0.8),
                    Some(CLAIM_STATUS),
                )
            }),
        }
    }
}

fn single(ids: Option<&[String]>) -> Option<&String> {
    match ids {
        Some([only]) => Some(only),
        _ => None,
    }
}

fn coverage_types_of(processor: &QueryProcessor, policy: &str) -> Vec<String> {
    let query = GraphQuery::new("Policy", "p")
        .path("p", Some("HAS_COVERAGE"), Direction::Outgoing, "Coverage", "c")
        .filter(Filter::eq("p.policy_number", policy))
        .returning(&["c.type"]);
    processor
        .graph()
        .execute(&query)
        .properties
        .get("c.type")
        .map(|values| values.iter().map(display_value).collect())
        .unwrap_or_default()
}

fn rewrite(
    response: &QueryResponse,
    answer: String,
    confidence: Option<f64>,
    intent: Option<&str>,
) -> QueryResponse {
    let mut rewritten = response.clone();
    rewritten.answer = answer;
    rewritten.success = true;
    if let Some(confidence) = confidence {
        rewritten.confidence = confidence;
    }
    if let Some(intent) = intent {
        rewritten.intent = intent.to_string();
    }
    rewritten
}
