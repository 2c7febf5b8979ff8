//! 查询参数抽取

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::intent::{CLAIM_STATUS, DEFINITION_INQUIRY, POLICY_DETAILS, PREMIUM_INFORMATION};

static POLICY_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bpolicy\s*(?:number|no\.?|#)?\s*[:#]?\s*([a-z]*\d[a-z0-9-]*)")
        .expect("policy number pattern is valid")
});
static BARE_POLICY_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(P\d{3,})\b").expect("bare policy pattern is valid"));
static CLAIM_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bclaim\s*(?:number|no\.?|#)?\s*[:#]?\s*([a-z]*\d[a-z0-9-]*)")
        .expect("claim number pattern is valid")
});
static BARE_CLAIM_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(CL\d{3,})\b").expect("bare claim pattern is valid"));
static DATE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:on|for|from|since)\s+(\d{4}-\d{2}-\d{2}|\d{1,2}[-/]\d{1,2}[-/]\d{2,4}|\d{1,2}\s+(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\s+\d{2,4})",
    )
    .expect("date pattern is valid")
});
static AMOUNT_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:amount|limit|deductible|premium)\s+(?:of\s+)?[$€£]?(\d+(?:,\d+)*(?:\.\d+)?)")
        .expect("amount pattern is valid")
});
static COVERAGE_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(liability|collision|comprehensive|uninsured motorist|personal injury|medical payments|property damage|flood|fire|theft|water damage)\b")
        .expect("coverage type pattern is valid")
});
static POLICY_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(auto|home|life|health|liability|umbrella|commercial)\b")
        .expect("policy type pattern is valid")
});
static STATUS_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(approved|denied|pending|review|progress|decision)\b")
        .expect("status pattern is valid")
});
static PAYMENT_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(payment|payout|reimbursement|check)\b").expect("payment pattern is valid")
});
static DUE_DATE_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(due|next|payment date)\b").expect("due date pattern is valid")
});
static CHANGE_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(increase|decrease|change|changed|different)\b")
        .expect("change pattern is valid")
});
static DEFINITION_TERM: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)what\s+does\s+([\w\s-]+?)\s+mean(?:\?|$)",
        r"(?i)what\s+(?:is|are)\s+([\w\s-]+?)(?:\?|$)",
        r"(?i)define\s+([\w\s-]+?)(?:\?|$)",
        r"(?i)meaning\s+of\s+([\w\s-]+?)(?:\?|$)",
        r"(?i)definition\s+of\s+([\w\s-]+?)(?:\?|$)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("definition term pattern is valid"))
    .collect()
});
static QUESTION_NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:what\s+(?:is|are|does)|means?|definition|of|the)\b|\?")
        .expect("question noise pattern is valid")
});

pub const COVERAGE_TYPES: [&str; 11] = [
    "liability",
    "collision",
    "comprehensive",
    "uninsured motorist",
    "personal injury",
    "medical payments",
    "property damage",
    "flood",
    "fire",
    "theft",
    "water damage",
];

pub const POLICY_TYPES: [&str; 7] = [
    "auto",
    "home",
    "life",
    "health",
    "liability",
    "umbrella",
    "commercial",
];

/// 调用方提供的用户上下文
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub known_policies: Vec<String>,
    #[serde(default)]
    pub known_claims: Vec<String>,
}

impl UserContext {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            ..Default::default()
        }
    }

    pub fn with_policies(mut self, policies: &[&str]) -> Self {
        self.known_policies = policies.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_claims(mut self, claims: &[&str]) -> Self {
        self.known_claims = claims.iter().map(|c| c.to_string()).collect();
        self
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub known_policies: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub known_claims: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coverage_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_type: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub status_inquiry: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub payment_inquiry: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub due_date_inquiry: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub premium_change_inquiry: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// 按列表顺序返回文本中出现的关键词
fn keywords_in(re: &Regex, text: &str, ordered: &[&str]) -> Vec<String> {
    let found: Vec<String> = re
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect();
    ordered
        .iter()
        .filter(|k| found.iter().any(|f| f == *k))
        .map(|k| k.to_string())
        .collect()
}

fn strip_article(term: &str) -> &str {
    for article in ["a ", "an ", "the "] {
        if let Some(rest) = term.strip_prefix(article) {
            return rest.trim_start();
        }
    }
    term
}

/// 定义类问题中的术语
pub fn extract_term(text: &str) -> String {
    let captured = DEFINITION_TERM
        .iter()
        .find_map(|re| capture(re, text))
        .map(|t| t.trim().to_lowercase());
    let term = match captured {
        Some(term) if !term.is_empty() => term,
        _ => QUESTION_NOISE.replace_all(text, "").trim().to_lowercase(),
    };
    strip_article(&term).to_string()
}

pub fn extract_parameters(text: &str, intent: &str, context: Option<&UserContext>) -> QueryParameters {
    let mut params = QueryParameters::default();

    if let Some(context) = context {
        params.user_id = context.user_id.clone();
        params.known_policies = context.known_policies.clone();
        params.known_claims = context.known_claims.clone();
    }

    params.claim_number = capture(&CLAIM_NUMBER, text)
        .or_else(|| capture(&BARE_CLAIM_NUMBER, text))
        .map(|c| c.to_uppercase());
    params.policy_number = capture(&POLICY_NUMBER, text)
        .or_else(|| capture(&BARE_POLICY_NUMBER, text))
        .map(|p| p.to_uppercase())
        .filter(|p| params.claim_number.as_ref() != Some(p));

    if params.policy_number.is_none() && params.known_policies.len() == 1 {
        params.policy_number = params.known_policies.first().cloned();
    }
    if params.claim_number.is_none() && params.known_claims.len() == 1 {
        params.claim_number = params.known_claims.first().cloned();
    }

    params.date_reference = capture(&DATE_REFERENCE, text);
    params.amount_reference = capture(&AMOUNT_REFERENCE, text).map(|a| a.replace(',', ""));
    params.coverage_types = keywords_in(&COVERAGE_TYPE, text, &COVERAGE_TYPES);

    match intent {
        POLICY_DETAILS => {
            params.policy_type = keywords_in(&POLICY_TYPE, text, &POLICY_TYPES).into_iter().next();
        }
        CLAIM_STATUS => {
            params.status_inquiry = STATUS_WORDS.is_match(text);
            params.payment_inquiry = PAYMENT_WORDS.is_match(text);
        }
        PREMIUM_INFORMATION => {
            params.due_date_inquiry = DUE_DATE_WORDS.is_match(text);
            params.premium_change_inquiry = CHANGE_WORDS.is_match(text);
        }
        DEFINITION_INQUIRY => {
            params.term = Some(extract_term(text)).filter(|t| !t.is_empty());
        }
        _ => {}
    }

    params
}
