//! 意图识别：正则模式优先，词袋余弦相似度兜底

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use crate::utils::text::{content_words, cosine_similarity};

pub const POLICY_DETAILS: &str = "policy_details";
pub const COVERAGE_INQUIRY: &str = "coverage_inquiry";
pub const CLAIM_STATUS: &str = "claim_status";
pub const PREMIUM_INFORMATION: &str = "premium_information";
pub const FILING_CLAIM: &str = "filing_claim";
pub const DEFINITION_INQUIRY: &str = "definition_inquiry";
pub const UNKNOWN: &str = "unknown";

/// 模式匹配时的意图优先级，匹配数相同时靠前者胜出
pub const KNOWN_INTENTS: [&str; 6] = [
    POLICY_DETAILS,
    COVERAGE_INQUIRY,
    CLAIM_STATUS,
    PREMIUM_INFORMATION,
    FILING_CLAIM,
    DEFINITION_INQUIRY,
];

/// 相似度低于该值时判定为unknown
pub const SIMILARITY_THRESHOLD: f64 = 0.6;

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("intent pattern is valid"))
        .collect()
}

static INTENT_PATTERNS: LazyLock<Vec<(&'static str, Vec<Regex>)>> = LazyLock::new(|| {
    vec![
        (
            POLICY_DETAILS,
            compile(&[
                r"(?i)policy\s+details",
                r"(?i)details\s+(?:of|on|for|about)\s+(?:my|the|a)\s+policy",
                r"(?i)information\s+about\s+(?:my|a|the)\s+policy",
                r"(?i)what\s+(?:is|are)\s+(?:in|on|the)\s+(?:my|the)\s+policy",
                r"(?i)tell\s+me\s+about\s+(?:my|a|the)\s+policy",
            ]),
        ),
        (
            COVERAGE_INQUIRY,
            compile(&[
                r"(?i)what\s+(?:is|does)\s+(?:my|the)\s+policy\s+cover",
                r"(?i)coverage\s+(?:details|information)",
                r"(?i)what\s+(?:are|is)\s+(?:my|the)\s+coverage",
                r"(?i)covered\s+under\s+(?:my|the)\s+policy",
            ]),
        ),
        (
            CLAIM_STATUS,
            compile(&[
                r"(?i)status\s+of\s+(?:my|the|a)\s+claim",
                r"(?i)claim\s+(?:status|update|progress)",
                r"(?i)what's\s+happening\s+with\s+(?:my|the)\s+claim",
                r"(?i)where\s+is\s+(?:my|the)\s+claim",
            ]),
        ),
        (
            PREMIUM_INFORMATION,
            compile(&[
                r"(?i)(?:my|the)\s+premium",
                r"(?i)how\s+much\s+(?:is|does|do)\s+(?:my|the|I)\s+(?:premium|pay|cost)",
                r"(?i)payment\s+(?:amount|details|schedule)",
                r"(?i)when\s+(?:is|are)\s+(?:my|the)\s+payment",
            ]),
        ),
        (
            FILING_CLAIM,
            compile(&[
                r"(?i)(?:how|can|do)\s+(?:to|I|you)\s+file\s+a\s+claim",
                r"(?i)(?:submit|start|begin|initiate)\s+a\s+(?:new|)\s*claim",
                r"(?i)claim\s+(?:filing|submission)\s+process",
                r"(?i)report\s+(?:a|an|the)\s+(?:accident|incident|loss|damage)",
            ]),
        ),
        (
            DEFINITION_INQUIRY,
            compile(&[
                r"(?i)^what\s+(?:is|are)\s+([\w\s-]+?)(?:\?|$)",
                r"(?i)^what\s+does\s+([\w\s-]+?)\s+mean(?:\?|$)",
                r"(?i)^define\s+([\w\s-]+?)(?:\?|$)",
                r"(?i)^meaning\s+of\s+([\w\s-]+?)(?:\?|$)",
                r"(?i)^definition\s+of\s+([\w\s-]+?)(?:\?|$)",
            ]),
        ),
    ]
});

/// 各意图的示例问题
pub fn default_examples() -> BTreeMap<String, Vec<String>> {
    let examples: [(&str, &[&str]); 6] = [
        (
            POLICY_DETAILS,
            &[
                "What are the details of my policy?",
                "Can you tell me about policy P12345?",
                "I need information about my insurance policy",
                "Show me my policy details",
                "What does my policy say?",
            ],
        ),
        (
            COVERAGE_INQUIRY,
            &[
                "What does my policy cover?",
                "Am I covered for water damage?",
                "What is the coverage limit for my car insurance?",
                "Does my policy include liability coverage?",
                "What types of coverage do I have?",
            ],
        ),
        (
            CLAIM_STATUS,
            &[
                "What's the status of my claim?",
                "Has my claim been processed yet?",
                "I'd like an update on claim C67890",
                "Where is my claim in the process?",
                "Has a decision been made on my claim?",
            ],
        ),
        (
            PREMIUM_INFORMATION,
            &[
                "How much is my premium?",
                "When is my next premium payment due?",
                "Can you tell me about my payment schedule?",
                "What's the amount of my monthly premium?",
                "Has my premium changed recently?",
            ],
        ),
        (
            FILING_CLAIM,
            &[
                "How do I file a claim?",
                "I want to report an accident",
                "What's the process for submitting a claim?",
                "I need to start a new claim",
                "Steps to file an insurance claim",
            ],
        ),
        (
            DEFINITION_INQUIRY,
            &[
                "What does deductible mean?",
                "Define bodily injury",
                "What is the meaning of residence premises?",
            ],
        ),
    ];
    examples
        .into_iter()
        .map(|(intent, list)| {
            (
                intent.to_string(),
                list.iter().map(|s| s.to_string()).collect(),
            )
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentMethod {
    Pattern,
    Similarity,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentAnalysis {
    pub intent: String,
    pub confidence: f64,
    pub method: IntentMethod,
}

/// 每个意图命中的模式数量
pub fn pattern_matches(text: &str) -> Vec<(&'static str, usize)> {
    INTENT_PATTERNS
        .iter()
        .map(|(intent, patterns)| (*intent, patterns.iter().filter(|p| p.is_match(text)).count()))
        .filter(|(_, count)| *count > 0)
        .collect()
}

fn bag_of_words(text: &str) -> HashMap<String, f64> {
    let mut bag = HashMap::new();
    for word in content_words(text) {
        *bag.entry(word).or_insert(0.0) += 1.0;
    }
    bag
}

/// 查询与各意图示例的最高余弦相似度
pub fn similarity_scores(text: &str, examples: &BTreeMap<String, Vec<String>>) -> BTreeMap<String, f64> {
    let query = bag_of_words(text);
    examples
        .iter()
        .map(|(intent, list)| {
            let best = list
                .iter()
                .map(|example| cosine_similarity(&query, &bag_of_words(example)))
                .fold(0.0, f64::max);
            (intent.clone(), best)
        })
        .collect()
}

pub fn analyze_intent(text: &str, examples: &BTreeMap<String, Vec<String>>) -> IntentAnalysis {
    let mut best: Option<(&str, usize)> = None;
    for (intent, count) in pattern_matches(text) {
        if best.is_none_or(|(_, current)| count > current) {
            best = Some((intent, count));
        }
    }
    if let Some((intent, count)) = best {
        return IntentAnalysis {
            intent: intent.to_string(),
            confidence: (7 + count).min(9) as f64 / 10.0,
            method: IntentMethod::Pattern,
        };
    }

    let mut top: Option<(String, f64)> = None;
    for (intent, score) in similarity_scores(text, examples) {
        if top.as_ref().is_none_or(|(_, current)| score > *current) {
            top = Some((intent, score));
        }
    }
    match top {
        Some((intent, score)) if score >= SIMILARITY_THRESHOLD => IntentAnalysis {
            intent,
            confidence: score,
            method: IntentMethod::Similarity,
        },
        Some((_, score)) => IntentAnalysis {
            intent: UNKNOWN.to_string(),
            confidence: 1.0 - score,
            method: IntentMethod::Default,
        },
        None => IntentAnalysis {
            intent: UNKNOWN.to_string(),
            confidence: 0.0,
            method: IntentMethod::Default,
        },
    }
}
