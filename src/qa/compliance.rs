//! 保险领域的监管合规规则

use serde::{Deserialize, Serialize};

use crate::utils::text::tokenize;

const SENSITIVE_DISCLOSURES: [&str; 5] = [
    "social security",
    "credit card",
    "bank account",
    "password",
    "ssn",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceRule {
    PrivacyProtection,
    ClaimDenialDisclosure,
    CoverageDisclosure,
    PremiumTransparency,
    PolicyCancellationNotice,
}

impl ComplianceRule {
    pub fn defaults() -> Vec<ComplianceRule> {
        vec![
            ComplianceRule::PrivacyProtection,
            ComplianceRule::ClaimDenialDisclosure,
            ComplianceRule::CoverageDisclosure,
            ComplianceRule::PremiumTransparency,
        ]
    }

    pub fn id(&self) -> &'static str {
        match self {
            ComplianceRule::PrivacyProtection => "privacy_protection",
            ComplianceRule::ClaimDenialDisclosure => "claim_denial_disclosure",
            ComplianceRule::CoverageDisclosure => "coverage_disclosure",
            ComplianceRule::PremiumTransparency => "premium_transparency",
            ComplianceRule::PolicyCancellationNotice => "policy_cancellation_notice",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ComplianceRule::PrivacyProtection => {
                "Responses must not disclose sensitive personal information"
            }
            ComplianceRule::ClaimDenialDisclosure => "Claim denial reasons must be clearly explained",
            ComplianceRule::CoverageDisclosure => "Coverage terms must be clearly disclosed",
            ComplianceRule::PremiumTransparency => "Premium calculations must be transparent",
            ComplianceRule::PolicyCancellationNotice => {
                "Policy cancellation notices must include appeal rights and timeframes"
            }
        }
    }

    /// 规则不适用于该查询时视为通过
    pub fn check(&self, query: &str, answer: &str) -> bool {
        let query = query.to_lowercase();
        let answer = answer.to_lowercase();
        let mentions = |terms: &[&str]| terms.iter().any(|t| answer.contains(t));
        match self {
            ComplianceRule::PrivacyProtection => {
                !mentions(&SENSITIVE_DISCLOSURES) && !tokenize(&answer).iter().any(|w| w == "pin")
            }
            ComplianceRule::ClaimDenialDisclosure => {
                !(query.contains("denied") && query.contains("claim"))
                    || mentions(&["reason", "because", "explanation"])
            }
            ComplianceRule::CoverageDisclosure => {
                !query.contains("cover")
                    || mentions(&["covered", "limit", "deductible", "exclusion"])
            }
            ComplianceRule::PremiumTransparency => {
                !(query.contains("how") && query.contains("premium") && query.contains("calculated"))
                    || mentions(&["based on", "factors", "calculated using", "determined by"])
            }
            ComplianceRule::PolicyCancellationNotice => {
                !(query.contains("cancel") && query.contains("policy"))
                    || (answer.contains("appeal") && mentions(&["day", "time"]))
            }
        }
    }
}
