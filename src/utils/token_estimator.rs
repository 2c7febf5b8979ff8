use serde::{Deserialize, Serialize};

/// Token估算器，在provider不返回用量时用于统计prompt与输出的token数量
pub struct TokenEstimator {
    rules: TokenCalculationRules,
}

/// Token计算规则
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenCalculationRules {
    /// 拉丁字符的平均token比例（字符数/token数）
    pub latin_char_per_token: f64,
    /// CJK字符的平均token比例
    pub cjk_char_per_token: f64,
    /// 每次请求的固定开销（角色标记等）
    pub base_token_overhead: usize,
}

impl Default for TokenCalculationRules {
    fn default() -> Self {
        Self {
            latin_char_per_token: 4.0,
            cjk_char_per_token: 1.5,
            base_token_overhead: 8,
        }
    }
}

/// Token估算结果
#[derive(Debug, Clone, PartialEq)]
pub struct TokenEstimation {
    pub estimated_tokens: usize,
    pub character_count: usize,
    pub cjk_char_count: usize,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenEstimator {
    pub fn new() -> Self {
        Self {
            rules: TokenCalculationRules::default(),
        }
    }

    pub fn with_rules(rules: TokenCalculationRules) -> Self {
        Self { rules }
    }

    /// 估算文本的token数量，空文本不计开销
    pub fn estimate_tokens(&self, text: &str) -> TokenEstimation {
        let character_count = text.chars().count();
        if character_count == 0 {
            return TokenEstimation {
                estimated_tokens: 0,
                character_count: 0,
                cjk_char_count: 0,
            };
        }

        let cjk_char_count = text.chars().filter(|c| is_cjk_char(*c)).count();
        let latin_count = character_count - cjk_char_count;

        let cjk_tokens = (cjk_char_count as f64 / self.rules.cjk_char_per_token).ceil() as usize;
        let latin_tokens = (latin_count as f64 / self.rules.latin_char_per_token).ceil() as usize;

        TokenEstimation {
            estimated_tokens: cjk_tokens + latin_tokens + self.rules.base_token_overhead,
            character_count,
            cjk_char_count,
        }
    }

    /// 检查文本是否超过token限制
    pub fn exceeds_limit(&self, text: &str, limit: usize) -> bool {
        self.estimate_tokens(text).estimated_tokens > limit
    }
}

fn is_cjk_char(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF |
        0x3400..=0x4DBF |
        0x3040..=0x30FF |
        0xAC00..=0xD7AF |
        0x20000..=0x2A6DF
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_has_no_tokens() {
        let estimator = TokenEstimator::new();
        assert_eq!(estimator.estimate_tokens("").estimated_tokens, 0);
    }

    #[test]
    fn test_latin_text_estimation() {
        let estimator = TokenEstimator::new();
        // 16 chars -> 4 tokens + 8 overhead
        let estimation = estimator.estimate_tokens("abcdefghijklmnop");
        assert_eq!(estimation.character_count, 16);
        assert_eq!(estimation.cjk_char_count, 0);
        assert_eq!(estimation.estimated_tokens, 12);
    }

    #[test]
    fn test_cjk_text_counts_denser() {
        let estimator = TokenEstimator::new();
        let estimation = estimator.estimate_tokens("保险条款");
        assert_eq!(estimation.cjk_char_count, 4);
        // ceil(4 / 1.5) = 3
        assert_eq!(estimation.estimated_tokens, 3 + 8);
    }

    #[test]
    fn test_exceeds_limit() {
        let estimator = TokenEstimator::with_rules(TokenCalculationRules {
            latin_char_per_token: 1.0,
            cjk_char_per_token: 1.0,
            base_token_overhead: 0,
        });
        assert!(estimator.exceeds_limit("abcdef", 5));
        assert!(!estimator.exceeds_limit("abcde", 5));
    }
}
