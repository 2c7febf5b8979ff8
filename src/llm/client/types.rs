use serde::{Deserialize, Serialize};

/// Token使用情况
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// 输入token数量
    pub input_tokens: usize,
    /// 输出token数量
    pub output_tokens: usize,
    /// 总token数量
    pub total_tokens: usize,
}

impl TokenUsage {
    pub fn new(input_tokens: usize, output_tokens: usize) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}
