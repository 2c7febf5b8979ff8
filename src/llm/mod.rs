use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod client;
pub mod interaction;

#[cfg(test)]
pub mod testing;

pub use client::LLMClient;

/// 单次调用的模型与温度覆盖，未设置的字段沿用客户端配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl CompletionOptions {
    pub fn is_default(&self) -> bool {
        self.model.is_none() && self.temperature.is_none()
    }
}

/// 领域模块依赖的最小LLM接口
///
/// 文档抽取、prompt流水线和交互统计都只依赖这个trait，便于替换provider或在测试中注入脚本化实现。
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// 当前使用的模型名称
    fn model_name(&self) -> String;

    /// 单轮补全
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// 带覆盖选项的补全；不支持覆盖的实现直接忽略选项
    async fn complete_with(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<String> {
        self.complete(system_prompt, user_prompt).await
    }
}

#[async_trait]
impl LanguageModel for LLMClient {
    fn model_name(&self) -> String {
        self.efficient_model().to_string()
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.prompt(system_prompt, user_prompt).await
    }

    async fn complete_with(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String> {
        self.prompt_with_options(system_prompt, user_prompt, options)
            .await
    }
}
