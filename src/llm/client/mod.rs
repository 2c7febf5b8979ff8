//! LLM客户端 - 提供统一的LLM服务接口

use anyhow::{Result, anyhow};
use std::future::Future;
use std::time::Duration;

use crate::config::LLMConfig;
use crate::llm::CompletionOptions;
use crate::llm::client::utils::evaluate_befitting_model;

mod providers;
pub mod types;
pub mod utils;

use providers::ProviderClient;

/// LLM客户端 - 提供统一的LLM服务接口
#[derive(Clone)]
pub struct LLMClient {
    config: LLMConfig,
    client: ProviderClient,
}

impl LLMClient {
    /// 创建新的LLM客户端
    pub fn new(config: LLMConfig) -> Result<Self> {
        let client = ProviderClient::new(&config)?;
        Ok(Self { client, config })
    }

    pub fn efficient_model(&self) -> &str {
        &self.config.model_efficient
    }

    /// 检查模型连接和功能是否正常
    pub async fn check_connection(&self) -> Result<()> {
        println!("🔄 正在检查模型连接...");
        match self
            .prompt_once(
                &self.config.model_efficient,
                "You are a helpful assistant.",
                "Please respond with 'API connection successful.'",
            )
            .await
        {
            Ok(_) => {
                println!("✅ 模型连接正常");
                Ok(())
            }
            Err(e) => {
                eprintln!("❌ 模型连接失败: {}", e);
                Err(e)
            }
        }
    }

    /// 通用重试逻辑，用于处理异步操作的重试机制
    async fn retry_with_backoff<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, anyhow::Error>>,
    {
        let max_retries = self.config.retry_attempts.max(1);
        let retry_delay_ms = self.config.retry_delay_ms;
        let mut retries = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    retries += 1;
                    tracing::warn!(
                        attempt = retries,
                        max_retries,
                        error = %err,
                        "LLM call failed"
                    );
                    if retries >= max_retries {
                        return Err(err);
                    }
                    tokio::time::sleep(Duration::from_millis(retry_delay_ms)).await;
                }
            }
        }
    }

    /// 单次请求，带超时
    async fn prompt_once(&self, model: &str, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let agent = self.client.create_agent(model, system_prompt, &self.config)?;
        let timeout = Duration::from_secs(self.config.timeout_seconds);
        match tokio::time::timeout(timeout, agent.prompt(user_prompt)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "LLM request timed out after {}s",
                self.config.timeout_seconds
            )),
        }
    }

    /// 按调用覆盖温度和模型；指定模型时不做备选模型切换
    pub async fn prompt_with_options(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String> {
        if options.is_default() {
            return self.prompt(system_prompt, user_prompt).await;
        }

        let mut tuned = self.clone();
        if let Some(temperature) = options.temperature {
            tuned.config.temperature = temperature;
        }
        match options.model.as_deref() {
            Some(model) => {
                tuned
                    .retry_with_backoff(|| tuned.prompt_once(model, system_prompt, user_prompt))
                    .await
            }
            None => tuned.prompt(system_prompt, user_prompt).await,
        }
    }

    /// 单轮对话；efficient模型重试失败后切换到powerful模型，并把错误信息附加到prompt中
    pub async fn prompt(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let (befitting_model, fallover_model) =
            evaluate_befitting_model(&self.config, system_prompt, user_prompt);

        let first = self
            .retry_with_backoff(|| self.prompt_once(&befitting_model, system_prompt, user_prompt))
            .await;

        match (first, fallover_model) {
            (Ok(reply), _) => Ok(reply),
            (Err(e), Some(model)) => {
                eprintln!(
                    "❌ 调用模型服务出错，尝试 {} 次均失败，尝试使用备选模型{}...{}",
                    self.config.retry_attempts, model, e
                );
                let user_prompt_with_fixer = format!(
                    "{}\n\nNote: a previous attempt failed with the error \"{}\". Avoid repeating it.",
                    user_prompt, e
                );
                self.retry_with_backoff(|| {
                    self.prompt_once(&model, system_prompt, &user_prompt_with_fixer)
                })
                .await
            }
            (Err(e), None) => {
                eprintln!(
                    "❌ 调用模型服务出错，尝试 {} 次均失败...{}",
                    self.config.retry_attempts, e
                );
                Err(e)
            }
        }
    }
}
