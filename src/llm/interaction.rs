//! 模型交互管理 - 记录每次调用的token与耗时，并支持模型评估与对比

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::llm::{CompletionOptions, LanguageModel};
use crate::llm::client::types::TokenUsage;
use crate::llm::client::utils::estimate_token_usage;

/// 单次调用记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub id: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    pub system_prompt: String,
    pub prompt: String,
    pub response: Option<String>,
    pub token_usage: TokenUsage,
    pub elapsed_ms: u64,
    pub tokens_per_second: f64,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// 模型评估结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEvaluation {
    pub model_name: String,
    pub prompt: String,
    pub response: String,
    pub metrics: BTreeMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

/// 自定义评估函数：(prompt, response) -> 指标
pub type Evaluator<'a> = &'a dyn Fn(&str, &str) -> BTreeMap<String, f64>;

/// 关键词命中率评估
pub fn keyword_evaluator(keywords: Vec<String>) -> impl Fn(&str, &str) -> BTreeMap<String, f64> {
    move |_prompt, response| {
        let lower = response.to_lowercase();
        let hits = keywords
            .iter()
            .filter(|k| lower.contains(&k.to_lowercase()))
            .count();
        let rate = if keywords.is_empty() {
            0.0
        } else {
            hits as f64 / keywords.len() as f64
        };
        BTreeMap::from([("keyword_hit_rate".to_string(), rate)])
    }
}

pub struct ModelInteractionManager {
    model: Arc<dyn LanguageModel>,
    history: Vec<InteractionRecord>,
    evaluations: Vec<ModelEvaluation>,
}

impl ModelInteractionManager {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            history: Vec::new(),
            evaluations: Vec::new(),
        }
    }

    pub fn history(&self) -> &[InteractionRecord] {
        &self.history
    }

    pub fn evaluations(&self) -> &[ModelEvaluation] {
        &self.evaluations
    }

    /// 使用默认模型执行一次补全
    pub async fn run_completion(&mut self, system_prompt: &str, prompt: &str) -> Result<String> {
        self.run_completion_with_options(system_prompt, prompt, &CompletionOptions::default())
            .await
    }

    /// 带模型/温度覆盖执行一次补全
    pub async fn run_completion_with_options(
        &mut self,
        system_prompt: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String> {
        let model = self.model.clone();
        self.run_completion_with(model.as_ref(), system_prompt, prompt, options)
            .await
    }

    async fn run_completion_with(
        &mut self,
        model: &dyn LanguageModel,
        system_prompt: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String> {
        let started = Instant::now();
        let outcome = model.complete_with(system_prompt, prompt, options).await;
        let model_name = options.model.clone().unwrap_or_else(|| model.model_name());
        let elapsed = started.elapsed();

        let input = format!("{}\n{}", system_prompt, prompt);
        let (response, error) = match &outcome {
            Ok(text) => (Some(text.clone()), None),
            Err(e) => (None, Some(e.to_string())),
        };
        let token_usage = estimate_token_usage(&input, response.as_deref().unwrap_or_default());
        let secs = elapsed.as_secs_f64();
        let tokens_per_second = if secs > 0.0 && response.is_some() {
            token_usage.total_tokens as f64 / secs
        } else {
            0.0
        };

        match &error {
            None => tracing::info!(
                model = %model_name,
                tokens = token_usage.total_tokens,
                elapsed_ms = elapsed.as_millis() as u64,
                "completion succeeded"
            ),
            Some(e) => tracing::error!(model = %model_name, error = %e, "completion failed"),
        }

        self.history.push(InteractionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            model: model_name,
            temperature: options.temperature,
            system_prompt: system_prompt.to_string(),
            prompt: prompt.to_string(),
            response,
            token_usage,
            elapsed_ms: elapsed.as_millis() as u64,
            tokens_per_second,
            success: error.is_none(),
            error,
            timestamp: Utc::now(),
        });

        outcome
    }

    /// 评估默认模型在某个prompt上的表现
    pub async fn evaluate_model(
        &mut self,
        system_prompt: &str,
        prompt: &str,
        evaluator: Option<Evaluator<'_>>,
    ) -> ModelEvaluation {
        let model = self.model.clone();
        self.evaluate_with(model.as_ref(), system_prompt, prompt, evaluator)
            .await
    }

    async fn evaluate_with(
        &mut self,
        model: &dyn LanguageModel,
        system_prompt: &str,
        prompt: &str,
        evaluator: Option<Evaluator<'_>>,
    ) -> ModelEvaluation {
        let outcome = self
            .run_completion_with(model, system_prompt, prompt, &CompletionOptions::default())
            .await;

        let mut metrics = BTreeMap::new();
        if let Some(record) = self.history.last() {
            metrics.insert(
                "prompt_tokens".to_string(),
                record.token_usage.input_tokens as f64,
            );
            metrics.insert(
                "response_tokens".to_string(),
                record.token_usage.output_tokens as f64,
            );
            metrics.insert("elapsed_ms".to_string(), record.elapsed_ms as f64);
            metrics.insert("tokens_per_second".to_string(), record.tokens_per_second);
        }
        metrics.insert(
            "success".to_string(),
            if outcome.is_ok() { 1.0 } else { 0.0 },
        );

        let response = outcome.unwrap_or_default();
        if let Some(evaluate) = evaluator
            && !response.is_empty()
        {
            metrics.extend(evaluate(prompt, &response));
        }

        let evaluation = ModelEvaluation {
            model_name: model.model_name(),
            prompt: prompt.to_string(),
            response,
            metrics,
            timestamp: Utc::now(),
        };
        self.evaluations.push(evaluation.clone());
        evaluation
    }

    /// 在同一个prompt上对比多个模型
    pub async fn compare_models(
        &mut self,
        models: &[Arc<dyn LanguageModel>],
        system_prompt: &str,
        prompt: &str,
        evaluator: Option<Evaluator<'_>>,
    ) -> Vec<ModelEvaluation> {
        let mut evaluations = Vec::with_capacity(models.len());
        for model in models {
            evaluations.push(
                self.evaluate_with(model.as_ref(), system_prompt, prompt, evaluator)
                    .await,
            );
        }
        evaluations
    }

    pub fn export_history(&self, path: &Path) -> Result<()> {
        write_json(path, &self.history)
    }

    pub fn export_evaluations(&self, path: &Path) -> Result<()> {
        write_json(path, &self.evaluations)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content).context(format!("Failed to write {:?}", path))
}
