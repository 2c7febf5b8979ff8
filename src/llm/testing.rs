//! 测试用的脚本化模型

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{CompletionOptions, LanguageModel};

/// 按规则返回预设回复的模型
///
/// 规则按顺序匹配user prompt中的子串；都不匹配时依次弹出队列中的回复，队列为空则返回默认回复。
pub struct ScriptedModel {
    name: String,
    rules: Vec<(String, String)>,
    queue: Mutex<VecDeque<Result<String, String>>>,
    fallback: String,
    calls: Mutex<Vec<(String, String)>>,
    options: Mutex<Vec<CompletionOptions>>,
}

impl ScriptedModel {
    pub fn new(fallback: &str) -> Self {
        Self {
            name: "scripted".to_string(),
            rules: Vec::new(),
            queue: Mutex::new(VecDeque::new()),
            fallback: fallback.to_string(),
            calls: Mutex::new(Vec::new()),
            options: Mutex::new(Vec::new()),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn when(mut self, needle: &str, reply: &str) -> Self {
        self.rules.push((needle.to_string(), reply.to_string()));
        self
    }

    pub fn then_reply(self, reply: &str) -> Self {
        self.queue.lock().unwrap().push_back(Ok(reply.to_string()));
        self
    }

    pub fn then_fail(self, error: &str) -> Self {
        self.queue.lock().unwrap().push_back(Err(error.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// 每次调用收到的覆盖选项，普通 `complete` 记为默认值
    pub fn call_options(&self) -> Vec<CompletionOptions> {
        self.options.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_name(&self) -> String {
        self.name.clone()
    }

    async fn complete_with(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String> {
        self.options.lock().unwrap().push(options.clone());
        self.reply(system_prompt, user_prompt)
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.options
            .lock()
            .unwrap()
            .push(CompletionOptions::default());
        self.reply(system_prompt, user_prompt)
    }
}

impl ScriptedModel {
    fn reply(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), user_prompt.to_string()));

        if let Some((_, reply)) = self
            .rules
            .iter()
            .find(|(needle, _)| user_prompt.contains(needle.as_str()))
        {
            return Ok(reply.clone());
        }

        match self.queue.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(error)) => Err(anyhow!(error)),
            None => Ok(self.fallback.clone()),
        }
    }
}
