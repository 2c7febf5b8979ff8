//! Prompt模板注册表与流水线

use anyhow::{Context, Result};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

use crate::llm::CompletionOptions;
use crate::llm::interaction::ModelInteractionManager;

pub mod builtin;

const REGISTRY_FILE: &str = "registry.json";
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:(\$)|([_A-Za-z][_A-Za-z0-9]*)|\{([_A-Za-z][_A-Za-z0-9]*)\})")
        .expect("placeholder regex is valid")
});

#[derive(Debug, Error, PartialEq)]
pub enum PromptError {
    #[error("template '{0}' not found")]
    MissingTemplate(String),
    #[error("pipeline '{0}' not found")]
    MissingPipeline(String),
    #[error("pipeline '{0}' has no steps")]
    EmptyPipeline(String),
}

/// 模板元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// 以 `$var` / `${var}` 为占位符的prompt模板
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub template: String,
    #[serde(default)]
    pub metadata: PromptMetadata,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            metadata: PromptMetadata::default(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.metadata.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = Some(description.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.metadata.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.metadata.temperature = Some(temperature);
        self
    }

    pub fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            model: self.metadata.model.clone(),
            temperature: self.metadata.temperature,
        }
    }

    /// 安全替换：未提供的变量原样保留，`$$` 输出为 `$`
    pub fn format(&self, vars: &BTreeMap<String, String>) -> String {
        PLACEHOLDER
            .replace_all(&self.template, |caps: &Captures| {
                if caps.get(1).is_some() {
                    return "$".to_string();
                }
                let name = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str());
                match name.and_then(|n| vars.get(n)) {
                    Some(value) => value.clone(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    /// 模板中引用到的变量名（去重，按出现顺序）
    pub fn placeholders(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for caps in PLACEHOLDER.captures_iter(&self.template) {
            if let Some(name) = caps.get(2).or_else(|| caps.get(3))
                && !names.iter().any(|n| n == name.as_str())
            {
                names.push(name.as_str().to_string());
            }
        }
        names
    }
}

/// 按顺序执行的模板序列；第j步可以引用 `$result_0` .. `$result_{j-1}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptPipeline {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub templates: Vec<PromptTemplate>,
}

/// 流水线执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub pipeline: String,
    pub outputs: Vec<String>,
}

impl PipelineRun {
    pub fn final_output(&self) -> Option<&str> {
        self.outputs.last().map(String::as_str)
    }
}

impl PromptPipeline {
    pub fn new(name: impl Into<String>, templates: Vec<PromptTemplate>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            templates,
        }
    }

    pub async fn execute(
        &self,
        manager: &mut ModelInteractionManager,
        vars: &BTreeMap<String, String>,
    ) -> Result<PipelineRun> {
        if self.templates.is_empty() {
            return Err(PromptError::EmptyPipeline(self.name.clone()).into());
        }

        let mut variables = vars.clone();
        let mut outputs: Vec<String> = Vec::with_capacity(self.templates.len());

        for (step, template) in self.templates.iter().enumerate() {
            // 先注入前序结果再格式化，保证当前步骤能引用所有前序输出
            for (j, output) in outputs.iter().enumerate() {
                variables.insert(format!("result_{}", j), output.clone());
            }
            let prompt = template.format(&variables);
            let system_prompt = template
                .metadata
                .system_prompt
                .as_deref()
                .unwrap_or(DEFAULT_SYSTEM_PROMPT);

            tracing::debug!(pipeline = %self.name, step, "executing prompt step");
            let output = manager
                .run_completion_with_options(system_prompt, &prompt, &template.completion_options())
                .await
                .with_context(|| format!("pipeline '{}' failed at step {}", self.name, step))?;
            outputs.push(output);
        }

        Ok(PipelineRun {
            pipeline: self.name.clone(),
            outputs,
        })
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    templates: BTreeMap<String, PromptTemplate>,
    #[serde(default)]
    pipelines: BTreeMap<String, PromptPipeline>,
}

/// 持久化在 `<dir>/registry.json` 中的模板与流水线注册表
pub struct PromptRegistry {
    path: PathBuf,
    templates: BTreeMap<String, PromptTemplate>,
    pipelines: BTreeMap<String, PromptPipeline>,
}

impl PromptRegistry {
    /// 打开注册表，文件不存在时为空注册表
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(REGISTRY_FILE);
        let file = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .context(format!("Failed to read prompt registry: {:?}", path))?;
            serde_json::from_str::<RegistryFile>(&content)
                .context(format!("Failed to parse prompt registry: {:?}", path))?
        } else {
            RegistryFile::default()
        };

        tracing::debug!(
            templates = file.templates.len(),
            pipelines = file.pipelines.len(),
            "prompt registry loaded"
        );

        Ok(Self {
            path,
            templates: file.templates,
            pipelines: file.pipelines,
        })
    }

    /// 打开注册表并补齐内置模板
    pub fn open_with_builtins(dir: &Path) -> Result<Self> {
        let mut registry = Self::open(dir)?;
        let mut changed = false;
        for (name, template) in builtin::templates() {
            if !registry.templates.contains_key(name) {
                registry.templates.insert(name.to_string(), template);
                changed = true;
            }
        }
        for (name, description, steps) in builtin::pipelines() {
            if !registry.pipelines.contains_key(name) {
                let templates = registry.resolve_steps(steps)?;
                let mut pipeline = PromptPipeline::new(name, templates);
                pipeline.description = description.to_string();
                registry.pipelines.insert(name.to_string(), pipeline);
                changed = true;
            }
        }
        if changed {
            registry.save()?;
        }
        Ok(registry)
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = RegistryFile {
            templates: self.templates.clone(),
            pipelines: self.pipelines.clone(),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&file)?)
            .context(format!("Failed to write prompt registry: {:?}", self.path))
    }

    pub fn register_template(&mut self, name: &str, template: PromptTemplate) -> Result<()> {
        self.templates.insert(name.to_string(), template);
        self.save()
    }

    pub fn register_pipeline(&mut self, pipeline: PromptPipeline) -> Result<()> {
        self.pipelines.insert(pipeline.name.clone(), pipeline);
        self.save()
    }

    pub fn get_template(&self, name: &str) -> Option<&PromptTemplate> {
        self.templates.get(name)
    }

    pub fn get_pipeline(&self, name: &str) -> Option<&PromptPipeline> {
        self.pipelines.get(name)
    }

    pub fn require_pipeline(&self, name: &str) -> Result<&PromptPipeline, PromptError> {
        self.pipelines
            .get(name)
            .ok_or_else(|| PromptError::MissingPipeline(name.to_string()))
    }

    pub fn template_names(&self) -> Vec<&str> {
        self.templates.keys().map(String::as_str).collect()
    }

    pub fn pipeline_names(&self) -> Vec<&str> {
        self.pipelines.keys().map(String::as_str).collect()
    }

    fn resolve_steps(&self, steps: &[&str]) -> Result<Vec<PromptTemplate>, PromptError> {
        steps
            .iter()
            .map(|step| {
                self.templates
                    .get(*step)
                    .cloned()
                    .ok_or_else(|| PromptError::MissingTemplate(step.to_string()))
            })
            .collect()
    }

    /// 由已注册的模板组装流水线并保存
    pub fn create_pipeline(&mut self, name: &str, steps: &[&str]) -> Result<PromptPipeline> {
        let templates = self.resolve_steps(steps)?;
        let pipeline = PromptPipeline::new(name, templates);
        self.register_pipeline(pipeline.clone())?;
        Ok(pipeline)
    }
}
