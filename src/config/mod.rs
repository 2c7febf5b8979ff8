use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "insurance-rag.toml";

/// LLM Provider类型
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub enum LLMProvider {
    #[serde(rename = "openai")]
    #[default]
    OpenAI,
    #[serde(rename = "moonshot")]
    Moonshot,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "mistral")]
    Mistral,
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "ollama")]
    Ollama,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::Moonshot => write!(f, "moonshot"),
            LLMProvider::DeepSeek => write!(f, "deepseek"),
            LLMProvider::Mistral => write!(f, "mistral"),
            LLMProvider::OpenRouter => write!(f, "openrouter"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::Gemini => write!(f, "gemini"),
            LLMProvider::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for LLMProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LLMProvider::OpenAI),
            "moonshot" => Ok(LLMProvider::Moonshot),
            "deepseek" => Ok(LLMProvider::DeepSeek),
            "mistral" => Ok(LLMProvider::Mistral),
            "openrouter" => Ok(LLMProvider::OpenRouter),
            "anthropic" => Ok(LLMProvider::Anthropic),
            "gemini" => Ok(LLMProvider::Gemini),
            "ollama" => Ok(LLMProvider::Ollama),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// 应用程序配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    /// 原始文档目录
    pub data_dir: PathBuf,

    /// 输出目录（知识图谱、schema、报告、系统状态）
    pub output_dir: PathBuf,

    /// 是否启用详细日志
    pub verbose: bool,

    /// 日志配置
    pub logging: LoggingConfig,

    /// LLM模型配置
    pub llm: LLMConfig,

    /// 缓存配置
    pub cache: CacheConfig,

    /// 文档处理配置
    pub documents: DocumentConfig,

    /// Schema演化配置
    pub schema: SchemaConfig,

    /// 自动化测试配置
    pub qa: QaConfig,

    /// 自动决策配置
    pub automation: AutomationConfig,

    /// Prompt注册表配置
    pub prompts: PromptConfig,
}

/// 日志配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别 (trace, debug, info, warn, error)
    pub level: String,

    /// 日志文件名，相对于output_dir；为空时只输出到终端
    pub file: Option<String>,
}

/// LLM模型配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LLMConfig {
    /// LLM Provider类型
    pub provider: LLMProvider,

    /// LLM API KEY
    pub api_key: String,

    /// LLM API基地址
    pub api_base_url: String,

    /// 高能效模型，优先用于常规的抽取任务
    pub model_efficient: String,

    /// 高质量模型，用于长文本以及作为efficient失效情况下的兜底
    pub model_powerful: String,

    /// 最大tokens
    pub max_tokens: u32,

    /// 温度
    pub temperature: f64,

    /// 重试次数
    pub retry_attempts: u32,

    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,

    /// 超时时间（秒）
    pub timeout_seconds: u64,
}

/// 缓存配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    /// 是否启用缓存
    pub enabled: bool,

    /// 缓存目录
    pub cache_dir: PathBuf,

    /// 缓存过期时间（小时）
    pub expire_hours: u64,
}

/// 文档处理配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DocumentConfig {
    /// 每个送往LLM的文本块大小（字符）
    pub chunk_size: usize,

    /// 判断是否为保险文档时读取的样本长度（字符）
    pub sample_chars: usize,

    /// 命中的保险关键词数量需要超过该值
    pub min_keyword_hits: usize,

    /// 允许抓取的文件扩展名
    pub extensions: Vec<String>,

    /// 并发抽取的文本块数量上限
    pub max_parallels: usize,
}

/// Schema演化配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SchemaConfig {
    /// 基础schema文件
    pub base_schema_path: Option<PathBuf>,

    /// 应用变更所需的最低置信度
    pub evolution_threshold: f64,
}

/// 自动化测试配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct QaConfig {
    /// 每个测试集额外生成的测试用例数量
    pub test_count: usize,
}

/// 自动决策配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AutomationConfig {
    /// 未单独配置的意图所使用的置信度阈值
    pub default_threshold: f64,
}

/// Prompt注册表配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PromptConfig {
    /// 注册表目录（registry.json所在目录）
    pub registry_dir: PathBuf,
}

impl Config {
    /// 从文件加载配置
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file: {:?}", path))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// 知识图谱导出路径
    pub fn knowledge_graph_path(&self) -> PathBuf {
        self.output_dir.join("insurance_knowledge_graph.json")
    }

    /// schema导出路径
    pub fn schema_path(&self) -> PathBuf {
        self.output_dir.join("insurance_schema.json")
    }

    /// 改进报告目录
    pub fn reports_dir(&self) -> PathBuf {
        self.output_dir.join("improvement_reports")
    }

    /// 日志文件路径
    pub fn log_file_path(&self) -> Option<PathBuf> {
        self.logging
            .file
            .as_ref()
            .filter(|name| !name.trim().is_empty())
            .map(|name| self.output_dir.join(name))
    }

    /// 创建运行所需的目录
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .context(format!("Failed to create data dir: {:?}", self.data_dir))?;
        std::fs::create_dir_all(&self.output_dir)
            .context(format!("Failed to create output dir: {:?}", self.output_dir))?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
            verbose: false,
            logging: LoggingConfig::default(),
            llm: LLMConfig::default(),
            cache: CacheConfig::default(),
            documents: DocumentConfig::default(),
            schema: SchemaConfig::default(),
            qa: QaConfig::default(),
            automation: AutomationConfig::default(),
            prompts: PromptConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            file: Some(String::from("insurance_rag_system.log")),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::default(),
            api_key: std::env::var("INSURANCE_RAG_LLM_API_KEY").unwrap_or_default(),
            api_base_url: String::from("https://api.openai.com/v1"),
            model_efficient: String::from("gpt-4o-mini"),
            model_powerful: String::from("gpt-4o"),
            max_tokens: 4096,
            temperature: 0.1,
            retry_attempts: 3,
            retry_delay_ms: 2000,
            timeout_seconds: 120,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_dir: PathBuf::from(".insurance-rag/cache"),
            expire_hours: 8760,
        }
    }
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            chunk_size: 3000,
            sample_chars: 5000,
            min_keyword_hits: 3,
            extensions: vec!["txt".to_string(), "md".to_string()],
            max_parallels: 3,
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            base_schema_path: None,
            evolution_threshold: 0.6,
        }
    }
}

impl Default for QaConfig {
    fn default() -> Self {
        Self { test_count: 10 }
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            default_threshold: 0.8,
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            registry_dir: PathBuf::from("prompts"),
        }
    }
}

// Include tests
#[cfg(test)]
mod tests;
