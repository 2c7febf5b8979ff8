use crate::config::{Config, DEFAULT_CONFIG_FILE, LLMProvider};
use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Insurance Graph RAG - 由LLM驱动的保险知识图谱问答引擎
#[derive(Parser, Debug)]
#[command(name = "insurance-graph-rag")]
#[command(
    about = "LLM-assisted knowledge graph engine for insurance documents. It extracts entities from policy documents, evolves a graph schema, answers questions over the graph and keeps improving through automated QA."
)]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// 配置文件路径
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// 原始文档目录
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// 输出目录
    #[arg(short, long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// 是否启用详细日志
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 高能效模型
    #[arg(long, global = true)]
    pub model_efficient: Option<String>,

    /// 高质量模型，作为efficient失效情况下的兜底
    #[arg(long, global = true)]
    pub model_powerful: Option<String>,

    /// LLM API基地址
    #[arg(long, global = true)]
    pub llm_api_base_url: Option<String>,

    /// LLM API KEY
    #[arg(long, global = true)]
    pub llm_api_key: Option<String>,

    /// 最大tokens数
    #[arg(long, global = true)]
    pub max_tokens: Option<u32>,

    /// 温度参数
    #[arg(long, global = true)]
    pub temperature: Option<f64>,

    /// LLM Provider (openai, moonshot, deepseek, mistral, openrouter, anthropic, gemini, ollama)
    #[arg(long, global = true)]
    pub llm_provider: Option<String>,

    /// 是否禁用缓存
    #[arg(long, global = true)]
    pub no_cache: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// 抓取文档、构建知识图谱、演化schema并执行首轮测试
    Init {
        /// 文档来源（目录或文件），默认使用data_dir
        #[arg(short, long)]
        source: Vec<PathBuf>,
    },
    /// 处理单条问题
    Query {
        /// 问题文本
        text: String,

        /// 跳过自动决策，直接使用查询处理器
        #[arg(long)]
        direct: bool,
    },
    /// 交互式问答演示
    Demo,
    /// 执行一轮完整的自我改进
    Improve,
    /// 生成系统报告
    Report,
    /// Prompt注册表操作
    Prompt {
        #[command(subcommand)]
        action: PromptCommand,
    },
    /// 系统状态持久化
    State {
        #[command(subcommand)]
        action: StateCommand,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum PromptCommand {
    /// 列出已注册的模板与流水线
    List,
    /// 执行一条prompt流水线
    Run {
        /// 流水线名称
        pipeline: String,

        /// 模板变量，形如 key=value
        #[arg(long = "var", value_parser = parse_key_val)]
        vars: Vec<(String, String)>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum StateCommand {
    /// 保存当前系统状态
    Save {
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// 从文件恢复系统状态
    Load { path: PathBuf },
}

fn parse_key_val(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("invalid KEY=value: no `=` found in `{}`", s))?;
    if key.trim().is_empty() {
        return Err(anyhow!("invalid KEY=value: empty key in `{}`", s));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

impl Args {
    /// 将CLI参数转换为配置
    pub fn resolve_config(&self) -> Result<Config> {
        let mut config = if let Some(config_path) = &self.config {
            // 显式指定的配置文件必须可读
            Config::from_file(config_path)?
        } else {
            let default_config_path = std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(DEFAULT_CONFIG_FILE);

            if default_config_path.exists() {
                Config::from_file(&default_config_path)?
            } else {
                Config::default()
            }
        };

        if let Some(data_dir) = &self.data_dir {
            config.data_dir = data_dir.clone();
        }
        if let Some(output_dir) = &self.output_dir {
            config.output_dir = output_dir.clone();
        }

        // 覆盖LLM配置
        if let Some(provider_str) = &self.llm_provider {
            if let Ok(provider) = provider_str.parse::<LLMProvider>() {
                config.llm.provider = provider;
            } else {
                eprintln!(
                    "⚠️ 警告: 未知的provider: {}，使用默认provider",
                    provider_str
                );
            }
        }
        if let Some(llm_api_base_url) = &self.llm_api_base_url {
            config.llm.api_base_url = llm_api_base_url.clone();
        }
        if let Some(llm_api_key) = &self.llm_api_key {
            config.llm.api_key = llm_api_key.clone();
        }
        if let Some(model_efficient) = &self.model_efficient {
            config.llm.model_efficient = model_efficient.clone();
        }
        if let Some(model_powerful) = &self.model_powerful {
            config.llm.model_powerful = model_powerful.clone();
        }
        if let Some(max_tokens) = self.max_tokens {
            config.llm.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            config.llm.temperature = temperature;
        }

        if self.no_cache {
            config.cache.enabled = false;
        }
        if self.verbose {
            config.verbose = true;
        }

        Ok(config)
    }
}
