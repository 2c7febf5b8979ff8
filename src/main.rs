use anyhow::Result;
use clap::Parser;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use insurance_graph_rag::cli::{Args, Command, PromptCommand, StateCommand};
use insurance_graph_rag::config::Config;
use insurance_graph_rag::llm::LLMClient;
use insurance_graph_rag::llm::interaction::ModelInteractionManager;
use insurance_graph_rag::prompts::PromptRegistry;
use insurance_graph_rag::system::InsuranceGraphRag;

/// 控制台输出到stderr；配置了日志文件时同时追加写入
fn init_logging(config: &Config) {
    let level = if config.verbose {
        "debug".to_string()
    } else {
        config.logging.level.to_lowercase()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_layer = config.log_file_path().and_then(|path| {
        let dir = path.parent()?.to_path_buf();
        let name = path.file_name()?.to_owned();
        std::fs::create_dir_all(&dir).ok()?;
        let appender = tracing_appender::rolling::never(dir, name);
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(appender),
        )
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.resolve_config()?;
    init_logging(&config);

    let client = LLMClient::new(config.llm.clone())?;

    match args.command {
        Command::Init { source } => {
            // 只有文档抽取会访问模型
            client.check_connection().await?;
            let mut system = InsuranceGraphRag::new(config, Arc::new(client))?;
            let result = system.initialize(&source).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if let Some(error) = result.error {
                anyhow::bail!("initialization failed: {}", error);
            }
            system.save_state(None)?;
        }
        Command::Query { text, direct } => {
            let mut system = InsuranceGraphRag::new(config, Arc::new(client))?;
            let answer = system.process_query(&text, None, !direct).await;
            println!("💬 {}", answer.answer());
            println!(
                "   intent: {} (confidence: {:.2})",
                answer.intent(),
                answer.confidence()
            );
        }
        Command::Demo => {
            let mut system = InsuranceGraphRag::new(config, Arc::new(client))?;
            let stdin = std::io::stdin();
            let mut stdout = std::io::stdout();
            system.run_interactive_demo(stdin.lock(), &mut stdout).await?;
        }
        Command::Improve => {
            let mut system = InsuranceGraphRag::new(config, Arc::new(client))?;
            let results = system.run_improvement_cycle().await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Command::Report => {
            let report_path = config.output_dir.join("system_report.json");
            let system = InsuranceGraphRag::new(config, Arc::new(client))?;
            let report = system.system_report();
            std::fs::create_dir_all(system.config().output_dir.as_path())?;
            std::fs::write(&report_path, serde_json::to_string_pretty(&report)?)?;
            println!("✅ 系统报告已保存: {}", report_path.display());
            for recommendation in &report.recommendations {
                println!(
                    "   - [{}] {}",
                    recommendation.component, recommendation.recommendation
                );
            }
        }
        Command::Prompt { action } => {
            let registry = PromptRegistry::open_with_builtins(&config.prompts.registry_dir)?;
            match action {
                PromptCommand::List => {
                    println!("📄 模板:");
                    for name in registry.template_names() {
                        println!("   - {}", name);
                    }
                    println!("🔗 流水线:");
                    for name in registry.pipeline_names() {
                        println!("   - {}", name);
                    }
                }
                PromptCommand::Run { pipeline, vars } => {
                    let pipeline = registry.require_pipeline(&pipeline)?;
                    client.check_connection().await?;
                    let mut manager = ModelInteractionManager::new(Arc::new(client));
                    let vars: BTreeMap<String, String> = vars.into_iter().collect();
                    let run = pipeline.execute(&mut manager, &vars).await?;
                    manager.export_history(&config.output_dir.join("model_interactions.json"))?;
                    println!("{}", run.final_output().unwrap_or_default());
                }
            }
        }
        Command::State { action } => {
            let mut system = InsuranceGraphRag::new(config, Arc::new(client))?;
            match action {
                StateCommand::Save { path } => {
                    let saved = system.save_state(path.as_deref())?;
                    println!("💾 系统状态已保存: {}", saved.display());
                }
                StateCommand::Load { path } => {
                    system.load_state(&path)?;
                    println!("✅ 系统状态已加载: {}", path.display());
                    println!("{}", serde_json::to_string_pretty(system.metrics())?);
                }
            }
        }
    }

    Ok(())
}
