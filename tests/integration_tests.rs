use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use insurance_graph_rag::config::Config;
use insurance_graph_rag::llm::interaction::ModelInteractionManager;
use insurance_graph_rag::prompts::{PromptRegistry, PromptTemplate};
use insurance_graph_rag::system::{InsuranceGraphRag, SystemAnswer, demo_user_context};
use insurance_graph_rag::LanguageModel;

/// 抽取请求返回固定JSON，其余请求回显prompt
struct FixtureModel;

const EXTRACTION_JSON: &str = r#"{
  "entities": [
    {"id": "p1", "type": "Policy", "name": "Homeowners Policy", "attributes": {"policy_number": "HO-7788", "policy_type": "Homeowners"}},
    {"id": "c1", "type": "Coverage", "name": "Dwelling", "attributes": {"limit": 250000}}
  ],
  "relationships": [
    {"source": "p1", "target": "c1", "type": "has"}
  ]
}"#;

#[async_trait]
impl LanguageModel for FixtureModel {
    fn model_name(&self) -> String {
        "fixture".to_string()
    }

    async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> Result<String> {
        if user_prompt.contains("JSON") || user_prompt.contains("entities") {
            Ok(EXTRACTION_JSON.to_string())
        } else {
            Ok(format!("echo: {}", user_prompt))
        }
    }
}

/// 创建一个包含保险文档和无关文档的数据目录
fn create_test_documents(dir: &Path) {
    fs::create_dir_all(dir.join("policies")).unwrap();

    let policy = r#"HOMEOWNERS INSURANCE POLICY
Policy Number: HO-7788
The insured pays an annual premium. This policy provides coverage for the dwelling,
subject to a deductible of $1,000 per claim.

SECTION I PROPERTY COVERAGES
Coverage A Dwelling: limit $250,000.
"#;
    fs::write(dir.join("policies/homeowners.txt"), policy).unwrap();

    let notes = "Shopping list: apples, bread, coffee.";
    fs::write(dir.join("notes.md"), notes).unwrap();
}

fn create_test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.data_dir = root.join("data");
    config.output_dir = root.join("output");
    config.cache.enabled = false;
    config.cache.cache_dir = root.join("cache");
    config.prompts.registry_dir = root.join("prompts");
    config.qa.test_count = 3;
    config
}

#[tokio::test]
async fn test_full_workflow() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(temp_dir.path());
    create_test_documents(&config.data_dir);

    let mut system = InsuranceGraphRag::new(config.clone(), Arc::new(FixtureModel)).unwrap();
    let result = system.initialize(&[]).await;

    assert!(result.success, "initialization failed: {:?}", result.error);
    assert_eq!(result.documents_processed, 1, "only the policy should be processed");
    assert!(result.knowledge_graph_created);
    assert!(config.knowledge_graph_path().exists());
    assert!(config.schema_path().exists());
    assert!(config.output_dir.join("initial_test_results.json").exists());

    let context = demo_user_context();
    let answer = system
        .process_query("What does my policy cover?", Some(&context), true)
        .await;
    assert!(matches!(answer, SystemAnswer::Automated(_)));
    assert!(!answer.answer().is_empty());

    let report = system.system_report();
    assert_eq!(report.system_metrics.queries_processed, 1);
    assert_eq!(report.components.documents_processed, 1);

    let state_path = system.save_state(None).unwrap();
    assert!(state_path.starts_with(&config.output_dir));
}

#[tokio::test]
async fn test_missing_sources_still_initialize() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(temp_dir.path());

    let mut system = InsuranceGraphRag::new(config, Arc::new(FixtureModel)).unwrap();
    let result = system
        .initialize(&[temp_dir.path().join("nonexistent")])
        .await;

    // 没有文档时使用演示图谱，系统依然可用
    assert!(result.success);
    assert_eq!(result.documents_processed, 0);
    assert!(!result.knowledge_graph_created);

    let answer = system
        .process_query("What is the status of claim CL4001?", None, false)
        .await;
    assert!(matches!(answer, SystemAnswer::Direct(_)));
}

#[tokio::test]
async fn test_state_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(temp_dir.path());
    let state_path = temp_dir.path().join("state.json");

    let mut first = InsuranceGraphRag::new(config.clone(), Arc::new(FixtureModel)).unwrap();
    first.initialize(&[]).await;
    first.process_query("How much is my premium?", None, true).await;
    first.save_state(Some(&state_path)).unwrap();

    let mut second = InsuranceGraphRag::new(config, Arc::new(FixtureModel)).unwrap();
    second.load_state(&state_path).unwrap();

    assert!(second.is_initialized());
    assert_eq!(second.metrics(), first.metrics());
    // 已初始化的系统不会再次执行初始化
    second.process_query("How much is my premium?", None, true).await;
    assert_eq!(second.metrics().tests_executed, first.metrics().tests_executed);
    assert_eq!(
        second.metrics().queries_processed,
        first.metrics().queries_processed + 1
    );
}

#[tokio::test]
async fn test_prompt_pipeline_chaining() {
    let temp_dir = TempDir::new().unwrap();
    let mut registry = PromptRegistry::open_with_builtins(temp_dir.path()).unwrap();
    registry
        .register_template("ask", PromptTemplate::new("Summarize $topic"))
        .unwrap();
    registry
        .register_template("refine", PromptTemplate::new("Refine: $result_0"))
        .unwrap();
    registry.create_pipeline("ask_then_refine", &["ask", "refine"]).unwrap();

    // 重新打开注册表，确认流水线已持久化
    let registry = PromptRegistry::open(temp_dir.path()).unwrap();
    let pipeline = registry.require_pipeline("ask_then_refine").unwrap();
    let mut manager = ModelInteractionManager::new(Arc::new(FixtureModel));
    let vars = BTreeMap::from([("topic".to_string(), "flood coverage".to_string())]);

    let run = pipeline.execute(&mut manager, &vars).await.unwrap();

    assert_eq!(run.outputs[0], "echo: Summarize flood coverage");
    assert_eq!(
        run.final_output(),
        Some("echo: Refine: echo: Summarize flood coverage")
    );
    assert_eq!(manager.history().len(), 2);
    assert!(registry.require_pipeline("missing").is_err());
}

#[test]
fn test_config_defaults() {
    let config = Config::default();

    assert_eq!(config.data_dir, std::path::PathBuf::from("data"));
    assert_eq!(config.output_dir, std::path::PathBuf::from("output"));
    assert_eq!(config.qa.test_count, 10);
    assert_eq!(config.automation.default_threshold, 0.8);
    assert_eq!(config.schema.evolution_threshold, 0.6);
    assert_eq!(
        config.knowledge_graph_path(),
        std::path::PathBuf::from("output/insurance_knowledge_graph.json")
    );
    assert_eq!(
        config.log_file_path(),
        Some(std::path::PathBuf::from("output/insurance_rag_system.log"))
    );
}
