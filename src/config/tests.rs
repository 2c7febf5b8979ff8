#[cfg(test)]
mod tests {
    use crate::config::{CacheConfig, Config, DocumentConfig, LLMConfig, LLMProvider};
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert!(!config.verbose);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.qa.test_count, 10);
        assert_eq!(config.automation.default_threshold, 0.8);
        assert_eq!(config.schema.evolution_threshold, 0.6);
        assert!(config.schema.base_schema_path.is_none());
    }

    #[test]
    fn test_llm_provider_default() {
        let provider = LLMProvider::default();
        assert_eq!(provider, LLMProvider::OpenAI);
    }

    #[test]
    fn test_llm_provider_from_str() {
        assert_eq!(
            "openai".parse::<LLMProvider>().unwrap(),
            LLMProvider::OpenAI
        );
        assert_eq!(
            "DeepSeek".parse::<LLMProvider>().unwrap(),
            LLMProvider::DeepSeek
        );
        assert_eq!(
            "anthropic".parse::<LLMProvider>().unwrap(),
            LLMProvider::Anthropic
        );
        assert_eq!(
            "ollama".parse::<LLMProvider>().unwrap(),
            LLMProvider::Ollama
        );

        assert!("invalid".parse::<LLMProvider>().is_err());
    }

    #[test]
    fn test_llm_provider_display() {
        assert_eq!(LLMProvider::OpenAI.to_string(), "openai");
        assert_eq!(LLMProvider::Moonshot.to_string(), "moonshot");
        assert_eq!(LLMProvider::OpenRouter.to_string(), "openrouter");
        assert_eq!(LLMProvider::Gemini.to_string(), "gemini");
    }

    #[test]
    fn test_llm_config_default() {
        let config = LLMConfig::default();

        assert_eq!(config.provider, LLMProvider::OpenAI);
        // api_key may be empty if env var is not set
        assert!(!config.api_base_url.is_empty());
        assert!(!config.model_efficient.is_empty());
        assert!(!config.model_powerful.is_empty());
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.retry_delay_ms, 2000);
    }

    #[test]
    fn test_cache_and_document_defaults() {
        let cache = CacheConfig::default();
        assert!(cache.enabled);
        assert_eq!(cache.expire_hours, 8760);

        let documents = DocumentConfig::default();
        assert_eq!(documents.chunk_size, 3000);
        assert_eq!(documents.sample_chars, 5000);
        assert_eq!(documents.min_keyword_hits, 3);
        assert_eq!(documents.extensions, vec!["txt", "md"]);
    }

    #[test]
    fn test_derived_paths() {
        let mut config = Config::default();
        config.output_dir = PathBuf::from("/tmp/out");

        assert_eq!(
            config.knowledge_graph_path(),
            PathBuf::from("/tmp/out/insurance_knowledge_graph.json")
        );
        assert_eq!(
            config.schema_path(),
            PathBuf::from("/tmp/out/insurance_schema.json")
        );
        assert_eq!(
            config.reports_dir(),
            PathBuf::from("/tmp/out/improvement_reports")
        );
        assert_eq!(
            config.log_file_path(),
            Some(PathBuf::from("/tmp/out/insurance_rag_system.log"))
        );

        config.logging.file = Some("  ".to_string());
        assert!(config.log_file_path().is_none());
    }

    #[test]
    fn test_from_file_partial_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("insurance-rag.toml");

        let content = r#"
data_dir = "docs"

[llm]
provider = "deepseek"
model_efficient = "deepseek-chat"

[qa]
test_count = 3

[automation]
default_threshold = 0.75
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("docs"));
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.llm.provider, LLMProvider::DeepSeek);
        assert_eq!(config.llm.model_efficient, "deepseek-chat");
        assert_eq!(config.llm.retry_attempts, 3);
        assert_eq!(config.qa.test_count, 3);
        assert_eq!(config.automation.default_threshold, 0.75);
        assert_eq!(config.documents.chunk_size, 3000);
    }

    #[test]
    fn test_from_file_missing_or_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.toml");
        assert!(Config::from_file(&missing).is_err());

        let broken = temp_dir.path().join("broken.toml");
        std::fs::write(&broken, "data_dir = [").unwrap();
        assert!(Config::from_file(&broken).is_err());
    }

    #[test]
    fn test_ensure_directories() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().join("data");
        config.output_dir = temp_dir.path().join("nested/output");

        config.ensure_directories().unwrap();
        assert!(config.data_dir.is_dir());
        assert!(config.output_dir.is_dir());
    }
}
