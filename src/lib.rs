pub mod automation;
pub mod cache;
pub mod cli;
pub mod config;
pub mod documents;
pub mod graph;
pub mod llm;
pub mod prompts;
pub mod qa;
pub mod query;
pub mod schema;
pub mod system;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use llm::LanguageModel;
pub use system::InsuranceGraphRag;
