//! 内置模板

use super::PromptTemplate;

pub const ENTITY_EXTRACTION: &str = "entity_extraction";
pub const SECTION_SUMMARY: &str = "section_summary";
pub const FAQ_GENERATION: &str = "faq_generation";
pub const DOCUMENT_DIGEST: &str = "document_digest";

const EXTRACTION_SYSTEM_PROMPT: &str = "You are an insurance document analyst. You read policy wording and return only structured JSON describing the entities and relationships it defines.";

const EXTRACTION_TEMPLATE: &str = r#"Extract insurance entities and relationships from the "$section_name" section below.

Allowed entity types: $entity_types
Allowed relationship types: $relationship_types

Rules:
- Definition entities carry "term" and "meaning" attributes.
- Every other entity carries a "name" attribute.
- Relationships reference entity ids from this response only.

Respond with a single JSON object matching this JSON schema:
$output_schema

Document text:
$document_text"#;

const SUMMARY_TEMPLATE: &str = r#"Summarise the "$section_name" section of an insurance policy in plain language. List the coverages, limits, exclusions and conditions it establishes.

$document_text"#;

const FAQ_TEMPLATE: &str = r#"Using this summary of a policy section:

$result_0

Write five questions a policyholder is likely to ask about it, each followed by a short answer grounded in the summary."#;

/// 文档抽取模板，变量：section_name, entity_types, relationship_types, output_schema, document_text
pub fn entity_extraction() -> PromptTemplate {
    PromptTemplate::new(EXTRACTION_TEMPLATE)
        .with_system_prompt(EXTRACTION_SYSTEM_PROMPT)
        .with_description("Chunk-level entity and relationship extraction")
}

/// (名称, 模板)
pub fn templates() -> Vec<(&'static str, PromptTemplate)> {
    vec![
        (ENTITY_EXTRACTION, entity_extraction()),
        (
            SECTION_SUMMARY,
            PromptTemplate::new(SUMMARY_TEMPLATE)
                .with_system_prompt("You explain insurance policies to customers clearly.")
                .with_description("Plain-language summary of a policy section"),
        ),
        (
            FAQ_GENERATION,
            PromptTemplate::new(FAQ_TEMPLATE)
                .with_system_prompt("You write customer-facing insurance FAQs.")
                .with_description("Customer FAQ built from a section summary"),
        ),
    ]
}

/// (名称, 描述, 步骤)
pub fn pipelines() -> Vec<(&'static str, &'static str, &'static [&'static str])> {
    vec![(
        DOCUMENT_DIGEST,
        "Summarise a policy section and derive customer FAQs from the summary",
        &[SECTION_SUMMARY, FAQ_GENERATION],
    )]
}
