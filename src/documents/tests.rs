#[cfg(test)]
mod tests {
    use crate::cache::CacheManager;
    use crate::config::{CacheConfig, DocumentConfig};
    use crate::documents::merge::{
        deduplicate_entities, deduplicate_relationships, infer_relationships, remap_relationships,
    };
    use crate::documents::{
        ExtractionPayload, InsuranceDocumentProcessor, classify_text, extract_definitions,
        extract_sections, parse_extraction_response, validate_entity, validate_payload,
    };
    use crate::graph::{Entity, Relationship};
    use crate::llm::testing::ScriptedModel;
    use serde_json::json;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::TempDir;

    const POLICY_TEXT: &str = r#"HOMEOWNERS POLICY
This insurance policy describes your coverage, premium and deductible.

DEFINITIONS
"Residence premises" means: the dwelling where you reside. Bodily injury is defined as harm to a person.

SECTION I PROPERTY COVERAGES
Coverage A Dwelling pays for damage to the residence premises.

SECTION I EXCLUSIONS
Flood damage to Coverage A Dwelling is not covered.
"#;

    const EXTRACTION_REPLY: &str = r#"Here is the JSON:
```json
{
  "entities": [
    {"id": "e1", "type": "Coverage", "name": "Coverage A Dwelling", "attributes": {"limit": 300000, "description": "covers the residence premises"}},
    {"id": "e2", "type": "Exclusion", "name": "Flood", "attributes": {"description": "flood damage to coverage a dwelling"}},
    {"id": "e3", "type": "Spaceship", "name": "Nope"}
  ],
  "relationships": [
    {"source": "e2", "target": "e1", "type": "excludes"},
    {"source": "e1", "target": "e3", "type": "covers"}
  ]
}
```"#;

    fn doc_config() -> DocumentConfig {
        DocumentConfig {
            chunk_size: 3000,
            sample_chars: 5000,
            min_keyword_hits: 3,
            extensions: vec!["txt".to_string(), "md".to_string()],
            max_parallels: 2,
        }
    }

    fn processor(model: Arc<ScriptedModel>, cache_dir: &TempDir) -> InsuranceDocumentProcessor {
        let cache = Arc::new(CacheManager::new(CacheConfig {
            enabled: true,
            cache_dir: cache_dir.path().to_path_buf(),
            expire_hours: 1,
        }));
        InsuranceDocumentProcessor::new(doc_config(), model, cache)
    }

    fn entity(id: &str, entity_type: &str, name: &str) -> Entity {
        Entity::new(id, entity_type, name)
    }

    #[test]
    fn test_classify_requires_more_than_threshold_keywords() {
        assert!(!classify_text("policy insurance coverage", 3));
        assert!(classify_text("Policy INSURANCE coverage claim", 3));
        assert!(!classify_text("", 0));
    }

    #[test]
    fn test_extract_sections_keeps_non_empty_and_full_document() {
        let sections = extract_sections(POLICY_TEXT);
        let names: Vec<&str> = sections.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "definitions",
                "section_i_coverages",
                "section_i_exclusions",
                "full_document"
            ]
        );
        assert!(sections[1].1.starts_with("Coverage A Dwelling"));
        assert!(!sections[0].1.contains("Coverage A Dwelling pays"));
        assert_eq!(sections.last().unwrap().1, POLICY_TEXT);

        let only_full = extract_sections("no headings here");
        assert_eq!(only_full.len(), 1);
    }

    #[test]
    fn test_extract_definitions_both_patterns() {
        let definitions = extract_definitions(POLICY_TEXT);
        assert_eq!(definitions.len(), 2);
        assert_eq!(definitions[0].term, "Residence premises");
        assert_eq!(definitions[0].meaning, "the dwelling where you reside");
        assert_eq!(definitions[0].extraction_type, "direct_match");
        assert_eq!(definitions[1].term, "injury");
        assert_eq!(definitions[1].extraction_type, "is_defined_as");
    }

    #[test]
    fn test_parse_response_accepts_embedded_json_only() {
        assert!(parse_extraction_response(r#"{"entities": []}"#).is_some());
        assert!(parse_extraction_response(EXTRACTION_REPLY).is_some());
        assert!(parse_extraction_response("I cannot help with that").is_none());
        assert!(parse_extraction_response("[1, 2]").is_none());
    }

    #[test]
    fn test_validate_entity_rules() {
        assert!(validate_entity(entity("x", "Coverage", "A")).is_some());
        assert!(validate_entity(entity(" ", "Coverage", "A")).is_none());
        assert!(validate_entity(entity("x", "Unknown", "A")).is_none());

        let nameless = Entity {
            name: None,
            ..entity("x", "Coverage", "A")
        };
        assert!(validate_entity(nameless).is_none());

        let converted = validate_entity(
            entity("d", "Definition", "Dwelling").with_attribute("description", "a house"),
        )
        .unwrap();
        assert_eq!(converted.attributes["term"], json!("Dwelling"));
        assert_eq!(converted.attributes["meaning"], json!("a house"));
        assert!(!converted.attributes.contains_key("description"));

        assert!(validate_entity(entity("d", "Definition", "Dwelling")).is_none());
    }

    #[test]
    fn test_validate_payload_drops_bad_items_individually() {
        let value = parse_extraction_response(EXTRACTION_REPLY).unwrap();
        let payload = validate_payload(&value);
        assert_eq!(payload.entities.len(), 2);
        assert_eq!(payload.relationships.len(), 1);
        assert_eq!(payload.relationships[0].relation_type, "excludes");

        let malformed = json!({"entities": [{"type": "Coverage"}, {"id": "ok", "type": "Policy", "name": "HO-3"}]});
        assert_eq!(validate_payload(&malformed).entities.len(), 1);
    }

    #[test]
    fn test_ensure_unique_ids_format_and_collisions() {
        let dir = TempDir::new().unwrap();
        let mut processor = processor(Arc::new(ScriptedModel::new("{}")), &dir);

        let payload = ExtractionPayload {
            entities: vec![
                entity("a", "Coverage", "Coverage A Dwelling"),
                entity("b", "Coverage", "Coverage A Dwelling"),
                Entity {
                    name: None,
                    ..entity("c", "Definition", "")
                }
                .with_attribute("term", "Bodily Injury")
                .with_attribute("meaning", "harm"),
            ],
            relationships: vec![
                Relationship::new("a", "b", "covers"),
                Relationship::new("a", "zzz", "covers"),
            ],
        };

        let unique = processor.ensure_unique_ids(payload, "section_i_coverages", 2);
        let ids: Vec<&str> = unique.entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "coverage_sec_2_coverage_a",
                "coverage_sec_2_coverage_a_1",
                "definition_sec_2_bodily_inj"
            ]
        );
        assert_eq!(unique.relationships.len(), 1);
        assert_eq!(unique.relationships[0].source, "coverage_sec_2_coverage_a");
        assert_eq!(unique.relationships[0].target, "coverage_sec_2_coverage_a_1");
    }

    #[test]
    fn test_deduplicate_merges_attributes_and_keeps_longer_id() {
        let entities = vec![
            entity("cov_1", "Coverage", "Dwelling")
                .with_attribute("limit", json!(null))
                .with_attribute("conditions", json!(["a"])),
            entity("cov_long_2", "Coverage", " dwelling ")
                .with_attribute("limit", 1000)
                .with_attribute("conditions", json!(["a", "b"])),
            entity("x", "Exclusion", "Dwelling"),
            Entity {
                name: None,
                ..entity("nameless", "Coverage", "")
            },
        ];

        let (unique, id_map) = deduplicate_entities(entities);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].id, "cov_long_2");
        assert_eq!(unique[0].attributes["limit"], json!(1000));
        assert_eq!(unique[0].attributes["conditions"], json!(["a", "b"]));
        assert_eq!(id_map["cov_1"], "cov_long_2");
    }

    #[test]
    fn test_remap_relationships_uses_map_and_unique_prefix() {
        let entities = vec![
            entity("coverage_sec_0_dwelling", "Coverage", "Dwelling"),
            entity("exclusion_sec_0_flood", "Exclusion", "Flood"),
            entity("exclusion_sec_0_fire", "Exclusion", "Fire"),
        ];
        let id_map = HashMap::from([("cov_1".to_string(), "coverage_sec_0_dwelling".to_string())]);
        let relationships = vec![
            Relationship::new("exclusion_sec_0_flood", "cov_1", "excludes"),
            Relationship::new("exclusion_sec_0_fl", "coverage_sec", "excludes"),
            Relationship::new("exclusion", "coverage_sec_0_dwelling", "excludes"),
            Relationship::new("ghost", "coverage_sec_0_dwelling", "excludes"),
        ];

        let remapped = remap_relationships(relationships, &entities, &id_map);
        assert_eq!(remapped.len(), 2);
        assert_eq!(remapped[0].target, "coverage_sec_0_dwelling");
        assert_eq!(remapped[1].source, "exclusion_sec_0_flood");
        assert_eq!(remapped[1].target, "coverage_sec_0_dwelling");
    }

    #[test]
    fn test_infer_and_deduplicate_relationships() {
        let entities = vec![
            entity("cov", "Coverage", "Dwelling")
                .with_attribute("description", "Protects the Residence Premises"),
            Entity {
                name: None,
                ..entity("def", "Definition", "")
            }
            .with_attribute("term", "Residence premises")
            .with_attribute("meaning", "the house"),
            entity("exc", "Exclusion", "Flood").with_attribute("description", "No dwelling flood"),
        ];

        let inferred = infer_relationships(&entities);
        assert_eq!(
            inferred,
            vec![
                Relationship::new("def", "cov", "referenced_by"),
                Relationship::new("exc", "cov", "excludes"),
            ]
        );

        let mut doubled = inferred.clone();
        doubled.extend(inferred);
        assert_eq!(deduplicate_relationships(doubled).len(), 2);
    }

    #[test]
    fn test_crawl_filters_by_extension_and_keywords() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("policy.txt"), POLICY_TEXT).unwrap();
        std::fs::write(nested.join("notes.md"), POLICY_TEXT).unwrap();
        std::fs::write(dir.path().join("recipe.txt"), "flour and sugar").unwrap();
        std::fs::write(dir.path().join("policy.pdf"), POLICY_TEXT).unwrap();
        let single = dir.path().join("recipe.txt");

        let cache_dir = TempDir::new().unwrap();
        let processor = processor(Arc::new(ScriptedModel::new("{}")), &cache_dir);
        let found = processor.crawl(&[
            dir.path().to_path_buf(),
            PathBuf::from("https://example.com/policies"),
            dir.path().join("missing"),
        ]);
        assert_eq!(
            found,
            vec![nested.join("notes.md"), dir.path().join("policy.txt")]
        );

        assert_eq!(processor.crawl(&[single.clone()]), vec![single]);
    }

    #[tokio::test]
    async fn test_process_document_extracts_merges_and_caches() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("policy.txt");
        std::fs::write(&path, POLICY_TEXT).unwrap();

        let cache_dir = TempDir::new().unwrap();
        let model = Arc::new(
            ScriptedModel::new(r#"{"entities": [], "relationships": []}"#)
                .when("\"section_i_coverages\"", EXTRACTION_REPLY),
        );
        let mut processor = processor(model.clone(), &cache_dir);

        let extraction = processor.process_document(&path).await.unwrap();
        // 四个章节各一个文本块
        assert_eq!(model.calls().len(), 4);
        assert!(model.calls()[0].1.contains("Allowed entity types: Policy, Claim"));

        let types: Vec<&str> = extraction
            .entities
            .iter()
            .map(|e| e.entity_type.as_str())
            .collect();
        assert_eq!(types, vec!["Coverage", "Exclusion", "Definition", "Definition"]);
        assert!(extraction.entities.iter().any(|e| e.id == "def_pattern_1"));
        assert!(
            extraction
                .relationships
                .iter()
                .any(|r| r.relation_type == "excludes")
        );
        assert_eq!(processor.document_store().len(), 1);

        // 第二次处理命中缓存
        processor.process_document(&path).await.unwrap();
        assert_eq!(model.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_unparseable_and_failed_responses_degrade_to_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("policy.txt");
        std::fs::write(&path, POLICY_TEXT).unwrap();

        let cache_dir = TempDir::new().unwrap();
        let model = Arc::new(ScriptedModel::new("not json at all").then_fail("rate limited"));
        let mut processor = processor(model, &cache_dir);

        let extraction = processor.process_document(&path).await.unwrap();
        assert_eq!(extraction.entities.len(), 2);
        assert!(
            extraction
                .entities
                .iter()
                .all(|e| e.attributes["source"] == json!("pattern_matching"))
        );
    }

    #[tokio::test]
    async fn test_process_batch_and_export() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("a.txt");
        let second = dir.path().join("b.txt");
        std::fs::write(&first, POLICY_TEXT).unwrap();
        std::fs::write(&second, POLICY_TEXT).unwrap();

        let cache_dir = TempDir::new().unwrap();
        let model = Arc::new(
            ScriptedModel::new(r#"{"entities": []}"#)
                .when("\"section_i_coverages\"", EXTRACTION_REPLY),
        );
        let mut processor = processor(model, &cache_dir);

        let batch = processor
            .process_batch(&[first, second, dir.path().join("missing.txt")])
            .await;
        assert_eq!(batch.documents_processed, 2);
        assert_eq!(batch.failed_documents.len(), 1);
        // 两个文档抽出的同名实体被合并
        assert_eq!(batch.entities.len(), 4);
        assert!(processor.current().is_some());

        let out = dir.path().join("out").join("graph.json");
        let graph = processor.export(&out).unwrap();
        assert_eq!(graph.node_count(), 4);
        assert!(graph.edge_count() >= 1);
        assert!(out.exists());
        let labels = graph.label_counts();
        assert_eq!(labels["Definition"], 2);
    }
}
