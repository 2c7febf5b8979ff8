#[cfg(test)]
mod tests {
    use crate::graph::{Filter, GraphEdge, GraphNode, KnowledgeGraph};
    use crate::query::intent::{
        CLAIM_STATUS, COVERAGE_INQUIRY, DEFINITION_INQUIRY, FILING_CLAIM, POLICY_DETAILS,
        PREMIUM_INFORMATION,
    };
    use crate::query::params::{extract_parameters, extract_term};
    use crate::query::{
        CLAIMS_CONTACT, IntentMethod, QueryFeedback, QueryPlan, QueryProcessor, UNKNOWN,
        UserContext, build_graph_query, term_similarity,
    };

    fn edge(source: &str, target: &str, relation: &str) -> GraphEdge {
        GraphEdge {
            source: source.to_string(),
            target: target.to_string(),
            relation_type: relation.to_string(),
            properties: Default::default(),
        }
    }

    fn insurance_graph() -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new();
        graph.add_node(
            GraphNode::new("P1001", "Policy")
                .with_property("policy_number", "P1001")
                .with_property("type", "auto")
                .with_property("status", "active")
                .with_property("effective_date", "2024-01-01")
                .with_property("expiration_date", "2025-01-01"),
        );
        graph.add_node(
            GraphNode::new("P1002", "Policy")
                .with_property("policy_number", "P1002")
                .with_property("type", "home")
                .with_property("status", "active"),
        );
        graph.add_node(
            GraphNode::new("U5001", "Insured")
                .with_property("id_number", "U5001")
                .with_property("name", "Jane Doe"),
        );
        graph.add_node(
            GraphNode::new("COV1", "Coverage")
                .with_property("type", "Collision")
                .with_property("limit", 50000)
                .with_property("deductible", 500),
        );
        graph.add_node(
            GraphNode::new("COV2", "Coverage")
                .with_property("type", "Liability")
                .with_property("limit", 100000)
                .with_property("deductible", 1000),
        );
        graph.add_node(
            GraphNode::new("PR1", "Premium")
                .with_property("amount", 1200)
                .with_property("payment_frequency", "monthly")
                .with_property("due_date", "2024-07-01"),
        );
        graph.add_node(
            GraphNode::new("CL4001", "Claim")
                .with_property("claim_number", "CL4001")
                .with_property("status", "under review")
                .with_property("amount", 2500)
                .with_property("date_of_loss", "2024-03-15"),
        );
        graph.add_node(
            GraphNode::new("def_1", "Definition")
                .with_property("term", "deductible")
                .with_property("meaning", "The amount you pay before coverage applies."),
        );
        for (source, target, relation) in [
            ("P1001", "U5001", "INSURES"),
            ("P1002", "U5001", "INSURES"),
            ("P1001", "COV1", "HAS_COVERAGE"),
            ("P1001", "COV2", "HAS_COVERAGE"),
            ("P1001", "PR1", "HAS_PREMIUM"),
            ("U5001", "CL4001", "FILES_CLAIM"),
        ] {
            graph.add_edge(edge(source, target, relation)).unwrap();
        }
        graph
    }

    #[test]
    fn test_intent_patterns_and_similarity() {
        let processor = QueryProcessor::default();

        let analysis = processor.analyze_intent("What's the status of my claim CL4001?");
        assert_eq!(analysis.intent, CLAIM_STATUS);
        assert_eq!(analysis.method, IntentMethod::Pattern);
        assert!((analysis.confidence - 0.8).abs() < 1e-9);

        // 两条覆盖模式命中，定义模式同样命中一条，命中多者胜出
        let analysis = processor.analyze_intent("What are my coverage details for policy P1001?");
        assert_eq!(analysis.intent, COVERAGE_INQUIRY);
        assert!((analysis.confidence - 0.9).abs() < 1e-9);

        let analysis = processor.analyze_intent("Has my claim been processed yet?");
        assert_eq!(analysis.intent, CLAIM_STATUS);
        assert_eq!(analysis.method, IntentMethod::Similarity);
        assert!((analysis.confidence - 1.0).abs() < 1e-9);

        let analysis = processor.analyze_intent("Tell me a joke about cats");
        assert_eq!(analysis.intent, UNKNOWN);
        assert_eq!(analysis.method, IntentMethod::Default);
        assert!(analysis.confidence > 0.4);
    }

    #[test]
    fn test_extract_parameters() {
        let params = extract_parameters(
            "What is the status of claim cl4001 on policy P1001?",
            CLAIM_STATUS,
            None,
        );
        assert_eq!(params.claim_number.as_deref(), Some("CL4001"));
        assert_eq!(params.policy_number.as_deref(), Some("P1001"));

        let params = extract_parameters("What does my policy cover?", COVERAGE_INQUIRY, None);
        assert_eq!(params.policy_number, None);

        let context = UserContext::new("U5001").with_policies(&["P1001"]);
        let params = extract_parameters(
            "When is my next premium payment due?",
            PREMIUM_INFORMATION,
            Some(&context),
        );
        assert_eq!(params.policy_number.as_deref(), Some("P1001"));
        assert_eq!(params.user_id.as_deref(), Some("U5001"));
        assert!(params.due_date_inquiry);
        assert!(!params.premium_change_inquiry);

        let params = extract_parameters(
            "Am I covered for water damage and flood?",
            COVERAGE_INQUIRY,
            None,
        );
        assert_eq!(params.coverage_types, vec!["flood", "water damage"]);

        let params = extract_parameters("Tell me about my auto policy", POLICY_DETAILS, None);
        assert_eq!(params.policy_type.as_deref(), Some("auto"));
    }

    #[test]
    fn test_extract_term() {
        assert_eq!(extract_term("What does deductible mean?"), "deductible");
        assert_eq!(extract_term("What is an actual cash value?"), "actual cash value");
        assert_eq!(extract_term("Define bodily injury"), "bodily injury");
    }

    #[test]
    fn test_build_graph_query_plans() {
        let context = UserContext::new("U5001");
        let params = extract_parameters("How much is my premium?", PREMIUM_INFORMATION, Some(&context));
        let plan = build_graph_query(PREMIUM_INFORMATION, &params);
        assert!(plan.is_complex());

        let params = extract_parameters("Am I covered for fire?", COVERAGE_INQUIRY, None);
        let QueryPlan::Graph(query) = build_graph_query(COVERAGE_INQUIRY, &params) else {
            panic!("coverage should be a graph query");
        };
        assert_eq!(query.filters, vec![Filter::any(vec![Filter::eq("c.type", "fire")])]);
        assert!(!query.is_complex());

        let params = Default::default();
        assert!(matches!(
            build_graph_query(FILING_CLAIM, &params),
            QueryPlan::Procedural(_)
        ));
        assert_eq!(build_graph_query(DEFINITION_INQUIRY, &params), QueryPlan::Unsupported);
        assert_eq!(build_graph_query(UNKNOWN, &params), QueryPlan::Unsupported);
    }

    #[test]
    fn test_process_policy_and_coverage_queries() {
        let mut processor = QueryProcessor::new(insurance_graph());

        let response = processor.process_query("Tell me about my policy P1001", None);
        assert_eq!(response.intent, POLICY_DETAILS);
        assert!(response.success);
        assert_eq!(
            response.answer,
            "Your policy P1001 is a auto insurance policy with an effective date of 2024-01-01 and expiration date of 2025-01-01. The policy is currently active."
        );
        assert_eq!(response.follow_up_questions.len(), 3);
        assert!(
            response
                .follow_up_questions
                .contains(&"Have there been any claims on policy P1001?".to_string())
        );

        let response =
            processor.process_query("What is covered under my policy P1001 for collision?", None);
        assert_eq!(response.intent, COVERAGE_INQUIRY);
        assert_eq!(
            response.answer,
            "For collision, your policy provides coverage up to $50,000.00 with a deductible of $500.00."
        );

        let response = processor.process_query("What are my coverage details for policy P1001?", None);
        assert!(response.success);
        assert!(response.answer.starts_with("Your policy includes the following coverages:"));
        assert!(response.answer.contains("Collision"));
        assert!(response.answer.contains("Liability"));
        assert!(response.answer.contains("The total coverage limit is $150,000.00."));
    }

    #[test]
    fn test_process_claim_premium_and_filing_queries() {
        let mut processor = QueryProcessor::new(insurance_graph());

        let context = UserContext::new("U5001");
        let response = processor.process_query("What's the status of my claim?", Some(&context));
        assert_eq!(
            response.answer,
            "Your claim CL4001 is currently under review. The claimed amount is $2,500.00."
        );

        let response = processor.process_query("How much is my premium for policy P1001?", None);
        assert_eq!(response.intent, PREMIUM_INFORMATION);
        assert_eq!(
            response.answer,
            "Your premium is $1,200.00 paid monthly. Your next payment is due on 2024-07-01."
        );

        let response = processor.process_query("How do I file a claim?", None);
        assert_eq!(response.intent, FILING_CLAIM);
        assert!(response.success);
        assert!(response.answer.contains(CLAIMS_CONTACT));
    }

    #[test]
    fn test_multiple_policies_render_one_sentence_each() {
        let mut graph = insurance_graph();
        graph.add_node(
            GraphNode::new("P1002", "Policy")
                .with_property("effective_date", "2024-02-01")
                .with_property("expiration_date", "2025-02-01"),
        );
        graph.add_node(
            GraphNode::new("PR2", "Premium")
                .with_property("amount", 800)
                .with_property("payment_frequency", "quarterly")
                .with_property("due_date", "2024-08-01"),
        );
        graph.add_edge(edge("P1002", "PR2", "HAS_PREMIUM")).unwrap();
        let mut processor = QueryProcessor::new(graph);
        let context = UserContext::new("U5001");

        let response = processor.process_query("Tell me about my policy", Some(&context));
        assert_eq!(response.intent, POLICY_DETAILS);
        assert_eq!(
            response.answer,
            "Your policy P1001 is a auto insurance policy with an effective date of 2024-01-01 and expiration date of 2025-01-01. The policy is currently active. \
             Your policy P1002 is a home insurance policy with an effective date of 2024-02-01 and expiration date of 2025-02-01. The policy is currently active."
        );

        let response = processor.process_query("How much is my premium?", Some(&context));
        assert_eq!(response.intent, PREMIUM_INFORMATION);
        assert_eq!(
            response.answer,
            "For policy P1001: Your premium is $1,200.00 paid monthly. Your next payment is due on 2024-07-01. \
             For policy P1002: Your premium is $800.00 paid quarterly. Your next payment is due on 2024-08-01."
        );
        assert!(!response.answer.contains("P1001, P1002"));
    }

    #[test]
    fn test_process_definitions_and_misses() {
        let mut processor = QueryProcessor::new(insurance_graph());

        let response = processor.process_query("What does deductible mean?", None);
        assert_eq!(response.intent, DEFINITION_INQUIRY);
        assert!(response.success);
        assert_eq!(
            response.answer,
            "According to the insurance documentation, deductible means: The amount you pay before coverage applies."
        );

        let response = processor.process_query("Define subrogation", None);
        assert!(!response.success);
        assert_eq!(
            response.answer,
            "I don't have a definition for subrogation in my knowledge base."
        );

        let response = processor.process_query("Tell me about my policy P9999", None);
        assert!(!response.success);
        assert_eq!(
            response.answer,
            "I couldn't find any policy with the number P9999. Please check if the policy number is correct."
        );

        let response = processor.process_query("Tell me a joke about cats", None);
        assert_eq!(response.intent, UNKNOWN);
        assert!(!response.success);
        assert!(response.follow_up_questions.is_empty());
    }

    #[test]
    fn test_lookup_definition_falls_back_to_similar_nodes() {
        let mut graph = insurance_graph();
        graph.add_node(
            GraphNode::new("ent_1", "Coverage")
                .with_property("name", "Actual Cash Value")
                .with_property("description", "Replacement cost minus depreciation."),
        );
        let processor = QueryProcessor::new(graph);

        let found = processor.lookup_definition("cash value").unwrap();
        assert_eq!(found.term, "Actual Cash Value");
        assert_eq!(found.meaning, "Replacement cost minus depreciation.");
        assert!((found.score - 0.8).abs() < 1e-9);

        assert!(processor.lookup_definition("subrogation").is_none());
        assert!((term_similarity("flood", "flood damage") - 0.8).abs() < 1e-9);
        assert!((term_similarity("bodily injury", "personal injury") - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_metrics_and_history_window() {
        let mut processor = QueryProcessor::new(insurance_graph());
        processor.process_query("Tell me about my policy P1001", None);
        processor.process_query("Tell me about my policy P9999", None);
        processor.process_query("How do I file a claim?", None);

        let metrics = processor.metrics();
        assert_eq!(metrics.total_queries, 3);
        assert_eq!(metrics.successful_queries, 2);
        assert_eq!(metrics.intent_distribution[POLICY_DETAILS], 2);
        assert_eq!(metrics.intent_distribution[FILING_CLAIM], 1);
        assert!((metrics.success_rate() - 2.0 / 3.0).abs() < 1e-9);

        for _ in 0..10 {
            processor.process_query("How do I file a claim?", None);
        }
        assert_eq!(processor.history().count(), 10);
        assert!(processor.history().all(|h| h.intent == FILING_CLAIM));
    }

    #[test]
    fn test_feedback_adds_corrected_examples() {
        let mut processor = QueryProcessor::default();
        let response = processor.process_query("I got a letter about roadside towing", None);
        assert_eq!(response.intent, UNKNOWN);

        processor.collect_feedback(
            &response.query_id,
            QueryFeedback {
                correct_intent: Some(COVERAGE_INQUIRY.to_string()),
                rating: Some(2),
                ..Default::default()
            },
        );
        processor.collect_feedback(
            "missing",
            QueryFeedback {
                rating: Some(5),
                ..Default::default()
            },
        );
        assert_eq!(processor.pending_feedback().len(), 2);

        let update = processor.update_from_feedback();
        assert_eq!(update.intents_improved, 1);
        assert!(
            processor.intent_examples()[COVERAGE_INQUIRY]
                .contains(&"I got a letter about roadside towing".to_string())
        );
        assert!(processor.pending_feedback().is_empty());
        assert_eq!(processor.update_from_feedback().intents_improved, 0);
    }

    #[test]
    fn test_discover_new_intents_clusters_unknown_queries() {
        let mut processor = QueryProcessor::default();
        for query in [
            "Is roadside towing available",
            "Does roadside towing cost extra",
            "Roadside towing for motorcycles",
        ] {
            assert_eq!(processor.process_query(query, None).intent, UNKNOWN);
        }

        let discovered = processor.discover_new_intents(3);
        assert_eq!(discovered.len(), 1);
        assert_eq!(discovered[0].intent_name, "discovered_intent_1");
        assert_eq!(discovered[0].cluster_size, 3);
        assert_eq!(
            discovered[0].description,
            "Queries related to: roadside, towing, available, cost, extra"
        );
        assert!(processor.discover_new_intents(3).is_empty());
        assert!(processor.discover_new_intents(4).is_empty());
    }

    #[test]
    fn test_auto_optimize_adds_high_confidence_examples() {
        let mut processor = QueryProcessor::new(insurance_graph());
        processor.process_query("Tell me about my policy P1001", None);
        processor.process_query("What are my coverage details for policy P1001?", None);

        let report = processor.auto_optimize_performance();
        assert_eq!(report.examples_added, 1);
        assert!(
            processor.intent_examples()[COVERAGE_INQUIRY]
                .contains(&"What are my coverage details for policy P1001?".to_string())
        );
        assert_eq!(processor.auto_optimize_performance().examples_added, 0);
    }
}
