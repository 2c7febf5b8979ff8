#[cfg(test)]
mod tests {
    use crate::automation::{
        AutomationManager, ExceptionHandler, ExceptionKind, Improvement, check_compliance,
        contains_sensitive_terms,
    };
    use crate::graph::{GraphEdge, GraphNode, KnowledgeGraph};
    use crate::query::intent::{CLAIM_STATUS, FILING_CLAIM, POLICY_DETAILS, PREMIUM_INFORMATION};
    use crate::query::{QueryProcessor, UserContext};

    fn edge(source: &str, target: &str, relation: &str) -> GraphEdge {
        GraphEdge {
            source: source.to_string(),
            target: target.to_string(),
            relation_type: relation.to_string(),
            properties: Default::default(),
        }
    }

    fn manager() -> AutomationManager {
        let mut graph = KnowledgeGraph::new();
        graph.add_node(
            GraphNode::new("P1001", "Policy")
                .with_property("policy_number", "P1001")
                .with_property("type", "auto")
                .with_property("status", "active")
                .with_property("effective_date", "2024-01-01")
                .with_property("expiration_date", "2025-01-01"),
        );
        graph.add_node(GraphNode::new("COV1", "Coverage").with_property("type", "Collision"));
        graph.add_node(GraphNode::new("COV2", "Coverage").with_property("type", "Liability"));
        graph.add_node(GraphNode::new("U5001", "Insured").with_property("id_number", "U5001"));
        graph.add_node(
            GraphNode::new("CL4001", "Claim")
                .with_property("claim_number", "CL4001")
                .with_property("status", "under review"),
        );
        graph.add_edge(edge("P1001", "COV1", "HAS_COVERAGE")).unwrap();
        graph.add_edge(edge("P1001", "COV2", "HAS_COVERAGE")).unwrap();
        graph.add_edge(edge("P1001", "U5001", "INSURES")).unwrap();
        graph.add_edge(edge("U5001", "CL4001", "FILES_CLAIM")).unwrap();
        AutomationManager::new(QueryProcessor::new(graph), 0.8)
    }

    #[test]
    fn test_confident_answer_is_autonomous() {
        let mut automation = manager();
        let result = automation.process("Tell me about my policy P1001", None);
        assert!(result.autonomous);
        assert!(!result.requires_human_review);
        assert_eq!(result.user_answer(), result.response.answer);

        let metrics = automation.metrics();
        assert_eq!(metrics.total_decisions, 1);
        assert_eq!(metrics.autonomous_decisions, 1);
        assert!((metrics.avg_confidence - 0.8).abs() < 1e-9);
        assert!((metrics.autonomous_success_rate - 1.0).abs() < 1e-9);
        assert_eq!(automation.decision_history().len(), 1);
    }

    #[test]
    fn test_low_confidence_claim_is_escalated() {
        let mut automation = manager();
        let result = automation.process("What's the status of my claim CL4001?", None);
        assert!(result.response.success);
        assert!(result.requires_human_review);
        assert_eq!(
            result.review_reason.as_deref(),
            Some("Confidence 0.80 below threshold 0.90")
        );
        assert_ne!(result.user_answer(), result.response.answer);

        assert_eq!(automation.metrics().escalations, 1);
        assert_eq!(automation.escalation_history()[0].query, "What's the status of my claim CL4001?");
        assert_eq!(automation.metrics().autonomous_success_rate, 0.0);
    }

    #[test]
    fn test_unknown_intent_is_reclassified() {
        let mut automation = manager();
        let result = automation.process("Something odd happened with my claim paperwork", None);
        assert!(result.autonomous);
        assert!(result.exception_handled);
        assert_eq!(result.exception_type.as_deref(), Some("unknown_intent"));
        assert_eq!(result.response.intent, CLAIM_STATUS);
        assert!((result.response.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_ambiguous_coverage_lists_policy_coverages() {
        let mut automation = manager();
        let handler = ExceptionHandler::defaults()
            .into_iter()
            .find(|h| h.kind == ExceptionKind::AmbiguousCoverageQuestion)
            .unwrap();
        let response = automation
            .processor_mut()
            .process_query("What are my coverage details for policy P1001?", None);
        assert!(handler.matches("What are my coverage details for policy P1001?", &response));

        let handled = handler
            .handle(
                automation.processor_mut(),
                "What are my coverage details for policy P1001?",
                &response,
                None,
            )
            .unwrap();
        assert!(handled.answer.contains("Collision, Liability"));
        assert!((handled.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_missing_policy_number_uses_single_known_policy() {
        let mut automation = manager();
        let handler = ExceptionHandler::defaults().remove(0);
        let response = automation
            .processor_mut()
            .process_query("Tell me about my policy", None);
        assert_eq!(response.parameters.policy_number, None);
        assert!(handler.matches("Tell me about my policy", &response));

        let context = UserContext::new("U5001").with_policies(&["P1001"]);
        let handled = handler
            .handle(
                automation.processor_mut(),
                "Tell me about my policy",
                &response,
                Some(&context),
            )
            .unwrap();
        assert!(handled.success);
        assert_eq!(handled.parameters.policy_number.as_deref(), Some("P1001"));

        let ambiguous = UserContext::new("U5001").with_policies(&["P1001", "P1002"]);
        assert!(
            handler
                .handle(
                    automation.processor_mut(),
                    "Tell me about my policy",
                    &response,
                    Some(&ambiguous)
                )
                .is_none()
        );
    }

    #[test]
    fn test_sensitive_terms_and_compliance_checks() {
        assert!(contains_sensitive_terms("My lawyer wants the policy"));
        assert!(!contains_sensitive_terms("There is an issue with my policy"));

        let mut automation = manager();
        let result = automation.process("Tell me about my policy P1001, my lawyer asked", None);
        assert_eq!(result.review_reason.as_deref(), Some("Contains sensitive terms"));
        let result = automation.process("Tell me about my policy P1001, there is an issue", None);
        assert!(result.autonomous);

        assert_eq!(
            check_compliance("Why was my claim denied?", "Your claim was denied."),
            vec!["Missing claim denial reason".to_string()]
        );
        assert!(check_compliance("Why?", "Denied for the reason stated.").is_empty());
        assert_eq!(
            check_compliance("Am I covered?", "We guarantee your SSN is safe."),
            vec![
                "Potential privacy violation".to_string(),
                "Contains unsupported guarantees".to_string()
            ]
        );
    }

    #[test]
    fn test_feedback_adjusts_thresholds() {
        let mut automation = manager();
        assert!(!automation.record_feedback("missing", true, None));

        let mut policy_ids = Vec::new();
        let mut filing_ids = Vec::new();
        for _ in 0..5 {
            policy_ids.push(automation.process("Tell me about my policy P1001", None).response.query_id);
            filing_ids.push(automation.process("How do I file a claim?", None).response.query_id);
        }
        for id in &policy_ids {
            assert!(automation.record_feedback(id, true, Some("good")));
        }
        for id in &filing_ids {
            assert!(automation.record_feedback(id, false, None));
        }
        assert_eq!(automation.learned_patterns()[POLICY_DETAILS].len(), 5);

        let adjustment = automation.adjust_confidence_thresholds();
        assert!((adjustment.adjustments[POLICY_DETAILS].new - 0.75).abs() < 1e-9);
        assert!((automation.threshold_for(POLICY_DETAILS) - 0.75).abs() < 1e-9);
        assert!((automation.threshold_for(FILING_CLAIM) - 0.8).abs() < 1e-9);
        assert!(!adjustment.adjustments.contains_key(PREMIUM_INFORMATION));
        assert_eq!(automation.evolution_history().len(), 1);
    }

    #[test]
    fn test_learn_from_escalations_adds_claim_denial_handler() {
        let mut automation = manager();
        let query = "Report a loss: claim denied, complaint filed";
        for _ in 0..4 {
            automation.process(query, None);
        }
        assert!(automation.learn_from_escalations().patterns_identified.is_empty());

        automation.process(query, None);
        assert_eq!(automation.metrics().escalations, 5);
        let learning = automation.learn_from_escalations();
        assert_eq!(learning.patterns_identified.len(), 1);
        assert_eq!(
            learning.patterns_identified[0].common_terms,
            vec!["report", "loss", "claim", "denied"]
        );
        let Improvement::AddExceptionHandler { handler, .. } = &learning.improvements[0] else {
            panic!("expected a learned handler");
        };
        assert_eq!(handler.name, "learned_sensitive_terms_report_loss");
        assert_eq!(handler.description, "Non-sensitive claim denial inquiries");

        let result = automation.process(query, None);
        assert!(result.autonomous);
        assert_eq!(
            result.exception_type.as_deref(),
            Some("learned_sensitive_terms_report_loss")
        );
        assert_eq!(result.response.intent, CLAIM_STATUS);

        let result = automation.process("Report a loss: claim denied, I will sue", None);
        assert!(result.requires_human_review);
    }

    #[test]
    fn test_improvement_cycle_reports_measured_changes() {
        let mut automation = manager();
        automation.process("What's the status of my claim CL4001?", None);
        automation.process("Tell me about my policy P1001", None);
        let before = automation.snapshot();

        let results = automation.run_continuous_improvement_cycle(2);
        assert_eq!(results.cycles.len(), 2);
        assert_eq!(results.cycles[0].handler_extensions.new_handlers, vec!["payment_question"]);
        assert!(results.cycles[1].handler_extensions.new_handlers.is_empty());
        assert_eq!(results.overall_improvement.handlers_added, vec!["payment_question"]);
        assert_eq!(results.overall_improvement.initial, before);
        assert_eq!(results.overall_improvement.improvement, 0.0);
        assert!(results.overall_improvement.threshold_changes.is_empty());

        let report = &results.final_report;
        assert!((report.autonomy_metrics.escalation_rate - 0.5).abs() < 1e-9);
        assert!(report.recommendations.iter().any(|r| r.area == "Exception Handling"));
        assert!(report.exception_handlers.iter().any(|h| h.name == "payment_question"));
        assert_eq!(report.evolution_history.exception_handler_changes.len(), 1);
    }

    #[test]
    fn test_payment_question_handler() {
        let mut automation = manager();
        let handler = ExceptionHandler::payment_question();
        let response = automation
            .processor_mut()
            .process_query("Which payment method can I use?", None);
        assert!(handler.matches("Which payment method can I use?", &response));
        let handled = handler
            .handle(automation.processor_mut(), "Which payment method can I use?", &response, None)
            .unwrap();
        assert_eq!(handled.intent, "payment_information");
        assert!(handled.success);
    }
}
