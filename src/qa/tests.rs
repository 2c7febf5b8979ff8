#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::automation::AutomationManager;
    use crate::graph::{Direction, Filter, GraphQuery};
    use crate::qa::suites::{fixed_cases, generate_cases};
    use crate::qa::synthetic::{DEMO_CLAIM, DEMO_USER, add_missing_data, synthetic_graph};
    use crate::qa::{
        ComplianceRule, Diagnostics, DiagnosticRecommendation, ErrorCategory, FailureCause,
        MISSING_DATA, QaSystem, Suite, SuiteResults, TestCase, TestError, TestKind, TestResult,
        TestRunResults, TestStatus, TestSummary, Trend,
    };
    use crate::query::QueryProcessor;
    use crate::query::intent::POLICY_DETAILS;

    fn automation() -> AutomationManager {
        AutomationManager::new(QueryProcessor::new(synthetic_graph(7)), 0.8)
    }

    fn failed(name: &str, errors: &[(ErrorCategory, &str)]) -> TestResult {
        TestResult {
            name: name.to_string(),
            status: TestStatus::Failed,
            errors: errors
                .iter()
                .map(|(category, message)| TestError {
                    category: *category,
                    message: message.to_string(),
                })
                .collect(),
            actual: serde_json::Value::Null,
            violated_rules: Vec::new(),
            passed_rules: Vec::new(),
        }
    }

    fn run_with(suite: Suite, tests: Vec<TestResult>) -> TestRunResults {
        let mut summary = TestSummary::default();
        for test in &tests {
            summary.record(test.status);
        }
        TestRunResults {
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            summary,
            suites: BTreeMap::from([(suite, SuiteResults { summary, tests })]),
        }
    }

    fn summary(total: usize, passed: usize) -> TestRunResults {
        TestRunResults {
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            summary: TestSummary {
                total_tests: total,
                passed,
                failed: total - passed,
                errors: 0,
            },
            suites: BTreeMap::new(),
        }
    }

    #[test]
    fn test_synthetic_graph_is_deterministic() {
        let first = synthetic_graph(42);
        let second = synthetic_graph(42);

        assert_eq!(first.node_count(), second.node_count());
        assert_eq!(first.edge_count(), second.edge_count());
        assert_eq!(first.label_counts(), second.label_counts());
        assert_eq!(
            first.node("P1003").and_then(|n| n.property("status")),
            second.node("P1003").and_then(|n| n.property("status"))
        );
        assert_eq!(first.label_counts().get("Policy"), Some(&10));
        assert_eq!(first.label_counts().get("Claim"), Some(&15));
    }

    #[test]
    fn test_synthetic_graph_demo_user_facts() {
        let graph = synthetic_graph(3);

        let owned = graph.execute(
            &GraphQuery::new("Policy", "p")
                .path("p", Some("INSURES"), Direction::Outgoing, "Insured", "i")
                .filter(Filter::eq("i.id_number", DEMO_USER))
                .returning(&["p.policy_number"]),
        );
        let policies: Vec<_> = owned
            .properties
            .get("p.policy_number")
            .cloned()
            .unwrap_or_default();
        assert!(policies.contains(&serde_json::json!("P1001")));
        assert!(policies.contains(&serde_json::json!("P1002")));

        let claims = graph.execute(
            &GraphQuery::new("Insured", "i")
                .path("i", Some("FILES_CLAIM"), Direction::Outgoing, "Claim", "c")
                .path("c", Some("RELATED_TO"), Direction::Outgoing, "Coverage", "cov")
                .filter(Filter::eq("i.id_number", DEMO_USER))
                .filter(Filter::eq("c.claim_number", DEMO_CLAIM))
                .returning(&["cov.type"]),
        );
        assert_eq!(claims.count, 1);
    }

    #[test]
    fn test_add_missing_data_is_idempotent() {
        let mut graph = synthetic_graph(1);
        let mut rng = StdRng::seed_from_u64(9);
        let before = graph.node_count();

        let actions = add_missing_data(&mut graph, &mut rng);
        assert!(graph.contains("P9000"));
        assert!(graph.contains("C9121"));
        assert_eq!(graph.node_count(), before + 9);
        assert!(actions.contains(&"Added 9 synthetic nodes to knowledge graph".to_string()));
        assert!(actions.contains(&"Added 6 synthetic relationships to knowledge graph".to_string()));

        let again = add_missing_data(&mut graph, &mut rng);
        assert!(again.is_empty());
        assert_eq!(graph.node_count(), before + 9);
    }

    #[test]
    fn test_compliance_rules() {
        let privacy = ComplianceRule::PrivacyProtection;
        assert!(privacy.check("show my data", "Your policy P1001 is active."));
        assert!(!privacy.check("show my data", "Your credit card ends in 1234."));
        assert!(!privacy.check("show my data", "Your PIN is 0000."));
        assert!(privacy.check("show my data", "Your spinning class is covered."));

        let denial = ComplianceRule::ClaimDenialDisclosure;
        assert!(!denial.check("Why was my claim denied?", "Your claim was denied."));
        assert!(denial.check("Why was my claim denied?", "It was denied because of late filing."));
        assert!(denial.check("What is my premium?", "Your claim was denied."));

        let coverage = ComplianceRule::CoverageDisclosure;
        assert!(!coverage.check("What does my policy cover?", "Your policy is active."));
        assert!(coverage.check("What does my policy cover?", "Collision with a limit of $50,000."));

        let premium = ComplianceRule::PremiumTransparency;
        assert!(!premium.check("How is my premium calculated?", "It is $100."));
        assert!(premium.check("How is my premium calculated?", "It is based on your driving record."));

        let cancellation = ComplianceRule::PolicyCancellationNotice;
        assert!(!cancellation.check("Can you cancel my policy?", "Your policy is cancelled."));
        assert!(cancellation.check(
            "Can you cancel my policy?",
            "You may appeal within 30 days."
        ));
        assert!(!ComplianceRule::defaults().contains(&cancellation));
    }

    #[test]
    fn test_suite_names_round_trip() {
        for suite in Suite::ALL {
            assert_eq!(suite.name().parse::<Suite>(), Ok(suite));
        }
        assert!("nonsense".parse::<Suite>().is_err());
    }

    #[test]
    fn test_generated_cases_respect_count() {
        let mut rng = StdRng::seed_from_u64(5);
        for suite in Suite::ALL {
            assert!(!fixed_cases(suite).is_empty());
            let generated = generate_cases(suite, &mut rng, 2);
            assert_eq!(generated.len(), 2, "suite {}", suite);
        }
        let conversations = generate_cases(Suite::EndToEnd, &mut rng, 3);
        for case in conversations {
            match case.kind {
                TestKind::Conversation { turns, .. } => assert!((2..=4).contains(&turns.len())),
                other => panic!("unexpected case kind: {:?}", other),
            }
        }
    }

    #[test]
    fn test_graph_suite_passes_on_synthetic_graph() {
        let mut automation = automation();
        let mut qa = QaSystem::with_seed(11);

        let results = qa.run_test_suite(&mut automation, Some(Suite::GraphQuerying), None);
        let suite = &results.suites[&Suite::GraphQuerying];
        assert_eq!(suite.summary.total_tests, 4);
        assert_eq!(suite.summary.passed, 4, "{:?}", suite.tests);
        assert_eq!(qa.history().len(), 1);
    }

    #[test]
    fn test_response_suite_passes_with_default_templates() {
        let mut automation = automation();
        let mut qa = QaSystem::with_seed(11);

        let results = qa.run_test_suite(&mut automation, Some(Suite::ResponseGeneration), None);
        assert_eq!(results.summary.total_tests, 6);
        assert_eq!(results.summary.passed, 6, "{:?}", results.suites);
    }

    #[test]
    fn test_suite_count_extends_and_truncates() {
        let mut automation = automation();
        let mut qa = QaSystem::with_seed(3);

        let extended = qa.run_test_suite(&mut automation, Some(Suite::IntentRecognition), Some(10));
        assert_eq!(extended.summary.total_tests, 10);

        let truncated = qa.run_test_suite(&mut automation, Some(Suite::EdgeCases), Some(2));
        assert_eq!(truncated.summary.total_tests, 2);
        assert_eq!(qa.history().len(), 2);
    }

    #[test]
    fn test_unbound_alias_is_reported_as_error() {
        let mut automation = automation();
        let qa = QaSystem::with_seed(1);
        let case = TestCase {
            name: "broken".to_string(),
            kind: TestKind::Graph {
                query: GraphQuery::new("Policy", "p").returning(&["x.name"]),
                count_min: Some(1),
                count_max: None,
                property_exists: None,
            },
        };

        let result = qa.run_case(&mut automation, &case);
        assert_eq!(result.status, TestStatus::Error);
        assert!(result.errors[0].message.contains("x"));
    }

    #[test]
    fn test_compliance_case_records_rules() {
        let mut automation = automation();
        let qa = QaSystem::with_seed(1);
        let case = TestCase {
            name: "privacy".to_string(),
            kind: TestKind::Compliance {
                query: "How do I file a claim?".to_string(),
                user_context: None,
                expected: Default::default(),
            },
        };

        let result = qa.run_case(&mut automation, &case);
        assert_eq!(result.status, TestStatus::Passed);
        assert_eq!(result.passed_rules.len(), 4);
        assert!(result.violated_rules.is_empty());
    }

    #[test]
    fn test_diagnose_failures_categorises_errors() {
        let mut qa = QaSystem::with_seed(1);
        let results = run_with(
            Suite::EndToEnd,
            vec![
                failed(
                    "a",
                    &[
                        (ErrorCategory::IntentRecognition, "Intent mismatch: expected 'x', got 'y'"),
                        (ErrorCategory::Compliance, "Compliance rule 'privacy_protection' failed"),
                    ],
                ),
                failed("b", &[(ErrorCategory::IntentRecognition, "Intent mismatch")]),
                failed("c", &[(ErrorCategory::IntentRecognition, "Intent mismatch")]),
                failed("d", &[(ErrorCategory::ParameterExtraction, "Missing parameter: 'policy_number'")]),
                failed("e", &[(ErrorCategory::ParameterExtraction, "Missing parameter: 'claim_number'")]),
            ],
        );

        let diagnostics = qa.diagnose_failures(&results);

        assert_eq!(diagnostics.error_patterns["intent_recognition_errors"].count, 3);
        assert_eq!(diagnostics.error_patterns["parameter_extraction_errors"].count, 2);
        let categories: Vec<ErrorCategory> =
            diagnostics.recommendations.iter().map(|r| r.category).collect();
        assert_eq!(
            categories,
            vec![ErrorCategory::IntentRecognition, ErrorCategory::Compliance]
        );
        assert_eq!(diagnostics.most_affected_components[0].failure_count, 5);
        // 6条错误中2条含 missing，超过30%
        assert_eq!(diagnostics.common_failure_causes[0].cause, MISSING_DATA);
        assert_eq!(qa.error_patterns()[&ErrorCategory::IntentRecognition], 3);
    }

    #[test]
    fn test_fix_common_issues_applies_each_fix_once() {
        let mut automation = automation();
        let mut qa = QaSystem::with_seed(2);
        let diagnostics = Diagnostics {
            recommendations: vec![
                DiagnosticRecommendation::new(ErrorCategory::ResponseGeneration, "issue", "fix"),
                DiagnosticRecommendation::new(ErrorCategory::Compliance, "issue", "fix"),
                DiagnosticRecommendation::new(ErrorCategory::ParameterExtraction, "issue", "fix"),
            ],
            common_failure_causes: vec![FailureCause {
                cause: MISSING_DATA.to_string(),
                description: String::new(),
                affected_tests: 3,
            }],
            ..Default::default()
        };
        let templates_before = automation.processor().response_templates()[POLICY_DETAILS].len();

        let fixes = qa.fix_common_issues(&mut automation, &diagnostics);

        let components: Vec<&str> = fixes.fixed_issues.iter().map(|f| f.component.as_str()).collect();
        assert_eq!(components, vec!["Response Generation", "Compliance", "Knowledge Graph"]);
        assert!(qa.rules().contains(&ComplianceRule::PolicyCancellationNotice));
        assert!(automation.processor().graph().contains("P9002"));
        assert_eq!(
            automation.processor().response_templates()[POLICY_DETAILS].len(),
            templates_before + 1
        );

        let again = qa.fix_common_issues(&mut automation, &diagnostics);
        assert!(again.fixed_issues.is_empty());
        assert!(again.actions_taken.is_empty());
    }

    #[test]
    fn test_intent_fix_adds_high_confidence_history() {
        let mut automation = automation();
        let mut qa = QaSystem::with_seed(2);
        automation.process("What is the status of my claim CL4001?", None);
        let confident = automation
            .processor()
            .history()
            .any(|entry| entry.confidence > 0.9);
        let diagnostics = Diagnostics {
            recommendations: vec![DiagnosticRecommendation::new(
                ErrorCategory::IntentRecognition,
                "issue",
                "fix",
            )],
            ..Default::default()
        };

        let fixes = qa.fix_common_issues(&mut automation, &diagnostics);
        assert_eq!(!fixes.fixed_issues.is_empty(), confident);
    }

    #[test]
    fn test_performance_report_trend() {
        let mut automation = automation();
        let mut qa = QaSystem::with_seed(4);
        assert_eq!(qa.test_metrics().trend, Trend::InsufficientData);

        qa.history.push(summary(10, 5));
        assert_eq!(qa.test_metrics().trend, Trend::Stable);
        qa.history.push(summary(10, 8));
        assert_eq!(qa.test_metrics().trend, Trend::Improving);
        qa.history.push(summary(10, 8));
        assert_eq!(qa.test_metrics().trend, Trend::Stable);
        qa.history.push(summary(10, 2));
        assert_eq!(qa.test_metrics().trend, Trend::Declining);

        let report = qa.performance_report(&mut automation);
        assert_eq!(report.test_metrics.trend, Trend::Declining);
        assert!(
            report
                .recommendations
                .iter()
                .any(|r| r.area == "Test Coverage" && r.priority == "high")
        );
        // 合规检查不计入测试历史
        assert_eq!(qa.history().len(), 4);
        for issue in &report.compliance_status.issues {
            assert!(
                report
                    .recommendations
                    .iter()
                    .any(|r| r.priority == "critical" && r.recommendation.contains(&issue.description))
            );
        }
    }

    #[test]
    fn test_self_improvement_cycle_measures_delta() {
        let mut automation = automation();
        let mut qa = QaSystem::with_seed(8).with_test_count(2);

        let results = qa.run_self_improvement_cycle(&mut automation);

        assert_eq!(results.initial_tests.total_tests, 14);
        assert_eq!(results.post_fix_tests.total_tests, 14);
        let expected = results.post_fix_tests.pass_rate() - results.initial_tests.pass_rate();
        assert!((results.improvement - expected).abs() < 1e-9);
        assert_eq!(qa.history().len(), 2);
        let last = qa.history().last().unwrap();
        assert_eq!(last.summary.total_tests, results.post_fix_tests.total_tests);
    }
}
