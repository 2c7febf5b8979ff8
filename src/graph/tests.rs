#[cfg(test)]
mod tests {
    use crate::graph::{
        Direction, Entity, Filter, GraphDocument, GraphEdge, GraphError, GraphNode, GraphQuery,
        KnowledgeGraph,
    };
    use serde_json::json;
    use tempfile::TempDir;

    fn edge(source: &str, target: &str, relation: &str) -> GraphEdge {
        GraphEdge {
            source: source.to_string(),
            target: target.to_string(),
            relation_type: relation.to_string(),
            properties: Default::default(),
        }
    }

    fn sample_graph() -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new();
        graph.add_node(
            GraphNode::new("P1001", "Policy")
                .with_property("policy_number", "P1001")
                .with_property("type", "auto"),
        );
        graph.add_node(
            GraphNode::new("P1002", "Policy")
                .with_property("policy_number", "P1002")
                .with_property("type", "home"),
        );
        graph.add_node(
            GraphNode::new("C1", "Coverage")
                .with_property("type", "Collision")
                .with_property("limit", 50000),
        );
        graph.add_node(
            GraphNode::new("C2", "Coverage")
                .with_property("type", "Liability")
                .with_property("limit", "$100,000"),
        );
        graph.add_node(GraphNode::new("C3", "Coverage").with_property("type", "Fire"));
        graph.add_edge(edge("P1001", "C1", "HAS_COVERAGE")).unwrap();
        graph.add_edge(edge("P1001", "C2", "HAS_COVERAGE")).unwrap();
        graph.add_edge(edge("P1002", "C3", "HAS_COVERAGE")).unwrap();
        graph
    }

    #[test]
    fn test_add_edge_requires_endpoints() {
        let mut graph = KnowledgeGraph::new();
        graph.add_node(GraphNode::new("a", "Policy"));
        let err = graph.add_edge(edge("a", "ghost", "INSURES")).unwrap_err();
        assert_eq!(
            err,
            GraphError::MissingEndpoint {
                relation: "INSURES".to_string(),
                node: "ghost".to_string()
            }
        );
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_parallel_edges_kept_and_nodes_merge() {
        let mut graph = KnowledgeGraph::new();
        graph.add_node(GraphNode::new("a", "Policy").with_property("status", "active"));
        graph.add_node(GraphNode::new("b", "Insured"));
        graph.add_node(GraphNode::new("a", "Policy").with_property("type", "auto"));
        graph.add_edge(edge("a", "b", "INSURES")).unwrap();
        let mut renewed = edge("a", "b", "INSURES");
        renewed.properties.insert("term".to_string(), json!("2025"));
        graph.add_edge(renewed).unwrap();
        graph.add_edge(edge("a", "b", "RELATED_TO")).unwrap();

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 3);
        let node = graph.node("a").unwrap();
        assert_eq!(node.labels, vec!["Policy"]);
        assert_eq!(node.properties.len(), 2);

        let insures = graph.neighbors("a", Direction::Outgoing, Some("INSURES")).unwrap();
        assert_eq!(insures.len(), 2);
        // 平行边在查询结果中只产生一条匹配
        let result = graph.execute(
            &GraphQuery::new("Policy", "p").path("p", Some("INSURES"), Direction::Outgoing, "Insured", "i"),
        );
        assert_eq!(result.count, 1);
    }

    #[test]
    fn test_neighbors_by_direction_and_relation() {
        let graph = sample_graph();
        let out: Vec<&str> = graph
            .neighbors("P1001", Direction::Outgoing, Some("HAS_COVERAGE"))
            .unwrap()
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(out, vec!["C1", "C2"]);

        let incoming = graph.neighbors("C3", Direction::Incoming, None).unwrap();
        assert_eq!(incoming[0].id, "P1002");
        assert!(graph
            .neighbors("C3", Direction::Outgoing, None)
            .unwrap()
            .is_empty());
        assert_eq!(
            graph.neighbors("nope", Direction::Both, None).unwrap_err(),
            GraphError::UnknownNode("nope".to_string())
        );
    }

    #[test]
    fn test_label_counts_and_name_fallback() {
        let graph = sample_graph();
        let counts = graph.label_counts();
        assert_eq!(counts["Policy"], 2);
        assert_eq!(counts["Coverage"], 3);
        assert_eq!(graph.relation_counts()["HAS_COVERAGE"], 3);
        assert_eq!(graph.node("C3").unwrap().property("name"), Some(json!("C3")));
        assert_eq!(graph.node("C3").unwrap().property("limit"), None);
    }

    #[test]
    fn test_query_start_nodes_with_case_insensitive_filter() {
        let graph = sample_graph();
        let query = GraphQuery::new("Policy", "p")
            .filter(Filter::eq("p.policy_number", "p1001"))
            .returning(&["p.policy_number", "p.type"]);
        let result = graph.execute(&query);

        assert_eq!(result.count, 1);
        assert_eq!(result.first("p.type"), Some(&json!("auto")));
    }

    #[test]
    fn test_query_path_expansion_aggregates_unique_values() {
        let graph = sample_graph();
        let query = GraphQuery::new("Policy", "p")
            .path("p", Some("HAS_COVERAGE"), Direction::Outgoing, "Coverage", "c")
            .returning(&["p.policy_number", "c.type"]);
        let result = graph.execute(&query);

        assert_eq!(result.count, 3);
        assert_eq!(
            result.properties["p.policy_number"],
            vec![json!("P1001"), json!("P1002")]
        );
        assert_eq!(result.properties["c.type"].len(), 3);
        assert_eq!(result.bindings[0].nodes["c"], "C1");
    }

    #[test]
    fn test_query_filters_on_path_alias_and_any() {
        let graph = sample_graph();
        let query = GraphQuery::new("Policy", "p")
            .path("p", Some("HAS_COVERAGE"), Direction::Outgoing, "Coverage", "c")
            .filter(Filter::any(vec![
                Filter::eq("c.type", "collision"),
                Filter::eq("c.type", "fire"),
            ]))
            .returning(&["c.type"]);
        let result = graph.execute(&query);
        assert_eq!(result.count, 2);
        assert_eq!(
            result.properties["c.type"],
            vec![json!("Collision"), json!("Fire")]
        );
    }

    #[test]
    fn test_numeric_filters_parse_formatted_amounts() {
        let graph = sample_graph();
        let query = GraphQuery::new("Coverage", "c")
            .filter(Filter::gt("c.limit", 60000))
            .returning(&["c.type"]);
        let result = graph.execute(&query);
        assert_eq!(result.count, 1);
        assert_eq!(result.first("c.type"), Some(&json!("Liability")));

        let below = graph.execute(&GraphQuery::new("Coverage", "c").filter(Filter::lt("c.limit", "60,000")));
        assert_eq!(below.count, 1);

        let missing = graph.execute(
            &GraphQuery::new("Coverage", "c").filter(Filter::not_eq("c.limit", 1)),
        );
        assert_eq!(missing.count, 2);
    }

    #[test]
    fn test_contains_filter_on_strings_and_arrays() {
        let mut graph = KnowledgeGraph::new();
        graph.add_node(
            GraphNode::new("d1", "Definition")
                .with_property("term", "Bodily Injury")
                .with_property("aliases", json!(["BI", "injury"])),
        );
        let by_term = graph.execute(
            &GraphQuery::new("Definition", "d").filter(Filter::contains("d.term", "injury")),
        );
        assert_eq!(by_term.count, 1);
        let by_alias = graph.execute(
            &GraphQuery::new("Definition", "d").filter(Filter::contains("d.aliases", "bi")),
        );
        assert_eq!(by_alias.count, 1);
    }

    #[test]
    fn test_unknown_label_yields_empty_result() {
        let graph = sample_graph();
        let result = graph.execute(&GraphQuery::new("Claim", "c").returning(&["c.status"]));
        assert!(result.is_empty());
        assert!(result.properties.is_empty());
    }

    #[test]
    fn test_entity_to_node_uses_term_for_definitions() {
        let definition = Entity {
            id: "def_1".to_string(),
            entity_type: "Definition".to_string(),
            name: None,
            attributes: json!({"term": "Residence", "meaning": "the dwelling"})
                .as_object()
                .cloned()
                .unwrap(),
        };
        let node = definition.to_node();
        assert_eq!(node.labels, vec!["Definition"]);
        assert_eq!(node.properties["name"], json!("Residence"));
        assert_eq!(node.properties["meaning"], json!("the dwelling"));
    }

    #[test]
    fn test_document_round_trip_ignores_dangling_edges() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("graph.json");

        let mut document = sample_graph().to_document();
        document.edges.push(edge("P1001", "missing", "HAS_COVERAGE"));
        KnowledgeGraph::from_document(document).save(&path).unwrap();

        let loaded = KnowledgeGraph::load(&path).unwrap();
        assert_eq!(loaded.node_count(), 5);
        assert_eq!(loaded.edge_count(), 3);

        let raw: GraphDocument =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw.edges[0].relation_type, "HAS_COVERAGE");
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"type\": \"HAS_COVERAGE\""));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        assert!(KnowledgeGraph::load(&temp_dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn test_unbound_aliases() {
        let query = GraphQuery::new("Policy", "p")
            .path("p", Some("HAS_COVERAGE"), Direction::Outgoing, "Coverage", "c")
            .filter(Filter::eq("c.type", "Collision"))
            .returning(&["p.policy_number", "x.name"]);
        assert_eq!(query.unbound_aliases().into_iter().collect::<Vec<_>>(), vec!["x"]);

        let dangling = GraphQuery::new("Policy", "p")
            .path("cl", Some("RELATED_TO"), Direction::Outgoing, "Coverage", "c")
            .returning(&["c.type"]);
        assert_eq!(dangling.unbound_aliases().into_iter().collect::<Vec<_>>(), vec!["cl"]);
    }

    #[test]
    fn test_filter_on_undeclared_alias_matches_nothing() {
        let graph = sample_graph();
        let query = GraphQuery::new("Policy", "p").filter(Filter::eq("x.status", "no-such-status"));

        let result = graph.execute(&query);

        assert!(result.is_empty());
        assert!(result.bindings.is_empty());
        assert_eq!(graph.execute(&GraphQuery::new("Policy", "p")).count, 2);
    }
}
