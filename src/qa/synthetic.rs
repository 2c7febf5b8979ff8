//! 合成保险数据：测试用知识图谱与缺失数据补全

use chrono::{Duration, Utc};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use serde_json::json;

use crate::graph::{GraphNode, KnowledgeGraph, Relationship};

pub const POLICY_COUNT: usize = 10;
pub const INSURED_COUNT: usize = 8;
pub const COVERAGE_COUNT: usize = 20;
pub const CLAIM_COUNT: usize = 15;

/// 演示用户，固定持有P1001、P1002并提交过CL4001
pub const DEMO_USER: &str = "U5001";
pub const DEMO_POLICIES: [&str; 2] = ["P1001", "P1002"];
pub const DEMO_CLAIM: &str = "CL4001";
const DEMO_INSURED: &str = "I2001";

const POLICY_STATUSES: [&str; 3] = ["active", "expired", "cancelled"];
const POLICY_KINDS: [&str; 5] = ["auto", "home", "health", "life", "liability"];
const COVERAGE_KINDS: [&str; 8] = [
    "liability",
    "collision",
    "comprehensive",
    "medical",
    "property",
    "flood",
    "fire",
    "theft",
];
const COVERAGE_LIMITS: [u64; 5] = [50_000, 100_000, 250_000, 500_000, 1_000_000];
const DEDUCTIBLES: [u64; 5] = [0, 250, 500, 1000, 2000];
const CLAIM_STATUSES: [&str; 5] = ["open", "under review", "approved", "denied", "closed"];
const FREQUENCIES: [&str; 4] = ["monthly", "quarterly", "semi-annually", "annually"];

pub fn policy_id(i: usize) -> String {
    format!("P{}", 1000 + i)
}

pub fn claim_id(i: usize) -> String {
    format!("CL{}", 4000 + i)
}

fn insured_id(i: usize) -> String {
    format!("I{}", 2000 + i)
}

fn coverage_id(i: usize) -> String {
    format!("C{}", 3000 + i)
}

fn premium_id(i: usize) -> String {
    format!("PR{}", 5000 + i)
}

/// 相对今天偏移若干天的日期
pub fn date_offset(days: i64) -> String {
    (Utc::now() + Duration::days(days))
        .format("%Y-%m-%d")
        .to_string()
}

fn pick<'a>(rng: &mut StdRng, items: &'a [&'a str]) -> &'a str {
    items.choose(rng).copied().unwrap_or_default()
}

fn link(graph: &mut KnowledgeGraph, relationship: Relationship) {
    if let Err(err) = graph.add_edge(relationship.to_edge()) {
        tracing::warn!(%err, "skipping synthetic relationship");
    }
}

/// 按种子生成保单、被保险人、保障、理赔与保费组成的图
pub fn synthetic_graph(seed: u64) -> KnowledgeGraph {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut graph = KnowledgeGraph::new();

    let mut effective_dates = Vec::with_capacity(POLICY_COUNT);
    for i in 0..POLICY_COUNT {
        let id = policy_id(i);
        let effective_date = date_offset(-rng.random_range(30..=730));
        graph.add_node(
            GraphNode::new(&id, "Policy")
                .with_property("policy_number", id.as_str())
                .with_property("effective_date", effective_date.as_str())
                .with_property("expiration_date", date_offset(rng.random_range(30..=365)))
                .with_property("status", pick(&mut rng, &POLICY_STATUSES))
                .with_property("type", pick(&mut rng, &POLICY_KINDS)),
        );
        effective_dates.push(effective_date);
    }

    for i in 0..INSURED_COUNT {
        let contact = json!({
            "email": format!("user{}@example.com", i + 1),
            "phone": format!("555-{}-{}", i + 100, i + 1000),
        });
        graph.add_node(
            GraphNode::new(insured_id(i), "Insured")
                .with_property("name", format!("User {}", i + 1))
                .with_property("id_number", format!("U{}", 5000 + i))
                .with_property("date_of_birth", date_offset(-365 * rng.random_range(20..=80)))
                .with_property("contact_info", contact.to_string()),
        );
    }

    for i in 0..COVERAGE_COUNT {
        let limit = COVERAGE_LIMITS.choose(&mut rng).copied().unwrap_or_default();
        let deductible = DEDUCTIBLES.choose(&mut rng).copied().unwrap_or_default();
        graph.add_node(
            GraphNode::new(coverage_id(i), "Coverage")
                .with_property("type", pick(&mut rng, &COVERAGE_KINDS))
                .with_property("limit", limit)
                .with_property("deductible", deductible),
        );
    }

    let mut loss_dates = Vec::with_capacity(CLAIM_COUNT);
    for i in 0..CLAIM_COUNT {
        let id = claim_id(i);
        let date_of_loss = date_offset(-rng.random_range(1..=365));
        graph.add_node(
            GraphNode::new(&id, "Claim")
                .with_property("claim_number", id.as_str())
                .with_property("date_of_loss", date_of_loss.as_str())
                .with_property("status", pick(&mut rng, &CLAIM_STATUSES))
                .with_property("amount", rng.random_range(500..=50_000u64)),
        );
        loss_dates.push(date_of_loss);
    }

    for i in 0..POLICY_COUNT {
        graph.add_node(
            GraphNode::new(premium_id(i), "Premium")
                .with_property("amount", rng.random_range(500..=5000u64))
                .with_property("payment_frequency", pick(&mut rng, &FREQUENCIES))
                .with_property("due_date", date_offset(rng.random_range(1..=30))),
        );
    }

    let coverage_ids: Vec<String> = (0..COVERAGE_COUNT).map(coverage_id).collect();
    for (i, effective_date) in effective_dates.iter().enumerate() {
        let policy = policy_id(i);
        let insured = if DEMO_POLICIES.contains(&policy.as_str()) {
            DEMO_INSURED.to_string()
        } else {
            insured_id(rng.random_range(0..INSURED_COUNT))
        };
        link(&mut graph, Relationship::new(&policy, insured, "INSURES"));

        let count = rng.random_range(1..=3);
        for coverage in coverage_ids.choose_multiple(&mut rng, count) {
            let mut has_coverage = Relationship::new(&policy, coverage, "HAS_COVERAGE");
            has_coverage
                .properties
                .insert("added_date".to_string(), json!(effective_date));
            link(&mut graph, has_coverage);
        }

        link(&mut graph, Relationship::new(&policy, premium_id(i), "HAS_PREMIUM"));
    }

    let claim_indices: Vec<usize> = (0..CLAIM_COUNT).collect();
    for i in 0..INSURED_COUNT {
        let insured = insured_id(i);
        let mut filed: Vec<usize> = Vec::new();
        if insured == DEMO_INSURED {
            filed.push(1);
        }
        let count = rng.random_range(0..=2);
        for &claim in claim_indices.choose_multiple(&mut rng, count) {
            if !filed.contains(&claim) {
                filed.push(claim);
            }
        }
        for claim in filed {
            let mut files = Relationship::new(&insured, claim_id(claim), "FILES_CLAIM");
            files
                .properties
                .insert("filing_date".to_string(), json!(loss_dates[claim]));
            link(&mut graph, files);
        }
    }

    for i in 0..CLAIM_COUNT {
        if let Some(coverage) = coverage_ids.choose(&mut rng) {
            link(&mut graph, Relationship::new(claim_id(i), coverage, "RELATED_TO"));
        }
    }

    graph
}

/// 为缺失数据补充P9000起的保单及其保障，返回执行的动作说明
pub fn add_missing_data(graph: &mut KnowledgeGraph, rng: &mut StdRng) -> Vec<String> {
    const KINDS: [&str; 3] = ["auto", "home", "health"];
    const COVERAGES: [&str; 5] = ["liability", "collision", "comprehensive", "property", "flood"];
    const LIMITS: [u64; 4] = [50_000, 100_000, 250_000, 500_000];
    const SMALL_DEDUCTIBLES: [u64; 3] = [250, 500, 1000];

    let mut actions = Vec::new();
    let mut nodes = 0;
    let mut edges = 0;
    for i in 0..3 {
        let id = format!("P{}", 9000 + i);
        if graph.contains(&id) {
            continue;
        }
        let effective_date = date_offset(-rng.random_range(30..=730));
        graph.add_node(
            GraphNode::new(&id, "Policy")
                .with_property("policy_number", id.as_str())
                .with_property("effective_date", effective_date.as_str())
                .with_property("expiration_date", date_offset(rng.random_range(30..=365)))
                .with_property("status", "active")
                .with_property("type", pick(rng, &KINDS)),
        );
        nodes += 1;
        actions.push(format!("Generated synthetic policy: {}", id));

        for j in 0..2 {
            let coverage = format!("C{}", 9100 + i * 10 + j);
            let limit = LIMITS.choose(rng).copied().unwrap_or_default();
            let deductible = SMALL_DEDUCTIBLES.choose(rng).copied().unwrap_or_default();
            graph.add_node(
                GraphNode::new(&coverage, "Coverage")
                    .with_property("type", pick(rng, &COVERAGES))
                    .with_property("limit", limit)
                    .with_property("deductible", deductible),
            );
            nodes += 1;
            let mut has_coverage = Relationship::new(&id, &coverage, "HAS_COVERAGE");
            has_coverage
                .properties
                .insert("added_date".to_string(), json!(effective_date));
            link(graph, has_coverage);
            edges += 1;
            actions.push(format!(
                "Generated synthetic coverage: {} for policy {}",
                coverage, id
            ));
        }
    }

    if nodes > 0 {
        actions.push(format!("Added {} synthetic nodes to knowledge graph", nodes));
        actions.push(format!(
            "Added {} synthetic relationships to knowledge graph",
            edges
        ));
    }
    actions
}
