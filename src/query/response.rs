//! 回答模板、模板数据准备与追问生成

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::intent::{
    CLAIM_STATUS, COVERAGE_INQUIRY, DEFINITION_INQUIRY, FILING_CLAIM, POLICY_DETAILS,
    PREMIUM_INFORMATION,
};
use super::params::QueryParameters;
use super::QueryResults;
use crate::graph::{Binding, QueryResult};
use crate::graph::query::split_property;
use crate::utils::text::{format_currency, parse_amount};

pub type Slots = BTreeMap<String, String>;

pub const DEFAULT_TEMPLATES: &str = "default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseTemplate {
    pub template: String,
    #[serde(default)]
    pub required_slots: Vec<String>,
    #[serde(default)]
    pub optional_slots: Vec<String>,
    /// 这些槽位存在时模板不适用
    #[serde(default)]
    pub absent_slots: Vec<String>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl ResponseTemplate {
    pub fn new(template: &str, required_slots: &[&str]) -> Self {
        Self {
            template: template.to_string(),
            required_slots: owned(required_slots),
            optional_slots: Vec::new(),
            absent_slots: Vec::new(),
        }
    }

    pub fn optional(mut self, slots: &[&str]) -> Self {
        self.optional_slots = owned(slots);
        self
    }

    pub fn unless(mut self, slots: &[&str]) -> Self {
        self.absent_slots = owned(slots);
        self
    }

    pub fn applies(&self, slots: &Slots) -> bool {
        self.required_slots.iter().all(|s| slots.contains_key(s))
            && !self.absent_slots.iter().any(|s| slots.contains_key(s))
    }

    /// 填充槽位，未提供的可选槽位置空
    pub fn render(&self, slots: &Slots) -> String {
        let mut text = self.template.clone();
        for (slot, value) in slots {
            text = text.replace(&format!("{{{}}}", slot), value);
        }
        for slot in &self.optional_slots {
            text = text.replace(&format!("{{{}}}", slot), "");
        }
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

pub fn default_templates() -> BTreeMap<String, Vec<ResponseTemplate>> {
    let mut templates = BTreeMap::new();
    templates.insert(
        POLICY_DETAILS.to_string(),
        vec![
            ResponseTemplate::new(
                "Your policy {policy_number} is a {policy_type} insurance policy with an effective date of {effective_date} and expiration date of {expiration_date}. {additional_info}",
                &["policy_number", "policy_type", "effective_date", "expiration_date"],
            )
            .optional(&["additional_info"]),
            ResponseTemplate::new(
                "I found your {policy_type} policy. It's currently {status} and covers you from {effective_date} to {expiration_date}.",
                &["policy_type", "status", "effective_date", "expiration_date"],
            ),
        ],
    );
    templates.insert(
        COVERAGE_INQUIRY.to_string(),
        vec![
            ResponseTemplate::new(
                "For {peril_type}, your policy provides coverage up to {limit} with a deductible of {deductible}.",
                &["peril_type", "limit", "deductible"],
            ),
            ResponseTemplate::new(
                "Your policy includes the following coverages: {coverage_list}. {limit_info}",
                &["coverage_list"],
            )
            .optional(&["limit_info"]),
        ],
    );
    templates.insert(
        CLAIM_STATUS.to_string(),
        vec![
            ResponseTemplate::new(
                "Your claim {claim_number} is currently {status}. {additional_info}",
                &["claim_number", "status"],
            )
            .optional(&["additional_info"]),
            ResponseTemplate::new(
                "The claim you filed on {date_filed} for {claim_type} is {status}. The assigned adjuster is {adjuster}.",
                &["date_filed", "claim_type", "status", "adjuster"],
            ),
        ],
    );
    templates.insert(
        PREMIUM_INFORMATION.to_string(),
        vec![
            ResponseTemplate::new(
                "Your premium is {amount} paid {frequency}. Your next payment is due on {due_date}.",
                &["amount", "frequency", "due_date"],
            ),
            ResponseTemplate::new(
                "You're currently paying {amount} {frequency} for your insurance. {payment_status}",
                &["amount", "frequency"],
            )
            .optional(&["payment_status"]),
        ],
    );
    templates.insert(
        FILING_CLAIM.to_string(),
        vec![ResponseTemplate::new(
            "To file a claim, you'll need to: 1) Report the incident immediately, 2) Gather all relevant information including {required_info}, 3) Contact our claims department at {contact_info}.",
            &["required_info", "contact_info"],
        )],
    );
    templates.insert(
        DEFINITION_INQUIRY.to_string(),
        vec![
            ResponseTemplate::new(
                "According to the insurance documentation, {term} means: {meaning}",
                &["term", "meaning"],
            ),
            ResponseTemplate::new(
                "I don't have a definition for {term} in my knowledge base.",
                &["term"],
            )
            .unless(&["meaning"]),
        ],
    );
    templates.insert(
        DEFAULT_TEMPLATES.to_string(),
        vec![
            ResponseTemplate::new(
                "I don't have enough information to answer your query about {topic}. Could you provide more details?",
                &["topic"],
            ),
            ResponseTemplate::new(
                "I'm not sure I understand your question. Can you rephrase it or provide more specific details about what you're looking for?",
                &[],
            ),
        ],
    );
    templates
}

/// 生成的回答
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedResponse {
    pub answer: String,
    pub success: bool,
    #[serde(default)]
    pub slots: Slots,
}

pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn display_values(values: &[Value]) -> String {
    values.iter().map(display_value).collect::<Vec<_>>().join(", ")
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

fn as_currency(value: &Value) -> String {
    match numeric(value) {
        Some(amount) => format_currency(amount),
        None => format!("${}", display_value(value)),
    }
}

/// 图查询属性 -> (槽位名, 展示文本)
fn graph_slot(alias: &str, prop: &str, values: &[Value]) -> (String, String) {
    let text = display_values(values);
    let currency = || values.iter().map(as_currency).collect::<Vec<_>>().join(", ");
    let (slot, value) = match (alias, prop) {
        ("p", "type") => ("policy_type", text),
        ("c", "type") => ("coverage_type", text),
        ("pr", "amount") => ("amount", currency()),
        ("c", "amount") => ("claim_amount", currency()),
        (_, "date_of_loss") => ("date_filed", text),
        (_, "payment_frequency") => ("frequency", text),
        (_, "limit") => ("limit", currency()),
        (_, "deductible") => ("deductible", currency()),
        (_, other) => (other, text),
    };
    (slot.to_string(), value)
}

fn add_policy_status(slots: &mut Slots) {
    if let Some(status) = slots.get("status") {
        let info = format!("The policy is currently {}.", status);
        slots.insert("additional_info".to_string(), info);
    }
}

/// 将查询结果映射为模板槽位
pub fn prepare_template_data(intent: &str, results: &QueryResults, params: &QueryParameters) -> Slots {
    let mut slots = Slots::new();

    match results {
        QueryResults::Procedural(info) => {
            slots.insert("required_info".to_string(), info.required_info.clone());
            slots.insert("contact_info".to_string(), info.contact.clone());
        }
        QueryResults::Definition(found) => {
            if let Some(term) = &params.term {
                slots.insert("term".to_string(), term.clone());
            }
            if let Some(found) = found {
                slots.insert("term".to_string(), found.term.clone());
                slots.insert("meaning".to_string(), found.meaning.clone());
            }
        }
        QueryResults::Graph(result) => {
            for (key, values) in &result.properties {
                if values.is_empty() {
                    continue;
                }
                let (alias, prop) = split_property(key);
                let (slot, value) = graph_slot(alias, prop, values);
                slots.insert(slot, value);
            }

            match intent {
                COVERAGE_INQUIRY => fill_coverage_slots(&mut slots, result, params),
                CLAIM_STATUS => {
                    if let Some(amount) = slots.get("claim_amount") {
                        let info = format!("The claimed amount is {}.", amount);
                        slots.insert("additional_info".to_string(), info);
                    }
                }
                POLICY_DETAILS => add_policy_status(&mut slots),
                _ => {}
            }
        }
        QueryResults::Empty => {}
    }

    slots
}

fn fill_coverage_slots(slots: &mut Slots, result: &QueryResult, params: &QueryParameters) {
    // 多条覆盖时limit/deductible要按险种重新取
    slots.remove("limit");
    slots.remove("deductible");

    let mut coverage_types: Vec<String> = Vec::new();
    let mut total_limit = 0.0;
    for binding in &result.bindings {
        if let Some(kind) = binding.properties.get("c.type") {
            let kind = display_value(kind);
            if !coverage_types.contains(&kind) {
                coverage_types.push(kind);
            }
        }
        if let Some(limit) = binding.properties.get("c.limit").and_then(numeric) {
            total_limit += limit;
        }
    }
    if !coverage_types.is_empty() {
        slots.insert("coverage_list".to_string(), coverage_types.join(", "));
    }
    if total_limit > 0.0 {
        let total = format_currency(total_limit);
        slots.insert(
            "limit_info".to_string(),
            format!("The total coverage limit is {}.", total),
        );
        slots.insert("total_limit".to_string(), total);
    }

    let Some(wanted) = params.coverage_types.first() else {
        return;
    };
    slots.insert("peril_type".to_string(), wanted.clone());
    let matching = result.bindings.iter().find(|b| {
        b.properties
            .get("c.type")
            .is_some_and(|t| display_value(t).eq_ignore_ascii_case(wanted))
    });
    if let Some(binding) = matching {
        if let Some(limit) = binding.properties.get("c.limit") {
            slots.insert("limit".to_string(), as_currency(limit));
        }
        if let Some(deductible) = binding.properties.get("c.deductible") {
            slots.insert("deductible".to_string(), as_currency(deductible));
        }
    }
}

fn readable(intent: &str) -> String {
    intent.replace('_', " ")
}

/// 查询无结果时的回答，指出缺少的参数
pub fn no_results_response(intent: &str, params: &QueryParameters) -> GeneratedResponse {
    let answer = match intent {
        POLICY_DETAILS => match &params.policy_number {
            Some(number) => format!(
                "I couldn't find any policy with the number {}. Please check if the policy number is correct.",
                number
            ),
            None => "I need a policy number to provide policy details. Could you please provide your policy number?".to_string(),
        },
        CLAIM_STATUS => match &params.claim_number {
            Some(number) => format!(
                "I couldn't find any claim with the number {}. Please check if the claim number is correct.",
                number
            ),
            None => "I need a claim number to provide claim status. Could you please provide your claim number?".to_string(),
        },
        _ => format!(
            "I couldn't find any information about your {} query. Could you provide more details?",
            readable(intent)
        ),
    };
    GeneratedResponse {
        answer,
        success: false,
        slots: Slots::new(),
    }
}

pub fn generate_response(
    intent: &str,
    results: &QueryResults,
    params: &QueryParameters,
    templates: &BTreeMap<String, Vec<ResponseTemplate>>,
) -> GeneratedResponse {
    let slots = prepare_template_data(intent, results, params);

    if let QueryResults::Definition(None) = results {
        let answer = match params.term.as_deref() {
            Some(term) => templates
                .get(DEFINITION_INQUIRY)
                .and_then(|list| list.iter().find(|t| t.applies(&slots)))
                .map(|t| t.render(&slots))
                .unwrap_or_else(|| format!("No definition found for '{}'", term)),
            None => return no_results_response(intent, params),
        };
        return GeneratedResponse {
            answer,
            success: false,
            slots,
        };
    }

    if results.count() == 0 {
        return no_results_response(intent, params);
    }

    if let QueryResults::Graph(result) = results
        && result.bindings.len() > 1
        && matches!(intent, POLICY_DETAILS | PREMIUM_INFORMATION)
    {
        return render_per_binding(intent, result, slots, templates);
    }

    render_slots(intent, slots, templates)
}

fn binding_slots(intent: &str, binding: &Binding) -> Slots {
    let mut slots = Slots::new();
    for (key, value) in &binding.properties {
        let (alias, prop) = split_property(key);
        let (slot, text) = graph_slot(alias, prop, std::slice::from_ref(value));
        slots.insert(slot, text);
    }
    if intent == POLICY_DETAILS {
        add_policy_status(&mut slots);
    }
    slots
}

/// 多个保单时每个匹配单独成句；都无法渲染时退回合并槽位
fn render_per_binding(
    intent: &str,
    result: &QueryResult,
    slots: Slots,
    templates: &BTreeMap<String, Vec<ResponseTemplate>>,
) -> GeneratedResponse {
    let mut sentences: Vec<String> = Vec::new();
    for binding in &result.bindings {
        let own = binding_slots(intent, binding);
        let number = own.get("policy_number").cloned();
        let rendered = render_slots(intent, own, templates);
        if !rendered.success {
            continue;
        }
        let sentence = match number {
            Some(number) if intent == PREMIUM_INFORMATION => {
                format!("For policy {}: {}", number, rendered.answer)
            }
            _ => rendered.answer,
        };
        if !sentences.contains(&sentence) {
            sentences.push(sentence);
        }
    }

    if sentences.is_empty() {
        return render_slots(intent, slots, templates);
    }
    GeneratedResponse {
        answer: sentences.join(" "),
        success: true,
        slots,
    }
}

/// 按槽位选择意图模板，没有模板适用时退回默认模板
pub fn render_slots(
    intent: &str,
    slots: Slots,
    templates: &BTreeMap<String, Vec<ResponseTemplate>>,
) -> GeneratedResponse {
    let selected = templates
        .get(intent)
        .into_iter()
        .flatten()
        .find(|t| t.applies(&slots));

    match selected {
        Some(template) => GeneratedResponse {
            answer: template.render(&slots),
            success: true,
            slots,
        },
        None => {
            let mut fallback_slots = Slots::new();
            fallback_slots.insert("topic".to_string(), readable(intent));
            let answer = templates
                .get(DEFAULT_TEMPLATES)
                .into_iter()
                .flatten()
                .find(|t| t.applies(&fallback_slots))
                .map(|t| t.render(&fallback_slots))
                .unwrap_or_else(|| {
                    format!(
                        "I don't have enough information to answer your query about {}.",
                        readable(intent)
                    )
                });
            GeneratedResponse {
                answer,
                success: false,
                slots: fallback_slots,
            }
        }
    }
}

/// 根据当前上下文生成最多3个追问
pub fn follow_up_questions(intent: &str, params: &QueryParameters, results: &QueryResults) -> Vec<String> {
    let mut follow_ups: Vec<String> = Vec::new();
    match intent {
        POLICY_DETAILS => {
            follow_ups.push("What does this policy cover?".to_string());
            follow_ups.push("How much is my premium?".to_string());
            if let Some(number) = &params.policy_number {
                follow_ups.push(format!("Have there been any claims on policy {}?", number));
            }
        }
        COVERAGE_INQUIRY => {
            follow_ups.push("What's my deductible for this coverage?".to_string());
            follow_ups.push("How do I file a claim for this type of incident?".to_string());
            if let QueryResults::Graph(result) = results
                && let Some(first) = result.first("c.type")
            {
                follow_ups.push(format!(
                    "What's my coverage limit for {}?",
                    display_value(first)
                ));
            }
        }
        CLAIM_STATUS => {
            follow_ups.push("When will this claim be processed?".to_string());
            follow_ups.push("What documents do you need for this claim?".to_string());
            if let Some(number) = &params.claim_number {
                follow_ups.push(format!("Who is the adjuster for claim {}?", number));
            }
        }
        PREMIUM_INFORMATION => {
            follow_ups.push("Can I change my payment frequency?".to_string());
            follow_ups.push("Are there any discounts available?".to_string());
            follow_ups.push("What happens if I miss a payment?".to_string());
        }
        FILING_CLAIM => {
            follow_ups.push("How long does the claim process take?".to_string());
            follow_ups.push("What documentation do I need for my claim?".to_string());
            follow_ups.push("Will filing a claim affect my premium?".to_string());
        }
        DEFINITION_INQUIRY => {
            if let Some(term) = &params.term {
                follow_ups.push(format!("Does my policy cover anything related to {}?", term));
            }
        }
        _ => {}
    }
    follow_ups.truncate(3);
    follow_ups
}
