use serde::{Deserialize, Serialize};

use crate::domain::chain::{ApprovalChain, ChainId};
use crate::domain::document::Document;
use crate::errors::EngineError;
use crate::rules::{RoutingCondition, RuleEvaluator};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub id: String,
    pub name: String,
    pub conditions: Vec<RoutingCondition>,
    pub target_chain_id: ChainId,
    pub priority: i32,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
}

fn default_is_active() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingOutcome {
    pub chain_id: ChainId,
    pub reason: String,
}

/// Selects the approval chain a document routes to. Pure function of its
/// inputs: the same document, rules, and chains always produce the same
/// outcome.
#[derive(Clone, Copy, Debug, Default)]
pub struct RoutingEngine {
    evaluator: RuleEvaluator,
}

impl RoutingEngine {
    pub fn route(
        &self,
        document: &Document,
        rules: &[RoutingRule],
        chains: &[ApprovalChain],
    ) -> Result<RoutingOutcome, EngineError> {
        let mut active: Vec<&RoutingRule> = rules.iter().filter(|rule| rule.is_active).collect();
        // Stable sort: equal priorities keep registration order, so the
        // first-registered rule wins ties.
        active.sort_by(|left, right| right.priority.cmp(&left.priority));

        for rule in active {
            if !self.evaluator.evaluate(&rule.conditions, document) {
                continue;
            }
            match active_chain(chains, &rule.target_chain_id) {
                Some(chain) => {
                    return Ok(RoutingOutcome {
                        chain_id: chain.id.clone(),
                        reason: format!("Matched rule: {}", rule.name),
                    });
                }
                None => {
                    tracing::warn!(
                        event_name = "routing.rule_target_unavailable",
                        rule_id = %rule.id,
                        chain_id = %rule.target_chain_id.0,
                        "matched rule targets a missing or inactive chain; trying next rule"
                    );
                }
            }
        }

        if let Some(chain) = default_chain_for(chains, &document.doc_type) {
            return Ok(RoutingOutcome {
                chain_id: chain.id.clone(),
                reason: "Default routing for document type".to_string(),
            });
        }

        Err(EngineError::NoChainAvailable { document_id: document.id.0.clone() })
    }
}

fn active_chain<'a>(chains: &'a [ApprovalChain], id: &ChainId) -> Option<&'a ApprovalChain> {
    chains.iter().find(|chain| chain.active && &chain.id == id)
}

/// Name-based default lookup: an active chain whose name mentions the
/// document type, else an active chain literally named "default".
fn default_chain_for<'a>(chains: &'a [ApprovalChain], doc_type: &str) -> Option<&'a ApprovalChain> {
    let doc_type = doc_type.trim().to_lowercase();
    chains
        .iter()
        .find(|chain| {
            chain.active && !doc_type.is_empty() && chain.name.to_lowercase().contains(&doc_type)
        })
        .or_else(|| {
            chains.iter().find(|chain| chain.active && chain.name.trim().eq_ignore_ascii_case("default"))
        })
}
