use std::path::Path;

use serde_json::json;
use signoff_core::Definitions;

use crate::commands::CommandResult;

pub fn run(definitions_path: &Path, chain_id: &str) -> CommandResult {
    let definitions = match Definitions::load(definitions_path) {
        Ok(definitions) => definitions,
        Err(error) => {
            return CommandResult::failure("show-chain", "validation", error.to_string(), 1)
        }
    };

    let Some(chain) = definitions.chains.iter().find(|chain| chain.id.0 == chain_id) else {
        return CommandResult::failure(
            "show-chain",
            "not_found",
            format!("no chain with id `{chain_id}`"),
            2,
        );
    };

    let steps: Vec<serde_json::Value> = chain
        .steps
        .iter()
        .map(|step| {
            json!({
                "number": step.number,
                "name": step.name,
                "consensus": step.consensus,
                "approvers": step.approver_ids,
                "timeout_days": step.timeout_days,
                "escalation_chain": step.escalation_chain,
                "is_optional": step.is_optional,
            })
        })
        .collect();

    CommandResult::success_with_details(
        "show-chain",
        format!("chain `{}` ({}) with {} steps", chain.id.0, chain.name, chain.steps.len()),
        Some(json!({
            "id": chain.id,
            "name": chain.name,
            "active": chain.active,
            "steps": steps,
        })),
    )
}
