use std::path::Path;

use signoff_core::Definitions;

use crate::commands::CommandResult;

pub fn run(definitions_path: &Path) -> CommandResult {
    match Definitions::load(definitions_path) {
        Ok(definitions) => CommandResult::success(
            "check",
            format!(
                "definitions valid: {} chains, {} rules, {} documents, {} approvers",
                definitions.chains.len(),
                definitions.rules.len(),
                definitions.documents.len(),
                definitions.approvers.len()
            ),
        ),
        Err(error) => CommandResult::failure("check", "validation", error.to_string(), 1),
    }
}
