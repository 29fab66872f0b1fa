use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::collaborators::ApproverProfile;
use crate::domain::chain::ApprovalChain;
use crate::domain::document::Document;
use crate::errors::EngineError;
use crate::routing::RoutingRule;

/// The declarative inputs the engine runs against: chain and rule
/// definitions, plus optional seed documents and approver profiles for
/// the in-memory collaborators. Loaded at bootstrap and by the CLI.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Definitions {
    #[serde(default)]
    pub chains: Vec<ApprovalChain>,
    #[serde(default)]
    pub rules: Vec<RoutingRule>,
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub approvers: Vec<ApproverProfile>,
}

impl Definitions {
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path).map_err(|error| {
            EngineError::Validation(format!(
                "could not read definitions file `{}`: {error}",
                path.display()
            ))
        })?;
        let definitions: Self = toml::from_str(&contents).map_err(|error| {
            EngineError::Validation(format!(
                "could not parse definitions file `{}`: {error}",
                path.display()
            ))
        })?;
        definitions.validate()?;
        Ok(definitions)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let mut chain_ids = BTreeSet::new();
        for chain in &self.chains {
            chain.validate()?;
            if !chain_ids.insert(chain.id.clone()) {
                return Err(EngineError::Validation(format!(
                    "duplicate chain id `{}`",
                    chain.id.0
                )));
            }
        }

        let mut rule_ids = BTreeSet::new();
        for rule in &self.rules {
            if !rule_ids.insert(rule.id.clone()) {
                return Err(EngineError::Validation(format!("duplicate rule id `{}`", rule.id)));
            }
            if rule.name.trim().is_empty() {
                return Err(EngineError::Validation(format!("rule `{}` has no name", rule.id)));
            }
            if !chain_ids.contains(&rule.target_chain_id) {
                return Err(EngineError::Validation(format!(
                    "rule `{}` targets unknown chain `{}`",
                    rule.id, rule.target_chain_id.0
                )));
            }
        }

        Ok(())
    }
}
