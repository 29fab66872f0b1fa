use std::fs;
use std::path::Path;

use signoff_core::{Definitions, Document, RoutingEngine};

use crate::commands::CommandResult;

pub fn run(definitions_path: &Path, document_path: &Path) -> CommandResult {
    let definitions = match Definitions::load(definitions_path) {
        Ok(definitions) => definitions,
        Err(error) => return CommandResult::failure("route", "validation", error.to_string(), 1),
    };

    let document = match read_document(document_path) {
        Ok(document) => document,
        Err(message) => return CommandResult::failure("route", "document", message, 1),
    };

    match RoutingEngine::default().route(&document, &definitions.rules, &definitions.chains) {
        Ok(outcome) => CommandResult::success_with_details(
            "route",
            format!("document `{}` routes to chain `{}`", document.id.0, outcome.chain_id.0),
            serde_json::to_value(&outcome).ok(),
        ),
        Err(error) => CommandResult::failure("route", "routing", error.to_string(), 2),
    }
}

fn read_document(path: &Path) -> Result<Document, String> {
    let contents = fs::read_to_string(path)
        .map_err(|error| format!("could not read document file `{}`: {error}", path.display()))?;
    serde_json::from_str(&contents)
        .map_err(|error| format!("could not parse document file `{}`: {error}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::run;

    const DEFINITIONS: &str = r#"
[[chains]]
id = "invoice-review"
name = "Invoice review"

[[chains.steps]]
number = 1
name = "review"
approver_ids = ["alice"]
consensus = "any"

[[rules]]
id = "invoices"
name = "All invoices"
target_chain_id = "invoice-review"
priority = 10

[[rules.conditions]]
field = "type"
operator = "equals"
value = "invoice"
"#;

    const DOCUMENT: &str = r#"
{
  "id": "doc-1",
  "type": "invoice",
  "title": "Q3 invoice",
  "value": 1200.0,
  "department": "finance",
  "confidentiality": "internal",
  "metadata": { "region": "emea" }
}
"#;

    fn temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write");
        file
    }

    #[test]
    fn routes_a_document_against_the_definitions() {
        let definitions = temp(DEFINITIONS);
        let document = temp(DOCUMENT);

        let result = run(definitions.path(), document.path());
        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("invoice-review"));
        assert!(result.output.contains("Matched rule: All invoices"));
    }

    #[test]
    fn unroutable_documents_exit_nonzero() {
        let definitions = temp(DEFINITIONS);
        let document = temp(&DOCUMENT.replace("invoice", "memo"));

        let result = run(definitions.path(), document.path());
        assert_eq!(result.exit_code, 2);
        assert!(result.output.contains("\"error_class\":\"routing\""));
    }
}
