use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use leuchtturm_core::{Manager, ModelId, Operation};

use crate::load_manager;

#[derive(Serialize)]
struct ModelFields {
    model: ModelId,
    #[serde(rename = "type")]
    type_name: String,
    fields: Vec<OperationField>,
}

#[derive(Serialize)]
struct OperationField {
    operation: Operation,
    name: String,
    mutation: bool,
}

pub fn run_fields(input_path: &Path, vocab: Option<&str>, format: &str) -> Result<String> {
    let manager = load_manager(input_path, vocab)?;
    let models = collect(&manager)?;

    match format {
        "json" => serde_json::to_string_pretty(&serde_json::json!({
            "vocab": manager.vocab().id(),
            "models": models,
        }))
        .context("JSON serialization error"),
        _ => {
            let mut lines: Vec<String> = Vec::new();
            for model in &models {
                lines.push(format!("{} ({})", model.type_name, model.model));
                for field in &model.fields {
                    let root = if field.mutation { "Mutation" } else { "Query" };
                    lines.push(format!(
                        "  {} {:<24} {root}",
                        field.operation.letter(),
                        field.name
                    ));
                }
            }

            let count = models.len();
            let model_word = if count == 1 { "model" } else { "models" };
            lines.push(format!(
                "{} fields for {count} {model_word}.",
                count * Operation::ALL.len()
            ));
            Ok(lines.join("\n"))
        }
    }
}

fn collect(manager: &Manager) -> Result<Vec<ModelFields>> {
    let mut models = Vec::new();
    for id in manager.models() {
        let factory = manager.factory(&id)?;
        let mut fields = Vec::new();
        for operation in Operation::ALL {
            let field = manager.field(operation, id.clone())?;
            let built = field
                .build()
                .with_context(|| format!("Failed to derive {operation} for {id}"))?;
            fields.push(OperationField {
                operation,
                name: built.name().to_string(),
                mutation: operation.is_mutation(),
            });
        }
        models.push(ModelFields {
            model: id,
            type_name: factory.name().to_string(),
            fields,
        });
    }
    Ok(models)
}
