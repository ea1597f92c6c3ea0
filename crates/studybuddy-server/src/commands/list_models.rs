//! The `studybuddy list-models` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::Table;

use studybuddy_core::traits::ModelInfo;
use studybuddy_providers::ollama::OllamaProvider;
use studybuddy_providers::{create_provider, ProviderConfig};

pub async fn execute(provider_filter: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let config = studybuddy_providers::load_config_from(config_path.as_deref())?;

    let mut names: Vec<&String> = config.providers.keys().collect();
    names.sort();

    let mut table = Table::new();
    table.set_header(vec!["Provider", "Model", "Name", "Context"]);
    let mut found_any = false;

    for name in names {
        if provider_filter.as_ref().is_some_and(|f| f != name) {
            continue;
        }
        let provider_config = &config.providers[name];

        let models: Vec<ModelInfo> = match provider_config {
            ProviderConfig::Ollama { base_url } => {
                match OllamaProvider::new(base_url).list_models_async().await {
                    Ok(models) => models,
                    Err(e) => {
                        println!("Provider {name}: {e}");
                        continue;
                    }
                }
            }
            _ => create_provider(name, provider_config)?.available_models(),
        };

        for model in models {
            found_any = true;
            let context = if model.max_context > 0 {
                format!("{}K", model.max_context / 1000)
            } else {
                "-".to_string()
            };
            let marker = if *name == config.default_provider { " *" } else { "" };
            table.add_row(vec![
                format!("{name}{marker}"),
                model.id,
                model.name,
                context,
            ]);
        }
    }

    if found_any {
        println!("{table}");
    } else {
        println!("No providers configured. Run `studybuddy init` to create a config file.");
    }

    Ok(())
}
