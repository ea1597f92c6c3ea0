//! The `studybuddy init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    write_if_missing(Path::new("studybuddy.toml"), SAMPLE_CONFIG)?;
    write_if_missing(Path::new("courses.toml"), SAMPLE_CATALOG)?;

    println!("\nNext steps:");
    println!("  1. Edit studybuddy.toml with your API keys");
    println!("  2. Run: studybuddy check-catalog --catalog courses.toml");
    println!("  3. Run: studybuddy serve");

    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)?;
        println!("Created {}", path.display());
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# studybuddy configuration

default_provider = "openai"
# default_model = "gpt-4o-mini"
temperature = 0.7
max_tokens = 1000
mastery_threshold = 0.7
generation_timeout_secs = 60
bind = "127.0.0.1:8000"
catalog = "courses.toml"
# Omit to keep all state in memory.
database_url = "sqlite://studybuddy.db"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

[providers.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"

[providers.ollama]
type = "ollama"
base_url = "http://localhost:11434"

# Offline canned replies, useful for local development.
[providers.mock]
type = "mock"
"#;

const SAMPLE_CATALOG: &str = r#"[[courses]]
id = "COMP401"
name = "Foundations of Programming"
description = "Object-oriented programming and basic data structures."
topics = ["Classes", "Interfaces", "Recursion", "Linked Lists"]

[[courses]]
id = "COMP410"
name = "Data Structures"
description = "Analysis and implementation of core data structures."
topics = ["Big-O Analysis", "Heaps", "Hash Tables", "Graphs"]
"#;
