use anyhow::{Context, Result};
use looplens_scheduler::{GeneratorConfig, LineMode};
use std::path::Path;

/// Settings given on the command line. They win over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub max_iterations: Option<usize>,
    pub line_mode: Option<LineMode>,
}

pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<GeneratorConfig> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            parse(&text).with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => GeneratorConfig::default(),
    };

    if let Some(max_iterations) = overrides.max_iterations {
        config.max_iterations = max_iterations;
    }
    if let Some(line_mode) = overrides.line_mode {
        config.line_mode = line_mode;
    }
    tracing::debug!(?config, "generator config");
    Ok(config)
}

fn parse(text: &str) -> Result<GeneratorConfig> {
    Ok(serde_json::from_str(text)?)
}
