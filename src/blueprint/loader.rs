use crate::blueprint::Subrequest;
use crate::blueprint::parser::BlueprintParser;
use anyhow::{Context as AnyhowContext, Result};
use std::fs;
use std::io::Read;
use std::path::Path;

/// Reads the raw blueprint source. A path of "-" reads stdin instead, so the
/// CLI can be used at the end of a pipe.
pub fn read_blueprint(path: &Path) -> Result<String> {
    if path.to_str() == Some("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read the blueprint from stdin")?;
        return Ok(buffer);
    }
    fs::read_to_string(path)
        .with_context(|| format!("Failed to read blueprint file {}", path.display()))
}

/// Reads and parses a blueprint file in one go.
pub fn load_blueprint_from_file(path: &Path) -> Result<Vec<Subrequest>> {
    let content = read_blueprint(path)?;
    let parsed = BlueprintParser::new()
        .parse_str(&content)
        .with_context(|| format!("Failed to parse blueprint file {}", path.display()))?;
    Ok(parsed)
}
