use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::RuleError;
use crate::rule::Rule;

/// Loads rules from a JSON or YAML file, or from every such file in a
/// directory (in file-name order).
pub fn load_rules(path: impl AsRef<Path>) -> Result<Vec<Rule>, RuleError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(RuleError::MissingPath(path.display().to_string()));
    }

    let mut rules = if path.is_dir() {
        load_from_directory(path)?
    } else {
        load_from_file(path)?
    };

    assign_ids(&mut rules);
    deduplicate(&rules)?;
    debug!(path = %path.display(), count = rules.len(), "loaded rules");

    Ok(rules)
}

/// Parses rules from an in-memory document. `origin` is only used in errors.
pub fn parse_rules(raw: &str, origin: impl Into<PathBuf>) -> Result<Vec<Rule>, RuleError> {
    let mut rules = parse_document(raw, &origin.into())?;
    assign_ids(&mut rules);
    deduplicate(&rules)?;
    Ok(rules)
}

fn load_from_directory(path: &Path) -> Result<Vec<Rule>, RuleError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(path).map_err(|err| RuleError::from_io(path, err))? {
        let entry = entry.map_err(|err| RuleError::from_io(path, err))?;
        let file_type = entry
            .file_type()
            .map_err(|err| RuleError::from_io(entry.path(), err))?;
        if file_type.is_dir() {
            continue;
        }

        if let Some(ext) = entry.path().extension().and_then(|value| value.to_str()) {
            if matches!(ext, "json" | "yaml" | "yml") {
                files.push(entry.path());
            }
        }
    }
    files.sort();

    let mut rules = Vec::new();
    for file in files {
        rules.append(&mut load_from_file(&file)?);
    }
    Ok(rules)
}

fn load_from_file(path: &Path) -> Result<Vec<Rule>, RuleError> {
    let raw = fs::read_to_string(path).map_err(|err| RuleError::from_io(path, err))?;
    parse_document(&raw, path)
}

fn parse_document(raw: &str, path: &Path) -> Result<Vec<Rule>, RuleError> {
    let mut attempts = Vec::new();

    // YAML is a superset of JSON, so one parser covers both formats.
    match serde_yaml::from_str::<RuleDocument>(raw) {
        Ok(doc) => return Ok(doc.rules),
        Err(err) => attempts.push(format!("rules document ({err})")),
    }

    match serde_yaml::from_str::<Vec<Rule>>(raw) {
        Ok(list) => return Ok(list),
        Err(err) => attempts.push(format!("list ({err})")),
    }

    match serde_yaml::from_str::<Rule>(raw) {
        Ok(rule) if !rule.events.is_empty() || !rule.actions.is_empty() => return Ok(vec![rule]),
        Ok(_) => attempts.push("single (no events or actions)".to_string()),
        Err(err) => attempts.push(format!("single ({err})")),
    }

    let message = format!("unable to parse rules using {} formats", attempts.join(", "));
    Err(RuleError::parse_error(path.to_path_buf(), message))
}

fn assign_ids(rules: &mut [Rule]) {
    for (index, rule) in rules.iter_mut().enumerate() {
        if rule.id.trim().is_empty() {
            rule.id = format!("rule-{index}");
        }
    }
}

fn deduplicate(rules: &[Rule]) -> Result<(), RuleError> {
    let mut seen = HashSet::new();
    for rule in rules {
        if !seen.insert(rule.id.as_str()) {
            return Err(RuleError::DuplicateRule {
                id: rule.id.clone(),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleDocument {
    rules: Vec<Rule>,
}
