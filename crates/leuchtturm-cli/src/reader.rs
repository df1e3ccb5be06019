use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;

use leuchtturm_core::ModelDescriptor;

pub const CONFIG_FILE: &str = "leuchtturm.config.yaml";

/// Patterns scanned when a directory has no config file.
const DEFAULT_PATTERNS: &[&str] = &["**/*.model.yaml", "**/*.model.yml", "**/*.model.json"];

/// Model descriptors read from one file.
pub struct ModelFile {
    pub path: PathBuf,
    pub models: Vec<ModelDescriptor>,
}

/// Project configuration from leuchtturm.config.yaml.
#[derive(Debug, Default, Deserialize)]
pub struct ProjectConfig {
    pub name: Option<String>,
    pub version: Option<String>,
    pub vocab: Option<String>,
    pub sources: Option<Vec<String>>,
}

/// Read model files from a path (file or directory).
pub fn read_model_files(input_path: &Path) -> Result<Vec<ModelFile>> {
    if !input_path.exists() {
        bail!("Path does not exist: {}", input_path.display());
    }

    if input_path.is_file() {
        return Ok(vec![read_model_file(input_path)?]);
    }

    if input_path.is_dir() {
        let config_path = input_path.join(CONFIG_FILE);
        let paths = if config_path.exists() {
            let config = read_config(&config_path)?;
            match config.sources {
                Some(patterns) if !patterns.is_empty() => expand(input_path, &patterns)?,
                _ => scan_directory(input_path)?,
            }
        } else {
            scan_directory(input_path)?
        };
        return paths.iter().map(|p| read_model_file(p)).collect();
    }

    bail!(
        "Path is neither a file nor a directory: {}",
        input_path.display()
    )
}

/// Read the project config of a directory, if it has one.
pub fn read_project_config(dir_path: &Path) -> Result<Option<ProjectConfig>> {
    let config_path = dir_path.join(CONFIG_FILE);
    if !dir_path.is_dir() || !config_path.exists() {
        return Ok(None);
    }
    read_config(&config_path).map(Some)
}

fn read_config(config_path: &Path) -> Result<ProjectConfig> {
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config {}", config_path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Invalid YAML config {}", config_path.display()))
}

fn scan_directory(dir_path: &Path) -> Result<Vec<PathBuf>> {
    let patterns: Vec<String> = DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect();
    expand(dir_path, &patterns)
}

/// Expand glob patterns relative to `base_dir`. Each pattern's matches are
/// sorted; a file matched by several patterns is kept once.
fn expand(base_dir: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut paths: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let full_pattern = base_dir.join(pattern);
        let pattern_str = full_pattern.to_string_lossy().replace('\\', "/");
        let entries = glob::glob(&pattern_str)
            .with_context(|| format!("Invalid glob pattern '{pattern}'"))?;

        let mut matched: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let path = entry.context("Glob error")?;
            if seen.insert(path.clone()) {
                matched.push(path);
            }
        }
        matched.sort();
        paths.extend(matched);
    }

    Ok(paths)
}

/// A model file holds either one descriptor or a `models:` list of them.
fn read_model_file(path: &Path) -> Result<ModelFile> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let document: Value = if path.extension().is_some_and(|e| e == "json") {
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?
    } else {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid YAML in {}", path.display()))?
    };

    let models = match document {
        Value::Object(mut map) if map.contains_key("models") => {
            let list = map.remove("models").unwrap_or(Value::Null);
            serde_json::from_value(list)
        }
        other => serde_json::from_value(other).map(|model| vec![model]),
    }
    .with_context(|| format!("Invalid model descriptor in {}", path.display()))?;

    Ok(ModelFile {
        path: path.to_path_buf(),
        models,
    })
}
