use crate::error::{BatchError, Result};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const INPUT_PLACEHOLDER: &str = "{input}";
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Matches `42`, `42%`, `progress: 42` and `Progress=42 %`.
pub const DEFAULT_PROGRESS_PATTERN: &str = r"(?i)^\s*(?:progress\s*[:=]?\s*)?(\d{1,3})\s*%?\s*$";

/// How to invoke the external watermark remover, read from YAML.
///
/// ```yaml
/// program: sorawm
/// args: ["--input", "{input}", "--output", "{output}"]
/// quiet_args: ["--quiet"]
/// progress_pattern: '^PROGRESS (\d+)$'
/// ```
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RemoverConfig {
    pub program: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Appended to `args` when running quietly.
    #[serde(default = "default_quiet_args")]
    pub quiet_args: Vec<String>,
    /// Regex applied to each stdout line; the first capture group is the
    /// completion percentage.
    #[serde(default = "default_progress_pattern")]
    pub progress_pattern: String,
}

fn default_args() -> Vec<String> {
    vec![INPUT_PLACEHOLDER.to_string(), OUTPUT_PLACEHOLDER.to_string()]
}

fn default_quiet_args() -> Vec<String> {
    vec!["--quiet".to_string()]
}

fn default_progress_pattern() -> String {
    DEFAULT_PROGRESS_PATTERN.to_string()
}

impl Default for RemoverConfig {
    fn default() -> Self {
        Self {
            program: "sorawm".to_string(),
            args: default_args(),
            quiet_args: default_quiet_args(),
            progress_pattern: default_progress_pattern(),
        }
    }
}

impl RemoverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(BatchError::ConfigValidationError(
                "RemoverConfig: program must not be empty".to_string(),
            ));
        }
        for placeholder in [INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER] {
            if !self.args.iter().any(|arg| arg.contains(placeholder)) {
                return Err(BatchError::ConfigValidationError(format!(
                    "RemoverConfig: args must reference {}",
                    placeholder
                )));
            }
        }
        let re = self.compile_progress_pattern()?;
        if re.captures_len() < 2 {
            return Err(BatchError::ConfigValidationError(
                "RemoverConfig: progress_pattern needs a capture group for the percentage"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn compile_progress_pattern(&self) -> Result<Regex> {
        Regex::new(&self.progress_pattern).map_err(|e| {
            BatchError::ConfigValidationError(format!(
                "RemoverConfig: invalid progress_pattern '{}': {}",
                self.progress_pattern, e
            ))
        })
    }
}

/// Loads and validates a remover config YAML file.
pub fn load_remover_config<P: AsRef<Path>>(config_path: P) -> Result<RemoverConfig> {
    let path_ref = config_path.as_ref();
    let config_content = fs::read_to_string(path_ref).map_err(|e| {
        BatchError::ConfigError(format!(
            "Failed to read remover config file '{}': {}",
            path_ref.display(),
            e
        ))
    })?;

    let config: RemoverConfig = serde_yaml::from_str(&config_content).map_err(|e| {
        BatchError::ConfigError(format!(
            "Failed to parse remover config YAML from '{}': {}",
            path_ref.display(),
            e
        ))
    })?;
    config.validate()?;
    Ok(config)
}

/// The file at `config_path` if given, otherwise the defaults.
pub fn load_or_default(config_path: Option<&Path>) -> Result<RemoverConfig> {
    match config_path {
        Some(path) => load_remover_config(path),
        None => Ok(RemoverConfig::default()),
    }
}
