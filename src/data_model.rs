use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix prepended to every output filename.
pub const OUTPUT_PREFIX: &str = "cleaned_";

/// One discovered input file and the path its cleaned copy is written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    input_path: PathBuf,
    output_path: PathBuf,
}

impl WorkItem {
    /// Builds an item for `input_path`, deriving the output path as
    /// `<output_dir>/cleaned_<file name>`.
    pub fn new(input_path: PathBuf, output_dir: &Path) -> Self {
        let output_path = output_dir.join(output_file_name(&input_path));
        Self {
            input_path,
            output_path,
        }
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// File name of the input, used as the key in reports.
    pub fn file_name(&self) -> String {
        self.input_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.input_path.display().to_string())
    }
}

/// `cleaned_<name>` for the final component of `input_path`.
pub fn output_file_name(input_path: &Path) -> String {
    let name = input_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}{}", OUTPUT_PREFIX, name)
}

/// Result of processing one WorkItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    Success { output_path: PathBuf },
    Failure { error_detail: String },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success { .. })
    }
}
