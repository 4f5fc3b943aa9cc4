//! Output formatting for CLI commands

use serde::Serialize;

use crate::domain::DependencyError;
use crate::storage;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl From<storage::OutputFormat> for OutputFormat {
    fn from(format: storage::OutputFormat) -> Self {
        match format {
            storage::OutputFormat::Text => OutputFormat::Text,
            storage::OutputFormat::Json => OutputFormat::Json,
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Prints a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Text => println!("{}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "success": true,
                        "message": message
                    })
                );
            }
        }
    }

    /// Prints a failed command's error
    ///
    /// Dependency-rule refusals carry their stable code in JSON mode.
    pub fn failure(&self, err: &anyhow::Error) {
        match self.format {
            OutputFormat::Text => eprintln!("Error: {:#}", err),
            OutputFormat::Json => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "success": false,
                        "code": error_code(err),
                        "error": format!("{:#}", err)
                    })
                );
            }
        }
    }

    /// Prints structured data
    pub fn data<T: Serialize>(&self, data: &T) {
        match self.format {
            OutputFormat::Text => {
                // Fallback for callers without a text rendering
                if let Ok(json) = serde_json::to_string_pretty(data) {
                    println!("{}", json);
                }
            }
            OutputFormat::Json => {
                if let Ok(json) = serde_json::to_string(data) {
                    println!("{}", json);
                }
            }
        }
    }

    /// Returns true if using JSON format
    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}

/// Machine-readable code for an error
pub fn error_code(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<DependencyError>()
        .map(DependencyError::code)
        .unwrap_or("error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_errors_keep_their_code() {
        let err = anyhow::Error::new(DependencyError::NotFound("d-0000001".parse().unwrap()))
            .context("Failed to remove dependency");

        assert_eq!(error_code(&err), "not_found");
        assert_eq!(error_code(&anyhow::anyhow!("disk full")), "error");
    }

    #[test]
    fn config_format_maps_to_cli_format() {
        assert_eq!(
            OutputFormat::from(storage::OutputFormat::Json),
            OutputFormat::Json
        );
    }
}
