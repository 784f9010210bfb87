//! Output formatting for CLI commands.
//!
//! Provides abstraction layer for outputting results in text or JSON format.

use crate::report::Report;
use anyhow::Result;
use mantle_core::{Metadata, Reference, SyncEntry};
use serde::Serialize;
use std::io::{self, Write};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
    stdout: io::Stdout,
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            stdout: io::stdout(),
        }
    }

    /// Write output using the configured format.
    ///
    /// The `data` parameter must be a serializable struct that includes
    /// `success: bool` and `result_code: u8` fields. The `text_fn` closure is
    /// called only in text mode.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                writeln!(&self.stdout, "{}", json)?;
            }
            OutputFormat::Text => {
                let text = text_fn();
                if !text.is_empty() {
                    write!(&self.stdout, "{}", text)?;
                }
            }
        }
        Ok(())
    }

    /// Write a failure report to stderr.
    pub fn write_error(&self, report: &Report) {
        match self.format {
            OutputFormat::Json => {
                let output = ErrorOutput {
                    success: false,
                    result_code: report.exit_code,
                    error: report.message.clone(),
                };
                if let Ok(json) = serde_json::to_string_pretty(&output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "{}", report.text());
            }
        }
    }
}

// ============================================================================
// Data Transfer Objects (DTOs) for JSON output
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// Output for `init`.
#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub result_code: u8,
    pub root: String,
    pub algorithm: String,
}

/// Output for commands whose only result is a new manifest reference:
/// `create`, `remove`, `merge` and `index`.
#[derive(Debug, Serialize)]
pub struct ManifestOutput {
    pub success: bool,
    pub result_code: u8,
    pub reference: Reference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<usize>,
}

/// An entry as shown by `add` and `list`.
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub path: String,
    pub reference: Reference,
    #[serde(skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

/// Output for `add`.
#[derive(Debug, Serialize)]
pub struct AddOutput {
    pub success: bool,
    pub result_code: u8,
    pub reference: Reference,
    pub entries: Vec<EntryInfo>,
}

/// Output for `sync`.
#[derive(Debug, Serialize)]
pub struct SyncOutput {
    pub success: bool,
    pub result_code: u8,
    pub reference: Reference,
    pub entries: Vec<SyncEntry>,
    pub new: usize,
    pub ok: usize,
    pub removed: usize,
}

/// Output for `list`.
#[derive(Debug, Serialize)]
pub struct ListOutput {
    pub success: bool,
    pub result_code: u8,
    pub root: Reference,
    pub entries: Vec<EntryInfo>,
}

/// Output for `download`.
#[derive(Debug, Serialize)]
pub struct DownloadOutput {
    pub success: bool,
    pub result_code: u8,
    pub destination: String,
    pub paths: Vec<String>,
}
