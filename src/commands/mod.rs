//! Command orchestration
//!
//! Each command drives the cache or resolver over a list of inputs, keeps
//! going past per-input failures and returns a report whose error counter
//! decides the process exit status.

pub mod lookup;
pub mod resolve;

pub use lookup::*;
pub use resolve::*;

use clap::ValueEnum;
use serde::Serialize;
use std::io::Write;

use crate::domain::Identity;
use crate::error::{AppError, AppResult, CommandError};

/// Output format for command reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One identity per line followed by a summary
    #[default]
    Text,
    /// Pretty-printed JSON report
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// One input (group or lookup key) that could not be processed
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub input: String,
    #[serde(flatten)]
    pub error: CommandError,
}

impl Failure {
    pub fn new(input: &str, error: &AppError) -> Self {
        Self {
            input: input.to_string(),
            error: CommandError::from(error),
        }
    }
}

/// Behaviour shared by the command reports
pub trait Report: Serialize {
    fn identities(&self) -> &[Identity];

    fn failures(&self) -> &[Failure];

    fn error_count(&self) -> usize {
        self.failures().len()
    }

    fn summary(&self) -> String;
}

/// Errors that end the whole run instead of a single input
pub(crate) fn is_fatal(err: &AppError) -> bool {
    matches!(err, AppError::DirectoryUnavailable(_) | AppError::ConfigError(_))
}

/// Write `report` to `out` in the chosen format
pub fn write_report<R: Report>(
    report: &R,
    format: OutputFormat,
    attributes: &[String],
    out: &mut dyn Write,
) -> AppResult<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, report)?;
            writeln!(out)?;
        }
        OutputFormat::Text => {
            for identity in report.identities() {
                writeln!(out, "{}", format_identity(identity, attributes))?;
            }
            for failure in report.failures() {
                writeln!(
                    out,
                    "error: {}: [{}] {}",
                    failure.input, failure.error.code, failure.error.message
                )?;
            }
            writeln!(out, "{}", report.summary())?;
        }
    }
    Ok(())
}

/// `sAMAccountName<TAB>DN[<TAB>name=value...]`, multi-valued attributes joined with `;`
pub fn format_identity(identity: &Identity, attributes: &[String]) -> String {
    let mut line = format!(
        "{}\t{}",
        identity.sam_account_name().unwrap_or("-"),
        identity.distinguished_name
    );
    for name in attributes {
        let values = identity.values(name);
        if !values.is_empty() {
            line.push('\t');
            line.push_str(name);
            line.push('=');
            line.push_str(&values.join(";"));
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AttributeValue;

    #[test]
    fn test_format_identity() {
        let mut identity = Identity::new("alice", "CN=Alice,OU=Staff,DC=ex,DC=edu");
        identity.attributes.insert("sAMAccountName", AttributeValue::Single("alice".to_string()));
        identity.attributes.insert(
            "serialNumber",
            AttributeValue::Multi(vec!["SN1".to_string(), "SN2".to_string()]),
        );

        let attrs = vec!["serialNumber".to_string(), "mail".to_string()];
        assert_eq!(
            format_identity(&identity, &attrs),
            "alice\tCN=Alice,OU=Staff,DC=ex,DC=edu\tserialNumber=SN1;SN2"
        );
    }

    #[test]
    fn test_format_identity_without_sam() {
        let identity = Identity::new("x", "CN=X,DC=ex,DC=edu");
        assert_eq!(format_identity(&identity, &[]), "-\tCN=X,DC=ex,DC=edu");
    }

    #[test]
    fn test_failure_serializes_flat() {
        let failure = Failure::new("Ghosts", &AppError::GroupNotFound("Ghosts".to_string()));
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["input"], "Ghosts");
        assert_eq!(json["code"], "GROUP_NOT_FOUND");
    }

    #[test]
    fn test_fatal_errors() {
        assert!(is_fatal(&AppError::DirectoryUnavailable("down".to_string())));
        assert!(!is_fatal(&AppError::DirectoryTimeout("slow".to_string())));
        assert!(!is_fatal(&AppError::NotFound("x".to_string())));
    }
}
