pub mod cli;
pub mod commands;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod logging;

use std::io::Write;
use std::process::ExitCode;

use cli::{Cli, Command};
use commands::{lookup_keys, resolve_groups, write_report, LookupOptions, Report, ResolveOptions};
use config::AppConfig;
use error::{AppError, AppResult};
use infrastructure::{Directory, InMemoryDirectory, LdapDirectory};

/// Exit status when every input was processed
const EXIT_OK: u8 = 0;
/// Exit status when some inputs failed
const EXIT_PARTIAL: u8 = 1;
/// Exit status when the run could not proceed at all
const EXIT_FATAL: u8 = 2;

pub fn run(cli: Cli) -> ExitCode {
    let config = match cli.config.as_deref() {
        Some(path) => match AppConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("error: {}", e);
                return ExitCode::from(EXIT_FATAL);
            }
        },
        None => AppConfig::default(),
    };

    let _guard = logging::init_logging(&config.logging);

    tracing::info!("adresolve starting");

    match execute(&cli, &config) {
        Ok(0) => ExitCode::from(EXIT_OK),
        Ok(errors) => {
            tracing::warn!(errors = errors, "Run finished with errors");
            ExitCode::from(EXIT_PARTIAL)
        }
        Err(e) => {
            tracing::error!(code = e.error_code(), error = %e, "Run failed");
            eprintln!("error: {}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

/// Dispatch the command; returns the number of failed inputs
fn execute(cli: &Cli, config: &AppConfig) -> AppResult<usize> {
    let directory = open_directory(cli, config)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let errors = match &cli.command {
        Command::Resolve(args) => {
            let attributes = merge_attributes(&config.resolver.attributes, &args.attributes);
            let options = ResolveOptions {
                groups: args.groups.clone(),
                attributes: attributes.clone(),
                recursive: config.resolver.recursive && !args.direct_only,
                include_disabled: config.resolver.include_disabled || args.include_disabled,
                ou_suffix: args.ou_suffix.clone(),
            };
            let report = resolve_groups(directory.as_ref(), &options)?;
            write_report(&report, args.format, &attributes, &mut out)?;
            report.error_count()
        }
        Command::Lookup(args) => {
            let attributes = merge_attributes(&config.resolver.attributes, &args.attributes);
            let options = LookupOptions {
                keys: args.keys.clone(),
                domain_suffix: args
                    .domain_suffix
                    .clone()
                    .or_else(|| config.resolver.domain_suffix.clone()),
                attributes: attributes.clone(),
            };
            let report = lookup_keys(directory.as_ref(), &options)?;
            write_report(&report, args.format, &attributes, &mut out)?;
            for warning in &report.warnings {
                eprintln!("warning: {}: {}", warning.input, warning.error.message);
            }
            report.error_count()
        }
    };

    out.flush()?;
    Ok(errors)
}

fn open_directory(cli: &Cli, config: &AppConfig) -> AppResult<Box<dyn Directory>> {
    if let Some(path) = cli.snapshot.as_deref() {
        return Ok(Box::new(InMemoryDirectory::load(path)?));
    }

    let ldap = config.ldap.as_ref().ok_or_else(|| {
        AppError::ConfigError("no [ldap] section configured and no --snapshot given".to_string())
    })?;
    Ok(Box::new(LdapDirectory::connect(ldap)?))
}

/// Configured attributes followed by command-line ones, case-insensitively de-duplicated
fn merge_attributes(configured: &[String], requested: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for attr in configured.iter().chain(requested) {
        if !merged.iter().any(|a| a.eq_ignore_ascii_case(attr)) {
            merged.push(attr.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_attributes() {
        let configured = vec!["mail".to_string(), "displayName".to_string()];
        let requested = vec!["Mail".to_string(), "serialNumber".to_string()];
        assert_eq!(
            merge_attributes(&configured, &requested),
            vec!["mail", "displayName", "serialNumber"]
        );
    }

    #[test]
    fn test_open_directory_requires_ldap_or_snapshot() {
        let cli = <Cli as clap::Parser>::parse_from(["adresolve", "lookup", "alice"]);
        let err = open_directory(&cli, &AppConfig::default()).err().unwrap();
        assert!(matches!(err, AppError::ConfigError(_)));
    }
}
