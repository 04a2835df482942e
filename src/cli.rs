//! Command-line interface

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::OutputFormat;

/// Resolve Active Directory group membership into identity lists
#[derive(Debug, Parser)]
#[command(name = "adresolve")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Resolve against a JSON directory snapshot instead of LDAP
    #[arg(long, global = true)]
    pub snapshot: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Expand groups into their member identities
    Resolve(ResolveArgs),

    /// Look up identities by account name, UPN or DN
    Lookup(LookupArgs),
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// Group names or distinguished names
    #[arg(required = true)]
    pub groups: Vec<String>,

    /// Only direct members, no nested groups
    #[arg(long)]
    pub direct_only: bool,

    /// Keep disabled accounts
    #[arg(long)]
    pub include_disabled: bool,

    /// Keep only identities whose DN ends with this OU path
    #[arg(long, value_name = "OU")]
    pub ou_suffix: Option<String>,

    /// Extra attribute to fetch (repeatable)
    #[arg(long = "attribute", short = 'a', value_name = "NAME")]
    pub attributes: Vec<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct LookupArgs {
    /// sAMAccountNames, user principal names or distinguished names
    #[arg(required = true)]
    pub keys: Vec<String>,

    /// Suffix used to build a UPN from a bare account name
    #[arg(long, value_name = "SUFFIX")]
    pub domain_suffix: Option<String>,

    /// Extra attribute to fetch (repeatable)
    #[arg(long = "attribute", short = 'a', value_name = "NAME")]
    pub attributes: Vec<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}
