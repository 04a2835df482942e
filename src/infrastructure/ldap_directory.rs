//! Active Directory access over LDAP
//!
//! Synchronous `ldap3` connection, bound once per run. The recursive
//! membership primitive uses the in-chain matching rule and runs under its own
//! time limit so a slow expansion surfaces as [`DirectoryError::Timeout`].

use ldap3::{LdapConn, LdapConnSettings, LdapError, Scope, SearchEntry, SearchOptions};
use std::cell::RefCell;
use std::time::Duration;

use super::directory::{Directory, DirectoryError, DirectoryResult};
use super::ldap_filter::{escape_ldap_filter, looks_like_dn, LdapFilter, LDAP_MATCHING_RULE_IN_CHAIN};
use super::record::DirectoryRecord;
use crate::config::LdapSettings;
use crate::error::{AppError, AppResult};

/// LDAP result codes the resolver cares about
const RC_TIME_LIMIT_EXCEEDED: u32 = 3;
const RC_SIZE_LIMIT_EXCEEDED: u32 = 4;
const RC_NO_SUCH_OBJECT: u32 = 32;

pub struct LdapDirectory {
    conn: RefCell<LdapConn>,
    base_dn: String,
    search_timeout: Duration,
    fast_path_timeout: Duration,
}

impl LdapDirectory {
    /// Connect and bind with the configured service account
    pub fn connect(settings: &LdapSettings) -> AppResult<Self> {
        let password = settings.bind_password().ok_or_else(|| {
            AppError::ConfigError("no bind password configured for the LDAP connection".to_string())
        })?;

        tracing::info!(url = %settings.url, bind_dn = %settings.bind_dn, "Connecting to directory");

        let conn_settings =
            LdapConnSettings::new().set_conn_timeout(Duration::from_secs(settings.connect_timeout_secs));
        let mut conn = LdapConn::with_settings(conn_settings, &settings.url).map_err(|e| {
            tracing::error!(url = %settings.url, error = %e, "LDAP connection failed");
            AppError::DirectoryUnavailable(format!("Failed to connect to {}: {}", settings.url, e))
        })?;

        conn.simple_bind(&settings.bind_dn, &password)
            .and_then(|r| r.success())
            .map_err(|e| {
                tracing::error!(bind_dn = %settings.bind_dn, error = %e, "LDAP bind failed");
                AppError::DirectoryUnavailable(format!("Bind as {} failed: {}", settings.bind_dn, e))
            })?;

        tracing::info!(url = %settings.url, "Directory connection established");

        Ok(Self {
            conn: RefCell::new(conn),
            base_dn: settings.base_dn.clone(),
            search_timeout: Duration::from_secs(settings.search_timeout_secs),
            fast_path_timeout: Duration::from_secs(settings.fast_path_timeout_secs),
        })
    }

    // TODO: switch to the PagedResults adapter so groups larger than the
    // server's MaxPageSize come back complete instead of sizeLimitExceeded.
    fn search(
        &self,
        base: &str,
        scope: Scope,
        filter: &str,
        attributes: &[&str],
        timeout: Duration,
    ) -> DirectoryResult<Vec<DirectoryRecord>> {
        tracing::debug!(base_dn = base, filter = filter, scope = ?scope, "LDAP search");

        let mut conn = self.conn.borrow_mut();
        let time_limit = i32::try_from(timeout.as_secs()).unwrap_or(i32::MAX);
        let (entries, _) = conn
            .with_search_options(SearchOptions::new().timelimit(time_limit))
            .with_timeout(timeout)
            .search(base, scope, filter, attributes.to_vec())
            .and_then(|r| r.success())
            .map_err(|e| classify(e, filter))?;

        let records: Vec<DirectoryRecord> = entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(entry_to_record)
            .collect();

        tracing::debug!(base_dn = base, result_count = records.len(), "LDAP search completed");
        Ok(records)
    }

    fn resolve_group_dn(&self, group: &str) -> DirectoryResult<String> {
        if looks_like_dn(group) {
            return Ok(group.to_string());
        }

        let records = self.find(&LdapFilter::group_named(group), &["distinguishedName"])?;
        single_group_dn(group, records)
    }
}

impl Directory for LdapDirectory {
    fn find(&self, filter: &LdapFilter, attributes: &[&str]) -> DirectoryResult<Vec<DirectoryRecord>> {
        self.search(
            &self.base_dn,
            Scope::Subtree,
            &filter.to_ldap_string(),
            attributes,
            self.search_timeout,
        )
    }

    fn get_by_dn(&self, dn: &str, attributes: &[&str]) -> DirectoryResult<DirectoryRecord> {
        self.search(dn, Scope::Base, "(objectClass=*)", attributes, self.search_timeout)?
            .into_iter()
            .next()
            .ok_or_else(|| DirectoryError::NoSuchObject(dn.to_string()))
    }

    fn group_members(
        &self,
        group: &str,
        recursive: bool,
        attributes: &[&str],
    ) -> DirectoryResult<Vec<DirectoryRecord>> {
        let group_dn = self.resolve_group_dn(group)?;

        let (filter, timeout) = if recursive {
            (
                format!(
                    "(&(!(objectClass=group))(memberOf:{}:={}))",
                    LDAP_MATCHING_RULE_IN_CHAIN,
                    escape_ldap_filter(&group_dn)
                ),
                self.fast_path_timeout,
            )
        } else {
            (
                format!(
                    "(&(!(objectClass=group))(memberOf={}))",
                    escape_ldap_filter(&group_dn)
                ),
                self.search_timeout,
            )
        };

        self.search(&self.base_dn, Scope::Subtree, &filter, attributes, timeout)
    }
}

impl Drop for LdapDirectory {
    fn drop(&mut self) {
        if let Err(e) = self.conn.get_mut().unbind() {
            tracing::warn!(error = %e, "LDAP unbind failed");
        }
    }
}

/// Map an ldap3 error onto the directory error taxonomy
fn classify(err: LdapError, context: &str) -> DirectoryError {
    match err {
        LdapError::Timeout { .. } => {
            tracing::warn!(filter = context, "LDAP operation timed out on the client");
            DirectoryError::Timeout(format!("client time limit reached for {}", context))
        }
        LdapError::LdapResult { result } => match result.rc {
            RC_TIME_LIMIT_EXCEEDED => {
                tracing::warn!(filter = context, "LDAP server reported timeLimitExceeded");
                DirectoryError::Timeout(format!("server time limit reached for {}", context))
            }
            RC_NO_SUCH_OBJECT => DirectoryError::NoSuchObject(result.matched.clone()),
            RC_SIZE_LIMIT_EXCEEDED => DirectoryError::Unavailable(format!(
                "size limit exceeded for {}: {}",
                context, result.text
            )),
            rc => DirectoryError::Unavailable(format!("LDAP error {} for {}: {}", rc, context, result.text)),
        },
        other => DirectoryError::Unavailable(other.to_string()),
    }
}

/// The DN of the only group matched by name
fn single_group_dn(group: &str, mut records: Vec<DirectoryRecord>) -> DirectoryResult<String> {
    match records.len() {
        0 => Err(DirectoryError::NoSuchObject(group.to_string())),
        1 => Ok(records.remove(0).dn),
        count => Err(DirectoryError::Ambiguous {
            name: group.to_string(),
            count,
        }),
    }
}

fn entry_to_record(entry: SearchEntry) -> DirectoryRecord {
    let mut record = DirectoryRecord::new(entry.dn);
    for (name, values) in entry.attrs {
        record.set(&name, values);
    }
    record
}
