//! Memoizing identity lookup
//!
//! Entries live for one run and are never evicted or refreshed. Directory
//! state is assumed not to change mid-run.

use std::collections::HashMap;

use super::directory::{Directory, DirectoryError};
use super::ldap_filter::{looks_like_dn, LdapFilter};
use super::record::requested_attributes;
use crate::domain::Identity;
use crate::error::{AppError, AppResult};

/// Hit/miss counters for the run summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

pub struct IdentityCache<'a> {
    directory: &'a dyn Directory,
    entries: HashMap<String, Identity>,
    stats: CacheStats,
}

impl<'a> IdentityCache<'a> {
    pub fn new(directory: &'a dyn Directory) -> Self {
        Self {
            directory,
            entries: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Look up an identity by sAMAccountName, user principal name or DN.
    ///
    /// `domain_suffix` is appended to form a UPN candidate unless the key
    /// already carries an `@` or is a DN. A cached entry is returned without
    /// touching the directory; otherwise exactly one query is issued and its
    /// result remembered under the original key.
    pub fn get(&mut self, key: &str, domain_suffix: Option<&str>, attributes: &[String]) -> AppResult<Identity> {
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::InvalidInput("lookup key must not be empty".to_string()));
        }

        if let Some(identity) = self.entries.get(key) {
            self.stats.hits += 1;
            tracing::debug!(key = key, "Identity cache hit");
            return Ok(identity.clone());
        }
        self.stats.misses += 1;

        let attrs = requested_attributes(attributes, true);
        let identity = if looks_like_dn(key) {
            tracing::debug!(key = key, "Identity cache miss, reading by DN");
            let record = self.directory.get_by_dn(key, &attrs).map_err(|e| match e {
                DirectoryError::NoSuchObject(_) => AppError::NotFound(key.to_string()),
                other => AppError::from(other),
            })?;
            record.into_identity(key)
        } else {
            let upn = qualify(key, domain_suffix);
            let filter = LdapFilter::account(key, &upn);
            tracing::debug!(key = key, filter = %filter, "Identity cache miss, searching");

            let mut records = self.directory.find(&filter, &attrs)?;
            match records.len() {
                0 => return Err(AppError::NotFound(key.to_string())),
                1 => records.remove(0).into_identity(key),
                count => {
                    tracing::warn!(key = key, count = count, "Lookup key matched more than one object");
                    return Err(AppError::AmbiguousMatch {
                        key: key.to_string(),
                        count,
                    });
                }
            }
        };

        self.entries.insert(key.to_string(), identity.clone());
        Ok(identity)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key.trim())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

/// Append `@suffix` unless the key is already qualified
fn qualify(key: &str, domain_suffix: Option<&str>) -> String {
    match domain_suffix.map(|s| s.trim().trim_start_matches('@')) {
        Some(suffix) if !suffix.is_empty() && !key.contains('@') => format!("{}@{}", key, suffix),
        _ => key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory_directory::{DirectoryCall, InMemoryDirectory};

    const ALICE: &str = "CN=Alice,OU=Staff,DC=ex,DC=edu";

    fn directory() -> InMemoryDirectory {
        let mut dir = InMemoryDirectory::new();
        dir.add_user(ALICE, "alice", true)
            .add_user("CN=Bob,OU=Staff,DC=ex,DC=edu", "bob", true)
            .add_user("CN=Bob,OU=Alumni,DC=ex,DC=edu", "bob2", true)
            .add_group("CN=AllStaff,OU=Groups,DC=ex,DC=edu", "AllStaff", &[ALICE]);
        dir.set_attribute(
            "CN=Bob,OU=Staff,DC=ex,DC=edu",
            "userPrincipalName",
            crate::domain::AttributeValue::Single("rsmith@ex.edu".to_string()),
        );
        dir.set_attribute(
            "CN=Bob,OU=Alumni,DC=ex,DC=edu",
            "userPrincipalName",
            crate::domain::AttributeValue::Single("bob@ex.edu".to_string()),
        );
        dir
    }

    #[test]
    fn test_qualify() {
        assert_eq!(qualify("alice", Some("ex.edu")), "alice@ex.edu");
        assert_eq!(qualify("alice", Some("@ex.edu")), "alice@ex.edu");
        assert_eq!(qualify("alice@other.edu", Some("ex.edu")), "alice@other.edu");
        assert_eq!(qualify("alice", None), "alice");
    }

    #[test]
    fn test_second_get_does_not_query_directory() {
        let dir = directory();
        let mut cache = IdentityCache::new(&dir);

        let first = cache.get("alice", Some("ex.edu"), &[]).unwrap();
        assert_eq!(dir.call_count(), 1);

        let second = cache.get("alice", Some("ex.edu"), &[]).unwrap();
        assert_eq!(dir.call_count(), 1);
        assert_eq!(first, second);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn test_dn_key_uses_direct_lookup() {
        let dir = directory();
        let mut cache = IdentityCache::new(&dir);

        let identity = cache.get(ALICE, Some("ex.edu"), &[]).unwrap();
        assert_eq!(identity.sam_account_name(), Some("alice"));
        assert_eq!(dir.calls(), vec![DirectoryCall::GetByDn(ALICE.to_string())]);
        assert!(identity.is_attribute_complete());
    }

    #[test]
    fn test_not_found() {
        let dir = directory();
        let mut cache = IdentityCache::new(&dir);

        assert!(matches!(cache.get("nobody", None, &[]), Err(AppError::NotFound(_))));
        assert!(matches!(
            cache.get("CN=Nobody,DC=ex,DC=edu", None, &[]),
            Err(AppError::NotFound(_))
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_ambiguous_is_distinct_from_not_found() {
        let dir = directory();
        let mut cache = IdentityCache::new(&dir);

        // "bob" is one account's sAMAccountName and the other's UPN prefix
        let err = cache.get("bob", Some("ex.edu"), &[]).unwrap_err();
        match err {
            AppError::AmbiguousMatch { key, count } => {
                assert_eq!(key, "bob");
                assert_eq!(count, 2);
            }
            other => panic!("expected AmbiguousMatch, got {:?}", other),
        }
        assert!(!cache.contains("bob"));
    }

    #[test]
    fn test_directory_failure_propagates() {
        let dir = directory();
        dir.set_unavailable(true);
        let mut cache = IdentityCache::new(&dir);

        assert!(matches!(
            cache.get("alice", None, &[]),
            Err(AppError::DirectoryUnavailable(_))
        ));
    }

    #[test]
    fn test_empty_key_rejected() {
        let dir = directory();
        let mut cache = IdentityCache::new(&dir);
        assert!(matches!(cache.get("  ", None, &[]), Err(AppError::InvalidInput(_))));
        assert_eq!(dir.call_count(), 0);
    }
}
