//! Identity lookup command

use serde::Serialize;

use super::{is_fatal, Failure, Report};
use crate::domain::Identity;
use crate::error::AppResult;
use crate::infrastructure::{CacheStats, Directory, IdentityCache};

/// Inputs for a lookup run
#[derive(Debug, Clone, Default)]
pub struct LookupOptions {
    pub keys: Vec<String>,
    pub domain_suffix: Option<String>,
    pub attributes: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupReport {
    pub identities: Vec<Identity>,
    /// Ambiguous keys; reported but not counted as errors
    pub warnings: Vec<Failure>,
    pub errors: Vec<Failure>,
    pub cache: CacheStats,
    pub summary: String,
}

impl Report for LookupReport {
    fn identities(&self) -> &[Identity] {
        &self.identities
    }

    fn failures(&self) -> &[Failure] {
        &self.errors
    }

    fn summary(&self) -> String {
        self.summary.clone()
    }
}

/// Look up each key through one cache, so repeated keys cost a single query.
pub fn lookup_keys(directory: &dyn Directory, options: &LookupOptions) -> AppResult<LookupReport> {
    let mut cache = IdentityCache::new(directory);
    let mut identities = Vec::new();
    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    for key in &options.keys {
        match cache.get(key, options.domain_suffix.as_deref(), &options.attributes) {
            Ok(identity) => identities.push(identity),
            Err(e) if is_fatal(&e) => {
                tracing::error!(key = %key, error = %e, "Directory failure, aborting lookup");
                return Err(e);
            }
            Err(e) if e.is_data_quality() => {
                tracing::warn!(key = %key, error = %e, "Lookup key is ambiguous");
                warnings.push(Failure::new(key, &e));
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Lookup failed");
                errors.push(Failure::new(key, &e));
            }
        }
    }

    let summary = format!(
        "found {} identities for {} keys, {} warnings, {} errors",
        identities.len(),
        options.keys.len(),
        warnings.len(),
        errors.len()
    );
    tracing::info!(
        found = identities.len(),
        warnings = warnings.len(),
        errors = errors.len(),
        cache_hits = cache.stats().hits,
        cache_misses = cache.stats().misses,
        "Lookup finished"
    );

    Ok(LookupReport {
        identities,
        warnings,
        errors,
        cache: cache.stats(),
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AttributeValue;
    use crate::infrastructure::InMemoryDirectory;

    fn directory() -> InMemoryDirectory {
        let mut dir = InMemoryDirectory::new();
        dir.add_user("CN=Alice,OU=Staff,DC=ex,DC=edu", "alice", true)
            .add_user("CN=Bob,OU=Staff,DC=ex,DC=edu", "bob", true)
            .add_user("CN=Robert,OU=Alumni,DC=ex,DC=edu", "robert", true)
            .set_attribute(
                "CN=Robert,OU=Alumni,DC=ex,DC=edu",
                "userPrincipalName",
                AttributeValue::Single("bob@ex.edu".to_string()),
            );
        dir
    }

    #[test]
    fn test_lookup_counts_warnings_and_errors() {
        let dir = directory();
        let options = LookupOptions {
            keys: vec!["alice".into(), "bob".into(), "nobody".into(), "alice".into()],
            domain_suffix: Some("ex.edu".to_string()),
            attributes: Vec::new(),
        };

        let report = lookup_keys(&dir, &options).unwrap();
        assert_eq!(report.identities.len(), 2);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].error.code, "AMBIGUOUS_MATCH");
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.errors[0].input, "nobody");
        assert_eq!(report.cache, CacheStats { hits: 1, misses: 3 });
        assert_eq!(report.summary, "found 2 identities for 4 keys, 1 warnings, 1 errors");
    }

    #[test]
    fn test_lookup_without_suffix_is_not_ambiguous() {
        let dir = directory();
        let options = LookupOptions {
            keys: vec!["bob".into()],
            ..Default::default()
        };

        let report = lookup_keys(&dir, &options).unwrap();
        assert_eq!(report.identities.len(), 1);
        assert!(report.warnings.is_empty());
    }
}
