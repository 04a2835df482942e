//! Group resolution command

use serde::Serialize;

use super::{is_fatal, Failure, Report};
use crate::domain::{dn_ends_with, GroupIdentifier, Identity, MemberFilter, ResolutionResult};
use crate::error::AppResult;
use crate::infrastructure::{CacheStats, Directory, GroupResolver, ResolverStats};

/// Inputs for a resolve run
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub groups: Vec<String>,
    pub attributes: Vec<String>,
    pub recursive: bool,
    pub include_disabled: bool,
    /// Keep only identities whose DN ends with this OU path
    pub ou_suffix: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveReport {
    pub identities: Vec<Identity>,
    pub groups_requested: usize,
    pub groups_resolved: usize,
    pub errors: Vec<Failure>,
    pub resolver: ResolverStats,
    pub cache: CacheStats,
    pub summary: String,
}

impl Report for ResolveReport {
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

/// Resolve every requested group, continuing past per-group failures.
///
/// Members are merged by DN across groups, backfilled once, then filtered.
/// A member whose attributes cannot be read is left out and counted as an
/// error. Returns `Err` only when the directory itself is unusable.
pub fn resolve_groups(directory: &dyn Directory, options: &ResolveOptions) -> AppResult<ResolveReport> {
    let mut resolver = GroupResolver::new(directory);
    let mut merged = ResolutionResult::new();
    let mut errors = Vec::new();
    let mut resolved = 0;

    for raw in &options.groups {
        let outcome = GroupIdentifier::new(raw.as_str()).and_then(|group| {
            resolver.collect(&group, &options.attributes, options.recursive, &mut merged)
        });

        match outcome {
            Ok(()) => resolved += 1,
            Err(e) if is_fatal(&e) => {
                tracing::error!(group = %raw, error = %e, "Directory failure, aborting resolution");
                return Err(e);
            }
            Err(e) => {
                tracing::error!(group = %raw, error = %e, "Failed to resolve group");
                errors.push(Failure::new(raw, &e));
            }
        }
    }

    let (identities, unreadable) = resolver.backfill_partial(merged, &options.attributes)?;
    for (dn, e) in &unreadable {
        tracing::error!(dn = %dn, error = %e, "Failed to read member attributes");
        errors.push(Failure::new(dn, e));
    }

    let mut filter = MemberFilter::new(options.include_disabled);
    if let Some(ou) = options.ou_suffix.as_deref() {
        filter = filter.with_predicate(dn_ends_with(ou));
    }
    let identities = filter.apply(identities);

    let summary = format!(
        "resolved {} identities from {} groups, {} errors",
        identities.len(),
        resolved,
        errors.len()
    );
    tracing::info!(
        identities = identities.len(),
        groups = resolved,
        errors = errors.len(),
        fast_path = resolver.stats().fast_path,
        slow_path = resolver.stats().slow_path,
        backfilled = resolver.stats().backfilled,
        "Resolution finished"
    );

    Ok(ResolveReport {
        identities,
        groups_requested: options.groups.len(),
        groups_resolved: resolved,
        errors,
        resolver: resolver.stats(),
        cache: resolver.cache().stats(),
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::InMemoryDirectory;

    const ALICE: &str = "CN=Alice,OU=Staff,DC=ex,DC=edu";
    const BOB: &str = "CN=Bob,OU=Staff,DC=ex,DC=edu";
    const DAVE: &str = "CN=Dave,OU=Faculty,DC=ex,DC=edu";

    fn directory() -> InMemoryDirectory {
        let mut dir = InMemoryDirectory::new();
        dir.add_user(ALICE, "alice", true)
            .add_user(BOB, "bob", false)
            .add_user(DAVE, "dave", true)
            .add_group("CN=Staff,OU=Groups,DC=ex,DC=edu", "Staff", &[ALICE, BOB])
            .add_group("CN=Faculty,OU=Groups,DC=ex,DC=edu", "Faculty", &[DAVE, ALICE]);
        dir
    }

    fn options(groups: &[&str]) -> ResolveOptions {
        ResolveOptions {
            groups: groups.iter().map(|g| g.to_string()).collect(),
            recursive: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_merges_groups_by_dn() {
        let dir = directory();
        let report = resolve_groups(&dir, &options(&["Staff", "Faculty"])).unwrap();

        let dns: Vec<&str> = report.identities.iter().map(|i| i.distinguished_name.as_str()).collect();
        assert_eq!(dns, vec![ALICE, DAVE]);
        assert_eq!(report.groups_resolved, 2);
        assert_eq!(report.error_count(), 0);
        assert_eq!(report.summary, "resolved 2 identities from 2 groups, 0 errors");
    }

    #[test]
    fn test_continues_past_failed_group() {
        let dir = directory();
        let report = resolve_groups(&dir, &options(&["Ghosts", "Staff", "  "])).unwrap();

        assert_eq!(report.identities.len(), 1);
        assert_eq!(report.groups_requested, 3);
        assert_eq!(report.groups_resolved, 1);
        assert_eq!(report.error_count(), 2);
        assert_eq!(report.errors[0].error.code, "GROUP_NOT_FOUND");
        assert_eq!(report.errors[1].error.code, "INVALID_INPUT");
        assert!(report.summary.ends_with("2 errors"));
    }

    #[test]
    fn test_ou_suffix_and_disabled() {
        let dir = directory();
        let mut opts = options(&["Staff", "Faculty"]);
        opts.include_disabled = true;
        opts.ou_suffix = Some("ou=staff,dc=ex,dc=edu".to_string());

        let report = resolve_groups(&dir, &opts).unwrap();
        let sams: Vec<&str> = report.identities.iter().filter_map(|i| i.sam_account_name()).collect();
        assert_eq!(sams, vec!["alice", "bob"]);
    }

    #[test]
    fn test_unreadable_member_is_counted_not_fatal() {
        let dir = directory();
        dir.set_recursive_timeout(true);
        dir.delete_after_listing(BOB);

        let mut opts = options(&["Staff"]);
        opts.include_disabled = true;
        let report = resolve_groups(&dir, &opts).unwrap();

        let sams: Vec<&str> = report.identities.iter().filter_map(|i| i.sam_account_name()).collect();
        assert_eq!(sams, vec!["alice"]);
        assert_eq!(report.groups_resolved, 1);
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.errors[0].input, BOB);
        assert_eq!(report.errors[0].error.code, "NOT_FOUND");
        assert_eq!(report.summary, "resolved 1 identities from 1 groups, 1 errors");
    }

    #[test]
    fn test_ambiguous_group_is_not_fatal() {
        let mut dir = directory();
        dir.add_group("CN=Staff,OU=Legacy,DC=ex,DC=edu", "Staff-Old", &[DAVE]);

        let report = resolve_groups(&dir, &options(&["Staff", "Faculty"])).unwrap();
        assert_eq!(report.groups_resolved, 1);
        assert_eq!(report.errors[0].input, "Staff");
        assert_eq!(report.errors[0].error.code, "AMBIGUOUS_MATCH");
    }

    #[test]
    fn test_unavailable_directory_aborts() {
        let dir = directory();
        dir.set_unavailable(true);
        assert!(resolve_groups(&dir, &options(&["Staff", "Faculty"])).is_err());
        assert_eq!(dir.call_count(), 1);
    }
}
