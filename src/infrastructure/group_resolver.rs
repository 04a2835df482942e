//! Recursive group membership resolution
//!
//! Each group is first expanded with the directory's recursive membership
//! primitive (fast path). When that call times out the group is walked
//! manually (slow path): resolve the group's DN, list its direct user
//! members, list its direct nested groups and recurse into each of them,
//! starting again at the fast path. Recursion depth is threaded explicitly
//! and capped at [`MAX_RECURSION_DEPTH`] so cyclic nesting cannot loop forever.
//!
//! Slow-path members come back with a minimal attribute set. After all groups
//! are collected and de-duplicated by DN, each such member is backfilled once
//! through the [`IdentityCache`].

use serde::Serialize;

use super::directory::{Directory, DirectoryError};
use super::identity_cache::IdentityCache;
use super::ldap_filter::{looks_like_dn, LdapFilter};
use super::record::requested_attributes;
use crate::domain::{filter_identities, GroupIdentifier, Identity, ResolutionResult};
use crate::error::{AppError, AppResult};

/// Maximum nesting depth before giving up on a group tree
pub const MAX_RECURSION_DEPTH: usize = 20;

/// Attributes requested from slow-path member queries
const MINIMAL_ATTRIBUTES: [&str; 2] = ["distinguishedName", "objectClass"];

/// Counters describing how a resolution went
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverStats {
    /// Group expansions answered by the recursive primitive
    pub fast_path: usize,
    /// Group expansions that fell back to manual recursion
    pub slow_path: usize,
    /// Members whose attributes were fetched after de-duplication
    pub backfilled: usize,
}

pub struct GroupResolver<'a> {
    directory: &'a dyn Directory,
    cache: IdentityCache<'a>,
    stats: ResolverStats,
}

impl<'a> GroupResolver<'a> {
    pub fn new(directory: &'a dyn Directory) -> Self {
        Self::with_cache(directory, IdentityCache::new(directory))
    }

    /// Use an existing cache, e.g. one shared with earlier lookups in the same run
    pub fn with_cache(directory: &'a dyn Directory, cache: IdentityCache<'a>) -> Self {
        Self {
            directory,
            cache,
            stats: ResolverStats::default(),
        }
    }

    pub fn cache(&self) -> &IdentityCache<'a> {
        &self.cache
    }

    pub fn stats(&self) -> ResolverStats {
        self.stats
    }

    /// Expand `groups` into a flat, de-duplicated list of member identities.
    ///
    /// Groups are processed in order and the first error aborts the call.
    /// Disabled identities are dropped unless `include_disabled` is set.
    pub fn resolve(
        &mut self,
        groups: &[GroupIdentifier],
        attributes: &[String],
        recursive: bool,
        include_disabled: bool,
    ) -> AppResult<Vec<Identity>> {
        let mut result = ResolutionResult::new();
        for group in groups {
            self.collect(group, attributes, recursive, &mut result)?;
        }

        let identities = self.backfill(result, attributes)?;
        Ok(filter_identities(identities, None, include_disabled))
    }

    /// Expand one group and merge its members into `result`.
    ///
    /// Nothing is merged if the group fails, so callers can keep going with
    /// other groups.
    pub fn collect(
        &mut self,
        group: &GroupIdentifier,
        attributes: &[String],
        recursive: bool,
        result: &mut ResolutionResult,
    ) -> AppResult<()> {
        tracing::info!(group = %group, recursive = recursive, "Resolving group membership");

        let mut members = ResolutionResult::new();
        self.expand(group.as_str(), attributes, recursive, 0, &mut members)?;

        let found = members.len();
        let added = result.extend(members.into_identities());
        tracing::info!(
            group = %group,
            members = found,
            new_members = added,
            "Group membership collected"
        );
        Ok(())
    }

    /// Fetch the full attribute set for members that lack it.
    ///
    /// Runs after de-duplication, so each DN is looked up at most once. The
    /// first failure aborts.
    pub fn backfill(&mut self, result: ResolutionResult, attributes: &[String]) -> AppResult<Vec<Identity>> {
        let mut identities = result.into_identities();
        for identity in identities.iter_mut().filter(|i| !i.is_attribute_complete()) {
            *identity = self.backfill_one(identity, attributes)?;
        }

        tracing::debug!(
            identities = identities.len(),
            backfilled = self.stats.backfilled,
            "Attribute backfill complete"
        );
        Ok(identities)
    }

    /// Like [`backfill`](Self::backfill), but a member that cannot be read is
    /// dropped and returned alongside its error instead of failing the batch.
    ///
    /// `DirectoryUnavailable` still aborts.
    pub fn backfill_partial(
        &mut self,
        result: ResolutionResult,
        attributes: &[String],
    ) -> AppResult<(Vec<Identity>, Vec<(String, AppError)>)> {
        let mut identities = Vec::with_capacity(result.len());
        let mut failures = Vec::new();

        for identity in result.into_identities() {
            if identity.is_attribute_complete() {
                identities.push(identity);
                continue;
            }
            match self.backfill_one(&identity, attributes) {
                Ok(full) => identities.push(full),
                Err(e @ AppError::DirectoryUnavailable(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        dn = %identity.distinguished_name,
                        error = %e,
                        "Dropping member whose attributes could not be read"
                    );
                    failures.push((identity.distinguished_name, e));
                }
            }
        }

        tracing::debug!(
            identities = identities.len(),
            backfilled = self.stats.backfilled,
            failed = failures.len(),
            "Attribute backfill complete"
        );
        Ok((identities, failures))
    }

    fn backfill_one(&mut self, identity: &Identity, attributes: &[String]) -> AppResult<Identity> {
        let full = self.cache.get(&identity.distinguished_name, None, attributes)?;
        self.stats.backfilled += 1;
        Ok(full)
    }

    fn expand(
        &mut self,
        group: &str,
        attributes: &[String],
        recursive: bool,
        depth: usize,
        out: &mut ResolutionResult,
    ) -> AppResult<()> {
        if depth > MAX_RECURSION_DEPTH {
            tracing::error!(group = group, depth = depth, "Group nesting exceeds recursion limit");
            return Err(AppError::RecursionLimitExceeded {
                group: group.to_string(),
                depth,
            });
        }

        let attrs = requested_attributes(attributes, true);
        match self.directory.group_members(group, recursive, &attrs) {
            Ok(records) => {
                self.stats.fast_path += 1;
                tracing::debug!(group = group, depth = depth, count = records.len(), "Fast path succeeded");
                for record in records.into_iter().filter(|r| !r.is_group()) {
                    let dn = record.dn.clone();
                    out.insert(record.into_identity(&dn));
                }
                Ok(())
            }
            Err(DirectoryError::Timeout(reason)) => {
                self.stats.slow_path += 1;
                tracing::warn!(
                    group = group,
                    depth = depth,
                    reason = %reason,
                    "Membership query timed out, falling back to manual recursion"
                );
                self.expand_manually(group, attributes, recursive, depth, out)
            }
            Err(DirectoryError::NoSuchObject(_)) => Err(AppError::GroupNotFound(group.to_string())),
            Err(DirectoryError::Ambiguous { count, .. }) => {
                tracing::warn!(group = group, count = count, "Group name matched more than one object");
                Err(AppError::AmbiguousMatch {
                    key: group.to_string(),
                    count,
                })
            }
            Err(DirectoryError::Unavailable(reason)) => {
                tracing::error!(group = group, error = %reason, "Directory unavailable during fast path");
                Err(AppError::DirectoryUnavailable(reason))
            }
        }
    }

    fn expand_manually(
        &mut self,
        group: &str,
        attributes: &[String],
        recursive: bool,
        depth: usize,
        out: &mut ResolutionResult,
    ) -> AppResult<()> {
        let group_dn = self.group_dn(group)?;

        let users = self
            .directory
            .find(&LdapFilter::direct_members_of(&group_dn, "user"), &MINIMAL_ATTRIBUTES)?;
        tracing::debug!(group = %group_dn, count = users.len(), "Direct user members");
        for record in users {
            let dn = record.dn.clone();
            out.insert(record.into_identity(&dn));
        }

        if !recursive {
            return Ok(());
        }

        let nested = self
            .directory
            .find(&LdapFilter::direct_members_of(&group_dn, "group"), &MINIMAL_ATTRIBUTES)?;
        tracing::debug!(group = %group_dn, count = nested.len(), "Direct nested groups");
        for record in nested {
            self.expand(&record.dn, attributes, recursive, depth + 1, out)?;
        }
        Ok(())
    }

    /// Distinguished name of a group given by name or DN
    fn group_dn(&self, group: &str) -> AppResult<String> {
        if looks_like_dn(group) {
            return match self.directory.get_by_dn(group, &MINIMAL_ATTRIBUTES) {
                Ok(record) => Ok(record.dn),
                Err(DirectoryError::NoSuchObject(_)) => Err(AppError::GroupNotFound(group.to_string())),
                Err(e) => Err(e.into()),
            };
        }

        let mut records = self
            .directory
            .find(&LdapFilter::group_named(group), &MINIMAL_ATTRIBUTES)?;
        match records.len() {
            0 => Err(AppError::GroupNotFound(group.to_string())),
            1 => Ok(records.remove(0).dn),
            count => Err(AppError::AmbiguousMatch {
                key: group.to_string(),
                count,
            }),
        }
    }
}
