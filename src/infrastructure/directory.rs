//! Directory service abstraction
//!
//! The resolver and cache only see this trait. `LdapDirectory` talks to a live
//! domain controller, `InMemoryDirectory` serves a snapshot.

use thiserror::Error;

use super::ldap_filter::LdapFilter;
use super::record::DirectoryRecord;

/// Failures reported by a directory backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// The operation exceeded its time limit
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// The requested object does not exist
    #[error("no such object: {0}")]
    NoSuchObject(String),

    /// A name given in place of a DN matched several objects
    #[error("{name} matched {count} objects")]
    Ambiguous { name: String, count: usize },

    /// Authentication, connectivity, permission or protocol failure
    #[error("{0}")]
    Unavailable(String),
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Query primitives of a directory service.
///
/// Every call is a blocking round trip. Implementations use interior
/// mutability for connection state so callers can share `&dyn Directory`.
pub trait Directory {
    /// Search the whole directory for users or groups matching `filter`
    fn find(&self, filter: &LdapFilter, attributes: &[&str]) -> DirectoryResult<Vec<DirectoryRecord>>;

    /// Read one object by distinguished name
    fn get_by_dn(&self, dn: &str, attributes: &[&str]) -> DirectoryResult<DirectoryRecord>;

    /// Enumerate the non-group members of a group.
    ///
    /// With `recursive` set, members of nested groups are included. This is
    /// the call that may fail with [`DirectoryError::Timeout`] on large or
    /// malformed group trees.
    fn group_members(
        &self,
        group: &str,
        recursive: bool,
        attributes: &[&str],
    ) -> DirectoryResult<Vec<DirectoryRecord>>;
}

impl<D: Directory + ?Sized> Directory for &D {
    fn find(&self, filter: &LdapFilter, attributes: &[&str]) -> DirectoryResult<Vec<DirectoryRecord>> {
        (**self).find(filter, attributes)
    }

    fn get_by_dn(&self, dn: &str, attributes: &[&str]) -> DirectoryResult<DirectoryRecord> {
        (**self).get_by_dn(dn, attributes)
    }

    fn group_members(
        &self,
        group: &str,
        recursive: bool,
        attributes: &[&str],
    ) -> DirectoryResult<Vec<DirectoryRecord>> {
        (**self).group_members(group, recursive, attributes)
    }
}

impl<D: Directory + ?Sized> Directory for Box<D> {
    fn find(&self, filter: &LdapFilter, attributes: &[&str]) -> DirectoryResult<Vec<DirectoryRecord>> {
        (**self).find(filter, attributes)
    }

    fn get_by_dn(&self, dn: &str, attributes: &[&str]) -> DirectoryResult<DirectoryRecord> {
        (**self).get_by_dn(dn, attributes)
    }

    fn group_members(
        &self,
        group: &str,
        recursive: bool,
        attributes: &[&str],
    ) -> DirectoryResult<Vec<DirectoryRecord>> {
        (**self).group_members(group, recursive, attributes)
    }
}
