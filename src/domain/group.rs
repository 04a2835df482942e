use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::identity::Identity;
use crate::error::{AppError, AppResult};

/// Name or distinguished name of a directory group
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupIdentifier(String);

impl GroupIdentifier {
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AppError::InvalidInput("group identifier must not be empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for GroupIdentifier {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        GroupIdentifier::new(value)
    }
}

impl TryFrom<&str> for GroupIdentifier {
    type Error = AppError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        GroupIdentifier::new(value)
    }
}

impl From<GroupIdentifier> for String {
    fn from(group: GroupIdentifier) -> Self {
        group.0
    }
}

/// Ordered set of identities de-duplicated by distinguished name.
///
/// The first occurrence of a DN keeps its position; later duplicates are dropped.
#[derive(Debug, Clone, Default)]
pub struct ResolutionResult {
    identities: Vec<Identity>,
    seen: HashSet<String>,
}

impl ResolutionResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if an identity with the same DN was already present.
    pub fn insert(&mut self, identity: Identity) -> bool {
        if !self.seen.insert(identity.dn_key()) {
            return false;
        }
        self.identities.push(identity);
        true
    }

    /// Insert each identity in order; returns how many were new.
    pub fn extend<I: IntoIterator<Item = Identity>>(&mut self, identities: I) -> usize {
        let mut added = 0;
        for identity in identities {
            if self.insert(identity) {
                added += 1;
            }
        }
        added
    }

    pub fn contains_dn(&self, dn: &str) -> bool {
        self.seen.contains(&dn.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Identity> {
        self.identities.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Identity> {
        self.identities.iter_mut()
    }

    pub fn into_identities(self) -> Vec<Identity> {
        self.identities
    }
}
