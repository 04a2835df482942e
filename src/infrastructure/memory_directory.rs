//! Snapshot-backed directory
//!
//! Serves a directory export held in memory. It evaluates filters itself,
//! derives `memberOf` from group membership, and records every call so
//! callers can assert on round-trip counts. The recursive primitive can be
//! made to time out, and the whole directory can be taken offline.

use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use super::directory::{Directory, DirectoryError, DirectoryResult};
use super::ldap_filter::{looks_like_dn, split_dn, LdapFilter};
use super::record::DirectoryRecord;
use crate::domain::{AttributeValue, ObjectKind};
use crate::error::AppResult;

/// One exported directory object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotObject {
    pub dn: String,
    #[serde(default)]
    pub object_class: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Member DNs, for groups
    #[serde(default)]
    pub members: Vec<String>,
}

impl SnapshotObject {
    fn kind(&self) -> ObjectKind {
        ObjectKind::from_object_classes(self.object_class.as_slice())
    }
}

/// A full directory export
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    pub objects: Vec<SnapshotObject>,
}

/// A recorded directory round trip
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryCall {
    Find(String),
    GetByDn(String),
    GroupMembers { group: String, recursive: bool },
}

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    objects: Vec<SnapshotObject>,
    index: HashMap<String, usize>,
    calls: RefCell<Vec<DirectoryCall>>,
    recursive_timeout: Cell<bool>,
    unavailable: Cell<bool>,
    deleted: RefCell<HashSet<String>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: DirectorySnapshot) -> Self {
        let mut directory = Self::new();
        for object in snapshot.objects {
            directory.insert(object);
        }
        directory
    }

    /// Load a JSON snapshot from disk
    pub fn load(path: &Path) -> AppResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let snapshot: DirectorySnapshot = serde_json::from_str(&text)?;
        tracing::info!(
            path = %path.display(),
            objects = snapshot.objects.len(),
            "Loaded directory snapshot"
        );
        Ok(Self::from_snapshot(snapshot))
    }

    /// Add or replace an object
    pub fn insert(&mut self, object: SnapshotObject) {
        let key = object.dn.to_lowercase();
        match self.index.get(&key) {
            Some(&idx) => self.objects[idx] = object,
            None => {
                self.index.insert(key, self.objects.len());
                self.objects.push(object);
            }
        }
    }

    pub fn add_user(&mut self, dn: &str, sam_account_name: &str, enabled: bool) -> &mut Self {
        let uac = if enabled { "512" } else { "514" };
        self.insert(SnapshotObject {
            dn: dn.to_string(),
            object_class: vec![
                "top".to_string(),
                "person".to_string(),
                "organizationalPerson".to_string(),
                "user".to_string(),
            ],
            attributes: BTreeMap::from([
                ("sAMAccountName".to_string(), AttributeValue::Single(sam_account_name.to_string())),
                ("userAccountControl".to_string(), AttributeValue::Single(uac.to_string())),
            ]),
            members: Vec::new(),
        });
        self
    }

    pub fn add_computer(&mut self, dn: &str, sam_account_name: &str, enabled: bool) -> &mut Self {
        let uac = if enabled { "4096" } else { "4098" };
        self.insert(SnapshotObject {
            dn: dn.to_string(),
            object_class: vec![
                "top".to_string(),
                "person".to_string(),
                "organizationalPerson".to_string(),
                "user".to_string(),
                "computer".to_string(),
            ],
            attributes: BTreeMap::from([
                ("sAMAccountName".to_string(), AttributeValue::Single(format!("{}$", sam_account_name))),
                ("userAccountControl".to_string(), AttributeValue::Single(uac.to_string())),
            ]),
            members: Vec::new(),
        });
        self
    }

    pub fn add_group(&mut self, dn: &str, sam_account_name: &str, members: &[&str]) -> &mut Self {
        let cn = split_dn(dn)
            .first()
            .and_then(|rdn| rdn.split_once('='))
            .map(|(_, v)| v.to_string())
            .unwrap_or_else(|| sam_account_name.to_string());

        self.insert(SnapshotObject {
            dn: dn.to_string(),
            object_class: vec!["top".to_string(), "group".to_string()],
            attributes: BTreeMap::from([
                ("sAMAccountName".to_string(), AttributeValue::Single(sam_account_name.to_string())),
                ("cn".to_string(), AttributeValue::Single(cn)),
            ]),
            members: members.iter().map(|m| m.to_string()).collect(),
        });
        self
    }

    /// Set an attribute on an existing object
    pub fn set_attribute(&mut self, dn: &str, name: &str, value: AttributeValue) -> &mut Self {
        if let Some(&idx) = self.index.get(&dn.to_lowercase()) {
            self.objects[idx].attributes.insert(name.to_string(), value);
        }
        self
    }

    /// Make the recursive membership primitive time out
    pub fn set_recursive_timeout(&self, enabled: bool) {
        self.recursive_timeout.set(enabled);
    }

    /// Make every call fail as if the directory were unreachable
    pub fn set_unavailable(&self, enabled: bool) {
        self.unavailable.set(enabled);
    }

    /// Make `get_by_dn` report `dn` as missing while searches still list it,
    /// as when an object is deleted between enumeration and read
    pub fn delete_after_listing(&self, dn: &str) {
        self.deleted.borrow_mut().insert(dn.to_lowercase());
    }

    pub fn calls(&self) -> Vec<DirectoryCall> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    /// Number of `get_by_dn` round trips for `dn`
    pub fn get_by_dn_count(&self, dn: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, DirectoryCall::GetByDn(d) if d.eq_ignore_ascii_case(dn)))
            .count()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn record_call(&self, call: DirectoryCall) -> DirectoryResult<()> {
        tracing::debug!(call = ?call, "Directory call");
        self.calls.borrow_mut().push(call);
        if self.unavailable.get() {
            return Err(DirectoryError::Unavailable("directory is offline".to_string()));
        }
        Ok(())
    }

    fn object(&self, dn: &str) -> Option<&SnapshotObject> {
        self.index.get(&dn.to_lowercase()).map(|&idx| &self.objects[idx])
    }

    /// DNs of groups listing `dn` as a direct member
    fn member_of(&self, dn: &str) -> Vec<String> {
        self.objects
            .iter()
            .filter(|o| o.kind() == ObjectKind::Group)
            .filter(|o| o.members.iter().any(|m| m.eq_ignore_ascii_case(dn)))
            .map(|o| o.dn.clone())
            .collect()
    }

    fn attribute_values(&self, object: &SnapshotObject, name: &str) -> Vec<String> {
        match name.to_lowercase().as_str() {
            "distinguishedname" | "dn" => vec![object.dn.clone()],
            "objectclass" => object.object_class.clone(),
            "memberof" => self.member_of(&object.dn),
            "member" => object.members.clone(),
            lower => object
                .attributes
                .iter()
                .find(|(k, _)| k.to_lowercase() == lower)
                .map(|(_, v)| v.values().into_iter().map(str::to_string).collect::<Vec<String>>())
                .unwrap_or_default(),
        }
    }

    fn project(&self, object: &SnapshotObject, attributes: &[&str]) -> DirectoryRecord {
        let mut record = DirectoryRecord::new(object.dn.clone());
        for attr in attributes {
            record.set(attr, self.attribute_values(object, attr));
        }
        record
    }

    fn find_group(&self, group: &str) -> DirectoryResult<&SnapshotObject> {
        if looks_like_dn(group) {
            return self
                .object(group)
                .filter(|o| o.kind() == ObjectKind::Group)
                .ok_or_else(|| DirectoryError::NoSuchObject(group.to_string()));
        }

        let filter = LdapFilter::group_named(group);
        let mut matches: Vec<&SnapshotObject> = self
            .objects
            .iter()
            .filter(|o| filter.matches(&|name: &str| self.attribute_values(o, name)))
            .collect();
        match matches.len() {
            0 => Err(DirectoryError::NoSuchObject(group.to_string())),
            1 => Ok(matches.remove(0)),
            count => Err(DirectoryError::Ambiguous {
                name: group.to_string(),
                count,
            }),
        }
    }

    /// Depth-first expansion in member order. A group already on the current
    /// path means the server-side expansion would never finish.
    fn expand<'s>(
        &'s self,
        group: &'s SnapshotObject,
        path: &mut Vec<String>,
        seen: &mut HashSet<String>,
        out: &mut Vec<&'s SnapshotObject>,
    ) -> DirectoryResult<()> {
        let key = group.dn.to_lowercase();
        if path.contains(&key) {
            return Err(DirectoryError::Timeout(format!(
                "recursive expansion of {} did not complete",
                group.dn
            )));
        }
        path.push(key);

        for member_dn in &group.members {
            let Some(member) = self.object(member_dn) else {
                continue;
            };
            if member.kind() == ObjectKind::Group {
                self.expand(member, path, seen, out)?;
            } else if seen.insert(member.dn.to_lowercase()) {
                out.push(member);
            }
        }

        path.pop();
        Ok(())
    }
}

impl Directory for InMemoryDirectory {
    fn find(&self, filter: &LdapFilter, attributes: &[&str]) -> DirectoryResult<Vec<DirectoryRecord>> {
        self.record_call(DirectoryCall::Find(filter.to_ldap_string()))?;

        Ok(self
            .objects
            .iter()
            .filter(|o| filter.matches(&|name: &str| self.attribute_values(o, name)))
            .map(|o| self.project(o, attributes))
            .collect())
    }

    fn get_by_dn(&self, dn: &str, attributes: &[&str]) -> DirectoryResult<DirectoryRecord> {
        self.record_call(DirectoryCall::GetByDn(dn.to_string()))?;

        if self.deleted.borrow().contains(&dn.to_lowercase()) {
            return Err(DirectoryError::NoSuchObject(dn.to_string()));
        }
        self.object(dn)
            .map(|o| self.project(o, attributes))
            .ok_or_else(|| DirectoryError::NoSuchObject(dn.to_string()))
    }

    fn group_members(
        &self,
        group: &str,
        recursive: bool,
        attributes: &[&str],
    ) -> DirectoryResult<Vec<DirectoryRecord>> {
        self.record_call(DirectoryCall::GroupMembers {
            group: group.to_string(),
            recursive,
        })?;

        let group_object = self.find_group(group)?;

        if !recursive {
            return Ok(group_object
                .members
                .iter()
                .filter_map(|dn| self.object(dn))
                .filter(|o| o.kind() != ObjectKind::Group)
                .map(|o| self.project(o, attributes))
                .collect());
        }

        if self.recursive_timeout.get() {
            return Err(DirectoryError::Timeout(format!(
                "recursive membership query for {} exceeded its time limit",
                group
            )));
        }

        let mut members = Vec::new();
        self.expand(group_object, &mut Vec::new(), &mut HashSet::new(), &mut members)?;
        Ok(members.into_iter().map(|o| self.project(o, attributes)).collect())
    }
}
