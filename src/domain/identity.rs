use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// userAccountControl flag marking a disabled account
pub const UAC_ACCOUNT_DISABLE: u32 = 0x2;

/// Kinds of directory objects an identity can be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    User,
    Computer,
    Group,
    Other,
}

impl ObjectKind {
    /// Determine the kind from an objectClass list.
    ///
    /// Computers inherit from `user` in AD, so `computer` is checked first.
    pub fn from_object_classes<S: AsRef<str>>(object_classes: &[S]) -> Self {
        let has = |class: &str| object_classes.iter().any(|c| c.as_ref().eq_ignore_ascii_case(class));

        if has("computer") {
            ObjectKind::Computer
        } else if has("group") {
            ObjectKind::Group
        } else if has("user") || has("person") {
            ObjectKind::User
        } else {
            ObjectKind::Other
        }
    }
}

/// A single- or multi-valued attribute.
///
/// Consumers that need one value must flatten explicitly via [`AttributeValue::first`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Single(String),
    Multi(Vec<String>),
}

impl AttributeValue {
    /// Build from raw directory values. Returns `None` for an empty list.
    pub fn from_values(mut values: Vec<String>) -> Option<Self> {
        match values.len() {
            0 => None,
            1 => values.pop().map(AttributeValue::Single),
            _ => Some(AttributeValue::Multi(values)),
        }
    }

    /// First value wins
    pub fn first(&self) -> Option<&str> {
        match self {
            AttributeValue::Single(v) => Some(v.as_str()),
            AttributeValue::Multi(vs) => vs.first().map(String::as_str),
        }
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            AttributeValue::Single(v) => vec![v.as_str()],
            AttributeValue::Multi(vs) => vs.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, AttributeValue::Multi(vs) if vs.len() > 1)
    }
}

/// Attribute name to value mapping with case-insensitive names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeBag {
    entries: BTreeMap<String, AttributeValue>,
}

impl AttributeBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: AttributeValue) {
        self.entries.insert(name.to_lowercase(), value);
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.entries.get(&name.to_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.entries.iter()
    }
}

/// A resolved user or computer record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Key the identity was looked up with (sAMAccountName, UPN or DN)
    pub key: String,
    pub distinguished_name: String,
    pub kind: ObjectKind,
    pub enabled: bool,
    pub attributes: AttributeBag,
    /// Group DNs, present only when the directory returned `memberOf`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_of: Option<Vec<String>>,
}

impl Identity {
    /// Create an enabled user identity with no attributes
    pub fn new(key: impl Into<String>, distinguished_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            distinguished_name: distinguished_name.into(),
            kind: ObjectKind::User,
            enabled: true,
            attributes: AttributeBag::new(),
            member_of: None,
        }
    }

    /// Flattened single value of an attribute (first value wins)
    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(AttributeValue::first)
    }

    pub fn values(&self, name: &str) -> Vec<&str> {
        self.attributes.get(name).map(AttributeValue::values).unwrap_or_default()
    }

    pub fn sam_account_name(&self) -> Option<&str> {
        self.first_value("sAMAccountName")
    }

    pub fn user_principal_name(&self) -> Option<&str> {
        self.first_value("userPrincipalName")
    }

    /// Whether the attribute set is complete, i.e. the record came back with `memberOf`
    pub fn is_attribute_complete(&self) -> bool {
        self.member_of.is_some()
    }

    /// Parse lastLogonTimestamp (Windows FILETIME)
    pub fn last_logon(&self) -> Option<DateTime<Utc>> {
        self.first_value("lastLogonTimestamp")
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(filetime_to_datetime)
    }

    /// Case-insensitive DN comparison key
    pub fn dn_key(&self) -> String {
        self.distinguished_name.to_lowercase()
    }
}

/// Convert a Windows FILETIME to a UTC timestamp
pub fn filetime_to_datetime(filetime: i64) -> Option<DateTime<Utc>> {
    if filetime <= 0 {
        return None;
    }

    // 100-nanosecond intervals since 1601-01-01
    const FILETIME_UNIX_DIFF: i64 = 11_644_473_600;

    let unix_timestamp = filetime / 10_000_000 - FILETIME_UNIX_DIFF;
    if unix_timestamp < 0 {
        return None;
    }

    DateTime::from_timestamp(unix_timestamp, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_kind_from_classes() {
        let computer = ["top", "person", "organizationalPerson", "user", "computer"];
        assert_eq!(ObjectKind::from_object_classes(&computer), ObjectKind::Computer);
        assert_eq!(ObjectKind::from_object_classes(&["top", "group"]), ObjectKind::Group);
        assert_eq!(ObjectKind::from_object_classes(&["top", "User"]), ObjectKind::User);
        assert_eq!(ObjectKind::from_object_classes(&["organizationalUnit"]), ObjectKind::Other);
    }

    #[test]
    fn test_multi_value_first_wins() {
        let value = AttributeValue::from_values(vec!["SN-1".to_string(), "SN-2".to_string()]).unwrap();
        assert!(value.is_multi());
        assert_eq!(value.first(), Some("SN-1"));
        assert_eq!(value.values(), vec!["SN-1", "SN-2"]);

        assert_eq!(AttributeValue::from_values(Vec::new()), None);
        assert_eq!(
            AttributeValue::from_values(vec!["only".to_string()]),
            Some(AttributeValue::Single("only".to_string()))
        );
    }

    #[test]
    fn test_attribute_names_case_insensitive() {
        let mut identity = Identity::new("alice", "CN=Alice,OU=Staff,DC=ex,DC=edu");
        identity
            .attributes
            .insert("serialNumber", AttributeValue::Multi(vec!["A".into(), "B".into()]));

        assert_eq!(identity.first_value("SERIALNUMBER"), Some("A"));
        assert_eq!(identity.values("serialnumber"), vec!["A", "B"]);
        assert!(identity.values("mail").is_empty());
    }

    #[test]
    fn test_filetime_conversion() {
        // 2024-01-01T00:00:00Z
        let ft = (1_704_067_200 + 11_644_473_600) * 10_000_000;
        let dt = filetime_to_datetime(ft).unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-01-01T00:00:00+00:00");

        assert!(filetime_to_datetime(0).is_none());
        assert!(filetime_to_datetime(1).is_none());
    }

    #[test]
    fn test_attribute_value_serde_untagged() {
        let single: AttributeValue = serde_json::from_str("\"x\"").unwrap();
        assert_eq!(single, AttributeValue::Single("x".to_string()));

        let multi: AttributeValue = serde_json::from_str("[\"x\",\"y\"]").unwrap();
        assert_eq!(multi.values(), vec!["x", "y"]);
    }
}
