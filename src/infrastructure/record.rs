use std::collections::HashMap;

use crate::domain::{AttributeBag, AttributeValue, Identity, ObjectKind, UAC_ACCOUNT_DISABLE};

/// Attributes every identity query asks for on top of the caller's list
pub const CORE_ATTRIBUTES: [&str; 5] = [
    "distinguishedName",
    "objectClass",
    "sAMAccountName",
    "userPrincipalName",
    "userAccountControl",
];

/// A directory search row: DN plus multi-valued attributes keyed by lowercase name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub dn: String,
    pub attributes: HashMap<String, Vec<String>>,
}

impl DirectoryRecord {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }

    /// Builder-style attribute setter, used heavily by fixtures
    pub fn with(mut self, attr: &str, values: &[&str]) -> Self {
        self.set(attr, values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn set(&mut self, attr: &str, values: Vec<String>) {
        if values.is_empty() {
            self.attributes.remove(&attr.to_lowercase());
        } else {
            self.attributes.insert(attr.to_lowercase(), values);
        }
    }

    pub fn get(&self, attr: &str) -> Option<&String> {
        self.attributes.get(&attr.to_lowercase()).and_then(|v| v.first())
    }

    pub fn get_all(&self, attr: &str) -> Option<&Vec<String>> {
        self.attributes.get(&attr.to_lowercase())
    }

    pub fn has(&self, attr: &str) -> bool {
        self.attributes.contains_key(&attr.to_lowercase())
    }

    pub fn object_kind(&self) -> ObjectKind {
        let classes = self.get_all("objectclass").cloned().unwrap_or_default();
        ObjectKind::from_object_classes(classes.as_slice())
    }

    pub fn is_group(&self) -> bool {
        self.object_kind() == ObjectKind::Group
    }

    /// Enabled unless userAccountControl carries ACCOUNTDISABLE
    pub fn is_enabled(&self) -> bool {
        let uac: u32 = self
            .get("useraccountcontrol")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        (uac & UAC_ACCOUNT_DISABLE) == 0
    }

    /// Convert to an identity remembered under `key`.
    ///
    /// `memberOf` becomes [`Identity::member_of`] and is only `Some` when the
    /// directory returned the attribute.
    pub fn into_identity(self, key: &str) -> Identity {
        let kind = self.object_kind();
        let enabled = self.is_enabled();
        let dn = self
            .get("distinguishedname")
            .cloned()
            .unwrap_or_else(|| self.dn.clone());

        let mut attributes = AttributeBag::new();
        let mut member_of = None;
        for (name, values) in self.attributes {
            if name == "memberof" {
                member_of = Some(values);
                continue;
            }
            if let Some(value) = AttributeValue::from_values(values) {
                attributes.insert(&name, value);
            }
        }

        Identity {
            key: key.to_string(),
            distinguished_name: dn,
            kind,
            enabled,
            attributes,
            member_of,
        }
    }
}

/// Merge the caller's attribute list with the core attributes, without duplicates
pub fn requested_attributes<'a>(extra: &'a [String], with_member_of: bool) -> Vec<&'a str> {
    let mut attrs: Vec<&'a str> = CORE_ATTRIBUTES.to_vec();
    if with_member_of {
        attrs.push("memberOf");
    }
    for attr in extra {
        if !attrs.iter().any(|a| a.eq_ignore_ascii_case(attr)) {
            attrs.push(attr.as_str());
        }
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_from_uac() {
        let enabled = DirectoryRecord::new("CN=A,DC=ex,DC=edu").with("userAccountControl", &["512"]);
        let disabled = DirectoryRecord::new("CN=B,DC=ex,DC=edu").with("userAccountControl", &["514"]);
        let missing = DirectoryRecord::new("CN=C,DC=ex,DC=edu");

        assert!(enabled.is_enabled());
        assert!(!disabled.is_enabled());
        assert!(missing.is_enabled());
    }

    #[test]
    fn test_into_identity_splits_member_of() {
        let record = DirectoryRecord::new("CN=Alice,OU=Staff,DC=ex,DC=edu")
            .with("objectClass", &["top", "person", "user"])
            .with("sAMAccountName", &["alice"])
            .with("memberOf", &["CN=AllStaff,OU=Groups,DC=ex,DC=edu"])
            .with("serialNumber", &["SN-1", "SN-2"]);

        let identity = record.into_identity("alice");
        assert_eq!(identity.key, "alice");
        assert_eq!(identity.kind, ObjectKind::User);
        assert_eq!(identity.sam_account_name(), Some("alice"));
        assert_eq!(identity.first_value("serialNumber"), Some("SN-1"));
        assert!(identity.is_attribute_complete());
        assert!(identity.attributes.get("memberOf").is_none());
    }

    #[test]
    fn test_minimal_record_is_not_attribute_complete() {
        let identity = DirectoryRecord::new("CN=Bob,OU=Staff,DC=ex,DC=edu")
            .with("objectClass", &["user"])
            .into_identity("CN=Bob,OU=Staff,DC=ex,DC=edu");
        assert!(!identity.is_attribute_complete());
        assert_eq!(identity.distinguished_name, "CN=Bob,OU=Staff,DC=ex,DC=edu");
    }

    #[test]
    fn test_requested_attributes_dedup() {
        let extra = vec!["mail".to_string(), "samaccountname".to_string()];
        let attrs = requested_attributes(&extra, true);
        assert!(attrs.contains(&"memberOf"));
        assert!(attrs.contains(&"mail"));
        assert_eq!(
            attrs.iter().filter(|a| a.eq_ignore_ascii_case("samaccountname")).count(),
            1
        );
    }
}
