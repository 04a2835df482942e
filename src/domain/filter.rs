//! Post-resolution filtering of identities.
//!
//! The enabled check always runs before the caller's predicate.

use chrono::{DateTime, Utc};

use super::identity::Identity;

/// Boxed identity predicate
pub type IdentityPredicate = Box<dyn Fn(&Identity) -> bool>;

/// Filter identities by enabled state, then by an optional predicate.
pub fn filter_identities(
    identities: Vec<Identity>,
    predicate: Option<&dyn Fn(&Identity) -> bool>,
    include_disabled: bool,
) -> Vec<Identity> {
    identities
        .into_iter()
        .filter(|identity| include_disabled || identity.enabled)
        .filter(|identity| predicate.map_or(true, |p| p(identity)))
        .collect()
}

/// Reusable filter configuration
#[derive(Default)]
pub struct MemberFilter {
    pub include_disabled: bool,
    predicate: Option<IdentityPredicate>,
}

impl MemberFilter {
    pub fn new(include_disabled: bool) -> Self {
        Self {
            include_disabled,
            predicate: None,
        }
    }

    pub fn with_predicate(mut self, predicate: impl Fn(&Identity) -> bool + 'static) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    pub fn apply(&self, identities: Vec<Identity>) -> Vec<Identity> {
        filter_identities(identities, self.predicate.as_deref(), self.include_disabled)
    }
}

impl std::fmt::Debug for MemberFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberFilter")
            .field("include_disabled", &self.include_disabled)
            .field("predicate", &self.predicate.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Matches identities whose DN ends with the given OU path (case-insensitive)
pub fn dn_ends_with(ou_path: &str) -> impl Fn(&Identity) -> bool {
    let suffix = ou_path.trim().to_lowercase();
    move |identity| identity.distinguished_name.to_lowercase().ends_with(&suffix)
}

/// Matches identities where any value of the attribute equals `value` (case-insensitive)
pub fn attribute_equals(name: &str, value: &str) -> impl Fn(&Identity) -> bool {
    let name = name.to_string();
    let value = value.to_string();
    move |identity| identity.values(&name).iter().any(|v| v.eq_ignore_ascii_case(&value))
}

/// Matches identities that logged on at or after `cutoff`
pub fn logged_on_since(cutoff: DateTime<Utc>) -> impl Fn(&Identity) -> bool {
    move |identity| identity.last_logon().map_or(false, |ts| ts >= cutoff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AttributeValue;

    fn identity(name: &str, ou: &str, enabled: bool) -> Identity {
        let mut i = Identity::new(name, format!("CN={},{},DC=ex,DC=edu", name, ou));
        i.enabled = enabled;
        i
    }

    #[test]
    fn test_drops_only_disabled() {
        let input = vec![
            identity("Alice", "OU=Staff", true),
            identity("Bob", "OU=Staff", false),
            identity("Carol", "OU=Contractors", true),
            identity("Dave", "OU=Staff", false),
        ];

        let kept = filter_identities(input.clone(), None, false);
        let names: Vec<_> = kept.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Carol"]);

        let all = filter_identities(input.clone(), None, true);
        assert_eq!(all, input);
    }

    #[test]
    fn test_predicate_after_enabled_check() {
        let input = vec![
            identity("Alice", "OU=Staff", true),
            identity("Bob", "OU=Staff", false),
            identity("Carol", "OU=Contractors", true),
        ];

        let filter = MemberFilter::new(false).with_predicate(dn_ends_with("ou=staff,dc=ex,dc=edu"));
        let kept = filter.apply(input);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].key, "Alice");
    }

    #[test]
    fn test_attribute_equals_checks_all_values() {
        let mut laptop = identity("LT-01", "OU=Laptops", true);
        laptop
            .attributes
            .insert("serialNumber", AttributeValue::Multi(vec!["AAA".into(), "BBB".into()]));

        assert!(attribute_equals("serialnumber", "bbb")(&laptop));
        assert!(!attribute_equals("serialnumber", "ccc")(&laptop));
    }

    #[test]
    fn test_logged_on_since() {
        let mut pc = identity("PC-01", "OU=Labs", true);
        let ft = (1_704_067_200i64 + 11_644_473_600) * 10_000_000;
        pc.attributes
            .insert("lastLogonTimestamp", AttributeValue::Single(ft.to_string()));

        let before = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let after = DateTime::from_timestamp(1_710_000_000, 0).unwrap();
        assert!(logged_on_since(before)(&pc));
        assert!(!logged_on_since(after)(&pc));
        assert!(!logged_on_since(before)(&identity("PC-02", "OU=Labs", true)));
    }
}
