//! Typed LDAP search filters
//!
//! Filters are built as values so that the LDAP backend can render them to
//! RFC 4515 text and the in-memory backend can evaluate them directly.

use std::fmt;

/// LDAP Matching Rule OID for transitive group membership (nested groups)
pub const LDAP_MATCHING_RULE_IN_CHAIN: &str = "1.2.840.113556.1.4.1941";

/// AND/OR composition over attribute equality and substring predicates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LdapFilter {
    And(Vec<LdapFilter>),
    Or(Vec<LdapFilter>),
    Not(Box<LdapFilter>),
    Equals { attribute: String, value: String },
    Contains { attribute: String, value: String },
    StartsWith { attribute: String, value: String },
    EndsWith { attribute: String, value: String },
    Present { attribute: String },
}

impl LdapFilter {
    pub fn eq(attribute: &str, value: &str) -> Self {
        LdapFilter::Equals {
            attribute: attribute.to_string(),
            value: value.to_string(),
        }
    }

    pub fn contains(attribute: &str, value: &str) -> Self {
        LdapFilter::Contains {
            attribute: attribute.to_string(),
            value: value.to_string(),
        }
    }

    pub fn starts_with(attribute: &str, value: &str) -> Self {
        LdapFilter::StartsWith {
            attribute: attribute.to_string(),
            value: value.to_string(),
        }
    }

    pub fn ends_with(attribute: &str, value: &str) -> Self {
        LdapFilter::EndsWith {
            attribute: attribute.to_string(),
            value: value.to_string(),
        }
    }

    pub fn present(attribute: &str) -> Self {
        LdapFilter::Present {
            attribute: attribute.to_string(),
        }
    }

    pub fn and(filters: Vec<LdapFilter>) -> Self {
        LdapFilter::And(filters)
    }

    pub fn or(filters: Vec<LdapFilter>) -> Self {
        LdapFilter::Or(filters)
    }

    pub fn not(filter: LdapFilter) -> Self {
        LdapFilter::Not(Box::new(filter))
    }

    /// `(|(sAMAccountName=..)(userPrincipalName=..))`
    pub fn account(sam_account_name: &str, user_principal_name: &str) -> Self {
        LdapFilter::or(vec![
            LdapFilter::eq("sAMAccountName", sam_account_name),
            LdapFilter::eq("userPrincipalName", user_principal_name),
        ])
    }

    /// Group object matched by sAMAccountName or cn
    pub fn group_named(name: &str) -> Self {
        LdapFilter::and(vec![
            LdapFilter::eq("objectClass", "group"),
            LdapFilter::or(vec![
                LdapFilter::eq("sAMAccountName", name),
                LdapFilter::eq("cn", name),
            ]),
        ])
    }

    /// Direct members of `group_dn` with the given objectClass
    pub fn direct_members_of(group_dn: &str, object_class: &str) -> Self {
        LdapFilter::and(vec![
            LdapFilter::eq("objectClass", object_class),
            LdapFilter::eq("memberOf", group_dn),
        ])
    }

    /// Render to RFC 4515 filter text
    pub fn to_ldap_string(&self) -> String {
        match self {
            LdapFilter::And(filters) => {
                let inner: Vec<String> = filters.iter().map(Self::to_ldap_string).collect();
                format!("(&{})", inner.join(""))
            }
            LdapFilter::Or(filters) => {
                let inner: Vec<String> = filters.iter().map(Self::to_ldap_string).collect();
                format!("(|{})", inner.join(""))
            }
            LdapFilter::Not(filter) => format!("(!{})", filter.to_ldap_string()),
            LdapFilter::Equals { attribute, value } => {
                format!("({}={})", attribute, escape_ldap_filter(value))
            }
            LdapFilter::Contains { attribute, value } => {
                format!("({}=*{}*)", attribute, escape_ldap_filter(value))
            }
            LdapFilter::StartsWith { attribute, value } => {
                format!("({}={}*)", attribute, escape_ldap_filter(value))
            }
            LdapFilter::EndsWith { attribute, value } => {
                format!("({}=*{})", attribute, escape_ldap_filter(value))
            }
            LdapFilter::Present { attribute } => format!("({}=*)", attribute),
        }
    }

    /// Evaluate against an object whose attribute values are supplied by `values`.
    ///
    /// Comparisons are case-insensitive, as in Active Directory.
    pub fn matches<F>(&self, values: &F) -> bool
    where
        F: Fn(&str) -> Vec<String>,
    {
        let any = |attribute: &str, test: &dyn Fn(&str) -> bool| {
            values(attribute).iter().any(|v| test(v.to_lowercase().as_str()))
        };

        match self {
            LdapFilter::And(filters) => filters.iter().all(|f| f.matches(values)),
            LdapFilter::Or(filters) => filters.iter().any(|f| f.matches(values)),
            LdapFilter::Not(filter) => !filter.matches(values),
            LdapFilter::Equals { attribute, value } => {
                let value = value.to_lowercase();
                any(attribute.as_str(), &|v: &str| v == value)
            }
            LdapFilter::Contains { attribute, value } => {
                let value = value.to_lowercase();
                any(attribute.as_str(), &|v: &str| v.contains(&value))
            }
            LdapFilter::StartsWith { attribute, value } => {
                let value = value.to_lowercase();
                any(attribute.as_str(), &|v: &str| v.starts_with(&value))
            }
            LdapFilter::EndsWith { attribute, value } => {
                let value = value.to_lowercase();
                any(attribute.as_str(), &|v: &str| v.ends_with(&value))
            }
            LdapFilter::Present { attribute } => !values(attribute.as_str()).is_empty(),
        }
    }
}

impl fmt::Display for LdapFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ldap_string())
    }
}

/// Escape special characters in LDAP filter values
///
/// Escapes characters that have special meaning in LDAP filters:
/// * `\` → `\5c`
/// * `*` → `\2a`
/// * `(` → `\28`
/// * `)` → `\29`
/// * `\0` → `\00`
pub fn escape_ldap_filter(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

/// Whether `key` is a distinguished name rather than an account name.
///
/// sAMAccountName cannot contain `=` or `,`, so a key made of `type=value`
/// components is treated as a DN. Escaped commas (`\,`) stay inside their
/// component.
pub fn looks_like_dn(key: &str) -> bool {
    let key = key.trim();
    if !key.contains('=') {
        return false;
    }

    split_dn(key).into_iter().all(|component| {
        let mut parts = component.splitn(2, '=');
        let attr_type = parts.next().unwrap_or("").trim();
        let value = parts.next();
        !attr_type.is_empty()
            && attr_type.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && value.map_or(false, |v| !v.trim().is_empty())
    })
}

/// Split a DN into its RDN components on unescaped commas (RFC 4514).
///
/// A comma preceded by an odd run of backslashes is part of the value.
pub fn split_dn(dn: &str) -> Vec<&str> {
    let mut components = Vec::new();
    let mut start = 0;
    let mut backslashes = 0;

    for (idx, c) in dn.char_indices() {
        match c {
            '\\' => backslashes += 1,
            ',' if backslashes % 2 == 0 => {
                components.push(&dn[start..idx]);
                start = idx + 1;
                backslashes = 0;
            }
            _ => backslashes = 0,
        }
    }
    components.push(&dn[start..]);
    components
}
