//! Authentication identity types.

use std::collections::BTreeSet;

/// The authenticated caller attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Opaque identifier of the principal
    pub subject_id: String,
    /// Session backing this request. After a rotation this is the newly issued one.
    pub session_id: String,
}

/// Flat permission set of a subject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet(BTreeSet<String>);

impl PermissionSet {
    pub fn contains(&self, permission: &str) -> bool {
        self.0.contains(permission)
    }

    /// Permissions from `required` that this set lacks. Empty means all granted.
    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .copied()
            .filter(|p| !self.contains(p))
            .collect()
    }
}

impl FromIterator<String> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_is_all_of() {
        let set: PermissionSet = ["read", "write"].iter().map(|s| s.to_string()).collect();

        assert!(set.missing(&["read"]).is_empty());
        assert!(set.missing(&["read", "write"]).is_empty());
        assert!(set.missing(&[]).is_empty());
        assert_eq!(set.missing(&["read", "admin", "delete"]), vec!["admin", "delete"]);
    }
}
