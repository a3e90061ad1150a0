//! Authentication table and per-key permissions.
//!
//! The table maps opaque key strings to an entry holding the set of source
//! addresses allowed to present the key, the drives the key may address and
//! a write flag. It is built once at startup and never mutated afterwards,
//! so concurrent reads need no synchronization.

use crate::config::AuthConfig;
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};

/// What a successfully authenticated key is allowed to do.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Permissions {
    pub allowed_drives: Vec<String>,
    pub can_write: bool,
}

impl Permissions {
    /// Whether this key may address the named drive.
    pub fn drive_allowed(&self, drive: &str) -> bool {
        self.allowed_drives.iter().any(|allowed| allowed == drive)
    }
}

#[derive(Debug)]
struct AuthEntry {
    /// Case-folded source addresses.
    allowed_addrs: HashSet<String>,
    permissions: Permissions,
}

/// The key table.
#[derive(Debug, Default)]
pub struct AuthTable {
    keys: HashMap<String, AuthEntry>,
}

impl AuthTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table from the `[[Auth]]` configuration entries.
    pub fn from_config(entries: &[AuthConfig]) -> Self {
        let mut table = Self::new();
        for entry in entries {
            table.add_key(
                &entry.key,
                &entry.allowed_ips,
                Permissions {
                    allowed_drives: entry.allowed_drives.clone(),
                    can_write: entry.can_write,
                },
            );
        }
        table
    }

    /// Register a key. Source addresses are case-folded for comparison.
    pub fn add_key(&mut self, key: &str, allowed_addrs: &[String], permissions: Permissions) {
        let allowed_addrs = allowed_addrs
            .iter()
            .map(|addr| addr.to_lowercase())
            .collect();
        self.keys.insert(
            key.to_string(),
            AuthEntry {
                allowed_addrs,
                permissions,
            },
        );
    }

    /// Authenticate a key presented from the given source address.
    ///
    /// Unknown keys and disallowed addresses produce the same error.
    pub fn authenticate(&self, key: &str, addr: &str) -> Result<&Permissions> {
        let entry = self
            .keys
            .get(key)
            .ok_or_else(|| Error::InvalidKey(key.to_string()))?;
        if !entry.allowed_addrs.contains(&addr.to_lowercase()) {
            return Err(Error::InvalidKey(key.to_string()));
        }
        Ok(&entry.permissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> AuthTable {
        let mut table = AuthTable::new();
        table.add_key(
            "secret",
            &["127.0.0.1".to_string(), "FE80::1".to_string()],
            Permissions {
                allowed_drives: vec!["data".to_string(), "media".to_string()],
                can_write: true,
            },
        );
        table
    }

    #[test]
    fn known_key_from_allowed_address_succeeds() {
        let table = table();
        let perms = table.authenticate("secret", "127.0.0.1").unwrap();
        assert!(perms.can_write);
        assert!(perms.drive_allowed("data"));
        assert!(!perms.drive_allowed("other"));
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = table().authenticate("nope", "127.0.0.1").unwrap_err();
        assert_eq!(err.to_string(), "invalid authentication key: nope");
    }

    #[test]
    fn disallowed_address_reports_the_same_message() {
        let err = table().authenticate("secret", "10.0.0.1").unwrap_err();
        assert_eq!(err.to_string(), "invalid authentication key: secret");
    }

    #[test]
    fn address_comparison_is_case_folded() {
        let table = table();
        assert!(table.authenticate("secret", "fe80::1").is_ok());
        assert!(table.authenticate("secret", "FE80::1").is_ok());
    }

    #[test]
    fn from_config_carries_permissions() {
        let table = AuthTable::from_config(&[crate::config::AuthConfig {
            key: "reader".to_string(),
            allowed_ips: vec!["127.0.0.1".to_string()],
            allowed_drives: vec!["data".to_string()],
            can_write: false,
        }]);
        let perms = table.authenticate("reader", "127.0.0.1").unwrap();
        assert!(!perms.can_write);
        assert_eq!(perms.allowed_drives, vec!["data".to_string()]);
    }
}
