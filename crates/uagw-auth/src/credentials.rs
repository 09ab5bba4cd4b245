//! Username → secret table

use std::collections::HashMap;

use uagw_core::Secret;

use crate::error::AuthError;

/// Read-only credential table.
///
/// Keys are unique and matched exactly (case-sensitive). The stored value is
/// an opaque token compared byte for byte with what the client sends.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    users: HashMap<String, Secret>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(username, secret)` pairs, rejecting duplicates
    pub fn from_entries<I, U, S>(entries: I) -> Result<Self, AuthError>
    where
        I: IntoIterator<Item = (U, S)>,
        U: Into<String>,
        S: Into<Secret>,
    {
        let mut users = HashMap::new();
        for (username, secret) in entries {
            let username = username.into();
            if username.is_empty() {
                return Err(AuthError::EmptyUsername);
            }
            if users.contains_key(&username) {
                return Err(AuthError::DuplicateUser(username));
            }
            users.insert(username, secret.into());
        }
        Ok(Self { users })
    }

    pub fn get(&self, username: &str) -> Option<&Secret> {
        self.users.get(username)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    /// Sorted usernames, for logging and stack adapters
    pub fn usernames(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.users.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Iterate entries in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Secret)> {
        self.users.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
