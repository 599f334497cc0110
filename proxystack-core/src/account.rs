//! S3 credential to account mapping

use dashmap::DashMap;

/// Resolved S3 credentials for the current request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Auth {
    pub access_key: String,
    pub account: String,
}

/// Thread-safe mapping from S3 access keys to internal accounts.
///
/// Populated once at startup and read concurrently afterwards.
#[derive(Debug)]
pub struct CredentialStore {
    accounts: DashMap<String, String>,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
        }
    }

    /// Map an access key to an account, replacing any previous mapping
    pub fn insert(&self, access_key: impl Into<String>, account: impl Into<String>) {
        self.accounts.insert(access_key.into(), account.into());
    }

    /// Resolve an access key to its account
    pub fn resolve(&self, access_key: &str) -> Option<S3Auth> {
        self.accounts.get(access_key).map(|account| S3Auth {
            access_key: access_key.to_string(),
            account: account.value().clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl<K: Into<String>, A: Into<String>> FromIterator<(K, A)> for CredentialStore {
    fn from_iter<I: IntoIterator<Item = (K, A)>>(iter: I) -> Self {
        let store = Self::new();
        for (access_key, account) in iter {
            store.insert(access_key, account);
        }
        store
    }
}
