//! In-memory credential store.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use super::{validate_username, AuthError, Authenticator, Identity};
use crate::config::{format_toml_error, AuthConfig, UserEntry};

/// Layout of a standalone credentials file.
///
/// ```toml
/// [[users]]
/// username = "usuario1"
/// password = "senha1"
/// ```
#[derive(Debug, Default, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    users: Vec<UserEntry>,
}

/// Username to password map, built once at startup and read-only afterwards.
#[derive(Default)]
pub struct CredentialStore {
    users: HashMap<String, String>,
}

impl CredentialStore {
    /// Create an empty store. Every login fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a list of entries.
    ///
    /// A username listed twice keeps its last password.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = UserEntry>,
    {
        let users = entries
            .into_iter()
            .map(|e| (e.username, e.password))
            .collect();
        Self { users }
    }

    /// Build a store from the `[auth]` section, merging in the credentials
    /// file when one is configured.
    ///
    /// Fails if the file cannot be read, holds an unsafe username, or
    /// repeats a username already defined.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let mut store = Self::from_entries(config.users.iter().cloned());

        if let Some(path) = &config.credentials_file {
            for entry in load_credentials_file(path)? {
                if store.users.contains_key(&entry.username) {
                    bail!(
                        "user {:?} from {} is already defined",
                        entry.username,
                        path.display()
                    );
                }
                store.users.insert(entry.username, entry.password);
            }
            tracing::info!(path = %path.display(), "Loaded credentials file");
        }

        Ok(store)
    }

    /// Number of known users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// True if no user can log in.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Whether `username` is known.
    pub fn contains(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    /// Known usernames, in no particular order.
    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.users.keys().map(String::as_str)
    }
}

impl Authenticator for CredentialStore {
    fn authenticate(&self, username: &str, password: &str) -> Result<Identity, AuthError> {
        match self.users.get(username) {
            None => Err(AuthError::UnknownUser(username.to_string())),
            Some(expected) if expected != password => {
                Err(AuthError::BadPassword(username.to_string()))
            }
            Some(_) => Ok(Identity::new(username)),
        }
    }
}

fn load_credentials_file(path: &Path) -> Result<Vec<UserEntry>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read credentials file: {}", path.display()))?;

    let file: CredentialsFile = toml::from_str(&contents).map_err(|e| {
        anyhow::anyhow!(
            "Invalid credentials file {}: {}",
            path.display(),
            format_toml_error(&e)
        )
    })?;

    let mut seen = std::collections::HashSet::new();
    for entry in &file.users {
        if !validate_username(&entry.username) {
            bail!(
                "invalid username {:?} in {}",
                entry.username,
                path.display()
            );
        }
        if !seen.insert(entry.username.as_str()) {
            bail!(
                "username {:?} appears twice in {}",
                entry.username,
                path.display()
            );
        }
    }

    Ok(file.users)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn default_store() -> CredentialStore {
        CredentialStore::from_config(&AuthConfig::default()).unwrap()
    }

    #[test]
    fn test_default_users_authenticate() {
        let store = default_store();
        assert_eq!(store.len(), 2);

        let identity = store.authenticate("usuario1", "senha1").unwrap();
        assert_eq!(identity.username(), "usuario1");
        let identity = store.authenticate("usuario2", "senha2").unwrap();
        assert_eq!(identity.username(), "usuario2");
    }

    #[test]
    fn test_bad_password() {
        let store = default_store();
        assert_eq!(
            store.authenticate("usuario1", "wrong"),
            Err(AuthError::BadPassword("usuario1".to_string()))
        );
        // Passwords do not cross users
        assert!(store.authenticate("usuario1", "senha2").is_err());
    }

    #[test]
    fn test_unknown_user() {
        let store = default_store();
        assert_eq!(
            store.authenticate("mallory", "senha1"),
            Err(AuthError::UnknownUser("mallory".to_string()))
        );
    }

    #[test]
    fn test_match_is_case_sensitive() {
        let store = default_store();
        assert!(store.authenticate("USUARIO1", "senha1").is_err());
        assert!(store.authenticate("usuario1", "SENHA1").is_err());
        assert!(store.authenticate("usuario1 ", "senha1").is_err());
    }

    #[test]
    fn test_empty_store_rejects_everyone() {
        let store = CredentialStore::new();
        assert!(store.is_empty());
        assert!(store.authenticate("", "").is_err());
    }

    #[test]
    fn test_from_entries_last_wins() {
        let store = CredentialStore::from_entries([
            UserEntry::new("a", "1"),
            UserEntry::new("a", "2"),
        ]);
        assert_eq!(store.len(), 1);
        assert!(store.authenticate("a", "2").is_ok());
    }

    #[test]
    fn test_credentials_file_merged() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("users.toml");
        fs::write(
            &path,
            r#"
[[users]]
username = "alice"
password = "wonderland"
"#,
        )
        .unwrap();

        let config = AuthConfig {
            credentials_file: Some(path),
            ..AuthConfig::default()
        };
        let store = CredentialStore::from_config(&config).unwrap();

        assert_eq!(store.len(), 3);
        assert!(store.contains("alice"));
        assert!(store.authenticate("alice", "wonderland").is_ok());
        assert!(store.authenticate("usuario1", "senha1").is_ok());
    }

    #[test]
    fn test_credentials_file_only() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("users.toml");
        fs::write(&path, "[[users]]\nusername = \"bob\"\npassword = \"pw\"\n").unwrap();

        let config = AuthConfig {
            users: Vec::new(),
            credentials_file: Some(path),
        };
        let store = CredentialStore::from_config(&config).unwrap();
        let names: Vec<_> = store.usernames().collect();
        assert_eq!(names, ["bob"]);
    }

    #[test]
    fn test_credentials_file_missing() {
        let config = AuthConfig {
            users: Vec::new(),
            credentials_file: Some("/nonexistent/users.toml".into()),
        };
        let err = CredentialStore::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("Failed to read credentials file"));
    }

    #[test]
    fn test_credentials_file_conflicts_with_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("users.toml");
        fs::write(
            &path,
            "[[users]]\nusername = \"usuario1\"\npassword = \"other\"\n",
        )
        .unwrap();

        let config = AuthConfig {
            credentials_file: Some(path),
            ..AuthConfig::default()
        };
        let err = CredentialStore::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("already defined"));
    }

    #[test]
    fn test_credentials_file_rejects_unsafe_username() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("users.toml");
        fs::write(&path, "[[users]]\nusername = \"../root\"\npassword = \"x\"\n").unwrap();

        let config = AuthConfig {
            users: Vec::new(),
            credentials_file: Some(path),
        };
        let err = CredentialStore::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("invalid username"));
    }

    #[test]
    fn test_credentials_file_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("users.toml");
        fs::write(&path, "[[users]\nusername =").unwrap();

        let config = AuthConfig {
            users: Vec::new(),
            credentials_file: Some(path),
        };
        let err = CredentialStore::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("Invalid credentials file"));
    }
}
