use crate::error::AuthError;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::debug;

/// OAuth2 credential for one integration. Refreshing produces a new value,
/// a stored credential is never edited in place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl Credential {
    /// Usable only while `now + skew` is still before expiry.
    pub fn is_usable_at(&self, now: OffsetDateTime, skew: Duration) -> bool {
        !self.access_token.is_empty() && now + skew < self.expires_at
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// One JSON file per integration, readable only by the owner.
#[derive(Clone, Debug)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file means no credential yet.
    pub fn load(&self) -> Result<Option<Credential>, AuthError> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(AuthError::Storage(format!(
                    "read {}: {err}",
                    self.path.display()
                )));
            }
        };
        let credential = serde_json::from_str(&data)
            .map_err(|err| AuthError::Storage(format!("parse {}: {err}", self.path.display())))?;
        Ok(Some(credential))
    }

    pub fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            create_private_dir(parent)
                .map_err(|err| AuthError::Storage(format!("create token directory: {err}")))?;
        }
        let json = serde_json::to_string_pretty(credential)
            .map_err(|err| AuthError::Storage(format!("serialize token: {err}")))?;
        write_private_file(&self.path, json.as_bytes())
            .map_err(|err| AuthError::Storage(format!("write {}: {err}", self.path.display())))?;
        debug!(path = %self.path.display(), "Token saved");
        Ok(())
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)?;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

fn write_private_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let mut options = OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(&tmp)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use time::macros::datetime;

    fn credential(expires_at: OffsetDateTime) -> Credential {
        Credential {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            token_type: "Bearer".to_string(),
            expires_at,
        }
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let store = TokenStore::new(tmp.path().join("oura_tokens.json"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn saved_credential_loads_back() {
        let tmp = TempDir::new().unwrap();
        let store = TokenStore::new(tmp.path().join("private").join("oura_tokens.json"));
        let saved = credential(datetime!(2030-01-01 00:00:00 UTC));
        store.save(&saved).unwrap();
        assert_eq!(store.load().unwrap(), Some(saved));
    }

    #[cfg(unix)]
    #[test]
    fn token_file_and_directory_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("private");
        let store = TokenStore::new(dir.join("planta_tokens.json"));
        store
            .save(&credential(datetime!(2030-01-01 00:00:00 UTC)))
            .unwrap();

        let file_mode = fs::metadata(store.path()).unwrap().permissions().mode();
        let dir_mode = fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(file_mode & 0o777, 0o600);
        assert_eq!(dir_mode & 0o777, 0o700);
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("oura_tokens.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            TokenStore::new(path).load(),
            Err(AuthError::Storage(_))
        ));
    }

    #[test]
    fn usable_only_outside_skew() {
        let now = datetime!(2024-01-01 12:00:00 UTC);
        let skew = Duration::from_secs(300);
        assert!(!credential(datetime!(2024-01-01 12:04:00 UTC)).is_usable_at(now, skew));
        assert!(!credential(datetime!(2024-01-01 12:05:00 UTC)).is_usable_at(now, skew));
        assert!(credential(datetime!(2024-01-01 12:05:01 UTC)).is_usable_at(now, skew));
    }
}
