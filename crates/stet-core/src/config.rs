use anyhow::Context;
use directories::ProjectDirs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const OURA_POLL_INTERVAL: Duration = Duration::from_secs(20);
pub const PLANTA_POLL_INTERVAL: Duration = Duration::from_secs(4 * 60 * 60);
pub const JOURNAL_DEBOUNCE: Duration = Duration::from_millis(500);
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const TOKEN_SKEW: Duration = Duration::from_secs(5 * 60);
pub const CALLBACK_PORT: u16 = 8089;
pub const CALLBACK_PATH: &str = "/callback";
pub const CALLBACK_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
pub const PLANTA_DUE_WINDOW_DAYS: i64 = 3;
pub const HISTORY_MIN_DAYS: usize = 7;
pub const HISTORY_MAX_DAYS: usize = 90;

/// Files kept under the per-user data directory.
#[derive(Clone, Debug)]
pub struct AppPaths {
    data_dir: PathBuf,
}

impl AppPaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn resolve(override_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        match override_dir {
            Some(dir) => Ok(Self::new(dir)),
            None => Ok(Self::new(default_data_dir()?)),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn database(&self) -> PathBuf {
        self.data_dir.join("data.db")
    }

    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("debug.log")
    }

    pub fn oura_tokens(&self) -> PathBuf {
        self.data_dir.join("oura_tokens.json")
    }

    pub fn planta_tokens(&self) -> PathBuf {
        self.data_dir.join("planta_tokens.json")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.data_dir.join("stet.lock")
    }
}

pub fn default_data_dir() -> anyhow::Result<PathBuf> {
    let project = ProjectDirs::from("codes", "stet", "stet").context("resolve project dirs")?;
    Ok(project.data_dir().to_path_buf())
}

/// Credentials for the two integrations, read from the environment.
#[derive(Clone, Debug, Default)]
pub struct Credentials {
    pub oura_client_id: Option<String>,
    pub oura_client_secret: Option<String>,
    pub planta_app_code: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            oura_client_id: configured(lookup("OURA_CLIENT_ID")),
            oura_client_secret: configured(lookup("OURA_CLIENT_SECRET")),
            planta_app_code: configured(lookup("PLANTA_APP_CODE")),
        }
    }
}

/// Placeholder values copied from an example `.env` count as unset.
fn configured(value: Option<String>) -> Option<String> {
    let value = value?.trim().to_string();
    if value.is_empty() || value.starts_with("your_") {
        return None;
    }
    Some(value)
}

pub fn callback_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, CALLBACK_PORT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn placeholders_are_not_configured() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OURA_CLIENT_ID", "your_client_id"),
            ("OURA_CLIENT_SECRET", "  secret "),
            ("PLANTA_APP_CODE", ""),
        ]);
        let creds = Credentials::from_lookup(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(creds.oura_client_id, None);
        assert_eq!(creds.oura_client_secret.as_deref(), Some("secret"));
        assert_eq!(creds.planta_app_code, None);
    }

    #[test]
    fn paths_live_under_data_dir() {
        let paths = AppPaths::new("/tmp/stet");
        assert_eq!(paths.database(), PathBuf::from("/tmp/stet/data.db"));
        assert_eq!(paths.lock_file(), PathBuf::from("/tmp/stet/stet.lock"));
        assert_eq!(
            paths.planta_tokens(),
            PathBuf::from("/tmp/stet/planta_tokens.json")
        );
    }
}
