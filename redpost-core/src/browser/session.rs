use std::path::{Path, PathBuf};

use chromiumoxide::cdp::browser_protocol::network::{Cookie, CookieParam};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::{BrowserError, BrowserResult};

/// Persisted authentication state for the authoring domain. Created by a
/// successful login, loaded at the start of every login attempt, cleared when
/// restoration fails validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCredential {
    pub domain: String,
    pub cookies: Vec<CookieParam>,
}

impl SessionCredential {
    /// Builds an injectable credential from a live cookie dump. `Cookie` and
    /// `CookieParam` share their wire field names, so the conversion is a
    /// serde value round-trip.
    pub fn from_cookies(domain: impl Into<String>, cookies: &[Cookie]) -> BrowserResult<Self> {
        let value = serde_json::to_value(cookies)
            .map_err(|err| BrowserError::Session(format!("failed to encode cookies: {err}")))?;
        let cookies: Vec<CookieParam> = serde_json::from_value(value)
            .map_err(|err| BrowserError::Session(format!("failed to convert cookies: {err}")))?;
        Ok(Self {
            domain: domain.into(),
            cookies,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// JSON cookie file under the caller-provided data directory. Absence means
/// "not logged in"; an unreadable file is treated the same way and gets
/// overwritten on the next successful login.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(data_dir: &Path, file_name: &str) -> BrowserResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|err| {
            BrowserError::Session(format!(
                "failed to create data directory {}: {err}",
                data_dir.display()
            ))
        })?;
        Ok(Self {
            path: data_dir.join(file_name),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> BrowserResult<Option<SessionCredential>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path).map_err(|err| {
            BrowserError::Session(format!(
                "failed to read cookie file {}: {err}",
                self.path.display()
            ))
        })?;
        match serde_json::from_str::<SessionCredential>(&content) {
            Ok(credential) if !credential.is_empty() => Ok(Some(credential)),
            Ok(_) => Ok(None),
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "cookie file is unreadable, treating as logged out"
                );
                Ok(None)
            }
        }
    }

    pub fn save(&self, credential: &SessionCredential) -> BrowserResult<()> {
        let content = serde_json::to_string_pretty(credential)
            .map_err(|err| BrowserError::Session(format!("failed to encode credential: {err}")))?;
        std::fs::write(&self.path, content).map_err(|err| {
            BrowserError::Session(format!(
                "failed to write cookie file {}: {err}",
                self.path.display()
            ))
        })
    }

    pub fn clear(&self) -> BrowserResult<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).map_err(|err| {
                BrowserError::Session(format!(
                    "failed to remove cookie file {}: {err}",
                    self.path.display()
                ))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie(name: &str) -> CookieParam {
        CookieParam::builder()
            .name(name)
            .value("v")
            .domain("creator.xiaohongshu.com")
            .path("/")
            .build()
            .expect("cookie param builds")
    }

    #[test]
    fn missing_file_means_logged_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(dir.path(), "cookies.json").expect("store");
        assert!(store.load().expect("load").is_none());
    }

    #[test]
    fn save_load_clear_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(dir.path(), "cookies.json").expect("store");
        let credential = SessionCredential {
            domain: "creator.xiaohongshu.com".to_string(),
            cookies: vec![cookie("web_session"), cookie("a1")],
        };
        store.save(&credential).expect("save");

        let loaded = store.load().expect("load").expect("credential present");
        assert_eq!(loaded.domain, credential.domain);
        assert_eq!(loaded.cookies.len(), 2);

        store.clear().expect("clear");
        assert!(store.load().expect("load").is_none());
        // Clearing twice is harmless.
        store.clear().expect("clear again");
    }

    #[test]
    fn corrupt_file_reads_as_logged_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(dir.path(), "cookies.json").expect("store");
        std::fs::write(store.path(), "{ not json").expect("write");
        assert!(store.load().expect("load").is_none());
    }

    #[test]
    fn empty_cookie_set_reads_as_logged_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(dir.path(), "cookies.json").expect("store");
        let credential = SessionCredential {
            domain: "creator.xiaohongshu.com".to_string(),
            cookies: vec![],
        };
        store.save(&credential).expect("save");
        assert!(store.load().expect("load").is_none());
    }
}
