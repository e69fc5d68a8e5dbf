use thiserror::Error;

pub type BrowserResult<T> = Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium launch failed: {0}")]
    Launch(String),
    #[error("cdp error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("interactive login not completed within {0}s")]
    LoginTimeout(u64),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("session store error: {0}")]
    Session(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}
