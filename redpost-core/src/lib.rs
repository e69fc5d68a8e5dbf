pub mod browser;
pub mod config;
pub mod draft;
pub mod error;

pub use browser::{
    BrowserError, BrowserResult, Poster, PublishErrorKind, PublishResult, SessionCredential,
    SessionStore,
};
pub use config::{load_poster_config, PosterConfig, SelectorPattern};
pub use draft::{extract_draft, find_images, DraftError, DraftPreview, PostDraft};
pub use error::{ConfigError, Result};
