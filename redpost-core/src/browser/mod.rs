mod automation;
mod error;
mod human;
mod login;
mod poster;
mod publish;
mod selector;
mod session;

pub use automation::{BrowserAutomation, BrowserContext, BrowserLauncher, ViewportSpec};
pub use error::{BrowserError, BrowserResult};
pub use human::{PointerChoreographer, TimingModel, TypingEvent, TypingPlan};
pub use login::{is_login_url, LoginFlow};
pub use poster::Poster;
pub use publish::{PublishErrorKind, PublishPipeline, PublishResult};
pub use selector::{InteractionTarget, SelectorResolver};
pub use session::{SessionCredential, SessionStore};
