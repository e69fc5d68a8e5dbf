use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::PosterConfig;
use crate::draft::PostDraft;

use super::automation::{BrowserAutomation, BrowserLauncher};
use super::error::{BrowserError, BrowserResult};
use super::human::{PointerChoreographer, TimingModel};
use super::login::LoginFlow;
use super::publish::{PublishErrorKind, PublishPipeline, PublishResult};
use super::session::SessionStore;

/// Lifecycle wrapper for one publish attempt: acquire the browser, log in,
/// run the pipeline, release the browser on every exit path.
pub struct Poster {
    config: Arc<PosterConfig>,
    store: SessionStore,
}

impl Poster {
    pub fn new(config: PosterConfig, data_dir: &Path) -> BrowserResult<Self> {
        let store = SessionStore::new(data_dir, &config.session.cookies_file)?;
        Ok(Self {
            config: Arc::new(config),
            store,
        })
    }

    pub fn session_store(&self) -> &SessionStore {
        &self.store
    }

    pub async fn publish(&self, draft: &PostDraft) -> BrowserResult<PublishResult> {
        if draft.images().is_empty() {
            return Ok(PublishResult::failure(
                PublishErrorKind::PreconditionFailure,
                "draft contains no images",
            ));
        }

        let launcher = BrowserLauncher::new(Arc::clone(&self.config));
        let automation = launcher.launch().await?;
        let outcome = self.drive(&automation, draft).await;
        if let Err(err) = automation.shutdown().await {
            warn!(error = %err, "browser shutdown reported an error");
        }

        match outcome {
            Ok(result) => {
                info!(success = result.success(), "publish attempt finished");
                Ok(result)
            }
            Err(BrowserError::LoginTimeout(secs)) => Ok(PublishResult::failure(
                PublishErrorKind::LoginTimeout,
                format!("interactive login not completed within {secs}s"),
            )),
            Err(err) => Err(err),
        }
    }

    async fn drive(
        &self,
        automation: &BrowserAutomation,
        draft: &PostDraft,
    ) -> BrowserResult<PublishResult> {
        let ctx = automation.new_context().await?;
        let mut timing = TimingModel::new(self.config.human.clone());
        let mut pointer = PointerChoreographer::new(self.config.human.clone());

        LoginFlow::new(&ctx, &self.store, &self.config)
            .ensure_logged_in(&mut timing, &mut pointer)
            .await?;

        PublishPipeline::new(&ctx, &self.config, &mut timing, &mut pointer)
            .run(draft)
            .await
    }
}
