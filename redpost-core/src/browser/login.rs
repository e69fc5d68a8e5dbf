use std::time::{Duration, Instant};

use chromiumoxide::cdp::browser_protocol::network::ClearBrowserCookiesParams;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::PosterConfig;

use super::automation::BrowserContext;
use super::error::{BrowserError, BrowserResult};
use super::human::{PointerChoreographer, TimingModel};
use super::selector::SelectorResolver;
use super::session::{SessionCredential, SessionStore};

/// Session restoration, login-state detection, and the interactive QR
/// fallback. Only the scan timeout is fatal; a missing QR tab is a UI
/// nicety, not a correctness requirement.
pub struct LoginFlow<'a> {
    ctx: &'a BrowserContext,
    store: &'a SessionStore,
    config: &'a PosterConfig,
}

impl<'a> LoginFlow<'a> {
    pub fn new(ctx: &'a BrowserContext, store: &'a SessionStore, config: &'a PosterConfig) -> Self {
        Self { ctx, store, config }
    }

    pub async fn ensure_logged_in(
        &self,
        timing: &mut TimingModel,
        pointer: &mut PointerChoreographer,
    ) -> BrowserResult<()> {
        if let Some(credential) = self.store.load()? {
            if self.restore_session(&credential, timing).await? {
                return Ok(());
            }
            // Stale cookies must not leak into the interactive attempt.
            self.ctx
                .page()
                .execute(ClearBrowserCookiesParams::default())
                .await?;
            self.store.clear()?;
        } else {
            debug!("no persisted credential, going straight to interactive login");
        }

        self.interactive_login(timing, pointer).await
    }

    /// Injects the persisted cookies and validates them by reloading: any URL
    /// other than the login URL means the session is live.
    async fn restore_session(
        &self,
        credential: &SessionCredential,
        timing: &mut TimingModel,
    ) -> BrowserResult<bool> {
        info!(
            cookies = credential.cookies.len(),
            domain = %credential.domain,
            "restoring persisted session"
        );
        self.ctx.goto(&self.config.urls.base).await?;
        self.ctx
            .page()
            .set_cookies(credential.cookies.clone())
            .await?;
        self.ctx.reload().await?;
        timing.delay(self.config.timing.login_settle_ms).await;

        let url = self.ctx.current_url().await?;
        if is_login_url(&url, &self.config.urls.login_path) {
            warn!(url = %url, "persisted session rejected, interactive login required");
            return Ok(false);
        }

        self.persist_current_session().await?;
        timing.delay(self.config.timing.post_login_ms).await;
        info!("session restored from persisted cookies");
        Ok(true)
    }

    async fn interactive_login(
        &self,
        timing: &mut TimingModel,
        pointer: &mut PointerChoreographer,
    ) -> BrowserResult<()> {
        self.ctx.goto(&self.config.urls.login).await?;
        timing.delay(self.config.timing.login_page_ms).await;

        let resolver = SelectorResolver::new(
            self.ctx.page(),
            Duration::from_millis(self.config.timing.selector_poll_ms),
        );
        match resolver
            .resolve(
                &self.config.selectors.qr_tab,
                Duration::from_millis(self.config.timing.tab_attempt_ms),
            )
            .await
        {
            Some(tab) => {
                pointer
                    .move_and_click(self.ctx.page(), &tab, timing)
                    .await?;
                timing.delay(self.config.timing.qr_settle_ms).await;
            }
            None => debug!("qr login tab not found, assuming qr view is already shown"),
        }
        timing.delay(self.config.timing.login_page_ms).await;

        info!("scan the qr code with the mobile app to continue");
        self.await_scan().await?;

        info!("login confirmed, persisting session");
        self.persist_current_session().await?;
        timing.delay(self.config.timing.post_login_ms).await;
        Ok(())
    }

    /// Blocks until the page leaves the login path, bounded by the scan
    /// timeout. Timeout is fatal; there is no retry.
    async fn await_scan(&self) -> BrowserResult<()> {
        let timeout_secs = self.config.timing.scan_timeout_secs;
        let deadline = Instant::now() + Duration::from_secs(timeout_secs);
        let poll = Duration::from_millis(self.config.timing.scan_poll_ms);
        loop {
            let url = self.ctx.current_url().await?;
            if !url.is_empty() && !is_login_url(&url, &self.config.urls.login_path) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::LoginTimeout(timeout_secs));
            }
            sleep(poll).await;
        }
    }

    async fn persist_current_session(&self) -> BrowserResult<()> {
        let cookies = self.ctx.page().get_cookies().await?;
        let credential = SessionCredential::from_cookies(self.config.urls.base.clone(), &cookies)?;
        self.store.save(&credential)?;
        debug!(
            cookies = credential.cookies.len(),
            path = %self.store.path().display(),
            "session credential persisted"
        );
        Ok(())
    }
}

/// A credential is valid only if the post-reload URL is not the login URL.
pub fn is_login_url(url: &str, login_path: &str) -> bool {
    url.contains(login_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_url_detection_uses_path_fragment() {
        assert!(is_login_url("https://creator.xiaohongshu.com/login", "/login"));
        assert!(is_login_url(
            "https://creator.xiaohongshu.com/login?from=qr",
            "/login"
        ));
        assert!(!is_login_url(
            "https://creator.xiaohongshu.com/publish/publish",
            "/login"
        ));
        assert!(!is_login_url("https://creator.xiaohongshu.com", "/login"));
    }
}
