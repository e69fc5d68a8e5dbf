use std::fmt;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::element::Element;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::PosterConfig;
use crate::draft::PostDraft;

use super::automation::BrowserContext;
use super::error::{BrowserError, BrowserResult};
use super::human::{PointerChoreographer, TimingModel};
use super::selector::SelectorResolver;

/// Closed classification of publish failures, so callers branch exhaustively
/// instead of string-matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishErrorKind {
    SelectorExhausted,
    LoginTimeout,
    UploadTargetMissing,
    PreconditionFailure,
    PostSubmitSignal,
}

impl fmt::Display for PublishErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PublishErrorKind::SelectorExhausted => "selector_exhausted",
            PublishErrorKind::LoginTimeout => "login_timeout",
            PublishErrorKind::UploadTargetMissing => "upload_target_missing",
            PublishErrorKind::PreconditionFailure => "precondition_failure",
            PublishErrorKind::PostSubmitSignal => "post_submit_signal",
        };
        f.write_str(label)
    }
}

/// Outcome of one publish attempt. Produced exactly once per attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PublishResult {
    Success {
        images_uploaded: usize,
        warnings: Vec<String>,
    },
    Failure {
        error: PublishErrorKind,
        message: String,
        warnings: Vec<String>,
    },
}

impl PublishResult {
    pub fn success(&self) -> bool {
        matches!(self, PublishResult::Success { .. })
    }

    pub fn warnings(&self) -> &[String] {
        match self {
            PublishResult::Success { warnings, .. } => warnings,
            PublishResult::Failure { warnings, .. } => warnings,
        }
    }

    pub fn failure(error: PublishErrorKind, message: impl Into<String>) -> Self {
        PublishResult::Failure {
            error,
            message: message.into(),
            warnings: Vec::new(),
        }
    }
}

/// Drives the multi-stage publish protocol on one authenticated page:
/// navigate, browse-simulate, mode-switch, image upload, title, body, review,
/// submit, result check. Field-level absences degrade to warnings; the
/// pipeline keeps moving.
pub struct PublishPipeline<'a> {
    ctx: &'a BrowserContext,
    config: &'a PosterConfig,
    timing: &'a mut TimingModel,
    pointer: &'a mut PointerChoreographer,
    warnings: Vec<String>,
    images_uploaded: usize,
}

impl<'a> PublishPipeline<'a> {
    pub fn new(
        ctx: &'a BrowserContext,
        config: &'a PosterConfig,
        timing: &'a mut TimingModel,
        pointer: &'a mut PointerChoreographer,
    ) -> Self {
        Self {
            ctx,
            config,
            timing,
            pointer,
            warnings: Vec::new(),
            images_uploaded: 0,
        }
    }

    pub async fn run(mut self, draft: &PostDraft) -> BrowserResult<PublishResult> {
        if draft.images().is_empty() {
            return Ok(PublishResult::failure(
                PublishErrorKind::PreconditionFailure,
                "draft contains no images",
            ));
        }

        self.navigate().await?;
        self.browse().await?;
        self.switch_mode().await?;
        self.upload_images(draft).await?;
        self.fill_title(draft).await?;
        self.fill_body(draft).await?;
        self.final_review().await?;
        let submitted = self.submit().await?;
        let banner = self.result_check().await?;

        Ok(compose_result(
            submitted,
            banner,
            self.images_uploaded,
            self.warnings,
        ))
    }

    fn resolver(&self) -> SelectorResolver<'_> {
        SelectorResolver::new(
            self.ctx.page(),
            Duration::from_millis(self.config.timing.selector_poll_ms),
        )
    }

    async fn navigate(&mut self) -> BrowserResult<()> {
        info!(url = %self.config.urls.publish, "navigating to publish page");
        self.ctx.goto(&self.config.urls.publish).await?;
        // The publish page is the heaviest load in the whole flow.
        self.timing.delay(self.config.timing.page_settle_ms).await;
        Ok(())
    }

    async fn browse(&mut self) -> BrowserResult<()> {
        self.timing
            .delay(self.config.timing.pre_interaction_ms)
            .await;
        self.pointer
            .simulate_browsing(self.ctx.page(), self.timing)
            .await?;
        self.pointer
            .wander(self.ctx.page(), self.ctx.viewport(), self.timing)
            .await?;
        Ok(())
    }

    /// Switches to the image-post tab. Some UI states already default to it,
    /// so chain exhaustion is tolerated.
    async fn switch_mode(&mut self) -> BrowserResult<()> {
        self.timing
            .delay(self.config.timing.mode_switch_settle_ms)
            .await;
        let resolver = self.resolver();
        match resolver
            .resolve(
                &self.config.selectors.image_tab,
                Duration::from_millis(self.config.timing.tab_attempt_ms),
            )
            .await
        {
            Some(tab) => {
                self.pointer
                    .move_and_click(self.ctx.page(), &tab, self.timing)
                    .await?;
                self.timing
                    .delay(self.config.timing.mode_switch_settle_ms)
                    .await;
                info!("switched to image post mode");
            }
            None => {
                warn!("image tab not found, assuming image mode is already active");
            }
        }
        Ok(())
    }

    /// Uploads images in draft order. The uploader DOM mutates after every
    /// file, so the input is re-resolved each iteration. A missing input
    /// aborts the remaining uploads but not the pipeline.
    async fn upload_images(&mut self, draft: &PostDraft) -> BrowserResult<()> {
        let total = draft.images().len();
        info!(count = total, "uploading images");
        self.timing.delay(self.config.timing.upload_prepare_ms).await;

        for (index, image) in draft.images().iter().enumerate() {
            let Some(input) = self.locate_file_input(index == 0).await else {
                let message = format!(
                    "upload aborted at image {}/{total}: no suitable file input",
                    index + 1
                );
                warn!(%message);
                self.warnings.push(message);
                break;
            };

            self.pointer
                .wander(self.ctx.page(), self.ctx.viewport(), self.timing)
                .await?;
            self.timing.delay(self.config.timing.pre_upload_ms).await;

            let path = image
                .canonicalize()
                .unwrap_or_else(|_| image.clone())
                .to_string_lossy()
                .into_owned();
            let params = SetFileInputFilesParams::builder()
                .files(vec![path.clone()])
                .backend_node_id(input.backend_node_id)
                .build()
                .map_err(BrowserError::Configuration)?;
            self.ctx.page().execute(params).await?;
            self.images_uploaded += 1;
            debug!(image = %path, n = index + 1, total, "image handed to uploader");

            self.timing.delay(self.config.timing.upload_settle_ms).await;
        }

        if self.images_uploaded == total {
            info!(count = total, "image upload complete");
        }
        Ok(())
    }

    /// Prefers a file input whose accept attribute indicates images over
    /// video; falls back to the last input on the first pass and the first
    /// one on re-resolution passes.
    async fn locate_file_input(&self, first_pass: bool) -> Option<Element> {
        let resolver = self.resolver();
        let inputs = resolver.find_all(&self.config.selectors.file_input).await;
        let mut accepts = Vec::with_capacity(inputs.len());
        for input in &inputs {
            accepts.push(input.attribute("accept").await.ok().flatten());
        }
        let index = choose_upload_index(&accepts, first_pass)?;
        inputs.into_iter().nth(index)
    }

    async fn fill_title(&mut self, draft: &PostDraft) -> BrowserResult<()> {
        self.ctx
            .page()
            .evaluate("window.scrollTo(0, 0)")
            .await
            .map_err(|err| {
                BrowserError::Unexpected(format!("failed to scroll to top: {err}"))
            })?;
        self.timing.delay(self.config.timing.scroll_top_ms).await;

        let resolver = self.resolver();
        match resolver
            .resolve(
                &self.config.selectors.title_input,
                Duration::from_millis(self.config.timing.selector_attempt_ms),
            )
            .await
        {
            Some(target) => {
                info!(title = %draft.title(), "typing title");
                self.timing.type_text(&target.element, draft.title()).await?;
            }
            None => {
                let message = "title field not found, skipping title input".to_string();
                warn!(%message);
                self.warnings.push(message);
            }
        }
        self.timing.delay(self.config.timing.post_title_ms).await;
        Ok(())
    }

    async fn fill_body(&mut self, draft: &PostDraft) -> BrowserResult<()> {
        let resolver = self.resolver();
        match resolver
            .resolve(
                &self.config.selectors.content_input,
                Duration::from_millis(self.config.timing.selector_attempt_ms),
            )
            .await
        {
            Some(target) => {
                info!(chars = draft.body().chars().count(), "typing body");
                target.element.scroll_into_view().await.map_err(|err| {
                    BrowserError::Unexpected(format!("failed to scroll body field into view: {err}"))
                })?;
                self.timing.delay(self.config.timing.content_focus_ms).await;
                self.timing.type_text(&target.element, draft.body()).await?;
            }
            None => {
                let message = "body field not found, skipping body input".to_string();
                warn!(%message);
                self.warnings.push(message);
            }
        }
        Ok(())
    }

    /// A last read-through before committing, sometimes with one more scroll
    /// pass.
    async fn final_review(&mut self) -> BrowserResult<()> {
        self.timing.delay(self.config.timing.review_ms).await;
        if self
            .timing
            .gamble(self.config.timing.review_scroll_probability)
        {
            self.pointer
                .simulate_browsing(self.ctx.page(), self.timing)
                .await?;
        }
        Ok(())
    }

    /// Clicks the publish button exactly once. The chain is deliberately
    /// narrow; exhaustion means manual completion, never a blind retry.
    async fn submit(&mut self) -> BrowserResult<bool> {
        let resolver = self.resolver();
        match resolver
            .resolve(
                &self.config.selectors.submit,
                Duration::from_millis(self.config.timing.selector_attempt_ms),
            )
            .await
        {
            Some(target) => {
                target.element.scroll_into_view().await.map_err(|err| {
                    BrowserError::Unexpected(format!(
                        "failed to scroll publish button into view: {err}"
                    ))
                })?;
                self.timing.delay(self.config.timing.pre_submit_ms).await;
                self.pointer
                    .move_and_click(self.ctx.page(), &target, self.timing)
                    .await?;
                info!("publish button clicked");
                Ok(true)
            }
            None => {
                let message =
                    "publish button not found, submission requires manual completion".to_string();
                warn!(%message);
                self.warnings.push(message);
                Ok(false)
            }
        }
    }

    /// Waits out server processing and probes once for an error banner.
    async fn result_check(&mut self) -> BrowserResult<Option<String>> {
        self.timing.delay(self.config.timing.result_wait_ms).await;
        let resolver = self.resolver();
        let Some(banner) = resolver.probe(&self.config.selectors.error_banner).await else {
            return Ok(None);
        };
        let text = banner
            .element
            .inner_text()
            .await
            .ok()
            .flatten()
            .map(|text| text.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            return Ok(None);
        }
        warn!(banner = %text, "error banner detected after submission");
        Ok(Some(text))
    }
}

/// Outcome precedence: a missed publish button outranks a post-submit
/// banner; upload shortfalls ride along as warnings on either outcome.
pub(crate) fn compose_result(
    submitted: bool,
    banner: Option<String>,
    images_uploaded: usize,
    warnings: Vec<String>,
) -> PublishResult {
    if !submitted {
        return PublishResult::Failure {
            error: PublishErrorKind::SelectorExhausted,
            message: "publish button not found, complete the submission manually".to_string(),
            warnings,
        };
    }
    if let Some(text) = banner {
        return PublishResult::Failure {
            error: PublishErrorKind::PostSubmitSignal,
            message: text,
            warnings,
        };
    }
    PublishResult::Success {
        images_uploaded,
        warnings,
    }
}

/// Accept-attribute classification from the upload loop: an input takes
/// images if it names an image format, or declares a type that at least does
/// not name video.
pub(crate) fn accept_is_image(accept: Option<&str>) -> bool {
    let Some(accept) = accept else {
        return false;
    };
    if accept.is_empty() {
        return false;
    }
    let accept = accept.to_ascii_lowercase();
    accept.contains("image")
        || accept.contains("png")
        || accept.contains("jpg")
        || accept.contains("jpeg")
        || (!accept.contains("mp4") && !accept.contains("video"))
}

/// Picks the upload input among the current file inputs: first
/// image-accepting one, else the last input on the first pass or the first
/// input afterwards.
pub(crate) fn choose_upload_index(accepts: &[Option<String>], first_pass: bool) -> Option<usize> {
    if let Some(index) = accepts
        .iter()
        .position(|accept| accept_is_image(accept.as_deref()))
    {
        return Some(index);
    }
    if accepts.is_empty() {
        None
    } else if first_pass {
        Some(accepts.len() - 1)
    } else {
        Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(text: &str) -> Option<String> {
        Some(text.to_string())
    }

    #[test]
    fn accept_classification_matches_upload_policy() {
        assert!(accept_is_image(Some("image/*")));
        assert!(accept_is_image(Some(".png,.jpg,.jpeg")));
        assert!(accept_is_image(Some("application/pdf")));
        assert!(!accept_is_image(Some("video/mp4")));
        assert!(!accept_is_image(Some(".mp4,.mov")));
        assert!(!accept_is_image(Some("")));
        assert!(!accept_is_image(None));
    }

    #[test]
    fn image_accepting_input_wins_over_fallbacks() {
        let accepts = vec![some("video/mp4"), some("image/png"), some("video/mp4")];
        assert_eq!(choose_upload_index(&accepts, true), Some(1));
        assert_eq!(choose_upload_index(&accepts, false), Some(1));
    }

    #[test]
    fn fallback_is_last_input_on_first_pass_then_first() {
        let accepts = vec![some("video/mp4"), None, some("video/webm")];
        assert_eq!(choose_upload_index(&accepts, true), Some(2));
        assert_eq!(choose_upload_index(&accepts, false), Some(0));
    }

    #[test]
    fn no_inputs_means_no_upload_target() {
        assert_eq!(choose_upload_index(&[], true), None);
        assert_eq!(choose_upload_index(&[], false), None);
    }

    #[test]
    fn upload_shortfall_degrades_to_warning_not_failure() {
        let warnings = vec!["upload aborted at image 1/2: no suitable file input".to_string()];
        let result = compose_result(true, None, 0, warnings.clone());
        assert!(result.success());
        assert_eq!(result.warnings(), warnings.as_slice());
    }

    #[test]
    fn missed_submit_outranks_post_submit_banner() {
        let result = compose_result(false, Some("服务器繁忙".to_string()), 2, vec![]);
        match result {
            PublishResult::Failure { error, .. } => {
                assert_eq!(error, PublishErrorKind::SelectorExhausted);
            }
            PublishResult::Success { .. } => panic!("expected failure"),
        }
    }

    #[test]
    fn banner_flips_a_submitted_attempt_to_failure() {
        let result = compose_result(true, Some("发布失败".to_string()), 2, vec![]);
        match result {
            PublishResult::Failure { error, message, .. } => {
                assert_eq!(error, PublishErrorKind::PostSubmitSignal);
                assert_eq!(message, "发布失败");
            }
            PublishResult::Success { .. } => panic!("expected failure"),
        }
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&PublishErrorKind::UploadTargetMissing)
            .expect("kind serializes");
        assert_eq!(json, "\"upload_target_missing\"");
    }

    #[test]
    fn result_serialization_is_tagged() {
        let result = PublishResult::failure(PublishErrorKind::LoginTimeout, "timed out");
        let value = serde_json::to_value(&result).expect("result serializes");
        assert_eq!(value["outcome"], "failure");
        assert_eq!(value["error"], "login_timeout");
        assert_eq!(value["message"], "timed out");
    }
}
