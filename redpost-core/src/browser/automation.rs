use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, NavigateParams,
};
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use rand::{seq::SliceRandom, Rng};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{PosterConfig, ViewportSection};

use super::error::{BrowserError, BrowserResult};

#[derive(Debug, Clone)]
pub struct ViewportSpec {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
}

/// Launches Chromium with the anti-detection surface the posting flow needs:
/// jittered viewport, pooled user agent, automation flags masked.
#[derive(Debug, Clone)]
pub struct BrowserLauncher {
    config: Arc<PosterConfig>,
}

impl BrowserLauncher {
    pub fn new(config: Arc<PosterConfig>) -> Self {
        Self { config }
    }

    pub async fn launch(&self) -> BrowserResult<BrowserAutomation> {
        let viewport = self.select_viewport();
        let user_agent = self.select_user_agent();
        let chromium_config = self.build_chromium_config(&viewport, &user_agent)?;
        info!(
            ua = %user_agent,
            width = viewport.width,
            height = viewport.height,
            headless = self.config.chromium.headless,
            "Launching Chromium instance"
        );

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "Chromium handler reported error");
                }
            }
        });

        Ok(BrowserAutomation {
            browser,
            handler_task: Some(handler_task),
            config: Arc::clone(&self.config),
            viewport,
            user_agent,
        })
    }

    fn select_viewport(&self) -> ViewportSpec {
        let ViewportSection {
            width,
            height,
            jitter_pixels,
            device_scale_factor,
        } = self.config.viewport;

        let mut rng = rand::thread_rng();
        let jitter = jitter_pixels as i32;
        let width = if jitter > 0 {
            (width as i32 + rng.gen_range(-jitter..=jitter)).clamp(640, 2560) as u32
        } else {
            width
        };
        let height = if jitter > 0 {
            (height as i32 + rng.gen_range(-jitter..=jitter)).clamp(480, 1600) as u32
        } else {
            height
        };
        ViewportSpec {
            width,
            height,
            device_scale_factor,
        }
    }

    fn select_user_agent(&self) -> String {
        let mut rng = rand::thread_rng();
        self.config
            .user_agents
            .pool
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(|| {
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36"
                    .to_string()
            })
    }

    fn build_chromium_config(
        &self,
        viewport: &ViewportSpec,
        user_agent: &str,
    ) -> BrowserResult<ChromiumConfig> {
        let mut builder = ChromiumConfig::builder().viewport(ChromiumViewport {
            width: viewport.width,
            height: viewport.height,
            device_scale_factor: Some(viewport.device_scale_factor),
            emulating_mobile: false,
            is_landscape: viewport.width >= viewport.height,
            has_touch: false,
        });

        if let Some(executable) = &self.config.chromium.executable_path {
            builder = builder.chrome_executable(executable);
        }
        if !self.config.chromium.headless {
            builder = builder.with_head();
        }
        if !self.config.chromium.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(timeout) = self.config.chromium.request_timeout_seconds {
            builder = builder.request_timeout(Duration::from_secs(timeout));
        }

        let mut args = vec![
            format!("--user-agent={user_agent}"),
            format!("--window-size={},{}", viewport.width, viewport.height),
        ];
        if self.config.chromium.disable_gpu {
            args.push("--disable-gpu".into());
        }
        if self.config.flags.disable_dev_shm_usage {
            args.push("--disable-dev-shm-usage".into());
        }
        for feature in &self.config.flags.disable_blink_features {
            args.push(format!("--disable-blink-features={feature}"));
        }
        if self.config.flags.no_first_run {
            args.push("--no-first-run".into());
        }
        if self.config.flags.disable_automation_controlled {
            args.push("--disable-features=AutomationControlled".into());
        }
        if let Some(lang) = &self.config.flags.lang {
            args.push(format!("--lang={lang}"));
        }
        if let Some(accept) = &self.config.flags.accept_language {
            args.push(format!("--accept-lang={accept}"));
        }
        builder = builder.args(args);

        builder.build().map_err(BrowserError::Configuration)
    }
}

/// One live Chromium instance. Exclusively owned by a single poster for the
/// lifetime of one publish attempt; must be shut down on every exit path.
#[derive(Debug)]
pub struct BrowserAutomation {
    browser: Browser,
    handler_task: Option<JoinHandle<()>>,
    config: Arc<PosterConfig>,
    viewport: ViewportSpec,
    user_agent: String,
}

impl BrowserAutomation {
    pub fn viewport(&self) -> &ViewportSpec {
        &self.viewport
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub async fn new_context(&self) -> BrowserResult<BrowserContext> {
        let params = CreateTargetParams::new("about:blank");
        let page = self.browser.new_page(params).await?;
        self.configure_page(&page).await?;
        Ok(BrowserContext {
            page,
            viewport: self.viewport.clone(),
        })
    }

    pub async fn shutdown(mut self) -> BrowserResult<()> {
        info!("Shutting down Chromium instance");
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "Failed to close browser gracefully");
        }
        if let Some(handle) = self.handler_task.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "Browser handler join error");
            }
        }
        Ok(())
    }

    async fn configure_page(&self, page: &Page) -> BrowserResult<()> {
        page.enable_stealth_mode_with_agent(&self.user_agent)
            .await?;

        let mut params_builder =
            SetUserAgentOverrideParams::builder().user_agent(self.user_agent.clone());
        if let Some(accept) = &self.config.flags.accept_language {
            params_builder = params_builder.accept_language(accept.clone());
        }
        let params = params_builder
            .build()
            .map_err(BrowserError::Configuration)?;
        page.set_user_agent(params).await?;

        let mut mask = String::from(
            "Object.defineProperty(navigator, 'webdriver', { get: () => false });\n",
        );
        if let Some(lang) = &self.config.flags.lang {
            mask.push_str(&format!(
                "Object.defineProperty(navigator, 'language', {{ get: () => '{lang}' }});\nObject.defineProperty(navigator, 'languages', {{ get: () => ['{lang}', 'en-US'] }});"
            ));
        }
        page.evaluate_on_new_document(
            AddScriptToEvaluateOnNewDocumentParams::builder()
                .source(mask)
                .build()
                .map_err(BrowserError::Configuration)?,
        )
        .await?;
        Ok(())
    }
}

impl Drop for BrowserAutomation {
    fn drop(&mut self) {
        if let Some(handle) = &self.handler_task {
            if !handle.is_finished() {
                warn!("BrowserAutomation dropped without explicit shutdown");
            }
        }
    }
}

/// One page within the browser, plus the viewport it was created with.
#[derive(Debug)]
pub struct BrowserContext {
    page: Page,
    viewport: ViewportSpec,
}

impl BrowserContext {
    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn viewport(&self) -> &ViewportSpec {
        &self.viewport
    }

    pub async fn goto(&self, url: &str) -> BrowserResult<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(BrowserError::Configuration)?;
        self.page.goto(params).await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    pub async fn reload(&self) -> BrowserResult<()> {
        self.page.reload().await?;
        Ok(())
    }

    pub async fn current_url(&self) -> BrowserResult<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }
}
