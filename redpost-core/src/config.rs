use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Complete configuration for one posting target. Every section carries the
/// defaults of the creator-studio workflow, so a missing config file is valid.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct PosterConfig {
    pub chromium: ChromiumSection,
    pub flags: FlagsSection,
    pub viewport: ViewportSection,
    pub user_agents: UserAgentSection,
    pub urls: UrlsSection,
    pub selectors: SelectorSection,
    pub human: HumanSection,
    pub timing: TimingSection,
    pub session: SessionSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChromiumSection {
    pub executable_path: Option<String>,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub request_timeout_seconds: Option<u64>,
}

impl Default for ChromiumSection {
    fn default() -> Self {
        Self {
            executable_path: None,
            // The interactive QR login needs a visible window.
            headless: false,
            sandbox: false,
            disable_gpu: false,
            request_timeout_seconds: Some(60),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlagsSection {
    pub no_first_run: bool,
    pub disable_automation_controlled: bool,
    pub disable_blink_features: Vec<String>,
    pub disable_dev_shm_usage: bool,
    pub lang: Option<String>,
    pub accept_language: Option<String>,
}

impl Default for FlagsSection {
    fn default() -> Self {
        Self {
            no_first_run: true,
            disable_automation_controlled: true,
            disable_blink_features: vec!["AutomationControlled".to_string()],
            disable_dev_shm_usage: true,
            lang: Some("zh-CN".to_string()),
            accept_language: Some("zh-CN,zh;q=0.9".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewportSection {
    pub width: u32,
    pub height: u32,
    pub jitter_pixels: u32,
    pub device_scale_factor: f64,
}

impl Default for ViewportSection {
    fn default() -> Self {
        Self {
            width: 1440,
            height: 900,
            jitter_pixels: 16,
            device_scale_factor: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentSection {
    pub pool: Vec<String>,
}

impl Default for UserAgentSection {
    fn default() -> Self {
        Self {
            pool: vec![
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36"
                    .to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UrlsSection {
    pub base: String,
    pub login: String,
    pub publish: String,
    /// Path fragment that marks "still on the login page".
    pub login_path: String,
}

impl Default for UrlsSection {
    fn default() -> Self {
        Self {
            base: "https://creator.xiaohongshu.com".to_string(),
            login: "https://creator.xiaohongshu.com/login".to_string(),
            publish: "https://creator.xiaohongshu.com/publish/publish".to_string(),
            login_path: "/login".to_string(),
        }
    }
}

/// One DOM query pattern: a CSS selector, optionally constrained to elements
/// whose rendered text contains a given string (the CSS-only rendering of
/// `:has-text(...)` style selectors).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SelectorPattern {
    Css(String),
    WithText { css: String, text: String },
}

impl SelectorPattern {
    pub fn css(&self) -> &str {
        match self {
            SelectorPattern::Css(css) => css,
            SelectorPattern::WithText { css, .. } => css,
        }
    }

    pub fn required_text(&self) -> Option<&str> {
        match self {
            SelectorPattern::Css(_) => None,
            SelectorPattern::WithText { text, .. } => Some(text),
        }
    }
}

fn css(selector: &str) -> SelectorPattern {
    SelectorPattern::Css(selector.to_string())
}

fn with_text(selector: &str, text: &str) -> SelectorPattern {
    SelectorPattern::WithText {
        css: selector.to_string(),
        text: text.to_string(),
    }
}

/// Ordered fallback chains per logical field. Earlier entries are the
/// structurally preferred match; later ones cover UI variants.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorSection {
    pub qr_tab: Vec<SelectorPattern>,
    pub image_tab: Vec<SelectorPattern>,
    pub file_input: String,
    pub title_input: Vec<SelectorPattern>,
    pub content_input: Vec<SelectorPattern>,
    pub submit: Vec<SelectorPattern>,
    pub error_banner: Vec<SelectorPattern>,
}

impl Default for SelectorSection {
    fn default() -> Self {
        Self {
            qr_tab: vec![with_text("div, span, button, a", "扫码登录")],
            image_tab: vec![
                with_text(".tab-item", "图文"),
                with_text("[role='tab']", "图文"),
                with_text("button", "图文"),
                with_text(".tabs *", "图文"),
                with_text("[class*='tab']", "图文"),
            ],
            file_input: "input[type='file']".to_string(),
            title_input: vec![
                css(".d-text"),
                css("input[placeholder*='标题']"),
                css("input[placeholder*='填写笔记标题']"),
                css("[class*='title'] input"),
                css("input[class*='title']"),
                css("input[class*='Input']"),
            ],
            content_input: vec![
                css(".ql-editor"),
                css("[contenteditable='true']"),
                css("div[class*='editor']"),
                css("textarea"),
                css("[class*='content'] [contenteditable]"),
                css(".content-input"),
            ],
            // Deliberately narrow: over-eager matching here risks a double
            // submission.
            submit: vec![with_text("button", "发布"), css(".publishBtn")],
            error_banner: vec![
                css(".el-message--error"),
                css(".error-message"),
                css("[class*='error']"),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HumanSection {
    pub typing_base_latin_ms: u64,
    pub typing_base_cjk_ms: u64,
    pub typing_jitter_ms: u64,
    pub thinking_probability: f64,
    pub thinking_pause_ms: [u64; 2],
    pub correction_probability: f64,
    pub correction_pause_ms: [u64; 2],
    pub focus_pause_ms: [u64; 2],
    pub clear_pause_ms: [u64; 2],
    pub typed_settle_ms: [u64; 2],
    pub click_offset_px: [f64; 2],
    pub move_steps: [u32; 2],
    pub step_pause_ms: [u64; 2],
    pub arrival_pause_ms: [u64; 2],
    pub post_click_pause_ms: [u64; 2],
    pub wander_moves: [u32; 2],
    pub wander_pause_ms: [u64; 2],
    pub scroll_bursts: [u32; 2],
    pub scroll_distance_px: [u32; 2],
    pub reading_pause_ms: [u64; 2],
    pub scroll_top_pause_ms: [u64; 2],
}

impl Default for HumanSection {
    fn default() -> Self {
        Self {
            typing_base_latin_ms: 120,
            typing_base_cjk_ms: 80,
            typing_jitter_ms: 100,
            thinking_probability: 0.10,
            thinking_pause_ms: [400, 1000],
            correction_probability: 0.02,
            correction_pause_ms: [200, 400],
            focus_pause_ms: [300, 800],
            clear_pause_ms: [100, 300],
            typed_settle_ms: [500, 1000],
            click_offset_px: [10.0, 5.0],
            move_steps: [10, 25],
            step_pause_ms: [4, 14],
            arrival_pause_ms: [80, 200],
            post_click_pause_ms: [200, 500],
            wander_moves: [2, 4],
            wander_pause_ms: [100, 400],
            scroll_bursts: [1, 3],
            scroll_distance_px: [100, 400],
            reading_pause_ms: [800, 2000],
            scroll_top_pause_ms: [500, 1000],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingSection {
    pub selector_attempt_ms: u64,
    pub tab_attempt_ms: u64,
    pub selector_poll_ms: u64,
    pub page_settle_ms: [u64; 2],
    pub pre_interaction_ms: [u64; 2],
    pub mode_switch_settle_ms: [u64; 2],
    pub upload_prepare_ms: [u64; 2],
    pub pre_upload_ms: [u64; 2],
    pub upload_settle_ms: [u64; 2],
    pub scroll_top_ms: [u64; 2],
    pub post_title_ms: [u64; 2],
    pub content_focus_ms: [u64; 2],
    pub review_ms: [u64; 2],
    pub review_scroll_probability: f64,
    pub pre_submit_ms: [u64; 2],
    pub result_wait_ms: [u64; 2],
    pub login_settle_ms: [u64; 2],
    pub post_login_ms: [u64; 2],
    pub login_page_ms: [u64; 2],
    pub qr_settle_ms: [u64; 2],
    pub scan_timeout_secs: u64,
    pub scan_poll_ms: u64,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            selector_attempt_ms: 3000,
            tab_attempt_ms: 2000,
            selector_poll_ms: 250,
            page_settle_ms: [6000, 10000],
            pre_interaction_ms: [2000, 4000],
            mode_switch_settle_ms: [2500, 4000],
            upload_prepare_ms: [1500, 3000],
            pre_upload_ms: [500, 1200],
            upload_settle_ms: [2500, 4500],
            scroll_top_ms: [800, 1500],
            post_title_ms: [1000, 2500],
            content_focus_ms: [500, 1000],
            review_ms: [2500, 5000],
            review_scroll_probability: 0.4,
            pre_submit_ms: [800, 1500],
            result_wait_ms: [10000, 15000],
            login_settle_ms: [3000, 5000],
            post_login_ms: [2000, 4000],
            login_page_ms: [3000, 4000],
            qr_settle_ms: [2000, 3000],
            scan_timeout_secs: 120,
            scan_poll_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub cookies_file: String,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            cookies_file: "redpost_cookies.json".to_string(),
        }
    }
}

pub fn load_poster_config<P: AsRef<Path>>(path: P) -> Result<PosterConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_keeps_chain_shapes() {
        let config = PosterConfig::default();
        assert_eq!(config.selectors.image_tab.len(), 5);
        assert_eq!(config.selectors.title_input.len(), 6);
        assert_eq!(config.selectors.content_input.len(), 6);
        assert_eq!(config.selectors.submit.len(), 2);
        assert!(config.urls.login.contains(&config.urls.login_path));
    }

    #[test]
    fn partial_toml_overrides_one_section() {
        let parsed: PosterConfig = toml::from_str(
            r#"
[chromium]
headless = true

[timing]
scan_timeout_secs = 30
"#,
        )
        .expect("partial config parses");
        assert!(parsed.chromium.headless);
        assert_eq!(parsed.timing.scan_timeout_secs, 30);
        assert_eq!(parsed.timing.selector_attempt_ms, 3000);
        assert_eq!(parsed.selectors.submit.len(), 2);
    }

    #[test]
    fn selector_pattern_accepts_both_forms() {
        let section: SelectorSection = toml::from_str(
            r#"
submit = [
    { css = "button", text = "发布" },
    ".publishBtn",
]
"#,
        )
        .expect("selector forms parse");
        assert_eq!(section.submit[0].required_text(), Some("发布"));
        assert_eq!(section.submit[1].css(), ".publishBtn");
        assert_eq!(section.submit[1].required_text(), None);
    }
}
