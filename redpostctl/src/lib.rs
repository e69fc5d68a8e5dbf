use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use redpost_core::{
    extract_draft, load_poster_config, DraftError, Poster, PosterConfig, PublishResult,
};

pub const DATA_DIR_ENV: &str = "REDPOST_DATA_DIR";

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] redpost_core::ConfigError),
    #[error("draft error: {0}")]
    Draft(#[from] DraftError),
    #[error("browser error: {0}")]
    Browser(#[from] redpost_core::BrowserError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("cannot determine a data directory: set --data-dir or REDPOST_DATA_DIR")]
    NoDataDir,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Publish an image post from a session directory", long_about = None)]
pub struct Cli {
    /// Directory containing post.md or outline.md plus the png images
    pub session_dir: PathBuf,
    /// Resolve the draft and list images without launching a browser
    #[arg(long)]
    pub preview: bool,
    /// Optional redpost.toml overriding the built-in defaults
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Directory for persisted session cookies (default: $REDPOST_DATA_DIR or ~/.redpost)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Force headless mode (the interactive QR login needs a visible window)
    #[arg(long)]
    pub headless: bool,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

pub async fn run(cli: Cli) -> Result<i32> {
    let mut config = match &cli.config {
        Some(path) => load_poster_config(path)?,
        None => PosterConfig::default(),
    };
    if cli.headless {
        config.chromium.headless = true;
    }

    let draft = extract_draft(&cli.session_dir)?;

    if cli.preview {
        render_preview(&draft.preview(), cli.format)?;
        return Ok(0);
    }

    let data_dir = resolve_data_dir(
        cli.data_dir.clone(),
        std::env::var_os(DATA_DIR_ENV).map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
    .ok_or(AppError::NoDataDir)?;

    info!(
        session = %cli.session_dir.display(),
        data_dir = %data_dir.display(),
        "starting publish attempt"
    );
    let poster = Poster::new(config, &data_dir)?;
    let result = poster.publish(&draft).await?;
    render_result(&result, cli.format)?;
    Ok(if result.success() { 0 } else { 1 })
}

/// Precedence: explicit flag, then environment variable, then ~/.redpost.
pub fn resolve_data_dir(
    flag: Option<PathBuf>,
    env: Option<PathBuf>,
    home: Option<PathBuf>,
) -> Option<PathBuf> {
    flag.or(env).or_else(|| home.map(|home| home.join(".redpost")))
}

fn render_preview(preview: &redpost_core::DraftPreview, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(preview)?),
        OutputFormat::Text => {
            println!("[preview] nothing will be published");
            println!("title:  {}", preview.title);
            println!("body:   {} chars", preview.body_chars);
            println!("images: {}", preview.images.len());
            for (index, name) in preview.images.iter().enumerate() {
                println!("  {}. {}", index + 1, name);
            }
        }
    }
    Ok(())
}

fn render_result(result: &PublishResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        OutputFormat::Text => {
            match result {
                PublishResult::Success {
                    images_uploaded, ..
                } => {
                    println!("published successfully ({images_uploaded} images uploaded)");
                }
                PublishResult::Failure { error, message, .. } => {
                    println!("publish failed ({error}): {message}");
                }
            }
            for warning in result.warnings() {
                println!("warning: {warning}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_precedence_is_flag_env_home() {
        let flag = Some(PathBuf::from("/flag"));
        let env = Some(PathBuf::from("/env"));
        let home = Some(PathBuf::from("/home/user"));

        assert_eq!(
            resolve_data_dir(flag.clone(), env.clone(), home.clone()),
            Some(PathBuf::from("/flag"))
        );
        assert_eq!(
            resolve_data_dir(None, env, home.clone()),
            Some(PathBuf::from("/env"))
        );
        assert_eq!(
            resolve_data_dir(None, None, home),
            Some(PathBuf::from("/home/user/.redpost"))
        );
        assert_eq!(resolve_data_dir(None, None, None), None);
    }

    #[test]
    fn cli_parses_preview_invocation() {
        let cli = Cli::parse_from(["redpostctl", "/tmp/session", "--preview", "--format", "json"]);
        assert!(cli.preview);
        assert!(matches!(cli.format, OutputFormat::Json));
        assert_eq!(cli.session_dir, PathBuf::from("/tmp/session"));
    }

    #[tokio::test]
    async fn preview_resolves_a_draft_without_a_browser() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("post.md"), "旅行清单\n\n两段正文。\n")
            .expect("write post.md");
        std::fs::write(dir.path().join("a.png"), b"png").expect("write image");

        let cli = Cli {
            session_dir: dir.path().to_path_buf(),
            preview: true,
            config: None,
            data_dir: None,
            headless: false,
            format: OutputFormat::Text,
        };
        let code = run(cli).await.expect("preview runs");
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn missing_session_dir_surfaces_a_draft_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cli = Cli {
            session_dir: dir.path().join("absent"),
            preview: true,
            config: None,
            data_dir: None,
            headless: false,
            format: OutputFormat::Text,
        };
        assert!(matches!(run(cli).await, Err(AppError::Draft(_))));
    }
}
