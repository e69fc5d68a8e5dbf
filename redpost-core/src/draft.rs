use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

const TITLE_MAX_CHARS: usize = 20;
const BODY_MAX_CHARS: usize = 1000;
const FALLBACK_TITLE: &str = "小红书笔记";
const OUTLINE_BODY_FALLBACK_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("session directory does not exist: {0}")]
    SessionDirMissing(PathBuf),
    #[error("neither post.md nor outline.md found in {0}")]
    DocumentMissing(PathBuf),
    #[error("no publishable images found in {0}")]
    NoImages(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

/// The title/body/images tuple to be published. Immutable once constructed;
/// over-long inputs are truncated, never rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    title: String,
    body: String,
    images: Vec<PathBuf>,
}

impl PostDraft {
    pub fn new(title: impl Into<String>, body: impl Into<String>, images: Vec<PathBuf>) -> Self {
        Self {
            title: truncate_chars(&title.into(), TITLE_MAX_CHARS),
            body: truncate_chars(&body.into(), BODY_MAX_CHARS),
            images,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Ordered upload sequence: vector order is upload order.
    pub fn images(&self) -> &[PathBuf] {
        &self.images
    }

    pub fn preview(&self) -> DraftPreview {
        DraftPreview {
            title: self.title.clone(),
            body_chars: self.body.chars().count(),
            images: self
                .images
                .iter()
                .map(|path| {
                    path.file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string())
                })
                .collect(),
        }
    }
}

/// Browserless rendering of a resolved draft, for preview mode.
#[derive(Debug, Clone, Serialize)]
pub struct DraftPreview {
    pub title: String,
    pub body_chars: usize,
    pub images: Vec<String>,
}

/// Builds a draft from a session directory. `post.md` (first line = title,
/// whole text = body) takes priority over `outline.md`; images are the sorted
/// `*.png` files minus preview/backup artifacts.
pub fn extract_draft(session_dir: &Path) -> Result<PostDraft, DraftError> {
    if !session_dir.is_dir() {
        return Err(DraftError::SessionDirMissing(session_dir.to_path_buf()));
    }

    let post_file = session_dir.join("post.md");
    let outline_file = session_dir.join("outline.md");
    let (title, body) = if post_file.is_file() {
        debug!(path = %post_file.display(), "extracting draft from post document");
        extract_from_post(&read(&post_file)?)
    } else if outline_file.is_file() {
        debug!(path = %outline_file.display(), "extracting draft from outline document");
        extract_from_outline(&read(&outline_file)?)
    } else {
        return Err(DraftError::DocumentMissing(session_dir.to_path_buf()));
    };

    let images = find_images(session_dir)?;
    if images.is_empty() {
        return Err(DraftError::NoImages(session_dir.to_path_buf()));
    }

    Ok(PostDraft::new(title, body, images))
}

/// Sorted png files in the session directory, excluding any filename that
/// contains "preview" or "backup" (case-insensitive).
pub fn find_images(session_dir: &Path) -> Result<Vec<PathBuf>, DraftError> {
    let entries = std::fs::read_dir(session_dir).map_err(|source| DraftError::Io {
        source,
        path: session_dir.to_path_buf(),
    })?;

    let mut images: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                return false;
            };
            let lowered = name.to_lowercase();
            lowered.ends_with(".png")
                && !lowered.contains("preview")
                && !lowered.contains("backup")
        })
        .collect();
    images.sort();
    Ok(images)
}

fn read(path: &Path) -> Result<String, DraftError> {
    std::fs::read_to_string(path).map_err(|source| DraftError::Io {
        source,
        path: path.to_path_buf(),
    })
}

fn extract_from_post(content: &str) -> (String, String) {
    let trimmed = content.trim();
    let first_line = trimmed.lines().next().unwrap_or("").trim();
    let title = if first_line.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        first_line.to_string()
    };
    (title, trimmed.to_string())
}

fn extract_from_outline(content: &str) -> (String, String) {
    let main = strip_frontmatter(content);
    let title = outline_title(main);
    let body = outline_body(main);
    (title, body)
}

fn strip_frontmatter(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("---") else {
        return content;
    };
    match rest.find("\n---") {
        Some(end) => {
            let after = &rest[end + "\n---".len()..];
            after.strip_prefix('\n').unwrap_or(after)
        }
        None => content,
    }
}

fn outline_title(main: &str) -> String {
    // Cover hook: `## P1 封面` (or `Cover`) followed by a quoted **Hook**.
    let hook = Regex::new(r#"(?s)##\s+P1\s+(?:封面|Cover).*?\*\*Hook\*\*:\s*["'“](.+?)["'”]"#)
        .expect("hook pattern is valid");
    if let Some(captures) = hook.captures(main) {
        return captures[1].trim().to_string();
    }
    let heading = Regex::new(r"(?m)^#+\s+(.+)$").expect("heading pattern is valid");
    heading
        .captures(main)
        .map(|captures| captures[1].trim().to_string())
        .unwrap_or_else(|| FALLBACK_TITLE.to_string())
}

fn outline_body(main: &str) -> String {
    let mut messages: Vec<String> = Vec::new();
    for page in outline_pages(main) {
        if let Some(message) = page_message(page) {
            if !message.is_empty() && !messages.contains(&message) {
                messages.push(message);
            }
        }
    }
    if messages.is_empty() {
        return truncate_chars(main, OUTLINE_BODY_FALLBACK_CHARS);
    }
    messages.join("\n\n")
}

/// Slices of the outline between `## P<n>` headings.
fn outline_pages(main: &str) -> Vec<&str> {
    let heading = Regex::new(r"(?m)^##\s+P\d+").expect("page pattern is valid");
    let starts: Vec<usize> = heading.find_iter(main).map(|found| found.start()).collect();
    starts
        .iter()
        .enumerate()
        .map(|(index, &start)| {
            let end = starts.get(index + 1).copied().unwrap_or(main.len());
            &main[start..end]
        })
        .collect()
}

fn page_message(page: &str) -> Option<String> {
    let marker = Regex::new(r"(?s)\*\*Message\*\*:\s*(.*)").expect("message pattern is valid");
    let raw = marker.captures(page)?.get(1)?.as_str();
    // The message runs until the next bold field label.
    let boundary = Regex::new(r"\n\s*\*\*").expect("boundary pattern is valid");
    let clipped = match boundary.find(raw) {
        Some(found) => &raw[..found.start()],
        None => raw,
    };
    let without_bold = clipped.replace("**", "");
    Some(without_bold.trim().to_string())
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_and_body_are_truncated_not_rejected() {
        let long_title = "x".repeat(64);
        let long_body = "y".repeat(4000);
        let draft = PostDraft::new(long_title, long_body, vec![]);
        assert_eq!(draft.title().chars().count(), 20);
        assert_eq!(draft.body().chars().count(), 1000);
    }

    #[test]
    fn cjk_truncation_counts_characters() {
        let title = "测试标题测试标题测试标题超过二十字限制";
        let truncated = truncate_chars(title, 20);
        assert_eq!(truncated.chars().count(), title.chars().count().min(20));
        assert!(title.starts_with(&truncated));
    }

    #[test]
    fn post_document_uses_first_line_as_title() {
        let (title, body) = extract_from_post("旅行清单\n\n第一条\n第二条\n");
        assert_eq!(title, "旅行清单");
        assert!(body.starts_with("旅行清单"));
        assert!(body.contains("第二条"));
    }

    #[test]
    fn empty_post_document_falls_back_to_default_title() {
        let (title, _) = extract_from_post("\n\n");
        assert_eq!(title, FALLBACK_TITLE);
    }

    #[test]
    fn outline_extracts_hook_and_messages() {
        let outline = r#"---
theme: demo
---
# 一篇笔记

## P1 封面
**Hook**: "三分钟看懂咖啡豆"
**Visual**: 大字封面

## P2 内容
**Message**: 浅烘的果酸更明显
**Visual**: 对比图

## P3 内容
**Message**: 深烘适合奶咖
**Note**: 结尾
"#;
        let (title, body) = extract_from_outline(outline);
        assert_eq!(title, "三分钟看懂咖啡豆");
        assert_eq!(body, "浅烘的果酸更明显\n\n深烘适合奶咖");
    }

    #[test]
    fn outline_deduplicates_repeated_messages() {
        let outline = "## P1 封面\n**Hook**: \"标题\"\n\n## P2 内容\n**Message**: 重复的一句\n\n## P3 内容\n**Message**: 重复的一句\n";
        let (_, body) = extract_from_outline(outline);
        assert_eq!(body, "重复的一句");
    }

    #[test]
    fn outline_without_hook_uses_first_heading() {
        let outline = "# 备选标题\n\n## P2 内容\n**Message**: 正文\n";
        let (title, _) = extract_from_outline(outline);
        assert_eq!(title, "备选标题");
    }

    #[test]
    fn outline_without_messages_falls_back_to_leading_text() {
        let outline = "自由格式的内容，没有任何分页结构。";
        let (_, body) = extract_from_outline(outline);
        assert_eq!(body, outline);
    }
}
