use std::fs;
use std::path::Path;

use redpost_core::draft::{extract_draft, find_images, DraftError};

fn touch(path: &Path) {
    fs::write(path, b"png").expect("write image stub");
}

#[test]
fn session_with_long_cjk_title_and_preview_artifacts() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("post.md"),
        "测试标题测试标题测试标题超过二十字限制\n\n正文第一段。\n正文第二段。\n",
    )
    .expect("write post.md");
    touch(&dir.path().join("a.png"));
    touch(&dir.path().join("a_preview.png"));
    touch(&dir.path().join("b.png"));

    let draft = extract_draft(dir.path()).expect("draft resolves");

    assert_eq!(draft.title().chars().count(), 20);
    assert!("测试标题测试标题测试标题超过二十字限制".starts_with(draft.title()));

    let names: Vec<_> = draft
        .images()
        .iter()
        .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.png", "b.png"]);
}

#[test]
fn backup_files_and_non_png_files_are_excluded() {
    let dir = tempfile::tempdir().expect("tempdir");
    touch(&dir.path().join("01.png"));
    touch(&dir.path().join("02_BACKUP.png"));
    touch(&dir.path().join("notes.jpg"));
    touch(&dir.path().join("03.png"));

    let images = find_images(dir.path()).expect("listing succeeds");
    let names: Vec<_> = images
        .iter()
        .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["01.png", "03.png"]);
}

#[test]
fn extraction_is_idempotent_and_preserves_upload_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("post.md"), "标题\n\n正文。\n").expect("write post.md");
    touch(&dir.path().join("c.png"));
    touch(&dir.path().join("a.png"));
    touch(&dir.path().join("b.png"));

    let first = extract_draft(dir.path()).expect("first pass");
    let second = extract_draft(dir.path()).expect("second pass");
    assert_eq!(first, second);

    let names: Vec<_> = first
        .images()
        .iter()
        .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.png", "b.png", "c.png"]);
}

#[test]
fn outline_document_is_used_when_post_is_absent() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("outline.md"),
        "## P1 封面\n**Hook**: \"封面标题\"\n\n## P2 正文\n**Message**: 第一条内容\n",
    )
    .expect("write outline.md");
    touch(&dir.path().join("cover.png"));

    let draft = extract_draft(dir.path()).expect("draft resolves");
    assert_eq!(draft.title(), "封面标题");
    assert_eq!(draft.body(), "第一条内容");
}

#[test]
fn missing_pieces_map_to_distinct_errors() {
    let missing = Path::new("/nonexistent/redpost-session");
    assert!(matches!(
        extract_draft(missing),
        Err(DraftError::SessionDirMissing(_))
    ));

    let dir = tempfile::tempdir().expect("tempdir");
    assert!(matches!(
        extract_draft(dir.path()),
        Err(DraftError::DocumentMissing(_))
    ));

    fs::write(dir.path().join("post.md"), "标题\n正文\n").expect("write post.md");
    assert!(matches!(
        extract_draft(dir.path()),
        Err(DraftError::NoImages(_))
    ));
}

#[test]
fn preview_reports_title_body_length_and_basenames() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("post.md"), "旅行清单\n\n两段正文。\n").expect("write post.md");
    touch(&dir.path().join("x.png"));
    touch(&dir.path().join("y.png"));

    let draft = extract_draft(dir.path()).expect("draft resolves");
    let preview = draft.preview();
    assert_eq!(preview.title, "旅行清单");
    assert_eq!(preview.body_chars, draft.body().chars().count());
    assert_eq!(preview.images, vec!["x.png", "y.png"]);
}
