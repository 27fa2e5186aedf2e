//! File context: selection-order assembly, sandboxing, budget, picker
//! filter, and the file tree built from a folder listing.

use std::path::PathBuf;

use ouvert::context::{self, MAX_FILE_CONTEXT_BYTES};
use ouvert::filetree::FileTree;

/// Fresh directory under the system temp dir, populated with `files`.
fn fixture(name: &str, files: &[(&str, &str)]) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ouvert-test-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    for (rel, content) in files {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
    dir
}

fn paths(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn two_files_in_selection_order() {
    let dir = fixture("order", &[("a.txt", "A"), ("b.txt", "B")]);

    let ctx = context::read_selected(&paths(&["a.txt", "b.txt"]), &dir, MAX_FILE_CONTEXT_BYTES, false)
        .await
        .unwrap();

    assert_eq!(ctx.included, vec!["a.txt", "b.txt"]);
    assert_eq!(
        context::inject_context(&ctx.contents, "Q"),
        "Code developed so far:\n\nA\n\nB\n\n\n\nQ"
    );

    // Reversed selection reverses the concatenation.
    let ctx = context::read_selected(&paths(&["b.txt", "a.txt"]), &dir, MAX_FILE_CONTEXT_BYTES, false)
        .await
        .unwrap();
    assert_eq!(ctx.contents, "B\n\nA\n\n");

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn labelled_blocks_carry_paths() {
    let dir = fixture("labels", &[("src/main.rs", "fn main() {}")]);

    let ctx = context::read_selected(&paths(&["src/main.rs"]), &dir, MAX_FILE_CONTEXT_BYTES, true)
        .await
        .unwrap();
    assert_eq!(ctx.contents, "src/main.rs\nfn main() {}\n\n");

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn traversal_rejects_request() {
    let dir = fixture("traversal", &[("a.txt", "A")]);

    for bad in ["../etc/passwd", "/etc/passwd", "a/../../x"] {
        let result = context::read_selected(&paths(&["a.txt", bad]), &dir, MAX_FILE_CONTEXT_BYTES, false).await;
        assert!(result.is_err(), "{bad} should be rejected");
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[cfg(unix)]
#[tokio::test]
async fn symlink_escape_rejects_request() {
    let outside = fixture("symlink-target", &[("secret.txt", "S")]);
    let dir = fixture("symlink", &[("a.txt", "A")]);
    std::os::unix::fs::symlink(outside.join("secret.txt"), dir.join("link.txt")).unwrap();

    let result = context::read_selected(&paths(&["link.txt"]), &dir, MAX_FILE_CONTEXT_BYTES, false).await;
    let err = result.unwrap_err();
    assert!(err.to_string().contains("escapes"), "{err}");

    let _ = std::fs::remove_dir_all(&dir);
    let _ = std::fs::remove_dir_all(&outside);
}

#[tokio::test]
async fn missing_file_is_noted_not_fatal() {
    let dir = fixture("missing", &[("a.txt", "A")]);

    let ctx = context::read_selected(&paths(&["a.txt", "nope.txt"]), &dir, MAX_FILE_CONTEXT_BYTES, false)
        .await
        .unwrap();
    assert_eq!(ctx.included, vec!["a.txt"]);
    assert_eq!(ctx.errors.len(), 1);
    assert!(ctx.errors[0].starts_with("nope.txt"));

    let all_missing = context::read_selected(&paths(&["nope.txt"]), &dir, MAX_FILE_CONTEXT_BYTES, false).await;
    assert!(all_missing.is_err());

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn budget_skips_files_that_do_not_fit() {
    let big = "x".repeat(200);
    let dir = fixture("budget", &[("small.txt", "tiny"), ("big.txt", big.as_str())]);

    let ctx = context::read_selected(&paths(&["small.txt", "big.txt"]), &dir, 64, false)
        .await
        .unwrap();
    assert_eq!(ctx.included, vec!["small.txt"]);
    assert_eq!(ctx.skipped, vec![("big.txt".to_string(), 200)]);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn excluded_paths_are_not_read() {
    let dir = fixture(
        "excluded",
        &[("app.js", "ok"), ("node_modules/x/index.js", "dep")],
    );

    let ctx = context::read_selected(
        &paths(&["app.js", "node_modules/x/index.js"]),
        &dir,
        MAX_FILE_CONTEXT_BYTES,
        false,
    )
    .await
    .unwrap();
    assert_eq!(ctx.included, vec!["app.js"]);
    assert!(ctx.errors[0].contains("excluded"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn listing_filters_and_builds_tree() {
    let dir = fixture(
        "listing",
        &[
            ("src/main.rs", ""),
            ("src/util/mod.rs", ""),
            ("README.md", ""),
            ("node_modules/a/b.js", ""),
            (".git/HEAD", ""),
            ("obj/Debug/app.dll", ""),
            ("package-lock.json", ""),
        ],
    );

    let files = context::list_files(&dir, 100).await.unwrap();
    assert_eq!(files, vec!["README.md", "src/main.rs", "src/util/mod.rs"]);

    let tree = FileTree::build(&files);
    assert_eq!(tree.render(), "README.md\nsrc/\n  main.rs\n  util/\n    mod.rs\n");

    let capped = context::list_files(&dir, 2).await.unwrap();
    assert_eq!(capped.len(), 2);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn working_directory_must_be_a_directory() {
    let dir = fixture("wd", &[("a.txt", "A")]);

    assert!(context::validate_working_directory(dir.to_str().unwrap()).await.is_ok());
    assert!(
        context::validate_working_directory(dir.join("a.txt").to_str().unwrap())
            .await
            .is_err()
    );
    assert!(
        context::validate_working_directory("/definitely/not/here")
            .await
            .is_err()
    );

    let _ = std::fs::remove_dir_all(&dir);
}
